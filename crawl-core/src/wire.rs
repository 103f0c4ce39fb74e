//! Length-delimited JSON message framing and the payload schemas for
//! every channel in the fabric (client-worker, worker-storage,
//! storage-storage).
//!
//! Each frame is a 4-byte big-endian length prefix followed by a
//! `serde_json`-encoded payload. Every channel gets its own explicit
//! tagged-variant schema rather than a loosely-typed JSON object.

use std::io;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("frame length {0} exceeds maximum of {MAX_FRAME_LEN}")]
    TooLarge(u32),
    #[error("connection closed")]
    Eof,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("malformed json payload")]
    Json(#[from] serde_json::Error),
}

/// Read one length-prefixed JSON frame and deserialize it as `T`.
pub async fn read_frame<T, R>(reader: &mut R) -> Result<T, FramingError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {},
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Err(FramingError::Eof),
        Err(err) => return Err(err.into()),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(FramingError::TooLarge(len));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Serialize `value` as JSON and write it as one length-prefixed frame.
pub async fn write_frame<T, W>(writer: &mut W, value: &T) -> Result<(), FramingError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(value)?;
    let len: u32 = payload
        .len()
        .try_into()
        .map_err(|_| FramingError::TooLarge(u32::MAX))?;
    if len > MAX_FRAME_LEN {
        return Err(FramingError::TooLarge(len));
    }
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// `Client -> Worker`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientRequest {
    pub id: String,
    pub url: String,
}

/// `Worker -> Client`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientReply {
    Ok {
        url: String,
        hit: bool,
        content: String,
    },
    Err {
        error: String,
    },
}

/// `Worker -> Storage`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StorageRequest {
    Fetch { id: String, url: String },
    Update { url: String, content: String, spread: bool },
}

/// `Storage -> Worker`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageReply {
    pub id: String,
    pub url: String,
    pub hit: bool,
    pub content: Option<String>,
}

/// `Storage -> Storage`, both the hello handshake and the replication pump.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplicationMessage {
    Hello {
        id: String,
        new: bool,
        updateme: bool,
    },
    Update {
        url: Option<String>,
        content: Option<String>,
        spread: bool,
    },
}

impl ReplicationMessage {
    /// The sentinel that terminates a full-cache catch-up stream.
    pub fn end_of_stream() -> Self {
        ReplicationMessage::Update {
            url: None,
            content: None,
            spread: false,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(
            self,
            ReplicationMessage::Update {
                url: None,
                content: None,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trips_client_request() {
        let msg = ClientRequest {
            id: "abcd".to_string(),
            url: "https://example.com".to_string(),
        };
        let mut buf = Vec::new();
        write_frame(&mut buf, &msg).await.unwrap();

        let mut cursor = Cursor::new(buf);
        let decoded: ClientRequest = read_frame(&mut cursor).await.unwrap();
        assert_eq!(decoded.id, msg.id);
        assert_eq!(decoded.url, msg.url);
    }

    #[tokio::test]
    async fn rejects_oversized_frame() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_LEN + 1).to_be_bytes());
        let mut cursor = Cursor::new(buf);
        let result: Result<ClientRequest, _> = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(FramingError::TooLarge(_))));
    }

    #[tokio::test]
    async fn empty_stream_is_eof() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let result: Result<ClientRequest, _> = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(FramingError::Eof)));
    }

    #[test]
    fn end_of_stream_sentinel_round_trips() {
        let sentinel = ReplicationMessage::end_of_stream();
        assert!(sentinel.is_end_of_stream());
        let json = serde_json::to_string(&sentinel).unwrap();
        let decoded: ReplicationMessage = serde_json::from_str(&json).unwrap();
        assert!(decoded.is_end_of_stream());
    }
}
