//! URL feeder: FIFO buffer of `(url, depth)` plus a pendant list with a
//! reclaim timeout. Depth travels with the URL in the buffer itself
//! rather than in a side table, since nothing else needs to look it up
//! by URL alone.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crawl_core::settings::CLIENT_PENDANT_TIMEOUT;
use tracing::instrument;

struct Pendant {
    url: String,
    depth: u32,
    deadline: Instant,
}

pub struct UrlFeeder {
    buffer: VecDeque<(String, u32)>,
    pendant: Vec<Pendant>,
    timeout: Duration,
}

impl UrlFeeder {
    /// Load up to `n` seed URLs from `lines`; `#`-prefixed lines are
    /// skipped as comments. `n < 0` loads every line.
    pub fn from_lines(lines: impl Iterator<Item = String>, n: i64) -> Self {
        let mut buffer = VecDeque::new();
        for line in lines {
            if line.starts_with('#') {
                continue;
            }
            if n >= 0 && buffer.len() as i64 >= n {
                break;
            }
            buffer.push_back((line, 0));
        }
        Self {
            buffer,
            pendant: Vec::new(),
            timeout: CLIENT_PENDANT_TIMEOUT,
        }
    }

    /// Reclaim expired pendants, then pop and return the head of the
    /// buffer, recording it as pendant. `None` if the buffer is empty.
    #[instrument(skip(self))]
    pub fn feed(&mut self) -> Option<(String, u32)> {
        let now = Instant::now();
        let (expired, still_pending): (Vec<_>, Vec<_>) =
            self.pendant.drain(..).partition(|p| p.deadline < now);
        self.pendant = still_pending;
        for p in expired {
            self.buffer.push_back((p.url, p.depth));
        }

        let (url, depth) = self.buffer.pop_front()?;
        self.pendant.push(Pendant {
            url: url.clone(),
            depth,
            deadline: now + self.timeout,
        });
        Some((url, depth))
    }

    pub fn append(&mut self, url: String, depth: u32) {
        self.buffer.push_back((url, depth));
    }

    /// Remove `url` from the pendant list, confirming it was scraped.
    /// Returns the depth it was recorded at, if it was still pendant.
    pub fn done(&mut self, url: &str) -> Option<u32> {
        let index = self.pendant.iter().position(|p| p.url == url)?;
        Some(self.pendant.remove(index).depth)
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.pendant.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_seed_urls_skipping_comments_and_respecting_n() {
        let lines = vec![
            "# a comment".to_string(),
            "https://a.example".to_string(),
            "https://b.example".to_string(),
            "https://c.example".to_string(),
        ];
        let mut feeder = UrlFeeder::from_lines(lines.into_iter(), 2);
        assert_eq!(feeder.feed(), Some(("https://a.example".to_string(), 0)));
        assert_eq!(feeder.feed(), Some(("https://b.example".to_string(), 0)));
        assert_eq!(feeder.feed(), None);
    }

    #[test]
    fn done_clears_pendant_and_append_requeues() {
        let mut feeder = UrlFeeder::from_lines(std::iter::once("https://a.example".to_string()), -1);
        let (url, _) = feeder.feed().unwrap();
        assert!(!feeder.is_empty());
        feeder.done(&url);
        assert!(feeder.is_empty());

        feeder.append("https://b.example".to_string(), 1);
        assert!(!feeder.is_empty());
    }
}
