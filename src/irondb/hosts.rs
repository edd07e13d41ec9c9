use crate::errors::{FinderError, FinderResult};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin rotation over the cluster's base URLs.
///
/// Shared by discovery and every batch fetch of a finder, so the cursor is an
/// atomic rather than a `&mut self` rotation.
#[derive(Debug)]
pub struct HostRotator {
    hosts: Vec<String>,
    cursor: AtomicUsize,
}

impl HostRotator {
    pub fn new(hosts: Vec<String>) -> FinderResult<Self> {
        if hosts.is_empty() {
            return Err(FinderError::Configuration(
                "IRONdb host list must not be empty".into(),
            ));
        }

        Ok(Self {
            hosts,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Get the next host using round-robin
    pub fn next_host(&self) -> &str {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.hosts.len();
        &self.hosts[index]
    }

    pub fn count(&self) -> usize {
        self.hosts.len()
    }
}
