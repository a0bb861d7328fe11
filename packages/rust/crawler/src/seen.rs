//! Claimed-path set shared by every coordinator invocation of a run.

use std::collections::HashSet;
use std::sync::RwLock;

/// Concurrency-safe membership set over normalized path strings.
///
/// Presence means "claimed for crawling in this run", not necessarily
/// completed. There is no removal; entries live until the run ends.
#[derive(Debug, Default)]
pub struct SeenSet {
    inner: RwLock<HashSet<String>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` has already been claimed.
    pub fn has(&self, key: &str) -> bool {
        self.inner
            .read()
            .expect("seen set lock poisoned")
            .contains(key)
    }

    /// Add every provided key to the set.
    pub fn add<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = self.inner.write().expect("seen set lock poisoned");
        for key in keys {
            set.insert(key.into());
        }
    }

    /// Claim `key`, returning whether this caller won the claim.
    ///
    /// The membership check and the insert happen under one write lock, so
    /// two concurrent claimants can never both win.
    pub fn claim(&self, key: &str) -> bool {
        self.inner
            .write()
            .expect("seen set lock poisoned")
            .insert(key.to_string())
    }

    /// Number of claimed paths.
    pub fn len(&self) -> usize {
        self.inner.read().expect("seen set lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
