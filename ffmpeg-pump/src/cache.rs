use crate::error::{MediaError, Result};

pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Fixed-capacity table of conversion contexts.
///
/// Lookup is a linear scan for an exact key; a miss builds the context and
/// appends it. Nothing is ever evicted: once `capacity` distinct keys are
/// held, a novel key yields `MediaError::CacheFull`. Contexts live until
/// `dispose_all`.
pub struct ContextCache<K, C> {
    entries: Vec<(K, C)>,
    capacity: usize,
    label: &'static str,
}

impl<K: PartialEq + std::fmt::Debug, C> ContextCache<K, C> {
    pub fn new(label: &'static str, capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
            label,
        }
    }

    /// Returns the context cached for `key`, building it with `build` on a miss.
    pub fn get_or_try_insert<F>(&mut self, key: K, build: F) -> Result<&mut C>
    where
        F: FnOnce(&K) -> Result<C>,
    {
        if let Some(pos) = self.entries.iter().position(|(k, _)| *k == key) {
            return Ok(&mut self.entries[pos].1);
        }
        if self.entries.len() >= self.capacity {
            return Err(MediaError::CacheFull {
                capacity: self.capacity,
            });
        }
        log::debug!("{} cache miss, building context for {:?}", self.label, key);
        let context = build(&key)?;
        self.entries.push((key, context));
        let last = self.entries.len() - 1;
        Ok(&mut self.entries[last].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every context and empties the table.
    pub fn dispose_all(&mut self) {
        if !self.entries.is_empty() {
            log::debug!("{} cache disposing {} contexts", self.label, self.entries.len());
        }
        self.entries.clear();
    }
}
