// src/workspace/handles.rs
//
// Download handles for preview and result payloads.
//
// Every handle has exactly one owner (an entry's preview or its current result).
// Owners release their handles when superseded or removed, so the number of live
// handles is bounded by twice the number of entries.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle-{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct HandleStore {
    next: u64,
    live: HashMap<HandleId, Arc<Vec<u8>>>,
}

impl HandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, bytes: Arc<Vec<u8>>) -> HandleId {
        self.next += 1;
        let id = HandleId(self.next);
        self.live.insert(id, bytes);
        id
    }

    pub fn resolve(&self, id: HandleId) -> Option<Arc<Vec<u8>>> {
        self.live.get(&id).cloned()
    }

    /// Revoke a handle. Returns false if it was already released.
    pub fn release(&mut self, id: HandleId) -> bool {
        self.live.remove(&id).is_some()
    }

    pub fn live_handles(&self) -> usize {
        self.live.len()
    }
}
