//! # Connection Registry
//!
//! Purpose: Map each distinct endpoint to at most one live connection so
//! opted-in requests reuse the channel instead of re-handshaking.
//!
//! ## Design Principles
//! 1. **One Slot per Endpoint**: Registering for an occupied key replaces the
//!    entry outright; entries are never merged.
//! 2. **Minimal Locking**: The registry mutex guards the map only; it is
//!    never held across a network call.
//! 3. **No Eviction**: Entries are never expired, health-checked, or removed
//!    on failure. A dead channel stays registered and callers reuse it; this
//!    is a deliberate behavioral property, not an oversight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::conn::Connection;
use crate::endpoint::EndpointKey;

/// Shared handle to a registered channel. The registry owns pooled
/// connections through this handle; executors clone it for the duration of
/// one request, and its inner mutex serializes use of the channel.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Process-wide registry from endpoint identity to live connection.
///
/// Constructed explicitly and shared by the caller (typically behind an
/// `Arc`); there is no hidden global instance. The registry grows by one
/// entry per distinct endpoint ever contacted and never shrinks.
pub struct ConnectionPool {
    entries: Mutex<HashMap<EndpointKey, SharedConnection>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        ConnectionPool {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the registered connection for `key`, but only when pooling is
    /// enabled for the current request; otherwise the caller always builds a
    /// fresh connection.
    pub fn lookup(&self, key: &EndpointKey, pooling_enabled: bool) -> Option<SharedConnection> {
        if !pooling_enabled {
            return None;
        }
        let entries = self.entries.lock().expect("registry mutex poisoned");
        entries.get(key).cloned()
    }

    /// Inserts or replaces the entry for `key` unconditionally.
    pub fn register(&self, key: EndpointKey, connection: SharedConnection) {
        let mut entries = self.entries.lock().expect("registry mutex poisoned");
        entries.insert(key, connection);
    }

    /// Number of distinct endpoints currently registered.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("registry mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}
