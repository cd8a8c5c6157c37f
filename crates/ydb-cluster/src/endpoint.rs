//! Endpoint registry.
//!
//! Tracks every known cluster node with its health state and server-reported
//! load. Reads (`snapshot`) take the read lock and are wait-free for
//! concurrent pickers; writes are confined to discovery reconciliation,
//! pessimization and cluster shutdown.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info};

/// Lifecycle of an endpoint.
///
/// `Created → Online → {Banned ↔ Online, Offline} → Destroyed`; nothing
/// leaves `Destroyed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Created,
    Online,
    Banned,
    Offline,
    Destroyed,
}

impl EndpointState {
    /// Only these states are observable between construction and shutdown.
    pub fn is_valid(self) -> bool {
        matches!(
            self,
            EndpointState::Online | EndpointState::Banned | EndpointState::Offline
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EndpointState::Created => "created",
            EndpointState::Online => "online",
            EndpointState::Banned => "banned",
            EndpointState::Offline => "offline",
            EndpointState::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one endpoint, as handed to the balancer.
#[derive(Debug, Clone)]
pub struct EndpointRecord {
    pub addr: String,
    pub load_factor: f32,
    pub state: EndpointState,
    /// When the endpoint entered its current state.
    pub since: Instant,
}

struct Entry {
    load_factor: f32,
    state: EndpointState,
    since: Instant,
}

/// Ratio of banned endpoints above which discovery is nudged out of band.
const BANNED_DISCOVERY_RATIO: f64 = 0.5;

pub struct Registry {
    inner: RwLock<HashMap<String, Entry>>,
    discovery_trigger: Notify,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            inner: RwLock::new(HashMap::new()),
            discovery_trigger: Notify::new(),
        }
    }

    /// Adds an endpoint (Online) or refreshes the load score of a known one.
    pub fn add(&self, addr: &str, load_factor: f32) {
        let mut inner = self.inner.write().unwrap();
        match inner.get_mut(addr) {
            Some(entry) if entry.state != EndpointState::Destroyed => {
                entry.load_factor = load_factor;
            }
            _ => {
                debug!(endpoint = addr, load_factor, "endpoint added");
                inner.insert(
                    addr.to_string(),
                    Entry {
                        load_factor,
                        state: EndpointState::Online,
                        since: Instant::now(),
                    },
                );
            }
        }
    }

    /// Removes an endpoint entirely. Returns whether it was known.
    pub fn remove(&self, addr: &str) -> bool {
        let removed = self.inner.write().unwrap().remove(addr).is_some();
        if removed {
            debug!(endpoint = addr, "endpoint removed");
        }
        removed
    }

    /// Bans an endpoint. Fires the discovery trigger when more than half of
    /// the registry is banned. Returns whether the state changed.
    pub fn pessimize(&self, addr: &str) -> bool {
        let (changed, banned, total) = {
            let mut inner = self.inner.write().unwrap();
            let changed = match inner.get_mut(addr) {
                Some(entry) if entry.state == EndpointState::Online => {
                    entry.state = EndpointState::Banned;
                    entry.since = Instant::now();
                    true
                }
                _ => false,
            };
            let banned = inner
                .values()
                .filter(|e| e.state == EndpointState::Banned)
                .count();
            (changed, banned, inner.len())
        };
        if changed {
            info!(endpoint = addr, banned, total, "endpoint pessimized");
            if total > 0 && banned as f64 / total as f64 > BANNED_DISCOVERY_RATIO {
                self.discovery_trigger.notify_one();
            }
        }
        changed
    }

    /// Brings a banned or offline endpoint back online.
    pub fn admit(&self, addr: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        match inner.get_mut(addr) {
            Some(entry)
                if matches!(
                    entry.state,
                    EndpointState::Banned | EndpointState::Offline
                ) =>
            {
                entry.state = EndpointState::Online;
                entry.since = Instant::now();
                info!(endpoint = addr, "endpoint admitted");
                true
            }
            _ => false,
        }
    }

    /// Marks every endpoint Destroyed. Part of cluster shutdown; the
    /// per-connection close runs after this under the documented lock order.
    pub fn destroy_all(&self) {
        let mut inner = self.inner.write().unwrap();
        let now = Instant::now();
        for entry in inner.values_mut() {
            entry.state = EndpointState::Destroyed;
            entry.since = now;
        }
    }

    pub fn snapshot(&self) -> Vec<EndpointRecord> {
        self.inner
            .read()
            .unwrap()
            .iter()
            .map(|(addr, entry)| EndpointRecord {
                addr: addr.clone(),
                load_factor: entry.load_factor,
                state: entry.state,
                since: entry.since,
            })
            .collect()
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.inner.read().unwrap().contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }

    /// Resolves the next time someone asks for an out-of-band discovery
    /// round (pessimization threshold or an explicit force).
    pub async fn discovery_requested(&self) {
        self.discovery_trigger.notified().await;
    }

    /// Explicit out-of-band discovery request.
    pub fn request_discovery(&self) {
        self.discovery_trigger.notify_one();
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_validity() {
        assert!(EndpointState::Online.is_valid());
        assert!(EndpointState::Banned.is_valid());
        assert!(EndpointState::Offline.is_valid());
        assert!(!EndpointState::Created.is_valid());
        assert!(!EndpointState::Destroyed.is_valid());
    }

    #[test]
    fn test_add_and_snapshot() {
        let registry = Registry::new();
        registry.add("a:2135", 0.5);
        registry.add("b:2135", 2.0);
        let mut snapshot = registry.snapshot();
        snapshot.sort_by(|x, y| x.addr.cmp(&y.addr));
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].state, EndpointState::Online);
        assert_eq!(snapshot[1].load_factor, 2.0);
    }

    #[test]
    fn test_add_existing_refreshes_load_only() {
        let registry = Registry::new();
        registry.add("a:2135", 0.0);
        registry.pessimize("a:2135");
        registry.add("a:2135", 3.0);
        let snapshot = registry.snapshot();
        // still banned, load refreshed
        assert_eq!(snapshot[0].state, EndpointState::Banned);
        assert_eq!(snapshot[0].load_factor, 3.0);
    }

    #[test]
    fn test_pessimize_and_admit() {
        let registry = Registry::new();
        registry.add("a:2135", 0.0);
        assert!(registry.pessimize("a:2135"));
        assert!(!registry.pessimize("a:2135"));
        assert!(registry.admit("a:2135"));
        assert!(!registry.admit("a:2135"));
        assert_eq!(registry.snapshot()[0].state, EndpointState::Online);
    }

    #[tokio::test]
    async fn test_banned_majority_triggers_discovery() {
        let registry = Registry::new();
        registry.add("a:2135", 0.0);
        registry.add("b:2135", 0.0);
        registry.add("c:2135", 0.0);

        registry.pessimize("a:2135");
        registry.pessimize("b:2135"); // 2/3 banned, above the threshold

        tokio::time::timeout(
            std::time::Duration::from_millis(100),
            registry.discovery_requested(),
        )
        .await
        .expect("discovery should have been requested");
    }

    #[test]
    fn test_remove() {
        let registry = Registry::new();
        registry.add("a:2135", 0.0);
        assert!(registry.remove("a:2135"));
        assert!(!registry.remove("a:2135"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_destroy_all_is_terminal() {
        let registry = Registry::new();
        registry.add("a:2135", 0.0);
        registry.destroy_all();
        assert_eq!(registry.snapshot()[0].state, EndpointState::Destroyed);
        assert!(!registry.admit("a:2135"));
        assert!(!registry.pessimize("a:2135"));
    }
}
