//! Endpoint selection.
//!
//! Strategy: weighted random over Online endpoints with weight
//! `1 / (1 + load_factor)`, so a node reporting twice the load receives
//! roughly half the traffic. (The two-choice alternative was rejected to
//! keep selection stateless across pickers.) Banned endpoints rejoin the
//! candidate set once their ban outlives the cooldown; when nothing is
//! pickable the balancer falls back to the least-recently-banned endpoint
//! rather than failing the RPC outright.

use crate::endpoint::{EndpointRecord, EndpointState};
use rand::Rng;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct Balancer {
    ban_cooldown: Duration,
}

impl Balancer {
    pub fn new(ban_cooldown: Duration) -> Self {
        Balancer { ban_cooldown }
    }

    /// Selects one endpoint from the snapshot, or `None` when the registry
    /// holds nothing usable at all.
    pub fn pick<'a>(&self, snapshot: &'a [EndpointRecord]) -> Option<&'a EndpointRecord> {
        let candidates: Vec<&EndpointRecord> = snapshot
            .iter()
            .filter(|e| match e.state {
                EndpointState::Online => true,
                EndpointState::Banned => e.since.elapsed() >= self.ban_cooldown,
                _ => false,
            })
            .collect();

        if let Some(picked) = weighted_pick(&candidates) {
            return Some(picked);
        }

        // Nothing healthy: prefer the endpoint banned the longest ago, it
        // has had the most time to recover.
        let fallback = snapshot
            .iter()
            .filter(|e| e.state == EndpointState::Banned)
            .min_by_key(|e| e.since);
        if let Some(endpoint) = fallback {
            warn!(
                endpoint = %endpoint.addr,
                "no healthy endpoints, falling back to a banned one"
            );
        }
        fallback
    }
}

fn weighted_pick<'a>(candidates: &[&'a EndpointRecord]) -> Option<&'a EndpointRecord> {
    match candidates {
        [] => None,
        [single] => Some(single),
        _ => {
            let weights: Vec<f64> = candidates
                .iter()
                .map(|e| 1.0 / (1.0 + f64::from(e.load_factor.max(0.0))))
                .collect();
            let total: f64 = weights.iter().sum();
            let mut x = rand::thread_rng().gen_range(0.0..total);
            for (endpoint, weight) in candidates.iter().zip(&weights) {
                if x < *weight {
                    return Some(endpoint);
                }
                x -= weight;
            }
            candidates.last().copied()
        }
    }
}
