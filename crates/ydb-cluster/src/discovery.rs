//! Endpoint discovery loop.
//!
//! One long-lived task per cluster. Each round asks whatever endpoint the
//! balancer currently likes for the authoritative endpoint list and
//! reconciles the registry with it. Rounds run at construction, then every
//! `discovery_interval` (±10% jitter), plus out of band when the registry
//! crosses its banned threshold or a caller forces a round.

use crate::cluster::Cluster;
use crate::context::Context;
use rand::Rng;
use std::sync::Weak;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub(crate) async fn run(cluster: Weak<Cluster>, cancel: CancellationToken) {
    loop {
        let Some(cluster) = cluster.upgrade() else {
            return;
        };

        let ctx = Context::background().with_timeout(cluster.config().request_timeout);
        tokio::select! {
            _ = cancel.cancelled() => return,
            result = cluster.discover_once(&ctx) => match result {
                Ok((added, removed)) => {
                    debug!(added, removed, "discovery round finished");
                }
                Err(err) => {
                    warn!(error = %err, "discovery round failed");
                }
            },
        }

        let interval = jittered(cluster.config().discovery_interval);
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
            _ = cluster.registry().discovery_requested() => {
                debug!("out-of-band discovery requested");
            }
        }
    }
}

fn jittered(interval: Duration) -> Duration {
    interval.mul_f64(rand::thread_rng().gen_range(0.9..1.1))
}
