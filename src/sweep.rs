//! Optional proactive recovery sweep.
//!
//! The core never needs a timer: OPEN -> HALF_OPEN is evaluated lazily on
//! every state read. Deployments that want circuits to start probing before
//! the next caller shows up can spawn this loop; it applies exactly the same
//! transition, so observable outcomes do not change.

use crate::registry::GuardRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Periodically applies the recovery check across all circuits until the
/// returned handle is aborted or the registry is dropped by the caller.
pub fn spawn_recovery_sweep(registry: Arc<GuardRegistry>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let transitioned = registry.sweep_recovery();
            if transitioned > 0 {
                tracing::debug!(transitioned, "recovery sweep moved circuits to half-open");
            }
        }
    })
}
