//! Background loops
//!
//! Both loops tick on a fixed interval until the shutdown channel fires.
//! A failing iteration is logged with its counter and the loop carries on;
//! the next tick is the retry.

use garage_core::{DoorController, ToggleOutcome};
use garage_mqtt::BusBridge;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Re-close the door whenever close mode is on and the door reads open
///
/// Goes through the rate-limited toggle path, so a pulse issued by anyone
/// inside the toggle gap delays enforcement to a later tick.
pub fn spawn_enforcement_loop(
    controller: Arc<DoorController>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut iteration: u64 = 0;
        info!(?period, "Enforcement loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    iteration += 1;
                    match controller.enforce_close_mode().await {
                        Ok(Some(ToggleOutcome::Pulsed)) => {
                            info!(iteration, "Enforcement pulsed trigger");
                        }
                        Ok(Some(ToggleOutcome::Suppressed)) => {
                            debug!(iteration, "Enforcement deferred by rate limiter");
                        }
                        Ok(None) => trace!(iteration, "Nothing to enforce"),
                        Err(e) => {
                            warn!(task = "enforce_close", iteration, "Iteration failed: {}", e);
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Enforcement loop stopped");
                    break;
                }
            }
        }
    })
}

/// Push the door state to the bus whenever it changes
pub fn spawn_state_publish_loop(
    bridge: Arc<BusBridge>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut iteration: u64 = 0;
        info!(?period, "State publish loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    iteration += 1;
                    match bridge.publish_state(false).await {
                        Ok(Some(state)) => debug!(iteration, %state, "Door state published"),
                        Ok(None) => {}
                        Err(e) => {
                            warn!(task = "state_publish", iteration, "Iteration failed: {}", e);
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("State publish loop stopped");
                    break;
                }
            }
        }
    })
}
