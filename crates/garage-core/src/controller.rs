//! Door controller
//!
//! Owns the process-wide control state (close mode, the rate limiter
//! timestamp and the last state handed to the bus) behind a single mutex,
//! and is the only path from a command to the [`Actuator`].
//!
//! Door state itself is never stored: every query samples the sensors again.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::actuator::Actuator;
use crate::door::{CoverCommand, DoorPins, DoorState, DoorTiming};
use crate::gpio::{Gpio, GpioError};
use crate::sensor::SensorReader;

/// Default channel capacity for controller events
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Where a toggle request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleSource {
    /// `POST /toggle`
    Http,
    /// Cover command received over the bus
    Cover(CoverCommand),
    /// The close-mode enforcement loop
    Enforcement,
}

impl ToggleSource {
    /// Whether close mode rejects this request
    ///
    /// HTTP toggles are always rejected, bus OPEN/CLOSE are rejected, bus STOP
    /// passes through.
    pub fn is_gated_by_close_mode(&self) -> bool {
        match self {
            ToggleSource::Http => true,
            ToggleSource::Cover(command) => command.is_ambiguous(),
            ToggleSource::Enforcement => false,
        }
    }
}

impl fmt::Display for ToggleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToggleSource::Http => f.write_str("http"),
            ToggleSource::Cover(CoverCommand::Open) => f.write_str("bus:OPEN"),
            ToggleSource::Cover(CoverCommand::Close) => f.write_str("bus:CLOSE"),
            ToggleSource::Cover(CoverCommand::Stop) => f.write_str("bus:STOP"),
            ToggleSource::Enforcement => f.write_str("enforcement"),
        }
    }
}

/// What an accepted toggle request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// A pulse was issued
    Pulsed,
    /// Inside the minimum toggle gap; nothing happened
    Suppressed,
}

/// Errors from [`DoorController::request_toggle`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToggleError {
    #[error("Close Mode is enabled")]
    CloseModeActive,

    #[error("failed to pulse trigger: {0}")]
    Actuator(#[from] GpioError),
}

/// Result type for toggle requests
pub type ToggleResult = Result<ToggleOutcome, ToggleError>;

/// Notifications for observers that mirror controller state elsewhere
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// Close mode was set (sent even when the value did not change)
    CloseModeChanged(bool),
}

/// Door state and close mode as seen at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DoorSnapshot {
    pub status: DoorState,
    pub close_mode: bool,
}

#[derive(Debug, Default)]
struct ControlState {
    close_mode: bool,
    last_toggle: Option<Instant>,
    last_published: Option<DoorState>,
}

/// The door state machine
pub struct DoorController {
    gpio: Arc<dyn Gpio>,
    sensors: SensorReader,
    actuator: Actuator,
    min_toggle_gap: Duration,
    state: Mutex<ControlState>,
    events: broadcast::Sender<ControllerEvent>,
}

impl DoorController {
    /// Create a controller for one door wired to `pins`
    pub fn new(gpio: Arc<dyn Gpio>, pins: DoorPins, timing: DoorTiming) -> Self {
        let sensors = SensorReader::new(gpio.clone(), pins.sensor_open, pins.sensor_closed);
        let actuator = Actuator::new(gpio.clone(), pins.trigger, timing.trigger_pulse);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            gpio,
            sensors,
            actuator,
            min_toggle_gap: timing.min_toggle_gap,
            state: Mutex::new(ControlState::default()),
            events,
        }
    }

    /// Subscribe to controller events
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Current door state, freshly sampled
    pub fn status(&self) -> DoorState {
        self.sensors.read().state()
    }

    pub async fn close_mode(&self) -> bool {
        self.state.lock().await.close_mode
    }

    pub async fn snapshot(&self) -> DoorSnapshot {
        let close_mode = self.close_mode().await;
        DoorSnapshot {
            status: self.status(),
            close_mode,
        }
    }

    /// Set close mode unconditionally, returning the value stored
    pub async fn set_close_mode(&self, enabled: bool) -> bool {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut state.close_mode, enabled);
        info!(enabled, previous, "Close mode set");
        // Sent under the lock so observers see changes in the order they happened
        let _ = self.events.send(ControllerEvent::CloseModeChanged(enabled));
        state.close_mode
    }

    /// Ask for one trigger pulse
    ///
    /// The close-mode check, the rate-limit check and the timestamp update
    /// happen as one step under the lock. The pulse itself runs after the
    /// lock is released so status queries and publishers are not held up
    /// for the pulse duration. A request inside the minimum gap is a silent
    /// no-op and does not move the window.
    #[instrument(skip_all, fields(source = %source))]
    pub async fn request_toggle(&self, source: ToggleSource) -> ToggleResult {
        {
            let mut state = self.state.lock().await;

            if source == ToggleSource::Enforcement && !state.close_mode {
                debug!("Close mode cleared before enforcement ran");
                return Ok(ToggleOutcome::Suppressed);
            }
            if state.close_mode && source.is_gated_by_close_mode() {
                info!("Toggle rejected, close mode is enabled");
                return Err(ToggleError::CloseModeActive);
            }

            let now = Instant::now();
            if let Some(last) = state.last_toggle {
                let elapsed = now.saturating_duration_since(last);
                if elapsed < self.min_toggle_gap {
                    debug!(?elapsed, "Toggle suppressed by rate limiter");
                    return Ok(ToggleOutcome::Suppressed);
                }
            }
            state.last_toggle = Some(now);
        }

        info!(pin = self.actuator.pin(), "Pulsing trigger");
        self.actuator.pulse().await?;

        Ok(ToggleOutcome::Pulsed)
    }

    /// One pass of close-mode enforcement
    ///
    /// Returns `Ok(None)` when there is nothing to do, otherwise the result
    /// of a rate-limited toggle.
    pub async fn enforce_close_mode(&self) -> Result<Option<ToggleOutcome>, ToggleError> {
        if !self.close_mode().await {
            return Ok(None);
        }
        let status = self.status();
        if status != DoorState::Open {
            return Ok(None);
        }

        info!("Door open while close mode is enabled, re-closing");
        self.request_toggle(ToggleSource::Enforcement).await.map(Some)
    }

    /// Compare the current state with the last one handed to the bus
    ///
    /// Returns the state to publish when it differs, or when `force` is set.
    /// The comparison and the update are atomic.
    pub async fn observe_state(&self, force: bool) -> Option<DoorState> {
        let current = self.status();
        let mut state = self.state.lock().await;
        if force || state.last_published != Some(current) {
            state.last_published = Some(current);
            Some(current)
        } else {
            None
        }
    }

    /// Drive every output low and free the lines
    pub fn release(&self) {
        self.gpio.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::SimulatedGpio;
    use tokio_test::{assert_err, assert_ok};

    const TRIGGER: u8 = 4;
    const OPEN: u8 = 14;
    const CLOSED: u8 = 16;

    fn make_controller() -> (Arc<SimulatedGpio>, DoorController) {
        let gpio = Arc::new(SimulatedGpio::new());
        let controller = DoorController::new(gpio.clone(), DoorPins::default(), DoorTiming::default());
        (gpio, controller)
    }

    fn set_door(gpio: &SimulatedGpio, open: bool, closed: bool) {
        gpio.set_input(OPEN, open);
        gpio.set_input(CLOSED, closed);
    }

    #[test]
    fn test_status_is_pure_projection() {
        let (gpio, controller) = make_controller();
        for (open, closed, expected) in [
            (true, false, DoorState::Open),
            (false, true, DoorState::Closed),
            (false, false, DoorState::Moving),
            (true, true, DoorState::Unknown),
        ] {
            set_door(&gpio, open, closed);
            assert_eq!(controller.status(), expected);
            assert_eq!(controller.status(), expected);
        }
        assert_eq!(gpio.pulse_count(TRIGGER), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_from_closed() {
        let (gpio, controller) = make_controller();
        set_door(&gpio, false, true);
        assert_eq!(controller.status(), DoorState::Closed);

        let outcome = assert_ok!(controller.request_toggle(ToggleSource::Http).await);
        assert_eq!(outcome, ToggleOutcome::Pulsed);
        assert_eq!(gpio.pulse_count(TRIGGER), 1);
        assert!(!gpio.level(TRIGGER));

        set_door(&gpio, false, false);
        assert_eq!(controller.status(), DoorState::Moving);
        set_door(&gpio, true, false);
        assert_eq!(controller.status(), DoorState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_single_pulse() {
        let (gpio, controller) = make_controller();

        let first = controller.request_toggle(ToggleSource::Http).await;
        let second = controller.request_toggle(ToggleSource::Http).await;

        assert_eq!(first, Ok(ToggleOutcome::Pulsed));
        assert_eq!(second, Ok(ToggleOutcome::Suppressed));
        assert_eq!(gpio.pulse_count(TRIGGER), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_pulse_once() {
        let (gpio, controller) = make_controller();

        let (a, b) = tokio::join!(
            controller.request_toggle(ToggleSource::Http),
            controller.request_toggle(ToggleSource::Cover(CoverCommand::Stop)),
        );

        let mut outcomes = vec![assert_ok!(a), assert_ok!(b)];
        outcomes.sort_by_key(|o| *o == ToggleOutcome::Suppressed);
        assert_eq!(outcomes, vec![ToggleOutcome::Pulsed, ToggleOutcome::Suppressed]);
        assert_eq!(gpio.pulse_count(TRIGGER), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppressed_request_does_not_extend_window() {
        let (gpio, controller) = make_controller();

        // Pulse at t=0 finishes at t=0.5
        controller.request_toggle(ToggleSource::Http).await.unwrap();

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(
            controller.request_toggle(ToggleSource::Http).await,
            Ok(ToggleOutcome::Suppressed)
        );

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(
            controller.request_toggle(ToggleSource::Http).await,
            Ok(ToggleOutcome::Pulsed)
        );
        assert_eq!(gpio.pulse_count(TRIGGER), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_mode_gating() {
        let (gpio, controller) = make_controller();
        set_door(&gpio, true, false);
        controller.set_close_mode(true).await;

        let err = assert_err!(controller.request_toggle(ToggleSource::Http).await);
        assert_eq!(err, ToggleError::CloseModeActive);
        assert_err!(
            controller
                .request_toggle(ToggleSource::Cover(CoverCommand::Open))
                .await
        );
        assert_err!(
            controller
                .request_toggle(ToggleSource::Cover(CoverCommand::Close))
                .await
        );
        assert_eq!(gpio.pulse_count(TRIGGER), 0);

        // STOP bypasses close mode
        assert_eq!(
            controller
                .request_toggle(ToggleSource::Cover(CoverCommand::Stop))
                .await,
            Ok(ToggleOutcome::Pulsed)
        );
        assert_eq!(gpio.pulse_count(TRIGGER), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_request_does_not_touch_rate_limiter() {
        let (_gpio, controller) = make_controller();
        controller.set_close_mode(true).await;
        assert_err!(controller.request_toggle(ToggleSource::Http).await);

        controller.set_close_mode(false).await;
        assert_eq!(
            controller.request_toggle(ToggleSource::Http).await,
            Ok(ToggleOutcome::Pulsed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_enforcement_recloses_open_door() {
        let (gpio, controller) = make_controller();
        set_door(&gpio, true, false);

        // Nothing to do without close mode
        assert_eq!(controller.enforce_close_mode().await, Ok(None));

        controller.set_close_mode(true).await;
        assert_eq!(
            controller.enforce_close_mode().await,
            Ok(Some(ToggleOutcome::Pulsed))
        );
        assert_eq!(gpio.pulse_count(TRIGGER), 1);

        // Next tick inside the gap is rate limited, the one after fires again
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(
            controller.enforce_close_mode().await,
            Ok(Some(ToggleOutcome::Suppressed))
        );
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(
            controller.enforce_close_mode().await,
            Ok(Some(ToggleOutcome::Pulsed))
        );

        set_door(&gpio, false, true);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(controller.enforce_close_mode().await, Ok(None));
        assert_eq!(gpio.pulse_count(TRIGGER), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enforcement_respects_recent_manual_toggle() {
        let (gpio, controller) = make_controller();
        controller
            .request_toggle(ToggleSource::Cover(CoverCommand::Stop))
            .await
            .unwrap();

        set_door(&gpio, true, false);
        controller.set_close_mode(true).await;
        assert_eq!(
            controller.enforce_close_mode().await,
            Ok(Some(ToggleOutcome::Suppressed))
        );
        assert_eq!(gpio.pulse_count(TRIGGER), 1);
    }

    #[tokio::test]
    async fn test_observe_state_change_only() {
        let (gpio, controller) = make_controller();
        set_door(&gpio, false, true);

        assert_eq!(controller.observe_state(false).await, Some(DoorState::Closed));
        assert_eq!(controller.observe_state(false).await, None);
        assert_eq!(controller.observe_state(false).await, None);

        set_door(&gpio, false, false);
        assert_eq!(controller.observe_state(false).await, Some(DoorState::Moving));
        assert_eq!(controller.observe_state(false).await, None);

        // Forced republish ignores the comparison
        assert_eq!(controller.observe_state(true).await, Some(DoorState::Moving));
        assert_eq!(controller.observe_state(false).await, None);
    }

    #[tokio::test]
    async fn test_status_does_not_disturb_observation() {
        let (gpio, controller) = make_controller();
        set_door(&gpio, true, false);
        assert!(controller.observe_state(false).await.is_some());

        for _ in 0..10 {
            assert_eq!(controller.status(), DoorState::Open);
        }
        assert_eq!(controller.observe_state(false).await, None);
    }

    #[tokio::test]
    async fn test_close_mode_events() {
        let (_gpio, controller) = make_controller();
        let mut rx = controller.subscribe();

        controller.set_close_mode(true).await;
        controller.set_close_mode(true).await;
        controller.set_close_mode(false).await;

        assert_eq!(rx.recv().await.unwrap(), ControllerEvent::CloseModeChanged(true));
        assert_eq!(rx.recv().await.unwrap(), ControllerEvent::CloseModeChanged(true));
        assert_eq!(rx.recv().await.unwrap(), ControllerEvent::CloseModeChanged(false));

        let snapshot = controller.snapshot().await;
        assert!(!snapshot.close_mode);
    }

    #[tokio::test]
    async fn test_set_close_mode_returns_stored_value() {
        let (_gpio, controller) = make_controller();
        assert!(controller.set_close_mode(true).await);
        assert!(!controller.set_close_mode(false).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_released_while_pulsing() {
        let (gpio, controller) = make_controller();
        let controller = Arc::new(controller);

        let pulsing = tokio::spawn({
            let controller = controller.clone();
            async move { controller.request_toggle(ToggleSource::Http).await }
        });
        while !gpio.level(TRIGGER) {
            tokio::task::yield_now().await;
        }

        // Both calls must finish well before the 500ms pulse does
        let snapshot = assert_ok!(
            tokio::time::timeout(Duration::from_millis(10), controller.snapshot()).await
        );
        assert_eq!(snapshot.status, DoorState::Moving);
        let second = assert_ok!(
            tokio::time::timeout(
                Duration::from_millis(10),
                controller.request_toggle(ToggleSource::Http)
            )
            .await
        );
        assert_eq!(second, Ok(ToggleOutcome::Suppressed));
        assert!(gpio.level(TRIGGER));

        assert_eq!(assert_ok!(pulsing.await), Ok(ToggleOutcome::Pulsed));
        assert!(!gpio.level(TRIGGER));
        assert_eq!(gpio.pulse_count(TRIGGER), 1);
    }

    #[test]
    fn test_release_is_idempotent() {
        let (gpio, controller) = make_controller();
        controller.release();
        controller.release();
        assert!(gpio.is_released());
    }
}
