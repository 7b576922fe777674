use nalgebra::Vector2;
use tracing::{debug, info};

use crate::gesture::{GestureDetector, GestureDirection, GestureEngine, GestureState};
use crate::provider::ControllerProvider;
use crate::state::{derive_edges, Button, ControllerSnapshot};

/// Per-frame polling entry point over a controller provider.
///
/// Owns the long-lived current and previous snapshots; the host render loop
/// calls [`ControllerInput::poll`] exactly once per rendered frame, then
/// reads through the accessors. Construct one instance per controller and
/// pass it to consumers by reference; nothing here is process-global.
pub struct ControllerInput {
    provider: Box<dyn ControllerProvider>,
    current: ControllerSnapshot,
    previous: ControllerSnapshot,
    gesture: GestureEngine,
    frame: u64,
}

impl ControllerInput {
    pub fn new(provider: Box<dyn ControllerProvider>) -> Self {
        Self::with_engine(provider, GestureEngine::with_default_detector())
    }

    /// Builds the facade with a custom gesture engine (or one without a
    /// detector, which disables gesture recognition).
    pub fn with_engine(provider: Box<dyn ControllerProvider>, gesture: GestureEngine) -> Self {
        Self {
            provider,
            current: ControllerSnapshot::default(),
            previous: ControllerSnapshot::default(),
            gesture,
            frame: 0,
        }
    }

    pub fn with_gesture_detector(
        provider: Box<dyn ControllerProvider>,
        detector: Box<dyn GestureDetector>,
    ) -> Self {
        Self::with_engine(provider, GestureEngine::new(Some(detector)))
    }

    /// Advances one frame: rotates the snapshots, ingests fresh samples,
    /// and derives the edge-triggered fields from the level deltas.
    /// Completes synchronously; the only blocking is the provider's short
    /// sample-buffer critical section.
    pub fn poll(&mut self) {
        self.previous.copy_from(&self.current);
        self.current.clear_transient();

        self.provider.read_state(&mut self.current);

        // Edges are always derived here, never sampled from hardware: some
        // providers only deliver level state.
        let (down, up) = derive_edges(self.previous.buttons_held, self.current.buttons_held);
        self.current.buttons_down = down;
        self.current.buttons_up = up;
        self.current.touch_down = !self.previous.is_touching && self.current.is_touching;
        self.current.touch_up = self.previous.is_touching && !self.current.is_touching;

        if self.current.connection_state != self.previous.connection_state {
            info!(
                "{} (was {:?})",
                self.current.connection_state, self.previous.connection_state
            );
        }

        if !self.gesture.update(&self.current) && self.frame == 0 {
            debug!("Gesture engine inactive: no detector installed");
        }
        self.frame += 1;
    }

    /// Immutable view of the snapshot published by the last poll.
    pub fn snapshot(&self) -> &ControllerSnapshot {
        &self.current
    }

    /// Copies the published snapshot into a caller-owned buffer, for
    /// consumers that keep state across frames.
    pub fn read_snapshot(&self, out: &mut ControllerSnapshot) {
        out.copy_from(&self.current);
    }

    /// Host application moved to the background; the provider may release
    /// exclusive hardware handles.
    pub fn notify_pause(&mut self) {
        info!("Application paused, notifying provider");
        self.provider.on_pause();
    }

    pub fn notify_resume(&mut self) {
        info!("Application resumed, notifying provider");
        self.provider.on_resume();
    }

    pub fn request_recenter(&mut self) {
        self.provider.request_recenter();
    }

    pub fn supports_battery_status(&self) -> bool {
        self.provider.supports_battery_status()
    }

    pub fn gesture_state(&self) -> GestureState {
        self.gesture.state()
    }

    pub fn swipe_detected(&self) -> bool {
        self.gesture.swipe_detected()
    }

    pub fn gesture_direction(&self) -> GestureDirection {
        self.gesture.direction()
    }

    pub fn gesture_displacement(&self) -> Vector2<f32> {
        self.gesture.displacement()
    }

    pub fn gesture_velocity(&self) -> Vector2<f32> {
        self.gesture.velocity()
    }

    pub fn long_press_button(&self) -> Option<Button> {
        self.gesture.long_press_button()
    }
}
