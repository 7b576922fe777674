use nalgebra::{Quaternion, UnitQuaternion, Vector2, Vector3};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::provider::ControllerProvider;
use crate::state::{
    ApiStatus, BatteryLevel, Button, ButtonMask, ConnectionState, ControllerSnapshot,
};
use crate::transport::protocol::{ButtonCode, RemoteEvent, TouchAction};
use crate::transport::{LinkConfig, LinkMode, LinkStatus, SocketHandle, TransportError};

// Raw samples accumulated by the socket thread between polls, together with
// the recenter bookkeeping that has to change atomically with them.
#[derive(Debug)]
struct RawSamples {
    link_status: LinkStatus,
    // Corrected orientation (yaw correction already applied).
    orientation: UnitQuaternion<f32>,
    // Last converted-but-uncorrected orientation, kept for recentering.
    last_raw_orientation: UnitQuaternion<f32>,
    yaw_correction: UnitQuaternion<f32>,
    initial_recenter_done: bool,
    gyro: Vector3<f32>,
    accel: Vector3<f32>,
    touch_pos: Vector2<f32>,
    is_touching: bool,
    buttons_held: ButtonMask,
    recentering: bool,
    // One-shot: consumed by the next poll.
    recentered: bool,
}

impl Default for RawSamples {
    fn default() -> Self {
        Self {
            link_status: LinkStatus::Disconnected,
            orientation: UnitQuaternion::identity(),
            last_raw_orientation: UnitQuaternion::identity(),
            yaw_correction: UnitQuaternion::identity(),
            initial_recenter_done: false,
            gyro: Vector3::zeros(),
            accel: Vector3::zeros(),
            touch_pos: Vector2::zeros(),
            is_touching: false,
            buttons_held: ButtonMask::EMPTY,
            recentering: false,
            recentered: false,
        }
    }
}

/// Shared raw-sample buffer between the socket thread and the per-frame
/// poll. One mutex over the whole record: the socket thread writes one
/// decoded event per acquisition, the poll copies everything out in one
/// acquisition, so related fields (orientation and the recenter flags in
/// particular) can never be observed torn.
#[derive(Clone, Debug)]
pub struct SampleBuffer {
    inner: Arc<Mutex<RawSamples>>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RawSamples::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RawSamples> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn set_link_status(&self, status: LinkStatus) {
        self.lock().link_status = status;
    }

    /// Ingests one decoded event from the socket thread. Held for the
    /// duration of a field copy only, never across I/O.
    pub(crate) fn apply(&self, event: &RemoteEvent) {
        let mut samples = self.lock();
        match event {
            RemoteEvent::Touch { action, x, y, .. } => {
                samples.touch_pos = Vector2::new(*x, *y);
                match action {
                    TouchAction::Down | TouchAction::Move => samples.is_touching = true,
                    TouchAction::Up => samples.is_touching = false,
                }
            }
            RemoteEvent::Orientation { x, y, z, w, .. } => {
                let raw = UnitQuaternion::new_normalize(convert_orientation(*x, *y, *z, *w));
                samples.last_raw_orientation = raw;
                if !samples.initial_recenter_done {
                    // The very first sample defines "forward".
                    recenter_locked(&mut samples);
                    samples.initial_recenter_done = true;
                }
                samples.orientation = samples.yaw_correction * raw;
            }
            RemoteEvent::Gyroscope { x, y, z, .. } => {
                samples.gyro = convert_gyro(*x, *y, *z);
            }
            RemoteEvent::Accelerometer { x, y, z, .. } => {
                samples.accel = convert_accel(*x, *y, *z);
            }
            RemoteEvent::Button { code, pressed, .. } => match code {
                ButtonCode::Click => samples.buttons_held.set(Button::TouchpadClick, *pressed),
                ButtonCode::App => samples.buttons_held.set(Button::App, *pressed),
                ButtonCode::VolumeUp => samples.buttons_held.set(Button::VolumeUp, *pressed),
                ButtonCode::VolumeDown => samples.buttons_held.set(Button::VolumeDown, *pressed),
                ButtonCode::Home => {
                    samples.buttons_held.set(Button::System, *pressed);
                    if *pressed {
                        // Recenter gesture started.
                        samples.recentering = true;
                    } else {
                        // Gesture finished: recenter on release.
                        recenter_locked(&mut samples);
                    }
                }
            },
        }
    }

    /// Explicit recenter request from the facade.
    pub fn recenter(&self) {
        let mut samples = self.lock();
        recenter_locked(&mut samples);
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// Captures the current yaw as the new "forward" reference. Runs under the
// ingestion lock so the yaw correction can never disagree with the raw
// orientation it was computed from.
fn recenter_locked(samples: &mut RawSamples) {
    let yaw = yaw_of(&samples.last_raw_orientation);
    samples.yaw_correction = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), -yaw);
    samples.orientation = UnitQuaternion::identity();
    samples.recentering = false;
    samples.recentered = true;
}

// Heading about the Y (up) axis: the angle of the rotated forward axis
// projected onto the XZ plane.
fn yaw_of(q: &UnitQuaternion<f32>) -> f32 {
    let c = q.coords;
    (2.0 * (c.x * c.z + c.w * c.y)).atan2(1.0 - 2.0 * (c.x * c.x + c.y * c.y))
}

// Fixed conversion contract from the emulator's right-handed coordinate
// space to the consumer's Y-up convention. Downstream code depends on these
// exact sign mappings.

fn convert_orientation(x: f32, y: f32, z: f32, w: f32) -> Quaternion<f32> {
    // (x, y, z, w) -> (x, -z, y, w); Quaternion::new takes the scalar first.
    Quaternion::new(w, x, -z, y)
}

fn convert_gyro(x: f32, y: f32, z: f32) -> Vector3<f32> {
    Vector3::new(-x, -z, -y)
}

fn convert_accel(x: f32, y: f32, z: f32) -> Vector3<f32> {
    Vector3::new(x, z, y)
}

/// Provider backed by the desktop controller emulator. Owns the shared
/// sample buffer and the socket thread reading into it.
pub struct EmulatorProvider {
    buffer: SampleBuffer,
    socket: Option<SocketHandle>,
}

impl EmulatorProvider {
    pub fn new(link_config: LinkConfig) -> Result<Self, TransportError> {
        let buffer = SampleBuffer::new();
        let socket = if link_config.mode == LinkMode::Off {
            debug!("Emulator link mode is Off, not starting the socket thread");
            None
        } else {
            Some(SocketHandle::spawn(link_config, buffer.clone())?)
        };
        info!("Emulator provider created");
        Ok(Self { buffer, socket })
    }
}

impl ControllerProvider for EmulatorProvider {
    fn read_state(&mut self, out: &mut ControllerSnapshot) {
        let mut samples = self.buffer.lock();

        out.connection_state = match samples.link_status {
            LinkStatus::Connected => ConnectionState::Connected,
            LinkStatus::Connecting => ConnectionState::Connecting,
            LinkStatus::Disconnected => ConnectionState::Disconnected,
        };
        out.api_status = if samples.link_status == LinkStatus::Connected {
            ApiStatus::Ok
        } else {
            ApiStatus::Unavailable
        };

        out.orientation = samples.orientation;
        // The emulated controller is 3-DoF.
        out.position = None;
        out.gyro = samples.gyro;
        out.accel = samples.accel;
        out.touch_pos = samples.touch_pos;
        out.is_touching = samples.is_touching;
        out.buttons_held = samples.buttons_held;
        out.recentering = samples.recentering;
        out.recentered = std::mem::take(&mut samples.recentered);

        // The emulated controller always reports a full battery.
        out.is_charging = false;
        out.battery_level = BatteryLevel::Full;
        out.error_details.clear();
    }

    fn on_pause(&mut self) {
        // The socket keeps running while the host is backgrounded.
    }

    fn on_resume(&mut self) {}

    fn request_recenter(&mut self) {
        debug!("Explicit recenter requested");
        self.buffer.recenter();
    }

    fn supports_battery_status(&self) -> bool {
        true
    }
}

impl Drop for EmulatorProvider {
    fn drop(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            socket.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_without_socket() -> EmulatorProvider {
        let config = LinkConfig {
            mode: LinkMode::Off,
            ..Default::default()
        };
        EmulatorProvider::new(config).expect("offline provider")
    }

    // Emulator-space orientation event whose converted value is a pure yaw
    // rotation about the consumer's up axis.
    fn yaw_event(degrees: f32) -> RemoteEvent {
        let half = (degrees.to_radians()) / 2.0;
        RemoteEvent::Orientation {
            x: 0.0,
            y: 0.0,
            z: -half.sin(),
            w: half.cos(),
            timestamp_ms: 0,
        }
    }

    fn home_event(pressed: bool) -> RemoteEvent {
        RemoteEvent::Button {
            code: ButtonCode::Home,
            pressed,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn orientation_conversion_matches_the_contract() {
        let q = convert_orientation(0.1, 0.2, 0.3, 0.9);
        // (x, y, z, w) -> (x, -z, y, w)
        assert_eq!(q.coords.x, 0.1);
        assert_eq!(q.coords.y, -0.3);
        assert_eq!(q.coords.z, 0.2);
        assert_eq!(q.coords.w, 0.9);
    }

    #[test]
    fn gyro_conversion_matches_the_contract() {
        assert_eq!(convert_gyro(1.0, 2.0, 3.0), Vector3::new(-1.0, -3.0, -2.0));
    }

    #[test]
    fn accel_conversion_matches_the_contract() {
        assert_eq!(convert_accel(1.0, 2.0, 3.0), Vector3::new(1.0, 3.0, 2.0));
    }

    #[test]
    fn touch_events_update_level_state() {
        let mut provider = provider_without_socket();
        let mut snapshot = ControllerSnapshot::default();

        provider.buffer.apply(&RemoteEvent::Touch {
            action: TouchAction::Down,
            x: 0.3,
            y: 0.6,
            timestamp_ms: 1,
        });
        provider.read_state(&mut snapshot);
        assert!(snapshot.is_touching);
        assert_eq!(snapshot.touch_pos, Vector2::new(0.3, 0.6));

        provider.buffer.apply(&RemoteEvent::Touch {
            action: TouchAction::Up,
            x: 0.4,
            y: 0.6,
            timestamp_ms: 2,
        });
        provider.read_state(&mut snapshot);
        assert!(!snapshot.is_touching);
        assert_eq!(snapshot.touch_pos, Vector2::new(0.4, 0.6));
    }

    #[test]
    fn button_events_update_the_held_mask() {
        let mut provider = provider_without_socket();
        let mut snapshot = ControllerSnapshot::default();

        provider.buffer.apply(&RemoteEvent::Button {
            code: ButtonCode::Click,
            pressed: true,
            timestamp_ms: 1,
        });
        provider.buffer.apply(&RemoteEvent::Button {
            code: ButtonCode::VolumeUp,
            pressed: true,
            timestamp_ms: 2,
        });
        provider.read_state(&mut snapshot);
        assert!(snapshot.buttons_held.contains(Button::TouchpadClick));
        assert!(snapshot.buttons_held.contains(Button::VolumeUp));

        provider.buffer.apply(&RemoteEvent::Button {
            code: ButtonCode::Click,
            pressed: false,
            timestamp_ms: 3,
        });
        provider.read_state(&mut snapshot);
        assert!(!snapshot.buttons_held.contains(Button::TouchpadClick));
    }

    #[test]
    fn first_orientation_sample_recenters_implicitly() {
        let mut provider = provider_without_socket();
        let mut snapshot = ControllerSnapshot::default();

        provider.buffer.apply(&yaw_event(37.0));
        provider.read_state(&mut snapshot);

        assert!(snapshot.recentered);
        let residual = yaw_of(&snapshot.orientation).to_degrees();
        assert!(residual.abs() < 1e-3, "residual yaw {residual}");

        // The one-shot flag is consumed by the read.
        provider.read_state(&mut snapshot);
        assert!(!snapshot.recentered);
    }

    #[test]
    fn home_release_recenters_at_the_current_yaw() {
        let mut provider = provider_without_socket();
        let mut snapshot = ControllerSnapshot::default();

        provider.buffer.apply(&yaw_event(10.0));
        provider.buffer.apply(&yaw_event(20.0));

        provider.buffer.apply(&home_event(true));
        provider.read_state(&mut snapshot);
        assert!(snapshot.recentering);

        provider.buffer.apply(&home_event(false));
        provider.read_state(&mut snapshot);
        assert!(snapshot.recentered);
        assert!(!snapshot.recentering);
        assert!(yaw_of(&snapshot.orientation).to_degrees().abs() < 1e-3);

        // A later sample at 25 degrees reads as 5 degrees corrected.
        provider.buffer.apply(&yaw_event(25.0));
        provider.read_state(&mut snapshot);
        let corrected = yaw_of(&snapshot.orientation).to_degrees();
        assert!((corrected - 5.0).abs() < 1e-2, "corrected yaw {corrected}");
    }

    #[test]
    fn explicit_recenter_request_behaves_like_the_gesture() {
        let mut provider = provider_without_socket();
        let mut snapshot = ControllerSnapshot::default();

        provider.buffer.apply(&yaw_event(10.0));
        provider.buffer.apply(&yaw_event(30.0));
        provider.request_recenter();
        provider.buffer.apply(&yaw_event(33.0));
        provider.read_state(&mut snapshot);

        assert!(snapshot.recentered);
        let corrected = yaw_of(&snapshot.orientation).to_degrees();
        assert!((corrected - 3.0).abs() < 1e-2, "corrected yaw {corrected}");
    }

    #[test]
    fn link_status_maps_to_connection_state_and_api_status() {
        let mut provider = provider_without_socket();
        let mut snapshot = ControllerSnapshot::default();

        provider.read_state(&mut snapshot);
        assert_eq!(snapshot.connection_state, ConnectionState::Disconnected);
        assert_eq!(snapshot.api_status, ApiStatus::Unavailable);

        provider.buffer.set_link_status(LinkStatus::Connecting);
        provider.read_state(&mut snapshot);
        assert_eq!(snapshot.connection_state, ConnectionState::Connecting);

        provider.buffer.set_link_status(LinkStatus::Connected);
        provider.read_state(&mut snapshot);
        assert_eq!(snapshot.connection_state, ConnectionState::Connected);
        assert_eq!(snapshot.api_status, ApiStatus::Ok);
        assert_eq!(snapshot.battery_level, BatteryLevel::Full);
        assert!(!snapshot.is_charging);
    }
}
