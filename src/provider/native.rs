use nalgebra::{UnitQuaternion, Vector2, Vector3};
use tracing::{debug, warn};

use crate::provider::ControllerProvider;
use crate::state::{
    ApiStatus, BatteryLevel, ButtonMask, ConnectionState, ControllerSnapshot,
};

// Errors surfaced by the platform controller service boundary.
#[derive(Debug, thiserror::Error)]
pub enum NativeApiError {
    #[error("Controller service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Not authorized to use the controller service: {0}")]
    NotAuthorized(String),

    #[error("Controller API call failed: {0}")]
    CallFailed(String),
}

/// One synchronous sample from the platform controller service.
#[derive(Clone, Debug)]
pub struct NativeSample {
    pub connection_state: ConnectionState,
    pub orientation: UnitQuaternion<f32>,
    /// Present when the controller is positionally (6-DoF) tracked.
    pub position: Option<Vector3<f32>>,
    pub gyro: Vector3<f32>,
    pub accel: Vector3<f32>,
    pub touch_pos: Vector2<f32>,
    pub is_touching: bool,
    pub buttons_held: ButtonMask,
    pub is_charging: bool,
    pub battery_level: BatteryLevel,
}

impl Default for NativeSample {
    fn default() -> Self {
        Self {
            connection_state: ConnectionState::Disconnected,
            orientation: UnitQuaternion::identity(),
            position: None,
            gyro: Vector3::zeros(),
            accel: Vector3::zeros(),
            touch_pos: Vector2::zeros(),
            is_touching: false,
            buttons_held: ButtonMask::EMPTY,
            is_charging: false,
            battery_level: BatteryLevel::Unknown,
        }
    }
}

/// The opaque platform IPC/FFI surface behind the native provider. The real
/// implementation lives with the host platform layer; tests inject
/// synthetic samples through the same seam.
pub trait NativeControllerApi: Send {
    /// Reads the current sample. Must return synchronously.
    fn read_sample(&mut self) -> Result<NativeSample, NativeApiError>;

    /// Release the exclusive hardware handle while backgrounded.
    fn pause(&mut self);

    /// Reacquire the hardware handle.
    fn resume(&mut self);
}

/// Provider over real controller hardware via the platform service.
pub struct NativeProvider {
    api: Box<dyn NativeControllerApi>,
    failure_logged: bool,
}

impl NativeProvider {
    pub fn new(api: Box<dyn NativeControllerApi>) -> Self {
        Self {
            api,
            failure_logged: false,
        }
    }
}

impl ControllerProvider for NativeProvider {
    fn read_state(&mut self, out: &mut ControllerSnapshot) {
        match self.api.read_sample() {
            Ok(sample) => {
                if self.failure_logged {
                    debug!("Native controller API recovered");
                    self.failure_logged = false;
                }
                out.connection_state = sample.connection_state;
                out.api_status = ApiStatus::Ok;
                out.orientation = sample.orientation;
                out.position = sample.position;
                out.gyro = sample.gyro;
                out.accel = sample.accel;
                out.touch_pos = sample.touch_pos;
                out.is_touching = sample.is_touching;
                out.buttons_held = sample.buttons_held;
                out.is_charging = sample.is_charging;
                out.battery_level = sample.battery_level;
                out.error_details.clear();
            }
            Err(e) => {
                // Frame-rate-critical path: report the failure through the
                // status fields and leave the last known sample in place.
                if !self.failure_logged {
                    warn!("Native controller API error: {}", e);
                    self.failure_logged = true;
                }
                out.api_status = ApiStatus::Unavailable;
                out.error_details = e.to_string();
            }
        }
    }

    fn on_pause(&mut self) {
        self.api.pause();
    }

    fn on_resume(&mut self) {
        self.api.resume();
    }

    fn request_recenter(&mut self) {
        // Recentering on hardware is performed by the system-level home
        // button gesture; there is nothing to forward.
    }

    fn supports_battery_status(&self) -> bool {
        true
    }
}
