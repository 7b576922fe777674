use nalgebra::{UnitQuaternion, Vector2, Vector3};
use std::fmt;

// Connection state of a single controller, as exposed to UI collaborators.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    Error,
    #[default]
    Disconnected,
    Scanning,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    // Short status strings for an external status line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionState::Error => "Controller error",
            ConnectionState::Disconnected => "Controller disconnected",
            ConnectionState::Scanning => "Controller scanning...",
            ConnectionState::Connecting => "Controller connecting...",
            ConnectionState::Connected => "Controller connected",
        };
        f.write_str(text)
    }
}

// Health of the underlying controller API, independent of whether a
// controller is currently paired.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ApiStatus {
    Ok,
    Unsupported,
    NotAuthorized,
    #[default]
    Unavailable,
    Malfunction,
    Error,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum BatteryLevel {
    #[default]
    Unknown,
    CriticalLow,
    Low,
    Medium,
    AlmostFull,
    Full,
}

/// Physical controller buttons. The discriminants are bit positions in a
/// [`ButtonMask`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Button {
    /// Button under the touchpad surface.
    TouchpadClick = 1 << 1,
    /// System (home) button; ends the recenter gesture on release.
    System = 1 << 2,
    App = 1 << 3,
    VolumeUp = 1 << 6,
    VolumeDown = 1 << 7,
}

impl Button {
    pub fn bit(self) -> u32 {
        self as u32
    }
}

/// Bitmask over [`Button`] values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ButtonMask(pub u32);

impl ButtonMask {
    pub const EMPTY: ButtonMask = ButtonMask(0);

    pub fn contains(self, button: Button) -> bool {
        self.0 & button.bit() != 0
    }

    pub fn insert(&mut self, button: Button) {
        self.0 |= button.bit();
    }

    pub fn remove(&mut self, button: Button) {
        self.0 &= !button.bit();
    }

    pub fn set(&mut self, button: Button, held: bool) {
        if held {
            self.insert(button);
        } else {
            self.remove(button);
        }
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Derives the edge (transient) masks from two consecutive held masks:
/// `down = !previous & current`, `up = previous & !current`.
///
/// Edges are computed from the level delta across one poll interval, so a
/// press-and-release that both happen within a single interval cancel out
/// and are not observable. That is a property of the sampling model, not a
/// defect; providers that only deliver level state cannot do better.
pub fn derive_edges(previous: ButtonMask, current: ButtonMask) -> (ButtonMask, ButtonMask) {
    let down = ButtonMask(!previous.0 & current.0);
    let up = ButtonMask(previous.0 & !current.0);
    (down, up)
}

/// One controller's instantaneous state, refreshed once per rendered frame.
///
/// Level-triggered fields persist until the underlying condition changes.
/// Transient fields are true for exactly one poll cycle and are reset by
/// [`ControllerSnapshot::clear_transient`] before the next sample ingestion.
#[derive(Clone, Debug)]
pub struct ControllerSnapshot {
    pub connection_state: ConnectionState,
    pub api_status: ApiStatus,
    /// Orientation in the recentered coordinate space, Y-up right-hand.
    pub orientation: UnitQuaternion<f32>,
    /// Present only for 6-DoF controllers.
    pub position: Option<Vector3<f32>>,
    /// Angular speed in rad/s.
    pub gyro: Vector3<f32>,
    /// Acceleration in m/s^2 (gravity included).
    pub accel: Vector3<f32>,
    /// Touch position, normalized to [0,1] x [0,1], (0,0) top-left.
    pub touch_pos: Vector2<f32>,
    pub is_touching: bool,
    pub buttons_held: ButtonMask,
    pub is_charging: bool,
    pub battery_level: BatteryLevel,
    /// Human-readable detail when `connection_state == Error`.
    pub error_details: String,

    // Transient fields.
    pub touch_down: bool,
    pub touch_up: bool,
    pub recentering: bool,
    pub recentered: bool,
    pub buttons_down: ButtonMask,
    pub buttons_up: ButtonMask,
}

impl Default for ControllerSnapshot {
    fn default() -> Self {
        Self {
            connection_state: ConnectionState::Disconnected,
            api_status: ApiStatus::Unavailable,
            orientation: UnitQuaternion::identity(),
            position: None,
            gyro: Vector3::zeros(),
            accel: Vector3::zeros(),
            touch_pos: Vector2::zeros(),
            is_touching: false,
            buttons_held: ButtonMask::EMPTY,
            is_charging: false,
            battery_level: BatteryLevel::Unknown,
            error_details: String::new(),
            touch_down: false,
            touch_up: false,
            recentering: false,
            recentered: false,
            buttons_down: ButtonMask::EMPTY,
            buttons_up: ButtonMask::EMPTY,
        }
    }
}

impl ControllerSnapshot {
    /// Field-wise copy into this existing buffer. Used both for the
    /// current-to-previous rotation at the top of a poll and for handing
    /// consumers a copy they cannot mutate shared state through. The string
    /// field reuses its allocation, so steady-state copies do not allocate.
    pub fn copy_from(&mut self, other: &ControllerSnapshot) {
        self.connection_state = other.connection_state;
        self.api_status = other.api_status;
        self.orientation = other.orientation;
        self.position = other.position;
        self.gyro = other.gyro;
        self.accel = other.accel;
        self.touch_pos = other.touch_pos;
        self.is_touching = other.is_touching;
        self.buttons_held = other.buttons_held;
        self.is_charging = other.is_charging;
        self.battery_level = other.battery_level;
        self.error_details.clone_from(&other.error_details);
        self.touch_down = other.touch_down;
        self.touch_up = other.touch_up;
        self.recentering = other.recentering;
        self.recentered = other.recentered;
        self.buttons_down = other.buttons_down;
        self.buttons_up = other.buttons_up;
    }

    /// Resets the event fields that are only valid for a single poll cycle.
    pub fn clear_transient(&mut self) {
        self.touch_down = false;
        self.touch_up = false;
        self.recentered = false;
        self.recentering = false;
        self.buttons_down = ButtonMask::EMPTY;
        self.buttons_up = ButtonMask::EMPTY;
    }
}
