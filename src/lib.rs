//! VR input-device abstraction layer.
//!
//! Heterogeneous 3-DoF/6-DoF controller hardware, a desktop phone-emulator
//! feed, and an inert stub are normalized behind one polled snapshot,
//! consumed once per rendered frame. The host render loop owns a
//! [`input::ControllerInput`], calls `poll()` at a defined point in its
//! frame, and reads the published [`state::ControllerSnapshot`] plus the
//! gesture accessors. Rendering, raycasting, and UI live with the host; this
//! crate only exposes state.

pub mod config;
pub mod gesture;
pub mod input;
pub mod provider;
pub mod state;
pub mod transport;

pub use config::{Config, ConfigError};
pub use gesture::{GestureDetector, GestureDirection, GestureEngine, GestureState};
pub use input::ControllerInput;
pub use provider::{
    create_provider, ControllerProvider, DummyProvider, EmulatorProvider, NativeControllerApi,
    NativeProvider, ProviderKind,
};
pub use state::{
    derive_edges, ApiStatus, BatteryLevel, Button, ButtonMask, ConnectionState,
    ControllerSnapshot,
};
pub use transport::{LinkConfig, LinkMode};
