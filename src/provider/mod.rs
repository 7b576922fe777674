pub mod dummy;
pub mod emulator;
pub mod native;

pub use dummy::DummyProvider;
pub use emulator::EmulatorProvider;
pub use native::{NativeApiError, NativeControllerApi, NativeProvider, NativeSample};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::state::ControllerSnapshot;
use crate::transport::{LinkConfig, TransportError};

/// Platform-specific acquisition of raw controller samples.
///
/// `read_state` is called once per rendered frame on the main thread. It
/// must never block on I/O and never panic or propagate an error into the
/// poll path; failures degrade into the snapshot's status fields instead.
/// Implementations fill the level-triggered fields (plus the recenter
/// transients they own); button and touch edges are derived by the caller
/// from the level deltas.
pub trait ControllerProvider: Send {
    fn read_state(&mut self, out: &mut ControllerSnapshot);

    /// Host application moved to the background.
    fn on_pause(&mut self);

    /// Host application returned to the foreground.
    fn on_resume(&mut self);

    /// Remap the controller's current yaw to "forward".
    fn request_recenter(&mut self);

    fn supports_battery_status(&self) -> bool;
}

/// Which provider variant to construct. All variants are compiled into
/// every build; the choice is a runtime configuration value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Native,
    #[default]
    Emulator,
    Dummy,
}

/// Builds the configured provider. The native variant needs the platform
/// controller API handed in by the host; without one it degrades to the
/// inert provider rather than failing startup.
pub fn create_provider(
    kind: ProviderKind,
    link_config: LinkConfig,
    native_api: Option<Box<dyn NativeControllerApi>>,
) -> Result<Box<dyn ControllerProvider>, TransportError> {
    match kind {
        ProviderKind::Native => match native_api {
            Some(api) => {
                info!("Using native controller provider");
                Ok(Box::new(NativeProvider::new(api)))
            }
            None => {
                warn!(
                    "Native provider selected but no platform controller API was supplied, \
                     using the inert provider"
                );
                Ok(Box::new(DummyProvider::new()))
            }
        },
        ProviderKind::Emulator => {
            info!("Using emulator controller provider");
            Ok(Box::new(EmulatorProvider::new(link_config)?))
        }
        ProviderKind::Dummy => {
            info!("Using inert controller provider");
            Ok(Box::new(DummyProvider::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ConnectionState;
    use crate::transport::LinkMode;

    #[test]
    fn native_kind_without_an_api_falls_back_to_dummy() {
        let link = LinkConfig {
            mode: LinkMode::Off,
            ..Default::default()
        };
        let mut provider =
            create_provider(ProviderKind::Native, link, None).expect("provider construction");
        let mut snapshot = ControllerSnapshot::default();
        provider.read_state(&mut snapshot);
        assert_eq!(snapshot.connection_state, ConnectionState::Disconnected);
        assert!(!provider.supports_battery_status());
    }
}
