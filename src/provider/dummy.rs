use crate::provider::ControllerProvider;
use crate::state::ControllerSnapshot;

/// Inert provider used when no VR platform is available: every read yields
/// the same disconnected snapshot. Never fails.
pub struct DummyProvider {
    baseline: ControllerSnapshot,
}

impl DummyProvider {
    pub fn new() -> Self {
        Self {
            baseline: ControllerSnapshot::default(),
        }
    }
}

impl Default for DummyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerProvider for DummyProvider {
    fn read_state(&mut self, out: &mut ControllerSnapshot) {
        out.copy_from(&self.baseline);
    }

    fn on_pause(&mut self) {}

    fn on_resume(&mut self) {}

    fn request_recenter(&mut self) {}

    fn supports_battery_status(&self) -> bool {
        false
    }
}
