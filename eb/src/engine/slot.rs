//! Holder of the single shared engine instance

use std::sync::Arc;

use tracing::{debug, info};

use super::DiagnosticEngine;

/// Owns the one engine that may drive the dongle
///
/// Installing a new engine always shuts the previous one down first, so two
/// engines never talk to the same device.
#[derive(Default)]
pub struct EngineSlot {
    engine: Option<Arc<dyn DiagnosticEngine>>,
    installs: u64,
}

impl EngineSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The attached engine, if any
    pub fn current(&self) -> Option<&Arc<dyn DiagnosticEngine>> {
        self.engine.as_ref()
    }

    pub fn is_attached(&self) -> bool {
        self.engine.is_some()
    }

    /// Number of engines installed over the slot's lifetime
    pub fn installs(&self) -> u64 {
        self.installs
    }

    /// Replace the attached engine
    pub fn install(&mut self, engine: Arc<dyn DiagnosticEngine>) {
        debug!(installs = self.installs, "EngineSlot::install: called");
        self.release();
        self.engine = Some(engine);
        self.installs += 1;
        info!(installs = self.installs, "Diagnostic engine attached");
    }

    /// Shut down and drop the attached engine
    ///
    /// Returns false when the slot was already empty.
    pub fn release(&mut self) -> bool {
        debug!("EngineSlot::release: called");
        match self.engine.take() {
            Some(engine) => {
                engine.shutdown();
                info!("Diagnostic engine released");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EcuRecord;
    use crate::engine::ScriptedEngine;

    #[test]
    fn test_install_releases_previous_engine() {
        let first = Arc::new(ScriptedEngine::new(vec![EcuRecord::new("VCU")]));
        let second = Arc::new(ScriptedEngine::new(vec![EcuRecord::new("BMS")]));

        let mut slot = EngineSlot::new();
        assert!(!slot.is_attached());

        slot.install(first.clone());
        assert_eq!(first.calls().shutdowns, 0);

        slot.install(second.clone());
        assert_eq!(first.calls().shutdowns, 1);
        assert_eq!(second.calls().shutdowns, 0);
        assert_eq!(slot.installs(), 2);

        let current = slot.current().unwrap();
        assert_eq!(current.ecu_record(0).unwrap().name, "BMS");
    }

    #[test]
    fn test_release_is_idempotent() {
        let engine = Arc::new(ScriptedEngine::new(vec![]));
        let mut slot = EngineSlot::new();
        slot.install(engine.clone());

        assert!(slot.release());
        assert!(!slot.release());
        assert_eq!(engine.calls().shutdowns, 1);
        assert!(slot.current().is_none());
    }
}
