//! Backend implementations and the label registry that selects them

pub mod create;
pub mod nxt;
pub mod passthrough;

use crate::config::Config;
use crate::core::controller::RobotController;
use crate::transport::BluetoothAdapter;
use create::CreateController;
use nxt::NxtController;
use passthrough::PassthroughController;
use std::sync::Arc;

pub const LABEL_DEFAULT: &str = "Default";
pub const LABEL_CREATE: &str = "iRobot Create";
pub const LABEL_NXT: &str = "Lego Mindstorms NXT";
pub const LABEL_VEX_PRO: &str = "VEX Pro";

/// Resolves a human-readable label to a fresh backend
pub trait ControllerRegistry: Send {
    /// New backend for `label`, `None` if the label is unknown
    fn resolve(&self, label: &str) -> Option<Box<dyn RobotController>>;

    /// Every label this registry can resolve
    fn labels(&self) -> Vec<String>;
}

type Factory = fn(Arc<dyn BluetoothAdapter>, &Config) -> Box<dyn RobotController>;

fn new_generic(adapter: Arc<dyn BluetoothAdapter>, config: &Config) -> Box<dyn RobotController> {
    Box::new(PassthroughController::generic(adapter, config))
}

fn new_create(adapter: Arc<dyn BluetoothAdapter>, config: &Config) -> Box<dyn RobotController> {
    Box::new(CreateController::new(adapter, config))
}

fn new_nxt(adapter: Arc<dyn BluetoothAdapter>, config: &Config) -> Box<dyn RobotController> {
    Box::new(NxtController::new(adapter, config))
}

fn new_vex_pro(adapter: Arc<dyn BluetoothAdapter>, config: &Config) -> Box<dyn RobotController> {
    Box::new(PassthroughController::vex_pro(adapter, config))
}

/// Compile-time table of the built-in backends
pub struct StaticRegistry {
    adapter: Arc<dyn BluetoothAdapter>,
    config: Config,
    entries: Vec<(&'static str, Factory)>,
}

impl StaticRegistry {
    pub fn new(adapter: Arc<dyn BluetoothAdapter>, config: Config) -> Self {
        let entries = vec![
            (LABEL_DEFAULT, new_generic as Factory),
            (LABEL_CREATE, new_create as Factory),
            (LABEL_NXT, new_nxt as Factory),
            (LABEL_VEX_PRO, new_vex_pro as Factory),
        ];
        Self {
            adapter,
            config,
            entries,
        }
    }
}

impl ControllerRegistry for StaticRegistry {
    fn resolve(&self, label: &str) -> Option<Box<dyn RobotController>> {
        self.entries
            .iter()
            .find(|(name, _)| *name == label)
            .map(|(_, factory)| factory(Arc::clone(&self.adapter), &self.config))
    }

    fn labels(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ControllerState;
    use crate::transport::MockAdapter;

    #[test]
    fn test_resolve_known_labels() {
        let registry = StaticRegistry::new(Arc::new(MockAdapter::new()), Config::default());
        for label in registry.labels() {
            let backend = registry.resolve(&label).unwrap();
            assert_eq!(backend.state(), ControllerState::None);
        }
        assert_eq!(
            registry.labels(),
            vec!["Default", "iRobot Create", "Lego Mindstorms NXT", "VEX Pro"]
        );
    }

    #[test]
    fn test_unknown_label() {
        let registry = StaticRegistry::new(Arc::new(MockAdapter::new()), Config::default());
        assert!(registry.resolve("Roomba 9000").is_none());
        assert!(registry.resolve("default").is_none());
    }
}
