//! Camera frame provider.
//!
//! The control panel needs the live frame size of each machine's camera to
//! validate ROIs and to check saved sets against. Acquiring the still image the
//! view draws on is the camera driver's business and not modelled here.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::PersistenceError;
use crate::geometry::FrameBounds;
use crate::panel::MachineId;

/// Source of live frame dimensions per machine.
#[async_trait]
pub trait FrameProvider: Send + Sync {
    /// Current frame bounds of `machine`'s camera.
    ///
    /// An unreachable camera is reported as
    /// [`PersistenceError::StorageUnavailable`] so callers can retry.
    async fn frame_bounds(&self, machine: &MachineId) -> Result<FrameBounds, PersistenceError>;
}

/// Provider with a default frame size and optional per-machine overrides.
///
/// Stands in for real camera drivers in tests and the CLI.
#[derive(Debug)]
pub struct FixedFrameProvider {
    default_bounds: FrameBounds,
    overrides: RwLock<HashMap<MachineId, Option<FrameBounds>>>,
}

impl FixedFrameProvider {
    /// Every machine reports `default_bounds`.
    pub fn new(default_bounds: FrameBounds) -> Self {
        Self {
            default_bounds,
            overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Report `bounds` for `machine` instead of the default.
    pub async fn set_bounds(&self, machine: MachineId, bounds: FrameBounds) {
        self.overrides.write().await.insert(machine, Some(bounds));
    }

    /// Simulate a disconnected camera for `machine`.
    pub async fn disconnect(&self, machine: MachineId) {
        self.overrides.write().await.insert(machine, None);
    }
}

impl Default for FixedFrameProvider {
    fn default() -> Self {
        Self::new(FrameBounds::new(1280, 960))
    }
}

#[async_trait]
impl FrameProvider for FixedFrameProvider {
    async fn frame_bounds(&self, machine: &MachineId) -> Result<FrameBounds, PersistenceError> {
        match self.overrides.read().await.get(machine) {
            Some(Some(bounds)) => Ok(*bounds),
            Some(None) => Err(PersistenceError::StorageUnavailable(format!(
                "camera for machine '{machine}' is not connected"
            ))),
            None => Ok(self.default_bounds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn overrides_take_precedence() {
        let provider = FixedFrameProvider::new(FrameBounds::new(640, 480));
        let a = MachineId::new("a");
        let b = MachineId::new("b");
        provider.set_bounds(b.clone(), FrameBounds::new(100, 100)).await;

        assert_eq!(provider.frame_bounds(&a).await.unwrap(), FrameBounds::new(640, 480));
        assert_eq!(provider.frame_bounds(&b).await.unwrap(), FrameBounds::new(100, 100));
    }

    #[tokio::test]
    async fn disconnected_camera_is_unavailable() {
        let provider = FixedFrameProvider::default();
        let machine = MachineId::new("offline");
        provider.disconnect(machine.clone()).await;
        assert!(matches!(
            provider.frame_bounds(&machine).await,
            Err(PersistenceError::StorageUnavailable(_))
        ));
    }
}
