use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

/// Failure reported by a subtype manager's scan operation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("scanning via {manager} failed: {message}")]
pub struct ScanError {
    /// Name of the manager that failed.
    pub manager: String,
    pub message: String,
}

impl ScanError {
    pub fn new(manager: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            manager: manager.into(),
            message: message.into(),
        }
    }
}

/// External device-discovery provider for one device category.
///
/// The core only invokes these operations and reports completion; discovery
/// itself and "device found" wiring live outside the core.
#[async_trait]
pub trait SubtypeManager: Send + Sync {
    fn name(&self) -> &str;

    async fn start_scanning(&self) -> Result<(), ScanError>;

    async fn stop_scanning(&self) -> Result<(), ScanError>;
}

enum ScanOp {
    Start,
    Stop,
}

/// The set of registered subtype managers.
#[derive(Default)]
pub struct ManagerRegistry {
    managers: Vec<Arc<dyn SubtypeManager>>,
}

impl ManagerRegistry {
    pub fn register(&mut self, manager: Arc<dyn SubtypeManager>) {
        self.managers.push(manager);
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// Start scanning on every registered manager.
    ///
    /// One manager's failure does not abort the others; every manager is
    /// invoked, and the first failure (in registration order) is returned
    /// afterwards.
    pub async fn start_all(&self) -> Result<(), ScanError> {
        self.invoke_all(ScanOp::Start).await
    }

    /// Stop scanning on every registered manager. Same failure policy as
    /// [`ManagerRegistry::start_all`].
    pub async fn stop_all(&self) -> Result<(), ScanError> {
        self.invoke_all(ScanOp::Stop).await
    }

    async fn invoke_all(&self, op: ScanOp) -> Result<(), ScanError> {
        let mut first_failure = None;
        for manager in &self.managers {
            let result = match op {
                ScanOp::Start => manager.start_scanning().await,
                ScanOp::Stop => manager.stop_scanning().await,
            };
            if let Err(err) = result {
                warn!(manager = manager.name(), error = %err, "scan operation failed");
                first_failure.get_or_insert(err);
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
