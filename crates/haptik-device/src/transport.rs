use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Errors reported by a device transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The write did not complete.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// The write was aborted by the caller's cancellation scope.
    #[error("write cancelled")]
    Cancelled,

    /// The device is no longer present.
    #[error("device is gone")]
    DeviceGone,
}

/// Raw byte transport for one connected device.
///
/// Implementations wrap the physical link (Bluetooth, serial, ...). The core
/// only needs two capabilities: a cancellable write, and a removal
/// notification that terminates ownership of the device.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Write raw bytes to the device.
    ///
    /// Must return promptly with [`TransportError::Cancelled`] once `cancel`
    /// fires, aborting any in-flight I/O.
    async fn write(&self, bytes: &[u8], cancel: &CancellationToken) -> Result<(), TransportError>;

    /// Subscribe to the device-removed notification.
    ///
    /// The notification fires at most meaningfully once; dropping the
    /// receiver deregisters the subscription.
    fn subscribe_removed(&self) -> broadcast::Receiver<()>;
}

pub mod testing {
    //! In-memory transport for tests and demos.

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Records writes, injects failures, and simulates device removal.
    pub struct MockTransport {
        writes: Mutex<Vec<Vec<u8>>>,
        fail_next: AtomicBool,
        removed_tx: broadcast::Sender<()>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            let (removed_tx, _) = broadcast::channel(4);
            Self {
                writes: Mutex::new(Vec::new()),
                fail_next: AtomicBool::new(false),
                removed_tx,
            }
        }

        /// All bytes written so far, in order.
        pub fn writes(&self) -> Vec<Vec<u8>> {
            self.writes.lock().expect("writes lock should not be poisoned").clone()
        }

        /// Number of writes issued so far.
        pub fn write_count(&self) -> usize {
            self.writes.lock().expect("writes lock should not be poisoned").len()
        }

        /// Make the next write fail with [`TransportError::WriteFailed`].
        pub fn fail_next_write(&self) {
            self.fail_next.store(true, Ordering::SeqCst);
        }

        /// Simulate the physical device disappearing.
        pub fn remove(&self) {
            // No receivers is fine; the device may already be torn down.
            let _ = self.removed_tx.send(());
        }
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl DeviceTransport for MockTransport {
        async fn write(
            &self,
            bytes: &[u8],
            cancel: &CancellationToken,
        ) -> Result<(), TransportError> {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(TransportError::WriteFailed("injected failure".into()));
            }
            self.writes
                .lock()
                .expect("writes lock should not be poisoned")
                .push(bytes.to_vec());
            Ok(())
        }

        fn subscribe_removed(&self) -> broadcast::Receiver<()> {
            self.removed_tx.subscribe()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MockTransport;
    use super::*;

    #[tokio::test]
    async fn mock_records_writes_in_order() {
        let transport = MockTransport::new();
        let cancel = CancellationToken::new();
        transport.write(&[0x15], &cancel).await.expect("write should succeed");
        transport.write(&[0x00], &cancel).await.expect("write should succeed");
        assert_eq!(transport.writes(), vec![vec![0x15], vec![0x00]]);
    }

    #[tokio::test]
    async fn mock_fails_once_when_injected() {
        let transport = MockTransport::new();
        let cancel = CancellationToken::new();
        transport.fail_next_write();
        let err = transport.write(&[0x01], &cancel).await.expect_err("write should fail");
        assert!(matches!(err, TransportError::WriteFailed(_)));
        transport.write(&[0x02], &cancel).await.expect("next write should succeed");
        assert_eq!(transport.write_count(), 1);
    }

    #[tokio::test]
    async fn cancelled_scope_aborts_write() {
        let transport = MockTransport::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = transport.write(&[0x01], &cancel).await.expect_err("write should abort");
        assert!(matches!(err, TransportError::Cancelled));
        assert_eq!(transport.write_count(), 0);
    }

    #[tokio::test]
    async fn removal_reaches_subscribers() {
        let transport = MockTransport::new();
        let mut rx = transport.subscribe_removed();
        transport.remove();
        rx.recv().await.expect("removal should be delivered");
    }
}
