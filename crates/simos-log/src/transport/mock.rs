//! Mock bridge transport for testing

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{BridgeTransport, TransportError};

/// Records every frame written to it
pub struct MockBridgeTransport {
    connected: AtomicBool,
    sent: RwLock<Vec<Vec<u8>>>,
    mtu: usize,
}

impl Default for MockBridgeTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBridgeTransport {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            sent: RwLock::new(Vec::new()),
            mtu: 512,
        }
    }

    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Frames sent so far, oldest first
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.read().clone()
    }

    pub fn clear(&self) {
        self.sent.write().clear();
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl BridgeTransport for MockBridgeTransport {
    async fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        if frame.len() > self.mtu {
            return Err(TransportError::FrameTooLarge(frame.len()));
        }

        tracing::debug!(frame = %hex::encode(frame), "Mock bridge: sent frame");
        self.sent.write().push(frame.to_vec());
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_frames() {
        let transport = MockBridgeTransport::new();
        tokio_test::block_on(async {
            tokio_test::assert_ok!(transport.send(&[1, 2, 3]).await);
            tokio_test::assert_ok!(transport.send(&[4]).await);
        });
        assert_eq!(transport.sent(), vec![vec![1, 2, 3], vec![4]]);

        transport.clear();
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_rejects_send() {
        let transport = MockBridgeTransport::new();
        transport.set_connected(false);
        assert!(!transport.is_connected().await);
        assert_eq!(
            transport.send(&[1]).await,
            Err(TransportError::ConnectionClosed)
        );
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_mtu_limit() {
        let transport = MockBridgeTransport::new().with_mtu(4);
        assert_eq!(
            transport.send(&[0; 5]).await,
            Err(TransportError::FrameTooLarge(5))
        );
    }
}
