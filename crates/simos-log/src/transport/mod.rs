//! Bridge transport seam
//!
//! Connection setup, MTU negotiation and the receive path belong to the
//! platform's BLE stack. The engine only needs somewhere to write the
//! frames it builds; received frames reach it as tick events.

mod mock;

pub use mock::MockBridgeTransport;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Frame of {0} bytes exceeds the link MTU")]
    FrameTooLarge(usize),
}

/// Outbound half of the BLE bridge link
#[async_trait]
pub trait BridgeTransport: Send + Sync {
    /// Write one frame to the bridge
    async fn send(&self, frame: &[u8]) -> Result<(), TransportError>;

    /// Check if the link is up
    async fn is_connected(&self) -> bool;
}
