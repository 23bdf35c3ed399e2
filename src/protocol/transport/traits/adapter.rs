//! Contract every CAN adapter connection fulfils, whatever its wire protocol.
//! Lets the gateway drive serial adapters, replay files or in-memory streams
//! through one object-safe interface.
use async_trait::async_trait;

use crate::error::AdapterError;
use crate::protocol::transport::can_frame::RawFrame;

/// Lifecycle of an adapter channel. Only `Idle -> Open -> Closed` is possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Idle,
    Open,
    Closed,
}

/// Frame-level I/O over one adapter byte stream.
///
/// `open` and `close` are idempotent: the first call acts, later calls return
/// `Ok(())` without touching the stream. `read` and `write` require the open
/// state and fail with [`AdapterError::ChannelClosed`] otherwise.
#[async_trait]
pub trait AdapterFramer: Send {
    /// Send the adapter initialization commands.
    async fn open(&mut self) -> Result<(), AdapterError>;

    /// Send the shutdown command (if any) and shut the write half down.
    async fn close(&mut self) -> Result<(), AdapterError>;

    /// Wait for the next well-formed frame. Malformed byte runs are skipped.
    ///
    /// Cancel safe: dropping the returned future loses no buffered bytes.
    async fn read(&mut self) -> Result<RawFrame, AdapterError>;

    /// Encode and send one frame (at most eight data bytes).
    async fn write(&mut self, frame: &RawFrame) -> Result<(), AdapterError>;

    fn state(&self) -> ChannelState;

    /// Malformed byte runs skipped so far.
    fn framing_errors(&self) -> u64;
}
