//! Adapter connections: byte streams split into `RawFrame`s by a wire
//! protocol, behind the [`AdapterFramer`] trait.
//!
//! Both supported adapter families share the stream handling in
//! [`StreamFramer`]; they differ only by their [`WireProtocol`] (byte scanner,
//! frame encoder, open/close commands).
use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::config::{AdapterConfig, AdapterProtocol, AdapterSource};
use crate::core::MAX_FRAME_DATA;
use crate::error::{AdapterError, FramingError};
use crate::protocol::transport::can_frame::RawFrame;
use crate::protocol::transport::traits::adapter::{AdapterFramer, ChannelState};

pub mod actisense;
pub mod slcan;

pub use actisense::ActisenseProtocol;
pub use slcan::SlcanProtocol;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Size of one read from the underlying stream.
const READ_CHUNK: usize = 512;

//==================================================================================WIRE_PROTOCOL
/// Byte-level rules of one adapter family.
pub trait WireProtocol: Send {
    /// Label used in logs.
    const NAME: &'static str;

    /// Bytes sent by `open`.
    fn open_sequence(&self) -> Vec<u8>;

    /// Bytes sent by `close` (may be empty).
    fn close_sequence(&self) -> Vec<u8>;

    /// Feed one inbound byte. Returns a frame or a framing error when a
    /// record ends, `None` while a record is still being accumulated.
    fn push_byte(&mut self, byte: u8) -> Option<Result<RawFrame, FramingError>>;

    /// Append the wire form of `frame` to `out`. Data length is already checked.
    fn encode(&self, frame: &RawFrame, out: &mut Vec<u8>);
}

//==================================================================================STREAM_FRAMER
/// Generic framer over separate read and write halves.
///
/// Scan state and decoded-but-undelivered frames live in the struct, so a
/// pending `read` can be dropped at any await point.
pub struct StreamFramer<P> {
    protocol: P,
    reader: BoxedReader,
    writer: BoxedWriter,
    state: ChannelState,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
    ready: VecDeque<RawFrame>,
    framing_errors: u64,
}

impl<P: WireProtocol> StreamFramer<P> {
    pub fn new<R, W>(protocol: P, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            protocol,
            reader: Box::new(reader),
            writer: Box::new(writer),
            state: ChannelState::Idle,
            read_buf: vec![0; READ_CHUNK],
            write_buf: Vec::with_capacity(64),
            ready: VecDeque::new(),
            framing_errors: 0,
        }
    }

    fn ensure_open(&self) -> Result<(), AdapterError> {
        match self.state {
            ChannelState::Open => Ok(()),
            _ => Err(AdapterError::ChannelClosed),
        }
    }
}

#[async_trait]
impl<P: WireProtocol> AdapterFramer for StreamFramer<P> {
    async fn open(&mut self) -> Result<(), AdapterError> {
        if self.state != ChannelState::Idle {
            return Ok(());
        }
        let commands = self.protocol.open_sequence();
        self.writer.write_all(&commands).await?;
        self.writer.flush().await?;
        self.state = ChannelState::Open;
        info!(adapter = P::NAME, "channel opened");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), AdapterError> {
        if self.state != ChannelState::Open {
            return Ok(());
        }
        self.state = ChannelState::Closed;

        let commands = self.protocol.close_sequence();
        if !commands.is_empty() {
            self.writer.write_all(&commands).await?;
        }
        self.writer.shutdown().await?;
        info!(adapter = P::NAME, "channel closed");
        Ok(())
    }

    async fn read(&mut self) -> Result<RawFrame, AdapterError> {
        self.ensure_open()?;
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(frame);
            }

            let n = self.reader.read(&mut self.read_buf).await?;
            if n == 0 {
                return Err(AdapterError::Disconnected);
            }

            for &byte in &self.read_buf[..n] {
                match self.protocol.push_byte(byte) {
                    Some(Ok(frame)) => self.ready.push_back(frame),
                    Some(Err(err)) => {
                        self.framing_errors += 1;
                        debug!(adapter = P::NAME, %err, "malformed frame skipped");
                    }
                    None => {}
                }
            }
        }
    }

    async fn write(&mut self, frame: &RawFrame) -> Result<(), AdapterError> {
        self.ensure_open()?;
        if frame.data.len() > MAX_FRAME_DATA {
            return Err(AdapterError::UnsupportedLongWrite {
                len: frame.data.len(),
            });
        }

        self.write_buf.clear();
        self.protocol.encode(frame, &mut self.write_buf);
        self.writer.write_all(&self.write_buf).await?;
        self.writer.flush().await?;
        Ok(())
    }

    fn state(&self) -> ChannelState {
        self.state
    }

    fn framing_errors(&self) -> u64 {
        self.framing_errors
    }
}

//==================================================================================CONSTRUCTION
/// Framer speaking `protocol` over the given stream halves.
pub fn framer_for<R, W>(protocol: AdapterProtocol, reader: R, writer: W) -> Box<dyn AdapterFramer>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    match protocol {
        AdapterProtocol::Slcan { bitrate } => {
            Box::new(StreamFramer::new(SlcanProtocol::new(bitrate), reader, writer))
        }
        AdapterProtocol::Actisense => {
            Box::new(StreamFramer::new(ActisenseProtocol::new(), reader, writer))
        }
    }
}

/// Open the configured source and wrap it in the configured protocol.
///
/// Devices are opened read/write and split into halves; replay files are
/// read-only and outbound frames go to a sink.
pub async fn connect(config: &AdapterConfig) -> Result<Box<dyn AdapterFramer>, AdapterError> {
    let framer = match &config.source {
        AdapterSource::Device { path } => {
            let device = OpenOptions::new().read(true).write(true).open(path).await?;
            let (reader, writer) = tokio::io::split(device);
            framer_for(config.protocol, reader, writer)
        }
        AdapterSource::Replay { path } => {
            let file = File::open(path).await?;
            framer_for(config.protocol, file, tokio::io::sink())
        }
    };
    debug!(adapter = %config.name, source = ?config.source, "adapter source opened");
    Ok(framer)
}
