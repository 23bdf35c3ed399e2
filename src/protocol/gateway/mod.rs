//! Worker-per-adapter runtime.
//!
//! Every adapter connection is served by one [`Worker`] task that owns its
//! framer and its fast-packet assembler. Workers share nothing but the output
//! channel of [`DecodedMessage`]s, so ordering holds per adapter only.
//!
//! ```text
//!  adapter A ──► Worker A ──┐
//!                           ├──► mpsc<DecodedMessage> ──► consumer
//!  adapter B ──► Worker B ──┘
//! ```
//!
//! Outbound frames reach a worker through its own channel and are written
//! between two reads.
use std::sync::Arc;

use chrono::Utc;
use futures_util::{future::select, future::Either, pin_mut};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{AdapterConfig, GatewayConfig, ReassemblerConfig};
use crate::core::DecodedMessage;
use crate::error::{AdapterError, GatewayError};
use crate::infra::adapter::connect;
use crate::infra::codec::engine;
use crate::protocol::catalog::Catalog;
use crate::protocol::transport::can_frame::RawFrame;
use crate::protocol::transport::fast_packet::assembler::{
    FastPacketAssembler, ProcessResult, ReassemblyStats,
};
use crate::protocol::transport::traits::adapter::AdapterFramer;

/// Capacity of each worker's outbound frame queue.
pub const OUTBOUND_CAPACITY: usize = 32;

//==================================================================================WORKER
/// Counters returned by a worker that stopped cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub name: String,
    /// Well-formed frames read from the adapter.
    pub frames: u64,
    /// Decoded messages delivered to the output channel.
    pub messages: u64,
    /// Frames written to the adapter.
    pub written: u64,
    pub reassembly: ReassemblyStats,
    pub framing_errors: u64,
}

/// What the loop does after handling one event.
enum Flow {
    Continue,
    Stop,
}

/// Sequential pipeline for one adapter: read, reassemble, decode, send.
pub struct Worker {
    name: String,
    framer: Box<dyn AdapterFramer>,
    assembler: FastPacketAssembler,
    catalog: Arc<Catalog>,
    output: mpsc::Sender<DecodedMessage>,
    outbound: Option<mpsc::Receiver<RawFrame>>,
    frames: u64,
    messages: u64,
    written: u64,
}

impl Worker {
    pub fn new(
        name: impl Into<String>,
        framer: Box<dyn AdapterFramer>,
        catalog: Arc<Catalog>,
        reassembly: &ReassemblerConfig,
        output: mpsc::Sender<DecodedMessage>,
    ) -> Self {
        Self {
            name: name.into(),
            framer,
            assembler: FastPacketAssembler::new(catalog.clone(), reassembly),
            catalog,
            output,
            outbound: None,
            frames: 0,
            messages: 0,
            written: 0,
        }
    }

    /// Accept frames to write on the adapter between reads.
    pub fn with_outbound(mut self, outbound: mpsc::Receiver<RawFrame>) -> Self {
        self.outbound = Some(outbound);
        self
    }

    /// Open the adapter and pump frames until it disconnects or the output
    /// channel is closed. Partial fast packets are abandoned on exit.
    ///
    /// End of stream is a clean stop; stream failures are returned.
    pub async fn run(mut self) -> Result<WorkerReport, AdapterError> {
        self.framer.open().await?;
        info!(adapter = %self.name, "worker started");

        let outcome = self.drive().await;
        let closed = self.framer.close().await;

        let report = self.report();
        match outcome.and(closed) {
            Ok(()) => {
                info!(
                    adapter = %report.name,
                    frames = report.frames,
                    messages = report.messages,
                    "worker stopped"
                );
                Ok(report)
            }
            Err(err) => {
                warn!(adapter = %report.name, %err, "worker failed");
                Err(err)
            }
        }
    }

    async fn drive(&mut self) -> Result<(), AdapterError> {
        loop {
            let flow = match self.outbound.as_mut() {
                Some(outbound) => {
                    let mut received = None;
                    let mut outbound_closed = false;
                    let mut pending_write = None;

                    {
                        let read_future = self.framer.read();
                        let send_future = outbound.recv();
                        pin_mut!(read_future);
                        pin_mut!(send_future);

                        match select(read_future, send_future).await {
                            Either::Left((result, pending_send)) => {
                                received = Some(result);
                                drop(pending_send);
                            }
                            Either::Right((Some(frame), pending_read)) => {
                                pending_write = Some(frame);
                                drop(pending_read);
                            }
                            Either::Right((None, pending_read)) => {
                                outbound_closed = true;
                                drop(pending_read);
                            }
                        }
                    }

                    if outbound_closed {
                        debug!(adapter = %self.name, "outbound queue closed");
                        self.outbound = None;
                    }
                    if let Some(frame) = pending_write {
                        self.write(&frame).await?;
                    }
                    match received {
                        Some(result) => self.handle_read(result).await?,
                        None => Flow::Continue,
                    }
                }
                None => {
                    let result = self.framer.read().await;
                    self.handle_read(result).await?
                }
            };

            if let Flow::Stop = flow {
                return Ok(());
            }
        }
    }

    async fn handle_read(&mut self, result: Result<RawFrame, AdapterError>) -> Result<Flow, AdapterError> {
        let frame = match result {
            Ok(frame) => frame,
            Err(AdapterError::Disconnected) => {
                info!(adapter = %self.name, "adapter stream ended");
                return Ok(Flow::Stop);
            }
            Err(err) => return Err(err),
        };
        self.frames += 1;

        if self.assembler.pending() > 0 {
            self.assembler.sweep(Utc::now());
        }

        let ProcessResult::MessageComplete(message) = self.assembler.process_frame(frame) else {
            return Ok(Flow::Continue);
        };

        let definition = self.catalog.get(message.pgn).map(|def| &**def);
        let decoded = engine::decode(message, definition);
        if self.output.send(decoded).await.is_err() {
            info!(adapter = %self.name, "output channel closed");
            return Ok(Flow::Stop);
        }
        self.messages += 1;
        Ok(Flow::Continue)
    }

    /// Oversized frames are refused and logged; anything else that fails the
    /// write ends the worker.
    async fn write(&mut self, frame: &RawFrame) -> Result<(), AdapterError> {
        match self.framer.write(frame).await {
            Ok(()) => {
                self.written += 1;
                Ok(())
            }
            Err(AdapterError::UnsupportedLongWrite { len }) => {
                warn!(adapter = %self.name, pgn = frame.pgn, len, "outbound frame rejected");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn report(&self) -> WorkerReport {
        WorkerReport {
            name: self.name.clone(),
            frames: self.frames,
            messages: self.messages,
            written: self.written,
            reassembly: self.assembler.stats(),
            framing_errors: self.framer.framing_errors(),
        }
    }
}

//==================================================================================GATEWAY
struct WorkerHandle {
    name: String,
    outbound: mpsc::Sender<RawFrame>,
    task: JoinHandle<Result<WorkerReport, AdapterError>>,
}

/// Set of running workers sharing one output channel.
///
/// The gateway keeps a sender of the output channel: the receiver only sees
/// the end of the stream once [`Gateway::join`] has been called.
pub struct Gateway {
    catalog: Arc<Catalog>,
    output: mpsc::Sender<DecodedMessage>,
    workers: Vec<WorkerHandle>,
}

impl Gateway {
    /// Empty gateway and the receiving end of its output channel.
    pub fn new(catalog: Arc<Catalog>, channel_capacity: usize) -> (Self, mpsc::Receiver<DecodedMessage>) {
        let (output, receiver) = mpsc::channel(channel_capacity.max(1));
        let gateway = Self {
            catalog,
            output,
            workers: Vec::new(),
        };
        (gateway, receiver)
    }

    /// Start one worker per configured adapter.
    ///
    /// Sources are opened inside the workers: an adapter that cannot be
    /// opened shows up as an error from [`Gateway::join`] without stopping
    /// the others. Must be called within a tokio runtime.
    pub fn spawn(config: &GatewayConfig, catalog: Arc<Catalog>) -> (Self, mpsc::Receiver<DecodedMessage>) {
        let (mut gateway, receiver) = Self::new(catalog, config.channel_capacity);
        for adapter in &config.adapters {
            gateway.connect(adapter.clone());
        }
        (gateway, receiver)
    }

    /// Open the adapter described by `config` in a new worker.
    pub fn connect(&mut self, config: AdapterConfig) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let catalog = self.catalog.clone();
        let output = self.output.clone();
        let name = config.name.clone();

        let task = tokio::spawn(async move {
            let framer = connect(&config).await.inspect_err(|err| {
                warn!(adapter = %config.name, %err, "adapter could not be opened");
            })?;
            Worker::new(config.name, framer, catalog, &config.reassembly, output)
                .with_outbound(outbound_rx)
                .run()
                .await
        });
        self.push(name, outbound_tx, task);
    }

    /// Run a worker over an already-built framer.
    pub fn attach(&mut self, name: impl Into<String>, framer: Box<dyn AdapterFramer>, reassembly: &ReassemblerConfig) {
        let name = name.into();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let worker = Worker::new(
            name.clone(),
            framer,
            self.catalog.clone(),
            reassembly,
            self.output.clone(),
        )
        .with_outbound(outbound_rx);

        let task = tokio::spawn(worker.run());
        self.push(name, outbound_tx, task);
    }

    fn push(
        &mut self,
        name: String,
        outbound: mpsc::Sender<RawFrame>,
        task: JoinHandle<Result<WorkerReport, AdapterError>>,
    ) {
        info!(adapter = %name, "worker spawned");
        self.workers.push(WorkerHandle {
            name,
            outbound,
            task,
        });
    }

    /// Names of the adapters, in spawn order.
    pub fn adapters(&self) -> impl Iterator<Item = &str> {
        self.workers.iter().map(|w| w.name.as_str())
    }

    /// Queue for frames to write on adapter `name`.
    pub fn sender(&self, name: &str) -> Option<mpsc::Sender<RawFrame>> {
        self.workers
            .iter()
            .find(|w| w.name == name)
            .map(|w| w.outbound.clone())
    }

    /// Wait for every worker to stop and collect their outcomes, in spawn
    /// order. The output channel closes once the last worker is gone.
    pub async fn join(self) -> Vec<(String, Result<WorkerReport, GatewayError>)> {
        let Gateway {
            output, workers, ..
        } = self;
        drop(output);

        let mut outcomes = Vec::with_capacity(workers.len());
        for WorkerHandle {
            name,
            outbound,
            task,
        } in workers
        {
            drop(outbound);
            let outcome = match task.await {
                Ok(Ok(report)) => Ok(report),
                Ok(Err(source)) => Err(GatewayError::Adapter {
                    name: name.clone(),
                    source,
                }),
                Err(source) => Err(GatewayError::Join {
                    name: name.clone(),
                    source,
                }),
            };
            outcomes.push((name, outcome));
        }
        outcomes
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
