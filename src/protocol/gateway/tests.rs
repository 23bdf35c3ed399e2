//! Worker loop and gateway supervision over an in-memory framer.
use super::*;
use crate::config::{AdapterProtocol, AdapterSource};
use crate::core::{FieldDefinition, FieldValue, PgnDefinition};
use crate::protocol::transport::fast_packet::builder::FastPacketBuilder;
use crate::protocol::transport::traits::adapter::ChannelState;
use async_trait::async_trait;
use std::time::Duration;

//==================================================================================MOCK_FRAMER
/// Framer fed from a channel; `read` reports `Disconnected` once the test
/// side is dropped.
struct MockFramer {
    inbound: mpsc::UnboundedReceiver<Result<RawFrame, AdapterError>>,
    written: mpsc::UnboundedSender<RawFrame>,
    state: ChannelState,
}

/// Test side of a [`MockFramer`].
struct MockAdapter {
    inbound: mpsc::UnboundedSender<Result<RawFrame, AdapterError>>,
    written: mpsc::UnboundedReceiver<RawFrame>,
}

impl MockAdapter {
    fn push(&self, frame: RawFrame) {
        self.inbound.send(Ok(frame)).unwrap();
    }
}

fn mock_pair() -> (Box<dyn AdapterFramer>, MockAdapter) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (written_tx, written_rx) = mpsc::unbounded_channel();
    let framer = MockFramer {
        inbound: inbound_rx,
        written: written_tx,
        state: ChannelState::Idle,
    };
    let adapter = MockAdapter {
        inbound: inbound_tx,
        written: written_rx,
    };
    (Box::new(framer), adapter)
}

#[async_trait]
impl AdapterFramer for MockFramer {
    async fn open(&mut self) -> Result<(), AdapterError> {
        if self.state == ChannelState::Idle {
            self.state = ChannelState::Open;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), AdapterError> {
        self.state = ChannelState::Closed;
        Ok(())
    }

    async fn read(&mut self) -> Result<RawFrame, AdapterError> {
        if self.state != ChannelState::Open {
            return Err(AdapterError::ChannelClosed);
        }
        self.inbound
            .recv()
            .await
            .unwrap_or(Err(AdapterError::Disconnected))
    }

    async fn write(&mut self, frame: &RawFrame) -> Result<(), AdapterError> {
        if frame.data.len() > 8 {
            return Err(AdapterError::UnsupportedLongWrite {
                len: frame.data.len(),
            });
        }
        let _ = self.written.send(frame.clone());
        Ok(())
    }

    fn state(&self) -> ChannelState {
        self.state
    }

    fn framing_errors(&self) -> u64 {
        0
    }
}

//==================================================================================FIXTURES
fn catalog() -> Arc<Catalog> {
    let rudder = PgnDefinition::new(127245, "Rudder", 8)
        .field(FieldDefinition::number("Instance", 0, 8))
        .field(FieldDefinition::reserved(8, 8))
        .field(
            FieldDefinition::number("Angle Order", 16, 16)
                .signed()
                .with_resolution(0.0001)
                .with_unit("rad"),
        );
    let product = PgnDefinition::new(126996, "Product Information", 134)
        .field(FieldDefinition::number("NMEA 2000 Version", 0, 16))
        .field(FieldDefinition::number("Product Code", 16, 16));
    Arc::new(Catalog::from_definitions([rudder, product]).unwrap())
}

/// Rudder instance 0, angle order raw -100.
fn rudder_frame(source: u8) -> RawFrame {
    RawFrame::new(127245, source, vec![0x00, 0xFF, 0x9C, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]).with_priority(2)
}

/// Product information: version 2100, product code 12345, padded to 134 bytes.
fn product_payload() -> Vec<u8> {
    let mut payload = vec![0xFF; 134];
    payload[..4].copy_from_slice(&[0x34, 0x08, 0x39, 0x30]);
    payload
}

fn gateway_with(names: &[&str]) -> (Gateway, mpsc::Receiver<DecodedMessage>, Vec<MockAdapter>) {
    let (mut gateway, rx) = Gateway::new(catalog(), 16);
    let adapters = names
        .iter()
        .map(|name| {
            let (framer, adapter) = mock_pair();
            gateway.attach(*name, framer, &ReassemblerConfig::default());
            adapter
        })
        .collect();
    (gateway, rx, adapters)
}

async fn single_report(gateway: Gateway) -> WorkerReport {
    let mut outcomes = gateway.join().await;
    assert_eq!(outcomes.len(), 1);
    outcomes.remove(0).1.unwrap()
}

//==================================================================================TESTS
#[tokio::test]
async fn test_single_frame_decoded() {
    let (gateway, mut rx, mut adapters) = gateway_with(&["nmea"]);
    let adapter = adapters.remove(0);
    adapter.push(rudder_frame(0x23));

    let message = rx.recv().await.unwrap();
    assert_eq!(message.name.as_deref(), Some("Rudder"));
    assert_eq!(message.source, 0x23);
    assert_eq!(message.priority, 2);
    assert_eq!(message.field("Instance"), Some(&FieldValue::Unsigned(0)));
    let angle = message.field("Angle Order").and_then(FieldValue::as_f64).unwrap();
    assert!((angle + 0.01).abs() < 1e-9);

    drop(adapter);
    let report = single_report(gateway).await;
    assert_eq!(report.name, "nmea");
    assert_eq!(report.frames, 1);
    assert_eq!(report.messages, 1);
}

#[tokio::test]
async fn test_fast_packet_decoded() {
    let (gateway, mut rx, mut adapters) = gateway_with(&["nmea"]);
    let adapter = adapters.remove(0);

    let payload = product_payload();
    let frames: Vec<RawFrame> = FastPacketBuilder::new(126996, 0x23, &payload)
        .build()
        .unwrap()
        .collect();
    assert_eq!(frames.len(), 20);
    for frame in frames {
        adapter.push(frame);
    }

    let message = rx.recv().await.unwrap();
    assert_eq!(message.pgn, 126996);
    assert_eq!(message.payload, payload);
    assert_eq!(message.field("NMEA 2000 Version"), Some(&FieldValue::Unsigned(2100)));
    assert_eq!(message.field("Product Code"), Some(&FieldValue::Unsigned(12345)));

    drop(adapter);
    let report = single_report(gateway).await;
    assert_eq!(report.frames, 20);
    assert_eq!(report.messages, 1);
    assert_eq!(report.reassembly.completed, 1);
}

#[tokio::test]
/// PGNs missing from the catalog are delivered raw.
async fn test_unknown_pgn_passthrough() {
    let (gateway, mut rx, adapters) = gateway_with(&["nmea"]);
    adapters[0].push(RawFrame::new(65280, 0x10, vec![1, 2, 3]));

    let message = rx.recv().await.unwrap();
    assert!(!message.is_known());
    assert!(message.fields.is_empty());
    assert_eq!(message.payload, [1, 2, 3]);

    drop(adapters);
    single_report(gateway).await;
}

#[tokio::test]
async fn test_adapters_share_output() {
    let (gateway, mut rx, adapters) = gateway_with(&["port", "starboard"]);
    assert_eq!(gateway.adapters().collect::<Vec<_>>(), ["port", "starboard"]);

    adapters[0].push(rudder_frame(1));
    adapters[1].push(rudder_frame(2));

    let mut sources = vec![rx.recv().await.unwrap().source, rx.recv().await.unwrap().source];
    sources.sort_unstable();
    assert_eq!(sources, [1, 2]);

    drop(adapters);
    let outcomes = gateway.join().await;
    let names: Vec<_> = outcomes.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["port", "starboard"]);
    assert!(outcomes.iter().all(|(_, outcome)| outcome.is_ok()));
}

#[tokio::test]
/// A failing stream ends its own worker only.
async fn test_stream_failure_isolated() {
    let (gateway, mut rx, adapters) = gateway_with(&["broken", "healthy"]);

    adapters[0]
        .inbound
        .send(Err(AdapterError::Io(std::io::Error::other("unplugged"))))
        .unwrap();
    adapters[1].push(rudder_frame(7));
    assert_eq!(rx.recv().await.unwrap().source, 7);

    drop(adapters);
    let outcomes = gateway.join().await;
    assert!(matches!(
        &outcomes[0].1,
        Err(GatewayError::Adapter {
            name,
            source: AdapterError::Io(_)
        }) if name == "broken"
    ));
    assert!(outcomes[1].1.is_ok());
}

#[tokio::test]
async fn test_output_closed_stops_worker() {
    let (gateway, rx, adapters) = gateway_with(&["nmea"]);
    drop(rx);
    adapters[0].push(rudder_frame(1));

    let report = single_report(gateway).await;
    assert_eq!(report.frames, 1);
    assert_eq!(report.messages, 0);
    drop(adapters);
}

#[tokio::test]
/// Outbound frames are written between reads; oversized ones are refused
/// without stopping the worker.
async fn test_outbound_frames_written() {
    let (gateway, _rx, mut adapters) = gateway_with(&["nmea"]);
    let sender = gateway.sender("nmea").unwrap();
    assert!(gateway.sender("unknown").is_none());

    sender.send(RawFrame::new(126996, 0x23, vec![0; 12])).await.unwrap();
    let frame = rudder_frame(0x23);
    sender.send(frame.clone()).await.unwrap();

    let mut adapter = adapters.remove(0);
    assert_eq!(adapter.written.recv().await.unwrap(), frame);

    drop(adapter);
    let report = single_report(gateway).await;
    assert_eq!(report.written, 1);
}

#[tokio::test]
/// Partials idle past the timeout are evicted when the next frame arrives.
async fn test_idle_partials_evicted() {
    let (mut gateway, mut rx) = Gateway::new(catalog(), 16);
    let (framer, adapter) = mock_pair();
    let reassembly = ReassemblerConfig::with_partial_timeout(Duration::from_millis(10));
    gateway.attach("nmea", framer, &reassembly);

    let payload = product_payload();
    let first = FastPacketBuilder::new(126996, 0x23, &payload)
        .build()
        .unwrap()
        .next()
        .unwrap();
    adapter.push(first);
    tokio::time::sleep(Duration::from_millis(50)).await;
    adapter.push(rudder_frame(0x23));
    assert_eq!(rx.recv().await.unwrap().pgn, 127245);

    drop(adapter);
    let report = single_report(gateway).await;
    assert_eq!(report.reassembly.expired, 1);
}

#[tokio::test]
async fn test_unopenable_source_reported() {
    let config = GatewayConfig {
        adapters: vec![AdapterConfig::new(
            "missing",
            AdapterProtocol::Actisense,
            AdapterSource::Replay {
                path: "/nonexistent/n2k-gateway/capture.bin".into(),
            },
        )],
        ..GatewayConfig::default()
    };
    let (gateway, mut rx) = Gateway::spawn(&config, catalog());

    let outcomes = gateway.join().await;
    assert!(matches!(
        &outcomes[0].1,
        Err(GatewayError::Adapter {
            source: AdapterError::Io(_),
            ..
        })
    ));
    assert!(rx.recv().await.is_none());
}
