/// Fixtures shared by the integration tests: a small catalog, in-memory
/// adapter streams and wire encoders playing the adapter side.
use std::sync::Arc;

use n2k_gateway::config::AdapterProtocol;
use n2k_gateway::core::{FieldDefinition, FieldKind, PgnDefinition};
use n2k_gateway::infra::adapter::actisense::{encode_record, CMD_N2K_RECEIVED};
use n2k_gateway::infra::adapter::framer_for;
use n2k_gateway::protocol::catalog::Catalog;
use n2k_gateway::protocol::transport::traits::adapter::AdapterFramer;
use n2k_gateway::RawFrame;
use tokio::io::{duplex, DuplexStream};

#[allow(dead_code)]
pub const WIND_PGN: u32 = 130306;
#[allow(dead_code)]
pub const PRODUCT_PGN: u32 = 126996;

#[allow(dead_code)]
pub fn wind_definition() -> PgnDefinition {
    PgnDefinition::new(WIND_PGN, "Wind Data", 6)
        .field(FieldDefinition::number("SID", 0, 8))
        .field(
            FieldDefinition::number("Wind Speed", 8, 16)
                .with_resolution(0.01)
                .with_unit("m/s"),
        )
        .field(
            FieldDefinition::number("Wind Angle", 24, 16)
                .with_resolution(0.0001)
                .with_unit("rad"),
        )
        .field(FieldDefinition::number("Reference", 40, 3).with_lookup([(0, "True"), (2, "Apparent")]))
        .field(FieldDefinition::reserved(43, 5))
}

#[allow(dead_code)]
pub fn catalog() -> Arc<Catalog> {
    let product = PgnDefinition::new(PRODUCT_PGN, "Product Information", 134)
        .field(FieldDefinition::number("NMEA 2000 Version", 0, 16))
        .field(FieldDefinition::number("Product Code", 16, 16))
        .field(FieldDefinition::number("Model ID", 32, 256).with_kind(FieldKind::StringFix));
    Arc::new(Catalog::from_definitions([wind_definition(), product]).unwrap())
}

#[allow(dead_code)]
/// Wind 10 m/s at 1.5708 rad, apparent.
pub fn wind_frame(source: u8) -> RawFrame {
    RawFrame::new(WIND_PGN, source, vec![0x00, 0xE8, 0x03, 0x5C, 0x3D, 0xFA]).with_priority(2)
}

#[allow(dead_code)]
/// Product information with model id "WS-200", padded to 134 bytes.
pub fn product_payload() -> Vec<u8> {
    let mut payload = vec![0xFF; 134];
    payload[..4].copy_from_slice(&[0x34, 0x08, 0x39, 0x30]);
    payload[4..10].copy_from_slice(b"WS-200");
    payload
}

#[allow(dead_code)]
/// SLCAN line as an adapter emits it (full identifier, source included).
pub fn slcan_line(frame: &RawFrame) -> Vec<u8> {
    let mut line = format!("T{:08X}{}", frame.can_id().0, frame.data.len());
    for byte in &frame.data {
        line.push_str(&format!("{byte:02X}"));
    }
    line.push('\r');
    line.into_bytes()
}

#[allow(dead_code)]
/// Actisense "received" record for `frame`, gateway timestamp zeroed.
pub fn actisense_record(frame: &RawFrame) -> Vec<u8> {
    let [pgn0, pgn1, pgn2, _] = frame.pgn.to_le_bytes();
    let mut body = vec![
        frame.priority,
        pgn0,
        pgn1,
        pgn2,
        frame.destination,
        frame.source,
        0,
        0,
        0,
        0,
        frame.data.len() as u8,
    ];
    body.extend_from_slice(&frame.data);

    let mut out = Vec::new();
    encode_record(CMD_N2K_RECEIVED, &body, &mut out);
    out
}

#[allow(dead_code)]
/// Framer over an in-memory stream and the adapter end of that stream.
pub fn framer_pair(protocol: AdapterProtocol) -> (Box<dyn AdapterFramer>, DuplexStream) {
    let (ours, theirs) = duplex(4096);
    let (reader, writer) = tokio::io::split(ours);
    (framer_for(protocol, reader, writer), theirs)
}

#[allow(dead_code)]
pub fn slcan() -> AdapterProtocol {
    AdapterProtocol::Slcan { bitrate: 5 }
}

#[allow(dead_code)]
/// Scratch file path unique to this test process.
pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("n2k-gateway-{}-{name}", std::process::id()))
}
