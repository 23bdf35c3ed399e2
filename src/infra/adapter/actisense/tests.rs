//! Actisense record scanning, encoding and framer behavior.
use super::*;
use crate::error::AdapterError;
use crate::infra::adapter::StreamFramer;
use crate::protocol::transport::traits::adapter::AdapterFramer;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

fn scan(protocol: &mut ActisenseProtocol, input: &[u8]) -> Vec<Result<RawFrame, FramingError>> {
    input.iter().filter_map(|&b| protocol.push_byte(b)).collect()
}

fn record(command: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    encode_record(command, body, &mut out);
    out
}

/// 0x93 body: priority 2, PGN 129025, broadcast, source 0x23, timestamp, data.
fn received_body(data: &[u8]) -> Vec<u8> {
    let mut body = vec![2, 0x01, 0xF8, 0x01, 0xFF, 0x23, 0x78, 0x56, 0x34, 0x12];
    body.push(data.len() as u8);
    body.extend_from_slice(data);
    body
}

//==================================================================================RECORDS

#[test]
/// Receive-all command as it appears on the wire.
fn test_open_sequence_bytes() {
    assert_eq!(
        ActisenseProtocol::new().open_sequence(),
        [0x10, 0x02, 0xA1, 0x03, 0x11, 0x02, 0x00, 0x49, 0x10, 0x03]
    );
    assert!(ActisenseProtocol::new().close_sequence().is_empty());
}

#[test]
/// DLE bytes inside a record are doubled, markers are not.
fn test_encode_record_escapes_dle() {
    let bytes = record(0xA1, &[0x10]);
    // sum: A1 + 01 + 10 = B2, checksum 4E
    assert_eq!(bytes, [0x10, 0x02, 0xA1, 0x01, 0x10, 0x10, 0x4E, 0x10, 0x03]);
}

#[test]
fn test_parse_received_frame() {
    let mut protocol = ActisenseProtocol::new();
    let results = scan(&mut protocol, &record(CMD_N2K_RECEIVED, &received_body(&[0xAA, 0x10, 0xCC])));

    assert_eq!(results.len(), 1);
    let frame = results[0].as_ref().unwrap();
    assert_eq!(frame.priority, 2);
    assert_eq!(frame.pgn, 129025);
    assert_eq!(frame.destination, 255);
    assert_eq!(frame.source, 0x23);
    assert_eq!(frame.data, [0xAA, 0x10, 0xCC]);
}

#[test]
/// Noise and gateway responses between records produce nothing.
fn test_noise_and_responses_skipped() {
    let mut input = vec![0x00, 0xFF, 0x10, 0x41, 0x03];
    input.extend(record(CMD_NGT_RESPONSE, &[0x11, 0x01]));
    input.extend(record(CMD_N2K_RECEIVED, &received_body(&[1, 2])));

    let results = scan(&mut ActisenseProtocol::new(), &input);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].as_ref().unwrap().data, [1, 2]);
}

#[test]
fn test_bad_checksum() {
    let mut bytes = record(CMD_N2K_RECEIVED, &received_body(&[1, 2]));
    let checksum_at = bytes.len() - 3;
    bytes[checksum_at] = bytes[checksum_at].wrapping_add(1);

    let results = scan(&mut ActisenseProtocol::new(), &bytes);
    assert_eq!(results, [Err(FramingError::BadChecksum { sum: 1 })]);
}

#[test]
fn test_unknown_command() {
    let results = scan(&mut ActisenseProtocol::new(), &record(0x95, &[1, 2, 3]));
    assert_eq!(results, [Err(FramingError::UnknownCommand { command: 0x95 })]);
}

#[test]
/// More than eight data bytes cannot come from one CAN frame.
fn test_received_data_too_long() {
    let results = scan(
        &mut ActisenseProtocol::new(),
        &record(CMD_N2K_RECEIVED, &received_body(&[0; 9])),
    );
    assert_eq!(results, [Err(FramingError::InvalidLength { len: 9 })]);
}

#[test]
fn test_inconsistent_lengths() {
    // Inner data length says 4, only 2 bytes present.
    let mut body = received_body(&[1, 2]);
    body[10] = 4;
    let results = scan(&mut ActisenseProtocol::new(), &record(CMD_N2K_RECEIVED, &body));
    assert_eq!(
        results,
        [Err(FramingError::Truncated {
            expected: 15,
            actual: 13
        })]
    );

    // Record length byte disagrees with the bytes between the markers.
    let input = [DLE, STX, CMD_N2K_RECEIVED, 0x05, 0x01, 0x67, DLE, ETX];
    let results = scan(&mut ActisenseProtocol::new(), &input);
    assert_eq!(
        results,
        [Err(FramingError::Truncated {
            expected: 8,
            actual: 4
        })]
    );
}

#[test]
/// A bad escape drops the record; the next record still parses.
fn test_invalid_escape_recovers() {
    let mut input = vec![DLE, STX, CMD_N2K_RECEIVED, 0x02, DLE, 0x05];
    input.extend(record(CMD_N2K_RECEIVED, &received_body(&[7])));

    let results = scan(&mut ActisenseProtocol::new(), &input);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0], Err(FramingError::InvalidEscape { byte: 0x05 }));
    assert_eq!(results[1].as_ref().unwrap().data, [7]);
}

#[test]
/// A start marker inside a record abandons it and opens a new one.
fn test_restart_inside_record() {
    let mut input = vec![DLE, STX, CMD_N2K_RECEIVED, 0x13];
    input.extend(record(CMD_N2K_RECEIVED, &received_body(&[9])));

    let results = scan(&mut ActisenseProtocol::new(), &input);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0], Err(FramingError::InvalidEscape { byte: STX }));
    assert_eq!(results[1].as_ref().unwrap().data, [9]);
}

#[test]
fn test_encode_frame() {
    let frame = RawFrame::new(59904, 0x23, vec![0x00, 0xEE, 0x00])
        .with_priority(6)
        .with_destination(0x50);
    let mut out = Vec::new();
    ActisenseProtocol::new().encode(&frame, &mut out);

    let body = [6, 0x00, 0xEA, 0x00, 0x50, 3, 0x00, 0xEE, 0x00];
    assert_eq!(out, record(CMD_N2K_SEND, &body));

    // Unescaped record sums to zero.
    let inner = &out[2..out.len() - 2];
    assert_eq!(inner.iter().fold(0u8, |a, b| a.wrapping_add(*b)), 0);
}

//==================================================================================FRAMER

fn framer_pair() -> (StreamFramer<ActisenseProtocol>, DuplexStream) {
    let (ours, theirs) = duplex(4096);
    let (reader, writer) = tokio::io::split(ours);
    (StreamFramer::new(ActisenseProtocol::new(), reader, writer), theirs)
}

#[tokio::test]
async fn test_framer_open_close() {
    let (mut framer, mut adapter) = framer_pair();
    framer.open().await.unwrap();
    framer.close().await.unwrap();

    let mut sent = Vec::new();
    adapter.read_to_end(&mut sent).await.unwrap();
    assert_eq!(sent, ActisenseProtocol::new().open_sequence());
}

#[tokio::test]
/// Records split at arbitrary points, escapes included.
async fn test_framer_read_split_records() {
    let (mut framer, mut adapter) = framer_pair();
    framer.open().await.unwrap();

    let mut stream = record(CMD_N2K_RECEIVED, &received_body(&[0x10, 0x10]));
    stream.extend(record(CMD_N2K_RECEIVED, &received_body(&[0x42])));
    for chunk in stream.chunks(3) {
        adapter.write_all(chunk).await.unwrap();
    }

    assert_eq!(framer.read().await.unwrap().data, [0x10, 0x10]);
    assert_eq!(framer.read().await.unwrap().data, [0x42]);
    assert_eq!(framer.framing_errors(), 0);
}

#[tokio::test]
async fn test_framer_long_write_rejected() {
    let (mut framer, mut adapter) = framer_pair();
    framer.open().await.unwrap();

    let frame = RawFrame::new(129025, 0x23, vec![0; 12]);
    assert!(matches!(
        framer.write(&frame).await,
        Err(AdapterError::UnsupportedLongWrite { len: 12 })
    ));
    drop(framer);

    let mut sent = Vec::new();
    adapter.read_to_end(&mut sent).await.unwrap();
    assert_eq!(sent, ActisenseProtocol::new().open_sequence());
}
