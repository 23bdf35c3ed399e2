//! Tests for the outbound frame generator (`FrameIterator`).
// BUILDER
use super::*;

#[test]
/// Short payload: remains a single classic CAN frame (no fast packet).
fn test_builder_single_frame() {
    let payload = [1, 2, 3, 4, 5];
    let mut iter = FastPacketBuilder::new(129025, 42, &payload).build().unwrap();

    let frame = iter.next().unwrap();
    assert_eq!(frame.data, payload);
    assert_eq!(frame.source, 42);
    assert_eq!(frame.destination, 255);

    // Should be the only frame
    assert!(iter.next().is_none());
}

#[test]
/// Ten-byte payload split across two fast packet frames.
fn test_builder_two_frames() {
    let payload = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
    let mut iter = FastPacketBuilder::new(129040, 50, &payload)
        .with_group(0)
        .build()
        .unwrap();

    // Frame 0
    let frame0 = iter.next().unwrap();
    assert_eq!(frame0.data, [0, 10, 1, 2, 3, 4, 5, 6]);

    // Frame 1, padded with 0xFF
    let frame1 = iter.next().unwrap();
    assert_eq!(frame1.data, [1, 7, 8, 9, 10, 0xFF, 0xFF, 0xFF]);

    assert!(iter.next().is_none());
}

#[test]
/// Maximum payload: ensures 32 frames are produced.
fn test_builder_max_payload() {
    let payload = [0xAA; 223];
    let frames: Vec<_> = FastPacketBuilder::new(129540, 25, &payload)
        .build()
        .unwrap()
        .collect();

    // 6 + 31*7 = 223 → 32 frames
    assert_eq!(frames.len(), 32);
    assert_eq!(frames[0].data[1], 223);
    assert_eq!(frames[31].data[0], 31);
    assert!(frames.iter().all(|f| f.data.len() == 8));
}

#[test]
/// Group id lands in bits 5-7 of every header byte.
fn test_builder_group_header() {
    let payload = [0u8; 20];
    let frames: Vec<_> = FastPacketBuilder::new(129029, 1, &payload)
        .with_group(5)
        .build()
        .unwrap()
        .collect();
    let headers: Vec<u8> = frames.iter().map(|f| f.data[0]).collect();
    assert_eq!(headers, [0b101_00000, 0b101_00001, 0b101_00010]);
    assert!(frames.iter().all(|f| f.group() == Some(5)));
}

#[test]
/// Destination-aware PGNs keep their target in the generated frames.
fn test_builder_with_destination() {
    let payload = [1, 2, 3];
    let frame = FastPacketBuilder::new(59904, 42, &payload)
        .with_destination(50)
        .with_priority(3)
        .build()
        .unwrap()
        .next()
        .unwrap();

    assert_eq!(frame.destination, 50);
    assert_eq!(frame.priority, 3);
    assert_eq!(frame.can_id().destination(), 50);
}

#[test]
/// Oversized payload is rejected before any frame is produced.
fn test_builder_payload_too_large() {
    let payload = [0u8; 224];
    assert!(matches!(
        FastPacketBuilder::new(129540, 25, &payload).build(),
        Err(EncodeError::PayloadTooLong { len: 224, max: 223 })
    ));
}

#[test]
fn test_group_counter_wraps() {
    let mut counter = GroupCounter::new();
    let groups: Vec<u8> = (0..10).map(|_| counter.next_group()).collect();
    assert_eq!(groups, [0, 1, 2, 3, 4, 5, 6, 7, 0, 1]);

    // Two counters never share state.
    let mut other = GroupCounter::new();
    assert_eq!(other.next_group(), 0);
}

#[test]
fn test_group_counter_builder() {
    let payload = [0u8; 12];
    let mut counter = GroupCounter::new();
    counter.next_group();
    let frame = counter
        .builder(129029, 1, &payload)
        .build()
        .unwrap()
        .next()
        .unwrap();
    assert_eq!(frame.group(), Some(1));
}
