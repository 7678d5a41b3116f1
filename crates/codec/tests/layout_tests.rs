// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Relay Contributors
//
// Wire-layout conformance tests for the binary metadata codec

use relay_codec::{
    BinaryCodec, MessageCodec, MessageMetadata, MetadataPatch, FLAG_CORRELATION_ID,
    FLAG_PRIORITY, FLAG_ROUTING_KEY, FLAG_TTL,
};

const OFFSET_ATTEMPTS: usize = 33;
const OFFSET_FLAGS: usize = 42;

#[test]
fn test_fixed_region_offsets() {
    // Test: id, ts and producer_id sit at their documented offsets
    let codec = BinaryCodec::new();
    let meta = MessageMetadata::new(0x01020304, 0x0A0B0C0D, "t", 1_700_000_000_000);
    let encoded = codec.encode_metadata(&meta).unwrap();

    assert_eq!(&encoded[0..4], &[0x01, 0x02, 0x03, 0x04]);
    assert_eq!(&encoded[4..12], &(1_700_000_000_000u64 as f64).to_be_bytes());
    assert_eq!(&encoded[12..16], &[0x0A, 0x0B, 0x0C, 0x0D]);
    assert_eq!(encoded[OFFSET_ATTEMPTS], 1);
}

#[test]
fn test_flag_bitmap_values() {
    let codec = BinaryCodec::new();
    let meta = MessageMetadata::new(1, 1, "t", 1_000)
        .with_priority(5)
        .with_ttl(100)
        .with_correlation_id("c")
        .with_routing_key("r");
    let encoded = codec.encode_metadata(&meta).unwrap();

    assert_eq!(
        encoded[OFFSET_FLAGS],
        FLAG_PRIORITY | FLAG_TTL | FLAG_CORRELATION_ID | FLAG_ROUTING_KEY
    );
}

#[test]
fn test_variable_fields_are_length_prefixed_utf8() {
    let codec = BinaryCodec::new();
    let meta = MessageMetadata::new(1, 1, "orders", 1_000);
    let encoded = codec.encode_metadata(&meta).unwrap();

    // topic: u16 length prefix then bytes
    assert_eq!(&encoded[43..45], &6u16.to_be_bytes());
    assert_eq!(&encoded[45..51], b"orders");
    assert_eq!(encoded.len(), 51);
}

#[test]
fn test_patch_preserves_unrelated_bytes() {
    let codec = BinaryCodec::new();
    let meta = MessageMetadata::new(1, 1, "orders", 1_000).with_routing_key("red");
    let encoded = codec.encode_metadata(&meta).unwrap();

    let patched = codec
        .update_metadata(&encoded, &MetadataPatch::attempts(7))
        .unwrap();
    assert_eq!(patched.len(), encoded.len());
    assert_eq!(patched[OFFSET_ATTEMPTS], 7);

    // Every other byte is untouched
    for (i, (a, b)) in encoded.iter().zip(patched.iter()).enumerate() {
        if i != OFFSET_ATTEMPTS {
            assert_eq!(a, b, "byte {} changed", i);
        }
    }
}
