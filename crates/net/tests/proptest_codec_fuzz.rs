//! Fuzz-style property tests for the packet codec
//!
//! These tests validate that frame decoders handle arbitrary
//! network input gracefully without crashing.

use mdbeta_net::{
    decode_client_frame, decode_server_frame, drain_frames, encode_client_packet,
    encode_server_packet, ClientPacket, DigState, Frame, ServerPacket, PROTOCOL_VERSION,
};
use proptest::prelude::*;

fn dig_state() -> impl Strategy<Value = DigState> {
    prop_oneof![
        Just(DigState::Started),
        Just(DigState::Digging),
        Just(DigState::Stopped),
        Just(DigState::Broken),
    ]
}

proptest! {
    /// Property: Arbitrary bytes don't crash client decoder
    #[test]
    fn arbitrary_bytes_dont_crash_client(
        random_bytes in prop::collection::vec(any::<u8>(), 0..2000),
    ) {
        let _result = decode_client_frame(&random_bytes);
    }

    /// Property: Arbitrary bytes don't crash server decoder
    #[test]
    fn arbitrary_bytes_dont_crash_server(
        random_bytes in prop::collection::vec(any::<u8>(), 0..2000),
    ) {
        let _result = decode_server_frame(&random_bytes);
    }

    /// Property: Login packets survive framing
    #[test]
    fn login_survives_framing(
        username in "[a-zA-Z0-9_]{1,16}",
        schema_hash in any::<u64>(),
    ) {
        let packet = ClientPacket::Login {
            protocol: PROTOCOL_VERSION,
            username,
            schema_hash,
        };

        let encoded = encode_client_packet(&packet).unwrap();
        let decoded = decode_client_frame(&encoded).unwrap();

        prop_assert_eq!(decoded, Some((Frame::Packet(packet), encoded.len())));
    }

    /// Property: Digging packets survive framing
    #[test]
    fn digging_survives_framing(
        state in dig_state(),
        x in any::<i32>(),
        y in 0i32..128,
        z in any::<i32>(),
        face in 0u8..6,
    ) {
        let packet = ClientPacket::Digging { state, x, y, z, face };

        let encoded = encode_client_packet(&packet).unwrap();
        let decoded = decode_client_frame(&encoded).unwrap();

        prop_assert_eq!(decoded, Some((Frame::Packet(packet), encoded.len())));
    }

    /// Property: Block changes survive framing
    #[test]
    fn block_change_survives_framing(
        x in any::<i32>(),
        y in 0i32..128,
        z in any::<i32>(),
        block in any::<u8>(),
        metadata in 0u8..16,
    ) {
        let packet = ServerPacket::BlockChange { x, y, z, block, metadata };

        let encoded = encode_server_packet(&packet).unwrap();
        let decoded = decode_server_frame(&encoded).unwrap();

        prop_assert_eq!(decoded, Some((Frame::Packet(packet), encoded.len())));
    }

    /// Property: Any split of a frame stream yields the same packets
    #[test]
    fn stream_split_is_transparent(split in 0usize..64) {
        let packets = vec![
            ClientPacket::Ping,
            ClientPacket::Chat { message: "hello".into() },
            ClientPacket::Equip { slot: 4 },
        ];
        let mut stream = Vec::new();
        for packet in &packets {
            stream.extend(encode_client_packet(packet).unwrap());
        }
        let split = split.min(stream.len());

        let mut buffer = stream[..split].to_vec();
        let mut frames: Vec<Frame<ClientPacket>> = drain_frames(&mut buffer).unwrap();
        buffer.extend_from_slice(&stream[split..]);
        frames.extend(drain_frames::<ClientPacket>(&mut buffer).unwrap());

        let expected: Vec<_> = packets.into_iter().map(Frame::Packet).collect();
        prop_assert_eq!(frames, expected);
        prop_assert!(buffer.is_empty());
    }

    /// Property: Truncated frames never decode to a packet
    #[test]
    fn truncated_frames_handled(truncate_at in 0usize..50) {
        let packet = ClientPacket::Handshake { username: "alice".into() };

        let mut encoded = encode_client_packet(&packet).unwrap();

        if truncate_at < encoded.len() {
            encoded.truncate(truncate_at);
            let result = decode_client_frame(&encoded);
            prop_assert!(matches!(result, Ok(None)));
        }
    }

    /// Property: Corrupted payload handled
    #[test]
    fn corrupted_payload_handled(
        flip_pos in 0usize..30,
        flip_bit in 0u8..8,
    ) {
        let packet = ClientPacket::Login {
            protocol: PROTOCOL_VERSION,
            username: "bob".into(),
            schema_hash: 0xDEADBEEF,
        };

        let mut encoded = encode_client_packet(&packet).unwrap();

        if flip_pos + 5 < encoded.len() {
            encoded[flip_pos + 5] ^= 1 << flip_bit;
            let _result = decode_client_frame(&encoded);
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn empty_input_is_incomplete() {
        assert!(matches!(decode_client_frame(&[]), Ok(None)));
        assert!(matches!(decode_server_frame(&[]), Ok(None)));
    }

    #[test]
    fn valid_roundtrip() {
        let packet = ServerPacket::Time { tick: 6000 };

        let encoded = encode_server_packet(&packet).unwrap();
        let decoded = decode_server_frame(&encoded).unwrap();

        assert_eq!(decoded, Some((Frame::Packet(packet), encoded.len())));
    }
}
