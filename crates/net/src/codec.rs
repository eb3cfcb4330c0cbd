//! Packet framing.
//!
//! Frame format: `[length: u32 LE][packet id: u8][postcard payload]`, where the
//! length counts the id byte plus the payload.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::protocol::{ClientPacket, ServerPacket, PROTOCOL_MAGIC, PROTOCOL_VERSION};

/// Largest accepted frame body (id + payload).
pub const MAX_FRAME_LEN: usize = 256 * 1024;

const LENGTH_PREFIX: usize = 4;

/// Errors raised while framing or unframing packets.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Length prefix exceeds [`MAX_FRAME_LEN`].
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Announced length.
        len: usize,
        /// Limit.
        max: usize,
    },
    /// Length prefix of zero leaves no room for a packet id.
    #[error("empty frame")]
    EmptyFrame,
    /// Payload bytes do not decode.
    #[error("malformed payload for packet {id}: {source}")]
    Payload {
        /// Packet id from the frame header.
        id: u8,
        /// Postcard failure.
        #[source]
        source: postcard::Error,
    },
    /// Header id and payload variant disagree.
    #[error("frame header says packet {header} but payload is packet {payload}")]
    IdMismatch {
        /// Id from the frame header.
        header: u8,
        /// Id of the decoded packet.
        payload: u8,
    },
    /// Packet decoded but breaks protocol limits.
    #[error("invalid packet {id}: {reason}")]
    Invalid {
        /// Packet id.
        id: u8,
        /// Violated limit.
        reason: &'static str,
    },
    /// Packet failed to serialize.
    #[error("failed to encode packet {id}: {source}")]
    Encode {
        /// Packet id.
        id: u8,
        /// Postcard failure.
        #[source]
        source: postcard::Error,
    },
}

/// A packet type carried in frames.
pub trait WirePacket: Serialize + DeserializeOwned {
    /// Wire id of this packet.
    fn wire_id(&self) -> u8;

    /// Whether the codec can decode packets with this id.
    fn is_known(id: u8) -> bool;

    /// Protocol limit checks applied after decoding.
    fn check(&self) -> Result<(), &'static str>;
}

impl WirePacket for ClientPacket {
    fn wire_id(&self) -> u8 {
        self.id()
    }

    fn is_known(id: u8) -> bool {
        ClientPacket::is_known_id(id)
    }

    fn check(&self) -> Result<(), &'static str> {
        self.verify()
    }
}

impl WirePacket for ServerPacket {
    fn wire_id(&self) -> u8 {
        self.id()
    }

    fn is_known(id: u8) -> bool {
        ServerPacket::is_known_id(id)
    }

    fn check(&self) -> Result<(), &'static str> {
        self.verify()
    }
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame<P> {
    /// A packet the codec understands.
    Packet(P),
    /// A well-framed packet with an id the codec does not know; its bytes were skipped.
    Unknown {
        /// Packet id from the frame header.
        id: u8,
    },
}

/// Compute schema hash from protocol definitions.
///
/// This hash is used to ensure client and server have compatible protocol versions.
pub fn compute_schema_hash() -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&PROTOCOL_VERSION.to_le_bytes());
    hasher.update(PROTOCOL_MAGIC);
    hasher.update(b"ClientPacket");
    hasher.update(b"ServerPacket");
    hasher.update(b"ChunkPayload");
    hasher.update(b"ItemStack");

    let hash = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}

/// Encode any packet into a frame.
pub fn encode_packet<P: WirePacket>(packet: &P) -> Result<Vec<u8>, CodecError> {
    let id = packet.wire_id();
    let payload =
        postcard::to_allocvec(packet).map_err(|source| CodecError::Encode { id, source })?;

    let length = 1 + payload.len();
    if length > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge {
            len: length,
            max: MAX_FRAME_LEN,
        });
    }

    let mut frame = Vec::with_capacity(LENGTH_PREFIX + length);
    frame.extend_from_slice(&(length as u32).to_le_bytes());
    frame.push(id);
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode the first frame in `data`.
///
/// Returns `Ok(None)` while the frame is incomplete, otherwise the frame and the
/// number of bytes it consumed.
pub fn decode_frame<P: WirePacket>(data: &[u8]) -> Result<Option<(Frame<P>, usize)>, CodecError> {
    if data.len() < LENGTH_PREFIX {
        return Ok(None);
    }

    let length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if length == 0 {
        return Err(CodecError::EmptyFrame);
    }
    if length > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge {
            len: length,
            max: MAX_FRAME_LEN,
        });
    }
    if data.len() < LENGTH_PREFIX + length {
        return Ok(None);
    }

    let consumed = LENGTH_PREFIX + length;
    let id = data[LENGTH_PREFIX];
    if !P::is_known(id) {
        return Ok(Some((Frame::Unknown { id }, consumed)));
    }

    let payload = &data[LENGTH_PREFIX + 1..consumed];
    let packet: P = postcard::from_bytes(payload).map_err(|source| CodecError::Payload { id, source })?;
    if packet.wire_id() != id {
        return Err(CodecError::IdMismatch {
            header: id,
            payload: packet.wire_id(),
        });
    }
    packet
        .check()
        .map_err(|reason| CodecError::Invalid { id, reason })?;

    Ok(Some((Frame::Packet(packet), consumed)))
}

/// Encode a client packet with length prefix.
pub fn encode_client_packet(packet: &ClientPacket) -> Result<Vec<u8>, CodecError> {
    encode_packet(packet)
}

/// Encode a server packet with length prefix.
pub fn encode_server_packet(packet: &ServerPacket) -> Result<Vec<u8>, CodecError> {
    encode_packet(packet)
}

/// Decode the first client frame in `data`.
pub fn decode_client_frame(
    data: &[u8],
) -> Result<Option<(Frame<ClientPacket>, usize)>, CodecError> {
    decode_frame(data)
}

/// Decode the first server frame in `data`.
pub fn decode_server_frame(
    data: &[u8],
) -> Result<Option<(Frame<ServerPacket>, usize)>, CodecError> {
    decode_frame(data)
}

/// Decode every complete frame at the front of `buffer`, draining the consumed bytes.
///
/// Incomplete trailing bytes stay in the buffer. On error the buffer is left as it
/// was at the failing frame.
pub fn drain_frames<P: WirePacket>(buffer: &mut Vec<u8>) -> Result<Vec<Frame<P>>, CodecError> {
    let mut frames = Vec::new();
    let mut offset = 0;
    let result = loop {
        match decode_frame::<P>(&buffer[offset..]) {
            Ok(Some((frame, consumed))) => {
                frames.push(frame);
                offset += consumed;
            }
            Ok(None) => break Ok(()),
            Err(err) => break Err(err),
        }
    };
    buffer.drain(..offset);
    result.map(|()| frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DigState;

    #[test]
    fn test_schema_hash_deterministic() {
        assert_eq!(compute_schema_hash(), compute_schema_hash());
        assert_ne!(compute_schema_hash(), 0);
    }

    #[test]
    fn test_encode_decode_client_login() {
        let packet = ClientPacket::Login {
            protocol: PROTOCOL_VERSION,
            username: "alice".into(),
            schema_hash: compute_schema_hash(),
        };

        let encoded = encode_client_packet(&packet).expect("Failed to encode");
        let (frame, consumed) = decode_client_frame(&encoded)
            .expect("Failed to decode")
            .expect("complete frame");

        assert_eq!(frame, Frame::Packet(packet));
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_encode_decode_digging() {
        let packet = ClientPacket::Digging {
            state: DigState::Broken,
            x: -5,
            y: 70,
            z: 12,
            face: 1,
        };

        let encoded = encode_client_packet(&packet).expect("Failed to encode");
        let decoded = decode_client_frame(&encoded).expect("Failed to decode");

        assert_eq!(decoded, Some((Frame::Packet(packet), encoded.len())));
    }

    #[test]
    fn test_incomplete_frame_waits_for_more() {
        let encoded = encode_server_packet(&ServerPacket::Ping).expect("Failed to encode");
        assert!(decode_server_frame(&encoded[..3]).expect("prefix").is_none());
        assert!(decode_server_frame(&[10, 0, 0, 0, 0]).expect("partial").is_none());
    }

    #[test]
    fn test_unknown_id_is_skipped() {
        let data = [3, 0, 0, 0, 0x42, 9, 9, 0xAA];
        let (frame, consumed) = decode_client_frame(&data)
            .expect("unknown ids are not errors")
            .expect("complete frame");
        assert_eq!(frame, Frame::Unknown { id: 0x42 });
        assert_eq!(consumed, 7);
    }

    #[test]
    fn test_id_mismatch_is_malformed() {
        let mut encoded = encode_client_packet(&ClientPacket::Ping).expect("Failed to encode");
        encoded[4] = 3;
        let result = decode_client_frame(&encoded);
        assert!(matches!(
            result,
            Err(CodecError::IdMismatch {
                header: 3,
                payload: 0
            })
        ));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let len = (MAX_FRAME_LEN as u32 + 1).to_le_bytes();
        let data = [len[0], len[1], len[2], len[3], 0];
        assert!(matches!(
            decode_client_frame(&data),
            Err(CodecError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_empty_frame_rejected() {
        assert!(matches!(
            decode_client_frame(&[0, 0, 0, 0]),
            Err(CodecError::EmptyFrame)
        ));
    }

    #[test]
    fn test_limits_checked_after_decode() {
        let packet = ClientPacket::Chat {
            message: "x".repeat(500),
        };
        let encoded = encode_client_packet(&packet).expect("encoding does not check limits");
        assert!(matches!(
            decode_client_frame(&encoded),
            Err(CodecError::Invalid { id: 3, .. })
        ));
    }

    #[test]
    fn test_drain_frames_keeps_partial_tail() {
        let mut buffer = encode_client_packet(&ClientPacket::Ping).expect("encode");
        buffer.extend(encode_client_packet(&ClientPacket::Equip { slot: 2 }).expect("encode"));
        let tail = encode_client_packet(&ClientPacket::Respawn).expect("encode");
        buffer.extend_from_slice(&tail[..2]);

        let frames: Vec<Frame<ClientPacket>> = drain_frames(&mut buffer).expect("drain");

        assert_eq!(
            frames,
            vec![
                Frame::Packet(ClientPacket::Ping),
                Frame::Packet(ClientPacket::Equip { slot: 2 })
            ]
        );
        assert_eq!(buffer, tail[..2].to_vec());
    }
}
