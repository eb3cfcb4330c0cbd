#![warn(missing_docs)]
//! Wire protocol shared by the server and its test clients.

mod chunk_encoding;
mod codec;
mod entity_replication;
mod protocol;

pub use chunk_encoding::{compression_ratio, ChunkPayload, MAX_CHUNK_DATA_LEN, MAX_PALETTE_SIZE};
pub use codec::{
    compute_schema_hash, decode_client_frame, decode_frame, decode_server_frame, drain_frames,
    encode_client_packet, encode_packet, encode_server_packet, CodecError, Frame, WirePacket,
    MAX_FRAME_LEN,
};
pub use entity_replication::Replicate;
pub use protocol::{
    ClientPacket, DigState, ServerPacket, MAX_CHAT_LEN, MAX_INVENTORY_SLOTS, MAX_REASON_LEN,
    MAX_USERNAME_LEN, PROTOCOL_MAGIC, PROTOCOL_VERSION,
};
