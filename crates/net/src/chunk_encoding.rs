//! Chunk payload encoding with palette and RLE compression.
//!
//! Block ids are mapped through a per-chunk palette, then both the palette
//! indices and the metadata nibbles are run-length encoded. A CRC32 over the
//! palette and both streams guards against corruption.

use anyhow::{Context, Result};
use mdbeta_core::{BlockId, ChunkKey};
use mdbeta_world::{Chunk, CHUNK_VOLUME};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum palette size (unique block ids per chunk).
pub const MAX_PALETTE_SIZE: usize = 256;

/// Maximum size of one compressed stream (bytes).
pub const MAX_CHUNK_DATA_LEN: usize = 64 * 1024;

/// Maximum decompressed size of one stream; one entry per block.
const MAX_DECOMPRESSED_SIZE: usize = CHUNK_VOLUME;

/// Compressed chunk contents sent after a chunk-enable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkPayload {
    /// Chunk X coordinate.
    pub x: i32,
    /// Chunk Z coordinate.
    pub z: i32,
    /// Unique block ids in this chunk.
    pub palette: Vec<BlockId>,
    /// RLE-compressed palette indices.
    pub blocks: Vec<u8>,
    /// RLE-compressed metadata nibbles.
    pub metadata: Vec<u8>,
    /// CRC32 checksum for validation.
    pub crc32: u32,
}

impl ChunkPayload {
    /// Encode a chunk.
    ///
    /// Typical compression: >90% for flat or natural terrain.
    pub fn encode(chunk: &Chunk) -> Self {
        let key = chunk.key();
        let (palette, indices) = build_palette(chunk.blocks());
        let blocks = rle_compress(&indices);
        let metadata = rle_compress(chunk.metadata_raw());
        let crc32 = calculate_crc32(&palette, &blocks, &metadata);
        Self {
            x: key.x,
            z: key.z,
            palette,
            blocks,
            metadata,
            crc32,
        }
    }

    /// Chunk this payload describes.
    pub fn key(&self) -> ChunkKey {
        ChunkKey::new(self.x, self.z)
    }

    /// Decode back into a chunk.
    pub fn decode(&self) -> Result<Chunk> {
        let expected_crc = calculate_crc32(&self.palette, &self.blocks, &self.metadata);
        if self.crc32 != expected_crc {
            return Err(anyhow::anyhow!(
                "CRC32 mismatch: expected {:08x}, got {:08x}",
                expected_crc,
                self.crc32
            ));
        }

        let indices = rle_decompress(&self.blocks).context("Failed to decompress block data")?;
        let metadata =
            rle_decompress(&self.metadata).context("Failed to decompress metadata")?;
        if indices.len() != CHUNK_VOLUME || metadata.len() != CHUNK_VOLUME {
            return Err(anyhow::anyhow!(
                "Invalid decompressed size: expected {}, got {} blocks and {} metadata",
                CHUNK_VOLUME,
                indices.len(),
                metadata.len()
            ));
        }

        let mut chunk = Chunk::new(self.key());
        for (slot, (&index, &meta)) in indices.iter().zip(&metadata).enumerate() {
            let Some(&block) = self.palette.get(index as usize) else {
                return Err(anyhow::anyhow!(
                    "Invalid palette index: {} (palette size: {})",
                    index,
                    self.palette.len()
                ));
            };
            chunk.restore(slot, block, meta);
        }
        Ok(chunk)
    }

    /// Verify payload limits.
    pub fn verify(&self) -> Result<(), &'static str> {
        if self.palette.len() > MAX_PALETTE_SIZE {
            return Err("Palette too large");
        }
        if self.blocks.len() > MAX_CHUNK_DATA_LEN || self.metadata.len() > MAX_CHUNK_DATA_LEN {
            return Err("Chunk data too large");
        }
        Ok(())
    }
}

/// Build palette and convert block ids to palette indices.
///
/// Block ids are a byte wide, so the palette never overflows its u8 indices.
fn build_palette(block_data: &[BlockId]) -> (Vec<BlockId>, Vec<u8>) {
    let mut palette = Vec::new();
    let mut palette_map: HashMap<BlockId, u8> = HashMap::new();
    let mut indices = Vec::with_capacity(block_data.len());

    for &block_id in block_data {
        let index = *palette_map.entry(block_id).or_insert_with(|| {
            palette.push(block_id);
            (palette.len() - 1) as u8
        });
        indices.push(index);
    }

    (palette, indices)
}

/// Run-length encode a sequence of bytes.
///
/// Format: a control byte >= 128 is a run of (control - 128) copies of the next
/// byte; otherwise it is followed by that many literal bytes.
fn rle_compress(data: &[u8]) -> Vec<u8> {
    let mut compressed = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let current = data[i];
        let mut run_length = 1;

        while i + run_length < data.len() && data[i + run_length] == current && run_length < 127 {
            run_length += 1;
        }

        if run_length >= 3 {
            compressed.push(128 + run_length as u8);
            compressed.push(current);
            i += run_length;
        } else {
            let mut literal_length = 1;
            while i + literal_length < data.len() && literal_length < 127 {
                // Stop before a run long enough to encode on its own.
                if i + literal_length + 2 < data.len()
                    && data[i + literal_length] == data[i + literal_length + 1]
                    && data[i + literal_length] == data[i + literal_length + 2]
                {
                    break;
                }
                literal_length += 1;
            }

            compressed.push(literal_length as u8);
            compressed.extend_from_slice(&data[i..i + literal_length]);
            i += literal_length;
        }
    }

    compressed
}

/// Run-length decode with an output size limit against decompression bombs.
fn rle_decompress(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decompressed = Vec::with_capacity(MAX_DECOMPRESSED_SIZE.min(compressed.len() * 127));
    let mut i = 0;

    while i < compressed.len() {
        let control = compressed[i];
        i += 1;

        let length = if control >= 128 {
            (control - 128) as usize
        } else {
            control as usize
        };
        if decompressed.len() + length > MAX_DECOMPRESSED_SIZE {
            return Err(anyhow::anyhow!(
                "RLE decompression would exceed max size: {} + {} > {}",
                decompressed.len(),
                length,
                MAX_DECOMPRESSED_SIZE
            ));
        }

        if control >= 128 {
            let Some(&value) = compressed.get(i) else {
                return Err(anyhow::anyhow!("Unexpected end of RLE data (run)"));
            };
            i += 1;
            decompressed.extend(std::iter::repeat_n(value, length));
        } else {
            if i + length > compressed.len() {
                return Err(anyhow::anyhow!(
                    "Unexpected end of RLE data (literal): need {} bytes, have {}",
                    length,
                    compressed.len() - i
                ));
            }
            decompressed.extend_from_slice(&compressed[i..i + length]);
            i += length;
        }
    }

    Ok(decompressed)
}

fn calculate_crc32(palette: &[BlockId], blocks: &[u8], metadata: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(palette);
    hasher.update(blocks);
    hasher.update(metadata);
    hasher.finalize()
}

/// Calculate compression ratio as a percentage.
pub fn compression_ratio(original_size: usize, compressed_size: usize) -> f32 {
    if original_size == 0 {
        return 0.0;
    }
    ((original_size as f32 - compressed_size as f32) / original_size as f32) * 100.0
}
