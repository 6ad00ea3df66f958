//! Payload Compression
//!
//! LZ4 block compression for cached result payloads. Small payloads are
//! stored raw; a compressed form is kept only when it is strictly smaller
//! than the input. Compression failures degrade to raw storage with a
//! warning rather than failing the write.

use bytes::Bytes;
use lz4::block::{compress, decompress, CompressionMode};
use tracing::warn;

use crate::error::{Error, Result};

/// Default minimum payload size before compression is attempted
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1024;

/// Compress a payload when it crosses the threshold and shrinks.
///
/// Returns the bytes to store and whether they are compressed. The
/// compressed form carries the original length prepended, which
/// `decompress_payload` relies on.
pub fn compress_if_worthwhile(data: &[u8], threshold: usize) -> (Bytes, bool) {
    if data.len() < threshold {
        return (Bytes::copy_from_slice(data), false);
    }
    match compress(data, Some(CompressionMode::DEFAULT), true) {
        Ok(compressed) if compressed.len() < data.len() => (Bytes::from(compressed), true),
        Ok(_) => (Bytes::copy_from_slice(data), false),
        Err(err) => {
            warn!(size = data.len(), error = %err, "compression failed, storing raw");
            (Bytes::copy_from_slice(data), false)
        }
    }
}

/// Decompress a size-prepended LZ4 block.
pub fn decompress_payload(data: &[u8]) -> Result<Bytes> {
    decompress(data, None)
        .map(Bytes::from)
        .map_err(|err| Error::DecompressionFailed {
            reason: err.to_string(),
        })
}
