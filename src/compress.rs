//! Component C — compression gate.
//!
//! Picks the smallest of store / deflate / LZMA for a blob. An encoder
//! that errors or fails to shrink the input is treated as "did not win",
//! never as a hard failure — `compress_best` always returns something.

use crate::error::{Error, Result};
use flate2::write::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use std::io::{Cursor, Write};

pub(crate) const SEL_STORE: u8 = 0;
pub(crate) const SEL_DEFLATE: u8 = 1;
pub(crate) const SEL_LZMA: u8 = 2;

pub(crate) struct Compressed {
    pub(crate) selector: u8,
    pub(crate) bytes: Vec<u8>,
    /// Only present for `SEL_LZMA`.
    pub(crate) props: Option<[u8; 5]>,
}

/// Tries store, deflate (max level), then LZMA (max level) and keeps
/// whichever produced the fewest bytes. Ties favor the lower-numbered
/// selector, which falls out naturally from only replacing the champion on
/// a strict improvement.
#[must_use]
pub(crate) fn compress_best(data: &[u8]) -> Compressed {
    let mut best = Compressed {
        selector: SEL_STORE,
        bytes: data.to_vec(),
        props: None,
    };

    if let Ok(deflated) = deflate_compress(data) {
        if deflated.len() < best.bytes.len() {
            best = Compressed {
                selector: SEL_DEFLATE,
                bytes: deflated,
                props: None,
            };
        }
    }

    if let Ok((compressed, props)) = lzma_compress(data) {
        if compressed.len() < best.bytes.len() {
            best = Compressed {
                selector: SEL_LZMA,
                bytes: compressed,
                props: Some(props),
            };
        }
    }

    best
}

pub(crate) fn decompress(
    selector: u8,
    bytes: &[u8],
    uncompressed_len: usize,
    props: Option<[u8; 5]>,
) -> Result<Vec<u8>> {
    match selector {
        SEL_STORE => Ok(bytes.to_vec()),
        SEL_DEFLATE => deflate_decompress(bytes, uncompressed_len),
        SEL_LZMA => {
            let props = props.ok_or(Error::DecompressionFailed(SEL_LZMA))?;
            lzma_decompress(bytes, uncompressed_len, &props)
        }
        other => Err(Error::UnknownSelector(other)),
    }
}

fn deflate_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn deflate_decompress(data: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(Vec::with_capacity(uncompressed_len));
    decoder
        .write_all(data)
        .map_err(|_| Error::DecompressionFailed(SEL_DEFLATE))?;
    decoder
        .finish()
        .map_err(|_| Error::DecompressionFailed(SEL_DEFLATE))
}

/// Compresses with legacy ("alone"-format) LZMA and splits the result into
/// the 5-byte encoder properties block (carried separately per spec.md
/// §4.C) and the raw compressed stream. The alone format's own 8-byte
/// uncompressed-size field is discarded — the patch container tracks that
/// length itself in `w_blob`-sized fields.
fn lzma_compress(data: &[u8]) -> Result<(Vec<u8>, [u8; 5])> {
    let mut reader = Cursor::new(data);
    let mut framed = Vec::new();
    lzma_rs::lzma_compress(&mut reader, &mut framed)
        .map_err(|_| Error::DecompressionFailed(SEL_LZMA))?;
    if framed.len() < 13 {
        return Err(Error::DecompressionFailed(SEL_LZMA));
    }
    let mut props = [0u8; 5];
    props.copy_from_slice(&framed[..5]);
    let compressed = framed[13..].to_vec();
    Ok((compressed, props))
}

fn lzma_decompress(data: &[u8], uncompressed_len: usize, props: &[u8; 5]) -> Result<Vec<u8>> {
    let mut framed = Vec::with_capacity(13 + data.len());
    framed.extend_from_slice(props);
    framed.extend_from_slice(&(uncompressed_len as u64).to_le_bytes());
    framed.extend_from_slice(data);
    let mut reader = Cursor::new(framed);
    let mut out = Vec::with_capacity(uncompressed_len);
    lzma_rs::lzma_decompress(&mut reader, &mut out)
        .map_err(|_| Error::DecompressionFailed(SEL_LZMA))?;
    Ok(out)
}
