//! Component E — file patch container.
//!
//! Wire layout (spec.md §4.E), descriptor-then-blob per instruction — this
//! order (rather than the distilled spec's looser "blob, descriptor"
//! phrasing) is what `original_source/RMGPatch/main.cpp`'s `publish`
//! actually emits once its two-pass width patching is unwound, and it's the
//! only one a reader can parse without lookahead: the flag bit inside the
//! descriptor tells the reader whether a blob frame follows.

use crate::compress::{SEL_LZMA, SEL_STORE};
use crate::differ::Instruction;
use crate::error::{Error, Result};
use crate::io::{min_bytes, read_uint, write_uint};

pub(crate) const MAGIC: [u8; 4] = [b'X', b'X', b'X', 0x00];

pub(crate) struct ParsedReplacement {
    pub(crate) selector: u8,
    pub(crate) uncompressed_len: u64,
    pub(crate) compressed: Vec<u8>,
    pub(crate) props: Option<[u8; 5]>,
}

pub(crate) struct ParsedInstruction {
    pub(crate) og_offset: u64,
    pub(crate) og_length: u64,
    pub(crate) replacement: Option<ParsedReplacement>,
}

pub(crate) struct FilePatch {
    pub(crate) crc32: u32,
    pub(crate) instructions: Vec<ParsedInstruction>,
}

/// Smallest width, in bytes, that can hold `max_len` with its top bit
/// reserved as the replacement/deletion flag.
#[must_use]
fn width_for_flagged_length(max_len: u64) -> u8 {
    for w in 1..=8u8 {
        let capacity = 1u64 << (u32::from(w) * 8 - 1);
        if max_len < capacity {
            return w;
        }
    }
    8
}

/// Serializes an instruction stream. An empty stream (original and edited
/// were identical) serializes to an empty buffer regardless of `standalone`
/// — spec.md §8 property 2 requires apply on this to be a no-op.
#[must_use]
pub(crate) fn serialize(
    original_len: u64,
    crc32: u32,
    instructions: &[Instruction],
    standalone: bool,
) -> Vec<u8> {
    if instructions.is_empty() {
        return Vec::new();
    }

    let w_pos = min_bytes(original_len);
    let w_len = width_for_flagged_length(
        instructions.iter().map(|i| i.og_length).max().unwrap_or(0),
    );
    let w_blob = instructions
        .iter()
        .filter_map(|i| i.replacement.as_ref())
        .map(|r| min_bytes(r.compressed.len() as u64).max(min_bytes(r.uncompressed_len)))
        .max()
        .unwrap_or(1);

    let mut out = Vec::new();
    if standalone {
        out.extend_from_slice(&MAGIC);
    }
    write_uint(&mut out, u64::from(crc32), 4);
    out.push((w_blob << 4) | w_len);
    write_uint(&mut out, instructions.len() as u64, 2);

    let flag_bit = 1u64 << (u32::from(w_len) * 8 - 1);
    for instr in instructions {
        write_uint(&mut out, instr.og_offset, w_pos);
        let mut length_field = instr.og_length;
        if instr.replacement.is_some() {
            length_field |= flag_bit;
        }
        write_uint(&mut out, length_field, w_len);

        if let Some(replacement) = &instr.replacement {
            out.push(replacement.selector);
            if replacement.selector != SEL_STORE {
                write_uint(&mut out, replacement.uncompressed_len, w_blob);
            }
            write_uint(&mut out, replacement.compressed.len() as u64, w_blob);
            out.extend_from_slice(&replacement.compressed);
            if replacement.selector == SEL_LZMA {
                out.extend_from_slice(
                    &replacement.props.expect("lzma replacement always carries its properties"),
                );
            }
        }
    }
    out
}

/// Parses a file patch. `original_len` must be the length of the original
/// file the patch claims to apply to — the caller is responsible for
/// verifying the stored CRC against that same original *before* calling
/// this, since `w_pos` is derived from `original_len` and a mismatched
/// original silently yields garbage offsets otherwise (spec.md §9).
pub(crate) fn deserialize(patch: &[u8], original_len: u64, standalone: bool) -> Result<FilePatch> {
    let mut pos = 0usize;
    if standalone {
        if patch.len() < 4 || patch[..4] != MAGIC {
            return Err(Error::InvalidFileMagic);
        }
        pos = 4;
    }

    let header_len = pos + 7;
    if patch.len() < header_len {
        return Err(Error::TruncatedPatch);
    }
    let crc32 = read_uint(&patch[pos..pos + 4], 4) as u32;
    pos += 4;
    let widths_byte = patch[pos];
    pos += 1;
    let w_blob = widths_byte >> 4;
    let w_len = widths_byte & 0x0F;
    let count = read_uint(&patch[pos..pos + 2], 2) as u16;
    pos += 2;
    let w_pos = min_bytes(original_len);
    let flag_bit = 1u64 << (u32::from(w_len) * 8 - 1);

    let mut instructions = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let descriptor_len = w_pos as usize + w_len as usize;
        if pos + descriptor_len > patch.len() {
            return Err(Error::TruncatedPatch);
        }
        let og_offset = read_uint(&patch[pos..pos + w_pos as usize], w_pos);
        pos += w_pos as usize;
        let length_field = read_uint(&patch[pos..pos + w_len as usize], w_len);
        pos += w_len as usize;
        let og_length = length_field & !flag_bit;
        let has_replacement = length_field & flag_bit != 0;

        let replacement = if has_replacement {
            if pos >= patch.len() {
                return Err(Error::TruncatedPatch);
            }
            let selector = patch[pos];
            pos += 1;

            let uncompressed_len = if selector != SEL_STORE {
                if pos + w_blob as usize > patch.len() {
                    return Err(Error::TruncatedPatch);
                }
                let v = read_uint(&patch[pos..pos + w_blob as usize], w_blob);
                pos += w_blob as usize;
                v
            } else {
                0
            };

            if pos + w_blob as usize > patch.len() {
                return Err(Error::TruncatedPatch);
            }
            let compressed_len = read_uint(&patch[pos..pos + w_blob as usize], w_blob) as usize;
            pos += w_blob as usize;

            if pos + compressed_len > patch.len() {
                return Err(Error::TruncatedPatch);
            }
            let compressed = patch[pos..pos + compressed_len].to_vec();
            pos += compressed_len;

            let props = if selector == SEL_LZMA {
                if pos + 5 > patch.len() {
                    return Err(Error::TruncatedPatch);
                }
                let mut p = [0u8; 5];
                p.copy_from_slice(&patch[pos..pos + 5]);
                pos += 5;
                Some(p)
            } else {
                None
            };

            let uncompressed_len = if selector == SEL_STORE {
                compressed_len as u64
            } else {
                uncompressed_len
            };

            Some(ParsedReplacement {
                selector,
                uncompressed_len,
                compressed,
                props,
            })
        } else {
            None
        };

        instructions.push(ParsedInstruction {
            og_offset,
            og_length,
            replacement,
        });
    }

    Ok(FilePatch { crc32, instructions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::compress_best;
    use crate::differ::{diff, DifferOptions};

    #[test]
    fn roundtrip_through_wire_format() {
        let original = b"the quick brown fox jumps over the lazy dog".repeat(8);
        let mut edited = original.clone();
        edited[10] = b'!';
        edited.truncate(edited.len() - 5);

        let instructions = diff(&original, &edited, &DifferOptions::default());
        assert!(!instructions.is_empty());

        let crc = crc32fast::hash(&original);
        let wire = serialize(original.len() as u64, crc, &instructions, true);
        let parsed = deserialize(&wire, original.len() as u64, true).unwrap();
        assert_eq!(parsed.crc32, crc);
        assert_eq!(parsed.instructions.len(), instructions.len());

        for (want, got) in instructions.iter().zip(parsed.instructions.iter()) {
            assert_eq!(want.og_offset, got.og_offset);
            assert_eq!(want.og_length, got.og_length);
            assert_eq!(want.replacement.is_some(), got.replacement.is_some());
        }
    }

    #[test]
    fn empty_instruction_stream_serializes_to_empty_buffer() {
        let wire = serialize(100, 0xDEAD_BEEF, &[], true);
        assert!(wire.is_empty());
    }

    #[test]
    fn rejects_wrong_magic() {
        let bogus = vec![0u8; 16];
        assert!(matches!(
            deserialize(&bogus, 100, true),
            Err(Error::InvalidFileMagic)
        ));
    }

    #[test]
    fn width_for_flagged_length_reserves_top_bit() {
        assert_eq!(width_for_flagged_length(0), 1);
        assert_eq!(width_for_flagged_length(0x7F), 1);
        assert_eq!(width_for_flagged_length(0x80), 2);
        assert_eq!(width_for_flagged_length(0x7FFF), 2);
        assert_eq!(width_for_flagged_length(0x8000), 3);
    }

    #[test]
    fn lzma_selector_roundtrips_with_properties() {
        let payload = b"the quick brown fox jumps over the lazy dog ".repeat(40);
        let compressed = compress_best(&payload);
        let instr = Instruction {
            og_offset: 0,
            og_length: 0,
            replacement: Some((compressed, payload.len()).into()),
        };
        let wire = serialize(10, 0, std::slice::from_ref(&instr), false);
        let parsed = deserialize(&wire, 10, false).unwrap();
        let r = parsed.instructions[0].replacement.as_ref().unwrap();
        if r.selector == SEL_LZMA {
            assert!(r.props.is_some());
        }
    }
}
