//! Component G — apply engine.
//!
//! Single-file apply verifies the CRC-32 of the supplied original against
//! the one stored in the patch, then replays the instruction stream.
//! Directory apply is best-effort: each entry is independent, a failure is
//! counted rather than aborting the whole walk (spec.md §4.G, §7).

use crate::compress::{self, SEL_LZMA, SEL_STORE};
use crate::dirpatch;
use crate::error::{Error, Result};
use crate::filepatch::{self, ParsedInstruction};
use crate::io::read_uint;
use crate::tree::{EntryOp, Kind};
use std::path::Path;
use tracing::{debug, warn};

/// Which classes of directory operation to apply; corresponds to
/// `--includea`/`--includer`/`--included` (spec.md §6).
#[derive(Clone, Copy, Debug)]
pub struct IncludeMask {
    pub diffs: bool,
    pub additions: bool,
    pub deletions: bool,
}

impl Default for IncludeMask {
    fn default() -> Self {
        Self {
            diffs: true,
            additions: true,
            deletions: true,
        }
    }
}

/// Applies a file patch to `original`, returning the reconstructed bytes.
/// An empty `patch_bytes` means "no edits were recorded" and is a no-op
/// (spec.md §8 property 2).
pub(crate) fn apply_file(original: &[u8], patch_bytes: &[u8], standalone: bool) -> Result<Vec<u8>> {
    if patch_bytes.is_empty() {
        return Ok(original.to_vec());
    }

    let patch = filepatch::deserialize(patch_bytes, original.len() as u64, standalone)?;
    let actual_crc = crc32fast::hash(original);
    if actual_crc != patch.crc32 {
        return Err(Error::CrcMismatch);
    }

    debug!(instructions = patch.instructions.len(), "replaying file patch");
    replay_parsed(original, &patch.instructions)
}

fn replay_parsed(original: &[u8], instructions: &[ParsedInstruction]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut cursor = 0usize;

    for instr in instructions {
        let offset = usize::try_from(instr.og_offset)?;
        if offset < cursor || offset > original.len() {
            return Err(Error::TruncatedPatch);
        }
        out.extend_from_slice(&original[cursor..offset]);

        if let Some(replacement) = &instr.replacement {
            let data = compress::decompress(
                replacement.selector,
                &replacement.compressed,
                replacement.uncompressed_len as usize,
                replacement.props,
            )?;
            out.extend_from_slice(&data);
        }

        let length = usize::try_from(instr.og_length)?;
        cursor = offset.checked_add(length).ok_or(Error::WidthOverflow)?;
        if cursor > original.len() {
            return Err(Error::TruncatedPatch);
        }
    }
    out.extend_from_slice(&original[cursor..]);
    Ok(out)
}

/// Applies a directory patch under `root`, returning the number of entries
/// that were skipped due to a non-fatal failure. Zero means every included
/// entry applied cleanly.
pub(crate) fn apply_directory(root: &Path, patch_bytes: &[u8], include: &IncludeMask) -> Result<usize> {
    let (tree, w_ack, w_pos, pool_base) = dirpatch::deserialize(patch_bytes)?;
    let pool = &patch_bytes[pool_base..];
    let mut failures = 0usize;

    for id in tree.pre_order() {
        let node = tree.node(id);
        if node.kind != Kind::File {
            continue;
        }
        let rel_path = tree.path_of(id);
        let target = root.join(&rel_path);

        match node.op {
            EntryOp::Delete => {
                if !include.deletions {
                    continue;
                }
                if std::fs::remove_file(&target).is_err() {
                    warn!(path = %rel_path, "delete target missing, skipping");
                    failures += 1;
                }
            }
            EntryOp::Add { offset, selector } => {
                if !include.additions {
                    continue;
                }
                match apply_addition_frame(pool, offset as usize, selector, w_ack) {
                    Ok(data) => {
                        if let Some(parent) = target.parent() {
                            let _ = std::fs::create_dir_all(parent);
                        }
                        if std::fs::write(&target, data).is_err() {
                            failures += 1;
                        }
                    }
                    Err(_) => failures += 1,
                }
            }
            EntryOp::Diff { offset } => {
                if !include.diffs {
                    continue;
                }
                if let Err(err) = apply_diff_entry(&target, &rel_path, pool, offset as usize) {
                    warn!(path = %rel_path, error = %err, "diff entry failed, skipping");
                    failures += 1;
                }
            }
            EntryOp::Unset => {}
        }
    }

    let _ = w_pos; // only needed while parsing embedded diff frames, already baked into them
    Ok(failures)
}

fn apply_addition_frame(pool: &[u8], offset: usize, selector: u8, w_ack: u8) -> Result<Vec<u8>> {
    let mut pos = offset;
    let w = w_ack as usize;

    let uncompressed_len = if selector != SEL_STORE {
        if pos + w > pool.len() {
            return Err(Error::TruncatedPatch);
        }
        let v = read_uint(&pool[pos..pos + w], w_ack) as usize;
        pos += w;
        v
    } else {
        0
    };

    if pos + w > pool.len() {
        return Err(Error::TruncatedPatch);
    }
    let compressed_len = read_uint(&pool[pos..pos + w], w_ack) as usize;
    pos += w;

    if pos + compressed_len > pool.len() {
        return Err(Error::TruncatedPatch);
    }
    let compressed = &pool[pos..pos + compressed_len];
    pos += compressed_len;

    let props = if selector == SEL_LZMA {
        if pos + 5 > pool.len() {
            return Err(Error::TruncatedPatch);
        }
        let mut p = [0u8; 5];
        p.copy_from_slice(&pool[pos..pos + 5]);
        Some(p)
    } else {
        None
    };

    let uncompressed_len = if selector == SEL_STORE {
        compressed_len
    } else {
        uncompressed_len
    };

    compress::decompress(selector, compressed, uncompressed_len, props)
}

/// Diff entries embed a file patch (without the standalone magic) directly
/// at `offset` in the pool. A CRC mismatch here is non-fatal to the rest of
/// the directory walk — the caller counts it as a single failed entry, and
/// this surfaces it as [`Error::EntryCrcMismatch`] (naming `rel_path`) rather
/// than the generic [`Error::CrcMismatch`] so the two are distinguishable.
fn apply_diff_entry(target: &Path, rel_path: &str, pool: &[u8], offset: usize) -> Result<()> {
    let original = std::fs::read(target)?;
    let frame = pool.get(offset..).ok_or(Error::TruncatedPatch)?;
    let result = match apply_file(&original, frame, false) {
        Ok(result) => result,
        Err(Error::CrcMismatch) => return Err(Error::EntryCrcMismatch(rel_path.to_owned())),
        Err(other) => return Err(other),
    };
    std::fs::write(target, result)?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn replay_instructions(original: &[u8], instructions: &[crate::differ::Instruction]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut cursor = 0usize;
    for instr in instructions {
        let offset = instr.og_offset as usize;
        out.extend_from_slice(&original[cursor..offset]);
        if let Some(replacement) = &instr.replacement {
            let data = compress::decompress(
                replacement.selector,
                &replacement.compressed,
                replacement.uncompressed_len as usize,
                replacement.props,
            )
            .expect("test-constructed replacement always decompresses");
            out.extend_from_slice(&data);
        }
        cursor = offset + instr.og_length as usize;
    }
    out.extend_from_slice(&original[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differ::{diff, DifferOptions};
    use crate::tree::Tree;
    use std::fs;

    #[test]
    fn apply_file_round_trips() {
        let original = b"the quick brown fox".repeat(200);
        let mut edited = original.clone();
        edited[100] = b'!';

        let instructions = diff(&original, &edited, &DifferOptions::default());
        let crc = crc32fast::hash(&original);
        let wire = filepatch::serialize(original.len() as u64, crc, &instructions, true);

        let result = apply_file(&original, &wire, true).unwrap();
        assert_eq!(result, edited);
    }

    #[test]
    fn apply_file_empty_patch_is_noop() {
        let original = b"unchanged".to_vec();
        let result = apply_file(&original, &[], true).unwrap();
        assert_eq!(result, original);
    }

    #[test]
    fn apply_file_rejects_crc_mismatch() {
        let original = b"original bytes".to_vec();
        let edited = b"edited bytes!!".to_vec();
        let instructions = diff(&original, &edited, &DifferOptions::default());
        let wire = filepatch::serialize(original.len() as u64, 0xBAD_C0DE, &instructions, true);

        let wrong_original = b"different original".to_vec();
        let err = apply_file(&wrong_original, &wire, true).unwrap_err();
        assert!(matches!(err, Error::CrcMismatch));
    }

    #[test]
    fn apply_directory_mixed_ops_s6() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), b"hello").unwrap();
        fs::write(dir.path().join("b.bin"), b"goodbye").unwrap();

        let mut tree = Tree::new();
        let a = tree.find("a.bin", true).unwrap();
        tree.node_mut(a).kind = Kind::File;
        let b = tree.find("b.bin", true).unwrap();
        tree.node_mut(b).kind = Kind::File;
        tree.node_mut(b).op = EntryOp::Delete;

        let mut pool = Vec::new();
        let a_instructions = diff(b"hello", b"HELLO!", &DifferOptions::default());
        let a_crc = crc32fast::hash(b"hello");
        let a_frame = filepatch::serialize(5, a_crc, &a_instructions, false);
        tree.node_mut(a).op = EntryOp::Diff { offset: pool.len() as u64 };
        pool.extend_from_slice(&a_frame);

        let c_compressed = crate::compress::compress_best(b"new file contents");
        let c = tree.find("c.bin", true).unwrap();
        tree.node_mut(c).kind = Kind::File;
        let c_offset = pool.len() as u64;
        tree.node_mut(c).op = EntryOp::Add {
            offset: c_offset,
            selector: c_compressed.selector,
        };
        if c_compressed.selector != SEL_STORE {
            let mut buf = Vec::new();
            crate::io::write_uint(&mut buf, 18, 2);
            pool.extend_from_slice(&buf);
        }
        let mut len_buf = Vec::new();
        crate::io::write_uint(&mut len_buf, c_compressed.bytes.len() as u64, 2);
        pool.extend_from_slice(&len_buf);
        pool.extend_from_slice(&c_compressed.bytes);
        if let Some(props) = c_compressed.props {
            pool.extend_from_slice(&props);
        }

        let (w_ack, w_pos) = dirpatch::widths_for(18, pool.len() as u64);
        let header = dirpatch::serialize(&tree, w_ack.max(2), w_pos.max(1)).unwrap();
        let mut wire = header;
        wire.extend_from_slice(&pool);

        let failures = apply_directory(dir.path(), &wire, &IncludeMask::default()).unwrap();
        assert_eq!(failures, 0);

        assert_eq!(fs::read(dir.path().join("a.bin")).unwrap(), b"HELLO!");
        assert_eq!(fs::read(dir.path().join("c.bin")).unwrap(), b"new file contents");
        assert!(!dir.path().join("b.bin").exists());
    }

    #[test]
    fn apply_directory_diff_entry_crc_mismatch_is_non_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), b"not what the patch expects").unwrap();

        let mut tree = Tree::new();
        let a = tree.find("a.bin", true).unwrap();
        tree.node_mut(a).kind = Kind::File;

        let instructions = diff(b"hello", b"HELLO!", &DifferOptions::default());
        let crc = crc32fast::hash(b"hello");
        let frame = filepatch::serialize(5, crc, &instructions, false);
        tree.node_mut(a).op = EntryOp::Diff { offset: 0 };

        let header = dirpatch::serialize(&tree, 1, 1).unwrap();
        let mut wire = header;
        wire.extend_from_slice(&frame);

        let failures = apply_directory(dir.path(), &wire, &IncludeMask::default()).unwrap();
        assert_eq!(failures, 1);
        // the on-disk file is left untouched, not truncated or corrupted
        assert_eq!(fs::read(dir.path().join("a.bin")).unwrap(), b"not what the patch expects");

        let err = apply_diff_entry(&dir.path().join("a.bin"), "a.bin", &frame, 0).unwrap_err();
        assert!(matches!(err, Error::EntryCrcMismatch(path) if path == "a.bin"));
    }

    #[test]
    fn apply_directory_include_mask_suppresses_deletion() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.bin"), b"goodbye").unwrap();

        let mut tree = Tree::new();
        let b = tree.find("b.bin", true).unwrap();
        tree.node_mut(b).kind = Kind::File;
        tree.node_mut(b).op = EntryOp::Delete;

        let wire = dirpatch::serialize(&tree, 1, 1).unwrap();
        let include = IncludeMask {
            diffs: true,
            additions: true,
            deletions: false,
        };
        let failures = apply_directory(dir.path(), &wire, &include).unwrap();
        assert_eq!(failures, 0);
        assert!(dir.path().join("b.bin").exists());
    }
}
