//! Component D — file differ.
//!
//! A chunked, sliding-window matcher: scan forward in `chunk_size` strides
//! to skip long identical runs cheaply, drop to a byte-by-byte comparison
//! only once a stride mismatches, then probe the original for a
//! resynchronization point using `probe_size`-long windows of the edited
//! file. This is a heuristic (spec.md §1 Non-goals) — it does not search
//! for the minimum edit distance, only for long shared runs found cheaply.
//! It must always be *correct*: replaying the emitted instructions against
//! the original must reproduce the edited file exactly.

use crate::compress::{compress_best, Compressed};

pub(crate) const DEFAULT_CHUNK_SIZE: usize = 0x800;
pub(crate) const DEFAULT_PROBE_SIZE: usize = 0x200;

/// Tuneables for [`diff`]: `chunk_size` sets the scanning granularity,
/// `probe_size` sets the pattern length searched in the original when
/// resynchronizing after a divergence (spec.md §4.D).
#[derive(Clone, Copy, Debug)]
pub struct DifferOptions {
    pub chunk_size: usize,
    pub probe_size: usize,
}

impl Default for DifferOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            probe_size: DEFAULT_PROBE_SIZE,
        }
    }
}

pub(crate) struct Replacement {
    pub(crate) selector: u8,
    pub(crate) uncompressed_len: u64,
    pub(crate) compressed: Vec<u8>,
    pub(crate) props: Option<[u8; 5]>,
}

impl From<(Compressed, usize)> for Replacement {
    fn from((compressed, uncompressed_len): (Compressed, usize)) -> Self {
        Self {
            selector: compressed.selector,
            uncompressed_len: uncompressed_len as u64,
            compressed: compressed.bytes,
            props: compressed.props,
        }
    }
}

pub(crate) struct Instruction {
    pub(crate) og_offset: u64,
    pub(crate) og_length: u64,
    /// `None` means a pure deletion: skip `og_length` bytes of the
    /// original, insert nothing.
    pub(crate) replacement: Option<Replacement>,
}

/// Produces the instruction stream that turns `original` into `edited`.
/// Returns an empty vector when the two inputs are identical.
pub(crate) fn diff(original: &[u8], edited: &[u8], options: &DifferOptions) -> Vec<Instruction> {
    let mut instructions = Vec::new();
    let mut o = 0usize;
    let mut e = 0usize;

    'outer: loop {
        let delta = common_prefix_len(
            &original[o..],
            &edited[e..],
            options.chunk_size,
        );
        o += delta;
        e += delta;
        if e >= edited.len() {
            break;
        }

        let loc = o;
        let full = &original[loc..];

        if full.len() <= options.probe_size {
            let payload = &edited[e..];
            push_replacement(&mut instructions, loc, original.len() as u64 - loc as u64, payload);
            break;
        }

        match resync(original, edited, loc, e, options) {
            Resync::EditExhausted { payload } => {
                push_replacement(
                    &mut instructions,
                    loc,
                    original.len() as u64 - loc as u64,
                    &payload,
                );
                break 'outer;
            }
            Resync::Found {
                found,
                payload,
                edit_cursor,
            } => {
                push_replacement(&mut instructions, loc, found as u64 - loc as u64, &payload);
                o = found + options.probe_size;
                e = edit_cursor;
            }
        }
    }

    if o < original.len() {
        instructions.push(Instruction {
            og_offset: o as u64,
            og_length: (original.len() - o) as u64,
            replacement: None,
        });
    }

    instructions
}

fn push_replacement(instructions: &mut Vec<Instruction>, og_offset: usize, og_length: u64, payload: &[u8]) {
    let compressed = compress_best(payload);
    instructions.push(Instruction {
        og_offset: og_offset as u64,
        og_length,
        replacement: Some((compressed, payload.len()).into()),
    });
}

enum Resync {
    EditExhausted { payload: Vec<u8> },
    Found {
        found: usize,
        payload: Vec<u8>,
        edit_cursor: usize,
    },
}

/// Probes the original for a point where the two files realign again,
/// accumulating the edited bytes consumed along the way into `payload`.
fn resync(
    original: &[u8],
    edited: &[u8],
    loc: usize,
    e_start: usize,
    options: &DifferOptions,
) -> Resync {
    let full = &original[loc..];
    let mut payload = Vec::new();
    let mut cursor = e_start;

    loop {
        let probe_end = (cursor + options.probe_size).min(edited.len());
        let cmp = &edited[cursor..probe_end];
        if cmp.len() < options.probe_size {
            payload.extend_from_slice(cmp);
            return Resync::EditExhausted { payload };
        }

        if let Some(rel) = find_substring(full, cmp) {
            let mut found = loc + rel;
            let mut probe_start = cursor;
            refine_backward(
                original,
                edited,
                loc,
                &mut found,
                &mut probe_start,
                options,
            );
            return Resync::Found {
                found,
                payload,
                edit_cursor: probe_start + options.probe_size,
            };
        }

        let chunk_end = (cursor + options.chunk_size).min(edited.len());
        payload.extend_from_slice(&edited[cursor..chunk_end]);
        cursor = chunk_end;
    }
}

/// Slides the probe window back one byte at a time through the last
/// `chunk_size` bytes that preceded the successful probe, adopting the
/// first earlier-in-`full` occurrence found (spec.md §4.D step 5, §9
/// "Off-by-ones in refinement"). Deterministic, not exhaustive: only the
/// first improvement found while scanning forward from the earliest
/// candidate wins.
fn refine_backward(
    original: &[u8],
    edited: &[u8],
    loc: usize,
    found: &mut usize,
    probe_start: &mut usize,
    options: &DifferOptions,
) {
    let window_start = probe_start.saturating_sub(options.chunk_size.saturating_sub(1));
    for candidate_start in window_start..*probe_start {
        let candidate_end = candidate_start + options.probe_size;
        if candidate_end > edited.len() {
            break;
        }
        let candidate = &edited[candidate_start..candidate_end];
        let haystack = &original[loc..*found];
        if let Some(rel) = find_substring(haystack, candidate) {
            let candidate_found = loc + rel;
            if candidate_found < *found {
                *found = candidate_found;
                *probe_start = candidate_start;
            }
            break;
        }
    }
    let _ = edited;
}

/// Byte position of the first mismatch between `a` and `b`, fast-forwarding
/// through whole `chunk_size` strides while they agree and falling back to
/// a byte-by-byte scan of the one stride that disagrees. Returns the
/// length of the two slices' common prefix.
fn common_prefix_len(a: &[u8], b: &[u8], chunk_size: usize) -> usize {
    let mut pos = 0usize;
    loop {
        let a_end = (pos + chunk_size).min(a.len());
        let b_end = (pos + chunk_size).min(b.len());
        let chunk_a = &a[pos..a_end];
        let chunk_b = &b[pos..b_end];

        if chunk_a == chunk_b {
            if a_end - pos < chunk_size || b_end - pos < chunk_size {
                return a_end.min(b_end);
            }
            pos = a_end;
            continue;
        }

        let max = chunk_a.len().min(chunk_b.len());
        for i in 0..max {
            if chunk_a[i] != chunk_b[i] {
                return pos + i;
            }
        }
        return pos + max;
    }
}

#[must_use]
fn find_substring(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::replay_instructions;
    use proptest::prelude::*;

    fn roundtrip(original: &[u8], edited: &[u8], options: &DifferOptions) -> Vec<u8> {
        let instructions = diff(original, edited, options);
        replay_instructions(original, &instructions)
    }

    #[test]
    fn identical_inputs_produce_no_instructions() {
        let data = b"hello world".to_vec();
        let instructions = diff(&data, &data, &DifferOptions::default());
        assert!(instructions.is_empty());
    }

    #[test]
    fn s2_prefix_insertion_with_small_probe() {
        let original = b"world".to_vec();
        let edited = b"hello world".to_vec();
        let options = DifferOptions {
            chunk_size: 2,
            probe_size: 2,
        };
        let instructions = diff(&original, &edited, &options);
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].og_offset, 0);
        assert_eq!(instructions[0].og_length, 0);
        assert_eq!(roundtrip(&original, &edited, &options), edited);
    }

    #[test]
    fn s3_middle_modification_large_shared_tails() {
        let mut original = vec![b'A'; 4096];
        original.extend(std::iter::repeat(b'x').take(4));
        original.extend(std::iter::repeat(b'B').take(4096));

        let mut edited = vec![b'A'; 4096];
        edited.extend(std::iter::repeat(b'y').take(4));
        edited.extend(std::iter::repeat(b'B').take(4096));

        let options = DifferOptions::default();
        let instructions = diff(&original, &edited, &options);
        assert!(!instructions.is_empty());
        let first = &instructions[0];
        assert_eq!(first.og_offset, 4096);
        assert_eq!(first.og_length, 4);
        assert_eq!(roundtrip(&original, &edited, &options), edited);
    }

    #[test]
    fn s4_pure_deletion() {
        let original = b"head-middle-tail".to_vec();
        let edited = b"head-tail".to_vec();
        let options = DifferOptions {
            chunk_size: 2,
            probe_size: 2,
        };
        let instructions = diff(&original, &edited, &options);
        assert!(instructions.iter().any(|i| i.replacement.is_none()));
        assert_eq!(roundtrip(&original, &edited, &options), edited);
    }

    #[test]
    fn trailing_deletion_when_edit_exhausted_first() {
        let original = b"abcdefgh".to_vec();
        let edited = b"abcd".to_vec();
        let options = DifferOptions {
            chunk_size: 2,
            probe_size: 2,
        };
        let instructions = diff(&original, &edited, &options);
        assert_eq!(instructions.len(), 1);
        assert!(instructions[0].replacement.is_none());
        assert_eq!(instructions[0].og_offset, 4);
        assert_eq!(instructions[0].og_length, 4);
        assert_eq!(roundtrip(&original, &edited, &options), edited);
    }

    #[test]
    fn instructions_are_monotone_and_disjoint() {
        let original: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
        let mut edited = original.clone();
        edited[500] ^= 0xFF;
        edited[1500] ^= 0xFF;
        edited.splice(2200..2210, std::iter::repeat(0xAAu8).take(3));

        let options = DifferOptions {
            chunk_size: 64,
            probe_size: 16,
        };
        let instructions = diff(&original, &edited, &options);
        let mut last_end: u64 = 0;
        for instr in &instructions {
            assert!(instr.og_offset >= last_end);
            last_end = instr.og_offset + instr.og_length;
        }
        assert_eq!(roundtrip(&original, &edited, &options), edited);
    }

    proptest! {
        #[test]
        fn diff_always_round_trips(
            original in prop::collection::vec(any::<u8>(), 0..600),
            edited in prop::collection::vec(any::<u8>(), 0..600),
        ) {
            let options = DifferOptions { chunk_size: 16, probe_size: 8 };
            let instructions = diff(&original, &edited, &options);
            prop_assert_eq!(replay_instructions(&original, &instructions), edited);
        }
    }
}
