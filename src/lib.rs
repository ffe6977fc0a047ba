#![warn(
    clippy::pedantic,
    clippy::single_char_lifetime_names,
    clippy::std_instead_of_core
)]
#![allow(clippy::enum_glob_use, clippy::missing_errors_doc, clippy::module_name_repetitions)]

//! A binary differential patch engine for files and directory trees.
//!
//! Given an original artifact and an edited artifact, [`create_file_patch`]
//! produces a compact patch that [`apply_file_patch`] combines with the
//! original to reconstruct the edited artifact byte-for-byte.
//! [`create_directory_patch`]/[`apply_directory_patch`] do the same for a
//! whole directory tree, additionally describing file additions and
//! removals. Rename detection between tree entries is not performed:
//! additions and deletions are independent operations.

mod apply;
mod compress;
mod containers;
mod create;
mod differ;
mod dirpatch;
mod error;
mod filepatch;
mod io;
mod tree;

pub use apply::IncludeMask;
pub use containers::InputBuffer;
pub use create::Transcript;
pub use differ::DifferOptions;
pub use error::{Error, Result};

use std::path::Path;

/// Creates a patch turning `original` into `edited`. See [`DifferOptions`]
/// for the chunk/probe size tuneables. `crccmp`, when true, short-circuits
/// to "identical" via a CRC-32 comparison before running the differ at all
/// (spec.md §6 `--crccmp`). `label` is carried into the returned
/// [`Transcript`] entries and `tracing` spans for the caller's own
/// reporting; it has no effect on the patch bytes.
#[must_use]
pub fn create_file_patch(
    original: &[u8],
    edited: &[u8],
    options: &DifferOptions,
    crccmp: bool,
    label: &str,
) -> (Vec<u8>, Vec<Transcript>) {
    create::create_file_patch(original, edited, options, crccmp, label)
}

/// Applies a standalone file patch (one carrying the `"XXX\0"` magic) to
/// `original`, returning the reconstructed bytes. Fails with
/// [`Error::CrcMismatch`] if `original`'s CRC-32 doesn't match the one the
/// patch was created against.
pub fn apply_file_patch(original: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
    apply::apply_file(original, patch, true)
}

/// Creates a directory patch comparing the tree rooted at `original_root`
/// against `edited_root`.
pub fn create_directory_patch(
    original_root: &Path,
    edited_root: &Path,
    options: &DifferOptions,
) -> std::io::Result<(Vec<u8>, Vec<Transcript>)> {
    create::create_directory_patch(original_root, edited_root, options)
}

/// Applies a directory patch under `root`. Returns the number of entries
/// skipped due to a non-fatal failure (missing delete target, CRC
/// mismatch on a diff entry, decompression failure); zero means every
/// entry allowed by `include` applied cleanly. This is also the process's
/// intended exit code for directory apply (spec.md §6).
pub fn apply_directory_patch(root: &Path, patch: &[u8], include: &IncludeMask) -> Result<usize> {
    apply::apply_directory(root, patch, include)
}
