use crate::error::Result;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// A byte buffer that is either owned outright or backed by a memory-mapped
/// file. Both variants expose the same `&[u8]` view, so the rest of the
/// engine never needs to know which one it's holding.
pub(crate) enum Bytes {
    Owned(Vec<u8>),
    Mapped(Arc<Mmap>),
}

impl Bytes {
    #[must_use]
    pub(crate) fn as_slice(&self) -> &[u8] {
        match self {
            Self::Owned(v) => v,
            Self::Mapped(m) => m,
        }
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.as_slice().len()
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(value: Vec<u8>) -> Self {
        Self::Owned(value)
    }
}

impl From<Arc<Mmap>> for Bytes {
    fn from(value: Arc<Mmap>) -> Self {
        Self::Mapped(value)
    }
}

/// A file's contents, read either fully into memory or mapped in lazily,
/// depending on which the caller asked for (spec.md §3's `--memory` flag,
/// `m` vs. `s` mode). Both modes present the same `&[u8]` view.
pub struct InputBuffer(Bytes);

impl InputBuffer {
    /// Opens `path`. `memory = true` reads the whole file eagerly;
    /// `memory = false` memory-maps it, letting the OS page it in on demand.
    /// An empty file is never mapped (`mmap` rejects zero-length mappings on
    /// some platforms), so it is always read as an empty owned buffer.
    pub fn open(path: &Path, memory: bool) -> Result<Self> {
        let file = File::open(path)?;
        if memory {
            return Ok(Self(Bytes::Owned(std::fs::read(path)?)));
        }
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(Self(Bytes::Owned(Vec::new())));
        }
        let mapping = unsafe { MmapOptions::new().map(&file)? };
        Ok(Self(Bytes::Mapped(Arc::new(mapping))))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}
