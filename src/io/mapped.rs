//! Read-only file views.
//!
//! [`MappedFile`] memory-maps a file when possible and falls back to
//! positioned reads through a locked file handle. Callers never mutate the
//! mapping.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;
use parking_lot::RwLock;

use crate::util::{Error, Result};

/// Read-only view of a file.
pub struct MappedFile {
    inner: ViewInner,
    path: PathBuf,
    size: u64,
}

enum ViewInner {
    /// Memory-mapped file (preferred)
    Mmap(Mmap),
    /// Buffered file access (fallback, and for empty files)
    File(Arc<RwLock<File>>),
}

impl MappedFile {
    /// Open a file with memory mapping.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_opts(path, true)
    }

    /// Open a file with optional memory mapping.
    pub fn open_opts(path: impl AsRef<Path>, use_mmap: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        let size = file.metadata()?.len();

        let inner = if use_mmap && size > 0 {
            // Safety: the file is opened read-only and the mapping is never written
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MmapFailed(e.to_string()))?;
            ViewInner::Mmap(mmap)
        } else {
            ViewInner::File(Arc::new(RwLock::new(file)))
        };

        Ok(Self { inner, path: path.to_path_buf(), size })
    }

    /// Path the view was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total file size.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    fn check_range(&self, pos: u64, len: usize) -> Result<()> {
        match pos.checked_add(len as u64) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(Error::UnexpectedEof(pos.saturating_add(len as u64))),
        }
    }

    /// Read bytes at a specific position.
    pub fn read_bytes(&self, pos: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_into(pos, &mut buf)?;
        Ok(buf)
    }

    /// Read bytes into an existing buffer.
    pub fn read_into(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        self.check_range(pos, buf.len())?;
        if buf.is_empty() {
            return Ok(());
        }
        match &self.inner {
            ViewInner::Mmap(mmap) => {
                buf.copy_from_slice(&mmap[pos as usize..pos as usize + buf.len()]);
                Ok(())
            }
            ViewInner::File(file) => {
                let mut f = file.write();
                f.seek(SeekFrom::Start(pos))?;
                f.read_exact(buf)?;
                Ok(())
            }
        }
    }

    /// Borrow bytes from the mapping, or copy them in buffered mode.
    pub fn bytes(&self, pos: u64, len: usize) -> Result<std::borrow::Cow<'_, [u8]>> {
        self.check_range(pos, len)?;
        match &self.inner {
            ViewInner::Mmap(mmap) => Ok(std::borrow::Cow::Borrowed(&mmap[pos as usize..pos as usize + len])),
            ViewInner::File(_) => Ok(std::borrow::Cow::Owned(self.read_bytes(pos, len)?)),
        }
    }

    /// Read a little-endian u64 at the given position.
    pub fn read_u64(&self, pos: u64) -> Result<u64> {
        Ok(LittleEndian::read_u64(&self.bytes(pos, 8)?))
    }

    /// Read a little-endian u16 at the given position.
    pub fn read_u16(&self, pos: u64) -> Result<u16> {
        Ok(LittleEndian::read_u16(&self.bytes(pos, 2)?))
    }

    /// Read a little-endian u32 at the given position.
    pub fn read_u32(&self, pos: u64) -> Result<u32> {
        Ok(LittleEndian::read_u32(&self.bytes(pos, 4)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_both_modes_agree() -> Result<()> {
        let mut temp = NamedTempFile::new()?;
        temp.write_all(&[1, 0, 0, 0, 0, 0, 0, 0, 0xAA, 0xBB])?;
        temp.flush()?;

        for use_mmap in [true, false] {
            let view = MappedFile::open_opts(temp.path(), use_mmap)?;
            assert_eq!(view.size(), 10);
            assert_eq!(view.read_u64(0)?, 1);
            assert_eq!(view.bytes(8, 2)?.as_ref(), &[0xAA, 0xBB]);
            assert!(matches!(view.read_u64(4), Err(Error::UnexpectedEof(12))));
        }
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let err = MappedFile::open("/definitely/not/here.bin").err().unwrap();
        assert!(matches!(err, Error::FileNotFound(_)));
    }
}
