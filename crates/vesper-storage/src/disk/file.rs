//! File-backed disk manager.
//!
//! Pages live in a single file at offset `page_id * page_size`. The file
//! grows as high page IDs are written; reads past the end of the file
//! yield zeroes, so freshly allocated pages read as empty.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use vesper_common::types::PageId;

use super::error::{IoError, IoResult};
use super::DiskManager;

/// Single-file page store.
pub struct FileDiskManager {
    path: PathBuf,
    page_size: usize,
    inner: Mutex<FileInner>,
}

struct FileInner {
    file: File,
    /// Next never-handed-out page ID.
    next_page_id: u64,
    /// IDs returned by `deallocate_page`, reused before fresh ones.
    free_ids: Vec<PageId>,
}

impl FileDiskManager {
    /// Opens (or creates) the page file at `path`.
    ///
    /// The allocation cursor resumes past the highest page the file can
    /// already hold.
    pub fn open(path: impl AsRef<Path>, page_size: usize) -> IoResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let len = file.metadata()?.len();
        let next_page_id = len.div_ceil(page_size as u64);

        Ok(Self {
            path,
            page_size,
            inner: Mutex::new(FileInner {
                file,
                next_page_id,
                free_ids: Vec::new(),
            }),
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Forces all written pages to stable storage.
    pub fn sync(&self) -> IoResult<()> {
        let inner = self.inner.lock();
        inner.file.sync_all()?;
        Ok(())
    }

    fn check_buf(&self, len: usize) -> IoResult<()> {
        if len != self.page_size {
            return Err(IoError::BadBufferLength {
                page_size: self.page_size,
                buffer_len: len,
            });
        }
        Ok(())
    }

    fn offset_of(&self, page_id: PageId) -> u64 {
        page_id.as_u64() * self.page_size as u64
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> IoResult<()> {
        self.check_buf(buf.len())?;
        let mut inner = self.inner.lock();
        inner.file.seek(SeekFrom::Start(self.offset_of(page_id)))?;

        let mut filled = 0;
        while filled < buf.len() {
            match inner.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        // The tail of a page past EOF reads as zeroes.
        buf[filled..].fill(0);
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> IoResult<()> {
        self.check_buf(buf.len())?;
        let mut inner = self.inner.lock();
        inner.file.seek(SeekFrom::Start(self.offset_of(page_id)))?;
        inner.file.write_all(buf)?;
        Ok(())
    }

    fn allocate_page(&self) -> IoResult<PageId> {
        let mut inner = self.inner.lock();
        if let Some(page_id) = inner.free_ids.pop() {
            return Ok(page_id);
        }
        let page_id = PageId::new(inner.next_page_id);
        inner.next_page_id += 1;
        Ok(page_id)
    }

    fn deallocate_page(&self, page_id: PageId) -> IoResult<()> {
        let mut inner = self.inner.lock();
        inner.free_ids.push(page_id);
        Ok(())
    }
}

impl std::fmt::Debug for FileDiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDiskManager")
            .field("path", &self.path)
            .field("page_size", &self.page_size)
            .finish()
    }
}
