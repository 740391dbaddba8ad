//! Disk Manager - low-level file I/O for index pages.
//!
//! The [`DiskManager`] handles all direct file operations:
//! - Reading and writing pages
//! - Allocating new pages at the end of the file
//! - Syncing the file at flush boundaries

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, PageId, Result};
use crate::storage::page::Page;

/// Manages disk I/O for a single index file.
///
/// # File Layout
/// ```text
/// ┌──────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Page 0   │ Page 1  │ Page 2  │  ...    │ Page N  │
/// │ metadata │ node    │ node    │         │ node    │
/// └──────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0      4096     8192    ...    N×4096
/// ```
///
/// # Durability
/// Writes go to the OS page cache; [`DiskManager::sync`] forces them to
/// stable storage. The buffer pool calls it once per flush rather than once
/// per page. Crash consistency between syncs is not provided.
pub struct DiskManager {
    file: File,
    path: PathBuf,
    /// Number of pages in the file.
    page_count: u32,
}

impl DiskManager {
    /// Create a new index file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path.as_ref())?;

        Ok(Self {
            file,
            path: path.as_ref().to_path_buf(),
            page_count: 0,
        })
    }

    /// Open an existing index file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;

        let file_size = file.metadata()?.len();
        let page_count = u32::try_from(file_size / PAGE_SIZE as u64).map_err(|_| {
            Error::InvalidConfig(format!(
                "{} is too large to be an index file",
                path.as_ref().display()
            ))
        })?;

        Ok(Self {
            file,
            path: path.as_ref().to_path_buf(),
            page_count,
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a page from disk.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page doesn't exist.
    pub fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        if page_id.0 >= self.page_count {
            return Err(Error::PageNotFound(page_id.0));
        }

        self.file.seek(SeekFrom::Start(Self::offset_of(page_id)))?;
        let mut page = Page::new();
        self.file.read_exact(page.as_mut_slice())?;

        Ok(page)
    }

    /// Write a page to disk.
    ///
    /// The page must have been previously allocated with `allocate_page()`.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page hasn't been allocated.
    pub fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        if page_id.0 >= self.page_count {
            return Err(Error::PageNotFound(page_id.0));
        }

        self.file.seek(SeekFrom::Start(Self::offset_of(page_id)))?;
        self.file.write_all(page.as_slice())?;

        Ok(())
    }

    /// Allocate a new zeroed page at the end of the file.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        let page_id = PageId::new(self.page_count);
        if !page_id.is_valid() {
            return Err(Error::InvalidConfig(format!(
                "{} has no page ids left",
                self.path.display()
            )));
        }

        self.file
            .set_len(Self::offset_of(page_id) + PAGE_SIZE as u64)?;
        self.page_count += 1;

        tracing::trace!(target: "pagetree::storage", page = page_id.0, "allocated page");
        Ok(page_id)
    }

    /// Force written pages to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Get the number of pages in the file.
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    #[inline]
    fn offset_of(page_id: PageId) -> u64 {
        (page_id.0 as u64) * (PAGE_SIZE as u64)
    }
}
