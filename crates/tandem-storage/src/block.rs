//! Block manager: the page-granular storage facade the indexes consume.

use crate::disk::{DiskManager, DiskManagerConfig};
use tandem_buffer::{BufferPool, BufferPoolConfig, EvictedPage, PageReadGuard, PageWriteGuard};
use tandem_common::config::StoreConfig;
use tandem_common::page::PageId;
use tandem_common::Result;

/// Combines the disk manager and the buffer pool into the interface the
/// trees use: allocate a page, fetch a pinned view (reading through to disk
/// on a cache miss), and flush.
///
/// The block manager is process-wide state: one instance is constructed per
/// data directory and shared by every index living in it.
pub struct BlockManager {
    disk: DiskManager,
    pool: BufferPool,
}

impl BlockManager {
    /// Creates a block manager over the given data directory.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let disk = DiskManager::new(DiskManagerConfig {
            data_dir: config.data_dir.clone(),
            fsync_enabled: config.fsync_enabled,
        })?;
        let pool = BufferPool::new(BufferPoolConfig {
            num_frames: config.blocks_in_memory,
        });

        Ok(Self { disk, pool })
    }

    /// Reserves a new zeroed page at the end of the given file.
    ///
    /// The page is left resident in the cache but unpinned.
    pub fn allocate(&self, file_id: u32) -> Result<PageId> {
        let page_id = self.disk.allocate_page(file_id)?;
        let (_, evicted) = self.pool.new_page(page_id)?;
        self.write_back(evicted)?;
        self.pool.unpin_page(page_id, false);
        Ok(page_id)
    }

    /// Fetches a pinned read view of a page, loading it from disk on miss.
    pub fn fetch(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        loop {
            if let Some(guard) = self.pool.read_page(page_id) {
                return Ok(guard);
            }
            self.load(page_id)?;
        }
    }

    /// Fetches a pinned write view of a page, loading it from disk on miss.
    pub fn fetch_mut(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        loop {
            if let Some(guard) = self.pool.write_page(page_id) {
                return Ok(guard);
            }
            self.load(page_id)?;
        }
    }

    /// Reads a page from disk into the cache.
    fn load(&self, page_id: PageId) -> Result<()> {
        let data = self.disk.read_page(page_id)?;
        let (_, evicted) = self.pool.load_page(page_id, &data)?;
        self.write_back(evicted)?;
        self.pool.unpin_page(page_id, false);
        Ok(())
    }

    /// Writes an evicted dirty page back to disk.
    fn write_back(&self, evicted: Option<EvictedPage>) -> Result<()> {
        if let Some(page) = evicted {
            self.disk.write_page(page.page_id, &page.data)?;
        }
        Ok(())
    }

    /// Returns the number of pages in a file.
    pub fn num_pages(&self, file_id: u32) -> Result<u32> {
        self.disk.num_pages(file_id)
    }

    /// Writes all dirty cached pages to disk and syncs the files.
    pub fn flush(&self) -> Result<()> {
        self.pool
            .flush_all(|page_id, data| self.disk.write_page(page_id, data))?;
        self.disk.flush()
    }

    /// Returns the underlying buffer pool (for statistics).
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }
}
