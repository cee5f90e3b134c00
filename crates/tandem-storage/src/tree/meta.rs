//! Index header page codec.
//!
//! Page 0 of every index file holds the tree metadata: magic, format
//! version, block size, tree shape, key count, split fraction, and the
//! cached key bounds. It is rewritten on flush and validated on open.

use bytes::{Buf, BufMut};
use tandem_common::page::{PageId, BLOCK_SIZE};
use tandem_common::{Key, Result, TandemError};

/// Magic number identifying a TandemDB index file ("TDT1").
const TREE_MAGIC: u32 = 0x5444_5431;

/// Header format version.
const META_VERSION: u16 = 1;

/// Flag bit: min/max keys present.
const FLAG_BOUNDS: u8 = 0b0000_0001;
/// Flag bit: second-tail-leaf max key present.
const FLAG_SECOND_TAIL: u8 = 0b0000_0010;

/// Decoded contents of an index header page.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeMeta<K> {
    /// Tree height (1 = the root is a leaf).
    pub height: u32,
    /// Root page.
    pub root: PageId,
    /// Rightmost (tail) leaf page.
    pub tail: PageId,
    /// Number of stored entries.
    pub num_keys: u64,
    /// Leaf split fraction this index was created with.
    pub split_frac: f64,
    /// Smallest stored key.
    pub min_key: Option<K>,
    /// Largest stored key.
    pub max_key: Option<K>,
    /// Max key of the leaf immediately before the tail leaf.
    pub second_tail_max: Option<K>,
}

impl<K: Key> TreeMeta<K> {
    /// Encodes the header into a page-sized buffer.
    pub fn encode(&self, page: &mut [u8]) {
        debug_assert!(page.len() >= BLOCK_SIZE);
        page[..BLOCK_SIZE].fill(0);

        let mut flags = 0u8;
        if self.min_key.is_some() {
            flags |= FLAG_BOUNDS;
        }
        if self.second_tail_max.is_some() {
            flags |= FLAG_SECOND_TAIL;
        }

        let mut buf = &mut page[..BLOCK_SIZE];
        buf.put_u32_le(TREE_MAGIC);
        buf.put_u16_le(META_VERSION);
        buf.put_u16_le(0); // reserved
        buf.put_u32_le(BLOCK_SIZE as u32);
        buf.put_u32_le(self.height);
        buf.put_u64_le(self.root.as_u64());
        buf.put_u64_le(self.tail.as_u64());
        buf.put_u64_le(self.num_keys);
        buf.put_f64_le(self.split_frac);
        buf.put_u8(flags);

        let mut key_buf = [0u8; 16];
        for key in [&self.min_key, &self.max_key, &self.second_tail_max]
            .into_iter()
            .flatten()
        {
            key.encode(&mut key_buf);
            buf.put_slice(&key_buf[..K::ENCODED_LEN]);
        }
    }

    /// Decodes and validates a header page.
    pub fn decode(page_id: PageId, page: &[u8]) -> Result<Self> {
        debug_assert!(page.len() >= BLOCK_SIZE);
        let mut buf = &page[..BLOCK_SIZE];

        let magic = buf.get_u32_le();
        if magic != TREE_MAGIC {
            return Err(TandemError::PageCorrupted {
                page_id,
                reason: format!("bad index magic {:#010x}", magic),
            });
        }

        let version = buf.get_u16_le();
        if version != META_VERSION {
            return Err(TandemError::PageCorrupted {
                page_id,
                reason: format!("unsupported header version {}", version),
            });
        }
        buf.get_u16_le(); // reserved

        let block_size = buf.get_u32_le() as usize;
        if block_size != BLOCK_SIZE {
            return Err(TandemError::BlockSizeMismatch {
                expected: BLOCK_SIZE,
                actual: block_size,
            });
        }

        let height = buf.get_u32_le();
        let root = PageId::from_u64(buf.get_u64_le());
        let tail = PageId::from_u64(buf.get_u64_le());
        let num_keys = buf.get_u64_le();
        let split_frac = buf.get_f64_le();
        let flags = buf.get_u8();

        let mut key_buf = [0u8; 16];
        let mut read_key = |buf: &mut &[u8]| -> K {
            buf.copy_to_slice(&mut key_buf[..K::ENCODED_LEN]);
            K::decode(&key_buf)
        };

        let (min_key, max_key) = if flags & FLAG_BOUNDS != 0 {
            (Some(read_key(&mut buf)), Some(read_key(&mut buf)))
        } else {
            (None, None)
        };
        let second_tail_max = if flags & FLAG_SECOND_TAIL != 0 {
            Some(read_key(&mut buf))
        } else {
            None
        };

        Ok(Self {
            height,
            root,
            tail,
            num_keys,
            split_frac,
            min_key,
            max_key,
            second_tail_max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_meta() -> TreeMeta<i32> {
        TreeMeta {
            height: 3,
            root: PageId::new(0, 17),
            tail: PageId::new(0, 42),
            num_keys: 123_456,
            split_frac: 0.9,
            min_key: Some(-5),
            max_key: Some(99_000),
            second_tail_max: Some(98_500),
        }
    }

    #[test]
    fn test_meta_roundtrip() {
        let meta = sample_meta();
        let mut page = [0u8; BLOCK_SIZE];
        meta.encode(&mut page);

        let decoded = TreeMeta::<i32>::decode(PageId::new(0, 0), &page).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn test_meta_roundtrip_empty_tree() {
        let meta = TreeMeta::<i32> {
            height: 1,
            root: PageId::new(1, 1),
            tail: PageId::new(1, 1),
            num_keys: 0,
            split_frac: 0.5,
            min_key: None,
            max_key: None,
            second_tail_max: None,
        };
        let mut page = [0u8; BLOCK_SIZE];
        meta.encode(&mut page);

        let decoded = TreeMeta::<i32>::decode(PageId::new(1, 0), &page).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn test_meta_rejects_bad_magic() {
        let page = [0u8; BLOCK_SIZE];
        let result = TreeMeta::<i32>::decode(PageId::new(0, 0), &page);
        assert!(matches!(result, Err(TandemError::PageCorrupted { .. })));
    }

    #[test]
    fn test_meta_rejects_bad_version() {
        let meta = sample_meta();
        let mut page = [0u8; BLOCK_SIZE];
        meta.encode(&mut page);
        page[4] = 0xFF;

        let result = TreeMeta::<i32>::decode(PageId::new(0, 0), &page);
        assert!(matches!(result, Err(TandemError::PageCorrupted { .. })));
    }

    #[test]
    fn test_meta_rejects_block_size_mismatch() {
        let meta = sample_meta();
        let mut page = [0u8; BLOCK_SIZE];
        meta.encode(&mut page);
        // Corrupt the stored block size
        page[8..12].copy_from_slice(&(8192u32).to_le_bytes());

        let result = TreeMeta::<i32>::decode(PageId::new(0, 0), &page);
        assert!(matches!(
            result,
            Err(TandemError::BlockSizeMismatch {
                expected: BLOCK_SIZE,
                actual: 8192
            })
        ));
    }
}
