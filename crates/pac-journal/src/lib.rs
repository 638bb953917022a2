//! Atomic double-page boot journal.
//!
//! The journal is a fixed-size file of exactly two back-to-back pages, each
//! the serialized size of one boot record. Writes go page A, durability
//! barrier, page B, barrier, so after any crash at most one page is torn
//! and the survivor's boot count is at most one behind. Reads validate both
//! pages independently, pick the newer valid one, and heal the other.

pub mod checksum;
pub mod codec;
pub mod storage;
pub mod store;

pub use checksum::crc32;
pub use codec::{
    decode_record, encode_record, validate_page, PageVerdict, JOURNAL_FILE_SIZE, JOURNAL_MAGIC,
    PAGE_A_OFFSET, PAGE_B_OFFSET, RECORD_SIZE,
};
pub use storage::{FileStorage, MemStorage, Storage, StorageFault};
pub use store::{Journal, RecoverySource};
