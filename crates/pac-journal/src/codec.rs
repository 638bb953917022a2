//! Fixed-layout serialization of a boot record to and from a journal page.
//!
//! Layout (little-endian, packed, no padding):
//! ```text
//! Offset  Size  Field
//!   0       4   version       (= 1)
//!   4       1   tier          (1, 2, or 3)
//!   5       1   tries_t2
//!   6       1   tries_t3
//!   7       1   rollback_idx
//!   8       4   flags
//!  12       8   boot_count
//!  20       8   timestamp
//!  28       4   crc32         (over bytes 0..28)
//!  32       4   trailer       (magic 0xA771A771)
//! ```
//! This layout is the interoperability surface between the boot controller,
//! the runtime monitor, and the administrative CLI; it must stay
//! byte-compatible across implementations.

use pac_error::{PacError, Result};
use pac_types::{BootFlags, BootRecord, Tier, JOURNAL_VERSION};

use crate::checksum::crc32;

/// Magic trailer constant closing every valid page.
pub const JOURNAL_MAGIC: u32 = 0xA771_A771;

/// Serialized size of one boot record, which is also the page size.
pub const RECORD_SIZE: usize = 36;

/// Byte offset of page A in the journal file.
pub const PAGE_A_OFFSET: u64 = 0;

/// Byte offset of page B in the journal file.
pub const PAGE_B_OFFSET: u64 = RECORD_SIZE as u64;

/// Total journal file size: two contiguous pages.
pub const JOURNAL_FILE_SIZE: u64 = (RECORD_SIZE * 2) as u64;

const OFF_VERSION: usize = 0;
const OFF_TIER: usize = 4;
const OFF_TRIES_T2: usize = 5;
const OFF_TRIES_T3: usize = 6;
const OFF_ROLLBACK_IDX: usize = 7;
const OFF_FLAGS: usize = 8;
const OFF_BOOT_COUNT: usize = 12;
const OFF_TIMESTAMP: usize = 20;
const OFF_CRC32: usize = 28;
const OFF_TRAILER: usize = 32;

/// Largest meaningful retry budget; decoded values above it clamp to zero.
const TRIES_CEILING: u8 = 3;

fn read_u32_at(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(
        buf[offset..offset + 4]
            .try_into()
            .expect("offset arithmetic is static"),
    )
}

fn read_u64_at(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(
        buf[offset..offset + 8]
            .try_into()
            .expect("offset arithmetic is static"),
    )
}

fn write_u32_at(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_u64_at(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Serialize a record into one page, computing its checksum and trailer.
#[must_use]
pub fn encode_record(rec: &BootRecord) -> [u8; RECORD_SIZE] {
    let mut page = [0u8; RECORD_SIZE];
    write_u32_at(&mut page, OFF_VERSION, rec.version);
    page[OFF_TIER] = rec.tier.as_u8();
    page[OFF_TRIES_T2] = rec.tries_t2;
    page[OFF_TRIES_T3] = rec.tries_t3;
    page[OFF_ROLLBACK_IDX] = rec.rollback_idx;
    write_u32_at(&mut page, OFF_FLAGS, rec.flags.bits());
    write_u64_at(&mut page, OFF_BOOT_COUNT, rec.boot_count);
    write_u64_at(&mut page, OFF_TIMESTAMP, rec.timestamp);
    let crc = crc32(&page[..OFF_CRC32]);
    write_u32_at(&mut page, OFF_CRC32, crc);
    write_u32_at(&mut page, OFF_TRAILER, JOURNAL_MAGIC);
    page
}

/// Why a page failed validation. The first failed check wins, so recovery
/// logs name the precise defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageVerdict {
    Valid,
    BadTrailer { found: u32 },
    BadChecksum { stored: u32, computed: u32 },
    BadVersion { found: u32 },
    BadTier { found: u8 },
}

impl PageVerdict {
    /// True when the page passed every validity check.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl std::fmt::Display for PageVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::BadTrailer { found } => write!(f, "trailer {found:#010x} != magic"),
            Self::BadChecksum { stored, computed } => {
                write!(f, "crc {stored:#010x} != computed {computed:#010x}")
            }
            Self::BadVersion { found } => write!(f, "unsupported layout version {found}"),
            Self::BadTier { found } => write!(f, "tier {found} out of range"),
        }
    }
}

/// Validate one page against the record invariants without decoding it.
#[must_use]
pub fn validate_page(page: &[u8; RECORD_SIZE]) -> PageVerdict {
    let trailer = read_u32_at(page, OFF_TRAILER);
    if trailer != JOURNAL_MAGIC {
        return PageVerdict::BadTrailer { found: trailer };
    }
    let stored = read_u32_at(page, OFF_CRC32);
    let computed = crc32(&page[..OFF_CRC32]);
    if stored != computed {
        return PageVerdict::BadChecksum { stored, computed };
    }
    let version = read_u32_at(page, OFF_VERSION);
    if version != JOURNAL_VERSION {
        return PageVerdict::BadVersion { found: version };
    }
    let tier = page[OFF_TIER];
    if Tier::from_raw(tier).is_none() {
        return PageVerdict::BadTier { found: tier };
    }
    PageVerdict::Valid
}

/// Deserialize a page into a record.
///
/// Fails with `BadLayout` when the buffer is not exactly one page, and with
/// `Corrupt` when the page does not validate. Retry budgets above the
/// ceiling clamp to zero (soft invariant).
pub fn decode_record(page: &[u8]) -> Result<BootRecord> {
    let page: &[u8; RECORD_SIZE] =
        page.try_into().map_err(|_| PacError::BadLayout {
            expected: RECORD_SIZE,
            actual: page.len(),
        })?;
    let verdict = validate_page(page);
    if !verdict.is_valid() {
        return Err(PacError::corrupt(verdict.to_string()));
    }

    let clamp = |tries: u8| if tries > TRIES_CEILING { 0 } else { tries };

    Ok(BootRecord {
        version: read_u32_at(page, OFF_VERSION),
        tier: Tier::from_raw(page[OFF_TIER]).expect("tier validated above"),
        tries_t2: clamp(page[OFF_TRIES_T2]),
        tries_t3: clamp(page[OFF_TRIES_T3]),
        rollback_idx: page[OFF_ROLLBACK_IDX],
        flags: BootFlags::from_bits_retain(read_u32_at(page, OFF_FLAGS)),
        boot_count: read_u64_at(page, OFF_BOOT_COUNT),
        timestamp: read_u64_at(page, OFF_TIMESTAMP),
    })
}

/// Read the boot count straight out of an encoded page.
///
/// Only meaningful on a validated page; recovery uses it to pick the newer
/// of two valid pages.
#[must_use]
pub fn page_boot_count(page: &[u8; RECORD_SIZE]) -> u64 {
    read_u64_at(page, OFF_BOOT_COUNT)
}
