//! The two-page atomic journal store.
//!
//! Every write lands on page A, crosses a durability barrier, then lands on
//! page B and crosses a second barrier. Every read validates both pages and
//! applies the recovery table:
//!
//! | A valid | B valid | result                                     |
//! |---------|---------|--------------------------------------------|
//! | yes     | yes     | larger boot_count wins, ties go to A       |
//! | yes     | no      | A, and B is healed from A                  |
//! | no      | yes     | B, and A is healed from B                  |
//! | no      | no      | default record written to both pages       |
//!
//! Because torn writes are confined to one page, the surviving page's boot
//! count is at most one behind the interrupted write.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use pac_error::Result;
use pac_types::BootRecord;
use tracing::{debug, warn};

use crate::codec::{
    decode_record, encode_record, page_boot_count, validate_page, JOURNAL_FILE_SIZE,
    PAGE_A_OFFSET, PAGE_B_OFFSET, RECORD_SIZE,
};
use crate::storage::{FileStorage, MemStorage, Storage};

/// Which page a read decision came from. Exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySource {
    /// Both pages valid, page A chosen (newer or tied).
    PageA,
    /// Both pages valid, page B newer.
    PageB,
    /// Page A valid, page B healed from it.
    PageAHealedB,
    /// Page B valid, page A healed from it.
    PageBHealedA,
    /// Both pages invalid; a default record was reconstructed.
    Reconstructed,
}

/// Handle to an open journal.
///
/// An explicit value, not process-global state: callers own exactly one per
/// journal file and pass it to every operation.
#[derive(Debug)]
pub struct Journal<S: Storage> {
    storage: S,
}

impl Journal<FileStorage> {
    /// Open the journal at `path`, initializing it with two copies of the
    /// default record when the file is missing or shorter than two pages.
    pub fn open_or_init(path: &Path) -> Result<Self> {
        let storage = FileStorage::open(path)?;
        let mut journal = Self { storage };
        journal.init_if_needed()?;
        Ok(journal)
    }
}

impl Journal<MemStorage> {
    /// In-memory journal for tests, initialized like a fresh device.
    pub fn open_in_memory() -> Result<Self> {
        let mut journal = Self {
            storage: MemStorage::new(),
        };
        journal.init_if_needed()?;
        Ok(journal)
    }
}

impl<S: Storage> Journal<S> {
    /// Open a journal over an arbitrary backing, initializing if short.
    pub fn open_with(storage: S) -> Result<Self> {
        let mut journal = Self { storage };
        journal.init_if_needed()?;
        Ok(journal)
    }

    /// Borrow the backing (test inspection).
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    fn init_if_needed(&mut self) -> Result<()> {
        if self.storage.len()? >= JOURNAL_FILE_SIZE {
            debug!("opened existing journal");
            return Ok(());
        }
        let mut rec = BootRecord::default();
        rec.timestamp = now_epoch_seconds();
        let page = encode_record(&rec);
        self.storage.set_len(JOURNAL_FILE_SIZE)?;
        self.storage.write_at(&page, PAGE_A_OFFSET)?;
        self.storage.sync()?;
        self.storage.write_at(&page, PAGE_B_OFFSET)?;
        self.storage.sync()?;
        debug!("created new journal");
        Ok(())
    }

    fn read_page(&mut self, offset: u64) -> Result<[u8; RECORD_SIZE]> {
        let mut page = [0u8; RECORD_SIZE];
        self.storage.read_at(&mut page, offset)?;
        Ok(page)
    }

    fn write_page(&mut self, offset: u64, page: &[u8; RECORD_SIZE]) -> Result<()> {
        self.storage.write_at(page, offset)?;
        self.storage.sync()
    }

    /// Read the current record, running recovery.
    ///
    /// Never returns an invalid record: corruption of one page heals from
    /// the other, corruption of both reconstructs the default record.
    pub fn read(&mut self) -> Result<BootRecord> {
        Ok(self.read_with_source()?.0)
    }

    /// Read plus the recovery path taken.
    pub fn read_with_source(&mut self) -> Result<(BootRecord, RecoverySource)> {
        let page_a = self.read_page(PAGE_A_OFFSET)?;
        let page_b = self.read_page(PAGE_B_OFFSET)?;
        let verdict_a = validate_page(&page_a);
        let verdict_b = validate_page(&page_b);

        match (verdict_a.is_valid(), verdict_b.is_valid()) {
            (true, true) => {
                let count_a = page_boot_count(&page_a);
                let count_b = page_boot_count(&page_b);
                if count_a >= count_b {
                    if count_a > count_b {
                        // B lost the race against a crash between the two
                        // page writes; bring it up to date.
                        self.write_page(PAGE_B_OFFSET, &page_a)?;
                    }
                    Ok((decode_record(&page_a)?, RecoverySource::PageA))
                } else {
                    self.write_page(PAGE_A_OFFSET, &page_b)?;
                    Ok((decode_record(&page_b)?, RecoverySource::PageB))
                }
            }
            (true, false) => {
                warn!(page = "B", %verdict_b, "journal page invalid, healing from A");
                self.write_page(PAGE_B_OFFSET, &page_a)?;
                Ok((decode_record(&page_a)?, RecoverySource::PageAHealedB))
            }
            (false, true) => {
                warn!(page = "A", %verdict_a, "journal page invalid, healing from B");
                self.write_page(PAGE_A_OFFSET, &page_b)?;
                Ok((decode_record(&page_b)?, RecoverySource::PageBHealedA))
            }
            (false, false) => {
                warn!(%verdict_a, %verdict_b, "both journal pages corrupt, writing default record");
                let mut rec = BootRecord::default();
                rec.timestamp = now_epoch_seconds();
                let page = encode_record(&rec);
                self.write_page(PAGE_A_OFFSET, &page)?;
                self.write_page(PAGE_B_OFFSET, &page)?;
                Ok((rec, RecoverySource::Reconstructed))
            }
        }
    }

    /// Commit a record: refresh its timestamp, write page A, barrier, write
    /// page B, barrier.
    ///
    /// On failure the on-disk state is still recoverable: at most one page
    /// is torn, and the recovery table restores a valid record.
    pub fn write(&mut self, rec: &mut BootRecord) -> Result<()> {
        rec.timestamp = now_epoch_seconds();
        let page = encode_record(rec);
        self.write_page(PAGE_A_OFFSET, &page)?;
        self.write_page(PAGE_B_OFFSET, &page)?;
        debug!(
            tier = rec.tier.as_u8(),
            boot_count = rec.boot_count,
            "journal committed"
        );
        Ok(())
    }

    /// Advance the boot ordinal and commit in one step.
    ///
    /// Saturation at `u64::MAX` is logged, never fatal.
    pub fn increment_boot_count(&mut self, rec: &mut BootRecord) -> Result<()> {
        if !rec.increment_boot_count() {
            warn!("boot counter saturated at u64::MAX");
        }
        self.write(rec)
    }

    /// Release the backing.
    pub fn close(self) {
        drop(self);
    }
}

fn now_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
