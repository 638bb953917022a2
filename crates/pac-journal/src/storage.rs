//! Storage backends for the journal.
//!
//! The journal store talks to a small positional-I/O seam so it can run on
//! a real file in production and on an in-memory buffer in tests. The
//! in-memory backend injects deterministic faults (torn writes, failed
//! syncs) so crash recovery is testable without a power supply.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use pac_error::{PacError, Result};

/// Positional I/O over a journal backing.
///
/// Offsets are absolute. `sync` is the durability barrier: the store never
/// assumes bytes are on media until it returns.
pub trait Storage {
    /// Read up to `buf.len()` bytes at `offset`; short reads zero-fill the
    /// tail and return the byte count actually read.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Write all of `buf` at `offset`.
    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<()>;

    /// Flush written bytes to durable media.
    fn sync(&mut self) -> Result<()>;

    /// Current backing length in bytes.
    fn len(&mut self) -> Result<u64>;

    /// Truncate or extend the backing to exactly `size` bytes.
    fn set_len(&mut self, size: u64) -> Result<()>;
}

/// Journal backing on a real file.
#[derive(Debug)]
pub struct FileStorage {
    file: File,
}

impl FileStorage {
    /// Open `path` read-write, creating it when absent.
    ///
    /// A path that neither exists nor can be created is the one fatal
    /// condition in the stack.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => PacError::fatal(
                    format!("journal path {} unusable: {err}", path.display()),
                ),
                _ => PacError::Io(err),
            })?;
        Ok(Self { file })
    }
}

impl Storage for FileStorage {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        buf[filled..].fill(0);
        Ok(filled)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn len(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn set_len(&mut self, size: u64) -> Result<()> {
        self.file.set_len(size)?;
        Ok(())
    }
}

/// A deterministic fault to inject into [`MemStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFault {
    /// The next write applies only its first `valid_bytes` bytes, then the
    /// backing rejects all further operations (power lost mid-write).
    TornWrite { valid_bytes: usize },
    /// The next sync fails and the backing rejects all further operations
    /// (power lost at the barrier).
    FailNextSync,
    /// Every operation fails from now on.
    Dead,
}

/// In-memory journal backing with one-shot fault injection.
///
/// Faults are one-shot and deterministic, so crash tests stay
/// reproducible.
#[derive(Debug, Default)]
pub struct MemStorage {
    data: Vec<u8>,
    fault: Option<StorageFault>,
    dead: bool,
    /// Number of syncs that completed successfully.
    pub sync_count: u64,
}

impl MemStorage {
    /// Fresh empty backing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backing pre-seeded with `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Arm a one-shot fault.
    pub fn inject(&mut self, fault: StorageFault) {
        self.fault = Some(fault);
    }

    /// Clear the dead state, as if the device power-cycled: the surviving
    /// bytes stay, operations work again.
    pub fn power_cycle(&mut self) {
        self.dead = false;
        self.fault = None;
    }

    /// Borrow the raw bytes (for corrupting them in tests).
    #[must_use]
    pub fn bytes_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    /// Copy of the raw bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn check_alive(&self) -> Result<()> {
        if self.dead {
            Err(PacError::Io(io::Error::new(
                io::ErrorKind::Other,
                "storage backing lost power",
            )))
        } else {
            Ok(())
        }
    }
}

impl Storage for MemStorage {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.check_alive()?;
        let offset = usize::try_from(offset).map_err(|_| PacError::internal("offset overflow"))?;
        if offset >= self.data.len() {
            buf.fill(0);
            return Ok(0);
        }
        let available = self.data.len() - offset;
        let n = buf.len().min(available);
        buf[..n].copy_from_slice(&self.data[offset..offset + n]);
        buf[n..].fill(0);
        Ok(n)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        self.check_alive()?;
        let offset = usize::try_from(offset).map_err(|_| PacError::internal("offset overflow"))?;

        let effective = match self.fault {
            Some(StorageFault::TornWrite { valid_bytes }) => {
                self.fault = None;
                self.dead = true;
                valid_bytes.min(buf.len())
            }
            Some(StorageFault::Dead) => {
                self.dead = true;
                return Err(PacError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "storage backing lost power",
                )));
            }
            _ => buf.len(),
        };

        let end = offset + effective;
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[offset..end].copy_from_slice(&buf[..effective]);

        if self.dead {
            Err(PacError::Io(io::Error::new(
                io::ErrorKind::Other,
                "torn write: power lost mid-page",
            )))
        } else {
            Ok(())
        }
    }

    fn sync(&mut self) -> Result<()> {
        self.check_alive()?;
        if matches!(self.fault, Some(StorageFault::FailNextSync)) {
            self.fault = None;
            self.dead = true;
            return Err(PacError::Io(io::Error::new(
                io::ErrorKind::Other,
                "sync failed: power lost at barrier",
            )));
        }
        self.sync_count += 1;
        Ok(())
    }

    fn len(&mut self) -> Result<u64> {
        self.check_alive()?;
        Ok(self.data.len() as u64)
    }

    fn set_len(&mut self, size: u64) -> Result<()> {
        self.check_alive()?;
        let size = usize::try_from(size).map_err(|_| PacError::internal("length overflow"))?;
        self.data.resize(size, 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_storage_reads_zero_fill() {
        let mut storage = MemStorage::with_data(vec![1, 2, 3]);
        let mut buf = [0xFFu8; 6];
        let n = storage.read_at(&mut buf, 0).expect("read succeeds");
        assert_eq!(n, 3);
        assert_eq!(buf, [1, 2, 3, 0, 0, 0]);

        let n = storage.read_at(&mut buf, 10).expect("past-end read");
        assert_eq!(n, 0);
        assert_eq!(buf, [0; 6]);
    }

    #[test]
    fn mem_storage_write_extends() {
        let mut storage = MemStorage::new();
        storage.write_at(&[7, 8], 4).expect("write succeeds");
        assert_eq!(storage.bytes(), &[0, 0, 0, 0, 7, 8]);
    }

    #[test]
    fn torn_write_applies_prefix_then_kills_backing() {
        let mut storage = MemStorage::with_data(vec![0u8; 8]);
        storage.inject(StorageFault::TornWrite { valid_bytes: 3 });
        let err = storage.write_at(&[9u8; 8], 0).expect_err("write tears");
        assert!(matches!(err, PacError::Io(_)));
        assert_eq!(&storage.bytes()[..4], &[9, 9, 9, 0]);
        assert!(storage.sync().is_err());

        storage.power_cycle();
        assert!(storage.sync().is_ok());
        assert_eq!(&storage.bytes()[..4], &[9, 9, 9, 0]);
    }

    #[test]
    fn failed_sync_kills_backing() {
        let mut storage = MemStorage::new();
        storage.write_at(&[1], 0).expect("write succeeds");
        storage.inject(StorageFault::FailNextSync);
        assert!(storage.sync().is_err());
        assert!(storage.write_at(&[2], 0).is_err());
    }

    #[test]
    fn file_storage_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("journal.dat");
        let mut storage = FileStorage::open(&path).expect("open creates");
        storage.write_at(&[5, 6, 7], 0).expect("write");
        storage.sync().expect("sync");
        assert_eq!(storage.len().expect("len"), 3);

        let mut buf = [0u8; 3];
        let n = storage.read_at(&mut buf, 0).expect("read");
        assert_eq!(n, 3);
        assert_eq!(buf, [5, 6, 7]);
    }

    #[test]
    fn file_storage_unreachable_path_is_fatal() {
        let err = FileStorage::open(Path::new("/nonexistent-root-dir/journal.dat"))
            .expect_err("cannot create");
        assert!(matches!(err, PacError::Fatal { .. }));
    }
}
