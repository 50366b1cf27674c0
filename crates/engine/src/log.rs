//! Append-only transaction log file
//!
//! Each record is framed as:
//!
//! ```text
//! [u32 LE payload length][u32 LE crc32 of payload][payload]
//! ```
//!
//! Appends are buffered by the OS until `sync` (or a background flush)
//! forces them to disk.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use vigil_core::{DurabilityError, DurabilityResult};
use vigil_durability::LogHandle;

/// Log file name inside the database directory.
pub const LOG_FILE_NAME: &str = "vigil.log";

const RECORD_HEADER_SIZE: u64 = 8;

/// The transaction log of one database.
pub struct FileLog {
    path: PathBuf,
    file: Mutex<File>,
    size: AtomicU64,
    unsynced: AtomicBool,
    sync_calls: AtomicU64,
}

impl FileLog {
    /// Open or create the log at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            size: AtomicU64::new(size),
            unsynced: AtomicBool::new(false),
            sync_calls: AtomicU64::new(0),
        })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Returns the new log size.
    pub fn append(&self, payload: &[u8]) -> DurabilityResult<u64> {
        let len = u32::try_from(payload.len())
            .map_err(|_| DurabilityError::internal("log record larger than 4 GiB"))?;
        let mut frame = Vec::with_capacity(payload.len() + RECORD_HEADER_SIZE as usize);
        frame.write_u32::<LittleEndian>(len)?;
        frame.write_u32::<LittleEndian>(crc32fast::hash(payload))?;
        frame.extend_from_slice(payload);

        let mut file = self.file.lock();
        file.seek(SeekFrom::End(0))?;
        file.write_all(&frame)?;
        self.unsynced.store(true, Ordering::Release);
        let size = self.size.fetch_add(frame.len() as u64, Ordering::AcqRel) + frame.len() as u64;
        Ok(size)
    }

    /// Force appended records to disk.
    pub fn sync(&self) -> io::Result<()> {
        let file = self.file.lock();
        self.unsynced.store(false, Ordering::Release);
        if let Err(e) = file.sync_data() {
            self.unsynced.store(true, Ordering::Release);
            return Err(e);
        }
        self.sync_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Whether records were appended since the last sync
    pub fn has_unsynced_data(&self) -> bool {
        self.unsynced.load(Ordering::Acquire)
    }

    /// Current size in bytes
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// Number of successful syncs
    pub fn sync_count(&self) -> u64 {
        self.sync_calls.load(Ordering::Relaxed)
    }

    /// Read and verify every record.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` on a checksum mismatch or a truncated record.
    pub fn read_records(&self) -> DurabilityResult<Vec<Vec<u8>>> {
        let mut bytes = Vec::new();
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(0))?;
            file.read_to_end(&mut bytes)?;
        }

        let total = bytes.len() as u64;
        let mut cursor = Cursor::new(bytes);
        let mut records = Vec::new();
        while cursor.position() < total {
            let offset = cursor.position();
            if total - offset < RECORD_HEADER_SIZE {
                return Err(DurabilityError::corruption(format!(
                    "truncated record header at offset {} in {}",
                    offset,
                    self.path.display()
                )));
            }
            let len = cursor.read_u32::<LittleEndian>()? as u64;
            let crc = cursor.read_u32::<LittleEndian>()?;
            if total - cursor.position() < len {
                return Err(DurabilityError::corruption(format!(
                    "truncated record at offset {} in {}",
                    offset,
                    self.path.display()
                )));
            }
            let mut payload = vec![0u8; len as usize];
            cursor.read_exact(&mut payload)?;
            if crc32fast::hash(&payload) != crc {
                return Err(DurabilityError::corruption(format!(
                    "checksum mismatch at offset {} in {}",
                    offset,
                    self.path.display()
                )));
            }
            records.push(payload);
        }
        Ok(records)
    }

    /// Drop every record and sync the empty file.
    pub fn truncate(&self) -> io::Result<()> {
        let mut file = self.file.lock();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.sync_all()?;
        self.size.store(0, Ordering::Release);
        self.unsynced.store(false, Ordering::Release);
        Ok(())
    }
}

impl LogHandle for FileLog {
    fn flush(&self) -> DurabilityResult<()> {
        if self.has_unsynced_data() {
            self.sync()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for FileLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLog")
            .field("path", &self.path)
            .field("size", &self.size())
            .field("unsynced", &self.has_unsynced_data())
            .finish()
    }
}
