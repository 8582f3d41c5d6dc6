use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stow_types::StorageKey;
use tracing::{debug, info, warn};

use crate::config::SyncMode;
use crate::error::{AdapterError, AdapterResult};
use crate::handle::HandleLock;
use crate::traits::StorageAdapter;

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Record payload as written. `value == None` is a tombstone.
#[derive(Serialize)]
struct RecordRef<'a> {
    key: &'a StorageKey,
    value: Option<&'a [u8]>,
}

/// Record payload as read back.
#[derive(Deserialize)]
struct Record {
    key: StorageKey,
    value: Option<Vec<u8>>,
}

/// Position of the live record for a key.
#[derive(Clone, Copy, Debug)]
struct RecordLoc {
    offset: u64,
    len: u32,
}

impl RecordLoc {
    fn frame_len(&self) -> u64 {
        HEADER_SIZE as u64 + self.len as u64
    }
}

/// Outcome of [`FileAdapter::compact`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompactionReport {
    pub records_kept: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// Frame a record:
///
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized key + optional value)]
/// ```
fn encode_frame(key: &StorageKey, value: Option<&[u8]>) -> AdapterResult<Vec<u8>> {
    let payload = bincode::serialize(&RecordRef { key, value })
        .map_err(|e| AdapterError::Serialization(e.to_string()))?;
    let length = u32::try_from(payload.len())
        .map_err(|_| AdapterError::Serialization(format!("record for {key} exceeds 4 GiB")))?;
    let crc = crc32fast::hash(&payload);

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

fn split_header(header: &[u8; HEADER_SIZE]) -> (u32, u32) {
    let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    (length, crc)
}

/// State rebuilt from the data file on open.
struct Recovered {
    index: HashMap<StorageKey, RecordLoc>,
    end: u64,
    dead_bytes: u64,
}

/// Scan the data file front-to-back and rebuild the key index.
///
/// Records failing the CRC check are skipped (logged). A short or
/// impossible frame ends the scan: everything from there on is a torn tail.
fn recover(file: &mut File) -> AdapterResult<Recovered> {
    let file_len = file.metadata()?.len();
    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(&mut *file);

    let mut index: HashMap<StorageKey, RecordLoc> = HashMap::new();
    let mut dead_bytes = 0u64;
    let mut offset = 0u64;

    while offset + HEADER_SIZE as u64 <= file_len {
        let mut header = [0u8; HEADER_SIZE];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let (length, expected_crc) = split_header(&header);

        if length == 0 || offset + HEADER_SIZE as u64 + length as u64 > file_len {
            warn!(offset, length, file_len, "invalid record length; stopping recovery");
            break;
        }

        let mut payload = vec![0u8; length as usize];
        match reader.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!(offset, "truncated record; stopping recovery");
                break;
            }
            Err(e) => return Err(e.into()),
        }

        let loc = RecordLoc { offset, len: length };
        offset += loc.frame_len();

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            warn!(
                offset = loc.offset,
                expected = expected_crc,
                actual = actual_crc,
                "CRC mismatch; skipping record"
            );
            dead_bytes += loc.frame_len();
            continue;
        }

        let record: Record = match bincode::deserialize(&payload) {
            Ok(record) => record,
            Err(e) => {
                warn!(offset = loc.offset, error = %e, "undecodable record; skipping");
                dead_bytes += loc.frame_len();
                continue;
            }
        };

        match record.value {
            Some(_) => {
                if let Some(old) = index.insert(record.key, loc) {
                    dead_bytes += old.frame_len();
                }
            }
            None => {
                if let Some(old) = index.remove(&record.key) {
                    dead_bytes += old.frame_len();
                }
                dead_bytes += loc.frame_len();
            }
        }
    }

    Ok(Recovered {
        index,
        end: offset,
        dead_bytes,
    })
}

/// Open data file plus its in-memory key index.
struct FileHandle {
    path: PathBuf,
    file: File,
    index: HashMap<StorageKey, RecordLoc>,
    /// Offset one past the last valid record; appends go here.
    end: u64,
    /// Bytes held by overwritten, deleted, or skipped records.
    dead_bytes: u64,
    sync: SyncMode,
}

impl FileHandle {
    fn append(&mut self, key: &StorageKey, value: Option<&[u8]>) -> AdapterResult<RecordLoc> {
        let frame = encode_frame(key, value)?;
        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(&frame)?;
        if matches!(self.sync, SyncMode::EveryWrite) {
            self.file.sync_data()?;
        }

        let loc = RecordLoc {
            offset: self.end,
            len: (frame.len() - HEADER_SIZE) as u32,
        };
        self.end += frame.len() as u64;
        Ok(loc)
    }

    fn read_value(&mut self, key: &StorageKey, loc: RecordLoc) -> AdapterResult<Vec<u8>> {
        let corrupt = |reason: &str| AdapterError::Corrupt {
            key: key.clone(),
            reason: format!("{reason} at offset {}", loc.offset),
        };

        self.file.seek(SeekFrom::Start(loc.offset))?;
        let mut header = [0u8; HEADER_SIZE];
        match self.file.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(corrupt("truncated header"))
            }
            Err(e) => return Err(e.into()),
        }
        let (length, expected_crc) = split_header(&header);
        if length != loc.len {
            return Err(corrupt("length field changed"));
        }

        let mut payload = vec![0u8; length as usize];
        match self.file.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(corrupt("truncated payload"))
            }
            Err(e) => return Err(e.into()),
        }
        if crc32fast::hash(&payload) != expected_crc {
            return Err(corrupt("CRC mismatch"));
        }

        let record: Record =
            bincode::deserialize(&payload).map_err(|_| corrupt("undecodable payload"))?;
        if record.key != *key {
            return Err(corrupt("record belongs to another key"));
        }
        record.value.ok_or_else(|| corrupt("index points at a tombstone"))
    }

    fn compact(&mut self) -> AdapterResult<CompactionReport> {
        let bytes_before = self.end;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut live: Vec<(StorageKey, RecordLoc)> = self
            .index
            .iter()
            .map(|(key, loc)| (key.clone(), *loc))
            .collect();
        live.sort_by_key(|(_, loc)| loc.offset);

        // Any unreadable record aborts compaction; the original file is untouched.
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        let mut index = HashMap::with_capacity(live.len());
        let mut offset = 0u64;
        for (key, loc) in live {
            let value = self.read_value(&key, loc)?;
            let frame = encode_frame(&key, Some(&value))?;
            tmp.write_all(&frame)?;
            let new_loc = RecordLoc {
                offset,
                len: (frame.len() - HEADER_SIZE) as u32,
            };
            offset += new_loc.frame_len();
            index.insert(key, new_loc);
        }
        tmp.as_file().sync_all()?;
        let file = tmp.persist(&self.path).map_err(|e| e.error)?;

        self.file = file;
        self.index = index;
        self.end = offset;
        self.dead_bytes = 0;

        Ok(CompactionReport {
            records_kept: self.index.len(),
            bytes_before,
            bytes_after: offset,
        })
    }
}

/// Single-file hashed key/value store.
///
/// Every `put` and `delete` appends a CRC-framed record to one data file; a
/// hash index from key to record offset lives in memory and is rebuilt by
/// scanning the file on open. Reads re-verify the CRC, so bytes damaged
/// after open surface as [`AdapterError::Corrupt`] instead of garbage.
/// Overwritten and deleted records stay in the file until [`compact`].
///
/// [`compact`]: FileAdapter::compact
pub struct FileAdapter {
    path: PathBuf,
    handle: HandleLock<FileHandle>,
}

impl FileAdapter {
    /// Open (or create) the data file at `path`.
    pub fn open(path: impl AsRef<Path>, sync: SyncMode, timeout: Duration) -> AdapterResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        let file_len = file.metadata()?.len();
        let recovered = recover(&mut file)?;

        if recovered.end < file_len {
            warn!(
                path = %path.display(),
                valid = recovered.end,
                file_len,
                "discarding torn tail"
            );
            file.set_len(recovered.end)?;
        }

        info!(
            path = %path.display(),
            keys = recovered.index.len(),
            bytes = recovered.end,
            "opened data file"
        );

        let handle = FileHandle {
            path: path.to_path_buf(),
            file,
            index: recovered.index,
            end: recovered.end,
            dead_bytes: recovered.dead_bytes,
            sync,
        };
        Ok(Self {
            path: path.to_path_buf(),
            handle: HandleLock::new(handle, timeout),
        })
    }

    /// Path to the data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of live keys.
    pub fn len(&self) -> AdapterResult<usize> {
        self.handle.with("len", |h| Ok(h.index.len()))
    }

    pub fn is_empty(&self) -> AdapterResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Bytes in the data file that no longer back a live key.
    pub fn dead_bytes(&self) -> AdapterResult<u64> {
        self.handle.with("dead_bytes", |h| Ok(h.dead_bytes))
    }

    /// Current size of the data file.
    pub fn file_size(&self) -> AdapterResult<u64> {
        self.handle.with("file_size", |h| Ok(h.end))
    }

    /// Rewrite the data file with only live records, atomically replacing
    /// the old one.
    pub fn compact(&self) -> AdapterResult<CompactionReport> {
        let report = self.handle.with("compact", FileHandle::compact)?;
        info!(
            path = %self.path.display(),
            kept = report.records_kept,
            before = report.bytes_before,
            after = report.bytes_after,
            "compacted data file"
        );
        Ok(report)
    }
}

impl StorageAdapter for FileAdapter {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn put(&self, key: &StorageKey, value: &[u8]) -> AdapterResult<()> {
        self.handle.with("put", |h| {
            let loc = h.append(key, Some(value))?;
            if let Some(old) = h.index.insert(key.clone(), loc) {
                h.dead_bytes += old.frame_len();
            }
            debug!(%key, offset = loc.offset, len = value.len(), "record appended");
            Ok(())
        })
    }

    fn get(&self, key: &StorageKey) -> AdapterResult<Option<Vec<u8>>> {
        self.handle.with("get", |h| match h.index.get(key).copied() {
            Some(loc) => h.read_value(key, loc).map(Some),
            None => Ok(None),
        })
    }

    fn exists(&self, key: &StorageKey) -> AdapterResult<bool> {
        self.handle.with("exists", |h| Ok(h.index.contains_key(key)))
    }

    fn delete(&self, key: &StorageKey) -> AdapterResult<bool> {
        self.handle.with("delete", |h| {
            if !h.index.contains_key(key) {
                return Ok(false);
            }
            let tombstone = h.append(key, None)?;
            if let Some(old) = h.index.remove(key) {
                h.dead_bytes += old.frame_len();
            }
            h.dead_bytes += tombstone.frame_len();
            debug!(%key, "tombstone appended");
            Ok(true)
        })
    }

    fn keys(&self, prefix: &str) -> AdapterResult<Vec<StorageKey>> {
        self.handle.with("keys", |h| {
            let mut keys: Vec<StorageKey> = h
                .index
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect();
            keys.sort();
            Ok(keys)
        })
    }

    fn close(&self) -> AdapterResult<()> {
        if let Some(handle) = self.handle.take()? {
            handle.file.sync_all()?;
            info!(path = %self.path.display(), "closed data file");
        }
        Ok(())
    }
}

impl std::fmt::Debug for FileAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAdapter")
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_LOCK_TIMEOUT;
    use std::sync::Arc;
    use std::thread;
    use stow_types::Identity;

    fn key(token: &str) -> StorageKey {
        StorageKey::object(&Identity::new(token).unwrap())
    }

    fn open(path: &Path) -> FileAdapter {
        FileAdapter::open(path, SyncMode::OsDefault, DEFAULT_LOCK_TIMEOUT).unwrap()
    }

    fn flip_byte(path: &Path, offset: u64) {
        let mut file = OpenOptions::new().read(true).write(true).open(path).unwrap();
        file.seek(SeekFrom::Start(offset)).unwrap();
        let mut buf = [0u8; 1];
        file.read_exact(&mut buf).unwrap();
        buf[0] ^= 0xFF;
        file.seek(SeekFrom::Start(offset)).unwrap();
        file.write_all(&buf).unwrap();
        file.sync_all().unwrap();
    }

    #[test]
    fn put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = open(&dir.path().join("data.stow"));
        adapter.put(&key("a"), b"alpha").unwrap();
        assert_eq!(adapter.get(&key("a")).unwrap(), Some(b"alpha".to_vec()));
        assert!(adapter.get(&key("b")).unwrap().is_none());
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.stow");
        {
            let adapter = open(&path);
            adapter.put(&key("a"), b"one").unwrap();
            adapter.put(&key("b"), b"two").unwrap();
            adapter.put(&key("a"), b"three").unwrap();
            adapter.delete(&key("b")).unwrap();
            adapter.close().unwrap();
        }

        let adapter = open(&path);
        assert_eq!(adapter.get(&key("a")).unwrap(), Some(b"three".to_vec()));
        assert!(adapter.get(&key("b")).unwrap().is_none());
        assert_eq!(adapter.len().unwrap(), 1);
        assert!(adapter.dead_bytes().unwrap() > 0);
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("data.stow");
        let adapter = open(&path);
        adapter.put(&key("a"), b"x").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn damaged_bytes_read_as_corrupt_not_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.stow");
        let adapter = open(&path);
        adapter.put(&key("a"), b"precious").unwrap();
        let len = fs::metadata(&path).unwrap().len();

        flip_byte(&path, len - 1);

        let err = adapter.get(&key("a")).unwrap_err();
        assert!(err.is_corruption(), "expected corruption, got {err:?}");
        assert!(adapter.exists(&key("a")).unwrap());
    }

    #[test]
    fn recovery_skips_crc_failures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.stow");
        {
            let adapter = open(&path);
            adapter.put(&key("first"), b"1").unwrap();
            adapter.put(&key("second"), b"2").unwrap();
            adapter.close().unwrap();
        }
        // First payload byte of the first record.
        flip_byte(&path, HEADER_SIZE as u64);

        let adapter = open(&path);
        assert!(adapter.get(&key("first")).unwrap().is_none());
        assert_eq!(adapter.get(&key("second")).unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn torn_tail_is_discarded_and_appends_continue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.stow");
        {
            let adapter = open(&path);
            adapter.put(&key("a"), b"kept").unwrap();
            adapter.close().unwrap();
        }
        let good_len = fs::metadata(&path).unwrap().len();
        {
            // Half a header, as if the process died mid-write.
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[0xAB, 0xCD, 0xEF]).unwrap();
        }

        let adapter = open(&path);
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);
        adapter.put(&key("b"), b"after").unwrap();
        adapter.close().unwrap();

        let adapter = open(&path);
        assert_eq!(adapter.get(&key("a")).unwrap(), Some(b"kept".to_vec()));
        assert_eq!(adapter.get(&key("b")).unwrap(), Some(b"after".to_vec()));
    }

    #[test]
    fn compact_drops_dead_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.stow");
        let adapter = open(&path);
        for n in 0..10u8 {
            adapter.put(&key("hot"), &[n; 32]).unwrap();
        }
        adapter.put(&key("cold"), b"c").unwrap();
        adapter.put(&key("gone"), b"g").unwrap();
        adapter.delete(&key("gone")).unwrap();

        let report = adapter.compact().unwrap();
        assert_eq!(report.records_kept, 2);
        assert!(report.bytes_after < report.bytes_before);
        assert_eq!(adapter.dead_bytes().unwrap(), 0);
        assert_eq!(adapter.get(&key("hot")).unwrap(), Some(vec![9u8; 32]));

        adapter.put(&key("new"), b"n").unwrap();
        adapter.close().unwrap();

        let adapter = open(&path);
        assert_eq!(adapter.len().unwrap(), 3);
        assert_eq!(adapter.get(&key("cold")).unwrap(), Some(b"c".to_vec()));
        assert!(adapter.get(&key("gone")).unwrap().is_none());
    }

    #[test]
    fn keys_lists_live_keys_only() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = open(&dir.path().join("data.stow"));
        adapter.put(&key("b"), b"1").unwrap();
        adapter.put(&key("a"), b"2").unwrap();
        adapter.put(&key("c"), b"3").unwrap();
        adapter.delete(&key("c")).unwrap();
        assert_eq!(adapter.keys("obj/").unwrap(), vec![key("a"), key("b")]);
    }

    #[test]
    fn delete_missing_key_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = open(&dir.path().join("data.stow"));
        let before = adapter.file_size().unwrap();
        assert!(!adapter.delete(&key("never")).unwrap());
        assert_eq!(adapter.file_size().unwrap(), before);
    }

    #[test]
    fn closed_adapter_is_unusable() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = open(&dir.path().join("data.stow"));
        adapter.close().unwrap();
        assert!(matches!(adapter.put(&key("a"), b"x"), Err(AdapterError::Closed)));
        // Closing twice is harmless.
        adapter.close().unwrap();
    }

    #[test]
    fn concurrent_access_is_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(open(&dir.path().join("data.stow")));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let adapter = Arc::clone(&adapter);
                thread::spawn(move || {
                    for i in 0..25 {
                        let k = key(&format!("t{t}-{i}"));
                        let v = format!("value-{t}-{i}").into_bytes();
                        adapter.put(&k, &v).unwrap();
                        assert_eq!(adapter.get(&k).unwrap(), Some(v));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert_eq!(adapter.len().unwrap(), 200);
    }
}
