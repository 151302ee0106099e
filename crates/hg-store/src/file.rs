use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use tracing::{debug, warn};

use hg_types::FeedId;

use crate::config::SyncMode;
use crate::error::{StoreError, StoreResult};
use crate::feed::Feed;

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Internal mutable state for the segment writer.
struct SegmentWriter {
    writer: BufWriter<File>,
    /// Current end of the segment file.
    offset: u64,
}

/// File-backed feed: a single append-only segment file.
///
/// On-disk format, one entry per block:
/// ```text
/// [4 bytes: block length (little-endian u32)]
/// [4 bytes: CRC32 of block (little-endian u32)]
/// [N bytes: block]
/// ```
///
/// On open the file is scanned front-to-back to rebuild the block offset
/// table. A torn tail (short header, short payload or bad CRC on the last
/// entry) is truncated away; it is an append that never completed.
pub struct FileFeed {
    id: FeedId,
    path: PathBuf,
    writable: bool,
    sync_mode: SyncMode,
    /// Start offset of every block, by block index.
    offsets: RwLock<Vec<u64>>,
    writer: Mutex<SegmentWriter>,
}

impl FileFeed {
    /// Open (or create) the segment file at `path`.
    pub fn open(id: FeedId, path: &Path, writable: bool, sync_mode: SyncMode) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let offsets = Self::scan(path)?;
        let valid_len = match offsets.last() {
            Some(&last) => last + HEADER_SIZE as u64 + Self::entry_len(path, last)? as u64,
            None => 0,
        };
        if valid_len < file.metadata()?.len() {
            warn!(feed = %id.short_hex(), valid_len, "truncating torn segment tail");
            file.set_len(valid_len)?;
        }

        debug!(feed = %id.short_hex(), blocks = offsets.len(), writable, "opened file feed");
        Ok(Self {
            id,
            path: path.to_path_buf(),
            writable,
            sync_mode,
            offsets: RwLock::new(offsets),
            writer: Mutex::new(SegmentWriter {
                writer: BufWriter::new(file),
                offset: valid_len,
            }),
        })
    }

    /// Path to the segment file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scan the segment and return the offset of every intact entry.
    fn scan(path: &Path) -> StoreResult<Vec<u64>> {
        let mut file = BufReader::new(File::open(path)?);
        let file_len = file.get_ref().metadata()?.len();
        let mut offsets = Vec::new();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            file.seek(SeekFrom::Start(offset))?;

            let mut header = [0u8; HEADER_SIZE];
            match file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let (length, expected_crc) = Self::parse_header(&header);

            if length == 0 || offset + HEADER_SIZE as u64 + length as u64 > file_len {
                warn!(offset, length, file_len, "invalid segment entry length; stopping scan");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            match file.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!(offset, "truncated segment entry; stopping scan");
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            // Block indices must stay dense, so a bad entry ends the feed.
            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch; stopping scan"
                );
                break;
            }

            offsets.push(offset);
            offset += HEADER_SIZE as u64 + length as u64;
        }

        Ok(offsets)
    }

    fn parse_header(header: &[u8; HEADER_SIZE]) -> (u32, u32) {
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        (length, crc)
    }

    fn entry_len(path: &Path, offset: u64) -> StoreResult<u32> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; HEADER_SIZE];
        file.read_exact(&mut header)?;
        Ok(Self::parse_header(&header).0)
    }
}

impl Feed for FileFeed {
    fn id(&self) -> FeedId {
        self.id
    }

    fn len(&self) -> u64 {
        self.offsets.read().expect("lock poisoned").len() as u64
    }

    fn writable(&self) -> bool {
        self.writable
    }

    fn get(&self, index: u64) -> StoreResult<Vec<u8>> {
        let offset = {
            let offsets = self.offsets.read().expect("lock poisoned");
            *offsets
                .get(index as usize)
                .ok_or(StoreError::BlockOutOfRange {
                    feed: self.id,
                    index,
                    length: offsets.len() as u64,
                })?
        };

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; HEADER_SIZE];
        file.read_exact(&mut header)?;
        let (length, expected) = Self::parse_header(&header);
        if length == 0 {
            return Err(StoreError::InvalidEntryLength { offset, length });
        }

        let mut payload = vec![0u8; length as usize];
        file.read_exact(&mut payload)?;
        let actual = crc32fast::hash(&payload);
        if actual != expected {
            return Err(StoreError::CrcMismatch {
                offset,
                expected,
                actual,
            });
        }
        Ok(payload)
    }

    fn append(&self, blocks: &[Vec<u8>], expected_len: Option<u64>) -> StoreResult<u64> {
        if !self.writable {
            return Err(StoreError::ReadOnly(self.id));
        }

        let mut w = self.writer.lock().expect("lock poisoned");
        let mut offsets = self.offsets.write().expect("lock poisoned");
        let actual = offsets.len() as u64;
        if let Some(expected) = expected_len {
            if expected != actual {
                return Err(StoreError::Conflict {
                    feed: self.id,
                    expected,
                    actual,
                });
            }
        }

        let mut new_offsets = Vec::with_capacity(blocks.len());
        let mut offset = w.offset;
        for block in blocks {
            let length = u32::try_from(block.len())
                .map_err(|_| StoreError::Serialization(format!("block too large: {}", block.len())))?;
            w.writer.write_all(&length.to_le_bytes())?;
            w.writer.write_all(&crc32fast::hash(block).to_le_bytes())?;
            w.writer.write_all(block)?;
            new_offsets.push(offset);
            offset += HEADER_SIZE as u64 + block.len() as u64;
        }

        w.writer.flush()?;
        if matches!(self.sync_mode, SyncMode::EveryWrite) {
            w.writer.get_ref().sync_all()?;
        }

        // Offsets become visible only once the whole batch is on disk.
        w.offset = offset;
        offsets.extend(new_offsets);

        debug!(feed = %self.id.short_hex(), blocks = blocks.len(), len = offsets.len(), "segment append");
        Ok(offsets.len() as u64)
    }
}

impl std::fmt::Debug for FileFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileFeed")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("len", &self.len())
            .field("writable", &self.writable)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_id() -> FeedId {
        FeedId::from_bytes([42u8; 32])
    }

    fn open(path: &Path) -> FileFeed {
        FileFeed::open(feed_id(), path, true, SyncMode::default()).unwrap()
    }

    #[test]
    fn append_and_reopen_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.feed");
        let feed = open(&path);

        feed.append(&[b"one".to_vec(), b"two".to_vec()], Some(0)).unwrap();
        feed.append(&[b"three".to_vec()], None).unwrap();
        drop(feed);

        let feed = open(&path);
        assert_eq!(feed.len(), 3);
        assert_eq!(feed.get(0).unwrap(), b"one");
        assert_eq!(feed.get(2).unwrap(), b"three");
    }

    #[test]
    fn empty_segment() {
        let dir = tempfile::tempdir().unwrap();
        let feed = open(&dir.path().join("empty.feed"));
        assert!(feed.is_empty());
        assert!(feed.get(0).is_err());
    }

    #[test]
    fn crc_detects_corruption_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.feed");
        let feed = open(&path);
        feed.append(&[b"payload".to_vec()], None).unwrap();

        {
            let mut file = OpenOptions::new().write(true).read(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            file.write_all(&[b'X']).unwrap();
            file.sync_all().unwrap();
        }

        assert!(matches!(feed.get(0), Err(StoreError::CrcMismatch { .. })));
    }

    #[test]
    fn torn_tail_is_truncated_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail.feed");
        let feed = open(&path);
        feed.append(&[b"first".to_vec(), b"second".to_vec()], None).unwrap();
        drop(feed);

        let total = fs::metadata(&path).unwrap().len();
        {
            let file = OpenOptions::new().write(true).open(&path).unwrap();
            file.set_len(total - 2).unwrap();
        }

        let feed = open(&path);
        assert_eq!(feed.len(), 1);
        assert_eq!(feed.get(0).unwrap(), b"first");

        // Appends continue from the truncated position.
        feed.append(&[b"again".to_vec()], Some(1)).unwrap();
        drop(feed);
        let feed = open(&path);
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.get(1).unwrap(), b"again");
    }

    #[test]
    fn stale_append_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let feed = open(&dir.path().join("conflict.feed"));
        feed.append(&[b"a".to_vec()], Some(0)).unwrap();
        assert!(matches!(
            feed.append(&[b"b".to_vec()], Some(0)),
            Err(StoreError::Conflict { .. })
        ));
    }

    #[test]
    fn read_only_feed_rejects_append() {
        let dir = tempfile::tempdir().unwrap();
        let feed = FileFeed::open(feed_id(), &dir.path().join("ro.feed"), false, SyncMode::default())
            .unwrap();
        assert!(matches!(
            feed.append(&[b"a".to_vec()], None),
            Err(StoreError::ReadOnly(_))
        ));
    }

    #[test]
    fn sync_every_write_mode() {
        let dir = tempfile::tempdir().unwrap();
        let feed = FileFeed::open(
            feed_id(),
            &dir.path().join("sync.feed"),
            true,
            SyncMode::EveryWrite,
        )
        .unwrap();
        feed.append(&[b"durable".to_vec()], None).unwrap();
        assert_eq!(feed.get(0).unwrap(), b"durable");
    }
}
