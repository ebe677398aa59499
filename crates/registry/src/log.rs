//! Append-only record log.
//!
//! Fixed header (magic + version) followed by checksummed entries. Appends
//! are flushed with `sync_data` so an acknowledged write survives a crash;
//! a torn entry at the tail is dropped and truncated at the next open.

use crate::error::{RegistryError, Result};
use byteorder::{ByteOrder, LittleEndian};
use crc64fast::Digest;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const LOG_MAGIC: [u8; 4] = *b"BMRG";
pub const LOG_VERSION: u32 = 1;
pub const HEADER_SIZE: u64 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    pub sequence: u32,
    pub payload_len: u32,
    pub checksum: u64,
}

impl EntryHeader {
    pub const SIZE: usize = 4 + 4 + 8;

    pub fn read_from<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        reader.read_exact(&mut buf)?;
        Ok(Self {
            sequence: LittleEndian::read_u32(&buf[0..4]),
            payload_len: LittleEndian::read_u32(&buf[4..8]),
            checksum: LittleEndian::read_u64(&buf[8..16]),
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        LittleEndian::write_u32(&mut buf[0..4], self.sequence);
        LittleEndian::write_u32(&mut buf[4..8], self.payload_len);
        LittleEndian::write_u64(&mut buf[8..16], self.checksum);
        buf
    }
}

pub struct LogEntry {
    pub header: EntryHeader,
    pub payload: Vec<u8>,
}

fn entry_checksum(sequence: u32, payload: &[u8]) -> u64 {
    let mut digest = Digest::new();
    digest.write(&sequence.to_le_bytes());
    digest.write(&(payload.len() as u32).to_le_bytes());
    digest.write(payload);
    digest.sum64()
}

/// Read every intact entry, returning the entries and the byte offset of
/// the last intact position. Entries past a torn or corrupt tail are
/// discarded by the caller truncating to `valid_len`.
pub fn recover(path: impl AsRef<Path>) -> Result<(Vec<LogEntry>, u64)> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok((Vec::new(), 0));
    }

    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    let mut version = [0u8; 4];
    if reader.read_exact(&mut magic).is_err() {
        // Shorter than a header: treat as empty.
        return Ok((Vec::new(), 0));
    }
    if magic != LOG_MAGIC {
        return Err(RegistryError::InvalidMagic);
    }
    reader.read_exact(&mut version)?;
    if LittleEndian::read_u32(&version) != LOG_VERSION {
        return Err(RegistryError::InvalidFormat(format!(
            "unsupported log version {}",
            LittleEndian::read_u32(&version)
        )));
    }

    let mut entries = Vec::new();
    let mut valid_len = HEADER_SIZE;
    loop {
        let header = match EntryHeader::read_from(&mut reader) {
            Ok(h) => h,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        let mut payload = vec![0u8; header.payload_len as usize];
        if reader.read_exact(&mut payload).is_err() {
            // Torn tail: the entry header landed but the payload did not.
            tracing::warn!(offset = valid_len, "dropping torn log tail");
            break;
        }
        if entry_checksum(header.sequence, &payload) != header.checksum {
            tracing::warn!(offset = valid_len, "dropping corrupt log tail");
            break;
        }
        valid_len += (EntryHeader::SIZE + payload.len()) as u64;
        entries.push(LogEntry { header, payload });
    }
    Ok((entries, valid_len))
}

/// Appender positioned past the last intact entry.
pub struct LogWriter {
    file: File,
}

impl LogWriter {
    /// Open for appending, truncating anything past `valid_len` (from
    /// [`recover`]). Writes the header if the file is new.
    pub fn open(path: impl AsRef<Path>, valid_len: u64) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        if valid_len == 0 {
            file.set_len(0)?;
            file.write_all(&LOG_MAGIC)?;
            let mut version = [0u8; 4];
            LittleEndian::write_u32(&mut version, LOG_VERSION);
            file.write_all(&version)?;
            file.sync_data()?;
        } else {
            file.set_len(valid_len)?;
            file.seek(SeekFrom::End(0))?;
        }
        Ok(Self { file })
    }

    /// Append one entry and flush it to disk. All-or-nothing from the
    /// reader's perspective: a partial write fails the checksum on
    /// recovery and is truncated away.
    pub fn append(&mut self, sequence: u32, payload: &[u8]) -> Result<()> {
        let header = EntryHeader {
            sequence,
            payload_len: payload.len() as u32,
            checksum: entry_checksum(sequence, payload),
        };
        self.file.write_all(&header.to_bytes())?;
        self.file.write_all(payload)?;
        self.file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_recover() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.log");

        let mut writer = LogWriter::open(&path, 0).unwrap();
        writer.append(0, b"first").unwrap();
        writer.append(1, b"second").unwrap();
        drop(writer);

        let (entries, _) = recover(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].payload, b"first");
        assert_eq!(entries[1].header.sequence, 1);
    }

    #[test]
    fn torn_tail_is_dropped_and_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.log");

        let mut writer = LogWriter::open(&path, 0).unwrap();
        writer.append(0, b"intact").unwrap();
        drop(writer);

        // Simulate a crash mid-append.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0xAB; 7]).unwrap();
        drop(file);

        let (entries, valid_len) = recover(&path).unwrap();
        assert_eq!(entries.len(), 1);

        // Appending after recovery produces a clean log again.
        let mut writer = LogWriter::open(&path, valid_len).unwrap();
        writer.append(1, b"after-crash").unwrap();
        drop(writer);

        let (entries, _) = recover(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].payload, b"after-crash");
    }

    #[test]
    fn corrupt_payload_detected_by_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.log");

        let mut writer = LogWriter::open(&path, 0).unwrap();
        writer.append(0, b"payload-bytes").unwrap();
        drop(writer);

        // Flip a payload byte in place.
        let mut data = std::fs::read(&path).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        std::fs::write(&path, &data).unwrap();

        let (entries, valid_len) = recover(&path).unwrap();
        assert!(entries.is_empty());
        assert_eq!(valid_len, HEADER_SIZE);
    }

    #[test]
    fn wrong_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.log");
        std::fs::write(&path, b"XXXX\x01\x00\x00\x00").unwrap();
        assert!(matches!(recover(&path), Err(RegistryError::InvalidMagic)));
    }
}
