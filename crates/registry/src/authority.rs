//! Authority name interning.
//!
//! Deduplicates the repeated variable-length authority name into a stable
//! `u16` id. The mapping lives for the life of the registry and ids are
//! never reused; exhaustion of the id space is a configuration error, not
//! a wraparound. The ids exist for audit logging only: they are resolved
//! during append and never written into an image record.

use crate::error::{RegistryError, Result};
use byteorder::{ByteOrder, LittleEndian};
use rustc_hash::FxHashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const AUTHORITY_MAGIC: [u8; 4] = *b"BMAU";

/// Highest id count the u16 space admits.
const MAX_AUTHORITIES: usize = u16::MAX as usize + 1;

pub struct AuthorityTable {
    by_name: FxHashMap<String, u16>,
    by_id: Vec<String>,
    file: File,
}

impl AuthorityTable {
    /// Load the table, creating the file if absent. Entries are
    /// `id u16 | len u16 | name bytes`, appended in id order. A torn entry
    /// at the tail (crash mid-intern) is dropped and truncated, same as
    /// the record log; the name is re-interned on its next sighting.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let mut by_name = FxHashMap::default();
        let mut by_id: Vec<String> = Vec::new();
        let mut valid_len = AUTHORITY_MAGIC.len() as u64;
        let mut fresh = true;

        if path.exists() {
            let file_len = std::fs::metadata(path)?.len();
            let mut reader = BufReader::new(File::open(path)?);
            let mut magic = [0u8; 4];
            match reader.read_exact(&mut magic) {
                Ok(()) => {
                    if magic != AUTHORITY_MAGIC {
                        return Err(RegistryError::InvalidMagic);
                    }
                    fresh = false;
                    loop {
                        let mut head = [0u8; 4];
                        match reader.read_exact(&mut head) {
                            Ok(()) => {}
                            // Clean end of file, or a torn entry head.
                            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                            Err(e) => return Err(e.into()),
                        }
                        let id = LittleEndian::read_u16(&head[0..2]);
                        let len = LittleEndian::read_u16(&head[2..4]) as usize;
                        let mut name = vec![0u8; len];
                        if reader.read_exact(&mut name).is_err() {
                            // The head landed but the name did not.
                            break;
                        }
                        let name = String::from_utf8(name).map_err(|_| {
                            RegistryError::InvalidFormat("authority name not utf-8".to_string())
                        })?;
                        if id as usize != by_id.len() {
                            return Err(RegistryError::InvalidFormat(format!(
                                "authority id {id} out of order"
                            )));
                        }
                        valid_len += (4 + name.len()) as u64;
                        by_name.insert(name.clone(), id);
                        by_id.push(name);
                    }
                    if valid_len < file_len {
                        tracing::warn!(offset = valid_len, "dropping torn authority tail");
                    }
                }
                // Shorter than the magic: rewrite it as a fresh file.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
                Err(e) => return Err(e.into()),
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        if fresh {
            file.set_len(0)?;
            file.write_all(&AUTHORITY_MAGIC)?;
            file.sync_data()?;
        } else {
            file.set_len(valid_len)?;
            file.seek(SeekFrom::End(0))?;
        }

        Ok(Self { by_name, by_id, file })
    }

    /// Return the stable id for `name`, assigning and persisting one on
    /// first sighting.
    pub fn intern(&mut self, name: &str) -> Result<u16> {
        if let Some(&id) = self.by_name.get(name) {
            return Ok(id);
        }
        if self.by_id.len() >= MAX_AUTHORITIES {
            return Err(RegistryError::AuthoritySpaceExhausted);
        }
        let id = self.by_id.len() as u16;

        let mut head = [0u8; 4];
        LittleEndian::write_u16(&mut head[0..2], id);
        LittleEndian::write_u16(&mut head[2..4], name.len() as u16);
        self.file.write_all(&head)?;
        self.file.write_all(name.as_bytes())?;
        self.file.sync_data()?;

        self.by_name.insert(name.to_string(), id);
        self.by_id.push(name.to_string());
        Ok(id)
    }

    pub fn name(&self, id: u16) -> Option<&str> {
        self.by_id.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authorities.log");
        let mut table = AuthorityTable::open(&path).unwrap();

        let a = table.intern("MFG-01").unwrap();
        let b = table.intern("SW-AUTH").unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(table.intern("MFG-01").unwrap(), a);
        assert_eq!(table.name(a), Some("MFG-01"));
    }

    #[test]
    fn table_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authorities.log");
        {
            let mut table = AuthorityTable::open(&path).unwrap();
            table.intern("MFG-01").unwrap();
            table.intern("SW-AUTH").unwrap();
        }
        let mut table = AuthorityTable::open(&path).unwrap();
        assert_eq!(table.len(), 2);
        // Same name, same id, across the reopen.
        assert_eq!(table.intern("SW-AUTH").unwrap(), 1);
        assert_eq!(table.intern("NEW").unwrap(), 2);
    }
}
