//! The append-only hash registry.
//!
//! A single mutex guards the mutable core, which gives duplicate
//! submissions at-most-one-write-wins semantics and keeps sequence numbers
//! strictly monotonic with no gaps. Records carry no authority or device
//! identity: compromising an authority must not let an attacker enumerate
//! the images it validated. Authority names are interned for audit logging
//! and the id is discarded before the record is built.

use crate::authority::AuthorityTable;
use crate::error::{RegistryError, Result};
use crate::log::{self, LogWriter};
use crate::record::{ImageHash, ImageRecord, NewRecord};
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

pub const RECORDS_FILE: &str = "records.log";
pub const AUTHORITIES_FILE: &str = "authorities.log";

/// Public verification view. Omits authority and device identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub verified: bool,
    pub modification_level: u8,
    pub timestamp: u32,
    pub provenance_chain: Vec<ImageRecord>,
}

struct Inner {
    writer: LogWriter,
    authorities: AuthorityTable,
    index: FxHashMap<ImageHash, ImageRecord>,
    next_seq: u32,
}

pub struct HashRegistry {
    inner: Mutex<Inner>,
}

fn unix_time() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

impl HashRegistry {
    /// Open (or create) a registry directory, replaying the record log and
    /// truncating any torn tail.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let records_path = dir.join(RECORDS_FILE);

        let (entries, valid_len) = log::recover(&records_path)?;
        let mut index = FxHashMap::default();
        let mut next_seq = 0u32;
        for entry in &entries {
            let record = ImageRecord::from_bytes(&entry.payload)?;
            next_seq = next_seq.max(record.sequence_number + 1);
            index.insert(record.image_hash, record);
        }
        tracing::info!(records = index.len(), "registry opened");

        Ok(Self {
            inner: Mutex::new(Inner {
                writer: LogWriter::open(&records_path, valid_len)?,
                authorities: AuthorityTable::open(dir.join(AUTHORITIES_FILE))?,
                index,
                next_seq,
            }),
        })
    }

    /// Record a validated hash. Idempotent: a duplicate hash returns the
    /// existing sequence number without writing a second entry.
    pub fn append(&self, new: NewRecord, authority_name: &str) -> Result<u32> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(existing) = inner.index.get(&new.image_hash) {
            return Ok(existing.sequence_number);
        }

        if let Some(parent_hash) = &new.parent_image_hash {
            let parent = inner
                .index
                .get(parent_hash)
                .ok_or(RegistryError::UnknownParent)?;
            if parent.modification_level > new.modification_level {
                return Err(RegistryError::MonotonicityViolation {
                    parent: parent.modification_level,
                    child: new.modification_level,
                });
            }
        }

        // Resolved for the audit trail only; the id never reaches the
        // record.
        let authority_id = inner.authorities.intern(authority_name)?;
        tracing::debug!(authority_id, "append authorized");

        let record = ImageRecord {
            image_hash: new.image_hash,
            submission_type: new.submission_type,
            modification_level: new.modification_level,
            parent_image_hash: new.parent_image_hash,
            timestamp: unix_time(),
            sequence_number: inner.next_seq,
        };
        inner.writer.append(record.sequence_number, &record.to_bytes())?;
        let seq = record.sequence_number;
        inner.index.insert(record.image_hash, record);
        inner.next_seq += 1;
        Ok(seq)
    }

    pub fn lookup(&self, image_hash: &ImageHash) -> Result<ImageRecord> {
        self.inner
            .lock()
            .unwrap()
            .index
            .get(image_hash)
            .cloned()
            .ok_or(RegistryError::NotFound)
    }

    /// Follow parent links from `image_hash` back to the root capture and
    /// return the chain root-first. Appends cannot create a cycle, but a
    /// log recovered from disk might, so traversal tracks visited hashes.
    pub fn trace_provenance(&self, image_hash: &ImageHash) -> Result<Vec<ImageRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut chain = Vec::new();
        let mut visited = FxHashSet::default();
        let mut cursor = Some(*image_hash);

        while let Some(hash) = cursor {
            if !visited.insert(hash) {
                tracing::error!("provenance cycle detected");
                return Err(RegistryError::CycleDetected);
            }
            let record = inner.index.get(&hash).ok_or(RegistryError::NotFound)?;
            cursor = record.parent_image_hash;
            chain.push(record.clone());
        }
        chain.reverse();
        Ok(chain)
    }

    /// The query exposed to verifiers. An unknown hash is simply
    /// unverified, not an error.
    pub fn verify(&self, image_hash: &ImageHash) -> Result<Verification> {
        match self.trace_provenance(image_hash) {
            Ok(chain) => {
                let head = chain.last().expect("non-empty chain");
                Ok(Verification {
                    verified: true,
                    modification_level: head.modification_level,
                    timestamp: head.timestamp,
                    provenance_chain: chain,
                })
            }
            Err(RegistryError::NotFound) => Ok(Verification {
                verified: false,
                modification_level: 0,
                timestamp: 0,
                provenance_chain: Vec::new(),
            }),
            Err(e) => Err(e),
        }
    }

    pub fn record_count(&self) -> usize {
        self.inner.lock().unwrap().index.len()
    }

    pub fn authority_count(&self) -> usize {
        self.inner.lock().unwrap().authorities.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{hash, new_record};
    use crate::record::SubmissionType;
    use std::sync::Arc;

    #[test]
    fn append_assigns_monotonic_sequences() {
        let dir = tempfile::tempdir().unwrap();
        let registry = HashRegistry::open(dir.path()).unwrap();
        for i in 0..5u8 {
            let seq = registry.append(new_record(i, 0, None), "MFG-01").unwrap();
            assert_eq!(seq, i as u32);
        }
        assert_eq!(registry.record_count(), 5);
    }

    #[test]
    fn duplicate_append_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = HashRegistry::open(dir.path()).unwrap();

        let first = registry.append(new_record(1, 0, None), "MFG-01").unwrap();
        let second = registry.append(new_record(1, 0, None), "OTHER").unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.record_count(), 1);

        // The duplicate did not consume a sequence number.
        let next = registry.append(new_record(2, 0, None), "MFG-01").unwrap();
        assert_eq!(next, first + 1);
    }

    #[test]
    fn provenance_chain_is_root_first() {
        let dir = tempfile::tempdir().unwrap();
        let registry = HashRegistry::open(dir.path()).unwrap();

        registry.append(new_record(1, 0, None), "MFG-01").unwrap();
        registry
            .append(new_record(2, 1, Some(hash(1))), "SW-AUTH")
            .unwrap();
        registry
            .append(new_record(3, 2, Some(hash(2))), "SW-AUTH")
            .unwrap();

        let chain = registry.trace_provenance(&hash(3)).unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].image_hash, hash(1));
        assert_eq!(chain[0].modification_level, 0);
        assert_eq!(chain[1].modification_level, 1);
        assert_eq!(chain[2].modification_level, 2);
        assert!(chain[0].parent_image_hash.is_none());
    }

    #[test]
    fn monotonicity_is_enforced_at_append() {
        let dir = tempfile::tempdir().unwrap();
        let registry = HashRegistry::open(dir.path()).unwrap();

        registry.append(new_record(1, 2, None), "MFG-01").unwrap();
        let err = registry
            .append(new_record(2, 1, Some(hash(1))), "MFG-01")
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::MonotonicityViolation { parent: 2, child: 1 }
        ));

        // Equal levels are allowed.
        assert!(registry
            .append(new_record(3, 2, Some(hash(1))), "MFG-01")
            .is_ok());
    }

    #[test]
    fn unknown_parent_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = HashRegistry::open(dir.path()).unwrap();
        let err = registry
            .append(new_record(1, 1, Some(hash(99))), "MFG-01")
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownParent));
    }

    #[test]
    fn registry_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let registry = HashRegistry::open(dir.path()).unwrap();
            registry.append(new_record(1, 0, None), "MFG-01").unwrap();
            registry
                .append(new_record(2, 1, Some(hash(1))), "SW-AUTH")
                .unwrap();
        }
        let registry = HashRegistry::open(dir.path()).unwrap();
        assert_eq!(registry.record_count(), 2);
        assert_eq!(registry.authority_count(), 2);
        assert_eq!(registry.lookup(&hash(2)).unwrap().sequence_number, 1);

        // Sequence numbering continues where it left off.
        let seq = registry.append(new_record(3, 1, None), "MFG-01").unwrap();
        assert_eq!(seq, 2);
    }

    #[test]
    fn concurrent_duplicate_appends_agree() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(HashRegistry::open(dir.path()).unwrap());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                registry.append(new_record(7, 0, None), "MFG-01").unwrap()
            }));
        }
        let seqs: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(seqs.iter().all(|&s| s == seqs[0]));
        assert_eq!(registry.record_count(), 1);
    }

    #[test]
    fn cycle_in_recovered_log_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let records_path = dir.path().join(RECORDS_FILE);

        // Hand-craft a log whose records reference each other; the public
        // append path cannot produce this.
        let mut writer = LogWriter::open(&records_path, 0).unwrap();
        let a = ImageRecord {
            image_hash: hash(1),
            submission_type: SubmissionType::Camera,
            modification_level: 0,
            parent_image_hash: Some(hash(2)),
            timestamp: 0,
            sequence_number: 0,
        };
        let b = ImageRecord {
            image_hash: hash(2),
            submission_type: SubmissionType::Camera,
            modification_level: 0,
            parent_image_hash: Some(hash(1)),
            timestamp: 0,
            sequence_number: 1,
        };
        writer.append(0, &a.to_bytes()).unwrap();
        writer.append(1, &b.to_bytes()).unwrap();
        drop(writer);

        let registry = HashRegistry::open(dir.path()).unwrap();
        assert!(matches!(
            registry.trace_provenance(&hash(1)),
            Err(RegistryError::CycleDetected)
        ));
    }

    #[test]
    fn verify_reports_unknown_hash_as_unverified() {
        let dir = tempfile::tempdir().unwrap();
        let registry = HashRegistry::open(dir.path()).unwrap();
        let v = registry.verify(&hash(5)).unwrap();
        assert!(!v.verified);
        assert!(v.provenance_chain.is_empty());

        registry.append(new_record(5, 1, None), "MFG-01").unwrap();
        let v = registry.verify(&hash(5)).unwrap();
        assert!(v.verified);
        assert_eq!(v.modification_level, 1);
        assert_eq!(v.provenance_chain.len(), 1);
    }
}
