//! Master key tables and the device registry.
//!
//! The full `table_id -> master_key` map lives exclusively inside the MA
//! process. The store is an explicitly owned value injected into the
//! validator at construction, so tests run against a small in-memory
//! table set.

use crate::error::{CoreError, Result};
use crate::types::{DeviceRegistration, Fingerprint, TABLES_PER_DEVICE};
use rand::rngs::OsRng;
use rand::RngCore;
use rustc_hash::FxHashMap;
use std::sync::RwLock;

pub struct KeyTableStore {
    /// Index is the table id. Immutable once generated.
    tables: Vec<[u8; 32]>,
    /// Recorded table assignments, written once per serial.
    assignments: RwLock<FxHashMap<String, [u16; TABLES_PER_DEVICE]>>,
    /// Provisioned devices. Read-mostly after provisioning.
    devices: RwLock<FxHashMap<String, DeviceRegistration>>,
}

impl KeyTableStore {
    pub fn new(tables: Vec<[u8; 32]>) -> Self {
        Self {
            tables,
            assignments: RwLock::new(FxHashMap::default()),
            devices: RwLock::new(FxHashMap::default()),
        }
    }

    /// Generate `count` fresh master keys from the OS RNG.
    pub fn generate(count: u16) -> Self {
        let mut tables = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut key = [0u8; 32];
            OsRng.fill_bytes(&mut key);
            tables.push(key);
        }
        Self::new(tables)
    }

    pub fn table_count(&self) -> u16 {
        self.tables.len() as u16
    }

    pub fn get_master_key(&self, table_id: u16) -> Result<[u8; 32]> {
        self.tables
            .get(table_id as usize)
            .copied()
            .ok_or(CoreError::UnknownTable(table_id))
    }

    /// Draw 3 distinct table ids uniformly without replacement. Idempotent
    /// per serial: repeat calls return the recorded draw, never a fresh one.
    pub fn assign_tables(&self, device_serial: &str) -> Result<[u16; TABLES_PER_DEVICE]> {
        if let Some(existing) = self.assignments.read().unwrap().get(device_serial) {
            return Ok(*existing);
        }

        let mut assignments = self.assignments.write().unwrap();
        // Re-check under the write lock; another provisioner may have won.
        if let Some(existing) = assignments.get(device_serial) {
            return Ok(*existing);
        }

        if self.tables.len() < TABLES_PER_DEVICE {
            return Err(CoreError::InvalidAssignment);
        }
        let sampled = rand::seq::index::sample(&mut OsRng, self.tables.len(), TABLES_PER_DEVICE);
        let mut assignment = [0u16; TABLES_PER_DEVICE];
        for (slot, idx) in assignment.iter_mut().zip(sampled.iter()) {
            *slot = idx as u16;
        }
        assignments.insert(device_serial.to_string(), assignment);
        Ok(assignment)
    }

    /// Exactly-once per device lifetime. The registration's table
    /// assignment must match the recorded draw for the serial (or records
    /// it, for devices assigned out of band).
    pub fn register_device(&self, registration: DeviceRegistration) -> Result<()> {
        let serial = registration.device_serial.clone();

        {
            let mut seen = std::collections::HashSet::new();
            for id in registration.table_assignment {
                if id as usize >= self.tables.len() {
                    return Err(CoreError::UnknownTable(id));
                }
                if !seen.insert(id) {
                    return Err(CoreError::InvalidAssignment);
                }
            }
        }

        let mut devices = self.devices.write().unwrap();
        if devices.contains_key(&serial) {
            return Err(CoreError::AlreadyRegistered(serial));
        }
        self.assignments
            .write()
            .unwrap()
            .entry(serial.clone())
            .or_insert(registration.table_assignment);
        devices.insert(serial, registration);
        Ok(())
    }

    pub fn lookup_device(&self, device_serial: &str) -> Result<DeviceRegistration> {
        self.devices
            .read()
            .unwrap()
            .get(device_serial)
            .cloned()
            .ok_or_else(|| CoreError::UnknownDevice(device_serial.to_string()))
    }

    /// The only post-provisioning mutation a registration admits.
    pub fn revoke_device(&self, device_serial: &str) -> Result<()> {
        let mut devices = self.devices.write().unwrap();
        let reg = devices
            .get_mut(device_serial)
            .ok_or_else(|| CoreError::UnknownDevice(device_serial.to_string()))?;
        reg.revoked = true;
        Ok(())
    }

    pub fn registered_fingerprint(&self, device_serial: &str) -> Result<Fingerprint> {
        Ok(self.lookup_device(device_serial)?.fingerprint_hash)
    }
}

/// Key-table file magic (`BMKT`). The codec is pure bytes; reading and
/// writing the file is the caller's concern.
pub const KEYFILE_MAGIC: [u8; 4] = *b"BMKT";

/// `magic 4 | count u16 LE | count * 32 key bytes`
pub fn encode_tables(tables: &[[u8; 32]]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(6 + tables.len() * 32);
    buf.extend_from_slice(&KEYFILE_MAGIC);
    buf.extend_from_slice(&(tables.len() as u16).to_le_bytes());
    for key in tables {
        buf.extend_from_slice(key);
    }
    buf
}

pub fn decode_tables(data: &[u8]) -> Result<Vec<[u8; 32]>> {
    if data.len() < 6 || data[0..4] != KEYFILE_MAGIC {
        return Err(CoreError::MalformedKeyFile("bad magic"));
    }
    let count = u16::from_le_bytes([data[4], data[5]]) as usize;
    if data.len() != 6 + count * 32 {
        return Err(CoreError::MalformedKeyFile("length does not match count"));
    }
    let mut tables = Vec::with_capacity(count);
    for i in 0..count {
        let start = 6 + i * 32;
        let mut key = [0u8; 32];
        key.copy_from_slice(&data[start..start + 32]);
        tables.push(key);
    }
    Ok(tables)
}
