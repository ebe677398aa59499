//! Authentication certificates.
//!
//! Self-contained signed blobs carrying routing and cryptographic material
//! for a camera or software subject. The format is a fixed little-endian
//! layout with a TLV extension list:
//!
//! ```text
//! magic      4  b"BMRC"
//! version    1
//! kind       1  (1 = camera, 2 = software)
//! subject_id    len u16 + utf8
//! issuer_id     len u16 + utf8
//! not_before 4  unix seconds
//! not_after  4  unix seconds
//! ext_count  2
//!   per ext: tag u16, len u16, payload
//! signature  64 (Ed25519 over everything above)
//! ```
//!
//! Parsing is fail-closed: any attacker-controlled garbage yields a typed
//! [`CoreError::MalformedCertificate`], never a panic. No field may be
//! trusted before [`ParsedCertificate::verify_signature`] succeeds.

use crate::error::{CoreError, Result};
use crate::token::EncryptedToken;
use crate::types::SubjectKind;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rustc_hash::FxHashMap;
use std::io::{Cursor, Read, Write};

pub const CERT_MAGIC: [u8; 4] = *b"BMRC";
pub const CERT_VERSION: u8 = 1;
pub const SIGNATURE_LEN: usize = 64;

const EXT_ENCRYPTED_FINGERPRINT: u16 = 1;
const EXT_KEY_REFERENCE: u16 = 2;
const EXT_MANUFACTURER_ID: u16 = 3;
const EXT_ROUTING_ENDPOINT: u16 = 4;
const EXT_APP_VERSION: u16 = 5;
const EXT_ALLOWED_VERSIONS: u16 = 6;

/// Known certificate extensions, with a fallback for tags this build does
/// not understand (kept so signature verification still covers them).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertExtension {
    /// A provisioning-time encrypted fingerprint in token wire format.
    EncryptedFingerprint(EncryptedToken),
    /// The table/index pair the subject intends to use.
    KeyReference { table_id: u16, key_index: u16 },
    ManufacturerId(String),
    RoutingEndpoint(String),
    /// Software subjects only: the exact application version.
    AppVersion(String),
    /// Software subjects only: versions the issuer accepts.
    AllowedVersions(Vec<String>),
    Unknown { tag: u16, payload: Vec<u8> },
}

/// Decoded certificate. Fields are untrusted until `verify_signature`
/// returns `Ok`.
#[derive(Debug, Clone)]
pub struct ParsedCertificate {
    pub kind: SubjectKind,
    pub subject_id: String,
    pub issuer_id: String,
    pub not_before: u32,
    pub not_after: u32,
    pub extensions: Vec<CertExtension>,
    signature: [u8; SIGNATURE_LEN],
    preimage: Vec<u8>,
}

fn truncated(_: std::io::Error) -> CoreError {
    CoreError::MalformedCertificate("truncated")
}

fn read_exact_vec(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>> {
    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if len > remaining {
        return Err(CoreError::MalformedCertificate("length exceeds input"));
    }
    let mut buf = vec![0u8; len];
    cursor
        .read_exact(&mut buf)
        .map_err(truncated)
        .map(|_| buf)
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let len = cursor.read_u16::<LittleEndian>().map_err(truncated)? as usize;
    let bytes = read_exact_vec(cursor, len)?;
    String::from_utf8(bytes).map_err(|_| CoreError::MalformedCertificate("invalid utf-8"))
}

fn parse_extension(tag: u16, payload: Vec<u8>) -> Result<CertExtension> {
    match tag {
        EXT_ENCRYPTED_FINGERPRINT => {
            let token = EncryptedToken::from_bytes(&payload)
                .map_err(|_| CoreError::MalformedCertificate("bad fingerprint extension"))?;
            Ok(CertExtension::EncryptedFingerprint(token))
        }
        EXT_KEY_REFERENCE => {
            if payload.len() != 4 {
                return Err(CoreError::MalformedCertificate("bad key reference"));
            }
            let table_id = u16::from_le_bytes([payload[0], payload[1]]);
            let key_index = u16::from_le_bytes([payload[2], payload[3]]);
            Ok(CertExtension::KeyReference { table_id, key_index })
        }
        EXT_MANUFACTURER_ID | EXT_ROUTING_ENDPOINT | EXT_APP_VERSION => {
            let s = String::from_utf8(payload)
                .map_err(|_| CoreError::MalformedCertificate("invalid utf-8"))?;
            Ok(match tag {
                EXT_MANUFACTURER_ID => CertExtension::ManufacturerId(s),
                EXT_ROUTING_ENDPOINT => CertExtension::RoutingEndpoint(s),
                _ => CertExtension::AppVersion(s),
            })
        }
        EXT_ALLOWED_VERSIONS => {
            let slice: &[u8] = &payload;
            let mut cursor = Cursor::new(slice);
            let count = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
            let mut versions = Vec::with_capacity(count.min(64) as usize);
            for _ in 0..count {
                versions.push(read_string(&mut cursor)?);
            }
            if cursor.position() as usize != payload.len() {
                return Err(CoreError::MalformedCertificate("trailing allow-list bytes"));
            }
            Ok(CertExtension::AllowedVersions(versions))
        }
        _ => Ok(CertExtension::Unknown { tag, payload }),
    }
}

impl ParsedCertificate {
    /// Decode `data` without trusting any of it.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic).map_err(truncated)?;
        if magic != CERT_MAGIC {
            return Err(CoreError::MalformedCertificate("bad magic"));
        }
        let version = cursor.read_u8().map_err(truncated)?;
        if version != CERT_VERSION {
            return Err(CoreError::MalformedCertificate("unsupported version"));
        }
        let kind = SubjectKind::from_u8(cursor.read_u8().map_err(truncated)?)
            .ok_or(CoreError::MalformedCertificate("unknown subject kind"))?;

        let subject_id = read_string(&mut cursor)?;
        let issuer_id = read_string(&mut cursor)?;
        let not_before = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let not_after = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        if not_after < not_before {
            return Err(CoreError::MalformedCertificate("inverted validity window"));
        }

        let ext_count = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
        let mut extensions = Vec::with_capacity(ext_count.min(64) as usize);
        for _ in 0..ext_count {
            let tag = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
            let len = cursor.read_u16::<LittleEndian>().map_err(truncated)? as usize;
            let payload = read_exact_vec(&mut cursor, len)?;
            extensions.push(parse_extension(tag, payload)?);
        }

        let preimage_len = cursor.position() as usize;
        let mut signature = [0u8; SIGNATURE_LEN];
        cursor.read_exact(&mut signature).map_err(truncated)?;
        if cursor.position() as usize != data.len() {
            return Err(CoreError::MalformedCertificate("trailing bytes"));
        }

        Ok(Self {
            kind,
            subject_id,
            issuer_id,
            not_before,
            not_after,
            extensions,
            signature,
            preimage: data[..preimage_len].to_vec(),
        })
    }

    /// Mandatory before any embedded field is trusted. An issuer that is
    /// not a configured root, or a signature that does not verify against
    /// that root, is `UntrustedIssuer`.
    pub fn verify_signature(&self, roots: &TrustedRoots) -> Result<()> {
        let key = roots
            .get(&self.issuer_id)
            .ok_or(CoreError::UntrustedIssuer)?;
        let sig = Signature::from_bytes(&self.signature);
        key.verify(&self.preimage, &sig)
            .map_err(|_| CoreError::UntrustedIssuer)
    }

    /// Validity-window check, distinct from trust and format failures.
    pub fn check_validity(&self, now: u32) -> Result<()> {
        if now < self.not_before || now > self.not_after {
            return Err(CoreError::Expired);
        }
        Ok(())
    }

    pub fn encrypted_fingerprint(&self) -> Option<&EncryptedToken> {
        self.extensions.iter().find_map(|e| match e {
            CertExtension::EncryptedFingerprint(t) => Some(t),
            _ => None,
        })
    }

    pub fn key_reference(&self) -> Option<(u16, u16)> {
        self.extensions.iter().find_map(|e| match e {
            CertExtension::KeyReference { table_id, key_index } => {
                Some((*table_id, *key_index))
            }
            _ => None,
        })
    }

    pub fn manufacturer_id(&self) -> Option<&str> {
        self.extensions.iter().find_map(|e| match e {
            CertExtension::ManufacturerId(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn routing_endpoint(&self) -> Option<&str> {
        self.extensions.iter().find_map(|e| match e {
            CertExtension::RoutingEndpoint(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn app_version(&self) -> Option<&str> {
        self.extensions.iter().find_map(|e| match e {
            CertExtension::AppVersion(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn allowed_versions(&self) -> Option<&[String]> {
        self.extensions.iter().find_map(|e| match e {
            CertExtension::AllowedVersions(v) => Some(v.as_slice()),
            _ => None,
        })
    }
}

/// Issuer roots the validator is configured to accept.
#[derive(Debug, Default, Clone)]
pub struct TrustedRoots {
    roots: FxHashMap<String, VerifyingKey>,
}

impl TrustedRoots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issuer_id: impl Into<String>, key: VerifyingKey) {
        self.roots.insert(issuer_id.into(), key);
    }

    pub fn add_bytes(&mut self, issuer_id: impl Into<String>, key: &[u8; 32]) -> Result<()> {
        let key = VerifyingKey::from_bytes(key)
            .map_err(|_| CoreError::MalformedCertificate("invalid root public key"))?;
        self.roots.insert(issuer_id.into(), key);
        Ok(())
    }

    pub fn get(&self, issuer_id: &str) -> Option<&VerifyingKey> {
        self.roots.get(issuer_id)
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// Trusted-roots file magic (`BMRT`). Pure byte codec; file I/O is the
/// caller's concern.
pub const ROOTS_MAGIC: [u8; 4] = *b"BMRT";

/// `magic 4 | count u16 LE | count * (len u16 LE | issuer utf8 | key 32)`
pub fn encode_roots(roots: &[(String, [u8; 32])]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&ROOTS_MAGIC);
    buf.extend_from_slice(&(roots.len() as u16).to_le_bytes());
    for (issuer, key) in roots {
        buf.extend_from_slice(&(issuer.len() as u16).to_le_bytes());
        buf.extend_from_slice(issuer.as_bytes());
        buf.extend_from_slice(key);
    }
    buf
}

pub fn decode_roots(data: &[u8]) -> Result<TrustedRoots> {
    if data.len() < 6 || data[0..4] != ROOTS_MAGIC {
        return Err(CoreError::MalformedKeyFile("bad magic"));
    }
    let count = u16::from_le_bytes([data[4], data[5]]);
    let mut cursor = Cursor::new(&data[6..]);
    let mut roots = TrustedRoots::new();
    for _ in 0..count {
        let issuer = read_string(&mut cursor)
            .map_err(|_| CoreError::MalformedKeyFile("truncated issuer"))?;
        let mut key = [0u8; 32];
        cursor
            .read_exact(&mut key)
            .map_err(|_| CoreError::MalformedKeyFile("truncated key"))?;
        roots
            .add_bytes(issuer, &key)
            .map_err(|_| CoreError::MalformedKeyFile("invalid root public key"))?;
    }
    if cursor.position() as usize != data.len() - 6 {
        return Err(CoreError::MalformedKeyFile("trailing bytes"));
    }
    Ok(roots)
}

/// Builds and signs certificates. Used by provisioning tooling and tests;
/// the parser above never assumes its input came from here.
pub struct CertificateBuilder {
    kind: SubjectKind,
    subject_id: String,
    issuer_id: String,
    not_before: u32,
    not_after: u32,
    extensions: Vec<CertExtension>,
}

impl CertificateBuilder {
    pub fn new(kind: SubjectKind, subject_id: impl Into<String>, issuer_id: impl Into<String>) -> Self {
        Self {
            kind,
            subject_id: subject_id.into(),
            issuer_id: issuer_id.into(),
            not_before: 0,
            not_after: u32::MAX,
            extensions: Vec::new(),
        }
    }

    pub fn validity(mut self, not_before: u32, not_after: u32) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }

    pub fn extension(mut self, ext: CertExtension) -> Self {
        self.extensions.push(ext);
        self
    }

    pub fn sign(self, issuer_key: &SigningKey) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&CERT_MAGIC);
        buf.push(CERT_VERSION);
        buf.push(self.kind.as_u8());
        write_string(&mut buf, &self.subject_id);
        write_string(&mut buf, &self.issuer_id);
        buf.write_u32::<LittleEndian>(self.not_before).unwrap();
        buf.write_u32::<LittleEndian>(self.not_after).unwrap();
        buf.write_u16::<LittleEndian>(self.extensions.len() as u16)
            .unwrap();
        for ext in &self.extensions {
            let (tag, payload) = encode_extension(ext);
            buf.write_u16::<LittleEndian>(tag).unwrap();
            buf.write_u16::<LittleEndian>(payload.len() as u16).unwrap();
            buf.extend_from_slice(&payload);
        }
        let sig = issuer_key.sign(&buf);
        buf.extend_from_slice(&sig.to_bytes());
        buf
    }
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.write_u16::<LittleEndian>(s.len() as u16).unwrap();
    buf.write_all(s.as_bytes()).unwrap();
}

fn encode_extension(ext: &CertExtension) -> (u16, Vec<u8>) {
    match ext {
        CertExtension::EncryptedFingerprint(token) => {
            (EXT_ENCRYPTED_FINGERPRINT, token.to_bytes().to_vec())
        }
        CertExtension::KeyReference { table_id, key_index } => {
            let mut p = Vec::with_capacity(4);
            p.extend_from_slice(&table_id.to_le_bytes());
            p.extend_from_slice(&key_index.to_le_bytes());
            (EXT_KEY_REFERENCE, p)
        }
        CertExtension::ManufacturerId(s) => (EXT_MANUFACTURER_ID, s.as_bytes().to_vec()),
        CertExtension::RoutingEndpoint(s) => (EXT_ROUTING_ENDPOINT, s.as_bytes().to_vec()),
        CertExtension::AppVersion(s) => (EXT_APP_VERSION, s.as_bytes().to_vec()),
        CertExtension::AllowedVersions(versions) => {
            let mut p = Vec::new();
            p.write_u16::<LittleEndian>(versions.len() as u16).unwrap();
            for v in versions {
                write_string(&mut p, v);
            }
            (EXT_ALLOWED_VERSIONS, p)
        }
        CertExtension::Unknown { tag, payload } => (*tag, payload.clone()),
    }
}
