use anyhow::Result;
use birthmark::certificate::{encode_roots, TrustedRoots};
use birthmark::keytable::{encode_tables, KeyTableStore};
use birthmark::provision;
use birthmark::types::{DeviceRegistration, TABLE_COUNT_PILOT};
use birthmark::Validator;
use birthmark_registry::{HashRegistry, NewRecord, SubmissionType};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use std::path::Path;
use std::sync::Arc;

const MANUFACTURER: &str = "ACME-OPTICS";

fn main() -> Result<()> {
    let out_dir = Path::new("demo_registry");
    if out_dir.exists() {
        std::fs::remove_dir_all(out_dir)?;
    }
    std::fs::create_dir_all(out_dir)?;

    println!("Generating 'Newsroom' demo registry...");

    // --- Key material ---
    println!("1. Generating {} master key tables + a root keypair...", TABLE_COUNT_PILOT);
    let mut tables = Vec::with_capacity(TABLE_COUNT_PILOT as usize);
    for _ in 0..TABLE_COUNT_PILOT {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        tables.push(key);
    }
    std::fs::write(out_dir.join("key_tables.bin"), encode_tables(&tables))?;

    let issuer = SigningKey::generate(&mut OsRng);
    std::fs::write(
        out_dir.join("trusted_roots.bin"),
        encode_roots(&[(MANUFACTURER.to_string(), issuer.verifying_key().to_bytes())]),
    )?;

    let store = Arc::new(KeyTableStore::new(tables));
    let mut roots = TrustedRoots::new();
    roots.add(MANUFACTURER, issuer.verifying_key());

    // --- SCENE 1: Three cameras leave the factory ---
    println!("2. Provisioning 3 cameras...");
    let serials = ["CAM-1001", "CAM-1002", "CAM-1003"];
    for serial in serials {
        let fingerprint = provision::generate_fingerprint_hash(serial.as_bytes());
        let assignment = store.assign_tables(serial)?;
        let cert = provision::camera_certificate(
            serial,
            MANUFACTURER,
            "http://127.0.0.1:7878",
            (0, u32::MAX),
            &issuer,
        );
        store.register_device(DeviceRegistration {
            device_serial: serial.to_string(),
            fingerprint_hash: fingerprint,
            table_assignment: assignment,
            device_certificate: cert,
            device_family: "demo-fleet".to_string(),
            revoked: false,
        })?;
    }

    // --- SCENE 2: Each camera captures one image ---
    println!("3. Validating and recording 3 captures...");
    let validator = Validator::new(store.clone(), roots);
    let registry = HashRegistry::open(out_dir)?;

    for (n, serial) in serials.iter().enumerate() {
        let fingerprint = provision::generate_fingerprint_hash(serial.as_bytes());
        let assignment = store.assign_tables(serial)?;
        let master = store.get_master_key(assignment[0])?;
        let token = provision::build_token(&fingerprint, &master, assignment[0], n as u16)?;
        let cert = store.lookup_device(serial)?.device_certificate;

        let verdict = validator.validate(&cert, &token, MANUFACTURER);
        anyhow::ensure!(verdict.is_pass(), "demo capture failed validation");

        registry.append(
            NewRecord {
                image_hash: image_hash(n as u8 + 1),
                submission_type: SubmissionType::Camera,
                modification_level: 0,
                parent_image_hash: None,
            },
            MANUFACTURER,
        )?;
    }

    // --- SCENE 3: CAM-1001's photo gets edited twice ---
    println!("4. Recording a two-step edit chain on the first capture...");
    registry.append(
        NewRecord {
            image_hash: image_hash(10),
            submission_type: SubmissionType::Software,
            modification_level: 1,
            parent_image_hash: Some(image_hash(1)),
        },
        "PHOTOFIX-SUITE",
    )?;
    registry.append(
        NewRecord {
            image_hash: image_hash(11),
            submission_type: SubmissionType::Software,
            modification_level: 2,
            parent_image_hash: Some(image_hash(10)),
        },
        "PHOTOFIX-SUITE",
    )?;

    println!("Demo registry generated at: {:?}", out_dir.canonicalize()?);
    println!(
        "Story: 3 originals (seq 0-2), then edits {} -> {}",
        hex::encode(image_hash(10)),
        hex::encode(image_hash(11))
    );
    println!(
        "   Try: birthmark provenance {} --dir demo_registry",
        hex::encode(image_hash(11))
    );

    Ok(())
}

// Deterministic stand-in hashes so the printed CLI hints stay stable
// across runs.
fn image_hash(n: u8) -> [u8; 32] {
    let mut h = [0u8; 32];
    h[0] = n;
    h[31] = n ^ 0xFF;
    h
}
