use birthmark::certificate::decode_roots;
use birthmark::keytable::decode_tables;
use birthmark_cli::commands::{inspect, keygen, provenance, rootgen, verify};
use birthmark_registry::{HashRegistry, NewRecord, SubmissionType};
use ed25519_dalek::SigningKey;
use tempfile::tempdir;

fn seeded_registry(dir: &std::path::Path) -> [u8; 32] {
    let registry = HashRegistry::open(dir).unwrap();
    let mut root = [0u8; 32];
    root[0] = 0xAA;
    let mut edit = [0u8; 32];
    edit[0] = 0xBB;
    registry
        .append(
            NewRecord {
                image_hash: root,
                submission_type: SubmissionType::Camera,
                modification_level: 0,
                parent_image_hash: None,
            },
            "MFG-01",
        )
        .unwrap();
    registry
        .append(
            NewRecord {
                image_hash: edit,
                submission_type: SubmissionType::Software,
                modification_level: 1,
                parent_image_hash: Some(root),
            },
            "EDITOR-7",
        )
        .unwrap();
    edit
}

#[test]
fn keygen_writes_a_decodable_key_file() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("tables.bin");
    keygen::run(out.clone(), 25).unwrap();

    let tables = decode_tables(&std::fs::read(&out).unwrap()).unwrap();
    assert_eq!(tables.len(), 25);

    // Exists already: refuse rather than clobber.
    assert!(keygen::run(out, 25).is_err());
}

#[test]
fn rootgen_emits_matching_halves() {
    let dir = tempdir().unwrap();
    rootgen::run("MFG-01", dir.path().to_path_buf()).unwrap();

    let roots =
        decode_roots(&std::fs::read(dir.path().join("trusted_roots.bin")).unwrap()).unwrap();
    let public = roots.get("MFG-01").expect("authority present");

    let key_hex = std::fs::read_to_string(dir.path().join("MFG-01.signing.key")).unwrap();
    let key_bytes: [u8; 32] = hex::decode(key_hex.trim()).unwrap().try_into().unwrap();
    let signing = SigningKey::from_bytes(&key_bytes);
    assert_eq!(signing.verifying_key(), *public);
}

#[test]
fn registry_commands_run_against_a_seeded_directory() {
    let dir = tempdir().unwrap();
    let edit = seeded_registry(dir.path());
    let hash_hex = hex::encode(edit);

    inspect::run(dir.path().to_path_buf()).unwrap();
    verify::run(dir.path().to_path_buf(), &hash_hex).unwrap();
    provenance::run(dir.path().to_path_buf(), &hash_hex).unwrap();

    // Unknown hashes are a rendering case for verify, an error for provenance.
    let missing = hex::encode([0x0Fu8; 32]);
    verify::run(dir.path().to_path_buf(), &missing).unwrap();
    assert!(provenance::run(dir.path().to_path_buf(), &missing).is_err());
}
