use birthmark::certificate::encode_roots;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use std::path::PathBuf;

/// Generate a root signing keypair for `authority_id`. The public half goes
/// into a trusted-roots file for validators; the private half is written
/// hex-encoded next to it for the issuing side.
pub fn run(authority_id: &str, out_dir: PathBuf) -> anyhow::Result<()> {
    let roots_path = out_dir.join("trusted_roots.bin");
    let key_path = out_dir.join(format!("{authority_id}.signing.key"));
    if roots_path.exists() || key_path.exists() {
        anyhow::bail!("refusing to overwrite existing key material in {}", out_dir.display());
    }
    std::fs::create_dir_all(&out_dir)?;

    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_bytes = signing_key.verifying_key().to_bytes();

    std::fs::write(
        &roots_path,
        encode_roots(&[(authority_id.to_string(), verifying_bytes)]),
    )?;
    std::fs::write(&key_path, hex::encode(signing_key.to_bytes()))?;

    println!("authority  : {authority_id}");
    println!("roots file : {}", roots_path.display());
    println!("signing key: {} (keep private)", key_path.display());
    Ok(())
}
