use birthmark::keytable::encode_tables;
use rand::rngs::OsRng;
use rand::RngCore;
use std::path::PathBuf;

/// Generate `count` fresh master key tables and write the key file.
pub fn run(out: PathBuf, count: u16) -> anyhow::Result<()> {
    if out.exists() {
        anyhow::bail!("refusing to overwrite existing key file {}", out.display());
    }

    let mut tables = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        tables.push(key);
    }

    std::fs::write(&out, encode_tables(&tables))?;
    println!("wrote {} master key tables to {}", count, out.display());
    Ok(())
}
