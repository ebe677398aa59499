use crate::commands::{parse_hash, render_timestamp};
use birthmark_registry::HashRegistry;
use std::path::PathBuf;

pub fn run(dir: PathBuf, hash: &str) -> anyhow::Result<()> {
    let image_hash = parse_hash(hash)?;
    let registry = HashRegistry::open(&dir)?;
    let verification = registry.verify(&image_hash)?;

    if verification.verified {
        println!("VERIFIED");
        println!("  modification level : {}", verification.modification_level);
        println!(
            "  recorded at        : {}",
            render_timestamp(verification.timestamp)
        );
        println!(
            "  provenance depth   : {}",
            verification.provenance_chain.len()
        );
    } else {
        println!("NOT RECORDED");
    }
    Ok(())
}
