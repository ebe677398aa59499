pub mod inspect;
pub mod keygen;
pub mod provenance;
pub mod rootgen;
pub mod verify;

use birthmark_registry::ImageHash;

pub(crate) fn parse_hash(hex_str: &str) -> anyhow::Result<ImageHash> {
    let bytes = hex::decode(hex_str)?;
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("image hash must be 32 bytes of hex"))
}

pub(crate) fn render_timestamp(ts: u32) -> String {
    chrono::DateTime::from_timestamp(ts as i64, 0)
        .unwrap_or_default()
        .to_rfc3339()
}
