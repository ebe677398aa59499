use crate::commands::{parse_hash, render_timestamp};
use birthmark_registry::{HashRegistry, SubmissionType};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use std::path::PathBuf;

/// Print the chain root-first, original capture at the top.
pub fn run(dir: PathBuf, hash: &str) -> anyhow::Result<()> {
    let image_hash = parse_hash(hash)?;
    let registry = HashRegistry::open(&dir)?;
    let chain = registry.trace_provenance(&image_hash)?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Seq", "Image Hash", "Type", "Level", "Recorded"]);

    for record in &chain {
        table.add_row(vec![
            record.sequence_number.to_string(),
            hex::encode(record.image_hash),
            match record.submission_type {
                SubmissionType::Camera => "camera".to_string(),
                SubmissionType::Software => "software".to_string(),
            },
            record.modification_level.to_string(),
            render_timestamp(record.timestamp),
        ]);
    }

    println!("{table}");
    Ok(())
}
