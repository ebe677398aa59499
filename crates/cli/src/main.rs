use birthmark_cli::commands::{inspect, keygen, provenance, rootgen, verify};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "birthmark")]
#[command(about = "Birthmark operator CLI - registry inspection and key tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the status of a registry directory.
    Inspect {
        /// Directory containing records.log and authorities.log.
        #[arg(long, short, default_value = ".")]
        dir: PathBuf,
    },
    /// Check whether an image hash is recorded.
    Verify {
        /// 64-char hex SHA-256 of the image.
        hash: String,

        #[arg(long, short, default_value = ".")]
        dir: PathBuf,
    },
    /// Trace the edit chain of a recorded image, root first.
    Provenance {
        hash: String,

        #[arg(long, short, default_value = ".")]
        dir: PathBuf,
    },
    /// Generate a master key table file for a validator.
    Keygen {
        /// Output key file path.
        out: PathBuf,

        /// Number of tables to generate.
        #[arg(long, short, default_value_t = birthmark::types::TABLE_COUNT_PILOT)]
        tables: u16,
    },
    /// Generate a root signing keypair and trusted-roots file.
    Rootgen {
        /// Issuing authority identifier, e.g. a manufacturer id.
        authority_id: String,

        /// Directory to place the roots file and signing key in.
        #[arg(long, short, default_value = ".")]
        out_dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { dir } => inspect::run(dir),
        Commands::Verify { hash, dir } => verify::run(dir, &hash),
        Commands::Provenance { hash, dir } => provenance::run(dir, &hash),
        Commands::Keygen { out, tables } => keygen::run(out, tables),
        Commands::Rootgen { authority_id, out_dir } => rootgen::run(&authority_id, out_dir),
    }
}
