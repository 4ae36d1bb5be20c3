//! FlatRec CLI
//!
//! Command-line tools for FlatRec buffers.
//!
//! # Commands
//!
//! - `inspect` - Display the header, vtable and fields of a buffer
//! - `verify` - Check a buffer against a schema
//! - `encode` - Build a buffer from a JSON record

mod commands;
mod error;
mod json;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// FlatRec command-line buffer tools.
#[derive(Parser)]
#[command(name = "flatrec")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the header, vtable and fields of a buffer
    Inspect {
        /// Buffer file
        file: PathBuf,

        /// Schema file (JSON); fields are decoded when given
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Check a buffer against a schema
    Verify {
        /// Buffer file
        file: PathBuf,

        /// Schema file (JSON)
        #[arg(short, long)]
        schema: PathBuf,
    },

    /// Build a buffer from a JSON object keyed by field name
    Encode {
        /// Schema file (JSON)
        #[arg(short, long)]
        schema: PathBuf,

        /// Record file (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the buffer
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect {
            file,
            schema,
            format,
        } => {
            commands::inspect::run(&file, schema.as_deref(), format)?;
        }
        Commands::Verify { file, schema } => {
            commands::verify::run(&file, &schema)?;
        }
        Commands::Encode {
            schema,
            input,
            output,
        } => {
            commands::encode::run(&schema, &input, &output)?;
        }
        Commands::Version => {
            println!("FlatRec CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("FlatRec Codec v{}", flatrec_codec::VERSION);
        }
    }

    Ok(())
}
