//! Command-line interface for the artifact cache.
//!
//! `serve` runs the HTTP upload server, `extract` unpacks a local tar.gz
//! archive with the same safety checks the server applies to uploads.

use cache_server::config::{
    Credentials, ServerConfig, DEFAULT_DIRECTORY, DEFAULT_HOST, DEFAULT_PORT,
};
use clap::{Parser, Subcommand};
use extractor::{Limits, MAX_FILE_SIZE, MAX_TOTAL_SIZE};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process;
use tracing::info;

#[derive(Parser)]
#[command(name = "artifact-cache")]
#[command(version, about = "Upload, unpack and serve build artifacts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the upload server
    Serve {
        /// Address to bind
        #[arg(long, env = "UPLOADER_HOST", default_value = DEFAULT_HOST)]
        host: String,

        /// Port to bind
        #[arg(short, long, env = "UPLOADER_PORT", default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Directory uploads are stored in and served from
        #[arg(short, long, env = "UPLOADER_DIRECTORY", default_value = DEFAULT_DIRECTORY)]
        directory: PathBuf,

        /// Basic-auth credentials as `user:password`; auth is off when unset
        #[arg(long, env = "UPLOADER_UPLOAD_CREDENTIALS", hide_env_values = true)]
        credentials: Option<String>,
    },

    /// Extract a tar.gz archive
    Extract {
        /// Archive file to extract
        archive: PathBuf,

        /// Output directory
        #[arg(short, long)]
        out: PathBuf,

        /// Per-file size limit in bytes
        #[arg(long, default_value_t = MAX_FILE_SIZE)]
        max_file_size: u64,

        /// Limit for all files together in bytes
        #[arg(long, default_value_t = MAX_TOTAL_SIZE)]
        max_total_size: u64,

        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            host,
            port,
            directory,
            credentials,
        } => handle_serve(ServerConfig {
            host,
            port,
            directory,
            credentials: credentials
                .filter(|value| !value.is_empty())
                .map(|value| Credentials::parse(&value)),
        }),
        Commands::Extract {
            archive,
            out,
            max_file_size,
            max_total_size,
            json,
        } => handle_extract(
            archive,
            out,
            Limits {
                max_file_size,
                max_total_size,
            },
            json,
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn handle_serve(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(cache_server::serve(config))?;
    Ok(())
}

fn handle_extract(
    archive: PathBuf,
    out: PathBuf,
    limits: Limits,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(archive = %archive.display(), out = %out.display(), "extracting archive");

    let input = BufReader::new(File::open(&archive)?);
    let stats = extractor::extract_with_limits(&out, input, &limits)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!(
            "Extracted {} files and {} directories ({} bytes) in {:.2}s",
            stats.files_extracted,
            stats.directories_created,
            stats.bytes_written,
            stats.duration.as_secs_f64()
        );
        if stats.entries_skipped > 0 {
            println!("Skipped {} unsupported entries", stats.entries_skipped);
        }
    }

    Ok(())
}
