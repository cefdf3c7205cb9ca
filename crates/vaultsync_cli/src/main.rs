//! vaultsync CLI
//!
//! Synchronizes a source content repository into a preservation store.
//!
//! # Commands
//!
//! - `sync` - Transfer new and updated objects
//! - `audit` - Compare the source inventory with the preserved copies
//! - `migrate` - Copy objects between two stores and validate them
//! - `verify-migration` - Validate a previous migration
//! - `version` - Show version information

mod commands;
mod config;
mod http_client;

use clap::{Parser, Subcommand};
use commands::audit::ReportFormat;
use config::{ConfigFile, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vaultsync_core::Timestamp;

/// Repository to preservation-storage synchronization.
#[derive(Parser)]
#[command(name = "vaultsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(global = true, short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable debug output
    #[arg(global = true, short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transfer new and updated objects
    Sync {
        /// Only consider objects modified at or after this time
        #[arg(short, long)]
        start: Option<Timestamp>,

        /// Transfer exactly the ids listed in this file
        #[arg(short, long, conflicts_with = "start")]
        reprocess: Option<PathBuf>,

        /// Concurrent transfers
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Compare the source inventory with the preserved copies
    Audit {
        /// Omit objects whose preserved copy is current
        #[arg(short, long)]
        summary: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Csv)]
        format: ReportFormat,

        /// Write the report to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Copy objects between two stores and validate them
    Migrate {
        /// Source store directory
        #[arg(long)]
        from: PathBuf,

        /// Destination store directory
        #[arg(long)]
        to: PathBuf,

        /// File listing the ids to copy
        #[arg(long)]
        id_list: PathBuf,

        /// Content type forced on every copy
        #[arg(long)]
        content_type: Option<String>,

        /// Write one CSV row per uploaded object to this file
        #[arg(long, requires = "uploaded_by")]
        log_csv: Option<PathBuf>,

        /// Name recorded in the upload log
        #[arg(long)]
        uploaded_by: Option<String>,
    },

    /// Validate a previous migration
    VerifyMigration {
        /// Source store directory
        #[arg(long)]
        from: PathBuf,

        /// Destination store directory
        #[arg(long)]
        to: PathBuf,

        /// File listing the ids to check
        #[arg(long)]
        id_list: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Sync {
            start,
            reprocess,
            workers,
        } => {
            let config = ConfigFile::load(&cli.config)?;
            commands::sync::run(&config, start, reprocess.as_deref(), workers)?;
        }
        Commands::Audit {
            summary,
            format,
            output,
        } => {
            let config = ConfigFile::load(&cli.config)?;
            commands::audit::run(&config, summary, format, output.as_deref())?;
        }
        Commands::Migrate {
            from,
            to,
            id_list,
            content_type,
            log_csv,
            uploaded_by,
        } => {
            let upload = commands::migrate::UploadArgs {
                log_csv,
                uploaded_by,
            };
            commands::migrate::run(&from, &to, &id_list, content_type, upload)?;
        }
        Commands::VerifyMigration { from, to, id_list } => {
            commands::migrate::verify(&from, &to, &id_list)?;
        }
        Commands::Version => {
            println!("vaultsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("vaultsync core v{}", vaultsync_core::VERSION);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sync_flags() {
        let cli = Cli::try_parse_from([
            "vaultsync",
            "-c",
            "/etc/vaultsync.toml",
            "sync",
            "-s",
            "2024-01-01T00:00:00Z",
            "-w",
            "4",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/vaultsync.toml"));
        match cli.command {
            Commands::Sync { start, workers, reprocess } => {
                assert_eq!(start, Some(Timestamp::parse("2024-01-01").unwrap()));
                assert_eq!(workers, Some(4));
                assert!(reprocess.is_none());
            }
            _ => panic!("expected sync"),
        }
    }

    #[test]
    fn default_config_path() {
        let cli = Cli::try_parse_from(["vaultsync", "version"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("vaultsync.toml"));
        assert!(!cli.debug);
    }

    #[test]
    fn start_and_reprocess_conflict() {
        assert!(Cli::try_parse_from(["vaultsync", "sync", "-s", "2024-01-01", "-r", "failed.log"]).is_err());
    }

    #[test]
    fn rejects_bad_timestamp() {
        assert!(Cli::try_parse_from(["vaultsync", "sync", "--start", "yesterday"]).is_err());
    }

    #[test]
    fn parses_audit_and_migrate() {
        let cli = Cli::try_parse_from(["vaultsync", "audit", "-s", "-f", "json", "-o", "out.json", "-d"]).unwrap();
        assert!(cli.debug);
        assert!(matches!(
            cli.command,
            Commands::Audit {
                summary: true,
                format: ReportFormat::Json,
                ..
            }
        ));

        let cli = Cli::try_parse_from([
            "vaultsync",
            "migrate",
            "--from",
            "a",
            "--to",
            "b",
            "--id-list",
            "ids.txt",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Migrate { content_type: None, .. }));
    }

    #[test]
    fn upload_log_needs_a_name() {
        let base = ["vaultsync", "migrate", "--from", "a", "--to", "b", "--id-list", "ids.txt"];
        let mut args = base.to_vec();
        args.extend(["--log-csv", "uploads.csv"]);
        assert!(Cli::try_parse_from(args.clone()).is_err());

        args.extend(["--uploaded-by", "jdoe"]);
        let cli = Cli::try_parse_from(args.clone()).unwrap();
        match cli.command {
            Commands::Migrate {
                log_csv,
                uploaded_by,
                ..
            } => {
                assert_eq!(log_csv, Some(PathBuf::from("uploads.csv")));
                assert_eq!(uploaded_by.as_deref(), Some("jdoe"));
            }
            _ => panic!("expected migrate"),
        }
    }
}
