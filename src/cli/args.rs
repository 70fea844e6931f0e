use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dwd-ingest")]
#[command(about = "Load DWD 10-minute station and measurement data into PostgreSQL")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,
}

/// Settings that override the configuration file and environment.
#[derive(Args, Debug, Default, Clone)]
pub struct SourceOverrides {
    #[arg(short, long, help = "Directory holding the station file and archives")]
    pub source_dir: Option<PathBuf>,

    #[arg(long, help = "PostgreSQL connection string")]
    pub database_url: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindArg {
    Station,
    Measurement,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load the station file, then every measurement archive
    Load {
        #[command(flatten)]
        source: SourceOverrides,

        #[arg(long, help = "Maximum archives loaded at the same time")]
        max_workers: Option<usize>,

        #[arg(long, help = "Records per merge batch")]
        batch_size: Option<usize>,

        #[arg(long, help = "Only load measurements from this month (1-12)")]
        month: Option<u32>,

        #[arg(long, default_value = "false", help = "Load into memory instead of the database")]
        dry_run: bool,

        #[arg(short, long, help = "Hide the progress bar")]
        quiet: bool,
    },

    /// Create the destination tables if they do not exist
    Bootstrap {
        #[command(flatten)]
        source: SourceOverrides,
    },

    /// Decode source files without writing anything
    Inspect {
        #[command(flatten)]
        source: SourceOverrides,

        #[arg(short, long, help = "Single file to inspect [default: the whole source directory]")]
        file: Option<PathBuf>,

        #[arg(long, value_enum, help = "Record kind of --file [default: by extension]")]
        kind: Option<KindArg>,

        #[arg(long, default_value = "5", help = "Decoded records to print per file")]
        sample: usize,
    },

    /// Populate the source directory from the configured remote index
    Fetch {
        #[command(flatten)]
        source: SourceOverrides,

        #[arg(long, help = "Directory index URL")]
        base_url: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_load() {
        let cli = Cli::parse_from([
            "dwd-ingest",
            "--verbose",
            "load",
            "--source-dir",
            "/srv/dwd",
            "--month",
            "9",
            "--dry-run",
        ]);

        assert!(cli.verbose);
        match cli.command {
            Commands::Load {
                source,
                month,
                dry_run,
                ..
            } => {
                assert_eq!(source.source_dir, Some(PathBuf::from("/srv/dwd")));
                assert_eq!(month, Some(9));
                assert!(dry_run);
            }
            _ => panic!("expected load"),
        }
    }

    #[test]
    fn test_parse_inspect_single_file() {
        let cli = Cli::parse_from([
            "dwd-ingest",
            "inspect",
            "--file",
            "stations.txt",
            "--kind",
            "station",
        ]);

        match cli.command {
            Commands::Inspect { file, kind, sample, .. } => {
                assert_eq!(file, Some(PathBuf::from("stations.txt")));
                assert_eq!(kind, Some(KindArg::Station));
                assert_eq!(sample, 5);
            }
            _ => panic!("expected inspect"),
        }
    }

    #[test]
    fn test_parse_global_config_after_subcommand() {
        let cli = Cli::parse_from(["dwd-ingest", "bootstrap", "--config", "ingest.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("ingest.toml")));
        assert!(matches!(cli.command, Commands::Bootstrap { .. }));
    }
}
