//! tabfhir CLI
//!
//! Command-line interface for converting tabular FHIR field mappings into
//! transaction bundles

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tabfhir_core::init_tracing;
use tracing::error;

#[derive(Parser)]
#[command(name = "tabfhir")]
#[command(about = "tabfhir: tabular field mappings to FHIR transaction bundles")]
#[command(version = tabfhir_core::VERSION)]
#[command(
    long_about = "tabfhir converts spreadsheet-style FHIR field mappings into one transaction\n\
Bundle per subject. Input is a directory of CSV sheets, an .xlsx workbook or a\n\
JSON record file.\n\
\n\
Examples:\n  \
tabfhir convert workbook/              # Write one bundle per subject to ./bundles\n  \
tabfhir convert input.json -o out/     # Convert a JSON record file\n  \
tabfhir convert mappings.xlsx          # Convert an Excel workbook\n  \
tabfhir convert workbook/ --subject 0  # Convert a single subject\n  \
tabfhir check workbook/                # Validate paths and links without converting\n  \
tabfhir config init                    # Create a configuration file"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(
        short,
        long,
        global = true,
        help = "Path to configuration file (.tabfhirrc.json/.tabfhirrc.toml/tabfhir.toml)"
    )]
    config: Option<PathBuf>,

    /// Verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Number of threads to use for parallel conversion
    #[arg(
        short = 'j',
        long,
        global = true,
        help = "Number of threads (default: number of CPU cores)"
    )]
    threads: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert field mappings into one transaction bundle per subject
    Convert {
        /// CSV sheet directory, .xlsx workbook or JSON record file
        input: PathBuf,

        /// Output directory for bundles
        #[arg(short, long, default_value = "bundles", help = "Output directory")]
        output: PathBuf,

        /// Subject indices to convert
        #[arg(
            long = "subject",
            help = "Convert only this subject index (can be used multiple times)"
        )]
        subjects: Vec<usize>,

        /// Reproducible identifiers derived from the subject index
        #[arg(long, help = "Generate deterministic identifiers instead of random UUIDs")]
        deterministic_ids: bool,
    },

    /// Check paths, entities and links without converting
    Check {
        /// CSV sheet directory, .xlsx workbook or JSON record file
        input: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version information
    Version {
        /// Show detailed version information
        #[arg(long, help = "Show detailed version and build information")]
        detailed: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Initialize a new configuration file
    Init {
        /// Configuration file format
        #[arg(long, default_value = "json", help = "Configuration file format")]
        format: ConfigFormat,

        /// Directory to write the file into
        #[arg(long, help = "Target directory (default: current directory)")]
        dir: Option<PathBuf>,

        /// Overwrite existing configuration file
        #[arg(long, help = "Overwrite existing configuration file")]
        force: bool,
    },

    /// Show the resolved configuration
    Show {
        /// Directory to start config discovery from
        #[arg(help = "Start directory for discovery (default: current directory)")]
        path: Option<PathBuf>,
    },

    /// Print the configuration JSON Schema
    Schema,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Json,
    Toml,
}

fn main() {
    let cli = Cli::parse();

    // Initialize colored output
    if !cli.no_color && std::env::var("NO_COLOR").is_err() {
        colored::control::set_override(true);
    } else {
        colored::control::set_override(false);
    }

    // Initialize tracing based on verbosity
    let log_level = match cli.verbose {
        0 => "tabfhir=warn",
        1 => "tabfhir=info",
        2 => "tabfhir=debug",
        _ => "tabfhir=trace",
    };
    unsafe {
        std::env::set_var("RUST_LOG", log_level);
    }
    init_tracing();

    // Set thread pool size if specified
    if let Some(threads) = cli.threads
        && let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
    {
        error!("Failed to set thread pool size: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run_command(cli) {
        error!("tabfhir failed: {:#}", e);
        std::process::exit(1);
    }
}

fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Convert {
            input,
            output,
            subjects,
            deterministic_ids,
        } => commands::convert_command(
            &input,
            &output,
            subjects,
            deterministic_ids,
            cli.config.as_deref(),
        ),

        Commands::Check { input } => commands::check_command(&input, cli.config.as_deref()),

        Commands::Config { action } => match action {
            ConfigAction::Init { format, dir, force } => {
                commands::config_init_command(format, dir, force)
            }
            ConfigAction::Show { path } => {
                commands::config_show_command(cli.config.as_deref(), path.as_deref())
            }
            ConfigAction::Schema => commands::config_schema_command(),
        },

        Commands::Version { detailed } => {
            println!("tabfhir {}", tabfhir_core::VERSION);
            if detailed {
                println!("Build information:");
                println!("  Target: {}", std::env::consts::ARCH);
                println!("  OS: {}", std::env::consts::OS);
            }
            Ok(())
        }
    }
}
