//! qcode CLI
//!
//! Command-line interface for qcode - annotated documents, category codes
//! and edit locks.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use qcode_core::Config;

mod commands;
mod output;
mod project_file;

use commands::fragments::FragmentsArgs;
use commands::merge::MergeArgs;
use commands::split::SplitArgs;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "qcode")]
#[command(about = "qcode - Qualitative coding of text documents")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the styled fragments of a document window
    Fragments {
        /// Project file (JSON)
        file: PathBuf,
        /// First char of the window
        #[arg(long)]
        start: Option<usize>,
        /// One past the last char of the window
        #[arg(long)]
        end: Option<usize>,
        /// Overlay the matches of this query
        #[arg(short, long)]
        search: Option<String>,
        /// Index of the current search match
        #[arg(long, default_value_t = 0)]
        active_match: usize,
        /// Do not fill code segments with their color
        #[arg(long)]
        no_colors: bool,
    },
    /// Search the document text
    Search {
        /// Project file (JSON)
        file: PathBuf,
        /// Literal, case-insensitive query
        query: String,
    },
    /// List codes with their segment counts
    #[command(alias = "ls")]
    Codes {
        /// Project file (JSON)
        file: PathBuf,
    },
    /// Merge codes into one new code
    Merge {
        /// Project file (JSON)
        file: PathBuf,
        /// Code to merge (repeatable)
        #[arg(short, long = "source", required = true)]
        sources: Vec<String>,
        /// Name of the new code
        #[arg(long)]
        into: String,
        /// Color of the new code (#RRGGBB), defaults to the first source's
        #[arg(long)]
        color: Option<String>,
        /// Save the result back to the project file
        #[arg(short, long)]
        write: bool,
    },
    /// Split a code into new codes, one decision per segment
    Split {
        /// Project file (JSON)
        file: PathBuf,
        /// Code to split
        #[arg(short, long)]
        source: String,
        /// New code as NAME or NAME:#RRGGBB (repeatable)
        #[arg(short, long = "new")]
        new_codes: Vec<String>,
        /// Target for the next segment: a new code name, or - for uncoded
        #[arg(short, long, allow_hyphen_values = true)]
        assign: Vec<String>,
        /// Save the result back to the project file
        #[arg(short, long)]
        write: bool,
    },
    /// Walk through claim, rejection and release between two tabs
    LockDemo {
        /// File id to lock
        #[arg(long)]
        file: Option<String>,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (history_limit, show_colors, query_window_ms, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Config commands load the file themselves
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), config_path, &output);
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    debug!("Loaded configuration: {:?}", config);

    match cli.command {
        Commands::Fragments {
            file,
            start,
            end,
            search,
            active_match,
            no_colors,
        } => commands::fragments::show(
            FragmentsArgs {
                file,
                start,
                end,
                search,
                active_match,
                no_colors,
            },
            &config,
            &output,
        ),
        Commands::Search { file, query } => commands::search::run(file, query, &output),
        Commands::Codes { file } => commands::codes::list(file, &output),
        Commands::Merge {
            file,
            sources,
            into,
            color,
            write,
        } => commands::merge::run(
            MergeArgs {
                file,
                sources,
                into,
                color,
                write,
            },
            &output,
        ),
        Commands::Split {
            file,
            source,
            new_codes,
            assign,
            write,
        } => commands::split::run(
            SplitArgs {
                file,
                source,
                new_codes,
                assign,
                write,
            },
            &output,
        ),
        Commands::LockDemo { file } => {
            let file_id =
                file.unwrap_or_else(|| format!("demo-{}", &uuid::Uuid::new_v4().to_string()[..8]));
            commands::lock_demo::run(file_id, &config, &output).await
        }
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Initialize stderr logging
///
/// Only initializes if QCODE_LOG environment variable is set.
fn init_logging() {
    let Ok(log_level) = std::env::var("QCODE_LOG") else {
        return;
    };

    let env_filter = EnvFilter::new(format!("qcode_core={},qcode_cli={}", log_level, log_level));

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .try_init();

    debug!("Logging initialized at level {}", log_level);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_split_accepts_uncoded_marker() {
        let cli = Cli::try_parse_from([
            "qcode", "split", "p.json", "--source", "Broad", "--new", "A", "--assign", "A",
            "--assign", "-",
        ])
        .unwrap();
        match cli.command {
            Commands::Split { assign, .. } => assert_eq!(assign, vec!["A", "-"]),
            _ => panic!("Expected split command"),
        }
    }

    #[test]
    fn test_merge_requires_a_source() {
        assert!(Cli::try_parse_from(["qcode", "merge", "p.json", "--into", "X"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["qcode", "codes", "p.json", "--json"]).unwrap();
        assert!(cli.json);
        assert!(!cli.quiet);
    }
}
