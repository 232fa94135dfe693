//! CLI command definitions and argument parsing.

use clap::{Parser, Subcommand};
use sift_domain::ExtractionMode;
use std::path::PathBuf;

/// Sift CLI - Extract structured fields from documents with a language model.
#[derive(Debug, Parser)]
#[command(name = "sift")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (defaults to ~/.sift/config.toml)
    #[arg(short, long, global = true, env = "SIFT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "sift_extractor=trace"
    #[arg(long, global = true, env = "SIFT_LOG", default_value = "info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run an extraction and stream NDJSON events to stdout
    Extract(ExtractArgs),

    /// Print the structured-output schema for a field list
    Schema(SchemaArgs),

    /// Show how a document would be chunked
    Chunks(ChunksArgs),

    /// Manage the configuration file
    Config(ConfigArgs),
}

/// Arguments for the extract command.
#[derive(Debug, Parser)]
pub struct ExtractArgs {
    /// Document text (plain text or markdown)
    pub input: PathBuf,

    /// JSON file with the field descriptors
    #[arg(short, long)]
    pub fields: PathBuf,

    /// Extraction mode
    #[arg(short, long, value_enum, default_value = "fulltext")]
    pub mode: ModeArg,

    /// Document id reported in logs
    #[arg(long)]
    pub id: Option<String>,

    /// Document title, used when the file has none
    #[arg(long)]
    pub title: Option<String>,

    /// Model name (overrides the config file)
    #[arg(long, env = "SIFT_MODEL")]
    pub model: Option<String>,

    /// Model endpoint (overrides the config file)
    #[arg(long, env = "SIFT_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Emit typing events while the model streams
    #[arg(long)]
    pub stream: bool,
}

/// Arguments for the schema command.
#[derive(Debug, Parser)]
pub struct SchemaArgs {
    /// JSON file with the field descriptors
    pub fields: PathBuf,

    /// Print the prompt description instead of the JSON schema
    #[arg(long)]
    pub describe: bool,
}

/// Arguments for the chunks command.
#[derive(Debug, Parser)]
pub struct ChunksArgs {
    /// Document text (plain text or markdown)
    pub input: PathBuf,

    /// Extraction mode
    #[arg(short, long, value_enum, default_value = "fulltext")]
    pub mode: ModeArg,

    /// Print chunks as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Arguments for configuration management.
#[derive(Debug, Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Extraction mode argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeArg {
    /// Title and abstract only
    Abstract,
    /// Full document text
    Fulltext,
}

impl From<ModeArg> for ExtractionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Abstract => ExtractionMode::Abstract,
            ModeArg::Fulltext => ExtractionMode::Fulltext,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_command() {
        let cli = Cli::parse_from([
            "sift",
            "extract",
            "paper.md",
            "--fields",
            "fields.json",
            "--mode",
            "abstract",
        ]);
        match cli.command {
            Command::Extract(args) => {
                assert_eq!(args.input, PathBuf::from("paper.md"));
                assert_eq!(args.mode, ModeArg::Abstract);
                assert!(!args.stream);
            }
            _ => panic!("Expected Extract command"),
        }
    }

    #[test]
    fn test_config_init_command() {
        let cli = Cli::parse_from(["sift", "config", "init", "--force"]);
        assert!(matches!(
            cli.command,
            Command::Config(ConfigArgs {
                action: ConfigAction::Init { force: true }
            })
        ));
    }

    #[test]
    fn test_mode_conversion() {
        let mode: ExtractionMode = ModeArg::Fulltext.into();
        assert_eq!(mode, ExtractionMode::Fulltext);
    }

    #[test]
    fn test_missing_subcommand_is_an_error() {
        assert!(Cli::try_parse_from(["sift"]).is_err());
    }
}
