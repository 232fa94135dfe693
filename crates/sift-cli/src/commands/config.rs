//! Config command implementation.

use crate::cli::{ConfigAction, ConfigArgs};
use crate::config::Config;
use crate::error::{CliError, Result};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Execute the config command against the file at `path`.
pub fn execute_config(
    args: ConfigArgs,
    config: &Config,
    path: &Path,
    out: &mut impl Write,
) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let rendered = toml::to_string_pretty(config)
                .map_err(|e| CliError::Config(format!("Failed to serialize config: {}", e)))?;
            writeln!(out, "# {}", path.display())?;
            write!(out, "{}", rendered)?;
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                return Err(CliError::Config(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )));
            }
            Config::default().save_to(path)?;
            info!("Wrote default configuration to {}", path.display());
            writeln!(out, "{}", path.display())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut out = Vec::new();

        let init = |force| ConfigArgs {
            action: ConfigAction::Init { force },
        };
        execute_config(init(false), &Config::default(), &path, &mut out).unwrap();
        assert!(path.exists());

        let err = execute_config(init(false), &Config::default(), &path, &mut out).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
        execute_config(init(true), &Config::default(), &path, &mut out).unwrap();
    }

    #[test]
    fn test_show_renders_sections() {
        let mut out = Vec::new();
        let args = ConfigArgs {
            action: ConfigAction::Show,
        };
        execute_config(args, &Config::default(), Path::new("config.toml"), &mut out).unwrap();

        let rendered = String::from_utf8(out).unwrap();
        assert!(rendered.contains("[model]"));
        assert!(rendered.contains("[extractor]"));
    }
}
