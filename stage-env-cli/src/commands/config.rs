//! `stage-env config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use stage_env_core::config::StageEnvConfig;

use super::{describe_source, load_config};
use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: Option<&Path>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => {
            let report = validate(config_path).await;
            writer.render(&report)?;
            if !report.valid {
                return Err(CliError::Config("configuration is invalid".to_owned()));
            }
            Ok(())
        }
        ConfigAction::Show { section } => {
            let config = load_config(config_path).await?;
            let report = show(&config, describe_source(config_path), section.as_deref())?;
            writer.render(&report)
        }
    }
}

/// Load and validate the configuration, collecting the error instead of returning it.
pub async fn validate(config_path: Option<&Path>) -> ConfigValidationReport {
    let source = describe_source(config_path);
    info!(source = %source, "validating configuration");

    match load_config(config_path).await {
        Ok(_) => ConfigValidationReport {
            source,
            valid: true,
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source,
            valid: false,
            errors: vec![e.to_string()],
        },
    }
}

/// Serialize the whole configuration or one section of it.
///
/// # Errors
///
/// Returns `CliError::Command` for an unknown section name.
pub fn show(
    config: &StageEnvConfig,
    source: String,
    section: Option<&str>,
) -> Result<ConfigReport, CliError> {
    let config_toml = match section {
        None => to_toml(config),
        Some("general") => to_toml(&config.general),
        Some("network") => to_toml(&config.network),
        Some("runner") => to_toml(&config.runner),
        Some("monitoring") => to_toml(&config.monitoring),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {other} (expected: general, network, runner, monitoring)"
            )));
        }
    };

    Ok(ConfigReport {
        source,
        section: section.map(str::to_owned),
        config_toml,
    })
}

fn to_toml<T: Serialize>(value: &T) -> String {
    toml::to_string_pretty(value).unwrap_or_else(|e| format!("(serialization error: {e})"))
}

/// Effective configuration.
///
/// `config_toml` is only used for text rendering.
#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        match &self.section {
            Some(section) => writeln!(
                w,
                "Configuration {} (source: {})",
                format!("[{section}]").bold(),
                self.source
            )?,
            None => writeln!(w, "Configuration (source: {})", self.source.bold())?,
        }
        writeln!(w)?;
        write!(w, "{}", self.config_toml)
    }
}

#[derive(Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    /// Empty when valid
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;
        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }
        Ok(())
    }
}
