//! Output formatting for text vs JSON rendering
//!
//! Every command payload goes through [`OutputWriter`], so command handlers
//! never branch on the output format themselves.

use std::io::Write;

use colored::Colorize;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::CliError;

pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Render a payload to stdout.
    pub fn render<T: Render + Serialize>(&self, payload: &T) -> Result<(), CliError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        self.render_to(payload, &mut handle)
    }

    /// Render a payload to any writer.
    pub fn render_to<T: Render + Serialize>(
        &self,
        payload: &T,
        w: &mut dyn Write,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Text => payload.render_text(w)?,
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *w, payload)?;
                writeln!(w)?;
            }
        }
        Ok(())
    }
}

/// Human-readable text rendering, implemented by every payload alongside `Serialize`.
pub trait Render {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()>;
}

/// Colored PASS/FAIL marker.
pub fn status_label(ok: bool) -> String {
    if ok {
        "PASS".green().bold().to_string()
    } else {
        "FAIL".red().bold().to_string()
    }
}
