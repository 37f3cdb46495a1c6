//! Output formatting and writing utilities
//!
//! Decoded response values are rendered as JSON, YAML or a human-readable
//! form; status messages only appear in human mode.

use std::io::{self, Write};

use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::cli::OutputFormat;
use crate::error::Result;

/// Formatting of serializable values per output format
pub trait OutputFormatter {
    fn format<T: Serialize>(&self, value: &T) -> Result<String>;
}

impl OutputFormatter for OutputFormat {
    fn format<T: Serialize>(&self, value: &T) -> Result<String> {
        match self {
            OutputFormat::Json => Ok(serde_json::to_string(value)?),
            OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(value)?),
            OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?),
            OutputFormat::Human => {
                // Bare strings read better without quotes
                match serde_json::to_value(value)? {
                    Value::String(s) => Ok(s),
                    other => Ok(serde_json::to_string_pretty(&other)?),
                }
            }
        }
    }
}

/// Output writer that handles different output formats and colors
pub struct OutputWriter {
    format: OutputFormat,
    use_color: bool,
    quiet: bool,
    writer: Box<dyn Write>,
}

impl OutputWriter {
    /// Create a writer on stdout
    pub fn new(format: OutputFormat, use_color: bool, quiet: bool) -> Self {
        Self::with_writer(format, use_color, quiet, Box::new(io::stdout()))
    }

    /// Create an output writer with a custom writer
    pub fn with_writer(
        format: OutputFormat,
        use_color: bool,
        quiet: bool,
        writer: Box<dyn Write>,
    ) -> Self {
        Self {
            format,
            use_color,
            quiet,
            writer,
        }
    }

    /// Write a line of output
    pub fn writeln(&mut self, content: &str) -> Result<()> {
        writeln!(self.writer, "{}", content)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Write an info message
    pub fn info(&mut self, message: &str) -> Result<()> {
        debug!("Output info: {}", message);

        if self.quiet || self.format != OutputFormat::Human {
            return Ok(());
        }

        if self.use_color {
            self.writeln(&format!("{} {}", "ℹ".blue(), message))
        } else {
            self.writeln(&format!("INFO: {}", message))
        }
    }

    /// Write a success message
    pub fn success(&mut self, message: &str) -> Result<()> {
        if self.quiet || self.format != OutputFormat::Human {
            return Ok(());
        }

        if self.use_color {
            self.writeln(&message.green().to_string())
        } else {
            self.writeln(message)
        }
    }

    /// Write serialized data in the configured format
    pub fn data<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let rendered = self.format.format(value)?;
        self.writeln(rendered.trim_end_matches('\n'))
    }

    /// Write the outcome of a call; `None` means the server sent no body
    pub fn response(&mut self, value: Option<&Value>) -> Result<()> {
        match value {
            Some(value) => self.data(value),
            None if self.format == OutputFormat::Human => self.success("No content"),
            None => self.data(&Value::Null),
        }
    }
}
