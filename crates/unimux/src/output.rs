//! Output formatting: JSON, compact JSON, YAML.
//!
//! Every response is already normalized to `{data, meta}`, so rendering is
//! a straight serde pass in the format selected by `--output`.

use std::io::{self, Write};

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Render any serde-serializable value in the chosen format.
pub fn render<T: serde::Serialize + ?Sized>(
    format: OutputFormat,
    data: &T,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(data)?),
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(data).map_err(|e| CliError::Render(e.to_string()))?;
            Ok(yaml.trim_end().to_owned())
        }
    }
}

/// Print rendered output to stdout.
pub fn print_output(output: &str) {
    if output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}
