use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default maximum size of a single input file, in bytes.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1_000_000;

/// Output formats understood by the external compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Html,
    Json,
    Xml,
}

impl OutputFormat {
    /// Every format, in the order the UI offers them.
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Markdown,
        OutputFormat::Html,
        OutputFormat::Json,
        OutputFormat::Xml,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Html => "html",
            OutputFormat::Json => "json",
            OutputFormat::Xml => "xml",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown output format: {0} (expected markdown, html, json or xml)")]
pub struct UnknownFormat(pub String);

impl FromStr for OutputFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        OutputFormat::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownFormat(s.to_string()))
    }
}

/// Parameters for one compilation attempt.
///
/// A request is built from the current UI field values at launch time and is never
/// mutated afterwards; the worker consumes it once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    project_path: Utf8PathBuf,
    output_destination: Utf8PathBuf,
    output_format: OutputFormat,
    max_size_bytes: u64,
}

impl TaskRequest {
    pub fn new(
        project_path: impl Into<Utf8PathBuf>,
        output_destination: impl Into<Utf8PathBuf>,
        output_format: OutputFormat,
        max_size_bytes: u64,
    ) -> Self {
        Self {
            project_path: project_path.into(),
            output_destination: output_destination.into(),
            output_format,
            max_size_bytes,
        }
    }

    pub fn project_path(&self) -> &Utf8Path {
        &self.project_path
    }

    pub fn output_destination(&self) -> &Utf8Path {
        &self.output_destination
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// True when the project path is empty or whitespace only.
    pub fn is_missing_project_path(&self) -> bool {
        self.project_path.as_str().trim().is_empty()
    }

    /// Resolve where the artifact will be written.
    ///
    /// Absolute destinations are used as is, relative ones are placed inside the
    /// project directory. An empty destination resolves to `None`.
    pub fn resolved_output(&self) -> Option<Utf8PathBuf> {
        resolve_output(self.project_path.as_str(), self.output_destination.as_str())
    }

    /// Lines the worker echoes before invoking the compiler.
    pub fn describe(&self) -> Vec<String> {
        let output = self
            .resolved_output()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "(not set)".to_string());

        vec![
            "Starting compilation...".to_string(),
            format!("Project Path: {}", self.project_path),
            format!("Output File: {}", output),
            format!("Output Format: {}", self.output_format),
            format!("Max File Size: {} bytes", self.max_size_bytes),
        ]
    }
}

fn resolve_output(project_path: &str, output_file: &str) -> Option<Utf8PathBuf> {
    let output_file = output_file.trim();
    if output_file.is_empty() {
        return None;
    }

    let output = Utf8Path::new(output_file);
    if output.is_absolute() {
        Some(output.to_path_buf())
    } else {
        Some(Utf8Path::new(project_path.trim()).join(output))
    }
}

/// Text for the "full path" label shown under the path fields.
///
/// Empty until both the project path and the output file are filled in.
pub fn full_path_label(project_path: &str, output_file: &str) -> String {
    if project_path.trim().is_empty() {
        return String::new();
    }

    match resolve_output(project_path, output_file) {
        Some(path) => format!("Full path: {}", path),
        None => String::new(),
    }
}
