//! `yt-dlp` subprocess backend.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use super::backend::{ExtractBackend, ExtractClient, ExtractError, ExtractOptions, ExtractedInfo};

/// stderr fragments that mean "nothing playable here" rather than a fault.
const EXPECTED_MARKERS: &[&str] = &[
    "Unsupported URL",
    "Video unavailable",
    "Private video",
    "This video is not available",
    "HTTP Error 404",
    "No video formats found",
    "Requested format is not available",
];

pub(crate) struct YtDlpBackend {
    program: PathBuf,
}

impl YtDlpBackend {
    pub(crate) fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ExtractBackend for YtDlpBackend {
    fn client(&self, options: &ExtractOptions) -> Arc<dyn ExtractClient> {
        Arc::new(YtDlpClient {
            program: self.program.clone(),
            args: option_args(options),
        })
    }

    fn probe(&self) -> Result<String, ExtractError> {
        let output = Command::new(&self.program)
            .arg("--version")
            .output()
            .map_err(|e| ExtractError::Unexpected(format!("spawn {}: {e}", self.program.display())))?;
        if !output.status.success() {
            return Err(ExtractError::Unexpected(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

struct YtDlpClient {
    program: PathBuf,
    args: Vec<String>,
}

impl ExtractClient for YtDlpClient {
    fn extract(&self, reference: &str) -> Result<ExtractedInfo, ExtractError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--")
            .arg(reference)
            .output()
            .map_err(|e| ExtractError::Unexpected(format!("spawn {}: {e}", self.program.display())))?;
        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }
        parse_dump(&output.stdout)
    }
}

fn option_args(options: &ExtractOptions) -> Vec<String> {
    let mut args = vec!["-J".to_string(), "--quiet".to_string(), "--no-warnings".to_string()];
    if let Some(format) = options.format.as_ref() {
        args.push("-f".to_string());
        args.push(format.clone());
    }
    if options.flat_playlist {
        args.push("--flat-playlist".to_string());
    }
    if options.no_playlist {
        args.push("--no-playlist".to_string());
    }
    if let Some(search) = options.default_search.as_ref() {
        args.push("--default-search".to_string());
        args.push(search.clone());
    }
    if let Some(cookies) = options.cookie_file.as_ref() {
        args.push("--cookies".to_string());
        args.push(cookies.display().to_string());
    }
    args
}

fn classify_failure(stderr: &str) -> ExtractError {
    let message = stderr
        .lines()
        .rev()
        .find(|line| line.contains("ERROR"))
        .unwrap_or(stderr)
        .trim()
        .to_string();
    if EXPECTED_MARKERS.iter().any(|marker| stderr.contains(marker)) {
        ExtractError::Expected(message)
    } else {
        ExtractError::Unexpected(message)
    }
}

fn parse_dump(stdout: &[u8]) -> Result<ExtractedInfo, ExtractError> {
    let parsed: Option<ExtractedInfo> = serde_json::from_slice(stdout)
        .map_err(|e| ExtractError::Unexpected(format!("invalid yt-dlp output: {e}")))?;
    parsed.ok_or_else(|| ExtractError::Expected("no result".to_string()))
}
