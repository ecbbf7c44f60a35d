//! Compiler-facing support for lynx
//!
//! This crate owns everything that touches the C/C++ compiler during
//! rebuild planning: the invocation that runs the preprocessor in
//! include-listing mode, the parser for the report it prints, and the
//! [`IncludeScanner`] capability that lets tests substitute a scripted
//! compiler for the real one.
//!
//! Nothing here interprets include syntax. The compiler's report is
//! treated as ground truth about what a source file pulled in.

pub mod include_report;

use std::io;
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Errors from running an include scan
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Compiler configuration handed down from the build driver.
///
/// The flag lists are opaque to lynx: they are forwarded to the include
/// scan exactly as the driver would pass them to an ordinary compile, so
/// the preprocessor sees the same include paths and defines.
#[derive(Clone, Debug, Default)]
pub struct CompilerConfig {
    /// Path to the compiler executable
    pub compiler: Utf8PathBuf,
    /// Flags for ordinary object compilation (carried for the driver,
    /// not used by the scan itself)
    pub base_flags: Vec<String>,
    /// Preprocessor flags (include paths, defines)
    pub preprocessor_flags: Vec<String>,
    /// Extra trailing flags
    pub extra_flags: Vec<String>,
}

impl CompilerConfig {
    pub fn new(compiler: impl Into<Utf8PathBuf>) -> Self {
        Self {
            compiler: compiler.into(),
            ..Default::default()
        }
    }

    /// Build the invocation that runs the preprocessor in include-listing
    /// mode for one source file.
    ///
    /// No object file is produced; the preprocessed output is discarded
    /// and the report is the only output of interest.
    pub fn scan_invocation(&self, source: &Utf8Path) -> ScanInvocation {
        let mut args = vec![
            "/E".to_string(),
            source.to_string(),
            "/showIncludes".to_string(),
        ];
        args.extend(self.preprocessor_flags.iter().cloned());
        args.extend(self.extra_flags.iter().cloned());

        ScanInvocation {
            program: self.compiler.clone(),
            args,
        }
    }
}

/// A concrete command line for one include scan
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanInvocation {
    /// Compiler executable
    pub program: Utf8PathBuf,
    /// Arguments, preprocess-only flag first
    pub args: Vec<String>,
}

/// Captured output of an include scan
#[derive(Clone, Debug, Default)]
pub struct ScanOutput {
    /// Exit code; -1 when the process died without one
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ScanOutput {
    /// Lines of the report, stdout first, then stderr.
    ///
    /// The compiler prints the report on stderr while the preprocessed
    /// source goes to stdout, but some wrappers merge the streams, so
    /// both are scanned.
    pub fn report_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().chain(self.stderr.lines())
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Capability for running an include scan.
///
/// The tracker holds a boxed scanner so staleness logic can be exercised
/// against scripted reports without spawning anything;
/// [`ProcessScanner`] is the real implementation.
pub trait IncludeScanner {
    fn scan(&self, invocation: &ScanInvocation) -> Result<ScanOutput, ScanError>;
}

/// Runs the scan as a child process, capturing both streams.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessScanner;

impl IncludeScanner for ProcessScanner {
    fn scan(&self, invocation: &ScanInvocation) -> Result<ScanOutput, ScanError> {
        tracing::debug!(
            program = %invocation.program,
            args = ?invocation.args,
            "running include scan"
        );

        let output = Command::new(invocation.program.as_str())
            .args(&invocation.args)
            .output()
            .map_err(|source| ScanError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        Ok(ScanOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests;
