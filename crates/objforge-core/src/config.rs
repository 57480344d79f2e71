//! Gateway configuration.
//!
//! Storage folders, engine commands and the fixed quality and model-size
//! parameters live here and are handed to [`crate::gateway::Gateway`] at
//! construction time.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default quality factor passed to the engine.
pub const DEFAULT_QUALITY_FACTOR: &str = "1";
/// Default model-size tag passed to the engine.
pub const DEFAULT_MODEL_SIZE: &str = "l";
/// Default extension of derived artifacts.
pub const DEFAULT_OUTPUT_EXTENSION: &str = "obj";
/// Default cap on captured stdout/stderr kept per invocation.
pub const DEFAULT_MAX_DIAGNOSTIC_BYTES: usize = 50_000;

/// Errors raised by [`GatewayConfig::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{role} engine program must not be empty")]
    EmptyProgram { role: &'static str },

    #[error("invalid output extension {0:?}")]
    InvalidExtension(String),

    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("upload and output directories must differ ({})", .0.display())]
    SharedDirectory(PathBuf),
}

/// How to launch a reconstruction engine.
///
/// `program` and `args` form the fixed prefix (e.g. `python3 process_3d.py`);
/// contract arguments are appended after them on every invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl EngineCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Split a whitespace-separated command line such as `"python3 process_3d.py"`.
    ///
    /// Returns `None` for a blank string. No shell quoting is interpreted.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self {
            program: program.to_string(),
            args: parts.map(str::to_string).collect(),
        })
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Configuration injected into the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Directory holding raw submissions (`{timestamp}_{name}`).
    pub upload_dir: PathBuf,
    /// Directory holding derived artifacts (`{base}.{output_extension}`).
    pub output_dir: PathBuf,
    /// Model directory handed to the engine verbatim.
    pub model_dir: PathBuf,
    /// Engine run at submit time (cheap validation / preview pass).
    pub submit_engine: EngineCommand,
    /// Engine run at derive time; receives the output path as its last argument.
    pub derive_engine: EngineCommand,
    pub quality_factor: String,
    pub model_size: String,
    /// Extension of derived artifacts, without the leading dot.
    pub output_extension: String,
    /// Kill the engine after this many milliseconds. `None` waits forever.
    pub worker_timeout_ms: Option<u64>,
    pub max_diagnostic_bytes: usize,
}

impl GatewayConfig {
    /// Conventional layout relative to `root`:
    /// `uploads/`, `obj_files/`, `models/`, `test.py` and `process_3d.py`.
    pub fn rooted(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            upload_dir: root.join("uploads"),
            output_dir: root.join("obj_files"),
            model_dir: root.join("models"),
            submit_engine: EngineCommand::new("python3")
                .arg(root.join("test.py").to_string_lossy()),
            derive_engine: EngineCommand::new("python3")
                .arg(root.join("process_3d.py").to_string_lossy()),
            quality_factor: DEFAULT_QUALITY_FACTOR.to_string(),
            model_size: DEFAULT_MODEL_SIZE.to_string(),
            output_extension: DEFAULT_OUTPUT_EXTENSION.to_string(),
            worker_timeout_ms: None,
            max_diagnostic_bytes: DEFAULT_MAX_DIAGNOSTIC_BYTES,
        }
    }

    pub fn with_submit_engine(mut self, engine: EngineCommand) -> Self {
        self.submit_engine = engine;
        self
    }

    pub fn with_derive_engine(mut self, engine: EngineCommand) -> Self {
        self.derive_engine = engine;
        self
    }

    pub fn with_worker_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.worker_timeout_ms = timeout_ms;
        self
    }

    /// Check invariants that would otherwise surface as confusing runtime failures.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.submit_engine.program.trim().is_empty() {
            return Err(ConfigError::EmptyProgram { role: "submit" });
        }
        if self.derive_engine.program.trim().is_empty() {
            return Err(ConfigError::EmptyProgram { role: "derive" });
        }
        let ext = &self.output_extension;
        if ext.is_empty() || ext.starts_with('.') || ext.contains(['/', '\\', '\0']) {
            return Err(ConfigError::InvalidExtension(ext.clone()));
        }
        if self.quality_factor.is_empty() {
            return Err(ConfigError::EmptyField {
                field: "quality_factor",
            });
        }
        if self.model_size.is_empty() {
            return Err(ConfigError::EmptyField { field: "model_size" });
        }
        if self.upload_dir == self.output_dir {
            return Err(ConfigError::SharedDirectory(self.upload_dir.clone()));
        }
        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::rooted(".")
    }
}
