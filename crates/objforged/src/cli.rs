//! Command-line and environment configuration for the daemon.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;
use objforge_core::config::{
    DEFAULT_MAX_DIAGNOSTIC_BYTES, DEFAULT_MODEL_SIZE, DEFAULT_OUTPUT_EXTENSION,
    DEFAULT_QUALITY_FACTOR,
};
use objforge_core::jobs::DEFAULT_FINISHED_RETENTION;
use objforge_core::{EngineCommand, GatewayConfig};

/// 64 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "objforged")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Image-to-3D job gateway daemon", long_about = None)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "OBJFORGE_BIND", default_value = "127.0.0.1:5000")]
    pub bind: SocketAddr,

    /// Base directory for the default storage layout and engine scripts
    #[arg(long, env = "OBJFORGE_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Directory for uploaded submissions (default: <root>/uploads)
    #[arg(long, env = "OBJFORGE_UPLOAD_DIR")]
    pub upload_dir: Option<PathBuf>,

    /// Directory for derived artifacts (default: <root>/obj_files)
    #[arg(long, env = "OBJFORGE_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Model directory passed to the engine (default: <root>/models)
    #[arg(long, env = "OBJFORGE_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,

    /// Engine command run on upload (default: python3 <root>/test.py)
    #[arg(long, env = "OBJFORGE_SUBMIT_ENGINE")]
    pub submit_engine: Option<String>,

    /// Engine command run on derive (default: python3 <root>/process_3d.py)
    #[arg(long, env = "OBJFORGE_DERIVE_ENGINE")]
    pub derive_engine: Option<String>,

    #[arg(long, env = "OBJFORGE_QUALITY_FACTOR", default_value = DEFAULT_QUALITY_FACTOR)]
    pub quality_factor: String,

    #[arg(long, env = "OBJFORGE_MODEL_SIZE", default_value = DEFAULT_MODEL_SIZE)]
    pub model_size: String,

    /// Extension of derived artifacts, without the dot
    #[arg(long, env = "OBJFORGE_OUTPUT_EXTENSION", default_value = DEFAULT_OUTPUT_EXTENSION)]
    pub output_extension: String,

    /// Kill engine runs after this many milliseconds (default: no limit)
    #[arg(long, env = "OBJFORGE_WORKER_TIMEOUT_MS")]
    pub worker_timeout_ms: Option<u64>,

    /// Bytes of engine stderr kept in error details
    #[arg(long, env = "OBJFORGE_MAX_DIAGNOSTIC_BYTES", default_value_t = DEFAULT_MAX_DIAGNOSTIC_BYTES)]
    pub max_diagnostic_bytes: usize,

    /// Reject upload bodies larger than this
    #[arg(long, env = "OBJFORGE_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: u64,

    /// Concurrent workers for queued derive jobs
    #[arg(long, env = "OBJFORGE_JOB_WORKERS", default_value_t = 2)]
    pub job_workers: usize,

    /// Queued derive jobs accepted before returning 503
    #[arg(long, env = "OBJFORGE_QUEUE_CAPACITY", default_value_t = 64)]
    pub queue_capacity: usize,

    /// Finished job records kept for status polling
    #[arg(long, env = "OBJFORGE_JOB_RETENTION", default_value_t = DEFAULT_FINISHED_RETENTION)]
    pub job_retention: usize,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Layer explicit overrides on top of the `--root` layout.
    pub fn gateway_config(&self) -> Result<GatewayConfig> {
        let mut config = GatewayConfig::rooted(&self.root);
        if let Some(dir) = &self.upload_dir {
            config.upload_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        if let Some(line) = &self.submit_engine {
            config.submit_engine = parse_engine("submit", line)?;
        }
        if let Some(line) = &self.derive_engine {
            config.derive_engine = parse_engine("derive", line)?;
        }
        config.quality_factor = self.quality_factor.clone();
        config.model_size = self.model_size.clone();
        config.output_extension = self.output_extension.clone();
        config.worker_timeout_ms = self.worker_timeout_ms;
        config.max_diagnostic_bytes = self.max_diagnostic_bytes;
        config.validate()?;
        Ok(config)
    }
}

fn parse_engine(role: &str, line: &str) -> Result<EngineCommand> {
    EngineCommand::parse(line).ok_or_else(|| anyhow!("{role} engine command is empty"))
}
