use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::Context;
use glraw_driver::{EncoderCommand, PipelineConfig};

const ENCODER_BINARY: &str = "glraw-cmd";
const DEFAULT_WORKING_DIRECTORY: &str = "/opt/dependencies/glraw/";
const DEFAULT_RESULT_DIR: &str = "/data/results";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Process-wide settings, read once at startup and passed down explicitly.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    listen_addr: SocketAddr,
    glraw_directory: Option<PathBuf>,
    launcher: Vec<String>,
    working_dir: PathBuf,
    result_dir: PathBuf,
    tmp_dir: PathBuf,
    timeout: Option<Duration>,
    keep_artifacts: bool,
    max_upload_bytes: usize,
}

impl ServiceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source. Empty values count as
    /// unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_addr = parse_var(&get, "LISTEN_ADDR")?
            .map_or_else(|| SocketAddr::from_str(DEFAULT_LISTEN_ADDR), Ok)?;
        let timeout = parse_var::<u64>(&get, "GLRAW_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let keep_artifacts = match get("KEEP_ARTIFACTS") {
            Some(value) => parse_flag(&value).context("KEEP_ARTIFACTS")?,
            None => false,
        };

        Ok(Self {
            listen_addr,
            glraw_directory: get("GLRAW_DIRECTORY").map(PathBuf::from),
            launcher: get("GLRAW_LAUNCHER")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            working_dir: get("WORKING_DIRECTORY")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKING_DIRECTORY)),
            result_dir: get("RESULT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RESULT_DIR)),
            tmp_dir: get("TMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            timeout,
            keep_artifacts,
            max_upload_bytes: parse_var(&get, "MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// `glraw-cmd` inside `GLRAW_DIRECTORY`, or bare `glraw-cmd` resolved
    /// through `PATH`.
    pub fn encoder_program(&self) -> PathBuf {
        match &self.glraw_directory {
            Some(dir) => dir.join(ENCODER_BINARY),
            None => PathBuf::from(ENCODER_BINARY),
        }
    }

    pub fn result_dir(&self) -> &Path {
        &self.result_dir
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            encoder: EncoderCommand::new(self.encoder_program(), &self.working_dir)
                .with_launcher(self.launcher.iter().map(String::as_str))
                .with_timeout(self.timeout),
            result_dir: self.result_dir.clone(),
            staging_dir: self.tmp_dir.clone(),
            keep_artifacts: self.keep_artifacts,
        }
    }

    /// Creates the result and staging directories if they are missing.
    pub fn prepare_directories(&self) -> anyhow::Result<()> {
        for dir in [&self.result_dir, &self.tmp_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating directory {}", dir.display()))?;
        }
        if !self.working_dir.is_dir() {
            log::warn!(
                "encoder working directory {} does not exist, conversions will fail",
                self.working_dir.display()
            );
        }
        Ok(())
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .with_context(|| format!("invalid {}: '{}'", key, value))
        })
        .transpose()
}

fn parse_flag(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("'{}' is not a boolean", other),
    }
}
