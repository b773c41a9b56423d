use crate::config::TranscoderConfig;
use crate::error::AdapterError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Converts a recorded-audio file of any container/codec into a mono,
/// 16 kHz, signed 16-bit PCM WAV file.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), AdapterError>;
}

/// Transcoder backed by an `ffmpeg` subprocess.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary_path: PathBuf,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(binary_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary_path: binary_path.into(),
            timeout,
        }
    }

    pub fn from_config(config: &TranscoderConfig) -> Self {
        Self::new(&config.ffmpeg_binary, config.timeout())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), AdapterError> {
        let mut command = Command::new(&self.binary_path);
        command
            .arg("-nostdin")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-vn")
            .arg("-ac")
            .arg("1")
            .arg("-ar")
            .arg("16000")
            .arg("-acodec")
            .arg("pcm_s16le")
            .arg("-f")
            .arg("wav")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| AdapterError::Process(format!("failed to spawn ffmpeg: {}", e)))?;

        let output_status = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AdapterError::Timeout(self.timeout))?
            .map_err(|e| AdapterError::Process(format!("failed to wait for ffmpeg: {}", e)))?;

        if !output_status.status.success() {
            let stderr = String::from_utf8_lossy(&output_status.stderr);
            return Err(AdapterError::Process(format!(
                "ffmpeg exited with {}: {}",
                output_status.status,
                stderr.trim()
            )));
        }

        tracing::debug!(input = %input.display(), output = %output.display(), "transcoded audio");
        Ok(())
    }
}
