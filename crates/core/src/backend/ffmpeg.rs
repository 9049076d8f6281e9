//! FFmpeg-based engine implementation.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

use super::config::EmbeddedConfig;
use super::embedded::Engine;
use crate::error::{Result, SessionError};
use crate::media::MediaHandle;
use crate::validation::TrimRange;

/// Number of stderr lines kept in failure messages.
const STDERR_TAIL_LINES: usize = 8;

/// Versions resolved when the engine loads.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub ffmpeg_version: String,
    pub ffprobe_version: String,
}

/// Stream summary produced by ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeInfo {
    pub duration_secs: f64,
    pub format: String,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Engine that shells out to `ffmpeg` and `ffprobe`.
///
/// Payloads are written to a per-job scratch directory that is removed when
/// the job finishes or its future is dropped. Child processes are killed on
/// drop.
pub struct FfmpegEngine {
    config: EmbeddedConfig,
    toolchain: OnceLock<Toolchain>,
}

impl FfmpegEngine {
    /// Creates a new FFmpeg engine with the given configuration.
    pub fn new(config: EmbeddedConfig) -> Self {
        Self {
            config,
            toolchain: OnceLock::new(),
        }
    }

    /// Creates an engine with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EmbeddedConfig::default())
    }

    /// The resolved toolchain, once loaded.
    pub fn toolchain(&self) -> Option<&Toolchain> {
        self.toolchain.get()
    }

    fn require_toolchain(&self) -> Result<&Toolchain> {
        self.toolchain.get().ok_or(SessionError::BackendNotReady)
    }

    /// Runs `<binary> -version` and returns the first output line.
    async fn resolve_version(binary: &Path) -> Result<String> {
        let output = Command::new(binary)
            .arg("-version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                SessionError::unavailable(format!("Cannot run {}: {}", binary.display(), e))
            })?;

        if !output.status.success() {
            return Err(SessionError::unavailable(format!(
                "{} -version exited with code {:?}",
                binary.display(),
                output.status.code()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or("unknown").trim().to_string())
    }

    /// Creates a scratch directory for one job.
    fn job_dir(&self) -> Result<TempDir> {
        tempfile::Builder::new()
            .prefix("job-")
            .tempdir_in(&self.config.scratch_dir)
            .map_err(|e| {
                SessionError::processing_failed(format!(
                    "Failed to create scratch directory in {}: {}",
                    self.config.scratch_dir.display(),
                    e
                ))
            })
    }

    /// Writes a handle's payload into `dir`.
    async fn write_input(dir: &Path, index: usize, handle: &MediaHandle) -> Result<PathBuf> {
        let path = dir.join(format!("input-{:03}.{}", index, handle.extension()));
        let bytes = handle.require_bytes()?;
        tokio::fs::write(&path, &bytes).await.map_err(|e| {
            SessionError::processing_failed(format!("Failed to stage {}: {}", handle.file_name(), e))
        })?;
        Ok(path)
    }

    /// Builds the concat demuxer list file contents.
    fn concat_list(paths: &[PathBuf]) -> String {
        paths
            .iter()
            .map(|p| {
                // Single quotes inside a quoted path are written as '\''
                let escaped = p.to_string_lossy().replace('\'', r"'\''");
                format!("file '{}'\n", escaped)
            })
            .collect()
    }

    /// Codec arguments for stream copy or re-encode.
    fn codec_args(&self) -> Vec<String> {
        if self.config.reencode {
            [
                "-c:v", "libx264", "-preset", "veryfast", "-crf", "23", "-c:a", "aac", "-b:a",
                "192k",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect()
        } else {
            vec!["-c".to_string(), "copy".to_string()]
        }
    }

    /// Builds ffmpeg arguments for concatenation.
    fn build_concat_args(&self, list_path: &Path, output_path: &Path) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list_path.to_string_lossy().to_string(),
        ];
        args.extend(self.codec_args());
        self.push_common_args(&mut args, output_path);
        args
    }

    /// Builds ffmpeg arguments for cutting `range` out of the input.
    fn build_cut_args(&self, input_path: &Path, output_path: &Path, range: TrimRange) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-ss".to_string(),
            format!("{:.3}", range.start()),
            "-i".to_string(),
            input_path.to_string_lossy().to_string(),
            "-t".to_string(),
            format!("{:.3}", range.len_secs()),
        ];
        args.extend(self.codec_args());
        if !self.config.reencode {
            args.extend(["-avoid_negative_ts".to_string(), "make_zero".to_string()]);
        }
        self.push_common_args(&mut args, output_path);
        args
    }

    fn push_common_args(&self, args: &mut Vec<String>, output_path: &Path) {
        args.extend([
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
        ]);
        args.extend(self.config.extra_ffmpeg_args.iter().cloned());
        args.push(output_path.to_string_lossy().to_string());
    }

    /// Runs ffmpeg to completion, mapping failures to session errors.
    async fn run_ffmpeg(&self, args: &[String]) -> Result<()> {
        debug!(args = ?args, "Running ffmpeg");
        let output = Command::new(&self.config.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SessionError::unavailable(format!(
                        "FFmpeg not found at path: {}",
                        self.config.ffmpeg_path.display()
                    ))
                } else {
                    SessionError::processing_failed(format!("Failed to run ffmpeg: {}", e))
                }
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(Self::classify_failure(output.status.code(), &stderr))
    }

    /// Maps an ffmpeg failure to `UnsupportedMedia` or `ProcessingFailed`.
    fn classify_failure(code: Option<i32>, stderr: &str) -> SessionError {
        let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");

        if stderr.contains("Invalid data found when processing input")
            || stderr.contains("moov atom not found")
        {
            SessionError::unsupported(tail)
        } else {
            SessionError::processing_failed(format!(
                "FFmpeg exited with code {:?}: {}",
                code, tail
            ))
        }
    }

    /// Reads the job output back into memory.
    async fn read_output(path: &Path) -> Result<bytes::Bytes> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|_| SessionError::processing_failed("Output file not created"))?;
        if bytes.is_empty() {
            return Err(SessionError::processing_failed("Output file is empty"));
        }
        Ok(bytes.into())
    }

    /// Parses ffprobe JSON output into ProbeInfo.
    fn parse_probe_output(output: &str) -> Result<ProbeInfo> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: Option<ProbeFormat>,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            format_name: Option<String>,
            duration: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: String,
            codec_name: Option<String>,
            width: Option<u32>,
            height: Option<u32>,
            duration: Option<String>,
        }

        let probe: ProbeOutput = serde_json::from_str(output).map_err(|e| {
            SessionError::unsupported(format!("Failed to parse ffprobe output: {}", e))
        })?;
        let format = probe
            .format
            .ok_or_else(|| SessionError::unsupported("ffprobe reported no container format"))?;

        let video_stream = probe
            .streams
            .iter()
            .find(|s| s.codec_type == "video")
            .ok_or_else(|| SessionError::unsupported("no video stream"))?;
        let audio_stream = probe.streams.iter().find(|s| s.codec_type == "audio");

        let duration_secs = format
            .duration
            .as_deref()
            .or(video_stream.duration.as_deref())
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0)
            .ok_or_else(|| SessionError::unsupported("media has no usable duration"))?;

        let format_name = format
            .format_name
            .as_deref()
            .and_then(|f| f.split(',').next())
            .unwrap_or("unknown");

        Ok(ProbeInfo {
            duration_secs,
            format: format_name.to_string(),
            video_codec: video_stream.codec_name.clone(),
            audio_codec: audio_stream.and_then(|s| s.codec_name.clone()),
            width: video_stream.width,
            height: video_stream.height,
        })
    }

    /// Probes a file on disk.
    pub async fn probe_path(&self, path: &Path) -> Result<ProbeInfo> {
        self.require_toolchain()?;
        let output = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SessionError::unavailable(format!(
                        "FFprobe not found at path: {}",
                        self.config.ffprobe_path.display()
                    ))
                } else {
                    SessionError::processing_failed(format!("Failed to run ffprobe: {}", e))
                }
            })?;

        if !output.status.success() {
            return Err(SessionError::unsupported(format!(
                "ffprobe could not read {}",
                path.display()
            )));
        }

        Self::parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    /// Probes a handle's payload.
    pub async fn probe_info(&self, media: &MediaHandle) -> Result<ProbeInfo> {
        self.require_toolchain()?;
        let dir = self.job_dir()?;
        let input = Self::write_input(dir.path(), 0, media).await?;
        self.probe_path(&input).await
    }
}

#[async_trait]
impl Engine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn load(&self) -> Result<()> {
        if self.toolchain.get().is_some() {
            return Ok(());
        }

        let ffmpeg_version = Self::resolve_version(&self.config.ffmpeg_path).await?;
        let ffprobe_version = Self::resolve_version(&self.config.ffprobe_path).await?;

        tokio::fs::create_dir_all(&self.config.scratch_dir)
            .await
            .map_err(|e| {
                SessionError::unavailable(format!(
                    "Failed to create scratch directory {}: {}",
                    self.config.scratch_dir.display(),
                    e
                ))
            })?;

        info!(
            ffmpeg = %ffmpeg_version,
            ffprobe = %ffprobe_version,
            scratch_dir = %self.config.scratch_dir.display(),
            "FFmpeg toolchain resolved"
        );
        let _ = self.toolchain.set(Toolchain {
            ffmpeg_version,
            ffprobe_version,
        });
        Ok(())
    }

    async fn probe(&self, media: &MediaHandle) -> Result<f64> {
        Ok(self.probe_info(media).await?.duration_secs)
    }

    async fn concat(&self, inputs: &[MediaHandle]) -> Result<MediaHandle> {
        self.require_toolchain()?;
        let first = inputs.first().ok_or(SessionError::EmptyInput)?;
        let start = Instant::now();
        let dir = self.job_dir()?;

        let mut paths = Vec::with_capacity(inputs.len());
        for (index, handle) in inputs.iter().enumerate() {
            paths.push(Self::write_input(dir.path(), index, handle).await?);
        }

        let list_path = dir.path().join("concat.txt");
        tokio::fs::write(&list_path, Self::concat_list(&paths))
            .await
            .map_err(|e| {
                SessionError::processing_failed(format!("Failed to write concat list: {}", e))
            })?;

        let output_path = dir.path().join(format!("merged.{}", first.extension()));
        self.run_ffmpeg(&self.build_concat_args(&list_path, &output_path))
            .await?;

        let bytes = Self::read_output(&output_path).await?;
        info!(
            inputs = inputs.len(),
            output_bytes = bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Concatenation finished"
        );
        Ok(MediaHandle::new(
            format!("merged.{}", first.extension()),
            first.mime_type(),
            bytes,
        ))
    }

    async fn cut(&self, input: &MediaHandle, range: TrimRange) -> Result<MediaHandle> {
        self.require_toolchain()?;
        let start = Instant::now();
        let dir = self.job_dir()?;

        let input_path = Self::write_input(dir.path(), 0, input).await?;
        let output_path = dir.path().join(format!("trimmed.{}", input.extension()));
        self.run_ffmpeg(&self.build_cut_args(&input_path, &output_path, range))
            .await?;

        let bytes = Self::read_output(&output_path).await?;
        info!(
            output_bytes = bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Cut finished"
        );
        Ok(MediaHandle::new(
            format!("trimmed.{}", input.extension()),
            input.mime_type(),
            bytes,
        ))
    }
}
