//! Encoder sinks: where composited frames go.
//!
//! [`FfmpegSink`] streams raw RGBA frames into an `ffmpeg` child process
//! over stdin and lets it handle encoding and muxing.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use image::RgbaImage;
use qcut_common::error::{QcutError, QcutResult};
use qcut_timeline::{ExportFormat, ExportQuality, ExportSettings};
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

/// Container parameters handed to a sink before the first frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSettings {
    pub format: ExportFormat,
    pub quality: ExportQuality,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

impl From<&ExportSettings> for ContainerSettings {
    fn from(settings: &ExportSettings) -> Self {
        Self {
            format: settings.format,
            quality: settings.quality,
            fps: settings.fps,
            width: settings.width,
            height: settings.height,
        }
    }
}

/// What a sink produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedOutput {
    pub path: Option<PathBuf>,
    pub frames: u64,
    pub bytes: Option<u64>,
}

/// Consumer of composited frames, in strictly increasing frame order.
#[async_trait::async_trait]
pub trait EncoderSink: Send {
    async fn begin(&mut self, settings: &ContainerSettings) -> QcutResult<()>;

    async fn accept_frame(&mut self, index: u64, frame: &RgbaImage) -> QcutResult<()>;

    /// Flush and close. Called once after the last frame.
    async fn finish(&mut self) -> QcutResult<EncodedOutput>;

    /// Discard partial output after a failure or cancellation.
    async fn abort(&mut self) {}
}

/// Sink that pipes frames into `ffmpeg`.
pub struct FfmpegSink {
    output_path: PathBuf,
    binary: String,
    settings: Option<ContainerSettings>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_task: Option<JoinHandle<String>>,
    next_frame: u64,
}

impl FfmpegSink {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            binary: "ffmpeg".to_string(),
            settings: None,
            child: None,
            stdin: None,
            stderr_task: None,
            next_frame: 0,
        }
    }

    /// Use a specific ffmpeg executable.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Whether the configured binary is on `PATH`.
    pub fn is_available(&self) -> bool {
        command_exists(&self.binary)
    }

    /// Full ffmpeg argument list for `settings`.
    pub fn build_args(&self, settings: &ContainerSettings) -> Vec<String> {
        let mut args: Vec<String> = [
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push("-s".to_string());
        args.push(format!("{}x{}", settings.width, settings.height));
        args.push("-r".to_string());
        args.push(settings.fps.to_string());
        args.push("-i".to_string());
        args.push("-".to_string());
        args.push("-an".to_string());
        args.extend(codec_args(settings));
        args.push(self.output_path.display().to_string());
        args
    }

    async fn collect_stderr(&mut self) -> String {
        match self.stderr_task.take() {
            Some(task) => task
                .await
                .unwrap_or_else(|_| "<failed to join stderr reader>".to_string()),
            None => String::new(),
        }
    }
}

#[async_trait::async_trait]
impl EncoderSink for FfmpegSink {
    async fn begin(&mut self, settings: &ContainerSettings) -> QcutResult<()> {
        if self.child.is_some() {
            return Err(QcutError::encode("encoder already started"));
        }
        if let Some(parent) = self.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args = self.build_args(settings);
        tracing::debug!(args = ?args, "Running ffmpeg");
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| QcutError::encode(format!("Failed to start {}: {e}", self.binary)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| QcutError::encode("Failed to capture ffmpeg stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| QcutError::encode("Failed to capture ffmpeg stderr"))?;

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        self.stderr_task = Some(tokio::spawn(async move {
            let mut output = String::new();
            match stderr.read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        }));

        tracing::info!(
            pid = child.id(),
            output = %self.output_path.display(),
            format = %settings.format,
            "ffmpeg process started"
        );
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.settings = Some(settings.clone());
        self.next_frame = 0;
        Ok(())
    }

    async fn accept_frame(&mut self, index: u64, frame: &RgbaImage) -> QcutResult<()> {
        let settings = self
            .settings
            .as_ref()
            .ok_or_else(|| QcutError::encode("accept_frame before begin"))?;
        if index != self.next_frame {
            return Err(QcutError::encode(format!(
                "frame {index} out of order (expected {})",
                self.next_frame
            )));
        }
        if frame.width() != settings.width || frame.height() != settings.height {
            return Err(QcutError::encode(format!(
                "frame is {}x{}, expected {}x{}",
                frame.width(),
                frame.height(),
                settings.width,
                settings.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| QcutError::encode("encoder input already closed"))?;
        let written = stdin.write_all(frame.as_raw()).await;
        if let Err(e) = written {
            let stderr = self.collect_stderr().await;
            return Err(QcutError::encode(format!(
                "ffmpeg stopped accepting frames: {e}: {}",
                stderr.trim()
            )));
        }
        self.next_frame += 1;
        Ok(())
    }

    async fn finish(&mut self) -> QcutResult<EncodedOutput> {
        // Closing stdin signals end of input.
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush().await?;
        }
        let mut child = self
            .child
            .take()
            .ok_or_else(|| QcutError::encode("finish before begin"))?;
        let status = child
            .wait()
            .await
            .map_err(|e| QcutError::encode(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr = self.collect_stderr().await;

        if !status.success() {
            return Err(QcutError::encode(format!(
                "ffmpeg export failed (status {status}): {}",
                stderr.trim()
            )));
        }

        let bytes = tokio::fs::metadata(&self.output_path)
            .await
            .ok()
            .map(|m| m.len());
        tracing::info!(
            output = %self.output_path.display(),
            frames = self.next_frame,
            bytes = bytes.unwrap_or(0),
            "Encoding finished"
        );
        Ok(EncodedOutput {
            path: Some(self.output_path.clone()),
            frames: self.next_frame,
            bytes,
        })
    }

    async fn abort(&mut self) {
        self.stdin.take();
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "Failed to kill ffmpeg");
            }
        }
        self.collect_stderr().await;
        if tokio::fs::remove_file(&self.output_path).await.is_ok() {
            tracing::debug!(output = %self.output_path.display(), "Removed partial output");
        }
    }
}

/// Codec arguments per container format and quality preset.
pub fn codec_args(settings: &ContainerSettings) -> Vec<String> {
    let (preset, crf_h264, crf_h265, crf_vp9) = match settings.quality {
        ExportQuality::Low => ("veryfast", 28, 32, 40),
        ExportQuality::Medium => ("medium", 23, 28, 33),
        ExportQuality::High => ("slow", 18, 22, 24),
    };
    // yuv420p needs even dimensions.
    let even = "scale=trunc(iw/2)*2:trunc(ih/2)*2".to_string();

    let args: Vec<&str> = match settings.format {
        ExportFormat::Mp4H264 => vec![
            "-c:v", "libx264", "-preset", preset, "-profile:v", "high", "-pix_fmt", "yuv420p",
            "-movflags", "+faststart",
        ],
        ExportFormat::Mp4H265 => vec![
            "-c:v", "libx265", "-preset", preset, "-pix_fmt", "yuv420p", "-tag:v", "hvc1",
            "-movflags", "+faststart",
        ],
        ExportFormat::Webm => vec!["-c:v", "libvpx-vp9", "-b:v", "0", "-pix_fmt", "yuv420p"],
        ExportFormat::Gif => {
            let gif_fps = settings.fps.clamp(1, 15);
            return vec![
                "-vf".to_string(),
                format!("fps={gif_fps},split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse"),
            ];
        }
    };

    let mut args: Vec<String> = args.into_iter().map(str::to_string).collect();
    let crf = match settings.format {
        ExportFormat::Mp4H264 => crf_h264,
        ExportFormat::Mp4H265 => crf_h265,
        _ => crf_vp9,
    };
    args.push("-crf".to_string());
    args.push(crf.to_string());
    args.push("-vf".to_string());
    args.push(even);
    args
}

/// Whether `binary` resolves on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    std::process::Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
