//! ffmpeg / ffprobe invocations.
//!
//! Every operation runs one external process to completion; a non-zero exit
//! becomes `MediaError::ToolFailed` with the tail of the tool's stderr.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::MediaError;

pub const OUTPUT_FPS: u32 = 30;
pub const MUX_TAIL_SECONDS: f64 = 2.0;
const OLD_FILM_OPACITY: f64 = 0.25;
const VINTAGE_CRF: u8 = 23;
const RECOGNIZER_SAMPLE_RATE: u32 = 16000;
const STDERR_TAIL_LINES: usize = 20;

#[async_trait]
pub trait MediaTool: Send + Sync {
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError>;

    /// Concatenates the video streams of `clips`, in order, at 30fps.
    async fn merge_clips(&self, clips: &[PathBuf], output: &Path) -> Result<(), MediaError>;

    /// Lays `audio` over `video`, both trimmed to `narration + 2s`.
    async fn mux_audio(
        &self,
        video: &Path,
        audio: &Path,
        narration_seconds: f64,
        output: &Path,
    ) -> Result<(), MediaError>;

    async fn burn_subtitles(
        &self,
        video: &Path,
        subtitles: &Path,
        output: &Path,
    ) -> Result<(), MediaError>;

    async fn grayscale(&self, input: &Path, output: &Path) -> Result<(), MediaError>;

    /// Frame-rate drop, aged curves, then the old-film overlay.
    async fn vintage(&self, input: &Path, output: &Path) -> Result<(), MediaError>;

    /// 16kHz mono signed 16-bit WAV for the recognizer.
    async fn to_recognizer_pcm(&self, input: &Path, output: &Path) -> Result<(), MediaError>;
}

pub fn concat_filter(inputs: usize) -> String {
    let mut filter: String = (0..inputs).map(|i| format!("[{}:v]", i)).collect();
    filter.push_str(&format!("concat=n={}:v=1:a=0[outv]", inputs));
    filter
}

pub fn mux_filter(narration_seconds: f64) -> String {
    let keep = narration_seconds + MUX_TAIL_SECONDS;
    format!(
        "[0:v]trim=0:{keep},setpts=PTS-STARTPTS[v];[1:a]atrim=0:{keep},asetpts=PTS-STARTPTS[a]"
    )
}

pub fn old_film_filter() -> String {
    format!(
        "[0]format=rgba,colorchannelmixer=aa={}[fg];[1][fg]overlay[out]",
        OLD_FILM_OPACITY
    )
}

/// `subtitles=` takes a filter argument, so `:` `\` and `'` need escaping.
pub fn subtitles_filter(srt: &Path) -> String {
    let raw = srt.to_string_lossy();
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | ':' | '\'') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    format!("subtitles={}", escaped)
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

pub struct FfmpegTool {
    ffmpeg: String,
    ffprobe: String,
    old_film_texture: PathBuf,
    vintage_fps: u32,
}

impl FfmpegTool {
    pub fn new(config: &Config) -> Self {
        Self {
            ffmpeg: config.ffmpeg_bin.clone(),
            ffprobe: config.ffprobe_bin.clone(),
            old_film_texture: config.old_film_texture.clone(),
            vintage_fps: config.vintage_fps,
        }
    }

    async fn ffmpeg(&self, args: Vec<OsString>) -> Result<(), MediaError> {
        debug!("Running {} {:?}", self.ffmpeg, args);
        let output = Command::new(&self.ffmpeg)
            .args(["-y", "-hide_banner", "-loglevel", "error"])
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;
        if !output.status.success() {
            return Err(MediaError::ToolFailed {
                tool: self.ffmpeg.clone(),
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            });
        }
        Ok(())
    }
}

fn os(args: &[&str]) -> Vec<OsString> {
    args.iter().map(OsString::from).collect()
}

#[async_trait]
impl MediaTool for FfmpegTool {
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError> {
        let output = Command::new(&self.ffprobe)
            .arg("-i")
            .arg(path)
            .args([
                "-show_entries",
                "format=duration",
                "-v",
                "quiet",
                "-of",
                "csv=p=0",
            ])
            .stdin(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            return Err(MediaError::ToolFailed {
                tool: self.ffprobe.clone(),
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            });
        }
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        text.parse::<f64>()
            .ok()
            .filter(|d| d.is_finite() && *d >= 0.0)
            .ok_or(MediaError::Probe {
                path: path.to_path_buf(),
                output: text,
            })
    }

    async fn merge_clips(&self, clips: &[PathBuf], output: &Path) -> Result<(), MediaError> {
        if clips.is_empty() {
            return Err(MediaError::NoClips);
        }
        info!("Merging {} clips into {}", clips.len(), output.display());
        let mut args = Vec::new();
        for clip in clips {
            args.push(OsString::from("-i"));
            args.push(clip.as_os_str().to_owned());
        }
        args.extend(os(&["-filter_complex", &concat_filter(clips.len())]));
        args.extend(os(&["-map", "[outv]", "-r", &OUTPUT_FPS.to_string()]));
        args.push(output.as_os_str().to_owned());
        self.ffmpeg(args).await?;
        info!("Clips merged => {}", output.display());
        Ok(())
    }

    async fn mux_audio(
        &self,
        video: &Path,
        audio: &Path,
        narration_seconds: f64,
        output: &Path,
    ) -> Result<(), MediaError> {
        info!("Merging {} into {}", audio.display(), video.display());
        let mut args = vec![
            OsString::from("-i"),
            video.as_os_str().to_owned(),
            OsString::from("-i"),
            audio.as_os_str().to_owned(),
        ];
        args.extend(os(&[
            "-filter_complex",
            &mux_filter(narration_seconds),
            "-map",
            "[v]",
            "-map",
            "[a]",
            "-movflags",
            "+faststart",
            "-r",
            &OUTPUT_FPS.to_string(),
        ]));
        args.push(output.as_os_str().to_owned());
        self.ffmpeg(args).await?;
        info!("Narration muxed => {}", output.display());
        Ok(())
    }

    async fn burn_subtitles(
        &self,
        video: &Path,
        subtitles: &Path,
        output: &Path,
    ) -> Result<(), MediaError> {
        info!("Burning subtitles into {}", video.display());
        let mut args = vec![OsString::from("-i"), video.as_os_str().to_owned()];
        args.extend(os(&[
            "-vf",
            &subtitles_filter(subtitles),
            "-r",
            &OUTPUT_FPS.to_string(),
        ]));
        args.push(output.as_os_str().to_owned());
        self.ffmpeg(args).await?;
        info!("Subtitles burned => {}", output.display());
        Ok(())
    }

    async fn grayscale(&self, input: &Path, output: &Path) -> Result<(), MediaError> {
        let mut args = vec![OsString::from("-i"), input.as_os_str().to_owned()];
        args.extend(os(&["-vf", "hue=s=0"]));
        args.push(output.as_os_str().to_owned());
        self.ffmpeg(args).await?;
        info!("Grayscale applied => {}", output.display());
        Ok(())
    }

    async fn vintage(&self, input: &Path, output: &Path) -> Result<(), MediaError> {
        info!("Applying vintage effect to {}", input.display());
        let dir = output.parent().unwrap_or_else(|| Path::new("."));
        let slowed = dir.join("vintage-fps.mp4");
        let toned = dir.join("vintage-curves.mp4");

        let mut args = vec![OsString::from("-i"), input.as_os_str().to_owned()];
        args.extend(os(&["-filter:v", &format!("fps=fps={}", self.vintage_fps)]));
        args.push(slowed.as_os_str().to_owned());
        self.ffmpeg(args).await?;

        let mut args = vec![OsString::from("-i"), slowed.as_os_str().to_owned()];
        args.extend(os(&["-vf", "curves=vintage"]));
        args.push(toned.as_os_str().to_owned());
        self.ffmpeg(args).await?;

        let mut args = vec![
            OsString::from("-i"),
            self.old_film_texture.as_os_str().to_owned(),
            OsString::from("-i"),
            toned.as_os_str().to_owned(),
        ];
        args.extend(os(&[
            "-filter_complex",
            &old_film_filter(),
            "-map",
            "[out]",
            "-pix_fmt",
            "yuv420p",
            "-c:v",
            "libx264",
            "-crf",
            &VINTAGE_CRF.to_string(),
        ]));
        args.push(output.as_os_str().to_owned());
        self.ffmpeg(args).await?;
        info!("Vintage applied => {}", output.display());
        Ok(())
    }

    async fn to_recognizer_pcm(&self, input: &Path, output: &Path) -> Result<(), MediaError> {
        let mut args = vec![OsString::from("-i"), input.as_os_str().to_owned()];
        args.extend(os(&[
            "-ar",
            &RECOGNIZER_SAMPLE_RATE.to_string(),
            "-ac",
            "1",
            "-c:a",
            "pcm_s16le",
        ]));
        args.push(output.as_os_str().to_owned());
        self.ffmpeg(args).await
    }
}
