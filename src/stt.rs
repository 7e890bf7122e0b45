use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::SpeechError;
use crate::subtitle::Word;

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Word-timed transcript of a 16kHz mono PCM WAV.
    async fn transcribe(&self, pcm_wav: &Path) -> Result<Vec<Word>, SpeechError>;
}

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    transcription: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    offsets: WhisperOffsets,
    text: String,
}

#[derive(Debug, Deserialize)]
struct WhisperOffsets {
    from: u64,
    to: u64,
}

/// whisper.cpp's CLI, run with one word per segment.
pub struct WhisperCli {
    whisper: String,
    model: PathBuf,
}

impl WhisperCli {
    pub fn new(config: &Config) -> Self {
        Self {
            whisper: config.whisper_bin.clone(),
            model: config.whisper_model.clone(),
        }
    }
}

fn parse_transcript(json: &str) -> Result<Vec<Word>, SpeechError> {
    let output: WhisperOutput = serde_json::from_str(json)?;
    Ok(output
        .transcription
        .into_iter()
        .filter(|s| !s.text.trim().is_empty())
        .map(|s| Word {
            start: s.offsets.from as f64 / 1000.0,
            end: s.offsets.to as f64 / 1000.0,
            text: s.text.trim().to_string(),
        })
        .collect())
}

#[async_trait]
impl SpeechRecognizer for WhisperCli {
    async fn transcribe(&self, pcm_wav: &Path) -> Result<Vec<Word>, SpeechError> {
        info!("Transcribing {}", pcm_wav.display());
        let prefix = pcm_wav.with_extension("");
        let output = Command::new(&self.whisper)
            .arg("-m")
            .arg(&self.model)
            .arg("-f")
            .arg(pcm_wav)
            .args(["-ml", "1", "-sow", "-oj", "-np"])
            .arg("-of")
            .arg(&prefix)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;
        if !output.status.success() {
            error!(
                "Recognizer failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Err(SpeechError::ToolFailed {
                tool: self.whisper.clone(),
                code: output.status.code(),
            });
        }

        let json_path = prefix.with_extension("json");
        let data = tokio::fs::read_to_string(&json_path).await?;
        let words = parse_transcript(&data)?;
        debug!("Recognizer returned {} words", words.len());
        Ok(words)
    }
}
