use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::audio::wav_duration_seconds;
use crate::config::Config;
use crate::error::{ConfigError, SpeechError};

/// VCTK speakers the narration voice is drawn from.
pub const SUPPORTED_VOICES: &[&str] = &[
    "ED", "p225", "p226", "p227", "p228", "p229", "p230", "p231", "p232", "p233", "p234", "p236",
    "p237", "p238", "p239", "p240", "p241", "p243", "p244", "p245", "p246", "p247", "p248",
    "p249", "p250", "p251", "p252", "p253", "p254", "p255", "p256", "p257", "p258", "p259",
    "p260", "p261", "p262", "p263", "p264", "p265", "p266", "p267", "p268", "p269", "p270",
    "p271", "p272", "p273", "p274", "p275", "p276", "p277", "p278", "p279", "p280", "p281",
    "p282", "p283", "p284", "p285", "p286", "p287", "p288", "p292", "p293", "p294", "p295",
    "p297", "p298", "p299", "p300", "p301", "p302", "p303", "p304", "p305", "p306", "p307",
    "p308", "p310", "p311", "p312", "p313", "p314", "p316", "p317", "p318", "p323", "p326",
    "p329", "p330", "p333", "p334", "p335", "p336", "p339", "p340", "p341", "p343", "p345",
    "p347", "p351", "p360", "p361", "p362", "p363", "p364", "p374", "p376",
];

/// Synthesized narration and its length in seconds.
#[derive(Debug, Clone)]
pub struct NarrationAsset {
    pub audio: PathBuf,
    pub duration: f64,
}

/// Validates the requested voice, or picks one at random when none was given.
pub fn choose_voice<R: Rng + ?Sized>(
    requested: Option<&str>,
    rng: &mut R,
) -> Result<String, ConfigError> {
    match requested {
        Some(voice) if SUPPORTED_VOICES.contains(&voice) => Ok(voice.to_string()),
        Some(voice) => Err(ConfigError::UnsupportedVoice(voice.to_string())),
        None => SUPPORTED_VOICES
            .choose(rng)
            .map(|v| v.to_string())
            .ok_or_else(|| ConfigError::UnsupportedVoice(String::new())),
    }
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        out_path: &Path,
    ) -> Result<NarrationAsset, SpeechError>;
}

#[derive(Debug, Default, Deserialize)]
struct PiperVoiceConfig {
    #[serde(default)]
    speaker_id_map: HashMap<String, u32>,
}

pub struct PiperTts {
    piper: String,
    model: PathBuf,
}

impl PiperTts {
    pub fn new(config: &Config) -> Self {
        Self {
            piper: config.piper_bin.clone(),
            model: config.piper_model.clone(),
        }
    }

    /// Piper keeps the speaker table next to the model as `<model>.json`.
    fn speaker_id(&self, voice: &str) -> Option<u32> {
        let mut config_path = self.model.clone().into_os_string();
        config_path.push(".json");
        let data = std::fs::read_to_string(&config_path).ok()?;
        let parsed: PiperVoiceConfig = match serde_json::from_str(&data) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Ignoring unreadable voice config {:?}: {}", config_path, e);
                return None;
            }
        };
        parsed.speaker_id_map.get(voice).copied()
    }
}

#[async_trait]
impl SpeechSynthesizer for PiperTts {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        out_path: &Path,
    ) -> Result<NarrationAsset, SpeechError> {
        info!("Converting text to speech with voice {}", voice);

        let mut cmd = Command::new(&self.piper);
        cmd.arg("--model")
            .arg(&self.model)
            .arg("--output_file")
            .arg(out_path);
        match self.speaker_id(voice) {
            Some(id) => {
                cmd.arg("--speaker").arg(id.to_string());
            }
            None => warn!("Voice {} not in model speaker map; using default speaker", voice),
        }

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
        }

        let status = child.wait().await?;
        if !status.success() {
            error!("Piper TTS command failed for {}", out_path.display());
            return Err(SpeechError::ToolFailed {
                tool: self.piper.clone(),
                code: status.code(),
            });
        }

        let duration = wav_duration_seconds(out_path)?;
        info!("Narration written to {} ({:.2}s)", out_path.display(), duration);
        Ok(NarrationAsset {
            audio: out_path.to_path_buf(),
            duration,
        })
    }
}
