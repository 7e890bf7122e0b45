use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::pexels::Quality;

pub const DEFAULT_PEXELS_URL: &str = "https://api.pexels.com";
pub const MAX_PER_PAGE: u32 = 80;

/// Everything the components need, built once and passed down.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub pexels_url: String,
    pub pexels_folder: PathBuf,
    pub tmp_folder: PathBuf,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub piper_bin: String,
    pub piper_model: PathBuf,
    pub whisper_bin: String,
    pub whisper_model: PathBuf,
    pub old_film_texture: PathBuf,
    pub download_timeout: Duration,
    pub quality: Quality,
    pub per_page: u32,
    pub pages: u32,
    pub max_draws: usize,
    pub vintage_fps: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            pexels_url: DEFAULT_PEXELS_URL.to_string(),
            pexels_folder: PathBuf::from("tmp/pexels"),
            tmp_folder: PathBuf::from("tmp"),
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            piper_bin: "piper".to_string(),
            piper_model: PathBuf::from("./tts/en_GB-vctk-medium.onnx"),
            whisper_bin: "whisper-cli".to_string(),
            whisper_model: PathBuf::from("./models/ggml-base.en.bin"),
            old_film_texture: PathBuf::from("templates/oldFilm1080.mp4"),
            download_timeout: Duration::from_secs(15),
            quality: Quality::Hd,
            per_page: MAX_PER_PAGE,
            pages: 1,
            max_draws: 1000,
            vintage_fps: 10,
        }
    }
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let api_key = get("API_KEY").ok_or(ConfigError::MissingCredential("API_KEY"))?;
        let quality = match get("PEXELS_QUALITY") {
            Some(q) => Quality::from_str(&q)?,
            None => defaults.quality,
        };

        Ok(Self {
            api_key,
            pexels_url: get("PEXELS_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.pexels_url),
            pexels_folder: get("PEXELS_FOLDER")
                .map(PathBuf::from)
                .unwrap_or(defaults.pexels_folder),
            tmp_folder: get("TMP_FOLDER")
                .map(PathBuf::from)
                .unwrap_or(defaults.tmp_folder),
            ffmpeg_bin: get("FFMPEG_BIN").unwrap_or(defaults.ffmpeg_bin),
            ffprobe_bin: get("FFPROBE_BIN").unwrap_or(defaults.ffprobe_bin),
            piper_bin: get("PIPER_BIN").unwrap_or(defaults.piper_bin),
            piper_model: get("PIPER_MODEL")
                .map(PathBuf::from)
                .unwrap_or(defaults.piper_model),
            whisper_bin: get("WHISPER_BIN").unwrap_or(defaults.whisper_bin),
            whisper_model: get("WHISPER_MODEL")
                .map(PathBuf::from)
                .unwrap_or(defaults.whisper_model),
            old_film_texture: get("OLD_FILM_TEXTURE")
                .map(PathBuf::from)
                .unwrap_or(defaults.old_film_texture),
            quality,
            ..defaults
        })
    }

    pub fn with_per_page(mut self, per_page: u32) -> Result<Self, ConfigError> {
        if per_page == 0 || per_page > MAX_PER_PAGE {
            return Err(ConfigError::InvalidValue {
                key: "per_page",
                value: per_page.to_string(),
            });
        }
        self.per_page = per_page;
        Ok(self)
    }
}
