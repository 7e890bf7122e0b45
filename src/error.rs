use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::Stage;

/// Problems with the run's inputs or environment. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing {0}; set it in the environment or in .env")]
    MissingCredential(&'static str),

    #[error("voice '{0}' is not supported")]
    UnsupportedVoice(String),

    #[error("quality '{0}' is not supported, use hd or sd")]
    UnsupportedQuality(String),

    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("narration text is empty")]
    EmptyText,

    #[error("{dir} is removed after every run but would take {path} with it")]
    UnsafeWorkDir { dir: PathBuf, path: PathBuf },

    #[error("could not resolve the current directory: {0}")]
    CurrentDir(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("per_page {0} exceeds the provider maximum of 80")]
    PerPageTooLarge(u32),

    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// A single candidate could not be turned into a local clip.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no {quality} stream available for video {id}")]
    NoMatchingQuality { id: u64, quality: &'static str },

    #[error("metadata request for video {id} returned status {status}")]
    Api { id: u64, status: u16 },

    #[error("metadata request for video {id} failed: {source}")]
    Metadata { id: u64, source: reqwest::Error },

    #[error("download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("could not store clip: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{tool} exited with {code:?}: {stderr}")]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("could not read duration of {path}: {output}")]
    Probe { path: PathBuf, output: String },

    #[error("nothing to merge")]
    NoClips,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Text shown to the user as the tool's diagnostic output.
    pub fn diagnostic(&self) -> String {
        match self {
            MediaError::ToolFailed { stderr, .. } => stderr.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("{tool} exited with {code:?}")]
    ToolFailed { tool: String, code: Option<i32> },

    #[error("could not read audio: {0}")]
    Wav(#[from] hound::Error),

    #[error("could not parse transcript: {0}")]
    Transcript(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum AccumulateError {
    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("candidate pool of {pool} exhausted with {accumulated:.2}s of {target:.2}s collected")]
    PoolExhausted {
        pool: usize,
        accumulated: f64,
        target: f64,
    },

    #[error("gave up after {draws} draws with {accumulated:.2}s of {target:.2}s collected")]
    DrawLimit {
        draws: usize,
        accumulated: f64,
        target: f64,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("footage acquisition failed: {0}")]
    Acquisition(#[from] AccumulateError),

    #[error("{stage} failed: {diagnostic}")]
    Stage { stage: Stage, diagnostic: String },
}

impl PipelineError {
    pub fn stage(stage: Stage, err: MediaError) -> Self {
        PipelineError::Stage {
            stage,
            diagnostic: err.diagnostic(),
        }
    }

    pub fn speech(stage: Stage, err: SpeechError) -> Self {
        PipelineError::Stage {
            stage,
            diagnostic: err.to_string(),
        }
    }
}
