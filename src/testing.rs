//! In-memory stand-ins for the external tools, shared by unit tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::audio::write_silence;
use crate::error::{FetchError, MediaError, SearchError, SpeechError};
use crate::media::MediaTool;
use crate::pexels::{ClipCandidate, FootageSource, Quality};
use crate::stt::SpeechRecognizer;
use crate::subtitle::Word;
use crate::tts::{NarrationAsset, SpeechSynthesizer};

/// Candidates with a duration succeed; `None` fails to fetch.
pub struct FakeSource {
    entries: Vec<(u64, Option<f64>)>,
    pub searches: usize,
    pub fail_search: bool,
    fetches: AtomicUsize,
}

impl FakeSource {
    pub fn new(entries: &[(u64, Option<f64>)]) -> Self {
        Self {
            entries: entries.to_vec(),
            searches: 0,
            fail_search: false,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FootageSource for FakeSource {
    async fn search(
        &mut self,
        topic: &str,
        _per_page: u32,
        _pages: u32,
    ) -> Result<Vec<ClipCandidate>, SearchError> {
        self.searches += 1;
        if self.fail_search {
            return Err(SearchError::PerPageTooLarge(999));
        }
        Ok(self
            .entries
            .iter()
            .map(|(id, _)| ClipCandidate {
                id: *id,
                topic: topic.to_string(),
            })
            .collect())
    }

    async fn fetch(
        &self,
        candidate: &ClipCandidate,
        quality: Quality,
        dest_dir: &Path,
    ) -> Result<PathBuf, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let duration = self
            .entries
            .iter()
            .find(|(id, _)| *id == candidate.id)
            .and_then(|(_, d)| *d)
            .ok_or(FetchError::NoMatchingQuality {
                id: candidate.id,
                quality: quality.name(),
            })?;
        let path = dest_dir.join(format!("{}.mp4", candidate.id));
        std::fs::write(&path, duration.to_string())?;
        Ok(path)
    }
}

/// Records every call as `op in -> out` and writes placeholder outputs.
/// Clip files hold their duration as text, which `probe_duration` reads back.
#[derive(Default)]
pub struct FakeMedia {
    pub calls: Mutex<Vec<String>>,
    pub mux_lengths: Mutex<Vec<f64>>,
    /// Contents of every SRT file handed to `burn_subtitles`.
    pub subtitles: Mutex<Vec<String>>,
    pub fail_op: Option<&'static str>,
}

impl FakeMedia {
    pub fn failing(op: &'static str) -> Self {
        Self {
            fail_op: Some(op),
            ..Self::default()
        }
    }

    pub fn ops(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.split(' ').next().unwrap_or_default().to_string())
            .collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn step(&self, op: &str, input: &Path, output: &Path) -> Result<(), MediaError> {
        self.calls.lock().unwrap().push(format!(
            "{} {} -> {}",
            op,
            name(input),
            name(output)
        ));
        if self.fail_op == Some(op) {
            return Err(MediaError::ToolFailed {
                tool: "ffmpeg".to_string(),
                code: Some(1),
                stderr: format!("{} exploded", op),
            });
        }
        std::fs::write(output, op)?;
        Ok(())
    }
}

fn name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[async_trait]
impl MediaTool for FakeMedia {
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError> {
        let text = std::fs::read_to_string(path)?;
        text.trim().parse().map_err(|_| MediaError::Probe {
            path: path.to_path_buf(),
            output: text,
        })
    }

    async fn merge_clips(&self, clips: &[PathBuf], output: &Path) -> Result<(), MediaError> {
        if clips.is_empty() {
            return Err(MediaError::NoClips);
        }
        self.step("merge", &clips[0], output)
    }

    async fn mux_audio(
        &self,
        video: &Path,
        _audio: &Path,
        narration_seconds: f64,
        output: &Path,
    ) -> Result<(), MediaError> {
        self.mux_lengths.lock().unwrap().push(narration_seconds);
        self.step("mux", video, output)
    }

    async fn burn_subtitles(
        &self,
        video: &Path,
        subtitles: &Path,
        output: &Path,
    ) -> Result<(), MediaError> {
        let srt = std::fs::read_to_string(subtitles)?;
        self.subtitles.lock().unwrap().push(srt);
        self.step("burn", video, output)
    }

    async fn grayscale(&self, input: &Path, output: &Path) -> Result<(), MediaError> {
        self.step("grayscale", input, output)
    }

    async fn vintage(&self, input: &Path, output: &Path) -> Result<(), MediaError> {
        self.step("vintage", input, output)
    }

    async fn to_recognizer_pcm(&self, input: &Path, output: &Path) -> Result<(), MediaError> {
        self.step("pcm", input, output)
    }
}

/// Writes `seconds` of silence per call.
pub struct FakeSynth {
    pub seconds: f64,
    pub fail: bool,
    pub voices: Mutex<Vec<String>>,
}

impl FakeSynth {
    pub fn new(seconds: f64) -> Self {
        Self {
            seconds,
            fail: false,
            voices: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynth {
    async fn synthesize(
        &self,
        _text: &str,
        voice: &str,
        out_path: &Path,
    ) -> Result<NarrationAsset, SpeechError> {
        self.voices.lock().unwrap().push(voice.to_string());
        if self.fail {
            return Err(SpeechError::ToolFailed {
                tool: "piper".to_string(),
                code: Some(1),
            });
        }
        write_silence(out_path, self.seconds, 8000);
        Ok(NarrationAsset {
            audio: out_path.to_path_buf(),
            duration: crate::audio::wav_duration_seconds(out_path)?,
        })
    }
}

pub struct FakeRecognizer {
    pub words: Vec<Word>,
    pub fail: bool,
}

impl FakeRecognizer {
    pub fn hello_world() -> Self {
        Self {
            words: vec![
                Word {
                    start: 0.1,
                    end: 0.5,
                    text: "Hello".to_string(),
                },
                Word {
                    start: 0.6,
                    end: 1.1,
                    text: "world".to_string(),
                },
            ],
            fail: false,
        }
    }
}

#[async_trait]
impl SpeechRecognizer for FakeRecognizer {
    async fn transcribe(&self, pcm_wav: &Path) -> Result<Vec<Word>, SpeechError> {
        if self.fail || !pcm_wav.exists() {
            return Err(SpeechError::ToolFailed {
                tool: "whisper-cli".to_string(),
                code: Some(2),
            });
        }
        Ok(self.words.clone())
    }
}
