//! Collects random stock clips for a topic until they cover the narration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rand::Rng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AccumulateError;
use crate::media::MediaTool;
use crate::pexels::{ClipCandidate, FootageSource, Quality};

/// A downloaded and probed clip.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedClip {
    pub id: u64,
    pub path: PathBuf,
    pub duration: f64,
}

#[derive(Debug)]
pub struct AccumulationState {
    target: f64,
    accumulated: f64,
    fetched: HashSet<u64>,
    failed: HashSet<u64>,
    clips: Vec<FetchedClip>,
}

impl AccumulationState {
    pub fn new(target: f64) -> Self {
        Self {
            target,
            accumulated: 0.0,
            fetched: HashSet::new(),
            failed: HashSet::new(),
            clips: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.accumulated >= self.target
    }

    pub fn accumulated(&self) -> f64 {
        self.accumulated
    }

    fn is_used(&self, id: u64) -> bool {
        self.fetched.contains(&id) || self.failed.contains(&id)
    }

    fn used(&self) -> usize {
        self.fetched.len() + self.failed.len()
    }

    fn record(&mut self, clip: FetchedClip) {
        self.fetched.insert(clip.id);
        self.accumulated += clip.duration;
        self.clips.push(clip);
    }

    fn mark_failed(&mut self, id: u64) {
        self.failed.insert(id);
    }

    pub fn into_clips(self) -> Vec<FetchedClip> {
        self.clips
    }
}

#[derive(Debug, Clone)]
pub struct AccumulatorSettings {
    pub per_page: u32,
    pub pages: u32,
    pub quality: Quality,
    pub max_draws: usize,
    pub clip_dir: PathBuf,
}

impl AccumulatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            per_page: config.per_page,
            pages: config.pages,
            quality: config.quality,
            max_draws: config.max_draws,
            clip_dir: config.pexels_folder.clone(),
        }
    }
}

pub struct ClipAccumulator<'a, S, M> {
    source: &'a mut S,
    media: &'a M,
    rng: StdRng,
    settings: AccumulatorSettings,
}

impl<'a, S: FootageSource, M: MediaTool> ClipAccumulator<'a, S, M> {
    pub fn new(source: &'a mut S, media: &'a M, rng: StdRng, settings: AccumulatorSettings) -> Self {
        Self {
            source,
            media,
            rng,
            settings,
        }
    }

    /// Returns clips in fetch order whose durations sum to at least `target`.
    ///
    /// Failed candidates are skipped for the rest of the run. The loop stops
    /// with `PoolExhausted` once every candidate was fetched or failed, and with
    /// `DrawLimit` after `max_draws` draws.
    pub async fn accumulate(
        &mut self,
        topic: &str,
        target: f64,
    ) -> Result<Vec<FetchedClip>, AccumulateError> {
        let mut state = AccumulationState::new(target);
        if state.is_complete() {
            debug!("Target duration {:.2}s needs no footage", target);
            return Ok(state.into_clips());
        }

        let pool = dedup(
            self.source
                .search(topic, self.settings.per_page, self.settings.pages)
                .await?,
        );
        info!(
            "Collecting {:.2}s of '{}' footage from a pool of {} candidates",
            target,
            topic,
            pool.len()
        );

        let mut draws = 0;
        while !state.is_complete() {
            if state.used() >= pool.len() {
                return Err(AccumulateError::PoolExhausted {
                    pool: pool.len(),
                    accumulated: state.accumulated(),
                    target,
                });
            }
            if draws >= self.settings.max_draws {
                return Err(AccumulateError::DrawLimit {
                    draws,
                    accumulated: state.accumulated(),
                    target,
                });
            }
            draws += 1;

            let candidate = &pool[self.rng.gen_range(0..pool.len())];
            if state.is_used(candidate.id) {
                continue;
            }

            match self.fetch_one(candidate).await {
                Some(clip) => {
                    debug!("Clip {} adds {:.2}s", clip.id, clip.duration);
                    state.record(clip);
                }
                None => state.mark_failed(candidate.id),
            }
        }

        info!(
            "Collected {:.2}s of footage in {} draws",
            state.accumulated(),
            draws
        );
        Ok(state.into_clips())
    }

    async fn fetch_one(&self, candidate: &ClipCandidate) -> Option<FetchedClip> {
        let dir: &Path = &self.settings.clip_dir;
        let path = match self
            .source
            .fetch(candidate, self.settings.quality, dir)
            .await
        {
            Ok(path) => path,
            Err(e) => {
                warn!("Skipping '{}' video {}: {}", candidate.topic, candidate.id, e);
                return None;
            }
        };
        match self.media.probe_duration(&path).await {
            Ok(duration) => Some(FetchedClip {
                id: candidate.id,
                path,
                duration,
            }),
            Err(e) => {
                warn!("Skipping video {}: {}", candidate.id, e);
                let _ = tokio::fs::remove_file(&path).await;
                None
            }
        }
    }
}

fn dedup(candidates: Vec<ClipCandidate>) -> Vec<ClipCandidate> {
    let mut seen = HashSet::new();
    candidates.into_iter().filter(|c| seen.insert(c.id)).collect()
}
