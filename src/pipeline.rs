//! End-to-end run: narration, footage, merge, effects, mux, subtitles.
//!
//! Stages run strictly one after another. Whatever happens, the run's working
//! directories are removed exactly once before `run` returns.

use std::fmt;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info, warn};

use crate::accumulator::{AccumulatorSettings, ClipAccumulator};
use crate::config::Config;
use crate::effects::{Effect, EffectSet};
use crate::error::{ConfigError, PipelineError};
use crate::media::MediaTool;
use crate::pexels::FootageSource;
use crate::stt::SpeechRecognizer;
use crate::subtitle::{SubtitleAsset, cues_from_words, write_srt};
use crate::tts::{NarrationAsset, SpeechSynthesizer, choose_voice};
use crate::utils::{WorkDir, move_file, resolve_path};

const NARRATION_FILE: &str = "t2s.wav";
const RECOGNIZER_FILE: &str = "t2s-16k.wav";
const MERGED_FILE: &str = "merged.mp4";
const EFFECTS_FILE: &str = "effects.mp4";
const MUXED_FILE: &str = "merged_and_audio.mp4";
const SUBTITLE_FILE: &str = "sub.srt";
const FINAL_FILE: &str = "final.mp4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    NarrationSynthesis,
    FootageAcquisition,
    Merge,
    Effects,
    AudioMux,
    SubtitleGeneration,
    SubtitleBurn,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::NarrationSynthesis => "narration synthesis",
            Stage::FootageAcquisition => "footage acquisition",
            Stage::Merge => "merge",
            Stage::Effects => "effects",
            Stage::AudioMux => "audio mux",
            Stage::SubtitleGeneration => "subtitle generation",
            Stage::SubtitleBurn => "subtitle burn",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// One invocation's inputs and where its files go.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub text: String,
    pub topic: String,
    pub effects: EffectSet,
    pub voice: Option<String>,
    pub work_dir: PathBuf,
    pub clip_dir: PathBuf,
    pub output: PathBuf,
}

impl PipelineRun {
    pub fn new(
        config: &Config,
        text: String,
        topic: String,
        effects: EffectSet,
        voice: Option<String>,
        output: PathBuf,
    ) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Err(ConfigError::EmptyText);
        }
        let run = Self {
            text,
            topic,
            effects,
            voice,
            work_dir: config.tmp_folder.clone(),
            clip_dir: config.pexels_folder.clone(),
            output,
        };
        run.check_scratch_dirs(&std::env::current_dir()?)?;
        Ok(run)
    }

    /// Both scratch dirs are deleted at the end of the run, so neither may
    /// hold the output or the directory the user runs from.
    fn check_scratch_dirs(&self, cwd: &Path) -> Result<(), ConfigError> {
        let output = resolve_path(cwd, &self.output);
        for dir in [&self.work_dir, &self.clip_dir] {
            let resolved = resolve_path(cwd, dir);
            let endangered = if output.starts_with(&resolved) {
                Some(output.clone())
            } else if cwd.starts_with(&resolved) {
                Some(cwd.to_path_buf())
            } else {
                None
            };
            if let Some(path) = endangered {
                return Err(ConfigError::UnsafeWorkDir {
                    dir: dir.clone(),
                    path,
                });
            }
        }
        Ok(())
    }

    fn file(&self, name: &str) -> PathBuf {
        self.work_dir.join(name)
    }
}

pub struct Pipeline<T, R, S, M> {
    config: Config,
    tts: T,
    stt: R,
    footage: S,
    media: M,
    rng: StdRng,
}

impl<T, R, S, M> Pipeline<T, R, S, M>
where
    T: SpeechSynthesizer,
    R: SpeechRecognizer,
    S: FootageSource,
    M: MediaTool,
{
    pub fn new(config: Config, tts: T, stt: R, footage: S, media: M, rng: StdRng) -> Self {
        Self {
            config,
            tts,
            stt,
            footage,
            media,
            rng,
        }
    }

    /// Produces `run.output`. The working directories are gone afterwards,
    /// whether the run succeeded or not.
    pub async fn run(&mut self, run: &PipelineRun) -> Result<PathBuf, PipelineError> {
        let work = WorkDir::new(vec![run.work_dir.clone(), run.clip_dir.clone()]);
        let result = match work.create() {
            Ok(()) => self.run_stages(run).await,
            Err(e) => Err(PipelineError::Stage {
                stage: Stage::Init,
                diagnostic: format!("could not create scratch directories: {}", e),
            }),
        };
        info!("Cleaning up {}", run.work_dir.display());
        work.close();

        match &result {
            Ok(path) => info!("Video ready => {}", path.display()),
            Err(e) => error!("Run aborted: {}", e),
        }
        result
    }

    async fn run_stages(&mut self, run: &PipelineRun) -> Result<PathBuf, PipelineError> {
        let narration = self.synthesize(run).await?;

        info!("Stage: {}", Stage::FootageAcquisition);
        let mut settings = AccumulatorSettings::from_config(&self.config);
        settings.clip_dir = run.clip_dir.clone();
        let seed = self.rng.r#gen::<u64>();
        let mut accumulator = ClipAccumulator::new(
            &mut self.footage,
            &self.media,
            StdRng::seed_from_u64(seed),
            settings,
        );
        let clips = accumulator.accumulate(&run.topic, narration.duration).await?;

        info!("Stage: {}", Stage::Merge);
        let merged = run.file(MERGED_FILE);
        let paths: Vec<PathBuf> = clips.into_iter().map(|c| c.path).collect();
        self.media
            .merge_clips(&paths, &merged)
            .await
            .map_err(|e| PipelineError::stage(Stage::Merge, e))?;

        let video = if run.effects.is_empty() {
            merged
        } else {
            self.apply_effects(run, &merged).await?
        };

        info!("Stage: {}", Stage::AudioMux);
        let muxed = run.file(MUXED_FILE);
        self.media
            .mux_audio(&video, &narration.audio, narration.duration, &muxed)
            .await
            .map_err(|e| PipelineError::stage(Stage::AudioMux, e))?;

        let subtitles = self.generate_subtitles(run, &narration).await?;
        debug!("{} captions to burn", subtitles.cues);

        info!("Stage: {}", Stage::SubtitleBurn);
        let burned = run.file(FINAL_FILE);
        self.media
            .burn_subtitles(&muxed, &subtitles.path, &burned)
            .await
            .map_err(|e| PipelineError::stage(Stage::SubtitleBurn, e))?;

        move_file(&burned, &run.output).map_err(|e| PipelineError::Stage {
            stage: Stage::Done,
            diagnostic: format!("could not write {}: {}", run.output.display(), e),
        })?;
        Ok(run.output.clone())
    }

    async fn synthesize(&mut self, run: &PipelineRun) -> Result<NarrationAsset, PipelineError> {
        info!("Stage: {}", Stage::NarrationSynthesis);
        let voice = choose_voice(run.voice.as_deref(), &mut self.rng)?;
        self.tts
            .synthesize(&run.text, &voice, &run.file(NARRATION_FILE))
            .await
            .map_err(|e| PipelineError::speech(Stage::NarrationSynthesis, e))
    }

    /// Vintage runs before grayscale; the last effect writes `effects.mp4`.
    async fn apply_effects(&self, run: &PipelineRun, merged: &Path) -> Result<PathBuf, PipelineError> {
        info!("Stage: {} ({})", Stage::Effects, run.effects);
        let chain = run.effects.chain();
        let mut input = merged.to_path_buf();
        for (i, effect) in chain.iter().enumerate() {
            let output = if i + 1 == chain.len() {
                run.file(EFFECTS_FILE)
            } else {
                run.file(&format!("{}.mp4", effect.name()))
            };
            let applied = match effect {
                Effect::Vintage => self.media.vintage(&input, &output).await,
                Effect::Grayscale => self.media.grayscale(&input, &output).await,
            };
            applied.map_err(|e| PipelineError::stage(Stage::Effects, e))?;
            input = output;
        }
        Ok(input)
    }

    async fn generate_subtitles(
        &self,
        run: &PipelineRun,
        narration: &NarrationAsset,
    ) -> Result<SubtitleAsset, PipelineError> {
        info!("Stage: {}", Stage::SubtitleGeneration);
        let pcm = run.file(RECOGNIZER_FILE);
        self.media
            .to_recognizer_pcm(&narration.audio, &pcm)
            .await
            .map_err(|e| PipelineError::stage(Stage::SubtitleGeneration, e))?;
        let words = self
            .stt
            .transcribe(&pcm)
            .await
            .map_err(|e| PipelineError::speech(Stage::SubtitleGeneration, e))?;

        let cues = cues_from_words(&words);
        if cues.is_empty() {
            warn!("Recognizer heard nothing; subtitles will be empty");
        }
        let path = run.file(SUBTITLE_FILE);
        write_srt(&path, &cues).map_err(|e| PipelineError::Stage {
            stage: Stage::SubtitleGeneration,
            diagnostic: e.to_string(),
        })?;
        info!("SRT file created => {}", path.display());
        Ok(SubtitleAsset {
            path,
            cues: cues.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AccumulateError;
    use crate::testing::{FakeMedia, FakeRecognizer, FakeSource, FakeSynth};
    use tempfile::TempDir;

    type TestPipeline = Pipeline<FakeSynth, FakeRecognizer, FakeSource, FakeMedia>;

    fn pipeline(
        root: &TempDir,
        tts: FakeSynth,
        stt: FakeRecognizer,
        source: FakeSource,
        media: FakeMedia,
    ) -> (TestPipeline, PipelineRun) {
        let config = Config {
            api_key: "k".to_string(),
            tmp_folder: root.path().join("tmp"),
            pexels_folder: root.path().join("tmp/pexels"),
            ..Config::default()
        };
        let run = PipelineRun::new(
            &config,
            "Hello world".to_string(),
            "ocean".to_string(),
            EffectSet::parse("grayscale"),
            None,
            root.path().join("video.mp4"),
        )
        .unwrap();
        let p = Pipeline::new(config, tts, stt, source, media, StdRng::seed_from_u64(5));
        (p, run)
    }

    fn ocean() -> FakeSource {
        FakeSource::new(&[(1, Some(1.0)), (2, Some(1.5)), (3, Some(2.0)), (4, None)])
    }

    fn assert_cleaned(run: &PipelineRun) {
        assert!(!run.work_dir.exists(), "work dir left behind");
        assert!(!run.clip_dir.exists(), "clip dir left behind");
    }

    #[tokio::test]
    async fn hello_world_ocean_grayscale() {
        let root = tempfile::tempdir().unwrap();
        let (mut p, run) = pipeline(
            &root,
            FakeSynth::new(1.2),
            FakeRecognizer::hello_world(),
            ocean(),
            FakeMedia::default(),
        );

        let out = p.run(&run).await.unwrap();

        assert_eq!(out, root.path().join("video.mp4"));
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "burn");
        let calls = p.media.calls();
        assert!(calls[0].ends_with("-> merged.mp4"));
        assert_eq!(
            calls[1..],
            [
                "grayscale merged.mp4 -> effects.mp4",
                "mux effects.mp4 -> merged_and_audio.mp4",
                "pcm t2s.wav -> t2s-16k.wav",
                "burn merged_and_audio.mp4 -> final.mp4",
            ]
        );
        assert_eq!(p.media.ops(), vec!["merge", "grayscale", "mux", "pcm", "burn"]);
        let lengths = p.media.mux_lengths.lock().unwrap().clone();
        assert_eq!(lengths.len(), 1);
        assert!((lengths[0] - 1.2).abs() < 1e-3);
        assert!(p.footage.fetch_count() >= 1);
        let burned = p.media.subtitles.lock().unwrap().clone();
        assert_eq!(burned.len(), 1);
        assert!(burned[0].starts_with("1\n00:00:00,100 --> 00:00:01,100\n"));
        assert!(burned[0].contains("Hello world"));
        assert_cleaned(&run);
    }

    #[tokio::test]
    async fn no_effects_skips_the_effects_stage() {
        let root = tempfile::tempdir().unwrap();
        let (mut p, mut run) = pipeline(
            &root,
            FakeSynth::new(1.0),
            FakeRecognizer::hello_world(),
            ocean(),
            FakeMedia::default(),
        );
        run.effects = EffectSet::none();

        p.run(&run).await.unwrap();

        assert_eq!(p.media.ops(), vec!["merge", "mux", "pcm", "burn"]);
        assert!(p.media.calls().iter().all(|c| !c.contains(EFFECTS_FILE)));
        assert!(p.media.calls()[1].starts_with("mux merged.mp4"));
        assert_cleaned(&run);
    }

    #[tokio::test]
    async fn vintage_then_grayscale_whatever_the_request_order() {
        let root = tempfile::tempdir().unwrap();
        let (mut p, mut run) = pipeline(
            &root,
            FakeSynth::new(1.0),
            FakeRecognizer::hello_world(),
            ocean(),
            FakeMedia::default(),
        );
        run.effects = EffectSet::parse("grayscale,vintage");

        p.run(&run).await.unwrap();

        let calls = p.media.calls();
        assert_eq!(calls[1], "vintage merged.mp4 -> vintage.mp4");
        assert_eq!(calls[2], "grayscale vintage.mp4 -> effects.mp4");
        assert_eq!(calls[3], "mux effects.mp4 -> merged_and_audio.mp4");
    }

    #[tokio::test]
    async fn vintage_alone_writes_effects_file() {
        let root = tempfile::tempdir().unwrap();
        let (mut p, mut run) = pipeline(
            &root,
            FakeSynth::new(1.0),
            FakeRecognizer::hello_world(),
            ocean(),
            FakeMedia::default(),
        );
        run.effects = EffectSet::parse("vintage,sepia");

        p.run(&run).await.unwrap();

        assert_eq!(p.media.calls()[1], "vintage merged.mp4 -> effects.mp4");
        assert_eq!(p.media.ops(), vec!["merge", "vintage", "mux", "pcm", "burn"]);
    }

    #[tokio::test]
    async fn every_media_stage_failure_aborts_and_cleans_up() {
        let cases = [
            ("merge", Stage::Merge),
            ("grayscale", Stage::Effects),
            ("mux", Stage::AudioMux),
            ("pcm", Stage::SubtitleGeneration),
            ("burn", Stage::SubtitleBurn),
        ];
        for (op, expected) in cases {
            let root = tempfile::tempdir().unwrap();
            let (mut p, run) = pipeline(
                &root,
                FakeSynth::new(1.0),
                FakeRecognizer::hello_world(),
                ocean(),
                FakeMedia::failing(op),
            );

            let err = p.run(&run).await.unwrap_err();

            match err {
                PipelineError::Stage { stage, diagnostic } => {
                    assert_eq!(stage, expected, "op {}", op);
                    assert!(diagnostic.contains("exploded"));
                }
                other => panic!("op {} gave {:?}", op, other),
            }
            assert_eq!(p.media.ops().last().map(String::as_str), Some(op));
            assert!(!run.output.exists());
            assert_cleaned(&run);
        }
    }

    #[tokio::test]
    async fn vintage_failure_stops_the_effect_chain() {
        let root = tempfile::tempdir().unwrap();
        let (mut p, mut run) = pipeline(
            &root,
            FakeSynth::new(1.0),
            FakeRecognizer::hello_world(),
            ocean(),
            FakeMedia::failing("vintage"),
        );
        run.effects = EffectSet::parse("vintage,grayscale");

        let err = p.run(&run).await.unwrap_err();

        assert!(matches!(err, PipelineError::Stage { stage: Stage::Effects, .. }));
        assert_eq!(p.media.ops(), vec!["merge", "vintage"]);
        assert_cleaned(&run);
    }

    #[tokio::test]
    async fn synthesis_failure_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let mut tts = FakeSynth::new(1.0);
        tts.fail = true;
        let (mut p, run) = pipeline(
            &root,
            tts,
            FakeRecognizer::hello_world(),
            ocean(),
            FakeMedia::default(),
        );

        let err = p.run(&run).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Stage { stage: Stage::NarrationSynthesis, .. }
        ));
        assert_eq!(p.footage.searches, 0);
        assert_cleaned(&run);
    }

    #[tokio::test]
    async fn unsupported_voice_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let (mut p, mut run) = pipeline(
            &root,
            FakeSynth::new(1.0),
            FakeRecognizer::hello_world(),
            ocean(),
            FakeMedia::default(),
        );
        run.voice = Some("robot".to_string());

        let err = p.run(&run).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::UnsupportedVoice(_))
        ));
        assert!(p.tts.voices.lock().unwrap().is_empty());
        assert_cleaned(&run);
    }

    #[tokio::test]
    async fn requested_voice_reaches_the_engine() {
        let root = tempfile::tempdir().unwrap();
        let (mut p, mut run) = pipeline(
            &root,
            FakeSynth::new(1.0),
            FakeRecognizer::hello_world(),
            ocean(),
            FakeMedia::default(),
        );
        run.voice = Some("p330".to_string());

        p.run(&run).await.unwrap();

        assert_eq!(*p.tts.voices.lock().unwrap(), vec!["p330".to_string()]);
    }

    #[tokio::test]
    async fn search_failure_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let mut source = ocean();
        source.fail_search = true;
        let (mut p, run) = pipeline(
            &root,
            FakeSynth::new(1.0),
            FakeRecognizer::hello_world(),
            source,
            FakeMedia::default(),
        );

        let err = p.run(&run).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Acquisition(AccumulateError::Search(_))
        ));
        assert!(p.media.ops().is_empty());
        assert_cleaned(&run);
    }

    #[tokio::test]
    async fn exhausted_pool_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let (mut p, run) = pipeline(
            &root,
            FakeSynth::new(30.0),
            FakeRecognizer::hello_world(),
            ocean(),
            FakeMedia::default(),
        );

        let err = p.run(&run).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Acquisition(AccumulateError::PoolExhausted { pool: 4, .. })
        ));
        assert_cleaned(&run);
    }

    #[tokio::test]
    async fn recognizer_failure_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let mut stt = FakeRecognizer::hello_world();
        stt.fail = true;
        let (mut p, run) = pipeline(&root, FakeSynth::new(1.0), stt, ocean(), FakeMedia::default());

        let err = p.run(&run).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Stage { stage: Stage::SubtitleGeneration, .. }
        ));
        assert!(!p.media.ops().contains(&"burn".to_string()));
        assert_cleaned(&run);
    }

    #[tokio::test]
    async fn existing_work_dir_is_reused_then_removed() {
        let root = tempfile::tempdir().unwrap();
        let (mut p, run) = pipeline(
            &root,
            FakeSynth::new(1.0),
            FakeRecognizer::hello_world(),
            ocean(),
            FakeMedia::default(),
        );
        std::fs::create_dir_all(&run.clip_dir).unwrap();
        std::fs::write(run.work_dir.join("stale.txt"), b"old").unwrap();

        p.run(&run).await.unwrap();

        assert_cleaned(&run);
    }

    #[tokio::test]
    async fn unwritable_clip_dir_fails_at_init() {
        let root = tempfile::tempdir().unwrap();
        let (mut p, mut run) = pipeline(
            &root,
            FakeSynth::new(1.0),
            FakeRecognizer::hello_world(),
            ocean(),
            FakeMedia::default(),
        );
        let blocker = root.path().join("blocker");
        std::fs::write(&blocker, b"not a dir").unwrap();
        run.clip_dir = blocker.join("pexels");

        let err = p.run(&run).await.unwrap_err();

        assert!(matches!(err, PipelineError::Stage { stage: Stage::Init, .. }));
        assert!(p.tts.voices.lock().unwrap().is_empty());
        assert!(!run.output.exists());
        assert!(blocker.is_file());
        assert_cleaned(&run);
    }

    #[tokio::test]
    async fn failed_move_to_output_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let (mut p, mut run) = pipeline(
            &root,
            FakeSynth::new(1.0),
            FakeRecognizer::hello_world(),
            ocean(),
            FakeMedia::default(),
        );
        run.output = root.path().join("missing/video.mp4");

        let err = p.run(&run).await.unwrap_err();

        match err {
            PipelineError::Stage { stage, diagnostic } => {
                assert_eq!(stage, Stage::Done);
                assert!(diagnostic.contains("missing"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(p.media.ops().last().map(String::as_str), Some("burn"));
        assert!(!run.output.exists());
        assert_cleaned(&run);
    }

    fn run_with(tmp: &str, pexels: &str, output: &str) -> Result<PipelineRun, ConfigError> {
        let config = Config {
            tmp_folder: PathBuf::from(tmp),
            pexels_folder: PathBuf::from(pexels),
            ..Config::default()
        };
        PipelineRun::new(
            &config,
            "Hello world".to_string(),
            "ocean".to_string(),
            EffectSet::none(),
            None,
            PathBuf::from(output),
        )
    }

    #[test]
    fn output_inside_a_scratch_dir_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let tmp = root.path().join("tmp");
        let clips = root.path().join("clips");
        let tmp = tmp.to_str().unwrap();
        let clips = clips.to_str().unwrap();

        let err = run_with(tmp, clips, &format!("{}/video.mp4", tmp)).unwrap_err();
        assert!(matches!(err, ConfigError::UnsafeWorkDir { .. }));

        let err = run_with(tmp, clips, &format!("{}/sub/../video.mp4", clips)).unwrap_err();
        match err {
            ConfigError::UnsafeWorkDir { dir, path } => {
                assert_eq!(dir, PathBuf::from(clips));
                assert_eq!(path, PathBuf::from(clips).join("video.mp4"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let ok = run_with(tmp, clips, &format!("{}/video.mp4", root.path().display()));
        assert!(ok.is_ok());
    }

    #[test]
    fn current_dir_as_scratch_dir_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("video.mp4");
        let out = out.to_str().unwrap();

        assert!(matches!(
            run_with(".", "tmp/pexels", out),
            Err(ConfigError::UnsafeWorkDir { .. })
        ));
        assert!(matches!(
            run_with("tmp", "..", out),
            Err(ConfigError::UnsafeWorkDir { .. })
        ));
        assert!(matches!(
            run_with("tmp", "/", out),
            Err(ConfigError::UnsafeWorkDir { .. })
        ));
    }

    #[test]
    fn scratch_dirs_under_current_dir_are_accepted() {
        let run = PipelineRun::new(
            &Config::default(),
            "Hello world".to_string(),
            "ocean".to_string(),
            EffectSet::none(),
            None,
            PathBuf::from("video.mp4"),
        )
        .unwrap();
        assert_eq!(run.work_dir, PathBuf::from("tmp"));
    }

    #[test]
    fn empty_text_is_rejected() {
        let err = PipelineRun::new(
            &Config::default(),
            "  \n".to_string(),
            "ocean".to_string(),
            EffectSet::none(),
            None,
            PathBuf::from("video.mp4"),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyText));
    }
}
