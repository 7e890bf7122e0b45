mod accumulator;
mod args;
mod audio;
mod config;
mod effects;
mod error;
mod media;
mod pexels;
mod pipeline;
mod stt;
mod subtitle;
#[cfg(test)]
mod testing;
mod tts;
mod utils;

use std::fs;
use std::str::FromStr;

use anyhow::Context;
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::args::Args;
use crate::config::Config;
use crate::effects::EffectSet;
use crate::media::FfmpegTool;
use crate::pexels::{PexelsClient, Quality};
use crate::pipeline::{Pipeline, PipelineRun};
use crate::stt::WhisperCli;
use crate::tts::PiperTts;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // .env may carry RUST_LOG, so it is read before the filter is built.
    let dotenv = dotenvy::dotenv();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Ok(path) = dotenv {
        debug!("Loaded environment from {}", path.display());
    }

    info!("Starting short video generation for topic '{}'", args.topic);

    let mut config = Config::from_env()?.with_per_page(args.per_page)?;
    config.pages = args.pages;
    config.max_draws = args.max_draws;
    if let Some(quality) = &args.quality {
        config.quality = Quality::from_str(quality)?;
    }

    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("reading narration text from {}", args.input.display()))?;
    let effects = args
        .fx
        .as_deref()
        .map(EffectSet::parse)
        .unwrap_or_default();
    info!("Effects: {}", effects);

    let run = PipelineRun::new(
        &config,
        text,
        args.topic.clone(),
        effects,
        args.voice.clone(),
        args.out.clone(),
    )?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let footage_rng = StdRng::from_rng(&mut rng)?;

    let mut pipeline = Pipeline::new(
        config.clone(),
        PiperTts::new(&config),
        WhisperCli::new(&config),
        PexelsClient::new(&config, footage_rng),
        FfmpegTool::new(&config),
        rng,
    );
    let out = pipeline.run(&run).await?;

    info!("Process complete: {}", out.display());
    Ok(())
}
