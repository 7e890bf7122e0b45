use std::path::PathBuf;

use clap::Parser;

/// Turns a text file into a narrated, subtitled stock-footage short.
#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Text file with the narration
    #[clap(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Stock footage search topic
    #[clap(short = 't', long)]
    pub topic: String,

    /// Comma separated effects: vintage, grayscale
    #[clap(long = "fx", visible_alias = "effects")]
    pub fx: Option<String>,

    /// Narration voice; random when omitted
    #[clap(long)]
    pub voice: Option<String>,

    /// Seed for voice, page and clip selection
    #[clap(long)]
    pub seed: Option<u64>,

    /// Clip quality: hd or sd
    #[clap(long)]
    pub quality: Option<String>,

    /// Search pages to sample from
    #[clap(long, default_value_t = 1)]
    pub pages: u32,

    #[clap(long, default_value_t = 80)]
    pub per_page: u32,

    /// Give up acquiring footage after this many draws
    #[clap(long, default_value_t = 1000)]
    pub max_draws: usize,

    #[clap(long, default_value = "video.mp4")]
    pub out: PathBuf,

    #[clap(short, long)]
    pub verbose: bool,
}
