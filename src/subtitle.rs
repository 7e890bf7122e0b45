use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// Words per caption, same grouping the recognizer's own SRT output uses.
pub const WORDS_PER_CUE: usize = 7;
const LINE_WIDTH: usize = 80;

#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct SubtitleAsset {
    pub path: PathBuf,
    pub cues: usize,
}

fn punctuation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[,.!?;:]+$").expect("valid regex"))
}

// "[BLANK_AUDIO]", "(music)" and friends
fn annotation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\[[^\]]*\]|\([^)]*\))$").expect("valid regex"))
}

/// Groups recognized words into captions of at most `WORDS_PER_CUE` words.
/// Bare punctuation tokens are glued to the word before them.
pub fn cues_from_words(words: &[Word]) -> Vec<Cue> {
    let mut merged: Vec<Word> = Vec::with_capacity(words.len());
    for word in words {
        let text = word.text.trim();
        if text.is_empty() || annotation_re().is_match(text) {
            continue;
        }
        if punctuation_re().is_match(text) {
            if let Some(prev) = merged.last_mut() {
                prev.text.push_str(text);
                prev.end = prev.end.max(word.end);
            }
            continue;
        }
        merged.push(Word {
            start: word.start,
            end: word.end.max(word.start),
            text: text.to_string(),
        });
    }

    merged
        .chunks(WORDS_PER_CUE)
        .map(|group| Cue {
            start: group[0].start,
            end: group[group.len() - 1].end,
            text: group
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        })
        .collect()
}

pub fn write_srt(path: &Path, cues: &[Cue]) -> io::Result<()> {
    let mut f = BufWriter::new(File::create(path)?);
    for (i, cue) in cues.iter().enumerate() {
        writeln!(f, "{}", i + 1)?;
        writeln!(f, "{} --> {}", format_srt_time(cue.start), format_srt_time(cue.end))?;
        for line in wrap_text(&cue.text, LINE_WIDTH) {
            writeln!(f, "{}", line)?;
        }
        writeln!(f)?;
    }
    f.flush()
}

fn format_srt_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_sec = total_ms / 1000;
    let s = total_sec % 60;
    let total_min = total_sec / 60;
    let m = total_min % 60;
    let h = total_min / 60;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

fn wrap_text(s: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in s.split_whitespace() {
        if current.len() + word.len() + 1 > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
