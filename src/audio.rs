use std::path::Path;

use hound::WavReader;

use crate::error::SpeechError;

pub fn wav_duration_seconds(path: &Path) -> Result<f64, SpeechError> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    // duration() is in frames; len() would count every channel
    let frames = reader.duration() as f64;
    if spec.sample_rate == 0 {
        return Ok(0.0);
    }
    Ok(frames / spec.sample_rate as f64)
}

#[cfg(test)]
pub(crate) fn write_silence(path: &Path, seconds: f64, sample_rate: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for _ in 0..(seconds * sample_rate as f64) as usize {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
}
