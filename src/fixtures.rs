// In-memory clips for tests and local experiments

use std::io::Cursor;

/// 16-bit WAV holding `frames` frames of a 440Hz tone
pub fn tone_wav(
    sample_rate: u32,
    channels: u16,
    frames: usize,
) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let s = ((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 8000.0) as i16;
            for _ in 0..channels {
                writer.write_sample(s)?;
            }
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// A 100ms mono clip at 8kHz
pub fn short_clip() -> Result<Vec<u8>, hound::Error> {
    tone_wav(8000, 1, 800)
}

/// Mono 8kHz clip lasting `millis`
pub fn clip_of(millis: u32) -> Result<Vec<u8>, hound::Error> {
    tone_wav(8000, 1, 8 * millis as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_of_has_requested_length() {
        let reader = hound::WavReader::new(Cursor::new(clip_of(250).unwrap())).unwrap();
        assert_eq!(reader.duration(), 2000);
        assert_eq!(reader.spec().sample_rate, 8000);
    }
}
