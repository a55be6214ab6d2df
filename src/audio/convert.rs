// Adapts decoded clips to the output device's rate and channel layout

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use thiserror::Error;

use super::Pcm;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("resampler setup failed: {0}")]
    Setup(#[from] rubato::ResamplerConstructionError),
    #[error("resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),
}

/// Convert `pcm` to `sample_rate` / `channels`. A no-op when both already match.
pub fn adapt(pcm: Pcm, sample_rate: u32, channels: u16) -> Result<Pcm, ConvertError> {
    let pcm = resample(pcm, sample_rate)?;
    Ok(remix(pcm, channels))
}

pub fn resample(pcm: Pcm, to_rate: u32) -> Result<Pcm, ConvertError> {
    let frames = pcm.frames();
    if pcm.sample_rate == to_rate || frames == 0 || to_rate == 0 {
        return Ok(pcm);
    }

    let channels = pcm.channels as usize;
    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = to_rate as f64 / pcm.sample_rate as f64;
    // trailing silence pushes the tail of the clip through the filter
    let padding = params.sinc_len;
    let chunk = frames + padding;

    let mut planar: Vec<Vec<f32>> = (0..channels).map(|_| Vec::with_capacity(chunk)).collect();
    for (i, &s) in pcm.samples.iter().enumerate() {
        planar[i % channels].push(s);
    }
    for channel in &mut planar {
        channel.resize(chunk, 0.0);
    }

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk, channels)?;
    let out = resampler.process(&planar, None)?;

    // drop the filter delay from the front, keep exactly the clip's length
    let delay = resampler.output_delay();
    let expected = (frames as f64 * ratio).ceil() as usize;
    let available = out.first().map(|c| c.len()).unwrap_or(0);
    let end = available.min(delay + expected);
    let start = delay.min(end);

    let mut samples = Vec::with_capacity((end - start) * channels);
    for frame in start..end {
        for channel in &out {
            samples.push(channel[frame]);
        }
    }

    Ok(Pcm {
        samples,
        sample_rate: to_rate,
        channels: pcm.channels,
    })
}

/// Map the clip onto `to_channels` output channels. Mono is duplicated,
/// downmixing to mono averages, anything else reuses the nearest source channel.
pub fn remix(pcm: Pcm, to_channels: u16) -> Pcm {
    let from = pcm.channels as usize;
    let to = to_channels as usize;
    if from == to || from == 0 || to == 0 {
        return pcm;
    }

    let mut samples = Vec::with_capacity(pcm.frames() * to);
    for frame in pcm.samples.chunks_exact(from) {
        if to == 1 {
            samples.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            for ch in 0..to {
                samples.push(frame[ch.min(from - 1)]);
            }
        }
    }

    Pcm {
        samples,
        sample_rate: pcm.sample_rate,
        channels: to_channels,
    }
}
