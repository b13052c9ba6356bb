//! Audio resampler
//!
//! Stateless conversion between the sample rate/channel layout a transport
//! negotiates and the canonical rate a provider adapter expects (16 kHz
//! mono for STT, the negotiated output rate for TTS playback). Each call
//! operates on one self-contained chunk — no carry-over state between
//! calls — which keeps per-chunk latency bounded and avoids the drift that
//! a stateful resampler would need to track across an unreliable transport.

pub fn downmix_to_mono(pcm16: &[u8], channels: u8) -> Vec<u8> {
    if channels <= 1 {
        return pcm16.to_vec();
    }
    let channels = channels as usize;
    let samples: Vec<i16> = pcm16.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])).collect();
    let mut out = Vec::with_capacity(samples.len() / channels * 2);
    for frame in samples.chunks_exact(channels) {
        let avg = frame.iter().map(|&s| s as i32).sum::<i32>() / channels as i32;
        out.extend_from_slice(&(avg as i16).to_le_bytes());
    }
    out
}

/// Linear-interpolation resample from `from_rate` to `to_rate`, operating
/// on mono PCM16. Adequate for the deterministic reference pipeline; a
/// production deployment can swap in a higher-quality resampler behind the
/// same function signature without touching call sites.
pub fn resample_mono(pcm16: &[u8], from_rate: u32, to_rate: u32) -> Vec<u8> {
    if from_rate == to_rate || pcm16.len() < 2 {
        return pcm16.to_vec();
    }
    let samples: Vec<i16> = pcm16.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])).collect();
    let ratio = to_rate as f64 / from_rate as f64;
    let out_len = ((samples.len() as f64) * ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len * 2);
    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos.floor() as usize;
        let frac = src_pos - idx as f64;
        let s0 = *samples.get(idx).unwrap_or(&0) as f64;
        let s1 = samples.get(idx + 1).map(|&s| s as f64).unwrap_or(s0);
        let interp = s0 + (s1 - s0) * frac;
        out.extend_from_slice(&(interp.round() as i16).to_le_bytes());
    }
    out
}

/// Combines downmix and resample in the order a transport-to-STT edge
/// needs: channels collapsed first, then the sample rate converted.
pub fn to_canonical(pcm16: &[u8], from_rate: u32, channels: u8, to_rate: u32) -> Vec<u8> {
    let mono = downmix_to_mono(pcm16, channels);
    resample_mono(&mono, from_rate, to_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len_samples: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len_samples * 2);
        for i in 0..len_samples {
            out.extend_from_slice(&((i as i16) % 1000).to_le_bytes());
        }
        out
    }

    #[test]
    fn downmix_stereo_to_mono_averages_channels() {
        let mut stereo = Vec::new();
        stereo.extend_from_slice(&100i16.to_le_bytes());
        stereo.extend_from_slice(&200i16.to_le_bytes());
        let mono = downmix_to_mono(&stereo, 2);
        let sample = i16::from_le_bytes([mono[0], mono[1]]);
        assert_eq!(sample, 150);
    }

    #[test]
    fn mono_passthrough_is_a_noop() {
        let pcm = tone(160);
        assert_eq!(downmix_to_mono(&pcm, 1), pcm);
    }

    #[test]
    fn resample_same_rate_is_identity() {
        let pcm = tone(160);
        assert_eq!(resample_mono(&pcm, 16_000, 16_000), pcm);
    }

    #[test]
    fn upsampling_roughly_doubles_sample_count() {
        let pcm = tone(160);
        let out = resample_mono(&pcm, 8_000, 16_000);
        assert_eq!(out.len() / 2, 320);
    }

    #[test]
    fn downsampling_roughly_halves_sample_count() {
        let pcm = tone(320);
        let out = resample_mono(&pcm, 16_000, 8_000);
        assert_eq!(out.len() / 2, 160);
    }
}
