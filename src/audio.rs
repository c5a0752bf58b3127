//! In-memory audio segments and file export.
//!
//! An [`AudioSegment`] is a mono `f32` waveform with its sample rate. The
//! converter loads one segment per chunk, appends them with silence in
//! between, and exports the result once at the end.

use std::{fmt, path::Path, str::FromStr, time::Duration};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Bitrate used for MP3 export when nothing else is configured.
pub const DEFAULT_MP3_BITRATE_KBPS: u32 = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Export format
// ─────────────────────────────────────────────────────────────────────────────

/// Container written by [`AudioSegment::export`].
///
/// Defaults to MP3 when the `mp3` feature is on, WAV otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[cfg_attr(not(feature = "mp3"), default)]
    Wav,
    #[cfg_attr(feature = "mp3", default)]
    Mp3,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Wav => "wav",
            ExportFormat::Mp3 => "mp3",
        }
    }

    /// Whether this build can write the format.
    pub fn is_available(self) -> bool {
        match self {
            ExportFormat::Wav => true,
            ExportFormat::Mp3 => cfg!(feature = "mp3"),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wav" => Ok(ExportFormat::Wav),
            "mp3" => Ok(ExportFormat::Mp3),
            other => Err(format!("unknown export format {other:?} (expected mp3 or wav)")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AudioSegment
// ─────────────────────────────────────────────────────────────────────────────

/// Mono waveform, samples in `[-1.0, 1.0]`.
///
/// A segment with `sample_rate == 0` is "unset": it holds no samples and
/// adopts the rate of the first segment appended to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioSegment {
    sample_rate: u32,
    samples: Vec<f32>,
}

impl AudioSegment {
    /// Empty segment that has no sample rate yet.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { sample_rate, samples }
    }

    /// `duration` of digital silence.
    pub fn silent(duration: Duration, sample_rate: u32) -> Self {
        let n = samples_for(duration, sample_rate);
        Self { sample_rate, samples: vec![0.0; n] }
    }

    /// Read a WAV file (any integer or float PCM, any channel count).
    ///
    /// Multi-channel audio is averaged down to mono.
    pub fn from_wav_file(path: &Path) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .with_context(|| format!("Cannot open WAV: {}", path.display()))?;
        let spec = reader.spec();

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .with_context(|| format!("Corrupt WAV data: {}", path.display()))?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<std::result::Result<_, _>>()
                    .with_context(|| format!("Corrupt WAV data: {}", path.display()))?
            }
        };

        let channels = usize::from(spec.channels.max(1));
        let samples = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect()
        };

        Ok(Self { sample_rate: spec.sample_rate, samples })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Append `other` to the end of this segment.
    ///
    /// Fails when both segments carry samples at different rates; the
    /// engines used here never resample.
    pub fn append(&mut self, other: &AudioSegment) -> Result<()> {
        if other.samples.is_empty() {
            if self.sample_rate == 0 {
                self.sample_rate = other.sample_rate;
            }
            return Ok(());
        }
        if self.samples.is_empty() {
            self.sample_rate = other.sample_rate;
        } else if self.sample_rate != other.sample_rate {
            bail!(
                "Sample rate mismatch: segment is {} Hz, appended audio is {} Hz",
                self.sample_rate,
                other.sample_rate
            );
        }
        self.samples.extend_from_slice(&other.samples);
        Ok(())
    }

    /// Append `duration` of silence at this segment's rate.
    pub fn append_silence(&mut self, duration: Duration) {
        let n = samples_for(duration, self.sample_rate);
        self.samples.resize(self.samples.len() + n, 0.0);
    }

    // ── Export ────────────────────────────────────────────────────────────────

    /// Write the segment to `path` in `format`.
    ///
    /// `bitrate_kbps` only affects MP3.
    pub fn export(&self, path: &Path, format: ExportFormat, bitrate_kbps: u32) -> Result<()> {
        if self.sample_rate == 0 {
            bail!("Cannot export audio without a sample rate");
        }
        match format {
            ExportFormat::Wav => self.write_wav(path)?,
            ExportFormat::Mp3 => self.write_mp3(path, bitrate_kbps)?,
        }
        tracing::info!(
            path = %path.display(),
            samples = self.samples.len(),
            seconds = self.duration().as_secs_f32(),
            %format,
            "audio exported"
        );
        Ok(())
    }

    /// Write a 16-bit PCM mono WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("Cannot create WAV: {}", path.display()))?;
        for &s in &self.samples {
            writer.write_sample(to_i16(s)).context("WAV write error")?;
        }
        writer.finalize().context("WAV finalise error")?;
        Ok(())
    }

    #[cfg(feature = "mp3")]
    fn write_mp3(&self, path: &Path, bitrate_kbps: u32) -> Result<()> {
        let bytes = self.encode_mp3(bitrate_kbps)?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Cannot write MP3: {}", path.display()))
    }

    #[cfg(not(feature = "mp3"))]
    fn write_mp3(&self, path: &Path, _bitrate_kbps: u32) -> Result<()> {
        bail!(
            "MP3 export is not available in this build (rebuild with --features mp3): {}",
            path.display()
        )
    }

    /// Encode the whole segment as a mono constant-bitrate MP3 stream.
    #[cfg(feature = "mp3")]
    pub fn encode_mp3(&self, bitrate_kbps: u32) -> Result<Vec<u8>> {
        use anyhow::anyhow;
        use mp3lame_encoder::{Builder, FlushNoGap, MonoPcm, Quality};

        let mut builder = Builder::new().context("Failed to create LAME builder")?;
        builder
            .set_num_channels(1)
            .map_err(|e| anyhow!("LAME rejected channel count: {e:?}"))?;
        builder
            .set_sample_rate(self.sample_rate)
            .map_err(|e| anyhow!("LAME rejected sample rate {}: {e:?}", self.sample_rate))?;
        builder
            .set_brate(lame_bitrate(bitrate_kbps))
            .map_err(|e| anyhow!("LAME rejected bitrate {bitrate_kbps}k: {e:?}"))?;
        builder
            .set_quality(Quality::Good)
            .map_err(|e| anyhow!("LAME rejected quality: {e:?}"))?;
        let mut encoder = builder.build().map_err(|e| anyhow!("LAME init failed: {e:?}"))?;

        let pcm: Vec<i16> = self.samples.iter().map(|&s| to_i16(s)).collect();
        let mut out: Vec<u8> = Vec::new();
        out.reserve(mp3lame_encoder::max_required_buffer_size(pcm.len()));

        let written = encoder
            .encode(MonoPcm(&pcm), out.spare_capacity_mut())
            .map_err(|e| anyhow!("MP3 encode failed: {e:?}"))?;
        // SAFETY: LAME initialised exactly `written` bytes of the spare capacity.
        unsafe { out.set_len(out.len() + written) };

        out.reserve(7_200);
        let written = encoder
            .flush::<FlushNoGap>(out.spare_capacity_mut())
            .map_err(|e| anyhow!("MP3 flush failed: {e:?}"))?;
        // SAFETY: as above.
        unsafe { out.set_len(out.len() + written) };

        Ok(out)
    }
}

/// Nearest LAME bitrate at or above `kbps` (capped at 320).
#[cfg(feature = "mp3")]
fn lame_bitrate(kbps: u32) -> mp3lame_encoder::Bitrate {
    use mp3lame_encoder::Bitrate::*;
    match kbps {
        0..=8 => Kbps8,
        9..=16 => Kbps16,
        17..=24 => Kbps24,
        25..=32 => Kbps32,
        33..=40 => Kbps40,
        41..=48 => Kbps48,
        49..=64 => Kbps64,
        65..=80 => Kbps80,
        81..=96 => Kbps96,
        97..=112 => Kbps112,
        113..=128 => Kbps128,
        129..=160 => Kbps160,
        161..=192 => Kbps192,
        193..=224 => Kbps224,
        225..=256 => Kbps256,
        _ => Kbps320,
    }
}

/// Convert f32 [-1.0, 1.0] → i16 [-32768, 32767].
fn to_i16(s: f32) -> i16 {
    (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

fn samples_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * f64::from(sample_rate)).round() as usize
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_length() {
        let s = AudioSegment::silent(Duration::from_millis(500), 22_050);
        assert_eq!(s.len(), 11_025);
        assert_eq!(s.duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_empty_adopts_rate_on_append() {
        let mut combined = AudioSegment::empty();
        assert_eq!(combined.duration(), Duration::ZERO);
        combined.append(&AudioSegment::from_samples(vec![0.5; 100], 16_000)).unwrap();
        assert_eq!(combined.sample_rate(), 16_000);
        assert_eq!(combined.len(), 100);
    }

    #[test]
    fn test_append_rate_mismatch_fails() {
        let mut a = AudioSegment::from_samples(vec![0.1; 10], 22_050);
        let b = AudioSegment::from_samples(vec![0.1; 10], 24_000);
        assert!(a.append(&b).is_err());
        assert_eq!(a.len(), 10);
    }

    #[test]
    fn test_append_empty_is_noop() {
        let mut a = AudioSegment::from_samples(vec![0.1; 10], 22_050);
        a.append(&AudioSegment::from_samples(Vec::new(), 8_000)).unwrap();
        assert_eq!(a.len(), 10);
        assert_eq!(a.sample_rate(), 22_050);
    }

    #[test]
    fn test_append_silence() {
        let mut a = AudioSegment::from_samples(vec![0.3; 10], 1_000);
        a.append_silence(Duration::from_millis(250));
        assert_eq!(a.len(), 260);
        assert!(a.samples()[10..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_wav_export_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let samples: Vec<f32> = (0..2_205).map(|i| ((i as f32) / 50.0).sin() * 0.5).collect();
        let seg = AudioSegment::from_samples(samples.clone(), 22_050);

        seg.export(&path, ExportFormat::Wav, DEFAULT_MP3_BITRATE_KBPS).unwrap();
        let back = AudioSegment::from_wav_file(&path).unwrap();

        assert_eq!(back.sample_rate(), 22_050);
        assert_eq!(back.len(), samples.len());
        for (a, b) in samples.iter().zip(back.samples()) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn test_stereo_wav_downmixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..4 {
            w.write_sample(16_384i16).unwrap();
            w.write_sample(0i16).unwrap();
        }
        w.finalize().unwrap();

        let seg = AudioSegment::from_wav_file(&path).unwrap();
        assert_eq!(seg.len(), 4);
        assert!((seg.samples()[0] - 0.25).abs() < 1e-4);
    }

    #[test]
    fn test_export_requires_rate() {
        let dir = tempfile::tempdir().unwrap();
        let err = AudioSegment::empty()
            .export(&dir.path().join("x.wav"), ExportFormat::Wav, 64)
            .unwrap_err();
        assert!(err.to_string().contains("sample rate"));
    }

    #[test]
    fn test_format_parse_and_extension() {
        assert_eq!("MP3".parse::<ExportFormat>().unwrap(), ExportFormat::Mp3);
        assert_eq!("wav".parse::<ExportFormat>().unwrap().extension(), "wav");
        assert!("ogg".parse::<ExportFormat>().is_err());
        assert!(ExportFormat::Wav.is_available());
        assert_eq!(ExportFormat::Mp3.is_available(), cfg!(feature = "mp3"));
    }

    #[test]
    fn test_default_format_is_available() {
        let format = ExportFormat::default();
        assert!(format.is_available());
        assert_eq!(format == ExportFormat::Mp3, cfg!(feature = "mp3"));
    }

    #[cfg(not(feature = "mp3"))]
    #[test]
    fn test_mp3_export_unavailable_without_feature() {
        let dir = tempfile::tempdir().unwrap();
        let seg = AudioSegment::silent(Duration::from_millis(10), 22_050);
        assert!(seg.export(&dir.path().join("x.mp3"), ExportFormat::Mp3, 64).is_err());
    }

    #[cfg(feature = "mp3")]
    #[test]
    fn test_mp3_export_writes_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.mp3");
        let seg = AudioSegment::silent(Duration::from_millis(500), 22_050);
        seg.export(&path, ExportFormat::Mp3, 64).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
