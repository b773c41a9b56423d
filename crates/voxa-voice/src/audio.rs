//! Normalized audio handle and container helpers.

use crate::error::AdapterError;
use std::io::Cursor;

/// Sample rate every transcriber expects.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;
/// Channel count every transcriber expects.
pub const TARGET_CHANNELS: u16 = 1;
/// Bits per sample every transcriber expects (signed PCM).
pub const TARGET_BITS_PER_SAMPLE: u16 = 16;

/// Mono 16 kHz s16le audio in a WAV container, validated on construction.
#[derive(Debug, Clone)]
pub struct NormalizedAudio {
    wav: Vec<u8>,
    samples: u32,
}

impl NormalizedAudio {
    /// Validates that `wav` is a mono 16 kHz signed 16-bit WAV.
    pub fn from_wav(wav: Vec<u8>) -> Result<Self, AdapterError> {
        let reader = hound::WavReader::new(Cursor::new(&wav))
            .map_err(|e| AdapterError::InvalidResponse(format!("not a WAV stream: {}", e)))?;
        let spec = reader.spec();

        if spec.channels != TARGET_CHANNELS
            || spec.sample_rate != TARGET_SAMPLE_RATE
            || spec.bits_per_sample != TARGET_BITS_PER_SAMPLE
            || spec.sample_format != hound::SampleFormat::Int
        {
            return Err(AdapterError::InvalidResponse(format!(
                "unexpected audio shape: {} ch, {} Hz, {} bit {:?}",
                spec.channels, spec.sample_rate, spec.bits_per_sample, spec.sample_format
            )));
        }

        let samples = reader.duration();
        Ok(Self { wav, samples })
    }

    /// The WAV bytes, header included.
    pub fn wav_bytes(&self) -> &[u8] {
        &self.wav
    }

    pub fn sample_count(&self) -> u32 {
        self.samples
    }

    pub fn duration_ms(&self) -> u64 {
        u64::from(self.samples) * 1000 / u64::from(TARGET_SAMPLE_RATE)
    }
}

/// Wraps raw mono s16le PCM into a WAV container.
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>, AdapterError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| AdapterError::Process(format!("failed to start WAV writer: {}", e)))?;
        for chunk in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))
                .map_err(|e| AdapterError::Process(format!("failed to write sample: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| AdapterError::Process(format!("failed to finalize WAV: {}", e)))?;
    }
    Ok(cursor.into_inner())
}

/// Container formats recognised by magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioContainer {
    Wav,
    Mp3,
    Ogg,
    Flac,
    Webm,
}

impl AudioContainer {
    /// Detects the container from the first bytes of a file.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WAVE" {
            Some(Self::Wav)
        } else if data.len() >= 3 && &data[..3] == b"ID3" {
            Some(Self::Mp3)
        } else if data.len() >= 2 && data[0] == 0xFF && (data[1] & 0xE0) == 0xE0 {
            Some(Self::Mp3)
        } else if data.len() >= 4 && &data[..4] == b"OggS" {
            Some(Self::Ogg)
        } else if data.len() >= 4 && &data[..4] == b"fLaC" {
            Some(Self::Flac)
        } else if data.len() >= 4 && data[..4] == [0x1A, 0x45, 0xDF, 0xA3] {
            Some(Self::Webm)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
            Self::Flac => "flac",
            Self::Webm => "webm",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent_pcm(samples: usize) -> Vec<u8> {
        vec![0u8; samples * 2]
    }

    #[test]
    fn normalized_audio_accepts_target_shape() {
        let wav = pcm_to_wav(&silent_pcm(16_000), TARGET_SAMPLE_RATE).unwrap();
        let audio = NormalizedAudio::from_wav(wav).unwrap();
        assert_eq!(audio.sample_count(), 16_000);
        assert_eq!(audio.duration_ms(), 1000);
    }

    #[test]
    fn normalized_audio_rejects_wrong_rate() {
        let wav = pcm_to_wav(&silent_pcm(100), 44_100).unwrap();
        match NormalizedAudio::from_wav(wav) {
            Err(AdapterError::InvalidResponse(msg)) => assert!(msg.contains("44100 Hz")),
            other => panic!("expected InvalidResponse, got {:?}", other),
        }
    }

    #[test]
    fn normalized_audio_rejects_garbage() {
        assert!(NormalizedAudio::from_wav(b"definitely not audio".to_vec()).is_err());
    }

    #[test]
    fn detect_containers() {
        let wav = pcm_to_wav(&silent_pcm(4), 16_000).unwrap();
        assert_eq!(AudioContainer::detect(&wav), Some(AudioContainer::Wav));
        assert_eq!(AudioContainer::detect(b"ID3\x04rest"), Some(AudioContainer::Mp3));
        assert_eq!(AudioContainer::detect(&[0xFF, 0xFB, 0x90, 0x00]), Some(AudioContainer::Mp3));
        assert_eq!(AudioContainer::detect(b"OggS\0\0"), Some(AudioContainer::Ogg));
        assert_eq!(
            AudioContainer::detect(&[0x1A, 0x45, 0xDF, 0xA3, 0x01]),
            Some(AudioContainer::Webm)
        );
        assert_eq!(AudioContainer::detect(b"hello"), None);
        assert_eq!(AudioContainer::Mp3.extension(), "mp3");
    }
}
