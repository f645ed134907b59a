//! Binary audio frame wire format.
//!
//! Layout (bit-exact): 1B version(=1) | 1B kind | 1B codec(=pcm16) | 1B channels
//! | 4B BE sample_rate_hz | 4B BE seq | 2B BE duration_ms | 2B reserved(=0) | payload.

const FRAME_VERSION: u8 = 1;
const HEADER_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Input = 0,
    Output = 1,
}

impl FrameKind {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(FrameKind::Input),
            1 => Some(FrameKind::Output),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCodec {
    Pcm16 = 0,
}

impl AudioCodec {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AudioCodec::Pcm16),
            _ => None,
        }
    }
}

/// A decoded audio frame: header fields plus owned payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub kind: FrameKind,
    pub codec: AudioCodec,
    pub channels: u8,
    pub sample_rate_hz: u32,
    pub seq: u32,
    pub duration_ms: u16,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("bad_shape: frame shorter than header")]
    TooShort,
    #[error("bad_version: unsupported frame version {0}")]
    BadVersion(u8),
    #[error("bad_shape: unknown frame kind {0}")]
    BadKind(u8),
    #[error("bad_shape: unknown codec {0}")]
    BadCodec(u8),
    #[error("bad_shape: payload length must be even, got {0}")]
    OddPayload(usize),
}

impl AudioFrame {
    /// Computes the expected duration in milliseconds for a given payload size,
    /// per `duration_ms ≈ bytes/2/sample_rate_hz·channels·1000`.
    pub fn expected_duration_ms(payload_len: usize, sample_rate_hz: u32, channels: u8) -> f64 {
        if sample_rate_hz == 0 || channels == 0 {
            return 0.0;
        }
        let samples = payload_len as f64 / 2.0;
        samples / (sample_rate_hz as f64 * channels as f64) * 1000.0
    }

    /// Encodes this frame into its bit-exact wire representation.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        if self.bytes.len() % 2 != 0 {
            return Err(FrameError::OddPayload(self.bytes.len()));
        }
        let mut out = Vec::with_capacity(HEADER_LEN + self.bytes.len());
        out.push(FRAME_VERSION);
        out.push(self.kind as u8);
        out.push(self.codec as u8);
        out.push(self.channels);
        out.extend_from_slice(&self.sample_rate_hz.to_be_bytes());
        out.extend_from_slice(&self.seq.to_be_bytes());
        out.extend_from_slice(&self.duration_ms.to_be_bytes());
        out.extend_from_slice(&[0u8, 0u8]);
        out.extend_from_slice(&self.bytes);
        Ok(out)
    }

    /// Decodes a frame from its bit-exact wire representation.
    pub fn decode(raw: &[u8]) -> Result<Self, FrameError> {
        if raw.len() < HEADER_LEN {
            return Err(FrameError::TooShort);
        }
        let version = raw[0];
        if version != FRAME_VERSION {
            return Err(FrameError::BadVersion(version));
        }
        let kind = FrameKind::from_byte(raw[1]).ok_or(FrameError::BadKind(raw[1]))?;
        let codec = AudioCodec::from_byte(raw[2]).ok_or(FrameError::BadCodec(raw[2]))?;
        let channels = raw[3];
        let sample_rate_hz = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
        let seq = u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]);
        let duration_ms = u16::from_be_bytes([raw[12], raw[13]]);
        // raw[14..16] reserved, ignored on decode.
        let bytes = raw[HEADER_LEN..].to_vec();
        if bytes.len() % 2 != 0 {
            return Err(FrameError::OddPayload(bytes.len()));
        }
        Ok(AudioFrame {
            kind,
            codec,
            channels,
            sample_rate_hz,
            seq,
            duration_ms,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> AudioFrame {
        AudioFrame {
            kind: FrameKind::Input,
            codec: AudioCodec::Pcm16,
            channels: 1,
            sample_rate_hz: 24_000,
            seq: 42,
            duration_ms: 20,
            bytes: vec![0u8; 960],
        }
    }

    #[test]
    fn encode_decode_round_trips_byte_identical() {
        let frame = sample_frame();
        let encoded = frame.encode().unwrap();
        let decoded = AudioFrame::decode(&encoded).unwrap();
        assert_eq!(frame, decoded);
        assert_eq!(encoded, decoded.encode().unwrap());
    }

    #[test]
    fn header_layout_is_bit_exact() {
        let frame = sample_frame();
        let encoded = frame.encode().unwrap();
        assert_eq!(encoded[0], 1); // version
        assert_eq!(encoded[1], 0); // kind = input
        assert_eq!(encoded[2], 0); // codec = pcm16
        assert_eq!(encoded[3], 1); // channels
        assert_eq!(&encoded[4..8], &24_000u32.to_be_bytes());
        assert_eq!(&encoded[8..12], &42u32.to_be_bytes());
        assert_eq!(&encoded[12..14], &20u16.to_be_bytes());
        assert_eq!(&encoded[14..16], &[0, 0]);
        assert_eq!(encoded.len(), HEADER_LEN + 960);
    }

    #[test]
    fn rejects_too_short() {
        assert_eq!(AudioFrame::decode(&[1, 0, 0]), Err(FrameError::TooShort));
    }

    #[test]
    fn rejects_bad_version() {
        let mut encoded = sample_frame().encode().unwrap();
        encoded[0] = 9;
        assert_eq!(AudioFrame::decode(&encoded), Err(FrameError::BadVersion(9)));
    }

    #[test]
    fn rejects_odd_payload() {
        let mut frame = sample_frame();
        frame.bytes.push(0xAB);
        assert_eq!(frame.encode(), Err(FrameError::OddPayload(961)));
    }

    #[test]
    fn expected_duration_matches_within_tolerance() {
        // 960 bytes @ 24kHz mono => 480 samples => 20ms
        let ms = AudioFrame::expected_duration_ms(960, 24_000, 1);
        assert!((ms - 20.0).abs() < 0.01);
    }
}
