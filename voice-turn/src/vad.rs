//! RMS-based voice activity detection with an echo-aware threshold and
//! barge-in confirmation, driven purely by the stream of incoming frames
//! (no wall-clock dependency, so it is deterministic under test).

/// Tunables for `Vad`, defaulted per the engine's configuration surface.
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    pub vad_threshold: f32,
    pub vad_silence_ms: f64,
    pub vad_hangover_ms: f64,
    pub min_speech_ms_for_turn: f64,
    pub barge_in_min_ms: f64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            vad_threshold: 0.015,
            vad_silence_ms: 280.0,
            vad_hangover_ms: 180.0,
            min_speech_ms_for_turn: 180.0,
            barge_in_min_ms: 220.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VadEvent {
    Start,
    Stop { speech_duration_ms: f64 },
    BargeInConfirmed,
    BargeInCancelled,
}

#[derive(Debug)]
pub struct Vad {
    config: VadConfig,
    speech_active: bool,
    silence_accum_ms: f64,
    speech_duration_ms: f64,
    barge_in_tracking: bool,
    barge_in_speech_ms: f64,
    barge_in_resolved: bool,
}

/// Computes RMS over 16-bit signed PCM samples, normalized to `[0, 1]`.
pub fn rms_i16(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let norm = s as f64 / 32768.0;
            norm * norm
        })
        .sum();
    ((sum_sq / samples.len() as f64).sqrt()) as f32
}

/// Decodes little-endian PCM16 bytes into samples, for callers holding raw frame bytes.
pub fn samples_from_pcm16_le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

impl Vad {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            speech_active: false,
            silence_accum_ms: 0.0,
            speech_duration_ms: 0.0,
            barge_in_tracking: false,
            barge_in_speech_ms: 0.0,
            barge_in_resolved: false,
        }
    }

    pub fn speech_active(&self) -> bool {
        self.speech_active
    }

    /// The RMS threshold above which a frame counts as speech; lowered while
    /// the assistant is speaking to stay sensitive to barge-in despite echo.
    pub fn effective_threshold(&self, assistant_speaking: bool) -> f32 {
        if assistant_speaking {
            (self.config.vad_threshold * 0.55).max(0.003)
        } else {
            self.config.vad_threshold
        }
    }

    pub fn min_speech_ms_for_turn(&self) -> f64 {
        self.config.min_speech_ms_for_turn
    }

    /// Feeds one frame's RMS and duration through the state machine, returning
    /// any VAD/barge-in events the frame triggered.
    pub fn on_frame(
        &mut self,
        rms: f32,
        duration_ms: f64,
        assistant_speaking: bool,
    ) -> Vec<VadEvent> {
        let mut events = Vec::new();
        let effective = self.effective_threshold(assistant_speaking);
        let is_speech = rms >= effective;

        if assistant_speaking {
            if is_speech {
                if !self.barge_in_tracking {
                    self.barge_in_tracking = true;
                    self.barge_in_speech_ms = 0.0;
                    self.barge_in_resolved = false;
                }
                if !self.barge_in_resolved {
                    self.barge_in_speech_ms += duration_ms;
                    if self.barge_in_speech_ms >= self.config.barge_in_min_ms {
                        self.barge_in_resolved = true;
                        events.push(VadEvent::BargeInConfirmed);
                    }
                }
            } else if self.barge_in_tracking {
                if !self.barge_in_resolved {
                    events.push(VadEvent::BargeInCancelled);
                }
                self.barge_in_tracking = false;
                self.barge_in_speech_ms = 0.0;
                self.barge_in_resolved = false;
            }
        } else {
            self.barge_in_tracking = false;
            self.barge_in_speech_ms = 0.0;
            self.barge_in_resolved = false;
        }

        if is_speech {
            if !self.speech_active {
                self.speech_active = true;
                self.speech_duration_ms = 0.0;
                events.push(VadEvent::Start);
            }
            self.speech_duration_ms += duration_ms;
            self.silence_accum_ms = 0.0;
        } else if self.speech_active {
            self.silence_accum_ms += duration_ms;
            if self.silence_accum_ms >= self.config.vad_silence_ms + self.config.vad_hangover_ms {
                self.speech_active = false;
                let speech_duration_ms = self.speech_duration_ms;
                self.speech_duration_ms = 0.0;
                self.silence_accum_ms = 0.0;
                events.push(VadEvent::Stop { speech_duration_ms });
            }
        }

        events
    }
}
