use crate::dtype::{FAST_RELEASE_SECS, SAMPLE_RATE};
use crate::math;

/// Stages of the six-segment generator, in playback order. A stage with zero
/// duration is skipped entirely when entered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Segment {
    #[default]
    None,
    Delay,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
    Done,
}

/// Envelope timing parameters for one region. Delay/attack/hold/decay/
/// release start out in timecents as stored in the file and are converted to
/// seconds by [`EnvelopeParams::convert_to_seconds`]; sustain becomes a
/// linear gain in 0..=1. Hold and decay stay in timecents when key tracking
/// is active and are converted per note instead.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnvelopeParams {
    pub delay: f32,
    pub attack: f32,
    pub hold: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
    pub keynum_to_hold: f32,
    pub keynum_to_decay: f32,
}

impl EnvelopeParams {
    /// Timecent values this far down are effectively zero-length; the
    /// segment machinery prefers an exact zero so it can fall through.
    const TIMECENT_FLOOR: f32 = -11950.0;

    fn floored_seconds(timecents: f32) -> f32 {
        if timecents < Self::TIMECENT_FLOOR {
            0.0
        } else {
            math::timecents_to_seconds(timecents)
        }
    }

    /// Converts the file-format units to render units. `sustain_is_gain`
    /// selects the volume-envelope interpretation of the sustain value
    /// (centibels of attenuation) over the modulation one (per-mille).
    pub fn convert_to_seconds(&mut self, sustain_is_gain: bool) {
        self.delay = Self::floored_seconds(self.delay);
        self.attack = Self::floored_seconds(self.attack);
        self.release = Self::floored_seconds(self.release);

        // Key-tracked hold/decay stay in timecents until note start.
        if self.keynum_to_hold == 0.0 {
            self.hold = Self::floored_seconds(self.hold);
        }
        if self.keynum_to_decay == 0.0 {
            self.decay = Self::floored_seconds(self.decay);
        }

        if self.sustain < 0.0 {
            self.sustain = 0.0;
        } else if sustain_is_gain {
            self.sustain = math::decibels_to_gain(-self.sustain / 10.0);
        } else {
            self.sustain = 1.0 - self.sustain / 1000.0;
        }
    }
}

/// Running envelope state for one voice.
#[derive(Debug, Clone, Default)]
pub struct VoiceEnvelope {
    pub level: f32,
    pub slope: f32,
    pub samples_until_next_segment: i32,
    pub segment: Segment,
    pub midi_velocity: i16,
    pub parameters: EnvelopeParams,
    pub segment_is_exponential: bool,
    pub is_amp_env: bool,
}

/// Decay and release follow `level * e^(-9.226/duration)` per sample, the
/// exponential law that matches the SF2 96 dB ramp.
const EXP_DECAY: f32 = -9.226;

impl VoiceEnvelope {
    pub fn release_samples(&self) -> i32 {
        let release = if self.parameters.release <= 0.0 {
            FAST_RELEASE_SECS
        } else {
            self.parameters.release
        };
        (release * SAMPLE_RATE as f32) as i32
    }

    pub fn setup(&mut self, parameters: &EnvelopeParams, midi_note: i32, midi_velocity: i16, is_amp_env: bool) {
        self.parameters = *parameters;
        if self.parameters.keynum_to_hold != 0.0 {
            self.parameters.hold += self.parameters.keynum_to_hold * (60 - midi_note) as f32;
            self.parameters.hold = if self.parameters.hold < -10000.0 {
                0.0
            } else {
                math::timecents_to_seconds(self.parameters.hold)
            };
        }
        if self.parameters.keynum_to_decay != 0.0 {
            self.parameters.decay += self.parameters.keynum_to_decay * (60 - midi_note) as f32;
            self.parameters.decay = if self.parameters.decay < -10000.0 {
                0.0
            } else {
                math::timecents_to_seconds(self.parameters.decay)
            };
        }
        self.midi_velocity = midi_velocity;
        self.is_amp_env = is_amp_env;
        self.next_segment(Segment::None);
    }

    /// Enters the segment after `active_segment`. Zero-duration segments
    /// fall through to the one after them in the same call.
    pub fn next_segment(&mut self, active_segment: Segment) {
        let sr = SAMPLE_RATE as f32;

        if active_segment <= Segment::None {
            self.samples_until_next_segment = (self.parameters.delay * sr) as i32;
            if self.samples_until_next_segment > 0 {
                self.segment = Segment::Delay;
                self.segment_is_exponential = false;
                self.level = 0.0;
                self.slope = 0.0;
                return;
            }
        }
        if active_segment <= Segment::Delay {
            self.samples_until_next_segment = (self.parameters.attack * sr) as i32;
            if self.samples_until_next_segment > 0 {
                if !self.is_amp_env {
                    // Modulation attack scales with velocity: a velocity of 1
                    // keeps the full duration, maximum velocity an eighth.
                    self.samples_until_next_segment =
                        (self.parameters.attack * ((145 - self.midi_velocity) as f32 / 144.0) * sr) as i32;
                }
                self.segment = Segment::Attack;
                self.segment_is_exponential = false;
                self.level = 0.0;
                self.slope = 1.0 / self.samples_until_next_segment as f32;
                return;
            }
        }
        if active_segment <= Segment::Attack {
            self.samples_until_next_segment = (self.parameters.hold * sr) as i32;
            if self.samples_until_next_segment > 0 {
                self.segment = Segment::Hold;
                self.segment_is_exponential = false;
                self.level = 1.0;
                self.slope = 0.0;
                return;
            }
        }
        if active_segment <= Segment::Hold {
            self.samples_until_next_segment = (self.parameters.decay * sr) as i32;
            if self.samples_until_next_segment > 0 {
                self.segment = Segment::Decay;
                self.level = 1.0;
                if self.is_amp_env {
                    let per_sample = EXP_DECAY / self.samples_until_next_segment as f32;
                    self.slope = per_sample.exp();
                    self.segment_is_exponential = true;
                    if self.parameters.sustain > 0.0 {
                        // Decay specifies the time to reach silence; cut the
                        // segment short where the curve meets the sustain
                        // level.
                        self.samples_until_next_segment =
                            (self.parameters.sustain.ln() / per_sample) as i32;
                    }
                } else {
                    self.slope = -1.0 / self.samples_until_next_segment as f32;
                    self.samples_until_next_segment =
                        (self.parameters.decay * (1.0 - self.parameters.sustain) * sr) as i32;
                    self.segment_is_exponential = false;
                }
                return;
            }
        }
        if active_segment <= Segment::Decay {
            self.segment = Segment::Sustain;
            self.level = self.parameters.sustain;
            self.slope = 0.0;
            self.samples_until_next_segment = 0x7FFF_FFFF;
            self.segment_is_exponential = false;
            return;
        }
        if active_segment <= Segment::Sustain {
            self.segment = Segment::Release;
            self.samples_until_next_segment = self.release_samples();
            if self.is_amp_env {
                let per_sample = EXP_DECAY / self.samples_until_next_segment as f32;
                self.slope = per_sample.exp();
                self.segment_is_exponential = true;
            } else {
                self.slope = -self.level / self.samples_until_next_segment as f32;
                self.segment_is_exponential = false;
            }
            return;
        }

        self.segment = Segment::Done;
        self.segment_is_exponential = false;
        self.level = 0.0;
        self.slope = 0.0;
        self.samples_until_next_segment = 0x7FF_FFFF;
    }

    /// Advances the envelope by a block of samples.
    pub fn process(&mut self, num_samples: i32) {
        if self.slope != 0.0 {
            if self.segment_is_exponential {
                self.level *= self.slope.powi(num_samples);
            } else {
                self.level += self.slope * num_samples as f32;
            }
        }
        self.samples_until_next_segment -= num_samples;
        if self.samples_until_next_segment <= 0 {
            let segment = self.segment;
            self.next_segment(segment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amp_params(delay: f32, attack: f32, hold: f32, decay: f32, sustain: f32, release: f32) -> EnvelopeParams {
        EnvelopeParams {
            delay,
            attack,
            hold,
            decay,
            sustain,
            release,
            keynum_to_hold: 0.0,
            keynum_to_decay: 0.0,
        }
    }

    #[test]
    fn zero_durations_fall_through_to_sustain() {
        let mut env = VoiceEnvelope::default();
        env.setup(&amp_params(0.0, 0.0, 0.0, 0.0, 0.7, 0.0), 60, 127, true);
        assert_eq!(env.segment, Segment::Sustain);
        assert!((env.level - 0.7).abs() < 1e-6);
    }

    #[test]
    fn attack_ramps_linearly() {
        let mut env = VoiceEnvelope::default();
        // 1 second attack at 11025 Hz.
        env.setup(&amp_params(0.0, 1.0, 0.0, 0.0, 1.0, 0.0), 60, 127, true);
        assert_eq!(env.segment, Segment::Attack);
        env.process(11025 / 2);
        assert!((env.level - 0.5).abs() < 0.01, "level {}", env.level);
        env.process(11025);
        assert_eq!(env.segment, Segment::Sustain);
        assert!((env.level - 1.0).abs() < 1e-6);
    }

    #[test]
    fn delay_holds_level_at_zero() {
        let mut env = VoiceEnvelope::default();
        env.setup(&amp_params(0.5, 0.0, 0.0, 0.0, 1.0, 0.0), 60, 127, true);
        assert_eq!(env.segment, Segment::Delay);
        env.process(128);
        assert_eq!(env.level, 0.0);
    }

    #[test]
    fn release_decays_exponentially_then_finishes() {
        let mut env = VoiceEnvelope::default();
        env.setup(&amp_params(0.0, 0.0, 0.0, 0.0, 1.0, 0.5), 60, 127, true);
        assert_eq!(env.segment, Segment::Sustain);
        env.next_segment(Segment::Sustain);
        assert_eq!(env.segment, Segment::Release);
        let mut last = env.level;
        for _ in 0..10 {
            env.process(128);
            assert!(env.level <= last);
            last = env.level;
        }
        // Running the whole release out lands in Done with level zero.
        env.process(env.samples_until_next_segment);
        assert_eq!(env.segment, Segment::Done);
        assert_eq!(env.level, 0.0);
    }

    #[test]
    fn fast_release_floor_applies_when_release_is_zero() {
        let mut env = VoiceEnvelope::default();
        env.setup(&amp_params(0.0, 0.0, 0.0, 0.0, 1.0, 0.0), 60, 127, true);
        let samples = env.release_samples();
        assert_eq!(samples, (FAST_RELEASE_SECS * SAMPLE_RATE as f32) as i32);
    }

    #[test]
    fn keynum_tracking_adjusts_hold() {
        let mut params = amp_params(0.0, 0.0, 0.0, 0.0, 1.0, 0.0);
        params.hold = 0.0; // timecents: one second
        params.keynum_to_hold = 100.0;
        let mut low = VoiceEnvelope::default();
        low.setup(&params, 48, 127, true);
        let mut high = VoiceEnvelope::default();
        high.setup(&params, 72, 127, true);
        // Lower keys hold longer when the tracking amount is positive.
        assert!(low.samples_until_next_segment > high.samples_until_next_segment);
    }

    #[test]
    fn sustain_conversion() {
        let mut p = amp_params(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        p.convert_to_seconds(true);
        assert!((p.sustain - 1.0).abs() < 1e-6);

        let mut p = amp_params(0.0, 0.0, 0.0, 0.0, 200.0, 0.0);
        p.convert_to_seconds(true);
        // 200 centibels down is 20 dB down.
        assert!((p.sustain - 0.1).abs() < 1e-3);

        let mut p = amp_params(0.0, 0.0, 0.0, 0.0, -5.0, 0.0);
        p.convert_to_seconds(true);
        assert_eq!(p.sustain, 0.0);
    }
}
