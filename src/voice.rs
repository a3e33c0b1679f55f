use crate::dtype::{RENDER_BLOCK, SAMPLE_RATE};
use crate::envelope::{Segment, VoiceEnvelope};
use crate::math;
use crate::sf2::{LoopMode, Region};

/// One active note: a region being played back with its own fractional
/// sample cursor, pitch ratio, gain and amplitude envelope. A voice slot is
/// free when `playing_preset` is -1.
#[derive(Debug, Clone)]
pub struct Voice {
    pub playing_preset: i32,
    pub playing_key: u8,
    /// Channel that started the voice, or -1 for the preset-level API.
    pub playing_channel: i32,
    /// Index of the region within the playing preset.
    pub region_index: usize,
    pub pitch_input_timecents: f32,
    pub pitch_output_factor: f32,
    /// Fractional cursor in absolute sample-pool coordinates.
    pub source_sample_position: f32,
    pub note_gain_db: f32,
    /// Allocation counter shared by all regions of one note-on call, so a
    /// note-off can address the oldest matching chord.
    pub play_index: u32,
    /// Loop bounds copied from the region, or both zero when this voice
    /// does not loop.
    pub loop_start: u32,
    pub loop_end: u32,
    pub ampenv: VoiceEnvelope,
}

impl Default for Voice {
    fn default() -> Voice {
        Voice {
            playing_preset: -1,
            playing_key: 0,
            playing_channel: -1,
            region_index: 0,
            pitch_input_timecents: 0.0,
            pitch_output_factor: 0.0,
            source_sample_position: 0.0,
            note_gain_db: 0.0,
            play_index: 0,
            loop_start: 0,
            loop_end: 0,
            ampenv: VoiceEnvelope::default(),
        }
    }
}

impl Voice {
    pub fn is_free(&self) -> bool {
        self.playing_preset == -1
    }

    pub fn kill(&mut self) {
        self.playing_preset = -1;
    }

    /// Derives the pitch terms from the key being played, the region's
    /// tuning and an extra shift in semitones (pitch wheel and channel
    /// tuning).
    pub fn calc_pitch_ratio(&mut self, region: &Region, pitch_shift: f32) {
        let note = self.playing_key as f32 + region.transpose as f32 + region.tune as f32 / 100.0;
        let adjusted_pitch = region.pitch_keycenter as f32
            + (note - region.pitch_keycenter as f32) * (region.pitch_keytrack as f32 / 100.0)
            + pitch_shift;
        self.pitch_input_timecents = adjusted_pitch * 100.0;
        self.pitch_output_factor = region.sample_rate as f32
            / (math::timecents_to_seconds(region.pitch_keycenter as f32 * 100.0)
                * SAMPLE_RATE as f32);
    }

    /// Moves the envelope into its release stage. With a sustain-looped
    /// region the loop is collapsed so the tail plays through. `repeats` is
    /// 2 when a concurrent render thread may race the transition.
    pub fn end(&mut self, loop_mode: LoopMode, repeats: u32) {
        for _ in 0..repeats {
            self.ampenv.next_segment(Segment::Sustain);
            if loop_mode == LoopMode::Sustain {
                self.loop_end = self.loop_start;
            }
        }
    }

    /// Like [`Voice::end`] but with the release floored to the fast-release
    /// time, for voice stealing and all-sounds-off.
    pub fn end_quick(&mut self, repeats: u32) {
        for _ in 0..repeats {
            self.ampenv.parameters.release = 0.0;
            self.ampenv.next_segment(Segment::Sustain);
        }
    }

    /// Renders one block additively into the mono accumulator. The envelope
    /// advances once per block; the gain within a block is constant. Kills
    /// the voice when the cursor passes the region end or the envelope
    /// finishes.
    pub fn render(&mut self, font_samples: &[i16], region: &Region, output: &mut [i32; RENDER_BLOCK]) {
        let is_looping = self.loop_start < self.loop_end;
        let loop_start = self.loop_start as f32;
        let loop_end = self.loop_end as f32;
        let sample_end = region.end as f32;
        let loop_end_exclusive = loop_end + 1.0;

        let pitch_ratio =
            math::timecents_to_seconds(self.pitch_input_timecents) * self.pitch_output_factor;
        let note_gain = math::decibels_to_gain(self.note_gain_db);
        let gain_mono = (note_gain * self.ampenv.level * 256.0) as i32;

        self.ampenv.process(RENDER_BLOCK as i32);

        let mut position = self.source_sample_position;
        // Steps since the last cursor rebase; folding the product back into
        // `position` only at the loop wrap keeps the per-sample advance free
        // of accumulated rounding.
        let mut steps = 0;
        for out in output.iter_mut() {
            let here = position + steps as f32 * pitch_ratio;
            if here >= sample_end {
                break;
            }
            let Some(&sample) = font_samples.get(here as usize) else {
                break;
            };
            *out += (sample as i32 * gain_mono) >> 8;

            steps += 1;
            if is_looping && position + steps as f32 * pitch_ratio >= loop_end_exclusive {
                position += steps as f32 * pitch_ratio - (loop_end - loop_start + 1.0);
                steps = 0;
            }
        }
        position += steps as f32 * pitch_ratio;

        if position >= sample_end || self.ampenv.segment == Segment::Done {
            self.kill();
            return;
        }
        self.source_sample_position = position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeParams;

    fn flat_region(end: u32) -> Region {
        let mut region = Region::instrument_default();
        region.sample_rate = SAMPLE_RATE;
        region.pitch_keycenter = 60;
        region.end = end;
        region.ampenv = EnvelopeParams {
            sustain: 1.0,
            ..EnvelopeParams::default()
        };
        region
    }

    fn sounding_voice(region: &Region) -> Voice {
        let mut voice = Voice {
            playing_preset: 0,
            playing_key: 60,
            ..Voice::default()
        };
        voice.calc_pitch_ratio(region, 0.0);
        voice.ampenv.setup(&region.ampenv, 60, 127, true);
        voice
    }

    #[test]
    fn unity_pitch_at_keycenter() {
        let region = flat_region(1000);
        let voice = sounding_voice(&region);
        let ratio =
            math::timecents_to_seconds(voice.pitch_input_timecents) * voice.pitch_output_factor;
        assert!((ratio - 1.0).abs() < 1e-4, "ratio {}", ratio);
    }

    #[test]
    fn octave_up_doubles_the_step() {
        let region = flat_region(1000);
        let mut voice = sounding_voice(&region);
        voice.playing_key = 72;
        voice.calc_pitch_ratio(&region, 0.0);
        let ratio =
            math::timecents_to_seconds(voice.pitch_input_timecents) * voice.pitch_output_factor;
        assert!((ratio - 2.0).abs() < 1e-3, "ratio {}", ratio);
    }

    #[test]
    fn voice_dies_past_region_end() {
        let samples = vec![1000_i16; 64];
        let region = flat_region(64);
        let mut voice = sounding_voice(&region);
        let mut acc = [0_i32; RENDER_BLOCK];
        voice.render(&samples, &region, &mut acc);
        assert!(voice.is_free());
        assert_ne!(acc[0], 0);
        assert_eq!(acc[64], 0);
    }

    #[test]
    fn looping_voice_keeps_sounding() {
        let samples = vec![1000_i16; 64];
        let mut region = flat_region(64);
        region.loop_mode = LoopMode::Continuous;
        region.loop_end = 63;
        let mut voice = sounding_voice(&region);
        voice.loop_start = 0;
        voice.loop_end = 63;
        for _ in 0..8 {
            let mut acc = [0_i32; RENDER_BLOCK];
            voice.render(&samples, &region, &mut acc);
            assert!(!voice.is_free());
            assert!(acc.iter().all(|&s| s != 0));
        }
    }
}
