use std::path::Path;
use std::sync::Arc;

use crate::dtype::{Sf2Error, RENDER_BLOCK};
use crate::envelope::Segment;
use crate::math;
use crate::sf2::{LoopMode, SoundFont};
use crate::stream::{FileStream, MemoryStream, Stream};
use crate::voice::Voice;

pub mod channel;

use channel::Channels;

/// The synthesizer front-end: owns the voice pool and optional MIDI channel
/// state over a shared, immutable [`SoundFont`].
///
/// All operations must be serialized by the caller; the engine is
/// single-threaded by contract. One narrow accommodation exists: after
/// [`Synth::set_max_voices`], rendering on one thread while another queues
/// note events is quasi-safe for that single producer/consumer split only
/// (voice-ending transitions are applied twice to shrink the race window).
/// It is not a synchronization guarantee.
pub struct Synth {
    pub(crate) font: Arc<SoundFont>,
    pub(crate) voices: Vec<Voice>,
    pub(crate) channels: Option<Channels>,
    pub(crate) max_voice_num: usize,
    pub(crate) voice_play_index: u32,
    pub(crate) global_gain_db: f32,
}

impl Clone for Synth {
    /// Shallow clone: the font is shared, voice and channel state start
    /// fresh.
    fn clone(&self) -> Synth {
        Synth {
            font: Arc::clone(&self.font),
            voices: Vec::new(),
            channels: None,
            max_voice_num: self.max_voice_num,
            voice_play_index: self.voice_play_index,
            global_gain_db: self.global_gain_db,
        }
    }
}

impl Synth {
    pub fn load<S: Stream>(stream: &mut S) -> Result<Synth, Sf2Error> {
        let font = SoundFont::load(stream)?;
        Ok(Synth {
            font: Arc::new(font),
            voices: Vec::new(),
            channels: None,
            max_voice_num: 0,
            voice_play_index: 0,
            global_gain_db: 0.0,
        })
    }

    pub fn load_memory(data: &[u8]) -> Result<Synth, Sf2Error> {
        Synth::load(&mut MemoryStream::new(data))
    }

    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Synth, Sf2Error> {
        Synth::load(&mut FileStream::open(path)?)
    }

    pub fn font(&self) -> &SoundFont {
        &self.font
    }

    /// Stops everything immediately: every voice slot is freed and the
    /// channel state is dropped.
    pub fn reset(&mut self) {
        for voice in &mut self.voices {
            voice.kill();
        }
        self.channels = None;
    }

    /// Sets the global output volume as a linear factor (1.0 = unchanged).
    pub fn set_volume(&mut self, volume: f32) {
        self.global_gain_db = if volume == 1.0 {
            0.0
        } else {
            -math::gain_to_decibels(1.0 / volume)
        };
    }

    pub fn get_volume(&self) -> f32 {
        math::decibels_to_gain(self.global_gain_db)
    }

    /// Caps polyphony at `max_voices` pre-allocated slots. With a cap in
    /// place, running out of slots steals the voice furthest into its
    /// release instead of growing the pool; with no voice in release the
    /// new region is dropped. The pool never shrinks below its current
    /// size.
    pub fn set_max_voices(&mut self, max_voices: usize) {
        let new_num = self.voices.len().max(max_voices);
        self.voices.resize_with(new_num, Voice::default);
        self.max_voice_num = new_num;
    }

    pub fn preset_count(&self) -> usize {
        self.font.presets.len()
    }

    pub fn preset_name(&self, preset_index: usize) -> Option<&str> {
        self.font.presets.get(preset_index).map(|p| p.name.as_str())
    }

    /// Finds the index of the preset with the given bank and preset number.
    pub fn preset_index(&self, bank: u16, preset_number: u16) -> Option<usize> {
        self.font
            .presets
            .iter()
            .position(|p| p.preset == preset_number && p.bank == bank)
    }

    pub fn bank_preset_name(&self, bank: u16, preset_number: u16) -> Option<&str> {
        self.preset_name(self.preset_index(bank, preset_number)?)
    }

    /// Starts a note: one voice per region of the preset whose key and
    /// velocity ranges match. An out-of-range preset index is a silent
    /// no-op, indistinguishable from success, so sequencers never fail
    /// mid-performance. A velocity of zero (or below) acts as a note-off.
    pub fn note_on(&mut self, preset_index: usize, key: u8, vel: f32) {
        if preset_index >= self.font.presets.len() {
            return;
        }
        if vel <= 0.0 {
            self.note_off(preset_index, key);
            return;
        }
        let midi_velocity = (vel * 127.0) as i16;
        let play_index = self.voice_play_index;
        self.voice_play_index = self.voice_play_index.wrapping_add(1);
        let repeats = self.end_repeats();

        let font = Arc::clone(&self.font);
        for (region_index, region) in font.presets[preset_index].regions.iter().enumerate() {
            if key < region.lokey || key > region.hikey {
                continue;
            }
            if midi_velocity < region.lovel as i16 || midi_velocity > region.hivel as i16 {
                continue;
            }

            let mut free: Option<usize> = None;
            if region.group != 0 {
                // An exclusive class cuts every voice of the same preset
                // and group before the new one starts.
                for vi in 0..self.voices.len() {
                    let playing_preset = self.voices[vi].playing_preset;
                    let same_group = playing_preset == preset_index as i32
                        && font.presets[preset_index].regions[self.voices[vi].region_index].group
                            == region.group;
                    if same_group {
                        self.voices[vi].end_quick(repeats);
                    } else if playing_preset == -1 && free.is_none() {
                        free = Some(vi);
                    }
                }
            } else {
                free = self.voices.iter().position(Voice::is_free);
            }

            let slot = match free {
                Some(slot) => slot,
                None if self.max_voice_num > 0 => {
                    let mut best: Option<usize> = None;
                    let mut best_done = -999_999_999;
                    for (vi, v) in self.voices.iter().enumerate() {
                        if v.ampenv.segment == Segment::Release {
                            let done =
                                v.ampenv.release_samples() - v.ampenv.samples_until_next_segment;
                            if done > best_done {
                                best_done = done;
                                best = Some(vi);
                            }
                        }
                    }
                    match best {
                        Some(vi) => {
                            self.voices[vi].kill();
                            vi
                        }
                        // Nothing is releasing; drop this region.
                        None => continue,
                    }
                }
                None => {
                    // Unbounded mode grows the pool a few slots at a time.
                    let base = self.voices.len();
                    self.voices.resize_with(base + 4, Voice::default);
                    base
                }
            };

            let voice = &mut self.voices[slot];
            voice.region_index = region_index;
            voice.playing_preset = preset_index as i32;
            voice.playing_key = key;
            voice.playing_channel = -1;
            voice.play_index = play_index;
            voice.note_gain_db = self.global_gain_db
                - region.attenuation / 10.0
                - math::gain_to_decibels(1.0 / vel);
            voice.source_sample_position = region.offset as f32;
            let do_loop = region.loop_mode != LoopMode::None && region.loop_start < region.loop_end;
            voice.loop_start = if do_loop { region.loop_start } else { 0 };
            voice.loop_end = if do_loop { region.loop_end } else { 0 };

            if self.channels.is_some() {
                self.setup_channel_voice(slot, region);
            } else {
                self.voices[slot].calc_pitch_ratio(region, 0.0);
            }
            self.voices[slot]
                .ampenv
                .setup(&region.ampenv, key as i32, midi_velocity, true);
        }
    }

    /// Starts a note on a preset addressed by (bank, preset number).
    /// Returns false when no such preset exists.
    pub fn bank_note_on(&mut self, bank: u16, preset_number: u16, key: u8, vel: f32) -> bool {
        match self.preset_index(bank, preset_number) {
            Some(preset_index) => {
                self.note_on(preset_index, key, vel);
                true
            }
            None => false,
        }
    }

    /// Releases the oldest note matching (preset, key). Only the voices
    /// sharing the smallest play index are ended, so retriggered notes
    /// release one chord at a time.
    pub fn note_off(&mut self, preset_index: usize, key: u8) {
        self.end_oldest_matching(|v| {
            v.playing_preset == preset_index as i32
                && v.playing_key == key
                && v.ampenv.segment < Segment::Release
        });
    }

    pub fn bank_note_off(&mut self, bank: u16, preset_number: u16, key: u8) -> bool {
        match self.preset_index(bank, preset_number) {
            Some(preset_index) => {
                self.note_off(preset_index, key);
                true
            }
            None => false,
        }
    }

    /// Releases every sounding voice.
    pub fn note_off_all(&mut self) {
        for i in 0..self.voices.len() {
            let v = &self.voices[i];
            if v.playing_preset != -1 && v.ampenv.segment < Segment::Release {
                self.end_voice(i);
            }
        }
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_free()).count()
    }

    /// Renders one block of mono 16-bit output. Voices accumulate into a
    /// 32-bit buffer which is saturated per sample on the way out.
    pub fn render_short(&mut self, buffer: &mut [i16; RENDER_BLOCK]) {
        let mut accumulator = [0_i32; RENDER_BLOCK];
        let font = Arc::clone(&self.font);
        for voice in &mut self.voices {
            if voice.playing_preset != -1 {
                let region =
                    &font.presets[voice.playing_preset as usize].regions[voice.region_index];
                voice.render(&font.samples, region, &mut accumulator);
            }
        }
        for (out, &sum) in buffer.iter_mut().zip(accumulator.iter()) {
            *out = sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        }
    }

    pub(crate) fn end_repeats(&self) -> u32 {
        if self.max_voice_num > 0 {
            2
        } else {
            1
        }
    }

    pub(crate) fn end_voice(&mut self, index: usize) {
        let voice = &self.voices[index];
        if voice.playing_preset < 0 {
            return;
        }
        let loop_mode = self.font.presets[voice.playing_preset as usize].regions
            [voice.region_index]
            .loop_mode;
        let repeats = self.end_repeats();
        self.voices[index].end(loop_mode, repeats);
    }

    /// Two passes: find the smallest play index among matching voices and
    /// the span of slots holding it, then end the matching voices in that
    /// span. The span's first and last entries are known matches.
    pub(crate) fn end_oldest_matching(&mut self, matches: impl Fn(&Voice) -> bool) {
        let mut first: Option<usize> = None;
        let mut last = 0;
        for i in 0..self.voices.len() {
            if !matches(&self.voices[i]) {
                continue;
            }
            match first {
                None => {
                    first = Some(i);
                    last = i;
                }
                Some(f) if self.voices[i].play_index < self.voices[f].play_index => {
                    first = Some(i);
                    last = i;
                }
                Some(f) if self.voices[i].play_index == self.voices[f].play_index => {
                    last = i;
                }
                _ => {}
            }
        }
        let Some(first) = first else {
            return;
        };
        let play_index = self.voices[first].play_index;
        for i in first..=last {
            if i != first
                && i != last
                && (self.voices[i].play_index != play_index || !matches(&self.voices[i]))
            {
                continue;
            }
            self.end_voice(i);
        }
    }
}
