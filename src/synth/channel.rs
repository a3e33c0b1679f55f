//! MIDI channel state and control-change interpretation. Channels are
//! optional: they come into existence the first time any channel setter
//! touches them, and the vector grows lazily to cover the highest index
//! used.

use std::sync::Arc;

use crate::envelope::Segment;
use crate::math;
use crate::sf2::Region;

use super::Synth;

#[derive(Debug, Clone, Copy)]
pub struct Channel {
    pub preset_index: u16,
    /// Selected bank; the top bit flags that an explicit bank select MSB
    /// was received and an LSB may combine with it.
    pub bank: u16,
    /// 14-bit, centered at 8192.
    pub pitch_wheel: u16,
    /// Raw 14-bit controller states.
    pub midi_pan: u16,
    pub midi_volume: u16,
    pub midi_expression: u16,
    /// Currently addressed registered parameter; 0xFFFF = none.
    pub midi_rpn: u16,
    pub midi_data: u16,
    /// Derived pan in -0.5..=0.5 added onto region pan.
    pub pan_offset: f32,
    pub gain_db: f32,
    /// Pitch wheel span in semitones.
    pub pitch_range: f32,
    /// Static tuning in semitones.
    pub tuning: f32,
}

impl Default for Channel {
    fn default() -> Channel {
        Channel {
            preset_index: 0,
            bank: 0,
            pitch_wheel: 8192,
            midi_pan: 8192,
            midi_volume: 16383,
            midi_expression: 16383,
            midi_rpn: 0xFFFF,
            midi_data: 0,
            pan_offset: 0.0,
            gain_db: 0.0,
            pitch_range: 2.0,
            tuning: 0.0,
        }
    }
}

impl Channel {
    /// Combined pitch shift in semitones from wheel position, wheel range
    /// and static tuning.
    pub(crate) fn pitch_shift(&self) -> f32 {
        if self.pitch_wheel == 8192 {
            self.tuning
        } else {
            (self.pitch_wheel as f32 / 16383.0 * self.pitch_range * 2.0) - self.pitch_range
                + self.tuning
        }
    }
}

#[derive(Debug, Default)]
pub struct Channels {
    pub active_channel: usize,
    pub channels: Vec<Channel>,
}

impl Synth {
    fn channel_init(&mut self, channel: usize) -> &mut Channel {
        let channels = self.channels.get_or_insert_with(Channels::default);
        if channel >= channels.channels.len() {
            channels.channels.resize_with(channel + 1, Channel::default);
        }
        &mut channels.channels[channel]
    }

    fn with_channel<R>(&mut self, channel: usize, f: impl FnOnce(&mut Channel) -> R) -> R {
        f(self.channel_init(channel))
    }

    fn channel(&self, channel: usize) -> Option<&Channel> {
        self.channels.as_ref().and_then(|cs| cs.channels.get(channel))
    }

    /// Applies the active channel's gain and pitch state to a voice the
    /// base note-on just initialized.
    pub(crate) fn setup_channel_voice(&mut self, slot: usize, region: &Region) {
        let channel_state = match &self.channels {
            Some(cs) => cs.channels.get(cs.active_channel).map(|c| (cs.active_channel, *c)),
            None => None,
        };
        let Some((active, c)) = channel_state else {
            return;
        };
        let voice = &mut self.voices[slot];
        voice.playing_channel = active as i32;
        voice.note_gain_db += c.gain_db;
        voice.calc_pitch_ratio(region, c.pitch_shift());
    }

    fn channel_apply_pitch(&mut self, channel: usize) {
        let Some(shift) = self.channel(channel).map(Channel::pitch_shift) else {
            return;
        };
        let font = Arc::clone(&self.font);
        for voice in &mut self.voices {
            if voice.playing_preset != -1 && voice.playing_channel == channel as i32 {
                let region =
                    &font.presets[voice.playing_preset as usize].regions[voice.region_index];
                voice.calc_pitch_ratio(region, shift);
            }
        }
    }

    pub fn channel_set_preset_index(&mut self, channel: usize, preset_index: usize) {
        self.channel_init(channel).preset_index = preset_index as u16;
    }

    /// Selects a preset by number within the channel's current bank, with
    /// the conventional percussion fallback chain when `midi_drums` is set
    /// (bank 128 variants first). Falls back to bank 0 in all modes.
    /// Returns false when nothing matched.
    pub fn channel_set_preset_number(
        &mut self,
        channel: usize,
        preset_number: u16,
        midi_drums: bool,
    ) -> bool {
        let bank = self.channel_init(channel).bank & 0x7FFF;
        let found = if midi_drums {
            self.preset_index(128 | bank, preset_number)
                .or_else(|| self.preset_index(128, preset_number))
                .or_else(|| self.preset_index(128, 0))
                .or_else(|| self.preset_index(bank, preset_number))
        } else {
            self.preset_index(bank, preset_number)
        };
        let found = found.or_else(|| self.preset_index(0, preset_number));
        match found {
            Some(preset_index) => {
                self.channel_init(channel).preset_index = preset_index as u16;
                true
            }
            None => false,
        }
    }

    pub fn channel_set_bank(&mut self, channel: usize, bank: u16) {
        self.channel_init(channel).bank = bank;
    }

    /// Selects bank and preset number together; returns false and leaves
    /// the channel untouched when the preset does not exist.
    pub fn channel_set_bank_preset(&mut self, channel: usize, bank: u16, preset_number: u16) -> bool {
        self.channel_init(channel);
        match self.preset_index(bank, preset_number) {
            Some(preset_index) => {
                let c = self.channel_init(channel);
                c.preset_index = preset_index as u16;
                c.bank = bank;
                true
            }
            None => false,
        }
    }

    /// Sets channel pan, 0.0 = left, 0.5 = center, 1.0 = right.
    pub fn channel_set_pan(&mut self, channel: usize, pan: f32) {
        self.channel_init(channel).pan_offset = pan - 0.5;
    }

    /// Sets channel volume as a linear factor; sounding voices follow.
    pub fn channel_set_volume(&mut self, channel: usize, volume: f32) {
        let gain_db = math::gain_to_decibels(volume);
        let current = self.channel_init(channel).gain_db;
        if gain_db == current {
            return;
        }
        let change = gain_db - current;
        for voice in &mut self.voices {
            if voice.playing_preset != -1 && voice.playing_channel == channel as i32 {
                voice.note_gain_db += change;
            }
        }
        self.channel_init(channel).gain_db = gain_db;
    }

    /// Sets the 14-bit pitch wheel position (0..=16383, centered 8192);
    /// sounding voices bend immediately.
    pub fn channel_set_pitchwheel(&mut self, channel: usize, pitch_wheel: u16) {
        let c = self.channel_init(channel);
        if c.pitch_wheel == pitch_wheel {
            return;
        }
        c.pitch_wheel = pitch_wheel;
        self.channel_apply_pitch(channel);
    }

    /// Sets the pitch wheel range in semitones.
    pub fn channel_set_pitchrange(&mut self, channel: usize, pitch_range: f32) {
        let c = self.channel_init(channel);
        if c.pitch_range == pitch_range {
            return;
        }
        c.pitch_range = pitch_range;
        if c.pitch_wheel != 8192 {
            self.channel_apply_pitch(channel);
        }
    }

    /// Sets static channel tuning in semitones.
    pub fn channel_set_tuning(&mut self, channel: usize, tuning: f32) {
        let c = self.channel_init(channel);
        if c.tuning == tuning {
            return;
        }
        c.tuning = tuning;
        self.channel_apply_pitch(channel);
    }

    /// Starts a note with the channel's current preset. A channel that was
    /// never configured is a no-op.
    pub fn channel_note_on(&mut self, channel: usize, key: u8, vel: f32) {
        let preset_index = match &mut self.channels {
            Some(cs) if channel < cs.channels.len() => {
                cs.active_channel = channel;
                cs.channels[channel].preset_index as usize
            }
            _ => return,
        };
        self.note_on(preset_index, key, vel);
    }

    /// Releases the oldest matching note on the channel.
    pub fn channel_note_off(&mut self, channel: usize, key: u8) {
        self.end_oldest_matching(|v| {
            v.playing_preset != -1
                && v.playing_channel == channel as i32
                && v.playing_key == key
                && v.ampenv.segment < Segment::Release
        });
    }

    /// Releases every sounding note on the channel.
    pub fn channel_note_off_all(&mut self, channel: usize) {
        for i in 0..self.voices.len() {
            let v = &self.voices[i];
            if v.playing_preset != -1
                && v.playing_channel == channel as i32
                && v.ampenv.segment < Segment::Release
            {
                self.end_voice(i);
            }
        }
    }

    /// Cuts every voice on the channel with the fast release, including
    /// voices already releasing slowly.
    pub fn channel_sounds_off_all(&mut self, channel: usize) {
        let repeats = self.end_repeats();
        for voice in &mut self.voices {
            if voice.playing_preset != -1
                && voice.playing_channel == channel as i32
                && (voice.ampenv.segment < Segment::Release
                    || voice.ampenv.parameters.release != 0.0)
            {
                voice.end_quick(repeats);
            }
        }
    }

    /// Interprets a MIDI control change. Unrecognized controllers are
    /// accepted silently.
    pub fn channel_midi_control(&mut self, channel: usize, controller: u8, control_value: u8) {
        let value = control_value as u16;
        match controller {
            7 => {
                self.with_channel(channel, |c| c.midi_volume = (c.midi_volume & 0x7F) | (value << 7));
                self.apply_midi_volume(channel);
            }
            39 => {
                self.with_channel(channel, |c| c.midi_volume = (c.midi_volume & 0x3F80) | value);
                self.apply_midi_volume(channel);
            }
            11 => {
                self.with_channel(channel, |c| {
                    c.midi_expression = (c.midi_expression & 0x7F) | (value << 7)
                });
                self.apply_midi_volume(channel);
            }
            43 => {
                self.with_channel(channel, |c| {
                    c.midi_expression = (c.midi_expression & 0x3F80) | value
                });
                self.apply_midi_volume(channel);
            }
            10 => {
                self.with_channel(channel, |c| c.midi_pan = (c.midi_pan & 0x7F) | (value << 7));
                self.apply_midi_pan(channel);
            }
            42 => {
                self.with_channel(channel, |c| c.midi_pan = (c.midi_pan & 0x3F80) | value);
                self.apply_midi_pan(channel);
            }
            6 => {
                self.with_channel(channel, |c| c.midi_data = (c.midi_data & 0x7F) | (value << 7));
                self.apply_midi_data(channel, controller, control_value);
            }
            38 => {
                self.with_channel(channel, |c| c.midi_data = (c.midi_data & 0x3F80) | value);
                self.apply_midi_data(channel, controller, control_value);
            }
            // A bank select MSB on its own already selects the bank; the
            // flag bit lets a following LSB widen it.
            0 => self.with_channel(channel, |c| c.bank = 0x8000 | value),
            32 => self.with_channel(channel, |c| {
                c.bank = if c.bank & 0x8000 != 0 {
                    ((c.bank & 0x7F) << 7) | value
                } else {
                    value
                }
            }),
            101 => self.with_channel(channel, |c| {
                let rpn = if c.midi_rpn == 0xFFFF { 0 } else { c.midi_rpn };
                c.midi_rpn = (rpn & 0x7F) | (value << 7);
            }),
            100 => self.with_channel(channel, |c| {
                let rpn = if c.midi_rpn == 0xFFFF { 0 } else { c.midi_rpn };
                c.midi_rpn = (rpn & 0x3F80) | value;
            }),
            // Any NRPN disables data entry until an RPN is selected again.
            98 | 99 => self.with_channel(channel, |c| c.midi_rpn = 0xFFFF),
            120 => {
                self.channel_init(channel);
                self.channel_sounds_off_all(channel);
            }
            123 => {
                self.channel_init(channel);
                self.channel_note_off_all(channel);
            }
            121 => {
                self.with_channel(channel, |c| {
                    c.midi_volume = 16383;
                    c.midi_expression = 16383;
                    c.midi_pan = 8192;
                    c.bank = 0;
                    c.midi_rpn = 0xFFFF;
                    c.midi_data = 0;
                });
                self.channel_set_volume(channel, 1.0);
                self.channel_set_pan(channel, 0.5);
                self.channel_set_pitchrange(channel, 2.0);
                self.channel_set_tuning(channel, 0.0);
            }
            _ => {
                self.channel_init(channel);
            }
        }
    }

    fn apply_midi_volume(&mut self, channel: usize) {
        let (volume, expression) = self.with_channel(channel, |c| {
            (c.midi_volume as f32, c.midi_expression as f32)
        });
        // A cubic curve over the combined controllers gives a usable
        // loudness ramp for MIDI material.
        self.channel_set_volume(
            channel,
            ((volume / 16383.0) * (expression / 16383.0)).powf(3.0),
        );
    }

    fn apply_midi_pan(&mut self, channel: usize) {
        let pan = self.with_channel(channel, |c| c.midi_pan as f32 / 16383.0);
        self.channel_set_pan(channel, pan);
    }

    fn apply_midi_data(&mut self, channel: usize, controller: u8, control_value: u8) {
        let (rpn, data, tuning) =
            self.with_channel(channel, |c| (c.midi_rpn, c.midi_data, c.tuning));
        if rpn == 0 {
            self.channel_set_pitchrange(channel, (data >> 7) as f32 + 0.01 * (data & 0x7F) as f32);
        } else if rpn == 1 {
            // Fine tune replaces the fractional part, keeping whole
            // semitones from a previous coarse tune.
            self.channel_set_tuning(
                channel,
                (tuning as i32) as f32 + (data as f32 - 8192.0) / 8192.0,
            );
        } else if rpn == 2 && controller == 6 {
            // Coarse tune replaces the whole semitones, keeping the
            // fractional fine tune.
            self.channel_set_tuning(
                channel,
                (control_value as f32 - 64.0) + (tuning - (tuning as i32) as f32),
            );
        }
    }

    pub fn channel_get_preset_index(&self, channel: usize) -> usize {
        self.channel(channel).map(|c| c.preset_index as usize).unwrap_or(0)
    }

    pub fn channel_get_preset_bank(&self, channel: usize) -> u16 {
        self.channel(channel).map(|c| c.bank & 0x7FFF).unwrap_or(0)
    }

    pub fn channel_get_preset_number(&self, channel: usize) -> u16 {
        self.channel(channel)
            .and_then(|c| self.font.presets.get(c.preset_index as usize))
            .map(|p| p.preset)
            .unwrap_or(0)
    }

    pub fn channel_get_pan(&self, channel: usize) -> f32 {
        self.channel(channel).map(|c| c.pan_offset + 0.5).unwrap_or(0.5)
    }

    pub fn channel_get_volume(&self, channel: usize) -> f32 {
        self.channel(channel)
            .map(|c| math::decibels_to_gain(c.gain_db))
            .unwrap_or(1.0)
    }

    pub fn channel_get_pitchwheel(&self, channel: usize) -> u16 {
        self.channel(channel).map(|c| c.pitch_wheel).unwrap_or(8192)
    }

    pub fn channel_get_pitchrange(&self, channel: usize) -> f32 {
        self.channel(channel).map(|c| c.pitch_range).unwrap_or(2.0)
    }

    pub fn channel_get_tuning(&self, channel: usize) -> f32 {
        self.channel(channel).map(|c| c.tuning).unwrap_or(0.0)
    }
}
