//! Generator operators and the two ways they act on a region: absolute
//! application while walking a zone's generator list, and the additive
//! preset-over-instrument merge with per-generator scaling and limits.

use strum::FromRepr;

use super::hydra::GenAmount;
use super::{LoopMode, Region};

/// Generator operators the engine understands. Operators absent here
/// (modulation LFO routing, filter parameters, effect sends) are accepted
/// and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u16)]
pub enum GenOper {
    StartAddrsOffset = 0,
    EndAddrsOffset = 1,
    StartloopAddrsOffset = 2,
    EndloopAddrsOffset = 3,
    StartAddrsCoarseOffset = 4,
    EndAddrsCoarseOffset = 12,
    Pan = 17,
    DelayVolEnv = 33,
    AttackVolEnv = 34,
    HoldVolEnv = 35,
    DecayVolEnv = 36,
    SustainVolEnv = 37,
    ReleaseVolEnv = 38,
    KeynumToVolEnvHold = 39,
    KeynumToVolEnvDecay = 40,
    Instrument = 41,
    KeyRange = 43,
    VelRange = 44,
    StartloopAddrsCoarseOffset = 45,
    InitialAttenuation = 48,
    EndloopAddrsCoarseOffset = 50,
    CoarseTune = 51,
    FineTune = 52,
    SampleId = 53,
    SampleModes = 54,
    ScaleTuning = 56,
    ExclusiveClass = 57,
    OverridingRootKey = 58,
}

/// Truncating add of a signed generator amount into an unsigned sample
/// pointer. Files use signed deltas here; the arithmetic wraps mod 2^32.
fn uint_add(field: &mut u32, amount: i32) {
    *field = field.wrapping_add(amount as u32);
}

/// Applies one generator to a region with absolute-set semantics. Float
/// fields keep the raw file value at this stage; scale factors and limits
/// are applied once during the merge.
pub fn apply(region: &mut Region, oper: u16, amount: GenAmount) {
    let Some(oper) = GenOper::from_repr(oper) else {
        return;
    };
    match oper {
        GenOper::StartAddrsOffset => uint_add(&mut region.offset, amount.signed() as i32),
        GenOper::EndAddrsOffset => uint_add(&mut region.end, amount.signed() as i32),
        GenOper::StartloopAddrsOffset => uint_add(&mut region.loop_start, amount.signed() as i32),
        GenOper::EndloopAddrsOffset => uint_add(&mut region.loop_end, amount.signed() as i32),
        GenOper::StartAddrsCoarseOffset => uint_add(&mut region.offset, (amount.signed() as i32) << 15),
        GenOper::EndAddrsCoarseOffset => uint_add(&mut region.end, (amount.signed() as i32) << 15),
        GenOper::StartloopAddrsCoarseOffset => {
            uint_add(&mut region.loop_start, (amount.signed() as i32) << 15)
        }
        GenOper::EndloopAddrsCoarseOffset => {
            uint_add(&mut region.loop_end, (amount.signed() as i32) << 15)
        }
        GenOper::Pan => region.pan = amount.signed() as f32,
        GenOper::DelayVolEnv => region.ampenv.delay = amount.signed() as f32,
        GenOper::AttackVolEnv => region.ampenv.attack = amount.signed() as f32,
        GenOper::HoldVolEnv => region.ampenv.hold = amount.signed() as f32,
        GenOper::DecayVolEnv => region.ampenv.decay = amount.signed() as f32,
        GenOper::SustainVolEnv => region.ampenv.sustain = amount.signed() as f32,
        GenOper::ReleaseVolEnv => region.ampenv.release = amount.signed() as f32,
        GenOper::KeynumToVolEnvHold => region.ampenv.keynum_to_hold = amount.signed() as f32,
        GenOper::KeynumToVolEnvDecay => region.ampenv.keynum_to_decay = amount.signed() as f32,
        GenOper::KeyRange => {
            region.lokey = amount.range_lo();
            region.hikey = amount.range_hi();
        }
        GenOper::VelRange => {
            region.lovel = amount.range_lo();
            region.hivel = amount.range_hi();
        }
        GenOper::InitialAttenuation => region.attenuation = amount.signed() as f32,
        GenOper::CoarseTune => region.transpose = amount.signed() as i32,
        GenOper::FineTune => region.tune = amount.signed() as i32,
        GenOper::SampleModes => {
            region.loop_mode = match amount.word() & 3 {
                3 => LoopMode::Sustain,
                1 => LoopMode::Continuous,
                _ => LoopMode::None,
            };
        }
        GenOper::ScaleTuning => region.pitch_keytrack = amount.signed() as i32,
        GenOper::ExclusiveClass => region.group = amount.word() as u32,
        GenOper::OverridingRootKey => region.pitch_keycenter = amount.signed() as i32,
        // Zone structure markers, handled by the preset walk itself.
        GenOper::Instrument | GenOper::SampleId => {}
    }
}

fn add_clamped(field: &mut f32, other: f32, factor: f32, min: f32, max: f32) {
    *field = ((*field + other) * factor).clamp(min, max);
}

/// Folds the preset-level region values into an instrument-level region:
/// float generators add and are then scaled and clamped to their limits,
/// int generators add unclamped, sample pointer offsets add with wrap.
/// Ranges, loop mode, group and root key are not merged; the preset's key
/// and velocity ranges were already applied as a clip.
pub fn merge_and_clamp(zone: &mut Region, preset: &Region) {
    add_clamped(&mut zone.pan, preset.pan, 0.001, -0.5, 0.5);
    add_clamped(&mut zone.attenuation, preset.attenuation, 0.1, 0.0, 144.0);

    let z = &mut zone.ampenv;
    let p = &preset.ampenv;
    add_clamped(&mut z.delay, p.delay, 1.0, -12000.0, 5000.0);
    add_clamped(&mut z.attack, p.attack, 1.0, -12000.0, 8000.0);
    add_clamped(&mut z.hold, p.hold, 1.0, -12000.0, 5000.0);
    add_clamped(&mut z.decay, p.decay, 1.0, -12000.0, 8000.0);
    add_clamped(&mut z.sustain, p.sustain, 1.0, 0.0, 1440.0);
    add_clamped(&mut z.release, p.release, 1.0, -12000.0, 8000.0);
    add_clamped(&mut z.keynum_to_hold, p.keynum_to_hold, 1.0, -1200.0, 1200.0);
    add_clamped(&mut z.keynum_to_decay, p.keynum_to_decay, 1.0, -1200.0, 1200.0);

    zone.transpose += preset.transpose;
    zone.tune += preset.tune;
    zone.pitch_keytrack += preset.pitch_keytrack;

    zone.offset = zone.offset.wrapping_add(preset.offset);
    zone.end = zone.end.wrapping_add(preset.end);
    zone.loop_start = zone.loop_start.wrapping_add(preset.loop_start);
    zone.loop_end = zone.loop_end.wrapping_add(preset.loop_end);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pan_is_scaled_and_clamped_at_merge() {
        let mut zone = Region::instrument_default();
        let preset = Region::preset_default();
        apply(&mut zone, GenOper::Pan as u16, GenAmount(400_u16));
        merge_and_clamp(&mut zone, &preset);
        assert!((zone.pan - 0.4).abs() < 1e-6);

        let mut zone = Region::instrument_default();
        apply(&mut zone, GenOper::Pan as u16, GenAmount(900_u16));
        merge_and_clamp(&mut zone, &preset);
        assert_eq!(zone.pan, 0.5);
    }

    #[test]
    fn negative_sample_offsets_wrap() {
        let mut region = Region::instrument_default();
        region.offset = 10;
        apply(&mut region, GenOper::StartAddrsOffset as u16, GenAmount(-4_i16 as u16));
        assert_eq!(region.offset, 6);
    }

    #[test]
    fn coarse_offsets_shift_by_15() {
        let mut region = Region::instrument_default();
        apply(&mut region, GenOper::StartAddrsCoarseOffset as u16, GenAmount(2_u16));
        assert_eq!(region.offset, 2 << 15);
    }

    #[test]
    fn loop_mode_bits() {
        let mut region = Region::instrument_default();
        apply(&mut region, GenOper::SampleModes as u16, GenAmount(1));
        assert_eq!(region.loop_mode, LoopMode::Continuous);
        apply(&mut region, GenOper::SampleModes as u16, GenAmount(3));
        assert_eq!(region.loop_mode, LoopMode::Sustain);
        apply(&mut region, GenOper::SampleModes as u16, GenAmount(2));
        assert_eq!(region.loop_mode, LoopMode::None);
    }

    #[test]
    fn unknown_operators_are_ignored() {
        let mut region = Region::instrument_default();
        let before = region.clone();
        apply(&mut region, 21, GenAmount(1234)); // DelayModLFO, unsupported
        apply(&mut region, 59, GenAmount(1));
        assert_eq!(region, before);
    }

    #[test]
    fn int_fields_merge_without_clamp() {
        let mut zone = Region::instrument_default();
        let mut preset = Region::preset_default();
        zone.transpose = 12;
        preset.transpose = 12;
        zone.tune = 50;
        preset.tune = -20;
        merge_and_clamp(&mut zone, &preset);
        assert_eq!(zone.transpose, 24);
        assert_eq!(zone.tune, 30);
    }
}
