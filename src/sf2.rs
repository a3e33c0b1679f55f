//! SF2 soundfont parsing. The file is a RIFF container holding nine
//! interlinked metadata tables (the "hydra") plus a raw 16-bit PCM sample
//! pool. Loading walks the container once, front to back, then collapses the
//! preset -> instrument -> sample hierarchy into flat per-preset lists of
//! [`Region`]s, each a self-contained playback recipe.

use byteorder::{ByteOrder, LittleEndian};

use crate::dtype::Sf2Error;
use crate::envelope::EnvelopeParams;
use crate::stream::Stream;

pub mod generator;
pub mod hydra;

use generator::GenOper;
use hydra::{Hydra, HydraReader};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoopMode {
    /// Play the sample through once.
    #[default]
    None,
    /// Loop between the loop points for as long as the voice lives.
    Continuous,
    /// Loop while the key is held, then play out past the loop on release.
    Sustain,
}

/// One flattened playback recipe: a key/velocity window mapped onto a slice
/// of the sample pool, with pitch, gain and envelope parameters already
/// merged across the preset, instrument and global zone layers.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub loop_mode: LoopMode,
    /// Native rate of the source sample in Hz.
    pub sample_rate: u32,
    pub lokey: u8,
    pub hikey: u8,
    pub lovel: u8,
    pub hivel: u8,
    /// Exclusive class; a new note in a non-zero group cuts other voices of
    /// the same preset and group. Zero means no group.
    pub group: u32,
    /// Absolute indices into the font sample pool; `end` is one past the
    /// last playable sample.
    pub offset: u32,
    pub end: u32,
    pub loop_start: u32,
    /// Inclusive index of the last sample inside the loop.
    pub loop_end: u32,
    /// Semitones.
    pub transpose: i32,
    /// Cents.
    pub tune: i32,
    /// MIDI note the sample plays back unshifted at.
    pub pitch_keycenter: i32,
    /// Cents of pitch change per semitone of key distance; 100 = normal.
    pub pitch_keytrack: i32,
    /// Attenuation in dB after merge scaling.
    pub attenuation: f32,
    /// -0.5 (left) to 0.5 (right) after merge scaling.
    pub pan: f32,
    pub ampenv: EnvelopeParams,
}

impl Region {
    fn cleared() -> Region {
        Region {
            loop_mode: LoopMode::None,
            sample_rate: 0,
            lokey: 0,
            hikey: 127,
            lovel: 0,
            hivel: 127,
            group: 0,
            offset: 0,
            end: 0,
            loop_start: 0,
            loop_end: 0,
            transpose: 0,
            tune: 0,
            pitch_keycenter: 60,
            pitch_keytrack: 0,
            attenuation: 0.0,
            pan: 0.0,
            ampenv: EnvelopeParams::default(),
        }
    }

    /// Starting state for a preset-level zone. Values here are relative
    /// contributions, so everything is zero.
    pub fn preset_default() -> Region {
        Region::cleared()
    }

    /// Starting state for an instrument-level zone, carrying the format's
    /// absolute defaults: unknown root key until the sample header fills it
    /// in, full key tracking, envelope stages at their shortest timecent.
    pub fn instrument_default() -> Region {
        let mut region = Region::cleared();
        region.pitch_keytrack = 100;
        region.pitch_keycenter = -1;
        region.ampenv.delay = -12000.0;
        region.ampenv.attack = -12000.0;
        region.ampenv.hold = -12000.0;
        region.ampenv.decay = -12000.0;
        region.ampenv.release = -12000.0;
        region
    }
}

/// A patch selectable by (bank, preset number).
#[derive(Debug, Clone, Default)]
pub struct Preset {
    pub name: String,
    pub preset: u16,
    pub bank: u16,
    pub regions: Vec<Region>,
}

/// Parsed soundfont: the sample pool and the flattened presets, sorted by
/// (bank, preset number, original order). Immutable once loaded; the synth
/// front-end shares it between clones.
#[derive(Debug)]
pub struct SoundFont {
    pub samples: Vec<i16>,
    pub presets: Vec<Preset>,
}

impl SoundFont {
    pub fn load<S: Stream>(stream: &mut S) -> Result<SoundFont, Sf2Error> {
        let mut head = match RiffChunk::read(stream, None) {
            Ok(Some(chunk)) if chunk.id == *b"sfbk" => chunk,
            _ => return Err(Sf2Error::NoHeader),
        };

        let mut reader = HydraReader::default();
        let mut samples: Vec<i16> = Vec::new();
        while let Some(mut list) = RiffChunk::read(stream, Some(&mut head))? {
            match &list.id {
                b"pdta" => {
                    while let Some(chunk) = RiffChunk::read(stream, Some(&mut list))? {
                        if !reader.load_chunk(chunk.id, chunk.size, stream)? {
                            stream.skip(chunk.size)?;
                        }
                    }
                }
                b"sdta" => {
                    while let Some(chunk) = RiffChunk::read(stream, Some(&mut list))? {
                        if chunk.id == *b"smpl" && samples.is_empty() && chunk.size >= 2 {
                            samples = read_sample_pool(stream, chunk.size)?;
                        } else {
                            stream.skip(chunk.size)?;
                        }
                    }
                }
                _ => stream.skip(list.size)?,
            }
        }

        let hydra = reader.finish()?;
        if samples.is_empty() {
            return Err(Sf2Error::NoSampleData);
        }
        let presets = flatten_presets(&hydra, samples.len() as u32);
        Ok(SoundFont { samples, presets })
    }
}

fn read_sample_pool<S: Stream>(stream: &mut S, size: u32) -> Result<Vec<i16>, Sf2Error> {
    let count = (size / 2) as usize;
    let mut raw = vec![0_u8; count * 2];
    stream.read_exact(&mut raw)?;
    let mut samples = vec![0_i16; count];
    LittleEndian::read_i16_into(&raw, &mut samples);
    if size % 2 != 0 {
        stream.skip(1)?;
    }
    Ok(samples)
}

struct RiffChunk {
    id: [u8; 4],
    size: u32,
}

fn fourcc_plausible(id: &[u8; 4]) -> bool {
    id[0] > b' ' && id[0] < b'z'
}

impl RiffChunk {
    /// Reads the next chunk header. `RIFF` and `LIST` chunks resolve to
    /// their form id with the form's content size. Returns `Ok(None)` when
    /// the parent chunk is exhausted or the data stops looking like RIFF,
    /// which ends the caller's walk at that nesting level.
    fn read<S: Stream>(
        stream: &mut S,
        mut parent: Option<&mut RiffChunk>,
    ) -> Result<Option<RiffChunk>, Sf2Error> {
        if let Some(p) = parent.as_deref() {
            if p.size < 8 {
                return Ok(None);
            }
        }
        let id = stream.read_fourcc()?;
        if !fourcc_plausible(&id) {
            return Ok(None);
        }
        let mut size = stream.read_u32()?;
        if let Some(p) = parent.as_deref_mut() {
            if 8 + size as u64 > p.size as u64 {
                return Ok(None);
            }
            p.size -= 8 + size;
        }
        let is_riff = id == *b"RIFF";
        if is_riff && parent.is_some() {
            // A nested RIFF chunk is malformed.
            return Ok(None);
        }
        if !is_riff && id != *b"LIST" {
            return Ok(Some(RiffChunk { id, size }));
        }
        if size < 4 {
            return Ok(None);
        }
        let form = stream.read_fourcc()?;
        if !fourcc_plausible(&form) {
            return Ok(None);
        }
        size -= 4;
        Ok(Some(RiffChunk { id: form, size }))
    }
}

fn fixed_name(bytes: &[u8; 20]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Adjacent-pair slice into a hydra table. Indices from a malformed file
/// degrade to an empty range instead of a panic.
fn index_range<T>(table: &[T], start: u16, end: u16) -> &[T] {
    let end = (end as usize).min(table.len());
    let start = (start as usize).min(end);
    &table[start..end]
}

/// Collapses the hydra into flat presets. Every phdr except the terminal
/// sentinel yields a preset; its slot in the output is its rank under
/// (bank, preset number, source order).
fn flatten_presets(hydra: &Hydra, font_sample_count: u32) -> Vec<Preset> {
    let preset_count = hydra.phdrs.len().saturating_sub(1);
    let headers = &hydra.phdrs[..preset_count];
    let mut presets: Vec<Preset> = headers.iter().map(|_| Preset::default()).collect();

    for (i, phdr) in headers.iter().enumerate() {
        let mut sorted_index = 0;
        for (j, other) in headers.iter().enumerate() {
            if j == i || other.bank > phdr.bank {
                continue;
            }
            if other.bank < phdr.bank {
                sorted_index += 1;
                continue;
            }
            if other.preset > phdr.preset {
                continue;
            }
            if other.preset < phdr.preset || j < i {
                sorted_index += 1;
            }
        }

        let preset = &mut presets[sorted_index];
        preset.name = fixed_name(&phdr.name);
        preset.bank = phdr.bank;
        preset.preset = phdr.preset;

        let bag_end = hydra.phdrs[i + 1].preset_bag_index;
        let pbags = index_range(&hydra.pbags, phdr.preset_bag_index, bag_end);
        let mut global_region = Region::preset_default();

        for (bag_i, pbag) in pbags.iter().enumerate() {
            let bag_pos = phdr.preset_bag_index as usize + bag_i;
            let gen_end = hydra
                .pbags
                .get(bag_pos + 1)
                .map(|bag| bag.gen_index)
                .unwrap_or(pbag.gen_index);
            let pgens = index_range(&hydra.pgens, pbag.gen_index, gen_end);

            let mut preset_region = global_region.clone();
            let mut had_instrument = false;
            for pgen in pgens {
                if pgen.oper == GenOper::Instrument as u16 {
                    let which = pgen.amount.word() as usize;
                    if which >= hydra.insts.len() {
                        continue;
                    }
                    flatten_instrument(hydra, which, &preset_region, preset, font_sample_count);
                    had_instrument = true;
                } else {
                    generator::apply(&mut preset_region, pgen.oper, pgen.amount);
                }
            }

            // The first zone is the preset's global zone when it names no
            // instrument; it then becomes the base for every later zone.
            if bag_i == 0 && !had_instrument {
                global_region = preset_region;
            }
        }
    }
    presets
}

/// Walks one instrument's zones under a given preset zone, emitting a
/// region per referenced sample that survives the key/velocity clip.
fn flatten_instrument(
    hydra: &Hydra,
    which: usize,
    preset_region: &Region,
    preset: &mut Preset,
    font_sample_count: u32,
) {
    let inst = &hydra.insts[which];
    let bag_end = hydra
        .insts
        .get(which + 1)
        .map(|next| next.inst_bag_index)
        .unwrap_or(inst.inst_bag_index);
    let ibags = index_range(&hydra.ibags, inst.inst_bag_index, bag_end);
    let mut inst_region = Region::instrument_default();

    for (bag_i, ibag) in ibags.iter().enumerate() {
        let bag_pos = inst.inst_bag_index as usize + bag_i;
        let gen_end = hydra
            .ibags
            .get(bag_pos + 1)
            .map(|bag| bag.gen_index)
            .unwrap_or(ibag.gen_index);
        let igens = index_range(&hydra.igens, ibag.gen_index, gen_end);

        let mut zone_region = inst_region.clone();
        let mut had_sample = false;
        for igen in igens {
            if igen.oper != GenOper::SampleId as u16 {
                generator::apply(&mut zone_region, igen.oper, igen.amount);
                continue;
            }

            // The preset zone's key and velocity ranges act as a filter on
            // the instrument zone; an empty intersection drops the sample.
            if zone_region.hikey < preset_region.lokey || zone_region.lokey > preset_region.hikey {
                continue;
            }
            if zone_region.hivel < preset_region.lovel || zone_region.lovel > preset_region.hivel {
                continue;
            }
            zone_region.lokey = zone_region.lokey.max(preset_region.lokey);
            zone_region.hikey = zone_region.hikey.min(preset_region.hikey);
            zone_region.lovel = zone_region.lovel.max(preset_region.lovel);
            zone_region.hivel = zone_region.hivel.min(preset_region.hivel);

            generator::merge_and_clamp(&mut zone_region, preset_region);
            zone_region.ampenv.convert_to_seconds(true);

            let Some(shdr) = hydra.shdrs.get(igen.amount.word() as usize) else {
                continue;
            };
            zone_region.offset = zone_region.offset.wrapping_add(shdr.start);
            zone_region.end = zone_region.end.wrapping_add(shdr.end);
            zone_region.loop_start = zone_region.loop_start.wrapping_add(shdr.start_loop);
            zone_region.loop_end = zone_region.loop_end.wrapping_add(shdr.end_loop);
            if shdr.end_loop > 0 {
                // The raw value points one past the loop; store inclusive.
                zone_region.loop_end = zone_region.loop_end.wrapping_sub(1);
            }
            if zone_region.loop_end > font_sample_count {
                zone_region.loop_end = font_sample_count;
            }
            if zone_region.pitch_keycenter == -1 {
                zone_region.pitch_keycenter = shdr.original_pitch as i32;
            }
            zone_region.tune += shdr.pitch_correction as i32;
            zone_region.sample_rate = shdr.sample_rate;
            if zone_region.end != 0 && zone_region.end < font_sample_count {
                zone_region.end += 1;
            } else {
                zone_region.end = font_sample_count;
            }

            preset.regions.push(zone_region.clone());
            had_sample = true;
        }

        // The first zone is the instrument's global zone when it names no
        // sample; it then becomes the base for every later zone.
        if bag_i == 0 && !had_sample {
            inst_region = zone_region;
        }
    }
}
