//! The nine fixed-record-size metadata tables of an SF2 file, read straight
//! off the stream in declaration order. All values are little-endian.

use crate::dtype::Sf2Error;
use crate::stream::Stream;

pub const PHDR_SIZE: u32 = 38;
pub const PBAG_SIZE: u32 = 4;
pub const PMOD_SIZE: u32 = 10;
pub const PGEN_SIZE: u32 = 4;
pub const INST_SIZE: u32 = 22;
pub const IBAG_SIZE: u32 = 4;
pub const IMOD_SIZE: u32 = 10;
pub const IGEN_SIZE: u32 = 4;
pub const SHDR_SIZE: u32 = 46;

/// Raw 16-bit generator payload. Whether it is a signed amount, an unsigned
/// word or a lo/hi byte range depends on the operator it belongs to.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenAmount(pub u16);

impl GenAmount {
    pub fn word(self) -> u16 {
        self.0
    }
    pub fn signed(self) -> i16 {
        self.0 as i16
    }
    pub fn range_lo(self) -> u8 {
        (self.0 & 0xFF) as u8
    }
    pub fn range_hi(self) -> u8 {
        (self.0 >> 8) as u8
    }
}

#[derive(Debug, Clone)]
pub struct PresetHeader {
    pub name: [u8; 20],
    pub preset: u16,
    pub bank: u16,
    pub preset_bag_index: u16,
    pub library: u32,
    pub genre: u32,
    pub morphology: u32,
}

impl PresetHeader {
    fn read<S: Stream>(stream: &mut S) -> Result<PresetHeader, Sf2Error> {
        let mut name = [0_u8; 20];
        stream.read_exact(&mut name)?;
        Ok(PresetHeader {
            name,
            preset: stream.read_u16()?,
            bank: stream.read_u16()?,
            preset_bag_index: stream.read_u16()?,
            library: stream.read_u32()?,
            genre: stream.read_u32()?,
            morphology: stream.read_u32()?,
        })
    }
}

/// Zone record; shared shape between pbag and ibag.
#[derive(Debug, Clone)]
pub struct Bag {
    pub gen_index: u16,
    pub mod_index: u16,
}

impl Bag {
    fn read<S: Stream>(stream: &mut S) -> Result<Bag, Sf2Error> {
        Ok(Bag {
            gen_index: stream.read_u16()?,
            mod_index: stream.read_u16()?,
        })
    }
}

/// Modulator record; shared shape between pmod and imod. Modulators are
/// loaded for table accounting but not interpreted by the engine.
#[derive(Debug, Clone)]
pub struct Modulator {
    pub src_oper: u16,
    pub dest_oper: u16,
    pub amount: i16,
    pub amount_src_oper: u16,
    pub trans_oper: u16,
}

impl Modulator {
    fn read<S: Stream>(stream: &mut S) -> Result<Modulator, Sf2Error> {
        Ok(Modulator {
            src_oper: stream.read_u16()?,
            dest_oper: stream.read_u16()?,
            amount: stream.read_i16()?,
            amount_src_oper: stream.read_u16()?,
            trans_oper: stream.read_u16()?,
        })
    }
}

/// Generator record; shared shape between pgen and igen.
#[derive(Debug, Clone)]
pub struct GenRecord {
    pub oper: u16,
    pub amount: GenAmount,
}

impl GenRecord {
    fn read<S: Stream>(stream: &mut S) -> Result<GenRecord, Sf2Error> {
        Ok(GenRecord {
            oper: stream.read_u16()?,
            amount: GenAmount(stream.read_u16()?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct InstHeader {
    pub name: [u8; 20],
    pub inst_bag_index: u16,
}

impl InstHeader {
    fn read<S: Stream>(stream: &mut S) -> Result<InstHeader, Sf2Error> {
        let mut name = [0_u8; 20];
        stream.read_exact(&mut name)?;
        Ok(InstHeader {
            name,
            inst_bag_index: stream.read_u16()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SampleHeader {
    pub name: [u8; 20],
    pub start: u32,
    pub end: u32,
    pub start_loop: u32,
    pub end_loop: u32,
    pub sample_rate: u32,
    pub original_pitch: u8,
    pub pitch_correction: i8,
    pub sample_link: u16,
    pub sample_type: u16,
}

impl SampleHeader {
    fn read<S: Stream>(stream: &mut S) -> Result<SampleHeader, Sf2Error> {
        let mut name = [0_u8; 20];
        stream.read_exact(&mut name)?;
        Ok(SampleHeader {
            name,
            start: stream.read_u32()?,
            end: stream.read_u32()?,
            start_loop: stream.read_u32()?,
            end_loop: stream.read_u32()?,
            sample_rate: stream.read_u32()?,
            original_pitch: stream.read_u8()?,
            pitch_correction: stream.read_i8()?,
            sample_link: stream.read_u16()?,
            sample_type: stream.read_u16()?,
        })
    }
}

/// Accumulates the hydra tables while walking the pdta list. Each table is
/// `None` until its chunk shows up; all nine must be present for a load to
/// succeed.
#[derive(Default)]
pub struct HydraReader {
    pub phdrs: Option<Vec<PresetHeader>>,
    pub pbags: Option<Vec<Bag>>,
    pub pmods: Option<Vec<Modulator>>,
    pub pgens: Option<Vec<GenRecord>>,
    pub insts: Option<Vec<InstHeader>>,
    pub ibags: Option<Vec<Bag>>,
    pub imods: Option<Vec<Modulator>>,
    pub igens: Option<Vec<GenRecord>>,
    pub shdrs: Option<Vec<SampleHeader>>,
}

fn read_table<S, T>(
    stream: &mut S,
    count: usize,
    read_one: fn(&mut S) -> Result<T, Sf2Error>,
) -> Result<Vec<T>, Sf2Error>
where
    S: Stream,
{
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        records.push(read_one(stream)?);
    }
    Ok(records)
}

impl HydraReader {
    /// Consumes one pdta child chunk when it is a hydra table with a sane
    /// size (a whole number of records); returns false to let the caller
    /// skip anything else.
    pub fn load_chunk<S: Stream>(
        &mut self,
        id: [u8; 4],
        size: u32,
        stream: &mut S,
    ) -> Result<bool, Sf2Error> {
        match &id {
            b"phdr" if size % PHDR_SIZE == 0 => {
                self.phdrs = Some(read_table(stream, (size / PHDR_SIZE) as usize, PresetHeader::read)?);
            }
            b"pbag" if size % PBAG_SIZE == 0 => {
                self.pbags = Some(read_table(stream, (size / PBAG_SIZE) as usize, Bag::read)?);
            }
            b"pmod" if size % PMOD_SIZE == 0 => {
                self.pmods = Some(read_table(stream, (size / PMOD_SIZE) as usize, Modulator::read)?);
            }
            b"pgen" if size % PGEN_SIZE == 0 => {
                self.pgens = Some(read_table(stream, (size / PGEN_SIZE) as usize, GenRecord::read)?);
            }
            b"inst" if size % INST_SIZE == 0 => {
                self.insts = Some(read_table(stream, (size / INST_SIZE) as usize, InstHeader::read)?);
            }
            b"ibag" if size % IBAG_SIZE == 0 => {
                self.ibags = Some(read_table(stream, (size / IBAG_SIZE) as usize, Bag::read)?);
            }
            b"imod" if size % IMOD_SIZE == 0 => {
                self.imods = Some(read_table(stream, (size / IMOD_SIZE) as usize, Modulator::read)?);
            }
            b"igen" if size % IGEN_SIZE == 0 => {
                self.igens = Some(read_table(stream, (size / IGEN_SIZE) as usize, GenRecord::read)?);
            }
            b"shdr" if size % SHDR_SIZE == 0 => {
                self.shdrs = Some(read_table(stream, (size / SHDR_SIZE) as usize, SampleHeader::read)?);
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    pub fn finish(self) -> Result<Hydra, Sf2Error> {
        Ok(Hydra {
            phdrs: self.phdrs.ok_or(Sf2Error::Incomplete("phdr"))?,
            pbags: self.pbags.ok_or(Sf2Error::Incomplete("pbag"))?,
            pmods: self.pmods.ok_or(Sf2Error::Incomplete("pmod"))?,
            pgens: self.pgens.ok_or(Sf2Error::Incomplete("pgen"))?,
            insts: self.insts.ok_or(Sf2Error::Incomplete("inst"))?,
            ibags: self.ibags.ok_or(Sf2Error::Incomplete("ibag"))?,
            imods: self.imods.ok_or(Sf2Error::Incomplete("imod"))?,
            igens: self.igens.ok_or(Sf2Error::Incomplete("igen"))?,
            shdrs: self.shdrs.ok_or(Sf2Error::Incomplete("shdr"))?,
        })
    }
}

/// The complete set of hydra tables.
pub struct Hydra {
    pub phdrs: Vec<PresetHeader>,
    pub pbags: Vec<Bag>,
    pub pmods: Vec<Modulator>,
    pub pgens: Vec<GenRecord>,
    pub insts: Vec<InstHeader>,
    pub ibags: Vec<Bag>,
    pub imods: Vec<Modulator>,
    pub igens: Vec<GenRecord>,
    pub shdrs: Vec<SampleHeader>,
}
