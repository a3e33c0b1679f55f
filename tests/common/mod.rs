//! Builds small synthetic SF2 images in memory: one sample, one instrument,
//! and any number of presets referencing it, with configurable generator
//! lists at both zone levels.

// Not every test binary uses every builder knob.
#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};

pub struct PresetSpec {
    pub name: &'static str,
    pub bank: u16,
    pub preset: u16,
    /// Preset zone generators, applied before the Instrument reference.
    pub gens: Vec<(u16, u16)>,
}

pub struct FontBuilder {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub original_pitch: u8,
    pub pitch_correction: i8,
    /// Raw shdr loop points (end_loop is the format's one-past value).
    pub loop_start: u32,
    pub loop_end: u32,
    /// Instrument zone generators, applied before the SampleID reference.
    pub instrument_gens: Vec<(u16, u16)>,
    pub presets: Vec<PresetSpec>,
}

impl FontBuilder {
    pub fn new(samples: Vec<i16>) -> FontBuilder {
        FontBuilder {
            samples,
            sample_rate: 11025,
            original_pitch: 60,
            pitch_correction: 0,
            loop_start: 0,
            loop_end: 0,
            instrument_gens: Vec::new(),
            presets: vec![PresetSpec {
                name: "Test Preset",
                bank: 0,
                preset: 0,
                gens: Vec::new(),
            }],
        }
    }

    /// A font whose single region loops continuously over the whole sample.
    pub fn looping(samples: Vec<i16>) -> FontBuilder {
        let end = samples.len() as u32;
        let mut builder = FontBuilder::new(samples);
        builder.loop_end = end;
        builder.instrument_gens.push((54, 1)); // SampleModes: continuous
        builder
    }

    pub fn build(&self) -> Vec<u8> {
        let pdta = self.build_pdta();
        let sdta = self.build_sdta();
        let mut riff = Vec::new();
        riff.extend_from_slice(b"RIFF");
        riff.write_u32::<LittleEndian>(4 + (12 + sdta.len() as u32) + (12 + pdta.len() as u32))
            .unwrap();
        riff.extend_from_slice(b"sfbk");
        write_list(&mut riff, b"sdta", &sdta);
        write_list(&mut riff, b"pdta", &pdta);
        riff
    }

    /// The hydra without any sample data list; loading must fail.
    pub fn build_without_samples(&self) -> Vec<u8> {
        let pdta = self.build_pdta();
        let mut riff = Vec::new();
        riff.extend_from_slice(b"RIFF");
        riff.write_u32::<LittleEndian>(4 + (12 + pdta.len() as u32)).unwrap();
        riff.extend_from_slice(b"sfbk");
        write_list(&mut riff, b"pdta", &pdta);
        riff
    }

    /// Sample data without the hydra; loading must fail.
    pub fn build_without_hydra(&self) -> Vec<u8> {
        let sdta = self.build_sdta();
        let mut riff = Vec::new();
        riff.extend_from_slice(b"RIFF");
        riff.write_u32::<LittleEndian>(4 + (12 + sdta.len() as u32)).unwrap();
        riff.extend_from_slice(b"sfbk");
        write_list(&mut riff, b"sdta", &sdta);
        riff
    }

    fn build_sdta(&self) -> Vec<u8> {
        let mut smpl = Vec::new();
        for &sample in &self.samples {
            smpl.write_i16::<LittleEndian>(sample).unwrap();
        }
        let mut sdta = Vec::new();
        write_chunk(&mut sdta, b"smpl", &smpl);
        sdta
    }

    fn build_pdta(&self) -> Vec<u8> {
        let mut phdr = Vec::new();
        for (i, preset) in self.presets.iter().enumerate() {
            write_name(&mut phdr, preset.name);
            phdr.write_u16::<LittleEndian>(preset.preset).unwrap();
            phdr.write_u16::<LittleEndian>(preset.bank).unwrap();
            phdr.write_u16::<LittleEndian>(i as u16).unwrap();
            phdr.write_u32::<LittleEndian>(0).unwrap();
            phdr.write_u32::<LittleEndian>(0).unwrap();
            phdr.write_u32::<LittleEndian>(0).unwrap();
        }
        write_name(&mut phdr, "EOP");
        phdr.write_u16::<LittleEndian>(0).unwrap();
        phdr.write_u16::<LittleEndian>(0).unwrap();
        phdr.write_u16::<LittleEndian>(self.presets.len() as u16).unwrap();
        phdr.write_u32::<LittleEndian>(0).unwrap();
        phdr.write_u32::<LittleEndian>(0).unwrap();
        phdr.write_u32::<LittleEndian>(0).unwrap();

        let mut pbag = Vec::new();
        let mut gen_start = 0_u16;
        for preset in &self.presets {
            pbag.write_u16::<LittleEndian>(gen_start).unwrap();
            pbag.write_u16::<LittleEndian>(0).unwrap();
            gen_start += preset.gens.len() as u16 + 1;
        }
        pbag.write_u16::<LittleEndian>(gen_start).unwrap();
        pbag.write_u16::<LittleEndian>(0).unwrap();

        let mut pgen = Vec::new();
        for preset in &self.presets {
            for &(oper, amount) in &preset.gens {
                pgen.write_u16::<LittleEndian>(oper).unwrap();
                pgen.write_u16::<LittleEndian>(amount).unwrap();
            }
            pgen.write_u16::<LittleEndian>(41).unwrap(); // Instrument
            pgen.write_u16::<LittleEndian>(0).unwrap();
        }
        pgen.write_u16::<LittleEndian>(0).unwrap();
        pgen.write_u16::<LittleEndian>(0).unwrap();

        let pmod = vec![0_u8; 10];
        let imod = vec![0_u8; 10];

        let mut inst = Vec::new();
        write_name(&mut inst, "Test Instrument");
        inst.write_u16::<LittleEndian>(0).unwrap();
        write_name(&mut inst, "EOI");
        inst.write_u16::<LittleEndian>(1).unwrap();

        let mut ibag = Vec::new();
        ibag.write_u16::<LittleEndian>(0).unwrap();
        ibag.write_u16::<LittleEndian>(0).unwrap();
        ibag.write_u16::<LittleEndian>(self.instrument_gens.len() as u16 + 1).unwrap();
        ibag.write_u16::<LittleEndian>(0).unwrap();

        let mut igen = Vec::new();
        for &(oper, amount) in &self.instrument_gens {
            igen.write_u16::<LittleEndian>(oper).unwrap();
            igen.write_u16::<LittleEndian>(amount).unwrap();
        }
        igen.write_u16::<LittleEndian>(53).unwrap(); // SampleID
        igen.write_u16::<LittleEndian>(0).unwrap();
        igen.write_u16::<LittleEndian>(0).unwrap();
        igen.write_u16::<LittleEndian>(0).unwrap();

        let mut shdr = Vec::new();
        write_name(&mut shdr, "Test Sample");
        shdr.write_u32::<LittleEndian>(0).unwrap();
        shdr.write_u32::<LittleEndian>(self.samples.len() as u32).unwrap();
        shdr.write_u32::<LittleEndian>(self.loop_start).unwrap();
        shdr.write_u32::<LittleEndian>(self.loop_end).unwrap();
        shdr.write_u32::<LittleEndian>(self.sample_rate).unwrap();
        shdr.write_u8(self.original_pitch).unwrap();
        shdr.write_i8(self.pitch_correction).unwrap();
        shdr.write_u16::<LittleEndian>(0).unwrap();
        shdr.write_u16::<LittleEndian>(1).unwrap();
        write_name(&mut shdr, "EOS");
        shdr.extend_from_slice(&[0_u8; 26]);

        let mut pdta = Vec::new();
        write_chunk(&mut pdta, b"phdr", &phdr);
        write_chunk(&mut pdta, b"pbag", &pbag);
        write_chunk(&mut pdta, b"pmod", &pmod);
        write_chunk(&mut pdta, b"pgen", &pgen);
        write_chunk(&mut pdta, b"inst", &inst);
        write_chunk(&mut pdta, b"ibag", &ibag);
        write_chunk(&mut pdta, b"imod", &imod);
        write_chunk(&mut pdta, b"igen", &igen);
        write_chunk(&mut pdta, b"shdr", &shdr);
        pdta
    }
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    let mut bytes = [0_u8; 20];
    for (dst, src) in bytes.iter_mut().zip(name.as_bytes().iter().take(19)) {
        *dst = *src;
    }
    out.extend_from_slice(&bytes);
}

fn write_chunk(out: &mut Vec<u8>, id: &[u8; 4], body: &[u8]) {
    out.extend_from_slice(id);
    out.write_u32::<LittleEndian>(body.len() as u32).unwrap();
    out.extend_from_slice(body);
}

fn write_list(out: &mut Vec<u8>, form: &[u8; 4], body: &[u8]) {
    out.extend_from_slice(b"LIST");
    out.write_u32::<LittleEndian>(4 + body.len() as u32).unwrap();
    out.extend_from_slice(form);
    out.extend_from_slice(body);
}
