//! SF2 soundfont synthesizer: parses a soundfont into flattened playback
//! regions and renders polyphonic mono 16-bit PCM at 11,025 Hz, driven by a
//! preset-level note API or a MIDI-style channel API.

pub mod dtype;
pub mod envelope;
pub mod math;
pub mod sf2;
pub mod stream;
pub mod synth;
pub mod voice;

pub use dtype::{Sf2Error, RENDER_BLOCK, SAMPLE_RATE};
pub use sf2::{LoopMode, Preset, Region, SoundFont};
pub use stream::{FileStream, MemoryStream, Stream};
pub use synth::Synth;
