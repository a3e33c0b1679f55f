use thiserror::Error;

/// Internal render rate in Hz. Every voice resamples its source material to
/// this rate; `Synth::render_short` produces blocks of [`RENDER_BLOCK`]
/// samples at this rate.
pub const SAMPLE_RATE: u32 = 11025;

/// Number of output samples produced by one render call.
pub const RENDER_BLOCK: usize = 128;

/// Floor applied to the release stage when a voice is cut short, so that
/// stopping a note never produces a hard click.
pub const FAST_RELEASE_SECS: f32 = 0.01;

#[derive(Debug, Error)]
pub enum Sf2Error {
    /// The stream does not start with a RIFF chunk of form `sfbk`.
    #[error("Not a soundfont: missing RIFF sfbk header!")]
    NoHeader,
    /// One of the nine hydra tables was absent from the pdta list.
    #[error("Soundfont is incomplete: hydra table \"{0}\" is missing!")]
    Incomplete(&'static str),
    /// The sdta list carried no usable smpl chunk.
    #[error("Soundfont contains no sample data!")]
    NoSampleData,
    /// The stream ended inside a chunk or record.
    #[error("Soundfont stream ended early!")]
    Truncated,
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}
