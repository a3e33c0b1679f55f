/// Example: sf_render_tool info .\soundfonts\florestan.sf2
/// Example: sf_render_tool render .\soundfonts\florestan.sf2 .\songs\e1m1.mid -o e1m1.wav

use std::path::PathBuf;

use clap::{command, Parser, Subcommand};
use colored::Colorize;
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

use sfbank::{Synth, RENDER_BLOCK, SAMPLE_RATE};

#[derive(Parser)]
#[command(author, version, about = "Tools for inspecting SF2 soundfonts and rendering MIDI files through them", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the presets of a soundfont
    Info {
        /// Sets the path of the SF2 file to inspect
        #[arg(value_name = "SOUNDFONT")]
        soundfont: PathBuf,
    },
    /// Render a MIDI file through a soundfont into a mono WAV file
    Render {
        /// Sets the path of the SF2 file to play with
        #[arg(value_name = "SOUNDFONT")]
        soundfont: PathBuf,

        /// Sets the path of the MIDI file to render
        #[arg(value_name = "MIDI")]
        midi: PathBuf,

        /// Sets the output WAV path (defaults to the MIDI path with .wav)
        #[arg(short = 'o', long, value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Seconds of silence-bounded tail to render after the last event
        #[arg(long, default_value_t = 2.0)]
        tail: f64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Info { soundfont } => {
            let synth = Synth::load_file(soundfont)?;
            println!(
                "{} ({} presets)",
                soundfont.display().to_string().bold(),
                synth.preset_count()
            );
            for (i, preset) in synth.font().presets.iter().enumerate() {
                println!(
                    "{:>4}  bank {:>3}  preset {:>3}  {}",
                    i, preset.bank, preset.preset, preset.name
                );
            }
        }
        Commands::Render {
            soundfont,
            midi,
            output,
            tail,
        } => {
            let mut synth = Synth::load_file(soundfont)?;
            let smf_source = std::fs::read(midi)?;
            let smf = Smf::parse(&smf_source)?;
            let events = flatten_events(&smf)?;

            let output_path = output
                .clone()
                .unwrap_or_else(|| midi.with_extension("wav"));
            print!("Rendering {}... ", midi.display());

            // MIDI programs default to 0; channel 10 is percussion.
            for channel in 0..16 {
                let _ = synth.channel_set_preset_number(channel, 0, channel == 9);
            }

            let spec = hound::WavSpec {
                channels: 1,
                sample_rate: SAMPLE_RATE,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut writer = hound::WavWriter::create(&output_path, spec)?;

            let last_event_time = events.last().map(|(time, _)| *time).unwrap_or(0.0);
            let mut next_event = 0;
            let mut buffer = [0_i16; RENDER_BLOCK];
            let mut rendered: u64 = 0;
            loop {
                let now = rendered as f64 / SAMPLE_RATE as f64;
                while next_event < events.len() && events[next_event].0 <= now {
                    dispatch(&mut synth, &events[next_event].1);
                    next_event += 1;
                }
                synth.render_short(&mut buffer);
                for &sample in buffer.iter() {
                    writer.write_sample(sample)?;
                }
                rendered += RENDER_BLOCK as u64;

                if next_event >= events.len() {
                    let past_end = now - last_event_time;
                    if synth.active_voice_count() == 0 || past_end > *tail {
                        break;
                    }
                }
            }
            writer.finalize()?;
            println!("done! ({:.1}s to {})", rendered as f64 / SAMPLE_RATE as f64, output_path.display());
        }
    }

    Ok(())
}

/// Merges all tracks into one list of (seconds, event), applying tempo
/// changes from any track globally the way an SMF type 1 player must.
fn flatten_events<'a>(
    smf: &'a Smf,
) -> Result<Vec<(f64, TrackEventKind<'a>)>, Box<dyn std::error::Error>> {
    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(tpb) => tpb.as_int() as f64,
        Timing::Timecode(..) => {
            println!(
                "{}SMPTE-timed MIDI files are not supported!",
                "Error: ".red()
            );
            return Err("unsupported MIDI timing".into());
        }
    };

    let mut by_tick: Vec<(u64, TrackEventKind<'a>)> = Vec::new();
    for track in &smf.tracks {
        let mut tick: u64 = 0;
        for event in track {
            tick += event.delta.as_int() as u64;
            by_tick.push((tick, event.kind.clone()));
        }
    }
    // Stable sort keeps same-tick events in track order.
    by_tick.sort_by_key(|&(tick, _)| tick);

    let mut events = Vec::with_capacity(by_tick.len());
    let mut seconds_per_tick = 500_000.0 / 1_000_000.0 / ticks_per_beat;
    let mut last_tick = 0_u64;
    let mut now = 0.0_f64;
    for (tick, kind) in by_tick {
        now += (tick - last_tick) as f64 * seconds_per_tick;
        last_tick = tick;
        if let TrackEventKind::Meta(MetaMessage::Tempo(us_per_beat)) = kind {
            seconds_per_tick = us_per_beat.as_int() as f64 / 1_000_000.0 / ticks_per_beat;
        }
        events.push((now, kind));
    }
    Ok(events)
}

fn dispatch(synth: &mut Synth, kind: &TrackEventKind) {
    let TrackEventKind::Midi { channel, message } = kind else {
        return;
    };
    let channel = channel.as_int() as usize;
    match *message {
        MidiMessage::NoteOn { key, vel } => {
            synth.channel_note_on(channel, key.as_int(), vel.as_int() as f32 / 127.0);
        }
        MidiMessage::NoteOff { key, .. } => {
            synth.channel_note_off(channel, key.as_int());
        }
        MidiMessage::Controller { controller, value } => {
            synth.channel_midi_control(channel, controller.as_int(), value.as_int());
        }
        MidiMessage::ProgramChange { program } => {
            let _ = synth.channel_set_preset_number(channel, program.as_int() as u16, channel == 9);
        }
        MidiMessage::PitchBend { bend } => {
            synth.channel_set_pitchwheel(channel, bend.0.as_int());
        }
        _ => {}
    }
}
