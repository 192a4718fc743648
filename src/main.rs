// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::{Path, PathBuf};

use beatslicer::audio::{self, SaveFormat};
use beatslicer::config::Settings;
use beatslicer::detection::DetectionMethod;
use beatslicer::editor::{Editor, Request, Response};
use beatslicer::sampler::Sampler;
use clap::{crate_version, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A beat slicer."
)]
struct Cli {
    /// The path to a YAML settings file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prints the format and length of a sample.
    Info {
        /// The sample to inspect.
        path: PathBuf,
    },
    /// Lists the onsets found in a sample.
    Onsets {
        /// The sample to analyse.
        path: PathBuf,
        /// Overrides the configured detection function.
        #[arg(short, long, value_enum)]
        method: Option<DetectionMethod>,
    },
    /// Lists the beats found in a sample.
    Beats {
        /// The sample to analyse.
        path: PathBuf,
        /// Overrides the configured detection function.
        #[arg(short, long, value_enum)]
        method: Option<DetectionMethod>,
    },
    /// Estimates the tempo of a sample.
    Bpm {
        /// The sample to analyse.
        path: PathBuf,
    },
    /// Slices a sample at its onsets and writes every slice to a directory.
    Slice {
        /// The sample to slice.
        path: PathBuf,
        /// The directory to write slices to. Must exist.
        output_dir: PathBuf,
        /// Slice at beats instead of onsets.
        #[arg(short, long)]
        beats: bool,
        /// The format to save slices as.
        #[arg(short, long, value_enum)]
        format: Option<SaveFormat>,
    },
    /// Slices a sample and plays the slices back to back through the sampler into a WAV file.
    Render {
        /// The sample to slice.
        path: PathBuf,
        /// The WAV file to write.
        output: PathBuf,
        /// The MIDI notes to play, in order. Should be in the form <NOTE>,<NOTE>,...
        /// Defaults to every slice in arrangement order.
        #[arg(short, long, value_delimiter = ',')]
        notes: Vec<u8>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Info { path } => {
            let (buffer, header) = audio::load_sample(&path)?;
            println!("{}:", path.display());
            println!("- format: {}", header.format);
            println!("- sample rate: {} Hz", header.sample_rate);
            println!("- channels: {}", header.num_channels);
            println!("- bits per sample: {}", header.bits_per_sample);
            println!(
                "- length: {} frames ({:.3}s)",
                buffer.num_frames(),
                seconds(buffer.num_frames(), header.sample_rate)
            );
        }
        Commands::Onsets { path, method } => {
            detect(settings, &path, method, Request::FindOnsets)?
        }
        Commands::Beats { path, method } => detect(settings, &path, method, Request::FindBeats)?,
        Commands::Bpm { path } => {
            let mut editor = open(settings, &path)?;
            match editor.handle(Request::CalcBpm)? {
                Response::Bpm(0) => println!("No tempo found in {}.", path.display()),
                Response::Bpm(bpm) => println!("{} BPM", bpm),
                _ => return Err("unexpected response from tempo calculation".into()),
            }
        }
        Commands::Slice {
            path,
            output_dir,
            beats,
            format,
        } => {
            let mut editor = open(settings, &path)?;
            slice(&mut editor, beats)?;
            let Response::Exported(paths) = editor.handle(Request::ExportSlices {
                directory: Some(output_dir),
                format,
            })?
            else {
                return Err("unexpected response from export".into());
            };

            println!("Slices (count: {}):", paths.len());
            for path in paths {
                println!("- {}", path.display());
            }
        }
        Commands::Render {
            path,
            output,
            notes,
        } => render(settings, &path, &output, notes)?,
    }

    Ok(())
}

fn seconds(frames: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    frames as f64 / sample_rate as f64
}

fn open(settings: Settings, path: &Path) -> Result<Editor, Box<dyn Error>> {
    let mut editor = Editor::new(settings);
    editor.handle(Request::Import(path.to_path_buf()))?;
    Ok(editor)
}

/// Runs onset or beat detection and lists what was found.
fn detect(
    mut settings: Settings,
    path: &Path,
    method: Option<DetectionMethod>,
    request: Request,
) -> Result<(), Box<dyn Error>> {
    if let Some(method) = method {
        settings.detection_mut().set_method(method);
    }
    let mut editor = open(settings, path)?;
    let sample_rate = editor.header().map_or(0, |h| h.sample_rate);
    let Response::Detected { frames } = editor.handle(request)? else {
        return Err("unexpected response from detection".into());
    };

    if frames.is_empty() {
        println!("Nothing found in {}.", path.display());
        return Ok(());
    }
    println!("Found in {} (count: {}):", path.display(), frames.len());
    for frame in frames {
        println!("- {} ({:.3}s)", frame, seconds(frame, sample_rate));
    }
    Ok(())
}

/// Finds onsets or beats and cuts the sample at them.
fn slice(editor: &mut Editor, beats: bool) -> Result<(), Box<dyn Error>> {
    let request = if beats {
        Request::FindBeats
    } else {
        Request::FindOnsets
    };
    editor.handle(request)?;
    editor.handle(Request::CreateSlices)?;
    Ok(())
}

/// Plays each note to completion through an offline sampler and writes the result.
fn render(
    settings: Settings,
    path: &Path,
    output: &Path,
    notes: Vec<u8>,
) -> Result<(), Box<dyn Error>> {
    let config = settings.sampler().clone();
    let mut editor = open(settings, path)?;
    slice(&mut editor, false)?;

    let (mut sampler, handle) = Sampler::with_handle(
        config.max_voices(),
        config.output_sample_rate(),
        config.queue_size(),
    );
    editor.attach_sampler(handle.clone())?;

    let notes = if notes.is_empty() {
        (0..editor.arrangement().len())
            .map(|i| config.first_note() as usize + i)
            .take_while(|note| *note <= 127)
            .map(|note| note as u8)
            .collect()
    } else {
        notes
    };

    let channels = config.output_channels() as usize;
    let block_size = config.block_size();
    let mut rendered: Vec<Vec<f32>> = vec![Vec::new(); channels];
    let mut block: Vec<Vec<f32>> = vec![vec![0.0; block_size]; channels];

    for note in notes.iter().copied() {
        handle.note_on(note, 1.0)?;
        loop {
            for channel in block.iter_mut() {
                channel.fill(0.0);
            }
            let mut outputs: Vec<&mut [f32]> = block.iter_mut().map(Vec::as_mut_slice).collect();
            sampler.render_next_block(&mut outputs, 0, block_size);
            for (out, channel) in rendered.iter_mut().zip(block.iter()) {
                out.extend_from_slice(channel);
            }
            if sampler.active_voice_count() == 0 {
                break;
            }
        }
        handle.collect_retired();
    }

    let mut writer = hound::WavWriter::create(
        output,
        hound::WavSpec {
            channels: channels as u16,
            sample_rate: config.output_sample_rate(),
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        },
    )?;
    let num_frames = rendered.first().map_or(0, Vec::len);
    for frame in 0..num_frames {
        for channel in rendered.iter() {
            writer.write_sample(channel[frame])?;
        }
    }
    writer.finalize()?;

    info!(
        path = ?output,
        notes = notes.len(),
        frames = num_frames,
        "Render finished"
    );
    Ok(())
}
