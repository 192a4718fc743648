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

//! Loading and saving of sample files.
//!
//! Decoding goes through symphonia so that any container it can probe (WAV,
//! AIFF, FLAC, Ogg Vorbis, MP3...) can be imported. Saving writes 32-bit float
//! data in fixed-size chunks.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info, warn};

use super::buffer::{SampleBuffer, SampleHeader, SampleRange, MAX_CHANNELS};
use super::error::AudioFileError;

/// Number of frames written per chunk when saving.
const SAVE_CHUNK_FRAMES: usize = 8192;

/// AU magic number (".snd").
const AU_MAGIC: u32 = 0x2e73_6e64;
/// AU encoding for 32-bit IEEE float.
const AU_ENCODING_FLOAT: u32 = 6;
/// Size of the AU header we write.
const AU_HEADER_SIZE: u32 = 24;

/// AIFC format version timestamp required in the FVER chunk.
const AIFC_VERSION: u32 = 0xa280_5140;
/// Size of an AIFC COMM chunk body with an empty compression name.
const AIFC_COMM_SIZE: u32 = 24;

/// Container formats a sample can be saved as. All are float encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SaveFormat {
    #[default]
    Wav,
    Aiff,
    Au,
    Flac,
    Ogg,
}

impl SaveFormat {
    /// The file extension appended to saved files.
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Wav => "wav",
            SaveFormat::Aiff => "aiff",
            SaveFormat::Au => "au",
            SaveFormat::Flac => "flac",
            SaveFormat::Ogg => "ogg",
        }
    }
}

/// Loads an entire sample file into memory.
pub fn load_sample(path: &Path) -> Result<(SampleBuffer, SampleHeader), AudioFileError> {
    load_sample_range(path, 0, None)
}

/// Loads `num_frames` frames starting at `start_frame`. `None` reads to the end of the file.
pub fn load_sample_range(
    path: &Path,
    start_frame: usize,
    num_frames: Option<usize>,
) -> Result<(SampleBuffer, SampleHeader), AudioFileError> {
    info!(path = ?path, start_frame, "Loading sample");

    let mut decoder = FileDecoder::open(path)?;
    let header = decoder.header.clone();
    let channels = header.num_channels as usize;

    if start_frame > 0 {
        decoder.seek(start_frame)?;
    }

    let mut planar: Vec<Vec<f32>> = vec![Vec::new(); channels];
    if let Some(frames) = num_frames {
        for channel in planar.iter_mut() {
            channel
                .try_reserve_exact(frames)
                .map_err(|_| AudioFileError::Allocation { frames, channels })?;
        }
    }

    while let Some(interleaved) = decoder.next_chunk()? {
        for frame in interleaved.chunks_exact(channels) {
            if num_frames.is_some_and(|limit| planar[0].len() >= limit) {
                break;
            }
            for (ch, sample) in frame.iter().enumerate() {
                let channel = &mut planar[ch];
                channel.try_reserve(1).map_err(|_| AudioFileError::Allocation {
                    frames: channel.len() + 1,
                    channels,
                })?;
                channel.push(*sample);
            }
        }
        if num_frames.is_some_and(|limit| planar[0].len() >= limit) {
            break;
        }
    }

    if planar[0].is_empty() {
        return Err(AudioFileError::FileFormat {
            path: path.display().to_string(),
            detail: "file contains no audio frames".to_string(),
        });
    }

    let buffer = SampleBuffer::from_planar(planar)?;
    info!(
        path = ?path,
        channels,
        sample_rate = header.sample_rate,
        frames = buffer.num_frames(),
        memory_kb = buffer.memory_size() / 1024,
        "Sample loaded"
    );

    Ok((buffer, header))
}

/// Saves a buffer to `dir_path/base_name.<ext>` and returns the written path.
///
/// On a short write the partially written file is left on disk; the caller should remove it.
pub fn save_sample(
    dir_path: &Path,
    base_name: &str,
    buffer: &SampleBuffer,
    header: &SampleHeader,
    format: SaveFormat,
) -> Result<PathBuf, AudioFileError> {
    if !dir_path.is_dir() {
        return Err(AudioFileError::DirectoryMissing(dir_path.to_path_buf()));
    }

    let path = dir_path.join(format!("{}.{}", base_name, format.extension()));
    match format {
        SaveFormat::Wav => save_wav(&path, buffer, header.sample_rate)?,
        SaveFormat::Au => save_au(&path, buffer, header.sample_rate)?,
        SaveFormat::Aiff => save_aiff(&path, buffer, header.sample_rate)?,
        SaveFormat::Flac | SaveFormat::Ogg => {
            warn!(format = ?format, "No encoder for requested save format");
            return Err(AudioFileError::UnsupportedSaveFormat(format));
        }
    }

    debug!(path = ?path, frames = buffer.num_frames(), "Sample saved");
    Ok(path)
}

fn save_wav(path: &Path, buffer: &SampleBuffer, sample_rate: u32) -> Result<(), AudioFileError> {
    let spec = hound::WavSpec {
        channels: buffer.num_channels() as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;

    write_chunks(buffer, |chunk| {
        let mut written = 0;
        for sample in chunk {
            writer.write_sample(*sample)?;
            written += 1;
        }
        Ok(written)
    })?;

    writer.finalize()?;
    Ok(())
}

fn save_au(path: &Path, buffer: &SampleBuffer, sample_rate: u32) -> Result<(), AudioFileError> {
    let mut writer = BufWriter::new(File::create(path)?);
    let data_size = (buffer.num_frames() * buffer.num_channels() * 4) as u32;
    for field in [
        AU_MAGIC,
        AU_HEADER_SIZE,
        data_size,
        AU_ENCODING_FLOAT,
        sample_rate,
        buffer.num_channels() as u32,
    ] {
        writer.write_all(&field.to_be_bytes())?;
    }

    write_chunks(buffer, |chunk| {
        let mut written = 0;
        for sample in chunk {
            writer.write_all(&sample.to_be_bytes())?;
            written += 1;
        }
        Ok(written)
    })?;

    writer.flush()?;
    Ok(())
}

/// Writes an AIFC file with big-endian 32-bit float ("fl32") sample data.
fn save_aiff(path: &Path, buffer: &SampleBuffer, sample_rate: u32) -> Result<(), AudioFileError> {
    let mut writer = BufWriter::new(File::create(path)?);
    let channels = buffer.num_channels();
    let data_size = (buffer.num_frames() * channels * 4) as u32;
    // FORM type, FVER chunk, COMM chunk, then the SSND header and data.
    let form_size = 4 + 12 + (8 + AIFC_COMM_SIZE) + (16 + data_size);

    writer.write_all(b"FORM")?;
    writer.write_all(&form_size.to_be_bytes())?;
    writer.write_all(b"AIFC")?;

    writer.write_all(b"FVER")?;
    writer.write_all(&4u32.to_be_bytes())?;
    writer.write_all(&AIFC_VERSION.to_be_bytes())?;

    writer.write_all(b"COMM")?;
    writer.write_all(&AIFC_COMM_SIZE.to_be_bytes())?;
    writer.write_all(&(channels as i16).to_be_bytes())?;
    writer.write_all(&(buffer.num_frames() as u32).to_be_bytes())?;
    writer.write_all(&32i16.to_be_bytes())?;
    writer.write_all(&extended_sample_rate(sample_rate))?;
    writer.write_all(b"fl32")?;
    // Empty pascal string, padded to an even length.
    writer.write_all(&[0, 0])?;

    writer.write_all(b"SSND")?;
    writer.write_all(&(8 + data_size).to_be_bytes())?;
    writer.write_all(&0u32.to_be_bytes())?;
    writer.write_all(&0u32.to_be_bytes())?;

    write_chunks(buffer, |chunk| {
        let mut written = 0;
        for sample in chunk {
            writer.write_all(&sample.to_be_bytes())?;
            written += 1;
        }
        Ok(written)
    })?;

    writer.flush()?;
    Ok(())
}

/// Encodes a sample rate as the 80-bit IEEE extended float AIFF headers use.
fn extended_sample_rate(sample_rate: u32) -> [u8; 10] {
    let mut bytes = [0u8; 10];
    if sample_rate == 0 {
        return bytes;
    }
    let rate = sample_rate as u64;
    let shift = rate.leading_zeros();
    let exponent = (16383 + 63 - shift) as u16;
    bytes[..2].copy_from_slice(&exponent.to_be_bytes());
    bytes[2..].copy_from_slice(&(rate << shift).to_be_bytes());
    bytes
}

/// Interleaves the buffer chunk by chunk and hands each chunk to `write`, which returns
/// the number of samples it wrote.
fn write_chunks<F>(buffer: &SampleBuffer, mut write: F) -> Result<(), AudioFileError>
where
    F: FnMut(&[f32]) -> Result<usize, AudioFileError>,
{
    let num_frames = buffer.num_frames();
    let mut interleaved = Vec::with_capacity(SAVE_CHUNK_FRAMES * buffer.num_channels());
    let mut start_frame = 0;

    while start_frame < num_frames {
        let frames = SAVE_CHUNK_FRAMES.min(num_frames - start_frame);
        buffer.interleave_into(SampleRange::new(start_frame, frames), &mut interleaved);
        let written = write(&interleaved)?;
        if written != interleaved.len() {
            return Err(AudioFileError::Write {
                expected: interleaved.len(),
                written,
            });
        }
        start_frame += frames;
    }

    Ok(())
}

/// Wraps a symphonia reader and decoder for a single audio track.
struct FileDecoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    track_id: u32,
    header: SampleHeader,
    path: String,
}

impl FileDecoder {
    fn open(path: &Path) -> Result<Self, AudioFileError> {
        let path_str = path.display().to_string();
        let format_error = |detail: String| AudioFileError::FileFormat {
            path: path_str.clone(),
            detail,
        };

        let file = File::open(path).map_err(|e| {
            AudioFileError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();
        let probed = get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|e| format_error(e.to_string()))?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| format_error("No audio track found".to_string()))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| format_error("Sample rate not specified".to_string()))?;
        let num_channels = params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| format_error("Channels not specified".to_string()))?;
        if num_channels == 0 || num_channels as usize > MAX_CHANNELS {
            return Err(AudioFileError::UnsupportedChannels(num_channels));
        }

        let decoder = get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| format_error(e.to_string()))?;

        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_uppercase())
            .unwrap_or_else(|| "UNKNOWN".to_string());

        Ok(Self {
            format_reader,
            decoder,
            track_id,
            header: SampleHeader {
                sample_rate,
                num_channels,
                bits_per_sample: params.bits_per_sample.unwrap_or(0) as u16,
                format,
            },
            path: path_str,
        })
    }

    fn seek(&mut self, start_frame: usize) -> Result<(), AudioFileError> {
        let start = std::time::Duration::from_secs_f64(
            start_frame as f64 / self.header.sample_rate as f64,
        );
        self.format_reader.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time: Time::from(start),
                track_id: Some(self.track_id),
            },
        )?;
        self.decoder.reset();
        Ok(())
    }

    /// Decodes the next packet of the track into interleaved f32 samples.
    fn next_chunk(&mut self) -> Result<Option<Vec<f32>>, AudioFileError> {
        loop {
            let packet = match self.next_packet()? {
                Some(packet) => packet,
                None => return Ok(None),
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    // A corrupt packet is skipped rather than aborting the whole load.
                    warn!(path = %self.path, error = %e, "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let samples = decode_buffer_to_f32(decoded);
            if !samples.is_empty() {
                return Ok(Some(samples));
            }
        }
    }

    fn next_packet(&mut self) -> Result<Option<Packet>, AudioFileError> {
        match self.format_reader.next_packet() {
            Ok(packet) => Ok(Some(packet)),
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Ok(None)
            }
            Err(SymphoniaError::ResetRequired) => {
                self.decoder.reset();
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Converts a decoded buffer of any sample type to interleaved f32.
fn decode_buffer_to_f32(decoded: AudioBufferRef) -> Vec<f32> {
    match decoded {
        AudioBufferRef::F32(buf) => interleave(&buf, |s| s),
        AudioBufferRef::F64(buf) => interleave(&buf, |s| s as f32),
        AudioBufferRef::S8(buf) => interleave(&buf, |s| s as f32 / (1i64 << 7) as f32),
        AudioBufferRef::S16(buf) => interleave(&buf, |s| s as f32 / (1i64 << 15) as f32),
        AudioBufferRef::S24(buf) => interleave(&buf, |s| s.inner() as f32 / (1i64 << 23) as f32),
        AudioBufferRef::S32(buf) => interleave(&buf, |s| s as f32 / (1i64 << 31) as f32),
        AudioBufferRef::U8(buf) => interleave(&buf, |s| (s as f32 / u8::MAX as f32) * 2.0 - 1.0),
        AudioBufferRef::U16(buf) => interleave(&buf, |s| (s as f32 / u16::MAX as f32) * 2.0 - 1.0),
        AudioBufferRef::U24(buf) => interleave(&buf, |s| {
            (s.inner() as f32 / ((1u32 << 24) - 1) as f32) * 2.0 - 1.0
        }),
        AudioBufferRef::U32(buf) => interleave(&buf, |s| (s as f32 / u32::MAX as f32) * 2.0 - 1.0),
    }
}

fn interleave<T, F>(buf: &AudioBuffer<T>, convert: F) -> Vec<f32>
where
    T: symphonia::core::sample::Sample,
    F: Fn(T) -> f32,
{
    let frames = buf.frames();
    let channels = buf.spec().channels.count();
    let planes = buf.planes();
    let mut samples = Vec::with_capacity(frames * channels);
    for frame_idx in 0..frames {
        for ch_idx in 0..channels {
            samples.push(convert(planes.planes()[ch_idx][frame_idx]));
        }
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav;

    fn stereo_buffer(num_frames: usize) -> SampleBuffer {
        let left: Vec<f32> = (0..num_frames).map(|i| (i % 100) as f32 / 100.0).collect();
        let right: Vec<f32> = left.iter().map(|s| -s).collect();
        SampleBuffer::from_planar(vec![left, right]).unwrap()
    }

    fn header(channels: u16) -> SampleHeader {
        SampleHeader {
            sample_rate: 44100,
            num_channels: channels,
            bits_per_sample: 32,
            format: "WAV".to_string(),
        }
    }

    #[test]
    fn test_save_then_load_wav() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = stereo_buffer(20000);

        let path = save_sample(dir.path(), "slice_1", &buffer, &header(2), SaveFormat::Wav).unwrap();
        assert_eq!(path, dir.path().join("slice_1.wav"));

        let (loaded, loaded_header) = load_sample(&path).unwrap();
        assert_eq!(loaded_header.sample_rate, 44100);
        assert_eq!(loaded_header.num_channels, 2);
        assert_eq!(loaded_header.format, "WAV");
        assert_eq!(loaded.num_frames(), 20000);
        assert!((loaded.channel(0)[150] - 0.5).abs() < 1e-6);
        assert!((loaded.channel(1)[150] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_load_integer_wav_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("int.wav");
        write_wav(path.clone(), vec![vec![0i32, 1 << 30, -(1 << 30)]], 48000).unwrap();

        let (buffer, header) = load_sample(&path).unwrap();
        assert_eq!(header.sample_rate, 48000);
        assert_eq!(buffer.num_channels(), 1);
        assert_eq!(buffer.num_frames(), 3);
        assert!((buffer.channel(0)[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_save_au_header() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = SampleBuffer::from_planar(vec![vec![0.25; 10]]).unwrap();

        let path = save_sample(dir.path(), "out", &buffer, &header(1), SaveFormat::Au).unwrap();
        let bytes = std::fs::read(&path).unwrap();

        assert_eq!(bytes.len(), 24 + 10 * 4);
        assert_eq!(&bytes[0..4], b".snd");
        assert_eq!(u32::from_be_bytes(bytes[12..16].try_into().unwrap()), 6);
        assert_eq!(u32::from_be_bytes(bytes[16..20].try_into().unwrap()), 44100);
        assert_eq!(f32::from_be_bytes(bytes[24..28].try_into().unwrap()), 0.25);
    }

    #[test]
    fn test_save_aiff_header() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = SampleBuffer::from_planar(vec![vec![0.25; 10]]).unwrap();

        let path = save_sample(dir.path(), "out", &buffer, &header(1), SaveFormat::Aiff).unwrap();
        assert_eq!(path, dir.path().join("out.aiff"));
        let bytes = std::fs::read(&path).unwrap();

        assert_eq!(bytes.len(), 12 + 12 + 32 + 16 + 10 * 4);
        assert_eq!(&bytes[0..4], b"FORM");
        assert_eq!(
            u32::from_be_bytes(bytes[4..8].try_into().unwrap()) as usize,
            bytes.len() - 8
        );
        assert_eq!(&bytes[8..12], b"AIFC");
        assert_eq!(&bytes[24..28], b"COMM");
        assert_eq!(u16::from_be_bytes(bytes[32..34].try_into().unwrap()), 1);
        assert_eq!(u32::from_be_bytes(bytes[34..38].try_into().unwrap()), 10);
        assert_eq!(&bytes[40..44], &[0x40, 0x0e, 0xac, 0x44]);
        assert_eq!(&bytes[50..54], b"fl32");
        assert_eq!(&bytes[56..60], b"SSND");
        assert_eq!(f32::from_be_bytes(bytes[72..76].try_into().unwrap()), 0.25);
    }

    #[test]
    fn test_extended_sample_rate() {
        assert_eq!(
            extended_sample_rate(48000),
            [0x40, 0x0e, 0xbb, 0x80, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(
            extended_sample_rate(1),
            [0x3f, 0xff, 0x80, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(extended_sample_rate(0), [0; 10]);
    }

    #[test]
    fn test_save_then_load_aiff() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = stereo_buffer(20000);

        let path = save_sample(dir.path(), "slice_1", &buffer, &header(2), SaveFormat::Aiff).unwrap();
        let (loaded, loaded_header) = load_sample(&path).unwrap();

        assert_eq!(loaded_header.sample_rate, 44100);
        assert_eq!(loaded_header.num_channels, 2);
        assert_eq!(loaded_header.format, "AIFF");
        assert_eq!(loaded.num_frames(), 20000);
        assert!((loaded.channel(0)[150] - 0.5).abs() < 1e-4);
        assert!((loaded.channel(1)[150] + 0.5).abs() < 1e-4);
        assert!((loaded.channel(0)[19999] - 0.99).abs() < 1e-4);
    }

    #[test]
    fn test_save_errors() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = stereo_buffer(10);

        let missing = dir.path().join("missing");
        assert!(matches!(
            save_sample(&missing, "x", &buffer, &header(2), SaveFormat::Wav),
            Err(AudioFileError::DirectoryMissing(_))
        ));
        assert!(matches!(
            save_sample(dir.path(), "x", &buffer, &header(2), SaveFormat::Flac),
            Err(AudioFileError::UnsupportedSaveFormat(SaveFormat::Flac))
        ));
    }

    #[test]
    fn test_load_missing_and_garbage_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_sample(&dir.path().join("nope.wav")),
            Err(AudioFileError::Io(_))
        ));

        let garbage = dir.path().join("garbage.wav");
        std::fs::write(&garbage, b"definitely not audio").unwrap();
        let err = load_sample(&garbage).unwrap_err();
        assert!(matches!(err, AudioFileError::FileFormat { .. }));
        assert_eq!(err.title(), "Couldn't open audio file");
    }

    #[test]
    fn test_load_sub_range() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = stereo_buffer(1000);
        let path = save_sample(dir.path(), "full", &buffer, &header(2), SaveFormat::Wav).unwrap();

        let (partial, _) = load_sample_range(&path, 0, Some(250)).unwrap();
        assert_eq!(partial.num_frames(), 250);
        assert_eq!(partial.channel(0), &buffer.channel(0)[..250]);
    }
}
