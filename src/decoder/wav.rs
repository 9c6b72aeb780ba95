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
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use hound::WavReader;

use super::{PacketDescription, PacketSource, PacketsRead};
use crate::error::EngineError;
use crate::format::{flags, StreamFormat};

/// A packet source that reads WAV files. For linear PCM one packet is one
/// frame, so the read cursor is a frame index.
pub struct WavPacketSource {
    reader: WavReader<BufReader<File>>,
    format: StreamFormat,
    frames: u64,
    bytes_per_frame: usize,
    /// The frame the reader is positioned at; used to detect rewinds.
    position: u64,
}

impl WavPacketSource {
    /// Opens a WAV file and reads its format metadata.
    pub fn open(path: &Path) -> Result<WavPacketSource, EngineError> {
        let reader = WavReader::open(path).map_err(|err| match err {
            hound::Error::IoError(io) => EngineError::from_open(io, path),
            other => EngineError::UnsupportedFormat(format!("{}: {}", path.display(), other)),
        })?;

        let spec = reader.spec();
        let frames = u64::from(reader.duration());

        let mut format = match spec.sample_format {
            hound::SampleFormat::Int => StreamFormat::pcm(
                f64::from(spec.sample_rate),
                u32::from(spec.channels),
                u32::from(spec.bits_per_sample),
                // WAV stores 8-bit samples unsigned, everything wider signed.
                spec.bits_per_sample > 8,
            ),
            hound::SampleFormat::Float => {
                let mut format = StreamFormat::pcm(
                    f64::from(spec.sample_rate),
                    u32::from(spec.channels),
                    u32::from(spec.bits_per_sample),
                    false,
                );
                format.flags |= flags::IS_FLOAT;
                format
            }
        };
        if cfg!(target_endian = "big") {
            // The source re-emits samples in native byte order.
            format.flags |= flags::IS_BIG_ENDIAN;
        }

        let bytes_per_frame = format.bytes_per_frame as usize;
        if bytes_per_frame == 0 {
            return Err(EngineError::UnsupportedFormat(format!(
                "{}: zero-sized frames",
                path.display()
            )));
        }

        Ok(WavPacketSource {
            reader,
            format,
            frames,
            bytes_per_frame,
            position: 0,
        })
    }

    fn read_error(err: hound::Error) -> EngineError {
        EngineError::Hardware(format!("Error reading WAV data: {}", err))
    }
}

impl PacketSource for WavPacketSource {
    fn format(&self) -> &StreamFormat {
        &self.format
    }

    fn data_size(&self) -> u64 {
        self.frames * self.bytes_per_frame as u64
    }

    fn packet_count(&self) -> u64 {
        self.frames
    }

    fn max_packet_size(&self) -> usize {
        self.bytes_per_frame
    }

    fn read_packets(
        &mut self,
        cursor: u64,
        max_packets: usize,
        buf: &mut [u8],
        descs: &mut Vec<PacketDescription>,
    ) -> Result<PacketsRead, EngineError> {
        descs.clear();

        if cursor >= self.frames {
            return Ok(PacketsRead::default());
        }
        if cursor != self.position {
            self.reader
                .seek(cursor as u32)
                .map_err(|err| EngineError::Hardware(format!("Error seeking WAV data: {}", err)))?;
            self.position = cursor;
        }

        let remaining = (self.frames - cursor) as usize;
        let want = max_packets
            .min(remaining)
            .min(buf.len() / self.bytes_per_frame);

        let spec = self.reader.spec();
        let samples_wanted = want * spec.channels as usize;
        let mut written = 0usize;
        let mut samples_read = 0usize;

        if spec.sample_format == hound::SampleFormat::Float {
            for sample in self.reader.samples::<f32>().take(samples_wanted) {
                let sample = sample.map_err(Self::read_error)?;
                buf[written..written + 4].copy_from_slice(&sample.to_ne_bytes());
                written += 4;
                samples_read += 1;
            }
        } else {
            let bytes_per_sample = (spec.bits_per_sample as usize).div_ceil(8);
            for sample in self.reader.samples::<i32>().take(samples_wanted) {
                let sample = sample.map_err(Self::read_error)?;
                match bytes_per_sample {
                    1 => {
                        // Back to the unsigned storage convention.
                        buf[written] = (sample as u8) ^ 0x80;
                    }
                    2 => {
                        buf[written..written + 2].copy_from_slice(&(sample as i16).to_ne_bytes());
                    }
                    _ => {
                        let bytes = sample.to_ne_bytes();
                        buf[written..written + bytes_per_sample]
                            .copy_from_slice(&bytes[..bytes_per_sample]);
                    }
                }
                written += bytes_per_sample;
                samples_read += 1;
            }
        }

        let packets = samples_read / spec.channels as usize;
        self.position = cursor + packets as u64;

        Ok(PacketsRead {
            bytes: packets * self.bytes_per_frame,
            packets,
        })
    }
}
