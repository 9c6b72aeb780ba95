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
use std::path::Path;

use symphonia::core::codecs::{
    CODEC_TYPE_AAC, CODEC_TYPE_FLAC, CODEC_TYPE_MP3, CODEC_TYPE_NULL, CODEC_TYPE_PCM_F32BE,
    CODEC_TYPE_PCM_F32LE, CODEC_TYPE_PCM_S16BE, CODEC_TYPE_PCM_S16LE, CODEC_TYPE_PCM_S24BE,
    CODEC_TYPE_PCM_S24LE, CODEC_TYPE_PCM_S32BE, CODEC_TYPE_PCM_S32LE, CODEC_TYPE_PCM_U8,
    CODEC_TYPE_VORBIS,
};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::get_probe;

use super::{PacketDescription, PacketSource, PacketsRead};
use crate::error::EngineError;
use crate::format::{
    flags, StreamFormat, CODEC_AAC, CODEC_FLAC, CODEC_LINEAR_PCM, CODEC_MPEG_LAYER_3, CODEC_OTHER,
    CODEC_VORBIS,
};

/// Fallback packet size bound for codecs that do not declare one.
const DEFAULT_MAX_PACKET_SIZE: usize = 8 * 1024;

/// A packet source backed by symphonia's demuxers. Packets are passed through
/// undecoded; the output queue is responsible for the codec, which is why the
/// stream's magic cookie travels with the format.
pub struct AudioPacketSource {
    reader: Box<dyn FormatReader>,
    track_id: u32,
    format: StreamFormat,
    data_size: u64,
    packet_count: u64,
    max_packet_size: usize,
    cookie: Option<Vec<u8>>,
    /// The packet index the reader will yield next.
    position: u64,
    /// A packet that did not fit into the caller's buffer on the last read.
    pending: Option<Packet>,
}

impl AudioPacketSource {
    /// Opens an audio container and reads its stream metadata.
    pub fn open(path: &Path) -> Result<AudioPacketSource, EngineError> {
        let file = File::open(path).map_err(|err| EngineError::from_open(err, path))?;
        let data_size = file
            .metadata()
            .map(|metadata| metadata.len())
            .unwrap_or_default();
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|err| {
                EngineError::UnsupportedFormat(format!("{}: {}", path.display(), err))
            })?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                EngineError::UnsupportedFormat(format!("{}: no audio track", path.display()))
            })?;
        let track_id = track.id;
        let params = &track.codec_params;

        let sample_rate = params.sample_rate.ok_or_else(|| {
            EngineError::UnsupportedFormat(format!("{}: unknown sample rate", path.display()))
        })?;
        let channels = params.channels.map(|c| c.count() as u32).unwrap_or(0);
        let bits_per_channel = params.bits_per_sample.unwrap_or(0);

        let (codec, codec_flags) = map_codec(params.codec);
        let mut format = StreamFormat {
            sample_rate: f64::from(sample_rate),
            codec,
            flags: codec_flags,
            bytes_per_packet: 0,
            frames_per_packet: params.max_frames_per_packet.unwrap_or(0) as u32,
            bytes_per_frame: 0,
            channels,
            bits_per_channel,
        };
        if codec == CODEC_LINEAR_PCM && bits_per_channel > 0 {
            let bytes_per_frame = channels * bits_per_channel / 8;
            format.bytes_per_frame = bytes_per_frame;
            format.bytes_per_packet = bytes_per_frame;
        }

        let packet_count = match (params.n_frames, params.max_frames_per_packet) {
            (Some(frames), Some(per_packet)) if per_packet > 0 => frames.div_ceil(per_packet),
            _ => 0,
        };

        let cookie = params.extra_data.as_ref().map(|data| data.to_vec());

        Ok(AudioPacketSource {
            reader,
            track_id,
            format,
            data_size,
            packet_count,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            cookie,
            position: 0,
            pending: None,
        })
    }

    /// Rewinds the demuxer to the first packet.
    fn rewind(&mut self) -> Result<(), EngineError> {
        self.reader
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: 0,
                    track_id: self.track_id,
                },
            )
            .map_err(|err| EngineError::Hardware(format!("Error rewinding stream: {}", err)))?;
        self.position = 0;
        self.pending = None;
        Ok(())
    }

    /// Gets the next packet for our track, or None at the end of the stream.
    fn next_packet(&mut self) -> Result<Option<Packet>, EngineError> {
        if let Some(packet) = self.pending.take() {
            return Ok(Some(packet));
        }
        loop {
            match self.reader.next_packet() {
                Ok(packet) => {
                    if packet.track_id() == self.track_id {
                        return Ok(Some(packet));
                    }
                }
                Err(SymphoniaError::IoError(err))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(None),
                Err(err) => {
                    return Err(EngineError::Hardware(format!(
                        "Error reading packet: {}",
                        err
                    )))
                }
            }
        }
    }
}

impl PacketSource for AudioPacketSource {
    fn format(&self) -> &StreamFormat {
        &self.format
    }

    fn data_size(&self) -> u64 {
        self.data_size
    }

    fn packet_count(&self) -> u64 {
        self.packet_count
    }

    fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    fn magic_cookie(&self) -> Option<Vec<u8>> {
        self.cookie.clone()
    }

    fn read_packets(
        &mut self,
        cursor: u64,
        max_packets: usize,
        buf: &mut [u8],
        descs: &mut Vec<PacketDescription>,
    ) -> Result<PacketsRead, EngineError> {
        descs.clear();

        // The controller reads sequentially and rewinds to zero at track
        // boundaries; anything else is a caller bug.
        if cursor == 0 && self.position != 0 {
            self.rewind()?;
        } else if cursor != self.position {
            return Err(EngineError::Hardware(format!(
                "Non-sequential packet read: at {}, asked for {}",
                self.position, cursor
            )));
        }

        let mut result = PacketsRead::default();
        while result.packets < max_packets {
            let packet = match self.next_packet()? {
                Some(packet) => packet,
                None => break,
            };
            let data = packet.buf();
            if result.bytes + data.len() > buf.len() {
                // Doesn't fit; hold it for the next read.
                self.pending = Some(packet);
                break;
            }
            buf[result.bytes..result.bytes + data.len()].copy_from_slice(data);
            descs.push(PacketDescription {
                start_offset: result.bytes as u64,
                byte_size: data.len() as u32,
                frames: packet.dur() as u32,
            });
            if data.len() > self.max_packet_size {
                self.max_packet_size = data.len();
            }
            result.bytes += data.len();
            result.packets += 1;
        }

        self.position = cursor + result.packets as u64;
        Ok(result)
    }
}

/// Maps a symphonia codec type to our codec id and default flags.
fn map_codec(codec: symphonia::core::codecs::CodecType) -> (u32, u32) {
    match codec {
        CODEC_TYPE_PCM_U8 => (CODEC_LINEAR_PCM, flags::IS_PACKED),
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S32LE => (
            CODEC_LINEAR_PCM,
            flags::IS_PACKED | flags::IS_SIGNED_INTEGER,
        ),
        CODEC_TYPE_PCM_S16BE | CODEC_TYPE_PCM_S24BE | CODEC_TYPE_PCM_S32BE => (
            CODEC_LINEAR_PCM,
            flags::IS_PACKED | flags::IS_SIGNED_INTEGER | flags::IS_BIG_ENDIAN,
        ),
        CODEC_TYPE_PCM_F32LE => (CODEC_LINEAR_PCM, flags::IS_PACKED | flags::IS_FLOAT),
        CODEC_TYPE_PCM_F32BE => (
            CODEC_LINEAR_PCM,
            flags::IS_PACKED | flags::IS_FLOAT | flags::IS_BIG_ENDIAN,
        ),
        CODEC_TYPE_MP3 => (CODEC_MPEG_LAYER_3, 0),
        CODEC_TYPE_FLAC => (CODEC_FLAC, 0),
        CODEC_TYPE_VORBIS => (CODEC_VORBIS, 0),
        CODEC_TYPE_AAC => (CODEC_AAC, 0),
        _ => (CODEC_OTHER, 0),
    }
}
