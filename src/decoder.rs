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

//! The file/container decoder boundary.
//!
//! A [`PacketSource`] turns an opened track into a stream of fixed-or-variable
//! size packets plus format metadata. The streaming controller only ever reads
//! sequentially and rewinds to packet zero, so sources are not required to
//! support arbitrary seeking.

use std::path::Path;

use crate::error::EngineError;
use crate::format::StreamFormat;

pub mod audio;
pub mod memory;
pub mod wav;

/// Describes one packet within a filled buffer. Only produced for
/// variable-bit-rate streams; constant-bit-rate data needs no descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketDescription {
    /// Byte offset of the packet within the buffer.
    pub start_offset: u64,
    /// Size of the packet in bytes.
    pub byte_size: u32,
    /// Number of audio frames in the packet, if known.
    pub frames: u32,
}

/// The result of a packet read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketsRead {
    /// Total bytes written to the output buffer.
    pub bytes: usize,
    /// Number of packets read. Zero means the track has ended.
    pub packets: usize,
}

/// A source of encoded (or raw PCM) audio packets for one track.
pub trait PacketSource: Send {
    /// The canonical format of the stream.
    fn format(&self) -> &StreamFormat;

    /// Total decodable data size in bytes.
    fn data_size(&self) -> u64;

    /// Total packet count, or zero if unknown.
    fn packet_count(&self) -> u64;

    /// An upper bound on the size of a single packet in bytes.
    fn max_packet_size(&self) -> usize;

    /// Codec side data that must be handed to the output queue, if any.
    fn magic_cookie(&self) -> Option<Vec<u8>> {
        None
    }

    /// Reads up to `max_packets` packets starting at packet index `cursor`
    /// into `buf`. `descs` is cleared and, for variable-bit-rate streams,
    /// filled with one description per packet read. A result with zero
    /// packets means the end of the track.
    fn read_packets(
        &mut self,
        cursor: u64,
        max_packets: usize,
        buf: &mut [u8],
        descs: &mut Vec<PacketDescription>,
    ) -> Result<PacketsRead, EngineError>;
}

/// Opens a packet source for the given path, choosing the reader from the
/// file extension. WAV files get the raw PCM reader; everything else goes
/// through the symphonia-backed reader.
pub fn open(path: &Path) -> Result<Box<dyn PacketSource>, EngineError> {
    if !path.exists() {
        return Err(EngineError::FileNotFound(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("wav") => Ok(Box::new(wav::WavPacketSource::open(path)?)),
        _ => Ok(Box::new(audio::AudioPacketSource::open(path)?)),
    }
}
