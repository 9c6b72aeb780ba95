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

//! Per-track bookkeeping for the background music playlist.

use std::path::{Path, PathBuf};

use crate::decoder::{self, PacketSource};
use crate::error::EngineError;
use crate::format::StreamFormat;

/// The number of buffers rotated through each playback queue.
pub const NUM_BUFFERS: usize = 3;

/// Buffer sizing bounds, in bytes.
const MIN_CHUNK_BYTES: usize = 0x4000;
const MAX_CHUNK_BYTES: usize = 0x10000;

/// One playlist entry. The packet source is dropped between plays for
/// file-backed tracks and reopened when the track comes around again.
pub struct TrackInfo {
    path: PathBuf,
    format: StreamFormat,
    data_size: u64,
    packet_count: u64,
    max_packet_size: usize,
    /// Load the whole track into a single buffer instead of streaming it.
    pub load_at_once: bool,
    /// Whether the single buffer currently holds the whole track.
    pub resident: bool,
    source: Option<Box<dyn PacketSource>>,
    /// File-backed sources can be closed and reopened; injected ones cannot.
    reopenable: bool,
}

impl TrackInfo {
    /// Opens a track from disk and captures its stream metadata.
    pub fn load(path: &Path, load_at_once: bool) -> Result<TrackInfo, EngineError> {
        let source = decoder::open(path)?;
        Ok(TrackInfo::build(source, path.to_path_buf(), load_at_once, true))
    }

    /// Wraps an already-open packet source. Used by tests and callers that
    /// synthesize audio; such tracks stay open for their whole lifetime.
    pub fn from_source(source: Box<dyn PacketSource>, load_at_once: bool) -> TrackInfo {
        TrackInfo::build(source, PathBuf::new(), load_at_once, false)
    }

    fn build(
        source: Box<dyn PacketSource>,
        path: PathBuf,
        load_at_once: bool,
        reopenable: bool,
    ) -> TrackInfo {
        let format = *source.format();
        let data_size = source.data_size();
        let packet_count = source.packet_count();
        let max_packet_size = source.max_packet_size();
        TrackInfo {
            path,
            format,
            data_size,
            packet_count,
            max_packet_size,
            load_at_once,
            resident: false,
            source: Some(source),
            reopenable,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> &StreamFormat {
        &self.format
    }

    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    pub fn packet_count(&self) -> u64 {
        self.packet_count
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    pub fn magic_cookie(&self) -> Option<Vec<u8>> {
        self.source.as_ref().and_then(|source| source.magic_cookie())
    }

    /// The open packet source. Errors if the track is currently closed.
    pub fn source_mut(&mut self) -> Result<&mut dyn PacketSource, EngineError> {
        match self.source.as_mut() {
            Some(source) => Ok(source.as_mut()),
            None => Err(EngineError::Hardware(format!(
                "Track {} read while closed",
                self.path.display()
            ))),
        }
    }

    /// Releases the underlying file until the track plays again.
    pub fn close(&mut self) {
        if self.reopenable {
            self.source = None;
        }
    }

    /// Reopens a closed file-backed track.
    pub fn reopen(&mut self) -> Result<(), EngineError> {
        if self.source.is_none() {
            self.source = Some(decoder::open(&self.path)?);
        }
        Ok(())
    }
}

/// Computes the buffer size and packet count covering roughly `seconds` of
/// audio, clamped to the chunk bounds. Formats with an unknown packet
/// duration fall back to the largest chunk that holds at least one packet.
pub fn chunk_size(format: &StreamFormat, max_packet_size: usize, seconds: f64) -> (usize, usize) {
    let mut bytes = if format.frames_per_packet > 0 {
        let packets = format.sample_rate / f64::from(format.frames_per_packet) * seconds;
        (packets * max_packet_size as f64) as usize
    } else {
        MAX_CHUNK_BYTES.max(max_packet_size)
    };

    if bytes > MAX_CHUNK_BYTES && bytes > max_packet_size {
        bytes = MAX_CHUNK_BYTES;
    } else if bytes < MIN_CHUNK_BYTES {
        bytes = MIN_CHUNK_BYTES;
    }

    (bytes, bytes / max_packet_size)
}
