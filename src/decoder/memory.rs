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
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{PacketDescription, PacketSource, PacketsRead};
use crate::error::EngineError;
use crate::format::StreamFormat;

/// An in-memory packet source with a fixed packet size. Used by tests and
/// anywhere synthetic audio needs to masquerade as a track; it counts reads
/// so callers can observe whether the controller went back to "disk".
pub struct MemoryPacketSource {
    format: StreamFormat,
    data: Vec<u8>,
    packet_size: usize,
    cookie: Option<Vec<u8>>,
    reads: Arc<AtomicU64>,
}

impl MemoryPacketSource {
    /// Creates a source over `data` split into `packet_size` packets.
    pub fn new(format: StreamFormat, data: Vec<u8>, packet_size: usize) -> MemoryPacketSource {
        assert!(packet_size > 0, "packet size must be nonzero");
        MemoryPacketSource {
            format,
            data,
            packet_size,
            cookie: None,
            reads: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Attaches codec side data to the source.
    pub fn with_cookie(mut self, cookie: Vec<u8>) -> MemoryPacketSource {
        self.cookie = Some(cookie);
        self
    }

    /// Returns a counter incremented on every data-touching read.
    pub fn read_counter(&self) -> Arc<AtomicU64> {
        self.reads.clone()
    }
}

impl PacketSource for MemoryPacketSource {
    fn format(&self) -> &StreamFormat {
        &self.format
    }

    fn data_size(&self) -> u64 {
        self.data.len() as u64
    }

    fn packet_count(&self) -> u64 {
        (self.data.len() as u64).div_ceil(self.packet_size as u64)
    }

    fn max_packet_size(&self) -> usize {
        self.packet_size
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

        let total = self.packet_count();
        if cursor >= total {
            return Ok(PacketsRead::default());
        }

        let remaining = (total - cursor) as usize;
        let want = max_packets.min(remaining).min(buf.len() / self.packet_size);
        let mut result = PacketsRead::default();

        for index in 0..want {
            let start = (cursor as usize + index) * self.packet_size;
            let end = (start + self.packet_size).min(self.data.len());
            let size = end - start;
            buf[result.bytes..result.bytes + size].copy_from_slice(&self.data[start..end]);
            if self.format.is_vbr() {
                descs.push(PacketDescription {
                    start_offset: result.bytes as u64,
                    byte_size: size as u32,
                    frames: self.format.frames_per_packet,
                });
            }
            result.bytes += size;
            result.packets += 1;
        }

        if result.packets > 0 {
            self.reads.fetch_add(1, Ordering::SeqCst);
        }
        Ok(result)
    }
}
