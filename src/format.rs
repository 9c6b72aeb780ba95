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

//! Stream format descriptors and the wildcard-tolerant compatibility matcher.
//!
//! A field value of zero means "unspecified" and matches anything. The
//! streaming controller uses [`compatible`] to decide whether two playlist
//! tracks can share a hardware queue.

/// Format flag bits. A flags value of zero is a wildcard.
pub mod flags {
    pub const IS_FLOAT: u32 = 1 << 0;
    pub const IS_BIG_ENDIAN: u32 = 1 << 1;
    pub const IS_SIGNED_INTEGER: u32 = 1 << 2;
    pub const IS_PACKED: u32 = 1 << 3;
    pub const IS_ALIGNED_HIGH: u32 = 1 << 4;
    pub const IS_NON_INTERLEAVED: u32 = 1 << 5;
    /// Set when a descriptor explicitly declares "no flags apply".
    pub const ARE_ALL_CLEAR: u32 = 1 << 31;
}

/// Codec identifiers. Zero is a wildcard.
pub const CODEC_LINEAR_PCM: u32 = 1;
pub const CODEC_MPEG_LAYER_3: u32 = 2;
pub const CODEC_FLAC: u32 = 3;
pub const CODEC_VORBIS: u32 = 4;
pub const CODEC_AAC: u32 = 5;
pub const CODEC_OTHER: u32 = 0xff;

/// Describes the encoding of an audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StreamFormat {
    /// Sample rate in Hz. Zero is a wildcard.
    pub sample_rate: f64,
    /// Codec identifier (one of the `CODEC_*` constants, or zero).
    pub codec: u32,
    /// Format flag bits from [`flags`].
    pub flags: u32,
    /// Bytes per packet. Zero for variable-bit-rate streams.
    pub bytes_per_packet: u32,
    /// Frames per packet. Zero when the codec has no fixed packet timing.
    pub frames_per_packet: u32,
    /// Bytes per frame. Zero for compressed streams.
    pub bytes_per_frame: u32,
    /// Channel count.
    pub channels: u32,
    /// Bit depth per channel. Zero for compressed streams.
    pub bits_per_channel: u32,
}

impl StreamFormat {
    /// Creates an interleaved, packed linear-PCM descriptor.
    pub fn pcm(sample_rate: f64, channels: u32, bits_per_channel: u32, signed: bool) -> StreamFormat {
        let bytes_per_frame = channels * bits_per_channel / 8;
        let mut format_flags = flags::IS_PACKED;
        if signed {
            format_flags |= flags::IS_SIGNED_INTEGER;
        }
        StreamFormat {
            sample_rate,
            codec: CODEC_LINEAR_PCM,
            flags: format_flags,
            bytes_per_packet: bytes_per_frame,
            frames_per_packet: 1,
            bytes_per_frame,
            channels,
            bits_per_channel,
        }
    }

    /// Returns true if this is a linear-PCM stream.
    pub fn is_pcm(&self) -> bool {
        self.codec == CODEC_LINEAR_PCM
    }

    /// Returns true if the stream has no fixed packet size or timing and
    /// therefore needs per-packet descriptions alongside its buffers.
    pub fn is_vbr(&self) -> bool {
        self.bytes_per_packet == 0 || self.frames_per_packet == 0
    }

    /// Returns true if sample byte order matches the target's native order.
    pub fn is_native_endian(&self) -> bool {
        let big = self.flags & flags::IS_BIG_ENDIAN != 0;
        big == cfg!(target_endian = "big")
    }
}

/// Compares two format flag fields, applying the linear-PCM relaxations.
fn flags_match(x: &StreamFormat, y: &StreamFormat) -> bool {
    let mut x_flags = x.flags;
    let mut y_flags = y.flags;

    // Wildcards match everything.
    if x.codec == 0 || y.codec == 0 || x_flags == 0 || y_flags == 0 {
        return true;
    }

    if x.codec == CODEC_LINEAR_PCM {
        x_flags &= !flags::ARE_ALL_CLEAR;
        y_flags &= !flags::ARE_ALL_CLEAR;

        // If both sides are packed, high alignment is meaningless.
        if x_flags & y_flags & flags::IS_PACKED != 0 {
            x_flags &= !flags::IS_ALIGNED_HIGH;
            y_flags &= !flags::IS_ALIGNED_HIGH;
        }

        // If both sides are float, the signed-integer bit is meaningless.
        if x_flags & y_flags & flags::IS_FLOAT != 0 {
            x_flags &= !flags::IS_SIGNED_INTEGER;
            y_flags &= !flags::IS_SIGNED_INTEGER;
        }

        // Byte order is irrelevant for packed data of 8 bits or less.
        if x.bits_per_channel <= 8 && x_flags & flags::IS_PACKED != 0 {
            x_flags &= !flags::IS_BIG_ENDIAN;
        }
        if y.bits_per_channel <= 8 && y_flags & flags::IS_PACKED != 0 {
            y_flags &= !flags::IS_BIG_ENDIAN;
        }

        // Interleaving is irrelevant for mono data.
        if x.channels <= 1 && y.channels <= 1 {
            x_flags &= !flags::IS_NON_INTERLEAVED;
            y_flags &= !flags::IS_NON_INTERLEAVED;
        }
    }

    x_flags == y_flags
}

/// Returns true if two stream formats are compatible: every field is either a
/// wildcard (zero) on one side or equal on both, with the linear-PCM flag
/// relaxations applied. Pure and symmetric.
pub fn compatible(x: &StreamFormat, y: &StreamFormat) -> bool {
    fn field(a: u32, b: u32) -> bool {
        a == 0 || b == 0 || a == b
    }

    (x.sample_rate == 0.0 || y.sample_rate == 0.0 || x.sample_rate == y.sample_rate)
        && field(x.codec, y.codec)
        && flags_match(x, y)
        && field(x.bytes_per_packet, y.bytes_per_packet)
        && field(x.frames_per_packet, y.frames_per_packet)
        && field(x.bytes_per_frame, y.bytes_per_frame)
        && field(x.channels, y.channels)
        && field(x.bits_per_channel, y.bits_per_channel)
}
