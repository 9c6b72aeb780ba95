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

//! Test fixtures.

use std::path::Path;

/// Writes an integer PCM WAV file containing a 440Hz sine tone.
pub fn write_sine_wav(
    path: &Path,
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
    frames: u32,
) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("failed to create wav");
    for frame in 0..frames {
        let t = frame as f32 / sample_rate as f32;
        let value = (t * 440.0 * 2.0 * std::f32::consts::PI).sin();
        for _ in 0..channels {
            match bits_per_sample {
                8 => writer
                    .write_sample((value * 100.0) as i8)
                    .expect("failed to write sample"),
                16 => writer
                    .write_sample((value * 30000.0) as i16)
                    .expect("failed to write sample"),
                _ => writer
                    .write_sample((value * 8_000_000.0) as i32)
                    .expect("failed to write sample"),
            }
        }
    }
    writer.finalize().expect("failed to finalize wav");
}
