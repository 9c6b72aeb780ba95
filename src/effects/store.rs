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

//! The registry of loaded effect clips.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use super::EffectId;
use crate::decoder::{self, PacketSource};
use crate::error::EngineError;
use crate::format::StreamFormat;
use crate::output::{BufferHandle, Mixer};

/// Read granularity while slurping an effect file.
const READ_CHUNK_BYTES: usize = 0x4000;

struct Effect {
    path: PathBuf,
    buffer: BufferHandle,
    format: StreamFormat,
    data_size: u64,
}

/// Decodes effect files whole and registers them as mixer buffers. The mixer
/// only understands small interleaved integer PCM, so anything else is
/// rejected at load time.
pub struct EffectStore {
    mixer: Arc<dyn Mixer>,
    effects: HashMap<EffectId, Effect>,
    next_id: u64,
}

impl EffectStore {
    pub fn new(mixer: Arc<dyn Mixer>) -> EffectStore {
        EffectStore {
            mixer,
            effects: HashMap::new(),
            next_id: 1,
        }
    }

    /// Loads an effect clip from disk.
    pub fn load(&mut self, path: &Path) -> Result<EffectId, EngineError> {
        let source = decoder::open(path)?;
        info!(path = ?path, "Loading effect");
        self.load_source(source, path.to_path_buf())
    }

    /// Loads an effect clip from an already-open packet source.
    pub fn load_source(
        &mut self,
        mut source: Box<dyn PacketSource>,
        path: PathBuf,
    ) -> Result<EffectId, EngineError> {
        let format = *source.format();
        validate(&format, &path)?;

        let mut data = Vec::with_capacity(source.data_size() as usize);
        let max_packet_size = source.max_packet_size();
        let mut buf = vec![0u8; READ_CHUNK_BYTES.max(max_packet_size)];
        let max_packets = buf.len() / max_packet_size;
        let mut descs = Vec::new();
        let mut cursor = 0u64;
        loop {
            let read = source.read_packets(cursor, max_packets, &mut buf, &mut descs)?;
            if read.packets == 0 {
                break;
            }
            data.extend_from_slice(&buf[..read.bytes]);
            cursor += read.packets as u64;
        }

        let buffer = self.mixer.create_buffer(&format, &data)?;
        let id = EffectId(self.next_id);
        self.next_id += 1;
        self.effects.insert(
            id,
            Effect {
                path,
                buffer,
                format,
                data_size: data.len() as u64,
            },
        );
        Ok(id)
    }

    /// The mixer buffer backing a loaded effect.
    pub fn buffer(&self, id: EffectId) -> Option<BufferHandle> {
        self.effects.get(&id).map(|effect| effect.buffer)
    }

    pub fn format(&self, id: EffectId) -> Option<StreamFormat> {
        self.effects.get(&id).map(|effect| effect.format)
    }

    pub fn data_size(&self, id: EffectId) -> Option<u64> {
        self.effects.get(&id).map(|effect| effect.data_size)
    }

    /// Removes an effect and releases its mixer buffer. Any voices bound to
    /// the buffer must already be stopped.
    pub fn unload(&mut self, id: EffectId) -> Result<(), EngineError> {
        if let Some(effect) = self.effects.remove(&id) {
            info!(path = ?effect.path, "Unloading effect");
            self.mixer.release_buffer(effect.buffer)?;
        }
        Ok(())
    }

    /// Releases every remaining effect buffer.
    pub fn clear(&mut self) -> Result<(), EngineError> {
        for (_, effect) in self.effects.drain() {
            self.mixer.release_buffer(effect.buffer)?;
        }
        Ok(())
    }
}

/// Checks that the mixer can play the clip directly.
fn validate(format: &StreamFormat, path: &Path) -> Result<(), EngineError> {
    if !format.is_pcm() {
        return Err(EngineError::UnsupportedFormat(format!(
            "{}: effects must be linear PCM",
            path.display()
        )));
    }
    if format.channels == 0 || format.channels > 2 {
        return Err(EngineError::UnsupportedFormat(format!(
            "{}: effects must be mono or stereo",
            path.display()
        )));
    }
    if format.bits_per_channel != 8 && format.bits_per_channel != 16 {
        return Err(EngineError::UnsupportedFormat(format!(
            "{}: effects must be 8 or 16 bit",
            path.display()
        )));
    }
    if format.bits_per_channel > 8 && !format.is_native_endian() {
        return Err(EngineError::UnsupportedFormat(format!(
            "{}: 16-bit effects must be native endian",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::memory::MemoryPacketSource;
    use crate::format::flags;
    use crate::output::mock;
    use crate::testutil::write_sine_wav;

    fn store(device: &mock::Device) -> EffectStore {
        EffectStore::new(Arc::new(device.clone()))
    }

    #[test]
    fn test_load_wav_effect() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("click.wav");
        write_sine_wav(&path, 22050, 1, 8, 300);

        let device = mock::Device::new();
        let mut store = store(&device);
        let id = store.load(&path).expect("failed to load effect");

        assert_eq!(store.data_size(id), Some(300));
        let buffer = store.buffer(id).expect("no buffer");
        assert_eq!(
            device.static_buffer_data(buffer).map(|data| data.len()),
            Some(300)
        );
        assert_eq!(
            device.static_buffer_format(buffer).map(|f| f.channels),
            Some(1)
        );
    }

    #[test]
    fn test_load_stereo_sixteen_bit() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("click.wav");
        write_sine_wav(&path, 44100, 2, 16, 100);

        let device = mock::Device::new();
        let mut store = store(&device);
        let id = store.load(&path).expect("failed to load effect");
        assert_eq!(store.data_size(id), Some(400));
    }

    #[test]
    fn test_rejects_wide_samples() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("wide.wav");
        write_sine_wav(&path, 44100, 1, 24, 100);

        let device = mock::Device::new();
        let mut store = store(&device);
        let err = store.load(&path).expect_err("load should fail");
        assert!(matches!(err, EngineError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_rejects_foreign_endianness() {
        let mut format = StreamFormat::pcm(44100.0, 1, 16, true);
        if cfg!(target_endian = "big") {
            format.flags &= !flags::IS_BIG_ENDIAN;
        } else {
            format.flags |= flags::IS_BIG_ENDIAN;
        }
        let source = MemoryPacketSource::new(format, vec![0u8; 64], 2);

        let device = mock::Device::new();
        let mut store = store(&device);
        let err = store
            .load_source(Box::new(source), PathBuf::from("swapped.raw"))
            .expect_err("load should fail");
        assert!(matches!(err, EngineError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_unload_releases_buffer() {
        let device = mock::Device::new();
        let mut store = store(&device);
        let format = StreamFormat::pcm(22050.0, 1, 8, false);
        let source = MemoryPacketSource::new(format, vec![0x80u8; 32], 1);
        let id = store
            .load_source(Box::new(source), PathBuf::from("blip.raw"))
            .expect("failed to load effect");

        assert_eq!(device.static_buffer_count(), 1);
        store.unload(id).expect("failed to unload effect");
        assert_eq!(device.static_buffer_count(), 0);
        assert_eq!(store.buffer(id), None);

        // Unloading an unknown id is a no-op.
        store.unload(id).expect("repeat unload should succeed");
    }

    #[test]
    fn test_missing_file() {
        let device = mock::Device::new();
        let mut store = store(&device);
        let err = store
            .load(Path::new("/nonexistent/effect.wav"))
            .expect_err("load should fail");
        assert!(matches!(err, EngineError::FileNotFound(_)));
    }
}
