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

//! The playback engine facade.
//!
//! An [`Engine`] owns a fixed set of background music slots, the effect
//! store, and the effect voice pool, all playing through one output device
//! and mixer. It is a plain value; embedders create one per device and drive
//! [`Engine::process_events`] from their run loop.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::decoder::PacketSource;
use crate::effects::pool::VoicePool;
use crate::effects::store::EffectStore;
use crate::effects::EffectId;
use crate::error::EngineError;
use crate::output::{BufferHandle, Device, Mixer, VoiceId};
use crate::stream::{PlaybackState, StreamController, TransitionStats};

/// The master volume shared by every queue and voice. Cloning yields another
/// handle to the same value.
#[derive(Clone)]
pub struct MasterGain(Arc<RwLock<f32>>);

impl MasterGain {
    pub fn get(&self) -> f32 {
        *self.0.read()
    }

    pub fn set(&self, gain: f32) {
        *self.0.write() = gain;
    }
}

impl Default for MasterGain {
    fn default() -> MasterGain {
        MasterGain(Arc::new(RwLock::new(1.0)))
    }
}

pub struct Engine {
    slots: Vec<StreamController>,
    store: EffectStore,
    pool: VoicePool,
    mixer: Arc<dyn Mixer>,
    master: MasterGain,
    torn_down: bool,
}

impl Engine {
    pub fn new(
        config: &EngineConfig,
        device: Arc<dyn Device>,
        mixer: Arc<dyn Mixer>,
    ) -> Result<Engine, EngineError> {
        config.validate()?;
        let master = MasterGain::default();
        let slots = (0..config.music_slots)
            .map(|_| StreamController::new(device.clone(), master.clone(), config.buffer_seconds))
            .collect();
        let store = EffectStore::new(mixer.clone());
        let pool = VoicePool::new(mixer.clone(), master.clone(), config.max_voices)?;
        info!(
            music_slots = config.music_slots,
            max_voices = config.max_voices,
            "Engine initialized"
        );
        Ok(Engine {
            slots,
            store,
            pool,
            mixer,
            master,
            torn_down: false,
        })
    }

    // ---- Background music ----

    /// Loads a track into a music slot's playlist. With `append` unset the
    /// slot's existing playlist is replaced.
    pub fn load_track(
        &mut self,
        slot: usize,
        path: &Path,
        append: bool,
        load_at_once: bool,
    ) -> Result<(), EngineError> {
        self.slot_mut(slot)?.load_track(path, append, load_at_once)
    }

    /// Appends an already-open packet source to a slot's playlist.
    pub fn load_music_source(
        &mut self,
        slot: usize,
        source: Box<dyn PacketSource>,
        load_at_once: bool,
    ) -> Result<(), EngineError> {
        self.slot_mut(slot)?.load_source(source, load_at_once)
    }

    /// Stops a slot and discards its playlist.
    pub fn unload_tracks(&mut self, slot: usize) -> Result<(), EngineError> {
        self.slot_mut(slot)?.teardown();
        Ok(())
    }

    pub fn start_music(&mut self, slot: usize) -> Result<(), EngineError> {
        self.slot_mut(slot)?.start()
    }

    /// Stops a slot, either immediately or at the end of its playlist.
    pub fn stop_music(&mut self, slot: usize, at_end: bool) -> Result<(), EngineError> {
        self.slot_mut(slot)?.stop(at_end)
    }

    pub fn set_music_volume(&mut self, slot: usize, volume: f32) -> Result<(), EngineError> {
        self.slot_mut(slot)?.set_volume(volume)
    }

    pub fn music_state(&self, slot: usize) -> Result<PlaybackState, EngineError> {
        self.slot_ref(slot).map(StreamController::state)
    }

    pub fn music_stats(&self, slot: usize) -> Result<TransitionStats, EngineError> {
        self.slot_ref(slot).map(StreamController::stats)
    }

    /// Drains pending queue events for one slot.
    pub fn process_events(&mut self, slot: usize) -> Result<(), EngineError> {
        self.slot_mut(slot)?.process_events()
    }

    /// Drains pending queue events for every slot.
    pub fn process_all_events(&mut self) -> Result<(), EngineError> {
        if self.torn_down {
            return Ok(());
        }
        for slot in self.slots.iter_mut() {
            slot.process_events()?;
        }
        Ok(())
    }

    /// Sets the shared master volume and re-applies the effective gains to
    /// the named slot's queue and to every claimed effect voice. Other slots
    /// pick up the new multiplier on their next volume-affecting call.
    pub fn set_master_volume(&mut self, slot: usize, volume: f32) -> Result<(), EngineError> {
        self.slot_ref(slot)?;
        self.master.set(volume);
        self.slot_mut(slot)?.update_gain()?;
        self.pool.update_gain()
    }

    // ---- Sound effects ----

    pub fn load_effect(&mut self, path: &Path) -> Result<EffectId, EngineError> {
        if self.torn_down {
            return Err(EngineError::NotInitialized);
        }
        self.store.load(path)
    }

    /// Loads an effect from an already-open packet source.
    pub fn load_effect_source(
        &mut self,
        source: Box<dyn PacketSource>,
        name: &Path,
    ) -> Result<EffectId, EngineError> {
        if self.torn_down {
            return Err(EngineError::NotInitialized);
        }
        self.store.load_source(source, name.to_path_buf())
    }

    /// Unloads an effect, forcibly stopping any voices still playing it.
    /// Unloading an unknown id is a no-op.
    pub fn unload_effect(&mut self, id: EffectId) -> Result<(), EngineError> {
        if self.torn_down {
            return Err(EngineError::NotInitialized);
        }
        if let Some(buffer) = self.store.buffer(id) {
            self.pool.stop_bound(buffer)?;
            self.store.unload(id)?;
        }
        Ok(())
    }

    /// Claims a voice for the effect so a later start is minimal-latency.
    /// The returned handle addresses this playback instance; priming the
    /// same effect again yields a distinct voice over the same buffer.
    pub fn prime_effect(&mut self, id: EffectId) -> Result<VoiceId, EngineError> {
        let buffer = self.effect_buffer(id)?;
        self.pool.prime(buffer)
    }

    pub fn start_effect(&mut self, voice: VoiceId) -> Result<(), EngineError> {
        if self.torn_down {
            return Err(EngineError::NotInitialized);
        }
        self.pool.start(voice)
    }

    pub fn stop_effect(&mut self, voice: VoiceId) -> Result<(), EngineError> {
        if self.torn_down {
            return Err(EngineError::NotInitialized);
        }
        self.pool.stop(voice)
    }

    pub fn set_effect_volume(&mut self, voice: VoiceId, volume: f32) -> Result<(), EngineError> {
        if self.torn_down {
            return Err(EngineError::NotInitialized);
        }
        self.pool.set_gain(voice, volume)
    }

    pub fn set_effect_pitch(&mut self, voice: VoiceId, pitch: f32) -> Result<(), EngineError> {
        if self.torn_down {
            return Err(EngineError::NotInitialized);
        }
        self.pool.set_pitch(voice, pitch)
    }

    pub fn set_effect_position(
        &mut self,
        voice: VoiceId,
        position: [f32; 3],
    ) -> Result<(), EngineError> {
        if self.torn_down {
            return Err(EngineError::NotInitialized);
        }
        self.pool.set_position(voice, position)
    }

    /// Sets the volume shared by all effects.
    pub fn set_effects_volume(&mut self, volume: f32) -> Result<(), EngineError> {
        if self.torn_down {
            return Err(EngineError::NotInitialized);
        }
        self.pool.set_effects_volume(volume)
    }

    pub fn set_max_distance(&mut self, distance: f32) -> Result<(), EngineError> {
        if self.torn_down {
            return Err(EngineError::NotInitialized);
        }
        self.pool.set_max_distance(distance)
    }

    pub fn set_reference_distance(&mut self, distance: f32) -> Result<(), EngineError> {
        if self.torn_down {
            return Err(EngineError::NotInitialized);
        }
        self.pool.set_reference_distance(distance)
    }

    pub fn set_listener_position(&mut self, position: [f32; 3]) -> Result<(), EngineError> {
        if self.torn_down {
            return Err(EngineError::NotInitialized);
        }
        self.mixer.set_listener_position(position)
    }

    pub fn set_listener_gain(&mut self, gain: f32) -> Result<(), EngineError> {
        if self.torn_down {
            return Err(EngineError::NotInitialized);
        }
        self.mixer.set_listener_gain(gain)
    }

    // ---- Lifecycle ----

    /// Stops all playback and releases every buffer and voice. Safe to call
    /// more than once; failures are logged so teardown always completes.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        for slot in self.slots.iter_mut() {
            slot.teardown();
        }
        if let Err(err) = self.pool.stop_all() {
            warn!(error = %err, "Error stopping effect voices during teardown");
        }
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "Error releasing effect buffers during teardown");
        }
        info!("Engine torn down");
    }

    fn slot_ref(&self, slot: usize) -> Result<&StreamController, EngineError> {
        if self.torn_down {
            return Err(EngineError::NotInitialized);
        }
        self.slots.get(slot).ok_or(EngineError::InvalidSlot(slot))
    }

    fn slot_mut(&mut self, slot: usize) -> Result<&mut StreamController, EngineError> {
        if self.torn_down {
            return Err(EngineError::NotInitialized);
        }
        self.slots
            .get_mut(slot)
            .ok_or(EngineError::InvalidSlot(slot))
    }

    fn effect_buffer(&self, id: EffectId) -> Result<BufferHandle, EngineError> {
        if self.torn_down {
            return Err(EngineError::NotInitialized);
        }
        self.store
            .buffer(id)
            .ok_or_else(|| EngineError::Hardware(format!("Unknown effect {:?}", id)))
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::memory::MemoryPacketSource;
    use crate::format::StreamFormat;
    use crate::output::mock;

    fn engine(device: &mock::Device, config: &EngineConfig) -> Engine {
        Engine::new(
            config,
            Arc::new(device.clone()),
            Arc::new(device.clone()),
        )
        .expect("failed to create engine")
    }

    fn music(frames: usize) -> Box<MemoryPacketSource> {
        let format = StreamFormat::pcm(44100.0, 1, 16, true);
        Box::new(MemoryPacketSource::new(
            format,
            vec![0x11u8; frames * 2],
            2,
        ))
    }

    fn effect() -> Box<MemoryPacketSource> {
        let format = StreamFormat::pcm(22050.0, 1, 8, false);
        Box::new(MemoryPacketSource::new(format, vec![0x80u8; 64], 1))
    }

    #[test]
    fn test_master_volume_composes() {
        let device = mock::Device::new();
        let mut engine = engine(&device, &EngineConfig::default());

        engine
            .load_music_source(0, music(500), false)
            .expect("failed to load music");
        engine
            .set_music_volume(0, 0.5)
            .expect("failed to set volume");

        let id = engine
            .load_effect_source(effect(), Path::new("blip"))
            .expect("failed to load effect");
        let voice = engine.prime_effect(id).expect("failed to prime effect");
        engine
            .set_effects_volume(0.5)
            .expect("failed to set effects volume");

        engine
            .set_master_volume(0, 0.5)
            .expect("failed to set master volume");

        assert!((device.queue(0).gain() - 0.25).abs() < 1e-6);
        let snapshot = device.voice(voice).expect("no voice");
        assert!((snapshot.gain - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_slots_are_independent() {
        let device = mock::Device::new();
        let mut engine = engine(&device, &EngineConfig::default());

        engine
            .load_music_source(0, music(500), false)
            .expect("failed to load music");
        engine
            .load_music_source(1, music(500), false)
            .expect("failed to load music");
        engine.start_music(0).expect("failed to start");

        assert_eq!(
            engine.music_state(0).expect("no state"),
            PlaybackState::Playing
        );
        assert_eq!(
            engine.music_state(1).expect("no state"),
            PlaybackState::Stopped
        );
        assert!(device.queue(0).running());
        assert!(!device.queue(1).running());
    }

    #[test]
    fn test_invalid_slot() {
        let device = mock::Device::new();
        let mut engine = engine(&device, &EngineConfig::default());
        assert!(matches!(
            engine.start_music(9),
            Err(EngineError::InvalidSlot(9))
        ));
    }

    #[test]
    fn test_unload_effect_stops_playing_voices() {
        let device = mock::Device::new();
        let mut engine = engine(&device, &EngineConfig::default());

        let id = engine
            .load_effect_source(effect(), Path::new("blip"))
            .expect("failed to load effect");
        let voice = engine.prime_effect(id).expect("failed to prime effect");
        engine.start_effect(voice).expect("failed to start effect");

        engine.unload_effect(id).expect("failed to unload effect");
        assert_eq!(device.static_buffer_count(), 0);
        assert!(engine.start_effect(voice).is_err());

        // Unknown ids are ignored.
        engine.unload_effect(id).expect("repeat unload failed");
    }

    #[test]
    fn test_effect_requires_prime() {
        let device = mock::Device::new();
        let mut engine = engine(&device, &EngineConfig::default());
        let id = engine
            .load_effect_source(effect(), Path::new("blip"))
            .expect("failed to load effect");
        // A handle the pool never issued is rejected.
        assert!(engine.start_effect(VoiceId(9999)).is_err());
        let voice = engine.prime_effect(id).expect("failed to prime effect");
        engine.start_effect(voice).expect("failed to start effect");
    }

    #[test]
    fn test_priming_twice_yields_distinct_voices() {
        let device = mock::Device::new();
        let mut engine = engine(&device, &EngineConfig::default());
        let id = engine
            .load_effect_source(effect(), Path::new("blip"))
            .expect("failed to load effect");
        let first = engine.prime_effect(id).expect("failed to prime effect");
        let second = engine.prime_effect(id).expect("failed to prime effect");
        assert_ne!(first, second);

        let buffer = engine.store.buffer(id).expect("no buffer");
        assert_eq!(device.voices_bound_to(buffer), vec![first, second]);
    }

    #[test]
    fn test_listener_controls() {
        let device = mock::Device::new();
        let mut engine = engine(&device, &EngineConfig::default());
        engine
            .set_listener_position([1.0, 2.0, 3.0])
            .expect("failed to set position");
        engine
            .set_listener_gain(0.7)
            .expect("failed to set gain");
        assert_eq!(device.listener_position(), [1.0, 2.0, 3.0]);
        assert_eq!(device.listener_gain(), 0.7);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let device = mock::Device::new();
        let mut engine = engine(&device, &EngineConfig::default());

        engine
            .load_music_source(0, music(500), false)
            .expect("failed to load music");
        engine.start_music(0).expect("failed to start");
        let id = engine
            .load_effect_source(effect(), Path::new("blip"))
            .expect("failed to load effect");
        let voice = engine.prime_effect(id).expect("failed to prime effect");
        engine.start_effect(voice).expect("failed to start effect");

        engine.teardown();
        engine.teardown();

        assert!(!device.queue(0).running());
        assert_eq!(device.static_buffer_count(), 0);
        assert!(matches!(
            engine.start_music(0),
            Err(EngineError::NotInitialized)
        ));
        assert!(matches!(
            engine.load_effect_source(effect(), Path::new("blip")),
            Err(EngineError::NotInitialized)
        ));
    }
}
