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

//! The fixed pool of effect playback voices.

use std::sync::Arc;

use tracing::debug;

use crate::engine::MasterGain;
use crate::error::EngineError;
use crate::output::{BufferHandle, Mixer, VoiceId};

struct Slot {
    voice: VoiceId,
    /// Set when the voice is claimed by a prime and never cleared, so voices
    /// are consumed rather than recycled. Known limitation carried over from
    /// the callers this engine replaces; pool exhaustion surfaces as
    /// [`EngineError::NoVoicesAvailable`].
    primed: bool,
    bound: Option<BufferHandle>,
    gain: f32,
}

/// Hands out mixer voices for effect playback. The pool size is fixed at
/// construction; priming claims the next free voice and returns its handle,
/// and all further control is addressed by that handle.
pub struct VoicePool {
    mixer: Arc<dyn Mixer>,
    slots: Vec<Slot>,
    master: MasterGain,
    effects_volume: f32,
}

impl VoicePool {
    pub fn new(
        mixer: Arc<dyn Mixer>,
        master: MasterGain,
        max_voices: usize,
    ) -> Result<VoicePool, EngineError> {
        let voices = mixer.create_voices(max_voices)?;
        let slots = voices
            .into_iter()
            .map(|voice| Slot {
                voice,
                primed: false,
                bound: None,
                gain: 1.0,
            })
            .collect();
        Ok(VoicePool {
            mixer,
            slots,
            master,
            effects_volume: 1.0,
        })
    }

    /// Claims a free voice and binds the effect's buffer to it, ready to
    /// start with minimal latency.
    pub fn prime(&mut self, buffer: BufferHandle) -> Result<VoiceId, EngineError> {
        let effective = self.effective_gain(1.0);
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| !slot.primed)
            .ok_or(EngineError::NoVoicesAvailable)?;
        self.mixer.bind(slot.voice, buffer)?;
        self.mixer.set_voice_gain(slot.voice, effective)?;
        slot.primed = true;
        slot.bound = Some(buffer);
        slot.gain = 1.0;
        debug!(voice = ?slot.voice, "Primed effect voice");
        Ok(slot.voice)
    }

    pub fn start(&self, voice: VoiceId) -> Result<(), EngineError> {
        self.slot_for(voice)?;
        self.mixer.play(voice)
    }

    pub fn stop(&self, voice: VoiceId) -> Result<(), EngineError> {
        self.slot_for(voice)?;
        self.mixer.stop(voice)
    }

    pub fn set_gain(&mut self, voice: VoiceId, gain: f32) -> Result<(), EngineError> {
        let effective = self.effective_gain(gain);
        let mixer = self.mixer.clone();
        self.slot_for_mut(voice)?.gain = gain;
        mixer.set_voice_gain(voice, effective)
    }

    pub fn set_pitch(&self, voice: VoiceId, pitch: f32) -> Result<(), EngineError> {
        self.slot_for(voice)?;
        self.mixer.set_voice_pitch(voice, pitch)
    }

    pub fn set_position(&self, voice: VoiceId, position: [f32; 3]) -> Result<(), EngineError> {
        self.slot_for(voice)?;
        self.mixer.set_voice_position(voice, position)
    }

    /// Sets the shared effects volume and refreshes every claimed voice.
    pub fn set_effects_volume(&mut self, volume: f32) -> Result<(), EngineError> {
        self.effects_volume = volume;
        self.refresh_gains()
    }

    /// Re-applies effective gains after a master volume change.
    pub fn update_gain(&mut self) -> Result<(), EngineError> {
        self.refresh_gains()
    }

    /// Sets the distance beyond which effects stop attenuating, pool-wide.
    pub fn set_max_distance(&self, distance: f32) -> Result<(), EngineError> {
        for slot in &self.slots {
            self.mixer.set_voice_max_distance(slot.voice, distance)?;
        }
        Ok(())
    }

    /// Sets the distance at which effects play at full volume, pool-wide.
    pub fn set_reference_distance(&self, distance: f32) -> Result<(), EngineError> {
        for slot in &self.slots {
            self.mixer
                .set_voice_reference_distance(slot.voice, distance)?;
        }
        Ok(())
    }

    /// Stops and unbinds every voice bound to `buffer`, so the buffer can be
    /// released. The voices stay claimed.
    pub fn stop_bound(&mut self, buffer: BufferHandle) -> Result<(), EngineError> {
        for slot in self.slots.iter_mut() {
            if slot.bound == Some(buffer) {
                self.mixer.stop(slot.voice)?;
                slot.bound = None;
            }
        }
        Ok(())
    }

    /// Stops every claimed voice.
    pub fn stop_all(&mut self) -> Result<(), EngineError> {
        for slot in self.slots.iter_mut() {
            if slot.primed {
                self.mixer.stop(slot.voice)?;
                slot.bound = None;
            }
        }
        Ok(())
    }

    fn refresh_gains(&mut self) -> Result<(), EngineError> {
        let master = self.master.get();
        for slot in &self.slots {
            if slot.primed {
                self.mixer
                    .set_voice_gain(slot.voice, slot.gain * self.effects_volume * master)?;
            }
        }
        Ok(())
    }

    fn effective_gain(&self, gain: f32) -> f32 {
        gain * self.effects_volume * self.master.get()
    }

    fn slot_for(&self, voice: VoiceId) -> Result<&Slot, EngineError> {
        self.slots
            .iter()
            .find(|slot| slot.voice == voice && slot.primed && slot.bound.is_some())
            .ok_or_else(|| EngineError::Hardware(format!("Voice {:?} is not primed", voice)))
    }

    fn slot_for_mut(&mut self, voice: VoiceId) -> Result<&mut Slot, EngineError> {
        self.slots
            .iter_mut()
            .find(|slot| slot.voice == voice && slot.primed && slot.bound.is_some())
            .ok_or_else(|| EngineError::Hardware(format!("Voice {:?} is not primed", voice)))
    }
}
