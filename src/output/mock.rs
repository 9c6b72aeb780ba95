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

//! A mock output device and mixer.
//!
//! The mock records every queue, buffer, and voice operation so tests can
//! assert on them, and lets tests drive buffer completions by hand through
//! [`QueueHandle::complete_next`].

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use super::{BufferHandle, BufferId, Mixer, Queue, QueueEvent, VoiceId};
use crate::decoder::PacketDescription;
use crate::error::EngineError;
use crate::format::StreamFormat;

/// The mock device. Clones share state, so tests keep one copy for
/// inspection and hand another to the engine.
#[derive(Clone)]
pub struct Device {
    state: Arc<Mutex<State>>,
}

struct State {
    next_id: u64,
    queues: Vec<Arc<Mutex<QueueState>>>,
    buffers: HashMap<BufferHandle, StaticBuffer>,
    voices: HashMap<VoiceId, VoiceState>,
    listener_position: [f32; 3],
    listener_gain: f32,
    fail_new_queue: bool,
}

struct StaticBuffer {
    format: StreamFormat,
    data: Vec<u8>,
}

#[derive(Clone)]
struct VoiceState {
    bound: Option<BufferHandle>,
    playing: bool,
    gain: f32,
    pitch: f32,
    position: [f32; 3],
    max_distance: f32,
    reference_distance: f32,
}

impl Default for VoiceState {
    fn default() -> VoiceState {
        VoiceState {
            bound: None,
            playing: false,
            gain: 1.0,
            pitch: 1.0,
            position: [0.0; 3],
            max_distance: f32::MAX,
            reference_distance: 1.0,
        }
    }
}

/// Externally visible voice state for assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSnapshot {
    pub bound: Option<BufferHandle>,
    pub playing: bool,
    pub gain: f32,
    pub pitch: f32,
    pub position: [f32; 3],
    pub max_distance: f32,
    pub reference_distance: f32,
}

struct QueueState {
    format: StreamFormat,
    gain: f32,
    cookie: Option<Vec<u8>>,
    running: bool,
    next_buffer: u64,
    buffers: HashMap<BufferId, QueueBuffer>,
    in_flight: VecDeque<BufferId>,
    played: Vec<BufferId>,
    enqueues: Vec<Enqueue>,
    sender: Sender<QueueEvent>,
    receiver: Receiver<QueueEvent>,
}

struct QueueBuffer {
    capacity: usize,
    data: Vec<u8>,
}

/// A record of one enqueue call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enqueue {
    pub buffer: BufferId,
    pub byte_len: usize,
    pub packet_descs: usize,
}

impl Device {
    pub fn new() -> Device {
        Device {
            state: Arc::new(Mutex::new(State {
                next_id: 1,
                queues: Vec::new(),
                buffers: HashMap::new(),
                voices: HashMap::new(),
                listener_position: [0.0; 3],
                listener_gain: 1.0,
                fail_new_queue: false,
            })),
        }
    }

    /// Makes subsequent queue creation fail, for error path tests.
    pub fn fail_new_queue(&self, fail: bool) {
        self.state.lock().fail_new_queue = fail;
    }

    /// The number of queues ever created, including stopped ones.
    pub fn queue_count(&self) -> usize {
        self.state.lock().queues.len()
    }

    /// An inspection handle for the `index`th queue created.
    pub fn queue(&self, index: usize) -> QueueHandle {
        QueueHandle {
            state: self.state.lock().queues[index].clone(),
        }
    }

    pub fn static_buffer_count(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn static_buffer_data(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.state
            .lock()
            .buffers
            .get(&buffer)
            .map(|b| b.data.clone())
    }

    pub fn static_buffer_format(&self, buffer: BufferHandle) -> Option<StreamFormat> {
        self.state.lock().buffers.get(&buffer).map(|b| b.format)
    }

    pub fn voice(&self, voice: VoiceId) -> Option<VoiceSnapshot> {
        self.state.lock().voices.get(&voice).map(|v| VoiceSnapshot {
            bound: v.bound,
            playing: v.playing,
            gain: v.gain,
            pitch: v.pitch,
            position: v.position,
            max_distance: v.max_distance,
            reference_distance: v.reference_distance,
        })
    }

    /// Voices currently bound to `buffer`, in creation order.
    pub fn voices_bound_to(&self, buffer: BufferHandle) -> Vec<VoiceId> {
        let state = self.state.lock();
        let mut voices: Vec<VoiceId> = state
            .voices
            .iter()
            .filter(|(_, v)| v.bound == Some(buffer))
            .map(|(id, _)| *id)
            .collect();
        voices.sort_by_key(|id| id.0);
        voices
    }

    pub fn listener_position(&self) -> [f32; 3] {
        self.state.lock().listener_position
    }

    pub fn listener_gain(&self) -> f32 {
        self.state.lock().listener_gain
    }
}

impl Default for Device {
    fn default() -> Device {
        Device::new()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mock")
    }
}

impl super::Device for Device {
    fn new_queue(&self, format: &StreamFormat) -> Result<Box<dyn Queue>, EngineError> {
        let mut state = self.state.lock();
        if state.fail_new_queue {
            return Err(EngineError::DeviceUnavailable);
        }
        let (sender, receiver) = unbounded();
        let queue = Arc::new(Mutex::new(QueueState {
            format: *format,
            gain: 1.0,
            cookie: None,
            running: false,
            next_buffer: 1,
            buffers: HashMap::new(),
            in_flight: VecDeque::new(),
            played: Vec::new(),
            enqueues: Vec::new(),
            sender,
            receiver,
        }));
        state.queues.push(queue.clone());
        Ok(Box::new(MockQueue { state: queue }))
    }
}

/// The queue half handed to the engine.
struct MockQueue {
    state: Arc<Mutex<QueueState>>,
}

impl Queue for MockQueue {
    fn allocate_buffer(&mut self, capacity: usize) -> Result<BufferId, EngineError> {
        let mut state = self.state.lock();
        let id = BufferId(state.next_buffer);
        state.next_buffer += 1;
        state.buffers.insert(
            id,
            QueueBuffer {
                capacity,
                data: Vec::new(),
            },
        );
        Ok(id)
    }

    fn free_buffer(&mut self, id: BufferId) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state.in_flight.contains(&id) {
            return Err(EngineError::Hardware(format!(
                "Buffer {:?} freed while in flight",
                id
            )));
        }
        state
            .buffers
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| EngineError::Hardware(format!("Unknown buffer {:?}", id)))
    }

    fn fill(&mut self, id: BufferId, data: &[u8]) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        let buffer = state
            .buffers
            .get_mut(&id)
            .ok_or_else(|| EngineError::Hardware(format!("Unknown buffer {:?}", id)))?;
        if data.len() > buffer.capacity {
            return Err(EngineError::Hardware(format!(
                "Buffer {:?} overflow: {} > {}",
                id,
                data.len(),
                buffer.capacity
            )));
        }
        buffer.data.clear();
        buffer.data.extend_from_slice(data);
        Ok(())
    }

    fn enqueue(
        &mut self,
        id: BufferId,
        byte_len: usize,
        descs: &[PacketDescription],
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if !state.buffers.contains_key(&id) {
            return Err(EngineError::Hardware(format!("Unknown buffer {:?}", id)));
        }
        state.in_flight.push_back(id);
        state.enqueues.push(Enqueue {
            buffer: id,
            byte_len,
            packet_descs: descs.len(),
        });
        Ok(())
    }

    fn start(&mut self) -> Result<(), EngineError> {
        self.state.lock().running = true;
        Ok(())
    }

    fn stop(&mut self, immediate: bool) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if immediate {
            state.in_flight.clear();
        } else {
            // Drained buffers count as played but raise no completions.
            while let Some(id) = state.in_flight.pop_front() {
                state.played.push(id);
            }
        }
        state.running = false;
        let _ = state.sender.send(QueueEvent::Stopped);
        Ok(())
    }

    fn set_gain(&mut self, gain: f32) -> Result<(), EngineError> {
        self.state.lock().gain = gain;
        Ok(())
    }

    fn set_magic_cookie(&mut self, cookie: &[u8]) -> Result<(), EngineError> {
        self.state.lock().cookie = Some(cookie.to_vec());
        Ok(())
    }

    fn poll_event(&mut self) -> Option<QueueEvent> {
        let receiver = self.state.lock().receiver.clone();
        receiver.try_recv().ok()
    }
}

/// An inspection and completion-driving handle for one mock queue.
#[derive(Clone)]
pub struct QueueHandle {
    state: Arc<Mutex<QueueState>>,
}

impl QueueHandle {
    /// Marks the oldest in-flight buffer as consumed and posts its
    /// completion event. Returns the completed buffer.
    pub fn complete_next(&self) -> Option<BufferId> {
        let mut state = self.state.lock();
        let id = state.in_flight.pop_front()?;
        state.played.push(id);
        let _ = state.sender.send(QueueEvent::BufferDone(id));
        Some(id)
    }

    pub fn running(&self) -> bool {
        self.state.lock().running
    }

    pub fn gain(&self) -> f32 {
        self.state.lock().gain
    }

    pub fn format(&self) -> StreamFormat {
        self.state.lock().format
    }

    pub fn cookie(&self) -> Option<Vec<u8>> {
        self.state.lock().cookie.clone()
    }

    pub fn in_flight_len(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    pub fn buffer_count(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn buffer_capacity(&self, id: BufferId) -> Option<usize> {
        self.state.lock().buffers.get(&id).map(|b| b.capacity)
    }

    pub fn buffer_data(&self, id: BufferId) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(&id).map(|b| b.data.clone())
    }

    pub fn played(&self) -> Vec<BufferId> {
        self.state.lock().played.clone()
    }

    pub fn enqueues(&self) -> Vec<Enqueue> {
        self.state.lock().enqueues.clone()
    }
}

impl Mixer for Device {
    fn create_buffer(
        &self,
        format: &StreamFormat,
        data: &[u8],
    ) -> Result<BufferHandle, EngineError> {
        let mut state = self.state.lock();
        let handle = BufferHandle(state.next_id);
        state.next_id += 1;
        state.buffers.insert(
            handle,
            StaticBuffer {
                format: *format,
                data: data.to_vec(),
            },
        );
        Ok(handle)
    }

    fn release_buffer(&self, buffer: BufferHandle) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state
            .voices
            .values()
            .any(|voice| voice.playing && voice.bound == Some(buffer))
        {
            return Err(EngineError::Hardware(format!(
                "Buffer {:?} released while playing",
                buffer
            )));
        }
        for voice in state.voices.values_mut() {
            if voice.bound == Some(buffer) {
                voice.bound = None;
            }
        }
        state
            .buffers
            .remove(&buffer)
            .map(|_| ())
            .ok_or_else(|| EngineError::Hardware(format!("Unknown buffer {:?}", buffer)))
    }

    fn create_voices(&self, count: usize) -> Result<Vec<VoiceId>, EngineError> {
        let mut state = self.state.lock();
        let mut voices = Vec::with_capacity(count);
        for _ in 0..count {
            let id = VoiceId(state.next_id);
            state.next_id += 1;
            state.voices.insert(id, VoiceState::default());
            voices.push(id);
        }
        Ok(voices)
    }

    fn bind(&self, voice: VoiceId, buffer: BufferHandle) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if !state.buffers.contains_key(&buffer) {
            return Err(EngineError::Hardware(format!("Unknown buffer {:?}", buffer)));
        }
        state
            .voices
            .get_mut(&voice)
            .ok_or_else(|| EngineError::Hardware(format!("Unknown voice {:?}", voice)))?
            .bound = Some(buffer);
        Ok(())
    }

    fn play(&self, voice: VoiceId) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        let voice = state
            .voices
            .get_mut(&voice)
            .ok_or_else(|| EngineError::Hardware(format!("Unknown voice {:?}", voice)))?;
        if voice.bound.is_none() {
            return Err(EngineError::Hardware("Voice has no buffer".to_string()));
        }
        voice.playing = true;
        Ok(())
    }

    fn stop(&self, voice: VoiceId) -> Result<(), EngineError> {
        self.with_voice(voice, |v| v.playing = false)
    }

    fn set_voice_gain(&self, voice: VoiceId, gain: f32) -> Result<(), EngineError> {
        self.with_voice(voice, |v| v.gain = gain)
    }

    fn set_voice_pitch(&self, voice: VoiceId, pitch: f32) -> Result<(), EngineError> {
        self.with_voice(voice, |v| v.pitch = pitch)
    }

    fn set_voice_position(&self, voice: VoiceId, position: [f32; 3]) -> Result<(), EngineError> {
        self.with_voice(voice, |v| v.position = position)
    }

    fn set_voice_max_distance(&self, voice: VoiceId, distance: f32) -> Result<(), EngineError> {
        self.with_voice(voice, |v| v.max_distance = distance)
    }

    fn set_voice_reference_distance(
        &self,
        voice: VoiceId,
        distance: f32,
    ) -> Result<(), EngineError> {
        self.with_voice(voice, |v| v.reference_distance = distance)
    }

    fn set_listener_position(&self, position: [f32; 3]) -> Result<(), EngineError> {
        self.state.lock().listener_position = position;
        Ok(())
    }

    fn set_listener_gain(&self, gain: f32) -> Result<(), EngineError> {
        self.state.lock().listener_gain = gain;
        Ok(())
    }
}

impl Device {
    fn with_voice<F>(&self, voice: VoiceId, f: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut VoiceState),
    {
        let mut state = self.state.lock();
        let voice = state
            .voices
            .get_mut(&voice)
            .ok_or_else(|| EngineError::Hardware(format!("Unknown voice {:?}", voice)))?;
        f(voice);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Device as _, Mixer as _};
    use super::*;
    use crate::format::StreamFormat;

    #[test]
    fn test_queue_lifecycle() {
        let device = Device::new();
        let format = StreamFormat::pcm(44100.0, 2, 16, true);
        let mut queue = device.new_queue(&format).expect("failed to create queue");

        let a = queue.allocate_buffer(64).expect("alloc failed");
        let b = queue.allocate_buffer(64).expect("alloc failed");
        queue.fill(a, &[1, 2, 3]).expect("fill failed");
        queue.enqueue(a, 3, &[]).expect("enqueue failed");
        queue.enqueue(b, 0, &[]).expect("enqueue failed");
        queue.start().expect("start failed");

        let handle = device.queue(0);
        assert!(handle.running());
        assert_eq!(handle.in_flight_len(), 2);
        assert_eq!(handle.buffer_data(a).as_deref(), Some(&[1u8, 2, 3][..]));

        assert_eq!(handle.complete_next(), Some(a));
        assert_eq!(queue.poll_event(), Some(QueueEvent::BufferDone(a)));

        queue.stop(false).expect("stop failed");
        assert_eq!(queue.poll_event(), Some(QueueEvent::Stopped));
        assert!(!handle.running());
        assert_eq!(handle.played(), vec![a, b]);
    }

    #[test]
    fn test_free_in_flight_buffer_fails() {
        let device = Device::new();
        let format = StreamFormat::pcm(44100.0, 1, 16, true);
        let mut queue = device.new_queue(&format).expect("failed to create queue");
        let a = queue.allocate_buffer(16).expect("alloc failed");
        queue.enqueue(a, 0, &[]).expect("enqueue failed");
        assert!(queue.free_buffer(a).is_err());
    }

    #[test]
    fn test_voices_and_buffers() {
        let device = Device::new();
        let format = StreamFormat::pcm(22050.0, 1, 8, false);
        let buffer = device
            .create_buffer(&format, &[1, 2, 3, 4])
            .expect("create failed");
        let voices = device.create_voices(2).expect("create failed");

        device.bind(voices[0], buffer).expect("bind failed");
        device.play(voices[0]).expect("play failed");
        assert!(device.voice(voices[0]).expect("no voice").playing);

        // Releasing a playing buffer is refused.
        assert!(device.release_buffer(buffer).is_err());
        device.stop(voices[0]).expect("stop failed");
        device.release_buffer(buffer).expect("release failed");
        assert_eq!(device.voice(voices[0]).expect("no voice").bound, None);
    }

    #[test]
    fn test_play_unbound_voice_fails() {
        let device = Device::new();
        let voices = device.create_voices(1).expect("create failed");
        assert!(device.play(voices[0]).is_err());
    }
}
