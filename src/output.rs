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

//! The platform audio output boundary.
//!
//! Hardware completion callbacks are modeled as [`QueueEvent`]s polled off the
//! queue; the runtime that owns the real device posts them from its I/O
//! thread, and the streaming controller consumes them on its notification
//! handler. The mock implementation lets tests inject completions explicitly.

use std::fmt;

use crate::decoder::PacketDescription;
use crate::error::EngineError;
use crate::format::StreamFormat;

pub mod mock;

/// Identifies one buffer slot allocated from a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// Identifies a static effect buffer registered with the mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Identifies one mixer playback voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(pub u64);

/// Asynchronous notifications raised by an output queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEvent {
    /// The hardware consumed the buffer; it may be refilled and re-enqueued.
    BufferDone(BufferId),
    /// The queue's running state became false, either because a stop was
    /// requested or because the hardware ran dry.
    Stopped,
}

/// One hardware output queue that plays PCM or compressed buffers in order.
pub trait Queue: Send {
    /// Allocates a buffer slot of the given byte capacity.
    fn allocate_buffer(&mut self, capacity: usize) -> Result<BufferId, EngineError>;

    /// Frees a buffer slot. The slot must not be in flight.
    fn free_buffer(&mut self, id: BufferId) -> Result<(), EngineError>;

    /// Copies data into a buffer slot without enqueueing it.
    fn fill(&mut self, id: BufferId, data: &[u8]) -> Result<(), EngineError>;

    /// Enqueues the first `byte_len` bytes of the slot for playback. `descs`
    /// carries per-packet descriptions for variable-bit-rate data and is
    /// empty otherwise.
    fn enqueue(
        &mut self,
        id: BufferId,
        byte_len: usize,
        descs: &[PacketDescription],
    ) -> Result<(), EngineError>;

    /// Starts playback of enqueued buffers.
    fn start(&mut self) -> Result<(), EngineError>;

    /// Stops the queue. When `immediate`, in-flight buffers are dropped;
    /// otherwise the queue drains what is already enqueued first. Either way
    /// a [`QueueEvent::Stopped`] is posted once the queue has stopped.
    fn stop(&mut self, immediate: bool) -> Result<(), EngineError>;

    /// Sets the queue's output gain (0.0 ..= 1.0).
    fn set_gain(&mut self, gain: f32) -> Result<(), EngineError>;

    /// Attaches codec side data ("magic cookie") to the queue.
    fn set_magic_cookie(&mut self, cookie: &[u8]) -> Result<(), EngineError>;

    /// Polls the next pending notification, if any.
    fn poll_event(&mut self) -> Option<QueueEvent>;
}

/// The output device, from which queues are created.
pub trait Device: fmt::Display + Send + Sync {
    /// Creates a new output queue for streams of the given format.
    fn new_queue(&self, format: &StreamFormat) -> Result<Box<dyn Queue>, EngineError>;
}

/// The positional mixer used for one-shot sound effects. All methods take
/// `&self`; implementations are shared by every caller needing effects.
pub trait Mixer: Send + Sync {
    /// Registers decoded sample data as an immutable static buffer.
    fn create_buffer(
        &self,
        format: &StreamFormat,
        data: &[u8],
    ) -> Result<BufferHandle, EngineError>;

    /// Releases a static buffer.
    fn release_buffer(&self, buffer: BufferHandle) -> Result<(), EngineError>;

    /// Creates `count` playback voices.
    fn create_voices(&self, count: usize) -> Result<Vec<VoiceId>, EngineError>;

    /// Binds a static buffer to a voice.
    fn bind(&self, voice: VoiceId, buffer: BufferHandle) -> Result<(), EngineError>;

    /// Starts playback on a voice.
    fn play(&self, voice: VoiceId) -> Result<(), EngineError>;

    /// Stops playback on a voice.
    fn stop(&self, voice: VoiceId) -> Result<(), EngineError>;

    fn set_voice_gain(&self, voice: VoiceId, gain: f32) -> Result<(), EngineError>;
    fn set_voice_pitch(&self, voice: VoiceId, pitch: f32) -> Result<(), EngineError>;
    fn set_voice_position(&self, voice: VoiceId, position: [f32; 3]) -> Result<(), EngineError>;
    fn set_voice_max_distance(&self, voice: VoiceId, distance: f32) -> Result<(), EngineError>;
    fn set_voice_reference_distance(
        &self,
        voice: VoiceId,
        distance: f32,
    ) -> Result<(), EngineError>;

    fn set_listener_position(&self, position: [f32; 3]) -> Result<(), EngineError>;
    fn set_listener_gain(&self, gain: f32) -> Result<(), EngineError>;
}
