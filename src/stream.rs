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

//! The background music streaming controller.
//!
//! One controller owns one playback queue and a playlist of tracks. Tracks
//! are streamed through a small rotation of buffers; small tracks are loaded
//! whole into a single buffer and re-enqueued without touching the file
//! again. At track boundaries the controller compares the outgoing and
//! incoming formats and applies the cheapest transition that keeps the queue
//! valid, up to tearing the queue down and rebuilding it once it has drained.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::decoder::{PacketDescription, PacketSource};
use crate::engine::MasterGain;
use crate::error::EngineError;
use crate::format;
use crate::output::{BufferId, Device, Queue, QueueEvent};
use crate::track::{self, TrackInfo, NUM_BUFFERS};

/// What a track boundary requires of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    /// Same format and both resident; shrink the packet window to fit.
    Resize,
    /// Same format; only the codec side data needs refreshing.
    NewCookie,
    /// Same format but incompatible buffer sizes; swap the buffer set.
    NewBuffers,
    /// Incompatible formats; drain and rebuild the whole queue.
    NewQueue,
}

impl Transition {
    fn between(current: &TrackInfo, next: &TrackInfo) -> Transition {
        if !format::compatible(current.format(), next.format()) {
            return Transition::NewQueue;
        }
        if current.load_at_once != next.load_at_once {
            return Transition::NewBuffers;
        }
        if next.load_at_once {
            if current.data_size() >= next.data_size() {
                Transition::Resize
            } else {
                Transition::NewBuffers
            }
        } else {
            Transition::NewCookie
        }
    }
}

/// Counters for queue transitions, exposed for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionStats {
    pub rebuilds: u64,
    pub buffer_swaps: u64,
    pub resizes: u64,
    pub cookie_refreshes: u64,
}

/// The observable playback state of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    /// Playing, but the queue will halt when the playlist wraps around.
    StopPending,
    /// Drained or draining; a new queue will be built on the stop event.
    PendingRebuild,
}

pub struct StreamController {
    device: Arc<dyn Device>,
    master: MasterGain,
    queue: Option<Box<dyn Queue>>,
    playlist: Vec<TrackInfo>,
    current: usize,
    /// Packet index of the next read within the current track.
    cursor: u64,
    packets_per_buffer: usize,
    buffer_seconds: f64,
    buffers: Vec<BufferId>,
    /// Buffers superseded by a buffer swap, freed as their completions land.
    dispose: Vec<BufferId>,
    scratch: Vec<u8>,
    descs: Vec<PacketDescription>,
    volume: f32,
    rebuild_when_stopped: bool,
    stop_at_end: bool,
    stopped: bool,
    started: bool,
    stats: TransitionStats,
}

impl StreamController {
    pub fn new(device: Arc<dyn Device>, master: MasterGain, buffer_seconds: f64) -> Self {
        StreamController {
            device,
            master,
            queue: None,
            playlist: Vec::new(),
            current: 0,
            cursor: 0,
            packets_per_buffer: 0,
            buffer_seconds,
            buffers: Vec::new(),
            dispose: Vec::new(),
            scratch: Vec::new(),
            descs: Vec::new(),
            volume: 1.0,
            rebuild_when_stopped: false,
            stop_at_end: false,
            stopped: true,
            started: false,
            stats: TransitionStats::default(),
        }
    }

    /// Loads a track from disk into the playlist. With `append` unset, the
    /// existing playlist and queue are discarded first.
    pub fn load_track(
        &mut self,
        path: &std::path::Path,
        append: bool,
        load_at_once: bool,
    ) -> Result<(), EngineError> {
        if !append {
            self.teardown();
        }
        info!(path = ?path, load_at_once, "Loading track");
        self.add(TrackInfo::load(path, load_at_once)?)
    }

    /// Appends an already-open packet source to the playlist.
    pub fn load_source(
        &mut self,
        source: Box<dyn PacketSource>,
        load_at_once: bool,
    ) -> Result<(), EngineError> {
        self.add(TrackInfo::from_source(source, load_at_once))
    }

    fn add(&mut self, track: TrackInfo) -> Result<(), EngineError> {
        // An empty track can never satisfy a refill, so reject it up front.
        if track.data_size() == 0 {
            return Err(EngineError::UnsupportedFormat(format!(
                "Track {} contains no audio data",
                track.path().display()
            )));
        }
        self.playlist.push(track);
        if self.playlist.len() == 1 {
            if let Err(err) = self.setup_queue().and_then(|()| self.setup_buffers()) {
                self.playlist.pop();
                self.queue = None;
                self.buffers.clear();
                return Err(err);
            }
        }
        Ok(())
    }

    /// Starts playback of the queued playlist.
    pub fn start(&mut self) -> Result<(), EngineError> {
        let queue = self.queue.as_mut().ok_or(EngineError::NotInitialized)?;
        self.stop_at_end = false;
        if let Err(err) = queue.start() {
            self.stopped = true;
            return Err(err);
        }
        self.stopped = false;
        self.started = true;
        Ok(())
    }

    /// Stops playback. With `at_end` set, playback continues until the
    /// playlist has played through once and halts at the wrap-around.
    pub fn stop(&mut self, at_end: bool) -> Result<(), EngineError> {
        if at_end {
            self.stop_at_end = true;
            return Ok(());
        }
        self.stopped = true;
        self.started = false;
        if let Some(queue) = self.queue.as_mut() {
            queue.stop(true)?;
        }
        Ok(())
    }

    /// Drains pending queue events, refilling completed buffers and
    /// rebuilding the queue when a format change has drained it.
    pub fn process_events(&mut self) -> Result<(), EngineError> {
        loop {
            let event = match self.queue.as_mut() {
                Some(queue) => queue.poll_event(),
                None => None,
            };
            match event {
                Some(QueueEvent::BufferDone(id)) => {
                    if let Err(err) = self.refill(id) {
                        error!(error = %err, "Error refilling buffer; queue left silent");
                    }
                }
                Some(QueueEvent::Stopped) => {
                    if self.rebuild_when_stopped {
                        self.rebuild_when_stopped = false;
                        self.rebuild_queue()?;
                    }
                }
                None => return Ok(()),
            }
        }
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<(), EngineError> {
        self.volume = volume;
        self.apply_gain()
    }

    /// Re-applies the effective gain after a master volume change.
    pub fn update_gain(&mut self) -> Result<(), EngineError> {
        self.apply_gain()
    }

    pub fn state(&self) -> PlaybackState {
        if self.rebuild_when_stopped {
            return PlaybackState::PendingRebuild;
        }
        if self.queue.is_none() || self.stopped || !self.started {
            return PlaybackState::Stopped;
        }
        if self.stop_at_end {
            return PlaybackState::StopPending;
        }
        PlaybackState::Playing
    }

    pub fn stats(&self) -> TransitionStats {
        self.stats
    }

    /// Stops everything and discards the playlist. Failures here are logged
    /// rather than returned so teardown always completes.
    pub fn teardown(&mut self) {
        if let Some(queue) = self.queue.as_mut() {
            if let Err(err) = queue.stop(true) {
                warn!(error = %err, "Error stopping queue during teardown");
            }
        }
        self.queue = None;
        self.playlist.clear();
        self.buffers.clear();
        self.dispose.clear();
        self.current = 0;
        self.cursor = 0;
        self.stopped = true;
        self.started = false;
        self.rebuild_when_stopped = false;
        self.stop_at_end = false;
    }

    fn setup_queue(&mut self) -> Result<(), EngineError> {
        let track = &self.playlist[self.current];
        let mut queue = self.device.new_queue(track.format())?;
        if let Some(cookie) = track.magic_cookie() {
            queue.set_magic_cookie(&cookie)?;
        }
        self.queue = Some(queue);
        self.rebuild_when_stopped = false;
        self.stopped = false;
        self.apply_gain()
    }

    fn setup_buffers(&mut self) -> Result<(), EngineError> {
        let buffer_seconds = self.buffer_seconds;
        let track = &mut self.playlist[self.current];
        let (mut bytes, mut packets) =
            track::chunk_size(track.format(), track.max_packet_size(), buffer_seconds);
        let mut count = NUM_BUFFERS;

        // Tracks smaller than the whole buffer rotation are kept resident.
        if (bytes * NUM_BUFFERS) as u64 > track.data_size() {
            track.load_at_once = true;
        }
        if track.load_at_once {
            if track.packet_count() == 0 {
                warn!(
                    path = ?track.path(),
                    "Unknown packet count; streaming instead of loading at once"
                );
                track.load_at_once = false;
            } else {
                bytes = track.data_size() as usize;
                packets = track.packet_count() as usize;
                count = 1;
            }
        }

        self.packets_per_buffer = packets;
        self.scratch = vec![0u8; bytes];

        let mut allocated = Vec::with_capacity(count);
        {
            let queue = self.queue.as_mut().ok_or(EngineError::NotInitialized)?;
            for _ in 0..count {
                allocated.push(queue.allocate_buffer(bytes)?);
            }
        }
        self.buffers.extend_from_slice(&allocated);
        for id in allocated {
            self.refill(id)?;
        }
        Ok(())
    }

    /// Refills a completed buffer and hands it back to the queue. This is
    /// the track boundary logic: when the current track runs out mid-refill,
    /// the controller advances the playlist and applies the transition
    /// before completing the read.
    fn refill(&mut self, id: BufferId) -> Result<(), EngineError> {
        // Buffers superseded by a swap are freed on completion, not reused.
        if let Some(index) = self.dispose.iter().position(|&b| b == id) {
            self.dispose.swap_remove(index);
            if let Some(queue) = self.queue.as_mut() {
                queue.free_buffer(id)?;
            }
            return Ok(());
        }
        if self.stopped {
            return Ok(());
        }

        let loop_resident = self.playlist[self.current].resident
            && self.playlist.len() == 1
            && !self.stop_at_end;

        let mut packets = 0usize;
        let mut bytes = 0usize;
        if loop_resident {
            // The whole track already sits in this buffer.
            packets = self.packets_per_buffer;
            bytes = self.playlist[self.current].data_size() as usize;
        } else {
            while packets == 0 {
                let max_packets = self.packets_per_buffer;
                let cursor = self.cursor;
                let read = {
                    let track = &mut self.playlist[self.current];
                    track.source_mut()?.read_packets(
                        cursor,
                        max_packets,
                        &mut self.scratch,
                        &mut self.descs,
                    )?
                };
                packets = read.packets;
                bytes = read.bytes;
                if packets > 0 {
                    continue;
                }

                // The current track has ended.
                if self.playlist[self.current].load_at_once {
                    self.playlist[self.current].resident = true;
                }
                self.cursor = 0;
                let next = if self.current < self.playlist.len() - 1 {
                    self.current + 1
                } else {
                    0
                };

                if next == 0 && self.stop_at_end {
                    debug!("Playlist complete; stopping queue");
                    self.stopped = true;
                    if let Some(queue) = self.queue.as_mut() {
                        queue.stop(false)?;
                    }
                    return Ok(());
                }

                let transition =
                    Transition::between(&self.playlist[self.current], &self.playlist[next]);
                self.playlist[self.current].resident = false;

                if next != self.current {
                    self.playlist[self.current].close();
                    self.current = next;
                    self.playlist[self.current].reopen()?;
                }
                debug!(track = self.current, ?transition, "Track boundary");

                match transition {
                    Transition::Resize => {
                        self.stats.resizes += 1;
                        self.packets_per_buffer =
                            self.playlist[self.current].packet_count() as usize;
                        self.attach_cookie()?;
                    }
                    Transition::NewCookie => {
                        self.stats.cookie_refreshes += 1;
                        self.attach_cookie()?;
                    }
                    Transition::NewBuffers => {
                        self.stats.buffer_swaps += 1;
                        if let Some(queue) = self.queue.as_mut() {
                            queue.free_buffer(id)?;
                        }
                        let superseded: Vec<BufferId> =
                            self.buffers.iter().copied().filter(|&b| b != id).collect();
                        self.dispose.extend(superseded);
                        self.buffers.clear();
                        return self.setup_buffers();
                    }
                    Transition::NewQueue => {
                        self.rebuild_when_stopped = true;
                        if let Some(queue) = self.queue.as_mut() {
                            queue.stop(false)?;
                        }
                        return Ok(());
                    }
                }
            }
        }

        let vbr = self.playlist[self.current].format().is_vbr();
        {
            let queue = self.queue.as_mut().ok_or(EngineError::NotInitialized)?;
            if !loop_resident {
                queue.fill(id, &self.scratch[..bytes])?;
            }
            let descs: &[PacketDescription] = if vbr { &self.descs } else { &[] };
            queue.enqueue(id, bytes, descs)?;
        }

        if self.playlist[self.current].load_at_once {
            self.playlist[self.current].resident = true;
        }
        self.cursor += packets as u64;
        Ok(())
    }

    /// Tears down a drained queue and builds a fresh one for the current
    /// track's format.
    fn rebuild_queue(&mut self) -> Result<(), EngineError> {
        info!(track = self.current, "Rebuilding queue for new format");
        self.stats.rebuilds += 1;
        self.queue = None;
        self.buffers.clear();
        self.dispose.clear();
        self.setup_queue()?;
        self.setup_buffers()?;
        let queue = self.queue.as_mut().ok_or(EngineError::NotInitialized)?;
        queue.start()?;
        self.started = true;
        Ok(())
    }

    fn attach_cookie(&mut self) -> Result<(), EngineError> {
        if let Some(cookie) = self.playlist[self.current].magic_cookie() {
            if let Some(queue) = self.queue.as_mut() {
                queue.set_magic_cookie(&cookie)?;
            }
        }
        Ok(())
    }

    fn apply_gain(&mut self) -> Result<(), EngineError> {
        if let Some(queue) = self.queue.as_mut() {
            queue.set_gain(self.volume * self.master.get())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::decoder::memory::MemoryPacketSource;
    use crate::format::StreamFormat;
    use crate::output::mock;

    fn controller(device: &mock::Device) -> StreamController {
        StreamController::new(Arc::new(device.clone()), MasterGain::default(), 0.5)
    }

    /// 16-bit mono PCM; one packet per frame, two bytes per packet.
    fn source(sample_rate: f64, frames: usize) -> MemoryPacketSource {
        let format = StreamFormat::pcm(sample_rate, 1, 16, true);
        MemoryPacketSource::new(format, vec![0x55u8; frames * 2], 2)
    }

    /// Drives completions until `predicate` holds or the budget runs out.
    fn drive<F>(
        controller: &mut StreamController,
        queue: &mock::QueueHandle,
        budget: usize,
        predicate: F,
    ) where
        F: Fn(&StreamController) -> bool,
    {
        for _ in 0..budget {
            if predicate(controller) {
                return;
            }
            queue.complete_next();
            controller.process_events().expect("event processing failed");
        }
        assert!(predicate(controller), "predicate not reached within budget");
    }

    #[test]
    fn test_start_fills_buffer_rotation() {
        let device = mock::Device::new();
        let mut controller = controller(&device);
        // 70000 frames is large enough to stream.
        controller
            .load_source(Box::new(source(44100.0, 70000)), false)
            .expect("failed to load source");
        controller.start().expect("failed to start");

        let queue = device.queue(0);
        assert!(queue.running());
        assert_eq!(queue.in_flight_len(), NUM_BUFFERS);
        assert_eq!(controller.state(), PlaybackState::Playing);

        // Each buffer holds roughly half a second of CD mono audio.
        for enqueue in queue.enqueues() {
            assert_eq!(enqueue.byte_len, 44100);
            assert_eq!(enqueue.packet_descs, 0);
        }
    }

    #[test]
    fn test_small_track_loads_at_once_and_loops() {
        let device = mock::Device::new();
        let mut controller = controller(&device);
        let track = source(44100.0, 500);
        let reads = track.read_counter();
        controller
            .load_source(Box::new(track), false)
            .expect("failed to load source");
        controller.start().expect("failed to start");

        let queue = device.queue(0);
        assert_eq!(queue.in_flight_len(), 1);
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        // Looping the resident buffer never touches the source again.
        for _ in 0..5 {
            queue.complete_next();
            controller.process_events().expect("event processing failed");
        }
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(queue.in_flight_len(), 1);
        assert_eq!(controller.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_shrinking_resident_track_resizes_buffer() {
        let device = mock::Device::new();
        let mut controller = controller(&device);
        controller
            .load_source(Box::new(source(44100.0, 500)), true)
            .expect("failed to load source");
        controller
            .load_source(Box::new(source(44100.0, 400)), true)
            .expect("failed to load source");
        controller.start().expect("failed to start");

        let queue = device.queue(0);
        drive(&mut controller, &queue, 8, |c| c.stats().resizes > 0);

        assert_eq!(controller.stats().resizes, 1);
        assert_eq!(controller.stats().rebuilds, 0);
        assert_eq!(controller.stats().cookie_refreshes, 0);
        assert_eq!(device.queue_count(), 1);
        // The second track's data is now in the rotation.
        assert_eq!(queue.enqueues().last().expect("no enqueues").byte_len, 800);
    }

    #[test]
    fn test_growing_resident_track_swaps_buffers() {
        let device = mock::Device::new();
        let mut controller = controller(&device);
        controller
            .load_source(Box::new(source(44100.0, 400)), true)
            .expect("failed to load source");
        controller
            .load_source(Box::new(source(44100.0, 500)), true)
            .expect("failed to load source");
        controller.start().expect("failed to start");

        let queue = device.queue(0);
        drive(&mut controller, &queue, 8, |c| c.stats().buffer_swaps > 0);

        assert_eq!(controller.stats().buffer_swaps, 1);
        assert_eq!(controller.stats().rebuilds, 0);
        assert_eq!(device.queue_count(), 1);
        assert_eq!(queue.enqueues().last().expect("no enqueues").byte_len, 1000);
    }

    #[test]
    fn test_format_change_rebuilds_queue() {
        let _ = tracing_subscriber::fmt::try_init();
        let device = mock::Device::new();
        let mut controller = controller(&device);
        controller
            .load_source(Box::new(source(44100.0, 70000)), false)
            .expect("failed to load source");
        controller
            .load_source(Box::new(source(48000.0, 80000)), false)
            .expect("failed to load source");
        controller.start().expect("failed to start");

        let queue = device.queue(0);
        drive(&mut controller, &queue, 16, |c| c.stats().rebuilds > 0);

        assert_eq!(controller.stats().rebuilds, 1);
        assert_eq!(device.queue_count(), 2);
        let rebuilt = device.queue(1);
        assert_eq!(rebuilt.format().sample_rate, 48000.0);
        assert!(rebuilt.running());
        assert_eq!(rebuilt.in_flight_len(), NUM_BUFFERS);
        assert_eq!(controller.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_stop_at_end_halts_at_wrap_around() {
        let _ = tracing_subscriber::fmt::try_init();
        let device = mock::Device::new();
        let mut controller = controller(&device);
        controller
            .load_source(Box::new(source(44100.0, 70000)), false)
            .expect("failed to load source");
        controller.start().expect("failed to start");
        controller.stop(true).expect("failed to request stop");
        assert_eq!(controller.state(), PlaybackState::StopPending);

        let queue = device.queue(0);
        drive(&mut controller, &queue, 16, |c| {
            c.state() == PlaybackState::Stopped
        });

        assert!(!queue.running());
        // The stopped queue ignores further completions.
        queue.complete_next();
        controller.process_events().expect("event processing failed");
        assert_eq!(controller.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_stop_at_end_plays_remaining_tracks() {
        let device = mock::Device::new();
        let mut controller = controller(&device);
        controller
            .load_source(Box::new(source(44100.0, 70000)), false)
            .expect("failed to load source");
        controller
            .load_source(Box::new(source(44100.0, 60000)), false)
            .expect("failed to load source");
        controller.start().expect("failed to start");
        controller.stop(true).expect("failed to request stop");

        // The first track boundary does not stop playback.
        let queue = device.queue(0);
        drive(&mut controller, &queue, 8, |c| {
            c.stats().cookie_refreshes > 0
        });
        assert_eq!(controller.state(), PlaybackState::StopPending);

        drive(&mut controller, &queue, 8, |c| {
            c.state() == PlaybackState::Stopped
        });
        assert!(!queue.running());
        assert_eq!(controller.stats().rebuilds, 0);
        assert_eq!(controller.stats().buffer_swaps, 0);
        assert_eq!(device.queue_count(), 1);
        // The second track's tail went out before the queue halted.
        assert_eq!(queue.enqueues().last().expect("no enqueues").byte_len, 31800);
    }

    #[test]
    fn test_streamed_boundary_refreshes_cookie() {
        let device = mock::Device::new();
        let mut controller = controller(&device);
        controller
            .load_source(Box::new(source(44100.0, 70000)), false)
            .expect("failed to load source");
        let second = source(44100.0, 60000).with_cookie(vec![0xab, 0xcd]);
        controller
            .load_source(Box::new(second), false)
            .expect("failed to load source");
        controller.start().expect("failed to start");

        let queue = device.queue(0);
        drive(&mut controller, &queue, 8, |c| {
            c.stats().cookie_refreshes > 0
        });

        // Same format keeps the queue and its buffer rotation intact.
        assert_eq!(controller.stats().cookie_refreshes, 1);
        assert_eq!(controller.stats().rebuilds, 0);
        assert_eq!(controller.stats().buffer_swaps, 0);
        assert_eq!(controller.stats().resizes, 0);
        assert_eq!(device.queue_count(), 1);
        assert_eq!(queue.buffer_count(), NUM_BUFFERS);
        assert_eq!(queue.in_flight_len(), NUM_BUFFERS);
        assert_eq!(queue.cookie(), Some(vec![0xab, 0xcd]));
        assert_eq!(controller.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_empty_track_is_rejected() {
        let device = mock::Device::new();
        let mut controller = controller(&device);
        let empty = MemoryPacketSource::new(StreamFormat::pcm(44100.0, 1, 16, true), Vec::new(), 2);

        let result = controller.load_source(Box::new(empty), false);
        assert!(matches!(result, Err(EngineError::UnsupportedFormat(_))));
        assert_eq!(device.queue_count(), 0);

        // The controller is still usable afterwards.
        controller
            .load_source(Box::new(source(44100.0, 500)), false)
            .expect("failed to load source");
        controller.start().expect("failed to start");
    }

    #[test]
    fn test_immediate_stop() {
        let device = mock::Device::new();
        let mut controller = controller(&device);
        controller
            .load_source(Box::new(source(44100.0, 70000)), false)
            .expect("failed to load source");
        controller.start().expect("failed to start");

        controller.stop(false).expect("failed to stop");
        controller.process_events().expect("event processing failed");

        let queue = device.queue(0);
        assert!(!queue.running());
        assert_eq!(queue.in_flight_len(), 0);
        assert_eq!(controller.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_replacing_playlist_rebuilds_queue() {
        let device = mock::Device::new();
        let mut controller = controller(&device);
        controller
            .load_source(Box::new(source(44100.0, 70000)), false)
            .expect("failed to load source");

        controller.teardown();
        controller
            .load_source(Box::new(source(48000.0, 70000)), false)
            .expect("failed to load source");

        assert_eq!(device.queue_count(), 2);
        assert_eq!(device.queue(1).format().sample_rate, 48000.0);
    }

    #[test]
    fn test_start_without_track() {
        let device = mock::Device::new();
        let mut controller = controller(&device);
        assert!(matches!(
            controller.start(),
            Err(EngineError::NotInitialized)
        ));
    }

    #[test]
    fn test_failed_queue_creation_rolls_back() {
        let device = mock::Device::new();
        device.fail_new_queue(true);
        let mut controller = controller(&device);
        let result = controller.load_source(Box::new(source(44100.0, 500)), false);
        assert!(matches!(result, Err(EngineError::DeviceUnavailable)));

        // The failed track is not left in the playlist.
        device.fail_new_queue(false);
        controller
            .load_source(Box::new(source(44100.0, 500)), false)
            .expect("failed to load source");
        controller.start().expect("failed to start");
    }

    #[test]
    fn test_volume_tracks_master_gain() {
        let device = mock::Device::new();
        let master = MasterGain::default();
        let mut controller = StreamController::new(Arc::new(device.clone()), master.clone(), 0.5);
        controller
            .load_source(Box::new(source(44100.0, 500)), false)
            .expect("failed to load source");

        controller.set_volume(0.5).expect("failed to set volume");
        assert_eq!(device.queue(0).gain(), 0.5);

        master.set(0.8);
        controller.update_gain().expect("failed to update gain");
        assert!((device.queue(0).gain() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_teardown_is_quiet() {
        let device = mock::Device::new();
        let mut controller = controller(&device);
        controller
            .load_source(Box::new(source(44100.0, 500)), false)
            .expect("failed to load source");
        controller.start().expect("failed to start");

        controller.teardown();
        controller.process_events().expect("event processing failed");
        assert_eq!(controller.state(), PlaybackState::Stopped);
        controller.teardown();
    }
}
