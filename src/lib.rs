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

//! A real-time audio playback engine.
//!
//! `trackbed` plays background music playlists by streaming compressed or
//! PCM tracks through triple-buffered hardware queues, and one-shot sound
//! effects through a fixed pool of positional mixer voices. The output
//! hardware sits behind the [`output::Device`] and [`output::Mixer`] traits;
//! a recording mock lives in [`output::mock`].
//!
//! Embedders create an [`Engine`] per device and drive
//! [`Engine::process_all_events`] from their run loop to service buffer
//! completions.

pub mod config;
pub mod decoder;
pub mod effects;
pub mod engine;
pub mod error;
pub mod format;
pub mod output;
pub mod stream;
pub mod track;

#[cfg(test)]
mod testutil;

pub use config::EngineConfig;
pub use effects::EffectId;
pub use engine::{Engine, MasterGain};
pub use error::EngineError;
pub use format::StreamFormat;
pub use stream::PlaybackState;
