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
use std::path::PathBuf;

/// Error types for the playback engine.
///
/// Low-level device and decoder failures surface as a result of the call that
/// triggered them; there is no automatic retry.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio output device unavailable")]
    DeviceUnavailable,

    #[error("Engine is not initialized")]
    NotInitialized,

    /// Expected under heavy concurrent effect usage; callers are expected to
    /// skip the play request rather than treat this as a fault.
    #[error("No effect voices available")]
    NoVoicesAvailable,

    #[error("Invalid music slot: {0}")]
    InvalidSlot(usize),

    #[error("Device operation failed: {0}")]
    Hardware(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Maps an IO error encountered while opening `path` to an engine error.
    pub(crate) fn from_open(err: std::io::Error, path: &std::path::Path) -> EngineError {
        if err.kind() == std::io::ErrorKind::NotFound {
            EngineError::FileNotFound(path.to_path_buf())
        } else {
            EngineError::Hardware(format!("{}: {}", path.display(), err))
        }
    }
}
