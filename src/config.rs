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
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::EngineError;

/// Engine sizing, loadable from a YAML file or built from defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of independent background music slots.
    pub music_slots: usize,
    /// Size of the effect voice pool.
    pub max_voices: usize,
    /// Approximate duration of one streaming buffer.
    pub buffer_seconds: f64,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            music_slots: 2,
            max_voices: 32,
            buffer_seconds: 0.5,
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<EngineConfig, EngineError> {
        let contents =
            fs::read_to_string(path).map_err(|err| EngineError::from_open(err, path))?;
        let config: EngineConfig = serde_yml::from_str(&contents)
            .map_err(|err| EngineError::Config(format!("{}: {}", path.display(), err)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.music_slots == 0 {
            return Err(EngineError::Config(
                "music_slots must be at least 1".to_string(),
            ));
        }
        if self.max_voices == 0 {
            return Err(EngineError::Config(
                "max_voices must be at least 1".to_string(),
            ));
        }
        if !(self.buffer_seconds > 0.0) {
            return Err(EngineError::Config(
                "buffer_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
