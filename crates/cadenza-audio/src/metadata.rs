//! Per-policy volume and mute state persisted across restarts.
//!
//! The document keeps one integer level per policy key and a nested
//! `STREAM_TYPE_MUTE_STATUS` object with one flag per policy key. Missing or
//! ill-typed entries are filled from defaults and the file is rewritten.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use cadenza_focus::StreamPolicy;
use serde_json::{Map, Value};

use crate::error::MetadataError;
use crate::volume::MAX_VOLUME_LEVEL;

const MUTE_STATUS_KEY: &str = "STREAM_TYPE_MUTE_STATUS";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistedAudioState {
    volumes: [u8; StreamPolicy::COUNT],
    mutes: [bool; StreamPolicy::COUNT],
}

impl PersistedAudioState {
    pub fn with_default_volume(level: u8) -> Self {
        Self {
            volumes: [level.min(MAX_VOLUME_LEVEL); StreamPolicy::COUNT],
            mutes: [false; StreamPolicy::COUNT],
        }
    }

    pub fn volume(&self, policy: StreamPolicy) -> Option<u8> {
        policy.index().map(|idx| self.volumes[idx])
    }

    pub fn set_volume(&mut self, policy: StreamPolicy, level: u8) -> bool {
        match policy.index() {
            Some(idx) => {
                self.volumes[idx] = level.min(MAX_VOLUME_LEVEL);
                true
            }
            None => false,
        }
    }

    pub fn is_muted(&self, policy: StreamPolicy) -> bool {
        policy.index().map(|idx| self.mutes[idx]).unwrap_or(false)
    }

    pub fn set_muted(&mut self, policy: StreamPolicy, muted: bool) -> bool {
        match policy.index() {
            Some(idx) => {
                self.mutes[idx] = muted;
                true
            }
            None => false,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut doc = Map::new();
        let mut mutes = Map::new();
        for (idx, policy) in StreamPolicy::VALID.iter().enumerate() {
            doc.insert(policy.key().into(), Value::from(self.volumes[idx]));
            mutes.insert(policy.key().into(), Value::Bool(self.mutes[idx]));
        }
        doc.insert(MUTE_STATUS_KEY.into(), Value::Object(mutes));
        Value::Object(doc)
    }

    /// Build state from a parsed document. The flag is `true` when anything
    /// had to be filled in from defaults.
    pub fn from_json(value: &Value, default_volume: u8) -> (Self, bool) {
        let mut state = Self::with_default_volume(default_volume);
        let Some(doc) = value.as_object() else {
            return (state, true);
        };

        let mut repaired = false;
        let mutes = doc.get(MUTE_STATUS_KEY).and_then(Value::as_object);
        repaired |= mutes.is_none();

        for (idx, policy) in StreamPolicy::VALID.iter().enumerate() {
            match doc.get(policy.key()).and_then(Value::as_u64) {
                Some(level) if level <= MAX_VOLUME_LEVEL as u64 => state.volumes[idx] = level as u8,
                _ => repaired = true,
            }
            match mutes.and_then(|m| m.get(policy.key())).and_then(Value::as_bool) {
                Some(muted) => state.mutes[idx] = muted,
                None => repaired = true,
            }
        }
        (state, repaired)
    }
}

/// File backing a [`PersistedAudioState`].
#[derive(Clone, Debug)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored state, creating or repairing the file as needed.
    pub fn load_or_create(&self, default_volume: u8) -> Result<PersistedAudioState, MetadataError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "creating audio metadata");
                let state = PersistedAudioState::with_default_volume(default_volume);
                self.save(&state)?;
                return Ok(state);
            }
            Err(err) => return Err(err.into()),
        };

        let (state, repaired) = match serde_json::from_str::<Value>(&contents) {
            Ok(value) => PersistedAudioState::from_json(&value, default_volume),
            Err(err) => {
                tracing::warn!(?err, path = %self.path.display(), "audio metadata unreadable, recreating");
                (PersistedAudioState::with_default_volume(default_volume), true)
            }
        };
        if repaired {
            tracing::warn!(path = %self.path.display(), "repairing audio metadata");
            self.save(&state)?;
        }
        Ok(state)
    }

    /// Write the whole document through a temporary file.
    pub fn save(&self, state: &PersistedAudioState) -> Result<(), MetadataError> {
        let json = serde_json::to_vec_pretty(&state.to_json())?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = self.path.with_extension("tmp");
        let mut file = File::create(&tmp_path)?;
        file.write_all(&json)?;
        file.flush()?;
        drop(file);
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
