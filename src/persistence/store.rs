//! Save directory layout and (de)serialization of universe data
//!
//! One directory per universe under the save root:
//! - `settings.json`, written once
//! - `slice-<t>.json`, the snapshots of the history slice at `t`
//! - `clock-<t>.json`, `mailbox-<t>.json`, `global-<t>.json`
//! - `latest.json`, the time of the newest complete save

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::agent::state::AgentSnapshot;
use crate::command::mailbox::CommandMailbox;
use crate::core::config::UniverseSettings;
use crate::core::error::{Result, UniverseError};
use crate::core::types::{AgentId, Tick};
use crate::history::slice::HistorySlice;
use crate::history::store::HistoryStore;
use crate::mechanism::global::GlobalState;
use crate::universe::data::{Clock, UniverseData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct LatestPointer {
    time: Tick,
}

/// Universe saves under one root directory
#[derive(Debug, Clone)]
pub struct UniverseStore {
    root: PathBuf,
}

impl UniverseStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn universe_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.universe_dir(name).join("latest.json").is_file()
    }

    /// Write every artifact: settings, all slices in the window, and the
    /// clock, mailbox and global state of the current time
    pub fn save_all(&self, data: &UniverseData) -> Result<()> {
        let dir = self.prepare(data)?;
        for (time, slice) in data.history.slices() {
            write_json(&dir.join(slice_file(time)), &slice_records(slice))?;
        }
        self.write_state(&dir, data)?;
        tracing::info!(
            universe = %data.settings.universe_name,
            time = data.clock.time,
            slices = data.history.len(),
            "saved universe"
        );
        Ok(())
    }

    /// Write the two newest slices and current state; older slices must
    /// already be on disk from earlier saves.
    ///
    /// The slice before the latest is included because the pre phase of the
    /// step that appended the latest one rewrote it.
    pub fn save_latest(&self, data: &UniverseData) -> Result<()> {
        let dir = self.prepare(data)?;
        let time = data.history.latest_time();
        for slice_time in [time - 1, time] {
            if let Some(slice) = data.history.slice_at(slice_time) {
                write_json(&dir.join(slice_file(slice_time)), &slice_records(slice))?;
            }
        }
        self.write_state(&dir, data)?;
        tracing::debug!(universe = %data.settings.universe_name, time, "saved latest");
        Ok(())
    }

    fn prepare(&self, data: &UniverseData) -> Result<PathBuf> {
        let dir = self.universe_dir(&data.settings.universe_name);
        fs::create_dir_all(&dir)?;
        let settings_path = dir.join("settings.json");
        if !settings_path.exists() {
            write_json(&settings_path, &data.settings)?;
        }
        Ok(dir)
    }

    fn write_state(&self, dir: &Path, data: &UniverseData) -> Result<()> {
        let time = data.clock.time;
        write_json(&dir.join(format!("clock-{time}.json")), &data.clock)?;
        write_json(&dir.join(format!("mailbox-{time}.json")), &data.mailbox)?;
        write_json(&dir.join(format!("global-{time}.json")), &data.global)?;
        // Last, so an interrupted save leaves the previous pointer intact
        write_json(&dir.join("latest.json"), &LatestPointer { time })
    }

    /// Read the newest save of `name`.
    ///
    /// Snapshots equal across consecutive slices share one allocation.
    pub fn load(&self, name: &str) -> Result<UniverseData> {
        let dir = self.universe_dir(name);
        let LatestPointer { time } = read_json(&dir.join("latest.json"))?;
        let settings: UniverseSettings = read_json(&dir.join("settings.json"))?;
        settings.validate()?;
        let clock: Clock = read_json(&dir.join(format!("clock-{time}.json")))?;
        let mailbox: CommandMailbox = read_json(&dir.join(format!("mailbox-{time}.json")))?;
        let global: GlobalState = read_json(&dir.join(format!("global-{time}.json")))?;

        if clock.time != time {
            return Err(UniverseError::Inconsistent(format!(
                "clock file for {time} holds time {}",
                clock.time
            )));
        }

        let t_dim = settings.t_dim;
        let mut shared: AHashMap<(AgentId, Tick), Arc<AgentSnapshot>> = AHashMap::new();
        let mut slices = Vec::with_capacity(t_dim as usize);
        let mut reused = 0usize;
        for slice_time in (time - t_dim + 1)..=time {
            let records: Vec<AgentSnapshot> = read_json(&dir.join(slice_file(slice_time)))?;
            let mut next_shared = AHashMap::with_capacity(records.len());
            let snapshots: Vec<Arc<AgentSnapshot>> = records
                .into_iter()
                .map(|record| {
                    let key = (record.id, record.int4d.t);
                    let snapshot = match shared.get(&key) {
                        Some(existing) if **existing == record => {
                            reused += 1;
                            Arc::clone(existing)
                        }
                        _ => Arc::new(record),
                    };
                    next_shared.insert(key, Arc::clone(&snapshot));
                    snapshot
                })
                .collect();
            shared = next_shared;
            slices.push(HistorySlice::from_snapshots(snapshots));
        }

        tracing::info!(universe = name, time, reused, "loaded universe");
        Ok(UniverseData {
            history: HistoryStore::from_slices(t_dim as usize, time, slices),
            settings,
            clock,
            mailbox,
            global,
        })
    }
}

fn slice_file(time: Tick) -> String {
    format!("slice-{time}.json")
}

fn slice_records(slice: &HistorySlice) -> Vec<&AgentSnapshot> {
    slice.snapshots().map(Arc::as_ref).collect()
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(UniverseError::MissingArtifact(path.to_path_buf()));
        }
        Err(err) => return Err(err.into()),
    };
    serde_json::from_reader(BufReader::new(file)).map_err(|source| UniverseError::CorruptArtifact {
        path: path.to_path_buf(),
        source,
    })
}
