//! On-disk layout for the `lg` binary: a JSON graph document plus a JSONL
//! event history next to it.

use eyre::{Context, Result};
use lineage::{DagState, Event};
use log::debug;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Default graph document, relative to the working directory.
pub const DEFAULT_STATE_FILE: &str = "dag/state.json";

/// Suffix appended to the state file name for the event history.
const EVENTS_SUFFIX: &str = ".events.jsonl";

/// Handle for a graph document and its history log.
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `dag/state.json` -> `dag/state.json.events.jsonl`
    pub fn events_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(EVENTS_SUFFIX);
        PathBuf::from(name)
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write an empty graph. Fails if the document already exists.
    pub fn init(&self) -> Result<DagState> {
        if self.exists() {
            eyre::bail!("{} already exists", self.path.display());
        }
        let state = DagState::new();
        self.save(&state)?;
        Ok(state)
    }

    pub fn load(&self) -> Result<DagState> {
        if !self.exists() {
            eyre::bail!("No graph found at {}. Run 'lg init' first.", self.path.display());
        }
        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let state = DagState::from_json(&json)?;
        debug!("loaded {} node(s) from {}", state.node_count(), self.path.display());
        Ok(state)
    }

    /// Replace the document atomically: write a sibling temp file, then rename.
    pub fn save(&self, state: &DagState) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context("Failed to create state directory")?;
        }

        let mut tmp_name = OsString::from(self.path.as_os_str());
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let json = state.to_json()?;
        let mut file = File::create(&tmp_path).context("Failed to create temporary state file")?;
        writeln!(file, "{}", json).context("Failed to write state file")?;
        file.sync_all().context("Failed to sync state file")?;
        fs::rename(&tmp_path, &self.path).context("Failed to replace state file")?;

        debug!("saved {} node(s) to {}", state.node_count(), self.path.display());
        Ok(())
    }

    /// Append events to the history log, one JSON object per line.
    pub fn append_events(&self, events: &[Event]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let events_path = self.events_path();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&events_path)
            .context("Failed to open event log for append")?;

        for event in events {
            let json = serde_json::to_string(event).context("Failed to serialize event")?;
            writeln!(file, "{}", json).context("Failed to write to event log")?;
        }
        file.sync_all().context("Failed to sync event log")?;

        debug!("appended {} event(s) to {}", events.len(), events_path.display());
        Ok(())
    }

    /// Read the whole history log. A missing log is an empty history.
    pub fn read_events(&self) -> Result<Vec<Event>> {
        let events_path = self.events_path();
        if !events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&events_path).context("Failed to open event log")?;
        let mut events = Vec::new();
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = line.context("Failed to read line from event log")?;
            if line.trim().is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event at line {}", line_num + 1))?;
            events.push(event);
        }
        Ok(events)
    }

    /// Save the graph, then record what changed.
    pub fn commit(&self, state: &DagState, events: &[Event]) -> Result<()> {
        self.save(state)?;
        self.append_events(events)
    }
}
