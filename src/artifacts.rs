//! Per-agent output artifacts.
//!
//! Each agent owns a directory under the configured output root. Writes are
//! atomic (temp file then rename) so a stop request can never leave a
//! half-written artifact behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

#[derive(Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn agent_dir(&self, agent: &str) -> PathBuf {
        self.root.join(agent)
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, path)
    }

    /// Write a JSON artifact under `<root>/<agent>/<name>`.
    pub fn write_json<T: Serialize>(&self, agent: &str, name: &str, value: &T) -> io::Result<()> {
        let body = serde_json::to_vec_pretty(value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.write_atomic(&self.agent_dir(agent).join(name), &body)
    }

    /// Write a text/CSV artifact under `<root>/<agent>/<name>`.
    pub fn write_text(&self, agent: &str, name: &str, contents: &str) -> io::Result<()> {
        self.write_atomic(&self.agent_dir(agent).join(name), contents.as_bytes())
    }

    /// Read back a JSON artifact if it exists.
    pub fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        agent: &str,
        name: &str,
    ) -> io::Result<Option<T>> {
        let path = self.agent_dir(agent).join(name);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Timestamped artifact name, e.g. `decision_20250102_1530.json`.
    pub fn stamped_name(stem: &str, ext: &str) -> String {
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M");
        format!("{stem}_{stamp}.{ext}")
    }
}
