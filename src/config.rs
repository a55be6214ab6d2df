use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::session::{SessionConfig, Speed};
use crate::source::DEFAULT_SERVER_URL;

/// Settings remembered between runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Preferences {
    pub server_url: String,
    pub speed: Speed,
    pub count: usize,
    pub pause_secs: f64,
}

impl Default for Preferences {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            speed: session.speed,
            count: session.count,
            pause_secs: session.pause_secs,
        }
    }
}

impl Preferences {
    /// Clamped session settings
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.speed, self.count, self.pause_secs)
    }

    pub fn with_session(mut self, config: SessionConfig) -> Self {
        self.speed = config.speed;
        self.count = config.count;
        self.pause_secs = config.pause_secs;
        self
    }
}

pub trait ConfigStore {
    fn load(&self) -> Preferences;
    fn save(&self, prefs: &Preferences) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "diktat") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("diktat_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Preferences {
        if let Ok(bytes) = fs::read(&self.path) {
            if let Ok(prefs) = serde_json::from_slice::<Preferences>(&bytes) {
                return prefs;
            }
        }
        Preferences::default()
    }

    fn save(&self, prefs: &Preferences) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(prefs).map_err(std::io::Error::other)?;
        fs::write(&self.path, data)
    }
}
