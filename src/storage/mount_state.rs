//! Last selected image, persisted across restarts

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Plain-text record holding one image path followed by a newline
#[derive(Debug, Clone)]
pub struct MountStateStore {
    path: PathBuf,
}

impl MountStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted image path
    ///
    /// A missing, empty or unreadable record means "no prior selection".
    pub fn load(&self) -> Option<PathBuf> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No mount state at {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!("Failed to read mount state {}: {}", self.path.display(), e);
                return None;
            }
        };

        let line = content.lines().next().unwrap_or("").trim();
        if line.is_empty() {
            None
        } else {
            Some(PathBuf::from(line))
        }
    }

    /// Persist `image` as the current selection
    ///
    /// Written to a sibling file first and renamed into place so a power
    /// cut never leaves a half-written record.
    pub fn save(&self, image: &Path) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, format!("{}\n", image.display()))?;
        fs::rename(&tmp, &self.path)?;

        info!("Saved mount selection: {}", image.display());
        Ok(())
    }
}
