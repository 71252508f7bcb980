//! Controller data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// USB personality, derived by probing the gadget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GadgetMode {
    /// Not bound to a device controller; invisible to the host
    #[default]
    Disabled,
    /// CD-ROM serving a disk image
    OpticalEmulation,
    /// Writable store partition
    MassStorage,
}

impl GadgetMode {
    pub fn is_enabled(self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

impl fmt::Display for GadgetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "Disabled"),
            Self::OpticalEmulation => write!(f, "CD-ROM Emulator"),
            Self::MassStorage => write!(f, "Mass Storage"),
        }
    }
}

/// Point-in-time view for front ends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GadgetStatus {
    pub mode: GadgetMode,
    /// Live backing file of the LUN
    pub mounted_image: Option<PathBuf>,
    /// Selection restored on the next start
    pub persisted_image: Option<PathBuf>,
    /// Number of catalog entries
    pub image_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl GadgetStatus {
    /// File name of the live backing file, for compact displays
    pub fn mounted_name(&self) -> Option<String> {
        self.mounted_image
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_display() {
        assert!(!GadgetMode::Disabled.is_enabled());
        assert!(GadgetMode::MassStorage.is_enabled());
        assert_eq!(GadgetMode::OpticalEmulation.to_string(), "CD-ROM Emulator");
    }

    #[test]
    fn test_mounted_name() {
        let status = GadgetStatus {
            mode: GadgetMode::OpticalEmulation,
            mounted_image: Some(PathBuf::from("/mnt/imgstore/Banjo.iso")),
            persisted_image: None,
            image_count: 1,
            updated_at: Utc::now(),
        };
        assert_eq!(status.mounted_name().as_deref(), Some("Banjo.iso"));
    }
}
