//! Disk-image catalog
//!
//! Lists the images a user can mount from the store partition. The order
//! returned here is the menu order on every front end, so it must not
//! depend on directory iteration order.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{AppError, Result};

/// Extensions (lowercase, without the dot) served as optical images
pub const IMAGE_EXTENSIONS: [&str; 2] = ["iso", "cue"];

/// Name prefix of hidden metadata files (macOS AppleDouble etc.)
pub const HIDDEN_PREFIX: &str = "._";

/// Whether `path` names a recognized disk image
pub fn has_image_extension(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(is_image_name)
        .unwrap_or(false)
}

fn is_image_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| lower.len() > ext.len() + 1 && lower.ends_with(&format!(".{}", ext)))
}

fn catalog_order(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Image catalog rooted at the store mount point
#[derive(Debug, Clone)]
pub struct ImageCatalog {
    store_dir: PathBuf,
}

impl ImageCatalog {
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
        }
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// List image filenames, case-insensitively sorted
    ///
    /// Never fails: a missing or unreadable store yields an empty list.
    pub fn list(&self) -> Vec<String> {
        let dir = match fs::read_dir(&self.store_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Image store {} does not exist", self.store_dir.display());
                return Vec::new();
            }
            Err(e) => {
                warn!(
                    "Failed to read image store {}: {}",
                    self.store_dir.display(),
                    e
                );
                return Vec::new();
            }
        };

        let mut images: Vec<String> = dir
            .filter_map(|entry| entry.ok())
            .filter(|entry| !entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| !name.starts_with(HIDDEN_PREFIX) && is_image_name(name))
            .collect();

        images.sort_by(|a, b| catalog_order(a, b));
        debug!(
            "Found {} images in {}",
            images.len(),
            self.store_dir.display()
        );
        images
    }

    pub fn is_empty(&self) -> bool {
        self.list().is_empty()
    }

    /// Map a listed filename to its absolute path
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains('\0')
            || name == "."
            || name == ".."
        {
            return Err(AppError::BadRequest(format!("Invalid image name: {}", name)));
        }

        if !self.list().iter().any(|listed| listed == name) {
            return Err(AppError::NotFound(format!("Image not found: {}", name)));
        }

        Ok(self.store_dir.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with(files: &[&str]) -> (TempDir, ImageCatalog) {
        let dir = TempDir::new().unwrap();
        for file in files {
            fs::write(dir.path().join(file), b"").unwrap();
        }
        let catalog = ImageCatalog::new(dir.path());
        (dir, catalog)
    }

    #[test]
    fn test_case_insensitive_order_and_hidden_files() {
        let (_dir, catalog) =
            store_with(&["Zelda.iso", "armada.cue", "Banjo.iso", "._hidden.iso"]);
        assert_eq!(catalog.list(), vec!["armada.cue", "Banjo.iso", "Zelda.iso"]);
    }

    #[test]
    fn test_filters_non_images() {
        let (dir, catalog) = store_with(&["game.ISO", "notes.txt", "track01.bin", "iso"]);
        fs::create_dir(dir.path().join("folder.iso")).unwrap();
        assert_eq!(catalog.list(), vec!["game.ISO"]);
    }

    #[test]
    fn test_missing_store_is_empty() {
        let catalog = ImageCatalog::new("/nonexistent/usbode/store");
        assert!(catalog.list().is_empty());
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_resolve() {
        let (dir, catalog) = store_with(&["Banjo.iso"]);
        assert_eq!(
            catalog.resolve("Banjo.iso").unwrap(),
            dir.path().join("Banjo.iso")
        );
        assert!(matches!(
            catalog.resolve("Missing.iso"),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            catalog.resolve("../etc/passwd.iso"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_has_image_extension() {
        assert!(has_image_extension(Path::new("/mnt/imgstore/game.iso")));
        assert!(has_image_extension(Path::new("/mnt/imgstore/Disc.CUE")));
        assert!(!has_image_extension(Path::new("/dev/mmcblk0p3")));
        assert!(!has_image_extension(Path::new("/dev/cdrom")));
        assert!(!has_image_extension(Path::new("/mnt/imgstore/.iso")));
    }
}
