//! ConfigFS file operations for the USB gadget

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::{AppError, Result};

/// USB spec version (USB 2.0)
pub const USB_BCD_USB: u16 = 0x0200;

/// USB device version
pub const USB_BCD_DEVICE: u16 = 0x0100;

/// English (US) string table
pub const LANG_EN_US: &str = "0x409";

/// Configuration directory name
pub const CONFIG_NAME: &str = "c.1";

const CONFIGFS_MAGIC: i64 = 0x6265_6570;
const SYSFS_MAGIC: i64 = 0x6265_6572;

fn is_kernel_attribute(file: &File) -> bool {
    nix::sys::statfs::fstatfs(file)
        .map(|st| {
            let fs_type = st.filesystem_type().0 as i64;
            fs_type == CONFIGFS_MAGIC || fs_type == SYSFS_MAGIC
        })
        .unwrap_or(true)
}

/// Find the UDC to bind: `preferred` if present, else the first listed
pub fn find_udc(udc_class_path: &Path, preferred: Option<&str>) -> Option<String> {
    if let Some(name) = preferred.filter(|name| !name.is_empty()) {
        if udc_class_path.join(name).exists() {
            return Some(name.to_string());
        }
        return None;
    }

    let mut names: Vec<String> = fs::read_dir(udc_class_path)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names.into_iter().next()
}

/// Write an attribute value
///
/// sysfs/configfs attributes must receive the whole value (newline
/// included) in a single write() call, and write-only attributes such as
/// `forced_eject` cannot be opened with O_TRUNC.
pub fn write_file(path: &Path, content: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .or_else(|e| {
            if path.exists() {
                Err(e)
            } else {
                File::create(path)
            }
        })
        .map_err(|e| AppError::Internal(format!("Failed to open {}: {}", path.display(), e)))?;

    let data: std::borrow::Cow<[u8]> = if content.ends_with('\n') {
        content.as_bytes().into()
    } else {
        let mut buf = content.as_bytes().to_vec();
        buf.push(b'\n');
        buf.into()
    };

    file.write_all(&data).map_err(|e| {
        AppError::Internal(format!("Failed to write to {}: {}", path.display(), e))
    })?;
    file.flush()
        .map_err(|e| AppError::Internal(format!("Failed to flush {}: {}", path.display(), e)))?;

    // Plain files (a gadget tree outside configfs) may hold a longer old value
    if !is_kernel_attribute(&file) {
        file.set_len(data.len() as u64).map_err(|e| {
            AppError::Internal(format!("Failed to truncate {}: {}", path.display(), e))
        })?;
    }

    Ok(())
}

/// Read an attribute, trimmed
pub fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| AppError::Internal(format!("Failed to read {}: {}", path.display(), e)))
}

/// Create directory if not exists
pub fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| {
        AppError::Internal(format!(
            "Failed to create directory {}: {}",
            path.display(),
            e
        ))
    })
}

/// Remove an (in configfs: attribute-only) directory
pub fn remove_dir(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir(path).map_err(|e| {
            AppError::Internal(format!(
                "Failed to remove directory {}: {}",
                path.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Remove a file or symlink
pub fn remove_file(path: &Path) -> Result<()> {
    if path.symlink_metadata().is_ok() {
        fs::remove_file(path).map_err(|e| {
            AppError::Internal(format!("Failed to remove file {}: {}", path.display(), e))
        })?;
    }
    Ok(())
}

/// Create symlink `dest` -> `src`
pub fn create_symlink(src: &Path, dest: &Path) -> Result<()> {
    std::os::unix::fs::symlink(src, dest).map_err(|e| {
        AppError::Internal(format!(
            "Failed to create symlink {} -> {}: {}",
            dest.display(),
            src.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_appends_newline_and_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file");

        write_file(&path, "/mnt/imgstore/a-long-image-name.iso").unwrap();
        write_file(&path, "/dev/sda").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "/dev/sda\n");
        assert_eq!(read_file(&path).unwrap(), "/dev/sda");
    }

    #[test]
    fn test_find_udc() {
        let dir = TempDir::new().unwrap();
        assert_eq!(find_udc(dir.path(), None), None);

        fs::create_dir(dir.path().join("fe980000.usb")).unwrap();
        fs::create_dir(dir.path().join("3f980000.usb")).unwrap();
        assert_eq!(find_udc(dir.path(), None).as_deref(), Some("3f980000.usb"));
        assert_eq!(
            find_udc(dir.path(), Some("fe980000.usb")).as_deref(),
            Some("fe980000.usb")
        );
        assert_eq!(find_udc(dir.path(), Some("dummy_udc.0")), None);
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        remove_dir(&dir.path().join("functions")).unwrap();
        remove_file(&dir.path().join("configs/c.1/mass_storage.usb0")).unwrap();
    }
}
