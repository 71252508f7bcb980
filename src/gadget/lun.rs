//! Mass-storage LUN of the USBODE gadget
//!
//! The gadget carries exactly one mass-storage function with one LUN. Both
//! personalities share it: optical emulation sets `cdrom=1 ro=1`, mass
//! storage sets `cdrom=0 ro=0`. The `file` attribute holds the backing file.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::configfs::{read_file, write_file};
use super::helper::GadgetKind;
use crate::error::{AppError, Result};

/// Function instance directory name
pub const MSD_INSTANCE: &str = "mass_storage.usb0";

/// The only LUN used
pub const LUN_NAME: &str = "lun.0";

const EJECT_SETTLE: Duration = Duration::from_millis(50);
const BUSY_RETRIES: u32 = 5;

/// Handle on `functions/mass_storage.usb0/lun.0` of one gadget
#[derive(Debug, Clone)]
pub struct MsdLun {
    gadget_path: PathBuf,
}

impl MsdLun {
    pub fn new(gadget_path: impl Into<PathBuf>) -> Self {
        Self {
            gadget_path: gadget_path.into(),
        }
    }

    /// `functions/mass_storage.usb0`
    pub fn function_path(&self) -> PathBuf {
        self.gadget_path.join("functions").join(MSD_INSTANCE)
    }

    pub fn lun_path(&self) -> PathBuf {
        self.function_path().join(LUN_NAME)
    }

    pub fn exists(&self) -> bool {
        self.lun_path().exists()
    }

    /// Apply the LUN attributes for `kind`
    ///
    /// Detaches the current backing file first; the kernel refuses to change
    /// `cdrom`/`ro` while a file is attached. Only changed attributes are
    /// written.
    pub fn configure(&self, kind: GadgetKind) -> Result<()> {
        let lun_path = self.lun_path();
        if !lun_path.exists() {
            return Err(AppError::Internal(format!(
                "LUN directory {} does not exist",
                lun_path.display()
            )));
        }

        self.force_eject()?;
        thread::sleep(EJECT_SETTLE);

        let (cdrom, ro) = if kind.is_cdrom() { ("1", "1") } else { ("0", "0") };
        for (attr, value) in [
            ("cdrom", cdrom),
            ("ro", ro),
            ("removable", "1"),
            ("nofua", "1"),
        ] {
            let attr_path = lun_path.join(attr);
            let current = read_file(&attr_path).unwrap_or_default();
            if current != value {
                debug!("Updating LUN {}: {} -> {}", attr, current, value);
                write_file(&attr_path, value)?;
            }
        }

        info!("LUN configured for {}", kind);
        Ok(())
    }

    /// Bind `path` as backing file
    ///
    /// Retries with backoff while the kernel reports EBUSY, which happens
    /// when the host still holds the medium right after an eject.
    pub fn set_backing_file(&self, path: &Path) -> Result<()> {
        let lun_path = self.lun_path();
        if !lun_path.exists() {
            return Err(AppError::GadgetNotEnabled);
        }

        let file_attr = lun_path.join("file");
        let value = path.to_string_lossy();
        let mut attempt = 0;
        loop {
            match write_file(&file_attr, &value) {
                Ok(()) => {
                    info!("Backing file set to {}", path.display());
                    return Ok(());
                }
                Err(e) if is_busy(&e) && attempt + 1 < BUSY_RETRIES => {
                    warn!(
                        "Backing file busy, retrying (attempt {}/{})",
                        attempt + 1,
                        BUSY_RETRIES
                    );
                    // 50, 100, 200, 400ms
                    thread::sleep(EJECT_SETTLE * (1 << attempt));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Current backing file, `None` when nothing is attached
    pub fn backing_file(&self) -> Result<Option<PathBuf>> {
        let value = read_file(&self.lun_path().join("file"))?;
        Ok(if value.is_empty() {
            None
        } else {
            Some(PathBuf::from(value))
        })
    }

    /// Raw `cdrom` attribute
    pub fn cdrom_flag(&self) -> Result<String> {
        read_file(&self.lun_path().join("cdrom"))
    }

    /// Detach the backing file even if the host has the medium locked
    ///
    /// Falls back to clearing `file` on kernels without `forced_eject`.
    pub fn force_eject(&self) -> Result<()> {
        let lun_path = self.lun_path();
        if !lun_path.exists() {
            return Ok(());
        }

        let forced_eject = lun_path.join("forced_eject");
        if forced_eject.exists() {
            match write_file(&forced_eject, "1") {
                Ok(()) => {
                    debug!("forced_eject written");
                    return Ok(());
                }
                Err(e) => warn!("forced_eject failed: {}, clearing file instead", e),
            }
        }
        write_file(&lun_path.join("file"), "")
    }
}

fn is_busy(err: &AppError) -> bool {
    let msg = err.to_string();
    msg.contains("Device or resource busy") || msg.contains("os error 16")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn lun_tree() -> (TempDir, MsdLun) {
        let dir = TempDir::new().unwrap();
        let lun = MsdLun::new(dir.path());
        fs::create_dir_all(lun.lun_path()).unwrap();
        for attr in ["cdrom", "ro", "removable", "nofua", "file"] {
            fs::write(lun.lun_path().join(attr), "0\n").unwrap();
        }
        fs::write(lun.lun_path().join("file"), "\n").unwrap();
        (dir, lun)
    }

    #[test]
    fn test_configure_optical_then_mass_storage() {
        let (_dir, lun) = lun_tree();

        lun.configure(GadgetKind::OpticalEmulation).unwrap();
        assert_eq!(lun.cdrom_flag().unwrap(), "1");
        assert_eq!(read_file(&lun.lun_path().join("ro")).unwrap(), "1");
        assert_eq!(read_file(&lun.lun_path().join("removable")).unwrap(), "1");

        lun.configure(GadgetKind::MassStorage).unwrap();
        assert_eq!(lun.cdrom_flag().unwrap(), "0");
        assert_eq!(read_file(&lun.lun_path().join("ro")).unwrap(), "0");
    }

    #[test]
    fn test_backing_file() {
        let (_dir, lun) = lun_tree();
        assert_eq!(lun.backing_file().unwrap(), None);

        lun.set_backing_file(Path::new("/mnt/imgstore/game.iso"))
            .unwrap();
        assert_eq!(
            lun.backing_file().unwrap(),
            Some(PathBuf::from("/mnt/imgstore/game.iso"))
        );

        lun.force_eject().unwrap();
        assert_eq!(lun.backing_file().unwrap(), None);
    }

    #[test]
    fn test_forced_eject_attribute_preferred() {
        let (_dir, lun) = lun_tree();
        fs::write(lun.lun_path().join("forced_eject"), "").unwrap();

        lun.force_eject().unwrap();
        assert_eq!(
            fs::read_to_string(lun.lun_path().join("forced_eject")).unwrap(),
            "1\n"
        );
    }

    #[test]
    fn test_missing_lun_refuses_mount() {
        let dir = TempDir::new().unwrap();
        let lun = MsdLun::new(dir.path());
        assert!(!lun.exists());
        assert!(matches!(
            lun.set_backing_file(Path::new("/dev/mmcblk0p3")),
            Err(AppError::GadgetNotEnabled)
        ));
        assert!(lun.force_eject().is_ok());
        assert!(lun.cdrom_flag().is_err());
    }
}
