//! Gadget directory tree in configfs: descriptors, configuration, binding

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::configfs::{
    create_dir, create_symlink, find_udc, read_file, remove_dir, remove_file, write_file,
    CONFIG_NAME, LANG_EN_US, USB_BCD_DEVICE, USB_BCD_USB,
};
use super::helper::GadgetKind;
use super::lun::{MsdLun, MSD_INSTANCE};
use crate::config::GadgetConfig;
use crate::error::{AppError, Result};

const REBIND_DELAY_MS: u64 = 300;

/// USB device descriptor values
#[derive(Debug, Clone)]
pub struct GadgetDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: String,
    pub serial_number: String,
}

impl From<&GadgetConfig> for GadgetDescriptor {
    fn from(config: &GadgetConfig) -> Self {
        Self {
            vendor_id: config.vendor_id,
            product_id: config.product_id,
            manufacturer: config.manufacturer.clone(),
            serial_number: config.serial_number.clone(),
        }
    }
}

/// The `usb_gadget/<name>` directory and everything under it
#[derive(Debug, Clone)]
pub struct GadgetTree {
    gadget_path: PathBuf,
    config_path: PathBuf,
    udc_class_path: PathBuf,
    preferred_udc: Option<String>,
    descriptor: GadgetDescriptor,
    lun: MsdLun,
}

impl GadgetTree {
    pub fn new(config: &GadgetConfig) -> Self {
        let gadget_path = config.gadget_path();
        Self {
            config_path: gadget_path.join("configs").join(CONFIG_NAME),
            udc_class_path: PathBuf::from(&config.udc_class_path),
            preferred_udc: config.udc.clone(),
            descriptor: GadgetDescriptor::from(config),
            lun: MsdLun::new(&gadget_path),
            gadget_path,
        }
    }

    pub fn gadget_path(&self) -> &Path {
        &self.gadget_path
    }

    pub fn lun(&self) -> &MsdLun {
        &self.lun
    }

    pub fn exists(&self) -> bool {
        self.gadget_path.exists()
    }

    /// Whether a UDC name is written to `UDC`
    ///
    /// A missing gadget reads as unbound; other read failures are errors.
    pub fn is_bound(&self) -> Result<bool> {
        let udc_file = self.gadget_path.join("UDC");
        if !udc_file.exists() {
            return Ok(false);
        }
        Ok(!read_file(&udc_file)?.is_empty())
    }

    /// Create (or update) the gadget for `kind` and configure its LUN
    ///
    /// Must be called while unbound.
    pub fn apply(&self, kind: GadgetKind) -> Result<()> {
        info!("Applying {} configuration at {}", kind, self.gadget_path.display());

        create_dir(&self.gadget_path)?;
        self.set_device_descriptors()?;
        self.create_strings(kind)?;
        self.create_configuration(kind)?;
        self.create_function()?;
        self.lun.configure(kind)?;

        debug!("Gadget tree ready for {}", kind);
        Ok(())
    }

    /// Bind to the configured UDC, or the first available one
    pub fn bind(&self) -> Result<()> {
        if self.is_bound()? {
            debug!("Gadget already bound");
            return Ok(());
        }
        if !self.config_path.join(MSD_INSTANCE).exists() {
            return Err(AppError::Internal(
                "Gadget has no configuration to bind".to_string(),
            ));
        }

        let udc = find_udc(&self.udc_class_path, self.preferred_udc.as_deref()).ok_or_else(
            || AppError::Internal("No USB Device Controller (UDC) found".to_string()),
        )?;

        info!("Binding gadget to UDC: {}", udc);
        write_file(&self.gadget_path.join("UDC"), &udc)?;
        thread::sleep(Duration::from_millis(REBIND_DELAY_MS));
        Ok(())
    }

    /// Unbind from the UDC; a no-op when not bound
    pub fn unbind(&self) -> Result<()> {
        if self.is_bound()? {
            write_file(&self.gadget_path.join("UDC"), "")?;
            info!("Unbound gadget from UDC");
            thread::sleep(Duration::from_millis(REBIND_DELAY_MS));
        }
        Ok(())
    }

    /// Tear the whole tree down
    ///
    /// Safe to call on a partial or absent tree. Removal failures are logged
    /// and skipped so a stale leftover never blocks a fresh configuration.
    pub fn cleanup(&self) -> Result<()> {
        if !self.exists() {
            return Ok(());
        }
        info!("Cleaning up gadget {}", self.gadget_path.display());

        if let Err(e) = self.unbind() {
            warn!("Could not unbind gadget: {}", e);
        }
        let _ = self.lun.force_eject();

        let link = self.config_path.join(MSD_INSTANCE);
        if let Err(e) = remove_file(&link) {
            warn!("Could not remove config link: {}", e);
        }
        let _ = remove_dir(&self.config_path.join("strings").join(LANG_EN_US));
        let _ = remove_dir(&self.config_path);

        if let Err(e) = remove_dir(&self.lun.function_path()) {
            warn!("Could not remove mass storage function: {}", e);
        }

        let _ = remove_dir(&self.gadget_path.join("strings").join(LANG_EN_US));
        if let Err(e) = remove_dir(&self.gadget_path) {
            warn!("Could not remove gadget directory: {}", e);
        }
        Ok(())
    }

    fn set_device_descriptors(&self) -> Result<()> {
        write_file(
            &self.gadget_path.join("idVendor"),
            &format!("0x{:04x}", self.descriptor.vendor_id),
        )?;
        write_file(
            &self.gadget_path.join("idProduct"),
            &format!("0x{:04x}", self.descriptor.product_id),
        )?;
        write_file(
            &self.gadget_path.join("bcdDevice"),
            &format!("0x{:04x}", USB_BCD_DEVICE),
        )?;
        write_file(
            &self.gadget_path.join("bcdUSB"),
            &format!("0x{:04x}", USB_BCD_USB),
        )?;
        Ok(())
    }

    fn create_strings(&self, kind: GadgetKind) -> Result<()> {
        let strings_path = self.gadget_path.join("strings").join(LANG_EN_US);
        create_dir(&strings_path)?;

        write_file(
            &strings_path.join("serialnumber"),
            &self.descriptor.serial_number,
        )?;
        write_file(
            &strings_path.join("manufacturer"),
            &self.descriptor.manufacturer,
        )?;
        write_file(&strings_path.join("product"), kind.product_name())?;
        Ok(())
    }

    fn create_configuration(&self, kind: GadgetKind) -> Result<()> {
        let strings_path = self.config_path.join("strings").join(LANG_EN_US);
        create_dir(&strings_path)?;
        write_file(
            &strings_path.join("configuration"),
            &format!("Config 1: {}", kind.product_name()),
        )?;
        write_file(&self.config_path.join("MaxPower"), "250")?;
        Ok(())
    }

    fn create_function(&self) -> Result<()> {
        let func_path = self.lun.function_path();
        create_dir(&func_path)?;

        // Some hosts reset the device on a stalled bulk endpoint
        let stall = func_path.join("stall");
        if stall.exists() {
            let _ = write_file(&stall, "0");
        }
        create_dir(&self.lun.lun_path())?;

        let link = self.config_path.join(MSD_INSTANCE);
        if link.symlink_metadata().is_err() {
            create_symlink(&func_path, &link)?;
            debug!("Linked {} into {}", MSD_INSTANCE, CONFIG_NAME);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn test_tree(dir: &TempDir) -> GadgetTree {
        let udc = dir.path().join("udc");
        fs::create_dir_all(udc.join("fe980000.usb")).unwrap();
        let config = GadgetConfig {
            configfs_path: dir.path().join("usb_gadget").display().to_string(),
            udc_class_path: udc.display().to_string(),
            ..Default::default()
        };
        GadgetTree::new(&config)
    }

    #[test]
    fn test_apply_creates_tree() {
        let dir = TempDir::new().unwrap();
        let tree = test_tree(&dir);

        tree.apply(GadgetKind::OpticalEmulation).unwrap();
        let gadget = tree.gadget_path();
        assert_eq!(read_file(&gadget.join("idVendor")).unwrap(), "0x1d6b");
        assert_eq!(read_file(&gadget.join("idProduct")).unwrap(), "0x0104");
        assert_eq!(
            read_file(&gadget.join("strings/0x409/product")).unwrap(),
            GadgetKind::OpticalEmulation.product_name()
        );
        assert!(gadget
            .join("configs/c.1/mass_storage.usb0")
            .symlink_metadata()
            .is_ok());
        assert_eq!(tree.lun().cdrom_flag().unwrap(), "1");

        // Re-applying over an existing tree switches the personality
        tree.apply(GadgetKind::MassStorage).unwrap();
        assert_eq!(tree.lun().cdrom_flag().unwrap(), "0");
        assert_eq!(
            read_file(&gadget.join("strings/0x409/product")).unwrap(),
            GadgetKind::MassStorage.product_name()
        );
    }

    #[test]
    fn test_bind_and_unbind() {
        let dir = TempDir::new().unwrap();
        let tree = test_tree(&dir);
        assert!(!tree.is_bound().unwrap());

        // Nothing to bind before a configuration exists
        assert!(tree.bind().is_err());

        tree.apply(GadgetKind::MassStorage).unwrap();
        tree.bind().unwrap();
        assert!(tree.is_bound().unwrap());
        assert_eq!(
            read_file(&tree.gadget_path().join("UDC")).unwrap(),
            "fe980000.usb"
        );

        tree.unbind().unwrap();
        assert!(!tree.is_bound().unwrap());
        tree.unbind().unwrap();
    }

    #[test]
    fn test_cleanup_is_tolerant() {
        let dir = TempDir::new().unwrap();
        let tree = test_tree(&dir);
        tree.cleanup().unwrap();

        tree.apply(GadgetKind::MassStorage).unwrap();
        tree.cleanup().unwrap();
        assert!(!tree
            .gadget_path()
            .join("configs/c.1/mass_storage.usb0")
            .symlink_metadata()
            .is_ok());
    }
}
