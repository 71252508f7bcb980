//! The narrow interface the mode controller drives the gadget through

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Kernel modules unloaded on shutdown, in this order
///
/// `usb_f_mass_storage` holds a reference on `libcomposite`, so the
/// framework can only go after the function driver.
pub const KERNEL_MODULES_UNLOAD_ORDER: [&str; 2] = ["usb_f_mass_storage", "libcomposite"];

/// Gadget personality a configuration is applied for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GadgetKind {
    /// Read-only CD-ROM serving a disk image
    OpticalEmulation,
    /// Writable disk exposing the image store partition
    MassStorage,
}

impl GadgetKind {
    pub fn is_cdrom(self) -> bool {
        matches!(self, Self::OpticalEmulation)
    }

    /// USB product string presented to the host
    pub fn product_name(self) -> &'static str {
        match self {
            Self::OpticalEmulation => "USBODE CD-ROM Emulator",
            Self::MassStorage => "USBODE Mass Storage",
        }
    }
}

impl fmt::Display for GadgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpticalEmulation => write!(f, "optical emulation"),
            Self::MassStorage => write!(f, "mass storage"),
        }
    }
}

/// Operations on the USB gadget and its raw state
///
/// Implementations do the hardware work; every policy decision (which
/// mode, which image, when) belongs to the caller.
#[async_trait]
pub trait GadgetHelper: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Build the gadget for `kind`. The gadget is left unbound.
    async fn apply_configuration(&self, kind: GadgetKind) -> Result<()>;

    /// Bind the gadget to the device controller
    async fn enable_gadget(&self) -> Result<()>;

    /// Unbind the gadget; succeeds when already unbound
    async fn disable_gadget(&self) -> Result<()>;

    /// Detach the backing file even if the host holds the medium
    async fn force_eject(&self) -> Result<()>;

    /// Remove any gadget configuration; succeeds when there is none
    async fn cleanup_configuration(&self) -> Result<()>;

    /// Whether the gadget is bound to a device controller
    async fn read_binding_presence(&self) -> Result<bool>;

    /// Raw LUN `cdrom` attribute, normally "0" or "1"
    async fn read_cdrom_flag(&self) -> Result<String>;

    async fn set_backing_file(&self, path: &Path) -> Result<()>;

    async fn get_backing_file(&self) -> Result<Option<PathBuf>>;

    /// Flush pending filesystem writes before the host loses write access
    async fn sync_filesystems(&self) -> Result<()>;

    /// Unload [`KERNEL_MODULES_UNLOAD_ORDER`]
    async fn unload_kernel_modules(&self) -> Result<()>;
}
