//! Host-level actions: store mount, kernel framework, power off

use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::error::Result;
use crate::utils::run_command;

const PROC_MOUNTS: &str = "/proc/mounts";

/// How the process should end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitRequest {
    /// Tear the gadget down and exit
    Exit,
    /// Tear the gadget down, exit and power the host off
    PowerOff,
}

/// Whether `mount_point` appears in a `/proc/mounts` style table
pub fn is_mounted(mount_point: &Path, mounts_table: &str) -> bool {
    let wanted = mount_point.to_string_lossy();
    let wanted = wanted.trim_end_matches('/');
    mounts_table
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|target| target == wanted)
}

/// Mount the image store partition on its mount point
///
/// Skipped when something is already mounted there.
pub async fn mount_image_store(storage: &StorageConfig, timeout: Duration) -> Result<()> {
    let mount_point = Path::new(&storage.store_mount);
    let table = fs::read_to_string(PROC_MOUNTS).unwrap_or_default();
    if is_mounted(mount_point, &table) {
        debug!("{} already mounted", mount_point.display());
        return Ok(());
    }

    fs::create_dir_all(mount_point)?;
    info!(
        "Mounting image store {} on {}",
        storage.store_device,
        mount_point.display()
    );
    run_command(
        "mount",
        &[
            storage.store_device.as_str(),
            storage.store_mount.as_str(),
            "-o",
            "umask=000",
        ],
        None,
        timeout,
    )
    .await?;
    Ok(())
}

/// Load the USB composite gadget framework
pub async fn load_gadget_framework(timeout: Duration) -> Result<()> {
    run_command("modprobe", &["libcomposite"], None, timeout).await?;
    info!("Loaded libcomposite");
    Ok(())
}

/// Power the host off
pub async fn power_off(timeout: Duration) -> Result<()> {
    warn!("Powering off");
    run_command("shutdown", &["now"], None, timeout).await?;
    Ok(())
}
