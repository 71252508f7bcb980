//! Gadget helper driving the install's shell scripts
//!
//! Each script receives the gadget directory as its only argument and runs
//! from the install directory. State reads and backing-file changes go
//! straight to configfs, which is what the scripts write anyway.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::configfs_helper::ConfigfsHelper;
use super::helper::{GadgetHelper, GadgetKind};
use crate::config::GadgetConfig;
use crate::error::{AppError, Result};
use crate::utils::run_command;

pub const CLEANUP_SCRIPT: &str = "cleanup_mode.sh";
pub const OPTICAL_SETUP_SCRIPT: &str = "cd_gadget_setup.sh";
pub const MASS_STORAGE_SETUP_SCRIPT: &str = "exfat_gadget_setup.sh";
pub const ENABLE_SCRIPT: &str = "enablegadget.sh";
pub const DISABLE_SCRIPT: &str = "disablegadget.sh";

pub struct ScriptHelper {
    install_dir: PathBuf,
    scripts_dir: String,
    gadget_path: String,
    timeout: Duration,
    native: ConfigfsHelper,
}

impl ScriptHelper {
    pub fn new(config: &GadgetConfig) -> Self {
        Self {
            install_dir: PathBuf::from(&config.install_dir),
            scripts_dir: config.scripts_dir.clone(),
            gadget_path: config.gadget_path().display().to_string(),
            timeout: config.helper_timeout(),
            native: ConfigfsHelper::new(config),
        }
    }

    async fn run_script(&self, op: &'static str, script: &str) -> Result<()> {
        let script_path = format!("{}/{}", self.scripts_dir, script);
        let output = run_command(
            "sh",
            &[script_path.as_str(), self.gadget_path.as_str()],
            Some(&self.install_dir),
            self.timeout,
        )
        .await
        .map_err(|e| {
            warn!("{} failed: {}", script, e);
            AppError::helper(op, e.to_string())
        })?;

        let diagnostics = output.combined();
        if diagnostics.is_empty() {
            info!("{} completed", script);
        } else {
            info!("{} completed: {}", script, diagnostics);
        }
        Ok(())
    }
}

#[async_trait]
impl GadgetHelper for ScriptHelper {
    fn name(&self) -> &'static str {
        "scripts"
    }

    async fn apply_configuration(&self, kind: GadgetKind) -> Result<()> {
        let script = match kind {
            GadgetKind::OpticalEmulation => OPTICAL_SETUP_SCRIPT,
            GadgetKind::MassStorage => MASS_STORAGE_SETUP_SCRIPT,
        };
        self.run_script("apply_configuration", script).await
    }

    async fn enable_gadget(&self) -> Result<()> {
        self.run_script("enable_gadget", ENABLE_SCRIPT).await
    }

    async fn disable_gadget(&self) -> Result<()> {
        // disablegadget.sh fails on an unbound gadget
        if !self.native.read_binding_presence().await? {
            return Ok(());
        }
        self.run_script("disable_gadget", DISABLE_SCRIPT).await
    }

    async fn force_eject(&self) -> Result<()> {
        self.native.force_eject().await
    }

    async fn cleanup_configuration(&self) -> Result<()> {
        self.run_script("cleanup_configuration", CLEANUP_SCRIPT)
            .await
    }

    async fn read_binding_presence(&self) -> Result<bool> {
        self.native.read_binding_presence().await
    }

    async fn read_cdrom_flag(&self) -> Result<String> {
        self.native.read_cdrom_flag().await
    }

    async fn set_backing_file(&self, path: &Path) -> Result<()> {
        self.native.set_backing_file(path).await
    }

    async fn get_backing_file(&self) -> Result<Option<PathBuf>> {
        self.native.get_backing_file().await
    }

    async fn sync_filesystems(&self) -> Result<()> {
        self.native.sync_filesystems().await
    }

    async fn unload_kernel_modules(&self) -> Result<()> {
        self.native.unload_kernel_modules().await
    }
}
