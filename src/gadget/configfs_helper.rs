//! Native gadget helper writing configfs directly

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::helper::{GadgetHelper, GadgetKind, KERNEL_MODULES_UNLOAD_ORDER};
use super::tree::GadgetTree;
use crate::config::GadgetConfig;
use crate::error::{AppError, Result};
use crate::utils::run_command;

const SYS_MODULE_PATH: &str = "/sys/module";

/// [`GadgetHelper`] backed by [`GadgetTree`]
///
/// configfs writes block (the kernel waits on the UDC), so each call runs
/// on the blocking pool. A caller's timeout cannot stop a step that is
/// already running there, so steps take `step_lock` and never overlap.
pub struct ConfigfsHelper {
    tree: GadgetTree,
    command_timeout: Duration,
    step_lock: Arc<Mutex<()>>,
}

impl ConfigfsHelper {
    pub fn new(config: &GadgetConfig) -> Self {
        Self {
            tree: GadgetTree::new(config),
            command_timeout: config.helper_timeout(),
            step_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn blocking<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&GadgetTree) -> Result<T> + Send + 'static,
    {
        let tree = self.tree.clone();
        let step_lock = self.step_lock.clone();
        tokio::task::spawn_blocking(move || {
            let _step = step_lock.lock();
            f(&tree)
        })
            .await
            .map_err(|e| AppError::helper(op, format!("Task join error: {}", e)))?
            .map_err(|e| match e {
                AppError::GadgetNotEnabled => e,
                other => AppError::helper(op, other.to_string()),
            })
    }
}

#[async_trait]
impl GadgetHelper for ConfigfsHelper {
    fn name(&self) -> &'static str {
        "configfs"
    }

    async fn apply_configuration(&self, kind: GadgetKind) -> Result<()> {
        self.blocking("apply_configuration", move |tree| tree.apply(kind))
            .await
    }

    async fn enable_gadget(&self) -> Result<()> {
        self.blocking("enable_gadget", |tree| tree.bind()).await
    }

    async fn disable_gadget(&self) -> Result<()> {
        self.blocking("disable_gadget", |tree| tree.unbind()).await
    }

    async fn force_eject(&self) -> Result<()> {
        self.blocking("force_eject", |tree| tree.lun().force_eject())
            .await
    }

    async fn cleanup_configuration(&self) -> Result<()> {
        self.blocking("cleanup_configuration", |tree| tree.cleanup())
            .await
    }

    async fn read_binding_presence(&self) -> Result<bool> {
        self.blocking("read_binding_presence", |tree| tree.is_bound())
            .await
    }

    async fn read_cdrom_flag(&self) -> Result<String> {
        self.blocking("read_cdrom_flag", |tree| tree.lun().cdrom_flag())
            .await
    }

    async fn set_backing_file(&self, path: &Path) -> Result<()> {
        let path = path.to_path_buf();
        self.blocking("set_backing_file", move |tree| {
            tree.lun().set_backing_file(&path)
        })
        .await
    }

    async fn get_backing_file(&self) -> Result<Option<PathBuf>> {
        self.blocking("get_backing_file", |tree| {
            if tree.lun().exists() {
                tree.lun().backing_file()
            } else {
                Ok(None)
            }
        })
        .await
    }

    async fn sync_filesystems(&self) -> Result<()> {
        self.blocking("sync_filesystems", |_| {
            nix::unistd::sync();
            Ok(())
        })
        .await
    }

    async fn unload_kernel_modules(&self) -> Result<()> {
        for module in KERNEL_MODULES_UNLOAD_ORDER {
            if !Path::new(SYS_MODULE_PATH).join(module).exists() {
                debug!("Module {} not loaded", module);
                continue;
            }
            run_command("rmmod", &[module], None, self.command_timeout)
                .await
                .map_err(|e| AppError::helper("unload_kernel_modules", e.to_string()))?;
            info!("Unloaded kernel module {}", module);
        }
        Ok(())
    }
}
