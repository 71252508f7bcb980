//! Gadget mode controller
//!
//! Every trigger (button, menu, web, console) ends up here. Mutating
//! operations hold one async lock for their whole probe → helper → update
//! sequence, so two mode switches never interleave their helper calls.
//! Each such operation runs on its own task: a caller that goes away (a
//! closed browser tab) detaches from it, and the switch still completes.
//! The controller keeps no mode of its own: the gadget is probed each time.

use chrono::Utc;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::types::{GadgetMode, GadgetStatus};
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::events::UpdateBus;
use crate::gadget::{GadgetHelper, GadgetKind};
use crate::storage::{has_image_extension, ImageCatalog, MountStateStore};
use crate::utils::LogThrottler;
use crate::warn_throttled;

/// Controller settings
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Block device bound in mass-storage mode
    pub store_device: PathBuf,
    /// Upper bound for one helper call
    pub helper_timeout: Duration,
}

impl ControllerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            store_device: PathBuf::from(&config.storage.store_device),
            helper_timeout: config.gadget.helper_timeout(),
        }
    }
}

/// Gadget mode state machine
pub struct GadgetController {
    helper: Arc<dyn GadgetHelper>,
    catalog: ImageCatalog,
    mount_state: MountStateStore,
    updates: UpdateBus,
    config: ControllerConfig,
    /// Serializes mutating operations
    operation_lock: Mutex<()>,
    probe_throttler: LogThrottler,
}

impl GadgetController {
    pub fn new(
        helper: Arc<dyn GadgetHelper>,
        catalog: ImageCatalog,
        mount_state: MountStateStore,
        updates: UpdateBus,
        config: ControllerConfig,
    ) -> Self {
        Self {
            helper,
            catalog,
            mount_state,
            updates,
            config,
            operation_lock: Mutex::new(()),
            probe_throttler: LogThrottler::default(),
        }
    }

    pub fn catalog(&self) -> &ImageCatalog {
        &self.catalog
    }

    pub fn updates(&self) -> &UpdateBus {
        &self.updates
    }

    /// Derive the current mode from the gadget
    ///
    /// Never fails: anything unreadable or unexpected probes as `Disabled`.
    pub async fn probe_mode(&self) -> GadgetMode {
        let bound = match self
            .bounded("read_binding_presence", self.helper.read_binding_presence())
            .await
        {
            Ok(bound) => {
                self.probe_throttler.clear("binding");
                bound
            }
            Err(e) => {
                warn_throttled!(
                    self.probe_throttler,
                    "binding",
                    "Could not read UDC binding: {}",
                    e
                );
                return GadgetMode::Disabled;
            }
        };
        if !bound {
            return GadgetMode::Disabled;
        }

        match self
            .bounded("read_cdrom_flag", self.helper.read_cdrom_flag())
            .await
        {
            Ok(flag) => match flag.as_str() {
                "1" => {
                    self.probe_throttler.clear("cdrom_flag");
                    GadgetMode::OpticalEmulation
                }
                "0" => {
                    self.probe_throttler.clear("cdrom_flag");
                    GadgetMode::MassStorage
                }
                other => {
                    warn_throttled!(
                        self.probe_throttler,
                        "cdrom_flag",
                        "Unexpected LUN cdrom flag {:?}, treating gadget as disabled",
                        other
                    );
                    GadgetMode::Disabled
                }
            },
            Err(e) => {
                warn_throttled!(
                    self.probe_throttler,
                    "cdrom_flag",
                    "Could not read LUN cdrom flag: {}",
                    e
                );
                GadgetMode::Disabled
            }
        }
    }

    /// Snapshot for front ends; does not wait for running operations
    pub async fn status(&self) -> GadgetStatus {
        let mode = self.probe_mode().await;
        let mounted_image = if mode.is_enabled() {
            self.bounded("get_backing_file", self.helper.get_backing_file())
                .await
                .unwrap_or_else(|e| {
                    debug!("Could not read backing file: {}", e);
                    None
                })
        } else {
            None
        };

        GadgetStatus {
            mode,
            mounted_image,
            persisted_image: self.mount_state.load(),
            image_count: self.catalog.list().len(),
            updated_at: Utc::now(),
        }
    }

    /// Bring the gadget up at startup
    ///
    /// Restores optical emulation when the persisted image still exists,
    /// otherwise starts in mass-storage mode.
    pub async fn initialize(self: &Arc<Self>) -> Result<GadgetMode> {
        self.run_detached(|this| async move { this.initialize_locked().await })
            .await
    }

    /// Switch between optical emulation and mass storage
    ///
    /// Returns the mode probed after the switch. Refuses to leave mass
    /// storage while the catalog is empty.
    pub async fn toggle_mode(self: &Arc<Self>) -> Result<GadgetMode> {
        self.run_detached(|this| async move {
            let _guard = this.operation_lock.lock().await;
            let current = this.probe_mode().await;
            this.toggle_locked(current).await
        })
        .await
    }

    /// Bind `path` (an image or the store device) as backing file
    ///
    /// Binding an image while in mass-storage mode switches to optical
    /// emulation.
    pub async fn change_mounted_image(self: &Arc<Self>, path: &Path) -> Result<GadgetMode> {
        let path = path.to_path_buf();
        self.run_detached(|this| async move { this.change_mounted_image_locked(&path).await })
            .await
    }

    /// Mount a catalog entry by file name
    pub async fn mount_catalog_image(self: &Arc<Self>, name: &str) -> Result<GadgetMode> {
        let path = self.catalog.resolve(name)?;
        self.change_mounted_image(&path).await
    }

    /// Take the gadget down and unload its kernel modules
    ///
    /// Every step is attempted; the first failure is returned.
    pub async fn shutdown(self: &Arc<Self>) -> Result<()> {
        self.run_detached(|this| async move { this.shutdown_locked().await })
            .await
    }

    /// Run a mutating operation on its own task
    ///
    /// Dropping the returned future detaches from the task without
    /// cancelling it.
    async fn run_detached<T, F, Fut>(self: &Arc<Self>, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Self>) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        tokio::spawn(op(self.clone()))
            .await
            .map_err(|e| AppError::Internal(format!("Gadget operation task failed: {}", e)))?
    }

    async fn initialize_locked(&self) -> Result<GadgetMode> {
        let _guard = self.operation_lock.lock().await;
        info!("Initializing gadget with {} helper", self.helper.name());

        match self.mount_state.load() {
            Some(image) if image.exists() => {
                info!("Restoring optical emulation of {}", image.display());
                self.bring_up_optical().await?;
            }
            Some(image) => {
                warn!(
                    "Persisted image {} no longer exists, starting in mass storage mode",
                    image.display()
                );
                self.bring_up_mass_storage().await?;
            }
            None => {
                info!("No persisted image, starting in mass storage mode");
                self.bring_up_mass_storage().await?;
            }
        }

        self.updates.mark_dirty();
        Ok(self.probe_mode().await)
    }

    async fn change_mounted_image_locked(&self, path: &Path) -> Result<GadgetMode> {
        let _guard = self.operation_lock.lock().await;

        let mode = self.probe_mode().await;
        if !mode.is_enabled() {
            warn!("Gadget is not enabled, cannot mount {}", path.display());
            return Err(AppError::GadgetNotEnabled);
        }
        if !path.exists() {
            return Err(AppError::NotFound(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let is_image = has_image_extension(path);

        // Binding an image to the writable LUN with no way to switch to
        // optical would hand it to the host read-write
        if mode == GadgetMode::MassStorage && is_image && self.catalog.is_empty() {
            info!("No images in the store, not mounting {}", path.display());
            return Err(AppError::Refused(
                "No images found, staying in mass storage mode".to_string(),
            ));
        }

        if mode == GadgetMode::OpticalEmulation {
            let current = self
                .bounded("get_backing_file", self.helper.get_backing_file())
                .await
                .unwrap_or(None);
            // The host caches the TOC of the old disc until it sees a disconnect
            if current.as_deref() != Some(path) {
                self.call("force_eject", self.helper.force_eject()).await?;
            }
        }

        if is_image {
            if let Err(e) = self.mount_state.save(path) {
                warn!("Could not persist mount selection: {}", e);
            }
        }

        self.call("set_backing_file", self.helper.set_backing_file(path))
            .await?;
        info!("Mounted {}", path.display());
        self.updates.mark_dirty();

        if mode == GadgetMode::MassStorage && is_image {
            info!("Image mounted in mass storage mode, switching to optical emulation");
            return self.toggle_locked(mode).await;
        }
        Ok(self.probe_mode().await)
    }

    async fn shutdown_locked(&self) -> Result<()> {
        let _guard = self.operation_lock.lock().await;
        info!("Shutting down gadget");

        let steps = [
            self.call("disable_gadget", self.helper.disable_gadget()).await,
            self.call("cleanup_configuration", self.helper.cleanup_configuration())
                .await,
            self.call("unload_kernel_modules", self.helper.unload_kernel_modules())
                .await,
        ];
        self.updates.mark_dirty();

        steps.into_iter().collect::<Result<Vec<()>>>().map(|_| ())
    }

    async fn toggle_locked(&self, current: GadgetMode) -> Result<GadgetMode> {
        match current {
            GadgetMode::Disabled | GadgetMode::OpticalEmulation => {
                info!("Switching from {} to mass storage", current);
                self.call("disable_gadget", self.helper.disable_gadget())
                    .await?;
                self.bring_up_mass_storage().await?;
            }
            GadgetMode::MassStorage => {
                if self.catalog.is_empty() {
                    info!("No images in the store, staying in mass storage mode");
                    return Err(AppError::Refused(
                        "No images found, staying in mass storage mode".to_string(),
                    ));
                }
                info!("Switching from mass storage to optical emulation");
                self.call("sync_filesystems", self.helper.sync_filesystems())
                    .await?;
                self.call("disable_gadget", self.helper.disable_gadget())
                    .await?;
                self.bring_up_optical().await?;
            }
        }

        self.updates.mark_dirty();
        let mode = self.probe_mode().await;
        info!("Gadget mode is now {}", mode);
        Ok(mode)
    }

    async fn bring_up_mass_storage(&self) -> Result<()> {
        self.call(
            "cleanup_configuration",
            self.helper.cleanup_configuration(),
        )
        .await?;
        self.call(
            "apply_configuration",
            self.helper.apply_configuration(GadgetKind::MassStorage),
        )
        .await?;
        self.call(
            "set_backing_file",
            self.helper.set_backing_file(&self.config.store_device),
        )
        .await?;
        self.call("enable_gadget", self.helper.enable_gadget())
            .await
    }

    /// Optical emulation of the persisted image, or mass storage if it is gone
    async fn bring_up_optical(&self) -> Result<()> {
        self.call(
            "cleanup_configuration",
            self.helper.cleanup_configuration(),
        )
        .await?;
        self.call(
            "apply_configuration",
            self.helper.apply_configuration(GadgetKind::OpticalEmulation),
        )
        .await?;

        let image = match self.mount_state.load() {
            Some(image) if image.exists() => image,
            other => {
                warn!(
                    "Image to load {:?} does not exist, falling back to mass storage",
                    other
                );
                return self.bring_up_mass_storage().await;
            }
        };

        self.call("set_backing_file", self.helper.set_backing_file(&image))
            .await?;
        self.call("enable_gadget", self.helper.enable_gadget())
            .await
    }

    /// Helper call bounded by the configured timeout
    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.helper_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::HelperTimeout {
                op,
                timeout_ms: self.config.helper_timeout.as_millis() as u64,
            }),
        }
    }

    /// Bounded helper call, logging failures
    async fn call<T>(&self, op: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        self.bounded(op, fut).await.map_err(|e| {
            warn!("Gadget helper step {} failed: {}", op, e);
            e
        })
    }
}
