//! In-memory gadget helper for tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::helper::{GadgetHelper, GadgetKind};
use crate::error::{AppError, Result};

#[derive(Debug, Default)]
struct FakeGadget {
    configured: Option<GadgetKind>,
    bound: bool,
    backing_file: Option<PathBuf>,
}

/// Records every mutating call and simulates the gadget state
#[derive(Default)]
pub struct FakeHelper {
    gadget: Mutex<FakeGadget>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<&'static str>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
    cdrom_override: Mutex<Option<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeHelper {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gadget already bound in `kind` with `backing_file`
    pub fn running(kind: GadgetKind, backing_file: Option<&Path>) -> Self {
        let helper = Self::new();
        {
            let mut gadget = helper.gadget.lock();
            gadget.configured = Some(kind);
            gadget.bound = true;
            gadget.backing_file = backing_file.map(Path::to_path_buf);
        }
        helper
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn fail_on(&self, op: &'static str) {
        self.failing.lock().insert(op);
    }

    pub fn recover(&self, op: &'static str) {
        self.failing.lock().remove(op);
    }

    pub fn delay(&self, op: &'static str, duration: Duration) {
        self.delays.lock().insert(op, duration);
    }

    pub fn set_cdrom_flag(&self, value: &str) {
        *self.cdrom_override.lock() = Some(value.to_string());
    }

    /// Highest number of mutating calls seen running at once
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn backing_file(&self) -> Option<PathBuf> {
        self.gadget.lock().backing_file.clone()
    }

    async fn enter(&self, op: &'static str, call: String) -> Result<()> {
        self.calls.lock().push(call);

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let delay = self.delays.lock().get(op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().contains(op) {
            return Err(AppError::helper(op, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl GadgetHelper for FakeHelper {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn apply_configuration(&self, kind: GadgetKind) -> Result<()> {
        self.enter("apply_configuration", format!("apply_configuration({:?})", kind))
            .await?;
        let mut gadget = self.gadget.lock();
        gadget.configured = Some(kind);
        gadget.backing_file = None;
        Ok(())
    }

    async fn enable_gadget(&self) -> Result<()> {
        self.enter("enable_gadget", "enable_gadget".to_string())
            .await?;
        let mut gadget = self.gadget.lock();
        if gadget.configured.is_none() {
            return Err(AppError::helper("enable_gadget", "no configuration"));
        }
        gadget.bound = true;
        Ok(())
    }

    async fn disable_gadget(&self) -> Result<()> {
        self.enter("disable_gadget", "disable_gadget".to_string())
            .await?;
        self.gadget.lock().bound = false;
        Ok(())
    }

    async fn force_eject(&self) -> Result<()> {
        self.enter("force_eject", "force_eject".to_string()).await?;
        self.gadget.lock().backing_file = None;
        Ok(())
    }

    async fn cleanup_configuration(&self) -> Result<()> {
        self.enter("cleanup_configuration", "cleanup_configuration".to_string())
            .await?;
        *self.gadget.lock() = FakeGadget::default();
        Ok(())
    }

    async fn read_binding_presence(&self) -> Result<bool> {
        if self.failing.lock().contains("read_binding_presence") {
            return Err(AppError::helper("read_binding_presence", "injected failure"));
        }
        Ok(self.gadget.lock().bound)
    }

    async fn read_cdrom_flag(&self) -> Result<String> {
        if let Some(value) = self.cdrom_override.lock().clone() {
            return Ok(value);
        }
        match self.gadget.lock().configured {
            Some(kind) if kind.is_cdrom() => Ok("1".to_string()),
            Some(_) => Ok("0".to_string()),
            None => Err(AppError::helper("read_cdrom_flag", "no LUN")),
        }
    }

    async fn set_backing_file(&self, path: &Path) -> Result<()> {
        self.enter(
            "set_backing_file",
            format!("set_backing_file({})", path.display()),
        )
        .await?;
        let mut gadget = self.gadget.lock();
        if gadget.configured.is_none() {
            return Err(AppError::GadgetNotEnabled);
        }
        gadget.backing_file = Some(path.to_path_buf());
        Ok(())
    }

    async fn get_backing_file(&self) -> Result<Option<PathBuf>> {
        Ok(self.gadget.lock().backing_file.clone())
    }

    async fn sync_filesystems(&self) -> Result<()> {
        self.enter("sync_filesystems", "sync_filesystems".to_string())
            .await
    }

    async fn unload_kernel_modules(&self) -> Result<()> {
        for module in super::helper::KERNEL_MODULES_UNLOAD_ORDER {
            self.enter("unload_kernel_modules", format!("rmmod({})", module))
                .await?;
        }
        Ok(())
    }
}
