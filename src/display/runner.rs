//! Input and refresh loop for one status display

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{MenuAction, MenuState, Screen, StatusDisplay, UserRequest};
use crate::config::DisplayConfig;
use crate::controller::GadgetController;
use crate::events::UpdateFlag;
use crate::system::ExitRequest;
use crate::utils::LogThrottler;
use crate::warn_throttled;

/// Drives one [`StatusDisplay`]
///
/// Re-renders when the controller reports a change, after local menu
/// input, and unconditionally every `refresh_interval`.
pub struct DisplayRunner {
    display: Box<dyn StatusDisplay>,
    controller: Arc<GadgetController>,
    exit_tx: broadcast::Sender<ExitRequest>,
    flag: Arc<UpdateFlag>,
    menu: MenuState,
    poll_interval: Duration,
    refresh_interval: Duration,
    throttler: LogThrottler,
}

impl DisplayRunner {
    pub fn new(
        display: Box<dyn StatusDisplay>,
        controller: Arc<GadgetController>,
        exit_tx: broadcast::Sender<ExitRequest>,
        config: &DisplayConfig,
    ) -> Self {
        let flag = controller.updates().subscribe();
        Self {
            display,
            controller,
            exit_tx,
            flag,
            menu: MenuState::new(),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            refresh_interval: Duration::from_secs(config.refresh_interval_secs.max(1)),
            throttler: LogThrottler::default(),
        }
    }

    /// Run until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Display runner started ({})", self.display.name());
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_render: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let mut redraw = false;
            match self.display.poll_input().await {
                Ok(Some(request)) => {
                    self.handle(request).await;
                    redraw = true;
                }
                Ok(None) => {}
                Err(e) => warn_throttled!(
                    self.throttler,
                    "input",
                    "Display {} input failed: {}",
                    self.display.name(),
                    e
                ),
            }

            let stale = last_render
                .map(|at| at.elapsed() >= self.refresh_interval)
                .unwrap_or(true);
            if self.flag.consume_if_dirty() || redraw || stale {
                self.render().await;
                last_render = Some(Instant::now());
            }
        }

        self.controller.updates().unsubscribe(&self.flag);
        info!("Display runner stopped ({})", self.display.name());
    }

    async fn handle(&mut self, request: UserRequest) {
        debug!("Display request: {:?}", request);
        let controller = self.controller.clone();
        let action = self.menu.handle(request, || controller.catalog().list());

        match action {
            MenuAction::None => {}
            MenuAction::Mount(name) => {
                if let Err(e) = self.controller.mount_catalog_image(&name).await {
                    warn!("Mount of {} from display failed: {}", name, e);
                }
            }
            MenuAction::ToggleMode => {
                if let Err(e) = self.controller.toggle_mode().await {
                    warn!("Mode switch from display failed: {}", e);
                }
            }
            MenuAction::Shutdown => {
                info!("Shutdown requested from display");
                let _ = self.exit_tx.send(ExitRequest::PowerOff);
            }
        }
    }

    async fn render(&mut self) {
        let screen = Screen {
            status: self.controller.status().await,
            view: self.menu.view().clone(),
        };
        if let Err(e) = self.display.refresh(&screen).await {
            warn_throttled!(
                self.throttler,
                "refresh",
                "Display {} refresh failed: {}",
                self.display.name(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ControllerConfig, GadgetMode};
    use crate::error::Result;
    use crate::events::UpdateBus;
    use crate::gadget::fake::FakeHelper;
    use crate::gadget::GadgetKind;
    use crate::storage::{ImageCatalog, MountStateStore};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::fs;
    use tempfile::TempDir;

    struct ScriptedDisplay {
        inputs: VecDeque<UserRequest>,
        screens: Arc<Mutex<Vec<Screen>>>,
    }

    #[async_trait]
    impl StatusDisplay for ScriptedDisplay {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn refresh(&mut self, screen: &Screen) -> Result<()> {
            self.screens.lock().push(screen.clone());
            Ok(())
        }

        async fn poll_input(&mut self) -> Result<Option<UserRequest>> {
            Ok(self.inputs.pop_front())
        }
    }

    fn controller(dir: &TempDir, helper: Arc<FakeHelper>) -> Arc<GadgetController> {
        let store = dir.path().join("imgstore");
        fs::create_dir_all(&store).unwrap();
        for image in ["Banjo.iso", "Zelda.iso"] {
            fs::write(store.join(image), b"").unwrap();
        }
        Arc::new(GadgetController::new(
            helper,
            ImageCatalog::new(&store),
            MountStateStore::new(dir.path().join("usbode-iso.txt")),
            UpdateBus::new(),
            ControllerConfig {
                store_device: dir.path().join("mmcblk0p3"),
                helper_timeout: Duration::from_secs(5),
            },
        ))
    }

    async fn run_script(
        inputs: &[UserRequest],
        controller: Arc<GadgetController>,
        exit_tx: broadcast::Sender<ExitRequest>,
    ) -> Vec<Screen> {
        let screens = Arc::new(Mutex::new(Vec::new()));
        let display = ScriptedDisplay {
            inputs: inputs.iter().copied().collect(),
            screens: screens.clone(),
        };
        let config = DisplayConfig {
            poll_interval_ms: 5,
            ..Default::default()
        };
        let runner = DisplayRunner::new(Box::new(display), controller, exit_tx, &config);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(runner.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        task.await.unwrap();

        let screens = screens.lock().clone();
        screens
    }

    #[tokio::test]
    async fn test_menu_mounts_selected_image() {
        let dir = TempDir::new().unwrap();
        let helper = Arc::new(FakeHelper::running(GadgetKind::MassStorage, None));
        let controller = controller(&dir, helper.clone());
        let (exit_tx, _exit_rx) = broadcast::channel(4);

        let screens = run_script(
            &[UserRequest::ShowImages, UserRequest::Down, UserRequest::Select],
            controller.clone(),
            exit_tx,
        )
        .await;

        assert_eq!(
            helper.backing_file(),
            Some(dir.path().join("imgstore/Zelda.iso"))
        );
        assert_eq!(
            controller.probe_mode().await,
            GadgetMode::OpticalEmulation
        );
        let last = screens.last().unwrap();
        assert_eq!(last.status.mode, GadgetMode::OpticalEmulation);
    }

    #[tokio::test]
    async fn test_shutdown_request_reaches_main() {
        let dir = TempDir::new().unwrap();
        let helper = Arc::new(FakeHelper::running(GadgetKind::MassStorage, None));
        let (exit_tx, mut exit_rx) = broadcast::channel(4);

        run_script(
            &[UserRequest::Shutdown],
            controller(&dir, helper),
            exit_tx,
        )
        .await;
        assert_eq!(exit_rx.try_recv().unwrap(), ExitRequest::PowerOff);
    }

    #[tokio::test]
    async fn test_renders_on_start() {
        let dir = TempDir::new().unwrap();
        let helper = Arc::new(FakeHelper::running(GadgetKind::MassStorage, None));
        let (exit_tx, _exit_rx) = broadcast::channel(4);

        let screens = run_script(&[], controller(&dir, helper), exit_tx).await;
        assert!(!screens.is_empty());
        assert_eq!(screens[0].status.mode, GadgetMode::MassStorage);
        assert_eq!(screens[0].status.image_count, 2);
    }
}
