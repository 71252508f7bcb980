//! Line console on stdin

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::controller::GadgetController;
use crate::system::ExitRequest;

const HELP: &[(&str, &str)] = &[
    ("help", "Displays this message"),
    ("version", "Displays version info"),
    ("exit", "Terminate USBODE"),
    ("shutdown", "Shuts down the device"),
    ("mode", "Get current mode"),
    ("list", "List images in the store"),
    ("switch", "Switch to the other mode (like the hardware button)"),
];

/// A parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    Version,
    Exit,
    Shutdown,
    Switch,
    Mode,
    List,
    Empty,
    Unknown(String),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        match line.split_whitespace().next() {
            None => Self::Empty,
            Some("help") => Self::Help,
            Some("version") => Self::Version,
            Some("exit") => Self::Exit,
            Some("shutdown") => Self::Shutdown,
            Some("switch") => Self::Switch,
            Some("mode") => Self::Mode,
            Some("list") => Self::List,
            Some(other) => Self::Unknown(other.to_string()),
        }
    }
}

/// Result of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleOutcome {
    /// Print and keep reading
    Continue(String),
    /// Print and ask main to stop
    Exit(ExitRequest, String),
}

pub fn help_text() -> String {
    HELP.iter()
        .map(|(cmd, text)| format!("{:<10}{}", cmd, text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn version_text() -> String {
    format!("USBODE version {}", env!("CARGO_PKG_VERSION"))
}

pub async fn execute(command: ConsoleCommand, controller: &Arc<GadgetController>) -> ConsoleOutcome {
    match command {
        ConsoleCommand::Help => ConsoleOutcome::Continue(help_text()),
        ConsoleCommand::Version => ConsoleOutcome::Continue(version_text()),
        ConsoleCommand::Exit => {
            ConsoleOutcome::Exit(ExitRequest::Exit, "Exiting USBODE...".to_string())
        }
        ConsoleCommand::Shutdown => ConsoleOutcome::Exit(
            ExitRequest::PowerOff,
            "Shutdown in progress...".to_string(),
        ),
        ConsoleCommand::Switch => match controller.toggle_mode().await {
            Ok(mode) => ConsoleOutcome::Continue(format!("Current mode: {}", mode)),
            Err(e) => ConsoleOutcome::Continue(e.to_string()),
        },
        ConsoleCommand::Mode => {
            let mode = controller.probe_mode().await;
            ConsoleOutcome::Continue(format!("Current mode: {}", mode))
        }
        ConsoleCommand::List => {
            let images = controller.catalog().list();
            if images.is_empty() {
                ConsoleOutcome::Continue("No images found".to_string())
            } else {
                ConsoleOutcome::Continue(images.join("\n"))
            }
        }
        ConsoleCommand::Empty => ConsoleOutcome::Continue(String::new()),
        ConsoleCommand::Unknown(cmd) => ConsoleOutcome::Continue(format!(
            "Invalid command: {}. Type 'help' for a list of commands.",
            cmd
        )),
    }
}

/// Read commands from stdin until `exit`, EOF or cancellation
pub async fn run_console(
    controller: Arc<GadgetController>,
    exit_tx: broadcast::Sender<ExitRequest>,
    prompt: String,
    cancel: CancellationToken,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let _ = stdout.write_all(prompt.as_bytes()).await;
        let _ = stdout.flush().await;

        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Console input closed");
                break;
            }
            Err(e) => {
                debug!("Console read failed: {}", e);
                break;
            }
        };

        match execute(ConsoleCommand::parse(&line), &controller).await {
            ConsoleOutcome::Continue(text) => {
                if !text.is_empty() {
                    let _ = stdout.write_all(format!("{}\n", text).as_bytes()).await;
                }
            }
            ConsoleOutcome::Exit(request, text) => {
                let _ = stdout.write_all(format!("{}\n", text).as_bytes()).await;
                let _ = stdout.flush().await;
                info!("Console requested {:?}", request);
                let _ = exit_tx.send(request);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ControllerConfig, GadgetMode};
    use crate::events::UpdateBus;
    use crate::gadget::fake::FakeHelper;
    use crate::gadget::GadgetKind;
    use crate::storage::{ImageCatalog, MountStateStore};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn controller(dir: &TempDir, images: &[&str], helper: FakeHelper) -> Arc<GadgetController> {
        let store = dir.path().join("imgstore");
        fs::create_dir_all(&store).unwrap();
        for image in images {
            fs::write(store.join(image), b"").unwrap();
        }
        Arc::new(GadgetController::new(
            Arc::new(helper),
            ImageCatalog::new(&store),
            MountStateStore::new(dir.path().join("usbode-iso.txt")),
            UpdateBus::new(),
            ControllerConfig {
                store_device: dir.path().join("mmcblk0p3"),
                helper_timeout: Duration::from_secs(5),
            },
        ))
    }

    #[test]
    fn test_parse() {
        assert_eq!(ConsoleCommand::parse("  switch  "), ConsoleCommand::Switch);
        assert_eq!(ConsoleCommand::parse("switch 1"), ConsoleCommand::Switch);
        assert_eq!(ConsoleCommand::parse(""), ConsoleCommand::Empty);
        assert_eq!(ConsoleCommand::parse("   "), ConsoleCommand::Empty);
        assert_eq!(
            ConsoleCommand::parse("reboot now"),
            ConsoleCommand::Unknown("reboot".to_string())
        );
    }

    #[tokio::test]
    async fn test_read_only_commands() {
        let dir = TempDir::new().unwrap();
        let controller = controller(
            &dir,
            &["Zelda.iso", "armada.cue"],
            FakeHelper::running(GadgetKind::MassStorage, None),
        );

        assert_eq!(
            execute(ConsoleCommand::Mode, &controller).await,
            ConsoleOutcome::Continue("Current mode: Mass Storage".to_string())
        );
        assert_eq!(
            execute(ConsoleCommand::List, &controller).await,
            ConsoleOutcome::Continue("armada.cue\nZelda.iso".to_string())
        );
        match execute(ConsoleCommand::Help, &controller).await {
            ConsoleOutcome::Continue(text) => {
                assert!(text.contains("switch"));
                assert!(text.contains("version"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(controller.probe_mode().await, GadgetMode::MassStorage);
    }

    #[tokio::test]
    async fn test_switch_toggles() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir, &[], FakeHelper::running(GadgetKind::OpticalEmulation, None));

        assert_eq!(
            execute(ConsoleCommand::Switch, &controller).await,
            ConsoleOutcome::Continue("Current mode: Mass Storage".to_string())
        );
        // Empty store: refusal is printed, mode unchanged
        match execute(ConsoleCommand::Switch, &controller).await {
            ConsoleOutcome::Continue(text) => assert!(text.contains("No images found")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(controller.probe_mode().await, GadgetMode::MassStorage);
    }

    #[tokio::test]
    async fn test_exit_commands() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir, &[], FakeHelper::new());

        assert!(matches!(
            execute(ConsoleCommand::Exit, &controller).await,
            ConsoleOutcome::Exit(ExitRequest::Exit, _)
        ));
        assert!(matches!(
            execute(ConsoleCommand::Shutdown, &controller).await,
            ConsoleOutcome::Exit(ExitRequest::PowerOff, _)
        ));
    }
}
