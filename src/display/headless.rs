//! Display backend that renders to the log

use async_trait::async_trait;
use tracing::info;

use super::{MenuView, Screen, StatusDisplay, UserRequest};
use crate::error::Result;

/// Logs each distinct screen once; has no input
#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    last_line: Option<String>,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render_line(screen: &Screen) -> String {
        match &screen.view {
            MenuView::Status => format!(
                "Mode: {} | Image: {} | {} image(s) in store",
                screen.status.mode,
                screen.status.mounted_name().unwrap_or_else(|| "-".to_string()),
                screen.status.image_count
            ),
            MenuView::Images { entries, selected } => format!(
                "Images [{}/{}]: {}",
                if entries.is_empty() { 0 } else { selected + 1 },
                entries.len(),
                entries.get(*selected).map(String::as_str).unwrap_or("(none)")
            ),
        }
    }
}

#[async_trait]
impl StatusDisplay for HeadlessDisplay {
    fn name(&self) -> &'static str {
        "headless"
    }

    async fn refresh(&mut self, screen: &Screen) -> Result<()> {
        let line = Self::render_line(screen);
        if self.last_line.as_deref() != Some(line.as_str()) {
            info!("{}", line);
            self.last_line = Some(line);
        }
        Ok(())
    }

    async fn poll_input(&mut self) -> Result<Option<UserRequest>> {
        Ok(None)
    }
}
