//! Status displays
//!
//! A display backend only renders a [`Screen`] and reports user input. The
//! [`DisplayRunner`] owns the menu, talks to the controller and decides
//! when to re-render.

pub mod headless;
pub mod menu;
pub mod runner;

use async_trait::async_trait;

use crate::controller::GadgetStatus;
use crate::error::Result;

pub use headless::HeadlessDisplay;
pub use menu::{MenuAction, MenuState, MenuView};
pub use runner::DisplayRunner;

/// Input from the display's buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRequest {
    ShowImages,
    Up,
    Down,
    Select,
    Back,
    ToggleMode,
    Shutdown,
}

/// Everything a backend needs to draw
#[derive(Debug, Clone)]
pub struct Screen {
    pub status: GadgetStatus,
    pub view: MenuView,
}

/// A small status display with optional input buttons
#[async_trait]
pub trait StatusDisplay: Send {
    fn name(&self) -> &'static str;

    async fn refresh(&mut self, screen: &Screen) -> Result<()>;

    /// Next pending input, if any; must not block
    async fn poll_input(&mut self) -> Result<Option<UserRequest>>;
}
