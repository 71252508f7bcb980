//! On-device menu navigation

use super::UserRequest;

/// What the display currently shows
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MenuView {
    /// Mode and mounted image
    #[default]
    Status,
    /// Catalog snapshot taken when the list was opened
    Images { entries: Vec<String>, selected: usize },
}

/// What the runner must do after a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    None,
    Mount(String),
    ToggleMode,
    Shutdown,
}

/// Menu state machine
///
/// The image list is captured once when opened, so the selected index stays
/// on the same entry while the user scrolls.
#[derive(Debug, Clone, Default)]
pub struct MenuState {
    view: MenuView,
}

impl MenuState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> &MenuView {
        &self.view
    }

    pub fn handle<F>(&mut self, request: UserRequest, list_images: F) -> MenuAction
    where
        F: FnOnce() -> Vec<String>,
    {
        match request {
            UserRequest::ShowImages => {
                self.open_list(list_images());
                MenuAction::None
            }
            UserRequest::Up => {
                if let MenuView::Images { selected, .. } = &mut self.view {
                    *selected = selected.saturating_sub(1);
                }
                MenuAction::None
            }
            UserRequest::Down => {
                if let MenuView::Images { entries, selected } = &mut self.view {
                    if *selected + 1 < entries.len() {
                        *selected += 1;
                    }
                }
                MenuAction::None
            }
            UserRequest::Select => match &self.view {
                MenuView::Status => {
                    self.open_list(list_images());
                    MenuAction::None
                }
                MenuView::Images { entries, selected } => match entries.get(*selected) {
                    Some(name) => {
                        let name = name.clone();
                        self.view = MenuView::Status;
                        MenuAction::Mount(name)
                    }
                    None => MenuAction::None,
                },
            },
            UserRequest::Back => {
                self.view = MenuView::Status;
                MenuAction::None
            }
            UserRequest::ToggleMode => {
                self.view = MenuView::Status;
                MenuAction::ToggleMode
            }
            UserRequest::Shutdown => MenuAction::Shutdown,
        }
    }

    fn open_list(&mut self, entries: Vec<String>) {
        self.view = MenuView::Images {
            entries,
            selected: 0,
        };
    }
}
