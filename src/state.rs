use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::ConfigStore;
use crate::controller::GadgetController;
use crate::system::ExitRequest;

/// Application-wide state shared across handlers and front ends
pub struct AppState {
    /// Configuration store
    pub config: ConfigStore,
    /// The single gadget mode controller
    pub controller: Arc<GadgetController>,
    /// Exit / power-off requests, consumed by main
    pub exit_tx: broadcast::Sender<ExitRequest>,
}

impl AppState {
    pub fn new(
        config: ConfigStore,
        controller: Arc<GadgetController>,
        exit_tx: broadcast::Sender<ExitRequest>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            controller,
            exit_tx,
        })
    }

    /// Ask main to exit; a no-op if main already stopped listening
    pub fn request_exit(&self, request: ExitRequest) {
        if self.exit_tx.send(request).is_err() {
            tracing::debug!("No exit listener for {:?}", request);
        }
    }
}
