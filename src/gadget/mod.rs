//! USB gadget control
//!
//! ```text
//! GadgetController (policy, in crate::controller)
//!     └── dyn GadgetHelper
//!             ├── ConfigfsHelper ── GadgetTree ── MsdLun
//!             └── ScriptHelper (install scripts, reads via ConfigfsHelper)
//! ```

pub mod configfs;
pub mod configfs_helper;
#[cfg(test)]
pub mod fake;
pub mod helper;
pub mod lun;
pub mod script;
pub mod tree;

use std::sync::Arc;
use tracing::info;

use crate::config::{GadgetConfig, HelperBackend};

pub use configfs_helper::ConfigfsHelper;
pub use helper::{GadgetHelper, GadgetKind, KERNEL_MODULES_UNLOAD_ORDER};
pub use lun::MsdLun;
pub use script::ScriptHelper;
pub use tree::{GadgetDescriptor, GadgetTree};

/// Instantiate the configured helper backend
pub fn build_helper(config: &GadgetConfig) -> Arc<dyn GadgetHelper> {
    let helper: Arc<dyn GadgetHelper> = match config.backend {
        HelperBackend::Configfs => Arc::new(ConfigfsHelper::new(config)),
        HelperBackend::Scripts => Arc::new(ScriptHelper::new(config)),
    };
    info!(
        "Gadget helper: {} ({})",
        helper.name(),
        config.gadget_path().display()
    );
    helper
}
