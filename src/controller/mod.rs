//! Gadget mode controller and its data types

pub mod mode_controller;
pub mod types;

pub use mode_controller::{ControllerConfig, GadgetController};
pub use types::{GadgetMode, GadgetStatus};
