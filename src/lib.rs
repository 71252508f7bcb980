//! USBODE - USB Optical Drive Emulator
//!
//! Turns a small board with a USB device controller into a switchable USB
//! peripheral: a CD-ROM drive serving a disk image, or a writable mass
//! storage disk for copying new images onto the device.

pub mod button;
pub mod config;
pub mod console;
pub mod controller;
pub mod display;
pub mod error;
pub mod events;
pub mod gadget;
pub mod state;
pub mod storage;
pub mod system;
pub mod utils;
pub mod web;

pub use error::{AppError, Result};
