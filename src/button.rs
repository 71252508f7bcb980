//! Physical mode button
//!
//! Polls a GPIO line and toggles the gadget mode on each debounced press.

use gpio_cdev::{Chip, LineHandle, LineRequestFlags};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ButtonConfig;
use crate::controller::GadgetController;
use crate::error::{AppError, Result};

/// Turns raw samples into press events
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    stable: bool,
    candidate: bool,
    candidate_since: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            stable: false,
            candidate: false,
            candidate_since: None,
        }
    }

    /// Feed one sample; returns `true` once per press
    pub fn update(&mut self, pressed: bool, now: Instant) -> bool {
        if pressed != self.candidate || self.candidate_since.is_none() {
            self.candidate = pressed;
            self.candidate_since = Some(now);
        }

        let settled = self
            .candidate_since
            .map(|since| now.duration_since(since) >= self.window)
            .unwrap_or(false);
        if settled && self.candidate != self.stable {
            self.stable = self.candidate;
            return self.stable;
        }
        false
    }
}

/// GPIO input line of the mode button
pub struct ModeButton {
    config: ButtonConfig,
    handle: LineHandle,
}

impl ModeButton {
    pub fn open(config: &ButtonConfig) -> Result<Self> {
        info!(
            "Opening mode button on {} pin {}",
            config.gpio_chip, config.gpio_pin
        );

        let mut chip = Chip::new(&config.gpio_chip)
            .map_err(|e| AppError::Internal(format!("Button GPIO chip failed: {}", e)))?;
        let line = chip.get_line(config.gpio_pin).map_err(|e| {
            AppError::Internal(format!(
                "Button GPIO line {} failed: {}",
                config.gpio_pin, e
            ))
        })?;
        let handle = line
            .request(LineRequestFlags::INPUT, 0, "usbode-button")
            .map_err(|e| AppError::Internal(format!("Button GPIO request failed: {}", e)))?;

        Ok(Self {
            config: config.clone(),
            handle,
        })
    }

    pub fn is_pressed(&self) -> Result<bool> {
        let value = self
            .handle
            .get_value()
            .map_err(|e| AppError::Internal(format!("Button GPIO read failed: {}", e)))?;
        Ok(if self.config.active_low {
            value == 0
        } else {
            value == 1
        })
    }
}

/// Start the button task if a button is configured
pub fn spawn_mode_button(
    config: &ButtonConfig,
    controller: Arc<GadgetController>,
    cancel: CancellationToken,
) -> Option<JoinHandle<()>> {
    if !config.is_configured() {
        debug!("Mode button not configured");
        return None;
    }

    let button = match ModeButton::open(config) {
        Ok(button) => button,
        Err(e) => {
            warn!("Mode button unavailable: {}", e);
            return None;
        }
    };
    let poll_interval = Duration::from_millis(config.poll_interval_ms.max(1));
    let debounce = Duration::from_millis(config.debounce_ms);

    Some(tokio::spawn(async move {
        let mut debouncer = Debouncer::new(debounce);
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let pressed = match button.is_pressed() {
                Ok(pressed) => pressed,
                Err(e) => {
                    debug!("{}", e);
                    continue;
                }
            };
            if debouncer.update(pressed, Instant::now()) {
                info!("Mode button pressed");
                match controller.toggle_mode().await {
                    Ok(mode) => info!("Mode button switched gadget to {}", mode),
                    Err(e) => warn!("Mode button switch failed: {}", e),
                }
            }
        }
        debug!("Mode button task stopped");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debouncer_single_press() {
        let mut debouncer = Debouncer::new(Duration::from_millis(200));
        let start = Instant::now();
        let at = |ms| start + Duration::from_millis(ms);

        assert!(!debouncer.update(false, at(0)));
        assert!(!debouncer.update(true, at(10)));
        assert!(!debouncer.update(true, at(100)));
        assert!(debouncer.update(true, at(210)));
        // Held: no repeat
        assert!(!debouncer.update(true, at(600)));
        assert!(!debouncer.update(false, at(610)));
        assert!(!debouncer.update(false, at(900)));
        assert!(!debouncer.update(true, at(910)));
        assert!(debouncer.update(true, at(1200)));
    }

    #[test]
    fn test_debouncer_ignores_bounce() {
        let mut debouncer = Debouncer::new(Duration::from_millis(200));
        let start = Instant::now();
        let at = |ms| start + Duration::from_millis(ms);

        for (i, ms) in (0..150).step_by(10).enumerate() {
            assert!(!debouncer.update(i % 2 == 0, at(ms)));
        }
        assert!(!debouncer.update(false, at(400)));
    }
}
