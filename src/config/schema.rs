use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// USB gadget helper settings
    pub gadget: GadgetConfig,
    /// Image store and persisted mount settings
    pub storage: StorageConfig,
    /// Physical mode button
    pub button: ButtonConfig,
    /// On-device status display
    pub display: DisplayConfig,
    /// Web server settings
    pub web: WebConfig,
    /// Interactive console on stdin
    pub console: ConsoleConfig,
}

/// Which implementation drives the USB gadget
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HelperBackend {
    /// Write the gadget tree directly through configfs
    #[default]
    Configfs,
    /// Invoke the install's shell scripts
    Scripts,
}

/// USB gadget configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GadgetConfig {
    pub backend: HelperBackend,
    /// ConfigFS usb_gadget root
    pub configfs_path: String,
    /// Gadget directory name under the configfs root
    pub gadget_name: String,
    /// UDC to bind (None = first one in /sys/class/udc)
    pub udc: Option<String>,
    /// Directory listing available UDCs
    pub udc_class_path: String,
    /// Install directory used as cwd for scripts
    pub install_dir: String,
    /// Scripts directory relative to the install directory
    pub scripts_dir: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: String,
    pub serial_number: String,
    /// Upper bound for any single helper invocation
    pub helper_timeout_ms: u64,
    /// Load libcomposite on startup
    pub load_modules_on_start: bool,
}

impl Default for GadgetConfig {
    fn default() -> Self {
        Self {
            backend: HelperBackend::Configfs,
            configfs_path: "/sys/kernel/config/usb_gadget".to_string(),
            gadget_name: "usbode".to_string(),
            udc: None,
            udc_class_path: "/sys/class/udc".to_string(),
            install_dir: "/opt/usbode".to_string(),
            scripts_dir: "scripts".to_string(),
            vendor_id: 0x1d6b,
            product_id: 0x0104,
            manufacturer: "USBODE".to_string(),
            serial_number: "0123456789".to_string(),
            helper_timeout_ms: 5000,
            load_modules_on_start: true,
        }
    }
}

impl GadgetConfig {
    pub fn gadget_path(&self) -> PathBuf {
        PathBuf::from(&self.configfs_path).join(&self.gadget_name)
    }

    pub fn helper_timeout(&self) -> Duration {
        Duration::from_millis(self.helper_timeout_ms)
    }
}

/// Image store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Raw block device served in mass-storage mode
    pub store_device: String,
    /// Where the image store partition is mounted on the device
    pub store_mount: String,
    /// Plain-text record of the last selected image
    pub mount_state_file: String,
    /// Fixed alternate optical source (e.g. an attached real drive)
    pub alternate_source: String,
    /// Mount the store partition on startup
    pub mount_store_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_device: "/dev/mmcblk0p3".to_string(),
            store_mount: "/mnt/imgstore".to_string(),
            mount_state_file: "/opt/usbode/usbode-iso.txt".to_string(),
            alternate_source: "/dev/cdrom".to_string(),
            mount_store_on_start: true,
        }
    }
}

/// Physical mode button configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ButtonConfig {
    pub enabled: bool,
    /// GPIO chip device, e.g. /dev/gpiochip0
    pub gpio_chip: String,
    pub gpio_pin: u32,
    /// Button pulls the line low when pressed
    pub active_low: bool,
    pub poll_interval_ms: u64,
    pub debounce_ms: u64,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            gpio_chip: "/dev/gpiochip0".to_string(),
            gpio_pin: 26,
            active_low: true,
            poll_interval_ms: 50,
            debounce_ms: 200,
        }
    }
}

impl ButtonConfig {
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.gpio_chip.is_empty()
    }
}

/// Status display backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayBackend {
    #[default]
    None,
    /// Status rendered to the log
    Headless,
}

/// Status display configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    pub backend: DisplayBackend,
    /// How often the input loop polls the backend
    pub poll_interval_ms: u64,
    /// Unconditional re-render interval
    pub refresh_interval_secs: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            backend: DisplayBackend::None,
            poll_interval_ms: 100,
            refresh_interval_secs: 30,
        }
    }
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebConfig {
    pub enabled: bool,
    /// HTTP port
    pub http_port: u16,
    /// Bind address
    pub bind_address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            http_port: 80,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

/// Console configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub prompt: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prompt: "usbode> ".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"web":{"http_port":8080},"gadget":{"backend":"scripts"}}"#)
                .unwrap();
        assert_eq!(config.web.http_port, 8080);
        assert!(config.web.enabled);
        assert_eq!(config.gadget.backend, HelperBackend::Scripts);
        assert_eq!(config.storage.store_device, "/dev/mmcblk0p3");
    }

    #[test]
    fn test_gadget_path() {
        let gadget = GadgetConfig::default();
        assert_eq!(
            gadget.gadget_path(),
            PathBuf::from("/sys/kernel/config/usb_gadget/usbode")
        );
        assert_eq!(gadget.helper_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_button_configured() {
        let mut button = ButtonConfig::default();
        assert!(!button.is_configured());
        button.enabled = true;
        assert!(button.is_configured());
    }
}
