use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "ble_motor_ctrl".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// Timeout budgets for PV reads, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvTimeouts {
    /// Position, status and descriptor reads
    #[serde(default = "default_value_timeout")]
    pub value_secs: f64,
    /// Value reads of the PV-browser target
    #[serde(default = "default_browser_timeout")]
    pub browser_value_secs: f64,
    /// Existence check before the PV-browser accepts a name
    #[serde(default = "default_probe_timeout")]
    pub probe_secs: f64,
    /// Engineering-units lookup
    #[serde(default = "default_units_timeout")]
    pub units_secs: f64,
}

impl Default for PvTimeouts {
    fn default() -> Self {
        Self {
            value_secs: default_value_timeout(),
            browser_value_secs: default_browser_timeout(),
            probe_secs: default_probe_timeout(),
            units_secs: default_units_timeout(),
        }
    }
}

impl PvTimeouts {
    pub fn value(&self) -> Duration {
        secs(self.value_secs)
    }

    pub fn browser_value(&self) -> Duration {
        secs(self.browser_value_secs)
    }

    pub fn probe(&self) -> Duration {
        secs(self.probe_secs)
    }

    pub fn units(&self) -> Duration {
        secs(self.units_secs)
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

fn default_value_timeout() -> f64 {
    1.0
}
fn default_browser_timeout() -> f64 {
    0.3
}
fn default_probe_timeout() -> f64 {
    0.5
}
fn default_units_timeout() -> f64 {
    0.1
}

/// Locations of the EPICS base command-line tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelAccessSettings {
    #[serde(default = "default_caget")]
    pub caget: String,
    #[serde(default = "default_caput")]
    pub caput: String,
}

impl Default for ChannelAccessSettings {
    fn default() -> Self {
        Self {
            caget: default_caget(),
            caput: default_caput(),
        }
    }
}

fn default_caget() -> String {
    "caget".to_string()
}
fn default_caput() -> String {
    "caput".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Advertisement
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default = "default_manufacturer_id")]
    pub manufacturer_id: u16,
    #[serde(default = "default_manufacturer_data")]
    pub manufacturer_data: Vec<u8>,
    #[serde(default = "default_true")]
    pub include_tx_power: bool,

    // Adapter
    #[serde(default)]
    pub adapter_name: Option<String>,
    #[serde(default = "default_true")]
    pub disconnect_on_shutdown: bool,

    // Motors
    #[serde(default = "default_pvs")]
    pub pvs: Vec<String>,
    #[serde(default = "default_notify_interval_ms")]
    pub notify_interval_ms: u64,
    #[serde(default)]
    pub pv_timeouts: PvTimeouts,
    #[serde(default)]
    pub channel_access: ChannelAccessSettings,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            manufacturer_id: default_manufacturer_id(),
            manufacturer_data: default_manufacturer_data(),
            include_tx_power: true,
            adapter_name: None,
            disconnect_on_shutdown: true,
            pvs: default_pvs(),
            notify_interval_ms: default_notify_interval_ms(),
            pv_timeouts: PvTimeouts::default(),
            channel_access: ChannelAccessSettings::default(),
            log_settings: LogSettings::default(),
        }
    }
}

impl Settings {
    pub fn notify_interval(&self) -> Duration {
        Duration::from_millis(self.notify_interval_ms.max(1))
    }
}

fn default_device_name() -> String {
    "Generic Bluetooth Controller".to_string()
}
fn default_manufacturer_id() -> u16 {
    0x000D // Texas Instruments
}
fn default_manufacturer_data() -> Vec<u8> {
    vec![0, 0]
}
fn default_pvs() -> Vec<String> {
    vec!["IOC:m1".to_string()]
}
fn default_notify_interval_ms() -> u64 {
    2000
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    /// Load from the default location, falling back to defaults
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::load(settings_path))
    }

    /// Load from an explicit file, falling back to defaults
    pub fn load(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("ble-motor-ctrl");
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(dir) = self.settings_path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}
