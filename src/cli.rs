use crate::domain::settings::Settings;
use clap::Parser;
use std::path::PathBuf;

/// BLE peripheral exposing EPICS motor records as GATT characteristics
#[derive(Parser, Debug, Default)]
#[command(name = "ble-motor-ctrl", version, long_about = None)]
pub struct Args {
    /// Motor PVs to expose, replacing the configured list
    #[arg(value_name = "PV")]
    pub pvs: Vec<String>,

    /// Advertised device name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Bluetooth adapter to use (e.g. "hci1")
    #[arg(short, long)]
    pub adapter: Option<String>,

    /// Settings file (defaults to the user config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level or filter directive, e.g. "debug" or "ble_motor_ctrl=trace"
    #[arg(long)]
    pub log_level: Option<String>,

    /// Write the effective settings back to the settings file
    #[arg(long)]
    pub save_config: bool,
}

impl Args {
    /// Apply command-line values on top of loaded settings
    pub fn apply(&self, settings: &mut Settings) {
        if !self.pvs.is_empty() {
            settings.pvs = self.pvs.clone();
        }
        if let Some(name) = &self.name {
            settings.device_name = name.clone();
        }
        if let Some(adapter) = &self.adapter {
            settings.adapter_name = Some(adapter.clone());
        }
        if let Some(level) = &self.log_level {
            settings.log_settings.level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("ble-motor-ctrl").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_no_arguments_keep_settings() {
        let mut settings = Settings::default();
        parse(&[]).apply(&mut settings);

        assert_eq!(settings.pvs, vec!["IOC:m1"]);
        assert_eq!(settings.device_name, "Generic Bluetooth Controller");
        assert_eq!(settings.adapter_name, None);
    }

    #[test]
    fn test_positional_pvs_replace_list() {
        let mut settings = Settings::default();
        parse(&["BL7:m3", "BL7:m4"]).apply(&mut settings);

        assert_eq!(settings.pvs, vec!["BL7:m3", "BL7:m4"]);
    }

    #[test]
    fn test_flags_override_settings() {
        let mut settings = Settings::default();
        let args = parse(&[
            "--name",
            "Hutch motors",
            "-a",
            "hci1",
            "--log-level",
            "debug",
            "--save-config",
            "--config",
            "/tmp/motors.json",
        ]);
        args.apply(&mut settings);

        assert_eq!(settings.device_name, "Hutch motors");
        assert_eq!(settings.adapter_name.as_deref(), Some("hci1"));
        assert_eq!(settings.log_settings.level, "debug");
        assert!(args.save_config);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/motors.json")));
    }
}
