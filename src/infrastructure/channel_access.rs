//! EPICS Channel Access backend
//!
//! Uses the `caget` / `caput` tools shipped with EPICS base, so the usual
//! `EPICS_CA_*` environment variables apply unchanged.

use crate::domain::models::PvValue;
use crate::domain::pv::{PvAccess, PvError};
use crate::domain::settings::ChannelAccessSettings;
use std::process::{Command, Output};
use std::time::Duration;
use tracing::trace;

/// Marker printed by the tools when a channel never connected
const NOT_CONNECTED: &str = "Not connected";

/// Significant digits requested for floating-point fields
const FLOAT_DIGITS: &str = "17";

pub struct CaToolsBackend {
    caget: String,
    caput: String,
}

impl CaToolsBackend {
    pub fn new(settings: &ChannelAccessSettings) -> Self {
        Self {
            caget: settings.caget.clone(),
            caput: settings.caput.clone(),
        }
    }

    fn run(&self, tool: &str, args: &[&str]) -> Result<Output, PvError> {
        trace!("{} {}", tool, args.join(" "));
        Command::new(tool)
            .args(args)
            .output()
            .map_err(|source| PvError::Tool {
                tool: tool.to_string(),
                source,
            })
    }
}

impl PvAccess for CaToolsBackend {
    fn get(&self, name: &str, timeout: Duration) -> Result<PvValue, PvError> {
        let wait = format!("{:.3}", timeout.as_secs_f64());
        let args = ["-t", "-w", wait.as_str(), "-g", FLOAT_DIGITS, name];
        let output = self.run(&self.caget, &args)?;
        parse_get_output(name, timeout, &output)
    }

    fn put(&self, name: &str, value: &str) -> Result<(), PvError> {
        // "--" keeps negative values from being read as options
        let output = self.run(&self.caput, &["-t", "--", name, value])?;
        if output.status.success() {
            Ok(())
        } else {
            Err(PvError::Unavailable {
                name: name.to_string(),
                detail: failure_detail(&output),
            })
        }
    }
}

fn parse_get_output(
    name: &str,
    timeout: Duration,
    output: &Output,
) -> Result<PvValue, PvError> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let detail = failure_detail(output);
    parse_get(name, timeout, output.status.success(), &stdout, &detail)
}

/// Interpret terse `caget` output
fn parse_get(
    name: &str,
    timeout: Duration,
    success: bool,
    stdout: &str,
    detail: &str,
) -> Result<PvValue, PvError> {
    let text = stdout.trim_end_matches(['\r', '\n']);

    if text.contains(NOT_CONNECTED) || detail.contains(NOT_CONNECTED) {
        return Err(PvError::Timeout {
            name: name.to_string(),
            timeout,
        });
    }
    if !success {
        return Err(PvError::Unavailable {
            name: name.to_string(),
            detail: detail.to_string(),
        });
    }

    // An unset string field (e.g. `.DESC`) prints an empty line.
    Ok(PvValue::parse(text))
}

fn failure_detail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("exit status {}", output.status)
    } else {
        stderr
    }
}
