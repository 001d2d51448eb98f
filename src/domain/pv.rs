//! Process-variable access
//!
//! [`PvAccess`] is the blocking get/put contract a control-system backend
//! implements. [`PvClient`] wraps a backend with the timeout budgets used by
//! the characteristics and keeps control-system faults away from BLE: reads
//! degrade to [`Reading::Invalid`], writes only log.

use crate::domain::models::{PvValue, Reading};
use crate::domain::settings::PvTimeouts;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Errors raised by a PV backend
#[derive(Debug, thiserror::Error)]
pub enum PvError {
    #[error("PV {name} did not answer within {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("PV {name} unavailable: {detail}")]
    Unavailable { name: String, detail: String },

    #[error("Failed to run {tool}: {source}")]
    Tool {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("PV call aborted: {0}")]
    Aborted(String),
}

/// Blocking access to named process variables.
///
/// Implementations must bound `get` by `timeout`.
pub trait PvAccess: Send + Sync {
    fn get(&self, name: &str, timeout: Duration) -> Result<PvValue, PvError>;

    fn put(&self, name: &str, value: &str) -> Result<(), PvError>;
}

/// Address a sub-field of a PV, e.g. `IOC:m1.RBV`
pub fn field(base: &str, suffix: &str) -> String {
    format!("{}.{}", base, suffix)
}

/// Timeout-aware PV client shared by every characteristic
#[derive(Clone)]
pub struct PvClient {
    backend: Arc<dyn PvAccess>,
    timeouts: PvTimeouts,
}

impl PvClient {
    pub fn new(backend: Arc<dyn PvAccess>, timeouts: PvTimeouts) -> Self {
        Self { backend, timeouts }
    }

    pub fn timeouts(&self) -> &PvTimeouts {
        &self.timeouts
    }

    /// Read a PV, exposing the failure
    ///
    /// Runs on the blocking pool so a slow PV does not hold up other BLE
    /// requests.
    pub async fn try_read(&self, name: &str, timeout: Duration) -> Result<PvValue, PvError> {
        let backend = self.backend.clone();
        let owned = name.to_string();
        let result = tokio::task::spawn_blocking(move || backend.get(&owned, timeout))
            .await
            .map_err(|e| PvError::Aborted(e.to_string()))?;
        trace!("get {} -> {:?}", name, result);
        result
    }

    /// Read a PV; any failure becomes [`Reading::Invalid`]
    pub async fn read(&self, name: &str, timeout: Duration) -> Reading {
        match self.try_read(name, timeout).await {
            Ok(value) => Reading::Value(value),
            Err(e) => {
                debug!("Read of {} failed: {}", name, e);
                Reading::Invalid
            }
        }
    }

    /// Read with the value budget used by the main read/notify path
    pub async fn read_value(&self, name: &str) -> Reading {
        self.read(name, self.timeouts.value()).await
    }

    /// Check that a PV answers within the short probe budget
    pub async fn probe(&self, name: &str) -> bool {
        matches!(
            self.read(name, self.timeouts.probe()).await,
            Reading::Value(_)
        )
    }

    /// Engineering units of a PV, a single space when absent or empty
    pub async fn units(&self, name: &str) -> String {
        match self.read(&field(name, "EGU"), self.timeouts.units()).await {
            Reading::Value(v) => {
                let text = v.to_string();
                if text.is_empty() {
                    " ".to_string()
                } else {
                    text
                }
            }
            Reading::Invalid => " ".to_string(),
        }
    }

    /// Put a value; failures are logged and otherwise ignored
    pub async fn write(&self, name: &str, value: &str) {
        let backend = self.backend.clone();
        let owned_name = name.to_string();
        let owned_value = value.to_string();
        let result =
            tokio::task::spawn_blocking(move || backend.put(&owned_name, &owned_value)).await;

        match result {
            Ok(Ok(())) => debug!("put {} <- {:?}", name, value),
            Ok(Err(e)) => warn!("Write to {} failed: {}", name, e),
            Err(e) => warn!("Write to {} aborted: {}", name, e),
        }
    }
}

/// In-memory backend for tests
#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryPvs {
        values: Mutex<HashMap<String, PvValue>>,
        puts: Mutex<Vec<(String, String)>>,
        gets: Mutex<Vec<(String, Duration)>>,
    }

    impl MemoryPvs {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn set(&self, name: &str, value: PvValue) {
            self.values.lock().unwrap().insert(name.to_string(), value);
        }

        pub fn remove(&self, name: &str) {
            self.values.lock().unwrap().remove(name);
        }

        pub fn puts(&self) -> Vec<(String, String)> {
            self.puts.lock().unwrap().clone()
        }

        pub fn gets(&self) -> Vec<(String, Duration)> {
            self.gets.lock().unwrap().clone()
        }

        /// Add the fields of a motor record
        pub fn add_motor(&self, base: &str, position: f64) {
            self.set(&field(base, "RBV"), PvValue::Float(position));
            self.set(&field(base, "VAL"), PvValue::Float(position));
            self.set(&field(base, "MOVN"), PvValue::Integer(0));
            self.set(&field(base, "DESC"), PvValue::Text("Sample stage".into()));
            self.set(&field(base, "EGU"), PvValue::Text("mm".into()));
            self.set(base, PvValue::Float(position));
        }
    }

    impl PvAccess for MemoryPvs {
        fn get(&self, name: &str, timeout: Duration) -> Result<PvValue, PvError> {
            self.gets
                .lock()
                .unwrap()
                .push((name.to_string(), timeout));
            self.values
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .ok_or_else(|| PvError::Timeout {
                    name: name.to_string(),
                    timeout,
                })
        }

        fn put(&self, name: &str, value: &str) -> Result<(), PvError> {
            self.puts
                .lock()
                .unwrap()
                .push((name.to_string(), value.to_string()));
            Ok(())
        }
    }

    pub fn client(pvs: &Arc<MemoryPvs>) -> PvClient {
        PvClient::new(pvs.clone(), PvTimeouts::default())
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{client, MemoryPvs};
    use super::*;

    #[tokio::test]
    async fn test_timeout_reads_invalid() {
        let pvs = MemoryPvs::new();
        let pv = client(&pvs);

        let reading = pv.read_value("IOC:missing.RBV").await;
        assert_eq!(reading, Reading::Invalid);
        assert_eq!(reading.render(), "Invalid");
    }

    #[tokio::test]
    async fn test_budgets_per_call_site() {
        let pvs = MemoryPvs::new();
        pvs.add_motor("IOC:m1", 1.0);
        let pv = client(&pvs);

        pv.read_value("IOC:m1.RBV").await;
        assert!(pv.probe("IOC:m1").await);
        assert_eq!(pv.units("IOC:m1").await, "mm");

        let gets = pvs.gets();
        assert_eq!(gets[0], ("IOC:m1.RBV".to_string(), Duration::from_secs(1)));
        assert_eq!(gets[1], ("IOC:m1".to_string(), Duration::from_millis(500)));
        assert_eq!(
            gets[2],
            ("IOC:m1.EGU".to_string(), Duration::from_millis(100))
        );
    }

    #[tokio::test]
    async fn test_missing_units_default_to_space() {
        let pvs = MemoryPvs::new();
        pvs.set("IOC:counter", PvValue::Integer(7));
        let pv = client(&pvs);

        assert_eq!(pv.units("IOC:counter").await, " ");

        pvs.set("IOC:counter.EGU", PvValue::Text(String::new()));
        assert_eq!(pv.units("IOC:counter").await, " ");
    }

    #[tokio::test]
    async fn test_write_forwards_text() {
        let pvs = MemoryPvs::new();
        let pv = client(&pvs);

        pv.write("IOC:m1", "12.5").await;
        assert_eq!(pvs.puts(), vec![("IOC:m1".to_string(), "12.5".to_string())]);
    }
}
