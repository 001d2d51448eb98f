//! Motor characteristics
//!
//! One [`MotorCharacteristic`] per exposed PV field. The variant decides
//! which field is read, what a write does and what a notification carries.

use crate::domain::codec;
use crate::domain::descriptor::{DescriptorKind, MotorDescriptor};
use crate::domain::models::{Flags, PvValue, Reading};
use crate::domain::pv::{field, PvClient};
use crate::domain::uuids;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacteristicKind {
    /// `.RBV` readback, writes move the motor
    Position,
    /// `.MOVN` as `"1"`/`"0"`
    MotionStatus,
    /// Any PV, chosen by the client
    PvBrowser,
}

impl CharacteristicKind {
    pub fn flags(&self) -> Flags {
        match self {
            Self::Position | Self::PvBrowser => Flags::ALL,
            Self::MotionStatus => Flags::READ_NOTIFY,
        }
    }
}

/// PV currently selected through the browser characteristic
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrowserTarget {
    pub pv_name: Option<String>,
    pub units: String,
}

enum Binding {
    Fixed(String),
    Browser(Mutex<BrowserTarget>),
}

#[derive(Debug, Default)]
struct NotifyState {
    /// Id of the live subscription
    session: Option<u64>,
    next_session: u64,
    last_sent: Option<Vec<u8>>,
}

pub struct MotorCharacteristic {
    uuid: Uuid,
    kind: CharacteristicKind,
    binding: Binding,
    descriptors: Vec<Arc<MotorDescriptor>>,
    pv: PvClient,
    notify: Mutex<NotifyState>,
}

impl MotorCharacteristic {
    /// Readback position of `pv_name`, with its metadata descriptors
    pub fn position(pv_name: &str, discriminator: u32, pv: PvClient) -> Self {
        let descriptors = DescriptorKind::ALL
            .iter()
            .map(|kind| Arc::new(MotorDescriptor::new(*kind, pv_name, pv.clone())))
            .collect();

        Self::build(
            uuids::position_uuid(discriminator),
            CharacteristicKind::Position,
            Binding::Fixed(pv_name.to_string()),
            descriptors,
            pv,
        )
    }

    pub fn motion_status(pv_name: &str, discriminator: u32, pv: PvClient) -> Self {
        Self::build(
            uuids::motion_status_uuid(discriminator),
            CharacteristicKind::MotionStatus,
            Binding::Fixed(pv_name.to_string()),
            Vec::new(),
            pv,
        )
    }

    pub fn pv_browser(pv: PvClient) -> Self {
        Self::build(
            uuids::pv_browser_uuid(),
            CharacteristicKind::PvBrowser,
            Binding::Browser(Mutex::new(BrowserTarget::default())),
            Vec::new(),
            pv,
        )
    }

    fn build(
        uuid: Uuid,
        kind: CharacteristicKind,
        binding: Binding,
        descriptors: Vec<Arc<MotorDescriptor>>,
        pv: PvClient,
    ) -> Self {
        Self {
            uuid,
            kind,
            binding,
            descriptors,
            pv,
            notify: Mutex::new(NotifyState::default()),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn kind(&self) -> CharacteristicKind {
        self.kind
    }

    pub fn flags(&self) -> Flags {
        self.kind.flags()
    }

    pub fn descriptors(&self) -> &[Arc<MotorDescriptor>] {
        &self.descriptors
    }

    /// PV base name, `None` for an unbound browser
    pub fn pv_name(&self) -> Option<String> {
        match &self.binding {
            Binding::Fixed(name) => Some(name.clone()),
            Binding::Browser(target) => lock(target).pv_name.clone(),
        }
    }

    #[cfg(test)]
    pub fn browser_target(&self) -> Option<BrowserTarget> {
        match &self.binding {
            Binding::Fixed(_) => None,
            Binding::Browser(target) => Some(lock(target).clone()),
        }
    }

    pub async fn read_value(&self) -> Vec<u8> {
        match &self.binding {
            Binding::Browser(target) => {
                let name = lock(target).pv_name.clone();
                codec::encode(name.as_deref().unwrap_or(codec::NO_PV))
            }
            Binding::Fixed(_) => self.sample().await,
        }
    }

    /// Handle a client write. Returns the written bytes.
    pub async fn write_value(&self, value: &[u8]) -> Vec<u8> {
        let text = codec::decode(value);
        match (&self.binding, self.kind) {
            (Binding::Fixed(name), CharacteristicKind::Position) => {
                info!("Moving {} to {}", name, text);
                self.pv.write(name, &text).await;
            }
            (Binding::Browser(_), _) => self.bind(&text).await,
            _ => debug!("Ignoring write to read-only characteristic {}", self.uuid),
        }
        value.to_vec()
    }

    /// Validate a PV name and make it the browser target.
    ///
    /// An unknown PV clears the selection instead of failing.
    async fn bind(&self, raw: &str) {
        let Binding::Browser(target) = &self.binding else {
            return;
        };

        let name = raw.trim().to_string();
        let next = if !name.is_empty() && self.pv.probe(&name).await {
            let units = self.pv.units(&name).await;
            info!("PV browser bound to {} ({})", name, units.trim());
            BrowserTarget {
                pv_name: Some(name),
                units,
            }
        } else {
            debug!("PV browser rejected {:?}", name);
            BrowserTarget::default()
        };
        *lock(target) = next;
    }

    /// Current value as carried by a notification
    pub async fn sample(&self) -> Vec<u8> {
        let text = match (&self.binding, self.kind) {
            (Binding::Fixed(name), CharacteristicKind::Position) => self
                .pv
                .read_value(&field(name, "RBV"))
                .await
                .render_position(),
            (Binding::Fixed(name), _) => {
                motion_flag(&self.pv.read_value(&field(name, "MOVN")).await)
            }
            (Binding::Browser(target), _) => {
                let current = lock(target).clone();
                match current.pv_name {
                    Some(name) => {
                        let timeout = self.pv.timeouts().browser_value();
                        let reading = self.pv.read(&name, timeout).await;
                        format!("{} {}", reading.render(), current.units)
                    }
                    None => codec::INVALID.to_string(),
                }
            }
        };
        codec::encode(&text)
    }

    /// Work done once when a client subscribes, before the first push
    pub async fn prepare_notify(&self) {
        if let Binding::Browser(target) = &self.binding {
            let name = lock(target).pv_name.clone();
            if let Some(name) = name {
                let units = self.pv.units(&name).await;
                let mut target = lock(target);
                if target.pv_name.as_deref() == Some(name.as_str()) {
                    target.units = units;
                }
            }
        }
    }

    /// Set the notifying flag and open a new session.
    ///
    /// Returns the session id, or `None` if a session is already live.
    pub fn begin_notify(&self) -> Option<u64> {
        let mut state = lock(&self.notify);
        if state.session.is_some() {
            return None;
        }
        state.next_session += 1;
        state.session = Some(state.next_session);
        state.session
    }

    pub fn end_notify(&self) {
        lock(&self.notify).session = None;
    }

    /// Clear the flag if `session` is still the live one
    pub fn end_session(&self, session: u64) -> bool {
        let mut state = lock(&self.notify);
        if state.session != Some(session) {
            return false;
        }
        state.session = None;
        true
    }

    pub fn is_notifying(&self) -> bool {
        lock(&self.notify).session.is_some()
    }

    pub fn is_current(&self, session: u64) -> bool {
        lock(&self.notify).session == Some(session)
    }

    /// Store `value` as last sent on behalf of `session`.
    ///
    /// Returns `None` once `session` is no longer live, otherwise whether
    /// the value differs from the previous one.
    pub fn record_sent(&self, session: u64, value: &[u8]) -> Option<bool> {
        let mut state = lock(&self.notify);
        if state.session != Some(session) {
            return None;
        }
        if state.last_sent.as_deref() == Some(value) {
            return Some(false);
        }
        state.last_sent = Some(value.to_vec());
        Some(true)
    }
}

fn motion_flag(reading: &Reading) -> String {
    match reading.value().and_then(PvValue::as_f64) {
        Some(v) if v != 0.0 => "1".to_string(),
        Some(_) => "0".to_string(),
        None => codec::INVALID.to_string(),
    }
}

// Poisoning only happens if a holder panicked; the guarded state stays valid.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pv::testing::{client, MemoryPvs};

    #[tokio::test]
    async fn test_position_reads_rounded_readback() {
        let pvs = MemoryPvs::new();
        pvs.add_motor("IOC:m1", -12.345674);
        let position = MotorCharacteristic::position("IOC:m1", 2, client(&pvs));

        assert_eq!(position.read_value().await, b"-12.34567".to_vec());
        assert_eq!(position.descriptors().len(), 6);
        assert_eq!(position.flags(), Flags::ALL);
    }

    #[tokio::test]
    async fn test_position_timeout_reads_invalid() {
        let pvs = MemoryPvs::new();
        let position = MotorCharacteristic::position("IOC:m1", 2, client(&pvs));

        assert_eq!(position.read_value().await, b"Invalid".to_vec());
    }

    #[tokio::test]
    async fn test_position_write_moves_motor() {
        let pvs = MemoryPvs::new();
        let position = MotorCharacteristic::position("IOC:m1", 2, client(&pvs));

        let echoed = position.write_value(b"3.25").await;
        assert_eq!(echoed, b"3.25".to_vec());
        position.write_value(b"-1.5\0").await;
        assert_eq!(
            pvs.puts(),
            vec![
                ("IOC:m1".to_string(), "3.25".to_string()),
                ("IOC:m1".to_string(), "-1.5".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_motion_status_flag() {
        let pvs = MemoryPvs::new();
        pvs.add_motor("IOC:m1", 0.0);
        let status = MotorCharacteristic::motion_status("IOC:m1", 2, client(&pvs));
        assert_eq!(status.read_value().await, b"0".to_vec());

        pvs.set("IOC:m1.MOVN", PvValue::Float(1.0));
        assert_eq!(status.read_value().await, b"1".to_vec());

        pvs.remove("IOC:m1.MOVN");
        assert_eq!(status.read_value().await, b"Invalid".to_vec());

        status.write_value(b"1").await;
        assert!(pvs.puts().is_empty());
    }

    #[tokio::test]
    async fn test_browser_starts_unbound() {
        let pvs = MemoryPvs::new();
        let browser = MotorCharacteristic::pv_browser(client(&pvs));

        assert_eq!(browser.read_value().await, b"No PV".to_vec());
        assert_eq!(browser.sample().await, b"Invalid".to_vec());
    }

    #[tokio::test]
    async fn test_browser_rejects_unknown_pv() {
        let pvs = MemoryPvs::new();
        let browser = MotorCharacteristic::pv_browser(client(&pvs));

        browser.write_value(b"IOC:nothing").await;
        assert_eq!(browser.pv_name(), None);
        assert_eq!(browser.read_value().await, b"No PV".to_vec());
    }

    #[tokio::test]
    async fn test_browser_binds_live_pv() {
        let pvs = MemoryPvs::new();
        pvs.add_motor("IOC:m2", 5.5);
        let browser = MotorCharacteristic::pv_browser(client(&pvs));

        browser.write_value(b"IOC:m2\0").await;
        assert_eq!(browser.read_value().await, b"IOC:m2".to_vec());
        assert_eq!(browser.sample().await, b"5.5 mm".to_vec());

        // A later invalid name drops the previous selection
        browser.write_value(b"IOC:gone").await;
        assert_eq!(browser.browser_target(), Some(BrowserTarget::default()));
    }

    #[tokio::test]
    async fn test_browser_units_default_to_space() {
        let pvs = MemoryPvs::new();
        pvs.set("IOC:count", PvValue::Integer(12));
        let browser = MotorCharacteristic::pv_browser(client(&pvs));

        browser.write_value(b"IOC:count").await;
        assert_eq!(browser.sample().await, b"12  ".to_vec());

        pvs.remove("IOC:count");
        assert_eq!(browser.sample().await, b"Invalid  ".to_vec());
    }

    #[tokio::test]
    async fn test_prepare_notify_refreshes_units() {
        let pvs = MemoryPvs::new();
        pvs.set("IOC:temp", PvValue::Float(21.5));
        let browser = MotorCharacteristic::pv_browser(client(&pvs));
        browser.write_value(b"IOC:temp").await;

        pvs.set("IOC:temp.EGU", PvValue::Text("degC".into()));
        browser.prepare_notify().await;
        assert_eq!(browser.sample().await, b"21.5 degC".to_vec());
    }

    #[test]
    fn test_notify_flag_is_exclusive() {
        let pvs = MemoryPvs::new();
        let status = MotorCharacteristic::motion_status("IOC:m1", 2, client(&pvs));

        let first = status.begin_notify().unwrap();
        assert_eq!(status.begin_notify(), None);
        status.end_notify();
        assert!(!status.is_notifying());

        let second = status.begin_notify().unwrap();
        assert_ne!(first, second);
        assert!(status.is_current(second));
        assert!(!status.is_current(first));
    }

    #[test]
    fn test_old_session_cannot_end_newer_one() {
        let pvs = MemoryPvs::new();
        let status = MotorCharacteristic::motion_status("IOC:m1", 2, client(&pvs));

        let old = status.begin_notify().unwrap();
        status.end_notify();
        let new = status.begin_notify().unwrap();

        assert!(!status.end_session(old));
        assert!(status.is_notifying());
        assert_eq!(status.record_sent(old, b"1"), None);
        assert!(status.end_session(new));
        assert!(!status.is_notifying());
    }

    #[test]
    fn test_record_sent_detects_change() {
        let pvs = MemoryPvs::new();
        let status = MotorCharacteristic::motion_status("IOC:m1", 2, client(&pvs));
        let session = status.begin_notify().unwrap();

        assert_eq!(status.record_sent(session, b"0"), Some(true));
        assert_eq!(status.record_sent(session, b"0"), Some(false));
        assert_eq!(status.record_sent(session, b"1"), Some(true));
    }
}
