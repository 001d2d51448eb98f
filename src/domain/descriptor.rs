use crate::domain::codec;
use crate::domain::models::{DescriptorValue, Flags};
use crate::domain::pv::{field, PvClient};
use crate::domain::uuids;
use tracing::{debug, warn};
use uuid::Uuid;

/// Metadata attributes attached to a position characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    /// `.DESC`
    Description,
    /// `.VAL`, the commanded target
    Setpoint,
    /// Echo of the bound PV name
    PvName,
    /// `.RLV`, read and write
    RelativeMove,
    /// `.LVIO`
    LimitViolation,
    /// `.STOP`, write only
    Stop,
}

impl DescriptorKind {
    /// Every descriptor of a position characteristic, in registration order
    pub const ALL: [DescriptorKind; 6] = [
        DescriptorKind::Description,
        DescriptorKind::Setpoint,
        DescriptorKind::PvName,
        DescriptorKind::RelativeMove,
        DescriptorKind::LimitViolation,
        DescriptorKind::Stop,
    ];

    pub fn uuid(&self) -> Uuid {
        let short = match self {
            Self::Description => uuids::descriptor::DESCRIPTION,
            Self::Setpoint => uuids::descriptor::SETPOINT,
            Self::PvName => uuids::descriptor::PV_NAME,
            Self::RelativeMove => uuids::descriptor::RELATIVE_MOVE,
            Self::LimitViolation => uuids::descriptor::LIMIT_VIOLATION,
            Self::Stop => uuids::descriptor::STOP,
        };
        uuids::from_short(short)
    }

    pub fn flags(&self) -> Flags {
        match self {
            Self::RelativeMove => Flags::READ_WRITE,
            Self::Stop => Flags::WRITE,
            _ => Flags::READ,
        }
    }

    /// PV field suffix this descriptor reads or writes
    fn suffix(&self) -> Option<&'static str> {
        match self {
            Self::Description => Some("DESC"),
            Self::Setpoint => Some("VAL"),
            Self::PvName => None,
            Self::RelativeMove => Some("RLV"),
            Self::LimitViolation => Some("LVIO"),
            Self::Stop => Some("STOP"),
        }
    }

    /// Fields some motor records do not carry
    fn is_optional(&self) -> bool {
        matches!(self, Self::RelativeMove | Self::LimitViolation)
    }
}

pub struct MotorDescriptor {
    kind: DescriptorKind,
    /// Base name of the owning characteristic's PV
    pv_name: String,
    pv: PvClient,
}

impl MotorDescriptor {
    pub fn new(kind: DescriptorKind, pv_name: impl Into<String>, pv: PvClient) -> Self {
        Self {
            kind,
            pv_name: pv_name.into(),
            pv,
        }
    }

    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub fn uuid(&self) -> Uuid {
        self.kind.uuid()
    }

    pub fn flags(&self) -> Flags {
        self.kind.flags()
    }

    pub async fn read_value(&self) -> DescriptorValue {
        let Some(suffix) = self.kind.suffix() else {
            return DescriptorValue::Present(codec::encode(&self.pv_name));
        };
        let name = field(&self.pv_name, suffix);

        if self.kind.is_optional() {
            return match self.pv.try_read(&name, self.pv.timeouts().value()).await {
                Ok(value) => {
                    let text = match self.kind {
                        DescriptorKind::RelativeMove => value
                            .as_f64()
                            .map(codec::format_rounded)
                            .unwrap_or_else(|| value.to_string()),
                        _ => value.to_string(),
                    };
                    DescriptorValue::Present(codec::encode(&text))
                }
                Err(e) => {
                    warn!("Optional field {} unavailable: {}", name, e);
                    DescriptorValue::Absent
                }
            };
        }

        let reading = self.pv.read_value(&name).await;
        let text = match self.kind {
            DescriptorKind::Setpoint => reading.render_position(),
            _ => reading.render(),
        };
        DescriptorValue::Present(codec::encode(&text))
    }

    /// Forward a client write to the PV field. Returns the written bytes.
    pub async fn write_value(&self, value: &[u8]) -> Vec<u8> {
        match self.kind.suffix() {
            Some(suffix) if self.kind.flags().write => {
                let text = codec::decode(value);
                self.pv.write(&field(&self.pv_name, suffix), &text).await;
            }
            _ => debug!("Ignoring write to read-only descriptor {:?}", self.kind),
        }
        value.to_vec()
    }
}
