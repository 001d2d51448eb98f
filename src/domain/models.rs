use std::fmt;

use crate::domain::codec;

/// A value read from a process variable.
#[derive(Debug, Clone, PartialEq)]
pub enum PvValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl PvValue {
    /// Parse the textual output of a PV read.
    ///
    /// Integers win over floats so that enum-like fields (`.LVIO`, `.MOVN`)
    /// keep their `0`/`1` form.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            PvValue::Integer(i)
        } else if let Ok(f) = trimmed.parse::<f64>() {
            PvValue::Float(f)
        } else {
            PvValue::Text(trimmed.to_string())
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PvValue::Integer(i) => Some(*i as f64),
            PvValue::Float(f) => Some(*f),
            PvValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for PvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PvValue::Integer(i) => write!(f, "{}", i),
            PvValue::Float(v) => f.write_str(&codec::format_rounded(*v)),
            PvValue::Text(s) => f.write_str(s),
        }
    }
}

/// Outcome of a tolerant PV read
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Value(PvValue),
    Invalid,
}

impl Reading {
    pub fn value(&self) -> Option<&PvValue> {
        match self {
            Reading::Value(v) => Some(v),
            Reading::Invalid => None,
        }
    }

    /// Text form with the `Invalid` placeholder
    pub fn render(&self) -> String {
        match self {
            Reading::Value(v) => v.to_string(),
            Reading::Invalid => codec::INVALID.to_string(),
        }
    }

    /// Text form of a motor value: always numeric, rounded to 5 decimals.
    pub fn render_position(&self) -> String {
        match self.value().and_then(PvValue::as_f64) {
            Some(v) => codec::format_rounded(v),
            None => codec::INVALID.to_string(),
        }
    }
}

/// GATT operations an attribute accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub read: bool,
    pub write: bool,
    pub notify: bool,
}

impl Flags {
    pub const READ: Flags = Flags {
        read: true,
        write: false,
        notify: false,
    };
    pub const WRITE: Flags = Flags {
        read: false,
        write: true,
        notify: false,
    };
    pub const READ_WRITE: Flags = Flags {
        read: true,
        write: true,
        notify: false,
    };
    pub const READ_NOTIFY: Flags = Flags {
        read: true,
        write: false,
        notify: true,
    };
    pub const ALL: Flags = Flags {
        read: true,
        write: true,
        notify: true,
    };
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (self.read, "read"),
            (self.write, "write"),
            (self.notify, "notify"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Result of an optional descriptor read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorValue {
    Present(Vec<u8>),
    /// The field could not be read; nothing is returned to the client.
    Absent,
}

impl DescriptorValue {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            DescriptorValue::Present(bytes) => bytes,
            DescriptorValue::Absent => Vec::new(),
        }
    }
}
