//! GATT identifiers of the motor-control service
//!
//! Position and motion-status characteristics share a discriminator that
//! follows the configured PV order, starting at [`FIRST_DISCRIMINATOR`].
//! The discriminator fills the first UUID group; the second group tells the
//! two variants apart.

use uuid::Uuid;

/// Discriminator given to the first configured PV
pub const FIRST_DISCRIMINATOR: u32 = 2;

const POSITION_GROUP: u16 = 0x710e;
const MOTION_GROUP: u16 = 0x710f;
/// Last three UUID groups shared by all motor characteristics
const CHARACTERISTIC_TAIL: u128 = 0x4a5b_8d75_3e5b444bc3cf;

/// Short UUIDs of the descriptors attached to a position characteristic
pub mod descriptor {
    pub const DESCRIPTION: u16 = 0x2910;
    pub const SETPOINT: u16 = 0x2911;
    pub const PV_NAME: u16 = 0x2912;
    pub const RELATIVE_MOVE: u16 = 0x2913;
    pub const LIMIT_VIOLATION: u16 = 0x2914;
    pub const STOP: u16 = 0x2915;
}

/// Bluetooth base UUID used to expand 16-bit UUIDs
const BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;

/// Motor control service UUID
pub fn service_uuid() -> Uuid {
    Uuid::from_u128(0x84e7f883_7c80_4b64_88a5_6077ce2e8925)
}

/// PV-browser characteristic UUID, fixed regardless of the PV list
pub fn pv_browser_uuid() -> Uuid {
    derived_uuid(1, 0x7110)
}

pub fn position_uuid(discriminator: u32) -> Uuid {
    derived_uuid(discriminator, POSITION_GROUP)
}

pub fn motion_status_uuid(discriminator: u32) -> Uuid {
    derived_uuid(discriminator, MOTION_GROUP)
}

fn derived_uuid(discriminator: u32, group: u16) -> Uuid {
    Uuid::from_u128(
        ((discriminator as u128) << 96) | ((group as u128) << 80) | CHARACTERISTIC_TAIL,
    )
}

/// Expand a 16-bit SIG-style UUID onto the Bluetooth base UUID
pub fn from_short(short: u16) -> Uuid {
    Uuid::from_u128(BASE_UUID | ((short as u128) << 96))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_uuids() {
        assert_eq!(
            service_uuid().to_string(),
            "84e7f883-7c80-4b64-88a5-6077ce2e8925"
        );
        assert_eq!(
            pv_browser_uuid().to_string(),
            "00000001-7110-4a5b-8d75-3e5b444bc3cf"
        );
    }

    #[test]
    fn test_short_uuid_expansion() {
        assert_eq!(
            from_short(descriptor::DESCRIPTION).to_string(),
            "00002910-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            from_short(descriptor::STOP),
            Uuid::parse_str("00002915-0000-1000-8000-00805f9b34fb").unwrap()
        );
    }

    #[test]
    fn test_first_discriminator_layout() {
        assert_eq!(
            position_uuid(FIRST_DISCRIMINATOR).to_string(),
            "00000002-710e-4a5b-8d75-3e5b444bc3cf"
        );
        assert_eq!(
            motion_status_uuid(FIRST_DISCRIMINATOR).to_string(),
            "00000002-710f-4a5b-8d75-3e5b444bc3cf"
        );
    }

    #[test]
    fn test_wide_discriminators_stay_valid() {
        assert_eq!(
            position_uuid(10).to_string(),
            "0000000a-710e-4a5b-8d75-3e5b444bc3cf"
        );
        assert_ne!(position_uuid(17), position_uuid(16));
    }
}
