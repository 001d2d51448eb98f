use crate::domain::settings::Settings;
use bluer::adv::{Advertisement, Feature, Type};
use std::collections::{BTreeMap, BTreeSet};

/// Advertising payload for the motor peripheral.
///
/// The service UUID is left out; a 128-bit UUID next to the name and
/// manufacturer data would overflow the 31-byte legacy payload.
pub fn build_advertisement(settings: &Settings) -> Advertisement {
    let manufacturer_data = BTreeMap::from([(
        settings.manufacturer_id,
        settings.manufacturer_data.clone(),
    )]);

    let mut system_includes = BTreeSet::new();
    if settings.include_tx_power {
        system_includes.insert(Feature::TxPower);
    }

    Advertisement {
        advertisement_type: Type::Peripheral,
        local_name: Some(settings.device_name.clone()),
        manufacturer_data,
        system_includes,
        discoverable: Some(true),
        ..Default::default()
    }
}
