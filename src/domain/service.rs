use crate::domain::characteristic::MotorCharacteristic;
use crate::domain::pv::PvClient;
use crate::domain::uuids;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// The motor-control GATT service: a position and a motion-status
/// characteristic per configured PV, then the PV browser.
pub struct MotorService {
    uuid: Uuid,
    characteristics: Vec<Arc<MotorCharacteristic>>,
}

impl MotorService {
    pub fn new(pvs: &[String], pv: PvClient) -> Self {
        let mut characteristics = Vec::with_capacity(pvs.len() * 2 + 1);

        for (discriminator, name) in (uuids::FIRST_DISCRIMINATOR..).zip(pvs) {
            info!("Exposing {} as characteristic {}", name, discriminator);
            characteristics.push(Arc::new(MotorCharacteristic::position(
                name,
                discriminator,
                pv.clone(),
            )));
            characteristics.push(Arc::new(MotorCharacteristic::motion_status(
                name,
                discriminator,
                pv.clone(),
            )));
        }
        characteristics.push(Arc::new(MotorCharacteristic::pv_browser(pv)));

        Self {
            uuid: uuids::service_uuid(),
            characteristics,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn characteristics(&self) -> &[Arc<MotorCharacteristic>] {
        &self.characteristics
    }
}
