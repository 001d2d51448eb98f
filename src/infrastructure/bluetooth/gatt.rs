//! GATT application
//!
//! Maps [`MotorService`] onto the `bluer` local GATT types. Reads and writes
//! call straight into the domain objects. A notify session hands the
//! characteristic to the [`NotificationPoller`] and forwards whatever the
//! poller emits to the BlueZ notifier until the client unsubscribes. A new
//! notifier for the same characteristic replaces the previous session.

use crate::domain::characteristic::MotorCharacteristic;
use crate::domain::descriptor::MotorDescriptor;
use crate::domain::poller::{NotificationPoller, NotificationSink};
use crate::domain::service::MotorService;
use bluer::gatt::local::{
    Application, Characteristic, CharacteristicNotifier, CharacteristicNotify,
    CharacteristicNotifyMethod, CharacteristicRead, CharacteristicReadRequest,
    CharacteristicWrite, CharacteristicWriteMethod, CharacteristicWriteRequest, Descriptor,
    DescriptorRead, DescriptorReadRequest, DescriptorWrite, DescriptorWriteRequest, ReqError,
    Service,
};
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Sink feeding one notify session
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { tx }
    }
}

impl NotificationSink for ChannelSink {
    fn notify_property_changed(&self, uuid: Uuid, value: Vec<u8>) -> bool {
        debug!("Notify {} ({} bytes)", uuid, value.len());
        self.tx.send(value).is_ok()
    }
}

pub fn build_application(service: &MotorService, poller: Arc<NotificationPoller>) -> Application {
    let characteristics = service
        .characteristics()
        .iter()
        .map(|ch| build_characteristic(ch.clone(), poller.clone()))
        .collect();

    Application {
        services: vec![Service {
            uuid: service.uuid(),
            primary: true,
            characteristics,
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn build_characteristic(
    characteristic: Arc<MotorCharacteristic>,
    poller: Arc<NotificationPoller>,
) -> Characteristic {
    let flags = characteristic.flags();
    debug!(
        "{:?} characteristic {} {}",
        characteristic.kind(),
        characteristic.uuid(),
        flags
    );

    let read = flags.read.then(|| {
        let characteristic = characteristic.clone();
        CharacteristicRead {
            read: true,
            fun: Box::new(move |req: CharacteristicReadRequest| {
                let characteristic = characteristic.clone();
                async move { read_characteristic(&characteristic, req.offset).await }.boxed()
            }),
            ..Default::default()
        }
    });

    let write = flags.write.then(|| {
        let characteristic = characteristic.clone();
        CharacteristicWrite {
            write: true,
            method: CharacteristicWriteMethod::Fun(Box::new(
                move |value: Vec<u8>, _req: CharacteristicWriteRequest| {
                    let characteristic = characteristic.clone();
                    async move {
                        characteristic.write_value(&value).await;
                        Ok(())
                    }
                    .boxed()
                },
            )),
            ..Default::default()
        }
    });

    let notify = flags.notify.then(|| {
        let characteristic = characteristic.clone();
        CharacteristicNotify {
            notify: true,
            method: CharacteristicNotifyMethod::Fun(Box::new(
                move |notifier: CharacteristicNotifier| {
                    let characteristic = characteristic.clone();
                    let poller = poller.clone();
                    notify_session(characteristic, poller, notifier).boxed()
                },
            )),
            ..Default::default()
        }
    });

    let descriptors = characteristic
        .descriptors()
        .iter()
        .map(|d| build_descriptor(d.clone()))
        .collect();

    Characteristic {
        uuid: characteristic.uuid(),
        read,
        write,
        notify,
        descriptors,
        ..Default::default()
    }
}

fn build_descriptor(descriptor: Arc<MotorDescriptor>) -> Descriptor {
    let flags = descriptor.flags();
    debug!("  {:?} descriptor {} {}", descriptor.kind(), descriptor.uuid(), flags);

    let read = flags.read.then(|| {
        let descriptor = descriptor.clone();
        DescriptorRead {
            read: true,
            fun: Box::new(move |req: DescriptorReadRequest| {
                let descriptor = descriptor.clone();
                async move {
                    let value = descriptor.read_value().await.into_bytes();
                    slice_from(value, req.offset)
                }
                .boxed()
            }),
            ..Default::default()
        }
    });

    let write = flags.write.then(|| {
        let descriptor = descriptor.clone();
        DescriptorWrite {
            write: true,
            fun: Box::new(move |value: Vec<u8>, _req: DescriptorWriteRequest| {
                let descriptor = descriptor.clone();
                async move {
                    descriptor.write_value(&value).await;
                    Ok(())
                }
                .boxed()
            }),
            ..Default::default()
        }
    });

    Descriptor {
        uuid: descriptor.uuid(),
        read,
        write,
        ..Default::default()
    }
}

pub async fn read_characteristic(
    characteristic: &MotorCharacteristic,
    offset: u16,
) -> Result<Vec<u8>, ReqError> {
    let value = characteristic.read_value().await;
    debug!("Read {} at offset {}", characteristic.uuid(), offset);
    slice_from(value, offset)
}

/// Tail of `value` for a long read continuing at `offset`
fn slice_from(value: Vec<u8>, offset: u16) -> Result<Vec<u8>, ReqError> {
    match usize::from(offset) {
        0 => Ok(value),
        start if start <= value.len() => Ok(value[start..].to_vec()),
        _ => Err(ReqError::InvalidOffset),
    }
}

async fn notify_session(
    characteristic: Arc<MotorCharacteristic>,
    poller: Arc<NotificationPoller>,
    mut notifier: CharacteristicNotifier,
) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = Arc::new(ChannelSink::new(tx));

    let Some(session) = poller.take_over_notify(characteristic.clone(), sink).await else {
        return;
    };

    loop {
        // `rx` closes when a newer session replaced this one.
        let value = tokio::select! {
            value = rx.recv() => value,
            _ = notifier.stopped() => None,
        };
        let Some(value) = value else {
            break;
        };
        if let Err(e) = notifier.notify(value).await {
            warn!("Notification to {} failed: {}", characteristic.uuid(), e);
            break;
        }
    }

    poller.end_session(&characteristic, session);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pv::testing::{client, MemoryPvs};
    use crate::domain::uuids;
    use std::time::Duration;

    fn service(pvs: &Arc<MemoryPvs>) -> MotorService {
        MotorService::new(&["IOC:m1".to_string()], client(pvs))
    }

    #[test]
    fn test_slice_from_offset() {
        let value = b"12.5".to_vec();
        assert_eq!(slice_from(value.clone(), 0).unwrap(), b"12.5".to_vec());
        assert_eq!(slice_from(value.clone(), 2).unwrap(), b".5".to_vec());
        assert_eq!(slice_from(value.clone(), 4).unwrap(), Vec::<u8>::new());
        assert!(matches!(slice_from(value, 5), Err(ReqError::InvalidOffset)));
    }

    #[test]
    fn test_channel_sink_reports_closed_receiver() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);

        assert!(sink.notify_property_changed(Uuid::nil(), b"1".to_vec()));
        assert_eq!(rx.try_recv().unwrap(), b"1".to_vec());

        drop(rx);
        assert!(!sink.notify_property_changed(Uuid::nil(), b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_application_layout() {
        let pvs = MemoryPvs::new();
        let poller = Arc::new(NotificationPoller::new(Duration::from_secs(2)));
        let app = build_application(&service(&pvs), poller);

        assert_eq!(app.services.len(), 1);
        let gatt = &app.services[0];
        assert_eq!(gatt.uuid, uuids::service_uuid());
        assert!(gatt.primary);
        assert_eq!(gatt.characteristics.len(), 3);

        let position = &gatt.characteristics[0];
        assert!(position.read.is_some());
        assert!(position.write.is_some());
        assert!(position.notify.is_some());
        assert_eq!(position.descriptors.len(), 6);

        let status = &gatt.characteristics[1];
        assert!(status.read.is_some());
        assert!(status.write.is_none());
        assert!(status.notify.is_some());
        assert!(status.descriptors.is_empty());

        assert_eq!(gatt.characteristics[2].uuid, uuids::pv_browser_uuid());
    }

    #[tokio::test]
    async fn test_descriptor_access_modes() {
        let pvs = MemoryPvs::new();
        let poller = Arc::new(NotificationPoller::new(Duration::from_secs(2)));
        let app = build_application(&service(&pvs), poller);
        let descriptors = &app.services[0].characteristics[0].descriptors;

        let modes: Vec<(bool, bool)> = descriptors
            .iter()
            .map(|d| (d.read.is_some(), d.write.is_some()))
            .collect();
        assert_eq!(
            modes,
            vec![
                (true, false),
                (true, false),
                (true, false),
                (true, true),
                (true, false),
                (false, true),
            ]
        );
        assert_eq!(descriptors[5].uuid, uuids::from_short(0x2915));
    }

    #[tokio::test]
    async fn test_read_characteristic_with_offset() {
        let pvs = MemoryPvs::new();
        pvs.add_motor("IOC:m1", 123.5);
        let service = service(&pvs);
        let position = &service.characteristics()[0];

        assert_eq!(
            read_characteristic(position, 0).await.unwrap(),
            b"123.5".to_vec()
        );
        assert_eq!(read_characteristic(position, 3).await.unwrap(), b".5".to_vec());
        assert!(read_characteristic(position, 9).await.is_err());
    }
}
