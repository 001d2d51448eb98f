//! Peripheral Service Module
//!
//! Owns the BlueZ adapter and the registration handles of the motor
//! peripheral. Dropping a handle unregisters it.

use crate::domain::poller::NotificationPoller;
use crate::domain::service::MotorService;
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::{advertisement, gatt};
use anyhow::{Context, Result};
use bluer::adv::AdvertisementHandle;
use bluer::gatt::local::ApplicationHandle;
use bluer::{Adapter, AdapterEvent, Address};
use futures::{pin_mut, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// BLE peripheral publishing the motor service
pub struct PeripheralService {
    adapter: Adapter,
    app_handle: Option<ApplicationHandle>,
    adv_handle: Option<AdvertisementHandle>,
}

impl PeripheralService {
    /// Open a BlueZ session and power on the adapter.
    ///
    /// Uses the adapter called `adapter_name`, or the default one.
    pub async fn new(adapter_name: Option<&str>) -> Result<Self> {
        let session = bluer::Session::new()
            .await
            .context("Failed to connect to BlueZ")?;

        let adapter = match adapter_name {
            Some(name) => session
                .adapter(name)
                .with_context(|| format!("Bluetooth adapter {} not found", name))?,
            None => session
                .default_adapter()
                .await
                .context("No Bluetooth adapter available")?,
        };
        info!("Using Bluetooth adapter: {}", adapter.name());

        if !adapter.is_powered().await? {
            info!("Powering on {}", adapter.name());
            adapter
                .set_powered(true)
                .await
                .context("Failed to power on adapter")?;
        }

        Ok(Self {
            adapter,
            app_handle: None,
            adv_handle: None,
        })
    }

    /// Register the GATT application for `service`
    pub async fn register_service(
        &mut self,
        service: &MotorService,
        poller: Arc<NotificationPoller>,
    ) -> Result<()> {
        let app = gatt::build_application(service, poller);
        let handle = self
            .adapter
            .serve_gatt_application(app)
            .await
            .context("GATT application registration refused")?;

        info!(
            "GATT application registered: service {} with {} characteristics",
            service.uuid(),
            service.characteristics().len()
        );
        self.app_handle = Some(handle);
        Ok(())
    }

    pub async fn register_advertisement(&mut self, settings: &Settings) -> Result<()> {
        let adv = advertisement::build_advertisement(settings);
        let handle = self
            .adapter
            .advertise(adv)
            .await
            .context("Advertisement registration refused")?;

        info!("Advertising as \"{}\"", settings.device_name);
        self.adv_handle = Some(handle);
        Ok(())
    }

    /// Log adapter events until Ctrl-C
    pub async fn run_until_interrupted(&self) -> Result<()> {
        let events = self
            .adapter
            .events()
            .await
            .context("Failed to subscribe to adapter events")?;
        pin_mut!(events);

        let ctrl_c = tokio::signal::ctrl_c();
        pin_mut!(ctrl_c);

        info!("Peripheral running, press Ctrl-C to stop");
        loop {
            tokio::select! {
                result = &mut ctrl_c => {
                    result.context("Failed to listen for Ctrl-C")?;
                    info!("Interrupted");
                    break;
                }
                event = events.next() => match event {
                    Some(AdapterEvent::DeviceAdded(addr)) => self.log_device(addr).await,
                    Some(AdapterEvent::DeviceRemoved(addr)) => {
                        info!("Device removed: {}", addr);
                    }
                    Some(AdapterEvent::PropertyChanged(prop)) => {
                        debug!("Adapter property changed: {:?}", prop);
                    }
                    None => {
                        warn!("Adapter event stream ended");
                        // Keep serving; only an interrupt ends the run.
                        (&mut ctrl_c).await.context("Failed to listen for Ctrl-C")?;
                        break;
                    }
                },
            }
        }
        Ok(())
    }

    async fn log_device(&self, addr: Address) {
        let connected = match self.adapter.device(addr) {
            Ok(device) => device.is_connected().await.unwrap_or(false),
            Err(_) => false,
        };
        if connected {
            info!("Device connected: {}", addr);
        } else {
            debug!("Device seen: {}", addr);
        }
    }

    /// Unregister the advertisement and application.
    ///
    /// With `disconnect_devices`, every connected central is dropped too.
    pub async fn shutdown(&mut self, disconnect_devices: bool) -> Result<()> {
        if self.adv_handle.take().is_some() {
            info!("Advertisement unregistered");
        }
        if self.app_handle.take().is_some() {
            info!("GATT application unregistered");
        }

        if disconnect_devices {
            self.disconnect_all().await?;
        }
        Ok(())
    }

    async fn disconnect_all(&self) -> Result<()> {
        let addresses = self
            .adapter
            .device_addresses()
            .await
            .context("Failed to list devices")?;

        for addr in addresses {
            let device = self.adapter.device(addr)?;
            if !device.is_connected().await.unwrap_or(false) {
                continue;
            }
            match device.disconnect().await {
                Ok(()) => info!("Disconnected {}", addr),
                Err(e) => warn!("Failed to disconnect {}: {}", addr, e),
            }
        }
        Ok(())
    }
}
