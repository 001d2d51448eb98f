//! Application context
//!
//! Wires the PV backend, the motor service and the notification poller
//! together and runs the peripheral until interrupted.

use crate::domain::poller::NotificationPoller;
use crate::domain::pv::PvClient;
use crate::domain::service::MotorService;
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::PeripheralService;
use crate::infrastructure::channel_access::CaToolsBackend;
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub struct AppContext {
    settings: Settings,
    service: MotorService,
    poller: Arc<NotificationPoller>,
}

impl AppContext {
    pub fn new(settings: Settings) -> Self {
        let backend = Arc::new(CaToolsBackend::new(&settings.channel_access));
        let pv = PvClient::new(backend, settings.pv_timeouts.clone());
        Self::with_client(settings, pv)
    }

    /// Build the context around an existing PV client
    pub fn with_client(settings: Settings, pv: PvClient) -> Self {
        let service = MotorService::new(&settings.pvs, pv);
        let poller = Arc::new(NotificationPoller::new(settings.notify_interval()));
        Self {
            settings,
            service,
            poller,
        }
    }

    #[cfg(test)]
    pub fn service(&self) -> &MotorService {
        &self.service
    }

    #[cfg(test)]
    pub fn poller(&self) -> &Arc<NotificationPoller> {
        &self.poller
    }

    /// Register with BlueZ, serve until Ctrl-C, then tear down
    pub async fn run(&self) -> Result<()> {
        if self.settings.pvs.is_empty() {
            warn!("No motor PVs configured, only the PV browser is exposed");
        }

        let mut peripheral = PeripheralService::new(self.settings.adapter_name.as_deref()).await?;
        peripheral
            .register_service(&self.service, self.poller.clone())
            .await?;
        peripheral.register_advertisement(&self.settings).await?;
        info!(
            "Serving {} motor PVs, notify period {:?}",
            self.settings.pvs.len(),
            self.poller.period()
        );

        let outcome = peripheral.run_until_interrupted().await;

        info!(
            "Shutting down, {} notification tasks active",
            self.poller.active_tasks()
        );
        self.poller.stop_all();
        peripheral
            .shutdown(self.settings.disconnect_on_shutdown)
            .await?;
        outcome
    }
}
