mod app;
mod cli;
mod domain;
mod infrastructure;

use anyhow::Context;
use clap::Parser;
use domain::settings::SettingsService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    let mut settings_service = match &args.config {
        Some(path) => SettingsService::load(path.clone()),
        None => SettingsService::new()?,
    };
    args.apply(settings_service.get_mut());

    let _logging_guard = infrastructure::logging::init_logger(&settings_service.get().log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    tracing::info!("Starting BLE motor control bridge");

    if args.save_config {
        settings_service.save().with_context(|| {
            format!(
                "Failed to save settings to {}",
                settings_service.path().display()
            )
        })?;
        tracing::info!("Settings saved to {}", settings_service.path().display());
    }

    let context = app::AppContext::new(settings_service.get().clone());
    context.run().await
}
