mod appointment;
mod classifier;
mod config;
mod facilities;
mod model_config;
mod notify;
mod sanitize;
mod service;
mod upload;

use std::sync::Arc;

use tonic::transport::Server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::appointment::ProviderDirectory;
use crate::classifier::{GLOBAL_CLASSIFIER, ScoreModel};
use crate::config::AppConfig;
use crate::notify::{NotificationService, SmtpRelay};
use crate::service::ScreeningService;
use crate::service::pb::screening_server::ScreeningServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;
    info!(?config, "configuration loaded");

    // Without a classifier there is nothing to serve.
    let model: Arc<dyn ScoreModel> = match GLOBAL_CLASSIFIER.as_ref() {
        Ok(model) => Arc::clone(model) as Arc<dyn ScoreModel>,
        Err(e) => {
            error!(error = %e, "failed to load classifier");
            return Err(format!("classifier unavailable: {e}").into());
        }
    };

    let providers = ProviderDirectory::from_emails(&config.provider_emails)?;
    let notifier = NotificationService::new(Arc::new(SmtpRelay::new(config.mail.clone())?));
    let screening = ScreeningService::new(
        model,
        upload::http_client()?,
        providers,
        notifier,
        config.facilities_csv.clone(),
    );

    let reflection_service = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(service::pb::FILE_DESCRIPTOR_SET)
        .build_v1()?;

    info!(addr = %config.listen_addr, "screening server listening");

    Server::builder()
        .add_service(ScreeningServer::new(screening))
        .add_service(reflection_service)
        .serve_with_shutdown(config.listen_addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
