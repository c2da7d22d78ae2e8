pub mod api;
pub mod config;
pub mod dispatch;
pub mod github;
pub mod review;
pub mod webhook;

#[cfg(test)]
mod test_utils;

use config::{Config, ConfigError};
use dispatch::{Dispatcher, EventHandler};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub webhook_secret: String,
    /// App name without the `[bot]` suffix
    pub bot_name: String,
    pub dispatcher: Arc<Dispatcher>,
    pub handler: Arc<dyn EventHandler>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: Config,
        dispatcher: Arc<Dispatcher>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Self, ConfigError> {
        let webhook_secret = config.github.webhook_secret()?.to_string();
        let bot_name = config.github.bot_name.clone();
        Ok(Self {
            config,
            webhook_secret,
            bot_name,
            dispatcher,
            handler,
            metrics_handle: None,
        })
    }

    /// Set the metrics handle for Prometheus metrics.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
