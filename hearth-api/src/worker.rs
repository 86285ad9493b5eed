use hearth_store::app_config::Config;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::state::AppState;

/// Background tasks owned by the API process.
pub struct Workers {
    shutdown: watch::Sender<bool>,
    sweeper: JoinHandle<()>,
    forwarders: Vec<JoinHandle<()>>,
}

/// Start the expiry sweeper and, when configured, the broker forwarder.
pub fn start_workers(state: &AppState, config: &Config) -> anyhow::Result<Workers> {
    let (shutdown, rx) = watch::channel(false);
    let sweeper = tokio::spawn(state.sweeper.clone().run(rx));

    #[allow(unused_mut)]
    let mut forwarders = Vec::new();

    #[cfg(feature = "kafka")]
    if let Some(kafka) = &config.kafka {
        let sink = hearth_store::KafkaEventSink::new(&kafka.brokers, &kafka.topic_prefix)?;
        info!("Forwarding lifecycle events to Kafka at {}", kafka.brokers);
        forwarders.push(state.notifier.forward_to(std::sync::Arc::new(sink)));
    }

    #[cfg(not(feature = "kafka"))]
    if config.kafka.is_some() {
        warn!("Kafka is configured but this build has no `kafka` feature; events stay in-process");
    }

    Ok(Workers {
        shutdown,
        sweeper,
        forwarders,
    })
}

impl Workers {
    pub async fn shutdown(self) {
        info!("Stopping background workers");
        if self.shutdown.send(true).is_err() {
            warn!("Expiry sweeper already stopped");
        }
        if let Err(e) = self.sweeper.await {
            warn!("Expiry sweeper ended abnormally: {}", e);
        }
        for forwarder in self.forwarders {
            forwarder.abort();
        }
    }
}
