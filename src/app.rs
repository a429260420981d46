//! Shared application state: the rate broker, the metrics sink and the
//! connection managers, one per configured server.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::info;

use crate::broker::Broker;
use crate::config::ServiceConfig;
use crate::manager::ConnectionManager;
use crate::metrics::MetricsSink;
use crate::session::SessionState;

/// Counter interval width.
const METRICS_GRANULARITY: Duration = Duration::from_secs(5);

/// How much counter history is retained.
const METRICS_RETENTION: Duration = Duration::from_secs(60);

pub struct App {
    broker: Broker,
    sink: Arc<MetricsSink>,
    managers: Mutex<Vec<ConnectionManager>>,
}

impl App {
    pub fn new(conf: &ServiceConfig) -> App {
        let sink = Arc::new(MetricsSink::new(METRICS_GRANULARITY, METRICS_RETENTION));
        let managers = conf
            .smpp
            .iter()
            .map(|server| ConnectionManager::new(server.clone(), Arc::clone(&sink)))
            .collect();
        App {
            broker: Broker::new(),
            sink,
            managers: Mutex::new(managers),
        }
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn sink(&self) -> Arc<MetricsSink> {
        Arc::clone(&self.sink)
    }

    /// Bind every configured session. Idempotent; already-running managers
    /// are left alone.
    pub async fn start_sessions(&self) {
        let mut managers = self.managers.lock().await;
        for manager in managers.iter_mut() {
            manager.start(&self.broker);
        }
    }

    /// Start traffic at `tps` per session, binding sessions first if a
    /// previous stop tore them down.
    pub async fn start_traffic(&self, tps: u32) {
        self.start_sessions().await;
        info!(tps, "starting traffic");
        self.broker.publish(tps);
    }

    /// Zero the rate and tear every session down.
    pub async fn stop_traffic(&self) {
        info!("stopping traffic");
        self.broker.publish(0);
        let mut managers = self.managers.lock().await;
        for manager in managers.iter_mut() {
            manager.stop().await;
        }
    }

    /// Session states across all managers, for status reporting.
    pub async fn session_states(&self) -> Vec<SessionState> {
        let managers = self.managers.lock().await;
        managers
            .iter()
            .flat_map(ConnectionManager::session_states)
            .collect()
    }
}
