//! Per-server session fleet: spawns the configured number of sessions
//! against one SMPP server and tears them down on demand.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::broker::Broker;
use crate::config::ServerConfig;
use crate::generator::MessageGenerator;
use crate::limiter::RateLimiter;
use crate::metrics::MetricsSink;
use crate::session::{run_session, spawn_rate_listener, SessionContext, SessionState};

struct SessionHandle {
    cancel: CancellationToken,
    status: watch::Receiver<SessionState>,
    rate_task: JoinHandle<()>,
    worker: JoinHandle<()>,
}

/// Owns the sessions of one configured server entry.
pub struct ConnectionManager {
    conf: Arc<ServerConfig>,
    generator: Arc<MessageGenerator>,
    sink: Arc<MetricsSink>,
    sessions: Vec<SessionHandle>,
}

impl ConnectionManager {
    pub fn new(conf: ServerConfig, sink: Arc<MetricsSink>) -> ConnectionManager {
        let generator = Arc::new(MessageGenerator::new(&conf.message.send));
        ConnectionManager {
            conf: Arc::new(conf),
            generator,
            sink,
            sessions: Vec::new(),
        }
    }

    /// Spawn the configured number of sessions. Each gets its own limiter,
    /// rate subscription and cancellation token; the shared generator keeps
    /// sequential addressing global across the fleet.
    pub fn start(&mut self, broker: &Broker) {
        if self.is_running() {
            debug!(server = %self.conf.server.socket_addr(), "sessions already running");
            return;
        }
        let count = self.conf.client.count as usize;
        info!(
            server = %self.conf.server.socket_addr(),
            role = self.conf.client.role.as_str(),
            count,
            "starting sessions"
        );

        for id in 0..count {
            let cancel = CancellationToken::new();
            let limiter = Arc::new(RateLimiter::new());
            let (status_tx, status_rx) = watch::channel(SessionState::Binding);

            let rate_task =
                spawn_rate_listener(Arc::clone(&limiter), broker.subscribe(), cancel.clone());
            let ctx = SessionContext {
                id,
                conf: Arc::clone(&self.conf),
                generator: Arc::clone(&self.generator),
                sink: Arc::clone(&self.sink),
                limiter,
                cancel: cancel.clone(),
                status: status_tx,
            };
            let worker = tokio::spawn(run_session(ctx));

            self.sessions.push(SessionHandle {
                cancel,
                status: status_rx,
                rate_task,
                worker,
            });
        }
    }

    /// Cancel every session and wait for its tasks to finish. Rate
    /// subscriptions drop with the listener tasks.
    pub async fn stop(&mut self) {
        if self.sessions.is_empty() {
            return;
        }
        info!(server = %self.conf.server.socket_addr(), "stopping sessions");
        for session in &self.sessions {
            session.cancel.cancel();
        }
        for session in self.sessions.drain(..) {
            let _ = session.worker.await;
            let _ = session.rate_task.await;
        }
    }

    pub fn is_running(&self) -> bool {
        !self.sessions.is_empty()
    }

    /// Current state of each session, in spawn order.
    pub fn session_states(&self) -> Vec<SessionState> {
        self.sessions
            .iter()
            .map(|session| *session.status.borrow())
            .collect()
    }
}
