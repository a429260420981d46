//! A single SMPP session: bind, drive traffic, rebind on loss.
//!
//! Each session runs as one task owning its socket, plus a companion task
//! that applies rate updates to the session's limiter. Lifecycle is
//! controlled through a cancellation token; observers watch the state
//! channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::Subscription;
use crate::config::{ServerConfig, SessionRole};
use crate::generator::MessageGenerator;
use crate::limiter::RateLimiter;
use crate::metrics::{Counter, MetricsSink};
use crate::smpp::{BindKind, Client, SmppError};

/// Delay between losing a session and the next bind attempt.
pub const REBIND_DELAY: Duration = Duration::from_secs(5);

/// Sleep after the limiter denies an admission.
const DENIED_SLEEP: Duration = Duration::from_millis(10);

/// Backoff after a non-fatal submit failure.
const SUBMIT_FAILURE_BACKOFF: Duration = Duration::from_micros(50);

/// Rate window length applied on every broadcast update.
const RATE_CYCLE: Duration = Duration::from_secs(1);

/// Externally observable session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Binding,
    Connected,
    Reconnecting,
}

/// Everything a session worker needs, owned per session.
pub struct SessionContext {
    pub id: usize,
    pub conf: Arc<ServerConfig>,
    pub generator: Arc<MessageGenerator>,
    pub sink: Arc<MetricsSink>,
    pub limiter: Arc<RateLimiter>,
    pub cancel: CancellationToken,
    pub status: watch::Sender<SessionState>,
}

fn bind_kind(role: SessionRole) -> BindKind {
    match role {
        SessionRole::Transmitter => BindKind::Transmitter,
        SessionRole::Receiver => BindKind::Receiver,
        SessionRole::Transceiver => BindKind::Transceiver,
    }
}

/// Apply broadcast rate updates to this session's limiter until cancelled
/// or the broker goes away.
pub fn spawn_rate_listener(
    limiter: Arc<RateLimiter>,
    mut subscription: Subscription,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                update = subscription.recv() => match update {
                    Some(tps) => limiter.configure(tps, RATE_CYCLE),
                    None => break,
                },
            }
        }
    })
}

enum LoopExit {
    Cancelled,
    Failed(SmppError),
}

/// Session worker body: bind, run the role's traffic loop, rebind after
/// [`REBIND_DELAY`] on loss, exit on cancellation.
pub async fn run_session(ctx: SessionContext) {
    let role = ctx.conf.client.role;
    let addr = ctx.conf.server.socket_addr();

    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let _ = ctx.status.send(SessionState::Binding);

        let bound = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            result = Client::bind(
                &addr,
                bind_kind(role),
                &ctx.conf.server.username,
                &ctx.conf.server.password,
            ) => result,
        };
        let mut client = match bound {
            Ok(client) => client,
            Err(e) => {
                warn!(session = ctx.id, server = %addr, error = %e, "bind failed");
                let _ = ctx.status.send(SessionState::Reconnecting);
                if !pause(&ctx.cancel, REBIND_DELAY).await {
                    break;
                }
                continue;
            }
        };

        if role.can_receive() {
            let sink = Arc::clone(&ctx.sink);
            client.set_deliver_handler(Arc::new(move |dsm| {
                sink.increment(Counter::Deliver);
                if !dsm.status.is_ok() {
                    sink.increment(Counter::DeliverFailure);
                }
            }));
        }

        let _ = ctx.status.send(SessionState::Connected);
        info!(session = ctx.id, server = %addr, role = role.as_str(), "session bound");

        let exit = if role.can_send() {
            submit_loop(&ctx, &mut client).await
        } else {
            receive_loop(&ctx, &mut client).await
        };

        match exit {
            LoopExit::Cancelled => {
                if let Err(e) = client.unbind().await {
                    debug!(session = ctx.id, error = %e, "unbind failed");
                }
                break;
            }
            LoopExit::Failed(e) => {
                warn!(session = ctx.id, server = %addr, error = %e, "session lost, rebinding");
                let _ = ctx.status.send(SessionState::Reconnecting);
                if !pause(&ctx.cancel, REBIND_DELAY).await {
                    break;
                }
            }
        }
    }

    debug!(session = ctx.id, "session finished");
}

/// Sleep for `duration` unless cancelled first. Returns false on cancel.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

async fn submit_loop(ctx: &SessionContext, client: &mut Client) -> LoopExit {
    loop {
        if ctx.cancel.is_cancelled() {
            return LoopExit::Cancelled;
        }
        if !ctx.limiter.try_acquire() {
            // A transceiver must keep servicing inbound traffic while the
            // limiter holds outbound back.
            if ctx.conf.client.role.can_receive() {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return LoopExit::Cancelled,
                    result = client.serve_once() => {
                        if let Err(e) = result {
                            return LoopExit::Failed(e);
                        }
                    }
                    _ = tokio::time::sleep(DENIED_SLEEP) => {}
                }
            } else if !pause(&ctx.cancel, DENIED_SLEEP).await {
                return LoopExit::Cancelled;
            }
            continue;
        }

        let message = ctx.generator.generate();
        let result = tokio::select! {
            _ = ctx.cancel.cancelled() => return LoopExit::Cancelled,
            result = client.submit(&message) => result,
        };
        match result {
            Ok(responses) => {
                for resp in responses {
                    ctx.sink.increment(Counter::Submit);
                    if !resp.status.is_ok() {
                        ctx.sink.increment(Counter::SubmitFailure);
                        debug!(session = ctx.id, status = ?resp.status, "submit rejected");
                    }
                }
            }
            Err(e) if e.is_fatal() => return LoopExit::Failed(e),
            Err(e) => {
                debug!(session = ctx.id, error = %e, "submit failed");
                tokio::time::sleep(SUBMIT_FAILURE_BACKOFF).await;
            }
        }
    }
}

async fn receive_loop(ctx: &SessionContext, client: &mut Client) -> LoopExit {
    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => return LoopExit::Cancelled,
            result = client.serve_once() => {
                if let Err(e) = result {
                    return LoopExit::Failed(e);
                }
            }
        }
    }
}
