//! SMPP load generation and interoperability test client.
//!
//! The crate binds a configurable fleet of SMPP sessions against one or
//! more servers, drives rate-controlled submit_sm traffic through them,
//! counts the outcomes in windowed metrics, and exposes a small REST
//! surface to change the rate at runtime.
//!
//! Layering, bottom up:
//!
//! - [`smpp`]: wire codec, framed connection and a bound-session client
//! - [`limiter`], [`broker`], [`metrics`], [`generator`]: the traffic
//!   machinery: admission control, runtime rate fan-out, windowed
//!   counters and message synthesis
//! - [`session`], [`manager`], [`app`]: lifecycle: one worker per
//!   session, a fleet per server, shared state over all of them
//! - [`http`]: the `/startLoop` and `/stopLoop` control endpoints

pub mod app;
pub mod broker;
pub mod config;
pub mod generator;
pub mod http;
pub mod limiter;
pub mod manager;
pub mod metrics;
pub mod session;
pub mod smpp;

pub use app::App;
pub use broker::Broker;
pub use config::AppConfig;
pub use generator::MessageGenerator;
pub use limiter::RateLimiter;
pub use manager::ConnectionManager;
pub use metrics::{Counter, MetricsSink};
pub use session::SessionState;
