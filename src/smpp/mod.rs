//! Minimal SMPP v3.4 client stack: wire codec, framed connection, and a
//! bound-session client.

pub mod client;
pub mod connection;
pub mod error;
pub mod pdu;
pub mod text;

pub use client::{Client, DeliverHandler, OutboundMessage, MAX_SINGLE_SEGMENT};
pub use connection::Connection;
pub use error::{SmppError, SmppResult};
pub use pdu::{BindKind, CommandStatus, DeliverSm, Frame, SubmitSmResp};
