// ABOUTME: Bound-session SMPP client driving submits and servicing inbound PDUs
// ABOUTME: Handles segmentation, interleaved deliver_sm and link supervision

use std::sync::Arc;

use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::smpp::connection::Connection;
use crate::smpp::error::{SmppError, SmppResult};
use crate::smpp::pdu::{
    Bind, BindKind, CommandStatus, DeliverSm, Frame, SubmitSm, SubmitSmResp,
};

/// Largest payload sent as a single submit_sm. Longer payloads are split
/// into UDH-concatenated segments.
pub const MAX_SINGLE_SEGMENT: usize = 132;

/// ESM class bit marking a UDH at the start of the short message.
const ESM_UDHI: u8 = 0x40;

/// Callback invoked for every inbound deliver_sm.
pub type DeliverHandler = Arc<dyn Fn(&DeliverSm) + Send + Sync>;

/// A message ready for submission, already encoded for its data coding.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub source_addr: String,
    pub source_ton: u8,
    pub source_npi: u8,
    pub dest_addr: String,
    pub dest_ton: u8,
    pub dest_npi: u8,
    pub data_coding: u8,
    pub registered_delivery: bool,
    pub payload: Vec<u8>,
}

/// A bound SMPP session.
///
/// Established with [`Client::bind`]; the connection is authenticated
/// before the value exists. Submission is request-response: inbound
/// deliver_sm and enquire_link PDUs that arrive while a response is
/// awaited are handled inline.
pub struct Client {
    connection: Connection,
    sequence_number: u32,
    msg_ref: u8,
    deliver_handler: Option<DeliverHandler>,
}

impl Client {
    /// Connect to `addr` and perform the bind handshake for `kind`.
    pub async fn bind(
        addr: &str,
        kind: BindKind,
        system_id: &str,
        password: &str,
    ) -> SmppResult<Client> {
        let socket = TcpStream::connect(addr).await?;
        let mut connection = Connection::new(socket);

        let bind = Frame::Bind(Bind {
            kind,
            sequence_number: 1,
            system_id: system_id.to_string(),
            password: password.to_string(),
            system_type: String::new(),
        });
        connection.write_frame(&bind).await?;

        match connection.read_frame().await? {
            Some(Frame::BindResp(resp)) => {
                if !resp.status.is_ok() {
                    return Err(SmppError::Protocol(resp.status));
                }
                debug!(system_id = %resp.system_id, "bound");
                Ok(Client {
                    connection,
                    sequence_number: 1,
                    msg_ref: 0,
                    deliver_handler: None,
                })
            }
            Some(other) => Err(SmppError::UnexpectedPdu {
                expected: "bind_resp",
                actual: other.name(),
            }),
            None => Err(SmppError::ConnectionClosed),
        }
    }

    pub fn set_deliver_handler(&mut self, handler: DeliverHandler) {
        self.deliver_handler = Some(handler);
    }

    fn next_sequence(&mut self) -> u32 {
        self.sequence_number = self.sequence_number.wrapping_add(1);
        self.sequence_number
    }

    /// Submit one message, segmenting when the payload exceeds
    /// [`MAX_SINGLE_SEGMENT`]. Returns the response for each segment in
    /// order. A non-zero response status is not an error here; callers
    /// account for it.
    pub async fn submit(&mut self, message: &OutboundMessage) -> SmppResult<Vec<SubmitSmResp>> {
        if message.payload.len() <= MAX_SINGLE_SEGMENT {
            let pdu = self.build_submit(message, 0, message.payload.clone());
            return Ok(vec![self.submit_one(pdu).await?]);
        }

        self.msg_ref = self.msg_ref.wrapping_add(1);
        let msg_ref = self.msg_ref;
        let total = message.payload.len().div_ceil(MAX_SINGLE_SEGMENT) as u8;
        let mut responses = Vec::with_capacity(total as usize);
        for (index, chunk) in message.payload.chunks(MAX_SINGLE_SEGMENT).enumerate() {
            // Concatenation UDH: IEL 5, IEI 0 (8-bit ref), ref, total, seq.
            let mut body = Vec::with_capacity(6 + chunk.len());
            body.extend_from_slice(&[0x05, 0x00, 0x03, msg_ref, total, index as u8 + 1]);
            body.extend_from_slice(chunk);
            let pdu = self.build_submit(message, ESM_UDHI, body);
            responses.push(self.submit_one(pdu).await?);
        }
        Ok(responses)
    }

    fn build_submit(&mut self, message: &OutboundMessage, esm_class: u8, body: Vec<u8>) -> SubmitSm {
        SubmitSm {
            sequence_number: self.next_sequence(),
            source_addr_ton: message.source_ton,
            source_addr_npi: message.source_npi,
            source_addr: message.source_addr.clone(),
            dest_addr_ton: message.dest_ton,
            dest_addr_npi: message.dest_npi,
            destination_addr: message.dest_addr.clone(),
            esm_class,
            registered_delivery: message.registered_delivery as u8,
            data_coding: message.data_coding,
            short_message: body,
        }
    }

    async fn submit_one(&mut self, pdu: SubmitSm) -> SmppResult<SubmitSmResp> {
        let sequence = pdu.sequence_number;
        self.connection.write_frame(&Frame::SubmitSm(pdu)).await?;

        loop {
            match self.connection.read_frame().await? {
                Some(Frame::SubmitSmResp(resp)) => {
                    if resp.sequence_number != sequence {
                        warn!(
                            expected = sequence,
                            got = resp.sequence_number,
                            "submit_sm_resp sequence mismatch"
                        );
                    }
                    return Ok(resp);
                }
                Some(Frame::DeliverSm(dsm)) => self.handle_deliver(dsm).await?,
                Some(Frame::EnquireLink { sequence_number }) => {
                    self.connection
                        .write_frame(&Frame::EnquireLinkResp { sequence_number })
                        .await?;
                }
                Some(other) => {
                    return Err(SmppError::UnexpectedPdu {
                        expected: "submit_sm_resp",
                        actual: other.name(),
                    });
                }
                None => return Err(SmppError::ConnectionClosed),
            }
        }
    }

    /// Process a single inbound PDU on a receiving session.
    ///
    /// Returns `ConnectionClosed` when the peer closes or unbinds; the
    /// session loop rebinds on that.
    pub async fn serve_once(&mut self) -> SmppResult<()> {
        match self.connection.read_frame().await? {
            Some(Frame::DeliverSm(dsm)) => self.handle_deliver(dsm).await,
            Some(Frame::EnquireLink { sequence_number }) => {
                self.connection
                    .write_frame(&Frame::EnquireLinkResp { sequence_number })
                    .await
            }
            Some(Frame::Unbind { sequence_number }) => {
                self.connection
                    .write_frame(&Frame::UnbindResp {
                        sequence_number,
                        status: CommandStatus::Ok,
                    })
                    .await?;
                Err(SmppError::ConnectionClosed)
            }
            Some(other) => {
                warn!(frame = other.name(), "unexpected inbound frame");
                Ok(())
            }
            None => Err(SmppError::ConnectionClosed),
        }
    }

    async fn handle_deliver(&mut self, dsm: DeliverSm) -> SmppResult<()> {
        let sequence_number = dsm.sequence_number;
        if let Some(handler) = &self.deliver_handler {
            handler(&dsm);
        }
        self.connection
            .write_frame(&Frame::DeliverSmResp {
                sequence_number,
                status: CommandStatus::Ok,
            })
            .await
    }

    /// Best-effort unbind. Transport errors are reported but the session
    /// is considered finished either way.
    pub async fn unbind(&mut self) -> SmppResult<()> {
        let sequence_number = self.next_sequence();
        self.connection
            .write_frame(&Frame::Unbind { sequence_number })
            .await?;
        loop {
            match self.connection.read_frame().await? {
                Some(Frame::UnbindResp { .. }) | None => return Ok(()),
                Some(Frame::DeliverSm(dsm)) => self.handle_deliver(dsm).await?,
                Some(other) => {
                    debug!(frame = other.name(), "frame while unbinding");
                }
            }
        }
    }
}
