//! SMPP v3.4 PDU structures and wire codec.
//!
//! Covers the subset of the protocol the load engine drives: the bind family,
//! submit_sm, deliver_sm, unbind, enquire_link and generic_nack, with their
//! responses. Requests and responses both encode and decode so the test
//! harness can play the server side.

use std::io::Cursor;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

/// Hard cap on accepted PDU size.
pub const MAX_PDU_SIZE: u32 = 65536;

/// SMPP command identifiers (Section 5.1.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum CommandId {
    GenericNack = 0x8000_0000,
    BindReceiver = 0x0000_0001,
    BindReceiverResp = 0x8000_0001,
    BindTransmitter = 0x0000_0002,
    BindTransmitterResp = 0x8000_0002,
    SubmitSm = 0x0000_0004,
    SubmitSmResp = 0x8000_0004,
    DeliverSm = 0x0000_0005,
    DeliverSmResp = 0x8000_0005,
    Unbind = 0x0000_0006,
    UnbindResp = 0x8000_0006,
    BindTransceiver = 0x0000_0009,
    BindTransceiverResp = 0x8000_0009,
    EnquireLink = 0x0000_0015,
    EnquireLinkResp = 0x8000_0015,
}

/// SMPP command status codes (Section 5.1.3). Values we do not model fold
/// into `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum CommandStatus {
    Ok = 0x0000_0000,
    InvalidMsgLength = 0x0000_0001,
    InvalidCommandLength = 0x0000_0002,
    InvalidCommandId = 0x0000_0003,
    IncorrectBindStatus = 0x0000_0004,
    AlreadyBound = 0x0000_0005,
    SystemError = 0x0000_0008,
    InvalidSourceAddress = 0x0000_000A,
    InvalidDestinationAddress = 0x0000_000B,
    BindFailed = 0x0000_000D,
    InvalidPassword = 0x0000_000E,
    InvalidSystemId = 0x0000_000F,
    MessageQueueFull = 0x0000_0014,
    ThrottlingError = 0x0000_0058,
    #[num_enum(catch_all)]
    Other(u32),
}

impl CommandStatus {
    pub fn is_ok(self) -> bool {
        self == CommandStatus::Ok
    }
}

/// Which bind operation a session performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindKind {
    Transmitter,
    Receiver,
    Transceiver,
}

impl BindKind {
    fn request_id(self) -> CommandId {
        match self {
            BindKind::Transmitter => CommandId::BindTransmitter,
            BindKind::Receiver => CommandId::BindReceiver,
            BindKind::Transceiver => CommandId::BindTransceiver,
        }
    }

    pub fn response_id(self) -> CommandId {
        match self {
            BindKind::Transmitter => CommandId::BindTransmitterResp,
            BindKind::Receiver => CommandId::BindReceiverResp,
            BindKind::Transceiver => CommandId::BindTransceiverResp,
        }
    }
}

/// Codec failures. `Incomplete` is the expected partial-read condition; the
/// rest invalidate the connection.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("incomplete PDU: need more data")]
    Incomplete,

    #[error("invalid command_id: {0:#010x}")]
    InvalidCommandId(u32),

    #[error("invalid command_length: {0}")]
    InvalidCommandLength(u32),

    #[error("malformed {0} PDU")]
    Malformed(&'static str),

    #[error("non-UTF-8 data in field '{field}'")]
    Utf8 {
        field: &'static str,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

/// The 16-byte header common to every PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PduHeader {
    pub command_length: u32,
    pub command_id: CommandId,
    pub command_status: CommandStatus,
    pub sequence_number: u32,
}

impl PduHeader {
    pub const SIZE: usize = 16;

    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        if buf.remaining() < Self::SIZE {
            return Err(CodecError::Incomplete);
        }
        let command_length = buf.get_u32();
        let raw_id = buf.get_u32();
        let command_id =
            CommandId::try_from(raw_id).map_err(|_| CodecError::InvalidCommandId(raw_id))?;
        let command_status = CommandStatus::from(buf.get_u32());
        let sequence_number = buf.get_u32();

        if command_length < Self::SIZE as u32 || command_length > MAX_PDU_SIZE {
            return Err(CodecError::InvalidCommandLength(command_length));
        }

        Ok(PduHeader {
            command_length,
            command_id,
            command_status,
            sequence_number,
        })
    }
}

// Header with a zero command_length placeholder; `finish` patches it.
fn begin(buf: &mut BytesMut, id: CommandId, status: CommandStatus, sequence_number: u32) {
    buf.put_u32(0);
    buf.put_u32(id as u32);
    buf.put_u32(u32::from(status));
    buf.put_u32(sequence_number);
}

fn finish(mut buf: BytesMut) -> Bytes {
    let len = buf.len() as u32;
    buf[0..4].copy_from_slice(&len.to_be_bytes());
    buf.freeze()
}

// C-octet string: bytes up to the NUL terminator, truncated to the field's
// maximum if oversized.
fn put_cstring(buf: &mut BytesMut, value: &str, max_len: usize) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(max_len - 1);
    buf.put_slice(&bytes[..len]);
    buf.put_u8(0);
}

fn get_cstring(buf: &mut Cursor<&[u8]>, field: &'static str) -> Result<String, CodecError> {
    let mut out = Vec::new();
    loop {
        if buf.remaining() == 0 {
            return Err(CodecError::Malformed(field));
        }
        match buf.get_u8() {
            0 => break,
            b => out.push(b),
        }
    }
    String::from_utf8(out).map_err(|source| CodecError::Utf8 { field, source })
}

fn get_u8(buf: &mut Cursor<&[u8]>, field: &'static str) -> Result<u8, CodecError> {
    if buf.remaining() < 1 {
        return Err(CodecError::Malformed(field));
    }
    Ok(buf.get_u8())
}

/// bind_transmitter / bind_receiver / bind_transceiver request.
#[derive(Debug, Clone)]
pub struct Bind {
    pub kind: BindKind,
    pub sequence_number: u32,
    pub system_id: String,
    pub password: String,
    pub system_type: String,
}

impl Bind {
    fn encode(&self, buf: &mut BytesMut) {
        begin(buf, self.kind.request_id(), CommandStatus::Ok, self.sequence_number);
        put_cstring(buf, &self.system_id, 16);
        put_cstring(buf, &self.password, 9);
        put_cstring(buf, &self.system_type, 13);
        buf.put_u8(0x34); // interface_version: SMPP v3.4
        buf.put_u8(0); // addr_ton
        buf.put_u8(0); // addr_npi
        put_cstring(buf, "", 41); // address_range
    }

    fn decode(kind: BindKind, header: &PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let system_id = get_cstring(buf, "system_id")?;
        let password = get_cstring(buf, "password")?;
        let system_type = get_cstring(buf, "system_type")?;
        // interface_version, addr_ton, addr_npi, address_range are not
        // interesting to the harness.
        Ok(Bind {
            kind,
            sequence_number: header.sequence_number,
            system_id,
            password,
            system_type,
        })
    }
}

/// bind_*_resp.
#[derive(Debug, Clone)]
pub struct BindResp {
    pub kind: BindKind,
    pub sequence_number: u32,
    pub status: CommandStatus,
    pub system_id: String,
}

impl BindResp {
    fn encode(&self, buf: &mut BytesMut) {
        begin(buf, self.kind.response_id(), self.status, self.sequence_number);
        put_cstring(buf, &self.system_id, 16);
    }

    fn decode(kind: BindKind, header: &PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        // A rejecting server may omit the body entirely.
        let system_id = if buf.remaining() > 0 {
            get_cstring(buf, "system_id")?
        } else {
            String::new()
        };
        Ok(BindResp {
            kind,
            sequence_number: header.sequence_number,
            status: header.command_status,
            system_id,
        })
    }
}

/// submit_sm request. Fields the engine never varies (service_type,
/// protocol_id, priority, scheduling, validity, replace flag, default
/// message id) encode as zero.
#[derive(Debug, Clone)]
pub struct SubmitSm {
    pub sequence_number: u32,
    pub source_addr_ton: u8,
    pub source_addr_npi: u8,
    pub source_addr: String,
    pub dest_addr_ton: u8,
    pub dest_addr_npi: u8,
    pub destination_addr: String,
    pub esm_class: u8,
    pub registered_delivery: u8,
    pub data_coding: u8,
    pub short_message: Vec<u8>,
}

impl SubmitSm {
    fn encode(&self, buf: &mut BytesMut) {
        begin(buf, CommandId::SubmitSm, CommandStatus::Ok, self.sequence_number);
        put_cstring(buf, "", 6); // service_type
        buf.put_u8(self.source_addr_ton);
        buf.put_u8(self.source_addr_npi);
        put_cstring(buf, &self.source_addr, 21);
        buf.put_u8(self.dest_addr_ton);
        buf.put_u8(self.dest_addr_npi);
        put_cstring(buf, &self.destination_addr, 21);
        buf.put_u8(self.esm_class);
        buf.put_u8(0); // protocol_id
        buf.put_u8(0); // priority_flag
        put_cstring(buf, "", 17); // schedule_delivery_time
        put_cstring(buf, "", 17); // validity_period
        buf.put_u8(self.registered_delivery);
        buf.put_u8(0); // replace_if_present_flag
        buf.put_u8(self.data_coding);
        buf.put_u8(0); // sm_default_msg_id
        buf.put_u8(self.short_message.len() as u8);
        buf.put_slice(&self.short_message);
    }

    fn decode(header: &PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let _service_type = get_cstring(buf, "service_type")?;
        let source_addr_ton = get_u8(buf, "source_addr_ton")?;
        let source_addr_npi = get_u8(buf, "source_addr_npi")?;
        let source_addr = get_cstring(buf, "source_addr")?;
        let dest_addr_ton = get_u8(buf, "dest_addr_ton")?;
        let dest_addr_npi = get_u8(buf, "dest_addr_npi")?;
        let destination_addr = get_cstring(buf, "destination_addr")?;
        let esm_class = get_u8(buf, "esm_class")?;
        let _protocol_id = get_u8(buf, "protocol_id")?;
        let _priority_flag = get_u8(buf, "priority_flag")?;
        let _schedule = get_cstring(buf, "schedule_delivery_time")?;
        let _validity = get_cstring(buf, "validity_period")?;
        let registered_delivery = get_u8(buf, "registered_delivery")?;
        let _replace = get_u8(buf, "replace_if_present_flag")?;
        let data_coding = get_u8(buf, "data_coding")?;
        let _default_id = get_u8(buf, "sm_default_msg_id")?;
        let sm_length = get_u8(buf, "sm_length")? as usize;
        if buf.remaining() < sm_length {
            return Err(CodecError::Malformed("short_message"));
        }
        let short_message = buf.copy_to_bytes(sm_length).to_vec();
        Ok(SubmitSm {
            sequence_number: header.sequence_number,
            source_addr_ton,
            source_addr_npi,
            source_addr,
            dest_addr_ton,
            dest_addr_npi,
            destination_addr,
            esm_class,
            registered_delivery,
            data_coding,
            short_message,
        })
    }
}

/// submit_sm_resp.
#[derive(Debug, Clone)]
pub struct SubmitSmResp {
    pub sequence_number: u32,
    pub status: CommandStatus,
    pub message_id: String,
}

impl SubmitSmResp {
    fn encode(&self, buf: &mut BytesMut) {
        begin(buf, CommandId::SubmitSmResp, self.status, self.sequence_number);
        put_cstring(buf, &self.message_id, 65);
    }

    fn decode(header: &PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let message_id = if buf.remaining() > 0 {
            get_cstring(buf, "message_id")?
        } else {
            String::new()
        };
        Ok(SubmitSmResp {
            sequence_number: header.sequence_number,
            status: header.command_status,
            message_id,
        })
    }
}

/// deliver_sm. Same wire layout as submit_sm; carries inbound messages and
/// delivery receipts.
#[derive(Debug, Clone)]
pub struct DeliverSm {
    pub sequence_number: u32,
    pub status: CommandStatus,
    pub source_addr: String,
    pub destination_addr: String,
    pub esm_class: u8,
    pub data_coding: u8,
    pub short_message: Vec<u8>,
}

impl DeliverSm {
    fn encode(&self, buf: &mut BytesMut) {
        begin(buf, CommandId::DeliverSm, self.status, self.sequence_number);
        put_cstring(buf, "", 6);
        buf.put_u8(0);
        buf.put_u8(0);
        put_cstring(buf, &self.source_addr, 21);
        buf.put_u8(0);
        buf.put_u8(0);
        put_cstring(buf, &self.destination_addr, 21);
        buf.put_u8(self.esm_class);
        buf.put_u8(0);
        buf.put_u8(0);
        put_cstring(buf, "", 17);
        put_cstring(buf, "", 17);
        buf.put_u8(0);
        buf.put_u8(0);
        buf.put_u8(self.data_coding);
        buf.put_u8(0);
        buf.put_u8(self.short_message.len() as u8);
        buf.put_slice(&self.short_message);
    }

    fn decode(header: &PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let _service_type = get_cstring(buf, "service_type")?;
        let _ton = get_u8(buf, "source_addr_ton")?;
        let _npi = get_u8(buf, "source_addr_npi")?;
        let source_addr = get_cstring(buf, "source_addr")?;
        let _ton = get_u8(buf, "dest_addr_ton")?;
        let _npi = get_u8(buf, "dest_addr_npi")?;
        let destination_addr = get_cstring(buf, "destination_addr")?;
        let esm_class = get_u8(buf, "esm_class")?;
        let _protocol_id = get_u8(buf, "protocol_id")?;
        let _priority_flag = get_u8(buf, "priority_flag")?;
        let _schedule = get_cstring(buf, "schedule_delivery_time")?;
        let _validity = get_cstring(buf, "validity_period")?;
        let _registered = get_u8(buf, "registered_delivery")?;
        let _replace = get_u8(buf, "replace_if_present_flag")?;
        let data_coding = get_u8(buf, "data_coding")?;
        let _default_id = get_u8(buf, "sm_default_msg_id")?;
        let sm_length = get_u8(buf, "sm_length")? as usize;
        if buf.remaining() < sm_length {
            return Err(CodecError::Malformed("short_message"));
        }
        let short_message = buf.copy_to_bytes(sm_length).to_vec();
        Ok(DeliverSm {
            sequence_number: header.sequence_number,
            status: header.command_status,
            source_addr,
            destination_addr,
            esm_class,
            data_coding,
            short_message,
        })
    }
}

/// One framed PDU, either direction.
#[derive(Debug, Clone)]
pub enum Frame {
    Bind(Bind),
    BindResp(BindResp),
    SubmitSm(SubmitSm),
    SubmitSmResp(SubmitSmResp),
    DeliverSm(DeliverSm),
    DeliverSmResp {
        sequence_number: u32,
        status: CommandStatus,
    },
    EnquireLink {
        sequence_number: u32,
    },
    EnquireLinkResp {
        sequence_number: u32,
    },
    Unbind {
        sequence_number: u32,
    },
    UnbindResp {
        sequence_number: u32,
        status: CommandStatus,
    },
    GenericNack {
        sequence_number: u32,
        status: CommandStatus,
    },
}

impl Frame {
    /// Verify a complete frame is buffered. Returns its length on success,
    /// `Incomplete` when more bytes are needed.
    pub fn check(buf: &mut Cursor<&[u8]>) -> Result<usize, CodecError> {
        if buf.remaining() < PduHeader::SIZE {
            return Err(CodecError::Incomplete);
        }
        let pos = buf.position();
        let command_length = buf.get_u32();
        buf.set_position(pos);

        if command_length < PduHeader::SIZE as u32 || command_length > MAX_PDU_SIZE {
            return Err(CodecError::InvalidCommandLength(command_length));
        }
        if (buf.remaining() as u32) < command_length {
            return Err(CodecError::Incomplete);
        }
        Ok(command_length as usize)
    }

    /// Parse one complete frame from the cursor. The caller must have
    /// verified availability with [`check`](Frame::check).
    ///
    /// The body is decoded against the header's command_length only, so a
    /// frame declaring a short length cannot consume bytes belonging to the
    /// next frame in the buffer.
    pub fn parse(cursor: &mut Cursor<&[u8]>) -> Result<Frame, CodecError> {
        let start = cursor.position() as usize;
        let header = PduHeader::decode(cursor)?;
        let end = start + header.command_length as usize;
        let data = *cursor.get_ref();
        if data.len() < end {
            return Err(CodecError::Incomplete);
        }
        let body = &data[cursor.position() as usize..end];
        let buf = &mut Cursor::new(body);
        let frame = match header.command_id {
            CommandId::BindTransmitter => {
                Frame::Bind(Bind::decode(BindKind::Transmitter, &header, buf)?)
            }
            CommandId::BindReceiver => {
                Frame::Bind(Bind::decode(BindKind::Receiver, &header, buf)?)
            }
            CommandId::BindTransceiver => {
                Frame::Bind(Bind::decode(BindKind::Transceiver, &header, buf)?)
            }
            CommandId::BindTransmitterResp => {
                Frame::BindResp(BindResp::decode(BindKind::Transmitter, &header, buf)?)
            }
            CommandId::BindReceiverResp => {
                Frame::BindResp(BindResp::decode(BindKind::Receiver, &header, buf)?)
            }
            CommandId::BindTransceiverResp => {
                Frame::BindResp(BindResp::decode(BindKind::Transceiver, &header, buf)?)
            }
            CommandId::SubmitSm => Frame::SubmitSm(SubmitSm::decode(&header, buf)?),
            CommandId::SubmitSmResp => Frame::SubmitSmResp(SubmitSmResp::decode(&header, buf)?),
            CommandId::DeliverSm => Frame::DeliverSm(DeliverSm::decode(&header, buf)?),
            CommandId::DeliverSmResp => Frame::DeliverSmResp {
                sequence_number: header.sequence_number,
                status: header.command_status,
            },
            CommandId::EnquireLink => Frame::EnquireLink {
                sequence_number: header.sequence_number,
            },
            CommandId::EnquireLinkResp => Frame::EnquireLinkResp {
                sequence_number: header.sequence_number,
            },
            CommandId::Unbind => Frame::Unbind {
                sequence_number: header.sequence_number,
            },
            CommandId::UnbindResp => Frame::UnbindResp {
                sequence_number: header.sequence_number,
                status: header.command_status,
            },
            CommandId::GenericNack => Frame::GenericNack {
                sequence_number: header.sequence_number,
                status: header.command_status,
            },
        };
        cursor.set_position(end as u64);
        Ok(frame)
    }

    /// Serialize with a correct command_length.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        match self {
            Frame::Bind(pdu) => pdu.encode(&mut buf),
            Frame::BindResp(pdu) => pdu.encode(&mut buf),
            Frame::SubmitSm(pdu) => pdu.encode(&mut buf),
            Frame::SubmitSmResp(pdu) => pdu.encode(&mut buf),
            Frame::DeliverSm(pdu) => pdu.encode(&mut buf),
            Frame::DeliverSmResp {
                sequence_number,
                status,
            } => {
                begin(&mut buf, CommandId::DeliverSmResp, *status, *sequence_number);
                put_cstring(&mut buf, "", 1); // message_id, unused
            }
            Frame::EnquireLink { sequence_number } => {
                begin(&mut buf, CommandId::EnquireLink, CommandStatus::Ok, *sequence_number);
            }
            Frame::EnquireLinkResp { sequence_number } => {
                begin(&mut buf, CommandId::EnquireLinkResp, CommandStatus::Ok, *sequence_number);
            }
            Frame::Unbind { sequence_number } => {
                begin(&mut buf, CommandId::Unbind, CommandStatus::Ok, *sequence_number);
            }
            Frame::UnbindResp {
                sequence_number,
                status,
            } => {
                begin(&mut buf, CommandId::UnbindResp, *status, *sequence_number);
            }
            Frame::GenericNack {
                sequence_number,
                status,
            } => {
                begin(&mut buf, CommandId::GenericNack, *status, *sequence_number);
            }
        }
        finish(buf)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Frame::Bind(_) => "bind",
            Frame::BindResp(_) => "bind_resp",
            Frame::SubmitSm(_) => "submit_sm",
            Frame::SubmitSmResp(_) => "submit_sm_resp",
            Frame::DeliverSm(_) => "deliver_sm",
            Frame::DeliverSmResp { .. } => "deliver_sm_resp",
            Frame::EnquireLink { .. } => "enquire_link",
            Frame::EnquireLinkResp { .. } => "enquire_link_resp",
            Frame::Unbind { .. } => "unbind",
            Frame::UnbindResp { .. } => "unbind_resp",
            Frame::GenericNack { .. } => "generic_nack",
        }
    }
}
