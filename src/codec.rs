//! Wire codec for milter protocol version 2.
//!
//! Every packet is a 4-byte big-endian length, one command byte, then the
//! command-specific payload (`length` counts the command byte). `decode`
//! maps a packet (without the length prefix) to a typed [`Message`]; the
//! `encode_*` functions produce complete frames, length prefix included.

use crate::error::MilterError;
use crate::macros::{Macro, MacroList, MacroStep};
use std::fmt;

/// Protocol version this engine speaks and negotiates.
pub const MILTER_VERSION: u32 = 2;

/// Maximum payload of one BODY chunk. Splitting is the MTA's job; the codec
/// encodes whatever it is given.
pub const MAX_BODY_CHUNK: usize = 65535;

// Modification actions negotiated in the OPTNEG actions bitmask.
pub const SMFIF_ADDHDRS: u32 = 0x01;
pub const SMFIF_CHGBODY: u32 = 0x02;
pub const SMFIF_ADDRCPT: u32 = 0x04;
pub const SMFIF_DELRCPT: u32 = 0x08;
pub const SMFIF_CHGHDRS: u32 = 0x10;
pub const SMFIF_QUARANTINE: u32 = 0x20;
pub const SMFIF_ALL: u32 = SMFIF_ADDHDRS
    | SMFIF_CHGBODY
    | SMFIF_ADDRCPT
    | SMFIF_DELRCPT
    | SMFIF_CHGHDRS
    | SMFIF_QUARANTINE;

// Steps the filter asks the MTA to skip, in the OPTNEG protocol bitmask.
pub const SMFIP_NOCONNECT: u32 = 0x01;
pub const SMFIP_NOHELO: u32 = 0x02;
pub const SMFIP_NOMAIL: u32 = 0x04;
pub const SMFIP_NORCPT: u32 = 0x08;
pub const SMFIP_NOBODY: u32 = 0x10;
pub const SMFIP_NOHDRS: u32 = 0x20;
pub const SMFIP_NOEOH: u32 = 0x40;

/// The closed set of command codes, one byte each on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    // MTA to filter
    Abort,
    Body,
    Connect,
    Macro,
    BodyEob,
    Helo,
    Header,
    Mail,
    Eoh,
    OptNeg,
    Rcpt,
    Quit,
    // Filter to MTA: verdicts
    Accept,
    Continue,
    Discard,
    Reject,
    Tempfail,
    ReplyCode,
    // Filter to MTA: modifications
    AddRcpt,
    DelRcpt,
    ReplBody,
    AddHeader,
    ChgHeader,
    Quarantine,
    // Filter to MTA: asynchronous keep-alive
    Progress,
}

impl Command {
    pub fn from_byte(b: u8) -> Option<Command> {
        match b {
            b'A' => Some(Command::Abort),
            b'B' => Some(Command::Body),
            b'C' => Some(Command::Connect),
            b'D' => Some(Command::Macro),
            b'E' => Some(Command::BodyEob),
            b'H' => Some(Command::Helo),
            b'L' => Some(Command::Header),
            b'M' => Some(Command::Mail),
            b'N' => Some(Command::Eoh),
            b'O' => Some(Command::OptNeg),
            b'R' => Some(Command::Rcpt),
            b'Q' => Some(Command::Quit),
            b'a' => Some(Command::Accept),
            b'c' => Some(Command::Continue),
            b'd' => Some(Command::Discard),
            b'r' => Some(Command::Reject),
            b't' => Some(Command::Tempfail),
            b'y' => Some(Command::ReplyCode),
            b'+' => Some(Command::AddRcpt),
            b'-' => Some(Command::DelRcpt),
            b'b' => Some(Command::ReplBody),
            b'h' => Some(Command::AddHeader),
            b'm' => Some(Command::ChgHeader),
            b'q' => Some(Command::Quarantine),
            b'p' => Some(Command::Progress),
            _ => None,
        }
    }

    pub fn byte(self) -> u8 {
        match self {
            Command::Abort => b'A',
            Command::Body => b'B',
            Command::Connect => b'C',
            Command::Macro => b'D',
            Command::BodyEob => b'E',
            Command::Helo => b'H',
            Command::Header => b'L',
            Command::Mail => b'M',
            Command::Eoh => b'N',
            Command::OptNeg => b'O',
            Command::Rcpt => b'R',
            Command::Quit => b'Q',
            Command::Accept => b'a',
            Command::Continue => b'c',
            Command::Discard => b'd',
            Command::Reject => b'r',
            Command::Tempfail => b't',
            Command::ReplyCode => b'y',
            Command::AddRcpt => b'+',
            Command::DelRcpt => b'-',
            Command::ReplBody => b'b',
            Command::AddHeader => b'h',
            Command::ChgHeader => b'm',
            Command::Quarantine => b'q',
            Command::Progress => b'p',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Abort => "ABORT",
            Command::Body => "BODY",
            Command::Connect => "CONNECT",
            Command::Macro => "MACRO",
            Command::BodyEob => "BODYEOB",
            Command::Helo => "HELO",
            Command::Header => "HEADER",
            Command::Mail => "MAIL",
            Command::Eoh => "EOH",
            Command::OptNeg => "OPTNEG",
            Command::Rcpt => "RCPT",
            Command::Quit => "QUIT",
            Command::Accept => "ACCEPT",
            Command::Continue => "CONTINUE",
            Command::Discard => "DISCARD",
            Command::Reject => "REJECT",
            Command::Tempfail => "TEMPFAIL",
            Command::ReplyCode => "REPLYCODE",
            Command::AddRcpt => "ADDRCPT",
            Command::DelRcpt => "DELRCPT",
            Command::ReplBody => "REPLBODY",
            Command::AddHeader => "ADDHEADER",
            Command::ChgHeader => "CHGHEADER",
            Command::Quarantine => "QUARANTINE",
            Command::Progress => "PROGRESS",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Connection family reported in CONNECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Unknown,
    Unix,
    Inet,
    Inet6,
}

impl Family {
    pub fn from_byte(b: u8) -> Option<Family> {
        match b {
            b'U' => Some(Family::Unknown),
            b'L' => Some(Family::Unix),
            b'4' => Some(Family::Inet),
            b'6' => Some(Family::Inet6),
            _ => None,
        }
    }

    pub fn byte(self) -> u8 {
        match self {
            Family::Unknown => b'U',
            Family::Unix => b'L',
            Family::Inet => b'4',
            Family::Inet6 => b'6',
        }
    }
}

/// OPTNEG payload. The filter announces the modifications it may emit
/// (`actions`, SMFIF_* bits) and the steps it does not need (`protocol`,
/// SMFIP_* bits); the MTA's response is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptNeg {
    pub version: u32,
    pub actions: u32,
    pub protocol: u32,
}

impl Default for OptNeg {
    fn default() -> Self {
        OptNeg {
            version: MILTER_VERSION,
            actions: 0,
            protocol: 0,
        }
    }
}

/// CONNECT payload. For `Family::Unknown` the port and address fields are
/// still carried on the wire, matching what deployed peers send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub hostname: String,
    pub family: Family,
    pub port: u16,
    pub address: String,
}

/// MAIL and RCPT payload. `address` is stored without the `<>` wrapping the
/// wire uses; the encoder adds the brackets, the decoder strips them.
/// Remaining ESMTP arguments, if any, are in `args`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub address: String,
    pub args: Vec<String>,
}

/// One mail header, used both for HEADER (MTA to filter) and ADDHEADER
/// (filter modification).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// CHGHEADER modification. `index` is 1-based and counted per name: index 3
/// targets the third header with this name. An empty `value` deletes that
/// occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChgHeader {
    pub index: u32,
    pub name: String,
    pub value: String,
}

/// REPLYCODE verdict: an explicit SMTP status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyCode {
    pub code: u16,
    pub reason: String,
}

/// Every message either side can put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    OptNeg(OptNeg),
    Connect(Connect),
    Helo(String),
    Mail(Mail),
    Rcpt(Mail),
    Header(Header),
    Eoh,
    Body(Vec<u8>),
    BodyEob,
    Macro(Vec<Macro>),
    Abort,
    Quit,
    Accept,
    Continue,
    Discard,
    Reject,
    Tempfail,
    ReplyCode(ReplyCode),
    AddRcpt(String),
    DelRcpt(String),
    ReplBody(Vec<u8>),
    AddHeader(Header),
    ChgHeader(ChgHeader),
    Quarantine(String),
    Progress,
}

impl Message {
    pub fn command(&self) -> Command {
        match self {
            Message::OptNeg(_) => Command::OptNeg,
            Message::Connect(_) => Command::Connect,
            Message::Helo(_) => Command::Helo,
            Message::Mail(_) => Command::Mail,
            Message::Rcpt(_) => Command::Rcpt,
            Message::Header(_) => Command::Header,
            Message::Eoh => Command::Eoh,
            Message::Body(_) => Command::Body,
            Message::BodyEob => Command::BodyEob,
            Message::Macro(_) => Command::Macro,
            Message::Abort => Command::Abort,
            Message::Quit => Command::Quit,
            Message::Accept => Command::Accept,
            Message::Continue => Command::Continue,
            Message::Discard => Command::Discard,
            Message::Reject => Command::Reject,
            Message::Tempfail => Command::Tempfail,
            Message::ReplyCode(_) => Command::ReplyCode,
            Message::AddRcpt(_) => Command::AddRcpt,
            Message::DelRcpt(_) => Command::DelRcpt,
            Message::ReplBody(_) => Command::ReplBody,
            Message::AddHeader(_) => Command::AddHeader,
            Message::ChgHeader(_) => Command::ChgHeader,
            Message::Quarantine(_) => Command::Quarantine,
            Message::Progress => Command::Progress,
        }
    }
}

/// Accept/reject verdict terminating one step exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Accept,
    Continue,
    Discard,
    Reject,
    Tempfail,
    ReplyCode(ReplyCode),
}

/// Message modification, valid only in the reply burst to BODYEOB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    AddRcpt(String),
    DelRcpt(String),
    ReplBody(Vec<u8>),
    AddHeader(Header),
    ChgHeader(ChgHeader),
    Quarantine(String),
}

/// Classify a filter reply as a verdict. Non-verdict messages are handed
/// back so the caller can try another classification.
impl TryFrom<Message> for Action {
    type Error = Message;

    fn try_from(msg: Message) -> Result<Self, Message> {
        match msg {
            Message::Accept => Ok(Action::Accept),
            Message::Continue => Ok(Action::Continue),
            Message::Discard => Ok(Action::Discard),
            Message::Reject => Ok(Action::Reject),
            Message::Tempfail => Ok(Action::Tempfail),
            Message::ReplyCode(reply) => Ok(Action::ReplyCode(reply)),
            other => Err(other),
        }
    }
}

/// Classify a filter reply as a modification, handing back anything else.
impl TryFrom<Message> for Modification {
    type Error = Message;

    fn try_from(msg: Message) -> Result<Self, Message> {
        match msg {
            Message::AddRcpt(rcpt) => Ok(Modification::AddRcpt(rcpt)),
            Message::DelRcpt(rcpt) => Ok(Modification::DelRcpt(rcpt)),
            Message::ReplBody(body) => Ok(Modification::ReplBody(body)),
            Message::AddHeader(hdr) => Ok(Modification::AddHeader(hdr)),
            Message::ChgHeader(hdr) => Ok(Modification::ChgHeader(hdr)),
            Message::Quarantine(reason) => Ok(Modification::Quarantine(reason)),
            other => Err(other),
        }
    }
}

/// Parse the 4-byte big-endian length header.
pub fn decode_length(msg: &[u8]) -> Result<u32, MilterError> {
    if msg.len() < 4 {
        return Err(MilterError::Protocol(format!(
            "expect 4 length bytes, got {}",
            msg.len()
        )));
    }
    Ok(u32::from_be_bytes([msg[0], msg[1], msg[2], msg[3]]))
}

fn read_cstr(cmd: Command, msg: &[u8], pos: &mut usize) -> Result<String, MilterError> {
    let start = *pos;
    for i in start..msg.len() {
        if msg[i] == 0 {
            *pos = i + 1;
            return Ok(String::from_utf8_lossy(&msg[start..i]).into_owned());
        }
    }
    Err(MilterError::Protocol(format!(
        "{cmd}: missing NUL terminator"
    )))
}

fn reject_trailing(cmd: Command, msg: &[u8], pos: usize) -> Result<(), MilterError> {
    if pos != msg.len() {
        return Err(MilterError::Protocol(format!(
            "{cmd}: {} trailing bytes after payload",
            msg.len() - pos
        )));
    }
    Ok(())
}

/// Decode one packet (command byte plus payload, no length prefix) into a
/// typed message.
pub fn decode(msg: &[u8]) -> Result<Message, MilterError> {
    let Some((&code, payload)) = msg.split_first() else {
        return Err(MilterError::Protocol("empty packet".to_string()));
    };
    let cmd = Command::from_byte(code).ok_or_else(|| {
        MilterError::Protocol(format!("unknown command code 0x{code:02x}"))
    })?;

    match cmd {
        Command::Abort => Ok(Message::Abort),
        Command::BodyEob => Ok(Message::BodyEob),
        Command::Eoh => Ok(Message::Eoh),
        Command::Quit => Ok(Message::Quit),
        Command::Accept => Ok(Message::Accept),
        Command::Continue => Ok(Message::Continue),
        Command::Discard => Ok(Message::Discard),
        Command::Reject => Ok(Message::Reject),
        Command::Tempfail => Ok(Message::Tempfail),
        Command::Progress => Ok(Message::Progress),

        Command::Body => Ok(Message::Body(payload.to_vec())),
        Command::ReplBody => Ok(Message::ReplBody(payload.to_vec())),

        Command::Connect => {
            let mut pos = 0;
            let hostname = read_cstr(cmd, payload, &mut pos)?;
            if pos + 3 > payload.len() {
                return Err(MilterError::Protocol(format!(
                    "{cmd}: truncated family/port fields"
                )));
            }
            let family = Family::from_byte(payload[pos]).ok_or_else(|| {
                MilterError::Protocol(format!(
                    "{cmd}: unknown protocol family 0x{:02x}",
                    payload[pos]
                ))
            })?;
            pos += 1;
            let port = u16::from_be_bytes([payload[pos], payload[pos + 1]]);
            pos += 2;
            let address = read_cstr(cmd, payload, &mut pos)?;
            reject_trailing(cmd, payload, pos)?;
            Ok(Message::Connect(Connect {
                hostname,
                family,
                port,
                address,
            }))
        }

        Command::Macro => {
            // step byte, then alternating NUL-terminated name/value pairs
            // until the payload is exhausted
            if payload.is_empty() {
                return Err(MilterError::Protocol(format!("{cmd}: missing step byte")));
            }
            let step = MacroStep(payload[0]);
            let mut pos = 1;
            let mut macros = Vec::new();
            while pos < payload.len() {
                let name = read_cstr(cmd, payload, &mut pos)?;
                let value = read_cstr(cmd, payload, &mut pos)?;
                macros.push(Macro { step, name, value });
            }
            Ok(Message::Macro(macros))
        }

        Command::Helo => {
            let mut pos = 0;
            let name = read_cstr(cmd, payload, &mut pos)?;
            Ok(Message::Helo(name))
        }

        Command::Header | Command::AddHeader => {
            let mut pos = 0;
            let name = read_cstr(cmd, payload, &mut pos)?;
            let value = read_cstr(cmd, payload, &mut pos)?;
            reject_trailing(cmd, payload, pos)?;
            let header = Header { name, value };
            if cmd == Command::Header {
                Ok(Message::Header(header))
            } else {
                Ok(Message::AddHeader(header))
            }
        }

        Command::Mail | Command::Rcpt => {
            let mut pos = 0;
            let mut address = read_cstr(cmd, payload, &mut pos)?;
            // strip the <> qualification the wire carries
            if address.len() > 1 && address.starts_with('<') && address.ends_with('>') {
                address = address[1..address.len() - 1].to_string();
            }
            let mut args = Vec::new();
            while pos < payload.len() {
                args.push(read_cstr(cmd, payload, &mut pos)?);
            }
            let mail = Mail { address, args };
            if cmd == Command::Mail {
                Ok(Message::Mail(mail))
            } else {
                Ok(Message::Rcpt(mail))
            }
        }

        Command::AddRcpt | Command::DelRcpt | Command::Quarantine => {
            if payload.last() != Some(&0) {
                return Err(MilterError::Protocol(format!(
                    "{cmd}: payload not NUL terminated"
                )));
            }
            let text = String::from_utf8_lossy(&payload[..payload.len() - 1]).into_owned();
            Ok(match cmd {
                Command::AddRcpt => Message::AddRcpt(text),
                Command::DelRcpt => Message::DelRcpt(text),
                _ => Message::Quarantine(text),
            })
        }

        Command::ReplyCode => {
            // DDD SP text NUL, three ASCII digits
            if payload.last() != Some(&0) {
                return Err(MilterError::Protocol(format!(
                    "{cmd}: payload not NUL terminated"
                )));
            }
            let body = &payload[..payload.len() - 1];
            if body.len() < 4 || body[3] != b' ' {
                return Err(MilterError::Protocol(format!(
                    "{cmd}: malformed code/reason payload"
                )));
            }
            let code = std::str::from_utf8(&body[..3])
                .ok()
                .and_then(|s| s.parse::<u16>().ok())
                .ok_or_else(|| {
                    MilterError::Protocol(format!("{cmd}: can't decode reply code"))
                })?;
            let reason = String::from_utf8_lossy(&body[4..]).into_owned();
            Ok(Message::ReplyCode(ReplyCode { code, reason }))
        }

        Command::ChgHeader => {
            if payload.len() < 6 {
                return Err(MilterError::Protocol(format!(
                    "{cmd}: payload shorter than index plus two strings"
                )));
            }
            let index = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
            let mut pos = 4;
            let name = read_cstr(cmd, payload, &mut pos)?;
            let value = read_cstr(cmd, payload, &mut pos)?;
            reject_trailing(cmd, payload, pos)?;
            Ok(Message::ChgHeader(ChgHeader { index, name, value }))
        }

        Command::OptNeg => {
            if payload.len() != 12 {
                return Err(MilterError::Protocol(format!(
                    "{cmd}: payload must be 12 bytes, got {}",
                    payload.len()
                )));
            }
            Ok(Message::OptNeg(OptNeg {
                version: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
                actions: u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]),
                protocol: u32::from_be_bytes([payload[8], payload[9], payload[10], payload[11]]),
            }))
        }
    }
}

/// Build one complete frame: length prefix, command byte, payload.
fn frame(cmd: Command, payload: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(5 + payload.len());
    msg.extend_from_slice(&(payload.len() as u32 + 1).to_be_bytes());
    msg.push(cmd.byte());
    msg.extend_from_slice(payload);
    msg
}

fn push_cstr(payload: &mut Vec<u8>, s: &str) {
    payload.extend_from_slice(s.as_bytes());
    payload.push(0);
}

pub fn encode_quit() -> Vec<u8> {
    frame(Command::Quit, &[])
}

pub fn encode_abort() -> Vec<u8> {
    frame(Command::Abort, &[])
}

pub fn encode_eoh() -> Vec<u8> {
    frame(Command::Eoh, &[])
}

pub fn encode_body_eob() -> Vec<u8> {
    frame(Command::BodyEob, &[])
}

pub fn encode_accept() -> Vec<u8> {
    frame(Command::Accept, &[])
}

pub fn encode_continue() -> Vec<u8> {
    frame(Command::Continue, &[])
}

pub fn encode_discard() -> Vec<u8> {
    frame(Command::Discard, &[])
}

pub fn encode_reject() -> Vec<u8> {
    frame(Command::Reject, &[])
}

pub fn encode_tempfail() -> Vec<u8> {
    frame(Command::Tempfail, &[])
}

pub fn encode_progress() -> Vec<u8> {
    frame(Command::Progress, &[])
}

pub fn encode_optneg(optneg: &OptNeg) -> Vec<u8> {
    let mut payload = Vec::with_capacity(12);
    payload.extend_from_slice(&optneg.version.to_be_bytes());
    payload.extend_from_slice(&optneg.actions.to_be_bytes());
    payload.extend_from_slice(&optneg.protocol.to_be_bytes());
    frame(Command::OptNeg, &payload)
}

/// Encode a MACRO frame holding the entries of `macros` tagged with `step`,
/// in insertion order. Returns `None` when no entry matches: an empty MACRO
/// frame is never sent.
pub fn encode_macro(step: MacroStep, macros: &MacroList) -> Option<Vec<u8>> {
    let mut payload = vec![step.0];
    let mut any = false;
    for m in macros.for_step(step) {
        push_cstr(&mut payload, &m.name);
        push_cstr(&mut payload, &m.value);
        any = true;
    }
    if !any {
        return None;
    }
    Some(frame(Command::Macro, &payload))
}

// Step encoders below bundle the same-step MACRO frame (if any) in front of
// the step frame, in one buffer, so both reach the peer in one write.

pub fn encode_connect(connect: &Connect, macros: &MacroList) -> Vec<u8> {
    let mut msg = encode_macro(MacroStep::CONNECT, macros).unwrap_or_default();
    let mut payload = Vec::new();
    push_cstr(&mut payload, &connect.hostname);
    payload.push(connect.family.byte());
    payload.extend_from_slice(&connect.port.to_be_bytes());
    push_cstr(&mut payload, &connect.address);
    msg.extend_from_slice(&frame(Command::Connect, &payload));
    msg
}

pub fn encode_helo(helo: &str, macros: &MacroList) -> Vec<u8> {
    let mut msg = encode_macro(MacroStep::HELO, macros).unwrap_or_default();
    let mut payload = Vec::new();
    push_cstr(&mut payload, helo);
    msg.extend_from_slice(&frame(Command::Helo, &payload));
    msg
}

fn encode_mail_rcpt(cmd: Command, mail: &Mail, macros: &MacroList) -> Vec<u8> {
    let mut msg = encode_macro(MacroStep(cmd.byte()), macros).unwrap_or_default();
    let mut payload = Vec::new();
    payload.push(b'<');
    payload.extend_from_slice(mail.address.as_bytes());
    payload.push(b'>');
    payload.push(0);
    for arg in &mail.args {
        push_cstr(&mut payload, arg);
    }
    msg.extend_from_slice(&frame(cmd, &payload));
    msg
}

pub fn encode_mail(mail: &Mail, macros: &MacroList) -> Vec<u8> {
    encode_mail_rcpt(Command::Mail, mail, macros)
}

pub fn encode_rcpt(mail: &Mail, macros: &MacroList) -> Vec<u8> {
    encode_mail_rcpt(Command::Rcpt, mail, macros)
}

pub fn encode_header(header: &Header) -> Vec<u8> {
    let mut payload = Vec::new();
    push_cstr(&mut payload, &header.name);
    push_cstr(&mut payload, &header.value);
    frame(Command::Header, &payload)
}

pub fn encode_body(chunk: &[u8]) -> Vec<u8> {
    frame(Command::Body, chunk)
}

pub fn encode_add_rcpt(rcpt: &str) -> Vec<u8> {
    let mut payload = Vec::new();
    push_cstr(&mut payload, rcpt);
    frame(Command::AddRcpt, &payload)
}

pub fn encode_del_rcpt(rcpt: &str) -> Vec<u8> {
    let mut payload = Vec::new();
    push_cstr(&mut payload, rcpt);
    frame(Command::DelRcpt, &payload)
}

pub fn encode_repl_body(body: &[u8]) -> Vec<u8> {
    frame(Command::ReplBody, body)
}

pub fn encode_add_header(header: &Header) -> Vec<u8> {
    let mut payload = Vec::new();
    push_cstr(&mut payload, &header.name);
    push_cstr(&mut payload, &header.value);
    frame(Command::AddHeader, &payload)
}

/// Encode a CHGHEADER modification. `index` must be at least 1: the wire
/// counts occurrences per name starting at one.
pub fn encode_chg_header(chghdr: &ChgHeader) -> Vec<u8> {
    debug_assert!(chghdr.index >= 1, "CHGHEADER index is 1-based");
    let mut payload = Vec::new();
    payload.extend_from_slice(&chghdr.index.to_be_bytes());
    push_cstr(&mut payload, &chghdr.name);
    push_cstr(&mut payload, &chghdr.value);
    frame(Command::ChgHeader, &payload)
}

pub fn encode_quarantine(reason: &str) -> Vec<u8> {
    let mut payload = Vec::new();
    push_cstr(&mut payload, reason);
    frame(Command::Quarantine, &payload)
}

/// Encode a REPLYCODE verdict. The code is clamped to 0..=999 and emitted as
/// exactly three zero-padded ASCII digits, which is what the decoder on the
/// other end requires.
pub fn encode_reply_code(reply: &ReplyCode) -> Vec<u8> {
    let code = if reply.code > 999 { 0 } else { reply.code };
    let mut payload = format!("{code:03} {}", reply.reason).into_bytes();
    payload.push(0);
    frame(Command::ReplyCode, &payload)
}

pub fn encode_action(action: &Action) -> Vec<u8> {
    match action {
        Action::Accept => encode_accept(),
        Action::Continue => encode_continue(),
        Action::Discard => encode_discard(),
        Action::Reject => encode_reject(),
        Action::Tempfail => encode_tempfail(),
        Action::ReplyCode(reply) => encode_reply_code(reply),
    }
}

pub fn encode_modification(modification: &Modification) -> Vec<u8> {
    match modification {
        Modification::AddRcpt(rcpt) => encode_add_rcpt(rcpt),
        Modification::DelRcpt(rcpt) => encode_del_rcpt(rcpt),
        Modification::ReplBody(body) => encode_repl_body(body),
        Modification::AddHeader(hdr) => encode_add_header(hdr),
        Modification::ChgHeader(hdr) => encode_chg_header(hdr),
        Modification::Quarantine(reason) => encode_quarantine(reason),
    }
}
