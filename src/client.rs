//! MTA-side engine: drives the dialog toward a remote filter.
//!
//! Two method families mirror the protocol's step/reply table. `send_*`
//! writes a step and returns immediately (ABORT, QUIT and MACRO expect no
//! reply; the others leave the read to the caller). `exchange_*` writes a
//! step and consumes the reply: an OPTNEG for negotiation, a verdict for
//! every ordinary step, and the modification burst plus verdict for
//! BODYEOB. PROGRESS keep-alives are absorbed below, in the packet layer.

use std::io::{Read, Write};

use crate::codec::{self, Action, Connect, Header, Mail, Message, Modification, OptNeg};
use crate::error::MilterError;
use crate::io::PacketStream;
use crate::macros::{MacroList, MacroStep};

pub struct Client<S: Read + Write> {
    stream: PacketStream<S>,
    /// Macros to attach to outgoing steps. The step encoders pull the
    /// entries matching the step being sent; populate this before issuing
    /// the step or the macros will not be transferred.
    pub macros: MacroList,
}

impl<S: Read + Write> Client<S> {
    /// Wrap an established connection. Dialing, timeouts and closing stay
    /// with the caller; dropping the client drops the stream.
    pub fn new(stream: S) -> Self {
        Client {
            stream: PacketStream::new(stream),
            macros: MacroList::new(),
        }
    }

    /// Next raw packet (command byte plus payload), keep-alives elided.
    pub fn receive_packet(&mut self) -> Result<Vec<u8>, MilterError> {
        self.stream.receive_packet()
    }

    /// Next decoded message.
    pub fn receive_message(&mut self) -> Result<Message, MilterError> {
        let packet = self.stream.receive_packet()?;
        codec::decode(&packet)
    }

    pub fn macro_add(&mut self, step: MacroStep, name: &str, value: &str) {
        self.macros.add(step, name, value);
    }

    pub fn macro_add_canonical(&mut self, name: &str, value: &str) -> bool {
        self.macros.add_canonical(name, value)
    }

    pub fn macro_get(&self, name: &str) -> Option<(MacroStep, &str)> {
        self.macros.get(name)
    }

    pub fn macro_debug(&self) {
        self.macros.debug();
    }

    pub fn send_optneg(&mut self, optneg: &OptNeg) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_optneg(optneg))
    }

    /// Send a standalone MACRO frame for one step. Nothing is written when
    /// no stored macro matches the step.
    pub fn send_macro(&mut self, step: MacroStep) -> Result<(), MilterError> {
        match codec::encode_macro(step, &self.macros) {
            Some(msg) => self.stream.write(&msg),
            None => Ok(()),
        }
    }

    pub fn send_connect(&mut self, connect: &Connect) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_connect(connect, &self.macros))
    }

    pub fn send_helo(&mut self, helo: &str) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_helo(helo, &self.macros))
    }

    pub fn send_mail(&mut self, mail: &Mail) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_mail(mail, &self.macros))
    }

    pub fn send_rcpt(&mut self, rcpt: &Mail) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_rcpt(rcpt, &self.macros))
    }

    pub fn send_header(&mut self, header: &Header) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_header(header))
    }

    pub fn send_eoh(&mut self) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_eoh())
    }

    /// Send one body chunk. Chunks above [`codec::MAX_BODY_CHUNK`] must be
    /// split by the caller; call repeatedly until the body is through.
    pub fn send_body(&mut self, chunk: &[u8]) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_body(chunk))
    }

    pub fn send_body_eob(&mut self) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_body_eob())
    }

    /// Reset the filter to its pre-MAIL state. No reply is expected.
    pub fn send_abort(&mut self) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_abort())
    }

    /// End the milter conversation. No reply is expected; drop the client
    /// afterwards.
    pub fn send_quit(&mut self) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_quit())
    }

    fn read_action(&mut self) -> Result<Action, MilterError> {
        let msg = self.receive_message()?;
        Action::try_from(msg).map_err(|other| MilterError::UnexpectedMessage {
            got: other.command(),
            expected: "accept/reject action",
        })
    }

    /// Negotiate options. The returned OPTNEG is the filter's counter-offer
    /// and is authoritative for the rest of the session.
    pub fn exchange_optneg(&mut self, optneg: &OptNeg) -> Result<OptNeg, MilterError> {
        self.send_optneg(optneg)?;
        match self.receive_message()? {
            Message::OptNeg(reply) => Ok(reply),
            other => Err(MilterError::UnexpectedMessage {
                got: other.command(),
                expected: "OPTNEG",
            }),
        }
    }

    pub fn exchange_connect(&mut self, connect: &Connect) -> Result<Action, MilterError> {
        self.send_connect(connect)?;
        self.read_action()
    }

    pub fn exchange_helo(&mut self, helo: &str) -> Result<Action, MilterError> {
        self.send_helo(helo)?;
        self.read_action()
    }

    pub fn exchange_mail(&mut self, mail: &Mail) -> Result<Action, MilterError> {
        self.send_mail(mail)?;
        self.read_action()
    }

    pub fn exchange_rcpt(&mut self, rcpt: &Mail) -> Result<Action, MilterError> {
        self.send_rcpt(rcpt)?;
        self.read_action()
    }

    pub fn exchange_header(&mut self, header: &Header) -> Result<Action, MilterError> {
        self.send_header(header)?;
        self.read_action()
    }

    pub fn exchange_eoh(&mut self) -> Result<Action, MilterError> {
        self.send_eoh()?;
        self.read_action()
    }

    pub fn exchange_body(&mut self, chunk: &[u8]) -> Result<Action, MilterError> {
        self.send_body(chunk)?;
        self.read_action()
    }

    /// Announce end of body and collect the filter's response burst: zero
    /// or more modifications terminated by exactly one verdict.
    pub fn exchange_body_eob(&mut self) -> Result<(Vec<Modification>, Action), MilterError> {
        self.send_body_eob()?;
        let mut modifications = Vec::new();
        loop {
            let msg = self.receive_message()?;
            match Modification::try_from(msg) {
                Ok(modification) => modifications.push(modification),
                Err(other) => {
                    let action =
                        Action::try_from(other).map_err(|m| MilterError::UnexpectedMessage {
                            got: m.command(),
                            expected: "modification or accept/reject action",
                        })?;
                    log::debug!(
                        "end-of-body burst: {} modifications",
                        modifications.len()
                    );
                    return Ok((modifications, action));
                }
            }
        }
    }
}
