//! Filter-side engine: receives the MTA's dialog and drives a callback set.

use std::io::{Read, Write};

use crate::codec::{
    self, Action, ChgHeader, Connect, Header, Mail, Message, Modification, OptNeg, ReplyCode,
};
use crate::error::MilterError;
use crate::io::PacketStream;
use crate::macros::{MacroList, MacroStep};

/// Per-step hooks a filter implements. Every fallible hook returning an
/// error ends the session through [`Callbacks::on_error`]. Each hook
/// receives the session's [`Server`] so it can inspect accumulated macros
/// or emit PROGRESS keep-alives during long work.
///
/// All methods have defaults (echo the negotiation, continue every step,
/// modify nothing), so a filter overrides only the steps it cares about.
pub trait Callbacks<S: Read + Write> {
    fn on_optneg(&mut self, _srv: &mut Server<S>, optneg: OptNeg) -> anyhow::Result<OptNeg> {
        Ok(optneg)
    }

    fn on_connect(&mut self, _srv: &mut Server<S>, _connect: Connect) -> anyhow::Result<Action> {
        Ok(Action::Continue)
    }

    fn on_helo(&mut self, _srv: &mut Server<S>, _helo: String) -> anyhow::Result<Action> {
        Ok(Action::Continue)
    }

    fn on_mail(&mut self, _srv: &mut Server<S>, _mail: Mail) -> anyhow::Result<Action> {
        Ok(Action::Continue)
    }

    fn on_rcpt(&mut self, _srv: &mut Server<S>, _rcpt: Mail) -> anyhow::Result<Action> {
        Ok(Action::Continue)
    }

    fn on_header(&mut self, _srv: &mut Server<S>, _header: Header) -> anyhow::Result<Action> {
        Ok(Action::Continue)
    }

    fn on_eoh(&mut self, _srv: &mut Server<S>) -> anyhow::Result<Action> {
        Ok(Action::Continue)
    }

    fn on_body(&mut self, _srv: &mut Server<S>, _chunk: Vec<u8>) -> anyhow::Result<Action> {
        Ok(Action::Continue)
    }

    /// End of message. The returned modifications are written in order,
    /// then the verdict.
    fn on_body_eob(
        &mut self,
        _srv: &mut Server<S>,
    ) -> anyhow::Result<(Vec<Modification>, Action)> {
        Ok((Vec::new(), Action::Continue))
    }

    fn on_abort(&mut self, _srv: &mut Server<S>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_quit(&mut self, _srv: &mut Server<S>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called exactly once when the session dies: i/o failure, protocol
    /// violation, or an error from one of the hooks above. Never produces
    /// a reply.
    fn on_error(&mut self, _srv: &mut Server<S>, err: MilterError) {
        log::error!("milter session error: {err}");
    }
}

/// Filter-side session: the packet stream plus the macro store accumulated
/// from the MTA's MACRO frames.
pub struct Server<S: Read + Write> {
    stream: PacketStream<S>,
    pub macros: MacroList,
}

impl<S: Read + Write> Server<S> {
    pub fn new(stream: S) -> Self {
        Server {
            stream: PacketStream::new(stream),
            macros: MacroList::new(),
        }
    }

    pub fn receive_packet(&mut self) -> Result<Vec<u8>, MilterError> {
        self.stream.receive_packet()
    }

    pub fn receive_message(&mut self) -> Result<Message, MilterError> {
        let packet = self.stream.receive_packet()?;
        codec::decode(&packet)
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

    /// Keep the connection alive while a hook does long work; the MTA
    /// resets its watchdog for each PROGRESS it reads.
    pub fn send_progress(&mut self) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_progress())
    }

    pub fn modification_add_rcpt(&mut self, rcpt: &str) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_add_rcpt(rcpt))
    }

    pub fn modification_del_rcpt(&mut self, rcpt: &str) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_del_rcpt(rcpt))
    }

    pub fn modification_repl_body(&mut self, body: &[u8]) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_repl_body(body))
    }

    pub fn modification_add_header(&mut self, header: &Header) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_add_header(header))
    }

    pub fn modification_chg_header(&mut self, chghdr: &ChgHeader) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_chg_header(chghdr))
    }

    pub fn modification_quarantine(&mut self, reason: &str) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_quarantine(reason))
    }

    pub fn action_accept(&mut self) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_accept())
    }

    pub fn action_continue(&mut self) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_continue())
    }

    pub fn action_discard(&mut self) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_discard())
    }

    pub fn action_reject(&mut self) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_reject())
    }

    pub fn action_tempfail(&mut self) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_tempfail())
    }

    pub fn action_reply_code(&mut self, reply: &ReplyCode) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_reply_code(reply))
    }

    pub fn send_modification(&mut self, modification: &Modification) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_modification(modification))
    }

    pub fn send_action(&mut self, action: &Action) -> Result<(), MilterError> {
        self.stream.write(&codec::encode_action(action))
    }
}

/// Run one milter session to completion. Every exit path other than QUIT
/// reports its error through `on_error` exactly once; the caller just
/// closes the connection afterwards.
pub fn serve<S, C>(stream: S, callbacks: &mut C)
where
    S: Read + Write,
    C: Callbacks<S>,
{
    let mut srv = Server::new(stream);
    if let Err(err) = session(&mut srv, callbacks) {
        callbacks.on_error(&mut srv, err);
    }
}

fn session<S, C>(srv: &mut Server<S>, callbacks: &mut C) -> Result<(), MilterError>
where
    S: Read + Write,
    C: Callbacks<S>,
{
    // The session opens with option negotiation, nothing else is legal.
    let optneg = match srv.receive_message()? {
        Message::OptNeg(optneg) => optneg,
        other => {
            return Err(MilterError::UnexpectedMessage {
                got: other.command(),
                expected: "OPTNEG",
            })
        }
    };
    log::debug!(
        "negotiation: version={} actions=0x{:08x} protocol=0x{:08x}",
        optneg.version,
        optneg.actions,
        optneg.protocol
    );
    let reply = callbacks
        .on_optneg(srv, optneg)
        .map_err(MilterError::Callback)?;
    srv.send_optneg(&reply)?;

    loop {
        match srv.receive_message()? {
            Message::Macro(macros) => {
                // first writer wins, same as within one MACRO frame
                srv.macros.merge(macros);
            }
            Message::Connect(connect) => {
                let action = callbacks
                    .on_connect(srv, connect)
                    .map_err(MilterError::Callback)?;
                srv.send_action(&action)?;
            }
            Message::Helo(helo) => {
                let action = callbacks
                    .on_helo(srv, helo)
                    .map_err(MilterError::Callback)?;
                srv.send_action(&action)?;
            }
            Message::Mail(mail) => {
                let action = callbacks
                    .on_mail(srv, mail)
                    .map_err(MilterError::Callback)?;
                srv.send_action(&action)?;
            }
            Message::Rcpt(rcpt) => {
                let action = callbacks
                    .on_rcpt(srv, rcpt)
                    .map_err(MilterError::Callback)?;
                srv.send_action(&action)?;
            }
            Message::Header(header) => {
                let action = callbacks
                    .on_header(srv, header)
                    .map_err(MilterError::Callback)?;
                srv.send_action(&action)?;
            }
            Message::Eoh => {
                let action = callbacks.on_eoh(srv).map_err(MilterError::Callback)?;
                srv.send_action(&action)?;
            }
            Message::Body(chunk) => {
                let action = callbacks
                    .on_body(srv, chunk)
                    .map_err(MilterError::Callback)?;
                srv.send_action(&action)?;
            }
            Message::BodyEob => {
                let (modifications, action) = callbacks
                    .on_body_eob(srv)
                    .map_err(MilterError::Callback)?;
                for modification in &modifications {
                    srv.send_modification(modification)?;
                }
                srv.send_action(&action)?;
                // next message of the same connection starts clean
                srv.macros.clear();
            }
            Message::Abort => {
                callbacks.on_abort(srv).map_err(MilterError::Callback)?;
                // reset to the pre-MAIL state, connection stays open
                srv.macros.clear();
            }
            Message::Quit => {
                callbacks.on_quit(srv).map_err(MilterError::Callback)?;
                return Ok(());
            }
            other => {
                return Err(MilterError::UnexpectedMessage {
                    got: other.command(),
                    expected: "MTA step command",
                })
            }
        }
    }
}
