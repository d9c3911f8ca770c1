//! Sendmail/Postfix milter protocol (version 2), both sides of the wire:
//! the MTA-facing [`Client`] that streams SMTP session events to a remote
//! filter, and the filter-facing [`Server`] that dispatches them to a
//! [`Callbacks`] implementation.

pub mod client;
pub mod codec;
pub mod error;
pub mod io;
pub mod macros;
pub mod server;

pub use client::Client;
pub use codec::{
    Action, ChgHeader, Command, Connect, Family, Header, Mail, Message, Modification, OptNeg,
    ReplyCode,
};
pub use error::MilterError;
pub use io::PacketStream;
pub use macros::{Macro, MacroList, MacroStep, CANONICAL_MACROS};
pub use server::{serve, Callbacks, Server};
