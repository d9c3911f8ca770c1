use std::fmt;
use std::slice;

/// Step a macro is attached to. On the wire this is the command code of the
/// step the MACRO packet precedes. Decoding accepts any byte verbatim, so
/// this is a transparent newtype rather than a closed enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroStep(pub u8);

impl MacroStep {
    pub const CONNECT: MacroStep = MacroStep(b'C');
    pub const HELO: MacroStep = MacroStep(b'H');
    pub const MAIL: MacroStep = MacroStep(b'M');
    pub const RCPT: MacroStep = MacroStep(b'R');
}

impl fmt::Display for MacroStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MacroStep::CONNECT => write!(f, "CONNECT"),
            MacroStep::HELO => write!(f, "HELO"),
            MacroStep::MAIL => write!(f, "MAIL"),
            MacroStep::RCPT => write!(f, "RCPT"),
            MacroStep(b) => write!(f, "0x{b:02x}"),
        }
    }
}

/// One name/value pair supplied by the MTA, tagged with the step it belongs
/// to. Names follow the Sendmail convention: single letters bare (`j`, `i`,
/// `_`), longer names in braces (`{daemon_name}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    pub step: MacroStep,
    pub name: String,
    pub value: String,
}

/// Macro names Sendmail and Postfix commonly attach to each step. Nothing
/// here is mandatory on a given connection; the table exists so callers can
/// add well-known macros without memorizing which step carries them.
pub const CANONICAL_MACROS: &[(MacroStep, &str)] = &[
    (MacroStep::CONNECT, "_"),
    (MacroStep::CONNECT, "j"),
    (MacroStep::CONNECT, "{daemon_name}"),
    (MacroStep::CONNECT, "{if_name}"),
    (MacroStep::CONNECT, "{if_addr}"),
    (MacroStep::HELO, "{tls_version}"),
    (MacroStep::HELO, "{cipher}"),
    (MacroStep::HELO, "{cipher_bits}"),
    (MacroStep::HELO, "{cert_subject}"),
    (MacroStep::HELO, "{cert_issuer}"),
    (MacroStep::MAIL, "i"),
    (MacroStep::MAIL, "{auth_type}"),
    (MacroStep::MAIL, "{auth_authen}"),
    (MacroStep::MAIL, "{auth_ssf}"),
    (MacroStep::MAIL, "{auth_author}"),
    (MacroStep::MAIL, "{mail_mailer}"),
    (MacroStep::MAIL, "{mail_host}"),
    (MacroStep::MAIL, "{mail_addr}"),
    (MacroStep::RCPT, "{rcpt_mailer}"),
    (MacroStep::RCPT, "{rcpt_host}"),
    (MacroStep::RCPT, "{rcpt_addr}"),
];

/// Ordered macro container. Insertion order is what goes on the wire, and
/// adding a name that already exists is a no-op regardless of step: the
/// first writer wins.
#[derive(Debug, Clone, Default)]
pub struct MacroList {
    entries: Vec<Macro>,
}

impl MacroList {
    pub fn new() -> Self {
        MacroList::default()
    }

    /// Append a macro unless the name is already present.
    pub fn add(&mut self, step: MacroStep, name: &str, value: &str) {
        if self.entries.iter().any(|m| m.name == name) {
            return;
        }
        self.entries.push(Macro {
            step,
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    /// Add a macro whose step is taken from the canonical table. Returns
    /// false when the name is not a canonical one (nothing is added).
    pub fn add_canonical(&mut self, name: &str, value: &str) -> bool {
        match CANONICAL_MACROS.iter().find(|(_, n)| *n == name) {
            Some(&(step, _)) => {
                self.add(step, name, value);
                true
            }
            None => false,
        }
    }

    /// Linear lookup by name, first match.
    pub fn get(&self, name: &str) -> Option<(MacroStep, &str)> {
        self.entries
            .iter()
            .find(|m| m.name == name)
            .map(|m| (m.step, m.value.as_str()))
    }

    /// Entries belonging to one step, in insertion order. This is the view
    /// the encoders use to build a MACRO frame.
    pub fn for_step(&self, step: MacroStep) -> impl Iterator<Item = &Macro> {
        self.entries.iter().filter(move |m| m.step == step)
    }

    pub fn iter(&self) -> slice::Iter<'_, Macro> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge macros received from the wire, keeping existing names.
    pub fn merge(&mut self, macros: Vec<Macro>) {
        for m in macros {
            self.add(m.step, &m.name, &m.value);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Dump the store through the logger.
    pub fn debug(&self) {
        for m in &self.entries {
            log::debug!("macro step={} name={:?} value={:?}", m.step, m.name, m.value);
        }
    }
}

impl<'a> IntoIterator for &'a MacroList {
    type Item = &'a Macro;
    type IntoIter = slice::Iter<'a, Macro>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
