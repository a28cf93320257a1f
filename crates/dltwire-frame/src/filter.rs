use crate::message::Message;
use crate::protocol::{DltId, LogLevel};

/// One filter condition; every set field must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterEntry {
    pub apid: Option<DltId>,
    pub ctid: Option<DltId>,
    /// Highest (most verbose) log level accepted.
    pub max_level: Option<LogLevel>,
    pub min_payload: Option<usize>,
    pub max_payload: Option<usize>,
}

impl FilterEntry {
    pub fn matches(&self, message: &Message) -> bool {
        let Some(ext) = message.extended else {
            return true;
        };
        if self.apid.is_some_and(|apid| apid != ext.apid) {
            return false;
        }
        if self.ctid.is_some_and(|ctid| ctid != ext.ctid) {
            return false;
        }
        if let Some(max_level) = self.max_level {
            match ext.log_level() {
                Some(level) if level > max_level => return false,
                None => return false,
                Some(_) => {}
            }
        }
        if self.min_payload.is_some() || self.max_payload.is_some() {
            let len = message.payload_len();
            if self.min_payload.is_some_and(|min| len < min) {
                return false;
            }
            if self.max_payload.is_some_and(|max| len > max) {
                return false;
            }
        }
        true
    }
}

/// Set of entries combined with logical OR.
///
/// An empty filter accepts everything, as does any message without an
/// extended header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    entries: Vec<FilterEntry>,
}

impl Filter {
    pub fn new(entries: Vec<FilterEntry>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, entry: FilterEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[FilterEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn matches(&self, message: &Message) -> bool {
        if self.entries.is_empty() || message.extended.is_none() {
            return true;
        }
        self.entries.iter().any(|entry| entry.matches(message))
    }
}
