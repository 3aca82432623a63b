//! Response parsing shared by the device protocols
//!
//! Each protocol is an ordered [`RuleTable`]: a list of (predicate, handler)
//! pairs evaluated top to bottom, first match wins. Ordering carries the
//! disambiguation (for example `AMUT1` must be tried before `A<n>`).
//!
//! Supported protocols:
//! - [`linear`]: single active channel per medium
//! - [`matrix`]: N×M crosspoint tie table

pub mod linear;
pub mod matrix;

use crate::core::connection::CommandLink;
use tracing::trace;

/// A received line together with the command it answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response<'a> {
    /// Command text from the correlation ticket, if one was live
    pub pending: Option<&'a str>,
    /// Received line, trimmed
    pub line: &'a str,
}

impl<'a> Response<'a> {
    /// Pair a line with its correlation ticket
    pub fn new(pending: Option<&'a str>, line: &'a str) -> Self {
        Self { pending, line }
    }

    /// Unsolicited or uncorrelated line
    pub fn unsolicited(line: &'a str) -> Self {
        Self::new(None, line)
    }

    /// Leading character, upper-cased
    pub fn lead(&self) -> Option<char> {
        self.line.chars().next().map(|c| c.to_ascii_uppercase())
    }

    /// Case-insensitive prefix test
    pub fn starts_with_ignore_case(&self, prefix: &str) -> bool {
        self.line.len() >= prefix.len()
            && self.line.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
    }

    /// Flag encoded in the last character (`1` = on)
    pub fn trailing_flag(&self) -> bool {
        self.line.ends_with('1')
    }

    /// Whether the pending command equals `command`, ignoring case
    pub fn answers(&self, command: &str) -> bool {
        self.pending
            .is_some_and(|pending| pending.eq_ignore_ascii_case(command))
    }
}

/// Predicate half of a rule
pub type Matcher = fn(&Response<'_>) -> bool;

/// Handler half of a rule; `None` means the line matched but carried nothing usable
pub type Handler<E> = fn(&Response<'_>) -> Option<E>;

/// One entry of a [`RuleTable`]
pub struct Rule<E> {
    /// Name used in trace output
    pub name: &'static str,
    matches: Matcher,
    handle: Handler<E>,
}

/// Ordered structural matcher
pub struct RuleTable<E> {
    rules: Vec<Rule<E>>,
}

impl<E> RuleTable<E> {
    /// Create an empty table
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule; rules are tried in insertion order
    #[must_use]
    pub fn rule(mut self, name: &'static str, matches: Matcher, handle: Handler<E>) -> Self {
        self.rules.push(Rule {
            name,
            matches,
            handle,
        });
        self
    }

    /// Run the first matching rule
    pub fn dispatch(&self, response: &Response<'_>) -> Option<E> {
        match self.rules.iter().find(|rule| (rule.matches)(response)) {
            Some(rule) => {
                trace!(rule = rule.name, line = response.line, "rule matched");
                (rule.handle)(response)
            }
            None => {
                trace!(line = response.line, pending = ?response.pending, "no rule matched");
                None
            }
        }
    }

    /// Rule names in evaluation order
    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name).collect()
    }
}

impl<E> Default for RuleTable<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Device-reported error code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceErrorCode {
    /// Normalised code, e.g. `E01`
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl DeviceErrorCode {
    /// Resolve `code` against a protocol's message table
    pub fn lookup(code: &str, table: &[(&str, &str)]) -> Self {
        let code = code.trim().to_ascii_uppercase();
        let message = table
            .iter()
            .find(|(known, _)| *known == code)
            .map_or_else(
                || format!("unknown error code {code}"),
                |(_, message)| (*message).to_string(),
            );
        Self { code, message }
    }
}

impl std::fmt::Display for DeviceErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Protocol plugged into a [`DeviceConnection`](crate::core::connection::DeviceConnection)
///
/// `handle` runs on the dispatcher task, one line at a time, and is the only
/// place device state is mutated.
pub trait ProtocolHandler: Send + Sync + 'static {
    /// Called after the transport opened, before the identify command is sent
    fn on_open(&self, link: &CommandLink);

    /// Process one received line
    fn handle(&self, response: &Response<'_>, link: &CommandLink);

    /// Handshake command reporting topology and firmware
    fn identify_command(&self) -> &'static str {
        "I"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_digit_line(r: &Response<'_>) -> bool {
        r.line.chars().all(|c| c.is_ascii_digit())
    }

    #[test]
    fn test_first_match_wins() {
        let table: RuleTable<&'static str> = RuleTable::new()
            .rule("amut", |r| r.starts_with_ignore_case("AMUT"), |_| Some("mute"))
            .rule("audio", |r| r.lead() == Some('A'), |_| Some("audio"))
            .rule("number", is_digit_line, |_| None);

        assert_eq!(table.dispatch(&Response::unsolicited("amut1")), Some("mute"));
        assert_eq!(table.dispatch(&Response::unsolicited("A3")), Some("audio"));
        assert_eq!(table.dispatch(&Response::unsolicited("12")), None);
        assert_eq!(table.dispatch(&Response::unsolicited("zz")), None);
        assert_eq!(table.names(), vec!["amut", "audio", "number"]);
    }

    #[test]
    fn test_answers_ignores_case() {
        let r = Response::new(Some("q"), "60-333-01");
        assert!(r.answers("Q"));
        assert!(!Response::unsolicited("x").answers("Q"));
    }

    #[test]
    fn test_error_code_lookup() {
        let table = [("E01", "Invalid Channel Number")];
        let known = DeviceErrorCode::lookup("e01", &table);
        assert_eq!(known.code, "E01");
        assert_eq!(known.message, "Invalid Channel Number");

        let unknown = DeviceErrorCode::lookup("E99", &table);
        assert_eq!(unknown.message, "unknown error code E99");
    }
}
