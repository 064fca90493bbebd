//! Redirect planning for intercepted `bind` calls.
//!
//! Two well-known listener ports are recognised. Each maps to exactly one
//! environment variable; when that variable holds a valid port, the bind is
//! redirected there. Every other situation is a [`Passthrough`]: the call is
//! forwarded exactly as the caller issued it.
//!
//! The environment is read through a caller-supplied lookup on every plan.
//! Nothing here caches a decision.

use core::fmt::{self, Write as _};

use crate::socket::{self, AF_INET, SOCKADDR_IN_LEN};

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

/// Default port of the database wire protocol listener.
pub const DATABASE_PORT: u16 = 5432;
/// Default port of the REST / administrative API listener.
pub const API_PORT: u16 = 8080;

/// Overrides [`DATABASE_PORT`].
pub const DATABASE_PORT_VAR: &str = "RUSTYDB_PORT";
/// Overrides [`API_PORT`].
pub const API_PORT_VAR: &str = "RUSTYDB_API_PORT";

/// Prefix of every line this crate asks the ABI layer to print.
pub const LOG_PREFIX: &str = "[port_override]";

/// A recognised default port and the variable that may override it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectRule {
    pub default_port: u16,
    pub variable: &'static str,
    /// Listener name, as shown in test and tool output.
    pub listener: &'static str,
}

/// Every port the interposer will consider redirecting.
///
/// The metrics listener (9090) has no rule.
pub const RULES: [RedirectRule; 2] = [
    RedirectRule {
        default_port: DATABASE_PORT,
        variable: DATABASE_PORT_VAR,
        listener: "database",
    },
    RedirectRule {
        default_port: API_PORT,
        variable: API_PORT_VAR,
        listener: "api",
    },
];

/// Returns the rule for `port`, if it is one of the recognised defaults.
#[inline]
pub fn rule_for(port: u16) -> Option<&'static RedirectRule> {
    RULES.iter().find(|rule| rule.default_port == port)
}

// ---------------------------------------------------------------------------
// Override parsing
// ---------------------------------------------------------------------------

/// Why an override value was not usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideError {
    /// The variable is set but empty.
    Empty,
    /// Contains something other than ASCII digits.
    NotDecimal,
    /// Decimal, but not in `1..=65535`. Saturates at `u64::MAX`.
    OutOfRange(u64),
}

impl fmt::Display for OverrideError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty value"),
            Self::NotDecimal => f.write_str("not a decimal integer"),
            Self::OutOfRange(v) => write!(f, "{v} is outside 1..=65535"),
        }
    }
}

/// Parses an override variable's raw bytes as a port.
///
/// Accepts only ASCII digits (leading zeros allowed). No sign, no whitespace.
pub fn parse_override_port(raw: &[u8]) -> Result<u16, OverrideError> {
    if raw.is_empty() {
        return Err(OverrideError::Empty);
    }
    let mut value: u64 = 0;
    for &b in raw {
        if !b.is_ascii_digit() {
            return Err(OverrideError::NotDecimal);
        }
        value = value.saturating_mul(10).saturating_add(u64::from(b - b'0'));
    }
    match u16::try_from(value) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(OverrideError::OutOfRange(value)),
    }
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

/// A bind that will be sent to a different port than requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectDirective {
    pub original_port: u16,
    pub variable: &'static str,
    pub replacement_port: u16,
}

impl RedirectDirective {
    /// Formats the stderr line announcing this redirect.
    #[must_use]
    pub fn diagnostic(&self) -> DiagnosticLine {
        let mut line = DiagnosticLine::new();
        // Cannot overflow: the longest line is well under the buffer size.
        let _ = writeln!(
            line,
            "{LOG_PREFIX} Redirecting port {} -> {}",
            self.original_port, self.replacement_port
        );
        line
    }
}

/// Why a bind is forwarded untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Passthrough {
    /// The address pointer was null.
    NullAddress,
    /// `addrlen` cannot hold the structure that would need inspecting.
    ShortAddress(usize),
    /// Not `AF_INET`; the IPv4 port offset does not apply.
    UnsupportedFamily(i32),
    /// IPv4, but not one of the [`RULES`] ports.
    UnrecognizedPort(u16),
    /// The designated variable is unset or empty.
    OverrideUnset(&'static str),
    /// The designated variable is set but not a valid port.
    OverrideInvalid {
        variable: &'static str,
        error: OverrideError,
    },
}

impl fmt::Display for Passthrough {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullAddress => f.write_str("null address"),
            Self::ShortAddress(len) => write!(f, "address length {len} too short"),
            Self::UnsupportedFamily(af) => write!(f, "address family {af} not inspected"),
            Self::UnrecognizedPort(port) => write!(f, "port {port} has no override rule"),
            Self::OverrideUnset(var) => write!(f, "{var} unset"),
            Self::OverrideInvalid { variable, error } => write!(f, "{variable}: {error}"),
        }
    }
}

/// Outcome of planning one bind call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindRoute {
    Forward(Passthrough),
    Redirect(RedirectDirective),
}

impl BindRoute {
    /// The port the bind will actually target, when it differs from the request.
    #[must_use]
    pub fn replacement_port(&self) -> Option<u16> {
        match self {
            Self::Redirect(d) => Some(d.replacement_port),
            Self::Forward(_) => None,
        }
    }

    #[must_use]
    pub fn is_redirect(&self) -> bool {
        matches!(self, Self::Redirect(_))
    }
}

/// Checks whether a `sockaddr` of `family` and `addrlen` carries an IPv4 port
/// worth looking at.
#[inline]
pub fn inspect_family(family: i32, addrlen: usize) -> Result<(), Passthrough> {
    if family != AF_INET {
        return Err(Passthrough::UnsupportedFamily(family));
    }
    if !socket::holds_sockaddr_in(addrlen) {
        return Err(Passthrough::ShortAddress(addrlen));
    }
    Ok(())
}

/// Decides the route for an IPv4 bind on `port` (host byte order).
///
/// `lookup` is consulted at most once, and only for a recognised port.
pub fn plan<F, V>(port: u16, lookup: F) -> BindRoute
where
    F: FnOnce(&'static str) -> Option<V>,
    V: AsRef<[u8]>,
{
    let Some(rule) = rule_for(port) else {
        return BindRoute::Forward(Passthrough::UnrecognizedPort(port));
    };
    let Some(raw) = lookup(rule.variable) else {
        return BindRoute::Forward(Passthrough::OverrideUnset(rule.variable));
    };
    match parse_override_port(raw.as_ref()) {
        Ok(replacement_port) => BindRoute::Redirect(RedirectDirective {
            original_port: port,
            variable: rule.variable,
            replacement_port,
        }),
        Err(OverrideError::Empty) => BindRoute::Forward(Passthrough::OverrideUnset(rule.variable)),
        Err(error) => BindRoute::Forward(Passthrough::OverrideInvalid {
            variable: rule.variable,
            error,
        }),
    }
}

/// Plans a bind from the raw bytes of the caller's address.
///
/// `view` holds the leading bytes of the structure (at most
/// [`SOCKADDR_IN_LEN`] are inspected); `addrlen` is the length the caller
/// passed to `bind`.
pub fn plan_sockaddr<F, V>(view: &[u8], addrlen: usize, lookup: F) -> BindRoute
where
    F: FnOnce(&'static str) -> Option<V>,
    V: AsRef<[u8]>,
{
    let Some(family) = socket::family_of(view) else {
        return BindRoute::Forward(Passthrough::ShortAddress(addrlen));
    };
    if let Err(reason) = inspect_family(family, addrlen) {
        return BindRoute::Forward(reason);
    }
    let Some(sin) = view
        .get(..SOCKADDR_IN_LEN)
        .and_then(|head| <&[u8; SOCKADDR_IN_LEN]>::try_from(head).ok())
    else {
        return BindRoute::Forward(Passthrough::ShortAddress(view.len()));
    };
    plan(socket::port_of(sin), lookup)
}

// ---------------------------------------------------------------------------
// Diagnostic line
// ---------------------------------------------------------------------------

const DIAGNOSTIC_CAPACITY: usize = 64;

/// A formatted diagnostic line held in a fixed stack buffer.
#[derive(Clone, Copy)]
pub struct DiagnosticLine {
    buf: [u8; DIAGNOSTIC_CAPACITY],
    len: usize,
}

impl DiagnosticLine {
    const fn new() -> Self {
        Self {
            buf: [0; DIAGNOSTIC_CAPACITY],
            len: 0,
        }
    }

    /// The line, including its trailing newline.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        // Only ever written through fmt::Write, which hands us whole `str`s.
        core::str::from_utf8(self.as_bytes()).unwrap_or_default()
    }
}

impl fmt::Write for DiagnosticLine {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let end = self.len.checked_add(bytes.len()).ok_or(fmt::Error)?;
        if end > DIAGNOSTIC_CAPACITY {
            return Err(fmt::Error);
        }
        self.buf[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }
}

impl fmt::Debug for DiagnosticLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DiagnosticLine").field(&self.as_str()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write as _;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&'static str) -> Option<&'a str> + 'a {
        move |name| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| *v)
        }
    }

    fn sockaddr_in(family: u16, port: u16) -> [u8; SOCKADDR_IN_LEN] {
        let mut out = [0u8; SOCKADDR_IN_LEN];
        out[..2].copy_from_slice(&family.to_ne_bytes());
        out[2..4].copy_from_slice(&port.to_be_bytes());
        out[4..8].copy_from_slice(&[127, 0, 0, 1]);
        out
    }

    // -- Rule table ---------------------------------------------------------

    #[test]
    fn exactly_two_rules() {
        assert_eq!(rule_for(DATABASE_PORT).map(|r| r.variable), Some(DATABASE_PORT_VAR));
        assert_eq!(rule_for(API_PORT).map(|r| r.variable), Some(API_PORT_VAR));
        assert!(rule_for(9090).is_none());
        assert!(rule_for(0).is_none());
        assert!(rule_for(5433).is_none());
    }

    #[test]
    fn rule_variables_are_distinct() {
        assert_ne!(RULES[0].variable, RULES[1].variable);
        assert_ne!(RULES[0].default_port, RULES[1].default_port);
    }

    // -- Parsing ------------------------------------------------------------

    #[test]
    fn parse_accepts_port_range() {
        assert_eq!(parse_override_port(b"1"), Ok(1));
        assert_eq!(parse_override_port(b"5433"), Ok(5433));
        assert_eq!(parse_override_port(b"65535"), Ok(65535));
        assert_eq!(parse_override_port(b"08081"), Ok(8081));
    }

    #[test]
    fn parse_rejects_out_of_range() {
        assert_eq!(parse_override_port(b"0"), Err(OverrideError::OutOfRange(0)));
        assert_eq!(
            parse_override_port(b"65536"),
            Err(OverrideError::OutOfRange(65536))
        );
        assert_eq!(
            parse_override_port(b"70000"),
            Err(OverrideError::OutOfRange(70000))
        );
        assert_eq!(
            parse_override_port(b"99999999999999999999999"),
            Err(OverrideError::OutOfRange(u64::MAX))
        );
    }

    #[test]
    fn parse_rejects_non_decimal() {
        for raw in [&b"abc"[..], b"-1", b"+5433", b" 5433", b"5433 ", b"54x3", b"0x1538"] {
            assert_eq!(parse_override_port(raw), Err(OverrideError::NotDecimal), "{raw:?}");
        }
        assert_eq!(parse_override_port(b""), Err(OverrideError::Empty));
    }

    // -- Planning -----------------------------------------------------------

    #[test]
    fn database_port_without_override_is_forwarded() {
        let route = plan(DATABASE_PORT, env(&[]));
        assert_eq!(
            route,
            BindRoute::Forward(Passthrough::OverrideUnset(DATABASE_PORT_VAR))
        );
    }

    #[test]
    fn database_port_with_override_is_redirected() {
        let route = plan(DATABASE_PORT, env(&[(DATABASE_PORT_VAR, "5433")]));
        assert_eq!(
            route,
            BindRoute::Redirect(RedirectDirective {
                original_port: 5432,
                variable: DATABASE_PORT_VAR,
                replacement_port: 5433,
            })
        );
        assert_eq!(route.replacement_port(), Some(5433));
    }

    #[test]
    fn api_port_uses_its_own_variable() {
        let vars = [(DATABASE_PORT_VAR, "6000"), (API_PORT_VAR, "18080")];
        assert_eq!(plan(API_PORT, env(&vars)).replacement_port(), Some(18080));
        assert_eq!(plan(DATABASE_PORT, env(&vars)).replacement_port(), Some(6000));

        let only_db = [(DATABASE_PORT_VAR, "6000")];
        assert!(!plan(API_PORT, env(&only_db)).is_redirect());
    }

    #[test]
    fn invalid_override_falls_back() {
        assert_eq!(
            plan(API_PORT, env(&[(API_PORT_VAR, "70000")])),
            BindRoute::Forward(Passthrough::OverrideInvalid {
                variable: API_PORT_VAR,
                error: OverrideError::OutOfRange(70000),
            })
        );
        assert_eq!(
            plan(API_PORT, env(&[(API_PORT_VAR, "abc")])),
            BindRoute::Forward(Passthrough::OverrideInvalid {
                variable: API_PORT_VAR,
                error: OverrideError::NotDecimal,
            })
        );
    }

    #[test]
    fn empty_override_counts_as_unset() {
        assert_eq!(
            plan(DATABASE_PORT, env(&[(DATABASE_PORT_VAR, "")])),
            BindRoute::Forward(Passthrough::OverrideUnset(DATABASE_PORT_VAR))
        );
    }

    #[test]
    fn unrecognized_port_never_consults_environment() {
        let mut consulted = false;
        let route = plan(9090, |_name| {
            consulted = true;
            Some("1234")
        });
        assert_eq!(route, BindRoute::Forward(Passthrough::UnrecognizedPort(9090)));
        assert!(!consulted);
    }

    #[test]
    fn lookup_asks_for_designated_variable_only() {
        let mut asked = None;
        let _ = plan(API_PORT, |name| {
            asked = Some(name);
            None::<&str>
        });
        assert_eq!(asked, Some(API_PORT_VAR));
    }

    #[test]
    fn planning_is_repeatable() {
        let vars = [(DATABASE_PORT_VAR, "5433")];
        let first = plan(DATABASE_PORT, env(&vars));
        let second = plan(DATABASE_PORT, env(&vars));
        assert_eq!(first, second);

        // A changed environment is seen on the very next plan.
        let changed = [(DATABASE_PORT_VAR, "5434")];
        assert_eq!(plan(DATABASE_PORT, env(&changed)).replacement_port(), Some(5434));
    }

    // -- Raw sockaddr -------------------------------------------------------

    #[test]
    fn sockaddr_non_inet_family_is_forwarded() {
        let raw = sockaddr_in(crate::socket::AF_INET6 as u16, DATABASE_PORT);
        let route = plan_sockaddr(&raw, 28, env(&[(DATABASE_PORT_VAR, "5433")]));
        assert_eq!(
            route,
            BindRoute::Forward(Passthrough::UnsupportedFamily(crate::socket::AF_INET6))
        );

        let unix = sockaddr_in(crate::socket::AF_UNIX as u16, DATABASE_PORT);
        assert!(!plan_sockaddr(&unix, SOCKADDR_IN_LEN, env(&[(DATABASE_PORT_VAR, "5433")])).is_redirect());
    }

    #[test]
    fn sockaddr_inet_reads_port() {
        let raw = sockaddr_in(AF_INET as u16, DATABASE_PORT);
        let route = plan_sockaddr(&raw, SOCKADDR_IN_LEN, env(&[(DATABASE_PORT_VAR, "5433")]));
        assert_eq!(route.replacement_port(), Some(5433));
    }

    #[test]
    fn sockaddr_short_length_is_forwarded() {
        let raw = sockaddr_in(AF_INET as u16, DATABASE_PORT);
        let route = plan_sockaddr(&raw[..8], 8, env(&[(DATABASE_PORT_VAR, "5433")]));
        assert_eq!(route, BindRoute::Forward(Passthrough::ShortAddress(8)));

        let route = plan_sockaddr(&raw[..1], 1, env(&[]));
        assert_eq!(route, BindRoute::Forward(Passthrough::ShortAddress(1)));
    }

    // -- Diagnostic ---------------------------------------------------------

    #[test]
    fn diagnostic_line_format() {
        let directive = RedirectDirective {
            original_port: 5432,
            variable: DATABASE_PORT_VAR,
            replacement_port: 5433,
        };
        assert_eq!(
            directive.diagnostic().as_str(),
            "[port_override] Redirecting port 5432 -> 5433\n"
        );
    }

    #[test]
    fn diagnostic_line_fits_widest_ports() {
        let directive = RedirectDirective {
            original_port: 65535,
            variable: API_PORT_VAR,
            replacement_port: 65535,
        };
        let line = directive.diagnostic();
        assert_eq!(line.as_str(), "[port_override] Redirecting port 65535 -> 65535\n");
        assert!(line.as_bytes().len() < DIAGNOSTIC_CAPACITY);
    }

    #[test]
    fn diagnostic_buffer_refuses_overflow() {
        let mut line = DiagnosticLine::new();
        let long = "x".repeat(DIAGNOSTIC_CAPACITY + 1);
        assert!(line.write_str(&long).is_err());
        assert!(line.as_bytes().is_empty());
    }

    #[test]
    fn passthrough_display_names_variable() {
        let reason = Passthrough::OverrideInvalid {
            variable: API_PORT_VAR,
            error: OverrideError::OutOfRange(70000),
        };
        assert_eq!(reason.to_string(), "RUSTYDB_API_PORT: 70000 is outside 1..=65535");
    }
}
