//! Parsing of the interposer's stderr diagnostics.

use portremap_core::redirect::LOG_PREFIX;

/// One `<prefix> Redirecting port A -> B` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectLine {
    pub from: u16,
    pub to: u16,
}

/// Parses a single stderr line. Anything that is not a redirect announcement
/// yields `None`.
#[must_use]
pub fn parse_redirect_line(line: &str) -> Option<RedirectLine> {
    let rest = line.trim_end().strip_prefix(LOG_PREFIX)?;
    let rest = rest.strip_prefix(" Redirecting port ")?;
    let (from, to) = rest.split_once(" -> ")?;
    Some(RedirectLine {
        from: from.parse().ok()?,
        to: to.parse().ok()?,
    })
}

/// All redirect announcements in a captured stderr stream, in order.
#[must_use]
pub fn redirect_lines(stderr: &str) -> Vec<RedirectLine> {
    stderr.lines().filter_map(parse_redirect_line).collect()
}
