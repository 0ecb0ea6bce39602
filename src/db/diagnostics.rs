//! Backend diagnostic handling.
//!
//! A backend error arrives as a base message plus zero or more structured sub-messages
//! (state, code, text). This module collapses them into one readable message and decides
//! whether the failure came from the transport rather than from SQL.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::sync::LazyLock;

/// Host server noise attached to most failures ("PWS0005 - Error occurred in the database host server code").
pub const BENIGN_HOST_SERVER_CODE: i32 = 69898;

/// "Generic message text too long" code used by SIGNAL statements.
pub const SIGNAL_MESSAGE_CODE: i32 = -438;

pub const CONNECTION_RESET: i32 = 10054;
pub const CONNECTION_TIMED_OUT: i32 = 10060;

/// Transport failure codes reported by the client access layer (winsock return codes plus
/// the user-specified send/receive timeout).
pub const NETWORK_ERROR_CODES: &[i32] = &[
    8413,  // user-specified time-out while sending or receiving data
    10024, // too many open sockets
    10035, // resource temporarily unavailable
    10038, // socket operation on non-socket
    10047, // protocol not installed
    10050, // network is down
    10051, // network is unreachable
    10052, // network dropped connection on reset
    10053, // software caused connection abort
    10054, // connection reset by peer
    10055, // no buffer space available
    10057, // socket is not connected
    10058, // cannot send after socket shutdown
    10060, // connection timed out
    10061, // connection refused
    10064, // host is down
    10065, // no route to host
    10091, // network subsystem is unavailable
    10092, // winsock version not supported
    11001, // host definitely not found
    11002, // host not found, but we are not sure
    11004, // valid name but no data record
];

static VENDOR_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\[[^\]]+\])*").expect("vendor prefix pattern"));

/// One structured sub-message of a backend error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub state: String,
    pub code: i32,
    pub message: String,
}

impl Diagnostic {
    pub fn new(state: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            code,
            message: message.into(),
        }
    }
}

/// Check if a diagnostic code is pure noise.
pub fn is_benign(code: i32) -> bool {
    code == BENIGN_HOST_SERVER_CODE
}

/// Check if any diagnostic carries a transport failure code.
pub fn is_network_failure(diagnostics: &[Diagnostic]) -> bool {
    diagnostics
        .iter()
        .any(|d| NETWORK_ERROR_CODES.contains(&d.code))
}

/// Strip the bracketed product identifiers (`[IBM][System i Access ODBC Driver]...`).
pub fn strip_vendor_prefix(message: &str) -> &str {
    match VENDOR_PREFIX.find(message) {
        Some(m) => &message[m.end()..],
        None => message,
    }
}

/// Collapse a base message and its diagnostics into one message.
///
/// Benign host-server diagnostics are dropped, SIGNAL text keeps only the user message,
/// everything else is rendered as `(code) text`. Parts are joined with ` :: `.
pub fn normalize_message(base: &str, diagnostics: &[Diagnostic]) -> String {
    let parts: Vec<String> = diagnostics
        .iter()
        .filter(|d| !is_benign(d.code))
        .map(|d| {
            let text = strip_vendor_prefix(&d.message);
            if d.code == SIGNAL_MESSAGE_CODE {
                text.replacen("SQL0438 - ", "", 1)
            } else {
                format!("({}) {}", d.code, text)
            }
        })
        .collect();

    if parts.is_empty() {
        return base.to_string();
    }
    let mut message = base.to_string();
    if !message.is_empty() {
        message.push_str(" :: ");
    }
    message.push_str(&parts.join(" :: "));
    message
}

/// Map an I/O error kind onto the equivalent transport failure code.
pub fn io_failure_code(kind: ErrorKind) -> Option<i32> {
    match kind {
        ErrorKind::ConnectionReset => Some(CONNECTION_RESET),
        ErrorKind::TimedOut => Some(CONNECTION_TIMED_OUT),
        ErrorKind::ConnectionRefused => Some(10061),
        ErrorKind::ConnectionAborted => Some(10053),
        ErrorKind::NotConnected => Some(10057),
        ErrorKind::BrokenPipe => Some(10058),
        ErrorKind::HostUnreachable => Some(10065),
        ErrorKind::NetworkUnreachable => Some(10051),
        ErrorKind::NetworkDown => Some(10050),
        ErrorKind::AddrNotAvailable => Some(11004),
        ErrorKind::WouldBlock => Some(10035),
        _ => None,
    }
}
