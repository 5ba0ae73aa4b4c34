//! Error types and X11 protocol-error classification.
//!
//! Every fatal condition is a value here; nothing exits from inside a
//! callback. The `Display` strings of the named variants are part of the
//! program's stderr contract and must not change.

use thiserror::Error;
use x11rb::errors::{ConnectError, ConnectionError, ReplyError, ReplyOrIdError};
use x11rb::protocol::ErrorKind;
use x11rb::protocol::composite;

/// How an already-running composite manager is identified in the fatal
/// message: by its window title when one can be read, otherwise by the
/// owning window's id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerIdent {
    Named(String),
    Window(u32),
}

fn ident_suffix(ident: &Option<ManagerIdent>) -> String {
    match ident {
        None => String::new(),
        Some(ManagerIdent::Named(name)) => format!(" ({name})"),
        Some(ManagerIdent::Window(window)) => format!(" (0x{window:x})"),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Can't open display")]
    OpenDisplay(#[source] ConnectError),

    #[error("No composite extension")]
    NoCompositeExtension,

    #[error("Another composite manager is already running{}", ident_suffix(.0))]
    AlreadyRunning(Option<ManagerIdent>),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Reply(#[from] ReplyError),

    #[error(transparent)]
    Id(#[from] ReplyOrIdError),
}

/// True iff a protocol error came from our CompositeRedirectSubwindows
/// request, meaning another manager holds the redirection.
pub fn is_redirect_collision(major_opcode: u8, minor_opcode: u16, composite_opcode: u8) -> bool {
    major_opcode == composite_opcode
        && minor_opcode == u16::from(composite::REDIRECT_SUBWINDOWS_REQUEST)
}

fn error_description(kind: ErrorKind) -> String {
    match kind {
        ErrorKind::Unknown(_) => "unknown".into(),
        known => format!("{known:?}"),
    }
}

/// Diagnostic line for a protocol error we do not act on. The format is
/// fixed: `error <code>: <description> request <major> minor <minor> serial <serial>`.
pub fn format_protocol_error(
    error_code: u8,
    kind: ErrorKind,
    request: u8,
    minor: u16,
    serial: u16,
) -> String {
    format!(
        "error {}: {} request {} minor {} serial {}",
        error_code,
        error_description(kind),
        request,
        minor,
        serial
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_messages_are_fixed() {
        assert_eq!(
            Error::OpenDisplay(ConnectError::UnknownError).to_string(),
            "Can't open display"
        );
        assert_eq!(
            Error::NoCompositeExtension.to_string(),
            "No composite extension"
        );
    }

    #[test]
    fn already_running_variants() {
        assert_eq!(
            Error::AlreadyRunning(None).to_string(),
            "Another composite manager is already running"
        );
        assert_eq!(
            Error::AlreadyRunning(Some(ManagerIdent::Named("picom".into()))).to_string(),
            "Another composite manager is already running (picom)"
        );
        assert_eq!(
            Error::AlreadyRunning(Some(ManagerIdent::Window(0x2a0001))).to_string(),
            "Another composite manager is already running (0x2a0001)"
        );
    }

    #[test]
    fn redirect_collision_matches_composite_request_only() {
        let composite_opcode = 142;
        assert!(is_redirect_collision(
            142,
            u16::from(composite::REDIRECT_SUBWINDOWS_REQUEST),
            composite_opcode
        ));
        // Same minor on a different extension
        assert!(!is_redirect_collision(
            139,
            u16::from(composite::REDIRECT_SUBWINDOWS_REQUEST),
            composite_opcode
        ));
        // Different composite request
        assert!(!is_redirect_collision(142, 1, composite_opcode));
    }

    #[test]
    fn protocol_error_line_format() {
        assert_eq!(
            format_protocol_error(10, ErrorKind::Access, 142, 2, 37),
            "error 10: Access request 142 minor 2 serial 37"
        );
        assert_eq!(
            format_protocol_error(200, ErrorKind::Unknown(200), 7, 0, 1),
            "error 200: unknown request 7 minor 0 serial 1"
        );
    }
}
