//! Composite extension handshake and subwindow redirection.

use tracing::info;
use x11rb::connection::{Connection, RequestConnection};
use x11rb::errors::ReplyError;
use x11rb::protocol::ErrorKind;
use x11rb::protocol::composite::{self, ConnectionExt as _, Redirect};
use x11rb::protocol::xproto::{ConnectionExt as _, Window};
use x11rb::rust_connection::RustConnection;

use crate::errors::Error;

/// Composite extension state for this connection.
pub struct CompositeExt {
    /// Major opcode, used to recognize Composite errors in the event loop.
    pub major_opcode: u8,
}

impl CompositeExt {
    pub fn query(conn: &RustConnection) -> Result<Self, Error> {
        let info = conn
            .extension_information(composite::X11_EXTENSION_NAME)?
            .ok_or(Error::NoCompositeExtension)?;

        let version = conn.composite_query_version(0, 4)?.reply()?;
        info!(
            "Composite extension {}.{} (opcode {})",
            version.major_version, version.minor_version, info.major_opcode
        );

        Ok(Self {
            major_opcode: info.major_opcode,
        })
    }

    /// Redirect all subwindows of `root` to off-screen storage.
    ///
    /// Runs under a server grab so no other client's request lands between
    /// the selection claim becoming visible and redirection taking effect.
    /// The redirect is checked synchronously; an Access error means another
    /// manager already holds the redirection.
    pub fn redirect_subwindows(&self, conn: &RustConnection, root: Window) -> Result<(), Error> {
        conn.grab_server()?;
        let result = conn
            .composite_redirect_subwindows(root, Redirect::AUTOMATIC)
            .map_err(Error::from)
            .and_then(|cookie| cookie.check().map_err(map_redirect_error));
        conn.ungrab_server()?;
        conn.flush()?;
        result?;

        info!("Redirected subwindows of root 0x{:x} (Automatic)", root);
        Ok(())
    }
}

fn map_redirect_error(err: ReplyError) -> Error {
    match err {
        ReplyError::X11Error(ref e) if e.error_kind == ErrorKind::Access => {
            Error::AlreadyRunning(None)
        }
        other => other.into(),
    }
}
