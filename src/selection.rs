//! Composite-manager selection (`_NET_WM_CM_S<n>`) negotiation.
//!
//! The selection atom is the per-screen mutual-exclusion flag: whoever owns
//! it is the screen's composite manager. Ownership is held by a 1x1 window
//! that exists for no other purpose and is never mapped.

use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ConnectionExt, CreateWindowAux, PropMode, Window, WindowClass,
};
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use crate::errors::{Error, ManagerIdent};

/// Instance and class recorded on the manager window.
const WM_IDENT: &str = "xcompmgr";

pub fn selection_atom_name(screen_num: usize) -> String {
    format!("_NET_WM_CM_S{screen_num}")
}

pub fn intern_selection_atom(conn: &RustConnection, screen_num: usize) -> Result<Atom, Error> {
    let name = selection_atom_name(screen_num);
    let atom = conn.intern_atom(false, name.as_bytes())?.reply()?.atom;
    debug!("Interned selection atom {} ({})", name, atom);
    Ok(atom)
}

/// Current owner of the selection, `None` when nobody holds it.
pub fn current_owner(conn: &RustConnection, atom: Atom) -> Result<Option<Window>, Error> {
    let owner = conn.get_selection_owner(atom)?.reply()?.owner;
    Ok(if owner == x11rb::NONE { None } else { Some(owner) })
}

/// Identify an existing manager for the fatal message: prefer its window
/// title, fall back to the raw window id when no title can be read.
pub fn identify_owner(conn: &RustConnection, owner: Window) -> ManagerIdent {
    match window_title(conn, owner) {
        Some(name) => ManagerIdent::Named(name),
        None => ManagerIdent::Window(owner),
    }
}

fn window_title(conn: &RustConnection, window: Window) -> Option<String> {
    let net_wm_name = conn
        .intern_atom(false, b"_NET_WM_NAME")
        .ok()?
        .reply()
        .ok()?
        .atom;
    read_text_property(conn, window, net_wm_name)
        .or_else(|| read_text_property(conn, window, AtomEnum::WM_NAME.into()))
}

fn read_text_property(conn: &RustConnection, window: Window, property: Atom) -> Option<String> {
    let reply = conn
        .get_property(false, window, property, AtomEnum::ANY, 0, 1024)
        .ok()?
        .reply()
        .ok()?;
    if reply.format != 8 {
        return None;
    }
    first_text_string(&reply.value)
}

/// First NUL-delimited string of a text property, lossily decoded.
fn first_text_string(value: &[u8]) -> Option<String> {
    let first = value.split(|&b| b == 0).next().unwrap_or(&[]);
    if first.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(first).into_owned())
    }
}

/// Create the manager window, identify it, and take the selection.
///
/// The claim is verified by re-querying the owner: the server serializes
/// SetSelectionOwner, so losing the verification means another manager got
/// there between our ownership check and the claim.
pub fn claim(conn: &RustConnection, screen_num: usize, atom: Atom) -> Result<Window, Error> {
    let screen = &conn.setup().roots[screen_num];
    let window = conn.generate_id()?;
    conn.create_window(
        screen.root_depth,
        window,
        screen.root,
        0,
        0,
        1,
        1,
        0,
        WindowClass::INPUT_OUTPUT,
        0,
        &CreateWindowAux::new(),
    )?;
    debug!("Created manager window 0x{:x}", window);

    conn.change_property8(
        PropMode::REPLACE,
        window,
        AtomEnum::WM_NAME,
        AtomEnum::STRING,
        WM_IDENT.as_bytes(),
    )?;
    let net_wm_name = conn.intern_atom(false, b"_NET_WM_NAME")?.reply()?.atom;
    let utf8_string = conn.intern_atom(false, b"UTF8_STRING")?.reply()?.atom;
    conn.change_property8(
        PropMode::REPLACE,
        window,
        net_wm_name,
        utf8_string,
        WM_IDENT.as_bytes(),
    )?;
    // WM_CLASS carries instance and class, each NUL-terminated
    let wm_class = format!("{WM_IDENT}\0{WM_IDENT}\0");
    conn.change_property8(
        PropMode::REPLACE,
        window,
        AtomEnum::WM_CLASS,
        AtomEnum::STRING,
        wm_class.as_bytes(),
    )?;

    conn.set_selection_owner(window, atom, x11rb::CURRENT_TIME)?;
    conn.flush()?;

    let owner = conn.get_selection_owner(atom)?.reply()?.owner;
    if owner != window {
        let ident = if owner == x11rb::NONE {
            None
        } else {
            Some(identify_owner(conn, owner))
        };
        return Err(Error::AlreadyRunning(ident));
    }

    info!(
        "Acquired composite-manager selection (owner window 0x{:x})",
        window
    );
    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_names_for_single_digit_screens() {
        for screen in 0..10 {
            assert_eq!(
                selection_atom_name(screen),
                format!("_NET_WM_CM_S{screen}")
            );
        }
        assert_eq!(selection_atom_name(0), "_NET_WM_CM_S0");
        assert_eq!(selection_atom_name(9), "_NET_WM_CM_S9");
    }

    #[test]
    fn atom_names_beyond_two_digits() {
        // No fixed-buffer truncation in this implementation
        assert_eq!(selection_atom_name(42), "_NET_WM_CM_S42");
        assert_eq!(selection_atom_name(100), "_NET_WM_CM_S100");
    }

    #[test]
    fn first_string_of_text_property() {
        assert_eq!(first_text_string(b"picom"), Some("picom".into()));
        assert_eq!(first_text_string(b"picom\0"), Some("picom".into()));
        assert_eq!(first_text_string(b"first\0second\0"), Some("first".into()));
        assert_eq!(first_text_string(b""), None);
        assert_eq!(first_text_string(b"\0trailing"), None);
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let title = first_text_string(b"comp\xffmgr").unwrap();
        assert_eq!(title, "comp\u{fffd}mgr");
    }
}
