//! Minimal X11 composite manager.
//!
//! Claims the per-screen `_NET_WM_CM_S<n>` selection, redirects all
//! subwindows of the root window into off-screen storage, then idles on
//! the event queue. It never paints anything; it only holds the composite
//! manager role so the server keeps window contents off-screen.

mod composite;
mod errors;
mod selection;

use std::process::ExitCode;

use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use x11rb::connection::Connection;
use x11rb::protocol::Event;

use composite::CompositeExt;
use errors::{Error, format_protocol_error, is_redirect_collision};

/// Display name from argv: exactly one positional argument selects the
/// display, any other argument count falls back to `DISPLAY`.
fn display_arg(args: &[String]) -> Option<&str> {
    if args.len() == 2 {
        Some(args[1].as_str())
    } else {
        None
    }
}

fn run() -> Result<(), Error> {
    let args: Vec<String> = std::env::args().collect();

    let (conn, screen_num) = x11rb::connect(display_arg(&args)).map_err(Error::OpenDisplay)?;
    let root = conn.setup().roots[screen_num].root;
    info!(
        "Connected to X server (screen {}, root 0x{:x})",
        screen_num, root
    );

    let composite = CompositeExt::query(&conn)?;

    let atom = selection::intern_selection_atom(&conn, screen_num)?;
    if let Some(owner) = selection::current_owner(&conn, atom)? {
        return Err(Error::AlreadyRunning(Some(selection::identify_owner(
            &conn, owner,
        ))));
    }

    let manager_window = selection::claim(&conn, screen_num, atom)?;
    composite.redirect_subwindows(&conn, root)?;
    info!(
        "Registered as composite manager for screen {} (window 0x{:x})",
        screen_num, manager_window
    );

    // Idle forever. Events are discarded; the only exits are a deferred
    // redirect collision or losing the connection.
    loop {
        conn.flush()?;
        match conn.wait_for_event()? {
            Event::Error(err) => {
                if is_redirect_collision(err.major_opcode, err.minor_opcode, composite.major_opcode)
                {
                    return Err(Error::AlreadyRunning(None));
                }
                eprintln!(
                    "{}",
                    format_protocol_error(
                        err.error_code,
                        err.error_kind,
                        err.major_opcode,
                        err.minor_opcode,
                        err.sequence,
                    )
                );
            }
            event => debug!("Ignoring event: {:?}", event),
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "xcompmgr=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::display_arg;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn one_positional_argument_is_the_display() {
        assert_eq!(display_arg(&args(&["xcompmgr", ":1"])), Some(":1"));
    }

    #[test]
    fn other_argument_counts_use_the_default_display() {
        assert_eq!(display_arg(&args(&["xcompmgr"])), None);
        assert_eq!(display_arg(&args(&["xcompmgr", ":1", "extra"])), None);
    }
}
