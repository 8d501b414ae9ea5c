//! External action invocation
//!
//! The dispatch engine never launches processes itself; it submits work to an
//! [`ActionExecutor`]. The production implementation shells out to `ydotool`
//! for key/pointer injection and to `setsid` for detached commands. Every
//! invocation is fire-and-forget: a missing or broken injector must never
//! stall the event loop.

use std::process::{Command, Stdio};
use tracing::{debug, warn};

pub trait ActionExecutor: Send + Sync {
    /// Inject a single key tap (also used for media keys and autorepeat).
    fn tap_key(&self, key: &str);
    /// Inject the down half of a key, leaving it held.
    fn key_down(&self, key: &str);
    /// Inject the up half of a previously held key.
    fn key_up(&self, key: &str);
    /// Perform a pointer button click.
    fn click(&self, button: &str);
    /// Move the pointer to absolute coordinates ("X Y").
    fn move_pointer(&self, coords: &str);
    /// Switch workspace relative to the current one.
    fn switch_workspace_relative(&self, arg: &str);
    /// Switch to an absolute workspace.
    fn switch_workspace_absolute(&self, arg: &str);
    /// Launch an arbitrary command line detached from the daemon.
    fn run_detached(&self, command: &str);
}

/// `ydotool`-backed executor.
pub struct ShellExecutor;

impl ShellExecutor {
    fn inject(&self, subcommand: &str, arg: &str) {
        let result = Command::new("ydotool")
            .arg(subcommand)
            .args(arg.split_whitespace())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status();
        if let Err(e) = result {
            debug!("ydotool {subcommand} {arg}: {e}");
        }
    }
}

impl ActionExecutor for ShellExecutor {
    fn tap_key(&self, key: &str) {
        self.inject("key", key);
    }

    fn key_down(&self, key: &str) {
        self.inject("key", &format!("{key}:1"));
    }

    fn key_up(&self, key: &str) {
        self.inject("key", &format!("{key}:0"));
    }

    fn click(&self, button: &str) {
        self.inject("click", button);
    }

    fn move_pointer(&self, coords: &str) {
        self.inject("mousemove", coords);
    }

    fn switch_workspace_relative(&self, arg: &str) {
        // No compositor-neutral backend exists for this yet.
        debug!("workspace_r {arg}: no workspace backend configured, ignoring");
    }

    fn switch_workspace_absolute(&self, arg: &str) {
        debug!("workspace {arg}: no workspace backend configured, ignoring");
    }

    fn run_detached(&self, command: &str) {
        // setsid + '&' inside a short-lived shell: the shell reaps the fork
        // and the command survives the daemon in its own session.
        let result = Command::new("sh")
            .arg("-c")
            .arg(format!("setsid {command} &"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = result {
            warn!("failed to launch '{command}': {e}");
        }
    }
}
