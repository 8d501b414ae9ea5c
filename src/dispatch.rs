//! Debounce filtering and per-button action dispatch
//!
//! Given a button index and a press/release transition, walks that button's
//! configured action list in order and submits the matching work to the
//! executor. Holds the only runtime-mutable state: per-button debounce
//! timestamps, toggle flip-flops, and the autorepeat flags shared with the
//! detached repeat threads.

use crate::config::{ActionKind, MappingTable};
use crate::device::NUM_BUTTONS;
use crate::exec::ActionExecutor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Presses closer together than this on the same button are treated as
/// switch bounce and discarded.
pub const DEBOUNCE_INTERVAL: Duration = Duration::from_millis(120);

/// Delay before the first autorepeat injection of a held `key` binding.
const REPEAT_INITIAL_DELAY: Duration = Duration::from_millis(250);
/// Interval between autorepeat injections.
const REPEAT_INTERVAL: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Press,
    Release,
}

impl Transition {
    /// Map a raw event value. Anything other than 0/1 (e.g. kernel
    /// autorepeat, value 2) carries no meaning here and is dropped.
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            1 => Some(Transition::Press),
            0 => Some(Transition::Release),
            _ => None,
        }
    }
}

pub struct Dispatcher {
    table: MappingTable,
    executor: Arc<dyn ActionExecutor>,
    last_press: [Option<Instant>; NUM_BUTTONS],
    repeat_active: [Arc<AtomicBool>; NUM_BUTTONS],
}

impl Dispatcher {
    pub fn new(table: MappingTable, executor: Arc<dyn ActionExecutor>) -> Self {
        Self {
            table,
            executor,
            last_press: [None; NUM_BUTTONS],
            repeat_active: std::array::from_fn(|_| Arc::new(AtomicBool::new(false))),
        }
    }

    /// Run every action configured for `button` on this transition.
    /// Out-of-range indices are a no-op.
    pub fn dispatch(&mut self, button: usize, transition: Transition) {
        if button >= NUM_BUTTONS {
            return;
        }
        if transition == Transition::Press && !self.accept_press(button) {
            debug!("button {button}: press debounced");
            return;
        }
        debug!("button {button}: {transition:?}");

        let executor = Arc::clone(&self.executor);
        let repeat = Arc::clone(&self.repeat_active[button]);

        for action in self.table.actions_mut(button) {
            match (action.kind, transition) {
                (ActionKind::KeyPress, Transition::Press) => {
                    repeat.store(true, Ordering::Relaxed);
                    executor.tap_key(&action.arg);
                    spawn_repeat(Arc::clone(&executor), Arc::clone(&repeat), action.arg.clone());
                }
                (ActionKind::KeyPress, Transition::Release) => {
                    repeat.store(false, Ordering::Relaxed);
                }

                (ActionKind::RunDetached, Transition::Press) => {
                    executor.run_detached(&action.arg);
                }
                // run2 fires on both transitions
                (ActionKind::RunDetachedAlways, _) => {
                    executor.run_detached(&action.arg);
                }

                (ActionKind::Click, Transition::Press) => {
                    executor.click(&action.arg);
                }
                (ActionKind::MoveCursor, Transition::Press) => {
                    executor.move_pointer(&action.arg);
                }
                (ActionKind::SwitchWorkspaceRelative, Transition::Press) => {
                    executor.switch_workspace_relative(&action.arg);
                }
                (ActionKind::SwitchWorkspaceAbsolute, Transition::Press) => {
                    executor.switch_workspace_absolute(&action.arg);
                }
                (ActionKind::MediaKey, Transition::Press) => {
                    executor.tap_key(&action.arg);
                }

                (ActionKind::Toggle, Transition::Press) => {
                    if action.toggle_down {
                        executor.key_up(&action.arg);
                        action.toggle_down = false;
                    } else {
                        executor.key_down(&action.arg);
                        action.toggle_down = true;
                    }
                }

                // chmap and delay are reserved; everything else is
                // press-only and ignores the release.
                (ActionKind::SetLayer | ActionKind::Delay, _) => {}
                (_, Transition::Release) => {}
            }
        }
    }

    /// Debounce gate: presses only. Accepting a press stamps the clock;
    /// a discarded press leaves the stamp untouched.
    fn accept_press(&mut self, button: usize) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_press[button] {
            if now.duration_since(last) < DEBOUNCE_INTERVAL {
                return false;
            }
        }
        self.last_press[button] = Some(now);
        true
    }
}

/// Detached autorepeat task for a held `key` binding. Cancellation is
/// cooperative through the shared flag; a stale task from a rapid
/// press/release cycle sees the flag cleared on its next check and exits.
/// No handle is retained or joined.
fn spawn_repeat(executor: Arc<dyn ActionExecutor>, active: Arc<AtomicBool>, key: String) {
    thread::spawn(move || {
        thread::sleep(REPEAT_INITIAL_DELAY);
        while active.load(Ordering::Relaxed) {
            executor.tap_key(&key);
            thread::sleep(REPEAT_INTERVAL);
        }
    });
}
