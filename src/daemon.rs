//! The blocking dual-source event loop
//!
//! One thread blocks in `poll(2)` on both device fds. A wake on the keyboard
//! interface carries a side-button transition; a wake on the mouse interface
//! carries an extra-button press. Decoded transitions feed the dispatcher.
//!
//! The keyboard interface is grabbed exclusively while the loop runs so the
//! firmware's number-row keystrokes do not also reach the desktop. The
//! grabbed device lives in a shared cell: the signal handler takes it out to
//! release the grab on its way to exiting, and `Drop` covers every other
//! exit path.

use crate::device::{self, EXTRA_BUTTON_CODES, OpenedPair, SIDE_KEY_CODE_MAX, SIDE_KEY_CODE_MIN};
use crate::dispatch::{Dispatcher, Transition};
use crate::error::DaemonError;
use evdev::{Device, EventType, InputEvent};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// Holds the grabbed keyboard device; shared with the signal handler.
pub type GrabCell = Arc<Mutex<Option<Device>>>;

/// Lock the cell even if a panicking thread poisoned it; the device must
/// still be reachable for ungrab.
pub fn lock_cell(cell: &GrabCell) -> MutexGuard<'_, Option<Device>> {
    cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum Source {
    Keyboard,
    Mouse,
}

pub struct Daemon {
    keyboard: GrabCell,
    keyboard_fd: RawFd,
    mouse: Device,
    dispatcher: Dispatcher,
}

impl Daemon {
    pub fn new(pair: OpenedPair, dispatcher: Dispatcher) -> Self {
        let keyboard_fd = pair.keyboard.as_raw_fd();
        Self {
            keyboard: Arc::new(Mutex::new(Some(pair.keyboard))),
            keyboard_fd,
            mouse: pair.mouse,
            dispatcher,
        }
    }

    /// Cell for the signal handler to ungrab and close the keyboard half.
    pub fn grab_cell(&self) -> GrabCell {
        Arc::clone(&self.keyboard)
    }

    /// Run until a fatal I/O error. Normal shutdown happens through the
    /// signal handler, which exits the process directly.
    pub fn run(&mut self) -> Result<(), DaemonError> {
        {
            let mut guard = lock_cell(&self.keyboard);
            if let Some(dev) = guard.as_mut() {
                match dev.grab() {
                    Ok(()) => info!("exclusive grab on side-button interface"),
                    Err(e) => warn!("EVIOCGRAB failed ({e}); firmware events will pass through"),
                }
            }
        }

        loop {
            match poll_pair(self.keyboard_fd, self.mouse.as_raw_fd()) {
                Ok(Source::Keyboard) => self.handle_keyboard_wake()?,
                Ok(Source::Mouse) => self.handle_mouse_wake()?,
                // Signal delivery; the handler exits the process if it was
                // a termination request.
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DaemonError::LoopIo(e)),
            }
        }
    }

    fn handle_keyboard_wake(&mut self) -> Result<(), DaemonError> {
        let mut guard = lock_cell(&self.keyboard);
        let Some(dev) = guard.as_mut() else {
            // Signal handler already took the device; process is exiting.
            return Ok(());
        };
        let events: Vec<InputEvent> = dev.fetch_events().map_err(DaemonError::LoopIo)?.collect();
        drop(guard);

        if let Some((button, transition)) = decode_keyboard_batch(&events) {
            self.dispatcher.dispatch(button, transition);
        }
        Ok(())
    }

    fn handle_mouse_wake(&mut self) -> Result<(), DaemonError> {
        let events: Vec<InputEvent> = self
            .mouse
            .fetch_events()
            .map_err(DaemonError::LoopIo)?
            .collect();

        if let Some((button, transition)) = decode_mouse_batch(&events) {
            self.dispatcher.dispatch(button, transition);
        }
        Ok(())
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        if let Some(mut dev) = lock_cell(&self.keyboard).take() {
            let _ = dev.ungrab();
        }
    }
}

/// Block until either source has data. EINTR surfaces as
/// `ErrorKind::Interrupted`; POLLERR/POLLHUP surface as a fatal error.
fn poll_pair(keyboard: RawFd, mouse: RawFd) -> io::Result<Source> {
    let mut fds = [
        libc::pollfd {
            fd: keyboard,
            events: libc::POLLIN,
            revents: 0,
        },
        libc::pollfd {
            fd: mouse,
            events: libc::POLLIN,
            revents: 0,
        },
    ];

    let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    // Keyboard takes priority, matching the original select() handling.
    if fds[0].revents & libc::POLLIN != 0 {
        Ok(Source::Keyboard)
    } else if fds[1].revents & libc::POLLIN != 0 {
        Ok(Source::Mouse)
    } else {
        Err(io::Error::new(
            io::ErrorKind::Other,
            "device poll reported an error state",
        ))
    }
}

/// Decode a keyboard-interface batch. The device frames each transition as
/// MSC_SCAN, then the key record, then SYN_REPORT, so the key event sits at
/// batch slot 1. A batch shorter than two events carries nothing to do.
fn decode_keyboard_batch(events: &[InputEvent]) -> Option<(usize, Transition)> {
    let ev = events.get(1)?;
    if ev.event_type() != EventType::KEY {
        return None;
    }
    if !(SIDE_KEY_CODE_MIN..=SIDE_KEY_CODE_MAX).contains(&ev.code()) {
        return None;
    }
    let transition = Transition::from_value(ev.value())?;
    Some((device::side_button_index(ev.code()), transition))
}

/// Decode a mouse-interface batch: same slot-1 framing, but only the two
/// extra-button codes and only presses. Releases from this source are not
/// forwarded.
fn decode_mouse_batch(events: &[InputEvent]) -> Option<(usize, Transition)> {
    let ev = events.get(1)?;
    if ev.event_type() != EventType::KEY || ev.value() != 1 {
        return None;
    }
    if !EXTRA_BUTTON_CODES.contains(&ev.code()) {
        return None;
    }
    Some((device::extra_button_index(ev.code()), Transition::Press))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MSC_SCAN: u16 = 4;
    const SYN_REPORT: u16 = 0;

    fn kbd_batch(code: u16, value: i32) -> Vec<InputEvent> {
        vec![
            InputEvent::new(EventType::MISC, MSC_SCAN, 0x70027),
            InputEvent::new(EventType::KEY, code, value),
            InputEvent::new(EventType::SYNCHRONIZATION, SYN_REPORT, 0),
        ]
    }

    #[test]
    fn test_keyboard_press_and_release_decode() {
        assert_eq!(
            decode_keyboard_batch(&kbd_batch(2, 1)),
            Some((0, Transition::Press))
        );
        assert_eq!(
            decode_keyboard_batch(&kbd_batch(13, 0)),
            Some((11, Transition::Release))
        );
    }

    #[test]
    fn test_keyboard_autorepeat_value_dropped() {
        assert_eq!(decode_keyboard_batch(&kbd_batch(5, 2)), None);
    }

    #[test]
    fn test_keyboard_codes_outside_side_range_dropped() {
        assert_eq!(decode_keyboard_batch(&kbd_batch(1, 1)), None); // KEY_ESC
        assert_eq!(decode_keyboard_batch(&kbd_batch(14, 1)), None); // KEY_BACKSPACE
        assert_eq!(decode_keyboard_batch(&kbd_batch(30, 1)), None); // KEY_A
    }

    #[test]
    fn test_short_batch_dispatches_nothing() {
        assert_eq!(decode_keyboard_batch(&[]), None);
        let single = vec![InputEvent::new(EventType::KEY, 2, 1)];
        assert_eq!(decode_keyboard_batch(&single), None);
        assert_eq!(decode_mouse_batch(&single), None);
    }

    #[test]
    fn test_non_key_slot_dispatches_nothing() {
        let batch = vec![
            InputEvent::new(EventType::MISC, MSC_SCAN, 0),
            InputEvent::new(EventType::MISC, MSC_SCAN, 0),
            InputEvent::new(EventType::SYNCHRONIZATION, SYN_REPORT, 0),
        ];
        assert_eq!(decode_keyboard_batch(&batch), None);
    }

    #[test]
    fn test_mouse_presses_map_after_side_buttons() {
        assert_eq!(
            decode_mouse_batch(&kbd_batch(275, 1)),
            Some((12, Transition::Press))
        );
        assert_eq!(
            decode_mouse_batch(&kbd_batch(276, 1)),
            Some((13, Transition::Press))
        );
    }

    #[test]
    fn test_mouse_releases_not_forwarded() {
        assert_eq!(decode_mouse_batch(&kbd_batch(275, 0)), None);
    }

    #[test]
    fn test_mouse_other_buttons_dropped() {
        assert_eq!(decode_mouse_batch(&kbd_batch(272, 1)), None); // BTN_LEFT
        assert_eq!(decode_mouse_batch(&kbd_batch(274, 1)), None); // BTN_MIDDLE
    }
}
