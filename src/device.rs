//! Device discovery and pairing
//!
//! The Naga exposes several HID interfaces. The twelve numbered side buttons
//! arrive on a keyboard-like interface as key codes 2..=13 (KEY_1..KEY_EQUAL)
//! and the two extra thumb buttons on the mouse interface as BTN_SIDE /
//! BTN_EXTRA. Discovery walks `/dev/input/by-id`, picks the keyboard
//! interface by name suffix plus a capability probe, and correlates the
//! mouse sibling by name prefix.

use anyhow::{Context, Result};
use evdev::{Device, Key};
use std::fs;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const NUM_SIDE_BUTTONS: usize = 12;
pub const NUM_EXTRA_BUTTONS: usize = 2;
pub const NUM_BUTTONS: usize = NUM_SIDE_BUTTONS + NUM_EXTRA_BUTTONS;

/// Key codes carrying the twelve side buttons on the keyboard interface.
pub const SIDE_KEY_CODE_MIN: u16 = 2;
pub const SIDE_KEY_CODE_MAX: u16 = 13;

/// BTN_SIDE and BTN_EXTRA on the mouse interface.
pub const EXTRA_BUTTON_CODES: [u16; NUM_EXTRA_BUTTONS] = [275, 276];
/// Subtracting this from an extra-button code yields indices 12..=13,
/// immediately after the twelve side buttons.
pub const EXTRA_CODE_OFFSET: u16 = 263;

const BY_ID_DIR: &str = "/dev/input/by-id";
const KBD_INTERFACE_SUFFIX: &str = "-if02-event-kbd";
const KBD_SUFFIX: &str = "-event-kbd";
const MOUSE_SUFFIX: &str = "-event-mouse";

/// Device nodes can appear a moment after boot or replug; retry discovery
/// for about five seconds before giving up.
const DISCOVERY_ATTEMPTS: u32 = 50;
const DISCOVERY_PAUSE: Duration = Duration::from_millis(100);

/// Known by-id pairs for models where prefix correlation fails.
const LEGACY_PAIRS: &[(&str, &str)] = &[
    (
        "/dev/input/by-id/usb-Razer_Razer_Naga_2014-if02-event-kbd",
        "/dev/input/by-id/usb-Razer_Razer_Naga_2014-event-mouse",
    ),
    (
        "/dev/input/by-id/usb-Razer_Razer_Naga_Chroma-if02-event-kbd",
        "/dev/input/by-id/usb-Razer_Razer_Naga_Chroma-event-mouse",
    ),
    (
        "/dev/input/by-id/usb-Razer_Razer_Naga_Trinity-if02-event-kbd",
        "/dev/input/by-id/usb-Razer_Razer_Naga_Trinity-event-mouse",
    ),
    (
        "/dev/input/by-id/usb-Razer_Razer_Naga_Hex_V2-if02-event-kbd",
        "/dev/input/by-id/usb-Razer_Razer_Naga_Hex_V2-event-mouse",
    ),
    (
        "/dev/input/by-id/usb-Razer_Razer_Naga_Epic_Chroma-if01-event-kbd",
        "/dev/input/by-id/usb-Razer_Razer_Naga_Epic_Chroma-event-mouse",
    ),
    (
        "/dev/input/by-id/usb-Razer_Razer_Naga_Epic_Chroma_Dock-if01-event-kbd",
        "/dev/input/by-id/usb-Razer_Razer_Naga_Epic_Chroma_Dock-event-mouse",
    ),
    (
        "/dev/input/by-id/usb-Razer_Razer_Naga-if01-event-kbd",
        "/dev/input/by-id/usb-Razer_Razer_Naga-event-mouse",
    ),
];

/// Correlated device paths before opening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePair {
    pub keyboard: PathBuf,
    pub mouse: PathBuf,
}

/// Both halves of the pair, open and ready for the event loop.
pub struct OpenedPair {
    pub keyboard: Device,
    pub mouse: Device,
}

pub fn side_button_index(code: u16) -> usize {
    (code - SIDE_KEY_CODE_MIN) as usize
}

pub fn extra_button_index(code: u16) -> usize {
    (code - EXTRA_CODE_OFFSET) as usize
}

/// Discover and open the device pair: dynamic by-id discovery with retries,
/// then the legacy path list.
pub fn open_pair() -> Result<OpenedPair, crate::error::DaemonError> {
    let mut discovered = None;
    for attempt in 1..=DISCOVERY_ATTEMPTS {
        if let Some(pair) = find_device_pair() {
            debug!("found pair on attempt {attempt}: {pair:?}");
            discovered = Some(pair);
            break;
        }
        std::thread::sleep(DISCOVERY_PAUSE);
    }

    match discovered {
        Some(pair) => match open_both(&pair.keyboard, &pair.mouse) {
            Ok(opened) => {
                info!(
                    "reading from (dynamic): {} and {}",
                    pair.keyboard.display(),
                    pair.mouse.display()
                );
                return Ok(opened);
            }
            Err(e) => warn!("discovered pair failed to open: {e:#}; trying legacy paths"),
        },
        None => warn!("no Naga pair found in {BY_ID_DIR} after {DISCOVERY_ATTEMPTS} attempts"),
    }

    for (kbd, mouse) in LEGACY_PAIRS {
        if let Ok(opened) = open_both(Path::new(kbd), Path::new(mouse)) {
            info!("reading from (legacy): {kbd} and {mouse}");
            return Ok(opened);
        }
    }

    Err(crate::error::DaemonError::NoDevice)
}

fn open_both(keyboard: &Path, mouse: &Path) -> Result<OpenedPair> {
    let keyboard = Device::open(keyboard)
        .with_context(|| format!("failed to open keyboard interface {}", keyboard.display()))?;
    let mouse = Device::open(mouse)
        .with_context(|| format!("failed to open mouse interface {}", mouse.display()))?;
    Ok(OpenedPair { keyboard, mouse })
}

/// One pass over `/dev/input/by-id` looking for a correlated pair.
pub fn find_device_pair() -> Option<DevicePair> {
    let dir = Path::new(BY_ID_DIR);
    let mut naga: Vec<String> = fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| !n.starts_with('.') && is_naga_event_entry(n))
        .collect();
    // readdir order is arbitrary; sort for a stable choice across runs
    naga.sort();

    for name in naga.iter().filter(|n| n.ends_with(KBD_INTERFACE_SUFFIX)) {
        let kbd_path = dir.join(name);
        if !supports_side_keys(&kbd_path) {
            debug!("{name}: missing side-button key range, skipping");
            continue;
        }
        for candidate in mouse_sibling_candidates(name) {
            let mouse_path = dir.join(&candidate);
            if readable(&mouse_path) {
                return Some(DevicePair {
                    keyboard: kbd_path,
                    mouse: mouse_path,
                });
            }
        }
    }

    // Prefix correlation failed: pair the first capability-valid keyboard
    // entry with the first mouse entry, arbitrarily.
    let kbd_any = naga
        .iter()
        .find(|n| n.ends_with(KBD_SUFFIX) && supports_side_keys(&dir.join(n.as_str())));
    let mouse_any = naga.iter().find(|n| n.ends_with(MOUSE_SUFFIX));
    match (kbd_any, mouse_any) {
        (Some(kbd), Some(mouse)) => Some(DevicePair {
            keyboard: dir.join(kbd),
            mouse: dir.join(mouse),
        }),
        _ => None,
    }
}

fn is_naga_event_entry(name: &str) -> bool {
    contains_ci(name, "razer") && contains_ci(name, "naga") && contains_ci(name, "event")
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_ascii_lowercase().contains(needle)
}

/// Sibling names to try for the mouse half, given the keyboard entry name:
/// same prefix with the keyboard suffix swapped, then the same with the
/// interface-number segment stripped.
fn mouse_sibling_candidates(kbd_name: &str) -> Vec<String> {
    let Some(prefix) = kbd_name.strip_suffix(KBD_SUFFIX) else {
        return Vec::new();
    };
    let mut candidates = vec![format!("{prefix}{MOUSE_SUFFIX}")];
    if let Some(pos) = prefix.rfind("-if") {
        let candidate = format!("{}{MOUSE_SUFFIX}", &prefix[..pos]);
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }
    candidates
}

/// Probe whether a keyboard interface reports all twelve side-button key
/// codes. Disambiguates the right sub-interface when the device exposes
/// several with similar names.
fn supports_side_keys(path: &Path) -> bool {
    let dev = match Device::open(path) {
        Ok(dev) => dev,
        Err(e) => {
            debug!("probe open failed for {}: {e}", path.display());
            return false;
        }
    };
    // Probe only; never block on it.
    let _ = set_nonblocking(&dev);
    let Some(keys) = dev.supported_keys() else {
        return false;
    };
    (SIDE_KEY_CODE_MIN..=SIDE_KEY_CODE_MAX).all(|code| keys.contains(Key::new(code)))
}

fn readable(path: &Path) -> bool {
    fs::File::open(path).is_ok()
}

fn set_nonblocking(dev: &Device) -> Result<()> {
    let raw_fd = dev.as_raw_fd();

    // Preserve existing flags; just OR in O_NONBLOCK.
    let current = unsafe { libc::fcntl(raw_fd, libc::F_GETFL) };
    if current < 0 {
        return Err(std::io::Error::last_os_error()).context("fcntl(F_GETFL) failed");
    }

    let rc = unsafe { libc::fcntl(raw_fd, libc::F_SETFL, current | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error()).context("fcntl(F_SETFL, O_NONBLOCK) failed");
    }
    Ok(())
}
