//! Hardware-dependent tests that require a real Razer Naga
//!
//! These tests are ignored by default and can be run with:
//! `cargo test -- --ignored`
//!
//! They require:
//! - A connected Razer Naga (any model with the 12-button side panel)
//! - Read access to /dev/input (input group membership or root)

use std::fs;
use std::path::Path;

/// Test that the by-id directory exposes a Naga keyboard interface
#[test]
#[ignore]
fn test_real_by_id_entries() {
    let entries: Vec<String> = fs::read_dir("/dev/input/by-id")
        .expect("Can't read /dev/input/by-id")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| {
            let lower = n.to_ascii_lowercase();
            lower.contains("razer") && lower.contains("naga")
        })
        .collect();

    println!("Found {} Naga by-id entries: {entries:?}", entries.len());
    assert!(
        entries.iter().any(|n| n.ends_with("-event-kbd")),
        "No Naga keyboard interface found. Connect a Naga to run this test."
    );
    assert!(
        entries.iter().any(|n| n.ends_with("-event-mouse")),
        "No Naga mouse interface found."
    );
}

/// Test that the keyboard interface reports the twelve side-button codes
#[test]
#[ignore]
fn test_real_side_button_capabilities() {
    let kbd = fs::read_dir("/dev/input/by-id")
        .expect("Can't read /dev/input/by-id")
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| {
            let name = p.file_name().unwrap_or_default().to_string_lossy();
            let lower = name.to_ascii_lowercase();
            lower.contains("naga") && name.ends_with("-if02-event-kbd")
        })
        .expect("No Naga -if02-event-kbd entry found");

    let dev = evdev::Device::open(&kbd).expect("Can't open keyboard interface");
    let keys = dev.supported_keys().expect("No key capabilities reported");

    for code in 2u16..=13 {
        assert!(
            keys.contains(evdev::Key::new(code)),
            "key code {code} missing from {kbd:?}"
        );
    }
}

/// Test that ydotool is available for injection
#[test]
#[ignore]
fn test_real_injector_present() {
    let found = std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| Path::new(&dir).join("ydotool").exists())
        })
        .unwrap_or(false);

    assert!(found, "ydotool not found on PATH; key injection will be a no-op");
}
