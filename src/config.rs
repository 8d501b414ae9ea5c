//! Mapping file loading
//!
//! Parses the line-oriented `~/.naga/<file>` mapping format into a fixed
//! per-button action table. Each meaningful line has the shape
//! `index-action=argument`, with a 1-based button index on the left.
//!
//! Malformed lines (bad index, missing separators) are skipped so a typo in
//! one binding does not take the whole daemon down; an unknown action keyword
//! is a hard error because it usually means the file is for a different
//! version of the format.

use crate::device::NUM_BUTTONS;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot open mapping file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unsupported action '{keyword}' on line {line}, check mapping syntax")]
    UnknownAction { keyword: String, line: usize },
}

/// What a configured binding does on a button transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// `chmap` - reserved for layer switching, currently a no-op
    SetLayer,
    /// `key` - inject a key, with autorepeat while held
    KeyPress,
    /// `run` - detached command on press
    RunDetached,
    /// `run2` - detached command on both press and release
    RunDetachedAlways,
    /// `click` - pointer button click
    Click,
    /// `workspace_r` - relative workspace switch
    SwitchWorkspaceRelative,
    /// `workspace` - absolute workspace switch
    SwitchWorkspaceAbsolute,
    /// `position` - absolute pointer move
    MoveCursor,
    /// `delay` - reserved, currently a no-op
    Delay,
    /// `media` - media key injection
    MediaKey,
    /// `toggle` - alternate key-down / key-up on successive presses
    Toggle,
}

impl ActionKind {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "chmap" => Some(ActionKind::SetLayer),
            "key" => Some(ActionKind::KeyPress),
            "run" => Some(ActionKind::RunDetached),
            "run2" => Some(ActionKind::RunDetachedAlways),
            "click" => Some(ActionKind::Click),
            "workspace_r" => Some(ActionKind::SwitchWorkspaceRelative),
            "workspace" => Some(ActionKind::SwitchWorkspaceAbsolute),
            "position" => Some(ActionKind::MoveCursor),
            "delay" => Some(ActionKind::Delay),
            "media" => Some(ActionKind::MediaKey),
            "toggle" => Some(ActionKind::Toggle),
            _ => None,
        }
    }
}

/// One configured binding: kind, raw argument, and the toggle flip-flop.
#[derive(Debug, Clone)]
pub struct Action {
    pub kind: ActionKind,
    pub arg: String,
    /// Toggle only: true once the down half has been emitted.
    pub toggle_down: bool,
}

/// Button index -> ordered action list, rebuilt wholesale on every load.
#[derive(Debug)]
pub struct MappingTable {
    buttons: [Vec<Action>; NUM_BUTTONS],
}

impl MappingTable {
    /// Load and parse the mapping file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse(&text)?;
        info!(
            "loaded {} binding(s) from {}",
            table.buttons.iter().map(Vec::len).sum::<usize>(),
            path.display()
        );
        Ok(table)
    }

    /// Parse mapping text into a fresh table.
    pub(crate) fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut buttons: [Vec<Action>; NUM_BUTTONS] = std::array::from_fn(|_| Vec::new());

        for (line_no, raw) in text.lines().enumerate() {
            let line_no = line_no + 1;
            if raw.is_empty() || raw.starts_with('#') {
                continue;
            }

            // Left of the first '=' names the button and action; everything
            // after it is the raw argument, spaces preserved.
            let Some((lhs, arg)) = raw.split_once('=') else {
                continue;
            };
            let lhs: String = lhs.chars().filter(|c| *c != ' ').collect();
            if lhs.is_empty() || lhs.starts_with('#') {
                continue;
            }

            let Some((index_token, keyword)) = lhs.split_once('-') else {
                continue;
            };

            // 1-based in the file, 0-based internally.
            let index = match index_token.parse::<usize>() {
                Ok(n) if (1..=NUM_BUTTONS).contains(&n) => n - 1,
                _ => {
                    debug!("skipping line {line_no}: bad button index '{index_token}'");
                    continue;
                }
            };

            let Some(kind) = ActionKind::from_keyword(keyword) else {
                return Err(ConfigError::UnknownAction {
                    keyword: keyword.to_string(),
                    line: line_no,
                });
            };

            let arg = if kind == ActionKind::MoveCursor {
                // Coordinate list: commas become spaces for the injector.
                arg.replace(',', " ")
            } else {
                arg.to_string()
            };

            debug!("button {}: {:?} '{}'", index + 1, kind, arg);
            buttons[index].push(Action {
                kind,
                arg,
                toggle_down: false,
            });
        }

        Ok(Self { buttons })
    }

    pub fn actions(&self, button: usize) -> &[Action] {
        &self.buttons[button]
    }

    pub fn actions_mut(&mut self, button: usize) -> &mut [Action] {
        &mut self.buttons[button]
    }
}

/// Resolve `~/.naga/<filename>`, matching the original daemon's layout.
pub fn mapping_path(filename: &str) -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/"))
        .join(".naga")
        .join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_key_line() {
        let table = MappingTable::parse("3-key=KEY_A").unwrap();
        let actions = table.actions(2);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::KeyPress);
        assert_eq!(actions[0].arg, "KEY_A");
        assert!(!actions[0].toggle_down);
    }

    #[test]
    fn test_position_commas_become_spaces() {
        let table = MappingTable::parse("5-position=10,20").unwrap();
        let actions = table.actions(4);
        assert_eq!(actions[0].kind, ActionKind::MoveCursor);
        assert_eq!(actions[0].arg, "10 20");
    }

    #[test]
    fn test_unknown_keyword_fails_whole_load() {
        let err = MappingTable::parse("1-key=KEY_A\n2-bogus=whatever").unwrap_err();
        match err {
            ConfigError::UnknownAction { keyword, line } => {
                assert_eq!(keyword, "bogus");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_comments_blanks_and_malformed_lines_skipped() {
        let text = "\
# header comment

no-equals-here
-key=KEY_A
0-key=KEY_A
15-key=KEY_A
notanumber-key=KEY_A
12-key=KEY_B
";
        let table = MappingTable::parse(text).unwrap();
        let total: usize = (0..NUM_BUTTONS).map(|i| table.actions(i).len()).sum();
        assert_eq!(total, 1);
        assert_eq!(table.actions(11)[0].arg, "KEY_B");
    }

    #[test]
    fn test_spaces_stripped_left_of_equals_only() {
        let table = MappingTable::parse(" 4 - run =notify-send hello world").unwrap();
        let actions = table.actions(3);
        assert_eq!(actions[0].kind, ActionKind::RunDetached);
        assert_eq!(actions[0].arg, "notify-send hello world");
    }

    #[test]
    fn test_multiple_actions_keep_file_order() {
        let table = MappingTable::parse("1-key=KEY_A\n1-run=echo hi\n1-toggle=KEY_B").unwrap();
        let kinds: Vec<ActionKind> = table.actions(0).iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![ActionKind::KeyPress, ActionKind::RunDetached, ActionKind::Toggle]
        );
    }

    #[test]
    fn test_load_from_file_and_reload_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping_01.txt");

        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "1-key=KEY_A").unwrap();
        drop(f);
        let table = MappingTable::load(&path).unwrap();
        assert_eq!(table.actions(0).len(), 1);

        // A second load builds a fresh table, no merge with the first.
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "2-click=0xC0").unwrap();
        drop(f);
        let table = MappingTable::load(&path).unwrap();
        assert!(table.actions(0).is_empty());
        assert_eq!(table.actions(1)[0].kind, ActionKind::Click);
    }

    #[test]
    fn test_load_missing_file_is_open_error() {
        let err = MappingTable::load(Path::new("/nonexistent/.naga/mapping_01.txt")).unwrap_err();
        assert!(matches!(err, ConfigError::Open { .. }));
    }

    #[test]
    fn test_mapping_path_layout() {
        let path = mapping_path("mapping_01.txt");
        assert!(path.ends_with(".naga/mapping_01.txt"));
    }
}
