//! Process-level error taxonomy
//!
//! Each fatal failure class carries its own exit code so a supervisor can
//! tell "no device" apart from "bad config" and "broken device I/O".

use crate::config::ConfigError;
use std::io;
use thiserror::Error;

pub const EXIT_NO_DEVICE: i32 = 1;
pub const EXIT_LOOP_IO: i32 = 2;
pub const EXIT_CONFIG: i32 = 3;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("no Naga device pair could be opened")]
    NoDevice,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("device I/O failure: {0}")]
    LoopIo(#[from] io::Error),
}

impl DaemonError {
    pub fn exit_code(&self) -> i32 {
        match self {
            DaemonError::NoDevice => EXIT_NO_DEVICE,
            DaemonError::Config(_) => EXIT_CONFIG,
            DaemonError::LoopIo(_) => EXIT_LOOP_IO,
        }
    }
}
