//! Runtime parameters for backtrace recording.
//!
//! Parameters come as one comma-separated string, usually from the
//! [`PARAMS_VAR`] environment variable:
//! ```text
//! b,slots=256,debuginfo=/usr/lib/prog.dbg
//! ```


use core::fmt;
use std::path::PathBuf;

use crate::buffer::BACKTRACE_BUFFER_SIZE;

pub const PARAMS_VAR: &str = "STASHTRACE_PARAMS";

/// Largest accepted `slots=` value.
pub const MAX_SLOTS_LIMIT: usize = 1 << 16;

/// The parameter string is invalid.
#[derive(Debug, PartialEq)]
pub struct Error(String);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Record backtraces from startup on.
    pub record_backtraces: bool,
    pub debug_info_path: Option<PathBuf>,
    /// Maximum number of slots in an exception backtrace.
    pub max_slots: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            record_backtraces: false,
            debug_info_path: None,
            max_slots: BACKTRACE_BUFFER_SIZE,
        }
    }
}

impl Config {
    pub fn parse(params: &str) -> Result<Self, Error> {
        let mut config = Config::default();
        for param in params.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = match param.split_once('=') {
                Some((key, value)) => (key.trim(), Some(value.trim())),
                None => (param, None),
            };
            match (key, value) {
                ("b", None | Some("1")) => config.record_backtraces = true,
                ("b", Some("0")) => config.record_backtraces = false,
                ("b", Some(other)) => {
                    return Err(Error(format!("b expects 0 or 1, got {other:?}")));
                }
                ("debuginfo", Some(path)) if !path.is_empty() => {
                    config.debug_info_path = Some(PathBuf::from(path));
                }
                ("slots", Some(n)) => {
                    let n: usize = n
                        .parse()
                        .map_err(|e| Error(format!("invalid slots {n:?}: {e}")))?;
                    config.max_slots = n.clamp(1, MAX_SLOTS_LIMIT);
                }
                ("debuginfo" | "slots", _) => {
                    return Err(Error(format!("{key} needs a value")));
                }
                _ => debug!(param, "ignoring unknown parameter"),
            }
        }
        Ok(config)
    }

    /// Reads [`PARAMS_VAR`]. A missing variable gives the defaults; a broken
    /// one is logged and gives the defaults too.
    pub fn from_env() -> Self {
        let Some(params) = std::env::var_os(PARAMS_VAR) else {
            return Config::default();
        };
        let Some(params) = params.to_str() else {
            warn!("{PARAMS_VAR} is not valid unicode, ignoring it");
            return Config::default();
        };
        Config::parse(params).unwrap_or_else(|err| {
            warn!("ignoring {PARAMS_VAR}: {err}");
            Config::default()
        })
    }
}
