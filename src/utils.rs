use std::env;
use std::fs;
use std::io::{self, BufRead};

use prim_core::config::env_flag;

/// True when PRIM_QUIET is set to a true flag or PRIM_LOG=quiet.
pub fn is_quiet_env() -> bool {
    quiet_from(
        env::var("PRIM_QUIET").ok().as_deref(),
        env::var("PRIM_LOG").ok().as_deref(),
    )
}

fn quiet_from(prim_quiet: Option<&str>, prim_log: Option<&str>) -> bool {
    prim_quiet.and_then(env_flag).unwrap_or(false)
        || prim_log.is_some_and(|v| v.trim().eq_ignore_ascii_case("quiet"))
}

/// Lines of `path`, or of stdin when `path` is None or "-".
pub fn read_lines(path: Option<&str>) -> Result<Vec<String>, String> {
    match path {
        None | Some("-") => io::stdin()
            .lock()
            .lines()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("Failed to read stdin: {}", e)),
        Some(p) => fs::read_to_string(p)
            .map(|s| s.lines().map(String::from).collect())
            .map_err(|e| format!("Failed to read {}: {}", p, e)),
    }
}

/// Default tracing filter: CLI warnings only; the core's events stay off
/// unless PRIM_LOG asks for them.
pub fn default_log_filter(quiet: bool) -> String {
    if quiet || is_quiet_env() {
        return "error,prim_core=off".to_string();
    }
    match env::var("PRIM_LOG") {
        Ok(v) if !v.trim().is_empty() => v,
        _ => "warn,prim_core=off".to_string(),
    }
}
