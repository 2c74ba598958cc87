use glob::glob;
use std::fs;
use std::path::Path;

/// Whether any process has `port_name` open, judged from `/proc/*/fd`.
pub fn is_port_open(port_name: &str) -> bool {
    let wanted =
        fs::canonicalize(port_name).unwrap_or_else(|_| Path::new(port_name).to_path_buf());

    let entries = match glob("/proc/[0-9]*/fd/*") {
        Ok(entries) => entries,
        Err(_) => return false,
    };

    entries
        .filter_map(|p| p.ok())
        .filter_map(|path| fs::read_link(path).ok())
        .any(|link| link == wanted)
}
