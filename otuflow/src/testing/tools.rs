//! Stand-in external tools for exercising command-driven stages.

use std::io;
use std::path::{Path, PathBuf};

/// Writes an executable `sh` script named `name` into `dir`.
///
/// # Errors
///
/// Returns an error if the file cannot be written or made executable.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> io::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

/// Writes `<config_dir>/<name>.config` pointing the command at `program` in
/// `program_dir`, followed by `extra` directive lines.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_tool_config(
    config_dir: &Path,
    name: &str,
    program_dir: &Path,
    program: &str,
    extra: &[&str],
) -> io::Result<PathBuf> {
    let mut text = format!("CMD {program}\nENV {}\n", program_dir.display());
    for line in extra {
        text.push_str(line);
        text.push('\n');
    }
    let path = config_dir.join(format!("{name}.config"));
    std::fs::write(&path, text)?;
    Ok(path)
}
