//! Test helpers for running real shell commands from executor tests.

/// A command line that copies `from` to `to`.
#[cfg(unix)]
pub fn copy_cmd(from: &str, to: &str) -> String {
  format!("cp '{from}' '{to}'")
}

#[cfg(windows)]
pub fn copy_cmd(from: &str, to: &str) -> String {
  format!("copy /Y \"{from}\" \"{to}\"")
}

/// A command line that exits with the given status.
pub fn exit_cmd(code: i32) -> String {
  format!("exit {code}")
}

/// A command line that writes to stdout and stderr.
#[cfg(unix)]
pub fn chatty_cmd(out: &str, err: &str) -> String {
  format!("echo {out}; echo {err} 1>&2")
}

#[cfg(windows)]
pub fn chatty_cmd(out: &str, err: &str) -> String {
  format!("echo {out}& echo {err} 1>&2")
}

/// A command line that sleeps long enough to be cancelled.
#[cfg(unix)]
pub fn slow_cmd() -> String {
  "sleep 30".to_string()
}

#[cfg(windows)]
pub fn slow_cmd() -> String {
  "ping -n 30 127.0.0.1 > NUL".to_string()
}
