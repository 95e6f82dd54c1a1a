//! Opportunistic shellouts to well-known local CLIs (`pdftotext`, `node`).
//!
//! Tools are used when present. Every run is bounded by a timeout and an output cap, and the
//! child is always reaped, including on timeout.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Resolve `bin` on `PATH`. Paths with a separator are checked as given.
pub fn which(bin: &str) -> Option<PathBuf> {
    if bin.contains(std::path::MAIN_SEPARATOR) {
        let p = Path::new(bin);
        return p.is_file().then(|| p.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(bin))
        .find(|cand| cand.is_file())
}

pub fn has(bin: &str) -> bool {
    which(bin).is_some()
}

/// Run a command and capture stdout (bounded) with a coarse timeout.
///
/// Stdout is drained on a separate thread so a chatty child cannot stall on a full pipe.
pub fn run_stdout_bounded(
    mut cmd: Command,
    timeout: Duration,
    max_stdout_bytes: usize,
) -> Result<Vec<u8>, &'static str> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            "shellout_tool_not_found"
        } else {
            "shellout_spawn_failed"
        }
    })?;

    let reader = child.stdout.take().map(|mut s| {
        std::thread::spawn(move || {
            use std::io::Read;
            let mut out = Vec::new();
            (&mut s).take(max_stdout_bytes as u64).read_to_end(&mut out)?;
            // Keep draining past the cap so the child exits normally instead of on SIGPIPE.
            std::io::copy(&mut s, &mut std::io::sink())?;
            Ok::<_, std::io::Error>(out)
        })
    });

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err("shellout_wait_failed");
            }
        }
        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err("shellout_timeout");
        }
        std::thread::sleep(Duration::from_millis(25));
    };
    if !status.success() {
        return Err("shellout_nonzero_exit");
    }

    match reader {
        Some(h) => h
            .join()
            .map_err(|_| "shellout_read_failed")?
            .map_err(|_| "shellout_read_failed"),
        None => Ok(Vec::new()),
    }
}

pub fn write_temp_file(
    bytes: &[u8],
    suffix: &str,
) -> Result<tempfile::NamedTempFile, &'static str> {
    let mut tmp = tempfile::Builder::new()
        .prefix("ifinder-")
        .suffix(suffix)
        .tempfile()
        .map_err(|_| "shellout_tempfile_failed")?;
    use std::io::Write;
    tmp.write_all(bytes)
        .map_err(|_| "shellout_tempfile_write_failed")?;
    tmp.flush().map_err(|_| "shellout_tempfile_write_failed")?;
    Ok(tmp)
}

/// Text of a PDF via poppler's `pdftotext`, pages separated by form feeds.
pub fn pdftotext(
    bytes: &[u8],
    timeout: Duration,
    max_chars: usize,
) -> Result<String, &'static str> {
    if !has("pdftotext") {
        return Err("shellout_tool_not_found");
    }
    let tmp = write_temp_file(bytes, ".pdf")?;
    let mut cmd = Command::new("pdftotext");
    cmd.arg("-layout").arg(tmp.path()).arg("-");
    let out = run_stdout_bounded(cmd, timeout, max_chars.saturating_mul(4))?;
    Ok(String::from_utf8_lossy(&out).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn which_finds_sh_and_rejects_missing_tools() {
        assert!(has("sh"));
        assert!(!has("ifinder-definitely-not-installed"));
        assert!(which("/nonexistent/bin/node").is_none());
    }

    #[test]
    fn bounded_run_captures_large_output_without_stalling() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("yes abcdefgh | head -c 200000");
        let out = run_stdout_bounded(cmd, Duration::from_secs(5), 1_000).unwrap();
        assert_eq!(out.len(), 1_000);
    }

    #[test]
    fn bounded_run_times_out() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("sleep 5");
        let t0 = Instant::now();
        let err = run_stdout_bounded(cmd, Duration::from_millis(100), 100).unwrap_err();
        assert_eq!(err, "shellout_timeout");
        assert!(t0.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn bounded_run_reports_missing_tool_and_nonzero_exit() {
        let err = run_stdout_bounded(
            Command::new("ifinder-definitely-not-installed"),
            Duration::from_secs(1),
            10,
        )
        .unwrap_err();
        assert_eq!(err, "shellout_tool_not_found");

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("exit 3");
        assert_eq!(
            run_stdout_bounded(cmd, Duration::from_secs(2), 10).unwrap_err(),
            "shellout_nonzero_exit"
        );
    }
}
