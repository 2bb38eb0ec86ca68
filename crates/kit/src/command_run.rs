use std::process::{Command, Output};

use color_eyre::eyre::{eyre, Result};

// Only the trailing bytes of stderr are kept, to avoid pathological
// error messages from chatty subprocesses.
const MAX_STDERR_BYTES: usize = 1024;

/// Helpers intended for [`std::process::Command`].
pub trait CommandRun {
    /// Execute the child process. Returns an error carrying the tail of its
    /// stderr if it exits abnormally.
    fn run(&mut self) -> Result<()>;

    /// Execute the child process, parsing its stdout as JSON.
    fn run_and_parse_json<T: serde::de::DeserializeOwned>(&mut self) -> Result<T>;
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(MAX_STDERR_BYTES);
    String::from_utf8_lossy(&stderr[start..]).into_owned()
}

fn run_captured(cmd: &mut Command) -> Result<Output> {
    tracing::trace!("exec: {cmd:?}");
    let program = cmd.get_program().to_string_lossy().into_owned();
    let output = cmd
        .output()
        .map_err(|e| eyre!("Failed to execute {program}: {e}"))?;
    if !output.status.success() {
        return Err(eyre!(
            "{program} failed ({}): {}",
            output.status,
            stderr_tail(&output.stderr).trim_end()
        ));
    }
    Ok(output)
}

impl CommandRun for Command {
    /// Synchronously execute the child, and return an error if the child
    /// exited unsuccessfully.
    fn run(&mut self) -> Result<()> {
        run_captured(self).map(|_| ())
    }

    /// Synchronously execute the child, and parse its stdout as JSON.
    fn run_and_parse_json<T: serde::de::DeserializeOwned>(&mut self) -> Result<T> {
        let output = run_captured(self)?;
        serde_json::from_slice(&output.stdout).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_tail_truncates_to_trailing_bytes() {
        let short = b"qm: vm 100 already exists";
        assert_eq!(stderr_tail(short), "qm: vm 100 already exists");

        let long = vec![b'x'; MAX_STDERR_BYTES + 100];
        let tail = stderr_tail(&long);
        assert_eq!(tail.len(), MAX_STDERR_BYTES);
    }

    #[test]
    fn test_stderr_tail_lossy_on_split_utf8() {
        // A multi-byte character cut at the truncation boundary must not panic
        let mut buf = vec![b'x'];
        buf.extend("é".as_bytes());
        buf.extend(vec![b'x'; MAX_STDERR_BYTES - 1]);
        let tail = stderr_tail(&buf);
        assert!(tail.starts_with('\u{FFFD}'));
        assert_eq!(tail.chars().count(), MAX_STDERR_BYTES);
    }
}
