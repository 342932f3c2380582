use anyhow::{anyhow, bail, Context, Result};
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use tracing::debug;
use which::which;

use crate::utils::pipeline_utils::CommandExecutor;

/// Runs command lines through `sh -c`, merging stderr into stdout and
/// forwarding the combined output to `sink` as it is produced.
pub struct ShellExecutor<W: Write> {
    sink: W,
}

impl ShellExecutor<io::Stdout> {
    pub fn stdout() -> Self {
        Self { sink: io::stdout() }
    }
}

impl<W: Write> ShellExecutor<W> {
    #[allow(dead_code)]
    pub fn with_sink(sink: W) -> Self {
        Self { sink }
    }

    #[allow(dead_code)]
    pub fn into_sink(self) -> W {
        self.sink
    }
}

impl<W: Write> CommandExecutor for ShellExecutor<W> {
    fn execute(&mut self, command_line: &str) -> io::Result<i32> {
        // `exec 2>&1` applies to every command of a pipeline, unlike a
        // trailing redirection.
        let script = format!("exec 2>&1\n{}", command_line);
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdout(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("could not capture the output of the child process"))?;

        let mut reader = BufReader::new(stdout);
        let mut segment = Vec::new();
        let mut forwarded: io::Result<()> = Ok(());
        let drained = loop {
            segment.clear();
            match read_segment(&mut reader, &mut segment) {
                Ok(0) => break Ok(()),
                Ok(_) => {
                    // keep reading after a failed write, a child blocked on a
                    // full pipe would never exit
                    if forwarded.is_ok() {
                        forwarded = self
                            .sink
                            .write_all(&segment)
                            .and_then(|_| self.sink.flush());
                    }
                }
                Err(e) => break Err(e),
            }
        };

        // a child still writing after a read error gets EPIPE instead of
        // blocking forever
        drop(reader);
        // always reap the child, even if forwarding its output failed
        let status = child.wait()?;
        drained?;
        forwarded?;
        Ok(exit_code(status))
    }
}

/// Reads up to and including the next `\n` or `\r` into `buf`, so progress
/// lines that redraw themselves are forwarded as soon as they are printed.
/// Returns the number of bytes read, 0 at end of input.
fn read_segment<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<usize> {
    let mut read = 0;
    loop {
        let (done, used) = {
            let available = match reader.fill_buf() {
                Ok(b) => b,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            match available.iter().position(|&b| b == b'\n' || b == b'\r') {
                Some(i) => {
                    buf.extend_from_slice(&available[..=i]);
                    (true, i + 1)
                }
                None => {
                    buf.extend_from_slice(available);
                    (available.is_empty(), available.len())
                }
            }
        };
        reader.consume(used);
        read += used;
        if done {
            return Ok(read);
        }
    }
}

/// Exit code of a finished process; termination by signal `n` is reported
/// as `128 + n`, the way shells do.
pub fn exit_code(status: ExitStatus) -> i32 {
    match status.code() {
        Some(c) => c,
        None => 128 + status.signal().unwrap_or(0),
    }
}

pub fn check_files_exist(file_vec: &[PathBuf]) -> Result<()> {
    let mut all_valid = true;
    let mut missing = Vec::new();
    for fb in file_vec {
        let er = fb.as_path().try_exists();
        match er {
            Ok(true) => {}
            Ok(false) => {
                all_valid = false;
                missing.push(fb.display().to_string());
            }
            Err(e) => {
                all_valid = false;
                missing.push(format!("{} ({})", fb.display(), e));
            }
        }
    }
    if !all_valid {
        bail!("The following input files do not exist: {}", missing.join(", "));
    }
    Ok(())
}

/// Resolves `p` against the current directory without touching the
/// filesystem, so it works for paths that are yet to be created.
pub fn absolute_path<P: AsRef<Path>>(p: P) -> Result<PathBuf> {
    let p = p.as_ref();
    std::path::absolute(p)
        .with_context(|| format!("could not resolve the absolute path of {}", p.display()))
}

pub fn get_which_executable(prog_name: &str) -> Result<PathBuf> {
    match which(prog_name) {
        Ok(p) => {
            debug!("found `{}` in the PATH at {}", prog_name, p.display());
            Ok(p)
        }
        Err(e) => Err(anyhow!("could not find `{}` in your path: {}", prog_name, e)),
    }
}
