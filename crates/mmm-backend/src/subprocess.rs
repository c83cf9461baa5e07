//! External bridge backend (`subprocess-v1`).
//!
//! Runs a configured program (typically a Python script wrapping the
//! Meridian library), writes a [`BackendRequest`] as JSON to its stdin and
//! reads a [`ModelOutput`] JSON document from its stdout. Stderr is
//! forwarded to tracing line by line.
//!
//! Thread budgets are passed through the child's environment only; this
//! process's environment is never modified.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::process::{Command, Stdio};
use std::thread;

use mmm_adapter::ModelInputArrays;
use mmm_schemas::{BackendRequest, ModelOutput, SamplerSettings};
use tracing::{debug, debug_span, info};

use crate::error::{BackendError, BackendErrorKind};
use crate::{BackendDescriptor, ModelBackend};

/// Thread-count variables honored by TensorFlow and OpenMP runtimes.
const THREAD_VARIABLES: [&str; 3] = [
    "OMP_NUM_THREADS",
    "TF_NUM_INTRAOP_THREADS",
    "TF_NUM_INTEROP_THREADS",
];

/// Stderr lines kept for the error message when the bridge fails.
const STDERR_TAIL_LINES: usize = 20;

/// Backend delegating to an external program.
#[derive(Debug, Clone)]
pub struct SubprocessBackend {
    command: Vec<String>,
    api_version: Option<String>,
    threads: Option<usize>,
}

impl SubprocessBackend {
    /// `command` is the program followed by its arguments.
    pub fn new(
        command: Vec<String>,
        api_version: Option<String>,
        threads: Option<usize>,
    ) -> Result<Self, BackendError> {
        if command.is_empty() {
            return Err(BackendError::unsupported(
                "the subprocess backend needs a command",
            ));
        }
        Ok(Self {
            command,
            api_version,
            threads,
        })
    }
}

impl ModelBackend for SubprocessBackend {
    fn descriptor(&self) -> BackendDescriptor {
        BackendDescriptor {
            id: "subprocess-v1",
            model_type: "meridian".to_string(),
            api_version: self.api_version.clone(),
        }
    }

    fn fit(
        &self,
        input: &ModelInputArrays,
        sampler: &SamplerSettings,
    ) -> Result<ModelOutput, BackendError> {
        let _span = debug_span!("subprocess.fit").entered();

        let Some((program, args)) = self.command.split_first() else {
            return Err(BackendError::unsupported(
                "the subprocess backend needs a command",
            ));
        };

        let request = BackendRequest {
            api_version: self.api_version.clone(),
            sampler: *sampler,
            threads: self.threads,
            input: input.to_payload(),
        };
        let body = serde_json::to_vec(&request)?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(threads) = self.threads {
            for variable in THREAD_VARIABLES {
                command.env(variable, threads.to_string());
            }
        }

        info!(program = %program, bytes = body.len(), "subprocess.spawn");
        let mut child = command.spawn().map_err(|source| {
            BackendError::new(BackendErrorKind::Spawn {
                program: program.clone(),
                source,
            })
        })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (written, output, tail) = thread::scope(|scope| {
            let writer = scope.spawn(move || -> std::io::Result<()> {
                if let Some(mut stdin) = stdin {
                    stdin.write_all(&body)?;
                }
                // Dropping stdin closes the pipe so the child sees EOF.
                Ok(())
            });
            let forwarder = scope.spawn(move || forward_stderr(stderr));

            let mut output = Vec::new();
            let read = match stdout {
                Some(mut stdout) => stdout.read_to_end(&mut output).map(|_| ()),
                None => Ok(()),
            };

            let written = writer.join().unwrap_or_else(|_| {
                Err(std::io::Error::other("stdin writer panicked"))
            });
            let tail = forwarder.join().unwrap_or_default();
            (written.and(read), output, tail)
        });

        let status = child.wait()?;
        if !status.success() {
            return Err(BackendError::new(BackendErrorKind::Exited {
                status: status.to_string(),
                stderr_tail: tail.into_iter().collect::<Vec<_>>().join("\n"),
            }));
        }
        match written {
            // A bridge may stop reading once it has what it needs.
            Err(err) if err.kind() != ErrorKind::BrokenPipe => {
                return Err(err.into());
            }
            _ => {}
        }

        let parsed = parse_output(&output)?;
        debug!(bytes = output.len(), "subprocess.output");
        Ok(parsed)
    }
}

/// Logs each stderr line and returns the last few.
fn forward_stderr(stderr: Option<impl Read>) -> VecDeque<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let Some(stderr) = stderr else {
        return tail;
    };
    for line in BufReader::new(stderr).lines().map_while(Result::ok) {
        debug!(line = %line, "subprocess.stderr");
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail
}

/// Parses the bridge's stdout.
///
/// Bridges sometimes print log lines before the document, so when the
/// whole output is not JSON the last non-empty line is tried.
fn parse_output(output: &[u8]) -> Result<ModelOutput, serde_json::Error> {
    serde_json::from_slice(output).or_else(|err| {
        let text = String::from_utf8_lossy(output);
        match text.lines().rev().find(|line| !line.trim().is_empty()) {
            Some(last) => serde_json::from_str(last).map_err(|_| err),
            None => Err(err),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output_skips_log_lines() {
        let output = b"loading meridian...\n{\"r_squared\": 0.8}\n";
        let parsed = parse_output(output).unwrap();
        assert_eq!(parsed.r_squared, Some(0.8));
    }

    #[test]
    fn test_parse_output_rejects_garbage() {
        assert!(parse_output(b"Traceback (most recent call last):\n").is_err());
        assert!(parse_output(b"").is_err());
    }

    #[test]
    fn test_empty_command_rejected() {
        let err = SubprocessBackend::new(Vec::new(), None, None).unwrap_err();
        assert!(err.is_unsupported());
    }
}
