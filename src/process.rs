use crate::constants::{MAX_BATCH_ARG_CHARS, MAX_PATHS_PER_BATCH};
use crate::error::{Result, StagerError};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wait_timeout::ChildExt;

/// captured result of a finished child process
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }
}

/// caps applied when a command takes a list of paths
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    pub max_paths: usize,
    pub max_chars: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_paths: MAX_PATHS_PER_BATCH,
            max_chars: MAX_BATCH_ARG_CHARS,
        }
    }
}

/// outcome of a chunked, path-list command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    /// first error seen, kept even if the per-path retries later succeed
    pub first_error: Option<String>,
    pub invocations: usize,
}

impl BatchReport {
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
        if self.first_error.is_none() {
            self.first_error = other.first_error;
        }
        self.invocations += other.invocations;
    }

    /// one-line summary, e.g. "staged 3 of 4 paths (error: ...)"
    pub fn summary(&self, verb: &str) -> String {
        use num_format::{Locale, ToFormattedString};

        let total = self.succeeded.len() + self.failed.len();
        let word = if total == 1 { "path" } else { "paths" };
        let mut summary = if self.failed.is_empty() {
            format!(
                "{verb} {} {word}",
                self.succeeded.len().to_formatted_string(&Locale::en)
            )
        } else {
            format!(
                "{verb} {} of {} {word}",
                self.succeeded.len().to_formatted_string(&Locale::en),
                total.to_formatted_string(&Locale::en)
            )
        };
        if let Some(error) = &self.first_error {
            summary.push_str(&format!(" (first error: {})", error.trim()));
        }
        summary
    }
}

/// runs an external program with a timeout, capturing both output streams
#[derive(Debug, Clone)]
pub struct Invoker {
    program: String,
}

impl Invoker {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// render the full command line as it would be passed to the OS
    pub fn command_line<S: AsRef<str>>(&self, args: &[S]) -> String {
        let mut line = quote_arg(&self.program);
        for arg in args {
            line.push(' ');
            line.push_str(&quote_arg(arg.as_ref()));
        }
        line
    }

    /// run to completion; a non-zero exit is returned as a normal output
    pub fn run<S: AsRef<str>>(
        &self,
        args: &[S],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<ProcessOutput> {
        let command = self.command_line(args);
        tracing::trace!(cwd = %cwd.display(), timeout = ?timeout, "running {command}");

        let mut child = Command::new(&self.program)
            .args(args.iter().map(AsRef::as_ref))
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| StagerError::Spawn {
                command: command.clone(),
                source,
            })?;

        // drain both pipes concurrently so a full pipe buffer can't stall the child
        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        match child.wait_timeout(timeout) {
            Ok(Some(status)) => {
                let stdout = collect(stdout_reader);
                let stderr = String::from_utf8_lossy(&collect(stderr_reader)).to_string();
                let exit_code = status.code().unwrap_or(-1);
                tracing::trace!(exit_code, bytes = stdout.len(), "finished {command}");
                Ok(ProcessOutput {
                    exit_code,
                    stdout,
                    stderr,
                })
            }
            Ok(None) => {
                if let Err(e) = child.kill() {
                    tracing::warn!("failed to kill timed out process: {e}");
                }
                let _ = child.wait();
                // readers are detached; a grandchild may still hold the pipes open
                tracing::warn!("`{command}` timed out after {}s", timeout.as_secs());
                Err(StagerError::ProcessTimeout { command, timeout })
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(StagerError::Io(e))
            }
        }
    }

    /// like `run`, but a non-zero exit becomes `ProcessFailure`
    pub fn run_checked<S: AsRef<str>>(
        &self,
        args: &[S],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<ProcessOutput> {
        let output = self.run(args, cwd, timeout)?;
        if output.success() {
            Ok(output)
        } else {
            Err(StagerError::ProcessFailure {
                command: self.command_line(args),
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// run `base_args` followed by `paths`, split into chunks that respect `limits`
    ///
    /// a failed chunk is retried one path at a time so a single bad path
    /// doesn't take the rest of its chunk down with it
    pub fn run_batched(
        &self,
        base_args: &[&str],
        paths: &[String],
        cwd: &Path,
        timeout: Duration,
        limits: BatchLimits,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        let base_len = self.command_line(base_args).len();
        let budget = limits.max_chars.saturating_sub(base_len);

        for chunk in chunk_paths(paths, limits.max_paths, budget) {
            report.invocations += 1;
            match self.run_checked(&with_paths(base_args, &chunk), cwd, timeout) {
                Ok(_) => report.succeeded.extend(chunk),
                Err(e) => {
                    tracing::debug!("batch of {} failed: {e}", chunk.len());
                    if report.first_error.is_none() {
                        report.first_error = Some(e.user_message());
                    }
                    if chunk.len() == 1 {
                        report.failed.extend(chunk);
                        continue;
                    }
                    for path in chunk {
                        report.invocations += 1;
                        let single = [path.clone()];
                        match self.run_checked(&with_paths(base_args, &single), cwd, timeout) {
                            Ok(_) => report.succeeded.push(path),
                            Err(e) => {
                                tracing::debug!("retry of {path} failed: {e}");
                                report.failed.push(path);
                            }
                        }
                    }
                }
            }
        }

        report
    }
}

fn with_paths(base_args: &[&str], paths: &[String]) -> Vec<String> {
    base_args
        .iter()
        .map(|a| (*a).to_string())
        .chain(paths.iter().cloned())
        .collect()
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut buf) {
                tracing::warn!("failed to read process output: {e}");
            }
            buf
        })
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// split `paths` so each chunk has at most `max_paths` entries and at most
/// `max_chars` characters once quoted and space separated
///
/// a path that is too long on its own still gets a chunk of its own
pub fn chunk_paths(paths: &[String], max_paths: usize, max_chars: usize) -> Vec<Vec<String>> {
    let max_paths = max_paths.max(1);
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0;

    for path in paths {
        let len = quote_arg(path).len() + 1;
        if !current.is_empty() && (current.len() >= max_paths || current_len + len > max_chars) {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current_len += len;
        current.push(path.clone());
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// quote a single argument using the Windows command line convention:
/// backslashes are literal unless they precede a quote, in which case they
/// are doubled and the quote is escaped
pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "\"\"".to_string();
    }
    if !arg
        .chars()
        .any(|c| c.is_whitespace() || c == '"' || c == '\'')
    {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    let mut backslashes = 0;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                quoted.extend(std::iter::repeat_n('\\', backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                quoted.extend(std::iter::repeat_n('\\', backslashes));
                quoted.push(c);
                backslashes = 0;
            }
        }
    }
    // trailing backslashes sit right before the closing quote
    quoted.extend(std::iter::repeat_n('\\', backslashes * 2));
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_plain_argument_is_untouched() {
        assert_eq!(quote_arg("status"), "status");
        assert_eq!(quote_arg("Assets/a.png"), "Assets/a.png");
        assert_eq!(quote_arg(r"C:\dir\file"), r"C:\dir\file");
    }

    #[test]
    fn test_quote_whitespace_and_quotes() {
        assert_eq!(quote_arg(""), "\"\"");
        assert_eq!(quote_arg("a b"), "\"a b\"");
        assert_eq!(quote_arg("say \"hi\""), r#""say \"hi\"""#);
        assert_eq!(quote_arg("it's"), "\"it's\"");
    }

    #[test]
    fn test_quote_backslashes() {
        // backslash before a quote is doubled, then the quote is escaped
        assert_eq!(quote_arg("a\\\"b c"), r#""a\\\"b c""#);
        // trailing backslashes are doubled before the closing quote
        assert_eq!(quote_arg("dir name\\"), r#""dir name\\""#);
        // backslashes elsewhere stay literal
        assert_eq!(quote_arg(r"a\b c"), r#""a\b c""#);
    }

    #[test]
    fn test_chunk_by_count() {
        let paths: Vec<String> = (0..450).map(|i| format!("p{i}")).collect();
        let chunks = chunk_paths(&paths, 200, usize::MAX);
        assert_eq!(
            chunks.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![200, 200, 50]
        );
        assert_eq!(chunks.concat(), paths);
    }

    #[test]
    fn test_chunk_by_length() {
        let paths: Vec<String> = (0..10).map(|i| format!("{i:0>9}")).collect();
        // each path costs 10 chars including its separator
        let chunks = chunk_paths(&paths, 200, 35);
        assert_eq!(
            chunks.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![3, 3, 3, 1]
        );
    }

    #[test]
    fn test_chunk_oversized_path_gets_own_chunk() {
        let paths = vec!["a".to_string(), "x".repeat(100), "b".to_string()];
        let chunks = chunk_paths(&paths, 200, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1][0].len(), 100);
    }

    #[test]
    fn test_report_summary() {
        let report = BatchReport {
            succeeded: vec!["a".into(), "b".into()],
            failed: vec!["c".into()],
            first_error: Some("fatal: bad path\n".into()),
            invocations: 4,
        };
        assert_eq!(
            report.summary("staged"),
            "staged 2 of 3 paths (first error: fatal: bad path)"
        );
        assert!(!report.is_complete());
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;
        use std::time::Instant;
        use tempfile::TempDir;

        fn sh() -> Invoker {
            Invoker::new("sh")
        }

        #[test]
        fn test_run_captures_streams_and_exit_code() {
            let dir = TempDir::new().unwrap();
            let output = sh()
                .run(
                    &["-c", "echo out; echo err >&2; exit 3"],
                    dir.path(),
                    Duration::from_secs(10),
                )
                .unwrap();
            assert_eq!(output.exit_code, 3);
            assert_eq!(output.stdout_lossy(), "out\n");
            assert_eq!(output.stderr, "err\n");
        }

        #[test]
        fn test_run_checked_reports_failure() {
            let dir = TempDir::new().unwrap();
            let err = sh()
                .run_checked(
                    &["-c", "echo nope >&2; exit 1"],
                    dir.path(),
                    Duration::from_secs(10),
                )
                .unwrap_err();
            match err {
                StagerError::ProcessFailure { code, stderr, .. } => {
                    assert_eq!(code, 1);
                    assert_eq!(stderr, "nope");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[test]
        fn test_run_large_output_does_not_deadlock() {
            let dir = TempDir::new().unwrap();
            let output = sh()
                .run(
                    &["-c", "head -c 1000000 /dev/zero; head -c 200000 /dev/zero >&2"],
                    dir.path(),
                    Duration::from_secs(30),
                )
                .unwrap();
            assert!(output.success());
            assert_eq!(output.stdout.len(), 1_000_000);
            assert_eq!(output.stderr.len(), 200_000);
        }

        #[test]
        fn test_run_timeout_kills_process() {
            let dir = TempDir::new().unwrap();
            let started = Instant::now();
            let err = Invoker::new("sleep")
                .run(&["10"], dir.path(), Duration::from_millis(200))
                .unwrap_err();
            assert!(matches!(err, StagerError::ProcessTimeout { .. }));
            assert!(started.elapsed() < Duration::from_secs(5));
        }

        #[test]
        fn test_run_missing_program_is_spawn_error() {
            let dir = TempDir::new().unwrap();
            let err = Invoker::new("definitely-not-a-real-program-xyz")
                .run(&["--version"], dir.path(), Duration::from_secs(5))
                .unwrap_err();
            assert!(matches!(err, StagerError::Spawn { .. }));
        }

        #[test]
        fn test_batched_retries_failed_chunk_per_path() {
            let dir = TempDir::new().unwrap();
            // fails whenever any argument contains "bad"
            let script = r#"for p in "$@"; do case "$p" in *bad*) echo "rejected $p" >&2; exit 1;; esac; done"#;
            let paths: Vec<String> = (0..500)
                .map(|i| {
                    if i == 250 {
                        format!("dir/{}bad", "x".repeat(90))
                    } else {
                        format!("dir/{i:0>96}")
                    }
                })
                .collect();

            let report = sh().run_batched(
                &["-c", script, "sh"],
                &paths,
                dir.path(),
                Duration::from_secs(30),
                BatchLimits::default(),
            );

            assert_eq!(report.success_count(), 499);
            assert_eq!(report.failed.len(), 1);
            assert!(report.failed[0].ends_with("bad"));
            assert!(report.first_error.as_deref().unwrap().contains("rejected"));
            // at least two chunks, plus the per-path retries of the failed one
            assert!(report.invocations > 2);
        }
    }
}
