//! Repository clones via the `git` executable, reported as a line stream.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use crate::job::{BuildOutcome, Downloader, ExecContext, GitOptions, Job, JobError, JobOptions};
use crate::progress::Reporter;
use crate::url_model::{next_free_name, repo_dir_name};

use super::DownloadSettings;

const POLL: Duration = Duration::from_millis(100);

/// Splits a progress stream on `\r` and `\n`; git redraws its counters
/// with bare carriage returns.
#[derive(Debug, Default)]
struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    fn push(&mut self, data: &[u8], mut emit: impl FnMut(String)) {
        for &b in data {
            if b == b'\r' || b == b'\n' {
                self.flush(&mut emit);
            } else {
                self.pending.push(b);
            }
        }
    }

    fn flush(&mut self, emit: &mut impl FnMut(String)) {
        let line = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        if !line.is_empty() {
            emit(line);
        }
    }
}

/// Forwards every line of `input` to `reporter`; returns the last one.
fn forward_lines(mut input: impl Read, reporter: &Reporter) -> Option<String> {
    let mut splitter = LineSplitter::default();
    let mut last = None;
    let mut buf = [0u8; 4096];
    let mut emit = |line: String| {
        reporter.line(line.clone());
        last = Some(line);
    };
    loop {
        match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => splitter.push(&buf[..n], &mut emit),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    splitter.flush(&mut emit);
    last
}

pub struct GitDownloader {
    program: String,
    settings: DownloadSettings,
}

impl GitDownloader {
    pub fn new(settings: DownloadSettings) -> Self {
        Self::with_program("git", settings)
    }

    /// Uses `program` instead of `git` from `PATH`.
    pub fn with_program(program: impl Into<String>, settings: DownloadSettings) -> Self {
        Self {
            program: program.into(),
            settings,
        }
    }

    fn options(job: &Job) -> GitOptions {
        match &job.options {
            JobOptions::Git(opts) => opts.clone(),
            JobOptions::Http => GitOptions::default(),
        }
    }

    fn command(&self, job: &Job, destination: &Path) -> Command {
        let opts = Self::options(job);
        let mut cmd = Command::new(&self.program);
        cmd.arg("clone").arg("--progress");
        if let Some(depth) = opts.depth {
            cmd.arg("--depth").arg(depth.to_string());
        }
        if let Some(branch) = &opts.branch {
            cmd.arg("--branch").arg(branch);
        }
        cmd.arg("--")
            .arg(&job.source)
            .arg(destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }

    /// True if `destination` holds a repository with a resolvable `HEAD`;
    /// an interrupted clone leaves `.git` behind without one.
    fn has_checkout(&self, destination: &Path) -> bool {
        Command::new(&self.program)
            .arg("-C")
            .arg(destination)
            .args(["rev-parse", "--verify", "--quiet", "HEAD"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    }

    fn clone_into(&self, job: &Job, destination: &Path, ctx: &ExecContext) -> Result<(), JobError> {
        let mut child = self
            .command(job, destination)
            .spawn()
            .map_err(|e| JobError::io(format!("spawn {}", self.program), e))?;
        tracing::info!(job = %job.id, path = %destination.display(), "git clone started");
        let stderr = child.stderr.take();

        let (status, last_line): (ExitStatus, Option<String>) = thread::scope(|s| {
            let reader = stderr.map(|err| s.spawn(|| forward_lines(err, &ctx.reporter)));
            let status = loop {
                match child.try_wait() {
                    Ok(Some(status)) => break Ok(status),
                    Ok(None) => {}
                    Err(e) => break Err(JobError::io("wait for git", e)),
                }
                if ctx.cancel.is_cancelled() {
                    let _ = child.kill();
                    let _ = child.wait();
                    break Err(JobError::Cancelled);
                }
                thread::sleep(POLL);
            };
            let last_line = reader.and_then(|h| h.join().ok()).flatten();
            status.map(|st| (st, last_line))
        })?;

        if !status.success() {
            let detail = last_line.unwrap_or_else(|| "no output".to_string());
            return Err(JobError::Protocol(format!("git clone {}: {}", status, detail)));
        }
        tracing::info!(job = %job.id, path = %destination.display(), "git clone complete");
        Ok(())
    }
}

/// Removes what a failed clone left in `destination`. A directory that
/// existed before the clone was empty, so only its contents go.
fn discard_partial_clone(destination: &Path, created: bool) {
    let result = if created {
        match std::fs::remove_dir_all(destination) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    } else {
        destination.read_dir().and_then(|entries| {
            for entry in entries {
                let path = entry?.path();
                if path.is_dir() {
                    std::fs::remove_dir_all(&path)?;
                } else {
                    std::fs::remove_file(&path)?;
                }
            }
            Ok(())
        })
    };
    match result {
        Ok(()) => tracing::debug!(path = %destination.display(), "removed partial clone"),
        Err(e) => tracing::warn!(path = %destination.display(), error = %e, "could not remove partial clone"),
    }
}

impl Downloader for GitDownloader {
    fn validate(&self, job: &Job) -> Result<(), JobError> {
        if job.source.trim().is_empty() {
            return Err(JobError::Invalid("empty repository locator".to_string()));
        }
        if job.source.starts_with('-') {
            return Err(JobError::Invalid(format!("invalid repository locator {:?}", job.source)));
        }
        if job.output.is_none() && repo_dir_name(&job.source).is_none() {
            return Err(JobError::Invalid(format!(
                "cannot derive a directory name from {}; pass an output path",
                job.source
            )));
        }
        if let JobOptions::Git(GitOptions { depth: Some(0), .. }) = job.options {
            return Err(JobError::Invalid("clone depth must be at least 1".to_string()));
        }
        Ok(())
    }

    fn build(&self, job: &mut Job) -> Result<BuildOutcome, JobError> {
        let mut destination = match &job.output {
            Some(output) => self.settings.resolve(output),
            None => {
                let name = repo_dir_name(&job.source)
                    .ok_or_else(|| JobError::Invalid(format!("no directory name in {}", job.source)))?;
                self.settings.download_dir.join(name)
            }
        };

        if destination.join(".git").exists() {
            if self.has_checkout(&destination) {
                tracing::info!(job = %job.id, path = %destination.display(), "repository already cloned");
                job.destination = Some(destination);
                return Ok(BuildOutcome::AlreadySatisfied);
            }
            tracing::warn!(job = %job.id, path = %destination.display(), "repository has no HEAD, treating as occupied");
        }
        let occupied = destination.is_file()
            || destination
                .read_dir()
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false);
        if occupied {
            destination = next_free_name(&destination);
            tracing::info!(job = %job.id, path = %destination.display(), "destination occupied, cloning under a new name");
        }
        job.destination = Some(destination);
        Ok(BuildOutcome::Ready)
    }

    fn execute(&self, job: &mut Job, ctx: &ExecContext) -> Result<(), JobError> {
        let destination = job
            .destination
            .clone()
            .ok_or_else(|| JobError::Invalid("destination not resolved".to_string()))?;
        let created = !destination.exists();
        let result = self.clone_into(job, &destination, ctx);
        if result.is_err() {
            discard_partial_clone(&destination, created);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::CancelToken;
    use crate::job::JobId;
    use crate::progress::ProgressEvent;
    use crate::retry::RetryPolicy;
    use std::path::PathBuf;

    fn settings(dir: &Path) -> DownloadSettings {
        DownloadSettings {
            download_dir: dir.to_path_buf(),
            min_chunk_size: 1,
            retry: RetryPolicy::immediate(1),
        }
    }

    #[test]
    fn splitter_handles_carriage_returns() {
        let mut splitter = LineSplitter::default();
        let mut lines = Vec::new();
        splitter.push(b"Cloning into 'x'...\nReceiving objects:  10% (1/10)\rReceiving", |l| lines.push(l));
        splitter.push(b" objects: 100% (10/10), done.\r\n", |l| lines.push(l));
        assert_eq!(
            lines,
            vec![
                "Cloning into 'x'...",
                "Receiving objects:  10% (1/10)",
                "Receiving objects: 100% (10/10), done.",
            ]
        );
    }

    #[test]
    fn forward_lines_returns_last_line() {
        let (reporter, rx) = Reporter::channel(JobId(4));
        let last = forward_lines(&b"one\rtwo\nthree"[..], &reporter);
        assert_eq!(last.as_deref(), Some("three"));
        let lines: Vec<String> = rx
            .try_iter()
            .filter_map(|e| match e {
                ProgressEvent::Line { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn validate_needs_a_usable_locator() {
        let dir = tempfile::tempdir().unwrap();
        let d = GitDownloader::new(settings(dir.path()));
        let ok = Job::git(JobId(1), "https://example.com/r.git", None, GitOptions::default());
        assert!(d.validate(&ok).is_ok());
        let dash = Job::git(JobId(1), "--upload-pack=evil", None, GitOptions::default());
        assert!(d.validate(&dash).is_err());
        let nameless = Job::git(JobId(1), "https://example.com/", None, GitOptions::default());
        assert!(d.validate(&nameless).is_err());
        let shallow = Job::git(
            JobId(1),
            "https://example.com/r.git",
            None,
            GitOptions {
                depth: Some(0),
                branch: None,
            },
        );
        assert!(d.validate(&shallow).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn build_detects_existing_clone() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("repo/.git")).unwrap();
        let d = GitDownloader::with_program("true", settings(dir.path()));
        let mut job = Job::git(JobId(1), "git@example.com:team/repo.git", None, GitOptions::default());

        assert_eq!(d.build(&mut job).unwrap(), BuildOutcome::AlreadySatisfied);
        assert_eq!(job.destination, Some(dir.path().join("repo")));
    }

    #[cfg(unix)]
    #[test]
    fn build_skips_clone_without_head() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("repo/.git")).unwrap();
        let d = GitDownloader::with_program("false", settings(dir.path()));
        let mut job = Job::git(JobId(1), "git@example.com:team/repo.git", None, GitOptions::default());

        assert_eq!(d.build(&mut job).unwrap(), BuildOutcome::Ready);
        assert_eq!(job.destination, Some(dir.path().join("repo (1)")));
    }

    #[test]
    fn build_avoids_occupied_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("repo")).unwrap();
        std::fs::write(dir.path().join("repo/notes.txt"), b"x").unwrap();
        let d = GitDownloader::new(settings(dir.path()));
        let mut job = Job::git(JobId(1), "https://example.com/repo.git", None, GitOptions::default());

        assert_eq!(d.build(&mut job).unwrap(), BuildOutcome::Ready);
        assert_eq!(job.destination, Some(dir.path().join("repo (1)")));
    }

    #[test]
    fn command_carries_options() {
        let dir = tempfile::tempdir().unwrap();
        let d = GitDownloader::new(settings(dir.path()));
        let job = Job::git(
            JobId(1),
            "https://example.com/r.git",
            None,
            GitOptions {
                depth: Some(1),
                branch: Some("main".to_string()),
            },
        );
        let cmd = d.command(&job, &PathBuf::from("/tmp/r"));
        let args: Vec<String> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec!["clone", "--progress", "--depth", "1", "--branch", "main", "--", "https://example.com/r.git", "/tmp/r"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn exit_status_decides_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ExecContext {
            reporter: Reporter::channel(JobId(1)).0,
            cancel: CancelToken::new(),
        };
        let mut job = Job::git(JobId(1), "https://example.com/r.git", None, GitOptions::default());
        job.destination = Some(dir.path().join("r"));

        let ok = GitDownloader::with_program("true", settings(dir.path()));
        assert!(ok.execute(&mut job, &ctx).is_ok());

        let failing = GitDownloader::with_program("false", settings(dir.path()));
        assert!(matches!(failing.execute(&mut job, &ctx), Err(JobError::Protocol(_))));
    }

    /// Writes an executable stand-in for `git clone` that creates
    /// `<dest>/.git` and then runs `tail`.
    #[cfg(unix)]
    fn fake_git(dir: &Path, tail: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-git");
        // Arguments: clone --progress -- <source> <dest>
        std::fs::write(&path, format!("#!/bin/sh\nmkdir -p \"$5/.git\"\n{}\n", tail)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[test]
    fn failed_clone_removes_destination() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ExecContext {
            reporter: Reporter::channel(JobId(1)).0,
            cancel: CancelToken::new(),
        };
        let d = GitDownloader::with_program(fake_git(dir.path(), "exit 128"), settings(dir.path()));
        let mut job = Job::git(JobId(1), "https://example.com/r.git", None, GitOptions::default());
        job.destination = Some(dir.path().join("r"));

        assert!(matches!(d.execute(&mut job, &ctx), Err(JobError::Protocol(_))));
        assert!(!dir.path().join("r").exists());
    }

    #[cfg(unix)]
    #[test]
    fn failed_clone_empties_directory_it_did_not_create() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("r")).unwrap();
        let ctx = ExecContext {
            reporter: Reporter::channel(JobId(1)).0,
            cancel: CancelToken::new(),
        };
        let d = GitDownloader::with_program(fake_git(dir.path(), "exit 128"), settings(dir.path()));
        let mut job = Job::git(JobId(1), "https://example.com/r.git", None, GitOptions::default());
        job.destination = Some(dir.path().join("r"));

        assert!(d.execute(&mut job, &ctx).is_err());
        assert!(dir.path().join("r").is_dir());
        assert!(!dir.path().join("r/.git").exists());
    }

    #[cfg(unix)]
    #[test]
    fn cancelled_clone_removes_destination() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ExecContext {
            reporter: Reporter::channel(JobId(1)).0,
            cancel: CancelToken::new(),
        };
        let d = GitDownloader::with_program(fake_git(dir.path(), "exec sleep 30"), settings(dir.path()));
        let mut job = Job::git(JobId(1), "https://example.com/r.git", None, GitOptions::default());
        let dest = dir.path().join("r");
        job.destination = Some(dest.clone());

        let cancel = ctx.cancel.clone();
        let result = thread::scope(|s| {
            s.spawn(|| {
                while !dest.join(".git").exists() {
                    thread::sleep(Duration::from_millis(10));
                }
                cancel.cancel();
            });
            d.execute(&mut job, &ctx)
        });

        assert!(matches!(result, Err(JobError::Cancelled)));
        assert!(!dest.exists());
    }

    #[test]
    fn missing_program_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ExecContext {
            reporter: Reporter::channel(JobId(1)).0,
            cancel: CancelToken::new(),
        };
        let mut job = Job::git(JobId(1), "https://example.com/r.git", None, GitOptions::default());
        job.destination = Some(dir.path().join("r"));
        let d = GitDownloader::with_program("mdm-no-such-program", settings(dir.path()));
        assert!(matches!(d.execute(&mut job, &ctx), Err(JobError::Io { .. })));
    }
}
