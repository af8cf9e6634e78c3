// SPDX-License-Identifier: MPL-2.0

//! Logger setup and the head+tail rotating log file.
//!
//! The log file is append-only. Every `check_every_lines` appended lines the
//! writer counts the file's lines and, once it holds more than
//! `head + tail`, rewrites it in place with the first `head` and the last
//! `tail` lines. Startup context and recent history both survive.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use env_logger::{Env, Target, WriteStyle};

use crate::config::LogConfig;
use crate::scheduler::LineCadence;

/// Lines to keep from each end of the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub head: usize,
    pub tail: usize,
}

impl Retention {
    /// Apply the policy to a list of lines. `None` when nothing needs to go.
    pub fn apply<'a, T: ?Sized>(&self, lines: &[&'a T]) -> Option<Vec<&'a T>> {
        if lines.len() <= self.head + self.tail {
            return None;
        }
        let mut kept = Vec::with_capacity(self.head + self.tail);
        kept.extend_from_slice(&lines[..self.head]);
        kept.extend_from_slice(&lines[lines.len() - self.tail..]);
        Some(kept)
    }
}

/// Rewrite `path` so it keeps only its head and tail lines.
///
/// Returns whether the file was rewritten.
pub fn rotate_file(path: &Path, retention: Retention) -> io::Result<bool> {
    let content = std::fs::read(path)?;
    let mut lines: Vec<&[u8]> = content.split(|b| *b == b'\n').collect();
    if content.ends_with(b"\n") {
        lines.pop();
    }

    let Some(kept) = retention.apply(&lines) else {
        return Ok(false);
    };

    let mut out = Vec::with_capacity(content.len());
    for line in kept {
        out.extend_from_slice(line);
        out.push(b'\n');
    }
    std::fs::write(path, out)?;
    Ok(true)
}

/// Append-only log file that rotates itself by line count.
pub struct RotatingLogFile {
    path: PathBuf,
    file: File,
    retention: Retention,
    cadence: LineCadence,
}

impl RotatingLogFile {
    pub fn open(path: &Path, retention: Retention, check_every_lines: u64) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            retention,
            cadence: LineCadence::new(check_every_lines),
        })
    }

    fn rotate(&mut self) {
        if let Err(e) = self.file.flush() {
            eprintln!("log flush before rotation failed: {e}");
            return;
        }
        // The handle is in append mode, so writes after an in-place rewrite
        // land at the new end of the file.
        if let Err(e) = rotate_file(&self.path, self.retention) {
            eprintln!("log rotation of {} failed: {e}", self.path.display());
        }
    }
}

impl Write for RotatingLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.file.write(buf)?;
        let lines = buf[..written].iter().filter(|b| **b == b'\n').count();
        if self.cadence.record(lines as u64) {
            self.rotate();
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Install the global logger.
///
/// `RUST_LOG` overrides `config.level`. With `config.file` set, records
/// go to a [`RotatingLogFile`]; otherwise to stderr.
pub fn init(config: &LogConfig) -> io::Result<()> {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or(&config.level));
    builder.format_timestamp_millis();

    if let Some(path) = &config.file {
        let retention = Retention {
            head: config.head_lines,
            tail: config.tail_lines,
        };
        let writer = RotatingLogFile::open(path, retention, config.check_every_lines)?;
        builder
            .target(Target::Pipe(Box::new(writer)))
            .write_style(WriteStyle::Never);
    }

    builder.try_init().map_err(io::Error::other)
}
