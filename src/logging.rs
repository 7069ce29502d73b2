use anyhow::{Context, Result};
use parking_lot::{Mutex, MutexGuard};
use std::{
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing_subscriber::{fmt::MakeWriter, prelude::*, EnvFilter};

/// Framework crates only report errors unless `RUST_LOG` says otherwise.
const DEFAULT_FILTER: &str = "info,hyper=error,hyper_util=error,tower=error,reqwest=warn";

/// Append-only log file capped at `max_bytes`; on overflow the file moves to
/// `<path>.1` (older backups shift up, the oldest beyond `backups` is dropped).
pub struct RotatingFile {
    inner: Mutex<Inner>,
}

struct Inner {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    file: File,
    written: u64,
}

fn backup_path(path: &Path, n: usize) -> PathBuf {
    let mut s = OsString::from(path.as_os_str());
    s.push(format!(".{n}"));
    PathBuf::from(s)
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            inner: Mutex::new(Inner {
                path,
                max_bytes,
                backups,
                file,
                written,
            }),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.inner.lock().path.clone()
    }
}

impl Inner {
    fn write_record(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = buf.len() as u64;
        if self.max_bytes > 0 && self.written > 0 && self.written + len > self.max_bytes {
            self.rotate()?;
        }
        self.file.write_all(buf)?;
        self.written += len;
        Ok(buf.len())
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.backups > 0 {
            for n in (1..self.backups).rev() {
                let from = backup_path(&self.path, n);
                if from.exists() {
                    fs::rename(&from, backup_path(&self.path, n + 1))?;
                }
            }
            fs::rename(&self.path, backup_path(&self.path, 1))?;
        }
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

pub struct RotatingWriter<'a> {
    guard: MutexGuard<'a, Inner>,
}

impl Write for RotatingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.guard.write_record(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.guard.file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = RotatingWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingWriter {
            guard: self.inner.lock(),
        }
    }
}

/// Console plus rotating file output.
pub fn init(log_file: &Path, max_bytes: u64, backups: usize) -> Result<()> {
    let file = RotatingFile::open(log_file, max_bytes, backups)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(file),
        )
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(())
}
