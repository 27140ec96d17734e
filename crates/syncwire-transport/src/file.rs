use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::ids::{ContactId, TransportId};
use crate::plugin::{Plugin, PluginConfig, SimplexPlugin, SimplexPluginFactory};
use crate::traits::{InputStream, OutputStream, SimplexTransportReader, SimplexTransportWriter};

/// Transport identifier of the directory-backed carrier.
pub const FILE_TRANSPORT_ID: &str = "file";

/// Config key naming the exchange directory.
pub const CONFIG_DIR: &str = "dir";

/// Config key for the per-transfer capacity in bytes.
pub const CONFIG_CAPACITY: &str = "capacity";

/// Default per-transfer capacity.
pub const DEFAULT_CAPACITY: u64 = 16 * 1024 * 1024;

/// Default latency: a file may sit in a shared directory for a day.
pub const DEFAULT_MAX_LATENCY: Duration = Duration::from_secs(24 * 60 * 60);

const TRANSFER_EXTENSION: &str = "dat";
const PARTIAL_EXTENSION: &str = "dat.partial";

/// Simplex carrier that exchanges one file per contact through a directory,
/// e.g. a removable drive or a synced folder.
///
/// A writer fills `<contact>.dat.partial` and renames it into place on a clean
/// dispose, so readers never see half-written transfers.
pub struct FilePlugin {
    id: TransportId,
    dir: PathBuf,
    capacity: u64,
    max_latency: Duration,
}

impl FilePlugin {
    pub fn new(dir: impl Into<PathBuf>, capacity: u64, max_latency: Duration) -> Self {
        Self {
            id: TransportId::builtin(FILE_TRANSPORT_ID),
            dir: dir.into(),
            capacity,
            max_latency,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn transfer_path(&self, contact: ContactId) -> PathBuf {
        self.dir.join(format!("{}.{TRANSFER_EXTENSION}", contact.0))
    }

    fn partial_path(&self, contact: ContactId) -> PathBuf {
        self.dir.join(format!("{}.{PARTIAL_EXTENSION}", contact.0))
    }
}

fn file_error(path: &Path) -> impl FnOnce(io::Error) -> TransportError + '_ {
    move |source| TransportError::File {
        path: path.to_path_buf(),
        source,
    }
}

impl Plugin for FilePlugin {
    fn id(&self) -> &TransportId {
        &self.id
    }

    fn max_latency(&self) -> Duration {
        self.max_latency
    }

    fn start(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(file_error(&self.dir))?;
        debug!(dir = ?self.dir, "file plugin started");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        Ok(())
    }
}

impl SimplexPlugin for FilePlugin {
    fn create_reader(&self, contact: ContactId) -> Result<Option<Box<dyn SimplexTransportReader>>> {
        let path = self.transfer_path(contact);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(file_error(&path)(err)),
        };
        debug!(?path, %contact, "opened transfer for reading");
        Ok(Some(Box::new(FileReader {
            id: self.id.clone(),
            path,
            file: Some(file),
        })))
    }

    fn create_writer(&self, contact: ContactId) -> Result<Option<Box<dyn SimplexTransportWriter>>> {
        let target = self.transfer_path(contact);
        if target.exists() {
            debug!(path = ?target, %contact, "previous transfer not yet collected");
            return Ok(None);
        }
        let partial = self.partial_path(contact);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&partial)
            .map_err(file_error(&partial))?;
        Ok(Some(Box::new(FileWriter {
            id: self.id.clone(),
            partial,
            target,
            file: Some(file),
            capacity: self.capacity,
            max_latency: self.max_latency,
            written: Arc::new(AtomicU64::new(0)),
        })))
    }
}

struct FileReader {
    id: TransportId,
    path: PathBuf,
    file: Option<File>,
}

impl SimplexTransportReader for FileReader {
    fn transport_id(&self) -> &TransportId {
        &self.id
    }

    fn input_stream(&mut self) -> Result<InputStream> {
        let file = self.file.as_ref().ok_or(TransportError::Disposed)?;
        Ok(Box::new(file.try_clone()?))
    }

    fn dispose(&mut self, exception: bool, recognised: bool) -> Result<()> {
        if self.file.take().is_none() {
            return Ok(());
        }
        info!(path = ?self.path, exception, recognised, "disposing file reader");
        if recognised && !exception {
            fs::remove_file(&self.path).map_err(file_error(&self.path))?;
        }
        Ok(())
    }
}

struct FileWriter {
    id: TransportId,
    partial: PathBuf,
    target: PathBuf,
    file: Option<File>,
    capacity: u64,
    max_latency: Duration,
    written: Arc<AtomicU64>,
}

impl SimplexTransportWriter for FileWriter {
    fn transport_id(&self) -> &TransportId {
        &self.id
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn max_latency(&self) -> Duration {
        self.max_latency
    }

    fn output_stream(&mut self) -> Result<OutputStream> {
        let file = self.file.as_ref().ok_or(TransportError::Disposed)?;
        Ok(Box::new(BoundedFile {
            file: file.try_clone()?,
            capacity: self.capacity,
            written: Arc::clone(&self.written),
        }))
    }

    fn dispose(&mut self, exception: bool) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        info!(
            path = ?self.target,
            exception,
            bytes = self.written.load(Ordering::Relaxed),
            "disposing file writer"
        );
        if exception {
            drop(file);
            if let Err(err) = fs::remove_file(&self.partial) {
                warn!(path = ?self.partial, error = %err, "failed to remove partial transfer");
            }
            return Ok(());
        }
        file.sync_all().map_err(file_error(&self.partial))?;
        drop(file);
        fs::rename(&self.partial, &self.target).map_err(file_error(&self.target))?;
        Ok(())
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            let _ = fs::remove_file(&self.partial);
        }
    }
}

/// Output handle that refuses writes past the transfer capacity.
struct BoundedFile {
    file: File,
    capacity: u64,
    written: Arc<AtomicU64>,
}

impl Write for BoundedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.written.load(Ordering::Acquire);
        let room = self.capacity.saturating_sub(written);
        if room == 0 && !buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "transfer capacity exhausted",
            ));
        }
        let len = buf.len().min(usize::try_from(room).unwrap_or(usize::MAX));
        let n = self.file.write(&buf[..len])?;
        self.written.fetch_add(n as u64, Ordering::AcqRel);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Builds a [`FilePlugin`]. The carrier is opt-in: it needs `enabled` and `dir`.
pub struct FilePluginFactory {
    id: TransportId,
}

impl FilePluginFactory {
    pub fn new() -> Self {
        Self {
            id: TransportId::builtin(FILE_TRANSPORT_ID),
        }
    }
}

impl Default for FilePluginFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SimplexPluginFactory for FilePluginFactory {
    fn id(&self) -> &TransportId {
        &self.id
    }

    fn create_plugin(&self, config: &PluginConfig) -> Result<Option<Box<dyn SimplexPlugin>>> {
        if !config.is_enabled() {
            debug!("file transport disabled");
            return Ok(None);
        }
        let dir = config
            .get(CONFIG_DIR)
            .filter(|dir| !dir.is_empty())
            .ok_or_else(|| TransportError::InvalidConfig(format!("{CONFIG_DIR} is required")))?;
        let capacity = match config.get(CONFIG_CAPACITY) {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                TransportError::InvalidConfig(format!("{CONFIG_CAPACITY}: not a number: {raw}"))
            })?,
            None => DEFAULT_CAPACITY,
        };
        Ok(Some(Box::new(FilePlugin::new(dir, capacity, DEFAULT_MAX_LATENCY))))
    }
}
