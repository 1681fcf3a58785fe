//! I/O-bound generator: repeated write, sync and read-back of a temp file
//!
//! The file is named after the running context's OS identity so concurrent
//! contexts never collide. A guard removes it when the generator returns,
//! whichever path it returns by.

use std::fs::{self, File, OpenOptions};
use std::hint::black_box;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use super::{UnitContext, WorkloadOutcome};
use crate::chaos::Fault;
use crate::config::{WorkloadKind, WorkloadParams};
use crate::unit::ContextId;

/// Path of the temporary file for the context `identity`
pub fn temp_file_path(dir: &Path, identity: ContextId) -> PathBuf {
    dir.join(format!("worker_io_{}.tmp", identity))
}

/// Removes the file at `path` when dropped
#[derive(Debug)]
pub struct TempFileGuard {
    path: PathBuf,
}

impl TempFileGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "failed to remove temp file: {}", e);
            }
        }
    }
}

fn write_passes(file: &mut File, buffer: &[u8], count: usize, inject_fault: bool) -> io::Result<()> {
    if inject_fault {
        return Err(io::Error::other("injected write fault"));
    }
    for _ in 0..count {
        file.write_all(buffer)?;
    }
    Ok(())
}

fn read_passes(file: &mut File, buffer: &mut [u8], count: usize) -> io::Result<u64> {
    let mut total = 0u64;
    for _ in 0..count {
        file.seek(SeekFrom::Start(0))?;
        total += file.read(buffer)? as u64;
    }
    Ok(total)
}

/// One write/read cycle. Returns the bytes read back.
fn run_iteration(
    path: &Path,
    buffer: &mut [u8],
    iteration: u64,
    params: &WorkloadParams,
    inject_write_fault: bool,
) -> io::Result<u64> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(path)?;

    buffer.fill(b'A' + (iteration % 26) as u8);
    write_passes(&mut file, buffer, params.io_writes, inject_write_fault)?;

    if params.io_sync_interval > 0 && iteration % params.io_sync_interval == 0 {
        file.sync_all()?;
    }
    drop(file);

    let mut file = File::open(path)?;
    read_passes(&mut file, buffer, params.io_reads)
}

pub(super) fn run(ctx: &UnitContext<'_>) -> WorkloadOutcome {
    let params = ctx.params;
    let mut outcome = WorkloadOutcome::new(WorkloadKind::Io);
    let guard = TempFileGuard::new(temp_file_path(&params.tmp_dir, ctx.identity));

    let Some(mut buffer) = super::memory::allocate_filled(params.io_buffer_bytes, 0) else {
        tracing::warn!(unit = ctx.index, "failed to allocate I/O buffer");
        outcome.failed_iterations += 1;
        return outcome;
    };

    let mut bytes_read = 0u64;
    for iteration in 0..params.loop_count {
        outcome.iterations += 1;
        let inject = ctx.injects(Fault::IoWriteFailure, iteration);
        match run_iteration(guard.path(), &mut buffer, iteration, params, inject) {
            Ok(n) => bytes_read += n,
            Err(e) => {
                tracing::warn!(
                    unit = ctx.index,
                    iteration,
                    path = %guard.path().display(),
                    "I/O failed, skipping iteration: {}",
                    e
                );
                outcome.failed_iterations += 1;
            }
        }
    }

    outcome.observed = black_box(bytes_read);
    outcome
}
