//! Poll-based follow of an append-only log file.
//!
//! The file is read from the start, then polled for growth. Rotation (inode
//! change or file gone) and truncation both end the inner loop so the outer
//! loop reopens from scratch; open failures retry forever with a capped
//! doubling backoff. The loop only exits on cancellation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::{
    fs,
    io::AsyncReadExt,
    time::{sleep, Duration},
};
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const REOPEN_BACKOFF_MIN: Duration = Duration::from_millis(500);
const REOPEN_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Follow `path` forever, handing every complete line to `on_line`.
pub async fn follow<F>(path: PathBuf, cancel: CancellationToken, mut on_line: F)
where
    F: FnMut(&str),
{
    let mut backoff = REOPEN_BACKOFF_MIN;

    loop {
        if cancel.is_cancelled() {
            return;
        }

        match tail_file(&path, &cancel, &mut on_line).await {
            Ok(TailEnd::Cancelled) => return,
            Ok(TailEnd::Reopen) => {
                backoff = REOPEN_BACKOFF_MIN;
                info!("Tailer reloaded for {}", path.display());
            }
            Err(err) => {
                warn!("Failed to follow {}: {err:#}", path.display());
                tokio::select! {
                    _ = sleep(backoff) => {}
                    _ = cancel.cancelled() => return,
                }
                backoff = (backoff * 2).min(REOPEN_BACKOFF_MAX);
            }
        }
    }
}

enum TailEnd {
    Cancelled,
    Reopen,
}

async fn tail_file<F>(path: &Path, cancel: &CancellationToken, on_line: &mut F) -> Result<TailEnd>
where
    F: FnMut(&str),
{
    let mut file = fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    let opened_id = file_id(&file.metadata().await.context("failed to stat log file")?);

    let mut pos: u64 = 0;
    let mut pending = Vec::new();
    let mut chunk = vec![0u8; 8192];

    loop {
        loop {
            let n = file
                .read(&mut chunk)
                .await
                .context("failed to read log file")?;
            if n == 0 {
                break;
            }
            pos += n as u64;
            pending.extend_from_slice(&chunk[..n]);
            drain_lines(&mut pending, on_line);
        }

        tokio::select! {
            _ = sleep(POLL_INTERVAL) => {}
            _ = cancel.cancelled() => return Ok(TailEnd::Cancelled),
        }

        match fs::metadata(path).await {
            Ok(meta) => {
                if meta.len() < pos {
                    info!("Log {} truncated, reopening", path.display());
                    return Ok(TailEnd::Reopen);
                }
                if file_id(&meta) != opened_id {
                    info!("Log {} rotated, reopening", path.display());
                    return Ok(TailEnd::Reopen);
                }
            }
            Err(_) => {
                info!("Log {} vanished, reopening", path.display());
                return Ok(TailEnd::Reopen);
            }
        }
    }
}

/// Hand every complete line in `pending` to `on_line`, keeping any trailing
/// partial line buffered for the next read.
fn drain_lines<F>(pending: &mut Vec<u8>, on_line: &mut F)
where
    F: FnMut(&str),
{
    while let Some(newline) = pending.iter().position(|&b| b == b'\n') {
        let raw: Vec<u8> = pending.drain(..=newline).collect();
        let mut line = &raw[..raw.len() - 1];
        if line.ends_with(b"\r") {
            line = &line[..line.len() - 1];
        }
        on_line(&String::from_utf8_lossy(line));
    }
}

#[cfg(unix)]
fn file_id(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn file_id(_meta: &std::fs::Metadata) -> u64 {
    0
}
