use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::warn;

use super::request::ReceivedFile;

/// Reduce a file name to its last path component, accepting either separator.
///
/// Returns `None` for names with nothing usable left (`""`, `"."`, `".."`, `"dir/"`).
pub fn sanitize_file_name(file_name: &str) -> Option<String> {
    let last = file_name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    match last {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

/// Create a new file with secure permissions (0o600 on Unix)
pub async fn open_secure_file(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    options.open(path).await
}

/// Write a received file into `dir` under its sanitised name.
///
/// Existing files are never overwritten: `report.txt` becomes
/// `report (1).txt`, `report (2).txt`, ...
pub async fn save_received_file(dir: &Path, file: &ReceivedFile) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let name = sanitize_file_name(&file.file_name).unwrap_or_else(|| "unknown_file".to_string());

    let mut candidate = dir.join(&name);
    let mut n = 0u32;
    loop {
        match open_secure_file(&candidate).await {
            Ok(out) => {
                write_or_remove(out, &candidate, &file.payload).await?;
                return Ok(candidate);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                n += 1;
                candidate = dir.join(numbered_name(&name, n));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Write `payload` through `out`, deleting `path` if the write fails part way.
async fn write_or_remove<W>(mut out: W, path: &Path, payload: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        out.write_all(payload).await?;
        out.flush().await
    }
    .await;

    if let Err(e) = written {
        drop(out);
        if let Err(remove) = tokio::fs::remove_file(path).await {
            warn!("Could not remove partial file {}: {}", path.display(), remove);
        }
        return Err(e);
    }
    Ok(())
}

fn numbered_name(name: &str, n: u32) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, n, ext),
        _ => format!("{} ({})", name, n),
    }
}

/// Format transfer speed from bytes and elapsed time
pub fn format_transfer_speed(bytes_transferred: u64, elapsed_secs: f64) -> String {
    if elapsed_secs <= 0.0 {
        return "Starting...".to_string();
    }

    let speed_bps = bytes_transferred as f64 / elapsed_secs;
    if speed_bps > 1_000_000.0 {
        format!("{:.2} MB/s", speed_bps / 1_000_000.0)
    } else if speed_bps > 1_000.0 {
        format!("{:.1} KB/s", speed_bps / 1_000.0)
    } else {
        format!("{:.0} B/s", speed_bps)
    }
}
