//! JSON output of broadcasts.
//!
//! Timestamps keep the station's offset, optional fields are omitted when
//! unset. The local start time decides the archive directory, so a broadcast
//! at 00:12 lands in the folder of the calendar day it airs on.

use crate::models::Broadcast;
use crate::utils::file_name_for_title;
use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info, instrument};

/// Path of a broadcast inside the archive rooted at `dir`:
/// `{dir}/stations/{id}/{YYYY}/{MM}/{DD}/{HHMM} {title}.json`.
pub fn archive_path(dir: &Path, bc: &Broadcast) -> PathBuf {
    dir.join("stations")
        .join(file_name_for_title(&bc.station.identifier))
        .join(bc.time.format("%Y").to_string())
        .join(bc.time.format("%m").to_string())
        .join(bc.time.format("%d").to_string())
        .join(format!("{} {}.json", bc.time.format("%H%M"), file_name_for_title(&bc.title)))
}

/// Write each broadcast to its archive file, replacing earlier versions.
///
/// # Arguments
///
/// * `broadcasts` - Broadcasts to write
/// * `json_output_dir` - Root of the archive
///
/// # Returns
///
/// The number of files written, or the first I/O or serialization error.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir, count = broadcasts.len()))]
pub async fn write_broadcasts(broadcasts: &[Broadcast], json_output_dir: &str) -> Result<usize, Box<dyn Error>> {
    let root = Path::new(json_output_dir);
    for bc in broadcasts {
        let path = archive_path(root, bc);
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                error!(dir = %parent.display(), error = %e, "Failed to create archive dir");
                return Err(e.into());
            }
        }
        let json = serde_json::to_string_pretty(bc)?;
        fs::write(&path, json).await?;
        debug!(path = %path.display(), "Wrote broadcast");
    }
    info!("Wrote broadcast archive files");
    Ok(broadcasts.len())
}

/// Print broadcasts as JSON lines.
pub fn print_broadcasts<W: Write>(broadcasts: &[Broadcast], mut out: W) -> Result<(), Box<dyn Error>> {
    for bc in broadcasts {
        serde_json::to_writer(&mut out, bc)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}
