use std::fs::{File as StdFile, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use scopeguard::guard;
use tokio::task;

use crate::models::RunReport;

/// Persist the run as one JSON document, written atomically (temp file plus
/// rename) so a crash mid-write never leaves a truncated report behind.
pub async fn persist_report(path: String, report: &RunReport, pretty: bool) -> Result<()> {
    let report = report.clone();
    task::spawn_blocking(move || -> Result<()> {
        let parent = match Path::new(&path).parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => Path::new(".").to_path_buf(),
        };
        std::fs::create_dir_all(&parent)?;

        let tmp_path = format!("{path}.tmp");
        let cleanup = guard(tmp_path.clone(), |p| {
            let _ = std::fs::remove_file(p);
        });
        {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            let mut writer = std::io::BufWriter::new(&file);
            if pretty {
                serde_json::to_writer_pretty(&mut writer, &report)?;
            } else {
                serde_json::to_writer(&mut writer, &report)?;
            }
            writer.write_all(b"\n")?;
            writer.flush()?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &path)?;
        scopeguard::ScopeGuard::into_inner(cleanup);
        if let Ok(dir) = StdFile::open(&parent) {
            let _ = dir.sync_all();
        }
        Ok(())
    })
    .await??;
    Ok(())
}
