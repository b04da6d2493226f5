//! Zip packing of a downloaded image folder

use std::path::{Path, PathBuf};

use async_zip::{Compression, ZipEntryBuilder, tokio::write::ZipFileWriter};
use tokio::fs::File;
use tracing::{debug, info};

use super::Result;

/// Files under `source`, sorted, with their archive names (`/`-separated)
fn collect_files(source: &Path) -> Vec<(PathBuf, String)> {
    jwalk::WalkDir::new(source)
        .sort(true)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let path = entry.path();
            let name = path
                .strip_prefix(source)
                .ok()?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            Some((path, name))
        })
        .collect()
}

/// Pack every file under `source` into a new zip at `destination`.
/// Returns the number of entries written.
pub async fn zip_directory(source: &Path, destination: &Path) -> Result<usize> {
    info!(source = ?source, archive = ?destination, "Creating zip archive");
    let files = collect_files(source);

    let mut writer = ZipFileWriter::with_tokio(File::create(destination).await?);
    for (path, name) in &files {
        let data = tokio::fs::read(path).await?;
        let entry = ZipEntryBuilder::new(name.clone().into(), Compression::Deflate);
        writer.write_entry_whole(entry, &data).await?;
        debug!(entry = %name, bytes = data.len(), "Added file to archive");
    }
    writer.close().await?;

    Ok(files.len())
}
