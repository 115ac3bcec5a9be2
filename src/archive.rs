use crate::error::{AppError, Result};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

/// Unpacks a `.tar.gz` archive into `target_dir`, returning the relative paths of the
/// regular files it contained. Entries that would land outside `target_dir` are rejected.
pub fn unpack_tar_gz(archive: &Path, target_dir: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(archive)?;
    let mut tar = Archive::new(GzDecoder::new(file));
    tar.set_overwrite(false);

    let entries = tar
        .entries()
        .map_err(|e| AppError::Archive(format!("Invalid tar.gz archive: {}", e)))?;

    let mut files = Vec::new();
    for entry in entries {
        let mut entry =
            entry.map_err(|e| AppError::Archive(format!("Failed to read archive: {}", e)))?;
        let relative = entry
            .path()
            .map_err(|e| AppError::Archive(format!("Invalid file path in archive: {}", e)))?
            .into_owned();
        let is_file = entry.header().entry_type().is_file();

        let unpacked = entry.unpack_in(target_dir).map_err(|e| {
            AppError::Archive(format!(
                "Failed to unpack {}: {}",
                relative.display(),
                e
            ))
        })?;
        if !unpacked {
            return Err(AppError::Archive(format!(
                "Archive entry escapes the target directory: {}",
                relative.display()
            )));
        }
        if is_file {
            files.push(relative);
        }
    }

    Ok(files)
}

/// Packs the given files and directories into a new `.tar.gz` at `target`, each stored under
/// its own file name.
pub fn pack_tar_gz(inputs: &[PathBuf], target: &Path) -> Result<()> {
    let file = File::create_new(target).map_err(|e| match e.kind() {
        io::ErrorKind::AlreadyExists => {
            AppError::Archive(format!("Archive target already exists: {}", target.display()))
        }
        _ => AppError::Io(e),
    })?;
    let mut tar = Builder::new(GzEncoder::new(file, Compression::default()));

    for input in inputs {
        let name = input.file_name().ok_or_else(|| {
            AppError::Archive(format!("Cannot archive path without a name: {}", input.display()))
        })?;
        if input.is_dir() {
            tar.append_dir_all(name, input)?;
        } else {
            tar.append_path_with_name(input, name)?;
        }
    }

    tar.finish()?;
    let encoder = tar.into_inner()?;
    encoder.finish()?;
    Ok(())
}

/// Unpacks a zip archive into `target_dir`.
pub fn unpack_zip(archive: &Path, target_dir: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| AppError::Archive(format!("Invalid zip archive: {}", e)))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| AppError::Archive(format!("Failed to read archive: {}", e)))?;

        let Some(relative_path) = file.enclosed_name() else {
            return Err(AppError::Archive(format!(
                "Invalid file path in archive: {}",
                file.name()
            )));
        };

        let out_path = target_dir.join(relative_path);
        if file.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut outfile = File::create(&out_path)?;
        io::copy(&mut file, &mut outfile)?;
    }

    Ok(())
}
