//! Output commit primitives
//!
//! The output directory is owned by an [`OutputDir`] guard from the moment
//! it is created: if the run fails, dropping the guard deletes it. Archive
//! mode writes the zip to `{output}.tmp` (also guarded), removes the
//! staging directory, then renames the archive onto the output path.

use crate::Result;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A freshly created output directory, removed on drop unless committed
#[derive(Debug)]
pub struct OutputDir {
    path: PathBuf,
    armed: bool,
}

impl OutputDir {
    /// Creates the directory (private to the current user)
    ///
    /// Fails if it already exists, so a pre-existing directory is never
    /// adopted and later deleted.
    pub fn create(path: &Path) -> Result<Self> {
        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            armed: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keeps the directory and hands back its path
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    /// Deletes the directory now, reporting failures
    pub fn remove(mut self) -> Result<()> {
        fs::remove_dir_all(&self.path)?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for OutputDir {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("Removing partial output {}", self.path.display());
            if let Err(e) = fs::remove_dir_all(&self.path) {
                tracing::warn!("Failed to remove {}: {}", self.path.display(), e);
            }
        }
    }
}

/// A temporary file removed on drop unless persisted
struct TempPath {
    path: PathBuf,
    armed: bool,
}

impl TempPath {
    fn persist(mut self, to: &Path) -> io::Result<()> {
        fs::rename(&self.path, to)?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for TempPath {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Flushes directory entry metadata to disk
///
/// Closing a file does not make its directory entry durable; the archive
/// step must see final sizes.
pub fn sync_dir(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        File::open(path)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Makes a directory readable by everyone
pub fn make_readable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Zips the contents of `source` into `dest`
///
/// Files whose names end in one of `stored_suffixes` are stored
/// uncompressed; everything else is deflated. Returns the archive size.
pub fn create_archive(source: &Path, dest: &Path, stored_suffixes: &[&str]) -> Result<u64> {
    let file = File::create(dest)?;
    let mut writer = ZipWriter::new(file);
    let deflated = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);
    let stored = FileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .unix_permissions(0o644);

    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            writer.add_directory(name, deflated)?;
            continue;
        }

        let options = if stored_suffixes.iter().any(|s| name.ends_with(s)) {
            stored
        } else {
            deflated
        };
        writer.start_file(name, options)?;
        let mut input = File::open(entry.path())?;
        io::copy(&mut input, &mut writer)?;
    }

    let file = writer.finish()?;
    file.sync_all()?;
    Ok(file.metadata()?.len())
}

/// Archives the output directory and moves the archive into its place
///
/// Returns the archive size in bytes.
pub fn commit_archive(dir: OutputDir, store_db_uncompressed: bool) -> Result<u64> {
    let target = dir.path().to_path_buf();
    let mut tmp_name = target.clone().into_os_string();
    tmp_name.push(".tmp");
    let tmp = TempPath {
        path: PathBuf::from(tmp_name),
        armed: true,
    };

    let stored: &[&str] = if store_db_uncompressed { &[".db"] } else { &[] };
    let size = create_archive(dir.path(), &tmp.path, stored)?;

    dir.remove()?;
    tmp.persist(&target)?;
    Ok(size)
}
