//! Writes rendered artifacts to disk

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

/// Write the helper script, creating its directory and marking it executable
pub async fn write_helper_script(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await?;
    }
    write_atomic(path, contents).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    }

    debug!(?path, "helper script written");
    Ok(())
}

/// Write the rendered descriptor to its unprivileged staging location
pub async fn stage_descriptor(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await?;
    }
    write_atomic(path, contents).await?;
    debug!(?path, "service descriptor staged");
    Ok(())
}

/// Remove a leftover artifact. Best effort: a missing file is fine and
/// any other failure is only logged.
pub async fn discard_artifact(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(?path, "leftover artifact removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(?e, ?path, "failed to remove leftover artifact"),
    }
}

/// Replace `path` so readers see either the old or the new contents
async fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let tmp = sibling_tmp(path)?;
    fs::write(&tmp, contents).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

fn sibling_tmp(path: &Path) -> io::Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "artifact path has no file name")
    })?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(name);
    tmp_name.push(".tmp");
    Ok(path.with_file_name(tmp_name))
}
