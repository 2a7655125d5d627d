use crate::error::{Result, UpdaterError};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::{NamedTempFile, PathPersistError};

/// Replace `target` with `image`.
///
/// The new image is staged in the target's directory and renamed over it, so
/// a reader never sees a half-written file. A crash between staging and the
/// rename leaves the old executable in place and a stray temp file behind;
/// nothing is rolled back.
pub(crate) fn install_executable(image: &[u8], target: &Path) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| UpdaterError::Config("executable path must have a parent directory".into()))?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(image)?;
    temp.flush()?;
    temp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(target)
            .map(|meta| meta.permissions().mode())
            .unwrap_or(0o755);
        temp.as_file()
            .set_permissions(fs::Permissions::from_mode(mode))?;
    }

    let temp_path = temp.into_temp_path();

    #[cfg(not(unix))]
    {
        // A running executable cannot be overwritten on Windows, but it can be renamed.
        let aside = target.with_extension("old");
        if target.exists() {
            let _ = fs::remove_file(&aside);
            fs::rename(target, &aside)?;
        }
    }

    temp_path.persist(target).map_err(map_persist_error)?;
    Ok(())
}

fn map_persist_error(err: PathPersistError) -> UpdaterError {
    UpdaterError::Io(err.error)
}
