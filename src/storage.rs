//! Storage abstraction layer.
//!
//! Index artifacts are written through a pluggable [`Storage`] backend. Every
//! persisted artifact goes through [`write_atomically`], so readers never see
//! a half-written file.

pub mod file;
pub mod memory;
pub mod structured;
pub mod traits;

// Re-export commonly used types
pub use file::*;
pub use memory::*;
pub use structured::*;
pub use traits::*;

use crate::error::Result;

/// Write `name` by filling a temporary file and renaming it into place.
///
/// The temporary file is flushed and synced before the rename. If `write`
/// fails, the temporary file is removed and `name` is left untouched.
pub fn write_atomically<F>(storage: &dyn Storage, name: &str, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn StorageOutput) -> Result<()>,
{
    let (temp_name, mut output) = storage.create_temp_output(name)?;

    let written = write(output.as_mut()).and_then(|()| output.close());
    drop(output);

    if let Err(e) = written {
        if let Err(cleanup) = storage.delete_file(&temp_name) {
            log::warn!("Failed to remove temporary file {temp_name}: {cleanup}");
        }
        return Err(e);
    }

    if let Err(e) = storage.rename_file(&temp_name, name) {
        let _ = storage.delete_file(&temp_name);
        return Err(e);
    }
    storage.sync()
}

/// The file a temporary output was created for.
///
/// Temporary outputs are named `<name>.<id>.tmp`; returns `name`, or `None`
/// if `file_name` is not a temporary output.
pub fn temp_file_target(file_name: &str) -> Option<&str> {
    let (target, id) = file_name.strip_suffix(".tmp")?.rsplit_once('.')?;
    if target.is_empty() || id.is_empty() {
        return None;
    }
    Some(target)
}
