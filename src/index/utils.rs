use crate::error::Result;
use std::path::Path;

/// Copy a generation directory, skipping hidden entries (tantivy lock files
/// are dot-prefixed and must not travel to the new generation).
pub fn copy_generation_dir(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;

    let entries: Vec<_> = std::fs::read_dir(src)?.collect::<std::result::Result<Vec<_>, _>>()?;

    for entry in entries {
        let path = entry.path();
        let file_name = entry.file_name();
        let file_name_str = file_name.to_string_lossy();

        if file_name_str.starts_with('.') {
            continue;
        }

        let dest_path = dst.join(file_name);

        if path.is_dir() {
            copy_generation_dir(&path, &dest_path)?;
        } else {
            if !path.exists() {
                continue;
            }
            std::fs::copy(&path, &dest_path)?;
        }
    }

    Ok(())
}
