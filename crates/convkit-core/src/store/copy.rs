//! Recursive directory copy.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::IoResultExt;
use crate::{ConvkitError, Result};

/// Copy `src` into `dst`, creating `dst`. Symlinks are followed.
///
/// Returns the number of files copied.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<u64> {
    fs::create_dir_all(dst).with_path(dst)?;
    let mut files = 0u64;

    for entry in WalkDir::new(src).follow_links(true).min_depth(1) {
        let entry = entry.map_err(|e| {
            ConvkitError::Other(format!("walking {}: {}", src.display(), e))
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| ConvkitError::Other(e.to_string()))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).with_path(&target)?;
        } else {
            fs::copy(entry.path(), &target)
                .map_err(|e| ConvkitError::io("copying file", entry.path(), e))?;
            files += 1;
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_dir_all_preserves_tree() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("model.json"), b"{}").unwrap();
        fs::write(src.join("nested/shard.bin"), b"abc").unwrap();

        let dst = temp.path().join("dst");
        let copied = copy_dir_all(&src, &dst).unwrap();

        assert_eq!(copied, 2);
        assert_eq!(fs::read(dst.join("nested/shard.bin")).unwrap(), b"abc");
        assert!(src.join("model.json").exists());
    }
}
