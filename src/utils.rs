use std::fs::{self, DirBuilder};
use std::path::Path;

use crate::error::Result;

/// Creates a directory if it doesn't exist
pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    DirBuilder::new().recursive(true).create(path)?;
    Ok(())
}

/// True when `path` is an existing directory holding at least one entry.
pub fn dir_has_entries(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    if !path.is_dir() {
        return Ok(false);
    }
    Ok(fs::read_dir(path)?.next().is_some())
}

/// First `max_chars` characters of `text`, with an ellipsis when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_ensure_dir_is_recursive() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let nested = dir.path().join("a").join("b");
        ensure_dir(&nested)?;
        ensure_dir(&nested)?;
        assert!(nested.is_dir());
        Ok(())
    }

    #[test]
    fn test_dir_has_entries() -> anyhow::Result<()> {
        let dir = tempdir()?;
        assert!(!dir_has_entries(dir.path().join("missing"))?);
        assert!(!dir_has_entries(dir.path())?);

        File::create(dir.path().join("vectorstore.json"))?;
        assert!(dir_has_entries(dir.path())?);
        Ok(())
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("dormir bien", 6), "dormir...");
        assert_eq!(preview("ñandú", 2), "ña...");
    }
}
