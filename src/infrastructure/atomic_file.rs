//! Temp-write-fsync-rename durability primitive (spec §6). Every on-disk
//! document (`state/*.json`, per-type event journals) is written through
//! this helper so a crash mid-write never leaves a half-written file behind.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

/// Writes `content` to `path` by first writing to `path.tmp`, fsyncing the
/// file, then renaming over the destination. The rename is atomic on the
/// same filesystem; the prior fsync guarantees the temp file's bytes are
/// durable before it takes the destination's name.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent dir for {}", path.display()))?;
    }

    let tmp_path = path.with_extension(tmp_extension(path));
    {
        let mut file = std::fs::File::create(&tmp_path)
            .with_context(|| format!("failed to create temp file {}", tmp_path.display()))?;
        file.write_all(content)
            .with_context(|| format!("failed to write temp file {}", tmp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("failed to fsync temp file {}", tmp_path.display()))?;
    }

    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to rename {} into place", path.display()))?;
    Ok(())
}

/// Appends `line` (a single JSON line, newline added) to `path`, creating it
/// if absent. Event journals are append-only, so no temp-file dance is
/// needed here; the append itself is the durability boundary.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent dir for {}", path.display()))?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {} for append", path.display()))?;
    writeln!(file, "{}", line).with_context(|| format!("failed to append to {}", path.display()))?;
    file.sync_data()
        .with_context(|| format!("failed to fsync {}", path.display()))?;
    Ok(())
}

fn tmp_extension(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{ext}.tmp"),
        None => "tmp".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn write_atomic_roundtrips_and_leaves_no_tmp_file() {
        let dir = std::env::temp_dir().join(format!("hope-atomic-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("doc.json");
        write_atomic(&path, b"{\"a\":1}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":1}");
        assert!(!path.with_extension("json.tmp").exists());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn write_atomic_overwrites_existing_file() {
        let dir = std::env::temp_dir().join(format!("hope-atomic-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("doc.json");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn append_line_creates_file_and_accumulates() {
        let dir = std::env::temp_dir().join(format!("hope-atomic-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("journal.jsonl");
        append_line(&path, "{\"n\":1}").unwrap();
        append_line(&path, "{\"n\":2}").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        fs::remove_dir_all(&dir).ok();
    }
}
