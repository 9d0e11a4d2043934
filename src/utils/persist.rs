//! Artifact persistence
//!
//! Every artifact is written to a sibling temp file, synced, then renamed
//! over the destination so readers never observe a partial file.

use crate::error::{PhishGuardError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

fn temp_path_for(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| PhishGuardError::invalid_input(format!("not a file path: {}", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(format!(".tmp-{}", std::process::id()));
    Ok(path.with_file_name(tmp_name))
}

/// Write `path` atomically with the bytes produced by `write`
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = temp_path_for(path)?;

    let outcome = (|| -> Result<()> {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        write(&mut writer)?;
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|error| PhishGuardError::from(error.into_error()))?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = outcome {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    fs::rename(&tmp_path, path)?;
    debug!(path = %path.display(), "wrote artifact");
    Ok(())
}

/// Serialize `value` as pretty JSON at `path`
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    write_atomic(path, |writer| {
        serde_json::to_writer_pretty(&mut *writer, value)?;
        writer.write_all(b"\n")?;
        Ok(())
    })
}

/// Deserialize a JSON artifact
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Copy a file into place atomically
pub fn copy_atomic(src: &Path, dst: &Path) -> Result<()> {
    let bytes = fs::read(src)?;
    write_atomic(dst, |writer| {
        writer.write_all(&bytes)?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_save_and_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");

        let mut report = BTreeMap::new();
        report.insert("web_traffic".to_string(), 0.42);
        save_json(&path, &report).unwrap();

        let loaded: BTreeMap<String, f64> = load_json(&path).unwrap();
        assert_eq!(loaded, report);
    }

    #[test]
    fn test_failed_write_leaves_target_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, b"previous").unwrap();

        let result = write_atomic(&path, |_| Err(PhishGuardError::data("boom")));
        assert!(result.is_err());
        assert_eq!(fs::read(&path).unwrap(), b"previous");

        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1, "temp file should be cleaned up");
    }

    #[test]
    fn test_copy_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("train.csv");
        let dst = dir.path().join("valid").join("train.csv");
        fs::write(&src, b"a,b\n1,2\n").unwrap();

        copy_atomic(&src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"a,b\n1,2\n");
    }
}
