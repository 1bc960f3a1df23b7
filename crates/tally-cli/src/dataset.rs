//! Dataset files: one JSON document holding the stored key hierarchy and
//! the records, replaced atomically on every write.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tally_core::crypto::PassphraseResolver;
use tally_core::{KeyHierarchy, ListStyle, NeverCancel, Record, StoredHierarchy, VersionedList};

use crate::errors::CliError;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetFile {
    pub format: u32,
    pub hierarchy: StoredHierarchy,
    #[serde(default)]
    pub records: Vec<Record>,
}

impl DatasetFile {
    pub fn new(hierarchy: StoredHierarchy) -> Self {
        Self {
            format: FORMAT_VERSION,
            hierarchy,
            records: Vec::new(),
        }
    }
}

pub fn read(path: &Path) -> anyhow::Result<DatasetFile> {
    if !path.exists() {
        return Err(CliError::not_found(
            format!("No dataset found at {}", path.display()),
            "Hint: Run `tally init <DATASET>` to create one.",
        )
        .into());
    }
    let contents = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let file: DatasetFile = serde_json::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Corrupt dataset {}: {}", path.display(), e))?;
    if file.format != FORMAT_VERSION {
        return Err(anyhow::anyhow!(
            "Unsupported dataset format {} in {} (expected {})",
            file.format,
            path.display(),
            FORMAT_VERSION
        ));
    }
    Ok(file)
}

/// Write `file` to a sibling temp file, then rename it over `path`.
pub fn write(path: &Path, file: &DatasetFile) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(file)?;
    let temp = temp_path(path);
    {
        let mut out = File::create(&temp)
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {}", temp.display(), e))?;
        out.write_all(&json)?;
        out.sync_all()?;
    }
    rename_with_fallback(&temp, path)?;
    tracing::debug!(path = %path.display(), records = file.records.len(), "dataset written");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

/// Rename, removing the destination and retrying where rename refuses to
/// replace an existing file. The temp file is removed if both attempts fail.
fn rename_with_fallback(temp_path: &Path, destination: &Path) -> io::Result<()> {
    if let Err(initial_err) = fs::rename(temp_path, destination) {
        let _ = fs::remove_file(destination);
        fs::rename(temp_path, destination).map_err(|retry_err| {
            let _ = fs::remove_file(temp_path);
            io::Error::new(
                retry_err.kind(),
                format!(
                    "Atomic rename failed (initial: {}, retry: {})",
                    initial_err, retry_err
                ),
            )
        })?;
    }
    Ok(())
}

/// Unlock the dataset's key hierarchy.
pub fn unlock(file: &DatasetFile, resolver: &mut dyn PassphraseResolver) -> anyhow::Result<KeyHierarchy> {
    Ok(KeyHierarchy::resolve(&file.hierarchy, resolver)?)
}

/// Load the records into a core list. Any rejected record aborts the command.
pub fn load_list(file: &DatasetFile, hierarchy: &KeyHierarchy) -> anyhow::Result<VersionedList> {
    let mut list = VersionedList::new(ListStyle::Core);
    let report = list.load(file.records.iter().cloned(), Some(hierarchy.cipher_set()), &NeverCancel)?;
    if let Some(failure) = report.errors.first() {
        let id = failure
            .id
            .map(|id| format!("record {}", id))
            .unwrap_or_else(|| "a record".to_string());
        return Err(anyhow::anyhow!(
            "Dataset has {} unreadable record(s); first: {}: {}",
            report.errors.len(),
            id,
            failure.error
        ));
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{FieldId, ItemId, KdfParams, KeyConfig, Value};
    use tempfile::tempdir;

    fn hierarchy() -> KeyHierarchy {
        let config = KeyConfig::default().with_kdf(KdfParams::insecure_fast());
        KeyHierarchy::create("correct horse", &config).unwrap()
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("books.tally");
        let keys = hierarchy();
        let mut file = DatasetFile::new(keys.to_stored());
        file.records
            .push(Record::new(ItemId::new(1)).with_plain(FieldId::new(1), Value::Integer(5)));

        write(&path, &file).unwrap();
        assert!(!temp_path(&path).exists());

        let read_back = read(&path).unwrap();
        assert_eq!(read_back.hierarchy, keys.to_stored());
        assert_eq!(read_back.records, file.records);
    }

    #[test]
    fn test_write_replaces_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("books.tally");
        let mut file = DatasetFile::new(hierarchy().to_stored());
        write(&path, &file).unwrap();

        file.records.push(Record::new(ItemId::new(2)));
        write(&path, &file).unwrap();
        assert_eq!(read(&path).unwrap().records.len(), 1);
    }

    #[test]
    fn test_missing_dataset_is_not_found() {
        let dir = tempdir().unwrap();
        let err = read(&dir.path().join("absent.tally")).unwrap_err();
        let cli = err.downcast_ref::<CliError>().expect("typed error");
        assert_eq!(cli.exit_code(), crate::constants::exit_codes::NOT_FOUND);
    }

    #[test]
    fn test_unknown_format_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("books.tally");
        let mut file = DatasetFile::new(hierarchy().to_stored());
        file.format = 99;
        write(&path, &file).unwrap();
        assert!(read(&path).unwrap_err().to_string().contains("Unsupported dataset format"));
    }

    #[test]
    fn test_load_list_rejects_bad_records() {
        let keys = hierarchy();
        let mut file = DatasetFile::new(keys.to_stored());
        file.records.push(Record::new(ItemId::new(1)));
        file.records.push(Record::new(ItemId::new(1)));
        let err = load_list(&file, &keys).unwrap_err();
        assert!(err.to_string().contains("1 unreadable record"));
    }
}
