//! Per-step output caching
//!
//! Cached results are opaque JSON blobs keyed by step name under the
//! policy's cache directory, optionally disambiguated by a fingerprint of
//! the step's resolved inputs. Load failures fall back to recomputation;
//! save failures are fatal so silent cache corruption is never masked.

use crate::data::DataBundle;
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Caching policy for one step
#[derive(Debug, Clone, Default)]
pub struct CachePolicy {
    /// Persist the step's output after evaluation
    pub save_output: bool,
    /// Use a persisted output instead of invoking the transformer
    pub load_saved_output: bool,
    /// Directory holding this step's blobs
    pub cache_dirpath: PathBuf,
    /// Append a fingerprint of the resolved inputs to the blob name, so
    /// runs with different inputs don't read each other's entries
    pub fingerprint_inputs: bool,
}

impl CachePolicy {
    /// A policy that neither saves nor loads
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Whether evaluation needs a blob path at all
    pub fn is_active(&self) -> bool {
        self.save_output || self.load_saved_output
    }
}

/// Compute the blob path for a step under this policy
pub(crate) fn blob_path(
    policy: &CachePolicy,
    step_name: &str,
    inputs: &DataBundle,
) -> Result<PathBuf> {
    let stem = if policy.fingerprint_inputs {
        format!("{step_name}-{}", fingerprint(inputs)?)
    } else {
        step_name.to_string()
    };
    Ok(policy.cache_dirpath.join(format!("{stem}.json")))
}

/// Content fingerprint of a resolved input bundle: sha256 over the
/// canonical JSON encoding, truncated to 16 hex chars
pub(crate) fn fingerprint(inputs: &DataBundle) -> Result<String> {
    // serde_json::Value objects sort keys, giving a canonical encoding
    let canonical = serde_json::to_value(inputs)?;
    let bytes = serde_json::to_vec(&canonical)?;
    let digest = Sha256::digest(&bytes);
    let mut hexed = hex::encode(digest);
    hexed.truncate(16);
    Ok(hexed)
}

/// Try to load a persisted output bundle; any failure logs a warning and
/// returns `None` so the caller recomputes
pub(crate) fn load_blob(path: &Path, step_name: &str) -> Option<DataBundle> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(step = %step_name, path = %path.display(), error = %e,
                  "cache read failed, recomputing");
            return None;
        }
    };
    match serde_json::from_reader(BufReader::new(file)) {
        Ok(bundle) => Some(bundle),
        Err(e) => {
            warn!(step = %step_name, path = %path.display(), error = %e,
                  "cache blob malformed, recomputing");
            None
        }
    }
}

/// Persist an output bundle, flushing and closing the handle on all paths
pub(crate) fn save_blob(path: &Path, step_name: &str, outputs: &DataBundle) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| {
            Error::CacheIo(format!(
                "step '{step_name}': cannot create cache dir {}: {e}",
                dir.display()
            ))
        })?;
    }
    let file = File::create(path).map_err(|e| {
        Error::CacheIo(format!(
            "step '{step_name}': cannot create cache blob {}: {e}",
            path.display()
        ))
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, outputs).map_err(|e| {
        Error::CacheIo(format!(
            "step '{step_name}': cannot serialize cache blob {}: {e}",
            path.display()
        ))
    })?;
    writer.flush().map_err(|e| {
        Error::CacheIo(format!(
            "step '{step_name}': cannot flush cache blob {}: {e}",
            path.display()
        ))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StepData;

    fn bundle() -> DataBundle {
        let mut b = DataBundle::new();
        b.insert("y_pred".into(), StepData::Flag(true));
        b.insert("sizes".into(), StepData::Sizes(vec![(4, 4)]));
        b
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.json");
        save_blob(&path, "output", &bundle()).unwrap();
        let loaded = load_blob(&path, "output").unwrap();
        assert_eq!(loaded, bundle());
    }

    #[test]
    fn missing_blob_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_blob(&dir.path().join("absent.json"), "s").is_none());
    }

    #[test]
    fn malformed_blob_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(load_blob(&path, "s").is_none());
    }

    #[test]
    fn fingerprint_is_stable_and_input_sensitive() {
        let a = fingerprint(&bundle()).unwrap();
        let b = fingerprint(&bundle()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);

        let mut other = bundle();
        other.insert("extra".into(), StepData::Flag(false));
        assert_ne!(a, fingerprint(&other).unwrap());
    }

    #[test]
    fn blob_path_appends_fingerprint_when_enabled() {
        let policy = CachePolicy {
            save_output: true,
            load_saved_output: true,
            cache_dirpath: PathBuf::from("/tmp/cache"),
            fingerprint_inputs: true,
        };
        let path = blob_path(&policy, "unet", &bundle()).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("unet-"));
        assert!(name.ends_with(".json"));
    }

    #[test]
    fn save_into_unwritable_dir_is_fatal() {
        let path = Path::new("/proc/segpipe-definitely-unwritable/blob.json");
        let err = save_blob(path, "s", &bundle()).unwrap_err();
        assert!(matches!(err, Error::CacheIo(_)));
    }
}
