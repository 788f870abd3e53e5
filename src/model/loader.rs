use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::merge::merge_all;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read model file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML in '{path}': {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no model files given")]
    Empty,
}

/// Read one fragment. `.yaml`/`.yml` files parse as YAML, everything else as JSON.
pub fn load_fragment(path: &Path) -> Result<Value, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    );

    if is_yaml {
        serde_yaml::from_str(&text).map_err(|source| LoadError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    } else {
        serde_json::from_str(&text).map_err(|source| LoadError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Read and merge fragments in the given order
pub fn load_model<P: AsRef<Path>>(paths: &[P]) -> Result<Value, LoadError> {
    if paths.is_empty() {
        return Err(LoadError::Empty);
    }

    let fragments = paths
        .iter()
        .map(|path| {
            let fragment = load_fragment(path.as_ref())?;
            tracing::debug!("Loaded model fragment {}", path.as_ref().display());
            Ok(fragment)
        })
        .collect::<Result<Vec<_>, LoadError>>()?;

    Ok(merge_all(fragments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fragments_merge_in_order() {
        let dir = std::env::temp_dir().join(format!("arbor-loader-{}", uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&dir).unwrap();
        let first = dir.join("base.json");
        let second = dir.join("extra.yaml");
        std::fs::write(&first, r#"{"/todos": {"handlers": {"GET": ["readMany"]}, "collection": "todos"}}"#).unwrap();
        std::fs::write(&second, "/todos:\n  handlers:\n    GET: audit\n  collection: notes\n").unwrap();

        let model = load_model(&[first, second]).unwrap();
        assert_eq!(
            model,
            json!({"/todos": {"handlers": {"GET": ["readMany", "audit"]}, "collection": "notes"}})
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn empty_path_list_is_an_error() {
        let paths: [&str; 0] = [];
        assert!(matches!(load_model(&paths), Err(LoadError::Empty)));
    }
}
