//! Bounded-concurrency catalog loading for async callers.

use camino::{Utf8Path, Utf8PathBuf};
use futures::stream::{self, StreamExt};
use resource_manager_schema::Resource;

use super::{CatalogLoader, LoadError};
use crate::config::Config;
use crate::security;

const MIN_PARALLELISM: usize = 4;

/// Parse up to `count` resources from `loader`'s catalog tree using at
/// least [`MIN_PARALLELISM`] concurrent file reads. A slow or hanging parse
/// of one file cannot block the others past its own parse timeout, because
/// each parse runs in its own blocking task.
pub async fn load_resources_async(loader: &CatalogLoader, count: usize) -> Result<Vec<Resource>, LoadError> {
    let mut paths: Vec<Utf8PathBuf> = Vec::new();
    'outer: for (_type_, dir) in loader.type_directories() {
        for entry in walkdir::WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| LoadError::Io {
                path: dir.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?;
            let path = match Utf8PathBuf::try_from(entry.into_path()) {
                Ok(p) => p,
                Err(_) => continue,
            };
            if path.extension() != Some("yaml") {
                continue;
            }
            paths.push(path);
            if paths.len() >= count {
                break 'outer;
            }
        }
    }

    let config = loader.config().clone();
    let results: Vec<Result<Resource, LoadError>> = stream::iter(paths.into_iter().map(|path| {
        let config = config.clone();
        async move { parse_one_blocking(path, config).await }
    }))
    .buffer_unordered(MIN_PARALLELISM)
    .collect()
    .await;

    results.into_iter().collect()
}

async fn parse_one_blocking(path: Utf8PathBuf, config: Config) -> Result<Resource, LoadError> {
    tokio::task::spawn_blocking(move || parse_one(&path, &config))
        .await
        .map_err(|join_err| LoadError::Io {
            path: Utf8PathBuf::new(),
            source: std::io::Error::new(std::io::ErrorKind::Other, join_err),
        })?
}

fn parse_one(path: &Utf8Path, config: &Config) -> Result<Resource, LoadError> {
    let value = security::parse_document_safe(path, config)?;
    let resource: Resource = serde_yml::from_value(value).map_err(|source| LoadError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    resource
        .validate()
        .map_err(|source| LoadError::Validation {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogLoader;
    use tempfile::TempDir;

    fn write_resource(dir: &Utf8Path, id: &str) {
        let sub = dir.join("agents");
        std::fs::create_dir_all(&sub).unwrap();
        let body = format!(
            "id: {id}\ntype: agent\nname: {id}\ndescription: d\nsummary: s\nversion: \"1.0.0\"\nfile_type: .md\nsource:\n  repo: r\n  path: p\n  url: https://raw.githubusercontent.com/a/b/{id}.md\ninstall_path: agents/{id}.md\n"
        );
        std::fs::write(sub.join(format!("{id}.yaml")), body).unwrap();
    }

    #[tokio::test]
    async fn loads_up_to_count_resources_concurrently() {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        for id in ["a", "b", "c"] {
            write_resource(&root, id);
        }
        let loader = CatalogLoader::new(root, Config::default());
        let resources = load_resources_async(&loader, 2).await.unwrap();
        assert_eq!(resources.len(), 2);
    }
}
