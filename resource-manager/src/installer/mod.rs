//! Downloads and writes catalog resources to disk. Every operation is
//! individually idempotent: a repeated `install` of an already-present file
//! is a no-op unless `force` is set, and a batch can always be re-run after
//! a partial failure.

mod net;

pub use net::{Downloader, HttpDownloader};

use std::collections::HashMap;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use resource_manager_schema::{Dependency, Resource, ResourceType, Source};
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::resolver::DependencyResolver;
use crate::security;
use tracing::{error, info, instrument, warn};

/// The category of failure carried by an [`InstallResult`], when `success`
/// is `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallErrorKind {
    /// The URL or install path failed a security check.
    Security,
    /// The download could not be completed after retries.
    Download,
    /// The downloaded content's hash didn't match `source.sha256`.
    Integrity,
    /// Writing the file to disk failed for a reason other than running out
    /// of space.
    Io,
    /// Writing the file to disk failed because the filesystem is full.
    DiskFull,
    /// A dependency-graph problem (cycle, missing id) aborted the batch.
    Dependency,
}

/// The outcome of installing one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallResult {
    /// The resource id this result is for (or `"batch"` for a whole-batch
    /// failure, e.g. a detected cycle).
    pub id: String,
    /// Whether the file is present and correct on disk after this call.
    pub success: bool,
    /// Whether an existing file was left untouched rather than overwritten.
    pub skipped: bool,
    /// The on-disk path, when known.
    pub path: Option<Utf8PathBuf>,
    /// The failure category, when `success` is `false`.
    pub error: Option<InstallErrorKind>,
    /// A human-readable detail message, when `success` is `false`.
    pub message: Option<String>,
}

impl InstallResult {
    fn ok(id: String, skipped: bool, path: Utf8PathBuf) -> Self {
        InstallResult {
            id,
            success: true,
            skipped,
            path: Some(path),
            error: None,
            message: None,
        }
    }

    fn failure(id: String, error: InstallErrorKind, message: impl Into<String>) -> Self {
        InstallResult {
            id,
            success: false,
            skipped: false,
            path: None,
            error: Some(error),
            message: Some(message.into()),
        }
    }
}

/// Totals over a batch of installs.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    /// Every individual result, in the same order the batch was run.
    pub results: Vec<InstallResult>,
    /// `results.len()`.
    pub total: usize,
    /// Count with `success && !skipped`.
    pub succeeded: usize,
    /// Count with `!success`.
    pub failed: usize,
    /// Count with `success && skipped`.
    pub skipped: usize,
    /// Wall-clock time for the whole batch.
    pub duration: Duration,
}

/// A progress callback: `(stage_name, fraction_complete)`. Best-effort --
/// nothing in the installer depends on it being called or succeeding.
pub type Progress<'a> = dyn Fn(&str, f64) + Send + Sync + 'a;

fn notify(progress: Option<&Progress<'_>>, stage: &str, fraction: f64) {
    if let Some(cb) = progress {
        cb(stage, fraction);
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Downloads and writes resources under `base_dir`, using `D` to fetch
/// content (swap in a fake in tests to avoid real network calls).
pub struct AsyncInstaller<D: Downloader = HttpDownloader> {
    downloader: D,
    base_dir: Utf8PathBuf,
    config: Config,
}

impl AsyncInstaller<HttpDownloader> {
    /// An installer backed by a real HTTPS client.
    pub fn new(base_dir: impl Into<Utf8PathBuf>, config: Config) -> Self {
        AsyncInstaller::with_downloader(base_dir, config, HttpDownloader::new())
    }
}

impl<D: Downloader> AsyncInstaller<D> {
    /// An installer backed by an arbitrary [`Downloader`].
    pub fn with_downloader(base_dir: impl Into<Utf8PathBuf>, config: Config, downloader: D) -> Self {
        AsyncInstaller {
            downloader,
            base_dir: base_dir.into(),
            config,
        }
    }

    /// Install a single resource: resolve URL and path, skip if already
    /// present (unless `force`), download with retry, verify if a hash was
    /// declared, then write atomically.
    #[instrument(skip(self, progress), fields(id = %resource.id, force))]
    pub async fn install(&self, resource: &Resource, force: bool, progress: Option<&Progress<'_>>) -> InstallResult {
        notify(progress, "Starting", 0.0);

        let url = match self.resolve_url(resource) {
            Ok(url) => url,
            Err(message) => {
                error!(id = %resource.id, %message, "install rejected by security check");
                return InstallResult::failure(resource.id.clone(), InstallErrorKind::Security, message);
            }
        };
        let install_path = match self.resolve_install_path(resource) {
            Ok(path) => path,
            Err(message) => {
                error!(id = %resource.id, %message, "install rejected by security check");
                return InstallResult::failure(resource.id.clone(), InstallErrorKind::Security, message);
            }
        };

        if !force && install_path.exists() {
            return InstallResult::ok(resource.id.clone(), true, install_path);
        }

        notify(progress, "Downloading", 0.3);
        let bytes = match self.download_with_retry(&url).await {
            Ok(bytes) => bytes,
            Err(message) => {
                error!(id = %resource.id, %url, %message, "download failed after all retries");
                return InstallResult::failure(resource.id.clone(), InstallErrorKind::Download, message);
            }
        };

        notify(progress, "Verifying", 0.7);
        if let Some(expected) = &resource.source.sha256 {
            let actual = sha256_hex(&bytes);
            if &actual != expected {
                error!(id = %resource.id, expected, actual, "sha256 mismatch");
                return InstallResult::failure(
                    resource.id.clone(),
                    InstallErrorKind::Integrity,
                    format!("sha256 mismatch: expected {expected}, got {actual}"),
                );
            }
        }

        notify(progress, "Writing", 0.9);
        if let Err(err) = atomic_write(&install_path, &bytes) {
            let kind = if is_disk_full(&err) {
                InstallErrorKind::DiskFull
            } else {
                InstallErrorKind::Io
            };
            error!(id = %resource.id, path = %install_path, %err, ?kind, "write failed");
            return InstallResult::failure(resource.id.clone(), kind, err.to_string());
        }

        info!(id = %resource.id, path = %install_path, "installed");
        notify(progress, "Complete", 1.0);
        InstallResult::ok(resource.id.clone(), false, install_path)
    }

    fn resolve_url(&self, resource: &Resource) -> Result<String, String> {
        if !resource.source.url.is_empty() {
            return security::validate_download_url(&resource.source.url, &self.config).map_err(|e| e.to_string());
        }
        let host = self
            .config
            .allowed_domains
            .first()
            .ok_or_else(|| "no allowed domain configured to synthesize a download URL".to_owned())?;
        let synthesized = format!(
            "https://{host}/{plural}/{id}.md",
            plural = resource.type_.plural(),
            id = resource.id
        );
        security::validate_download_url(&synthesized, &self.config).map_err(|e| e.to_string())
    }

    fn resolve_install_path(&self, resource: &Resource) -> Result<Utf8PathBuf, String> {
        let stripped = resource
            .install_path
            .strip_prefix("~/.claude/")
            .or_else(|| resource.install_path.strip_prefix('~'))
            .unwrap_or(&resource.install_path);
        let stripped = stripped.trim_start_matches('/');
        security::validate_install_path(stripped, &self.base_dir).map_err(|e| e.to_string())
    }

    async fn download_with_retry(&self, url: &str) -> Result<Vec<u8>, String> {
        let max_attempts = self.config.max_retries.max(1);
        let mut last_error = String::new();
        for attempt in 0..max_attempts {
            match self.downloader.download(url, self.config.download_timeout).await {
                Ok(bytes) => return Ok(bytes),
                Err(message) => {
                    last_error = message;
                    if attempt + 1 < max_attempts {
                        let backoff = Duration::from_secs(2_u64.saturating_pow(attempt));
                        warn!(%url, attempt, %last_error, backoff_secs = backoff.as_secs(), "download attempt failed, retrying");
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }
        Err(last_error)
    }

    /// Install `resource`'s required dependencies (recursively, in
    /// declaration order) before installing `resource` itself. A dependency
    /// absent from `registry` is installed from a minimal record (id, the
    /// parent's type, no further dependencies) since its URL and install
    /// path are derivable from id and type alone.
    pub async fn install_with_dependencies(
        &self,
        resource: &Resource,
        registry: &HashMap<String, Resource>,
        force: bool,
        progress: Option<&Progress<'_>>,
    ) -> Vec<InstallResult> {
        let mut installed_ids = HashSet::new();
        self.install_with_dependencies_tracked(resource, registry, force, progress, &mut installed_ids)
            .await
    }

    fn install_with_dependencies_tracked<'a>(
        &'a self,
        resource: &'a Resource,
        registry: &'a HashMap<String, Resource>,
        force: bool,
        progress: Option<&'a Progress<'a>>,
        installed_ids: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Vec<InstallResult>> {
        Box::pin(async move {
            let mut results = Vec::new();
            if let Some(deps) = &resource.dependencies {
                for dep_id in &deps.required {
                    if installed_ids.contains(dep_id) {
                        continue;
                    }
                    let dep_resource = registry
                        .get(dep_id)
                        .cloned()
                        .unwrap_or_else(|| synthesize_minimal(dep_id, resource.type_));
                    let sub = self
                        .install_with_dependencies_tracked(&dep_resource, registry, force, progress, installed_ids)
                        .await;
                    results.extend(sub);
                }
            }
            if !installed_ids.contains(&resource.id) {
                let result = self.install(resource, force, progress).await;
                installed_ids.insert(resource.id.clone());
                results.push(result);
            }
            results
        })
    }

    /// Install every resource in `resources`. De-duplicates by id, aborts
    /// the whole batch with a single dependency-failure result if a cycle
    /// is found across the set plus `registry`, and otherwise either runs
    /// installs concurrently (when nothing in the set has required
    /// dependencies and `parallel` is set) or sequentially with shared
    /// dependency tracking.
    #[instrument(skip(self, resources, registry, progress), fields(count = resources.len()))]
    pub async fn batch_install(
        &self,
        resources: &[Resource],
        registry: &HashMap<String, Resource>,
        parallel: bool,
        skip_installed: bool,
        progress: Option<&Progress<'_>>,
    ) -> Vec<InstallResult> {
        let mut seen = HashSet::new();
        let deduped: Vec<Resource> = resources
            .iter()
            .filter(|r| seen.insert(r.id.clone()))
            .cloned()
            .collect();

        let mut combined = deduped.clone();
        for (id, resource) in registry {
            if !combined.iter().any(|r| &r.id == id) {
                combined.push(resource.clone());
            }
        }
        let resolver = DependencyResolver::new(self.config.dependency_max_depth);
        if let Some(cycle) = resolver.detect_cycles(&combined) {
            error!(cycle = %cycle.join(" -> "), "batch install aborted: circular dependency");
            return vec![InstallResult::failure(
                "batch".to_owned(),
                InstallErrorKind::Dependency,
                format!("circular dependency: {}", cycle.join(" -> ")),
            )];
        }

        let force = !skip_installed;
        let any_required = deduped
            .iter()
            .any(|r| r.dependencies.as_ref().is_some_and(|d| !d.required.is_empty()));

        let results = if !any_required && parallel {
            let futures = deduped.iter().map(|r| self.install(r, force, progress));
            futures::future::join_all(futures).await
        } else {
            let mut installed_ids = HashSet::new();
            let mut results = Vec::new();
            for resource in &deduped {
                let sub = self
                    .install_with_dependencies_tracked(resource, registry, force, progress, &mut installed_ids)
                    .await;
                results.extend(sub);
            }
            results
        };

        let failed = results.iter().filter(|r| !r.success).count();
        if failed > 0 {
            warn!(failed, total = results.len(), "batch install finished with failures");
        } else {
            info!(total = results.len(), "batch install finished");
        }
        results
    }

    /// [`AsyncInstaller::batch_install`], additionally reporting totals.
    pub async fn batch_install_with_summary(
        &self,
        resources: &[Resource],
        registry: &HashMap<String, Resource>,
        parallel: bool,
        skip_installed: bool,
        progress: Option<&Progress<'_>>,
    ) -> BatchSummary {
        let start = Instant::now();
        let results = self
            .batch_install(resources, registry, parallel, skip_installed, progress)
            .await;
        let duration = start.elapsed();

        let succeeded = results.iter().filter(|r| r.success && !r.skipped).count();
        let skipped = results.iter().filter(|r| r.success && r.skipped).count();
        let failed = results.iter().filter(|r| !r.success).count();

        BatchSummary {
            total: results.len(),
            succeeded,
            failed,
            skipped,
            duration,
            results,
        }
    }
}

/// Delete every file a batch of successful, non-skipped installs created.
/// Missing files are ignored; rollback never fails.
pub fn rollback_batch(results: &[InstallResult]) {
    for result in results {
        if result.success && !result.skipped {
            if let Some(path) = &result.path {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

fn synthesize_minimal(id: &str, type_: ResourceType) -> Resource {
    Resource {
        id: id.to_owned(),
        type_,
        name: id.to_owned(),
        description: String::new(),
        summary: String::new(),
        version: "0.0.0".to_owned(),
        author: None,
        file_type: ".md".to_owned(),
        source: Source {
            repo: String::new(),
            path: String::new(),
            url: String::new(),
            sha256: None,
        },
        install_path: Resource::default_install_path(type_, id, ".md").to_string(),
        metadata: Default::default(),
        dependencies: None::<Dependency>,
        extra: Default::default(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn atomic_write(path: &Utf8Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "install path has no parent directory")
    })?;
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp_")
        .suffix(".download")
        .tempfile_in(parent)?;
    std::io::Write::write_all(&mut tmp, bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Linux/macOS report a full filesystem as `ENOSPC` (raw os error 28);
/// `ErrorKind::StorageFull` covers the rest. Checked this way rather than
/// relying on `ErrorKind::StorageFull` alone, since `tempfile_in`'s
/// underlying `write`/`rename` calls surface the raw os error, not the
/// classified kind, on some platforms.
fn is_disk_full(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::StorageFull || err.raw_os_error() == Some(28)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[test]
    fn is_disk_full_recognizes_storage_full_and_enospc() {
        assert!(is_disk_full(&std::io::Error::from(std::io::ErrorKind::StorageFull)));
        assert!(is_disk_full(&std::io::Error::from_raw_os_error(28)));
        assert!(!is_disk_full(&std::io::Error::from(std::io::ErrorKind::PermissionDenied)));
    }

    struct FakeDownloader {
        body: Vec<u8>,
        fail_times: Mutex<u32>,
    }

    impl FakeDownloader {
        fn succeeding(body: &[u8]) -> Self {
            FakeDownloader {
                body: body.to_vec(),
                fail_times: Mutex::new(0),
            }
        }

        fn failing_then_succeeding(body: &[u8], fail_times: u32) -> Self {
            FakeDownloader {
                body: body.to_vec(),
                fail_times: Mutex::new(fail_times),
            }
        }
    }

    impl Downloader for FakeDownloader {
        async fn download(&self, _url: &str, _timeout: Duration) -> Result<Vec<u8>, String> {
            let mut remaining = self.fail_times.lock().expect("lock poisoned");
            if *remaining > 0 {
                *remaining -= 1;
                return Err("simulated network failure".to_owned());
            }
            Ok(self.body.clone())
        }
    }

    fn config() -> Config {
        Config::default()
    }

    fn resource(id: &str) -> Resource {
        Resource {
            id: id.to_owned(),
            type_: ResourceType::Agent,
            name: id.to_owned(),
            description: String::new(),
            summary: String::new(),
            version: "1.0.0".to_owned(),
            author: None,
            file_type: ".md".to_owned(),
            source: Source {
                repo: "r".into(),
                path: "p".into(),
                url: format!("https://raw.githubusercontent.com/{id}/{id}.md"),
                sha256: None,
            },
            install_path: format!("agents/{id}.md"),
            metadata: Default::default(),
            dependencies: None,
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn installs_and_writes_the_downloaded_content() {
        let dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let installer = AsyncInstaller::with_downloader(base.clone(), config(), FakeDownloader::succeeding(b"hello"));

        let result = installer.install(&resource("architect"), false, None).await;
        assert!(result.success);
        assert!(!result.skipped);
        let path = result.path.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn skips_existing_file_unless_forced() {
        let dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let installer = AsyncInstaller::with_downloader(base.clone(), config(), FakeDownloader::succeeding(b"v1"));

        let first = installer.install(&resource("architect"), false, None).await;
        assert!(first.success && !first.skipped);

        let second = installer.install(&resource("architect"), false, None).await;
        assert!(second.success && second.skipped);
        assert_eq!(std::fs::read(second.path.unwrap()).unwrap(), b"v1");
    }

    #[tokio::test]
    async fn force_overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let installer = AsyncInstaller::with_downloader(base.clone(), config(), FakeDownloader::succeeding(b"v2"));
        std::fs::create_dir_all(base.join("agents")).unwrap();
        std::fs::write(base.join("agents/architect.md"), b"v1").unwrap();

        let result = installer.install(&resource("architect"), true, None).await;
        assert!(result.success && !result.skipped);
        assert_eq!(std::fs::read(result.path.unwrap()).unwrap(), b"v2");
    }

    #[tokio::test]
    async fn retries_before_succeeding() {
        let dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let installer =
            AsyncInstaller::with_downloader(base, config(), FakeDownloader::failing_then_succeeding(b"ok", 2));

        let result = installer.install(&resource("retrier"), false, None).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn rejects_mismatched_sha256() {
        let dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let installer = AsyncInstaller::with_downloader(base, config(), FakeDownloader::succeeding(b"hello"));

        let mut r = resource("architect");
        r.source.sha256 = Some("0".repeat(64));
        let result = installer.install(&r, false, None).await;
        assert!(!result.success);
        assert_eq!(result.error, Some(InstallErrorKind::Integrity));
    }

    #[tokio::test]
    async fn rejects_non_allow_listed_download_host() {
        let dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let installer = AsyncInstaller::with_downloader(base, config(), FakeDownloader::succeeding(b"hello"));

        let mut r = resource("architect");
        r.source.url = "https://evil.example.com/agents/architect.md".to_owned();
        let result = installer.install(&r, false, None).await;
        assert!(!result.success);
        assert_eq!(result.error, Some(InstallErrorKind::Security));
    }

    #[tokio::test]
    async fn install_with_dependencies_installs_deps_first() {
        let dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let installer = AsyncInstaller::with_downloader(base, config(), FakeDownloader::succeeding(b"content"));

        let mut parent = resource("parent");
        parent.dependencies = Some(Dependency {
            required: vec!["lib".to_owned()],
            recommended: vec![],
        });
        let mut registry = HashMap::new();
        registry.insert("lib".to_owned(), resource("lib"));

        let results = installer.install_with_dependencies(&parent, &registry, false, None).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "lib");
        assert_eq!(results[1].id, "parent");
        assert!(results.iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn batch_install_shares_a_dependency_once() {
        let dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let installer = AsyncInstaller::with_downloader(base, config(), FakeDownloader::succeeding(b"content"));

        let mut a = resource("a");
        a.dependencies = Some(Dependency {
            required: vec!["lib".to_owned()],
            recommended: vec![],
        });
        let mut b = resource("b");
        b.dependencies = Some(Dependency {
            required: vec!["lib".to_owned()],
            recommended: vec![],
        });
        let mut registry = HashMap::new();
        registry.insert("lib".to_owned(), resource("lib"));

        let summary = installer
            .batch_install_with_summary(&[a, b], &registry, false, true, None)
            .await;
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 0);
        let lib_count = summary.results.iter().filter(|r| r.id == "lib").count();
        assert_eq!(lib_count, 1);
    }

    #[tokio::test]
    async fn batch_install_aborts_on_cycle() {
        let dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let installer = AsyncInstaller::with_downloader(base, config(), FakeDownloader::succeeding(b"content"));

        let mut x = resource("x");
        x.dependencies = Some(Dependency {
            required: vec!["y".to_owned()],
            recommended: vec![],
        });
        let mut y = resource("y");
        y.dependencies = Some(Dependency {
            required: vec!["x".to_owned()],
            recommended: vec![],
        });

        let registry = HashMap::new();
        let results = installer.batch_install(&[x, y], &registry, false, true, None).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].error, Some(InstallErrorKind::Dependency));
    }

    #[tokio::test]
    async fn rollback_deletes_only_successful_non_skipped_installs() {
        let dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let installer = AsyncInstaller::with_downloader(base.clone(), config(), FakeDownloader::succeeding(b"data"));

        let result = installer.install(&resource("architect"), false, None).await;
        assert!(result.success);
        let path = result.path.clone().unwrap();
        assert!(path.exists());

        rollback_batch(&[result]);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn progress_callback_sees_monotonic_milestones() {
        let dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let installer = AsyncInstaller::with_downloader(base, config(), FakeDownloader::succeeding(b"data"));

        let seen: Mutex<Vec<f64>> = Mutex::new(Vec::new());
        let cb = |_stage: &str, fraction: f64| {
            seen.lock().expect("lock poisoned").push(fraction);
        };
        let result = installer.install(&resource("architect"), false, Some(&cb)).await;
        assert!(result.success);
        let fractions = seen.into_inner().unwrap();
        assert_eq!(fractions, vec![0.0, 0.3, 0.7, 0.9, 1.0]);
    }
}
