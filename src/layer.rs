use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::constants::LAYER_KEY_PREFIX;
use crate::error::{Result, ScraperError};
use crate::storage::ObjectStore;

/// Runtime layers expect packages under a top-level `python/` directory.
pub const LAYER_ROOT: &str = "python";
const PYCACHE: &str = "__pycache__";

// Requirement specifiers like `requests`, `pandas==2.2.2`, `boto3>=1.34`
static LIBRARY_SPEC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*(\[[A-Za-z0-9,._-]+\])?((==|>=|<=|~=)[A-Za-z0-9.*+!_-]+)?$")
        .expect("requirement pattern is valid")
});

pub fn validate_library(library: &str) -> Result<()> {
    if LIBRARY_SPEC.is_match(library) {
        Ok(())
    } else {
        Err(ScraperError::Config(format!(
            "'{library}' is not a valid library requirement"
        )))
    }
}

pub fn layer_file_name(library: &str) -> String {
    format!("{library}_layer.zip")
}

pub fn layer_key(library: &str) -> String {
    format!("{LAYER_KEY_PREFIX}{}", layer_file_name(library))
}

/// Installs a library and its dependencies into a target directory.
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    async fn install(&self, library: &str, target: &Path) -> Result<()>;
}

pub struct PipInstaller {
    program: String,
}

impl PipInstaller {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for PipInstaller {
    fn default() -> Self {
        Self::new("pip")
    }
}

#[async_trait]
impl PackageInstaller for PipInstaller {
    async fn install(&self, library: &str, target: &Path) -> Result<()> {
        info!("Installing {} into {}", library, target.display());
        let output = tokio::process::Command::new(&self.program)
            .arg("install")
            .arg("--no-cache-dir")
            .arg("-t")
            .arg(target)
            .arg(library)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ScraperError::Packaging(format!(
                "{} install {} exited with {}: {}",
                self.program,
                library,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Deletes every `__pycache__` directory below `dir`. Returns how many went.
pub fn remove_pycache(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let path = entry.path();
        if entry.file_name() == PYCACHE {
            fs::remove_dir_all(&path)?;
            removed += 1;
        } else {
            removed += remove_pycache(&path)?;
        }
    }
    Ok(removed)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

/// Zips every file under `base/dir_name`, naming entries relative to
/// `base` with forward slashes (`python/pkg/__init__.py`).
pub fn zip_directory(base: &Path, dir_name: &str, zip_path: &Path) -> Result<usize> {
    let mut files = Vec::new();
    collect_files(&base.join(dir_name), &mut files)?;
    files.sort();

    let mut zip = ZipWriter::new(File::create(zip_path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in &files {
        let relative = path.strip_prefix(base).map_err(|e| {
            ScraperError::Packaging(format!("{} outside {}: {e}", path.display(), base.display()))
        })?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        zip.start_file(name, options)?;
        io::copy(&mut File::open(path)?, &mut zip)?;
    }

    zip.finish()?;
    Ok(files.len())
}

/// Installs `library` into `<work_dir>/python`, strips bytecode caches and
/// archives the tree as `<work_dir>/<library>_layer.zip`.
#[instrument(skip(installer))]
pub async fn build_layer(
    installer: &dyn PackageInstaller,
    work_dir: &Path,
    library: &str,
) -> Result<PathBuf> {
    validate_library(library)?;

    let target = work_dir.join(LAYER_ROOT);
    // Warm starts reuse the scratch directory
    if target.exists() {
        fs::remove_dir_all(&target)?;
    }
    fs::create_dir_all(&target)?;

    installer.install(library, &target).await?;

    let removed = remove_pycache(&target)?;
    debug!("Removed {} {} directories", removed, PYCACHE);

    let zip_path = work_dir.join(layer_file_name(library));
    let count = zip_directory(work_dir, LAYER_ROOT, &zip_path)?;
    info!("Packaged {} files into {}", count, zip_path.display());
    Ok(zip_path)
}

/// Builds the layer and uploads it to `layers/<library>_layer.zip`.
pub async fn publish_layer(
    store: &dyn ObjectStore,
    installer: &dyn PackageInstaller,
    work_dir: &Path,
    bucket: &str,
    library: &str,
) -> Result<String> {
    let zip_path = build_layer(installer, work_dir, library).await?;
    let key = layer_key(library);
    store.upload_file(&zip_path, bucket, &key).await?;
    info!("Uploaded layer to s3://{}/{}", bucket, key);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryObjectStore;
    use std::io::Cursor;
    use zip::ZipArchive;

    struct FakeInstaller;

    #[async_trait]
    impl PackageInstaller for FakeInstaller {
        async fn install(&self, library: &str, target: &Path) -> Result<()> {
            let package = target.join(library.replace('-', "_"));
            fs::create_dir_all(package.join(PYCACHE))?;
            fs::write(package.join("__init__.py"), "VERSION = '1.0'\n")?;
            fs::write(package.join(PYCACHE).join("__init__.cpython-310.pyc"), [0u8; 4])?;
            fs::create_dir_all(target.join(PYCACHE))?;
            fs::write(target.join("six.py"), "# six\n")?;
            Ok(())
        }
    }

    fn entry_names(bytes: Vec<u8>) -> Vec<String> {
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn layer_contains_python_tree_without_caches() {
        let work = tempfile::tempdir().unwrap();
        let zip_path = build_layer(&FakeInstaller, work.path(), "beautifulsoup4")
            .await
            .unwrap();

        assert_eq!(zip_path, work.path().join("beautifulsoup4_layer.zip"));
        assert_eq!(
            entry_names(fs::read(&zip_path).unwrap()),
            vec!["python/beautifulsoup4/__init__.py", "python/six.py"]
        );
    }

    #[tokio::test]
    async fn rebuild_starts_from_a_clean_directory() {
        let work = tempfile::tempdir().unwrap();
        fs::create_dir_all(work.path().join(LAYER_ROOT)).unwrap();
        fs::write(work.path().join(LAYER_ROOT).join("stale.py"), "").unwrap();

        let zip_path = build_layer(&FakeInstaller, work.path(), "requests").await.unwrap();
        let names = entry_names(fs::read(zip_path).unwrap());
        assert!(!names.iter().any(|n| n.ends_with("stale.py")));
    }

    #[tokio::test]
    async fn publish_uploads_under_layers_prefix() {
        let work = tempfile::tempdir().unwrap();
        let store = InMemoryObjectStore::new();
        let key = publish_layer(&store, &FakeInstaller, work.path(), "artifacts", "requests==2.32.3")
            .await
            .unwrap();

        assert_eq!(key, "layers/requests==2.32.3_layer.zip");
        let names = entry_names(store.object("artifacts", &key).unwrap());
        assert!(names.contains(&"python/requests==2.32.3/__init__.py".to_string()));
    }

    #[test]
    fn rejects_shell_metacharacters() {
        assert!(validate_library("pandas").is_ok());
        assert!(validate_library("requests[socks]>=2.0").is_ok());
        assert!(validate_library("pandas; rm -rf /").is_err());
        assert!(validate_library("").is_err());
    }
}
