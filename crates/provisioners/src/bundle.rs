//! Deployment package builder.
//!
//! A package is a zip archive of the runtime skeleton with the caller's
//! handler dropped in as [`HANDLER_FILE`]. The skeleton's entry point imports
//! that module and delegates each webhook event to it.

use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use pipeline::{DeploymentPackage, ProvisionError};
use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Archive path of the caller's handler inside the package.
pub const HANDLER_FILE: &str = "handler.py";

/// Skeleton files compiled into the binary.
const EMBEDDED_SKELETON: &[(&str, &str)] = &[(
    "lambda_handler_rest.py",
    include_str!("../skeleton/lambda_handler_rest.py"),
)];

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("handler file {0} does not exist")]
    MissingHandler(PathBuf),

    #[error("handler path {0} is not a regular file")]
    HandlerNotAFile(PathBuf),

    #[error("skeleton directory {0} does not exist")]
    MissingSkeleton(PathBuf),

    #[error("could not stage {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not walk {0}")]
    Walk(#[from] walkdir::Error),

    #[error("could not write archive: {0}")]
    Archive(#[from] ZipError),
}

impl From<BundleError> for ProvisionError {
    fn from(e: BundleError) -> Self {
        ProvisionError::Package(e.to_string())
    }
}

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> BundleError + '_ {
    move |source| BundleError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Where the runtime skeleton comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Skeleton {
    /// The skeleton shipped with this crate.
    #[default]
    Embedded,
    /// Every file under a directory, copied with its relative layout.
    Directory(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct BundleBuilder {
    skeleton: Skeleton,
    /// Parent of the per-build staging directories; the system temp dir if unset.
    staging_root: Option<PathBuf>,
}

impl BundleBuilder {
    pub fn new(skeleton: Skeleton) -> Self {
        Self {
            skeleton,
            staging_root: None,
        }
    }

    /// Stages builds under `root` instead of the system temp directory.
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    /// Packages the skeleton together with `handler`.
    ///
    /// Files are staged in a fresh temporary directory per call, so concurrent
    /// builds never share state. Blocking; run it off the async executor.
    pub fn build(&self, handler: &Path) -> Result<DeploymentPackage, BundleError> {
        let metadata = match fs::metadata(handler) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BundleError::MissingHandler(handler.to_path_buf()))
            }
            Err(e) => return Err(io_at(handler)(e)),
        };
        if !metadata.is_file() {
            return Err(BundleError::HandlerNotAFile(handler.to_path_buf()));
        }

        let staging = self.staging_dir()?;
        self.stage_skeleton(staging.path())?;

        let target = staging.path().join(HANDLER_FILE);
        fs::copy(handler, &target).map_err(io_at(handler))?;

        let bytes = archive(staging.path())?;
        debug!(
            handler = %handler.display(),
            bytes = bytes.len(),
            "Deployment package built"
        );
        Ok(DeploymentPackage::new(bytes))
    }

    /// A fresh directory, removed when the returned guard drops.
    fn staging_dir(&self) -> Result<TempDir, BundleError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("hookwire-bundle-");
        match &self.staging_root {
            Some(root) => builder.tempdir_in(root).map_err(io_at(root)),
            None => builder.tempdir().map_err(io_at(Path::new("<tempdir>"))),
        }
    }

    fn stage_skeleton(&self, staging: &Path) -> Result<(), BundleError> {
        match &self.skeleton {
            Skeleton::Embedded => {
                for (name, contents) in EMBEDDED_SKELETON {
                    let path = staging.join(name);
                    fs::write(&path, contents).map_err(io_at(&path))?;
                }
            }
            Skeleton::Directory(root) => {
                if !root.is_dir() {
                    return Err(BundleError::MissingSkeleton(root.clone()));
                }
                for entry in WalkDir::new(root).min_depth(1) {
                    let entry = entry?;
                    let Ok(relative) = entry.path().strip_prefix(root) else {
                        continue;
                    };
                    let target = staging.join(relative);
                    if entry.file_type().is_dir() {
                        fs::create_dir_all(&target).map_err(io_at(&target))?;
                    } else {
                        fs::copy(entry.path(), &target).map_err(io_at(entry.path()))?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Zips every file under `root`, using `/`-separated paths relative to it.
fn archive(root: &Path) -> Result<Vec<u8>, BundleError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            writer.add_directory(name, options)?;
        } else {
            writer.start_file(name, options)?;
            let mut file = File::open(entry.path()).map_err(io_at(entry.path()))?;
            io::copy(&mut file, &mut writer).map_err(io_at(entry.path()))?;
        }
    }

    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use zip::ZipArchive;

    use super::*;

    fn entries(package: &DeploymentPackage) -> Vec<(String, String)> {
        let mut archive = ZipArchive::new(Cursor::new(package.as_bytes())).unwrap();
        let mut out = Vec::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).unwrap();
            if file.is_dir() {
                out.push((file.name().to_owned(), String::new()));
                continue;
            }
            let mut contents = String::new();
            file.read_to_string(&mut contents).unwrap();
            out.push((file.name().to_owned(), contents));
        }
        out
    }

    fn handler(dir: &Path) -> PathBuf {
        let path = dir.join("my_logic.py");
        fs::write(&path, "def handler_logic(event):\n    return 200, 'ok'\n").unwrap();
        path
    }

    #[test]
    fn embedded_skeleton_is_packaged_with_the_handler() {
        let dir = tempfile::tempdir().unwrap();
        let package = BundleBuilder::default().build(&handler(dir.path())).unwrap();

        let entries = entries(&package);
        let names: Vec<_> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, [HANDLER_FILE, "lambda_handler_rest.py"]);
        assert!(entries[0].1.contains("handler_logic"));
        assert!(entries[1].1.contains("def lambda_handler"));
    }

    #[test]
    fn directory_skeleton_keeps_its_layout() {
        let skeleton = tempfile::tempdir().unwrap();
        fs::write(skeleton.path().join("entry.py"), "import handler\n").unwrap();
        fs::create_dir(skeleton.path().join("lib")).unwrap();
        fs::write(skeleton.path().join("lib").join("util.py"), "X = 1\n").unwrap();
        // Replaced by the caller's handler.
        fs::write(skeleton.path().join(HANDLER_FILE), "placeholder\n").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let builder = BundleBuilder::new(Skeleton::Directory(skeleton.path().to_path_buf()));
        let package = builder.build(&handler(dir.path())).unwrap();

        let entries = entries(&package);
        let names: Vec<_> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["entry.py", HANDLER_FILE, "lib/", "lib/util.py"]);
        assert!(entries[1].1.contains("handler_logic"));
    }

    #[test]
    fn staging_directory_is_removed_after_each_build() {
        let dir = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let handler = handler(dir.path());

        let builder = BundleBuilder::default().with_staging_root(staging.path());
        builder.build(&handler).unwrap();
        assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);

        // Failures after staging started clean up too.
        let failing = BundleBuilder::new(Skeleton::Directory(dir.path().join("nope")))
            .with_staging_root(staging.path());
        assert!(failing.build(&handler).is_err());
        assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_handler_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = BundleBuilder::default()
            .build(&dir.path().join("absent.py"))
            .unwrap_err();
        assert!(matches!(err, BundleError::MissingHandler(_)));
    }

    #[test]
    fn directory_handler_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = BundleBuilder::default().build(dir.path()).unwrap_err();
        assert!(matches!(err, BundleError::HandlerNotAFile(_)));
    }

    #[test]
    fn missing_skeleton_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let builder = BundleBuilder::new(Skeleton::Directory(dir.path().join("nope")));
        let err = builder.build(&handler(dir.path())).unwrap_err();
        assert!(matches!(err, BundleError::MissingSkeleton(_)));
    }

    #[test]
    fn bundle_errors_become_package_errors() {
        let err: ProvisionError = BundleError::MissingHandler(PathBuf::from("x.py")).into();
        assert!(matches!(err, ProvisionError::Package(msg) if msg.contains("x.py")));
    }
}
