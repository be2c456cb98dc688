use crate::{Error, Result};

use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::info;

/// Default location of the bundled OS-side assets.
pub const DEFAULT_ASSET_BUNDLE: &str = "/opt/pf9/pf9-kube/nodelet-assets.tar.gz";

/// Gzip-compressed tarball of scripts and units shipped with the agent.
#[derive(Clone, Debug)]
pub struct AssetBundle {
    path: PathBuf,
}

impl Default for AssetBundle {
    fn default() -> Self {
        Self::new(DEFAULT_ASSET_BUNDLE)
    }
}

impl AssetBundle {
    /// A bundle stored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the bundle.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unpacks the bundle under `destination`, keeping file permissions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AssetBundleMissing`] if there is no bundle, or an IO
    /// error if it cannot be unpacked.
    pub fn extract(&self, destination: &Path) -> Result<()> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::AssetBundleMissing(self.path.clone()));
            }
            Err(e) => return Err(Error::Io("failed to open asset bundle", e)),
        };

        let mut archive = Archive::new(GzDecoder::new(file));
        archive.set_preserve_permissions(true);
        archive.set_overwrite(true);
        archive
            .unpack(destination)
            .map_err(|e| Error::Io("failed to unpack asset bundle", e))?;

        info!(
            "extracted {} to {}",
            self.path.display(),
            destination.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::tempdir;

    fn write_bundle(path: &Path) {
        let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let body = b"#!/bin/sh\nexit 0\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, "opt/pf9/pf9-kube/phases/gen_certs.sh", &body[..])
            .unwrap();

        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_extract_keeps_permissions() {
        let dir = tempdir().unwrap();
        let bundle_path = dir.path().join("assets.tar.gz");
        write_bundle(&bundle_path);
        let root = dir.path().join("root");

        AssetBundle::new(&bundle_path).extract(&root).unwrap();

        let script = root.join("opt/pf9/pf9-kube/phases/gen_certs.sh");
        assert_eq!(fs::read_to_string(&script).unwrap(), "#!/bin/sh\nexit 0\n");
        assert_eq!(fs::metadata(&script).unwrap().permissions().mode() & 0o777, 0o755);
    }

    #[test]
    fn test_missing_bundle() {
        let dir = tempdir().unwrap();

        let result = AssetBundle::new(dir.path().join("none.tar.gz")).extract(dir.path());

        assert!(matches!(result, Err(Error::AssetBundleMissing(_))));
    }
}
