//! Sequential layer download and extraction.
//!
//! Layers are applied strictly in manifest order onto a single directory:
//! layer *i+1* is not requested until layer *i* is extracted and its
//! archive deleted. Later layers overwrite earlier paths. Whiteout files
//! are not interpreted and land in the root as ordinary files.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use burrow_common::cancel::CancelToken;
use burrow_common::constants::LAYER_ARCHIVE_PREFIX;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{Digest, ImageReference};

use crate::hash::{HashingWriter, validate_digest};
use crate::manifest::{Descriptor, Manifest};
use crate::registry::{PullToken, RegistryClient};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
const CHUNK_SIZE: usize = 64 * 1024;

/// A layer that has been fetched and unpacked into the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLayer {
    /// One-based position in the manifest.
    pub index: usize,
    /// Content digest of the layer blob.
    pub digest: Digest,
    /// Size of the downloaded blob in bytes.
    pub size_bytes: u64,
    /// Number of archive entries written to the root.
    pub entries: usize,
}

/// Compression applied to a layer archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Plain tar.
    None,
    /// Gzip-compressed tar.
    Gzip,
}

impl Compression {
    /// Picks the decompressor from the archive's magic bytes.
    ///
    /// Registries label some uncompressed layers as gzip, so the media type
    /// only decides when the archive is too short to carry a magic number.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem for zstd layers.
    pub fn detect(media_type: &str, head: &[u8]) -> std::result::Result<Self, String> {
        if media_type.contains("zstd") || head.starts_with(&ZSTD_MAGIC) {
            return Err(format!("zstd-compressed layers are not supported ({media_type})"));
        }
        if head.starts_with(&GZIP_MAGIC) {
            return Ok(Self::Gzip);
        }
        if head.len() < GZIP_MAGIC.len() && media_type.ends_with("gzip") {
            return Ok(Self::Gzip);
        }
        Ok(Self::None)
    }
}

/// Observer notified as layers are pulled.
pub trait PullProgress {
    /// Called before layer `index` of `total` is requested.
    fn layer_started(&self, _index: usize, _total: usize, _layer: &Descriptor) {}

    /// Called after a layer was extracted and its archive removed.
    fn layer_finished(&self, _layer: &ExtractedLayer) {}
}

/// Progress observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl PullProgress for NoProgress {}

static NO_PROGRESS: NoProgress = NoProgress;

/// Downloads manifest layers and unpacks them into a root directory.
pub struct LayerFetcher<'a> {
    registry: &'a RegistryClient,
    cancel: CancelToken,
    verify_digests: bool,
    progress: &'a dyn PullProgress,
}

impl<'a> LayerFetcher<'a> {
    /// Creates a fetcher that verifies digests and reports no progress.
    #[must_use]
    pub fn new(registry: &'a RegistryClient, cancel: CancelToken) -> Self {
        Self {
            registry,
            cancel,
            verify_digests: true,
            progress: &NO_PROGRESS,
        }
    }

    /// Enables or disables digest and size verification.
    #[must_use]
    pub const fn verify_digests(mut self, verify: bool) -> Self {
        self.verify_digests = verify;
        self
    }

    /// Reports progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: &'a dyn PullProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Fetches every layer of `manifest` in order and extracts it into `root`.
    ///
    /// Stops at the first failure; nothing after the failing layer is
    /// requested.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::Layer` naming the failing layer, or
    /// `BurrowError::Cancelled` if the token fires mid-way.
    pub fn fetch_and_extract(
        &self,
        token: &PullToken,
        image: &ImageReference,
        manifest: &Manifest,
        root: &Path,
    ) -> Result<Vec<ExtractedLayer>> {
        let total = manifest.layers.len();
        tracing::info!(image = %image, layers = total, root = %root.display(), "populating root");

        let mut extracted = Vec::with_capacity(total);
        for (position, descriptor) in manifest.layers.iter().enumerate() {
            let layer = self.fetch_layer(token, image, position + 1, total, descriptor, root)?;
            self.progress.layer_finished(&layer);
            extracted.push(layer);
        }
        Ok(extracted)
    }

    fn fetch_layer(
        &self,
        token: &PullToken,
        image: &ImageReference,
        index: usize,
        total: usize,
        descriptor: &Descriptor,
        root: &Path,
    ) -> Result<ExtractedLayer> {
        let stage = format!("layer {index}/{total}");
        self.cancel.check(&stage)?;
        self.progress.layer_started(index, total, descriptor);

        let layer_err = |message: String| BurrowError::Layer {
            index,
            digest: descriptor.digest.to_string(),
            message,
        };
        let wrap = |err: BurrowError| match err {
            cancelled @ BurrowError::Cancelled { .. } => cancelled,
            other => layer_err(other.to_string()),
        };

        let response = self
            .registry
            .open_blob(token, image, index, &descriptor.digest)?;

        let mut archive = tempfile::Builder::new()
            .prefix(LAYER_ARCHIVE_PREFIX)
            .suffix(".tar")
            .tempfile_in(root)
            .map_err(|e| layer_err(format!("cannot create archive file: {e}")))?;
        tracing::debug!(
            index,
            digest = %descriptor.digest,
            archive = %archive.path().display(),
            "downloading layer"
        );

        let (size_bytes, actual) =
            stream_to_file(response.body, archive.as_file_mut(), &self.cancel, &stage)
                .map_err(wrap)?;

        if self.verify_digests {
            if size_bytes != descriptor.size {
                return Err(layer_err(format!(
                    "size mismatch: manifest declares {} bytes, received {size_bytes}",
                    descriptor.size
                )));
            }
            validate_digest(&format!("layer {index}"), &descriptor.digest, &actual)
                .map_err(wrap)?;
        }

        let file = archive
            .reopen()
            .map_err(|e| layer_err(format!("cannot reopen archive file: {e}")))?;
        let entries = unpack_file(file, &descriptor.media_type, root, &self.cancel, &stage)
            .map_err(wrap)?;

        archive
            .close()
            .map_err(|e| layer_err(format!("cannot remove archive file: {e}")))?;

        tracing::info!(index, digest = %descriptor.digest, size_bytes, entries, "layer extracted");
        Ok(ExtractedLayer {
            index,
            digest: descriptor.digest.clone(),
            size_bytes,
            entries,
        })
    }
}

/// Copies `body` into `file` chunk by chunk, hashing it on the way.
fn stream_to_file(
    mut body: Box<dyn Read + Send>,
    file: &mut File,
    cancel: &CancelToken,
    stage: &str,
) -> Result<(u64, Digest)> {
    let io_err = |e: io::Error| BurrowError::Io {
        path: PathBuf::from("<layer archive>"),
        source: e,
    };
    let mut writer = HashingWriter::new(io::BufWriter::new(file));
    let mut buf = vec![0_u8; CHUNK_SIZE];
    loop {
        cancel.check(stage)?;
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(io_err(e)),
        };
        writer.write_all(&buf[..n]).map_err(io_err)?;
    }
    let written = writer.written();
    let (_, digest) = writer.finish().map_err(io_err)?;
    Ok((written, digest))
}

/// Sniffs the compression of `file` and unpacks it into `target`.
fn unpack_file(
    file: File,
    media_type: &str,
    target: &Path,
    cancel: &CancelToken,
    stage: &str,
) -> Result<usize> {
    let mut reader = BufReader::new(file);
    let head = reader.fill_buf().map_err(|e| BurrowError::Io {
        path: target.to_path_buf(),
        source: e,
    })?;
    let compression = Compression::detect(media_type, head).map_err(|message| {
        BurrowError::Config { message }
    })?;
    match compression {
        Compression::Gzip => {
            unpack_archive(flate2::read::GzDecoder::new(reader), target, cancel, stage)
        }
        Compression::None => unpack_archive(reader, target, cancel, stage),
    }
}

/// Unpacks every entry of a tar stream into `target`, later entries winning.
///
/// Directories whose mode denies the owner write access are unpacked
/// writable and get their real mode back once all entries are in place.
fn unpack_archive<R: Read>(
    reader: R,
    target: &Path,
    cancel: &CancelToken,
    stage: &str,
) -> Result<usize> {
    let io_err = |e: io::Error| BurrowError::Io {
        path: target.to_path_buf(),
        source: e,
    };
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_overwrite(true);
    archive.set_unpack_xattrs(false);

    let mut unpacked = 0;
    let mut restricted_dirs: Vec<(PathBuf, u32)> = Vec::new();
    for entry in archive.entries().map_err(io_err)? {
        cancel.check(stage)?;
        let mut entry = entry.map_err(io_err)?;
        let is_dir = entry.header().entry_type().is_dir();
        let mode = entry.header().mode().ok();
        let relative = relative_path(&entry.path().map_err(io_err)?);

        if !entry.unpack_in(target).map_err(io_err)? {
            tracing::warn!(path = %relative.display(), "skipped archive entry outside the root");
            continue;
        }
        unpacked += 1;

        if let (true, Some(mode)) = (is_dir, mode) {
            if mode & 0o700 != 0o700 {
                let path = target.join(&relative);
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode | 0o700))
                    .map_err(io_err)?;
                restricted_dirs.push((path, mode));
            }
        }
    }

    for (path, mode) in restricted_dirs.iter().rev() {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
            .map_err(io_err)?;
    }
    Ok(unpacked)
}

/// Keeps only the normal components of an archive path.
fn relative_path(path: &Path) -> PathBuf {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}
