use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::archive::EpubArchive;
use crate::catalog;
use crate::cli::ManifestArgs;
use crate::content;
use crate::error::ExtractError;
use crate::formats::{CoverIndex, EntryPaths, RawManifestEntry};
use crate::package::PackageModel;
use crate::store::{LocalFsArchiveStore, archive_storage_path};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const COVERS_FILE: &str = "covers.json";

/// Where a manifest run reads from and writes to.
#[derive(Debug, Clone)]
pub struct ManifestOptions {
    pub input_dir: PathBuf,
    pub out_dir: PathBuf,
    pub covers_dir: PathBuf,
    /// Prefix recorded in front of cover file names (`{prefix}/{hash}.{ext}`).
    pub cover_prefix: String,
    pub archive_store: Option<PathBuf>,
}

impl From<ManifestArgs> for ManifestOptions {
    fn from(args: ManifestArgs) -> Self {
        let out_dir = PathBuf::from(&args.out);
        let covers_dir = args
            .covers
            .map(PathBuf::from)
            .unwrap_or_else(|| out_dir.join("covers"));
        Self {
            input_dir: PathBuf::from(args.input),
            out_dir,
            covers_dir,
            cover_prefix: args.cover_prefix,
            archive_store: args.archive_store.map(PathBuf::from),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestSummary {
    pub processed: usize,
    pub skipped: usize,
    pub duplicates: usize,
}

pub fn run(args: ManifestArgs) -> anyhow::Result<ManifestSummary> {
    build(&ManifestOptions::from(args))
}

pub fn build(options: &ManifestOptions) -> anyhow::Result<ManifestSummary> {
    let sources = list_archives(&options.input_dir)?;
    tracing::info!(
        input = %options.input_dir.display(),
        archives = sources.len(),
        "building manifest"
    );

    check_cover_dir(options)?;
    if options.covers_dir.exists() {
        std::fs::remove_dir_all(&options.covers_dir).with_context(|| {
            format!("remove cover dir: {}", options.covers_dir.display())
        })?;
    }
    std::fs::create_dir_all(&options.covers_dir)
        .with_context(|| format!("create cover dir: {}", options.covers_dir.display()))?;

    let archive_store = options.archive_store.as_ref().map(LocalFsArchiveStore::new);

    let mut summary = ManifestSummary::default();
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    let mut covers = CoverIndex::new();

    for path in &sources {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(path = %path.display(), ?err, "skipping unreadable archive");
                summary.skipped += 1;
                continue;
            }
        };
        let hash = content::content_hash(&bytes);
        if !seen.insert(hash.clone()) {
            tracing::info!(path = %path.display(), %hash, "skipping duplicate archive");
            summary.duplicates += 1;
            continue;
        }

        match ingest(options, archive_store.as_ref(), path, hash, bytes) {
            Ok(entry) => {
                tracing::debug!(id = %entry.id, title = %entry.title, "ingested archive");
                covers.insert(entry.id.clone(), entry.cover.clone());
                entries.push(entry);
                summary.processed += 1;
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), err = %format!("{err:#}"), "skipping archive");
                summary.skipped += 1;
            }
        }
    }

    write_json(&options.out_dir.join(MANIFEST_FILE), &entries)?;
    write_json(&options.out_dir.join(COVERS_FILE), &covers)?;

    tracing::info!(
        processed = summary.processed,
        skipped = summary.skipped,
        duplicates = summary.duplicates,
        out = %options.out_dir.display(),
        "manifest written"
    );
    Ok(summary)
}

/// `*.epub` files directly inside `dir`, ordered by file name.
pub fn list_archives(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("read input dir: {}", dir.display()))?
    {
        let path = entry?.path();
        let is_epub = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("epub"));
        if is_epub && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

fn ingest(
    options: &ManifestOptions,
    archive_store: Option<&LocalFsArchiveStore>,
    path: &Path,
    hash: String,
    bytes: Vec<u8>,
) -> anyhow::Result<RawManifestEntry> {
    let size = bytes.len() as u64;
    let mut archive = EpubArchive::open(bytes)?;
    let opf_path = archive.opf_path()?;
    let package = archive.read_opf(&opf_path)?;
    let model = PackageModel::extract(&archive, &opf_path, &package)?;

    let cover_bytes = archive
        .read(&model.cover.archive_path)?
        .ok_or_else(|| ExtractError::CoverAssetMissing(model.cover.archive_path.clone()))?;

    // Publish before the cover exists, so a failed publish leaves no asset.
    let storage = match archive_store {
        Some(store) => {
            let storage_path = archive_storage_path(&hash);
            store.put(&storage_path, &archive.into_bytes())?;
            Some(storage_path)
        }
        None => None,
    };

    let cover_path =
        content::write_cover(&options.covers_dir, &hash, &model.cover.media_type, &cover_bytes)?;

    let cover = cover_reference(&options.cover_prefix, &cover_path);
    let genres = catalog::metadata_genres(&model.metadata, &model.title);

    Ok(RawManifestEntry {
        id: hash.clone(),
        content_hash: hash,
        title: model.title,
        author: model.author,
        genres,
        cover,
        metadata: model.metadata,
        manifest: model.manifest,
        spine: model.spine,
        guide: model.guide,
        collection: model.collection,
        bindings: model.bindings,
        package_attributes: model.package_attributes,
        paths: EntryPaths {
            opf: opf_path,
            epub: path.to_string_lossy().into_owned(),
            storage,
        },
        file: content::file_info(path, size),
    })
}

/// The cover directory is wiped on every run, so it must not hold the
/// input archives, the manifest output or the archive store.
fn check_cover_dir(options: &ManifestOptions) -> anyhow::Result<()> {
    let covers = resolve_path(&options.covers_dir)?;
    let mut guarded = vec![
        ("input directory", &options.input_dir),
        ("output directory", &options.out_dir),
    ];
    if let Some(store) = &options.archive_store {
        guarded.push(("archive store", store));
    }
    for (label, path) in guarded {
        if resolve_path(path)?.starts_with(&covers) {
            anyhow::bail!(
                "cover directory {} would remove the {label}: {}",
                options.covers_dir.display(),
                path.display()
            );
        }
    }
    Ok(())
}

/// Absolute, symlink-free form of `path`, which need not exist yet.
fn resolve_path(path: &Path) -> anyhow::Result<PathBuf> {
    let absolute = std::path::absolute(path)
        .with_context(|| format!("resolve path: {}", path.display()))?;
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => break,
        }
    }
    let mut resolved = existing
        .canonicalize()
        .with_context(|| format!("canonicalize path: {}", existing.display()))?;
    resolved.extend(missing.iter().rev());
    Ok(resolved)
}

fn cover_reference(prefix: &str, cover_path: &Path) -> String {
    let name = cover_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name
    } else {
        format!("{prefix}/{name}")
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let mut json = serde_json::to_vec_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    json.push(b'\n');
    content::write_atomic(path, &json).with_context(|| format!("write {}", path.display()))
}
