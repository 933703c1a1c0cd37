//! Content addressing and cover materialization.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use sha2::Digest as _;

use crate::formats::FileInfo;

/// SHA-256 of the raw archive bytes, lower-case hex.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(sha2::Sha256::digest(bytes))
}

/// File extension used for a cover with the given media type.
pub fn cover_extension(media_type: &str) -> &'static str {
    let subtype = media_type
        .trim()
        .to_ascii_lowercase()
        .strip_prefix("image/")
        .map(str::to_owned)
        .unwrap_or_default();
    match subtype.as_str() {
        "jpeg" | "jpg" | "pjpeg" => "jpg",
        "png" => "png",
        "gif" => "gif",
        "webp" => "webp",
        "svg" | "svg+xml" => "svg",
        "bmp" | "x-ms-bmp" => "bmp",
        _ => "jpg",
    }
}

pub fn cover_file_name(hash: &str, media_type: &str) -> String {
    format!("{hash}.{}", cover_extension(media_type))
}

/// Write `{hash}.{ext}` into `dir`. The write goes through a temporary file so
/// readers never observe a partial image; rewriting the same bytes is a no-op
/// in effect.
pub fn write_cover(
    dir: &Path,
    hash: &str,
    media_type: &str,
    bytes: &[u8],
) -> anyhow::Result<PathBuf> {
    let path = dir.join(cover_file_name(hash, media_type));
    write_atomic(&path, bytes).with_context(|| format!("write cover: {}", path.display()))?;
    Ok(path)
}

pub fn file_info(path: &Path, size: u64) -> FileInfo {
    FileInfo {
        name: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        size,
    }
}

pub fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    std::fs::create_dir_all(parent)
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    std::fs::write(&tmp_path, data)
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
