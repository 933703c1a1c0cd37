//! Structural model of an OPF package document.

use std::collections::BTreeMap;

use crate::archive::{self, EpubArchive};
use crate::error::ExtractError;
use crate::formats::{ManifestItem, SpineItemRef};
use crate::xml::XmlElement;

#[derive(Debug, Clone)]
pub struct PackageModel {
    pub opf_path: String,
    pub metadata: XmlElement,
    pub title: String,
    pub author: Option<String>,
    pub cover: CoverAsset,
    pub manifest: BTreeMap<String, ManifestItem>,
    pub spine: Vec<SpineItemRef>,
    pub guide: Option<XmlElement>,
    pub collection: Option<XmlElement>,
    pub bindings: Option<XmlElement>,
    pub package_attributes: BTreeMap<String, String>,
}

/// Cover image declared through `<meta name="cover">`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverAsset {
    pub item_id: String,
    pub href: String,
    pub media_type: String,
    /// Path of the image inside the zip.
    pub archive_path: String,
}

impl PackageModel {
    pub fn extract(
        archive: &EpubArchive,
        opf_path: &str,
        package: &XmlElement,
    ) -> Result<Self, ExtractError> {
        let metadata = package
            .child("metadata")
            .ok_or(ExtractError::MissingMetadata)?;

        let title = metadata
            .child("title")
            .map(|title| title.text().trim().to_owned())
            .filter(|title| !title.is_empty())
            .ok_or(ExtractError::MissingTitle)?;
        let author = metadata
            .child("creator")
            .map(|creator| creator.text().trim().to_owned())
            .filter(|creator| !creator.is_empty());

        let manifest = manifest_items(package);
        let cover = resolve_cover(archive, opf_path, metadata, &manifest)?;

        Ok(Self {
            opf_path: opf_path.to_owned(),
            metadata: metadata.clone(),
            title,
            author,
            cover,
            manifest,
            spine: spine_items(package),
            guide: package.child("guide").cloned(),
            collection: package.child("collection").cloned(),
            bindings: package.child("bindings").cloned(),
            package_attributes: package.attributes.clone(),
        })
    }
}

fn resolve_cover(
    archive: &EpubArchive,
    opf_path: &str,
    metadata: &XmlElement,
    manifest: &BTreeMap<String, ManifestItem>,
) -> Result<CoverAsset, ExtractError> {
    let cover_id = metadata
        .children_named("meta")
        .find(|meta| meta.attr("name") == Some("cover"))
        .and_then(|meta| meta.attr("content"))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(ExtractError::MissingCoverDeclaration)?;

    let item = manifest
        .get(cover_id)
        .ok_or_else(|| ExtractError::CoverItemNotFound(cover_id.to_owned()))?;

    if !item.media_type.starts_with("image/") {
        return Err(ExtractError::NonImageCover {
            media_type: item.media_type.clone(),
        });
    }

    let archive_path = archive::resolve_href(archive::opf_dir(opf_path), &item.href);
    let archive_path = archive
        .resolve(&archive_path)
        .ok_or(ExtractError::CoverAssetMissing(archive_path))?;

    Ok(CoverAsset {
        item_id: item.id.clone(),
        href: item.href.clone(),
        media_type: item.media_type.clone(),
        archive_path,
    })
}

/// `<manifest><item>` entries keyed by id. Items without an id or href are
/// dropped; a missing media-type is inferred from the href extension.
pub fn manifest_items(package: &XmlElement) -> BTreeMap<String, ManifestItem> {
    let Some(manifest) = package.child("manifest") else {
        return BTreeMap::new();
    };

    let mut items = BTreeMap::new();
    for item in manifest.children_named("item") {
        let (Some(id), Some(href)) = (item.attr("id"), item.attr("href")) else {
            continue;
        };
        let media_type = item
            .attr("media-type")
            .map(str::trim)
            .filter(|media_type| !media_type.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| media_type_from_href(href).to_owned());
        let title = item
            .attr("title")
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(str::to_owned);

        items.entry(id.to_owned()).or_insert(ManifestItem {
            id: id.to_owned(),
            href: href.to_owned(),
            media_type,
            title,
        });
    }
    items
}

/// `<spine><itemref>` entries in document order.
pub fn spine_items(package: &XmlElement) -> Vec<SpineItemRef> {
    let Some(spine) = package.child("spine") else {
        return Vec::new();
    };

    spine
        .children_named("itemref")
        .filter_map(|itemref| {
            let idref = itemref.attr("idref")?.trim();
            if idref.is_empty() {
                return None;
            }
            let linear = match itemref.attr("linear").map(str::trim) {
                Some("no") => Some(false),
                Some("yes") => Some(true),
                _ => None,
            };
            Some(SpineItemRef {
                idref: idref.to_owned(),
                linear,
            })
        })
        .collect()
}

pub fn media_type_from_href(href: &str) -> &'static str {
    let path = href.split(['#', '?']).next().unwrap_or_default();
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "xhtml" | "xht" => "application/xhtml+xml",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "ncx" => "application/x-dtbncx+xml",
        _ => "application/octet-stream",
    }
}
