use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::xml::XmlElement;

/// One ingested archive, as persisted in `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawManifestEntry {
    pub id: String,
    pub content_hash: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub cover: String,
    pub metadata: XmlElement,
    #[serde(default)]
    pub manifest: BTreeMap<String, ManifestItem>,
    #[serde(default)]
    pub spine: Vec<SpineItemRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guide: Option<XmlElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<XmlElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bindings: Option<XmlElement>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub package_attributes: BTreeMap<String, String>,
    pub paths: EntryPaths,
    pub file: FileInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpineItemRef {
    pub idref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linear: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPaths {
    pub opf: String,
    pub epub: String,
    /// Key of the archive in the archive store, when it was published there.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
}

/// Book id -> cover asset path, persisted as `covers.json`.
pub type CoverIndex = BTreeMap<String, String>;
