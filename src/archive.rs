//! Random-access view over an EPUB (OCF zip) container.

use std::collections::BTreeSet;
use std::io::{Cursor, Read as _};

use zip::ZipArchive;

use crate::error::ExtractError;
use crate::xml::{self, XmlElement};

pub const CONTAINER_PATH: &str = "META-INF/container.xml";

pub struct EpubArchive {
    zip: ZipArchive<Cursor<Vec<u8>>>,
    entries: BTreeSet<String>,
}

impl EpubArchive {
    pub fn open(bytes: Vec<u8>) -> Result<Self, ExtractError> {
        let zip = ZipArchive::new(Cursor::new(bytes))?;
        let entries = zip.file_names().map(str::to_owned).collect();
        Ok(Self { zip, entries })
    }

    /// Give back the raw container bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.zip.into_inner().into_inner()
    }

    /// Resolve an archive path as stored, or its percent-decoded form.
    pub fn resolve(&self, path: &str) -> Option<String> {
        if self.entries.contains(path) {
            return Some(path.to_owned());
        }
        let decoded = percent_encoding::percent_decode_str(path)
            .decode_utf8()
            .ok()?;
        self.entries
            .contains(decoded.as_ref())
            .then(|| decoded.into_owned())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }

    /// Read an entry; `Ok(None)` when it does not exist.
    pub fn read(&mut self, path: &str) -> Result<Option<Vec<u8>>, ExtractError> {
        let Some(name) = self.resolve(path) else {
            return Ok(None);
        };
        let mut file = self.zip.by_name(&name)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        Ok(Some(contents))
    }

    pub fn read_text(&mut self, path: &str) -> Result<Option<String>, ExtractError> {
        Ok(self.read(path)?.map(|bytes| decode_text(&bytes)))
    }

    /// Locate the package document through `META-INF/container.xml`.
    pub fn opf_path(&mut self) -> Result<String, ExtractError> {
        let container = self
            .read_text(CONTAINER_PATH)?
            .ok_or_else(|| ExtractError::MalformedContainer(format!("{CONTAINER_PATH} is missing")))?;
        let root = xml::parse(&container)
            .map_err(|err| ExtractError::MalformedContainer(err.to_string()))?
            .ok_or_else(|| ExtractError::MalformedContainer("container.xml is empty".to_owned()))?;

        find_rootfile(&root)
            .map(str::to_owned)
            .ok_or_else(|| ExtractError::MalformedContainer("no rootfile declared".to_owned()))
    }

    /// Parse the package document at `opf_path` into a tree.
    pub fn read_opf(&mut self, opf_path: &str) -> Result<XmlElement, ExtractError> {
        let content = self
            .read_text(opf_path)?
            .ok_or_else(|| ExtractError::MissingOpf(opf_path.to_owned()))?;
        xml::parse(&content)?.ok_or_else(|| ExtractError::MissingOpf(opf_path.to_owned()))
    }
}

fn find_rootfile(element: &XmlElement) -> Option<&str> {
    if element.is("rootfile")
        && let Some(path) = element.attr("full-path")
        && !path.trim().is_empty()
    {
        return Some(path.trim());
    }
    element.elements().find_map(find_rootfile)
}

/// Decode entry bytes as UTF-8, dropping a BOM and replacing invalid sequences.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Directory that holds the package document (`OEBPS/content.opf` -> `OEBPS`).
pub fn opf_dir(opf_path: &str) -> &str {
    opf_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Join an href from the package document onto its directory and normalize
/// `.` and `..` segments. Fragments and queries are dropped.
pub fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = href.split(['#', '?']).next().unwrap_or_default();
    let mut segments: Vec<&str> = Vec::new();
    let joined = if href.starts_with('/') {
        href.to_owned()
    } else {
        format!("{base_dir}/{href}")
    };
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
