//! Normalized, queryable view over the generated manifest.
//!
//! A [`Catalog`] is built once from the full list of [`RawManifestEntry`]
//! records and never mutated afterwards; share it behind an `Arc` when
//! several readers need it.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use anyhow::Context as _;
use serde::Serialize;

use crate::formats::{FileInfo, ManifestItem, RawManifestEntry, SpineItemRef};
use crate::text::{collapse_whitespace, html_to_text};
use crate::xml::XmlElement;

pub const DEFAULT_GENRE: &str = "General";
pub const SUBJECT_DELIMITER: &str = "--";
pub const TOP_GENRE_LIMIT: usize = 24;
pub const TOP_GENRE_MIN_COUNT: usize = 2;
const KEYWORD_LIMIT: usize = 32;
const KEYWORD_MIN_CHARS: usize = 4;

/// Genre inference used when a book declares no subjects. Every label whose
/// keywords occur in the description, publisher or title is assigned, in
/// table order.
pub const GENRE_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Fantasy",
        &["fantasy", "dragon", "wizard", "magic", "kingdom", "sorcer", "elves", "fairy"],
    ),
    (
        "Science Fiction",
        &["science fiction", "sci-fi", "spaceship", "starship", "robot", "alien", "galaxy", "planet", "android"],
    ),
    ("Mystery", &["mystery", "detective", "murder", "sleuth", "whodunit"]),
    ("Thriller", &["thriller", "spy", "conspiracy", "assassin", "suspense"]),
    ("Romance", &["romance", "love story", "lovers", "courtship", "wedding"]),
    ("Horror", &["horror", "ghost", "vampire", "haunted", "monster", "zombie"]),
    ("Adventure", &["adventure", "voyage", "expedition", "treasure", "pirate", "explorer"]),
    ("Historical Fiction", &["historical novel", "victorian", "medieval", "regency"]),
    ("Biography", &["biography", "memoir", "autobiograph"]),
    ("History", &["history", "empire", "revolution", "ancient", "civilization"]),
    ("Philosophy", &["philosoph", "ethics", "metaphysic"]),
    ("Poetry", &["poetry", "poems", "sonnet", "verse"]),
    ("Drama", &["drama", "tragedy", "comedy", "theatre", "theater"]),
    ("Science", &["physics", "chemistry", "biology", "mathemat", "evolution", "astronom"]),
    ("Religion", &["religio", "bible", "theolog", "scripture", "spiritual"]),
    ("Children", &["children", "nursery", "juvenile", "bedtime"]),
    ("Self-Help", &["self-help", "self help", "productivity", "motivation", "habits"]),
    ("Business", &["business", "economics", "finance", "entrepreneur", "marketing"]),
];

const STOP_WORDS: &[&str] = &[
    "about", "after", "again", "also", "an", "and", "been", "before", "being", "book", "books",
    "both", "could", "does", "each", "edition", "from", "have", "having", "here", "into", "just",
    "more", "most", "much", "only", "other", "over", "same", "some", "such", "than", "that",
    "their", "them", "then", "there", "these", "they", "this", "those", "through", "under",
    "very", "were", "what", "when", "where", "which", "while", "with", "would", "your",
];

/// Where a metadata value may come from, tried in table order.
#[derive(Debug, Clone, Copy)]
enum MetaSource {
    /// Text of the first matching element, e.g. `dc:description`.
    Element(&'static str),
    /// Text of `<meta property="...">`.
    Property(&'static str),
    /// `content` attribute of `<meta name="...">`.
    Name(&'static str),
}

const DESCRIPTION_SOURCES: &[MetaSource] = &[
    MetaSource::Element("description"),
    MetaSource::Property("dcterms:description"),
    MetaSource::Property("description"),
    MetaSource::Property("schema:description"),
    MetaSource::Name("description"),
    MetaSource::Name("calibre:description"),
];
const PUBLISHED_SOURCES: &[MetaSource] = &[
    MetaSource::Element("date"),
    MetaSource::Property("dcterms:issued"),
    MetaSource::Property("dcterms:created"),
];
const LANGUAGE_SOURCES: &[MetaSource] = &[
    MetaSource::Element("language"),
    MetaSource::Property("dcterms:language"),
];
const PUBLISHER_SOURCES: &[MetaSource] = &[
    MetaSource::Element("publisher"),
    MetaSource::Property("dcterms:publisher"),
];
const RIGHTS_SOURCES: &[MetaSource] = &[
    MetaSource::Element("rights"),
    MetaSource::Property("dcterms:rights"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogBook {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub authors: Vec<String>,
    pub contributors: Vec<String>,
    pub subjects: Vec<String>,
    pub genres: Vec<String>,
    pub identifiers: Vec<String>,
    pub language: Option<String>,
    pub publisher: Option<String>,
    pub published: Option<String>,
    pub rights: Option<String>,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub cover: String,
    pub storage_path: Option<String>,
    pub opf_path: String,
    pub manifest: BTreeMap<String, ManifestItem>,
    pub spine: Vec<SpineItemRef>,
    pub file: FileInfo,
    pub search_text: String,
}

impl CatalogBook {
    pub fn from_entry(entry: &RawManifestEntry) -> Self {
        let metadata = &entry.metadata;

        let mut creators = element_values(metadata, "creator");
        if creators.is_empty()
            && let Some(author) = &entry.author
        {
            creators.push(author.trim().to_owned());
        }
        let authors = dedupe_case_insensitive(creators);
        let contributors = dedupe_case_insensitive(element_values(metadata, "contributor"));

        let subjects = clean_subjects(element_values(metadata, "subject"));
        let description = description_of(metadata);
        let publisher = first_value(metadata, PUBLISHER_SOURCES);
        let title = collapse_whitespace(&entry.title);

        let genres = derive_genres(
            &subjects,
            description.as_deref(),
            publisher.as_deref(),
            &title,
        );
        let identifiers = dedupe_case_insensitive(element_values(metadata, "identifier"));
        let language = first_value(metadata, LANGUAGE_SOURCES);
        let published = first_value(metadata, PUBLISHED_SOURCES);
        let rights = first_value(metadata, RIGHTS_SOURCES);
        let keywords = extract_keywords(&title, &subjects, description.as_deref());

        let mut book = Self {
            id: if entry.id.is_empty() {
                entry.content_hash.clone()
            } else {
                entry.id.clone()
            },
            author: authors.first().cloned(),
            title,
            authors,
            contributors,
            subjects,
            genres,
            identifiers,
            language,
            publisher,
            published,
            rights,
            description,
            keywords,
            cover: entry.cover.clone(),
            storage_path: entry.paths.storage.clone(),
            opf_path: entry.paths.opf.clone(),
            manifest: entry.manifest.clone(),
            spine: entry.spine.clone(),
            file: entry.file.clone(),
            search_text: String::new(),
        };
        book.search_text = build_search_text(&book);
        book
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    books: Vec<CatalogBook>,
    by_id: HashMap<String, usize>,
    genres: Vec<String>,
}

impl Catalog {
    pub fn from_entries(entries: &[RawManifestEntry]) -> Self {
        let mut books: Vec<CatalogBook> = entries.iter().map(CatalogBook::from_entry).collect();
        books.sort_by(|a, b| compare_titles(&a.title, &b.title));

        let mut by_id = HashMap::with_capacity(books.len());
        for (idx, book) in books.iter().enumerate() {
            by_id.entry(book.id.clone()).or_insert(idx);
        }
        let genres = top_genres(&books);

        tracing::debug!(books = books.len(), genres = genres.len(), "built catalog");
        Self {
            books,
            by_id,
            genres,
        }
    }

    pub fn from_manifest_json(json: &str) -> anyhow::Result<Self> {
        let entries: Vec<RawManifestEntry> =
            serde_json::from_str(json).context("parse manifest json")?;
        Ok(Self::from_entries(&entries))
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("read manifest: {}", path.display()))?;
        Self::from_manifest_json(&json).with_context(|| format!("load catalog: {}", path.display()))
    }

    /// All books, sorted by title.
    pub fn books(&self) -> &[CatalogBook] {
        &self.books
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn get_book_by_id(&self, id: &str) -> Option<&CatalogBook> {
        self.by_id.get(id).map(|&idx| &self.books[idx])
    }

    /// Most common genres across the catalog (see [`top_genres`]).
    pub fn genres(&self) -> &[String] {
        &self.genres
    }
}

/// Genres for a package's metadata, as recorded in the generated manifest.
pub fn metadata_genres(metadata: &XmlElement, title: &str) -> Vec<String> {
    let subjects = clean_subjects(element_values(metadata, "subject"));
    let description = description_of(metadata);
    let publisher = first_value(metadata, PUBLISHER_SOURCES);
    derive_genres(
        &subjects,
        description.as_deref(),
        publisher.as_deref(),
        &collapse_whitespace(title),
    )
}

/// Genre labels for a book.
///
/// With subjects, each subject's primary segment (before `--`) is a genre.
/// Without subjects the [`GENRE_KEYWORDS`] table is matched against the
/// lower-cased description, publisher and title; no match yields
/// [`DEFAULT_GENRE`].
pub fn derive_genres(
    subjects: &[String],
    description: Option<&str>,
    publisher: Option<&str>,
    title: &str,
) -> Vec<String> {
    if !subjects.is_empty() {
        let primaries = subjects.iter().filter_map(|subject| {
            let primary = subject.split(SUBJECT_DELIMITER).next().unwrap_or_default();
            let primary = clean_label(primary);
            (!primary.is_empty()).then_some(primary)
        });
        let genres = dedupe_case_insensitive(primaries);
        if !genres.is_empty() {
            return genres;
        }
    }

    let haystack = [description.unwrap_or_default(), publisher.unwrap_or_default(), title]
        .join(" ")
        .to_lowercase();
    let inferred: Vec<String> = GENRE_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|keyword| haystack.contains(keyword)))
        .map(|(label, _)| (*label).to_owned())
        .collect();

    if inferred.is_empty() {
        vec![DEFAULT_GENRE.to_owned()]
    } else {
        inferred
    }
}

/// Genres present in at least two books, by descending count then name,
/// at most [`TOP_GENRE_LIMIT`].
pub fn top_genres(books: &[CatalogBook]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for book in books {
        for genre in &book.genres {
            *counts.entry(genre.as_str()).or_default() += 1;
        }
    }

    let mut ranked: Vec<(&str, usize)> = counts
        .into_iter()
        .filter(|(_, count)| *count >= TOP_GENRE_MIN_COUNT)
        .collect();
    ranked.sort_by(|(a_name, a_count), (b_name, b_count)| {
        b_count.cmp(a_count).then_with(|| a_name.cmp(b_name))
    });
    ranked
        .into_iter()
        .take(TOP_GENRE_LIMIT)
        .map(|(name, _)| name.to_owned())
        .collect()
}

/// Collapse whitespace, drop trailing `.`/`;`, trim.
pub fn clean_label(raw: &str) -> String {
    let collapsed = collapse_whitespace(raw);
    collapsed
        .trim_end_matches(|c: char| c == '.' || c == ';' || c.is_whitespace())
        .trim()
        .to_owned()
}

fn clean_subjects(raw: Vec<String>) -> Vec<String> {
    dedupe_case_insensitive(
        raw.iter()
            .map(|subject| clean_label(subject))
            .filter(|subject| !subject.is_empty()),
    )
}

/// Keep the first spelling of every case-insensitively equal value.
pub fn dedupe_case_insensitive<I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|value| !value.is_empty() && seen.insert(value.to_lowercase()))
        .collect()
}

fn element_values(metadata: &XmlElement, name: &str) -> Vec<String> {
    metadata
        .children_named(name)
        .map(|element| collapse_whitespace(&element.text()))
        .filter(|value| !value.is_empty())
        .collect()
}

fn first_value(metadata: &XmlElement, sources: &[MetaSource]) -> Option<String> {
    sources.iter().find_map(|source| {
        let value = match *source {
            MetaSource::Element(name) => metadata.child(name).map(XmlElement::text),
            MetaSource::Property(property) => metadata
                .children_named("meta")
                .find(|meta| meta.attr("property") == Some(property))
                .map(XmlElement::text),
            MetaSource::Name(name) => metadata
                .children_named("meta")
                .find(|meta| meta.attr("name") == Some(name))
                .and_then(|meta| meta.attr("content"))
                .map(str::to_owned),
        }?;
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_owned())
    })
}

// Descriptions are frequently escaped HTML.
fn description_of(metadata: &XmlElement) -> Option<String> {
    first_value(metadata, DESCRIPTION_SOURCES)
        .map(|raw| collapse_whitespace(&html_to_text(&raw)))
        .filter(|text| !text.is_empty())
}

fn extract_keywords(title: &str, subjects: &[String], description: Option<&str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let sources = std::iter::once(title)
        .chain(subjects.iter().map(String::as_str))
        .chain(description);

    let mut keywords = Vec::new();
    for source in sources {
        for word in source.split(|c: char| !c.is_alphanumeric()) {
            let word = word.to_lowercase();
            if word.chars().count() < KEYWORD_MIN_CHARS
                || STOP_WORDS.contains(&word.as_str())
                || word.chars().all(|c| c.is_ascii_digit())
            {
                continue;
            }
            if seen.insert(word.clone()) {
                keywords.push(word);
                if keywords.len() == KEYWORD_LIMIT {
                    return keywords;
                }
            }
        }
    }
    keywords
}

fn build_search_text(book: &CatalogBook) -> String {
    let mut parts: Vec<&str> = vec![book.title.as_str()];
    parts.extend(book.authors.iter().map(String::as_str));
    parts.extend(book.contributors.iter().map(String::as_str));
    parts.extend(book.genres.iter().map(String::as_str));
    parts.extend(book.subjects.iter().map(String::as_str));
    parts.extend(book.identifiers.iter().map(String::as_str));
    parts.extend(
        [
            &book.language,
            &book.publisher,
            &book.published,
            &book.rights,
            &book.description,
        ]
        .into_iter()
        .filter_map(|value| value.as_deref()),
    );
    collapse_whitespace(&parts.join(" ").to_lowercase())
}

/// Title ordering that ignores case and common Latin diacritics first and
/// falls back to the raw strings.
pub fn compare_titles(a: &str, b: &str) -> Ordering {
    collation_key(a)
        .cmp(&collation_key(b))
        .then_with(|| a.cmp(b))
}

fn collation_key(value: &str) -> String {
    value
        .trim()
        .chars()
        .flat_map(char::to_lowercase)
        .map(fold_diacritic)
        .collect()
}

fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' => 'a',
        'ç' | 'ć' | 'č' => 'c',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => 'e',
        'ì' | 'í' | 'î' | 'ï' | 'ī' => 'i',
        'ñ' | 'ń' | 'ň' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' => 'o',
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' => 'u',
        'ý' | 'ÿ' => 'y',
        'š' | 'ś' => 's',
        'ž' | 'ź' | 'ż' => 'z',
        'ł' => 'l',
        'ř' => 'r',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::EntryPaths;
    use crate::xml;

    fn entry(id: &str, title: &str, metadata_body: &str) -> RawManifestEntry {
        let metadata = xml::parse(&format!(
            r#"<metadata xmlns:dc="http://purl.org/dc/elements/1.1/">{metadata_body}</metadata>"#
        ))
        .unwrap()
        .unwrap();
        RawManifestEntry {
            id: id.to_owned(),
            content_hash: id.to_owned(),
            title: title.to_owned(),
            author: None,
            genres: Vec::new(),
            cover: format!("covers/{id}.jpg"),
            metadata,
            manifest: BTreeMap::new(),
            spine: Vec::new(),
            guide: None,
            collection: None,
            bindings: None,
            package_attributes: BTreeMap::new(),
            paths: EntryPaths {
                opf: "OEBPS/content.opf".to_owned(),
                epub: format!("books/{id}.epub"),
                storage: None,
            },
            file: FileInfo {
                name: format!("{id}.epub"),
                size: 10,
            },
        }
    }

    #[test]
    fn subject_primary_segment_becomes_genre() {
        let genres = derive_genres(&["Fiction -- Romance -- Historical".to_owned()], None, None, "x");
        assert_eq!(genres, vec!["Fiction"]);
    }

    #[test]
    fn keywords_infer_genre_without_subjects() {
        let genres = derive_genres(
            &[],
            Some("A young dragon rider must save the kingdom."),
            None,
            "Wings",
        );
        assert!(genres.contains(&"Fantasy".to_owned()));
    }

    #[test]
    fn keyword_inference_includes_every_match() {
        let genres = derive_genres(&[], Some("a detective hunts a vampire"), None, "Night");
        assert_eq!(genres, vec!["Mystery", "Horror"]);
    }

    #[test]
    fn no_subjects_and_no_keywords_fall_back_to_default() {
        assert_eq!(derive_genres(&[], None, None, "Plain Pages"), vec![DEFAULT_GENRE]);
    }

    #[test]
    fn subjects_are_cleaned_and_deduplicated() {
        let book = CatalogBook::from_entry(&entry(
            "a",
            "T",
            r#"<dc:subject>  Science   Fiction. </dc:subject>
               <dc:subject>science fiction;</dc:subject>
               <dc:subject>Space -- Opera</dc:subject>"#,
        ));
        assert_eq!(book.subjects, vec!["Science Fiction", "Space -- Opera"]);
        assert_eq!(book.genres, vec!["Science Fiction", "Space"]);
    }

    #[test]
    fn authors_are_deduplicated_case_insensitively() {
        let book = CatalogBook::from_entry(&entry(
            "a",
            "T",
            r#"<dc:creator>Ann Writer</dc:creator>
               <dc:creator>ANN WRITER</dc:creator>
               <dc:creator>Bo Other</dc:creator>
               <dc:contributor>Ed Itor</dc:contributor>"#,
        ));
        assert_eq!(book.authors, vec!["Ann Writer", "Bo Other"]);
        assert_eq!(book.author.as_deref(), Some("Ann Writer"));
        assert_eq!(book.contributors, vec!["Ed Itor"]);
    }

    #[test]
    fn description_priority_prefers_dc_description() {
        let book = CatalogBook::from_entry(&entry(
            "a",
            "T",
            r#"<meta name="description" content="from meta name"/>
               <meta property="dcterms:description">from property</meta>
               <dc:description>&lt;p&gt;From &lt;b&gt;dc&lt;/b&gt;&lt;/p&gt;</dc:description>"#,
        ));
        assert_eq!(book.description.as_deref(), Some("From dc"));

        let book = CatalogBook::from_entry(&entry(
            "b",
            "T",
            r#"<meta name="description" content="from meta name"/>
               <meta property="dcterms:description">from property</meta>"#,
        ));
        assert_eq!(book.description.as_deref(), Some("from property"));
    }

    #[test]
    fn search_text_contains_visible_metadata() {
        let book = CatalogBook::from_entry(&entry(
            "a",
            "The  Dragon KING",
            r#"<dc:creator>Ann Writer</dc:creator>
               <dc:subject>Fantasy -- Epic</dc:subject>
               <dc:publisher>Tower Press</dc:publisher>
               <dc:language>en</dc:language>"#,
        ));
        for token in ["the dragon king", "ann writer", "fantasy -- epic", "tower press"] {
            assert!(book.search_text.contains(token), "missing {token}");
        }
        assert_eq!(book.language.as_deref(), Some("en"));
    }

    #[test]
    fn catalog_sorts_by_title_and_indexes_ids() {
        let catalog = Catalog::from_entries(&[
            entry("z", "zebra", ""),
            entry("e", "Éclair", ""),
            entry("a", "apple", ""),
        ]);
        let titles: Vec<&str> = catalog.books().iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["apple", "Éclair", "zebra"]);
        assert_eq!(catalog.get_book_by_id("e").unwrap().title, "Éclair");
        assert!(catalog.get_book_by_id("missing").is_none());
    }

    #[test]
    fn genre_index_requires_two_books() {
        let catalog = Catalog::from_entries(&[
            entry("1", "A", "<dc:subject>Horror</dc:subject>"),
            entry("2", "B", "<dc:subject>Poetry</dc:subject>"),
            entry("3", "C", "<dc:subject>Poetry</dc:subject><dc:subject>Drama</dc:subject>"),
            entry("4", "D", "<dc:subject>Drama</dc:subject>"),
            entry("5", "E", "<dc:subject>Drama</dc:subject>"),
        ]);
        assert_eq!(catalog.genres(), ["Drama", "Poetry"]);
    }

    #[test]
    fn genre_index_is_capped() {
        let entries: Vec<RawManifestEntry> = (0..30)
            .flat_map(|n| {
                let subject = format!("<dc:subject>Genre {n:02}</dc:subject>");
                [
                    entry(&format!("{n}a"), "A", &subject),
                    entry(&format!("{n}b"), "B", &subject),
                ]
            })
            .collect();
        let catalog = Catalog::from_entries(&entries);
        assert_eq!(catalog.genres().len(), TOP_GENRE_LIMIT);
        assert_eq!(catalog.genres()[0], "Genre 00");
    }

    #[test]
    fn keywords_skip_short_and_stop_words() {
        let keywords = extract_keywords("The Dragon of Lake Town", &[], Some("With dragons, 1999."));
        assert_eq!(keywords, vec!["dragon", "lake", "town", "dragons"]);
    }
}
