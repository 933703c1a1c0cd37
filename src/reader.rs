//! Chapter-by-chapter reading sessions.
//!
//! A [`ReaderSession`] moves through `Idle -> Loading -> Ready | Error` and
//! ends in `Closed`. Loading is split in three steps so the slow part does
//! not hold the session borrowed:
//!
//! 1. [`ReaderSession::begin_load`] hands out a [`LoadTicket`] tagged with
//!    the session generation and a cancellation token;
//! 2. [`LoadTicket::run`] fetches the archive and extracts chapters;
//! 3. [`ReaderSession::finish_load`] applies the outcome, unless the session
//!    was closed or a newer load started in the meantime.
//!
//! [`ReaderSession::open`] chains the three for callers that do not need to
//! close concurrently.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::archive::{self, EpubArchive};
use crate::catalog::CatalogBook;
use crate::error::SessionError;
use crate::formats::{ManifestItem, SpineItemRef};
use crate::package;
use crate::store::{ArchiveStore, Location, ProgressStore};
use crate::text::{first_sentence, html_to_text};

const TITLE_MAX_CHARS: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRecord {
    pub id: String,
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading,
    Ready,
    Error(String),
    Closed,
}

/// What a session needs to know about a book; taken from the catalog.
#[derive(Debug, Clone, Default)]
pub struct SessionBook {
    pub id: String,
    pub storage_path: Option<String>,
    pub opf_path: String,
    pub manifest: BTreeMap<String, ManifestItem>,
    pub spine: Vec<SpineItemRef>,
}

impl From<&CatalogBook> for SessionBook {
    fn from(book: &CatalogBook) -> Self {
        Self {
            id: book.id.clone(),
            storage_path: book.storage_path.clone(),
            opf_path: book.opf_path.clone(),
            manifest: book.manifest.clone(),
            spine: book.spine.clone(),
        }
    }
}

pub struct ReaderSession {
    book: Arc<SessionBook>,
    archives: Arc<dyn ArchiveStore>,
    progress: Arc<dyn ProgressStore>,
    state: SessionState,
    chapters: Vec<ChapterRecord>,
    index: usize,
    generation: u64,
    cancel: CancellationToken,
}

/// A load in flight. Owns everything it needs, so the session stays free
/// to be closed while it runs.
pub struct LoadTicket {
    generation: u64,
    cancel: CancellationToken,
    book: Arc<SessionBook>,
    archives: Arc<dyn ArchiveStore>,
    progress: Arc<dyn ProgressStore>,
}

pub struct LoadOutcome {
    generation: u64,
    result: LoadResult,
}

enum LoadResult {
    Loaded {
        chapters: Vec<ChapterRecord>,
        resume_index: Option<usize>,
    },
    Failed(SessionError),
    Cancelled,
}

impl ReaderSession {
    pub fn new(
        book: impl Into<SessionBook>,
        archives: Arc<dyn ArchiveStore>,
        progress: Arc<dyn ProgressStore>,
    ) -> Self {
        Self {
            book: Arc::new(book.into()),
            archives,
            progress,
            state: SessionState::Idle,
            chapters: Vec::new(),
            index: 0,
            generation: 0,
            cancel: CancellationToken::new(),
        }
    }

    pub fn book_id(&self) -> &str {
        &self.book.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn chapters(&self) -> &[ChapterRecord] {
        &self.chapters
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn current_chapter(&self) -> Option<&ChapterRecord> {
        self.chapters.get(self.index)
    }

    pub fn percent_complete(&self) -> f64 {
        percent_for(self.index, self.chapters.len())
    }

    /// Start a load, superseding any load already in flight. Returns `None`
    /// once the session is closed.
    pub fn begin_load(&mut self) -> Option<LoadTicket> {
        if self.state == SessionState::Closed {
            return None;
        }
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.generation += 1;
        self.state = SessionState::Loading;

        tracing::debug!(book_id = %self.book.id, generation = self.generation, "begin load");
        Some(LoadTicket {
            generation: self.generation,
            cancel: self.cancel.clone(),
            book: Arc::clone(&self.book),
            archives: Arc::clone(&self.archives),
            progress: Arc::clone(&self.progress),
        })
    }

    /// Apply a finished load. Returns `false` when the outcome was discarded
    /// because the session closed or a newer load superseded it.
    pub async fn finish_load(&mut self, outcome: LoadOutcome) -> bool {
        if self.state != SessionState::Loading || outcome.generation != self.generation {
            tracing::debug!(
                book_id = %self.book.id,
                generation = outcome.generation,
                current = self.generation,
                "discarding stale load"
            );
            return false;
        }

        match outcome.result {
            LoadResult::Loaded {
                chapters,
                resume_index,
            } => {
                let last = chapters.len().saturating_sub(1);
                self.index = resume_index.unwrap_or(0).min(last);
                self.chapters = chapters;
                self.state = SessionState::Ready;
                tracing::info!(
                    book_id = %self.book.id,
                    chapters = self.chapters.len(),
                    index = self.index,
                    "book ready"
                );
                self.persist_progress().await;
                true
            }
            LoadResult::Failed(err) => {
                tracing::warn!(book_id = %self.book.id, %err, "load failed");
                self.state = SessionState::Error(err.to_string());
                true
            }
            LoadResult::Cancelled => false,
        }
    }

    /// Load the book and return the resulting state.
    pub async fn open(&mut self) -> &SessionState {
        if let Some(ticket) = self.begin_load() {
            let outcome = ticket.run().await;
            self.finish_load(outcome).await;
        }
        &self.state
    }

    /// Move to the next chapter. Returns `false` (and writes nothing) at the
    /// last chapter or when the session is not ready.
    pub async fn next(&mut self) -> bool {
        if self.state != SessionState::Ready || self.index + 1 >= self.chapters.len() {
            return false;
        }
        self.index += 1;
        self.persist_progress().await;
        true
    }

    /// Move to the previous chapter. Returns `false` at the first chapter.
    pub async fn previous(&mut self) -> bool {
        if self.state != SessionState::Ready || self.index == 0 {
            return false;
        }
        self.index -= 1;
        self.persist_progress().await;
        true
    }

    /// Drop all chapter state and cancel any load in flight. Persisted
    /// progress is left untouched.
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.generation += 1;
        self.chapters.clear();
        self.index = 0;
        self.state = SessionState::Closed;
        tracing::debug!(book_id = %self.book.id, "session closed");
    }

    async fn persist_progress(&self) {
        let location = Location {
            spine_index: self.index,
        };
        let percent = self.percent_complete();
        if let Err(err) = self
            .progress
            .save_progress(&self.book.id, location, Some(percent))
            .await
        {
            tracing::warn!(book_id = %self.book.id, ?err, "failed to save reading progress");
        }
    }
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn run(self) -> LoadOutcome {
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => LoadResult::Cancelled,
            result = self.load() => result,
        };
        LoadOutcome {
            generation: self.generation,
            result,
        }
    }

    async fn load(&self) -> LoadResult {
        let Some(storage_path) = self.book.storage_path.clone() else {
            return LoadResult::Failed(SessionError::AssetNotFound(self.book.id.clone()));
        };

        let bytes = match self.archives.fetch_archive_bytes(&storage_path).await {
            Ok(bytes) => bytes,
            Err(err) => return LoadResult::Failed(err),
        };

        let book = Arc::clone(&self.book);
        let chapters = match tokio::task::spawn_blocking(move || extract_chapters(&book, bytes)).await
        {
            Ok(Ok(chapters)) => chapters,
            Ok(Err(err)) => return LoadResult::Failed(err),
            Err(err) => return LoadResult::Failed(SessionError::Extraction(err.to_string())),
        };

        let resume_index = match self.progress.load_progress(&self.book.id).await {
            Ok(progress) => progress.map(|progress| progress.last_location.spine_index),
            Err(err) => {
                tracing::warn!(book_id = %self.book.id, ?err, "failed to load reading progress");
                None
            }
        };

        LoadResult::Loaded {
            chapters,
            resume_index,
        }
    }
}

/// Resolve the spine against the manifest and the archive, returning every
/// chapter that has readable text, in spine order.
///
/// Spine entries without a manifest item, manifest items without an archive
/// entry and chapters without text are skipped.
pub fn extract_chapters(
    book: &SessionBook,
    bytes: Vec<u8>,
) -> Result<Vec<ChapterRecord>, SessionError> {
    let mut archive = EpubArchive::open(bytes)?;

    // Older manifests may lack the spine; read it from the package instead.
    let reparsed;
    let (opf_path, manifest, spine) = if book.spine.is_empty() {
        let opf_path = if book.opf_path.is_empty() {
            archive.opf_path()?
        } else {
            book.opf_path.clone()
        };
        let document = archive.read_opf(&opf_path)?;
        reparsed = (
            package::manifest_items(&document),
            package::spine_items(&document),
        );
        (opf_path, &reparsed.0, &reparsed.1)
    } else {
        (book.opf_path.clone(), &book.manifest, &book.spine)
    };
    let opf_dir = archive::opf_dir(&opf_path);

    let mut chapters = Vec::new();
    for itemref in spine {
        let Some(item) = manifest.get(&itemref.idref) else {
            continue;
        };
        if is_binary_media(&item.media_type) {
            continue;
        }
        let path = archive::resolve_href(opf_dir, &item.href);
        let Some(html) = archive.read_text(&path)? else {
            continue;
        };
        let text = html_to_text(&html);
        if text.is_empty() {
            continue;
        }

        let title = item
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(str::to_owned)
            .or_else(|| first_sentence(&text, TITLE_MAX_CHARS))
            .unwrap_or_else(|| format!("Section {}", chapters.len() + 1));

        chapters.push(ChapterRecord {
            id: itemref.idref.clone(),
            title,
            text,
        });
    }

    if chapters.is_empty() {
        return Err(SessionError::NoReadableChapters);
    }
    Ok(chapters)
}

fn is_binary_media(media_type: &str) -> bool {
    ["image/", "audio/", "video/", "font/"]
        .iter()
        .any(|prefix| media_type.starts_with(prefix))
}

fn percent_for(index: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ((index + 1) as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}
