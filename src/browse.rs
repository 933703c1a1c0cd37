//! Catalog query commands. Each prints JSON to the given writer.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use anyhow::Context as _;
use serde::Serialize;

use crate::catalog::{Catalog, CatalogBook};
use crate::cli::{CatalogArgs, RecommendArgs, SearchArgs, ShowArgs};

/// Compact listing row.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSummary<'a> {
    pub id: &'a str,
    pub title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<&'a str>,
    pub genres: &'a [String],
    pub cover: &'a str,
}

impl<'a> From<&'a CatalogBook> for BookSummary<'a> {
    fn from(book: &'a CatalogBook) -> Self {
        Self {
            id: &book.id,
            title: &book.title,
            author: book.author.as_deref(),
            genres: &book.genres,
            cover: &book.cover,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GenreCount<'a> {
    pub genre: &'a str,
    pub count: usize,
}

pub fn search(args: SearchArgs, out: &mut dyn Write) -> anyhow::Result<()> {
    let catalog = load(&args.catalog)?;
    let books = match (args.query.as_deref(), args.genre.as_deref()) {
        (None, None) => anyhow::bail!("pass --query, --genre, or both"),
        (Some(query), None) => catalog.search(query),
        (None, Some(genre)) => catalog.filter_by_genre(genre),
        (Some(query), Some(genre)) => {
            let in_genre: HashSet<&str> = catalog
                .filter_by_genre(genre)
                .into_iter()
                .map(|book| book.id.as_str())
                .collect();
            catalog
                .search(query)
                .into_iter()
                .filter(|book| in_genre.contains(book.id.as_str()))
                .collect()
        }
    };
    tracing::info!(matches = books.len(), "search finished");
    print_summaries(&books, out)
}

pub fn genres(args: CatalogArgs, out: &mut dyn Write) -> anyhow::Result<()> {
    let catalog = load(&args)?;
    let counts: Vec<GenreCount<'_>> = catalog
        .genres()
        .iter()
        .map(|genre| GenreCount {
            genre,
            count: catalog.filter_by_genre(genre).len(),
        })
        .collect();
    print_json(&counts, out)
}

pub fn show(args: ShowArgs, out: &mut dyn Write) -> anyhow::Result<()> {
    let catalog = load(&args.catalog)?;
    let book = catalog
        .get_book_by_id(&args.id)
        .ok_or_else(|| anyhow::anyhow!("book not found: {}", args.id))?;
    print_json(book, out)
}

pub fn recommend(args: RecommendArgs, out: &mut dyn Write) -> anyhow::Result<()> {
    let catalog = load(&args.catalog)?;
    let books = catalog.recommended(&args.library);
    print_summaries(&books, out)
}

fn load(args: &CatalogArgs) -> anyhow::Result<Catalog> {
    let catalog = Catalog::load(Path::new(&args.manifest))?;
    tracing::debug!(books = catalog.len(), "loaded catalog");
    Ok(catalog)
}

fn print_summaries(books: &[&CatalogBook], out: &mut dyn Write) -> anyhow::Result<()> {
    let summaries: Vec<BookSummary<'_>> = books.iter().map(|book| BookSummary::from(*book)).collect();
    print_json(&summaries, out)
}

fn print_json<T: Serialize + ?Sized>(value: &T, out: &mut dyn Write) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("serialize output")?;
    writeln!(out).context("write output")?;
    Ok(())
}
