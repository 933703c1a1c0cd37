//! Substring search, genre filtering and content-based recommendations.

use std::collections::{HashMap, HashSet};

use crate::catalog::{Catalog, CatalogBook, compare_titles};

pub const RECOMMENDATION_LIMIT: usize = 12;

const GENRE_BASE: f64 = 3.0;
const SUBJECT_BASE: f64 = 2.0;
const SUBJECT_WEIGHT_FACTOR: f64 = 0.5;
const AUTHOR_SCORE: f64 = 5.0;
const LANGUAGE_SCORE: f64 = 1.0;
const PUBLISHER_SCORE: f64 = 1.0;
const KEYWORD_CAP: f64 = 2.0;

impl Catalog {
    /// Books whose search text contains every whitespace-separated term.
    /// A blank query matches nothing.
    pub fn search(&self, query: &str) -> Vec<&CatalogBook> {
        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        if terms.is_empty() {
            return Vec::new();
        }
        self.books()
            .iter()
            .filter(|book| terms.iter().all(|term| book.search_text.contains(term.as_str())))
            .collect()
    }

    pub fn filter_by_genre(&self, label: &str) -> Vec<&CatalogBook> {
        let label = label.trim().to_lowercase();
        if label.is_empty() {
            return Vec::new();
        }
        self.books()
            .iter()
            .filter(|book| book.genres.iter().any(|genre| genre.to_lowercase() == label))
            .collect()
    }

    /// Up to twelve books outside `library_ids`, ranked by overlap with the
    /// library's genres, subjects, authors, keywords, language and publisher.
    /// Short lists are padded with unscored books in title order.
    pub fn recommended<S: AsRef<str>>(&self, library_ids: &[S]) -> Vec<&CatalogBook> {
        let library_ids: HashSet<&str> = library_ids.iter().map(AsRef::as_ref).collect();
        let library: Vec<&CatalogBook> = library_ids
            .iter()
            .filter_map(|id| self.get_book_by_id(id))
            .collect();
        let profile = LibraryProfile::from_books(&library);

        let candidates = self
            .books()
            .iter()
            .filter(|book| !library_ids.contains(book.id.as_str()));

        let mut scored = Vec::new();
        let mut unscored = Vec::new();
        for book in candidates {
            let score = profile.score(book);
            if score > 0.0 {
                scored.push((score, book));
            } else {
                unscored.push(book);
            }
        }

        scored.sort_by(|(a_score, a), (b_score, b)| {
            b_score
                .total_cmp(a_score)
                .then_with(|| compare_titles(&a.title, &b.title))
        });
        tracing::debug!(
            library = library.len(),
            scored = scored.len(),
            "scored recommendations"
        );

        // `books()` is already in title order, so `unscored` is too.
        scored
            .into_iter()
            .map(|(_, book)| book)
            .chain(unscored)
            .take(RECOMMENDATION_LIMIT)
            .collect()
    }
}

#[derive(Debug, Default)]
struct LibraryProfile {
    genres: HashMap<String, usize>,
    subjects: HashMap<String, usize>,
    keywords: HashMap<String, usize>,
    authors: HashMap<String, usize>,
    languages: HashMap<String, usize>,
    publishers: HashMap<String, usize>,
}

impl LibraryProfile {
    fn from_books(books: &[&CatalogBook]) -> Self {
        let mut profile = Self::default();
        for book in books {
            count_all(&mut profile.genres, &book.genres);
            count_all(&mut profile.subjects, &book.subjects);
            count_all(&mut profile.keywords, &book.keywords);
            count_all(&mut profile.authors, &book.authors);
            count_all(&mut profile.languages, book.language.iter());
            count_all(&mut profile.publishers, book.publisher.iter());
        }
        profile
    }

    fn score(&self, book: &CatalogBook) -> f64 {
        let mut score = 0.0;
        for genre in &book.genres {
            if let Some(weight) = weight(&self.genres, genre) {
                score += GENRE_BASE + weight;
            }
        }
        for subject in &book.subjects {
            if let Some(weight) = weight(&self.subjects, subject) {
                score += SUBJECT_BASE + weight * SUBJECT_WEIGHT_FACTOR;
            }
        }
        for author in &book.authors {
            if weight(&self.authors, author).is_some() {
                score += AUTHOR_SCORE;
            }
        }
        if let Some(language) = &book.language
            && weight(&self.languages, language).is_some()
        {
            score += LANGUAGE_SCORE;
        }
        if let Some(publisher) = &book.publisher
            && weight(&self.publishers, publisher).is_some()
        {
            score += PUBLISHER_SCORE;
        }
        for keyword in &book.keywords {
            if let Some(weight) = weight(&self.keywords, keyword) {
                score += weight.min(KEYWORD_CAP);
            }
        }
        score
    }
}

fn count_all<'a, I>(counts: &mut HashMap<String, usize>, values: I)
where
    I: IntoIterator<Item = &'a String>,
{
    for value in values {
        *counts.entry(value.to_lowercase()).or_default() += 1;
    }
}

fn weight(counts: &HashMap<String, usize>, value: &str) -> Option<f64> {
    counts
        .get(&value.to_lowercase())
        .map(|&count| count as f64)
}
