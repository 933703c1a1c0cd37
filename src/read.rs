//! The `read` command: one step of a reading session against local stores.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;

use crate::catalog::Catalog;
use crate::cli::{ReadAction, ReadArgs};
use crate::reader::{ReaderSession, SessionState};
use crate::store::{LocalFsArchiveStore, LocalFsProgressStore};

pub const USER_ENV: &str = "EPUBSHELF_USER";
pub const DEFAULT_USER: &str = "local";

pub async fn run(args: ReadArgs, out: &mut dyn Write) -> anyhow::Result<()> {
    let catalog = Catalog::load(Path::new(&args.catalog.manifest))?;
    let book = catalog
        .get_book_by_id(&args.book)
        .ok_or_else(|| anyhow::anyhow!("book not found: {}", args.book))?;

    let user = resolve_user(args.user, std::env::var(USER_ENV).ok());
    tracing::debug!(book = %book.id, %user, "opening reading session");

    let archives = Arc::new(LocalFsArchiveStore::new(&args.archive_store));
    let progress = Arc::new(LocalFsProgressStore::new(&args.progress_dir, user));
    let mut session = ReaderSession::new(book, archives, progress);

    match session.open().await {
        SessionState::Ready => {}
        SessionState::Error(message) => anyhow::bail!("open {}: {message}", book.title),
        other => anyhow::bail!("open {}: unexpected session state {other:?}", book.title),
    }

    match args.action {
        ReadAction::Current => {}
        ReadAction::Next => {
            if !session.next().await {
                tracing::info!("already at the last chapter");
            }
        }
        ReadAction::Previous => {
            if !session.previous().await {
                tracing::info!("already at the first chapter");
            }
        }
    }

    let chapter = session
        .current_chapter()
        .ok_or_else(|| anyhow::anyhow!("no current chapter"))?;
    writeln!(
        out,
        "[{}/{}] {} ({:.0}%)",
        session.current_index() + 1,
        session.chapters().len(),
        chapter.title,
        session.percent_complete()
    )
    .context("write chapter header")?;
    writeln!(out).context("write chapter")?;
    writeln!(out, "{}", chapter.text).context("write chapter")?;

    session.close();
    Ok(())
}

/// Explicit flag, then environment, then [`DEFAULT_USER`].
fn resolve_user(flag: Option<String>, env: Option<String>) -> String {
    flag.or(env)
        .map(|user| user.trim().to_owned())
        .filter(|user| !user.is_empty())
        .unwrap_or_else(|| DEFAULT_USER.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_prefers_flag_then_env() {
        assert_eq!(resolve_user(Some("ann".into()), Some("bob".into())), "ann");
        assert_eq!(resolve_user(None, Some("bob".into())), "bob");
        assert_eq!(resolve_user(None, Some("  ".into())), "local");
        assert_eq!(resolve_user(None, None), "local");
    }
}
