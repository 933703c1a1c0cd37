use thiserror::Error;

/// Reasons a single archive is rejected during manifest generation.
///
/// Every variant is fatal to the archive being processed and nothing else:
/// the batch logs it and moves on to the next file.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    #[error("opf package not found in archive: {0}")]
    MissingOpf(String),

    #[error("opf package has no <metadata> element")]
    MissingMetadata,

    #[error("opf metadata has no usable <dc:title>")]
    MissingTitle,

    #[error("opf metadata has no <meta name=\"cover\"> declaration")]
    MissingCoverDeclaration,

    #[error("cover item not found in manifest: {0}")]
    CoverItemNotFound(String),

    #[error("cover item is not an image: {media_type}")]
    NonImageCover { media_type: String },

    #[error("cover asset missing from archive: {0}")]
    CoverAssetMissing(String),

    #[error("zip: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("xml: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a reading session ends up in the `Error` state.
///
/// These are shown to the reader; the session can be reopened or closed.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("this book has no stored archive: {0}")]
    AssetNotFound(String),

    #[error("this book has no readable chapters")]
    NoReadableChapters,

    #[error("could not fetch the book archive: {0}")]
    Fetch(String),

    #[error("could not open the book archive: {0}")]
    Archive(#[from] ExtractError),

    #[error("chapter extraction failed: {0}")]
    Extraction(String),
}
