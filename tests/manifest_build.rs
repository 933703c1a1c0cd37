mod fixtures;

use std::fs;
use std::path::Path;

use epubshelf::catalog::Catalog;
use epubshelf::formats::{CoverIndex, RawManifestEntry};
use epubshelf::manifest::{self, ManifestOptions, ManifestSummary};
use fixtures::{COVER_PNG, EpubFixture, zip_bytes};

fn options(root: &Path) -> ManifestOptions {
    ManifestOptions {
        input_dir: root.join("library"),
        out_dir: root.join("out"),
        covers_dir: root.join("out/covers"),
        cover_prefix: "covers".to_owned(),
        archive_store: None,
    }
}

fn read_entries(options: &ManifestOptions) -> Vec<RawManifestEntry> {
    let json = fs::read_to_string(options.out_dir.join(manifest::MANIFEST_FILE)).unwrap();
    serde_json::from_str(&json).unwrap()
}

fn write_library(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(
        dir.join("dragons.epub"),
        EpubFixture::new("The Dragon Road")
            .creator("Ann Writer")
            .subject("Fantasy -- Epic")
            .build(),
    )
    .unwrap();
    fs::write(
        dir.join("detective.epub"),
        EpubFixture::new("Quiet Streets")
            .description("A detective investigates a murder in the docks.")
            .build(),
    )
    .unwrap();
}

#[test]
fn repeated_runs_are_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let options = options(dir.path());
    write_library(&options.input_dir);

    manifest::build(&options).unwrap();
    let first_manifest = fs::read(options.out_dir.join(manifest::MANIFEST_FILE)).unwrap();
    let first_covers = fs::read(options.out_dir.join(manifest::COVERS_FILE)).unwrap();

    manifest::build(&options).unwrap();
    assert_eq!(fs::read(options.out_dir.join(manifest::MANIFEST_FILE)).unwrap(), first_manifest);
    assert_eq!(fs::read(options.out_dir.join(manifest::COVERS_FILE)).unwrap(), first_covers);

    let entries = read_entries(&options);
    assert_eq!(entries.len(), 2);
    // Sorted by file name: detective.epub before dragons.epub.
    assert_eq!(entries[0].title, "Quiet Streets");
    assert_eq!(entries[1].title, "The Dragon Road");
    for entry in &entries {
        let cover = options.out_dir.join(&entry.cover);
        assert_eq!(fs::read(cover).unwrap(), COVER_PNG);
    }
}

#[test]
fn identical_bytes_hash_identically_under_other_names() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = EpubFixture::new("Same Book").build();

    let first = options(&dir.path().join("first"));
    fs::create_dir_all(&first.input_dir).unwrap();
    fs::write(first.input_dir.join("original.epub"), &bytes).unwrap();
    manifest::build(&first).unwrap();

    let second = options(&dir.path().join("second"));
    fs::create_dir_all(&second.input_dir).unwrap();
    fs::write(second.input_dir.join("renamed copy.EPUB"), &bytes).unwrap();
    manifest::build(&second).unwrap();

    let a = &read_entries(&first)[0];
    let b = &read_entries(&second)[0];
    assert_eq!(a.content_hash, b.content_hash);
    assert_eq!(a.id, b.id);
    assert_eq!(a.cover, b.cover);
    assert_eq!(b.file.name, "renamed copy.EPUB");
    assert_eq!(b.file.size, bytes.len() as u64);
}

#[test]
fn malformed_archives_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let options = options(dir.path());
    fs::create_dir_all(&options.input_dir).unwrap();

    let good = EpubFixture::new("Good Book");
    fs::write(options.input_dir.join("a-good.epub"), good.build()).unwrap();
    fs::write(options.input_dir.join("b-not-a-zip.epub"), b"plain text").unwrap();
    fs::write(
        options.input_dir.join("c-no-container.epub"),
        zip_bytes(&[("OEBPS/content.opf".to_owned(), good.opf().into_bytes())]),
    )
    .unwrap();

    let no_cover_meta = good
        .opf()
        .replace(r#"<meta name="cover" content="cover-image"/>"#, "");
    fs::write(
        options.input_dir.join("d-no-cover.epub"),
        zip_bytes(&[
            container(),
            ("OEBPS/content.opf".to_owned(), no_cover_meta.into_bytes()),
        ]),
    )
    .unwrap();

    let css_cover = good.opf().replace(
        r#"href="images/cover.png" media-type="image/png""#,
        r#"href="images/cover.css" media-type="text/css""#,
    );
    fs::write(
        options.input_dir.join("e-css-cover.epub"),
        zip_bytes(&[
            container(),
            ("OEBPS/content.opf".to_owned(), css_cover.into_bytes()),
            ("OEBPS/images/cover.css".to_owned(), b"p {}".to_vec()),
        ]),
    )
    .unwrap();

    let summary = manifest::build(&options).unwrap();
    assert_eq!(
        summary,
        ManifestSummary {
            processed: 1,
            skipped: 4,
            duplicates: 0
        }
    );

    let entries = read_entries(&options);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title, "Good Book");

    let covers: CoverIndex = serde_json::from_str(
        &fs::read_to_string(options.out_dir.join(manifest::COVERS_FILE)).unwrap(),
    )
    .unwrap();
    assert_eq!(covers.keys().collect::<Vec<_>>(), vec![&entries[0].id]);
}

#[test]
fn built_manifest_loads_into_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let options = options(dir.path());
    write_library(&options.input_dir);
    manifest::build(&options).unwrap();

    let catalog = Catalog::load(&options.out_dir.join(manifest::MANIFEST_FILE)).unwrap();
    assert_eq!(catalog.len(), 2);

    let titles: Vec<&str> = catalog.books().iter().map(|book| book.title.as_str()).collect();
    assert_eq!(titles, vec!["Quiet Streets", "The Dragon Road"]);

    let found = catalog.search("dragon ann");
    assert_eq!(found.len(), 1);
    let dragon = found[0];
    assert_eq!(dragon.genres, vec!["Fantasy"]);
    assert_eq!(dragon.subjects, vec!["Fantasy -- Epic"]);

    let mysteries = catalog.filter_by_genre("mystery");
    let streets = mysteries[0];
    assert_eq!(streets.title, "Quiet Streets");
    assert_eq!(streets.language.as_deref(), Some("en"));
}

fn container() -> (String, Vec<u8>) {
    (
        "META-INF/container.xml".to_owned(),
        br#"<container><rootfiles><rootfile full-path="OEBPS/content.opf"/></rootfiles></container>"#
            .to_vec(),
    )
}
