#![allow(dead_code)]

use std::io::{Cursor, Write as _};

use zip::write::SimpleFileOptions;

pub const COVER_PNG: &[u8] = &[
    137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13, 73, 72, 68, 82, 0, 0, 0, 1, 0, 0, 0, 1, 8, 4, 0,
    0, 0, 181, 28, 12, 2, 0, 0, 0, 11, 73, 68, 65, 84, 120, 218, 99, 252, 255, 23, 0, 2, 3, 1, 128,
    110, 220, 25, 0, 0, 0, 0, 73, 69, 78, 68, 174, 66, 96, 130,
];

/// Minimal EPUB 2 package: container, OPF under `OEBPS/`, a PNG cover and
/// one XHTML document per chapter.
#[derive(Debug, Clone)]
pub struct EpubFixture {
    pub title: String,
    pub creator: Option<String>,
    pub subjects: Vec<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub chapters: Vec<String>,
}

impl EpubFixture {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_owned(),
            creator: None,
            subjects: Vec::new(),
            description: None,
            language: Some("en".to_owned()),
            chapters: vec!["<p>Only chapter.</p>".to_owned()],
        }
    }

    pub fn creator(mut self, creator: &str) -> Self {
        self.creator = Some(creator.to_owned());
        self
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subjects.push(subject.to_owned());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_owned());
        self
    }

    pub fn chapters(mut self, bodies: &[&str]) -> Self {
        self.chapters = bodies.iter().map(|body| (*body).to_owned()).collect();
        self
    }

    pub fn opf(&self) -> String {
        let mut metadata = format!("<dc:title>{}</dc:title>", self.title);
        if let Some(creator) = &self.creator {
            metadata.push_str(&format!("<dc:creator>{creator}</dc:creator>"));
        }
        for subject in &self.subjects {
            metadata.push_str(&format!("<dc:subject>{subject}</dc:subject>"));
        }
        if let Some(description) = &self.description {
            metadata.push_str(&format!("<dc:description>{description}</dc:description>"));
        }
        if let Some(language) = &self.language {
            metadata.push_str(&format!("<dc:language>{language}</dc:language>"));
        }
        metadata.push_str(r#"<meta name="cover" content="cover-image"/>"#);

        let mut items = String::from(
            r#"<item id="cover-image" href="images/cover.png" media-type="image/png"/>"#,
        );
        let mut spine = String::new();
        for n in 1..=self.chapters.len() {
            items.push_str(&format!(
                r#"<item id="ch{n}" href="text/ch{n}.xhtml" media-type="application/xhtml+xml"/>"#
            ));
            spine.push_str(&format!(r#"<itemref idref="ch{n}"/>"#));
        }

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">{metadata}</metadata>
  <manifest>{items}</manifest>
  <spine>{spine}</spine>
</package>"#
        )
    }

    pub fn build(&self) -> Vec<u8> {
        let mut files: Vec<(String, Vec<u8>)> = vec![
            (
                "META-INF/container.xml".to_owned(),
                br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#
                    .to_vec(),
            ),
            ("OEBPS/content.opf".to_owned(), self.opf().into_bytes()),
            ("OEBPS/images/cover.png".to_owned(), COVER_PNG.to_vec()),
        ];
        for (n, body) in self.chapters.iter().enumerate() {
            files.push((
                format!("OEBPS/text/ch{}.xhtml", n + 1),
                format!("<html><head><title>x</title></head><body>{body}</body></html>").into_bytes(),
            ));
        }
        zip_bytes(&files)
    }
}

pub fn zip_bytes(files: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().last_modified_time(zip::DateTime::default());
    zip.start_file("mimetype", options).expect("start mimetype");
    zip.write_all(b"application/epub+zip").expect("write mimetype");
    for (name, body) in files {
        zip.start_file(name.as_str(), options).expect("start zip entry");
        zip.write_all(body).expect("write zip entry");
    }
    zip.finish().expect("finish zip").into_inner()
}
