use std::path::{Path, PathBuf};

use lopdf::Object;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{Document, Metadata};

/// Files matching `pattern`, sorted and without duplicates.
pub fn discover(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob::glob(pattern)
        .map_err(|e| Error::Load(format!("invalid pattern {pattern:?}: {e}")))?;

    let mut files = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| Error::Load(e.to_string()))?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    files.dedup();

    if files.is_empty() {
        return Err(Error::Load(format!("no files match {pattern:?}")));
    }
    Ok(files)
}

/// Load one file: a document per page for PDFs, one document otherwise.
pub fn load_file(path: &Path) -> Result<Vec<Document>> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

    if is_pdf {
        load_pdf(path)
    } else {
        load_text(path)
    }
}

fn load_text(path: &Path) -> Result<Vec<Document>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Load(format!("{}: {e}", path.display())))?;

    let mut metadata = Metadata::new();
    metadata.insert("source".into(), Value::String(path.display().to_string()));
    Ok(vec![Document { text, metadata }])
}

fn load_pdf(path: &Path) -> Result<Vec<Document>> {
    let pdf = lopdf::Document::load(path)
        .map_err(|e| Error::Load(format!("{}: {e}", path.display())))?;

    let info = info_metadata(&pdf);
    let pages = pdf.get_pages();
    let total_pages = pages.len();

    let mut documents = Vec::with_capacity(total_pages);
    for (index, page_number) in pages.keys().enumerate() {
        let text = pdf.extract_text(&[*page_number]).map_err(|e| {
            Error::Load(format!("{} page {page_number}: {e}", path.display()))
        })?;

        let mut metadata = info.clone();
        metadata.insert("source".into(), Value::String(path.display().to_string()));
        metadata.insert("page".into(), Value::from(index));
        metadata.insert("total_pages".into(), Value::from(total_pages));
        documents.push(Document { text, metadata });
    }

    tracing::debug!("Loaded {} pages from {}", total_pages, path.display());
    Ok(documents)
}

/// Entries of the trailer's Info dictionary, keys lower-cased.
fn info_metadata(pdf: &lopdf::Document) -> Metadata {
    let mut metadata = Metadata::new();

    let dict = match pdf.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => pdf.get_dictionary(*id).ok(),
        Ok(Object::Dictionary(dict)) => Some(dict),
        _ => None,
    };
    let Some(dict) = dict else {
        return metadata;
    };

    for (key, value) in dict.iter() {
        let key = String::from_utf8_lossy(key).to_lowercase();
        if let Some(value) = object_text(value) {
            metadata.insert(key, Value::String(value));
        }
    }
    metadata
}

fn object_text(object: &Object) -> Option<String> {
    match object {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        Object::Integer(i) => Some(i.to_string()),
        Object::Real(r) => Some(r.to_string()),
        Object::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

/// PDF text strings are UTF-16BE when they start with a byte-order mark,
/// otherwise (close enough to) Latin-1/UTF-8.
fn decode_pdf_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_sorts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("sub.txt")).unwrap();

        let pattern = format!("{}/*.txt", dir.path().display());
        let files = discover(&pattern).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("a.txt"), dir.path().join("b.txt")]
        );
    }

    #[test]
    fn test_discover_recursive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("x/y")).unwrap();
        std::fs::write(dir.path().join("x/y/deep.md"), "deep").unwrap();

        let pattern = format!("{}/**/*.md", dir.path().display());
        assert_eq!(discover(&pattern).unwrap().len(), 1);
    }

    #[test]
    fn test_discover_no_match_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/*.pdf", dir.path().display());
        assert!(matches!(discover(&pattern), Err(Error::Load(_))));
    }

    #[test]
    fn test_load_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello world").unwrap();

        let docs = load_file(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "hello world");
        assert_eq!(docs[0].metadata["source"], path.display().to_string());
    }

    #[test]
    fn test_corrupt_pdf_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, "not a pdf").unwrap();
        assert!(matches!(load_file(&path), Err(Error::Load(_))));
    }

    fn write_two_page_pdf(path: &Path) {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Stream};

        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in ["First page text", "Second page text"] {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => 2,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let info_id = doc.add_object(dictionary! {
            "Producer" => Object::string_literal("rag-chat tests"),
            "CreationDate" => Object::string_literal("D:20240101000000Z"),
        });
        doc.trailer.set("Info", info_id);

        doc.save(path).unwrap();
    }

    #[test]
    fn test_pdf_loads_one_document_per_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.pdf");
        write_two_page_pdf(&path);

        let docs = load_file(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].text.contains("First page text"));
        assert!(docs[1].text.contains("Second page text"));

        for (index, doc) in docs.iter().enumerate() {
            assert_eq!(doc.metadata["source"], path.display().to_string());
            assert_eq!(doc.metadata["page"], index);
            assert_eq!(doc.metadata["total_pages"], 2);
            assert_eq!(doc.metadata["producer"], "rag-chat tests");
            assert_eq!(doc.metadata["creationdate"], "D:20240101000000Z");
            assert!(!doc.metadata.contains_key("Producer"));
        }
    }

    #[test]
    fn test_decode_utf16_string() {
        let bytes = [0xFE, 0xFF, 0x00, b'H', 0x00, b'i'];
        assert_eq!(decode_pdf_string(&bytes), "Hi");
        assert_eq!(decode_pdf_string(b"Plain"), "Plain");
    }
}
