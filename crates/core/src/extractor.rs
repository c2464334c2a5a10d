use crate::error::IngestError;
use crate::models::Document;
use lopdf::Document as PdfDocument;
use std::path::Path;
use tracing::{debug, warn};

pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl TextExtractor for LopdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, IngestError> {
        let document =
            PdfDocument::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            match document.extract_text(&[page_no]) {
                Ok(text) if !text.trim().is_empty() => pages.push(text),
                Ok(_) => {}
                Err(error) => debug!(page = page_no, %error, "skipping unreadable page"),
            }
        }

        Ok(pages.join("\n\n"))
    }
}

/// Best-effort text of one document. Failures are logged and yield an empty string.
pub fn extract_text<X>(extractor: &X, document: &Document) -> String
where
    X: TextExtractor + ?Sized,
{
    match extractor.extract(&document.bytes) {
        Ok(text) => text,
        Err(error) => {
            warn!(document = %document.name, %error, "text extraction failed");
            String::new()
        }
    }
}

pub async fn extract_text_from_path<X>(extractor: &X, path: &Path) -> String
where
    X: TextExtractor + ?Sized,
{
    match Document::from_path(path).await {
        Ok(document) => extract_text(extractor, &document),
        Err(error) => {
            warn!(path = %path.display(), %error, "unable to read pdf");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    fn single_page_pdf(line: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut doc = PdfDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(line)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)?;
        Ok(buffer)
    }

    #[test]
    fn extracts_text_from_generated_pdf() -> Result<(), Box<dyn std::error::Error>> {
        let bytes = single_page_pdf("Hydraulic pump manual")?;
        let document = Document::new("manual.pdf", bytes);

        let text = extract_text(&LopdfExtractor, &document);
        assert!(text.contains("Hydraulic pump manual"), "got {text:?}");
        Ok(())
    }

    #[test]
    fn broken_pdf_yields_empty_text() {
        let document = Document::new("broken.pdf", b"%PDF-1.4\n%broken".to_vec());
        assert_eq!(extract_text(&LopdfExtractor, &document), "");
    }

    #[tokio::test]
    async fn missing_path_yields_empty_text() {
        let text =
            extract_text_from_path(&LopdfExtractor, Path::new("/definitely/not/here.pdf")).await;
        assert!(text.is_empty());
    }
}
