use std::path::Path;

use super::sanitize::sanitize_extracted_text;
use super::types::ExtractionStrategy;
use super::ExtractionError;

/// Digital PDFs via pdf-extract. Pages are joined in order, one blank-free
/// block per page. A PDF without a text layer (a scan) yields empty text,
/// which the content checks downstream reject.
pub struct PdfStrategy;

impl ExtractionStrategy for PdfStrategy {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn type_keys(&self) -> &'static [&'static str] {
        &["pdf"]
    }

    fn extract_text(&self, path: &Path) -> Result<String, ExtractionError> {
        let bytes = std::fs::read(path)?;
        let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
            .map_err(|e| ExtractionError::PdfParsing(e.to_string()))?;

        let text = pages
            .iter()
            .map(|page| sanitize_extracted_text(page))
            .filter(|page| !page.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            tracing::warn!(path = %path.display(), pages = pages.len(), "PDF has no text layer");
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Document, Object, Stream};

    /// One-page PDF, Helvetica 12pt, one text line per entry in `lines`.
    fn pdf_with_lines(lines: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut ops = String::from("BT /F1 12 Tf 72 720 Td 14 TL\n");
        for line in lines {
            ops.push_str(&format!("({line}) Tj T*\n"));
        }
        ops.push_str("ET");

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let contents_id = doc.add_object(Stream::new(dictionary! {}, ops.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => contents_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
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

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn write_pdf(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn extracts_text_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(
            dir.path(),
            "nda.pdf",
            &pdf_with_lines(&["Mutual nondisclosure agreement.", "Both parties agree."]),
        );

        let text = PdfStrategy.extract_text(&path).unwrap();
        assert!(text.contains("nondisclosure"), "got: {text}");
        assert!(text.contains("parties"), "got: {text}");
    }

    #[test]
    fn page_without_text_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(dir.path(), "scan.pdf", &pdf_with_lines(&[]));
        assert_eq!(PdfStrategy.extract_text(&path).unwrap(), "");
    }

    #[test]
    fn garbage_bytes_are_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(dir.path(), "broken.pdf", b"not a pdf");
        let err = PdfStrategy.extract_text(&path).unwrap_err();
        assert!(matches!(err, ExtractionError::PdfParsing(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = PdfStrategy
            .extract_text(Path::new("/nonexistent/brief.pdf"))
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Io(_)));
    }
}
