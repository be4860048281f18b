use ingest::Document;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::debug;

use crate::error::ExtractError;

/// Pull the text layer out of a PDF.
///
/// Scanned sheets without a text layer come back as an empty string rather
/// than an error. `pdf-extract` can panic on damaged files, which is reported
/// as malformed input.
pub fn extract_pdf_text(doc: &Document) -> Result<String, ExtractError> {
    let result = catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(doc.content())
    }));

    match result {
        Ok(Ok(text)) => {
            debug!(path = %doc.path, chars = text.len(), "Extracted PDF text layer");
            Ok(text)
        }
        Ok(Err(e)) => Err(ExtractError::malformed(doc, e.to_string())),
        Err(_) => Err(ExtractError::malformed(doc, "PDF parser panicked")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Extractor;
    use chrono::Utc;

    const HELVETICA: &str =
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>";

    /// A one-page PDF with a correct xref table. `font` becomes object 5 and
    /// is available to the content stream as `/F1`.
    fn build_pdf(content: &str, font: Option<&str>) -> Vec<u8> {
        let resources = if font.is_some() { "<< /Font << /F1 5 0 R >> >>" } else { "<< >>" };
        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources {} /Contents 4 0 R >>",
                resources
            ),
            format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content),
        ];
        objects.extend(font.map(String::from));

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }

        let xref = pdf.len();
        pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
        for offset in offsets {
            pdf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        pdf.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref
            )
            .as_bytes(),
        );
        pdf
    }

    fn pdf_doc(content: Vec<u8>) -> Document {
        Document::new("sheet.pdf", content, Utc::now())
    }

    #[test]
    fn test_truncated_pdf_is_malformed() {
        let doc = pdf_doc(b"%PDF-1.4\n1 0 obj\n<<".to_vec());
        let err = extract_pdf_text(&doc).unwrap_err();

        assert!(matches!(err, ExtractError::MalformedInput { .. }));
    }

    #[test]
    fn test_text_layer_becomes_record() {
        let content = "BT /F1 12 Tf 72 720 Td (Product: Foo) Tj 0 -40 Td (Hazard: Flammable) Tj ET";
        let doc = pdf_doc(build_pdf(content, Some(HELVETICA)));

        let text = extract_pdf_text(&doc).unwrap();
        assert!(text.contains("Product: Foo"));

        let record = Extractor::new().extract(&doc).unwrap().unwrap();
        assert_eq!(record.product_name, "Foo");
        assert!(record.hazard_classes.contains("Flammable"));
    }

    #[test]
    fn test_page_without_text_yields_no_record() {
        // Drawing operators only, like a scanned sheet with no text layer
        let doc = pdf_doc(build_pdf("q 0 0 m 100 100 l S Q", None));

        assert_eq!(extract_pdf_text(&doc).unwrap().trim(), "");
        assert_eq!(Extractor::new().extract(&doc).unwrap(), None);
    }
}
