use ingest::Document;
use serde_json::{Map, Value};

use crate::error::ExtractError;
use crate::normalizer::{HazardNormalizer, clean_value};
use crate::schema::ExtractedFields;

const PRODUCT_KEYS: &[&str] = &["product_name", "product", "name"];
const HAZARD_KEYS: &[&str] = &["hazard_classes", "hazards", "hazard"];
const FIRST_AID_KEYS: &[&str] = &["first_aid", "first_aid_measures"];
const DISPOSAL_KEYS: &[&str] = &["disposal", "disposal_considerations"];

/// Read fields from a document that declares itself JSON.
///
/// Anything other than a JSON object is malformed. A valid object without a
/// product name simply yields empty fields.
pub fn extract_json_fields(doc: &Document) -> Result<ExtractedFields, ExtractError> {
    let value: Value = serde_json::from_slice(doc.body())
        .map_err(|e| ExtractError::malformed(doc, e.to_string()))?;

    let Value::Object(object) = value else {
        return Err(ExtractError::malformed(doc, "top-level value is not an object"));
    };

    let mut hazards = HazardNormalizer::new();
    for key in HAZARD_KEYS {
        match object.get(*key) {
            Some(Value::String(list)) => hazards.add_list(list),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .for_each(|item| hazards.add(item)),
            _ => {}
        }
    }

    Ok(ExtractedFields {
        product_name: first_string(&object, PRODUCT_KEYS),
        hazard_classes: hazards.into_classes(),
        first_aid: first_string(&object, FIRST_AID_KEYS),
        disposal: first_string(&object, DISPOSAL_KEYS),
    })
}

fn first_string(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .find_map(clean_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn json_doc(content: &str) -> Document {
        Document::new("sheet.json", content.as_bytes().to_vec(), Utc::now())
    }

    #[test]
    fn test_object_fields() {
        let doc = json_doc(
            r#"{"product_name": "Foo", "hazards": ["Flammable", "Toxic"], "first_aid": "Rinse.", "disposal": null}"#,
        );
        let fields = extract_json_fields(&doc).unwrap();

        assert_eq!(fields.product_name.as_deref(), Some("Foo"));
        assert_eq!(fields.hazard_classes.len(), 2);
        assert_eq!(fields.first_aid.as_deref(), Some("Rinse"));
        assert_eq!(fields.disposal, None);
    }

    #[test]
    fn test_hazard_string_is_split() {
        let doc = json_doc(r#"{"product": "Bar", "hazard": "Corrosive; Oxidizer"}"#);
        let fields = extract_json_fields(&doc).unwrap();

        assert!(fields.hazard_classes.contains("Corrosive"));
        assert!(fields.hazard_classes.contains("Oxidizer"));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = extract_json_fields(&json_doc("{\"product\": ")).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedInput { .. }));
    }

    #[test]
    fn test_non_object_is_malformed() {
        let err = extract_json_fields(&json_doc("[1, 2, 3]")).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedInput { .. }));
    }

    #[test]
    fn test_object_without_fields_is_empty() {
        let fields = extract_json_fields(&json_doc(r#"{"version": 3}"#)).unwrap();
        assert_eq!(fields, ExtractedFields::default());
    }

    #[test]
    fn test_byte_order_mark_is_ignored() {
        let fields = extract_json_fields(&json_doc("\u{feff}{\"product\": \"Bar\"}")).unwrap();
        assert_eq!(fields.product_name.as_deref(), Some("Bar"));
    }
}
