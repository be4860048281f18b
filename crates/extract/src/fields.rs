//! Keyword heuristics for plain-text safety data sheets.
//!
//! Two shapes are recognized: labelled lines (`Product: Foo`) and numbered
//! SDS section headings (`SECTION 4: First-aid measures`) whose body runs
//! until the next heading.

use regex::Regex;
use std::sync::LazyLock;

use crate::normalizer::{HazardNormalizer, clean_value};
use crate::schema::ExtractedFields;

static LABELLED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d+(?:\.\d+)*\.?\s+)?(?P<label>[A-Za-z][A-Za-z /\-]{0,40}?)\s*:\s*(?P<value>.*)$")
        .unwrap()
});
static SECTION_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*section\s+(?P<number>\d{1,2})\b").unwrap());

const FIRST_AID_SECTION: u32 = 4;
const DISPOSAL_SECTION: u32 = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Product,
    Hazard,
    FirstAid,
    Disposal,
}

impl Field {
    fn from_label(label: &str) -> Option<Self> {
        let label = label.to_ascii_lowercase().replace('-', " ");
        let label = label.split_whitespace().collect::<Vec<_>>().join(" ");

        match label.as_str() {
            "product" | "product name" | "product identifier" | "trade name" => Some(Self::Product),
            "hazard" | "hazards" | "hazard class" | "hazard classes" | "hazard classification"
            | "classification" => Some(Self::Hazard),
            "first aid" | "first aid measures" => Some(Self::FirstAid),
            "disposal" | "disposal considerations" | "disposal instructions" | "disposal methods" => {
                Some(Self::Disposal)
            }
            _ => None,
        }
    }
}

/// Pull safety fields out of free text. Never fails: whatever is not found
/// stays empty.
pub fn extract_text_fields(text: &str) -> ExtractedFields {
    let mut product_name = None;
    let mut hazards = HazardNormalizer::new();
    let mut first_aid: Vec<&str> = Vec::new();
    let mut disposal: Vec<&str> = Vec::new();
    let mut block: Option<Field> = None;

    for line in text.lines() {
        if let Some(caps) = SECTION_HEADING.captures(line) {
            block = match caps["number"].parse::<u32>() {
                Ok(FIRST_AID_SECTION) => Some(Field::FirstAid),
                Ok(DISPOSAL_SECTION) => Some(Field::Disposal),
                _ => None,
            };
            continue;
        }

        if let Some(caps) = LABELLED_LINE.captures(line) {
            let value = caps.name("value").map(|m| m.as_str()).unwrap_or("");

            match Field::from_label(&caps["label"]) {
                Some(Field::Product) => {
                    if product_name.is_none() {
                        product_name = clean_value(value);
                    }
                    continue;
                }
                Some(Field::Hazard) => {
                    hazards.add_list(value);
                    continue;
                }
                Some(field @ (Field::FirstAid | Field::Disposal)) => {
                    let target = if field == Field::FirstAid {
                        &mut first_aid
                    } else {
                        &mut disposal
                    };
                    if value.trim().is_empty() {
                        // body follows on the next lines
                        block = Some(field);
                    } else {
                        target.push(value);
                        block = None;
                    }
                    continue;
                }
                None => {}
            }
        }

        match block {
            Some(Field::FirstAid) => first_aid.push(line),
            Some(Field::Disposal) => disposal.push(line),
            _ => {}
        }
    }

    ExtractedFields {
        product_name,
        hazard_classes: hazards.into_classes(),
        first_aid: join_block(&first_aid),
        disposal: join_block(&disposal),
    }
}

fn join_block(lines: &[&str]) -> Option<String> {
    clean_value(&lines.join(" "))
}
