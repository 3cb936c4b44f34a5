use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{Map, Value};

const RAW_TEMPLATE: &str = include_str!("../schema/extraction_template.json");

/// Shape of the records the extraction stage writes, one JSON object per line.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionTemplate {
    pub id_key: String,
    pub fields: Vec<String>,
}

static TEMPLATE: Lazy<ExtractionTemplate> = Lazy::new(|| {
    serde_json::from_str(RAW_TEMPLATE).expect("extraction template must contain valid JSON")
});

pub fn extraction_template() -> &'static ExtractionTemplate {
    &TEMPLATE
}

/// Field names the extraction stage is asked to fill.
pub fn extraction_fields() -> &'static [String] {
    &TEMPLATE.fields
}

/// An empty JSONL record: the id key and every field set to null.
pub fn record_template() -> String {
    let template = extraction_template();
    let mut record = Map::new();
    record.insert(template.id_key.clone(), Value::Null);
    for field in &template.fields {
        record.insert(field.clone(), Value::Null);
    }
    Value::Object(record).to_string()
}
