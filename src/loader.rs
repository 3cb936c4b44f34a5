//! Reads ground truth and predictions into `document id -> record` datasets.

use calamine::{open_workbook_auto, Data, DataType, Reader};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{EvaluationError, InputKind};
use crate::value::{merge_field, try_parse_nested, Dataset, DocumentRecord, FieldValue, ParsedValue};

/// Keys checked for a truthy document id after the configured id column.
const PRIMARY_ID_KEYS: [&str; 3] = ["id", "document_id", "doc_id"];
/// Keys checked, by presence only, when the primary lookup gives nothing.
const FALLBACK_ID_KEYS: [&str; 3] = ["documentId", "docId", "doc_id"];
/// Field name used when a prediction is a bare scalar rather than an object.
pub const SCALAR_PREDICTION_FIELD: &str = "prediction";
/// Rendering of spreadsheet date cells.
const SPREADSHEET_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    JsonLines,
    Table(TableFormat),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableFormat {
    Csv,
    Spreadsheet,
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

fn table_format(path: &Path, input: InputKind) -> Result<TableFormat, EvaluationError> {
    match extension_of(path).as_str() {
        ".csv" => Ok(TableFormat::Csv),
        ".xlsx" | ".xls" => Ok(TableFormat::Spreadsheet),
        other => Err(EvaluationError::UnsupportedExtension {
            input,
            extension: other.to_string(),
        }),
    }
}

fn prediction_format(path: &Path) -> Result<Format, EvaluationError> {
    match extension_of(path).as_str() {
        ".json" | ".jsn" => Ok(Format::Json),
        ".jsonl" => Ok(Format::JsonLines),
        _ => table_format(path, InputKind::Predictions).map(Format::Table),
    }
}

fn ensure_exists(path: &Path) -> Result<(), EvaluationError> {
    if path.exists() {
        Ok(())
    } else {
        Err(EvaluationError::FileNotFound(path.to_path_buf()))
    }
}

/// Loads a `.csv`, `.xlsx` or `.xls` ground-truth table keyed by `id_column`.
///
/// Every cell is kept as text; empty cells become empty strings so that the
/// evaluator can tell "no ground truth" apart from "no column".
pub fn load_ground_truth(path: &Path, id_column: &str) -> Result<Dataset, EvaluationError> {
    let format = table_format(path, InputKind::GroundTruth)?;
    ensure_exists(path)?;
    let table = Table::read(path, format)?;
    let id_index = table.id_index(id_column, InputKind::GroundTruth)?;

    let mut records = Dataset::new();
    for row in &table.rows {
        let Some(doc_id) = row_document_id(row, id_index) else {
            continue;
        };
        let record: DocumentRecord = table
            .headers
            .iter()
            .zip(row)
            .enumerate()
            .filter(|(idx, _)| *idx != id_index)
            .map(|(_, (header, cell))| (header.clone(), FieldValue::text(cell.as_str())))
            .collect();
        records.insert(doc_id, record);
    }
    info!(documents = records.len(), path = %path.display(), "loaded ground truth");
    Ok(records)
}

/// Loads predictions from JSON, JSON lines, CSV or a spreadsheet.
///
/// String values holding serialized JSON objects are expanded into fields of
/// the enclosing document.
pub fn load_predictions(path: &Path, id_column: &str) -> Result<Dataset, EvaluationError> {
    let format = prediction_format(path)?;
    ensure_exists(path)?;
    let records = match format {
        Format::Json => {
            let payload = fs::read_to_string(path)?;
            parse_json_predictions(&payload, id_column)?
        }
        Format::JsonLines => {
            let payload = fs::read_to_string(path)?;
            parse_jsonl_predictions(&payload, id_column)
        }
        Format::Table(format) => {
            let table = Table::read(path, format)?;
            table_predictions(&table, id_column)?
        }
    };
    info!(documents = records.len(), path = %path.display(), "loaded predictions");
    Ok(records)
}

/// Parses a JSON predictions payload: either an object mapping document id to
/// fields, or an array of document objects.
pub fn parse_json_predictions(payload: &str, id_column: &str) -> Result<Dataset, EvaluationError> {
    let mut records = Dataset::new();
    match serde_json::from_str::<Value>(payload)? {
        Value::Object(map) => {
            for (key, value) in &map {
                let doc_id = key.trim();
                if doc_id.is_empty() {
                    debug!("skipping prediction with an empty document id");
                    continue;
                }
                records.insert(doc_id.to_string(), record_from_value(value));
            }
        }
        Value::Array(items) => {
            for item in &items {
                match item {
                    Value::Object(object) => insert_item(&mut records, object, id_column),
                    _ => debug!("skipping non-object prediction entry"),
                }
            }
        }
        _ => return Err(EvaluationError::UnsupportedJsonStructure),
    }
    Ok(records)
}

/// Parses one JSON object per line. Blank, malformed and non-object lines are
/// skipped without failing the load.
pub fn parse_jsonl_predictions(payload: &str, id_column: &str) -> Dataset {
    let mut records = Dataset::new();
    for (idx, line) in payload.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(object)) => insert_item(&mut records, &object, id_column),
            Ok(_) => warn!(line = idx + 1, "skipping JSONL line that is not an object"),
            Err(err) => warn!(line = idx + 1, error = %err, "skipping malformed JSONL line"),
        }
    }
    records
}

fn record_from_value(value: &Value) -> DocumentRecord {
    if let Value::Object(map) = value {
        return collect_fields(map, &[]);
    }
    match try_parse_nested(value) {
        ParsedValue::Nested(entries) => {
            let mut record = DocumentRecord::new();
            for (key, field) in entries {
                record.entry(key).or_insert(field);
            }
            record
        }
        ParsedValue::Scalar(scalar) => {
            DocumentRecord::from([(SCALAR_PREDICTION_FIELD.to_string(), scalar)])
        }
    }
}

fn insert_item(records: &mut Dataset, item: &Map<String, Value>, id_column: &str) {
    let Some(doc_id) = find_document_id(item, id_column) else {
        debug!("skipping prediction without a document id");
        return;
    };
    let record = match item.get("fields") {
        Some(Value::Object(fields)) => collect_fields(fields, &[]),
        _ => {
            let skip = [id_column, "id", "document_id", "doc_id"];
            collect_fields(item, &skip)
        }
    };
    records.insert(doc_id, record);
}

fn collect_fields(map: &Map<String, Value>, skip: &[&str]) -> DocumentRecord {
    let mut record = DocumentRecord::new();
    for (key, value) in map {
        if skip.contains(&key.as_str()) {
            continue;
        }
        merge_field(&mut record, key, value);
    }
    record
}

fn find_document_id(item: &Map<String, Value>, id_column: &str) -> Option<String> {
    let primary = std::iter::once(id_column)
        .chain(PRIMARY_ID_KEYS)
        .filter_map(|key| item.get(key))
        .find(|value| is_truthy(value))
        .or_else(|| item.get("doc_id"))
        .map(id_text)
        .unwrap_or_default();
    let mut doc_id = primary.trim().to_string();
    if doc_id.is_empty() {
        if let Some(value) = FALLBACK_ID_KEYS.iter().find_map(|key| item.get(*key)) {
            doc_id = id_text(value).trim().to_string();
        }
    }
    (!doc_id.is_empty()).then_some(doc_id)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn id_text(value: &Value) -> String {
    FieldValue::from_json(value).raw_text()
}

fn table_predictions(table: &Table, id_column: &str) -> Result<Dataset, EvaluationError> {
    let id_index = table.id_index(id_column, InputKind::Predictions)?;
    let mut records = Dataset::new();
    for row in &table.rows {
        let Some(doc_id) = row_document_id(row, id_index) else {
            continue;
        };
        let mut record = DocumentRecord::new();
        for (idx, (header, cell)) in table.headers.iter().zip(row).enumerate() {
            if idx == id_index {
                continue;
            }
            merge_field(&mut record, header, &Value::String(cell.clone()));
        }
        records.insert(doc_id, record);
    }
    Ok(records)
}

fn row_document_id(row: &[String], id_index: usize) -> Option<String> {
    let doc_id = row.get(id_index).map(|cell| cell.trim()).unwrap_or_default();
    (!doc_id.is_empty()).then(|| doc_id.to_string())
}

/// A header row plus data rows, every row padded to the header width.
#[derive(Debug, Clone, Default, PartialEq)]
struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn read(path: &Path, format: TableFormat) -> Result<Self, EvaluationError> {
        match format {
            TableFormat::Csv => Self::read_csv(path),
            TableFormat::Spreadsheet => Self::read_spreadsheet(path),
        }
    }

    fn read_csv(path: &Path) -> Result<Self, EvaluationError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let row = (0..headers.len())
                .map(|idx| record.get(idx).unwrap_or_default().to_string())
                .collect();
            rows.push(row);
        }
        Ok(Self { headers, rows })
    }

    fn read_spreadsheet(path: &Path) -> Result<Self, EvaluationError> {
        let mut workbook = open_workbook_auto(path)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| EvaluationError::EmptyWorkbook(path.to_path_buf()))??;
        let mut rows = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect::<Vec<String>>());
        let headers = rows.next().unwrap_or_default();
        let rows = rows
            .map(|mut row| {
                row.resize(headers.len(), String::new());
                row
            })
            .collect();
        Ok(Self { headers, rows })
    }

    fn id_index(&self, id_column: &str, input: InputKind) -> Result<usize, EvaluationError> {
        self.headers
            .iter()
            .position(|header| header == id_column)
            .ok_or_else(|| EvaluationError::MissingIdColumn {
                input,
                column: id_column.to_string(),
                available: self.headers.clone(),
            })
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|dt| dt.format(SPREADSHEET_DATETIME_FORMAT).to_string())
            .unwrap_or_else(|| cell.to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use assert_fs::TempDir;
    use rust_xlsxwriter::{ExcelDateTime, Format as CellFormat, Workbook};
    use std::path::PathBuf;

    fn text(s: &str) -> FieldValue {
        FieldValue::text(s)
    }

    fn write_temp(temp: &TempDir, name: &str, contents: &str) -> PathBuf {
        let file = temp.child(name);
        file.write_str(contents).unwrap();
        file.path().to_path_buf()
    }

    #[test]
    fn jsonl_expands_nested_field_strings() {
        let payload = r#"{"id": "doc1", "fields": "{\"Name\": \"Bob\"}"}"#;
        let records = parse_jsonl_predictions(payload, "Field");
        assert_eq!(records.len(), 1);
        assert_eq!(records["doc1"].len(), 1);
        assert_eq!(records["doc1"]["Name"], text("Bob"));
    }

    #[test]
    fn jsonl_skips_blank_and_malformed_lines() {
        let payload = "\n{\"id\": \"a\", \"Name\": \"A\"}\n{broken\n[1, 2]\n   \n{\"id\": \"b\", \"Name\": \"B\"}\n";
        let records = parse_jsonl_predictions(payload, "Field");
        let ids: Vec<_> = records.keys().map(String::as_str).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn json_object_maps_ids_to_fields_or_scalars() {
        let payload = r#"{
            " doc1 ": {"Name": "Alice", "Armor": 3},
            "doc2": "{\"Name\": \"Bob\"}",
            "doc3": "just text"
        }"#;
        let records = parse_json_predictions(payload, "Field").unwrap();
        assert_eq!(records["doc1"]["Name"], text("Alice"));
        assert_eq!(records["doc1"]["Armor"].raw_text(), "3");
        assert_eq!(records["doc2"]["Name"], text("Bob"));
        assert_eq!(records["doc3"][SCALAR_PREDICTION_FIELD], text("just text"));
    }

    #[test]
    fn json_array_uses_id_fallbacks_and_fields_object() {
        let payload = r#"[
            {"Field": "", "id": "doc1", "Name": "Alice"},
            {"document_id": "doc2", "fields": {"Name": "Bob"}, "Name": "ignored"},
            {"docId": "doc3", "Name": "Cara"},
            {"Name": "orphan"},
            "not an object"
        ]"#;
        let records = parse_json_predictions(payload, "Field").unwrap();
        let ids: Vec<_> = records.keys().map(String::as_str).collect();
        assert_eq!(ids, ["doc1", "doc2", "doc3"]);
        assert_eq!(records["doc1"].get("Field"), None);
        assert_eq!(records["doc1"]["Name"], text("Alice"));
        assert_eq!(records["doc2"]["Name"], text("Bob"));
        // docId is not one of the skipped id keys
        assert_eq!(records["doc3"]["docId"], text("doc3"));
    }

    #[test]
    fn json_numeric_ids_are_stringified() {
        let payload = r#"[{"id": 42, "Name": "Alice"}]"#;
        let records = parse_json_predictions(payload, "Field").unwrap();
        assert!(records.contains_key("42"));
    }

    #[test]
    fn json_scalar_root_is_rejected() {
        let err = parse_json_predictions("42", "Field").unwrap_err();
        assert!(matches!(err, EvaluationError::UnsupportedJsonStructure));
    }

    #[test]
    fn ground_truth_csv_keeps_empty_cells() {
        let temp = TempDir::new().unwrap();
        let path = write_temp(
            &temp,
            "truth.csv",
            "Field,Name,Armor\ndoc1,Alice,\n  ,Nobody,1\ndoc2,Bob\n",
        );
        let records = load_ground_truth(&path, "Field").unwrap();
        let ids: Vec<_> = records.keys().map(String::as_str).collect();
        assert_eq!(ids, ["doc1", "doc2"]);
        assert_eq!(records["doc1"]["Armor"], text(""));
        assert_eq!(records["doc2"]["Armor"], text(""));
        assert_eq!(records["doc2"]["Name"], text("Bob"));
    }

    #[test]
    fn ground_truth_requires_id_column() {
        let temp = TempDir::new().unwrap();
        let path = write_temp(&temp, "missing_id.csv", "DocId,Name\ndoc1,Alice\n");
        let err = load_ground_truth(&path, "Field").unwrap_err();
        match err {
            EvaluationError::MissingIdColumn { column, available, .. } => {
                assert_eq!(column, "Field");
                assert_eq!(available, ["DocId", "Name"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn ground_truth_rejects_json() {
        let temp = TempDir::new().unwrap();
        let path = write_temp(&temp, "truth.json", "{}");
        let err = load_ground_truth(&path, "Field").unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::UnsupportedExtension { ref extension, .. } if extension == ".json"
        ));
    }

    #[test]
    fn predictions_reject_unknown_extension() {
        let temp = TempDir::new().unwrap();
        let path = write_temp(&temp, "predictions.txt", "doc1");
        let err = load_predictions(&path, "Field").unwrap_err();
        assert!(err.to_string().contains("'.txt'"));
    }

    fn write_workbook(temp: &TempDir, name: &str) -> PathBuf {
        let path = temp.child(name).path().to_path_buf();
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        let date_format = CellFormat::new().set_num_format("yyyy-mm-dd");
        for (col, header) in ["Field", "Name", "Evasion", "Armor", "Gold", "InvoiceDate"]
            .iter()
            .enumerate()
        {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        sheet.write_string(1, 0, "doc1").unwrap();
        sheet.write_string(1, 1, "Alice").unwrap();
        sheet.write_number(1, 2, 12.0).unwrap();
        // Armor left empty
        sheet.write_number(1, 4, 1.5).unwrap();
        let invoice_date = ExcelDateTime::from_ymd(2024, 1, 2).unwrap();
        sheet
            .write_datetime_with_format(1, 5, &invoice_date, &date_format)
            .unwrap();
        sheet.write_number(2, 0, 7.0).unwrap();
        sheet.write_string(2, 1, "{\"Name\": \"Bob\", \"Armor\": \"2\"}").unwrap();
        sheet.write_string(2, 3, "4").unwrap();
        workbook.save(&path).unwrap();
        path
    }

    #[test]
    fn ground_truth_xlsx_loads_cells_as_text() {
        let temp = TempDir::new().unwrap();
        let path = write_workbook(&temp, "truth.xlsx");
        let records = load_ground_truth(&path, "Field").unwrap();

        let ids: Vec<_> = records.keys().map(String::as_str).collect();
        assert_eq!(ids, ["doc1", "7"]);
        let doc1 = &records["doc1"];
        assert_eq!(doc1["Name"], text("Alice"));
        assert_eq!(doc1["Evasion"], text("12"));
        assert_eq!(doc1["Armor"], text(""));
        assert_eq!(doc1["Gold"], text("1.5"));
        assert_eq!(doc1["InvoiceDate"], text("2024-01-02 00:00:00"));
        assert_eq!(records["7"]["InvoiceDate"], text(""));
    }

    #[test]
    fn xlsx_predictions_expand_nested_cells() {
        let temp = TempDir::new().unwrap();
        let path = write_workbook(&temp, "predictions.xlsx");
        let records = load_predictions(&path, "Field").unwrap();

        assert_eq!(records["doc1"]["Evasion"], text("12"));
        assert_eq!(records["doc1"]["InvoiceDate"], text("2024-01-02 00:00:00"));
        let doc7 = &records["7"];
        assert_eq!(doc7["Name"], text("Bob"));
        // the Armor column comes after the nested cell and replaces its value
        assert_eq!(doc7["Armor"], text("4"));
    }

    #[test]
    fn xlsx_missing_id_column_lists_headers() {
        let temp = TempDir::new().unwrap();
        let path = write_workbook(&temp, "truth.xlsx");
        let err = load_ground_truth(&path, "DocId").unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::MissingIdColumn { ref available, .. } if available[5] == "InvoiceDate"
        ));
    }

    #[test]
    fn extension_is_checked_before_existence() {
        let err = load_predictions(Path::new("/definitely/not/here.txt"), "Field").unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::UnsupportedExtension { ref extension, .. } if extension == ".txt"
        ));
        let err = load_ground_truth(Path::new("/definitely/not/here.json"), "Field").unwrap_err();
        assert!(matches!(err, EvaluationError::UnsupportedExtension { .. }));
    }

    #[test]
    fn array_strings_keep_their_text_on_every_path() {
        let payload = "{\"id\": \"doc1\", \"Tags\": \"[1, 2]\"}\n{\"id\": \"doc2\", \"fields\": {\"Tags\": \"[1, 2]\"}}\n";
        let records = parse_jsonl_predictions(payload, "Field");
        assert_eq!(records["doc1"]["Tags"], text("[1, 2]"));
        assert_eq!(records["doc2"]["Tags"], text("[1, 2]"));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_predictions(Path::new("/definitely/not/here.jsonl"), "Field").unwrap_err();
        assert!(matches!(err, EvaluationError::FileNotFound(_)));
    }

    #[test]
    fn csv_predictions_merge_nested_cells_first_wins() {
        let temp = TempDir::new().unwrap();
        let path = write_temp(
            &temp,
            "predictions.csv",
            "Field,Name,extra\ndoc1,Alice,\"{\"\"Name\"\": \"\"Bob\"\", \"\"Armor\"\": \"\"2\"\"}\"\n",
        );
        let records = load_predictions(&path, "Field").unwrap();
        let record = &records["doc1"];
        assert_eq!(record["Name"], text("Alice"));
        assert_eq!(record["Armor"], text("2"));
        assert_eq!(record.get("extra"), None);
    }
}
