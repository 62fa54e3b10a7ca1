//! Upload loading
//!
//! Dispatches on the declared file name: `.csv` is read as comma-separated
//! text with a header row, anything else as a spreadsheet workbook whose
//! first sheet holds the header in its first row.

use absence_ai_core::{PipelineError, Result, Table, Value};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::info;

/// Format an upload is parsed as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    Csv,
    Spreadsheet,
}

impl UploadFormat {
    pub fn from_name(name: &str) -> Self {
        if name.to_ascii_lowercase().ends_with(".csv") {
            UploadFormat::Csv
        } else {
            UploadFormat::Spreadsheet
        }
    }
}

/// Read an upload fully and parse it according to its declared name
pub fn load_upload<R: Read>(mut reader: R, name: &str) -> Result<Table> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| PipelineError::Parse(format!("failed to read '{}': {}", name, e)))?;

    let format = UploadFormat::from_name(name);
    let table = match format {
        UploadFormat::Csv => parse_csv(&bytes)?,
        UploadFormat::Spreadsheet => parse_spreadsheet(bytes)?,
    };

    info!(
        "Loaded '{}' as {:?}: {} rows, {} columns",
        name,
        format,
        table.len(),
        table.width()
    );
    Ok(table)
}

/// Open a file on disk and load it, using its file name for dispatch
pub fn load_path<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| {
        PipelineError::Parse(format!("failed to open {}: {}", path.display(), e))
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    load_upload(file, &name)
}

/// Parse comma-separated values with a header row
pub fn parse_csv(bytes: &[u8]) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| PipelineError::Parse(format!("invalid CSV header: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(PipelineError::Parse("missing header row".to_string()));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| PipelineError::Parse(format!("invalid CSV: {}", e)))?;
        rows.push(record.iter().map(Value::parse).collect());
    }

    Table::from_rows(normalize_headers(headers), rows)
}

/// Parse the first sheet of a workbook (xlsx, xls, xlsb or ods)
pub fn parse_spreadsheet(bytes: Vec<u8>) -> Result<Table> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| PipelineError::Parse(format!("unreadable spreadsheet: {}", e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PipelineError::Parse("workbook has no sheets".to_string()))?
        .map_err(|e| PipelineError::Parse(format!("unreadable sheet: {}", e)))?;

    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| PipelineError::Parse("first sheet is empty".to_string()))?;
    let headers = header.iter().map(|cell| cell.to_string()).collect();

    let records = rows.map(|row| row.iter().map(cell_value).collect()).collect();

    Table::from_rows(normalize_headers(headers), records)
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::Number(*i as f64),
        Data::Float(f) => Value::number(*f),
        Data::Bool(b) => Value::Number(if *b { 1.0 } else { 0.0 }),
        Data::String(s) => Value::parse(s),
        Data::Empty | Data::Error(_) => Value::Empty,
        other => Value::Text(other.to_string()),
    }
}

/// Trim header names, strip a byte order mark and name blank headers
/// `Unnamed: <idx>`
fn normalize_headers(headers: Vec<String>) -> Vec<String> {
    headers
        .into_iter()
        .enumerate()
        .map(|(idx, h)| {
            let name = h.trim_start_matches('\u{feff}').trim();
            if name.is_empty() {
                format!("Unnamed: {}", idx)
            } else {
                name.to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Student_ID,Attendance_Percentage,Grade,Gender,Meal_Code
S1,0.95,9,F,Free
S2,0.82,10,M,Paid
S3,,11,F,Reduced
";

    #[test]
    fn test_dispatch_by_name() {
        assert_eq!(UploadFormat::from_name("students.csv"), UploadFormat::Csv);
        assert_eq!(UploadFormat::from_name("STUDENTS.CSV"), UploadFormat::Csv);
        assert_eq!(UploadFormat::from_name("students.xlsx"), UploadFormat::Spreadsheet);
        assert_eq!(UploadFormat::from_name("students"), UploadFormat::Spreadsheet);
    }

    #[test]
    fn test_load_csv() {
        let table = load_upload(SAMPLE.as_bytes(), "students.csv").unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(
            table.column_names(),
            vec!["Student_ID", "Attendance_Percentage", "Grade", "Gender", "Meal_Code"]
        );
        let attendance = &table.column("Attendance_Percentage").unwrap().values;
        assert_eq!(attendance[0], Value::Number(0.95));
        assert_eq!(attendance[2], Value::Empty);
        assert_eq!(
            table.column("Gender").unwrap().values[1],
            Value::Text("M".to_string())
        );
    }

    #[test]
    fn test_ragged_csv_is_parse_error() {
        let err = load_upload("a,b\n1,2\n3\n".as_bytes(), "x.csv").unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }

    #[test]
    fn test_empty_csv_is_parse_error() {
        let err = load_upload("".as_bytes(), "x.csv").unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }

    #[test]
    fn test_invalid_utf8_csv_is_parse_error() {
        let bytes: &[u8] = &[b'a', b',', b'b', b'\n', 0xff, 0xfe, b',', b'1', b'\n'];
        assert!(matches!(
            load_upload(bytes, "x.csv"),
            Err(PipelineError::Parse(_))
        ));
    }

    #[test]
    fn test_garbage_spreadsheet_is_parse_error() {
        let err = load_upload(SAMPLE.as_bytes(), "students.xlsx").unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }

    #[test]
    fn test_blank_header_named() {
        let table = parse_csv("\u{feff}a, ,c\n1,2,3\n".as_bytes()).unwrap();
        assert_eq!(table.column_names(), vec!["a", "Unnamed: 1", "c"]);
    }
}
