use serde_json::{Map, Value};
use std::str::FromStr;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "JSON" => Ok(OutputFormat::Json),
            "CSV" => Ok(OutputFormat::Csv),
            other => Err(format!("unknown format '{other}' (expected JSON or CSV)")),
        }
    }
}

/// Slice the merged payload to `limit` records and render it.
pub fn render(merged: &str, limit: usize, format: OutputFormat) -> Result<String> {
    let records: Vec<Map<String, Value>> = serde_json::from_str(merged)?;
    let records = &records[..records.len().min(limit)];
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::Csv => to_csv(records),
    }
}

/// Header row from the keys of the first record, one newline-terminated row
/// per record.
fn to_csv(records: &[Map<String, Value>]) -> Result<String> {
    let Some(first) = records.first() else {
        return Ok(String::new());
    };

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    let header: Vec<&str> = first.keys().map(String::as_str).collect();
    writer.write_record(&header)?;
    for record in records {
        let row: Vec<String> = header
            .iter()
            .map(|column| record.get(*column).map(csv_field).unwrap_or_default())
            .collect();
        writer.write_record(&row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8(bytes)?)
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MERGED: &str = r#"[
        {"Rank": 1, "Symbol": "BTC", "Price_USD": 41334.44},
        {"Rank": 2, "Symbol": "ETH", "Price_USD": 2435.95},
        {"Rank": 3, "Symbol": "SOL", "Price_USD": 89.49}
    ]"#;

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_limit_bounds_record_count() {
        let rendered = render(MERGED, 2, OutputFormat::Json).unwrap();
        let records: Vec<Value> = serde_json::from_str(&rendered).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["Symbol"], "ETH");
    }

    #[test]
    fn test_limit_beyond_length_returns_everything() {
        let rendered = render(MERGED, 100, OutputFormat::Json).unwrap();
        let records: Vec<Value> = serde_json::from_str(&rendered).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_csv_rendering() {
        let rendered = render(MERGED, 2, OutputFormat::Csv).unwrap();
        assert_eq!(
            rendered,
            "Rank,Symbol,Price_USD\n1,BTC,41334.44\n2,ETH,2435.95\n"
        );
    }

    #[test]
    fn test_csv_of_empty_result_is_empty() {
        let rendered = render("[]", 10, OutputFormat::Csv).unwrap();
        assert_eq!(rendered, "");
    }

    #[test]
    fn test_malformed_payload_propagates() {
        assert!(render("not json", 1, OutputFormat::Json).is_err());
    }
}
