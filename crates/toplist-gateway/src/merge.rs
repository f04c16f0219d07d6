use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::Error;
use crate::Result;

type Row = Map<String, Value>;

/// Natural keys shared by every source; rows are joined on both.
const JOIN_KEYS: [&str; 2] = ["Id", "Symbol"];
/// Per-source bookkeeping column, dropped from the merged output.
const TIMESTAMP_COLUMN: &str = "TimeStamp";
const RANK_COLUMN: &str = "Rank";

/// Inner-join the per-service payloads on (Id, Symbol) and rank the result.
///
/// Payloads are folded left to right starting from the first (main) source,
/// so its row order survives into the ranking and its column names win
/// collisions; colliding columns from later sources get a `_s{index}` suffix
/// (1-based source index). Entities absent from any source are dropped.
/// Rows missing a join key fail the merge outright rather than being
/// silently excluded.
pub fn merge(payloads: &[String]) -> Result<String> {
    let mut tables = Vec::with_capacity(payloads.len());
    for (index, payload) in payloads.iter().enumerate() {
        let rows: Vec<Row> = serde_json::from_str(payload)?;
        validate_join_keys(&rows, index + 1)?;
        tables.push(rows);
    }

    if tables.is_empty() {
        return Ok("[]".to_string());
    }

    let mut merged = tables.remove(0);
    for (offset, table) in tables.into_iter().enumerate() {
        merged = join_pair(merged, table, offset + 2);
    }

    let ranked: Vec<Row> = merged
        .into_iter()
        .enumerate()
        .map(|(index, row)| {
            let mut out = Row::new();
            out.insert(RANK_COLUMN.to_string(), Value::from(index as u64 + 1));
            for (column, value) in row {
                if !is_timestamp_column(&column) {
                    out.insert(column, value);
                }
            }
            out
        })
        .collect();

    Ok(serde_json::to_string(&ranked)?)
}

fn validate_join_keys(rows: &[Row], source: usize) -> Result<()> {
    for row in rows {
        for key in JOIN_KEYS {
            if !row.contains_key(key) {
                return Err(Error::MergeKeyMissing { source_index: source, key });
            }
        }
    }
    Ok(())
}

fn key_of(row: &Row) -> (String, String) {
    // Keys validated up front; stringify so numeric and string ids compare
    // consistently.
    (row[JOIN_KEYS[0]].to_string(), row[JOIN_KEYS[1]].to_string())
}

/// Inner join of `left` with `right`, suffixing `right`'s colliding columns
/// with the 1-based index of its source payload.
fn join_pair(left: Vec<Row>, right: Vec<Row>, source: usize) -> Vec<Row> {
    let mut by_key: HashMap<(String, String), Vec<Row>> = HashMap::new();
    for row in right {
        by_key.entry(key_of(&row)).or_default().push(row);
    }

    let mut out = Vec::with_capacity(left.len());
    for left_row in left {
        let Some(matches) = by_key.get(&key_of(&left_row)) else {
            continue;
        };
        for right_row in matches {
            let mut row = left_row.clone();
            for (column, value) in right_row {
                if JOIN_KEYS.contains(&column.as_str()) {
                    continue;
                }
                if row.contains_key(column) {
                    row.insert(format!("{column}_s{source}"), value.clone());
                } else {
                    row.insert(column.clone(), value.clone());
                }
            }
            out.push(row);
        }
    }
    out
}

fn is_timestamp_column(column: &str) -> bool {
    column == TIMESTAMP_COLUMN
        || column
            .strip_prefix(TIMESTAMP_COLUMN)
            .is_some_and(|rest| rest.starts_with("_s"))
}
