// Raw result page -> headers + row maps. Row 0 is always the header row.

use serde_json::{Map, Value};

use crate::models::{RawResultSet, ResultPreview};

pub fn shape_preview(raw: &RawResultSet) -> ResultPreview {
    let Some((header_row, data_rows)) = raw.split_first() else {
        return ResultPreview::default();
    };
    let headers: Vec<String> = header_row
        .iter()
        .map(|c| c.clone().unwrap_or_default())
        .collect();

    let rows = data_rows
        .iter()
        .map(|row| {
            headers
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let cell = row
                        .get(i)
                        .cloned()
                        .flatten()
                        .map_or(Value::Null, Value::String);
                    (name.clone(), cell)
                })
                .collect::<Map<String, Value>>()
        })
        .collect();

    ResultPreview { headers, rows }
}
