//! Batch input parsing.
//!
//! Rows come from either a delimited text file (quoted-field-aware) or
//! a JSON array of flat objects. Both normalize to an ordered field map
//! per row so pattern resolution and input-prop construction are
//! format-agnostic.

use std::path::Path;

use framecast_common::error::{FramecastError, FramecastResult};

/// One batch row: field name to value, in source order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Parse a batch data file by extension (`.csv` or `.json`).
pub fn parse_rows_file(path: &Path) -> FramecastResult<Vec<Row>> {
    let content = std::fs::read_to_string(path).map_err(|_| FramecastError::FileNotFound {
        path: path.to_path_buf(),
    })?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => parse_csv(&content, ','),
        Some("json") => parse_json(&content),
        other => Err(FramecastError::validation(format!(
            "unsupported data file extension {:?}; expected .csv or .json",
            other.unwrap_or("")
        ))),
    }
}

/// Parse a JSON array of flat objects.
pub fn parse_json(content: &str) -> FramecastResult<Vec<Row>> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    let serde_json::Value::Array(items) = value else {
        return Err(FramecastError::validation(
            "JSON data file must be an array of objects",
        ));
    };

    let mut rows = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let serde_json::Value::Object(map) = item else {
            return Err(FramecastError::validation(format!(
                "row {index} is not an object"
            )));
        };
        rows.push(map);
    }
    Ok(rows)
}

/// Parse delimited text with a header line.
///
/// Quoting follows the common convention: fields may be wrapped in
/// double quotes, a quoted field may contain the delimiter and
/// newlines, and an embedded quote is escaped by doubling it.
pub fn parse_csv(content: &str, delimiter: char) -> FramecastResult<Vec<Row>> {
    let mut records = split_records(content, delimiter)?;
    if records.is_empty() {
        return Ok(vec![]);
    }

    let header = records.remove(0);
    if header.iter().any(|h| h.trim().is_empty()) {
        return Err(FramecastError::validation("CSV header has an empty column"));
    }

    let mut rows = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        if record.len() != header.len() {
            return Err(FramecastError::validation(format!(
                "row {index} has {} fields, header has {}",
                record.len(),
                header.len()
            )));
        }
        let mut row = Row::new();
        for (name, value) in header.iter().zip(record) {
            row.insert(name.trim().to_string(), serde_json::Value::String(value));
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Split raw delimited text into records of fields.
fn split_records(content: &str, delimiter: char) -> FramecastResult<Vec<Vec<String>>> {
    let mut records: Vec<Vec<String>> = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                if field.is_empty() {
                    in_quotes = true;
                } else {
                    return Err(FramecastError::validation(
                        "quote inside an unquoted field",
                    ));
                }
            }
            '\r' => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                // Skip fully blank lines (trailing newline at EOF).
                if fields.len() > 1 || !fields[0].is_empty() {
                    records.push(std::mem::take(&mut fields));
                } else {
                    fields.clear();
                }
            }
            c if c == delimiter => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(FramecastError::validation("unterminated quoted field"));
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push(fields);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field<'a>(row: &'a Row, name: &str) -> &'a str {
        row.get(name).and_then(|v| v.as_str()).unwrap()
    }

    #[test]
    fn test_plain_csv() {
        let rows = parse_csv("name,title\nAlice,Intro\nBob,Outro\n", ',').unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(field(&rows[0], "name"), "Alice");
        assert_eq!(field(&rows[1], "title"), "Outro");
    }

    #[test]
    fn test_quoted_fields_keep_delimiters_and_quotes() {
        let rows = parse_csv(
            "name,quote\n\"Smith, Alice\",\"she said \"\"hi\"\"\"\n",
            ',',
        )
        .unwrap();
        assert_eq!(field(&rows[0], "name"), "Smith, Alice");
        assert_eq!(field(&rows[0], "quote"), "she said \"hi\"");
    }

    #[test]
    fn test_quoted_field_may_contain_newline() {
        let rows = parse_csv("name,note\nAlice,\"line one\nline two\"\n", ',').unwrap();
        assert_eq!(field(&rows[0], "note"), "line one\nline two");
    }

    #[test]
    fn test_crlf_line_endings() {
        let rows = parse_csv("name\r\nAlice\r\nBob\r\n", ',').unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_field_count_mismatch_is_rejected() {
        assert!(parse_csv("a,b\n1\n", ',').is_err());
    }

    #[test]
    fn test_unterminated_quote_is_rejected() {
        assert!(parse_csv("a\n\"oops\n", ',').is_err());
    }

    #[test]
    fn test_json_rows() {
        let rows = parse_json(r#"[{"name": "Alice", "count": 3}, {"name": "Bob"}]"#).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("count").unwrap().as_i64(), Some(3));
    }

    #[test]
    fn test_json_must_be_array_of_objects() {
        assert!(parse_json(r#"{"name": "Alice"}"#).is_err());
        assert!(parse_json(r#"[1, 2]"#).is_err());
    }
}
