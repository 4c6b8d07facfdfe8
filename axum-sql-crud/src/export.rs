//! Download encodings of the list view's row set

use crate::query::RequestState;
use crate::render::html::{escape, value_to_text};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    /// Tab-separated values
    Tabular,
    Json,
    Xml,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Csv,
        ExportFormat::Tabular,
        ExportFormat::Json,
        ExportFormat::Xml,
    ];

    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.code().eq_ignore_ascii_case(code))
    }

    /// Value of the `format` query parameter
    pub fn code(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Tabular => "tabular",
            ExportFormat::Json => "json",
            ExportFormat::Xml => "xml",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ExportFormat::Csv => "CSV",
            ExportFormat::Tabular => "TSV",
            ExportFormat::Json => "JSON",
            ExportFormat::Xml => "XML",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Tabular => "text/tab-separated-values",
            ExportFormat::Json => "application/json",
            ExportFormat::Xml => "text/xml",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Tabular => "tsv",
            ExportFormat::Json => "json",
            ExportFormat::Xml => "xml",
        }
    }
}

/// An encoded download
#[derive(Debug, Clone)]
pub struct Export {
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub filename: String,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("encoder flush failed: {0}")]
    Flush(String),
}

/// Encode `rows` (values in `column_names` order) as a download
///
/// # Arguments
///
/// * `rows` - Raw column values, one vector per row
/// * `column_names` - Output names of the columns
/// * `format` - Target encoding
/// * `basename` - Filename without extension, see [`download_basename`]
pub fn serialize(
    rows: &[Vec<Value>],
    column_names: &[String],
    format: ExportFormat,
    basename: &str,
) -> Result<Export, ExportError> {
    let body = match format {
        ExportFormat::Csv => delimited(rows, column_names, b',')?,
        ExportFormat::Tabular => delimited(rows, column_names, b'\t')?,
        ExportFormat::Json => serde_json::to_vec_pretty(&Records { rows, column_names })?,
        ExportFormat::Xml => xml(rows, column_names).into_bytes(),
    };

    Ok(Export {
        body,
        content_type: format.content_type(),
        filename: format!("{}.{}", basename, format.extension()),
    })
}

fn delimited(rows: &[Vec<Value>], column_names: &[String], delimiter: u8) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(column_names)?;
    for row in rows {
        writer.write_record(row.iter().map(value_to_text))?;
    }

    writer
        .into_inner()
        .map_err(|error| ExportError::Flush(error.to_string()))
}

/// JSON array of objects whose keys keep the select-list order
struct Records<'a> {
    rows: &'a [Vec<Value>],
    column_names: &'a [String],
}

struct Record<'a> {
    values: &'a [Value],
    column_names: &'a [String],
}

impl Serialize for Records<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for values in self.rows {
            seq.serialize_element(&Record {
                values,
                column_names: self.column_names,
            })?;
        }
        seq.end()
    }
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.column_names.len()))?;
        for (name, value) in self.column_names.iter().zip(self.values) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

fn xml(rows: &[Vec<Value>], column_names: &[String]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<records>\n");
    for row in rows {
        xml.push_str("  <record>\n");
        for (name, value) in column_names.iter().zip(row) {
            xml.push_str(&format!(
                "    <field name=\"{}\">{}</field>\n",
                escape(name),
                escape(&value_to_text(value))
            ));
        }
        xml.push_str("  </record>\n");
    }
    xml.push_str("</records>\n");
    xml
}

/// `table[_sorted_by_O][_search_Q][_page_P]`, each token reduced to `[A-Za-z0-9_-]`
pub fn download_basename(table: &str, state: &RequestState) -> String {
    let mut name = sanitize(table);
    if let Some(order_column) = &state.order_column {
        name.push_str("_sorted_by_");
        name.push_str(&sanitize(order_column));
    }
    if let Some(query_text) = &state.query_text {
        name.push_str("_search_");
        name.push_str(&sanitize(query_text));
    }
    if state.page_number > 0 {
        name.push_str(&format!("_page_{}", state.page_number));
    }
    name
}

fn sanitize(token: &str) -> String {
    token
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || character == '_' || character == '-' {
                character
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> (Vec<Vec<Value>>, Vec<String>) {
        (
            vec![
                vec![json!(1), json!("sukria"), json!("say \"hi\", ok")],
                vec![json!(2), json!("bigpresh"), Value::Null],
            ],
            vec!["id".into(), "username".into(), "motto".into()],
        )
    }

    #[test]
    fn test_csv_quotes_fields() {
        let (rows, columns) = sample();
        let export = serialize(&rows, &columns, ExportFormat::Csv, "users").unwrap();
        assert_eq!(export.content_type, "text/csv");
        assert_eq!(export.filename, "users.csv");
        assert_eq!(
            String::from_utf8(export.body).unwrap(),
            "id,username,motto\n1,sukria,\"say \"\"hi\"\", ok\"\n2,bigpresh,\n"
        );
    }

    #[test]
    fn test_tabular() {
        let (rows, columns) = sample();
        let export = serialize(&rows, &columns, ExportFormat::Tabular, "users").unwrap();
        assert_eq!(export.filename, "users.tsv");
        let body = String::from_utf8(export.body).unwrap();
        assert!(body.starts_with("id\tusername\tmotto\n1\tsukria\t"));
    }

    #[test]
    fn test_json_keeps_column_order() {
        let (rows, columns) = sample();
        let export = serialize(&rows, &columns, ExportFormat::Json, "users").unwrap();
        let body = String::from_utf8(export.body).unwrap();

        let id = body.find("\"id\"").unwrap();
        let username = body.find("\"username\"").unwrap();
        let motto = body.find("\"motto\"").unwrap();
        assert!(id < username && username < motto);

        let parsed: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed[1], json!({ "id": 2, "username": "bigpresh", "motto": null }));
    }

    #[test]
    fn test_xml() {
        let (rows, columns) = sample();
        let export = serialize(&rows, &columns, ExportFormat::Xml, "users").unwrap();
        let body = String::from_utf8(export.body).unwrap();
        assert!(body.contains("<field name=\"motto\">say &quot;hi&quot;, ok</field>"));
        assert!(body.contains("<field name=\"motto\"></field>"));
        assert_eq!(body.matches("<record>").count(), 2);
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(ExportFormat::parse("tabular"), Some(ExportFormat::Tabular));
        assert_eq!(ExportFormat::parse("JSON"), Some(ExportFormat::Json));
        assert_eq!(ExportFormat::parse("pdf"), None);
    }

    #[test]
    fn test_download_basename() {
        let state = RequestState {
            order_column: Some("user name".into()),
            query_text: Some("big/presh".into()),
            page_number: 2,
            ..RequestState::default()
        };
        assert_eq!(
            download_basename("users", &state),
            "users_sorted_by_user_name_search_big_presh_page_2"
        );
        assert_eq!(download_basename("users", &RequestState::default()), "users");
    }
}
