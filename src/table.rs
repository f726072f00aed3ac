//! Tabular reshaping of JSON payloads
//!
//! A [`Table`] is an indexed, column-named grid of [`Cell`]s. Every endpoint
//! pours its payload into one, renaming provider fields to short snake_case
//! column names.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::io::Write;
use std::path::Path;

use crate::error::{ApiError, Result};

/// Rows shown by the `Display` preview
const PREVIEW_ROWS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Cell {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Null),
            },
            Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }

    /// Numeric view; numeric text is parsed
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(x) => Some(*x),
            Self::Text(s) => s.trim().trim_end_matches('%').parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(x) if x.fract() == 0.0 => Some(*x as i64),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::DateTime(dt) => Some(dt.date()),
            Self::Text(s) => parse_date(s).and_then(|c| c.as_date()),
            _ => None,
        }
    }

    /// Text holding a number becomes `Float`, anything else is kept
    pub fn to_number(&self) -> Self {
        match self {
            Self::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Self::Float)
                .unwrap_or_else(|_| self.clone()),
            Self::Int(i) => Self::Float(*i as f64),
            other => other.clone(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::Float(_) => 2,
            Self::Date(_) | Self::DateTime(_) => 3,
            Self::Text(_) => 4,
        }
    }

    /// Total order used for sorting: nulls first, then by kind and value
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::DateTime(a), Self::DateTime(b)) => a.cmp(b),
            (Self::Date(a), Self::DateTime(b)) => a.and_time(Default::default()).cmp(b),
            (Self::DateTime(a), Self::Date(b)) => a.cmp(&b.and_time(Default::default())),
            (a, b) if a.rank() == 2 && b.rank() == 2 => {
                let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, ""),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{}", s),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<NaiveDate> for Cell {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Calendar date (UTC) of a Unix timestamp in seconds
pub fn unix_seconds_to_date(secs: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.date_naive())
}

/// Parse the date and date-time spellings the providers use
pub fn parse_date(raw: &str) -> Option<Cell> {
    let raw = raw.trim();
    for format in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Cell::DateTime(dt));
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(Cell::DateTime(dt.naive_utc()));
    }
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .map(Cell::Date)
}

/// Object fields ordered by their numeric prefix (`"1. open"`, `"2. high"`, ... `"10. change"`)
pub fn ordered_fields(object: &Map<String, Value>) -> Vec<(&String, &Value)> {
    fn prefix(key: &str) -> (u32, &str) {
        let digits: String = key.chars().take_while(|c| c.is_ascii_digit()).collect();
        (digits.parse().unwrap_or(u32::MAX), &key[digits.len()..])
    }
    let mut fields: Vec<_> = object.iter().collect();
    fields.sort_by(|(a, _), (b, _)| prefix(a).cmp(&prefix(b)));
    fields
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub key: Cell,
    pub values: Vec<Cell>,
}

/// Indexed table with named columns
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub index: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(index: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            index: index.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, key: impl Into<Cell>, values: Vec<Cell>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(ApiError::Shape(format!(
                "row has {} values, table has {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        self.rows.push(Row {
            key: key.into(),
            values,
        });
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r.values[idx]).collect())
    }

    pub fn row(&self, key: &Cell) -> Option<&Row> {
        self.rows.iter().find(|r| &r.key == key)
    }

    pub fn get(&self, key: &Cell, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.row(key).map(|r| &r.values[idx])
    }

    /// Rename columns (and the index) by `(from, to)` pairs; unknown names are ignored
    pub fn rename(&mut self, renames: &[(&str, &str)]) {
        for (from, to) in renames {
            if self.index == *from {
                self.index = to.to_string();
            }
            if let Some(idx) = self.column_index(from) {
                self.columns[idx] = to.to_string();
            }
        }
    }

    /// Replace all column names positionally
    pub fn set_columns(&mut self, names: &[&str]) -> Result<()> {
        if names.len() != self.columns.len() {
            return Err(ApiError::Shape(format!(
                "expected {} column names, got {}",
                self.columns.len(),
                names.len()
            )));
        }
        self.columns = names.iter().map(|c| c.to_string()).collect();
        Ok(())
    }

    pub fn sort_by_index(&mut self) {
        self.rows.sort_by(|a, b| a.key.compare(&b.key));
    }

    /// Build from an array of objects.
    ///
    /// `fields` maps source keys to column names. With `index_field` set the
    /// row key is that field, otherwise the row number.
    pub fn from_records(
        records: &[Value],
        index_field: Option<(&str, &str)>,
        fields: &[(&str, &str)],
    ) -> Result<Self> {
        let index_name = index_field.map(|(_, name)| name).unwrap_or("row");
        let columns: Vec<&str> = fields.iter().map(|(_, name)| *name).collect();
        let mut table = Self::new(index_name, &columns);

        for (i, record) in records.iter().enumerate() {
            let object = record
                .as_object()
                .ok_or_else(|| ApiError::Shape(format!("record {} is not an object", i)))?;
            let key = match index_field {
                Some((source, _)) => object.get(source).map(Cell::from_json).unwrap_or(Cell::Null),
                None => Cell::Int(i as i64),
            };
            let values = fields
                .iter()
                .map(|(source, _)| object.get(*source).map(Cell::from_json).unwrap_or(Cell::Null))
                .collect();
            table.push(key, values)?;
        }
        Ok(table)
    }

    /// Build from an object of objects keyed by date (the Alpha Vantage shape).
    ///
    /// Inner fields are taken in numeric-prefix order and parsed as numbers;
    /// `columns` names them positionally, or the raw field names are kept.
    pub fn from_keyed(
        map: &Map<String, Value>,
        index_name: &str,
        columns: Option<&[&str]>,
    ) -> Result<Self> {
        let derived: Vec<String> = match columns {
            Some(names) => names.iter().map(|c| c.to_string()).collect(),
            None => map
                .values()
                .next()
                .and_then(Value::as_object)
                .map(|o| ordered_fields(o).into_iter().map(|(k, _)| k.clone()).collect())
                .unwrap_or_default(),
        };
        let names: Vec<&str> = derived.iter().map(String::as_str).collect();
        let mut table = Self::new(index_name, &names);

        for (key, inner) in map {
            let inner = inner
                .as_object()
                .ok_or_else(|| ApiError::Shape(format!("entry '{}' is not an object", key)))?;
            let values: Vec<Cell> = ordered_fields(inner)
                .into_iter()
                .map(|(_, v)| Cell::from_json(v).to_number())
                .collect();
            let row_key = parse_date(key).unwrap_or_else(|| Cell::Text(key.clone()));
            table.push(row_key, values)?;
        }
        Ok(table)
    }

    /// Build from CSV text; the first CSV column becomes the index
    pub fn from_csv(text: &str) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let headers = reader
            .headers()
            .map_err(|e| ApiError::Shape(format!("bad CSV header: {}", e)))?
            .clone();
        let mut names = headers.iter();
        let index = names.next().unwrap_or("row").to_string();
        let columns: Vec<&str> = names.collect();
        let mut table = Self::new(index, &columns);

        for record in reader.records() {
            let record = record.map_err(|e| ApiError::Shape(format!("bad CSV row: {}", e)))?;
            let mut fields = record.iter().map(|f| Cell::Text(f.to_string()));
            let key = fields.next().unwrap_or(Cell::Null);
            let mut values: Vec<Cell> = fields.collect();
            values.resize(table.columns.len(), Cell::Null);
            table.push(key, values)?;
        }
        Ok(table)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> anyhow::Result<()> {
        let mut out = csv::Writer::from_writer(writer);
        let mut header = vec![self.index.clone()];
        header.extend(self.columns.iter().cloned());
        out.write_record(&header)?;
        for row in &self.rows {
            let mut record = vec![row.key.to_string()];
            record.extend(row.values.iter().map(|c| c.to_string()));
            out.write_record(&record)?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn save_csv(&self, path: &Path) -> anyhow::Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        self.write_csv(file)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# A table: {} x {}", self.len(), self.columns.len() + 1)?;

        let shown: Vec<&Row> = self.rows.iter().take(PREVIEW_ROWS).collect();
        // Padding counts chars, so widths must too
        let width = |s: &str| s.chars().count();
        let mut widths = vec![width(&self.index)];
        widths.extend(self.columns.iter().map(|c| width(c)));
        for row in &shown {
            widths[0] = widths[0].max(width(&row.key.to_string()));
            for (i, v) in row.values.iter().enumerate() {
                widths[i + 1] = widths[i + 1].max(width(&v.to_string()));
            }
        }

        write!(f, "{:>w$}", self.index, w = widths[0])?;
        for (i, c) in self.columns.iter().enumerate() {
            write!(f, "  {:>w$}", c, w = widths[i + 1])?;
        }
        writeln!(f)?;

        for row in &shown {
            write!(f, "{:>w$}", row.key.to_string(), w = widths[0])?;
            for (i, v) in row.values.iter().enumerate() {
                write!(f, "  {:>w$}", v.to_string(), w = widths[i + 1])?;
            }
            writeln!(f)?;
        }

        if self.len() > PREVIEW_ROWS {
            writeln!(f, "# ... with {} more rows", self.len() - PREVIEW_ROWS)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unix_seconds_to_date() {
        assert_eq!(
            unix_seconds_to_date(1_700_000_000),
            NaiveDate::from_ymd_opt(2023, 11, 14)
        );
    }

    #[test]
    fn test_from_records_with_index() {
        let records = vec![
            json!({"symbol": "AAPL", "description": "APPLE INC", "type": "Common Stock"}),
            json!({"symbol": "AAPL.SW", "description": "APPLE INC", "type": "Common Stock"}),
        ];
        let table = Table::from_records(
            &records,
            Some(("symbol", "symbol")),
            &[("description", "desc"), ("type", "type")],
        )
        .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.columns, vec!["desc", "type"]);
        assert_eq!(
            table.get(&Cell::from("AAPL.SW"), "desc"),
            Some(&Cell::from("APPLE INC"))
        );
    }

    #[test]
    fn test_from_keyed_orders_and_parses() {
        let payload = json!({
            "2024-01-03": {"1. open": "10.5", "2. high": "11", "3. low": "10", "4. close": "10.8", "5. volume": "1200"},
            "2024-01-02": {"1. open": "9.5", "2. high": "10.6", "3. low": "9.4", "4. close": "10.4", "5. volume": "900"}
        });
        let mut table = Table::from_keyed(
            payload.as_object().unwrap(),
            "date",
            Some(&["open", "high", "low", "close", "volume"]),
        )
        .unwrap();
        table.sort_by_index();

        let first = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(table.rows[0].key, Cell::Date(first));
        assert_eq!(table.get(&Cell::Date(first), "close"), Some(&Cell::Float(10.4)));
        assert_eq!(table.get(&Cell::Date(first), "volume"), Some(&Cell::Float(900.0)));
    }

    #[test]
    fn test_ordered_fields_numeric_prefix() {
        let object = json!({"10. change percent": "1%", "02. open": "1", "01. symbol": "IBM", "9. x": 0});
        let keys: Vec<_> = ordered_fields(object.as_object().unwrap())
            .into_iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(keys, vec!["01. symbol", "02. open", "9. x", "10. change percent"]);
    }

    #[test]
    fn test_push_rejects_wrong_width() {
        let mut table = Table::new("date", &["value"]);
        assert!(table.push("x", vec![Cell::Null, Cell::Null]).is_err());
    }

    #[test]
    fn test_csv_round_trip_and_preview() {
        let table = Table::from_csv("currency code,currency name\nUSD,United States Dollar\nARS,Argentine Peso\n")
            .unwrap();
        assert_eq!(table.index, "currency code");
        assert_eq!(table.len(), 2);

        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("currency code,currency name\n"));
        assert!(text.contains("ARS,Argentine Peso"));

        let preview = table.to_string();
        assert!(preview.starts_with("# A table: 2 x 2"));
    }

    #[test]
    fn test_preview_aligns_accented_text() {
        let mut table = Table::new("simbolo", &["tipo"]);
        table.push("GGAL", vec!["Acción".into()]).unwrap();
        table.push("AL30", vec!["Énfasis en renta fija".into()]).unwrap();
        table.push("X", vec!["Bono".into()]).unwrap();

        let preview = table.to_string();
        let widths: Vec<usize> = preview.lines().skip(1).map(|l| l.chars().count()).collect();
        assert_eq!(widths.len(), 4);
        assert!(widths.iter().all(|w| *w == widths[0]));
    }

    #[test]
    fn test_parse_date_variants() {
        assert!(matches!(parse_date("2024-01-02"), Some(Cell::Date(_))));
        assert!(matches!(parse_date("2024-01-02 16:00:00"), Some(Cell::DateTime(_))));
        assert_eq!(
            parse_date("2024-01-02 15:55"),
            Some(Cell::DateTime(
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(15, 55, 0).unwrap()
            ))
        );
        assert!(matches!(parse_date("2022-11-28T18:00:01.25"), Some(Cell::DateTime(_))));
        assert!(parse_date("yesterday").is_none());
    }
}
