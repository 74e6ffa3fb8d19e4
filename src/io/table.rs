//! Comma-separated tables.
//!
//! Quoting follows RFC 4180: fields containing commas, quotes or line
//! breaks are wrapped in double quotes and embedded quotes are doubled.
//! Each cell is typed on read as [`Cell::Int`], [`Cell::Float`],
//! [`Cell::Text`] or [`Cell::Missing`] (an empty unquoted field).

use std::fmt;
use std::fs;
use std::path::Path;

use crate::util::{Error, Result};

/// One typed table cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
    Missing,
}

impl Cell {
    /// Type a raw field. Quoted fields are always text.
    pub fn parse(raw: &str, quoted: bool) -> Self {
        if quoted {
            return Self::Text(raw.to_string());
        }
        let s = raw.trim();
        if s.is_empty() {
            Self::Missing
        } else if let Ok(v) = s.parse::<i64>() {
            Self::Int(v)
        } else if let Ok(v) = s.parse::<f64>() {
            Self::Float(v)
        } else {
            Self::Text(s.to_string())
        }
    }

    /// Numeric value; missing cells read as NaN.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Missing => Some(f64::NAN),
            Self::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) if v.is_nan() => Ok(()),
            Self::Float(v) => write!(f, "{:?}", v),
            Self::Text(s) => f.write_str(s),
            Self::Missing => Ok(()),
        }
    }
}

/// Column-oriented table with named columns of equal length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column. Its length must match existing columns.
    pub fn push_column(&mut self, name: impl Into<String>, cells: Vec<Cell>) -> Result<()> {
        let name = name.into();
        if let Some(first) = self.columns.first() {
            if first.len() != cells.len() {
                return Err(Error::ColumnLengthMismatch {
                    field: name,
                    expected: first.len(),
                    actual: cells.len(),
                });
            }
        }
        self.names.push(name);
        self.columns.push(cells);
        Ok(())
    }

    /// Column names in file order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Column by name.
    pub fn column(&self, name: &str) -> Option<&[Cell]> {
        let i = self.names.iter().position(|n| n == name)?;
        Some(&self.columns[i])
    }

    /// Iterate over `(name, cells)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Cell])> {
        self.names.iter().map(String::as_str).zip(self.columns.iter().map(Vec::as_slice))
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn num_columns(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A field as read: its text and whether it was quoted.
type RawField = (String, bool);

/// Split text into records of fields, honouring quotes across line breaks.
fn parse_records(text: &str) -> Vec<Vec<RawField>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if field.is_empty() && !quoted => {
                quoted = true;
                loop {
                    match chars.next() {
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            field.push('"');
                        }
                        Some('"') | None => break,
                        Some(c) => field.push(c),
                    }
                }
            }
            ',' => record.push((std::mem::take(&mut field), std::mem::replace(&mut quoted, false))),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push((std::mem::take(&mut field), std::mem::replace(&mut quoted, false)));
                records.push(std::mem::take(&mut record));
            }
            // Text after a closing quote is kept verbatim.
            c => field.push(c),
        }
    }
    if !field.is_empty() || quoted || !record.is_empty() {
        record.push((field, quoted));
        records.push(record);
    }
    records.retain(|r| !(r.len() == 1 && r[0].0.is_empty() && !r[0].1));
    records
}

/// Load a table whose first row holds the column names.
///
/// A leading column with an empty name (a written row index) is dropped.
pub fn load_table(path: impl AsRef<Path>) -> Result<Table> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
        _ => Error::Io(e),
    })?;
    let mut records = parse_records(&text).into_iter();
    let Some(header) = records.next() else {
        return Ok(Table::new());
    };
    let names: Vec<String> = header.into_iter().map(|(name, _)| name.trim().to_string()).collect();
    let mut columns: Vec<Vec<Cell>> = vec![Vec::new(); names.len()];
    for (row, record) in records.enumerate() {
        if record.len() != names.len() {
            return Err(Error::invalid(format!(
                "{}: row {} has {} fields, header has {}",
                path.display(),
                row + 1,
                record.len(),
                names.len()
            )));
        }
        for (column, (raw, quoted)) in columns.iter_mut().zip(record) {
            column.push(Cell::parse(&raw, quoted));
        }
    }

    let skip = usize::from(names.first().is_some_and(String::is_empty));
    let mut table = Table::new();
    for (name, cells) in names.into_iter().zip(columns).skip(skip) {
        table.push_column(name, cells)?;
    }
    tracing::debug!(path = %path.display(), rows = table.num_rows(), columns = table.num_columns(), "loaded table");
    Ok(table)
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Save a table with a leading unnamed row-index column.
pub fn save_table(path: impl AsRef<Path>, table: &Table) -> Result<()> {
    let mut out = String::new();
    for name in table.names() {
        out.push(',');
        out.push_str(&quote(name));
    }
    out.push('\n');
    for row in 0..table.num_rows() {
        out.push_str(&row.to_string());
        for column in &table.columns {
            out.push(',');
            out.push_str(&quote(&column[row].to_string()));
        }
        out.push('\n');
    }
    fs::write(path.as_ref(), out)?;
    tracing::debug!(path = %path.as_ref().display(), rows = table.num_rows(), "saved table");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_records_quoting() {
        let records = parse_records("a,b\n\"x, y\",\"say \"\"hi\"\"\"\n1,\n");
        assert_eq!(records.len(), 3);
        assert_eq!(records[1][0], ("x, y".to_string(), true));
        assert_eq!(records[1][1], ("say \"hi\"".to_string(), true));
        assert_eq!(records[2], vec![("1".to_string(), false), (String::new(), false)]);
    }

    #[test]
    fn test_multiline_field() {
        let records = parse_records("a\r\n\"line1\nline2\"\r\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1][0].0, "line1\nline2");
    }

    #[test]
    fn test_cell_typing() {
        assert_eq!(Cell::parse("42", false), Cell::Int(42));
        assert_eq!(Cell::parse("0.5", false), Cell::Float(0.5));
        assert_eq!(Cell::parse("good", false), Cell::Text("good".into()));
        assert_eq!(Cell::parse("", false), Cell::Missing);
        assert_eq!(Cell::parse("42", true), Cell::Text("42".into()));
    }

    #[test]
    fn test_drops_index_column() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("m.csv");
        fs::write(&path, ",cluster_id,ks2_label\n0,3,good\n1,7,mua\n")?;
        let table = load_table(&path)?;
        assert_eq!(table.names(), &["cluster_id", "ks2_label"]);
        assert_eq!(table.column("cluster_id").unwrap(), &[Cell::Int(3), Cell::Int(7)]);
        Ok(())
    }

    #[test]
    fn test_save_then_load() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("t.csv");
        let mut table = Table::new();
        table.push_column("firing_rate", vec![Cell::Float(1.5), Cell::Missing])?;
        table.push_column("epoch_name", vec![Cell::Text("a,b".into()), Cell::Text("c".into())])?;
        assert!(table.push_column("short", vec![Cell::Int(1)]).is_err());
        save_table(&path, &table)?;

        let back = load_table(&path)?;
        assert_eq!(back.names(), table.names());
        assert_eq!(back.column("firing_rate").unwrap(), &[Cell::Float(1.5), Cell::Missing]);
        assert_eq!(back.column("epoch_name").unwrap()[0], Cell::Text("a,b".into()));
        Ok(())
    }
}
