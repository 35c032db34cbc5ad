//! CSV loading with encoding fallback and delimiter auto-detection.
//!
//! Turns raw export bytes into a [`Table`]: headers trimmed, fully empty rows
//! dropped, cells kept verbatim. The gradebook and provider loaders add their
//! required-column checks and provider-specific cleanup on top.

use encoding_rs::Encoding;
use std::path::Path;

use crate::error::{LoadError, LoadResult};
use crate::models::{
    cell_from_field, cell_to_field, normalize_email, GradeValue, ProviderTable, Table,
    GRADEBOOK_EMAIL, GRADEBOOK_FIRST_NAME, GRADEBOOK_LAST_NAME, POINT_POSSIBLE, PROVIDER_EMAIL,
    PROVIDER_NAME,
};

/// Encodings tried in order. The first that decodes without error wins.
pub const ENCODING_CANDIDATES: [&str; 4] = ["utf-8", "utf-8-sig", "latin-1", "windows-1252"];

/// Columns every gradebook export must carry.
pub const GRADEBOOK_REQUIRED: [&str; 3] = [GRADEBOOK_EMAIL, GRADEBOOK_LAST_NAME, GRADEBOOK_FIRST_NAME];

/// Columns every provider export must carry.
pub const PROVIDER_REQUIRED: [&str; 2] = [PROVIDER_NAME, PROVIDER_EMAIL];

/// How many present columns a missing-column error quotes.
const AVAILABLE_SAMPLE: usize = 10;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// CSV file information
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// A parsed table plus how it was read.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub table: Table,
    pub info: CsvInfo,
}

/// A parsed provider report plus how it was read.
#[derive(Debug, Clone)]
pub struct ProviderParseResult {
    pub provider: ProviderTable,
    pub info: CsvInfo,
}

// =============================================================================
// Decoding
// =============================================================================

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

fn decode_with(bytes: &[u8], label: &str) -> Option<String> {
    match label {
        "utf-8" => {
            if bytes.starts_with(UTF8_BOM) {
                return None;
            }
            std::str::from_utf8(bytes).ok().map(str::to_string)
        }
        "utf-8-sig" => {
            let body = bytes.strip_prefix(UTF8_BOM)?;
            std::str::from_utf8(body).ok().map(str::to_string)
        }
        "latin-1" => Some(encoding_rs::mem::decode_latin1(strip_bom(bytes)).into_owned()),
        "windows-1252" => encoding_rs::WINDOWS_1252
            .decode_without_bom_handling_and_without_replacement(strip_bom(bytes))
            .map(|s| s.into_owned()),
        _ => None,
    }
}

/// Guess the encoding of raw bytes using chardet.
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "latin-1" | "latin1" => "latin-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes, returning the text and the encoding that worked.
///
/// Falls back to chardet detection when every candidate fails.
pub fn decode_bytes(bytes: &[u8]) -> LoadResult<(String, String)> {
    for label in ENCODING_CANDIDATES {
        if let Some(text) = decode_with(bytes, label) {
            return Ok((text, label.to_string()));
        }
    }

    let detected = detect_encoding(bytes);
    Encoding::for_label(detected.as_bytes())
        .and_then(|enc| enc.decode_without_bom_handling_and_without_replacement(bytes))
        .map(|text| (text.into_owned(), detected.clone()))
        .ok_or_else(|| LoadError::Decode {
            tried: format!("{}, detected {}", ENCODING_CANDIDATES.join(", "), detected),
        })
}

// =============================================================================
// Parsing
// =============================================================================

/// Byte form of a delimiter. The csv reader/writer only take ASCII.
pub fn delimiter_byte(delimiter: char) -> LoadResult<u8> {
    if delimiter.is_ascii() {
        Ok(delimiter as u8)
    } else {
        Err(LoadError::InvalidDelimiter(delimiter.to_string()))
    }
}

/// Parse a user-given delimiter: one ASCII character, or `\t` / `tab`.
pub fn parse_delimiter(value: &str) -> LoadResult<char> {
    if value == "\\t" || value.eq_ignore_ascii_case("tab") {
        return Ok('\t');
    }

    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(c),
        _ => Err(LoadError::InvalidDelimiter(value.to_string())),
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse decoded CSV text into a [`Table`].
pub fn parse_table(content: &str, delimiter: char) -> LoadResult<Table> {
    if content.trim().is_empty() {
        return Err(LoadError::EmptyFile);
    }

    let delimiter = delimiter_byte(delimiter)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(LoadError::EmptyFile);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(cell_from_field).collect());
    }

    Ok(Table::new(headers, rows))
}

/// Decode and parse CSV bytes, auto-detecting the delimiter unless given.
pub fn parse_bytes_auto(bytes: &[u8], delimiter: Option<char>) -> LoadResult<ParseResult> {
    let (content, encoding) = decode_bytes(bytes)?;
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(&content));
    let table = parse_table(&content, delimiter)?;

    let info = CsvInfo {
        encoding,
        delimiter,
        headers: table.headers.clone(),
        row_count: table.row_count(),
    };
    Ok(ParseResult { table, info })
}

/// Fail with every missing column when `table` lacks any of `required`.
pub fn require_columns(table: &Table, required: &[&str], source_name: &str) -> LoadResult<()> {
    let missing: Vec<String> = required
        .iter()
        .filter(|col| !table.has_column(col))
        .map(|col| col.to_string())
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    Err(LoadError::MissingColumns {
        source_name: source_name.to_string(),
        missing,
        available: table.headers.iter().take(AVAILABLE_SAMPLE).cloned().collect(),
    })
}

// =============================================================================
// Gradebook / provider loaders
// =============================================================================

/// Load a gradebook export from bytes.
pub fn load_gradebook_bytes(bytes: &[u8], delimiter: Option<char>) -> LoadResult<ParseResult> {
    let result = parse_bytes_auto(bytes, delimiter)?;
    require_columns(&result.table, &GRADEBOOK_REQUIRED, "Gradebook")?;
    Ok(result)
}

/// Load a provider export from bytes.
pub fn load_provider_bytes(bytes: &[u8], delimiter: Option<char>) -> LoadResult<ProviderParseResult> {
    let ParseResult { table, mut info } = parse_bytes_auto(bytes, delimiter)?;
    require_columns(&table, &PROVIDER_REQUIRED, "Provider")?;

    let provider = clean_provider(table);
    info.row_count = provider.table.row_count();
    Ok(ProviderParseResult { provider, info })
}

/// Load a gradebook export from disk.
pub fn load_gradebook_file<P: AsRef<Path>>(path: P, delimiter: Option<char>) -> LoadResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    load_gradebook_bytes(&bytes, delimiter)
}

/// Load a provider export from disk.
pub fn load_provider_file<P: AsRef<Path>>(
    path: P,
    delimiter: Option<char>,
) -> LoadResult<ProviderParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    load_provider_bytes(&bytes, delimiter)
}

/// Split off the "Point Possible" row, drop rows without `NAME` or `EMAIL`
/// and normalize `EMAIL` in place.
///
/// The table must already contain both identity columns.
pub fn clean_provider(table: Table) -> ProviderTable {
    let Table { headers, rows } = table;
    let name_col = headers.iter().position(|h| h == PROVIDER_NAME);
    let email_col = headers.iter().position(|h| h == PROVIDER_EMAIL);

    let (Some(name_col), Some(email_col)) = (name_col, email_col) else {
        return ProviderTable {
            table: Table::new(headers, rows),
            points_possible: None,
        };
    };

    let mut points_possible = None;
    let mut students = Vec::with_capacity(rows.len());

    for mut row in rows {
        let name = row.get(name_col).map(cell_to_field).unwrap_or_default();
        if name.trim() == POINT_POSSIBLE {
            if points_possible.is_none() {
                points_possible = Some(row);
            }
            continue;
        }

        let email = row.get(email_col).map(cell_to_field).unwrap_or_default();
        if name.is_empty() || email.is_empty() {
            continue;
        }

        row[email_col] = Some(GradeValue::Text(normalize_email(&email)));
        students.push(row);
    }

    ProviderTable {
        table: Table::new(headers, students),
        points_possible,
    }
}

// =============================================================================
// Export
// =============================================================================

/// Serialize a table back to CSV bytes, ragged rows preserved.
pub fn write_csv(table: &Table, delimiter: char) -> LoadResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .flexible(true)
        .from_writer(Vec::new());

    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(cell_to_field))?;
    }

    writer
        .into_inner()
        .map_err(|e| LoadError::Io(e.into_error()))
}
