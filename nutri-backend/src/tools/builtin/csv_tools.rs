//! CSV toolkit
//!
//! A family of tools bound to a fixed list of CSV files. Files are addressed by
//! their stem (`food.csv` → `food`) and streamed at execution time, so building
//! the toolkit never touches the filesystem and a lookup reads only as far as
//! it needs to.

use crate::tools::registry::Tool;
use crate::tools::types::{
    PropertySchema, ToolContext, ToolDefinition, ToolGroup, ToolInputSchema, ToolResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

const DEFAULT_ROW_LIMIT: usize = 50;
const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Incremental CSV record parser fed one line at a time.
///
/// Quoted fields may hold commas, doubled quotes and line breaks. A quote only
/// opens a quoted field at the start of a field; anywhere else (`12" roll`)
/// it is kept as a literal character.
#[derive(Debug, Default)]
struct RecordParser {
    record: Vec<String>,
    field: String,
    in_quotes: bool,
}

impl RecordParser {
    /// Feed one line without its terminator. Returns the finished record, or
    /// `None` for a blank line or while a quoted field continues on the next
    /// line.
    fn push_line(&mut self, line: &str) -> Option<Vec<String>> {
        if self.in_quotes {
            self.field.push('\n');
        } else if line.trim().is_empty() {
            return None;
        }

        let mut at_field_start = !self.in_quotes;
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            if self.in_quotes {
                match c {
                    '"' if chars.peek() == Some(&'"') => {
                        chars.next();
                        self.field.push('"');
                    }
                    '"' => self.in_quotes = false,
                    _ => self.field.push(c),
                }
                continue;
            }

            match c {
                '"' if at_field_start => self.in_quotes = true,
                ',' => {
                    self.record.push(std::mem::take(&mut self.field));
                    at_field_start = true;
                    continue;
                }
                _ => self.field.push(c),
            }
            at_field_start = false;
        }

        if self.in_quotes {
            return None;
        }
        self.record.push(std::mem::take(&mut self.field));
        Some(std::mem::take(&mut self.record))
    }

    fn finish(&self) -> Result<(), String> {
        if self.in_quotes {
            return Err("Unterminated quoted field".to_string());
        }
        Ok(())
    }
}

/// Row as a JSON object keyed by header; missing trailing cells become ""
fn row_object(headers: &[String], row: &[String]) -> Value {
    let mut obj = Map::new();
    for (i, header) in headers.iter().enumerate() {
        let cell = row.get(i).cloned().unwrap_or_default();
        obj.insert(header.clone(), Value::String(cell));
    }
    Value::Object(obj)
}

/// Case-insensitive substring match in `column`, or in any column.
/// `needle` must already be lowercase.
fn row_matches(row: &[String], column: Option<usize>, needle: &str) -> bool {
    match column {
        Some(idx) => row
            .get(idx)
            .map(|cell| cell.to_lowercase().contains(needle))
            .unwrap_or(false),
        None => row.iter().any(|cell| cell.to_lowercase().contains(needle)),
    }
}

/// Streaming CSV reader: the header is read up front, data rows on demand,
/// so a lookup stops reading as soon as it has enough rows.
pub struct CsvReader<R> {
    lines: Lines<R>,
    parser: RecordParser,
    headers: Vec<String>,
}

impl<R: AsyncBufRead + Unpin> CsvReader<R> {
    pub async fn new(reader: R) -> Result<Self, String> {
        let mut csv = CsvReader {
            lines: reader.lines(),
            parser: RecordParser::default(),
            headers: Vec::new(),
        };
        let headers = csv
            .next_record(true)
            .await?
            .ok_or_else(|| "CSV file is empty".to_string())?;
        csv.headers = headers.into_iter().map(|h| h.trim().to_string()).collect();
        Ok(csv)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(column.trim()))
    }

    async fn next_record(&mut self, first: bool) -> Result<Option<Vec<String>>, String> {
        let mut strip_bom = first;
        while let Some(line) = self.lines.next_line().await.map_err(|e| e.to_string())? {
            let line = match line.strip_prefix('\u{feff}') {
                Some(rest) if strip_bom => rest,
                _ => line.as_str(),
            };
            strip_bom = false;
            if let Some(record) = self.parser.push_line(line) {
                return Ok(Some(record));
            }
        }
        self.parser.finish()?;
        Ok(None)
    }

    pub async fn next_row(&mut self) -> Result<Option<Vec<String>>, String> {
        self.next_record(false).await
    }

    /// Up to `limit` rows accepted by `keep`, as JSON objects. Reading stops
    /// at the `limit`-th match.
    pub async fn collect_rows<F>(&mut self, limit: usize, keep: F) -> Result<Vec<Value>, String>
    where
        F: Fn(&[String]) -> bool,
    {
        let mut rows = Vec::new();
        while rows.len() < limit {
            match self.next_row().await? {
                Some(row) if keep(row.as_slice()) => rows.push(row_object(&self.headers, &row)),
                Some(_) => {}
                None => break,
            }
        }
        Ok(rows)
    }
}

/// File list shared by every tool of one toolkit
pub struct CsvSource {
    files: Vec<PathBuf>,
}

impl CsvSource {
    pub fn new(files: Vec<PathBuf>) -> Self {
        CsvSource { files }
    }

    pub fn names(&self) -> Vec<String> {
        self.files.iter().map(|p| file_stem(p)).collect()
    }

    fn resolve(&self, csv_name: &str) -> Option<&PathBuf> {
        let wanted = csv_name.trim().trim_end_matches(".csv");
        self.files.iter().find(|p| file_stem(p) == wanted)
    }

    /// Open `csv_name` for streaming; only the header is read here
    pub async fn open(&self, csv_name: &str) -> Result<CsvReader<BufReader<File>>, String> {
        let path = self.resolve(csv_name).ok_or_else(|| {
            format!(
                "Unknown CSV file '{}'. Available files: {}",
                csv_name,
                self.names().join(", ")
            )
        })?;
        let file = File::open(path)
            .await
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        CsvReader::new(BufReader::new(file))
            .await
            .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn csv_name_property() -> PropertySchema {
    PropertySchema::string("Name of the CSV file without extension, as returned by list_csv_files")
}

fn definition(
    name: &str,
    description: String,
    properties: HashMap<String, PropertySchema>,
    required: &[&str],
) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description,
        input_schema: ToolInputSchema {
            schema_type: "object".to_string(),
            properties,
            required: required.iter().map(|s| s.to_string()).collect(),
        },
        group: ToolGroup::Data,
    }
}

/// Build the four CSV tools bound to `files`
pub fn csv_toolkit(files: Vec<PathBuf>) -> Vec<Arc<dyn Tool>> {
    let source = Arc::new(CsvSource::new(files));
    vec![
        Arc::new(ListCsvFilesTool::new(source.clone())),
        Arc::new(ReadCsvFileTool::new(source.clone())),
        Arc::new(GetColumnsTool::new(source.clone())),
        Arc::new(SearchCsvFileTool::new(source)),
    ]
}

pub struct ListCsvFilesTool {
    source: Arc<CsvSource>,
}

impl ListCsvFilesTool {
    pub fn new(source: Arc<CsvSource>) -> Self {
        ListCsvFilesTool { source }
    }
}

#[async_trait]
impl Tool for ListCsvFilesTool {
    fn definition(&self) -> ToolDefinition {
        definition(
            "list_csv_files",
            format!(
                "List the CSV files you can read. Available: {}",
                self.source.names().join(", ")
            ),
            HashMap::new(),
            &[],
        )
    }

    async fn execute(&self, _params: Value, _context: &ToolContext) -> ToolResult {
        ToolResult::json(&self.source.names())
    }
}

pub struct ReadCsvFileTool {
    source: Arc<CsvSource>,
}

impl ReadCsvFileTool {
    pub fn new(source: Arc<CsvSource>) -> Self {
        ReadCsvFileTool { source }
    }
}

#[derive(Debug, Deserialize)]
struct ReadParams {
    csv_name: String,
    row_limit: Option<usize>,
}

#[async_trait]
impl Tool for ReadCsvFileTool {
    fn definition(&self) -> ToolDefinition {
        let mut properties = HashMap::new();
        properties.insert("csv_name".to_string(), csv_name_property());
        properties.insert(
            "row_limit".to_string(),
            PropertySchema::integer(
                "Maximum number of rows to return",
                Some(DEFAULT_ROW_LIMIT as i64),
            ),
        );
        definition(
            "read_csv_file",
            "Read the first rows of a CSV file. Returns a JSON list of rows keyed by column name.".to_string(),
            properties,
            &["csv_name"],
        )
    }

    async fn execute(&self, params: Value, _context: &ToolContext) -> ToolResult {
        let params: ReadParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };

        let mut reader = match self.source.open(&params.csv_name).await {
            Ok(r) => r,
            Err(e) => return ToolResult::error(e),
        };

        let limit = params.row_limit.unwrap_or(DEFAULT_ROW_LIMIT);
        match reader.collect_rows(limit, |_| true).await {
            Ok(rows) => ToolResult::json(&rows),
            Err(e) => ToolResult::error(format!("Failed to parse '{}': {}", params.csv_name, e)),
        }
    }
}

pub struct GetColumnsTool {
    source: Arc<CsvSource>,
}

impl GetColumnsTool {
    pub fn new(source: Arc<CsvSource>) -> Self {
        GetColumnsTool { source }
    }
}

#[derive(Debug, Deserialize)]
struct ColumnsParams {
    csv_name: String,
}

#[async_trait]
impl Tool for GetColumnsTool {
    fn definition(&self) -> ToolDefinition {
        let mut properties = HashMap::new();
        properties.insert("csv_name".to_string(), csv_name_property());
        definition(
            "get_columns",
            "Get the column names of a CSV file.".to_string(),
            properties,
            &["csv_name"],
        )
    }

    async fn execute(&self, params: Value, _context: &ToolContext) -> ToolResult {
        let params: ColumnsParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };

        match self.source.open(&params.csv_name).await {
            Ok(reader) => ToolResult::json(&reader.headers()),
            Err(e) => ToolResult::error(e),
        }
    }
}

pub struct SearchCsvFileTool {
    source: Arc<CsvSource>,
}

impl SearchCsvFileTool {
    pub fn new(source: Arc<CsvSource>) -> Self {
        SearchCsvFileTool { source }
    }
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    csv_name: String,
    column: Option<String>,
    value: String,
    limit: Option<usize>,
}

#[async_trait]
impl Tool for SearchCsvFileTool {
    fn definition(&self) -> ToolDefinition {
        let mut properties = HashMap::new();
        properties.insert("csv_name".to_string(), csv_name_property());
        properties.insert(
            "column".to_string(),
            PropertySchema::string("Column to match against. Omit to match any column."),
        );
        properties.insert(
            "value".to_string(),
            PropertySchema::string("Text to look for (case-insensitive substring match)"),
        );
        properties.insert(
            "limit".to_string(),
            PropertySchema::integer(
                "Maximum number of matching rows",
                Some(DEFAULT_SEARCH_LIMIT as i64),
            ),
        );
        definition(
            "search_csv_file",
            "Find rows of a CSV file whose column contains a value, e.g. {\"csv_name\": \"food\", \"column\": \"description\", \"value\": \"chicken\"}.".to_string(),
            properties,
            &["csv_name", "value"],
        )
    }

    async fn execute(&self, params: Value, _context: &ToolContext) -> ToolResult {
        let params: SearchParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };

        if params.value.trim().is_empty() {
            return ToolResult::error("'value' must not be empty");
        }

        let mut reader = match self.source.open(&params.csv_name).await {
            Ok(r) => r,
            Err(e) => return ToolResult::error(e),
        };

        let column = match params.column.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(name) => match reader.column_index(name) {
                Some(idx) => Some(idx),
                None => {
                    return ToolResult::error(format!(
                        "Unknown column '{}'. Columns: {}",
                        name,
                        reader.headers().join(", ")
                    ));
                }
            },
            None => None,
        };

        let needle = params.value.trim().to_lowercase();
        let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        let matches = match reader
            .collect_rows(limit, |row| row_matches(row, column, &needle))
            .await
        {
            Ok(m) => m,
            Err(e) => return ToolResult::error(format!("Failed to parse '{}': {}", params.csv_name, e)),
        };
        if matches.is_empty() {
            return ToolResult::success(format!(
                "No rows in '{}' match '{}'",
                params.csv_name, params.value
            ));
        }
        ToolResult::json(&matches)
    }
}
