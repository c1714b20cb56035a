//! Markdown reference extractor
//!
//! Walks the reference document line by line, tracking the current section
//! heading and whether we are inside a metrics table (one whose header row has
//! a `Metric Name` cell). Every data row becomes a [`Metric`].

use crate::error::AppError;
use crate::metrics::{
    extract_tags, infer_level, normalize_data_type, normalize_period, Metric, MetricsFile, Period,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Header cell that marks a table as a metrics table
pub const METRIC_NAME_HEADER: &str = "Metric Name";

/// Version placeholder used when the document declares no API version
pub const UNKNOWN_VERSION: &str = "unknown";

/// Source of raw document text
pub trait DocumentSource {
    fn read(&self) -> Result<String, AppError>;
}

/// Document stored on the local filesystem, bounded in size
pub struct FileDocument {
    path: PathBuf,
    max_bytes: u64,
}

impl FileDocument {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            path: path.into(),
            max_bytes,
        }
    }
}

impl DocumentSource for FileDocument {
    fn read(&self) -> Result<String, AppError> {
        if !self.path.exists() {
            return Err(AppError::SourceNotFound(format!(
                "Reference document not found at {}",
                self.path.display()
            )));
        }

        let size = fs::metadata(&self.path)?.len();
        if size > self.max_bytes {
            return Err(AppError::InvalidInput(format!(
                "Reference document is {} bytes, limit is {}",
                size, self.max_bytes
            )));
        }

        let content = fs::read_to_string(&self.path)?;
        debug!("Read reference document {}: {} bytes", self.path.display(), size);
        Ok(content)
    }
}

/// Column positions of the fields inside a metrics table row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    description: usize,
    periods: usize,
    data_type: usize,
    notes: usize,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            description: 1,
            periods: 2,
            data_type: 3,
            notes: 4,
        }
    }
}

impl Columns {
    /// Resolve columns from header cells, keeping positional defaults for unknown headers
    fn from_headers(headers: &[String]) -> Self {
        let mut columns = Columns::default();
        for (idx, header) in headers.iter().enumerate().skip(1) {
            let header = header.to_lowercase();
            if header.contains("description") {
                columns.description = idx;
            } else if header.contains("period") {
                columns.periods = idx;
            } else if header.contains("type") {
                columns.data_type = idx;
            } else if header.contains("note") {
                columns.notes = idx;
            }
        }
        columns
    }
}

#[derive(Debug)]
enum State {
    Scanning,
    InTable { columns: Columns },
}

#[derive(Debug, Default)]
struct ExtractionStats {
    rows: usize,
    rejected: usize,
    deprecated_section_rows: usize,
    period_fallbacks: usize,
}

fn heading_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#+\s*").expect("static regex"))
}

fn separator_row() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\|[\s\-:|]*\|$").expect("static regex"))
}

fn version_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)API Version:\s*\**\s*v(\d+\.\d+)").expect("static regex"))
}

fn updated_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)Last Updated:([^\n]+)").expect("static regex"))
}

/// Split a table line into trimmed cells, keeping empty cells in place.
///
/// Leading and trailing borders are dropped; `\|` is treated as a literal pipe.
fn split_cells(line: &str) -> Vec<String> {
    let inner = line.trim();
    let inner = inner.strip_prefix('|').unwrap_or(inner);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner
        .replace("\\|", "\u{0}")
        .split('|')
        .map(|cell| cell.trim().replace('\u{0}', "|"))
        .collect()
}

fn contains_deprecated(text: &str) -> bool {
    text.to_lowercase().contains("deprecated")
}

/// Extractor over one document snapshot
pub struct Extractor {
    content: String,
    extracted_on: NaiveDate,
}

impl Extractor {
    /// Create an extractor over already-loaded document text
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            extracted_on: Utc::now().date_naive(),
        }
    }

    /// Read the document once from a source
    pub fn from_source(source: &dyn DocumentSource) -> Result<Self, AppError> {
        Ok(Self::new(source.read()?))
    }

    /// Override the extraction date stamped into the version string
    pub fn with_extraction_date(mut self, date: NaiveDate) -> Self {
        self.extracted_on = date;
        self
    }

    /// Extract every metric row, in document order
    pub fn extract(&self) -> Vec<Metric> {
        let mut metrics = Vec::new();
        let mut stats = ExtractionStats::default();
        let mut section = String::new();
        let mut state = State::Scanning;

        for raw in self.content.lines() {
            let line = raw.trim();

            if line.starts_with('#') {
                section = heading_marker().replace(line, "").into_owned();
                state = State::Scanning;
                continue;
            }

            if line.starts_with('|') && line.contains(METRIC_NAME_HEADER) {
                let headers: Vec<String> = split_cells(line)
                    .into_iter()
                    .filter(|cell| !cell.is_empty())
                    .collect();
                debug!("Metrics table under '{}' with columns {:?}", section, headers);
                state = State::InTable {
                    columns: Columns::from_headers(&headers),
                };
                continue;
            }

            let columns = match state {
                State::Scanning => continue,
                State::InTable { columns } => columns,
            };

            if !line.starts_with('|') {
                state = State::Scanning;
                continue;
            }

            if separator_row().is_match(line) {
                continue;
            }

            let cells = split_cells(line);
            if cells.iter().filter(|cell| !cell.is_empty()).count() < 2 {
                continue;
            }

            stats.rows += 1;
            if let Some(metric) = self.parse_row(&cells, columns, &section, &mut stats) {
                metrics.push(metric);
            }
        }

        info!(
            "Extracted {} metrics from {} table rows ({} rejected, {} in deprecated sections, {} period fallbacks)",
            metrics.len(),
            stats.rows,
            stats.rejected,
            stats.deprecated_section_rows,
            stats.period_fallbacks
        );
        metrics
    }

    fn parse_row(
        &self,
        cells: &[String],
        columns: Columns,
        section: &str,
        stats: &mut ExtractionStats,
    ) -> Option<Metric> {
        let cell = |idx: usize| cells.get(idx).map(String::as_str).unwrap_or("");

        let raw_name = cell(0);
        if raw_name.is_empty() || raw_name == METRIC_NAME_HEADER || raw_name.contains("---") {
            stats.rejected += 1;
            return None;
        }

        if contains_deprecated(section) {
            stats.deprecated_section_rows += 1;
            return None;
        }

        let name = raw_name.replace('`', "").trim().to_string();
        if name.is_empty() {
            stats.rejected += 1;
            return None;
        }

        let raw_description = cell(columns.description);
        let notes = cell(columns.notes);

        let periods = cell(columns.periods)
            .split(',')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                normalize_period(segment).unwrap_or_else(|e| {
                    debug!("{} on '{}', using day", e, name);
                    stats.period_fallbacks += 1;
                    Period::Day
                })
            })
            .collect();

        let deprecated = contains_deprecated(raw_description)
            || contains_deprecated(notes)
            || contains_deprecated(section);

        Some(Metric {
            level: infer_level(section),
            tags: extract_tags(&name, raw_description),
            description: raw_description.replace("**", ""),
            periods,
            data_type: normalize_data_type(cell(columns.data_type)),
            notes: (!notes.is_empty()).then(|| notes.to_string()),
            deprecated,
            name,
        })
    }

    /// Version declared by the document, suffixed with the extraction date
    pub fn version(&self) -> String {
        let date = self.extracted_on.format("%Y-%m-%d");
        match version_line().captures(&self.content) {
            Some(caps) => format!("v{}.{}", &caps[1], date),
            None => format!("{}.{}", UNKNOWN_VERSION, date),
        }
    }

    /// Last-updated timestamp declared by the document, or now
    pub fn last_updated(&self) -> DateTime<Utc> {
        updated_line()
            .captures(&self.content)
            .and_then(|caps| {
                let raw = caps[1].replace('*', "");
                let parsed = parse_timestamp(raw.trim());
                if parsed.is_none() {
                    warn!("Unparsable Last Updated value '{}', using current time", raw.trim());
                }
                parsed
            })
            .unwrap_or_else(Utc::now)
    }

    /// Run a full extraction pass into a persistable collection
    pub fn to_metrics_file(&self) -> MetricsFile {
        MetricsFile {
            version: self.version(),
            updated_at: self.last_updated(),
            metrics: self.extract(),
        }
    }
}

/// Parse the date formats seen in reference documents
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&ts));
    }

    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%Y/%m/%d", "%m/%d/%Y"];
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|ts| Utc.from_utc_datetime(&ts))
}
