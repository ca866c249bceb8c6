//! Course catalog loading.
//!
//! Course spreadsheets arrive with inconsistent headers. A small alias table
//! maps recognised header variants to the canonical `name` and `url` fields;
//! the mapping is resolved once per file and every row is then read through it.

use crate::config::CourseIdentity;
use crate::error::{Result, SvarError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Header aliases for the course name, in priority order.
const NAME_ALIASES: &[&str] = &["course_name", "title"];
/// Header aliases for the course URL, in priority order.
const URL_ALIASES: &[&str] = &["course_url", "url"];

/// A normalised course entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub id: Uuid,
    pub name: Option<String>,
    pub url: Option<String>,
    /// Catalog the record was last loaded from.
    pub catalog: String,
    /// Every column of the source row, keyed by its original header.
    pub raw_fields: BTreeMap<String, String>,
}

impl CourseRecord {
    /// Name if present, otherwise the URL.
    pub fn display_label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.url.as_deref())
            .unwrap_or_default()
    }

    /// Text sent to the embedding service for this course.
    pub fn embedding_text(&self) -> String {
        let mut text = format!("Course: {}", self.display_label());
        for (key, value) in &self.raw_fields {
            if value.trim().is_empty() {
                continue;
            }
            text.push_str(&format!("\n{}: {}", key, value.trim()));
        }
        text
    }
}

/// Column positions of the canonical fields within one file's header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub name: Option<usize>,
    pub url: Option<usize>,
}

/// Outcome of loading one catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogLoad {
    pub catalog: String,
    pub records: Vec<CourseRecord>,
    /// Rows with neither a name nor a usable URL.
    pub skipped: usize,
    /// Rows folded into an earlier record with the same id.
    pub duplicates: usize,
}

/// Normalises tabular course data into [`CourseRecord`]s.
pub struct CatalogLoader {
    header_separator: Regex,
    identity: CourseIdentity,
}

impl CatalogLoader {
    pub fn new(identity: CourseIdentity) -> Result<Self> {
        let header_separator = Regex::new(r"[\s\-]+")
            .map_err(|e| SvarError::Config(format!("Invalid header pattern: {}", e)))?;
        Ok(Self {
            header_separator,
            identity,
        })
    }

    fn normalize_header(&self, header: &str) -> String {
        self.header_separator
            .replace_all(header.trim(), "_")
            .to_lowercase()
    }

    /// Find the name and URL columns. Fails if neither is present.
    pub fn resolve_columns<S: AsRef<str>>(&self, headers: &[S]) -> Result<ColumnMap> {
        let normalized: Vec<String> = headers
            .iter()
            .map(|h| self.normalize_header(h.as_ref()))
            .collect();

        let find = |aliases: &[&str]| {
            aliases
                .iter()
                .find_map(|alias| normalized.iter().position(|h| h == alias))
        };

        let map = ColumnMap {
            name: find(NAME_ALIASES),
            url: find(URL_ALIASES),
        };

        if map.name.is_none() && map.url.is_none() {
            return Err(SvarError::MalformedInput(format!(
                "Unrecognized course schema: no name ({}) or url ({}) column in [{}]",
                NAME_ALIASES.join("|"),
                URL_ALIASES.join("|"),
                headers
                    .iter()
                    .map(|h| h.as_ref())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        Ok(map)
    }

    /// Normalise already-split rows. `catalog` names the source for row-based ids.
    pub fn normalize_rows<S: AsRef<str>>(
        &self,
        catalog: &str,
        headers: &[S],
        rows: &[Vec<String>],
    ) -> Result<CatalogLoad> {
        let columns = self.resolve_columns(headers)?;
        let mut load = CatalogLoad {
            catalog: catalog.to_string(),
            ..Default::default()
        };
        let mut seen = HashSet::new();

        for (position, row) in rows.iter().enumerate() {
            let Some(record) = self.build_record(catalog, position, headers, row, columns) else {
                load.skipped += 1;
                continue;
            };
            if !seen.insert(record.id) {
                load.duplicates += 1;
                continue;
            }
            load.records.push(record);
        }

        debug!(
            catalog,
            records = load.records.len(),
            skipped = load.skipped,
            duplicates = load.duplicates,
            "Catalog normalised"
        );
        Ok(load)
    }

    /// Read a CSV stream with a header row.
    pub fn read_csv<R: Read>(&self, catalog: &str, reader: R) -> Result<CatalogLoad> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
        let rows = csv_reader
            .records()
            .map(|r| r.map(|rec| rec.iter().map(str::to_string).collect::<Vec<_>>()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        self.normalize_rows(catalog, &headers, &rows)
    }

    /// Load a CSV file; the file stem names the catalog.
    pub fn load_csv(&self, path: &Path) -> Result<CatalogLoad> {
        let catalog = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("courses")
            .to_string();
        let file = std::fs::File::open(path)?;
        let load = self.read_csv(&catalog, file)?;
        info!(
            "Loaded {} courses from {:?} ({} rows skipped)",
            load.records.len(),
            path,
            load.skipped
        );
        Ok(load)
    }

    fn build_record<S: AsRef<str>>(
        &self,
        catalog: &str,
        position: usize,
        headers: &[S],
        row: &[String],
        columns: ColumnMap,
    ) -> Option<CourseRecord> {
        let cell = |idx: Option<usize>| {
            idx.and_then(|i| row.get(i))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let name = cell(columns.name).map(str::to_string);
        let url = cell(columns.url)
            .filter(|u| url::Url::parse(u).is_ok())
            .map(str::to_string);

        if name.is_none() && url.is_none() {
            return None;
        }

        let raw_fields: BTreeMap<String, String> = headers
            .iter()
            .zip(row.iter())
            .map(|(h, v)| (h.as_ref().to_string(), v.clone()))
            .collect();

        let key = match (self.identity, &name) {
            (CourseIdentity::Name, Some(n)) => format!("svar:course-name:{}", n.to_lowercase()),
            (CourseIdentity::Name, None) => {
                format!("svar:course-url:{}", url.as_deref().unwrap_or_default())
            }
            (CourseIdentity::Row, _) => format!("svar:course:{}:{}", catalog, position),
        };

        Some(CourseRecord {
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()),
            name,
            url,
            catalog: catalog.to_string(),
            raw_fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_title_and_url_headers_map_to_canonical_fields() {
        let loader = CatalogLoader::new(CourseIdentity::Row).unwrap();
        let headers = ["title", "url", "extra"];
        let rows = vec![
            row(&["Deep Learning", "https://example.com/dl", "ignored"]),
            row(&["", "", "only extra"]),
        ];

        let load = loader.normalize_rows("catalog", &headers, &rows).unwrap();

        assert_eq!(load.records.len(), 1);
        assert_eq!(load.skipped, 1);
        let course = &load.records[0];
        assert_eq!(course.name.as_deref(), Some("Deep Learning"));
        assert_eq!(course.url.as_deref(), Some("https://example.com/dl"));
        assert_eq!(course.raw_fields.get("extra").map(String::as_str), Some("ignored"));
    }

    #[test]
    fn test_headers_match_case_and_separator_insensitively() {
        let loader = CatalogLoader::new(CourseIdentity::Row).unwrap();
        let map = loader
            .resolve_columns(&["Provider", "Course Name", "COURSE-URL"])
            .unwrap();
        assert_eq!(map, ColumnMap { name: Some(1), url: Some(2) });
    }

    #[test]
    fn test_course_name_preferred_over_title() {
        let loader = CatalogLoader::new(CourseIdentity::Row).unwrap();
        let map = loader.resolve_columns(&["title", "course_name"]).unwrap();
        assert_eq!(map.name, Some(1));
        assert_eq!(map.url, None);
    }

    #[test]
    fn test_unrecognized_schema_is_rejected() {
        let loader = CatalogLoader::new(CourseIdentity::Row).unwrap();
        let err = loader.resolve_columns(&["provider", "price"]).unwrap_err();
        assert!(matches!(err, SvarError::MalformedInput(_)));
    }

    #[test]
    fn test_url_only_row_is_kept_and_invalid_url_dropped() {
        let loader = CatalogLoader::new(CourseIdentity::Row).unwrap();
        let rows = vec![
            row(&["", "https://example.com/stats"]),
            row(&["", "not a link"]),
        ];
        let load = loader.normalize_rows("c", &["name_col", "url"], &rows).unwrap();

        assert_eq!(load.records.len(), 1);
        assert_eq!(load.skipped, 1);
        assert_eq!(load.records[0].display_label(), "https://example.com/stats");
    }

    #[test]
    fn test_row_ids_are_stable_across_runs() {
        let loader = CatalogLoader::new(CourseIdentity::Row).unwrap();
        let rows = vec![row(&["A", "https://a.example"]), row(&["B", "https://b.example"])];
        let first = loader.normalize_rows("c", &["title", "url"], &rows).unwrap();
        let second = loader.normalize_rows("c", &["title", "url"], &rows).unwrap();

        assert_eq!(first.records[0].id, second.records[0].id);
        assert_ne!(first.records[0].id, first.records[1].id);
    }

    #[test]
    fn test_name_identity_collapses_repeated_names() {
        let loader = CatalogLoader::new(CourseIdentity::Name).unwrap();
        let rows = vec![
            row(&["Linear Algebra", "https://a.example"]),
            row(&["linear algebra", "https://b.example"]),
            row(&["Calculus", "https://c.example"]),
        ];
        let load = loader.normalize_rows("c", &["title", "url"], &rows).unwrap();

        assert_eq!(load.records.len(), 2);
        assert_eq!(load.duplicates, 1);
        assert_eq!(load.records[0].url.as_deref(), Some("https://a.example"));
    }

    #[test]
    fn test_read_csv() {
        let loader = CatalogLoader::new(CourseIdentity::Row).unwrap();
        let data = "Course_Name,Course_URL,Level\nIntro to ML,https://example.com/ml,Beginner\n,,\n";
        let load = loader.read_csv("courses", data.as_bytes()).unwrap();

        assert_eq!(load.records.len(), 1);
        assert_eq!(load.skipped, 1);
        assert!(load.records[0].embedding_text().contains("Level: Beginner"));
    }
}
