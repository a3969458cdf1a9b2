//! Reference sets and column readers for local CSV inputs

use std::collections::BTreeSet;
use std::fmt;
use std::io::Read;
use std::path::Path;

use rustc_hash::FxHashSet;

pub const EMAIL_COLUMN: &str = "email";
pub const LINKEDIN_COLUMN: &str = "linkedinUrl";

#[derive(Debug)]
pub enum ReferenceError {
    Csv(csv::Error),
    MissingColumn { column: String, found: Vec<String> },
}

impl fmt::Display for ReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Csv(e) => write!(f, "CSV error: {e}"),
            Self::MissingColumn { column, found } => {
                write!(f, "missing column `{column}` (found: {})", found.join(", "))
            }
        }
    }
}

impl std::error::Error for ReferenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Csv(e) => Some(e),
            Self::MissingColumn { .. } => None,
        }
    }
}

impl From<csv::Error> for ReferenceError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

/// Trim and lowercase
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Trim, lowercase, and strip every trailing `/`
pub fn normalize_linkedin(raw: &str) -> String {
    raw.trim().to_lowercase().trim_end_matches('/').to_string()
}

fn open_reader<R: Read>(rdr: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(rdr)
}

fn column_index(headers: &csv::StringRecord, column: &str) -> Option<usize> {
    headers.iter().position(|h| h == column)
}

/// Normalized emails and LinkedIn URLs to match records against.
///
/// Built once before a scan and read-only afterwards.
#[derive(Debug, Default)]
pub struct ReferenceSet {
    emails: FxHashSet<String>,
    linkedin_urls: FxHashSet<String>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a CSV with `email` and/or `linkedinUrl` columns.
    ///
    /// Either column may be absent, but not both. Blank values are ignored.
    pub fn from_reader<R: Read>(rdr: R) -> Result<Self, ReferenceError> {
        let mut rdr = open_reader(rdr);
        let headers = rdr.headers()?.clone();
        let email_idx = column_index(&headers, EMAIL_COLUMN);
        let linkedin_idx = column_index(&headers, LINKEDIN_COLUMN);
        if email_idx.is_none() && linkedin_idx.is_none() {
            return Err(ReferenceError::MissingColumn {
                column: EMAIL_COLUMN.to_string(),
                found: headers.iter().map(str::to_string).collect(),
            });
        }

        let mut set = Self::new();
        for row in rdr.records() {
            let row = row?;
            if let Some(email) = email_idx.and_then(|i| row.get(i)) {
                set.insert_email(email);
            }
            if let Some(url) = linkedin_idx.and_then(|i| row.get(i)) {
                set.insert_linkedin(url);
            }
        }
        Ok(set)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ReferenceError> {
        let file = std::fs::File::open(path).map_err(csv::Error::from)?;
        Self::from_reader(file)
    }

    pub fn insert_email(&mut self, raw: &str) {
        let email = normalize_email(raw);
        if !email.is_empty() {
            self.emails.insert(email);
        }
    }

    pub fn insert_linkedin(&mut self, raw: &str) {
        let url = normalize_linkedin(raw);
        if !url.is_empty() {
            self.linkedin_urls.insert(url);
        }
    }

    /// `email` must already be normalized
    pub fn has_email(&self, email: &str) -> bool {
        !email.is_empty() && self.emails.contains(email)
    }

    /// `url` must already be normalized
    pub fn has_linkedin(&self, url: &str) -> bool {
        !url.is_empty() && self.linkedin_urls.contains(url)
    }

    pub fn email_count(&self) -> usize {
        self.emails.len()
    }

    pub fn linkedin_count(&self) -> usize {
        self.linkedin_urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty() && self.linkedin_urls.is_empty()
    }
}

/// Trimmed non-empty values of `column`, in file order (duplicates kept)
pub fn read_column<R: Read>(rdr: R, column: &str) -> Result<Vec<String>, ReferenceError> {
    let mut rdr = open_reader(rdr);
    let headers = rdr.headers()?.clone();
    let idx = column_index(&headers, column).ok_or_else(|| ReferenceError::MissingColumn {
        column: column.to_string(),
        found: headers.iter().map(str::to_string).collect(),
    })?;

    let mut values = Vec::new();
    for row in rdr.records() {
        let row = row?;
        if let Some(v) = row.get(idx).map(str::trim).filter(|v| !v.is_empty()) {
            values.push(v.to_string());
        }
    }
    Ok(values)
}

pub fn read_column_path(path: impl AsRef<Path>, column: &str) -> Result<Vec<String>, ReferenceError> {
    let file = std::fs::File::open(path).map_err(csv::Error::from)?;
    read_column(file, column)
}

/// Unique trimmed values of `column`, sorted; case is preserved
pub fn read_unique_column<R: Read>(rdr: R, column: &str) -> Result<Vec<String>, ReferenceError> {
    let unique: BTreeSet<String> = read_column(rdr, column)?.into_iter().collect();
    Ok(unique.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalization() {
        assert_eq!(normalize_email("  X@Y.com "), "x@y.com");
        assert_eq!(normalize_email("   "), "");
    }

    #[test]
    fn linkedin_normalization() {
        assert_eq!(
            normalize_linkedin(" https://LinkedIn.com/in/Jane/ "),
            "https://linkedin.com/in/jane"
        );
        assert_eq!(
            normalize_linkedin("https://linkedin.com/in/jane//"),
            normalize_linkedin("https://linkedin.com/in/jane")
        );
        // query strings and schemes are left alone
        assert_ne!(
            normalize_linkedin("http://linkedin.com/in/jane"),
            normalize_linkedin("https://linkedin.com/in/jane")
        );
        assert_eq!(normalize_linkedin("/"), "");
    }

    #[test]
    fn reference_set_from_csv() {
        let csv = "\
email,linkedinUrl,phone
X@Y.com,,123
 a@b.com ,https://linkedin.com/in/Foo/,
,https://linkedin.com/in/bar,
";
        let set = ReferenceSet::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(set.email_count(), 2);
        assert_eq!(set.linkedin_count(), 2);
        assert!(set.has_email("x@y.com"));
        assert!(set.has_email("a@b.com"));
        assert!(set.has_linkedin("https://linkedin.com/in/foo"));
        assert!(!set.has_email(""));
    }

    #[test]
    fn reference_set_with_only_email_column() {
        let set = ReferenceSet::from_reader("email\nx@y.com\n".as_bytes()).unwrap();
        assert_eq!(set.email_count(), 1);
        assert_eq!(set.linkedin_count(), 0);
    }

    #[test]
    fn reference_set_without_known_columns() {
        let err = ReferenceSet::from_reader("name,phone\na,1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ReferenceError::MissingColumn { .. }));
        assert!(err.to_string().contains("name, phone"));
    }

    #[test]
    fn short_rows_are_tolerated() {
        let set = ReferenceSet::from_reader("phone,email\n1\n2,z@y.com\n".as_bytes()).unwrap();
        assert_eq!(set.email_count(), 1);
    }

    #[test]
    fn read_column_keeps_order_and_duplicates() {
        let csv = "_id\nb\n a \n\nb\n";
        assert_eq!(read_column(csv.as_bytes(), "_id").unwrap(), vec!["b", "a", "b"]);
    }

    #[test]
    fn read_column_missing() {
        let err = read_column("id\n1\n".as_bytes(), "_id").unwrap_err();
        assert!(matches!(err, ReferenceError::MissingColumn { ref column, .. } if column == "_id"));
    }

    #[test]
    fn read_unique_column_sorts_and_preserves_case() {
        let csv = "email\nb@x.com\nA@x.com\nb@x.com\n\n";
        assert_eq!(
            read_unique_column(csv.as_bytes(), "email").unwrap(),
            vec!["A@x.com", "b@x.com"]
        );
    }

    #[test]
    fn missing_file_is_csv_error() {
        let err = ReferenceSet::from_path("/nonexistent/contacts.csv").unwrap_err();
        assert!(matches!(err, ReferenceError::Csv(_)));
    }
}
