//! Sorted, duplicate-free identifier lists

use std::io::{self, Write};
use std::path::Path;

use rustc_hash::FxHashSet;

use crate::reference::{ReferenceError, read_column};
use crate::sink::AtomicFile;

/// Header of every ID CSV
pub const ID_COLUMN: &str = "_id";

/// Identifiers in byte-wise lexicographic order, no duplicates.
///
/// Ordering is fixed at construction, so the same input always renders the
/// same bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResultSet {
    ids: Vec<String>,
}

impl ResultSet {
    pub fn from_unsorted(mut ids: Vec<String>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        Self { ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.ids
    }

    pub fn into_vec(self) -> Vec<String> {
        self.ids
    }

    /// `_id` header then one ID per row
    pub fn write_csv<W: Write>(&self, out: W) -> io::Result<()> {
        let mut wtr = csv::Writer::from_writer(out);
        wtr.write_record([ID_COLUMN])?;
        for id in &self.ids {
            wtr.write_record([id])?;
        }
        wtr.flush()
    }

    /// Write to `path` via tmp→rename
    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut file = AtomicFile::create(path)?;
        self.write_csv(&mut file)?;
        file.commit()?;
        Ok(())
    }

    /// Read the `_id` column of a CSV written by [`save`](ResultSet::save)
    /// (or any CSV with that column)
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReferenceError> {
        let file = std::fs::File::open(path).map_err(csv::Error::from)?;
        Ok(Self::from_unsorted(read_column(file, ID_COLUMN)?))
    }
}

impl From<FxHashSet<String>> for ResultSet {
    fn from(set: FxHashSet<String>) -> Self {
        Self::from_unsorted(set.into_iter().collect())
    }
}

impl FromIterator<String> for ResultSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> ResultSet {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn sorted_and_unique() {
        let rs = set(&["b", "a", "c", "a", "B"]);
        assert_eq!(rs.as_slice(), ["B", "a", "b", "c"]);
        assert_eq!(rs.len(), 4);
    }

    #[test]
    fn csv_rendering() {
        let mut buf = Vec::new();
        set(&["y", "x"]).write_csv(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "_id\nx\ny\n");
    }

    #[test]
    fn empty_set_still_has_header() {
        let mut buf = Vec::new();
        ResultSet::default().write_csv(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "_id\n");
    }

    #[test]
    fn ids_needing_quotes() {
        let mut buf = Vec::new();
        set(&["a,b"]).write_csv(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "_id\n\"a,b\"\n");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.csv");
        let original = set(&["lea_2", "lea_1", "lea_3"]);
        original.save(&path).unwrap();
        assert_eq!(ResultSet::load(&path).unwrap(), original);
    }
}
