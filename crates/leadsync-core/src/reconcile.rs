//! Streaming reconciliation of exported record streams.
//!
//! A [`Reconciler`] makes one pass over a record stream (see
//! [`record_stream`](crate::record_stream)), parsing each line on its own and
//! keeping only the identifiers its [`RecordPredicate`] accepts. Memory is
//! bounded by the number of unique kept IDs plus one line buffer.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use indicatif::ProgressBar;
use rustc_hash::FxHashSet;
use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;

use crate::progress::fmt_num;
use crate::record_stream::record_line;
use crate::reference::{ReferenceSet, normalize_email, normalize_linkedin};
use crate::result_set::ResultSet;

/// Records between progress log lines
pub const MILESTONE: usize = 50_000;

/// The only fields a reconciliation pass needs from a record.
///
/// Everything else on the line is skipped without allocation. Non-string
/// emails and URLs read as absent; numeric IDs keep their JSON spelling.
/// Only a JSON object is a record; arrays and scalars fail to parse.
#[derive(Debug, Default)]
pub struct RecordKeys {
    pub id: Option<String>,
    pub email: Option<String>,
    pub linkedin_url: Option<String>,
}

impl<'de> Deserialize<'de> for RecordKeys {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RecordKeysVisitor)
    }
}

struct RecordKeysVisitor;

impl<'de> Visitor<'de> for RecordKeysVisitor {
    type Value = RecordKeys;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut keys = RecordKeys::default();
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "_id" => keys.id = map.next_value::<LenientId>()?.0,
                "email" => keys.email = map.next_value::<LenientString>()?.0,
                "linkedinUrl" => keys.linkedin_url = map.next_value::<LenientString>()?.0,
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(keys)
    }
}

struct LenientId(Option<String>);

impl<'de> Deserialize<'de> for LenientId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        lenient_id(deserializer).map(LenientId)
    }
}

struct LenientString(Option<String>);

impl<'de> Deserialize<'de> for LenientString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        lenient_string(deserializer).map(LenientString)
    }
}

struct LenientVisitor {
    numbers: bool,
}

impl<'de> Visitor<'de> for LenientVisitor {
    type Value = Option<String>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "any JSON value")
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Self::Value, E> {
        Ok(Some(s.to_string()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<Self::Value, E> {
        Ok(Some(s))
    }

    fn visit_i64<E: de::Error>(self, n: i64) -> Result<Self::Value, E> {
        Ok(self.numbers.then(|| n.to_string()))
    }

    fn visit_u64<E: de::Error>(self, n: u64) -> Result<Self::Value, E> {
        Ok(self.numbers.then(|| n.to_string()))
    }

    fn visit_f64<E: de::Error>(self, n: f64) -> Result<Self::Value, E> {
        Ok(self.numbers.then(|| n.to_string()))
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(None)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(None)
    }
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    deserializer.deserialize_any(LenientVisitor { numbers: true })
}

fn lenient_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    deserializer.deserialize_any(LenientVisitor { numbers: false })
}

/// Counters of one pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Physical lines read, framing included
    pub lines: usize,
    /// Parsed records
    pub records: usize,
    /// Lines that were not a JSON object
    pub malformed: usize,
    /// Records with an empty or absent `_id`
    pub missing_id: usize,
    pub matched_by_email: usize,
    pub matched_by_linkedin: usize,
}

/// Decides which records with a non-empty `_id` are kept
pub trait RecordPredicate {
    fn keep(&self, record: &RecordKeys, stats: &mut ReconcileStats) -> bool;
}

/// Keep every identified record; the set does the deduplication
#[derive(Clone, Copy, Debug, Default)]
pub struct Dedup;

impl RecordPredicate for Dedup {
    fn keep(&self, _record: &RecordKeys, _stats: &mut ReconcileStats) -> bool {
        true
    }
}

/// Keep records whose email or LinkedIn URL appears in a [`ReferenceSet`]
#[derive(Debug)]
pub struct MatchReference<'a> {
    reference: &'a ReferenceSet,
}

impl<'a> MatchReference<'a> {
    pub fn new(reference: &'a ReferenceSet) -> Self {
        Self { reference }
    }
}

impl RecordPredicate for MatchReference<'_> {
    fn keep(&self, record: &RecordKeys, stats: &mut ReconcileStats) -> bool {
        let by_email = record
            .email
            .as_deref()
            .is_some_and(|e| self.reference.has_email(&normalize_email(e)));
        let by_linkedin = record
            .linkedin_url
            .as_deref()
            .is_some_and(|u| self.reference.has_linkedin(&normalize_linkedin(u)));

        if by_email {
            stats.matched_by_email += 1;
        }
        if by_linkedin {
            stats.matched_by_linkedin += 1;
        }
        by_email || by_linkedin
    }
}

/// Result of one pass
#[derive(Debug)]
pub struct Reconciliation {
    pub ids: ResultSet,
    pub stats: ReconcileStats,
}

impl Reconciliation {
    pub fn unique(&self) -> usize {
        self.ids.len()
    }

    /// Identified records beyond the first occurrence of their `_id`
    pub fn duplicates(&self) -> usize {
        self.stats
            .records
            .saturating_sub(self.unique() + self.stats.missing_id)
    }
}

pub struct Reconciler<P> {
    predicate: P,
    milestone: usize,
    progress: ProgressBar,
}

impl<P: RecordPredicate> Reconciler<P> {
    pub fn new(predicate: P) -> Self {
        Self {
            predicate,
            milestone: MILESTONE,
            progress: ProgressBar::hidden(),
        }
    }

    /// Stage line updated at each milestone
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_milestone(mut self, every: usize) -> Self {
        self.milestone = every.max(1);
        self
    }

    pub fn run<R: BufRead>(&self, mut reader: R) -> io::Result<Reconciliation> {
        let mut kept: FxHashSet<String> = FxHashSet::default();
        let mut stats = ReconcileStats::default();
        let mut buf = Vec::with_capacity(8 * 1024);

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            stats.lines += 1;

            let Ok(line) = std::str::from_utf8(&buf) else {
                stats.malformed += 1;
                log::debug!("line {}: invalid UTF-8", stats.lines);
                continue;
            };
            let Some(payload) = record_line(line) else {
                continue;
            };
            let record: RecordKeys = match sonic_rs::from_str(payload) {
                Ok(r) => r,
                Err(e) => {
                    stats.malformed += 1;
                    log::debug!("line {}: {e}", stats.lines);
                    continue;
                }
            };
            stats.records += 1;

            match record.id.as_deref().filter(|id| !id.is_empty()) {
                None => stats.missing_id += 1,
                // match counters are per record, so the predicate sees repeats too
                Some(id) => {
                    if self.predicate.keep(&record, &mut stats) && !kept.contains(id) {
                        kept.insert(id.to_string());
                    }
                }
            }

            if stats.records.is_multiple_of(self.milestone) {
                log::info!(
                    "Processed {} records ({} kept so far)",
                    fmt_num(stats.records),
                    fmt_num(kept.len())
                );
                self.progress.set_message(format!(
                    "{} records, {} kept",
                    fmt_num(stats.records),
                    fmt_num(kept.len())
                ));
            }
        }

        self.progress.finish_and_clear();
        if stats.malformed > 0 {
            log::warn!("{} malformed lines skipped", fmt_num(stats.malformed));
        }
        Ok(Reconciliation {
            ids: ResultSet::from(kept),
            stats,
        })
    }

    pub fn run_file(&self, path: impl AsRef<Path>) -> io::Result<Reconciliation> {
        let file = File::open(path)?;
        self.run(BufReader::with_capacity(1024 * 1024, file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(lines: &[&str]) -> String {
        let mut s = String::from("[\n");
        s.push_str(&lines.join(",\n"));
        s.push_str("\n]\n");
        s
    }

    fn dedup(input: &str) -> Reconciliation {
        Reconciler::new(Dedup).run(input.as_bytes()).unwrap()
    }

    #[test]
    fn dedup_basic() {
        let input = stream(&[
            r#"{"_id":"a"}"#,
            r#"{"_id":"b"}"#,
            r#"{"_id":"a"}"#,
            r#"{"_id":"c"}"#,
            r#"{"_id":""}"#,
        ]);
        let result = dedup(&input);
        assert_eq!(result.ids.as_slice(), ["a", "b", "c"]);
        assert_eq!(result.stats.records, 5);
        assert_eq!(result.stats.missing_id, 1);
        assert_eq!(result.duplicates(), 1);
        assert_eq!(result.stats.malformed, 0);
    }

    #[test]
    fn match_by_email() {
        let mut reference = ReferenceSet::new();
        reference.insert_email("x@y.com");
        let input = stream(&[
            r#"{"_id":"1","email":"X@Y.com"}"#,
            r#"{"_id":"2","email":"z@y.com"}"#,
        ]);
        let result = Reconciler::new(MatchReference::new(&reference))
            .run(input.as_bytes())
            .unwrap();
        assert_eq!(result.ids.as_slice(), ["1"]);
        assert_eq!(result.stats.matched_by_email, 1);
        assert_eq!(result.stats.matched_by_linkedin, 0);
    }

    #[test]
    fn match_by_linkedin_counts_each_field() {
        let mut reference = ReferenceSet::new();
        reference.insert_email("a@b.com");
        reference.insert_linkedin("https://www.linkedin.com/in/jane/");
        let input = stream(&[
            r#"{"_id":"1","linkedinUrl":" HTTPS://www.linkedin.com/in/Jane "}"#,
            r#"{"_id":"2","email":"a@b.com","linkedinUrl":"https://www.linkedin.com/in/jane//"}"#,
            r#"{"_id":"2","email":"A@B.COM"}"#,
            r#"{"_id":"3","email":null,"linkedinUrl":42}"#,
        ]);
        let result = Reconciler::new(MatchReference::new(&reference))
            .run(input.as_bytes())
            .unwrap();
        assert_eq!(result.ids.as_slice(), ["1", "2"]);
        assert_eq!(result.stats.matched_by_email, 2);
        assert_eq!(result.stats.matched_by_linkedin, 2);
        assert_eq!(result.stats.records, 4);
    }

    #[test]
    fn malformed_lines_are_counted() {
        let input = "[\n{\"_id\":\"a\"},\n{not json},\n42,\n{\"_id\":\"b\"}\n]\n";
        let result = dedup(input);
        assert_eq!(result.ids.as_slice(), ["a", "b"]);
        assert_eq!(result.stats.malformed, 2);
        assert_eq!(result.stats.records, 2);
        assert_eq!(result.stats.lines, 6);
    }

    #[test]
    fn array_lines_are_malformed() {
        let input = stream(&[r#"["lea_from_array","x@y.com"]"#, r#"{"_id":"real"}"#]);
        let result = dedup(&input);
        assert_eq!(result.ids.as_slice(), ["real"]);
        assert_eq!(result.stats.malformed, 1);
        assert_eq!(result.stats.records, 1);

        let mut reference = ReferenceSet::new();
        reference.insert_email("x@y.com");
        let input = stream(&[r#"["lea_arr","X@Y.com"]"#]);
        let result = Reconciler::new(MatchReference::new(&reference))
            .run(input.as_bytes())
            .unwrap();
        assert!(result.ids.is_empty());
        assert_eq!(result.stats.matched_by_email, 0);
        assert_eq!(result.stats.malformed, 1);
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let mut input = b"[\n{\"_id\":\"a\"},\n".to_vec();
        input.extend_from_slice(&[0xff, 0xfe, b',', b'\n']);
        input.extend_from_slice(b"]\n");
        let result = Reconciler::new(Dedup).run(input.as_slice()).unwrap();
        assert_eq!(result.ids.as_slice(), ["a"]);
        assert_eq!(result.stats.malformed, 1);
    }

    #[test]
    fn numeric_and_null_ids() {
        let input = stream(&[
            r#"{"_id":1}"#,
            r#"{"_id":null}"#,
            r#"{"email":"x@y.com"}"#,
            r#"{"_id":["nested"]}"#,
        ]);
        let result = dedup(&input);
        assert_eq!(result.ids.as_slice(), ["1"]);
        assert_eq!(result.stats.missing_id, 3);
    }

    #[test]
    fn unrelated_fields_are_skipped() {
        let input = stream(&[
            r#"{"_id":"a","custom":{"deep":[1,2,{"x":null}]},"tags":["t"],"email":"a@b.com"}"#,
        ]);
        assert_eq!(dedup(&input).ids.as_slice(), ["a"]);
    }

    #[test]
    fn tolerates_loose_framing() {
        let input = "  [  \n\n  {\"_id\":\"b\"} ,  \n{\"_id\":\"a\"}\n  ]  ";
        let result = dedup(input);
        assert_eq!(result.ids.as_slice(), ["a", "b"]);
        assert_eq!(result.stats.malformed, 0);
    }

    #[test]
    fn empty_stream() {
        let result = dedup("[\n]\n");
        assert!(result.ids.is_empty());
        assert_eq!(result.stats.records, 0);
        assert!(dedup("").ids.is_empty());
    }

    #[test]
    fn milestones_do_not_change_results() {
        let lines: Vec<String> = (0..250).map(|i| format!(r#"{{"_id":"{}"}}"#, i % 100)).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let result = Reconciler::new(Dedup)
            .with_milestone(10)
            .run(stream(&refs).as_bytes())
            .unwrap();
        assert_eq!(result.unique(), 100);
        assert_eq!(result.duplicates(), 150);
    }

    #[test]
    fn reruns_are_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let input_path = dir.path().join("all_leads_20240101_000000.json");
        let lines: Vec<String> = (0..1000)
            .map(|i| format!(r#"{{"_id":"lea_{}","email":"u{}@x.com"}}"#, (i * 7919) % 613, i))
            .collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        std::fs::write(&input_path, stream(&refs)).unwrap();

        let first = dir.path().join("first.csv");
        let second = dir.path().join("second.csv");
        Reconciler::new(Dedup)
            .run_file(&input_path)
            .unwrap()
            .ids
            .save(&first)
            .unwrap();
        Reconciler::new(Dedup)
            .run_file(&input_path)
            .unwrap()
            .ids
            .save(&second)
            .unwrap();
        assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
    }
}
