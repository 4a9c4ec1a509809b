//! Parsing strategies for the source asset.
//!
//! Each strategy turns a [`SourceAsset`] into a [`RecordReader`]; the
//! [`StreamDriver`](super::driver::StreamDriver) takes it from there. They
//! differ only in how they find record boundaries, which decides what kind
//! of source damage they tolerate:
//!
//! | Strategy    | Reads               | Tolerates                                  |
//! |-------------|---------------------|--------------------------------------------|
//! | `streaming` | incremental scanner | bad records inside a well-formed array     |
//! | `lines`     | one record per line | NDJSON, missing commas, truncated tail     |
//! | `whole-file`| full document       | records wrapped in an object field         |

use super::decoder::{DecodeError, decode_record, decode_value};
use super::scanner::ArrayScanner;
use crate::error::{MigrationError, MigrationResult};
use crate::source::{ByteCounter, OpenedSource, SourceAsset};
use crate::types::City;
use serde_json::Value;
use std::io::{BufRead, ErrorKind, Read};
use std::sync::Arc;

/// One item pulled from a reader.
#[derive(Debug)]
pub enum ReadItem {
    Record(City),
    Invalid(DecodeError),
}

/// A forward-only cursor over the records of one source pass.
pub trait RecordReader: Send {
    /// Next item, or `None` at end of stream. An `Err` means the stream
    /// itself is unusable and the pass must stop.
    fn next_item(&mut self) -> MigrationResult<Option<ReadItem>>;

    /// Estimated fraction of the source consumed so far, in `[0, 1]`.
    fn fraction_consumed(&self) -> f64;
}

/// A self-contained way of reading the source.
pub trait MigrationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn open(&self, source: &dyn SourceAsset) -> MigrationResult<Box<dyn RecordReader>>;
}

/// Strategies in preference order: fastest and leanest first.
pub fn default_strategies() -> Vec<Arc<dyn MigrationStrategy>> {
    vec![
        Arc::new(StreamingStrategy),
        Arc::new(LineStrategy),
        Arc::new(WholeFileStrategy),
    ]
}

fn open_source(source: &dyn SourceAsset) -> MigrationResult<OpenedSource> {
    source.open().map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            MigrationError::SourceMissing(source.name().to_string())
        } else {
            MigrationError::Io(e)
        }
    })
}

fn to_item(result: Result<City, DecodeError>) -> ReadItem {
    match result {
        Ok(city) => ReadItem::Record(city),
        Err(err) => ReadItem::Invalid(err),
    }
}

// ============================================================================
// Streaming
// ============================================================================

/// Incremental scan of a top-level JSON array. Memory use is bounded by the
/// largest single record.
pub struct StreamingStrategy;

impl MigrationStrategy for StreamingStrategy {
    fn name(&self) -> &'static str {
        "streaming"
    }

    fn open(&self, source: &dyn SourceAsset) -> MigrationResult<Box<dyn RecordReader>> {
        let opened = open_source(source)?;
        Ok(Box::new(StreamingReader {
            scanner: ArrayScanner::new(opened.reader),
            position: opened.position,
            total_bytes: opened.total_bytes,
            ordinal: 0,
            finished: false,
        }))
    }
}

struct StreamingReader {
    scanner: ArrayScanner<Box<dyn BufRead + Send>>,
    position: ByteCounter,
    total_bytes: Option<u64>,
    ordinal: u64,
    finished: bool,
}

impl RecordReader for StreamingReader {
    fn next_item(&mut self) -> MigrationResult<Option<ReadItem>> {
        match self.scanner.next_element()? {
            Some(raw) => {
                let ordinal = self.ordinal;
                self.ordinal += 1;
                Ok(Some(to_item(decode_record(&raw, ordinal))))
            }
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }

    fn fraction_consumed(&self) -> f64 {
        if self.finished {
            1.0
        } else {
            OpenedSource::fraction(&self.position, self.total_bytes)
        }
    }
}

// ============================================================================
// Line-oriented
// ============================================================================

/// One record per line, ignoring array punctuation around it.
pub struct LineStrategy;

impl MigrationStrategy for LineStrategy {
    fn name(&self) -> &'static str {
        "lines"
    }

    fn open(&self, source: &dyn SourceAsset) -> MigrationResult<Box<dyn RecordReader>> {
        let opened = open_source(source)?;
        Ok(Box::new(LineReader {
            reader: opened.reader,
            position: opened.position,
            total_bytes: opened.total_bytes,
            line: Vec::with_capacity(256),
            ordinal: 0,
            finished: false,
        }))
    }
}

struct LineReader {
    reader: Box<dyn BufRead + Send>,
    position: ByteCounter,
    total_bytes: Option<u64>,
    line: Vec<u8>,
    ordinal: u64,
    finished: bool,
}

/// Strip whitespace, a BOM, a leading `[` and trailing `,`/`]` from a line.
fn trim_line(line: &[u8]) -> &[u8] {
    let mut s = line.trim_ascii();
    if let Some(rest) = s.strip_prefix(b"\xEF\xBB\xBF") {
        s = rest.trim_ascii();
    }
    if let Some(rest) = s.strip_prefix(b"[") {
        s = rest.trim_ascii();
    }
    while let Some(rest) = s.strip_suffix(b",").or_else(|| s.strip_suffix(b"]")) {
        s = rest.trim_ascii();
    }
    s
}

impl RecordReader for LineReader {
    fn next_item(&mut self) -> MigrationResult<Option<ReadItem>> {
        loop {
            self.line.clear();
            if self.reader.read_until(b'\n', &mut self.line)? == 0 {
                self.finished = true;
                return Ok(None);
            }

            let record = trim_line(&self.line);
            if record.is_empty() {
                continue;
            }

            let ordinal = self.ordinal;
            self.ordinal += 1;
            return Ok(Some(to_item(decode_record(record, ordinal))));
        }
    }

    fn fraction_consumed(&self) -> f64 {
        if self.finished {
            1.0
        } else {
            OpenedSource::fraction(&self.position, self.total_bytes)
        }
    }
}

// ============================================================================
// Whole-file
// ============================================================================

/// Parse the full document in memory. Slowest and most memory hungry, but
/// accepts `{"<field>": [...]}` wrappers the other strategies reject.
pub struct WholeFileStrategy;

impl MigrationStrategy for WholeFileStrategy {
    fn name(&self) -> &'static str {
        "whole-file"
    }

    fn open(&self, source: &dyn SourceAsset) -> MigrationResult<Box<dyn RecordReader>> {
        let mut opened = open_source(source)?;
        let mut bytes = Vec::new();
        opened.reader.read_to_end(&mut bytes)?;

        let document: Value = serde_json::from_slice(&bytes).map_err(|e| {
            MigrationError::malformed(0, format!("line {} column {}: {}", e.line(), e.column(), e))
        })?;
        let items = record_array(document)?;

        Ok(Box::new(WholeFileReader {
            total: items.len(),
            items: items.into_iter(),
            index: 0,
        }))
    }
}

/// Field preferred when the records are wrapped in an object.
const RECORDS_FIELD: &str = "cities";

/// The record list: the document itself, its `cities` field, or else its
/// first array-valued field in document order.
fn record_array(document: Value) -> MigrationResult<Vec<Value>> {
    match document {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            if map.get(RECORDS_FIELD).is_some_and(Value::is_array)
                && let Some(Value::Array(items)) = map.remove(RECORDS_FIELD)
            {
                return Ok(items);
            }
            map.into_iter()
                .find_map(|(_, value)| match value {
                    Value::Array(items) => Some(items),
                    _ => None,
                })
                .ok_or_else(|| MigrationError::malformed(0, "no record array in source object"))
        }
        _ => Err(MigrationError::malformed(0, "expected an array of records")),
    }
}

struct WholeFileReader {
    items: std::vec::IntoIter<Value>,
    total: usize,
    index: usize,
}

impl RecordReader for WholeFileReader {
    fn next_item(&mut self) -> MigrationResult<Option<ReadItem>> {
        let Some(value) = self.items.next() else {
            return Ok(None);
        };
        let ordinal = self.index as u64;
        self.index += 1;
        Ok(Some(to_item(decode_value(value, ordinal))))
    }

    fn fraction_consumed(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.index as f64 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BytesAsset;

    fn drain(strategy: &dyn MigrationStrategy, input: &str) -> MigrationResult<(Vec<i64>, u64)> {
        let asset = BytesAsset::new("cities.json", input.as_bytes().to_vec());
        let mut reader = strategy.open(&asset)?;
        let mut ids = Vec::new();
        let mut errors = 0;
        while let Some(item) = reader.next_item()? {
            match item {
                ReadItem::Record(city) => ids.push(city.id),
                ReadItem::Invalid(_) => errors += 1,
            }
        }
        assert_eq!(reader.fraction_consumed(), 1.0);
        Ok((ids, errors))
    }

    const ARRAY: &str = r#"[
  {"_id":1,"name":"A","country":"AA","coord":{"lat":1.0,"lon":1.0}},
  {"_id":2,"name":"B","country":"BB","coord":{"lat":2.0,"lon":2.0}},
  {"_id":"bad"},
  {"_id":3,"name":"C","country":"CC","coord":{"lat":3.0,"lon":3.0}}
]"#;

    #[test]
    fn test_streaming_skips_bad_records() {
        let (ids, errors) = drain(&StreamingStrategy, ARRAY).unwrap();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(errors, 1);
    }

    #[test]
    fn test_lines_on_pretty_array() {
        let (ids, errors) = drain(&LineStrategy, ARRAY).unwrap();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(errors, 1);
    }

    #[test]
    fn test_whole_file_on_array() {
        let (ids, errors) = drain(&WholeFileStrategy, ARRAY).unwrap();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(errors, 1);
    }

    #[test]
    fn test_ndjson_only_lines() {
        let input = "{\"_id\":1,\"name\":\"A\",\"country\":\"AA\",\"coord\":{\"lat\":1.0,\"lon\":1.0}}\n\
                     {\"_id\":2,\"name\":\"B\",\"country\":\"BB\",\"coord\":{\"lat\":2.0,\"lon\":2.0}}\n";
        assert!(matches!(
            drain(&StreamingStrategy, input),
            Err(MigrationError::Malformed { .. })
        ));
        assert_eq!(drain(&LineStrategy, input).unwrap(), (vec![1, 2], 0));
    }

    #[test]
    fn test_wrapped_object_only_whole_file() {
        let input = r#"{"cities": [{"_id":7,"name":"G","country":"GG","coord":{"lat":7.0,"lon":7.0}}]}"#;
        assert!(drain(&StreamingStrategy, input).is_err());
        let (ids, errors) = drain(&LineStrategy, input).unwrap();
        assert!(ids.is_empty());
        assert_eq!(errors, 1);
        assert_eq!(drain(&WholeFileStrategy, input).unwrap(), (vec![7], 0));
    }

    #[test]
    fn test_whole_file_prefers_cities_field() {
        let input = r#"{"cities": [{"_id":7,"name":"G","country":"GG","coord":{"lat":7.0,"lon":7.0}}],
                        "aliases": [{"_id":8,"name":"H","country":"HH","coord":{"lat":8.0,"lon":8.0}}]}"#;
        assert_eq!(drain(&WholeFileStrategy, input).unwrap(), (vec![7], 0));
    }

    #[test]
    fn test_whole_file_takes_first_array_in_document_order() {
        let input = r#"{"version": 3,
                        "zones": [{"_id":9,"name":"Z","country":"ZZ","coord":{"lat":9.0,"lon":9.0}}],
                        "aliases": [{"_id":8,"name":"H","country":"HH","coord":{"lat":8.0,"lon":8.0}}]}"#;
        assert_eq!(drain(&WholeFileStrategy, input).unwrap(), (vec![9], 0));
    }

    #[test]
    fn test_whole_file_rejects_scalar_document() {
        assert!(matches!(
            drain(&WholeFileStrategy, "42"),
            Err(MigrationError::Malformed { .. })
        ));
    }

    #[test]
    fn test_missing_source() {
        let asset = crate::source::FileAsset::new("/no/such/dir/cities.json");
        for strategy in default_strategies() {
            match strategy.open(&asset) {
                Err(MigrationError::SourceMissing(name)) => assert_eq!(name, "cities.json"),
                Err(other) => panic!("{}: unexpected error {:?}", strategy.name(), other),
                Ok(_) => panic!("{}: opened a missing source", strategy.name()),
            }
        }
    }

    #[test]
    fn test_trim_line() {
        assert_eq!(trim_line(b"  [{\"a\":1},\r\n"), b"{\"a\":1}");
        assert_eq!(trim_line(b"{\"a\":1}]\n"), b"{\"a\":1}");
        assert_eq!(trim_line(b"]\n"), b"");
        assert_eq!(trim_line(b"{\"a\":[1]}\n"), b"{\"a\":[1]}");
    }

    #[test]
    fn test_default_order() {
        let names: Vec<&str> = default_strategies().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["streaming", "lines", "whole-file"]);
    }
}
