//! Read-only source assets holding the serialized city array.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Logical name of the bundled dataset.
pub const DEFAULT_ASSET_NAME: &str = "cities.json";

/// A source that can be opened for one streaming pass.
pub trait SourceAsset: Send + Sync {
    /// Logical name, used in logs and errors.
    fn name(&self) -> &str;

    /// Open a fresh reader positioned at the start of the asset.
    fn open(&self) -> io::Result<OpenedSource>;
}

/// Bytes of the underlying asset consumed so far.
#[derive(Debug, Clone, Default)]
pub struct ByteCounter(Arc<AtomicU64>);

impl ByteCounter {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }
}

/// An opened asset plus what is needed to estimate how far a pass has got.
///
/// For plain assets `position` counts bytes handed to the parser, after
/// buffering. Gzip assets count compressed bytes pulled from disk, since the
/// decompressed size is not known up front.
pub struct OpenedSource {
    pub reader: Box<dyn BufRead + Send>,
    pub position: ByteCounter,
    pub total_bytes: Option<u64>,
}

impl OpenedSource {
    /// Fraction of the raw asset consumed, in `[0, 1]`. Unknown sizes report 0.
    pub fn fraction(position: &ByteCounter, total_bytes: Option<u64>) -> f64 {
        match total_bytes {
            Some(total) if total > 0 => (position.get() as f64 / total as f64).min(1.0),
            _ => 0.0,
        }
    }
}

struct CountingReader<R> {
    inner: R,
    counter: ByteCounter,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.add(n as u64);
        Ok(n)
    }
}

/// Counts bytes consumed from a buffered reader, as opposed to bytes the
/// buffer has read ahead.
struct ConsumedCounter<R> {
    inner: R,
    counter: ByteCounter,
}

impl<R: BufRead> Read for ConsumedCounter<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.add(n as u64);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for ConsumedCounter<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
        self.counter.add(amt as u64);
    }
}

/// Asset backed by a file on disk. Files ending in `.gz` are decompressed
/// transparently.
pub struct FileAsset {
    path: PathBuf,
    name: String,
}

impl FileAsset {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| DEFAULT_ASSET_NAME.to_string());
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_gzipped(&self) -> bool {
        self.path.extension().is_some_and(|ext| ext == "gz")
    }
}

impl SourceAsset for FileAsset {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> io::Result<OpenedSource> {
        let file = File::open(&self.path)?;
        let total_bytes = file.metadata().ok().map(|m| m.len());
        let position = ByteCounter::default();

        let reader: Box<dyn BufRead + Send> = if self.is_gzipped() {
            let counting = CountingReader {
                inner: file,
                counter: position.clone(),
            };
            Box::new(BufReader::new(GzDecoder::new(counting)))
        } else {
            Box::new(ConsumedCounter {
                inner: BufReader::new(file),
                counter: position.clone(),
            })
        };

        Ok(OpenedSource {
            reader,
            position,
            total_bytes,
        })
    }
}

/// Asset held in memory, e.g. embedded with `include_bytes!`.
pub struct BytesAsset {
    name: String,
    bytes: Arc<[u8]>,
}

impl BytesAsset {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

impl SourceAsset for BytesAsset {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> io::Result<OpenedSource> {
        let position = ByteCounter::default();
        let counting = ConsumedCounter {
            inner: BufReader::new(Cursor::new(Arc::clone(&self.bytes))),
            counter: position.clone(),
        };
        Ok(OpenedSource {
            reader: Box::new(counting),
            position,
            total_bytes: Some(self.bytes.len() as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_bytes_asset_counts_consumption() {
        let asset = BytesAsset::new("cities.json", b"[1, 2, 3]".to_vec());
        let mut opened = asset.open().unwrap();
        assert_eq!(OpenedSource::fraction(&opened.position, opened.total_bytes), 0.0);

        let mut content = String::new();
        opened.reader.read_to_string(&mut content).unwrap();
        assert_eq!(content, "[1, 2, 3]");
        assert_eq!(OpenedSource::fraction(&opened.position, opened.total_bytes), 1.0);
    }

    #[test]
    fn test_position_tracks_consumed_not_buffered() {
        let body = format!("{}\n{}\n", "a".repeat(9), "b".repeat(89));
        let asset = BytesAsset::new("cities.json", body.into_bytes());
        let mut opened = asset.open().unwrap();

        let mut line = Vec::new();
        opened.reader.read_until(b'\n', &mut line).unwrap();
        assert_eq!(line.len(), 10);
        assert_eq!(opened.position.get(), 10);
        assert_eq!(OpenedSource::fraction(&opened.position, opened.total_bytes), 0.1);
    }

    #[test]
    fn test_file_asset_position_tracks_consumed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cities.json");
        std::fs::write(&path, format!("{}\n{}\n", "a".repeat(19), "b".repeat(79))).unwrap();

        let mut opened = FileAsset::new(&path).open().unwrap();
        let mut line = Vec::new();
        opened.reader.read_until(b'\n', &mut line).unwrap();
        assert_eq!(OpenedSource::fraction(&opened.position, opened.total_bytes), 0.2);
    }

    #[test]
    fn test_file_asset_missing() {
        let asset = FileAsset::new("/definitely/not/here/cities.json");
        let err = asset.open().err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(asset.name(), "cities.json");
    }

    #[test]
    fn test_file_asset_gzip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cities.json.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"[{\"_id\":1}]").unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        let asset = FileAsset::new(&path);
        let mut opened = asset.open().unwrap();
        let mut content = String::new();
        opened.reader.read_to_string(&mut content).unwrap();
        assert_eq!(content, "[{\"_id\":1}]");
        assert_eq!(OpenedSource::fraction(&opened.position, opened.total_bytes), 1.0);
    }

    #[test]
    fn test_unknown_size_reports_zero() {
        let counter = ByteCounter::default();
        counter.add(10);
        assert_eq!(OpenedSource::fraction(&counter, None), 0.0);
        assert_eq!(OpenedSource::fraction(&counter, Some(0)), 0.0);
        assert_eq!(OpenedSource::fraction(&counter, Some(20)), 0.5);
    }
}
