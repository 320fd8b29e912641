/// Block model export: CSV table, optionally wrapped in a zip archive.
use crate::block::Block;
use crate::clock::Clock;
use crate::config::ExportConfig;
use crate::error::ExportError;
use std::fmt;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const CSV_HEADER: &str = "x,y,z,i,j,k,rock,density,zone,cu_grade,au_grade,value\n";

/// Rows assembled per string chunk.
const ROWS_PER_CHUNK: usize = 10_000;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Compression collaborator.
pub trait Archiver: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    /// Wraps `contents` as the single entry `entry_name` of a new archive.
    fn archive(&self, entry_name: &str, contents: &[u8]) -> Result<Vec<u8>, ExportError>;
}

/// Deflate-compressed zip archives.
#[derive(Debug, Clone, Copy)]
pub struct ZipArchiver {
    level: i64,
}

impl ZipArchiver {
    pub fn new(level: i64) -> Self {
        Self { level }
    }
}

impl Archiver for ZipArchiver {
    fn archive(&self, entry_name: &str, contents: &[u8]) -> Result<Vec<u8>, ExportError> {
        let archive_err = |e: &dyn fmt::Display| ExportError::Archive(e.to_string());

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(self.level));

        writer
            .start_file(entry_name, options)
            .map_err(|e| archive_err(&e))?;
        writer.write_all(contents).map_err(|e| archive_err(&e))?;
        let cursor = writer.finish().map_err(|e| archive_err(&e))?;
        Ok(cursor.into_inner())
    }
}

/// Stand-in used when no compression support is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoArchiver;

impl Archiver for NoArchiver {
    fn is_available(&self) -> bool {
        false
    }

    fn archive(&self, _entry_name: &str, _contents: &[u8]) -> Result<Vec<u8>, ExportError> {
        Err(ExportError::ArchiverUnavailable)
    }
}

/// CSV text built as a list of chunks so the size ceiling can be enforced
/// before anything is concatenated.
#[derive(Debug)]
pub struct CsvTable {
    chunks: Vec<String>,
    rows: usize,
    bytes: usize,
}

impl CsvTable {
    /// Serializes every non-air block. Fails as soon as the text grows past
    /// `max_bytes`.
    pub fn from_blocks(blocks: &[Block], max_bytes: usize) -> Result<Self, ExportError> {
        let mut table = Self {
            chunks: vec![CSV_HEADER.to_string()],
            rows: 0,
            bytes: CSV_HEADER.len(),
        };

        for batch in blocks.chunks(ROWS_PER_CHUNK) {
            let mut chunk = String::new();
            for block in batch.iter().filter(|b| !b.is_air()) {
                write_row(&mut chunk, block);
                table.rows += 1;
            }

            table.bytes += chunk.len();
            if table.bytes > max_bytes {
                return Err(ExportError::TooLarge {
                    bytes: table.bytes,
                    max: max_bytes,
                });
            }
            table.chunks.push(chunk);
        }

        Ok(table)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn into_string(self) -> String {
        self.chunks.concat()
    }
}

fn write_row(out: &mut String, block: &Block) {
    use std::fmt::Write as _;

    let Some(material) = &block.material else {
        return;
    };
    let [x, y, z] = block.position;
    let idx = block.index;
    let _ = write!(
        out,
        "{},{},{},{},{},{},{},{},",
        x,
        y,
        z,
        idx.i,
        idx.j,
        idx.k,
        csv_field(&material.rock),
        material.density
    );
    if let Some(zone) = &material.zone {
        out.push_str(&csv_field(zone));
    }
    for value in [material.cu_grade, material.au_grade, material.value] {
        out.push(',');
        if let Some(v) = value {
            let _ = write!(out, "{}", v);
        }
    }
    out.push('\n');
}

fn csv_field(text: &str) -> String {
    if text.contains([',', '"', '\n']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportReport {
    Compressed {
        block_count: usize,
        original_size_mb: f64,
        compressed_size_mb: f64,
        reduction_percent: f64,
    },
    Plain {
        block_count: usize,
    },
}

impl fmt::Display for ExportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportReport::Compressed {
                block_count,
                original_size_mb,
                compressed_size_mb,
                reduction_percent,
            } => write!(
                f,
                "{} blocks, {:.2} MB -> {:.2} MB ({:.1}% smaller)",
                block_count, original_size_mb, compressed_size_mb, reduction_percent
            ),
            ExportReport::Plain { block_count } => write!(f, "{} blocks (uncompressed)", block_count),
        }
    }
}

#[derive(Debug)]
pub struct ExportArtifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub report: ExportReport,
    /// Why the archive path was abandoned, when it was.
    pub fallback_reason: Option<String>,
}

impl ExportArtifact {
    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(&self.file_name);
        fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

pub struct ExportPipeline {
    config: ExportConfig,
    archiver: Box<dyn Archiver>,
    clock: Arc<dyn Clock>,
}

impl ExportPipeline {
    pub fn new(config: ExportConfig, archiver: Box<dyn Archiver>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            archiver,
            clock,
        }
    }

    pub fn with_zip(config: ExportConfig, clock: Arc<dyn Clock>) -> Self {
        let archiver = ZipArchiver::new(config.compression_level);
        Self::new(config, Box::new(archiver), clock)
    }

    /// Builds a `.zip` artifact, or a plain `.csv` one if archiving is
    /// unavailable or fails. Empty and oversized models are refused.
    pub fn export(&self, blocks: &[Block]) -> Result<ExportArtifact, ExportError> {
        if blocks.is_empty() {
            return Err(ExportError::Empty);
        }

        let table = CsvTable::from_blocks(blocks, self.config.max_text_bytes)?;
        log::info!("Serialized {} rows ({} bytes)", table.rows(), table.len());
        let text = table.into_string();

        let base_name = format!("block_model_{}", self.clock.now_ms());
        let csv_name = format!("{}.csv", base_name);
        let block_count = blocks.len();

        let archived = if self.archiver.is_available() {
            self.archiver.archive(&csv_name, text.as_bytes())
        } else {
            Err(ExportError::ArchiverUnavailable)
        };

        match archived {
            Ok(bytes) => {
                let original = text.len() as f64;
                let compressed = bytes.len() as f64;
                let report = ExportReport::Compressed {
                    block_count,
                    original_size_mb: original / BYTES_PER_MB,
                    compressed_size_mb: compressed / BYTES_PER_MB,
                    reduction_percent: (1.0 - compressed / original) * 100.0,
                };
                log::info!("Export archived: {}", report);
                Ok(ExportArtifact {
                    file_name: format!("{}.zip", base_name),
                    bytes,
                    report,
                    fallback_reason: None,
                })
            }
            Err(e) => {
                log::warn!("Archive export failed ({}), falling back to CSV", e);
                Ok(ExportArtifact {
                    file_name: csv_name,
                    bytes: text.into_bytes(),
                    report: ExportReport::Plain { block_count },
                    fallback_reason: Some(e.to_string()),
                })
            }
        }
    }
}
