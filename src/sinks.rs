//! Destinations for classified records: append-only files and list caches.

use crate::config::{CacheConfig, CacheKind, PipelineConfig, SinkConfig};
use crate::error::{Error, Result};
use crate::processor::ScoreRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Anything that durably records classified samples.
pub trait RecordSink {
    fn name(&self) -> &str;

    fn write(&mut self, records: &[ScoreRecord]) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Which column of a record a file sink writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileColumn {
    /// One score per line
    Score,
    /// One 0/1 flag per line
    Flag,
}

/// Appends one value per line, matching the evaluator's input format.
pub struct FileSink {
    name: String,
    path: PathBuf,
    column: FileColumn,
    writer: BufWriter<File>,
}

impl FileSink {
    pub fn open(path: impl AsRef<Path>, column: FileColumn) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let name = match column {
            FileColumn::Score => format!("scores:{}", path.display()),
            FileColumn::Flag => format!("alerts:{}", path.display()),
        };
        Ok(FileSink {
            name,
            path,
            column,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, records: &[ScoreRecord]) -> Result<()> {
        for record in records {
            match self.column {
                FileColumn::Score => writeln!(self.writer, "{}", record.score)?,
                FileColumn::Flag => writeln!(self.writer, "{}", record.flag)?,
            }
        }
        // Synchronous per message: nothing stays buffered between messages
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Key-ordered store of append-only string lists.
pub trait ListCache {
    fn rpush(&mut self, key: &str, value: String) -> Result<()>;
}

/// In-process list cache; clones share the same lists.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    lists: Arc<Mutex<BTreeMap<String, Vec<String>>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the list stored under `key`
    pub fn list(&self, key: &str) -> Vec<String> {
        self.lists
            .lock()
            .map(|lists| lists.get(key).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

impl ListCache for MemoryCache {
    fn rpush(&mut self, key: &str, value: String) -> Result<()> {
        let mut lists = self
            .lists
            .lock()
            .map_err(|_| Error::Sink("memory cache lock poisoned".into()))?;
        lists.entry(key.to_string()).or_default().push(value);
        Ok(())
    }
}

/// Redis-backed list cache
#[cfg(feature = "redis-sink")]
pub struct RedisCache {
    conn: redis::Connection,
}

#[cfg(feature = "redis-sink")]
impl RedisCache {
    pub fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::Configuration(format!("invalid redis url {:?}: {}", url, e)))?;
        let conn = client
            .get_connection()
            .map_err(|e| Error::Sink(format!("redis connection failed: {}", e)))?;
        Ok(RedisCache { conn })
    }
}

#[cfg(feature = "redis-sink")]
impl ListCache for RedisCache {
    fn rpush(&mut self, key: &str, value: String) -> Result<()> {
        use redis::Commands;
        self.conn
            .rpush::<_, _, ()>(key, value)
            .map_err(|e| Error::Sink(format!("redis RPUSH {} failed: {}", key, e)))
    }
}

#[derive(Serialize)]
struct CacheEntry {
    value: f64,
    score: f64,
}

/// Pushes `{value, score}` for every record, and again to the alert list when flagged.
pub struct CacheSink<C: ListCache> {
    cache: C,
    scores_key: String,
    alerts_key: String,
}

impl<C: ListCache> CacheSink<C> {
    pub fn new(cache: C, scores_key: impl Into<String>, alerts_key: impl Into<String>) -> Self {
        CacheSink {
            cache,
            scores_key: scores_key.into(),
            alerts_key: alerts_key.into(),
        }
    }
}

impl<C: ListCache> RecordSink for CacheSink<C> {
    fn name(&self) -> &str {
        &self.scores_key
    }

    fn write(&mut self, records: &[ScoreRecord]) -> Result<()> {
        for record in records {
            let entry = serde_json::to_string(&CacheEntry {
                value: record.value,
                score: record.score,
            })?;
            self.cache.rpush(&self.scores_key, entry.clone())?;
            if record.is_anomaly() {
                self.cache.rpush(&self.alerts_key, entry)?;
            }
        }
        Ok(())
    }
}

fn file_sink(config: &SinkConfig, column: FileColumn) -> Result<Option<Box<dyn RecordSink>>> {
    match config {
        SinkConfig::None => Ok(None),
        SinkConfig::File { path } => Ok(Some(Box::new(FileSink::open(path, column)?))),
    }
}

fn cache_sink(config: &CacheConfig) -> Result<Box<dyn RecordSink>> {
    match config.kind {
        CacheKind::Memory => Ok(Box::new(CacheSink::new(
            MemoryCache::new(),
            &config.scores_key,
            &config.alerts_key,
        ))),
        #[cfg(feature = "redis-sink")]
        CacheKind::Redis => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| Error::Configuration("cache.url is required for redis".into()))?;
            Ok(Box::new(CacheSink::new(
                RedisCache::connect(url)?,
                &config.scores_key,
                &config.alerts_key,
            )))
        }
        #[cfg(not(feature = "redis-sink"))]
        CacheKind::Redis => Err(Error::Configuration(
            "redis cache requested but the redis-sink feature is not enabled".into(),
        )),
    }
}

/// Open every sink the configuration names, in score / alert / cache order.
pub fn build(config: &PipelineConfig) -> Result<Vec<Box<dyn RecordSink>>> {
    let mut sinks = Vec::new();
    sinks.extend(file_sink(&config.output, FileColumn::Score)?);
    sinks.extend(file_sink(&config.alerts, FileColumn::Flag)?);
    if let Some(cache) = &config.cache {
        sinks.push(cache_sink(cache)?);
    }
    Ok(sinks)
}
