use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};

pub const HEADER: [&str; 3] = ["Timestamp", "Temperature (°C)", "Humidity (%)"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogStatus {
    pub path: String,
    pub initialized: bool,
    pub readings: u64,
    pub newest_timestamp: Option<DateTime<Utc>>,
}

/// Backing row store driven by the log writer thread.
///
/// Implementations only ever see calls from that one thread, so they need no
/// locking of their own. `append` must add the whole row or fail without
/// leaving a partial one behind.
pub trait RowSink: Send + 'static {
    fn ensure_initialized(&mut self) -> Result<()>;
    fn append(&mut self, reading: &Reading) -> Result<()>;
    fn read_all(&mut self) -> Result<Vec<Reading>>;
    /// Reading with the newest timestamp; the last stored wins ties.
    fn latest(&mut self) -> Result<Option<Reading>>;
    fn newest_timestamp(&self) -> Option<DateTime<Utc>>;
    fn status(&self) -> LogStatus;
}

#[derive(Debug)]
pub enum LogCommand {
    EnsureInitialized {
        respond_to: oneshot::Sender<Result<()>>,
    },
    Append {
        reading: Reading,
        respond_to: oneshot::Sender<Result<Reading>>,
    },
    Readings {
        respond_to: oneshot::Sender<Result<Vec<Reading>>>,
    },
    Latest {
        respond_to: oneshot::Sender<Result<Option<Reading>>>,
    },
    GetStatus {
        respond_to: oneshot::Sender<LogStatus>,
    },
}

#[derive(Clone)]
pub struct LogHandle {
    tx: mpsc::UnboundedSender<LogCommand>,
}

impl LogHandle {
    pub fn new(tx: mpsc::UnboundedSender<LogCommand>) -> Self {
        Self { tx }
    }

    pub async fn ensure_initialized(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(LogCommand::EnsureInitialized { respond_to: tx })?;
        rx.await.context("log thread dropped response")?
    }

    /// Appends one reading and returns it as stored.
    ///
    /// The stored timestamp is never older than the newest row already in the
    /// log.
    pub async fn append(&self, reading: Reading) -> Result<Reading> {
        let (tx, rx) = oneshot::channel();
        self.send(LogCommand::Append {
            reading,
            respond_to: tx,
        })?;
        rx.await.context("log thread dropped response")?
    }

    /// Bulk read of every stored reading in insertion order.
    pub async fn readings(&self) -> Result<Vec<Reading>> {
        let (tx, rx) = oneshot::channel();
        self.send(LogCommand::Readings { respond_to: tx })?;
        rx.await.context("log thread dropped response")?
    }

    /// Newest stored reading without rereading the log.
    pub async fn latest(&self) -> Result<Option<Reading>> {
        let (tx, rx) = oneshot::channel();
        self.send(LogCommand::Latest { respond_to: tx })?;
        rx.await.context("log thread dropped response")?
    }

    pub async fn status(&self) -> Result<LogStatus> {
        let (tx, rx) = oneshot::channel();
        self.send(LogCommand::GetStatus { respond_to: tx })?;
        Ok(rx.await.context("log thread dropped response")?)
    }

    fn send(&self, cmd: LogCommand) -> Result<()> {
        self.tx.send(cmd).map_err(|_| anyhow!("log thread stopped"))
    }
}

pub fn spawn_log_thread<S: RowSink>(sink: S) -> Result<LogHandle> {
    let (tx, mut rx) = mpsc::unbounded_channel::<LogCommand>();

    std::thread::Builder::new()
        .name("log-writer".to_string())
        .spawn(move || run_log_thread(sink, &mut rx))
        .context("failed to spawn log thread")?;

    Ok(LogHandle::new(tx))
}

fn run_log_thread<S: RowSink>(mut sink: S, rx: &mut mpsc::UnboundedReceiver<LogCommand>) {
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            LogCommand::EnsureInitialized { respond_to } => {
                let _ = respond_to.send(sink.ensure_initialized());
            }
            LogCommand::Append {
                reading,
                respond_to,
            } => {
                let _ = respond_to.send(append_monotonic(&mut sink, reading));
            }
            LogCommand::Readings { respond_to } => {
                let _ = respond_to.send(sink.read_all());
            }
            LogCommand::Latest { respond_to } => {
                let _ = respond_to.send(sink.latest());
            }
            LogCommand::GetStatus { respond_to } => {
                let _ = respond_to.send(sink.status());
            }
        }
    }
    tracing::debug!("log thread exiting; all handles dropped");
}

fn append_monotonic<S: RowSink>(sink: &mut S, mut reading: Reading) -> Result<Reading> {
    if let Some(newest) = sink.newest_timestamp() {
        if reading.timestamp < newest {
            tracing::debug!(
                requested = %reading.timestamp,
                newest = %newest,
                "clamping reading timestamp to newest stored row"
            );
            reading.timestamp = newest;
        }
    }
    sink.append(&reading)?;
    Ok(reading)
}

/// CSV file with one header row followed by one row per reading.
pub struct CsvLog {
    path: PathBuf,
    sync_each_append: bool,
    file: Option<fs::File>,
    readings: u64,
    latest: Option<Reading>,
}

impl CsvLog {
    pub fn new(path: impl Into<PathBuf>, sync_each_append: bool) -> Self {
        Self {
            path: path.into(),
            sync_each_append,
            file: None,
            readings: 0,
            latest: None,
        }
    }

    fn open(&mut self) -> Result<&mut fs::File> {
        if self.file.is_none() {
            self.ensure_initialized()?;
        }
        self.file
            .as_mut()
            .ok_or_else(|| anyhow!("reading log {} is not open", self.path.display()))
    }
}

impl RowSink for CsvLog {
    fn ensure_initialized(&mut self) -> Result<()> {
        if self.file.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;

        let kept = recover_truncate_tail(&mut file)?;
        if kept == 0 {
            file.write_all(&encode_record(&HEADER)?)
                .context("write header row")?;
            file.sync_data().ok();
            self.readings = 0;
            self.latest = None;
            tracing::info!(path = %self.path.display(), "created reading log");
        } else {
            let readings = read_rows(&self.path)?;
            self.readings = readings.len() as u64;
            self.latest = readings.iter().copied().max_by_key(|r| r.timestamp);
            tracing::info!(
                path = %self.path.display(),
                readings = self.readings,
                "opened existing reading log"
            );
        }

        self.file = Some(file);
        Ok(())
    }

    fn append(&mut self, reading: &Reading) -> Result<()> {
        let row = encode_record(&[
            reading
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            reading.temperature.to_string(),
            reading.humidity.to_string(),
        ])?;
        let sync = self.sync_each_append;
        let file = self.open()?;
        let before = file.metadata().context("stat reading log")?.len();
        let written = file.write_all(&row).and_then(|()| {
            if sync {
                file.sync_data()
            } else {
                Ok(())
            }
        });
        if let Err(err) = written {
            // Roll back whatever part of the row made it to disk.
            file.set_len(before).ok();
            return Err(err).context("append reading row");
        }
        self.readings = self.readings.saturating_add(1);
        // Appends arrive clamped, so the new row is never older than `latest`.
        self.latest = Some(*reading);
        Ok(())
    }

    fn read_all(&mut self) -> Result<Vec<Reading>> {
        self.open()?;
        read_rows(&self.path)
    }

    fn latest(&mut self) -> Result<Option<Reading>> {
        self.open()?;
        Ok(self.latest)
    }

    fn newest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.latest.map(|r| r.timestamp)
    }

    fn status(&self) -> LogStatus {
        LogStatus {
            path: self.path.display().to_string(),
            initialized: self.file.is_some(),
            readings: self.readings,
            newest_timestamp: self.newest_timestamp(),
        }
    }
}

fn encode_record<I, T>(fields: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(fields)?;
    writer
        .into_inner()
        .map_err(|err| anyhow!("encode csv row: {}", err.error()))
}

/// Drops anything after the last newline so a torn write never surfaces as a
/// row. Returns the number of bytes kept.
fn recover_truncate_tail(file: &mut fs::File) -> Result<u64> {
    let end = file.metadata()?.len();
    if end == 0 {
        return Ok(0);
    }
    file.seek(SeekFrom::Start(0))?;
    let mut contents = Vec::with_capacity(end as usize);
    file.read_to_end(&mut contents)?;

    let kept = contents
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|idx| idx as u64 + 1)
        .unwrap_or(0);
    if kept < end {
        tracing::warn!(
            dropped_bytes = end - kept,
            "truncating partial row at end of reading log"
        );
        file.set_len(kept)?;
    }
    file.seek(SeekFrom::End(0))?;
    Ok(kept)
}

fn read_rows(path: &Path) -> Result<Vec<Reading>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("read {}", path.display()))?;

    let header = reader.headers().context("read header row")?;
    if header.iter().ne(HEADER.iter().copied()) {
        tracing::warn!(header = ?header, "reading log header does not match expected columns");
    }

    let mut out = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(row = idx + 2, error = %err, "skipping unreadable row");
                continue;
            }
        };
        match decode_row(&record) {
            Some(reading) => out.push(reading),
            None => tracing::warn!(row = idx + 2, record = ?record, "skipping malformed row"),
        }
    }
    Ok(out)
}

fn decode_row(record: &csv::StringRecord) -> Option<Reading> {
    if record.len() != HEADER.len() {
        return None;
    }
    let timestamp = DateTime::parse_from_rfc3339(record.get(0)?)
        .ok()?
        .with_timezone(&Utc);
    let temperature = record.get(1)?.parse::<f64>().ok()?;
    let humidity = record.get(2)?.parse::<f64>().ok()?;
    if !temperature.is_finite() || !humidity.is_finite() {
        return None;
    }
    Some(Reading {
        timestamp,
        temperature,
        humidity,
    })
}
