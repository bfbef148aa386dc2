use crate::domain::event::{EventRecord, SourceSystem};
use crate::error::{ReconError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Columns every source file must provide.
pub const REQUIRED_COLUMNS: [&str; 4] = ["txn_ref_id", "value_date", "amount", "currency"];

/// Reads events for one source system from a CSV source.
///
/// Headers are normalised (trimmed, lower-cased, spaces to underscores) and
/// checked for the required columns before any row is read. Every row is
/// tagged with the source system given to the reader; a `source_system`
/// column in the file is ignored.
pub struct EventReader<R: Read> {
    reader: csv::Reader<R>,
    source: SourceSystem,
}

impl EventReader<File> {
    pub fn from_path(path: &Path, source: SourceSystem) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(file, source, &path.display().to_string())
    }
}

impl<R: Read> EventReader<R> {
    /// Fails with `SchemaError` when a required column is absent.
    pub fn new(input: R, source: SourceSystem, source_name: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(input);

        let headers: csv::StringRecord = reader
            .headers()?
            .iter()
            .map(normalise_header)
            .map(|h| if h == "source_system" { "_source_system".to_string() } else { h })
            .collect();

        if let Some(column) = REQUIRED_COLUMNS
            .iter()
            .find(|column| !headers.iter().any(|h| h == **column))
        {
            return Err(ReconError::SchemaError {
                source_name: source_name.to_string(),
                column: column.to_string(),
            });
        }
        reader.set_headers(headers);

        Ok(Self { reader, source })
    }

    /// Lazily deserializes the rows. Missing optional values come through as
    /// `None` and are validated later, at the engine boundary.
    pub fn events(self) -> impl Iterator<Item = Result<EventRecord>> {
        let source = self.source;
        self.reader.into_deserialize().map(move |row| {
            row.map(|mut record: EventRecord| {
                record.source_system = Some(source);
                record
            })
            .map_err(ReconError::from)
        })
    }
}

fn normalise_header(header: &str) -> String {
    header.trim().to_lowercase().replace(' ', "_")
}

/// Replay order for streaming runs: all of A then all of B, stable-sorted by
/// value date. Records without a date sort first.
pub fn stream_order(a: Vec<EventRecord>, b: Vec<EventRecord>) -> Vec<EventRecord> {
    let mut events = a;
    events.extend(b);
    events.sort_by_key(|record| record.value_date);
    events
}
