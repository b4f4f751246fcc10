//! CSV event log sink.
//!
//! Appends one row per event to `events.csv` in the configured directory.
//! Wire it to a [`Subscription`][crate::Subscription] with [`pump`] for a
//! durable offline log of everything a world did.

use std::fs::File;
use std::path::Path;

use csv::Writer;
use gw_core::Event;

use crate::{EventResult, Subscription};

/// Writes events to a single CSV file.
pub struct CsvEventLog {
    writer: Writer<File>,
    finished: bool,
}

impl CsvEventLog {
    /// Open (or create) `events.csv` in `dir` and write the header row.
    pub fn new(dir: &Path) -> EventResult<Self> {
        let mut writer = Writer::from_path(dir.join("events.csv"))?;
        writer.write_record([
            "event_id",
            "world_id",
            "sim_time",
            "seq",
            "kind",
            "agent_id",
            "description",
            "consequences",
        ])?;
        writer.flush()?;
        Ok(Self { writer, finished: false })
    }

    /// Append one event row.
    pub fn append(&mut self, event: &Event) -> EventResult<()> {
        self.writer.write_record(&[
            event.id.to_string(),
            event.world_id.to_string(),
            event.sim_time.to_rfc3339(),
            event.seq.to_string(),
            format!("{:?}", event.kind).to_lowercase(),
            event.agent_id.map(|a| a.to_string()).unwrap_or_default(),
            event.description.clone(),
            event.consequences.join("; "),
        ])?;
        Ok(())
    }

    /// Flush buffered rows to disk.
    pub fn flush(&mut self) -> EventResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and close.  Idempotent.
    pub fn finish(&mut self) -> EventResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.writer.flush()?;
        Ok(())
    }
}

/// Drain `subscription` into `log` until the bus closes, flushing per event
/// so the file stays tailable.
///
/// Spawn this as a task; it ends when the subscription's sender side is
/// gone.
pub async fn pump(mut subscription: Subscription, mut log: CsvEventLog) -> EventResult<()> {
    while let Some(event) = subscription.recv().await {
        log.append(&event)?;
        log.flush()?;
    }
    log.finish()
}
