//! `radar replay`: scripted store mutations through the real pipeline.
//!
//! Script format is JSON lines, one step per line. Blank lines and lines
//! starting with `#` are skipped.
//!
//! ```text
//! {"op":"clock","set_ms":1700000000000}
//! {"op":"insert","direction":"outbound","date":1699999999900,"body":"hi"}
//! {"op":"insert","direction":"inbound","date":"abc"}
//! {"op":"touch","id":1}
//! {"op":"signal","self_change":true}
//! {"op":"clock","advance_ms":6000}
//! ```

use std::fs;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use radar_config::RadarConfig;
use radar_cursor::{Cursor, MemoryCursorBacking};
use radar_dedup::ManualTimeSource;
use radar_ingest::{Row, COL_ADDRESS, COL_BODY, COL_DATE, COL_ID, COL_PROTOCOL, COL_TYPE};
use radar_runtime::{ListenerStats, MemoryStore, Origin, Radar, RecordSubscriber};
use radar_schemas::{ChangeSignal, Direction, Partition, Record, RecordId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// `date` as written in the script: a number, or any raw string (to
/// exercise malformed rows).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DateField {
    Ms(i64),
    Raw(String),
}

impl DateField {
    fn to_column(&self) -> String {
        match self {
            DateField::Ms(ms) => ms.to_string(),
            DateField::Raw(raw) => raw.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    /// New row in the partition for `direction`.
    Insert {
        direction: Direction,
        date: DateField,
        #[serde(default)]
        id: Option<i64>,
        #[serde(default)]
        address: Option<String>,
        #[serde(default)]
        body: Option<String>,
        /// Override the `type` column (defaults to the direction's code).
        #[serde(default, rename = "type")]
        type_code: Option<String>,
        /// Mutation caused by the watcher's own process.
        #[serde(default)]
        local: bool,
    },
    /// Re-mutate an existing row without changing it.
    Touch {
        id: i64,
        #[serde(default)]
        local: bool,
    },
    /// Bare change signal, no mutation.
    Signal {
        #[serde(default)]
        self_change: bool,
    },
    Clock {
        #[serde(default)]
        set_ms: Option<i64>,
        #[serde(default)]
        advance_ms: Option<i64>,
    },
}

pub fn parse_script(text: &str, source: &str) -> Result<Vec<Step>> {
    let mut steps = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let step: Step = serde_json::from_str(line)
            .with_context(|| format!("{source}:{}: invalid replay step", idx + 1))?;
        if let Step::Clock { set_ms, advance_ms } = &step {
            if set_ms.is_some() == advance_ms.is_some() {
                bail!(
                    "{source}:{}: clock step needs exactly one of set_ms / advance_ms",
                    idx + 1
                );
            }
        }
        steps.push(step);
    }
    Ok(steps)
}

pub fn load_script(path: &str) -> Result<Vec<Step>> {
    let text = fs::read_to_string(path).with_context(|| format!("read fixture: {path}"))?;
    parse_script(&text, path)
}

#[derive(Serialize)]
struct DispatchLine<'a> {
    callback: &'static str,
    #[serde(flatten)]
    record: &'a Record,
}

/// Renders every dispatch as one JSON line.
#[derive(Default)]
struct JsonLinesSubscriber {
    lines: Mutex<Vec<String>>,
}

impl JsonLinesSubscriber {
    fn push(&self, callback: &'static str, record: &Record) {
        match serde_json::to_string(&DispatchLine { callback, record }) {
            Ok(line) => {
                if let Ok(mut lines) = self.lines.lock() {
                    lines.push(line);
                }
            }
            Err(e) => warn!(id = %record.id, error = %e, "replay/encode_failed"),
        }
    }

    fn take(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|mut l| std::mem::take(&mut *l))
            .unwrap_or_default()
    }
}

impl RecordSubscriber for JsonLinesSubscriber {
    fn on_record_sent(&self, record: &Record) {
        self.push("sent", record);
    }

    fn on_record_received(&self, record: &Record) {
        self.push("received", record);
    }
}

pub struct ReplayReport {
    pub lines: Vec<String>,
    pub stats: ListenerStats,
    pub cursor: Cursor,
    pub halted: bool,
}

fn origin(local: bool) -> Origin {
    if local {
        Origin::Local
    } else {
        Origin::External
    }
}

fn build_row(
    direction: Direction,
    date: &DateField,
    id: Option<i64>,
    address: Option<&str>,
    body: Option<&str>,
    type_code: Option<&str>,
) -> Row {
    let mut row = Row::new();
    row.insert(COL_DATE.into(), date.to_column());
    row.insert(
        COL_TYPE.into(),
        type_code
            .map(str::to_string)
            .unwrap_or_else(|| direction.code().to_string()),
    );
    if let Some(a) = address {
        row.insert(COL_ADDRESS.into(), a.to_string());
    }
    if let Some(b) = body {
        row.insert(COL_BODY.into(), b.to_string());
    }
    if let Some(id) = id {
        row.insert(COL_ID.into(), id.to_string());
    }
    // Inbound rows carry a relay protocol; outbound rows leave it NULL.
    if direction == Direction::Inbound {
        row.insert(COL_PROTOCOL.into(), "0".into());
    }
    row
}

/// Run `steps` against a fresh in-memory store and cursor.
pub fn run(steps: &[Step], cfg: &RadarConfig, start_ms: i64) -> Result<ReplayReport> {
    let store = Arc::new(MemoryStore::new());
    let clock = ManualTimeSource::at(start_ms);
    let subscriber = Arc::new(JsonLinesSubscriber::default());

    let handle = Radar::start(
        store.clone(),
        Arc::new(MemoryCursorBacking::new()),
        Arc::new(clock.clone()),
        subscriber.clone(),
        cfg,
    )?;

    for (n, step) in steps.iter().enumerate() {
        debug!(step = n + 1, ?step, "replay/step");
        match step {
            Step::Insert {
                direction,
                date,
                id,
                address,
                body,
                type_code,
                local,
            } => {
                let row = build_row(
                    *direction,
                    date,
                    *id,
                    address.as_deref(),
                    body.as_deref(),
                    type_code.as_deref(),
                );
                store
                    .insert(Partition::for_direction(*direction), row, origin(*local))
                    .with_context(|| format!("step {}: insert", n + 1))?;
            }
            Step::Touch { id, local } => {
                store
                    .touch(RecordId(*id), origin(*local))
                    .with_context(|| format!("step {}: touch", n + 1))?;
            }
            Step::Signal { self_change } => {
                store.notify(ChangeSignal {
                    self_change: *self_change,
                });
            }
            Step::Clock { set_ms, advance_ms } => {
                if let Some(ms) = set_ms {
                    clock.set(*ms);
                }
                if let Some(ms) = advance_ms {
                    clock.advance(*ms);
                }
            }
        }
    }

    let report = ReplayReport {
        lines: subscriber.take(),
        stats: handle.stats(),
        cursor: handle.cursor()?,
        halted: handle.is_halted(),
    };
    handle.stop()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"
# first run: clock at T
{"op":"clock","set_ms":1700000000000}
{"op":"insert","direction":"inbound","date":1699999000000,"body":"old"}
{"op":"insert","direction":"outbound","date":1699999999900,"address":"+1555","body":"hi"}
{"op":"touch","id":2}
{"op":"signal","self_change":true}
{"op":"insert","direction":"outbound","date":"abc"}
{"op":"clock","advance_ms":60000}
{"op":"insert","direction":"inbound","date":1699999880000,"body":"late"}
"#;

    #[test]
    fn parses_all_step_kinds() {
        let steps = parse_script(SCRIPT, "inline").unwrap();
        assert_eq!(steps.len(), 8);
        assert_eq!(
            steps[5],
            Step::Insert {
                direction: Direction::Outbound,
                date: DateField::Raw("abc".into()),
                id: None,
                address: None,
                body: None,
                type_code: None,
                local: false,
            }
        );
    }

    #[test]
    fn rejects_bad_lines_with_location() {
        let err = parse_script("{\"op\":\"explode\"}", "f.jsonl").unwrap_err();
        assert!(format!("{err:#}").contains("f.jsonl:1"));

        let err = parse_script("{\"op\":\"clock\"}", "f.jsonl").unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn replay_dispatches_each_new_record_once() {
        let steps = parse_script(SCRIPT, "inline").unwrap();
        let report = run(&steps, &RadarConfig::default(), 0).unwrap();

        // 1: stale backlog; 2: admitted; touch/signal: already seen;
        // 3: malformed; 4: old timestamp but id above cursor.
        assert_eq!(report.lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(&report.lines[0]).unwrap();
        assert_eq!(first["callback"], "sent");
        assert_eq!(first["id"], 2);
        assert_eq!(first["origin_address"], "+1555");
        let second: serde_json::Value = serde_json::from_str(&report.lines[1]).unwrap();
        assert_eq!(second["callback"], "received");
        assert_eq!(second["id"], 4);

        assert_eq!(report.stats.stale, 1);
        assert_eq!(report.stats.already_seen, 2);
        assert_eq!(report.stats.malformed, 1);
        assert_eq!(report.cursor, Cursor::At(RecordId(4)));
        assert!(!report.halted);
    }
}
