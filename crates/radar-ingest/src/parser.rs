use std::fmt;

use radar_schemas::{Direction, Record, RecordId, Timestamp};
use tracing::warn;

use crate::store::{RowSetGuard, COL_ADDRESS, COL_BODY, COL_DATE, COL_ID, COL_TYPE};

/// Why a row did not become a [`Record`].
///
/// `NoData` is "nothing to report". Every other variant is a malformed row:
/// logged and dropped, never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejected {
    NoData,
    MalformedTimestamp(String),
    UnknownDirection(String),
    MalformedIdentifier(String),
}

impl Rejected {
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Rejected::NoData)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rejected::NoData => "no_data",
            Rejected::MalformedTimestamp(_) => "malformed_timestamp",
            Rejected::UnknownDirection(_) => "unknown_direction",
            Rejected::MalformedIdentifier(_) => "malformed_identifier",
        }
    }
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejected::NoData => f.write_str("no data"),
            Rejected::MalformedTimestamp(raw) => write!(f, "malformed timestamp: {raw:?}"),
            Rejected::UnknownDirection(raw) => write!(f, "unknown direction code: {raw:?}"),
            Rejected::MalformedIdentifier(raw) => write!(f, "malformed identifier: {raw:?}"),
        }
    }
}

impl std::error::Error for Rejected {}

/// Converts the newest row of a partition snapshot into a [`Record`].
///
/// Stateless. The caller keeps ownership of the row set and its release.
#[derive(Copy, Clone, Debug, Default)]
pub struct RecordParser;

impl RecordParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse the first row of `rows`.
    ///
    /// `expected` is the direction implied by the partition that was queried.
    /// The row's own `type` code is only cross-checked against it.
    pub fn parse(
        &self,
        rows: Option<&mut RowSetGuard>,
        expected: Direction,
    ) -> Result<Record, Rejected> {
        let rows = rows.ok_or(Rejected::NoData)?;
        if rows.count() == 0 || !rows.move_to_next() {
            return Err(Rejected::NoData);
        }

        let raw_date = rows.column(COL_DATE).unwrap_or_default();
        let timestamp = Timestamp::parse_epoch_ms(raw_date)
            .ok_or_else(|| Rejected::MalformedTimestamp(raw_date.to_string()))?;

        let raw_type = rows.column(COL_TYPE).unwrap_or_default();
        let coded = raw_type
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(Direction::from_code)
            .ok_or_else(|| Rejected::UnknownDirection(raw_type.to_string()))?;

        let raw_id = rows.column(COL_ID).unwrap_or_default();
        let id = raw_id
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|v| *v >= 0)
            .map(RecordId)
            .ok_or_else(|| Rejected::MalformedIdentifier(raw_id.to_string()))?;

        if coded != expected {
            warn!(
                %id,
                partition = expected.as_str(),
                row_type = coded.as_str(),
                "parse/direction_mismatch"
            );
        }

        Ok(Record {
            origin_address: rows.column(COL_ADDRESS).unwrap_or_default().to_string(),
            timestamp,
            body: rows.column(COL_BODY).unwrap_or_default().to_string(),
            direction: expected,
            id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BufferedRows, Row};

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn inbound(id: &str, date: &str) -> Row {
        row(&[
            ("_id", id),
            ("date", date),
            ("type", "1"),
            ("address", "+15550100"),
            ("body", "hello"),
            ("protocol", "0"),
        ])
    }

    fn parse(rows: Vec<Row>, expected: Direction) -> Result<Record, Rejected> {
        let mut guard = BufferedRows::new(rows).into_guard();
        RecordParser::new().parse(Some(&mut guard), expected)
    }

    #[test]
    fn absent_or_empty_is_no_data() {
        assert_eq!(
            RecordParser::new().parse(None, Direction::Inbound),
            Err(Rejected::NoData)
        );
        assert_eq!(parse(vec![], Direction::Inbound), Err(Rejected::NoData));
    }

    #[test]
    fn first_row_wins() {
        let r = parse(
            vec![inbound("9", "2000"), inbound("8", "1000")],
            Direction::Inbound,
        )
        .unwrap();
        assert_eq!(r.id, RecordId(9));
        assert_eq!(r.timestamp, Timestamp(2_000));
        assert_eq!(r.origin_address, "+15550100");
        assert_eq!(r.body, "hello");
        assert_eq!(r.direction, Direction::Inbound);
    }

    #[test]
    fn malformed_timestamp_is_rejected() {
        assert_eq!(
            parse(vec![inbound("1", "abc")], Direction::Inbound),
            Err(Rejected::MalformedTimestamp("abc".into()))
        );
        let mut missing = inbound("1", "0");
        missing.remove("date");
        assert_eq!(
            parse(vec![missing], Direction::Inbound),
            Err(Rejected::MalformedTimestamp(String::new()))
        );
    }

    #[test]
    fn unknown_direction_code_is_rejected() {
        let mut r = inbound("1", "0");
        r.insert("type".into(), "5".into());
        assert_eq!(
            parse(vec![r], Direction::Inbound),
            Err(Rejected::UnknownDirection("5".into()))
        );
    }

    #[test]
    fn bad_identifier_is_rejected() {
        for raw in ["x", "", "-4"] {
            assert_eq!(
                parse(vec![inbound(raw, "0")], Direction::Inbound),
                Err(Rejected::MalformedIdentifier(raw.into()))
            );
        }
    }

    #[test]
    fn partition_direction_wins_over_row_code() {
        // Row says inbound (type=1) but came from the outbound partition.
        let r = parse(vec![inbound("3", "0")], Direction::Outbound).unwrap();
        assert_eq!(r.direction, Direction::Outbound);
    }

    #[test]
    fn null_address_and_body_become_empty() {
        let r = parse(
            vec![row(&[("_id", "2"), ("date", "5"), ("type", "2")])],
            Direction::Outbound,
        )
        .unwrap();
        assert_eq!(r.origin_address, "");
        assert_eq!(r.body, "");
    }

    #[test]
    fn malformed_classification() {
        assert!(!Rejected::NoData.is_malformed());
        assert!(Rejected::UnknownDirection("9".into()).is_malformed());
        assert_eq!(Rejected::MalformedTimestamp("abc".into()).as_str(), "malformed_timestamp");
    }
}
