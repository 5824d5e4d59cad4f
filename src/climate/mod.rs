// Climate queries over the loaded observation dataset
// Each question the API answers is one or two SELECTs against the shared,
// read-only database; this module owns the SQL and the row-to-record mapping.

pub mod dates;
pub mod models;

pub use dates::{DateParseError, ObservationDate, TRAILING_WINDOW_DAYS};
pub use models::{DateBounds, PrecipitationRecord, TemperatureObservation, TemperatureStats};

use crate::query::{Query, QueryExecutor, QueryParser};
use crate::storage::{Row, Value};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::debug;

/// Read-only access to the measurement and station tables.
///
/// Cheap to clone; every clone shares the same loaded database.
#[derive(Clone)]
pub struct ClimateStore {
    db: Arc<QueryExecutor>,
}

impl ClimateStore {
    pub fn new(db: QueryExecutor) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn from_shared(db: Arc<QueryExecutor>) -> Self {
        Self { db }
    }

    /// Earliest and latest measurement dates; `None` for an empty table
    pub fn date_bounds(&self) -> Result<Option<DateBounds>> {
        let row = self.select_one("SELECT MIN(date), MAX(date) FROM measurement")?;
        match (&row.values[0], &row.values[1]) {
            (Value::Text(first), Value::Text(last)) => Ok(Some(DateBounds {
                first: first.clone(),
                last: last.clone(),
            })),
            (Value::Null, Value::Null) => Ok(None),
            (first, last) => Err(anyhow!(
                "measurement.date holds non-text values ({}, {})",
                first,
                last
            )),
        }
    }

    /// First day of the trailing year: 365 days before the latest measurement
    pub fn trailing_year_cutoff(&self) -> Result<Option<ObservationDate>> {
        let last = match self.date_bounds()? {
            Some(bounds) => bounds.last,
            None => return Ok(None),
        };

        let last: ObservationDate = last
            .parse()
            .map_err(|e| anyhow!("Latest measurement date is malformed: {}", e))?;
        let cutoff = last
            .trailing_window_start()
            .ok_or_else(|| anyhow!("No trailing window before {}", last))?;

        debug!(%last, %cutoff, "Trailing year window");
        Ok(Some(cutoff))
    }

    /// Station with the most measurement rows; ties go to the smallest station id
    pub fn most_active_station(&self) -> Result<Option<String>> {
        let rows = self.select(
            "SELECT station, COUNT(station) FROM measurement \
             GROUP BY station ORDER BY COUNT(station) DESC, station ASC LIMIT 1",
        )?;

        let station = match rows.first().map(|row| &row.values[0]) {
            Some(Value::Text(station)) => Some(station.clone()),
            Some(Value::Null) | None => None,
            Some(other) => return Err(anyhow!("measurement.station holds non-text value {}", other)),
        };

        debug!(station = ?station, "Most active station");
        Ok(station)
    }

    /// Precipitation for every measurement in the trailing year, oldest first
    pub fn precipitation(&self) -> Result<Vec<PrecipitationRecord>> {
        let cutoff = match self.trailing_year_cutoff()? {
            Some(cutoff) => cutoff,
            None => return Ok(Vec::new()),
        };

        let rows = self.select(&format!(
            "SELECT date, prcp FROM measurement WHERE date >= {} ORDER BY date",
            sql_text(&cutoff.to_string())
        ))?;

        rows.into_iter()
            .map(|row| {
                Ok(PrecipitationRecord {
                    date: text(&row.values[0], "measurement.date")?,
                    prcp: number(&row.values[1], "measurement.prcp")?,
                })
            })
            .collect()
    }

    /// Every station id, one per station row, in storage order
    pub fn stations(&self) -> Result<Vec<Option<String>>> {
        self.select("SELECT station FROM station")?
            .into_iter()
            .map(|row| match &row.values[0] {
                Value::Null => Ok(None),
                value => text(value, "station.station").map(Some),
            })
            .collect()
    }

    /// Observed temperatures at the most-active station over the trailing year
    pub fn temperature_observations(&self) -> Result<Vec<TemperatureObservation>> {
        let (station, cutoff) = match (self.most_active_station()?, self.trailing_year_cutoff()?) {
            (Some(station), Some(cutoff)) => (station, cutoff),
            _ => return Ok(Vec::new()),
        };

        let rows = self.select(&format!(
            "SELECT date, tobs FROM measurement WHERE station = {} AND date >= {} ORDER BY date",
            sql_text(&station),
            sql_text(&cutoff.to_string())
        ))?;

        rows.into_iter()
            .map(|row| {
                Ok(TemperatureObservation {
                    date: text(&row.values[0], "measurement.date")?,
                    tobs: number(&row.values[1], "measurement.tobs")?,
                })
            })
            .collect()
    }

    /// TMIN / TAVG / TMAX over `start..=end`, or from `start` onwards.
    /// An empty or inverted range gives all-null stats.
    pub fn temperature_stats(
        &self,
        start: ObservationDate,
        end: Option<ObservationDate>,
    ) -> Result<TemperatureStats> {
        let mut sql = format!(
            "SELECT MIN(tobs), AVG(tobs), MAX(tobs) FROM measurement WHERE date >= {}",
            sql_text(&start.to_string())
        );
        if let Some(end) = end {
            sql.push_str(&format!(" AND date <= {}", sql_text(&end.to_string())));
        }

        let row = self.select_one(&sql)?;
        Ok(TemperatureStats {
            min: number(&row.values[0], "MIN(tobs)")?,
            avg: number(&row.values[1], "AVG(tobs)")?,
            max: number(&row.values[2], "MAX(tobs)")?,
        })
    }

    fn select(&self, sql: &str) -> Result<Vec<Row>> {
        match QueryParser::parse(sql)? {
            Query::Select(query) => Ok(self.db.select(&query)?.into_rows()),
            _ => Err(anyhow!("Only SELECT statements may run against the climate store")),
        }
    }

    /// For aggregate queries without GROUP BY, which always yield one row
    fn select_one(&self, sql: &str) -> Result<Row> {
        self.select(sql)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Aggregate query returned no row: {}", sql))
    }
}

/// Quote a string as a SQL literal
fn sql_text(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn text(value: &Value, column: &str) -> Result<String> {
    value
        .as_text()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Expected text in {}, found {}", column, value))
}

fn number(value: &Value, column: &str) -> Result<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        other => other
            .as_f64()
            .map(Some)
            .ok_or_else(|| anyhow!("Expected a number in {}, found {}", column, other)),
    }
}
