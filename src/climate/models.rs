// Records returned by the climate API, shaped exactly as they serialize

use serde::{Deserialize, Serialize};

/// One day's precipitation reading at some station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecipitationRecord {
    pub date: String,
    pub prcp: Option<f64>,
}

/// One observed temperature at the most-active station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureObservation {
    pub date: String,
    pub tobs: Option<f64>,
}

/// Min / mean / max observed temperature over a date range.
/// All three are null when the range holds no observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureStats {
    #[serde(rename = "TMIN")]
    pub min: Option<f64>,
    #[serde(rename = "TAVG")]
    pub avg: Option<f64>,
    #[serde(rename = "TMAX")]
    pub max: Option<f64>,
}

/// First and last measurement dates, as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateBounds {
    pub first: String,
    pub last: String,
}
