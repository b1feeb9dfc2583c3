//! Point-in-time telemetry of a single GPU and its six-line report form.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Telemetry of one device, captured once per run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuSnapshot {
    pub name: String,
    // MiB
    pub memory_total: u64,
    // MiB
    pub memory_used: u64,
    // degrees Celsius
    pub temperature: u32,
    // percent
    pub utilization: u32,
    // percent
    pub fan_speed: u32,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("report is missing the `{0}` line")]
    MissingField(&'static str),
    #[error("invalid value `{value}` for `{field}`")]
    InvalidNumber { field: &'static str, value: String },
    #[error("report has more than six lines")]
    TrailingData,
}

/// Renders the report: one value per line, no labels, no trailing newline.
impl fmt::Display for GpuSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{}\n{}\n{}\n{}\n{}",
            self.name,
            self.memory_total,
            self.memory_used,
            self.temperature,
            self.utilization,
            self.fan_speed
        )
    }
}

impl FromStr for GpuSnapshot {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_suffix('\n').unwrap_or(s);
        let mut lines = s.split('\n').map(|line| line.trim_end_matches('\r'));

        let name = lines
            .next()
            .filter(|name| !name.is_empty())
            .ok_or(ParseError::MissingField("name"))?
            .to_string();
        let memory_total = parse_field(lines.next(), "memory_total")?;
        let memory_used = parse_field(lines.next(), "memory_used")?;
        let temperature = parse_field(lines.next(), "temperature")?;
        let utilization = parse_field(lines.next(), "utilization")?;
        let fan_speed = parse_field(lines.next(), "fan_speed")?;

        if lines.next().is_some() {
            return Err(ParseError::TrailingData);
        }

        Ok(Self {
            name,
            memory_total,
            memory_used,
            temperature,
            utilization,
            fan_speed,
        })
    }
}

fn parse_field<T: FromStr>(line: Option<&str>, field: &'static str) -> Result<T, ParseError> {
    let line = line.ok_or(ParseError::MissingField(field))?;
    line.trim().parse().map_err(|_| ParseError::InvalidNumber {
        field,
        value: line.to_string(),
    })
}
