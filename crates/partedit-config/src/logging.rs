use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Output formats accepted by the telemetry subscriber.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, for log shippers.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Error returned when a [`LogFormat`] cannot be parsed from text.
pub type LogFormatParseError = strum::ParseError;
