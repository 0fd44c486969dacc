//! Remote state machines observed by the engine.
//!
//! None of these are driven locally: the batch service and YARN own them and the
//! engine only samples them by polling.

use serde::{Deserialize, Serialize};

/// State of a batch job as reported by the batch service.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    NotStarted,
    Starting,
    Running,
    Busy,
    Idle,
    Recovering,
    ShuttingDown,
    Error,
    Dead,
    Success,
}

impl JobState {
    /// Whether no further transition can happen from this state.
    pub fn is_done(self) -> bool {
        matches!(
            self,
            Self::ShuttingDown | Self::Error | Self::Dead | Self::Success
        )
    }

    pub fn is_running(self) -> bool {
        self == Self::Running
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// YARN log aggregation status of an application.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogAggregationStatus {
    Disabled,
    NotStart,
    Running,
    RunningWithFailure,
    Succeeded,
    Failed,
    TimeOut,
}

impl LogAggregationStatus {
    pub fn is_done(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimeOut)
    }
}

/// Strategy used to rewrite a cluster-internal container log URL into one the
/// client can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverLogConversionMode {
    /// `{gateway}/yarnui/{host}{path}`
    WithoutPort,
    /// `{gateway}/yarnui/{host}/port/{port}{path}`
    WithPort,
    /// The internal URL, untouched.
    Original,
}

impl DriverLogConversionMode {
    /// Successor in probing order. `None` stands for "no mode yet" on input and
    /// "exhausted" on output.
    pub fn next(current: Option<Self>) -> Option<Self> {
        match current {
            None => Some(Self::WithoutPort),
            Some(Self::WithoutPort) => Some(Self::WithPort),
            Some(Self::WithPort) => Some(Self::Original),
            Some(Self::Original) => None,
        }
    }
}
