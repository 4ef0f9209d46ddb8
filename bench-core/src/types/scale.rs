//! Scale order and run-wide scale mode.

use serde::{Deserialize, Serialize};

/// Direction of the five-point Likert scale presented to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleOrder {
    /// 1 = "gar nicht {adj}" ... 5 = "sehr {adj}".
    In,
    /// 1 = "sehr {adj}" ... 5 = "gar nicht {adj}".
    Rev,
}

impl ScaleOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            ScaleOrder::In => "in",
            ScaleOrder::Rev => "rev",
        }
    }

    pub fn opposite(self) -> ScaleOrder {
        match self {
            ScaleOrder::In => ScaleOrder::Rev,
            ScaleOrder::Rev => ScaleOrder::In,
        }
    }
}

impl std::str::FromStr for ScaleOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(ScaleOrder::In),
            "rev" => Ok(ScaleOrder::Rev),
            other => Err(format!("unknown scale order: {other}")),
        }
    }
}

/// Configured scale mode for a benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMode {
    #[default]
    In,
    Rev,
    Dual,
}
