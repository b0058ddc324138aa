use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp format used by the signal generator on the wire
/// (e.g. "01/02/2024 09:30:00")
pub const SIGNAL_TIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// Trade direction of a signal
///
/// Case-insensitive on the wire ("LONG", "long", "Long" all parse);
/// anything else is an unrecognized-direction error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("long") {
            Ok(Direction::Long)
        } else if s.eq_ignore_ascii_case("short") {
            Ok(Direction::Short)
        } else {
            Err(s.to_string())
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Signal file schema variant
///
/// Exactly one is active per deployment. The parser rejects lines whose
/// field count does not match the active schema instead of guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    /// `DateTime,Direction,Entry_Price` - exits come from configured point distances
    Basic,
    /// `DateTime,Signal,Direction,Entry_Price,Stop_Loss,Profit_Target,Zone_Type,ATR`
    SingleTarget,
    /// Adds a second profit target with independent share quantities
    DualTarget,
}

impl SchemaKind {
    pub fn field_count(&self) -> usize {
        match self {
            SchemaKind::Basic => 3,
            SchemaKind::SingleTarget => 8,
            SchemaKind::DualTarget => 11,
        }
    }

    /// Header row the signal file is truncated back to after consumption
    pub fn header(&self) -> &'static str {
        match self {
            SchemaKind::Basic => "DateTime,Direction,Entry_Price",
            SchemaKind::SingleTarget => {
                "DateTime,Signal,Direction,Entry_Price,Stop_Loss,Profit_Target,Zone_Type,ATR"
            }
            SchemaKind::DualTarget => {
                "DateTime,Signal,Direction,Entry_Price,Stop_Loss,Profit_Target1,Profit_Target2,Quantity1,Quantity2,Zone_Type,ATR"
            }
        }
    }
}

impl FromStr for SchemaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(SchemaKind::Basic),
            "single_target" | "single-target" => Ok(SchemaKind::SingleTarget),
            "dual_target" | "dual-target" => Ok(SchemaKind::DualTarget),
            other => Err(other.to_string()),
        }
    }
}

/// Intended exit geometry carried by a signal
///
/// Prices are signal-relative; the controller re-anchors them onto the
/// actual fill price once the entry fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExitPlan {
    /// Basic schema: stop and target come from the configured point distances
    FixedBracket,
    SingleTarget {
        stop_loss: f64,
        profit_target: f64,
    },
    DualTarget {
        stop_loss: f64,
        profit_target_1: f64,
        profit_target_2: f64,
        quantity_1: u32,
        quantity_2: u32,
    },
}

/// One trading decision emitted by the external generator, consumed at most once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Creation time as reported by the generator, not ingestion time
    pub timestamp: NaiveDateTime,
    pub direction: Direction,
    /// Reference price at signal time; not necessarily the execution price
    pub entry_price: f64,
    pub plan: ExitPlan,
    pub signal_type: Option<String>,
    pub zone_type: Option<String>,
    pub atr: Option<f64>,
}

impl Signal {
    /// Deduplication key, derived from `(timestamp, direction)`
    ///
    /// Two signals at the same timestamp and direction but different prices
    /// collide by default; `include_price` widens the identity for deployments
    /// that need to tell them apart.
    pub fn id(&self, include_price: bool) -> String {
        let base = format!(
            "{}_{}",
            self.timestamp.format(SIGNAL_TIME_FORMAT),
            self.direction
        );
        if include_price {
            format!("{}_{:.2}", base, self.entry_price)
        } else {
            base
        }
    }
}

/// One append-only record per successfully filled entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLogEntry {
    /// Wall-clock time the entry fill was observed
    pub entry_time: DateTime<Utc>,
    pub signal: Signal,
    pub actual_entry_price: f64,
}
