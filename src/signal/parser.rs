use chrono::NaiveDateTime;
use thiserror::Error;

use crate::models::{Direction, ExitPlan, SchemaKind, Signal, SIGNAL_TIME_FORMAT};

/// Why a raw signal line was rejected
///
/// A rejected line is dropped atomically: no partial signal is ever built
/// and no controller state changes.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("expected {expected} fields for {schema:?} schema, got {got}")]
    FieldCount {
        schema: SchemaKind,
        expected: usize,
        got: usize,
    },
    #[error("field '{field}' has unparsable value {value:?}")]
    InvalidField { field: &'static str, value: String },
    #[error("unrecognized direction {0:?}")]
    UnrecognizedDirection(String),
}

/// Convert one delimited line into a typed `Signal`
///
/// The field count must exactly match the active schema's arity; the parser
/// never guesses which variant a line belongs to.
pub fn parse(line: &str, schema: SchemaKind) -> Result<Signal, ParseError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let expected = schema.field_count();
    if fields.len() != expected {
        return Err(ParseError::FieldCount {
            schema,
            expected,
            got: fields.len(),
        });
    }

    match schema {
        SchemaKind::Basic => Ok(Signal {
            timestamp: parse_timestamp(fields[0])?,
            direction: parse_direction(fields[1])?,
            entry_price: parse_price("Entry_Price", fields[2])?,
            plan: ExitPlan::FixedBracket,
            signal_type: None,
            zone_type: None,
            atr: None,
        }),
        SchemaKind::SingleTarget => Ok(Signal {
            timestamp: parse_timestamp(fields[0])?,
            direction: parse_direction(fields[2])?,
            entry_price: parse_price("Entry_Price", fields[3])?,
            plan: ExitPlan::SingleTarget {
                stop_loss: parse_price("Stop_Loss", fields[4])?,
                profit_target: parse_price("Profit_Target", fields[5])?,
            },
            signal_type: Some(fields[1].to_string()),
            zone_type: Some(fields[6].to_string()),
            atr: Some(parse_price("ATR", fields[7])?),
        }),
        SchemaKind::DualTarget => Ok(Signal {
            timestamp: parse_timestamp(fields[0])?,
            direction: parse_direction(fields[2])?,
            entry_price: parse_price("Entry_Price", fields[3])?,
            plan: ExitPlan::DualTarget {
                stop_loss: parse_price("Stop_Loss", fields[4])?,
                profit_target_1: parse_price("Profit_Target1", fields[5])?,
                profit_target_2: parse_price("Profit_Target2", fields[6])?,
                quantity_1: parse_quantity("Quantity1", fields[7])?,
                quantity_2: parse_quantity("Quantity2", fields[8])?,
            },
            signal_type: Some(fields[1].to_string()),
            zone_type: Some(fields[9].to_string()),
            atr: Some(parse_price("ATR", fields[10])?),
        }),
    }
}

fn parse_timestamp(value: &str) -> Result<NaiveDateTime, ParseError> {
    NaiveDateTime::parse_from_str(value, SIGNAL_TIME_FORMAT).map_err(|_| {
        ParseError::InvalidField {
            field: "DateTime",
            value: value.to_string(),
        }
    })
}

fn parse_direction(value: &str) -> Result<Direction, ParseError> {
    value
        .parse::<Direction>()
        .map_err(ParseError::UnrecognizedDirection)
}

fn parse_price(field: &'static str, value: &str) -> Result<f64, ParseError> {
    value.parse::<f64>().map_err(|_| ParseError::InvalidField {
        field,
        value: value.to_string(),
    })
}

fn parse_quantity(field: &'static str, value: &str) -> Result<u32, ParseError> {
    value.parse::<u32>().map_err(|_| ParseError::InvalidField {
        field,
        value: value.to_string(),
    })
}
