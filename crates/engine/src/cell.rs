use std::fmt;

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::entity_id::{CellId, EntityKey, SheetId, SindexId};

/// Cell payload.
///
/// `RefError` marks a broken upstream dependency. It is a normal value: it is
/// stored, mirrored, and propagated exactly like a number or a string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Null,
    Int(i64),
    Float(OrderedFloat<f64>),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    RefError,
    ValueError,
}

pub const REF_ERROR: &str = "REF_ERROR";
pub const VALUE_ERROR: &str = "VALUE_ERROR";

impl CellValue {
    pub fn float(n: f64) -> Self {
        CellValue::Float(OrderedFloat(n))
    }

    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn is_ref_error(&self) -> bool {
        matches!(self, CellValue::RefError)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CellValue::RefError | CellValue::ValueError)
    }

    /// Numeric view used by formula policies. Blanks count as zero.
    fn as_number(&self) -> Option<Number> {
        match self {
            CellValue::Null => Some(Number::Int(0)),
            CellValue::Int(n) => Some(Number::Int(*n)),
            CellValue::Float(n) => Some(Number::Float(n.0)),
            CellValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Some(Number::Int(0))
                } else if let Ok(n) = trimmed.parse::<i64>() {
                    Some(Number::Int(n))
                } else {
                    trimmed.parse::<f64>().ok().map(Number::Float)
                }
            }
            CellValue::Bool(_)
            | CellValue::Timestamp(_)
            | CellValue::RefError
            | CellValue::ValueError => None,
        }
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Int(n)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::float(n)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for CellValue {
    fn from(ts: DateTime<Utc>) -> Self {
        CellValue::Timestamp(ts)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(CellValue::Null, Into::into)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Int(n) => write!(f, "{n}"),
            CellValue::Float(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.0}", n.0)
                } else {
                    write!(f, "{}", n.0)
                }
            }
            CellValue::Text(s) => f.write_str(s),
            CellValue::Bool(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            CellValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            CellValue::RefError => f.write_str(REF_ERROR),
            CellValue::ValueError => f.write_str(VALUE_ERROR),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn into_value(self) -> CellValue {
        match self {
            Number::Int(n) => CellValue::Int(n),
            Number::Float(n) => CellValue::float(n),
        }
    }

    fn to_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(n) => n,
        }
    }

    fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a
                .checked_add(b)
                .map_or(Number::Float(a as f64 + b as f64), Number::Int),
            (a, b) => Number::Float(a.to_f64() + b.to_f64()),
        }
    }

    fn sub(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a
                .checked_sub(b)
                .map_or(Number::Float(a as f64 - b as f64), Number::Int),
            (a, b) => Number::Float(a.to_f64() - b.to_f64()),
        }
    }
}

/// Arithmetic plugged into a multi-parent cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaOp {
    /// Sum of every operand
    Sum,
    /// `operands[0] - operands[1]`
    Difference,
}

impl FormulaOp {
    /// Describes the accepted operand count, for arity errors.
    pub fn arity(&self) -> &'static str {
        match self {
            FormulaOp::Sum => "at least 1",
            FormulaOp::Difference => "exactly 2",
        }
    }

    pub fn accepts(&self, operands: usize) -> bool {
        match self {
            FormulaOp::Sum => operands >= 1,
            FormulaOp::Difference => operands == 2,
        }
    }

    /// Evaluate over operand values in operand order.
    ///
    /// Any `RefError` operand wins, then any non-numeric operand yields
    /// `ValueError`.
    pub fn apply(&self, values: &[CellValue]) -> CellValue {
        if values.iter().any(CellValue::is_ref_error) {
            return CellValue::RefError;
        }
        let Some(numbers) = values
            .iter()
            .map(CellValue::as_number)
            .collect::<Option<Vec<_>>>()
        else {
            return CellValue::ValueError;
        };

        match self {
            FormulaOp::Sum => numbers
                .into_iter()
                .fold(Number::Int(0), Number::add)
                .into_value(),
            FormulaOp::Difference => match numbers.as_slice() {
                [minuend, subtrahend] => minuend.sub(*subtrahend).into_value(),
                _ => CellValue::ValueError,
            },
        }
    }
}

/// A formula attached to a cell: which operation, over which parents.
///
/// Operand order matters for `Difference`; the subscription graph itself is
/// unordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Formula {
    pub op: FormulaOp,
    pub operands: Vec<CellId>,
}

impl Formula {
    pub fn new(op: FormulaOp) -> Self {
        Self { op, operands: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub sheet_id: SheetId,
    pub row_id: SindexId,
    pub col_id: SindexId,
    pub value: CellValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<Formula>,
}

impl Cell {
    pub fn new(sheet_id: SheetId, row_id: SindexId, col_id: SindexId, value: CellValue) -> Self {
        Self {
            id: CellId::new(),
            sheet_id,
            row_id,
            col_id,
            value,
            background: None,
            formula: None,
        }
    }

    pub fn with_background(mut self, background: Option<String>) -> Self {
        self.background = background;
        self
    }

    pub fn with_formula(mut self, op: FormulaOp) -> Self {
        self.formula = Some(Formula::new(op));
        self
    }

    pub fn key(&self) -> EntityKey {
        self.id.into()
    }
}
