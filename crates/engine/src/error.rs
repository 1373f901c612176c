//! Error types for the reactive engine.

use thiserror::Error;
use uuid::Uuid;

use crate::entity_id::{EntityKey, EntityKind};
use crate::events::EventKind;
use crate::sheet::Axis;

/// Errors that can occur while mutating or propagating through the graph.
///
/// `REF_ERROR` is not represented here: a broken dependency is a cell value
/// ([`crate::cell::CellValue::RefError`]) and flows through the bus like any
/// other update.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("arity error: expected {expected} publisher(s), got {actual}")]
    Arity { expected: &'static str, actual: usize },

    #[error("ragged table: row {row} has {width} value(s) but the sheet has {cols} column(s)")]
    RaggedTable { row: usize, width: usize, cols: usize },

    #[error("target sheet {sheet} is not empty ({rows}x{cols})")]
    TargetNotEmpty { sheet: Uuid, rows: usize, cols: usize },

    #[error("{axis} position {position} out of range (len {len})")]
    PositionOutOfRange { axis: Axis, position: usize, len: usize },

    #[error("entity {0} cannot subscribe to itself")]
    SelfSubscription(EntityKey),

    #[error("subscribing {subscriber} to {publisher} would create a cycle")]
    CycleDetected { publisher: EntityKey, subscriber: EntityKey },

    #[error("invariant broken: {0}")]
    Invariant(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },

    #[error("no handler registered for {0}")]
    UnregisteredHandler(EventKind),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("event cascade exceeded {limit} events")]
    CascadeLimit { limit: usize },
}

impl EngineError {
    pub fn not_found(kind: EntityKind, id: impl Into<Uuid>) -> Self {
        EngineError::NotFound { kind, id: id.into() }
    }

    /// Structural violations mean a caller broke the graph's shape rules.
    /// They abort the whole cascade and are never retried.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            EngineError::Arity { .. }
                | EngineError::RaggedTable { .. }
                | EngineError::TargetNotEmpty { .. }
                | EngineError::PositionOutOfRange { .. }
                | EngineError::SelfSubscription(_)
                | EngineError::CycleDetected { .. }
                | EngineError::Invariant(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
