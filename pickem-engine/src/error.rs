// Engine error taxonomy.
//
// Every validation failure the engine can report is a distinct variant so
// the presentation layer can render a specific message. None of these are
// retried internally; a `Conflict` means the caller lost a race at a
// uniqueness constraint and may re-fetch state and try again.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no player registered for actor id {0}")]
    Unauthorized(i64),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not your turn in this matchup (waiting on player {expected})")]
    OutOfTurn { expected: i64 },

    #[error("fixture {fixture_id} is already taken or not in this week")]
    FixtureUnavailable { fixture_id: i64 },

    #[error("team `{team}` is not one of the fixture's teams")]
    InvalidTeam { team: String },

    #[error("outcome `{raw}` must be one of the fixture's team names or Draw")]
    InvalidOutcome { raw: String },

    #[error("a concurrent pick claimed this fixture first")]
    Conflict,

    #[error("{0} not found")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl EngineError {
    /// Shortcut for NotFound with a formatted entity description.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}
