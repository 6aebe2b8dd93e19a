// SQLite persistence layer for league state.
//
// The six tables here are the whole on-disk format: players, weeks,
// fixtures, matchups, picks, results. Uniqueness constraints are the
// authoritative conflict detectors — `(matchup_id, fixture_id)` for picks
// and `fixture_id` for results — so a race that slips past optimistic
// validation still surfaces as a constraint violation, never a double row.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};
use tracing::warn;

use crate::error::EngineError;

/// SQLite-backed store for the pick'em league.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS players (
                id   INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS weeks (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                number    INTEGER NOT NULL UNIQUE,
                room_code TEXT NOT NULL,
                status    TEXT NOT NULL DEFAULT 'drafting'
            );

            CREATE TABLE IF NOT EXISTS fixtures (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                week_id      INTEGER NOT NULL REFERENCES weeks(id),
                match_number INTEGER NOT NULL,
                home         TEXT NOT NULL,
                away         TEXT NOT NULL,
                UNIQUE(week_id, match_number)
            );

            CREATE TABLE IF NOT EXISTS matchups (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                week_id         INTEGER NOT NULL REFERENCES weeks(id),
                player_a_id     INTEGER NOT NULL REFERENCES players(id),
                player_b_id     INTEGER NOT NULL REFERENCES players(id),
                first_picker_id INTEGER NOT NULL REFERENCES players(id),
                CHECK (player_a_id <> player_b_id),
                CHECK (first_picker_id IN (player_a_id, player_b_id))
            );

            CREATE TABLE IF NOT EXISTS picks (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                matchup_id INTEGER NOT NULL REFERENCES matchups(id),
                player_id  INTEGER NOT NULL REFERENCES players(id),
                fixture_id INTEGER NOT NULL REFERENCES fixtures(id),
                team       TEXT NOT NULL,
                seq        INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(matchup_id, fixture_id)
            );

            CREATE INDEX IF NOT EXISTS idx_picks_matchup ON picks(matchup_id);

            CREATE TABLE IF NOT EXISTS results (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                fixture_id INTEGER NOT NULL UNIQUE REFERENCES fixtures(id),
                outcome    TEXT NOT NULL
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: i64,
    pub name: String,
}

/// Derived lifecycle stage of a week, a pure function of how many of its
/// fixtures have a recorded result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekStatus {
    Drafting,
    Provisional,
    Finalized,
}

impl WeekStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WeekStatus::Drafting => "drafting",
            WeekStatus::Provisional => "provisional",
            WeekStatus::Finalized => "finalized",
        }
    }

    /// Derive the status from result coverage. A week with zero fixtures is
    /// vacuously finalized (`done == total == 0`).
    pub fn derive(done: i64, total: i64) -> Self {
        if done == total {
            WeekStatus::Finalized
        } else if done == 0 {
            WeekStatus::Drafting
        } else {
            WeekStatus::Provisional
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "drafting" => WeekStatus::Drafting,
            "provisional" => WeekStatus::Provisional,
            "finalized" => WeekStatus::Finalized,
            other => {
                warn!("unknown week status `{other}` in database, treating as drafting");
                WeekStatus::Drafting
            }
        }
    }
}

impl std::fmt::Display for WeekStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Week {
    pub id: i64,
    pub number: i64,
    pub room_code: String,
    /// Last persisted status. Derived state; readers recompute it rather
    /// than trusting this column (see `recompute_week_status`).
    pub status: WeekStatus,
}

#[derive(Debug, Clone)]
pub struct Fixture {
    pub id: i64,
    pub week_id: i64,
    pub match_number: i64,
    pub home: String,
    pub away: String,
}

#[derive(Debug, Clone)]
pub struct Matchup {
    pub id: i64,
    pub week_id: i64,
    pub player_a_id: i64,
    pub player_b_id: i64,
    pub first_picker_id: i64,
}

#[derive(Debug, Clone)]
pub struct Pick {
    pub id: i64,
    pub matchup_id: i64,
    pub player_id: i64,
    pub fixture_id: i64,
    pub team: String,
    /// Draft position within the matchup, 1-based, assigned atomically at
    /// insert. Defines draft order; `created_at` is display-only.
    pub seq: i64,
    pub created_at: String,
}

/// Recorded real-world outcome of a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Home,
    Away,
    Draw,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Home => "Home",
            Outcome::Away => "Away",
            Outcome::Draw => "Draw",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "Home" => Outcome::Home,
            "Away" => Outcome::Away,
            "Draw" => Outcome::Draw,
            other => {
                warn!("unknown outcome `{other}` in database, treating as Draw");
                Outcome::Draw
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct FixtureResult {
    pub id: i64,
    pub fixture_id: i64,
    pub outcome: Outcome,
}

/// Result coverage and derived status for a week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    pub status: WeekStatus,
    pub done: i64,
    pub total: i64,
}

/// One entry of a matchup's ordered pick history, joined with player and
/// fixture details for display.
#[derive(Debug, Clone)]
pub struct PickLogEntry {
    pub player: String,
    pub team: String,
    pub match_number: i64,
    pub home: String,
    pub away: String,
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Row mappers
// ---------------------------------------------------------------------------

fn map_player(row: &Row<'_>) -> rusqlite::Result<Player> {
    Ok(Player {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn map_week(row: &Row<'_>) -> rusqlite::Result<Week> {
    let status: String = row.get(3)?;
    Ok(Week {
        id: row.get(0)?,
        number: row.get(1)?,
        room_code: row.get(2)?,
        status: WeekStatus::from_db(&status),
    })
}

fn map_fixture(row: &Row<'_>) -> rusqlite::Result<Fixture> {
    Ok(Fixture {
        id: row.get(0)?,
        week_id: row.get(1)?,
        match_number: row.get(2)?,
        home: row.get(3)?,
        away: row.get(4)?,
    })
}

fn map_matchup(row: &Row<'_>) -> rusqlite::Result<Matchup> {
    Ok(Matchup {
        id: row.get(0)?,
        week_id: row.get(1)?,
        player_a_id: row.get(2)?,
        player_b_id: row.get(3)?,
        first_picker_id: row.get(4)?,
    })
}

fn map_pick(row: &Row<'_>) -> rusqlite::Result<Pick> {
    Ok(Pick {
        id: row.get(0)?,
        matchup_id: row.get(1)?,
        player_id: row.get(2)?,
        fixture_id: row.get(3)?,
        team: row.get(4)?,
        seq: row.get(5)?,
        created_at: row.get(6)?,
    })
}

// ---------------------------------------------------------------------------
// Queries
//
// Free functions over `&Connection` so the engine can run several of them
// against one transaction (a `Transaction` derefs to `Connection`).
// ---------------------------------------------------------------------------

pub(crate) fn players(conn: &Connection) -> rusqlite::Result<Vec<Player>> {
    let mut stmt = conn.prepare("SELECT id, name FROM players ORDER BY name")?;
    let rows = stmt.query_map([], map_player)?;
    rows.collect()
}

pub(crate) fn player_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<Player>> {
    let mut stmt = conn.prepare("SELECT id, name FROM players WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], map_player)?;
    rows.next().transpose()
}

pub(crate) fn player_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<Player>> {
    let mut stmt = conn.prepare("SELECT id, name FROM players WHERE name = ?1")?;
    let mut rows = stmt.query_map(params![name], map_player)?;
    rows.next().transpose()
}

pub(crate) fn insert_player(conn: &Connection, name: &str) -> rusqlite::Result<Player> {
    conn.query_row(
        "INSERT INTO players (name) VALUES (?1) RETURNING id, name",
        params![name],
        map_player,
    )
}

/// Returns true if any pick or matchup references the player. Referenced
/// players must never be deleted.
pub(crate) fn player_is_referenced(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM picks WHERE player_id = ?1)
             OR EXISTS(SELECT 1 FROM matchups
                       WHERE player_a_id = ?1 OR player_b_id = ?1)",
        params![id],
        |row| row.get(0),
    )
}

pub(crate) fn delete_player(conn: &Connection, id: i64) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM players WHERE id = ?1", params![id])?;
    Ok(())
}

pub(crate) fn weeks(conn: &Connection) -> rusqlite::Result<Vec<Week>> {
    let mut stmt =
        conn.prepare("SELECT id, number, room_code, status FROM weeks ORDER BY number")?;
    let rows = stmt.query_map([], map_week)?;
    rows.collect()
}

pub(crate) fn week_by_number(conn: &Connection, number: i64) -> rusqlite::Result<Option<Week>> {
    let mut stmt =
        conn.prepare("SELECT id, number, room_code, status FROM weeks WHERE number = ?1")?;
    let mut rows = stmt.query_map(params![number], map_week)?;
    rows.next().transpose()
}

pub(crate) fn insert_week(
    conn: &Connection,
    number: i64,
    room_code: &str,
) -> rusqlite::Result<Week> {
    conn.query_row(
        "INSERT INTO weeks (number, room_code, status) VALUES (?1, ?2, 'drafting')
         RETURNING id, number, room_code, status",
        params![number, room_code],
        map_week,
    )
}

pub(crate) fn update_week_room_code(
    conn: &Connection,
    week_id: i64,
    room_code: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE weeks SET room_code = ?2, status = 'drafting' WHERE id = ?1",
        params![week_id, room_code],
    )?;
    Ok(())
}

pub(crate) fn fixtures_for_week(conn: &Connection, week_id: i64) -> rusqlite::Result<Vec<Fixture>> {
    let mut stmt = conn.prepare(
        "SELECT id, week_id, match_number, home, away FROM fixtures
         WHERE week_id = ?1 ORDER BY match_number",
    )?;
    let rows = stmt.query_map(params![week_id], map_fixture)?;
    rows.collect()
}

pub(crate) fn fixture_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<Fixture>> {
    let mut stmt =
        conn.prepare("SELECT id, week_id, match_number, home, away FROM fixtures WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], map_fixture)?;
    rows.next().transpose()
}

pub(crate) fn insert_fixture(
    conn: &Connection,
    week_id: i64,
    match_number: i64,
    home: &str,
    away: &str,
) -> rusqlite::Result<Fixture> {
    conn.query_row(
        "INSERT INTO fixtures (week_id, match_number, home, away) VALUES (?1, ?2, ?3, ?4)
         RETURNING id, week_id, match_number, home, away",
        params![week_id, match_number, home, away],
        map_fixture,
    )
}

pub(crate) fn matchup_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<Matchup>> {
    let mut stmt = conn.prepare(
        "SELECT id, week_id, player_a_id, player_b_id, first_picker_id
         FROM matchups WHERE id = ?1",
    )?;
    let mut rows = stmt.query_map(params![id], map_matchup)?;
    rows.next().transpose()
}

pub(crate) fn matchups_for_week(conn: &Connection, week_id: i64) -> rusqlite::Result<Vec<Matchup>> {
    let mut stmt = conn.prepare(
        "SELECT id, week_id, player_a_id, player_b_id, first_picker_id
         FROM matchups WHERE week_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![week_id], map_matchup)?;
    rows.collect()
}

pub(crate) fn insert_matchup(
    conn: &Connection,
    week_id: i64,
    player_a_id: i64,
    player_b_id: i64,
    first_picker_id: i64,
) -> rusqlite::Result<Matchup> {
    conn.query_row(
        "INSERT INTO matchups (week_id, player_a_id, player_b_id, first_picker_id)
         VALUES (?1, ?2, ?3, ?4)
         RETURNING id, week_id, player_a_id, player_b_id, first_picker_id",
        params![week_id, player_a_id, player_b_id, first_picker_id],
        map_matchup,
    )
}

/// Picks already made in a matchup, in draft order `(seq, id)`.
pub(crate) fn picks_for_matchup(conn: &Connection, matchup_id: i64) -> rusqlite::Result<Vec<Pick>> {
    let mut stmt = conn.prepare(
        "SELECT id, matchup_id, player_id, fixture_id, team, seq, created_at
         FROM picks WHERE matchup_id = ?1 ORDER BY seq, id",
    )?;
    let rows = stmt.query_map(params![matchup_id], map_pick)?;
    rows.collect()
}

/// Insert a pick, assigning the next per-matchup sequence number inside the
/// insert itself so draft order stays well-defined under concurrency and
/// coarse clocks. A `(matchup_id, fixture_id)` uniqueness violation is the
/// expected signature of a lost race and maps to `Conflict`.
pub(crate) fn insert_pick(
    conn: &Connection,
    matchup_id: i64,
    player_id: i64,
    fixture_id: i64,
    team: &str,
) -> Result<Pick, EngineError> {
    let created_at = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
    conn.query_row(
        "INSERT INTO picks (matchup_id, player_id, fixture_id, team, seq, created_at)
         VALUES (?1, ?2, ?3, ?4,
                 (SELECT COALESCE(MAX(seq), 0) + 1 FROM picks WHERE matchup_id = ?1),
                 ?5)
         RETURNING id, matchup_id, player_id, fixture_id, team, seq, created_at",
        params![matchup_id, player_id, fixture_id, team, created_at],
        map_pick,
    )
    .map_err(constraint_to_conflict)
}

/// Map a uniqueness/constraint violation to `Conflict`; anything else is a
/// plain storage error. Constraint violations are expected outcomes of
/// races, not faults.
pub(crate) fn constraint_to_conflict(err: rusqlite::Error) -> EngineError {
    match err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            EngineError::Conflict
        }
        other => EngineError::Storage(other),
    }
}

/// Record (or correct) a fixture's outcome. At most one result per fixture;
/// later writes overwrite the outcome.
pub(crate) fn upsert_result(
    conn: &Connection,
    fixture_id: i64,
    outcome: Outcome,
) -> rusqlite::Result<FixtureResult> {
    let id: i64 = conn.query_row(
        "INSERT INTO results (fixture_id, outcome) VALUES (?1, ?2)
         ON CONFLICT(fixture_id) DO UPDATE SET outcome = excluded.outcome
         RETURNING id",
        params![fixture_id, outcome.as_str()],
        |row| row.get(0),
    )?;
    Ok(FixtureResult {
        id,
        fixture_id,
        outcome,
    })
}

/// Outcomes recorded for a week's fixtures, keyed by fixture id.
pub(crate) fn results_for_week(
    conn: &Connection,
    week_id: i64,
) -> rusqlite::Result<HashMap<i64, Outcome>> {
    let mut stmt = conn.prepare(
        "SELECT f.id, r.outcome FROM results r
         JOIN fixtures f ON r.fixture_id = f.id
         WHERE f.week_id = ?1",
    )?;
    let rows = stmt.query_map(params![week_id], |row| {
        let outcome: String = row.get(1)?;
        Ok((row.get::<_, i64>(0)?, Outcome::from_db(&outcome)))
    })?;
    rows.collect()
}

/// `(done, total)` result coverage for a week.
pub(crate) fn result_counts(conn: &Connection, week_id: i64) -> rusqlite::Result<(i64, i64)> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM fixtures WHERE week_id = ?1",
        params![week_id],
        |row| row.get(0),
    )?;
    let done: i64 = conn.query_row(
        "SELECT COUNT(*) FROM results r JOIN fixtures f ON r.fixture_id = f.id
         WHERE f.week_id = ?1",
        params![week_id],
        |row| row.get(0),
    )?;
    Ok((done, total))
}

/// Recompute a week's derived status from current result coverage and
/// persist it. Idempotent; this is the only place that writes the status
/// column outside of schedule initialization.
pub(crate) fn recompute_week_status(
    conn: &Connection,
    week_id: i64,
) -> rusqlite::Result<StatusReport> {
    let (done, total) = result_counts(conn, week_id)?;
    let status = WeekStatus::derive(done, total);
    conn.execute(
        "UPDATE weeks SET status = ?2 WHERE id = ?1",
        params![week_id, status.as_str()],
    )?;
    Ok(StatusReport {
        status,
        done,
        total,
    })
}

/// Per-pick scoring input for a week: who picked which team in which
/// fixture. Joined through matchups so only the week's picks qualify.
#[derive(Debug, Clone)]
pub struct ScoringRow {
    pub player_id: i64,
    pub team: String,
    pub fixture_id: i64,
    pub home: String,
    pub away: String,
}

pub(crate) fn scoring_rows_for_week(
    conn: &Connection,
    week_id: i64,
) -> rusqlite::Result<Vec<ScoringRow>> {
    let mut stmt = conn.prepare(
        "SELECT p.player_id, p.team, p.fixture_id, f.home, f.away
         FROM picks p
         JOIN matchups m ON p.matchup_id = m.id
         JOIN fixtures f ON p.fixture_id = f.id
         WHERE m.week_id = ?1
         ORDER BY p.seq, p.id",
    )?;
    let rows = stmt.query_map(params![week_id], |row| {
        Ok(ScoringRow {
            player_id: row.get(0)?,
            team: row.get(1)?,
            fixture_id: row.get(2)?,
            home: row.get(3)?,
            away: row.get(4)?,
        })
    })?;
    rows.collect()
}

/// Ordered pick history for a matchup, joined with player and fixture
/// details for display.
pub(crate) fn pick_log(conn: &Connection, matchup_id: i64) -> rusqlite::Result<Vec<PickLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT pl.name, p.team, f.match_number, f.home, f.away, p.created_at
         FROM picks p
         JOIN players pl ON p.player_id = pl.id
         JOIN fixtures f ON p.fixture_id = f.id
         WHERE p.matchup_id = ?1
         ORDER BY p.seq, p.id",
    )?;
    let rows = stmt.query_map(params![matchup_id], |row| {
        Ok(PickLogEntry {
            player: row.get(0)?,
            team: row.get(1)?,
            match_number: row.get(2)?,
            home: row.get(3)?,
            away: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;
    rows.collect()
}

/// Wipe one week's fixtures, matchups, picks, and results so the week can
/// be re-initialized from a fresh schedule. The week row itself survives.
pub(crate) fn wipe_week(conn: &Connection, week_id: i64) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM results WHERE fixture_id IN
            (SELECT id FROM fixtures WHERE week_id = ?1)",
        params![week_id],
    )?;
    conn.execute(
        "DELETE FROM picks WHERE matchup_id IN
            (SELECT id FROM matchups WHERE week_id = ?1)",
        params![week_id],
    )?;
    conn.execute("DELETE FROM matchups WHERE week_id = ?1", params![week_id])?;
    conn.execute("DELETE FROM fixtures WHERE week_id = ?1", params![week_id])?;
    Ok(())
}
