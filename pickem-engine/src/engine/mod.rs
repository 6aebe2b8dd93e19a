// The draft allocation and scoring engine.
//
// `League` is the facade the presentation layer talks to. It holds no
// ambient identity (actors are passed in explicitly) and caches nothing:
// turn order and week status are always recomputed from current pick and
// result state.

pub mod scoring;
pub mod turn;

use std::collections::{BTreeMap, HashSet};

use tracing::{info, warn};

use crate::db::{
    self, Database, Fixture, FixtureResult, Matchup, Outcome, Pick, PickLogEntry, Player,
    StatusReport, Week, WeekStatus,
};
use crate::error::EngineError;
use scoring::{ForAgainst, PayoutRow, SeasonTotal};

/// Default payout rate: currency units per point of differential.
pub const DEFAULT_PAYOUT_PER_POINT: i64 = 5;

pub struct League {
    db: Database,
    payout_per_point: i64,
}

impl League {
    pub fn new(db: Database, payout_per_point: i64) -> Self {
        Self {
            db,
            payout_per_point,
        }
    }

    // ------------------------------------------------------------------
    // Setup (room/schedule bootstrap is external; it calls in through here)
    // ------------------------------------------------------------------

    /// Register a player. Names are globally unique; a duplicate maps to
    /// `Conflict`.
    pub fn add_player(&self, name: &str) -> Result<Player, EngineError> {
        let conn = self.db.conn();
        db::insert_player(&conn, name).map_err(db::constraint_to_conflict)
    }

    /// Create a week. Week numbers are unique; a duplicate maps to
    /// `Conflict`.
    pub fn create_week(&self, number: i64, room_code: &str) -> Result<Week, EngineError> {
        let conn = self.db.conn();
        db::insert_week(&conn, number, room_code).map_err(db::constraint_to_conflict)
    }

    /// Add a fixture to a week. `(week, match_number)` is unique.
    pub fn add_fixture(
        &self,
        week_number: i64,
        match_number: i64,
        home: &str,
        away: &str,
    ) -> Result<Fixture, EngineError> {
        let conn = self.db.conn();
        let week = db::week_by_number(&conn, week_number)?
            .ok_or_else(|| EngineError::not_found(format!("week {week_number}")))?;
        db::insert_fixture(&conn, week.id, match_number, home, away)
            .map_err(db::constraint_to_conflict)
    }

    /// Pair two distinct players for a week with a designated first picker.
    pub fn create_matchup(
        &self,
        week_number: i64,
        player_a_id: i64,
        player_b_id: i64,
        first_picker_id: i64,
    ) -> Result<Matchup, EngineError> {
        if player_a_id == player_b_id {
            return Err(EngineError::InvalidRequest(
                "matchup players must be distinct".into(),
            ));
        }
        if first_picker_id != player_a_id && first_picker_id != player_b_id {
            return Err(EngineError::InvalidRequest(
                "first picker must be one of the matchup players".into(),
            ));
        }
        let conn = self.db.conn();
        let week = db::week_by_number(&conn, week_number)?
            .ok_or_else(|| EngineError::not_found(format!("week {week_number}")))?;
        for id in [player_a_id, player_b_id] {
            if db::player_by_id(&conn, id)?.is_none() {
                return Err(EngineError::not_found(format!("player {id}")));
            }
        }
        db::insert_matchup(&conn, week.id, player_a_id, player_b_id, first_picker_id)
            .map_err(db::constraint_to_conflict)
    }

    /// Fetch-or-create a player by name.
    pub fn ensure_player(&self, name: &str) -> Result<Player, EngineError> {
        let conn = self.db.conn();
        if let Some(existing) = db::player_by_name(&conn, name)? {
            return Ok(existing);
        }
        db::insert_player(&conn, name).map_err(db::constraint_to_conflict)
    }

    /// Fetch-or-create a week, refreshing its room code either way.
    pub fn ensure_week(&self, number: i64, room_code: &str) -> Result<Week, EngineError> {
        let conn = self.db.conn();
        if let Some(existing) = db::week_by_number(&conn, number)? {
            db::update_week_room_code(&conn, existing.id, room_code)?;
            return Ok(Week {
                room_code: room_code.to_string(),
                ..existing
            });
        }
        db::insert_week(&conn, number, room_code).map_err(db::constraint_to_conflict)
    }

    /// Clear a week's fixtures, matchups, picks, and results so it can be
    /// re-seeded from a fresh schedule. The week row itself survives.
    pub fn reset_week(&self, week_number: i64) -> Result<(), EngineError> {
        let conn = self.db.conn();
        let week = db::week_by_number(&conn, week_number)?
            .ok_or_else(|| EngineError::not_found(format!("week {week_number}")))?;
        db::wipe_week(&conn, week.id)?;
        db::recompute_week_status(&conn, week.id)?;
        Ok(())
    }

    /// Remove players not named in `keep`, skipping any that still own
    /// picks or matchups. Returns how many rows were deleted.
    pub fn prune_players(&self, keep: &[String]) -> Result<usize, EngineError> {
        let conn = self.db.conn();
        let mut removed = 0;
        for player in db::players(&conn)? {
            if keep.iter().any(|k| k == &player.name) {
                continue;
            }
            if db::player_is_referenced(&conn, player.id)? {
                warn!("keeping departed player {} (still referenced)", player.name);
                continue;
            }
            db::delete_player(&conn, player.id)?;
            removed += 1;
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn players(&self) -> Result<Vec<Player>, EngineError> {
        let conn = self.db.conn();
        Ok(db::players(&conn)?)
    }

    pub fn weeks(&self) -> Result<Vec<Week>, EngineError> {
        let conn = self.db.conn();
        Ok(db::weeks(&conn)?)
    }

    pub fn matchups(&self, week_number: i64) -> Result<Vec<Matchup>, EngineError> {
        let conn = self.db.conn();
        let week = db::week_by_number(&conn, week_number)?
            .ok_or_else(|| EngineError::not_found(format!("week {week_number}")))?;
        Ok(db::matchups_for_week(&conn, week.id)?)
    }

    /// Whose turn is it in this matchup right now. Recomputed from pick
    /// history on every call; never cached.
    pub fn resolve_turn(&self, matchup_id: i64) -> Result<i64, EngineError> {
        let conn = self.db.conn();
        let matchup = db::matchup_by_id(&conn, matchup_id)?
            .ok_or_else(|| EngineError::not_found(format!("matchup {matchup_id}")))?;
        let picks = db::picks_for_matchup(&conn, matchup.id)?;
        let (first, second) = turn::pick_order(&matchup);
        Ok(turn::next_picker(first, second, picks.len()))
    }

    /// Fixtures still claimable in this matchup: the week's fixtures in
    /// match-number order, minus those already picked by either player.
    pub fn available_fixtures(&self, matchup_id: i64) -> Result<Vec<Fixture>, EngineError> {
        let conn = self.db.conn();
        let matchup = db::matchup_by_id(&conn, matchup_id)?
            .ok_or_else(|| EngineError::not_found(format!("matchup {matchup_id}")))?;
        let fixtures = db::fixtures_for_week(&conn, matchup.week_id)?;
        let picks = db::picks_for_matchup(&conn, matchup.id)?;
        Ok(available_in(fixtures, &picks))
    }

    /// Ordered pick history for a matchup with player and fixture details.
    pub fn pick_log(&self, matchup_id: i64) -> Result<Vec<PickLogEntry>, EngineError> {
        let conn = self.db.conn();
        if db::matchup_by_id(&conn, matchup_id)?.is_none() {
            return Err(EngineError::not_found(format!("matchup {matchup_id}")));
        }
        Ok(db::pick_log(&conn, matchup_id)?)
    }

    /// Compare a submitted room code against the week's code. The session
    /// flow around this lives in the presentation layer.
    pub fn verify_room_code(&self, week_number: i64, code: &str) -> Result<bool, EngineError> {
        let conn = self.db.conn();
        let week = db::week_by_number(&conn, week_number)?
            .ok_or_else(|| EngineError::not_found(format!("week {week_number}")))?;
        Ok(week.room_code == code.trim())
    }

    /// The week players should be looking at: the first still-drafting week,
    /// else the first provisional one, else the first week overall. Statuses
    /// are derived live from result coverage, not read from the status
    /// column.
    pub fn current_week(&self) -> Result<Option<Week>, EngineError> {
        let conn = self.db.conn();
        let weeks = db::weeks(&conn)?;
        let mut statuses = Vec::with_capacity(weeks.len());
        for week in &weeks {
            let (done, total) = db::result_counts(&conn, week.id)?;
            statuses.push(WeekStatus::derive(done, total));
        }
        for wanted in [WeekStatus::Drafting, WeekStatus::Provisional] {
            if let Some(i) = statuses.iter().position(|&s| s == wanted) {
                return Ok(Some(weeks[i].clone()));
            }
        }
        Ok(weeks.into_iter().next())
    }

    /// Every not-yet-finalized week with its result coverage.
    pub fn open_weeks(&self) -> Result<Vec<(Week, StatusReport)>, EngineError> {
        let conn = self.db.conn();
        let mut out = Vec::new();
        for week in db::weeks(&conn)? {
            let (done, total) = db::result_counts(&conn, week.id)?;
            let status = WeekStatus::derive(done, total);
            if status != WeekStatus::Finalized {
                out.push((
                    week,
                    StatusReport {
                        status,
                        done,
                        total,
                    },
                ));
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Pick submission
    // ------------------------------------------------------------------

    /// Validate and commit one pick.
    ///
    /// Checks run in a fixed order, each with its own error kind:
    /// actor resolvable, matchup belongs to week, actor's turn, fixture
    /// available, team is one of the fixture's two names. The checks and
    /// the insert run against one transaction; the `(matchup, fixture)`
    /// uniqueness constraint is the last line of defense against a race
    /// and surfaces as `Conflict`.
    pub fn submit_pick(
        &self,
        actor_id: i64,
        week_number: i64,
        matchup_id: i64,
        fixture_id: i64,
        team: &str,
    ) -> Result<Pick, EngineError> {
        let mut conn = self.db.conn();
        let tx = conn.transaction()?;

        let actor =
            db::player_by_id(&tx, actor_id)?.ok_or(EngineError::Unauthorized(actor_id))?;
        let week = db::week_by_number(&tx, week_number)?
            .ok_or_else(|| EngineError::not_found(format!("week {week_number}")))?;
        let matchup = db::matchup_by_id(&tx, matchup_id)?
            .ok_or_else(|| EngineError::not_found(format!("matchup {matchup_id}")))?;

        if matchup.week_id != week.id {
            return Err(EngineError::InvalidRequest(
                "matchup does not belong to week".into(),
            ));
        }

        let picks = db::picks_for_matchup(&tx, matchup.id)?;
        let (first, second) = turn::pick_order(&matchup);
        let expected = turn::next_picker(first, second, picks.len());
        if actor.id != expected {
            return Err(EngineError::OutOfTurn { expected });
        }

        let fixtures = db::fixtures_for_week(&tx, matchup.week_id)?;
        let fixture = available_in(fixtures, &picks)
            .into_iter()
            .find(|f| f.id == fixture_id)
            .ok_or(EngineError::FixtureUnavailable { fixture_id })?;

        let team = team.trim();
        if team != fixture.home && team != fixture.away {
            return Err(EngineError::InvalidTeam {
                team: team.to_string(),
            });
        }

        let pick = db::insert_pick(&tx, matchup.id, actor.id, fixture.id, team)?;
        tx.commit()?;
        info!(
            "pick recorded: matchup={} player={} fixture=#{} team={}",
            matchup.id, actor.name, fixture.match_number, team
        );
        Ok(pick)
    }

    // ------------------------------------------------------------------
    // Results and week status
    // ------------------------------------------------------------------

    /// Record (or correct) a fixture outcome, then recompute the owning
    /// week's status. Corrections are permitted at any time, including
    /// after finalization; status and scores simply re-derive.
    pub fn record_result(
        &self,
        week_number: i64,
        fixture_id: i64,
        raw_outcome: &str,
    ) -> Result<FixtureResult, EngineError> {
        let mut conn = self.db.conn();
        let tx = conn.transaction()?;

        let week = db::week_by_number(&tx, week_number)?
            .ok_or_else(|| EngineError::not_found(format!("week {week_number}")))?;
        let fixture = db::fixture_by_id(&tx, fixture_id)?
            .ok_or_else(|| EngineError::not_found(format!("fixture {fixture_id}")))?;

        if fixture.week_id != week.id {
            return Err(EngineError::InvalidRequest(
                "fixture does not belong to week".into(),
            ));
        }

        let outcome = normalize_outcome(raw_outcome, &fixture)?;
        let result = db::upsert_result(&tx, fixture.id, outcome)?;
        let report = db::recompute_week_status(&tx, week.id)?;
        tx.commit()?;

        info!(
            "result recorded: week={} fixture=#{} outcome={} ({}/{} done, {})",
            week.number,
            fixture.match_number,
            outcome.as_str(),
            report.done,
            report.total,
            report.status
        );
        Ok(result)
    }

    /// Recompute (and persist) a week's derived status. Idempotent.
    pub fn week_status(&self, week_number: i64) -> Result<StatusReport, EngineError> {
        let conn = self.db.conn();
        let week = db::week_by_number(&conn, week_number)?
            .ok_or_else(|| EngineError::not_found(format!("week {week_number}")))?;
        Ok(db::recompute_week_status(&conn, week.id)?)
    }

    // ------------------------------------------------------------------
    // Scoring
    // ------------------------------------------------------------------

    /// Per-player points for a week. Every registered player is present,
    /// defaulting to 0; picks on unresolved fixtures contribute nothing.
    pub fn weekly_scores(&self, week_number: i64) -> Result<BTreeMap<i64, i64>, EngineError> {
        let conn = self.db.conn();
        let week = db::week_by_number(&conn, week_number)?
            .ok_or_else(|| EngineError::not_found(format!("week {week_number}")))?;
        Ok(weekly_points_inner(&conn, week.id)?)
    }

    /// Per-player for/against for a week, symmetric across its matchups.
    pub fn weekly_for_against(
        &self,
        week_number: i64,
    ) -> Result<BTreeMap<i64, ForAgainst>, EngineError> {
        let conn = self.db.conn();
        let week = db::week_by_number(&conn, week_number)?
            .ok_or_else(|| EngineError::not_found(format!("week {week_number}")))?;
        let points = weekly_points_inner(&conn, week.id)?;
        let matchups = db::matchups_for_week(&conn, week.id)?;
        Ok(scoring::for_against(&points, &matchups))
    }

    /// Payout transfers for a week, one row per matchup (ties included as
    /// explicit zero rows).
    pub fn weekly_payouts(&self, week_number: i64) -> Result<Vec<PayoutRow>, EngineError> {
        let conn = self.db.conn();
        let week = db::week_by_number(&conn, week_number)?
            .ok_or_else(|| EngineError::not_found(format!("week {week_number}")))?;
        let points = weekly_points_inner(&conn, week.id)?;
        let matchups = db::matchups_for_week(&conn, week.id)?;
        Ok(scoring::payouts(&points, &matchups, self.payout_per_point))
    }

    /// Season-to-date totals over finalized weeks only. A week counts as
    /// finalized when its result coverage says so right now; provisional
    /// weeks are excluded entirely.
    pub fn season_totals(&self) -> Result<BTreeMap<i64, SeasonTotal>, EngineError> {
        let conn = self.db.conn();
        let mut totals = BTreeMap::new();
        for week in db::weeks(&conn)? {
            let (done, total) = db::result_counts(&conn, week.id)?;
            if WeekStatus::derive(done, total) != WeekStatus::Finalized {
                continue;
            }
            let points = weekly_points_inner(&conn, week.id)?;
            let matchups = db::matchups_for_week(&conn, week.id)?;
            let fa = scoring::for_against(&points, &matchups);
            scoring::accumulate_season(&mut totals, &fa);
        }
        Ok(totals)
    }

    /// Weekly points for every week, keyed by week number (season rollup).
    pub fn season_rollup(&self) -> Result<BTreeMap<i64, BTreeMap<i64, i64>>, EngineError> {
        let conn = self.db.conn();
        let mut out = BTreeMap::new();
        for week in db::weeks(&conn)? {
            out.insert(week.number, weekly_points_inner(&conn, week.id)?);
        }
        Ok(out)
    }
}

/// Fixtures not yet picked in the matchup, preserving match-number order.
fn available_in(fixtures: Vec<Fixture>, picks: &[Pick]) -> Vec<Fixture> {
    let taken: HashSet<i64> = picks.iter().map(|p| p.fixture_id).collect();
    fixtures
        .into_iter()
        .filter(|f| !taken.contains(&f.id))
        .collect()
}

/// Normalize a raw outcome string against a fixture: case-insensitive
/// "draw", or an exact match of either team name.
fn normalize_outcome(raw: &str, fixture: &Fixture) -> Result<Outcome, EngineError> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("draw") {
        Ok(Outcome::Draw)
    } else if raw == fixture.home {
        Ok(Outcome::Home)
    } else if raw == fixture.away {
        Ok(Outcome::Away)
    } else {
        Err(EngineError::InvalidOutcome {
            raw: raw.to_string(),
        })
    }
}

fn weekly_points_inner(
    conn: &rusqlite::Connection,
    week_id: i64,
) -> rusqlite::Result<BTreeMap<i64, i64>> {
    let player_ids: Vec<i64> = db::players(conn)?.iter().map(|p| p.id).collect();
    let rows = db::scoring_rows_for_week(conn, week_id)?;
    let results = db::results_for_week(conn, week_id)?;
    Ok(scoring::weekly_points(&player_ids, &rows, &results))
}
