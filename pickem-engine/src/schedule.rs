// Schedule loading and league bootstrap.
//
// Reads a season fixture list from CSV (one row per fixture, with a round
// number identifying the week) and seeds the store: players upserted,
// selected weeks wiped and refilled with fixtures, players shuffled into
// random pairings with a random first picker per pair.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use tracing::{info, warn};

use crate::engine::League;
use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One fixture from the season schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureRow {
    pub week: i64,
    pub match_number: i64,
    pub home: String,
    pub away: String,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

// ---------------------------------------------------------------------------
// Raw CSV serde struct (private)
// ---------------------------------------------------------------------------

/// Schedule CSV row. Column headers follow the published fixture export
/// ("Round Number", "Match Number", ...). Extra columns are ignored.
#[derive(Debug, Deserialize)]
struct RawScheduleRow {
    #[serde(rename = "Round Number")]
    round: i64,
    #[serde(rename = "Match Number")]
    match_number: i64,
    #[serde(rename = "Home Team")]
    home: String,
    #[serde(rename = "Away Team")]
    away: String,
}

// ---------------------------------------------------------------------------
// Loaders
// ---------------------------------------------------------------------------

fn load_from_reader<R: Read>(rdr: R) -> Result<Vec<FixtureRow>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut rows = Vec::new();
    for result in reader.deserialize::<RawScheduleRow>() {
        match result {
            Ok(raw) => {
                let home = raw.home.trim().to_string();
                let away = raw.away.trim().to_string();
                if home.is_empty() || away.is_empty() {
                    warn!(
                        "skipping schedule row {}/{}: blank team name",
                        raw.round, raw.match_number
                    );
                    continue;
                }
                rows.push(FixtureRow {
                    week: raw.round,
                    match_number: raw.match_number,
                    home,
                    away,
                });
            }
            Err(e) => {
                warn!("skipping malformed schedule row: {}", e);
            }
        }
    }
    Ok(rows)
}

/// Load the season schedule from a CSV file.
pub fn load_schedule(path: &Path) -> Result<Vec<FixtureRow>, ScheduleError> {
    let file = std::fs::File::open(path).map_err(|e| ScheduleError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_from_reader(file).map_err(|e| ScheduleError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

/// Week numbers present in a loaded schedule, ascending.
pub fn weeks_in(rows: &[FixtureRow]) -> BTreeSet<i64> {
    rows.iter().map(|r| r.week).collect()
}

// ---------------------------------------------------------------------------
// Week selection
// ---------------------------------------------------------------------------

/// Parse a week selection argument: `all`, a single number (`3`), a range
/// (`1-4`), or a comma list mixing both (`1,3,8-10`). Every selected week
/// must exist in the schedule.
pub fn parse_week_selection(
    arg: &str,
    available: &BTreeSet<i64>,
) -> Result<Vec<i64>, ScheduleError> {
    let arg = arg.trim();
    if arg.eq_ignore_ascii_case("all") {
        return Ok(available.iter().copied().collect());
    }

    let mut selected = BTreeSet::new();
    for part in arg.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: i64 = parse_week_number(lo)?;
            let hi: i64 = parse_week_number(hi)?;
            if lo > hi {
                return Err(ScheduleError::Validation(format!(
                    "empty week range `{part}`"
                )));
            }
            selected.extend(lo..=hi);
        } else {
            selected.insert(parse_week_number(part)?);
        }
    }

    if selected.is_empty() {
        return Err(ScheduleError::Validation(format!(
            "no weeks selected by `{arg}`"
        )));
    }
    for week in &selected {
        if !available.contains(week) {
            return Err(ScheduleError::Validation(format!(
                "week {week} is not in the schedule"
            )));
        }
    }
    Ok(selected.into_iter().collect())
}

fn parse_week_number(s: &str) -> Result<i64, ScheduleError> {
    s.trim()
        .parse()
        .map_err(|_| ScheduleError::Validation(format!("invalid week number `{}`", s.trim())))
}

// ---------------------------------------------------------------------------
// League bootstrap
// ---------------------------------------------------------------------------

/// Seed the league from a loaded schedule.
///
/// For each selected week: any existing fixtures, matchups, picks, and
/// results are wiped, the week's fixtures are inserted from the schedule,
/// and the roster is shuffled into pairs with a coin-flip first picker.
/// Players are upserted by name first; departed players are removed only
/// if nothing references them.
pub fn init_league<R: Rng>(
    league: &League,
    rows: &[FixtureRow],
    weeks: &[i64],
    roster: &[String],
    room_code: &str,
    rng: &mut R,
) -> Result<(), ScheduleError> {
    if roster.len() < 2 || roster.len() % 2 != 0 {
        return Err(ScheduleError::Validation(format!(
            "roster must be a non-empty even number of players, got {}",
            roster.len()
        )));
    }

    let mut player_ids = Vec::with_capacity(roster.len());
    for name in roster {
        player_ids.push(league.ensure_player(name)?.id);
    }
    league.prune_players(roster)?;

    for &week in weeks {
        league.ensure_week(week, room_code)?;
        league.reset_week(week)?;

        let mut count = 0;
        for row in rows.iter().filter(|r| r.week == week) {
            league.add_fixture(week, row.match_number, &row.home, &row.away)?;
            count += 1;
        }

        let mut order = player_ids.clone();
        order.shuffle(rng);
        for pair in order.chunks_exact(2) {
            let first = if rng.gen_bool(0.5) { pair[0] } else { pair[1] };
            league.create_matchup(week, pair[0], pair[1], first)?;
        }

        info!(
            "week {week} initialized: {count} fixtures, {} matchups",
            order.len() / 2
        );
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, WeekStatus};
    use crate::engine::{League, DEFAULT_PAYOUT_PER_POINT};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const CSV: &str = "\
Round Number,Match Number,Home Team,Away Team
1,1,Arsenal,Spurs
1,2,Chelsea,Fulham
2,3,Spurs,Chelsea
2,4,Fulham,Arsenal
";

    fn test_league() -> League {
        let db = Database::open(":memory:").expect("in-memory database should open");
        League::new(db, DEFAULT_PAYOUT_PER_POINT)
    }

    fn roster() -> Vec<String> {
        vec!["Ada".into(), "Brin".into(), "Cleo".into(), "Dov".into()]
    }

    #[test]
    fn loads_schedule_rows() {
        let rows = load_from_reader(CSV.as_bytes()).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows[0],
            FixtureRow {
                week: 1,
                match_number: 1,
                home: "Arsenal".into(),
                away: "Spurs".into(),
            }
        );
        assert_eq!(weeks_in(&rows), BTreeSet::from([1, 2]));
    }

    #[test]
    fn malformed_rows_are_skipped_not_fatal() {
        let csv = "\
Round Number,Match Number,Home Team,Away Team
1,1,Arsenal,Spurs
not-a-number,2,Chelsea,Fulham
1,3, ,Fulham
";
        let rows = load_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn selection_all_returns_every_week() {
        let available = BTreeSet::from([1, 2, 3]);
        assert_eq!(
            parse_week_selection("all", &available).unwrap(),
            vec![1, 2, 3]
        );
        assert_eq!(
            parse_week_selection("ALL", &available).unwrap(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn selection_parses_singles_ranges_and_lists() {
        let available = (1..=10).collect();
        assert_eq!(parse_week_selection("3", &available).unwrap(), vec![3]);
        assert_eq!(
            parse_week_selection("1-4", &available).unwrap(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(
            parse_week_selection("1,3,8-10", &available).unwrap(),
            vec![1, 3, 8, 9, 10]
        );
        // Overlaps dedupe.
        assert_eq!(
            parse_week_selection("2-4,3", &available).unwrap(),
            vec![2, 3, 4]
        );
    }

    #[test]
    fn selection_rejects_garbage_and_missing_weeks() {
        let available = BTreeSet::from([1, 2]);
        assert!(matches!(
            parse_week_selection("x", &available),
            Err(ScheduleError::Validation(_))
        ));
        assert!(matches!(
            parse_week_selection("4-2", &available),
            Err(ScheduleError::Validation(_))
        ));
        assert!(matches!(
            parse_week_selection("3", &available),
            Err(ScheduleError::Validation(_))
        ));
        assert!(matches!(
            parse_week_selection("", &available),
            Err(ScheduleError::Validation(_))
        ));
    }

    #[test]
    fn init_seeds_players_fixtures_and_pairings() {
        let league = test_league();
        let rows = load_from_reader(CSV.as_bytes()).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        init_league(&league, &rows, &[1, 2], &roster(), "ROOM1", &mut rng).unwrap();

        assert_eq!(league.players().unwrap().len(), 4);
        assert_eq!(league.weeks().unwrap().len(), 2);
        for week in [1, 2] {
            let matchups = league.matchups(week).unwrap();
            assert_eq!(matchups.len(), 2);
            for m in &matchups {
                assert_ne!(m.player_a_id, m.player_b_id);
                assert!(m.first_picker_id == m.player_a_id || m.first_picker_id == m.player_b_id);
            }
            assert_eq!(league.week_status(week).unwrap().status, WeekStatus::Drafting);
        }
        // Each player appears in exactly one matchup per week.
        let matchups = league.matchups(1).unwrap();
        let mut seen: Vec<i64> = matchups
            .iter()
            .flat_map(|m| [m.player_a_id, m.player_b_id])
            .collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn reinit_wipes_picks_and_results() {
        let league = test_league();
        let rows = load_from_reader(CSV.as_bytes()).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        init_league(&league, &rows, &[1], &roster(), "ROOM1", &mut rng).unwrap();

        let matchup = league.matchups(1).unwrap()[0].clone();
        let picker = matchup.first_picker_id;
        let fixture = league.available_fixtures(matchup.id).unwrap()[0].clone();
        league
            .submit_pick(picker, 1, matchup.id, fixture.id, &fixture.home)
            .unwrap();
        league.record_result(1, fixture.id, "Draw").unwrap();

        init_league(&league, &rows, &[1], &roster(), "ROOM2", &mut rng).unwrap();
        let matchup = league.matchups(1).unwrap()[0].clone();
        assert!(league.pick_log(matchup.id).unwrap().is_empty());
        assert_eq!(league.week_status(1).unwrap().status, WeekStatus::Drafting);
        assert!(league.verify_room_code(1, "ROOM2").unwrap());
    }

    #[test]
    fn roster_change_keeps_referenced_players() {
        let league = test_league();
        let rows = load_from_reader(CSV.as_bytes()).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        init_league(&league, &rows, &[1], &roster(), "ROOM1", &mut rng).unwrap();

        // Swap Dov for Elly. Dov is referenced by week 1's matchups, so the
        // row survives; the new roster simply adds Elly.
        let new_roster: Vec<String> =
            vec!["Ada".into(), "Brin".into(), "Cleo".into(), "Elly".into()];
        init_league(&league, &rows, &[2], &new_roster, "ROOM1", &mut rng).unwrap();

        let names: Vec<String> = league
            .players()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert!(names.contains(&"Dov".to_string()));
        assert!(names.contains(&"Elly".to_string()));
    }

    #[test]
    fn odd_roster_is_rejected() {
        let league = test_league();
        let rows = load_from_reader(CSV.as_bytes()).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let odd: Vec<String> = vec!["Ada".into(), "Brin".into(), "Cleo".into()];
        assert!(matches!(
            init_league(&league, &rows, &[1], &odd, "ROOM1", &mut rng),
            Err(ScheduleError::Validation(_))
        ));
    }
}
