// Scoring: weekly points, for/against, season totals, payouts.
//
// Everything here is a pure function over rows already loaded from the
// store. Nothing is cached; callers recompute on every request, which is
// cheap at league cardinalities (tens of picks per week).

use std::collections::{BTreeMap, HashMap};

use crate::db::{Matchup, Outcome, ScoringRow};

/// Weekly for/against accumulation for one player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForAgainst {
    pub points_for: i64,
    pub points_against: i64,
}

/// Season-to-date totals for one player, over finalized weeks only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeasonTotal {
    pub points_for: i64,
    pub points_against: i64,
    pub net: i64,
}

/// One payout transfer for a matchup. A tied matchup produces an explicit
/// zero row (`from`/`to` empty) rather than being omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutRow {
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub points: i64,
    pub payout: i64,
}

/// Per-player point deltas for one week.
///
/// Every player in `player_ids` is present in the output, defaulting to 0.
/// A pick whose fixture has no result contributes nothing — "no result yet"
/// is distinct from a Draw, which scores 0 explicitly.
pub fn weekly_points(
    player_ids: &[i64],
    rows: &[ScoringRow],
    results: &HashMap<i64, Outcome>,
) -> BTreeMap<i64, i64> {
    let mut points: BTreeMap<i64, i64> = player_ids.iter().map(|&id| (id, 0)).collect();

    for row in rows {
        let Some(outcome) = results.get(&row.fixture_id) else {
            continue;
        };
        let delta = match outcome {
            Outcome::Draw => 0,
            Outcome::Home => {
                if row.team == row.home {
                    1
                } else {
                    -1
                }
            }
            Outcome::Away => {
                if row.team == row.away {
                    1
                } else {
                    -1
                }
            }
        };
        *points.entry(row.player_id).or_insert(0) += delta;
    }

    points
}

/// Fold weekly points into per-player for/against across the week's
/// matchups. Symmetric: A's against is B's for and vice versa, summed over
/// every matchup a player appears in (normally one, but not assumed).
pub fn for_against(
    points: &BTreeMap<i64, i64>,
    matchups: &[Matchup],
) -> BTreeMap<i64, ForAgainst> {
    let mut out: BTreeMap<i64, ForAgainst> =
        points.keys().map(|&id| (id, ForAgainst::default())).collect();

    for m in matchups {
        let pa = points.get(&m.player_a_id).copied().unwrap_or(0);
        let pb = points.get(&m.player_b_id).copied().unwrap_or(0);

        let a = out.entry(m.player_a_id).or_default();
        a.points_for += pa;
        a.points_against += pb;

        let b = out.entry(m.player_b_id).or_default();
        b.points_for += pb;
        b.points_against += pa;
    }

    out
}

/// Accumulate one finalized week's for/against into running season totals.
pub fn accumulate_season(
    totals: &mut BTreeMap<i64, SeasonTotal>,
    week_fa: &BTreeMap<i64, ForAgainst>,
) {
    for (&player_id, fa) in week_fa {
        let t = totals.entry(player_id).or_default();
        t.points_for += fa.points_for;
        t.points_against += fa.points_against;
        t.net = t.points_for - t.points_against;
    }
}

/// Payout transfers for a week, one row per matchup. The loser pays the
/// winner the point differential times `rate` currency units per point.
pub fn payouts(points: &BTreeMap<i64, i64>, matchups: &[Matchup], rate: i64) -> Vec<PayoutRow> {
    matchups
        .iter()
        .map(|m| {
            let pa = points.get(&m.player_a_id).copied().unwrap_or(0);
            let pb = points.get(&m.player_b_id).copied().unwrap_or(0);
            let diff = pa - pb;
            if diff > 0 {
                PayoutRow {
                    from: Some(m.player_b_id),
                    to: Some(m.player_a_id),
                    points: diff,
                    payout: diff * rate,
                }
            } else if diff < 0 {
                PayoutRow {
                    from: Some(m.player_a_id),
                    to: Some(m.player_b_id),
                    points: -diff,
                    payout: -diff * rate,
                }
            } else {
                PayoutRow {
                    from: None,
                    to: None,
                    points: 0,
                    payout: 0,
                }
            }
        })
        .collect()
}
