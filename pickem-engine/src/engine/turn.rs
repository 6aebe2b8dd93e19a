// Turn-order resolution for a matchup's draft.
//
// Turns swap in blocks of two picks, alternating who leads each block:
// first, second, second, first, first, second, second, first, ...
// This is the league's rule, not a standard snake draft; the cadence is
// load-bearing game semantics and must not be "fixed" to plain alternation.

use crate::db::Matchup;

/// The matchup's players ordered as `(first, second)`, where `first` is the
/// designated first picker.
pub fn pick_order(matchup: &Matchup) -> (i64, i64) {
    if matchup.first_picker_id == matchup.player_a_id {
        (matchup.player_a_id, matchup.player_b_id)
    } else {
        (matchup.player_b_id, matchup.player_a_id)
    }
}

/// Given how many picks have been made, return whose turn it is now.
/// Pure; always one of the two players.
pub fn next_picker(first: i64, second: i64, picks_made: usize) -> i64 {
    let chunk = picks_made / 2;
    let pair = if chunk % 2 == 0 {
        [first, second]
    } else {
        [second, first]
    };
    pair[picks_made % 2]
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIRST: i64 = 10;
    const SECOND: i64 = 20;

    #[test]
    fn cadence_swaps_in_blocks_of_two() {
        let sequence: Vec<i64> = (0..8).map(|n| next_picker(FIRST, SECOND, n)).collect();
        assert_eq!(
            sequence,
            vec![FIRST, SECOND, SECOND, FIRST, FIRST, SECOND, SECOND, FIRST]
        );
    }

    #[test]
    fn cadence_repeats_with_period_four() {
        for n in 0..32 {
            assert_eq!(
                next_picker(FIRST, SECOND, n),
                next_picker(FIRST, SECOND, n + 4),
                "picks {n} and {} should match",
                n + 4
            );
        }
    }

    #[test]
    fn always_returns_one_of_the_two_players() {
        for n in 0..100 {
            let turn = next_picker(FIRST, SECOND, n);
            assert!(turn == FIRST || turn == SECOND);
        }
    }

    #[test]
    fn pick_order_puts_first_picker_first() {
        let m = Matchup {
            id: 1,
            week_id: 1,
            player_a_id: 10,
            player_b_id: 20,
            first_picker_id: 20,
        };
        assert_eq!(pick_order(&m), (20, 10));

        let m = Matchup {
            first_picker_id: 10,
            ..m
        };
        assert_eq!(pick_order(&m), (10, 20));
    }
}
