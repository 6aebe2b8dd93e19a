// Pick'em engine entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file)
// 2. Load config
// 3. Open database
// 4. Optional: seed weeks from the fixture schedule (`--init <weeks>`)
// 5. Print a league summary (week statuses, season standings)

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use rand::thread_rng;
use tracing::info;

use pickem_engine::config;
use pickem_engine::db::Database;
use pickem_engine::engine::League;
use pickem_engine::schedule;

fn main() -> anyhow::Result<()> {
    init_tracing()?;
    info!("pick'em engine starting up");

    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: league={}, {} players",
        config.league.name,
        config.league.players.len()
    );

    let db = Database::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);

    let league = League::new(db, config.league.payout_per_point);

    // `--init all` / `--init 1-4` / `--init 1,3,8` seeds the selected weeks
    // from the fixture CSV, wiping any picks and results they already hold.
    if let Some(selection) = init_arg() {
        let rows = schedule::load_schedule(Path::new(&config.fixtures_csv))
            .context("failed to load fixture schedule")?;
        let weeks = schedule::parse_week_selection(&selection, &schedule::weeks_in(&rows))
            .context("invalid week selection")?;
        schedule::init_league(
            &league,
            &rows,
            &weeks,
            &config.league.players,
            &config.league.room_code,
            &mut thread_rng(),
        )
        .context("failed to initialize league")?;
        println!("Initialized weeks {weeks:?} from {}", config.fixtures_csv);
    }

    print_summary(&league)?;
    Ok(())
}

/// Value of the `--init` flag, if present.
fn init_arg() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--init" {
            return Some(args.next().unwrap_or_else(|| "all".to_string()));
        }
    }
    None
}

fn print_summary(league: &League) -> anyhow::Result<()> {
    let players = league.players()?;
    let names: HashMap<i64, &str> = players.iter().map(|p| (p.id, p.name.as_str())).collect();

    println!("== {} weeks ==", league.weeks()?.len());
    for week in league.weeks()? {
        let report = league.week_status(week.number)?;
        println!(
            "week {:>2}: {:<12} ({}/{} results)",
            week.number, report.status, report.done, report.total
        );
    }

    if let Some(current) = league.current_week()? {
        println!("current week: {}", current.number);
    }

    let totals = league.season_totals()?;
    if !totals.is_empty() {
        println!("== season standings ==");
        let mut rows: Vec<_> = totals.iter().collect();
        rows.sort_by_key(|(_, t)| std::cmp::Reverse(t.net));
        for (player_id, t) in rows {
            println!(
                "{:<12} for {:>3}  against {:>3}  net {:>+3}",
                display_name(&names, *player_id),
                t.points_for,
                t.points_against,
                t.net
            );
        }
    }
    Ok(())
}

fn display_name<'a>(names: &HashMap<i64, &'a str>, id: i64) -> &'a str {
    names.get(&id).copied().unwrap_or("(unknown)")
}

/// Initialize tracing to log to a file, keeping stdout for the summary.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("pickem.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pickem_engine=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
