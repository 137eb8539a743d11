use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tourbreak::analysis::{
    AggregateReport, RepeatPatternReport, TourGapAnalyzer, recommendation_for,
};
use tourbreak::comparison::{GapComparison, MIN_TEST_OBSERVATIONS};
use tourbreak::config::AppConfig;
use tourbreak::db::Database;
use tourbreak::gaps::{ClassifiedGap, GapKind};
use tourbreak::penalty::PenaltyRecommendation;
use tourbreak::store::DateRange;
use tourbreak::tours::TourBreak;

#[derive(Parser)]
#[command(name = "tourbreak", version, about = "Tour-break gap analysis for jam-band setlists")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Restrict to a year, year range or date range
    /// (e.g. "2019", "2010-2024", "2019-06-01..2019-12-31")
    #[arg(long, global = true)]
    years: Option<String>,

    /// Tour break threshold in days (overrides config)
    #[arg(long, global = true)]
    threshold: Option<i64>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a Phish.net setlist JSON file into the database
    Import {
        /// Setlist JSON file (bare array or API response envelope)
        file: PathBuf,

        /// Keep entries from every artist, not just the configured one
        #[arg(long)]
        all_artists: bool,
    },

    /// Show record store statistics
    Stats,

    /// List tour breaks with the run lengths on each side
    Breaks {
        /// Only breaks longer than 30 days
        #[arg(long)]
        significant: bool,

        /// Number of results (longest first when set)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Intra-tour vs cross-tour gap comparison for one song
    Song {
        /// Song name (case-insensitive)
        name: String,
    },

    /// Rank songs by how strongly tour breaks change their gaps
    Songs {
        /// Minimum plays (defaults to config ranking_min_performances)
        #[arg(long)]
        min_performances: Option<usize>,

        /// Number of results
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Pool every qualifying song into one intra/cross comparison
    Aggregate {
        /// Minimum plays (defaults to config aggregate_min_performances)
        #[arg(long)]
        min_performances: Option<usize>,
    },

    /// Repeat probability after tour-start shows vs same-tour shows
    Repeats {
        /// Look-ahead window in shows (repeatable; defaults to config repeat_windows)
        #[arg(short, long)]
        window: Vec<usize>,
    },

    /// Recommended recency-penalty adjustment for cross-tour gaps
    Penalty,

    /// Full analysis: aggregate, repeat patterns, recommendation, top songs, deep dives
    Report,
}

/// `song` output.
#[derive(Serialize)]
struct SongDetail<'a> {
    comparison: &'a GapComparison,
    gaps: &'a [ClassifiedGap],
}

/// `report` output.
#[derive(Serialize)]
struct FullReport<'a> {
    range: DateRange,
    threshold_days: i64,
    shows: usize,
    songs: usize,
    tours: usize,
    tour_breaks: usize,
    aggregate: &'a AggregateReport,
    repeat_patterns: &'a [RepeatPatternReport],
    recommendation: &'a PenaltyRecommendation,
    top_songs: &'a [GapComparison],
    deep_dives: &'a [GapComparison],
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = AppConfig::load();

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.resolve_workers())
        .build_global()
        .context("Failed to configure worker pool")?;

    // Resolve database path: CLI > config > XDG default
    let db_path = cli
        .db_path
        .or(config.db_path.clone())
        .unwrap_or_else(tourbreak::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    let db = Database::open(&db_path).context("Failed to open database")?;

    let range = match cli.years.as_deref() {
        Some(y) => y.parse::<DateRange>().context("Invalid --years")?,
        None => DateRange::all(),
    };
    let threshold = cli
        .threshold
        .unwrap_or(config.analysis.break_threshold_days);
    let alpha = config.analysis.significance_level;

    let load = || -> Result<TourGapAnalyzer> {
        let analyzer = TourGapAnalyzer::load(&db, &range, threshold)
            .with_context(|| format!("Failed to load shows for {range}"))?
            .with_t_test(config.analysis.t_test)
            .with_aggregate_min(config.analysis.aggregate_min_performances);
        Ok(analyzer)
    };

    match cli.command {
        Commands::Import { file, all_artists } => {
            let opts = tourbreak::import::ImportOptions {
                artist_id: (!all_artists).then_some(config.import.artist_id),
            };
            let result = tourbreak::import::import_file(&db, &file, &opts)
                .context("Import failed")?;
            println!(
                "Import complete: {} entries, {} shows, {} performances, \
                 {} skipped (other artists)",
                result.entries, result.shows, result.performances, result.skipped_other_artists
            );
        }

        Commands::Stats => {
            let stats = db.stats().context("Failed to get stats")?;
            if cli.json {
                return print_json(&stats);
            }
            println!("Record Store Statistics");
            println!("=======================");
            println!("Shows:         {}", stats.shows);
            println!("Performances:  {}", stats.performances);
            println!("Songs:         {}", stats.songs);
            if let (Some(first), Some(last)) = (&stats.first_date, &stats.last_date) {
                println!("Date range:    {first} to {last}");
            }
            println!();

            if !stats.top_songs.is_empty() {
                println!("Most played:");
                for (song, count) in &stats.top_songs {
                    println!("  {:<30} {}", truncate(song, 30), count);
                }
            }
        }

        Commands::Breaks { significant, limit } => {
            let analyzer = load()?;
            let seg = analyzer.segmentation();
            let mut breaks: Vec<&TourBreak> = seg
                .breaks
                .iter()
                .filter(|b| !significant || b.is_significant())
                .collect();
            if let Some(n) = limit {
                breaks.sort_by(|a, b| b.days_between.cmp(&a.days_between));
                breaks.truncate(n);
            }

            if cli.json {
                return print_json(&breaks);
            }
            println!(
                "{} shows, {} tours, {} breaks (> {} days)",
                analyzer.catalog().shows().len(),
                seg.tours.len(),
                seg.breaks.len(),
                seg.threshold_days
            );
            println!();
            print_break_table(&breaks);
        }

        Commands::Song { name } => {
            let analyzer = load()?;
            let comparison = analyzer.analyze_song(&name);
            let gaps = analyzer.song_gaps(&name);

            if cli.json {
                return print_json(&SongDetail {
                    comparison: &comparison,
                    gaps: &gaps,
                });
            }
            if gaps.is_empty() {
                println!("Fewer than two performances of \"{name}\" in {range}.");
                return Ok(());
            }
            print_comparison(&comparison, alpha);
            println!();
            print_gap_list(&gaps);
        }

        Commands::Songs {
            min_performances,
            limit,
        } => {
            let analyzer = load()?;
            let min = min_performances.unwrap_or(config.analysis.ranking_min_performances);
            let ranked = analyzer.analyze_all_songs(min);
            let shown = &ranked[..ranked.len().min(limit)];

            if cli.json {
                return print_json(&shown);
            }
            if ranked.is_empty() {
                println!(
                    "No songs with >= {min} plays and >= {MIN_TEST_OBSERVATIONS} gaps \
                     on each side of a break."
                );
                return Ok(());
            }
            println!(
                "{} songs with >= {} plays, most affected by tour breaks:",
                ranked.len(),
                min
            );
            println!();
            print_ranking_table(shown, alpha);
        }

        Commands::Aggregate { min_performances } => {
            let analyzer = load()?;
            let min = min_performances.unwrap_or(config.analysis.aggregate_min_performances);
            let report = analyzer.aggregate_analysis(min);

            if cli.json {
                return print_json(&report);
            }
            print_aggregate(&report, alpha);
        }

        Commands::Repeats { window } => {
            let analyzer = load()?;
            let windows = if window.is_empty() {
                config.analysis.repeat_windows.clone()
            } else {
                window
            };
            let reports = windows
                .iter()
                .map(|&w| analyzer.analyze_repeat_patterns(w))
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("Repeat-pattern analysis failed")?;

            if cli.json {
                return print_json(&reports);
            }
            print_repeat_table(&reports, alpha);
        }

        Commands::Penalty => {
            let analyzer = load()?;
            let rec = analyzer.calculate_optimal_penalty_adjustment();
            if cli.json {
                return print_json(&rec);
            }
            print_recommendation(&rec);
        }

        Commands::Report => {
            let analyzer = load()?;
            let seg = analyzer.segmentation();
            let aggregate = analyzer.aggregate_analysis(config.analysis.aggregate_min_performances);
            let repeats = config
                .analysis
                .repeat_windows
                .iter()
                .map(|&w| analyzer.analyze_repeat_patterns(w))
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("Repeat-pattern analysis failed")?;
            let recommendation = recommendation_for(&aggregate);
            let ranked = analyzer.analyze_all_songs(config.analysis.ranking_min_performances);
            let top = &ranked[..ranked.len().min(20)];
            let deep_dives: Vec<GapComparison> = config
                .analysis
                .deep_dive_songs
                .iter()
                .map(|s| analyzer.analyze_song(s))
                .collect();

            if cli.json {
                return print_json(&FullReport {
                    range,
                    threshold_days: threshold,
                    shows: analyzer.catalog().shows().len(),
                    songs: analyzer.catalog().song_count(),
                    tours: seg.tours.len(),
                    tour_breaks: seg.breaks.len(),
                    aggregate: &aggregate,
                    repeat_patterns: &repeats,
                    recommendation: &recommendation,
                    top_songs: top,
                    deep_dives: &deep_dives,
                });
            }

            println!("Tour Break Analysis ({range})");
            println!("{}", "=".repeat(60));
            println!(
                "{} shows, {} songs, {} tours, {} breaks (> {} days)",
                analyzer.catalog().shows().len(),
                analyzer.catalog().song_count(),
                seg.tours.len(),
                seg.breaks.len(),
                threshold
            );
            println!();

            print_aggregate(&aggregate, alpha);
            println!();
            print_repeat_table(&repeats, alpha);
            println!();
            print_recommendation(&recommendation);
            println!();

            if !top.is_empty() {
                println!(
                    "Top {} songs (>= {} plays):",
                    top.len(),
                    config.analysis.ranking_min_performances
                );
                println!();
                print_ranking_table(top, alpha);
                println!();
            }

            for cmp in &deep_dives {
                println!("{}", "-".repeat(60));
                print_comparison(cmp, alpha);
                println!();
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

/// Truncate on a char boundary, marking the cut with "...".
fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let head: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

fn format_p(p: f64, tested: bool, alpha: f64) -> String {
    if !tested {
        "-".to_string()
    } else if p < alpha {
        format!("{p:.4}*")
    } else {
        format!("{p:.4}")
    }
}

fn print_break_table(breaks: &[&TourBreak]) {
    println!(
        "{:>10} {:>10} {:>6} {:>6} {:>6}",
        "Last show", "Next show", "Days", "Before", "After"
    );
    println!("{}", "-".repeat(44));

    for b in breaks {
        println!(
            "{:>10} {:>10} {:>6} {:>6} {:>6}",
            b.end_date.to_string(),
            b.start_date.to_string(),
            b.days_between,
            b.shows_in_previous_tour,
            b.shows_in_next_tour,
        );
    }

    println!();
    println!("Before/After = shows in the tour on each side of the break");
}

/// Print one song's descriptive statistics and test results.
fn print_comparison(cmp: &GapComparison, alpha: f64) {
    println!("{}", cmp.song);
    println!();
    println!(
        "{:<12} {:>5} {:>8} {:>8} {:>8}  {:>9} {:>9}",
        "Population", "N", "Mean", "Median", "Std", "Mean days", "Med days"
    );
    println!("{}", "-".repeat(73));
    for (label, s) in [("Intra-tour", &cmp.intra_stats), ("Cross-tour", &cmp.cross_stats)] {
        println!(
            "{:<12} {:>5} {:>8.2} {:>8.1} {:>8.2}  {:>9.1} {:>9.1}",
            label, s.shows.n, s.shows.mean, s.shows.median, s.shows.std, s.days.mean, s.days.median,
        );
    }
    println!();

    match cmp.gap_ratio() {
        Some(r) => println!("Gap ratio (cross / intra): {r:.2}x"),
        None => println!("Gap ratio (cross / intra): n/a"),
    }
    if cmp.was_tested() {
        println!(
            "Mann-Whitney U p = {}   t-test p = {}",
            format_p(cmp.mannwhitney_pvalue, true, alpha),
            format_p(cmp.ttest_pvalue, true, alpha)
        );
    } else {
        println!(
            "Not tested: each population needs >= {MIN_TEST_OBSERVATIONS} gaps (p reported as 1.0)"
        );
    }
}

fn print_gap_list(gaps: &[ClassifiedGap]) {
    println!(
        "{:>12} {:>12} {:<6} {:>6} {:>6} {:>6}",
        "From show", "To show", "Kind", "Shows", "Days", "Break"
    );
    println!("{}", "-".repeat(53));
    for g in gaps {
        let kind = match g.kind {
            GapKind::IntraTour => "intra",
            GapKind::CrossTour => "cross",
        };
        println!(
            "{:>12} {:>12} {:<6} {:>6} {:>6} {:>6}",
            g.from_show, g.to_show, kind, g.shows, g.days, g.break_days
        );
    }
}

fn print_ranking_table(comparisons: &[GapComparison], alpha: f64) {
    println!(
        "{:<25} {:>5} {:>5} {:>7} {:>7} {:>6} {:>8} {:>8}",
        "Song", "Intra", "Cross", "Intra x", "Cross x", "Ratio", "MW p", "t p"
    );
    println!("{}", "-".repeat(79));

    for c in comparisons {
        let ratio = c
            .gap_ratio()
            .map(|r| format!("{r:.2}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<25} {:>5} {:>5} {:>7.2} {:>7.2} {:>6} {:>8} {:>8}",
            truncate(&c.song, 25),
            c.intra_tour.len(),
            c.cross_tour.len(),
            c.intra_stats.shows.mean,
            c.cross_stats.shows.mean,
            ratio,
            format_p(c.mannwhitney_pvalue, c.was_tested(), alpha),
            format_p(c.ttest_pvalue, c.was_tested(), alpha),
        );
    }

    println!();
    println!("x = mean show gap   * = p < {alpha}");
}

fn print_aggregate(report: &AggregateReport, alpha: f64) {
    println!(
        "Aggregate over {} songs with >= {} plays ({} intra-tour, {} cross-tour gaps)",
        report.songs_analyzed,
        report.min_performances,
        report.intra_observations,
        report.cross_observations
    );
    println!();
    print_comparison(&report.pooled, alpha);
}

fn print_repeat_table(reports: &[RepeatPatternReport], alpha: f64) {
    println!(
        "{:>6} {:<11} {:>7} {:>7} {:>7} {:>8} {:>6}  {:>8}",
        "Window", "Origin", "Obs", "Repeats", "P(rep)", "Avg gap", "Trunc", "Chi2 p"
    );
    println!("{}", "-".repeat(70));

    for r in reports {
        let chi_p = r
            .chi_square
            .map(|c| format_p(c.p_value, true, alpha))
            .unwrap_or_else(|| "-".to_string());
        for (label, b, p) in [
            ("tour start", &r.tour_start, chi_p.as_str()),
            ("same tour", &r.same_tour, ""),
        ] {
            println!(
                "{:>6} {:<11} {:>7} {:>7} {:>7.3} {:>8.2} {:>6}  {:>8}",
                r.window_size,
                label,
                b.observations,
                b.repeats,
                b.repeat_probability,
                b.avg_gap_when_repeated,
                b.truncated_windows,
                p,
            );
        }
    }

    println!();
    println!("Trunc = windows cut short by the end of the data (right-censored)");
}

fn print_recommendation(rec: &PenaltyRecommendation) {
    println!("Penalty recommendation");
    println!("  Intra-tour mean gap:   {:.2} shows", rec.intra_tour_mean_gap);
    println!("  Cross-tour mean gap:   {:.2} shows", rec.cross_tour_mean_gap);
    println!("  Gap ratio:             {:.2}x", rec.gap_ratio);
    match rec.recommended_adjustment {
        Some(adj) if rec.is_actionable() => println!("  Adjustment:            {adj:.3}"),
        Some(adj) => println!("  Adjustment:            {adj:.3} (negligible)"),
        None => println!("  Adjustment:            n/a (no finite factor)"),
    }
    println!("  {}", rec.interpretation);
}
