mod calendar;
mod config;
mod database;
mod engine;
mod feed;
mod indicators;
mod optimizer;
mod risk;
mod strategies;
mod types;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::calendar::MarketCalendar;
use crate::config::AuroraConfig;
use crate::database::Repository;
use crate::engine::{Backtester, Grader, Scheduler};
use crate::feed::{MarketFeed, VendorClient};
use crate::optimizer::Optimizer;
use crate::strategies::{MarketView, SignalFuser};
use crate::types::{Interval, Weights};

#[derive(Parser)]
#[command(name = "aurora")]
#[command(version = "0.1.0")]
#[command(about = "Periodic self-improving intraday options signal engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (TOML, optional)
    #[arg(short, long, default_value = "aurora.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the signal daemon (scheduler + grader + optimizer)
    Daemon,
    /// Replay stored candles through the scoring stack
    Backtest {
        /// Ticker to replay
        #[arg(short, long)]
        ticker: String,
        /// Start date (YYYY-MM-DD)
        #[arg(short, long)]
        start: String,
        /// End date (YYYY-MM-DD)
        #[arg(short, long)]
        end: String,
    },
    /// One-shot evaluation of the current market for a ticker
    Analyze {
        #[arg(short, long)]
        ticker: Option<String>,
    },
    /// Force an evolution pass for a ticker regardless of the win-rate floor
    Evolve {
        #[arg(short, long)]
        ticker: String,
    },
    /// Rolling win-rate, degradation and recent outcomes for a ticker
    Stats {
        #[arg(short, long)]
        ticker: Option<String>,
    },
    /// Print the current market session and clock position
    Session,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let config = Arc::new(AuroraConfig::load(Some(&cli.config))?);

    match cli.command {
        Commands::Daemon => run_daemon(config).await,
        Commands::Backtest { ticker, start, end } => run_backtest(config, &ticker, &start, &end).await,
        Commands::Analyze { ticker } => run_analyze(config, ticker).await,
        Commands::Evolve { ticker } => run_evolve(config, &ticker).await,
        Commands::Stats { ticker } => run_stats(config, ticker).await,
        Commands::Session => {
            let calendar = MarketCalendar::default();
            let now = Utc::now();
            println!("Session: {}", calendar.session_at(now));
            if let Some(m) = calendar.minutes_since_open(now) {
                println!("Minutes since open: {m}");
            }
            if let Some(m) = calendar.minutes_to_close(now) {
                println!("Minutes to close: {m}");
            }
            let today = calendar.market_date(now);
            println!("Next trading day: {}", calendar.add_trading_days(today, 1));
            Ok(())
        }
    }
}

async fn run_daemon(config: Arc<AuroraConfig>) -> Result<()> {
    info!("aurora daemon starting");

    let repo = Arc::new(Repository::new(&config.database_url).await?);
    let feed: Arc<dyn MarketFeed> = Arc::new(VendorClient::new(
        config.vendor.api_base.clone(),
        config.vendor.token.clone(),
        config.scheduler.feed_timeout_secs,
    ));
    let fuser = Arc::new(SignalFuser::new(Arc::clone(&repo), Arc::clone(&config)));
    let optimizer = Arc::new(Optimizer::new(
        Arc::clone(&repo),
        Arc::clone(&fuser),
        Arc::clone(&config),
    ));
    let grader = Arc::new(Grader::new(
        Arc::clone(&repo),
        optimizer,
        Arc::clone(&config),
    ));
    let scheduler = Scheduler::new(
        feed,
        repo,
        fuser,
        grader,
        MarketCalendar::default(),
        Arc::clone(&config),
    );

    scheduler.start().await?;
    info!("daemon running, press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    scheduler.stop().await;
    Ok(())
}

async fn run_backtest(config: Arc<AuroraConfig>, ticker: &str, start: &str, end: &str) -> Result<()> {
    let start_date = parse_date(start)?;
    let end_date = parse_date(end)?;
    if end_date <= start_date {
        return Err(anyhow!("end date must be after start date"));
    }

    let repo = Arc::new(Repository::new(&config.database_url).await?);
    let start_ts = Utc
        .from_utc_datetime(&start_date.and_hms_opt(0, 0, 0).expect("midnight"));
    let end_ts = Utc
        .from_utc_datetime(&end_date.and_hms_opt(23, 59, 59).expect("end of day"));

    let weights = match repo.get_active_weights(ticker).await? {
        Some((weights, _)) => weights,
        None => Weights::default(),
    };

    let backtester = Backtester::new(repo, Arc::clone(&config));
    let summary = backtester.run(ticker, start_ts, end_ts, &weights).await?;

    println!("\n=== Backtest: {ticker} {start} .. {end} ===");
    println!("Trades:        {}", summary.total_trades);
    println!("Win rate:      {:.1}%", summary.win_rate * 100.0);
    println!("Profit factor: {:.2}", summary.profit_factor);
    println!("Max drawdown:  {:.2}", summary.max_drawdown);
    println!("Total P&L:     {:.2}", summary.total_pnl);
    Ok(())
}

async fn run_analyze(config: Arc<AuroraConfig>, ticker: Option<String>) -> Result<()> {
    let ticker = ticker.unwrap_or_else(|| config.tickers.primary.clone());
    if !config.has_vendor_credentials() {
        return Err(anyhow!("vendor credentials are not configured"));
    }

    let repo = Arc::new(Repository::new(&config.database_url).await?);
    let feed = VendorClient::new(
        config.vendor.api_base.clone(),
        config.vendor.token.clone(),
        config.scheduler.feed_timeout_secs,
    );
    let fuser = SignalFuser::new(Arc::clone(&repo), Arc::clone(&config));
    let calendar = MarketCalendar::default();
    let session = calendar.session_now();

    println!("\n=== {ticker} ({session}) ===");
    let Some(quote) = feed.quote(&ticker).await else {
        warn!(ticker, "no quote available");
        return Ok(());
    };
    println!("Last: {:.2}  Bid: {:.2}  Ask: {:.2}", quote.last, quote.bid, quote.ask);

    let candles = feed.intraday_candles(&ticker, Interval::M1).await;

    let snapshot = indicators::TechnicalSnapshot::from_candles(&candles);
    let fmt_opt = |v: Option<f64>| v.map(|x| format!("{x:.2}")).unwrap_or_else(|| "-".to_string());
    println!(
        "RSI14 {}  RSI5 {}  SMA9 {}  SMA20 {}",
        fmt_opt(snapshot.rsi14),
        fmt_opt(snapshot.rsi5),
        fmt_opt(snapshot.sma9),
        fmt_opt(snapshot.sma20)
    );
    println!(
        "VWAP {}  Bollinger [{}, {}]  ATR {}",
        fmt_opt(snapshot.vwap),
        fmt_opt(snapshot.boll_lower),
        fmt_opt(snapshot.boll_upper),
        fmt_opt(snapshot.atr)
    );
    if let Some(profile) = indicators::build_tpo_profile(
        &candles,
        config.market.tick_size,
        config.market.value_area_fraction,
    ) {
        println!(
            "TPO: poc {:.2}  value area [{:.2}, {:.2}]  coverage {:.0}%  range {:.2}  impulse {}",
            profile.poc,
            profile.val,
            profile.vah,
            100.0 * profile.value_area_mass() / profile.total_mass,
            profile.range,
            profile.impulse.as_str()
        );
    }
    if let Some(ib) = indicators::initial_balance(&candles, config.market.ib_duration_minutes) {
        println!(
            "IB: [{:.2}, {:.2}]  width {:.2}  opening type {}",
            ib.ib_low,
            ib.ib_high,
            ib.width(),
            ib.opening_type.as_str()
        );
    }
    if let Some(cvd) = indicators::cumulative_volume_delta(&candles) {
        println!(
            "CVD: {:.0}  divergence {}",
            cvd.cumulative,
            if cvd.divergence { "yes" } else { "no" }
        );
    }

    let view = MarketView::new(quote.last, candles);
    match fuser.evaluate(&ticker, session, &view).await {
        Some(candidate) => {
            println!("Signal:     {} {}", candidate.direction, candidate.engine);
            println!("Confidence: {:.0}%", candidate.confidence);
            println!("Strike:     {:.1}", candidate.strike);
            println!(
                "Stock plan: entry {:.2} / stop {:.2} / target {:.2}",
                candidate.stock_levels.entry,
                candidate.stock_levels.stop,
                candidate.stock_levels.target
            );
            println!("Reasoning:  {}", candidate.reasoning.summary());
        }
        None => println!("No signal this session"),
    }
    Ok(())
}

async fn run_evolve(config: Arc<AuroraConfig>, ticker: &str) -> Result<()> {
    let repo = Arc::new(Repository::new(&config.database_url).await?);
    let fuser = Arc::new(SignalFuser::new(Arc::clone(&repo), Arc::clone(&config)));

    let history = repo.outcomes_joined(Some(ticker), None).await?;
    let stats = optimizer::OutcomeStats::from_history(&history);
    info!(
        ticker,
        graded = stats.graded,
        win_rate = stats.win_rate(),
        "running forced evolution"
    );

    let evolution = optimizer::Evolution::new(config.ga.clone());
    let alpha = evolution.evolve(&stats, &mut rand::thread_rng());
    repo.upsert_active_weights(ticker, &alpha, stats.win_rate(), "manual evolution run")
        .await?;
    fuser.invalidate(ticker).await;

    println!("Activated weights for {ticker}: {}", serde_json::to_string_pretty(&alpha)?);
    Ok(())
}

async fn run_stats(config: Arc<AuroraConfig>, ticker: Option<String>) -> Result<()> {
    let ticker = ticker.unwrap_or_else(|| config.tickers.primary.clone());
    let repo = Arc::new(Repository::new(&config.database_url).await?);
    let fuser = Arc::new(SignalFuser::new(Arc::clone(&repo), Arc::clone(&config)));
    let optimizer = Arc::new(Optimizer::new(
        Arc::clone(&repo),
        fuser,
        Arc::clone(&config),
    ));
    let grader = Grader::new(Arc::clone(&repo), optimizer, Arc::clone(&config));

    let stats = grader
        .win_rate(&ticker, config.signals.rolling_window_days)
        .await?;
    println!("\n=== {ticker} stats, last {} days ===", config.signals.rolling_window_days);
    println!(
        "Graded: {}  Wins: {}  Losses: {}  Rate: {:.1}%",
        stats.graded,
        stats.wins,
        stats.losses,
        stats.rate * 100.0
    );

    let report = grader.degradation(&ticker).await?;
    println!(
        "Degradation: {:.2} (previous {:.1}% -> recent {:.1}%){}",
        report.degradation,
        report.previous_rate * 100.0,
        report.recent_rate * 100.0,
        if report.alert { "  ALERT" } else { "" }
    );
    println!(
        "Weight updates on record: {}",
        repo.weights_delta_count(&ticker).await?
    );

    let recent = repo.recent_predictions(Some(&ticker), 10).await?;
    if !recent.is_empty() {
        println!("\nRecent predictions:");
        for p in &recent {
            println!(
                "  {}  {}  {}  {:.0}%  strike {:.1}  {}  [{}]",
                p.generated_at.format("%m-%d %H:%M"),
                p.direction,
                p.engine,
                p.confidence,
                p.strike,
                p.status.as_str(),
                &p.id[..8]
            );
        }
    }

    let graded = repo
        .outcomes_joined(Some(&ticker), Some(Utc::now() - chrono::Duration::days(config.signals.rolling_window_days)))
        .await?;
    if !graded.is_empty() {
        println!("\nRecent outcomes:");
        for g in &graded {
            println!(
                "  {} -> {}  {}  {}  {}  conf {:.0}%  pnl {:+.2}  [{}]",
                g.generated_at.format("%m-%d %H:%M"),
                g.closed_at.format("%H:%M"),
                g.ticker,
                g.direction,
                g.result.as_str(),
                g.confidence,
                g.actual_pnl,
                &g.prediction_id[..8]
            );
        }
    }
    Ok(())
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| anyhow!("invalid date (use YYYY-MM-DD): {s}"))
}
