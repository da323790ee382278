//! CLI definition and dispatch.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::{CsvBarAdapter, write_series};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::bar::{Bar, Field};
use crate::domain::calc::Calc;
use crate::domain::config::{session_from_config, window_settings_from_config};
use crate::domain::error::LookbackError;
use crate::domain::interval::{Interval, Period};
use crate::domain::session::Session;
use crate::domain::window::{Operator, WindowEngine};
use crate::ports::bar_port::BarPort;

#[derive(Parser, Debug)]
#[command(name = "lookback", about = "Trading-calendar intervals and rolling-window calcs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
pub struct SessionArgs {
    /// INI file with a [session] section
    #[arg(short, long)]
    pub config: PathBuf,
    /// Overrides the session interval
    #[arg(short, long)]
    pub interval: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List interval names with their nominal length in milliseconds
    Intervals,
    /// Latest interval boundary at or before an instant
    Floor {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long)]
        at: String,
    },
    /// Earliest interval boundary at or after an instant
    Ceil {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long)]
        at: String,
    },
    /// Advance whole intervals forward
    Inc {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long)]
        at: String,
        #[arg(short = 'n', long, allow_negative_numbers = true)]
        amount: i64,
    },
    /// Step whole intervals backward
    Dec {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long)]
        at: String,
        #[arg(short = 'n', long, allow_negative_numbers = true)]
        amount: i64,
    },
    /// Signed interval count between two instants
    Diff {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long)]
        to: String,
        #[arg(long)]
        from: String,
    },
    /// Evaluate OPERATOR(LENGTH, FIELD) at every bar and write ending,value CSV
    Calc {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        bars: PathBuf,
        #[arg(long)]
        operator: String,
        #[arg(short, long)]
        length: Option<f64>,
        #[arg(short, long, default_value = "close")]
        field: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Installs the stderr log subscriber, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Intervals => {
            run_intervals();
            Ok(())
        }
        Command::Floor { session, at } => {
            run_boundary(&session, &at, |period, t| period.floor(t))
        }
        Command::Ceil { session, at } => run_boundary(&session, &at, |period, t| period.ceil(t)),
        Command::Inc {
            session,
            at,
            amount,
        } => run_boundary(&session, &at, |period, t| period.inc(t, amount)),
        Command::Dec {
            session,
            at,
            amount,
        } => run_boundary(&session, &at, |period, t| period.dec(t, amount)),
        Command::Diff { session, to, from } => run_diff(&session, &to, &from),
        Command::Calc {
            config,
            bars,
            operator,
            length,
            field,
            output,
        } => run_calc(&config, &bars, &operator, length, &field, output.as_deref()),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(&err)
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, LookbackError> {
    FileConfigAdapter::from_file(path)
}

/// Loads the session, applying an `--interval` override.
pub fn load_session(args: &SessionArgs) -> Result<Session, LookbackError> {
    let adapter = load_config(&args.config)?;
    let session = session_from_config(&adapter)?;
    match &args.interval {
        Some(name) => Ok(session.with_interval(name.parse::<Interval>()?)),
        None => Ok(session),
    }
}

/// Reads an RFC 3339 instant, or a local `YYYY-MM-DD[THH:MM[:SS]]` reading
/// in the session timezone.
pub fn parse_instant(session: &Session, value: &str) -> Result<DateTime<Tz>, LookbackError> {
    let value = value.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(session.local(&t));
    }
    let naive = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .ok_or_else(|| {
            LookbackError::invalid_argument(
                "instant",
                format!("expected RFC 3339 or YYYY-MM-DD[THH:MM[:SS]], not {value:?}"),
            )
        })?;
    session.resolve(naive)
}

fn run_intervals() {
    for interval in Interval::ALL {
        println!("{}\t{}", interval.value(), interval.millis());
    }
}

fn run_boundary<F>(args: &SessionArgs, at: &str, op: F) -> Result<(), LookbackError>
where
    F: Fn(&Period<'_>, &DateTime<Tz>) -> Result<DateTime<Tz>, LookbackError>,
{
    let session = load_session(args)?;
    let t = parse_instant(&session, at)?;
    let result = op(&Period::new(&session), &t)?;
    println!("{}", result.to_rfc3339());
    Ok(())
}

fn run_diff(args: &SessionArgs, to: &str, from: &str) -> Result<(), LookbackError> {
    let session = load_session(args)?;
    let to = parse_instant(&session, to)?;
    let from = parse_instant(&session, from)?;
    println!("{}", Period::new(&session).diff(&to, &from)?);
    Ok(())
}

fn run_calc(
    config_path: &Path,
    bars_path: &Path,
    operator: &str,
    length: Option<f64>,
    field: &str,
    output: Option<&Path>,
) -> Result<(), LookbackError> {
    let adapter = load_config(config_path)?;
    let session = session_from_config(&adapter)?;
    let settings = window_settings_from_config(&adapter)?;
    let engine = WindowEngine::with_settings(session, settings)?;

    let operator: Operator = operator.parse()?;
    let field: Field = field.parse()?;
    let calc = engine.apply(operator, length, &Calc::field(field))?;
    tracing::info!(%operator, warm_up = %calc.warm_up(), fields = ?calc.fields(), "built calc");

    let bars = CsvBarAdapter::new(bars_path.to_path_buf()).load_bars()?;
    let rows = rolling(&calc, &bars)?;

    match output {
        Some(path) => write_series(File::create(path)?, &rows),
        None => write_series(io::stdout().lock(), &rows),
    }
}

/// Evaluates `calc` as of every bar, supplying at most its warm-up window.
pub fn rolling(calc: &Calc, bars: &[Bar]) -> Result<Vec<(DateTime<chrono::FixedOffset>, f64)>, LookbackError> {
    let window = calc.warm_up().window();
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let start = (i + 1).saturating_sub(window);
            Ok((bar.ending, calc.eval(&bars[start..=i])?))
        })
        .collect()
}
