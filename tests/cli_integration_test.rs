//! CLI integration tests for the calendar and calc commands.
//!
//! Tests cover:
//! - Session loading from INI files on disk, with interval override
//! - Instant parsing in the session timezone
//! - The calc command end to end, from a bar CSV to a value CSV
//! - Error reporting for bad operators and missing files

mod common;

use clap::Parser;
use common::*;
use lookback::cli::{self, Cli, SessionArgs};
use lookback::domain::error::LookbackError;
use lookback::domain::interval::{Interval, Period};
use std::fs;
use std::process::ExitCode;

const BARS: &str = "ending,open,high,low,close,volume
2024-01-03T09:31:00-05:00,10,11,9,10,100
2024-01-03T09:32:00-05:00,20,21,19,20,100
2024-01-03T09:33:00-05:00,30,31,29,30,100
2024-01-03T09:34:00-05:00,40,41,39,40,100
";

fn succeeded(code: ExitCode) -> bool {
    format!("{code:?}") == format!("{:?}", ExitCode::SUCCESS)
}

mod session_loading {
    use super::*;

    #[test]
    fn loads_session_from_disk() {
        let ini = write_temp(NEW_YORK_INI);
        let session = cli::load_session(&SessionArgs {
            config: ini.path().to_path_buf(),
            interval: None,
        })
        .unwrap();
        assert_eq!(session.interval(), Interval::M1);
        assert_eq!(session.tz(), chrono_tz::America::New_York);
    }

    #[test]
    fn interval_override_wins() {
        let ini = write_temp(NEW_YORK_INI);
        let session = cli::load_session(&SessionArgs {
            config: ini.path().to_path_buf(),
            interval: Some("week".to_string()),
        })
        .unwrap();
        assert_eq!(session.interval(), Interval::Week);
    }

    #[test]
    fn bad_interval_override_is_rejected() {
        let ini = write_temp(NEW_YORK_INI);
        let result = cli::load_session(&SessionArgs {
            config: ini.path().to_path_buf(),
            interval: Some("fortnight".to_string()),
        });
        assert!(matches!(result, Err(LookbackError::UnknownInterval { .. })));
    }

    #[test]
    fn missing_key_is_reported() {
        let ini = write_temp("[session]\ninterval = m1\ntz = UTC\n");
        let result = cli::load_session(&SessionArgs {
            config: ini.path().to_path_buf(),
            interval: None,
        });
        assert!(matches!(result, Err(LookbackError::ConfigMissing { .. })));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = cli::load_config(&dir.path().join("absent.ini"));
        assert!(matches!(result, Err(LookbackError::ConfigParse { .. })));
    }
}

mod instants {
    use super::*;

    #[test]
    fn local_and_utc_readings_agree() {
        let session = new_york("m1");
        let a = cli::parse_instant(&session, "2024-01-05 15:59").unwrap();
        let b = cli::parse_instant(&session, "2024-01-05T20:59:00Z").unwrap();
        assert_eq!(a, b);
        let monday = Period::new(&session).inc(&a, 2).unwrap();
        assert_eq!(monday.to_rfc3339(), "2024-01-08T09:31:00-05:00");
    }
}

mod calc_command {
    use super::*;

    #[test]
    fn writes_rolling_sma() {
        let ini = write_temp(NEW_YORK_INI);
        let bars = write_temp(BARS);
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("sma.csv");

        let cli = Cli::parse_from([
            "lookback",
            "calc",
            "--config",
            ini.path().to_str().unwrap(),
            "--bars",
            bars.path().to_str().unwrap(),
            "--operator",
            "sma",
            "--length",
            "2",
            "--output",
            out.to_str().unwrap(),
        ]);
        assert!(succeeded(cli::run(cli)));

        let text = fs::read_to_string(&out).unwrap();
        assert_eq!(
            text,
            "ending,value\n\
             2024-01-03T09:31:00-05:00,10\n\
             2024-01-03T09:32:00-05:00,15\n\
             2024-01-03T09:33:00-05:00,25\n\
             2024-01-03T09:34:00-05:00,35\n"
        );
    }

    #[test]
    fn highest_of_the_high_field() {
        let ini = write_temp(NEW_YORK_INI);
        let bars = write_temp(BARS);
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("highest.csv");

        let cli = Cli::parse_from([
            "lookback",
            "calc",
            "-c",
            ini.path().to_str().unwrap(),
            "-b",
            bars.path().to_str().unwrap(),
            "--operator",
            "HIGHEST",
            "-l",
            "3",
            "-f",
            "high",
            "-o",
            out.to_str().unwrap(),
        ]);
        assert!(succeeded(cli::run(cli)));

        let text = fs::read_to_string(&out).unwrap();
        let last = text.lines().last().unwrap();
        assert_eq!(last, "2024-01-03T09:34:00-05:00,41");
    }

    #[test]
    fn unknown_operator_fails_without_output() {
        let ini = write_temp(NEW_YORK_INI);
        let bars = write_temp(BARS);
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("none.csv");

        let cli = Cli::parse_from([
            "lookback",
            "calc",
            "-c",
            ini.path().to_str().unwrap(),
            "-b",
            bars.path().to_str().unwrap(),
            "--operator",
            "MEDIAN",
            "-l",
            "3",
            "-o",
            out.to_str().unwrap(),
        ]);
        assert!(!succeeded(cli::run(cli)));
        assert!(!out.exists());
    }

    #[test]
    fn missing_bars_file_fails() {
        let ini = write_temp(NEW_YORK_INI);
        let dir = tempfile::TempDir::new().unwrap();

        let cli = Cli::parse_from([
            "lookback",
            "calc",
            "-c",
            ini.path().to_str().unwrap(),
            "-b",
            dir.path().join("absent.csv").to_str().unwrap(),
            "--operator",
            "SMA",
            "-l",
            "3",
            "-o",
            dir.path().join("out.csv").to_str().unwrap(),
        ]);
        assert!(!succeeded(cli::run(cli)));
    }

    #[test]
    fn calendar_commands_parse() {
        let cli = Cli::parse_from([
            "lookback", "inc", "-c", "session.ini", "--at", "2024-01-05T15:59", "-n", "2",
        ]);
        assert!(matches!(cli.command, cli::Command::Inc { amount: 2, .. }));
    }
}
