//! Streams a `timestamp,value` CSV file through an anomaly detector.
//!
//! The input uses the NAB layout: a header line, then one record per line
//! with `%Y-%m-%d %H:%M:%S` timestamps. Scores are written to stdout as
//! `timestamp,value,anomaly_score,raw_score`.
//!
//! Usage:
//!   htm-detect data/art_daily_jumpsup.csv --params params.json
//!
//! Logging is controlled by `RUST_LOG`, e.g. `RUST_LOG=htm_anomaly=debug`.

use clap::Parser;
use htm_anomaly::detector::{create_detector, Backend, DetectorConfig, StreamProfile};
use htm_anomaly::HtmError;

use chrono::NaiveDateTime;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;
use tracing::info;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Parser, Debug)]
#[command(name = "htm-detect")]
#[command(about = "Score a time series with an HTM anomaly detector")]
struct Args {
    /// CSV file with a header and `timestamp,value` records
    input: PathBuf,

    /// Detector parameters as JSON (defaults to the built-in set)
    #[arg(long)]
    params: Option<PathBuf>,

    /// Share of the stream used as probationary period (overrides the parameters)
    #[arg(long)]
    probationary_pct: Option<f64>,

    /// Base URL of a remote detector service to forward records to
    #[cfg(feature = "remote")]
    #[arg(long)]
    remote: Option<String>,
}

fn column_index(headers: &csv::StringRecord, name: &str, fallback: usize) -> usize {
    headers
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case(name))
        .unwrap_or(fallback)
}

fn field<'r>(record: &'r csv::StringRecord, col: usize, name: &str, line: u64) -> Result<&'r str, HtmError> {
    record
        .get(col)
        .map(str::trim)
        .ok_or_else(|| HtmError::InvalidInput(format!("line {line}: missing {name} column")))
}

fn parse_records<R: Read>(reader: R) -> Result<Vec<(NaiveDateTime, f64)>, HtmError> {
    let mut rdr = csv::Reader::from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| HtmError::InvalidInput(format!("failed to read CSV header: {e}")))?
        .clone();
    let timestamp_col = column_index(&headers, "timestamp", 0);
    let value_col = column_index(&headers, "value", 1);

    let mut records = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| HtmError::InvalidInput(format!("CSV error: {e}")))?;
        let line = record.position().map_or(0, csv::Position::line);

        let timestamp = field(&record, timestamp_col, "timestamp", line)?;
        let timestamp = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
            .map_err(|e| HtmError::InvalidInput(format!("line {line}: {e}")))?;
        let value: f64 = field(&record, value_col, "value", line)?
            .parse()
            .map_err(|e| HtmError::InvalidInput(format!("line {line}: {e}")))?;

        records.push((timestamp, value));
    }

    Ok(records)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "htm_anomaly=info,htm_detect=info".into()),
        )
        .init();

    let args = Args::parse();

    let config = match &args.params {
        Some(path) => DetectorConfig::from_json_file(path)?,
        None => DetectorConfig::default(),
    };

    let records = parse_records(File::open(&args.input)?)?;
    let (input_min, input_max) = records
        .iter()
        .filter(|(_, value)| value.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, value)| {
            (lo.min(value), hi.max(value))
        });
    if input_min > input_max {
        return Err(HtmError::InvalidInput(format!(
            "{} holds no finite values",
            args.input.display()
        ))
        .into());
    }

    let pct = args
        .probationary_pct
        .unwrap_or(config.anomaly.likelihood.probationary_pct);
    let profile = StreamProfile::for_stream_length(input_min, input_max, records.len(), pct);
    info!(
        records = records.len(),
        input_min,
        input_max,
        probationary_period = profile.probationary_period,
        "Loaded stream"
    );

    #[cfg(feature = "remote")]
    let backend = match args.remote {
        Some(url) => Backend::Remote { url },
        None => Backend::InProcess,
    };
    #[cfg(not(feature = "remote"))]
    let backend = Backend::InProcess;

    let mut detector = create_detector(&config, profile, &backend)?;

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    writeln!(out, "timestamp,value,anomaly_score,raw_score")?;

    for (timestamp, value) in records {
        match detector.process(timestamp, value) {
            Ok(scores) => writeln!(
                out,
                "{},{},{},{}",
                timestamp.format(TIMESTAMP_FORMAT),
                value,
                scores.anomaly_score,
                scores.raw_score
            )?,
            // Skipped; the detector already logged it.
            Err(HtmError::InvalidInput(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    out.flush()?;
    Ok(())
}
