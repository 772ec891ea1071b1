use anyhow::Result;
use env_logger::Builder;
use log::{Level, LevelFilter, Record};
use std::io::Write;

/// Width of the module column; keeps messages aligned across modules.
const MODULE_WIDTH: usize = 10;

/// Set up `log` output. `RUST_LOG` still overrides the level picked by `verbose`.
pub fn init(verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(format_log)
        .try_init()?;

    Ok(())
}

fn format_log(buf: &mut env_logger::fmt::Formatter, record: &Record) -> std::io::Result<()> {
    let time = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");

    writeln!(
        buf,
        "{} {} [{:>width$}] {}",
        time,
        level_label(record.level()),
        short_target(record.target()),
        record.args(),
        width = MODULE_WIDTH
    )
}

/// `procprio::service::tracker` -> `tracker`
fn short_target(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

fn level_label(level: Level) -> &'static str {
    match level {
        Level::Error => "\x1b[31mERROR\x1b[0m",
        Level::Warn => "\x1b[33mWARN \x1b[0m",
        Level::Info => "\x1b[32mINFO \x1b[0m",
        Level::Debug => "\x1b[36mDEBUG\x1b[0m",
        Level::Trace => "\x1b[35mTRACE\x1b[0m",
    }
}
