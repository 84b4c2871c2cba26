use std::env;
use std::fs::File;
use std::str::FromStr;

use anyhow::{anyhow, Context};
use time::{
    format_description::{self, parse},
    OffsetDateTime,
};
use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, FmtSubscriber};

const LEVEL_VAR: &str = "ARENA_LOG_LEVEL";

/// Install the global tracing subscriber.
///
/// With `to_file`, logs go to a timestamped file in the working directory, otherwise
/// to stdout. The level is read from `ARENA_LOG_LEVEL` (default `INFO`).
pub fn init_logger(to_file: bool) -> anyhow::Result<()> {
    let writer = if to_file {
        let file_name = get_log_file_name()?;
        let file = File::create(&file_name)
            .with_context(|| format!("could not create log file '{file_name}'"))?;
        BoxMakeWriter::new(file)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };
    let local_offset =
        time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        local_offset,
        format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")?,
    );

    let subscriber = FmtSubscriber::builder()
        .with_max_level(max_level())
        .with_ansi(!to_file)
        .with_timer(timer)
        .with_writer(writer)
        .finish();

    set_global_default(subscriber).map_err(|e| {
        anyhow!("could not set global default tracing subscriber ({e}), consider disabling logs if you are already setting a subscriber")
    })
}

fn max_level() -> Level {
    env::var(LEVEL_VAR)
        .ok()
        .and_then(|level| Level::from_str(&level).ok())
        .unwrap_or(Level::INFO)
}

fn get_log_file_name() -> anyhow::Result<String> {
    let format = parse("[year]-[month]-[day]_[hour]:[minute]:[second]_arena_log.txt")?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    Ok(now.format(&format)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name() {
        let name = get_log_file_name().unwrap();
        assert!(name.ends_with("_arena_log.txt"));
        assert_eq!(name.len(), "2025-01-01_00:00:00_arena_log.txt".len());
    }
}
