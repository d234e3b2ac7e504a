// Console + file logging via log4rs.
use std::path::Path;

use anyhow::{Context, Result};
use log::LevelFilter;
use log4rs::{
    append::{console::ConsoleAppender, file::FileAppender},
    config::{Appender, Config, Logger, Root},
    encode::pattern::PatternEncoder,
};

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} [{l}] {m}{n}";

/// Root logger writes to stdout and appends to `log_file`; HTTP plumbing is capped at WARN.
pub fn build_config(log_file: &Path, level: LevelFilter) -> Result<Config> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();
    let file = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .append(true)
        .build(log_file)
        .with_context(|| format!("cannot open log file {}", log_file.display()))?;

    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .appender(Appender::builder().build("file", Box::new(file)))
        .logger(Logger::builder().build("hyper", LevelFilter::Warn))
        .logger(Logger::builder().build("tower_http", LevelFilter::Warn))
        .build(Root::builder().appender("stdout").appender("file").build(level))?;
    Ok(config)
}

pub fn init(log_file: &Path, level: LevelFilter) -> Result<()> {
    log4rs::init_config(build_config(log_file, level)?)?;
    Ok(())
}
