use log::LevelFilter;
use log4rs::{
  append::console::ConsoleAppender,
  config::{Appender, Root},
  encode::pattern::PatternEncoder,
  Config,
};

/// Console logging, level taken from `LOG_LEVEL` (default `info`).
pub fn initialize() -> log4rs::Handle {
  let level = std::env::var("LOG_LEVEL")
    .ok()
    .and_then(|value| parse_level_filter(&value))
    .unwrap_or(LevelFilter::Info);

  let stdout = ConsoleAppender::builder()
    .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S)} {h({l:<5})} {m}{n}")))
    .build();
  let config = Config::builder()
    .appender(Appender::builder().build("stdout", Box::new(stdout)))
    .build(Root::builder().appender("stdout").build(level))
    .unwrap();

  log4rs::init_config(config).expect("Initializing logging should not fail")
}

fn parse_level_filter(value: &str) -> Option<LevelFilter> {
  match value.to_lowercase().as_str() {
    "off" => Some(LevelFilter::Off),
    "error" => Some(LevelFilter::Error),
    "warn" => Some(LevelFilter::Warn),
    "info" => Some(LevelFilter::Info),
    "debug" => Some(LevelFilter::Debug),
    "trace" => Some(LevelFilter::Trace),
    _ => None,
  }
}
