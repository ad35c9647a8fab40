//! Per-prefix leveled logging.
//!
//! Components log through the `log` facade with short targets (`hook`,
//! `proxy_chain`, `feature`, `dom`, `net`, `url_filter`). [`PrefixLogger`]
//! gates each record by the most specific configured prefix of its target.

use std::collections::HashMap;
use std::str::FromStr;

use log::{LevelFilter, Log, Metadata, Record};

use crate::config::{ConfigStore, LOG_LEVELS_KEY};

/// `log` backend with a level per target prefix, writing to stderr.
#[derive(Debug, Clone)]
pub struct PrefixLogger {
    default: LevelFilter,
    /// Sorted longest prefix first.
    levels: Vec<(String, LevelFilter)>,
}

impl PrefixLogger {
    pub fn new(default: LevelFilter) -> Self {
        Self {
            default,
            levels: Vec::new(),
        }
    }

    /// Set the level for targets starting with `prefix`.
    pub fn with_level(mut self, prefix: impl Into<String>, level: LevelFilter) -> Self {
        let prefix = prefix.into();
        self.levels.retain(|(p, _)| *p != prefix);
        self.levels.push((prefix, level));
        self.levels.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    /// Read levels from the `log.levels` settings object. Unknown level names
    /// are skipped.
    pub fn from_store(store: &dyn ConfigStore, default: LevelFilter) -> Self {
        let mut logger = Self::new(default);
        let Some(raw) = store.get(LOG_LEVELS_KEY) else {
            return logger;
        };
        let levels: HashMap<String, String> = match serde_json::from_value(raw) {
            Ok(levels) => levels,
            Err(e) => {
                eprintln!("ignoring malformed {LOG_LEVELS_KEY}: {e}");
                return logger;
            }
        };
        for (prefix, name) in levels {
            match LevelFilter::from_str(&name) {
                Ok(level) => logger = logger.with_level(prefix, level),
                Err(_) => eprintln!("ignoring unknown log level '{name}' for '{prefix}'"),
            }
        }
        logger
    }

    pub fn level_for(&self, target: &str) -> LevelFilter {
        self.levels
            .iter()
            .find(|(prefix, _)| target.starts_with(prefix.as_str()))
            .map(|(_, level)| *level)
            .unwrap_or(self.default)
    }

    fn max_level(&self) -> LevelFilter {
        self.levels
            .iter()
            .map(|(_, level)| *level)
            .fold(self.default, std::cmp::max)
    }

    /// Install as the global `log` backend.
    pub fn install(self) -> Result<(), log::SetLoggerError> {
        let max = self.max_level();
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(max);
        Ok(())
    }
}

impl Log for PrefixLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level_for(metadata.target())
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("[{} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}
