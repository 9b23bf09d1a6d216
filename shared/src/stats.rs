//! Per-user match counters in a flat `key=value` file.
//!
//! Loaded once at startup, incremented and flushed after each completed
//! match. A single process owns the file; there is no locking.

use log::warn;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const STATS_FILE_NAME: &str = ".termpong_stats";

#[derive(Debug, Default)]
pub struct Stats {
    entries: BTreeMap<String, i64>,
    path: PathBuf,
}

impl Stats {
    /// Opens the stats file under the user's home directory, falling back to
    /// the working directory when `$HOME` is unset. A missing or unreadable
    /// file just means empty counters.
    pub fn open_default() -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::open(home.join(STATS_FILE_NAME))
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut stats = Stats {
            entries: BTreeMap::new(),
            path: path.into(),
        };
        if let Err(err) = stats.load() {
            if err.kind() != io::ErrorKind::NotFound {
                warn!("could not read stats file {:?}: {err}", stats.path);
            }
        }
        stats
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&mut self) -> io::Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        for line in contents.lines() {
            // Malformed lines are skipped, not fatal.
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let Ok(value) = value.trim().parse::<i64>() else {
                continue;
            };
            self.entries.insert(key.trim().to_string(), value);
        }
        Ok(())
    }

    pub fn save(&self) -> io::Result<()> {
        let mut contents = String::new();
        for (key, value) in &self.entries {
            contents.push_str(key);
            contents.push('=');
            contents.push_str(&value.to_string());
            contents.push('\n');
        }
        fs::write(&self.path, contents)
    }

    pub fn get(&self, key: &str) -> i64 {
        self.entries.get(key).copied().unwrap_or(0)
    }

    pub fn set(&mut self, key: &str, value: i64) {
        self.entries.insert(key.to_string(), value);
    }

    pub fn increment(&mut self, key: &str) {
        self.set(key, self.get(key) + 1);
    }

    /// Records one finished match and flushes to disk.
    pub fn record_game(&mut self, game: &str, won: bool) {
        self.increment(&format!("{game}_played"));
        if won {
            self.increment(&format!("{game}_won"));
        } else {
            self.increment(&format!("{game}_lost"));
        }
        if let Err(err) = self.save() {
            warn!("could not write stats file {:?}: {err}", self.path);
        }
    }

    /// `(played, won, lost)` for one game.
    pub fn summary(&self, game: &str) -> (i64, i64, i64) {
        (
            self.get(&format!("{game}_played")),
            self.get(&format!("{game}_won")),
            self.get(&format!("{game}_lost")),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("termpong_stats_test_{tag}_{}", std::process::id()));
        path
    }

    #[test]
    fn missing_file_means_empty_counters() {
        let stats = Stats::open(temp_path("missing"));
        assert!(stats.is_empty());
        assert_eq!(stats.get("pong_played"), 0);
    }

    #[test]
    fn record_game_roundtrips_through_the_file() {
        let path = temp_path("roundtrip");
        let _ = fs::remove_file(&path);

        let mut stats = Stats::open(&path);
        stats.record_game("pong", true);
        stats.record_game("pong", false);
        stats.record_game("pong", false);

        let reloaded = Stats::open(&path);
        assert_eq!(reloaded.summary("pong"), (3, 1, 2));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let path = temp_path("malformed");
        fs::write(&path, "pong_played=2\ngarbage\nnot=a-number\npong_won=1\n").unwrap();

        let stats = Stats::open(&path);
        assert_eq!(stats.get("pong_played"), 2);
        assert_eq!(stats.get("pong_won"), 1);
        assert_eq!(stats.get("not"), 0);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn increment_starts_from_zero() {
        let mut stats = Stats::open(temp_path("increment"));
        stats.increment("pong_played");
        stats.increment("pong_played");
        assert_eq!(stats.get("pong_played"), 2);
    }
}
