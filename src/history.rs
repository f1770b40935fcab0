//! Persisting solved problems.
//!
//! Storage goes through a small key/value trait so the solve pipeline does
//! not care whether history lives in a file or in memory. The store keeps a
//! single JSON document per key.

use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::{Arc, RwLock},
};

use serde::Serialize;

use crate::{
    decode::{Difficulty, ProblemType},
    prelude::*,
    solve::ProblemSolution,
};

/// The key all history lives under.
const HISTORY_KEY: &str = "math_solver_history";

/// The most recent entries kept; older ones are dropped on save.
const HISTORY_CAP: usize = 100;

/// Keyed JSON storage.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store, for tests and one-shot use.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

/// File-backed store: one JSON object mapping keys to serialized values.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn load(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("corrupt store file {}", self.path.display()))
    }

    fn save(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create {}", parent.display())
                })?;
            }
        }
        let raw = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, raw)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.load()?;
        entries.insert(key.to_owned(), value.to_owned());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.load()?;
        entries.remove(key);
        self.save(&entries)
    }
}

/// Filters applied when listing history.
#[derive(Clone, Copy, Debug, Default)]
pub struct HistoryFilter {
    pub problem_type: Option<ProblemType>,
    pub difficulty: Option<Difficulty>,
}

/// One page of history, newest first.
#[derive(Clone, Debug, Serialize)]
pub struct HistoryPage {
    pub problems: Vec<ProblemSolution>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

/// Solved-problem history over any [`KvStore`].
pub struct History {
    store: Arc<dyn KvStore>,
}

impl History {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn load_all(&self) -> Result<Vec<ProblemSolution>> {
        match self.store.get(HISTORY_KEY)? {
            Some(raw) => serde_json::from_str(&raw).context("corrupt history entry"),
            None => Ok(Vec::new()),
        }
    }

    fn store_all(&self, problems: &[ProblemSolution]) -> Result<()> {
        let raw = serde_json::to_string(problems)?;
        self.store.set(HISTORY_KEY, &raw)
    }

    /// Prepend `solution`, dropping the oldest entries past the cap.
    pub fn save(&self, solution: &ProblemSolution) -> Result<()> {
        let mut problems = self.load_all()?;
        problems.insert(0, solution.clone());
        problems.truncate(HISTORY_CAP);
        self.store_all(&problems)?;
        debug!(id = %solution.id, total = problems.len(), "saved to history");
        Ok(())
    }

    /// List one page of matching history, newest first. Pages are 1-based.
    pub fn list(&self, page: usize, limit: usize, filter: HistoryFilter) -> Result<HistoryPage> {
        let page = page.max(1);
        let limit = limit.max(1);
        let matching: Vec<ProblemSolution> = self
            .load_all()?
            .into_iter()
            .filter(|p| {
                filter
                    .problem_type
                    .is_none_or(|t| p.problem_type == t)
                    && filter.difficulty.is_none_or(|d| p.difficulty == d)
            })
            .collect();
        let total = matching.len();
        let total_pages = total.div_ceil(limit);
        let problems = matching
            .into_iter()
            .skip(page.saturating_sub(1).saturating_mul(limit))
            .take(limit)
            .collect();
        Ok(HistoryPage {
            problems,
            total,
            page,
            limit,
            total_pages,
        })
    }

    /// Delete one entry by id. Returns whether anything was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut problems = self.load_all()?;
        let before = problems.len();
        problems.retain(|p| p.id != id);
        if problems.len() == before {
            return Ok(false);
        }
        self.store_all(&problems)?;
        Ok(true)
    }

    /// Remove all history.
    pub fn clear(&self) -> Result<()> {
        self.store.remove(HISTORY_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solve::SolveMethod;
    use chrono::Utc;

    fn history() -> History {
        History::new(Arc::new(MemoryStore::default()))
    }

    fn solution(id: &str, problem_type: ProblemType, difficulty: Difficulty) -> ProblemSolution {
        ProblemSolution {
            id: id.to_owned(),
            expression: "2x + 5 = 15".to_owned(),
            steps: vec!["isolate x".to_owned()],
            result: "x = 5".to_owned(),
            method: SolveMethod::Thinking,
            explanation: "x = 5".to_owned(),
            problem_type,
            difficulty,
            model: None,
            thinking: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_save_and_list_newest_first() {
        let history = history();
        history
            .save(&solution("a", ProblemType::Equation, Difficulty::Easy))
            .unwrap();
        history
            .save(&solution("b", ProblemType::Equation, Difficulty::Easy))
            .unwrap();
        let page = history.list(1, 20, HistoryFilter::default()).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.problems[0].id, "b");
        assert_eq!(page.problems[1].id, "a");
    }

    #[test]
    fn test_cap_drops_oldest() {
        let history = history();
        for i in 0..(HISTORY_CAP + 5) {
            history
                .save(&solution(
                    &format!("id{i}"),
                    ProblemType::Arithmetic,
                    Difficulty::Easy,
                ))
                .unwrap();
        }
        let page = history.list(1, 200, HistoryFilter::default()).unwrap();
        assert_eq!(page.total, HISTORY_CAP);
        assert_eq!(page.problems[0].id, format!("id{}", HISTORY_CAP + 4));
        assert!(page.problems.iter().all(|p| p.id != "id0"));
    }

    #[test]
    fn test_filters_and_pagination() {
        let history = history();
        for i in 0..7 {
            let problem_type = if i % 2 == 0 {
                ProblemType::Equation
            } else {
                ProblemType::Calculus
            };
            history
                .save(&solution(&format!("id{i}"), problem_type, Difficulty::Medium))
                .unwrap();
        }
        let filter = HistoryFilter {
            problem_type: Some(ProblemType::Equation),
            ..Default::default()
        };
        let page = history.list(1, 2, filter).unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.problems.len(), 2);
        let page2 = history.list(2, 2, filter).unwrap();
        assert_eq!(page2.problems.len(), 2);
        assert_ne!(page.problems[0].id, page2.problems[0].id);
    }

    #[test]
    fn test_out_of_range_page_is_empty() {
        let history = history();
        history
            .save(&solution("a", ProblemType::Other, Difficulty::Hard))
            .unwrap();
        let page = history.list(9, 20, HistoryFilter::default()).unwrap();
        assert_eq!(page.total, 1);
        assert!(page.problems.is_empty());
    }

    #[test]
    fn test_huge_page_and_limit_do_not_overflow() {
        let history = history();
        history
            .save(&solution("a", ProblemType::Other, Difficulty::Hard))
            .unwrap();
        let page = history
            .list(usize::MAX, usize::MAX, HistoryFilter::default())
            .unwrap();
        assert_eq!(page.total, 1);
        assert!(page.problems.is_empty());
    }

    #[test]
    fn test_delete() {
        let history = history();
        history
            .save(&solution("a", ProblemType::Other, Difficulty::Hard))
            .unwrap();
        assert!(history.delete("a").unwrap());
        assert!(!history.delete("a").unwrap());
        let page = history.list(1, 20, HistoryFilter::default()).unwrap();
        assert_eq!(page.total, 0);
    }

    #[test]
    fn test_clear() {
        let history = history();
        history
            .save(&solution("a", ProblemType::Other, Difficulty::Hard))
            .unwrap();
        history.clear().unwrap();
        let page = history.list(1, 20, HistoryFilter::default()).unwrap();
        assert_eq!(page.total, 0);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let history = History::new(Arc::new(FileStore::new(path.clone())));
        history
            .save(&solution("a", ProblemType::Equation, Difficulty::Easy))
            .unwrap();

        let reopened = History::new(Arc::new(FileStore::new(path)));
        let page = reopened.list(1, 20, HistoryFilter::default()).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.problems[0].id, "a");
    }
}
