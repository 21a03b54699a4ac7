//! Durable editorial memory
//!
//! One JSON document holds critic rules, published posts, performance
//! records, run history and the latest comment pack. History is append-only:
//! nothing here edits or removes an earlier entry.
//!
//! Writers are serialized twice. An in-process mutex orders threads sharing a
//! store, and a lock file beside the document orders separate processes.
//! Every commit is written to a temporary file in the same directory and
//! renamed over the document, so readers never see a partial write.

mod lock;
pub mod stats;

pub use lock::WriterLock;
pub use stats::PersonaStats;

use sdk::errors::EngineError;
use sdk::types::{CommentPack, CriticRule, PerformanceRecord, PublishedPost, RunRecord, Vibe};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

const DEFAULT_STALE_LOCK: Duration = Duration::from_secs(120);
const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(10);

/// Everything the memory document stores
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub rules: Vec<CriticRule>,
    #[serde(default)]
    pub posts: Vec<PublishedPost>,
    #[serde(default)]
    pub performance: Vec<PerformanceRecord>,
    #[serde(default)]
    pub runs: Vec<RunRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_comment_pack: Option<CommentPack>,
}

impl State {
    /// Append a rule unless an equivalent one is already stored.
    /// Returns whether the rule was added.
    pub fn add_rule(&mut self, rule: CriticRule) -> bool {
        let key = rule.key();
        if key.is_empty() || self.rules.iter().any(|r| r.key() == key) {
            return false;
        }
        self.rules.push(rule);
        true
    }

    pub fn add_post(&mut self, post: PublishedPost) -> Result<(), EngineError> {
        if self.find_post(&post.platform_urn).is_some() {
            return Err(EngineError::DuplicatePost(post.platform_urn));
        }
        self.posts.push(post);
        Ok(())
    }

    pub fn add_performance(
        &mut self,
        post_urn: &str,
        mut record: PerformanceRecord,
    ) -> Result<(), EngineError> {
        if self.find_post(post_urn).is_none() {
            return Err(EngineError::UnknownPost(post_urn.to_string()));
        }
        record.post_urn = post_urn.to_string();
        self.performance.push(record);
        Ok(())
    }

    pub fn find_post(&self, urn: &str) -> Option<&PublishedPost> {
        self.posts.iter().find(|p| p.platform_urn == urn)
    }

    /// Most recent performance record for a post
    pub fn latest_performance(&self, urn: &str) -> Option<&PerformanceRecord> {
        stats::latest_by_urn(&self.performance).get(urn).copied()
    }

    pub fn persona_stats(&self) -> BTreeMap<Vibe, PersonaStats> {
        stats::derive(&self.posts, &self.performance)
    }
}

/// The writes a finished run makes, applied as one commit
#[derive(Debug, Clone)]
pub struct RunCommit {
    pub rules: Vec<CriticRule>,
    pub post: Option<PublishedPost>,
    pub comment_pack: Option<CommentPack>,
    pub run: RunRecord,
}

/// What a run commit actually changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitSummary {
    pub rules_added: usize,
    pub post_recorded: bool,
}

pub struct MemoryStore {
    path: PathBuf,
    lock_path: PathBuf,
    stale_after: Duration,
    lock_wait: Duration,
    writer: Mutex<()>,
}

impl MemoryStore {
    /// Open a store at `path`, creating its directory if needed.
    /// The document itself is created on first commit.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let path = path.into();
        let dir = parent_dir(&path);
        fs::create_dir_all(&dir)?;

        Ok(Self {
            lock_path: WriterLock::path_for(&path),
            path,
            stale_after: DEFAULT_STALE_LOCK,
            lock_wait: DEFAULT_LOCK_WAIT,
            writer: Mutex::new(()),
        })
    }

    pub fn with_stale_lock_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current document. A missing file is an empty history;
    /// an unreadable one is an error and is left untouched.
    pub fn load(&self) -> Result<State, EngineError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(State::default()),
            Err(e) => return Err(EngineError::Io(e)),
        };

        if content.trim().is_empty() {
            return Ok(State::default());
        }

        serde_json::from_str(&content).map_err(|e| {
            EngineError::Memory(format!("{} is corrupted: {}", self.path.display(), e))
        })
    }

    /// Load, apply `f`, and commit if `f` succeeds. Nothing is written when
    /// `f` returns an error.
    pub fn mutate<R>(
        &self,
        f: impl FnOnce(&mut State) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let _local = self
            .writer
            .lock()
            .map_err(|_| EngineError::Memory("writer mutex poisoned".to_string()))?;
        let _file_lock = WriterLock::acquire(&self.lock_path, self.stale_after, self.lock_wait)?;

        let mut state = self.load()?;
        let result = f(&mut state)?;
        self.write(&state)?;
        Ok(result)
    }

    pub fn append_rule(&self, rule: CriticRule) -> Result<bool, EngineError> {
        self.mutate(|state| Ok(state.add_rule(rule)))
    }

    pub fn append_post(&self, post: PublishedPost) -> Result<(), EngineError> {
        self.mutate(|state| state.add_post(post))
    }

    pub fn attach_performance(
        &self,
        post_urn: &str,
        record: PerformanceRecord,
    ) -> Result<(), EngineError> {
        self.mutate(|state| state.add_performance(post_urn, record))
    }

    /// Record several performance results in one commit. Records for posts
    /// the store does not know are skipped and reported back.
    pub fn attach_performance_batch(
        &self,
        records: Vec<PerformanceRecord>,
    ) -> Result<Vec<String>, EngineError> {
        self.mutate(|state| {
            let mut unknown = Vec::new();
            for record in records {
                let urn = record.post_urn.clone();
                match state.add_performance(&urn, record) {
                    Ok(()) => {}
                    Err(EngineError::UnknownPost(urn)) => unknown.push(urn),
                    Err(e) => return Err(e),
                }
            }
            Ok(unknown)
        })
    }

    pub fn persona_stats(&self) -> Result<BTreeMap<Vibe, PersonaStats>, EngineError> {
        Ok(self.load()?.persona_stats())
    }

    pub fn rules(&self) -> Result<Vec<CriticRule>, EngineError> {
        Ok(self.load()?.rules)
    }

    /// Apply everything a run produced as a single durable write
    pub fn commit_run(&self, commit: RunCommit) -> Result<CommitSummary, EngineError> {
        let run_id = commit.run.run_id.clone();

        let summary = self.mutate(move |state| {
            let mut summary = CommitSummary::default();

            // Rules repeated within one run collapse too
            let mut seen = HashSet::new();
            for rule in commit.rules {
                if seen.insert(rule.key()) && state.add_rule(rule) {
                    summary.rules_added += 1;
                }
            }

            if let Some(post) = commit.post {
                state.add_post(post)?;
                summary.post_recorded = true;
            }

            if let Some(pack) = commit.comment_pack {
                state.latest_comment_pack = Some(pack);
            }

            state.runs.push(commit.run);
            Ok(summary)
        })?;

        info!(
            run_id = %run_id,
            rules_added = summary.rules_added,
            post_recorded = summary.post_recorded,
            "Run committed to memory"
        );
        Ok(summary)
    }

    fn write(&self, state: &State) -> Result<(), EngineError> {
        let dir = parent_dir(&self.path);
        let mut tmp = NamedTempFile::new_in(&dir)?;

        serde_json::to_writer_pretty(&mut tmp, state)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| EngineError::Io(e.error))?;

        debug!(path = %self.path.display(), "Memory committed");
        Ok(())
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
