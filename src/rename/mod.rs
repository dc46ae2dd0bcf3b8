//! Rename detection: matching deleted/created file pairs and renamed
//! functions by content similarity.
//!
//! The similarity scoring is a hand-rolled Ratcliff/Obershelp-style LCS
//! ratio, grounded on `difflib.SequenceMatcher.ratio()` in the original
//! `rename_detection.py`: `2 * matched / (len(a) + len(b))`.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::model::{Node, NodeKind};

const RING_BUFFER_CAPACITY: usize = 100;

/// A file deleted recently enough to still be a rename candidate. Content
/// must be captured at deletion time since the path no longer exists on
/// disk by the time a matching `created` event arrives — and so must the
/// node snapshot, since the Graph Store has already dropped the file's
/// nodes by then (see `SyncCoordinator::handle_created`'s rename branch).
#[derive(Debug, Clone)]
pub struct DeletedFile {
    pub path: String,
    pub timestamp: Instant,
    pub lines: Option<Vec<String>>,
    pub content_hash: Option<String>,
    pub nodes: Vec<Node>,
}

impl DeletedFile {
    /// Capture a deleted file's content and node snapshot for later
    /// comparison/restoration. Falls back to a content hash (and no line
    /// cache) when the bytes are not valid UTF-8, mirroring
    /// `rename_detection.py`'s binary-comparison fallback.
    pub fn capture(path: impl Into<String>, contents: &[u8], nodes: Vec<Node>) -> Self {
        let path = path.into();
        match std::str::from_utf8(contents) {
            Ok(text) => DeletedFile {
                path,
                timestamp: Instant::now(),
                lines: Some(split_lines(text)),
                content_hash: None,
                nodes,
            },
            Err(_) => DeletedFile {
                path,
                timestamp: Instant::now(),
                lines: None,
                content_hash: Some(hash_bytes(contents)),
                nodes,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatedFile {
    pub path: String,
    pub timestamp: Instant,
}

impl CreatedFile {
    pub fn new(path: impl Into<String>) -> Self {
        CreatedFile { path: path.into(), timestamp: Instant::now() }
    }
}

/// Bounded, time-windowed ring buffers of recently deleted/created paths
/// (spec.md §4.4: two capacity-100 buffers feeding the file rename
/// matcher).
#[derive(Debug, Default)]
pub struct RenameBuffers {
    deleted: VecDeque<DeletedFile>,
    created: VecDeque<CreatedFile>,
}

impl RenameBuffers {
    pub fn new() -> Self {
        RenameBuffers { deleted: VecDeque::new(), created: VecDeque::new() }
    }

    pub fn push_deleted(&mut self, entry: DeletedFile) {
        if self.deleted.len() >= RING_BUFFER_CAPACITY {
            self.deleted.pop_front();
        }
        self.deleted.push_back(entry);
    }

    pub fn push_created(&mut self, entry: CreatedFile) {
        if self.created.len() >= RING_BUFFER_CAPACITY {
            self.created.pop_front();
        }
        self.created.push_back(entry);
    }

    pub fn remove_deleted(&mut self, path: &str) {
        self.deleted.retain(|d| d.path != path);
    }

    /// Remove and return the buffered entry for `path`, if any. Used to
    /// recover a deleted file's node snapshot once its rename pair is
    /// confirmed.
    pub fn take_deleted(&mut self, path: &str) -> Option<DeletedFile> {
        let index = self.deleted.iter().position(|d| d.path == path)?;
        self.deleted.remove(index)
    }

    pub fn remove_created(&mut self, path: &str) {
        self.created.retain(|c| c.path != path);
    }

    /// Entries within `window` of now, oldest discarded.
    fn live_deleted(&self, window: Duration, now: Instant) -> Vec<&DeletedFile> {
        self.deleted.iter().filter(|d| now.duration_since(d.timestamp) <= window).collect()
    }

    fn live_created(&self, window: Duration, now: Instant) -> Vec<&CreatedFile> {
        self.created.iter().filter(|c| now.duration_since(c.timestamp) <= window).collect()
    }
}

/// Matches deleted/created file pairs by content similarity (spec.md
/// §4.3 "File rename detection").
pub struct FileRenameDetector {
    pub threshold: f64,
    pub window: Duration,
}

impl FileRenameDetector {
    pub fn new(threshold: f64, window: Duration) -> Self {
        FileRenameDetector { threshold, window }
    }

    /// Returns greedily-resolved `(old_path, new_path)` pairs, each path
    /// used in at most one pair.
    pub fn detect(&self, buffers: &RenameBuffers) -> Vec<(String, String)> {
        let now = Instant::now();
        let deleted = buffers.live_deleted(self.window, now);
        let created = buffers.live_created(self.window, now);

        if deleted.is_empty() || created.is_empty() {
            return Vec::new();
        }

        if deleted.len() == 1 && created.len() == 1 {
            let d = deleted[0];
            let c = created[0];
            if extension_of(&d.path) == extension_of(&c.path) {
                return vec![(d.path.clone(), c.path.clone())];
            }
        }

        let mut scored: Vec<(String, String, f64)> = Vec::new();
        for d in &deleted {
            for c in &created {
                if extension_of(&d.path) != extension_of(&c.path) {
                    continue;
                }
                let score = self.similarity(d, c);
                if score >= self.threshold {
                    scored.push((d.path.clone(), c.path.clone(), score));
                }
            }
        }

        scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let mut used_old = HashSet::new();
        let mut used_new = HashSet::new();
        let mut result = Vec::new();
        for (old_path, new_path, _score) in scored {
            if used_old.contains(&old_path) || used_new.contains(&new_path) {
                continue;
            }
            used_old.insert(old_path.clone());
            used_new.insert(new_path.clone());
            result.push((old_path, new_path));
        }
        result
    }

    fn similarity(&self, deleted: &DeletedFile, created: &CreatedFile) -> f64 {
        if let Some(old_lines) = &deleted.lines {
            match fs::read_to_string(&created.path) {
                Ok(new_contents) => {
                    let new_lines = split_lines(&new_contents);
                    lcs_ratio(old_lines, &new_lines)
                }
                Err(_) => self.binary_similarity(deleted, created),
            }
        } else {
            self.binary_similarity(deleted, created)
        }
    }

    fn binary_similarity(&self, deleted: &DeletedFile, created: &CreatedFile) -> f64 {
        let new_hash = match fs::read(&created.path) {
            Ok(bytes) => hash_bytes(&bytes),
            Err(_) => return 0.0,
        };
        match &deleted.content_hash {
            Some(old_hash) if *old_hash == new_hash => 1.0,
            Some(_) => 0.0,
            None => 0.0,
        }
    }
}

/// Matches renamed functions between two parses of the same file by
/// composite similarity (spec.md §4.3 "Function rename detection").
pub struct FunctionRenameDetector {
    pub threshold: f64,
}

impl FunctionRenameDetector {
    pub fn new(threshold: f64) -> Self {
        FunctionRenameDetector { threshold }
    }

    /// Returns old-id -> new-id pairs for functions judged to be renames
    /// of each other, each id used in at most one pair.
    pub fn match_functions(&self, old_nodes: &[Node], new_nodes: &[Node]) -> Vec<(String, String)> {
        let is_function = |n: &&Node| matches!(n.kind, NodeKind::Function);
        let old_functions: Vec<&Node> = old_nodes.iter().filter(is_function).collect();
        let new_functions: Vec<&Node> = new_nodes.iter().filter(is_function).collect();

        if old_functions.is_empty() || new_functions.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(String, String, f64)> = Vec::new();
        for old_fn in &old_functions {
            for new_fn in &new_functions {
                if old_fn.name == new_fn.name {
                    continue;
                }
                let sim = composite_similarity(old_fn, new_fn);
                if sim >= self.threshold {
                    scored.push((old_fn.id.clone(), new_fn.id.clone(), sim));
                }
            }
        }

        scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let mut used_old = HashSet::new();
        let mut used_new = HashSet::new();
        let mut result = Vec::new();
        for (old_id, new_id, _sim) in scored {
            if used_old.contains(&old_id) || used_new.contains(&new_id) {
                continue;
            }
            used_old.insert(old_id.clone());
            used_new.insert(new_id.clone());
            result.push((old_id, new_id));
        }
        result
    }
}

fn composite_similarity(old_fn: &Node, new_fn: &Node) -> f64 {
    let body_sim = match (&old_fn.body, &new_fn.body) {
        (Some(old_body), Some(new_body)) => {
            let old_chars: Vec<char> = old_body.chars().collect();
            let new_chars: Vec<char> = new_body.chars().collect();
            lcs_ratio(&old_chars, &new_chars)
        }
        _ => 0.0,
    };

    let line_count = |n: &Node| n.span.map(|s| s.end_line.saturating_sub(s.start_line)).unwrap_or(0);
    let line_diff = (line_count(old_fn) as i64 - line_count(new_fn) as i64).unsigned_abs();
    let line_sim = 1.0 / (1.0 + line_diff as f64);

    let param_diff = match (old_fn.param_count, new_fn.param_count) {
        (Some(old_count), Some(new_count)) => (old_count as i64 - new_count as i64).unsigned_abs(),
        _ => 0,
    };
    let param_sim = 1.0 / (1.0 + param_diff as f64);

    0.7 * body_sim + 0.2 * line_sim + 0.1 * param_sim
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines().map(|l| l.to_string()).collect()
}

fn extension_of(path: &str) -> Option<&str> {
    Path::new(path).extension().and_then(|e| e.to_str())
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Ratcliff/Obershelp-style ratio: `2 * |LCS(a, b)| / (|a| + |b|)`.
pub fn lcs_ratio<T: PartialEq>(a: &[T], b: &[T]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    (2.0 * lcs_length(a, b) as f64) / (total as f64)
}

fn lcs_length<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            curr[j] = if a[i - 1] == b[j - 1] {
                prev[j - 1] + 1
            } else {
                prev[j].max(curr[j - 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
