//! In-process vector store using linear-scan cosine similarity.
//!
//! [`InMemoryVectorStore`] keeps every unit in one owned struct behind a
//! `tokio::sync::RwLock`. Searches share the lock; writes take it
//! exclusively. When opened with a snapshot path, every successful write is
//! flushed to disk before the lock is released: the full snapshot is written
//! to `<path>.tmp`, fsynced and renamed over `<path>`, and the in-memory
//! state only changes once the rename succeeded.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::document::{IndexedUnit, MetadataFilter, SearchHit};
use crate::embedding::check_finite;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const SNAPSHOT_VERSION: u32 = 1;

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude, and whenever the result
/// is not finite (components large enough to overflow the norms).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let similarity = dot / (norm_a * norm_b);
    if similarity.is_finite() { similarity.clamp(-1.0, 1.0) } else { 0.0 }
}

/// Unit counts of an index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Total number of units.
    pub units: usize,
    /// Units per source.
    pub sources: BTreeMap<String, usize>,
}

/// Units in insertion order plus an id lookup.
#[derive(Debug, Clone, Default)]
struct IndexState {
    units: Vec<IndexedUnit>,
    positions: HashMap<String, usize>,
}

impl IndexState {
    fn upsert(&mut self, unit: IndexedUnit) {
        match self.positions.get(&unit.id) {
            Some(&pos) => self.units[pos] = unit,
            None => {
                self.positions.insert(unit.id.clone(), self.units.len());
                self.units.push(unit);
            }
        }
    }

    fn remove_source(&mut self, source_id: &str) -> usize {
        let before = self.units.len();
        self.units.retain(|u| u.source_id != source_id);
        self.positions =
            self.units.iter().enumerate().map(|(pos, u)| (u.id.clone(), pos)).collect();
        before - self.units.len()
    }

    fn count_source(&self, source_id: &str) -> usize {
        self.units.iter().filter(|u| u.source_id == source_id).count()
    }
}

/// An in-memory vector store using cosine similarity for search.
///
/// Ties in score keep insertion order; replacing a unit keeps its original
/// position.
///
/// # Example
///
/// ```rust,ignore
/// use archivist_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::open("data/index.json", 768).await?;
/// store.upsert(&units).await?;
/// ```
#[derive(Debug)]
pub struct InMemoryVectorStore {
    dimensions: usize,
    snapshot_path: Option<PathBuf>,
    state: RwLock<IndexState>,
}

impl InMemoryVectorStore {
    /// Create a new empty, non-persistent store.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, snapshot_path: None, state: RwLock::new(IndexState::default()) }
    }

    /// Open a store persisted at `path`, loading the snapshot if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PersistenceError`] for an unreadable or corrupt
    /// snapshot and [`RagError::DimensionMismatch`] when the snapshot was
    /// written with a different dimension.
    pub async fn open(path: impl AsRef<Path>, dimensions: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => load_snapshot(&path, &bytes, dimensions)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no snapshot found, starting empty");
                IndexState::default()
            }
            Err(e) => return Err(persistence_error(&path, e)),
        };
        info!(path = %path.display(), units = state.units.len(), "opened vector index");
        Ok(Self { dimensions, snapshot_path: Some(path), state: RwLock::new(state) })
    }

    /// The snapshot location, if the store is persistent.
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Unit counts, overall and per source.
    pub async fn stats(&self) -> IndexStats {
        let state = self.state.read().await;
        let mut sources = BTreeMap::new();
        for unit in &state.units {
            *sources.entry(unit.source_id.clone()).or_insert(0) += 1;
        }
        IndexStats { units: state.units.len(), sources }
    }

    fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        check_finite(vector)
    }

    /// Apply `change` to the state, persisting the result before it becomes visible.
    async fn write_with<F>(&self, change: F) -> Result<usize>
    where
        F: FnOnce(&mut IndexState) -> usize,
    {
        let mut state = self.state.write().await;
        let Some(path) = &self.snapshot_path else {
            return Ok(change(&mut *state));
        };

        let mut next = state.clone();
        let affected = change(&mut next);
        write_snapshot(path, &next, self.dimensions).await?;
        *state = next;
        Ok(affected)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, units: &[IndexedUnit]) -> Result<()> {
        if units.is_empty() {
            return Ok(());
        }
        for unit in units {
            self.check_vector(&unit.embedding)?;
        }
        self.write_with(|state| {
            for unit in units {
                state.upsert(unit.clone());
            }
            units.len()
        })
        .await?;
        debug!(count = units.len(), "upserted units");
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>> {
        self.check_vector(query)?;
        let state = self.state.read().await;

        let mut scored: Vec<(usize, f32)> = state
            .units
            .iter()
            .enumerate()
            .filter(|(_, unit)| filter.is_none_or(|f| f.matches(unit)))
            .map(|(pos, unit)| (pos, cosine_similarity(&unit.embedding, query)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(pos, score)| SearchHit::new(state.units[pos].clone(), score))
            .collect())
    }

    async fn delete_by_source(&self, source_id: &str) -> Result<usize> {
        if self.state.read().await.count_source(source_id) == 0 {
            return Ok(0);
        }
        let removed = self.write_with(|state| state.remove_source(source_id)).await?;
        debug!(source_id, removed, "deleted units");
        Ok(removed)
    }

    async fn get_by_source(&self, source_id: &str) -> Result<Vec<IndexedUnit>> {
        let state = self.state.read().await;
        let mut units: Vec<IndexedUnit> =
            state.units.iter().filter(|u| u.source_id == source_id).cloned().collect();
        units.sort_by_key(|u| u.chunk_index);
        Ok(units)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.state.read().await.units.len())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ── Snapshot format ──

#[derive(Serialize)]
struct SnapshotOut<'a> {
    version: u32,
    dimensions: usize,
    ids: Vec<&'a str>,
    units: Vec<UnitRecordOut<'a>>,
    vectors: Vec<&'a [f32]>,
}

#[derive(Serialize)]
struct UnitRecordOut<'a> {
    source_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    section: Option<&'a str>,
    chunk_index: usize,
    text: &'a str,
    metadata: &'a HashMap<String, String>,
}

#[derive(Deserialize)]
struct SnapshotIn {
    version: u32,
    dimensions: usize,
    ids: Vec<String>,
    units: Vec<UnitRecordIn>,
    vectors: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct UnitRecordIn {
    source_id: String,
    #[serde(default)]
    section: Option<String>,
    chunk_index: usize,
    text: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

fn persistence_error(path: &Path, e: impl std::fmt::Display) -> RagError {
    RagError::PersistenceError { path: path.display().to_string(), message: e.to_string() }
}

fn load_snapshot(path: &Path, bytes: &[u8], dimensions: usize) -> Result<IndexState> {
    let snapshot: SnapshotIn = serde_json::from_slice(bytes)
        .map_err(|e| persistence_error(path, format!("corrupt snapshot: {e}")))?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(persistence_error(
            path,
            format!("unsupported snapshot version {}", snapshot.version),
        ));
    }
    if snapshot.dimensions != dimensions {
        return Err(RagError::DimensionMismatch {
            expected: dimensions,
            actual: snapshot.dimensions,
        });
    }
    if snapshot.ids.len() != snapshot.units.len() || snapshot.ids.len() != snapshot.vectors.len() {
        return Err(persistence_error(
            path,
            format!(
                "corrupt snapshot: {} ids, {} units, {} vectors",
                snapshot.ids.len(),
                snapshot.units.len(),
                snapshot.vectors.len()
            ),
        ));
    }

    let mut state = IndexState::default();
    let records = snapshot.ids.into_iter().zip(snapshot.units).zip(snapshot.vectors);
    for ((id, record), embedding) in records {
        if embedding.len() != dimensions {
            return Err(persistence_error(
                path,
                format!("corrupt snapshot: vector for '{id}' has {} dimensions", embedding.len()),
            ));
        }
        state.upsert(IndexedUnit {
            id,
            embedding,
            source_id: record.source_id,
            section: record.section,
            chunk_index: record.chunk_index,
            text: record.text,
            metadata: record.metadata,
        });
    }
    Ok(state)
}

async fn write_snapshot(path: &Path, state: &IndexState, dimensions: usize) -> Result<()> {
    let snapshot = SnapshotOut {
        version: SNAPSHOT_VERSION,
        dimensions,
        ids: state.units.iter().map(|u| u.id.as_str()).collect(),
        units: state
            .units
            .iter()
            .map(|u| UnitRecordOut {
                source_id: &u.source_id,
                section: u.section.as_deref(),
                chunk_index: u.chunk_index,
                text: &u.text,
                metadata: &u.metadata,
            })
            .collect(),
        vectors: state.units.iter().map(|u| u.embedding.as_slice()).collect(),
    };
    let bytes = serde_json::to_vec(&snapshot).map_err(|e| persistence_error(path, e))?;

    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || replace_file(&target, &bytes))
        .await
        .map_err(|e| persistence_error(path, e))?
        .map_err(|e| persistence_error(path, e))?;

    debug!(path = %path.display(), units = state.units.len(), "wrote snapshot");
    Ok(())
}

fn replace_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);

    let mut file = File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, path)
}
