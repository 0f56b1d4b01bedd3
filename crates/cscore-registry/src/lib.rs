//! Versioned emission-factor registry, peer-corpus snapshots, and the
//! result store contract for CarbonScore.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use cscore_core::{
    EmissionFactor, FactorCategory, FactorId, FootprintResult, PeerObservation, Scope, Unit,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "cscore-registry";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("factor {factor_id} version {version} not found")]
    NotFound { factor_id: FactorId, version: u32 },
    #[error("invalid factor {factor_id}: {reason}")]
    InvalidFactor { factor_id: FactorId, reason: String },
}

/// A factor submitted for publication; the registry assigns the version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorDraft {
    pub factor_id: FactorId,
    pub description: String,
    pub category: FactorCategory,
    pub unit: Unit,
    pub co2e_per_unit: Decimal,
    pub scope: Scope,
    pub valid_from: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    pub source_citation: String,
    #[serde(default)]
    pub uncertainty_pct: Option<Decimal>,
    #[serde(default)]
    pub sector_average_for: Option<String>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    factors: BTreeMap<FactorId, BTreeMap<u32, EmissionFactor>>,
}

/// Append-only store of emission factor versions. Publishing is the only
/// writer; readers pin a `CatalogSnapshot` and never observe later edits
/// because a `(factor_id, version)` pair is immutable once published.
#[derive(Debug, Default)]
pub struct FactorRegistry {
    inner: RwLock<RegistryInner>,
}

impl FactorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and append a new version for the draft's factor id.
    pub fn publish(&self, draft: FactorDraft) -> Result<u32, RegistryError> {
        if draft.factor_id.as_str().trim().is_empty() {
            return Err(RegistryError::InvalidFactor {
                factor_id: draft.factor_id,
                reason: "empty factor id".into(),
            });
        }
        if draft.co2e_per_unit < Decimal::ZERO {
            return Err(RegistryError::InvalidFactor {
                factor_id: draft.factor_id,
                reason: format!("negative co2e_per_unit {}", draft.co2e_per_unit),
            });
        }
        if let Some(until) = draft.valid_until {
            if until <= draft.valid_from {
                return Err(RegistryError::InvalidFactor {
                    factor_id: draft.factor_id,
                    reason: format!(
                        "valid_until {} is not after valid_from {}",
                        until, draft.valid_from
                    ),
                });
            }
        }

        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let versions = inner.factors.entry(draft.factor_id.clone()).or_default();
        let version = versions.keys().next_back().copied().unwrap_or(0) + 1;
        let factor = EmissionFactor {
            factor_id: draft.factor_id.clone(),
            version,
            description: draft.description,
            category: draft.category,
            unit: draft.unit,
            co2e_per_unit: draft.co2e_per_unit,
            scope: draft.scope,
            valid_from: draft.valid_from,
            valid_until: draft.valid_until,
            source_citation: draft.source_citation,
            uncertainty_pct: draft.uncertainty_pct,
            sector_average_for: draft.sector_average_for,
        };
        versions.insert(version, factor);
        info!(factor_id = %draft.factor_id, version, "published emission factor");
        Ok(version)
    }

    /// Exact version lookup; an unknown version is an error, never a default.
    pub fn get(&self, factor_id: &FactorId, version: u32) -> Result<EmissionFactor, RegistryError> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .factors
            .get(factor_id)
            .and_then(|versions| versions.get(&version))
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                factor_id: factor_id.clone(),
                version,
            })
    }

    /// Freeze the set of factor versions valid on `as_of` into an owned
    /// snapshot. Two resolutions over the same published state yield the
    /// same `catalog_id`.
    pub fn resolve_catalog(&self, as_of: NaiveDate) -> CatalogSnapshot {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut pinned = Vec::new();
        for versions in inner.factors.values() {
            let best = versions
                .values()
                .rev()
                .find(|f| f.valid_from <= as_of && f.valid_until.map_or(true, |u| as_of < u));
            if let Some(factor) = best {
                pinned.push(factor.clone());
            }
        }
        CatalogSnapshot::new(as_of, pinned)
    }
}

/// Frozen, owned set of factor versions pinned for one calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub catalog_id: String,
    pub as_of: NaiveDate,
    factors: Vec<EmissionFactor>,
}

impl CatalogSnapshot {
    pub fn new(as_of: NaiveDate, mut factors: Vec<EmissionFactor>) -> Self {
        factors.sort_by(|a, b| a.factor_id.cmp(&b.factor_id));
        let mut hasher = Sha256::new();
        for factor in &factors {
            hasher.update(factor.factor_id.as_str().as_bytes());
            hasher.update(b"@");
            hasher.update(factor.version.to_be_bytes());
            hasher.update(b"\n");
        }
        let catalog_id = hex::encode(hasher.finalize());
        Self {
            catalog_id,
            as_of,
            factors,
        }
    }

    pub fn factors(&self) -> &[EmissionFactor] {
        &self.factors
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn get(&self, factor_id: &FactorId) -> Option<&EmissionFactor> {
        self.factors
            .binary_search_by(|f| f.factor_id.cmp(factor_id))
            .ok()
            .map(|idx| &self.factors[idx])
    }

    pub fn in_category(&self, category: FactorCategory) -> impl Iterator<Item = &EmissionFactor> {
        self.factors.iter().filter(move |f| f.category == category)
    }
}

/// Broad industry groupings used when a sector's peer sample is too small.
pub fn default_broad_groups() -> BTreeMap<String, String> {
    let pairs = [
        ("services", "tertiaire"),
        ("commerce", "tertiaire"),
        ("technologie", "tertiaire"),
        ("restauration", "tertiaire"),
        ("transport", "transport_logistique"),
        ("logistique", "transport_logistique"),
        ("industrie", "production"),
        ("construction", "production"),
        ("agriculture", "production"),
    ];
    pairs
        .iter()
        .map(|(sector, group)| (sector.to_string(), group.to_string()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterCentroid {
    pub cluster_id: u32,
    /// Normalized (intensity_per_employee, intensity_per_revenue).
    pub centroid: [f64; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Normalization {
    emp_mean: f64,
    emp_std: f64,
    rev_mean: f64,
    rev_std: f64,
}

impl Normalization {
    fn apply(&self, emp: f64, rev: f64) -> [f64; 2] {
        [
            (emp - self.emp_mean) / self.emp_std,
            (rev - self.rev_mean) / self.rev_std,
        ]
    }
}

/// Immutable, versioned view over the peer population: sorted per-sector
/// intensity arrays plus cluster centroids over normalized intensity
/// vectors. Built by a batch job, never mutated after publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerCorpusSnapshot {
    pub corpus_version: Uuid,
    pub built_at: DateTime<Utc>,
    by_sector: BTreeMap<String, Vec<Decimal>>,
    by_group: BTreeMap<String, Vec<Decimal>>,
    broad_group_of: BTreeMap<String, String>,
    clusters: Vec<ClusterCentroid>,
    normalization: Option<Normalization>,
}

impl PeerCorpusSnapshot {
    pub fn sector_intensities(&self, sector: &str) -> Option<&[Decimal]> {
        self.by_sector.get(sector).map(Vec::as_slice)
    }

    pub fn broad_group(&self, sector: &str) -> Option<&str> {
        self.broad_group_of.get(sector).map(String::as_str)
    }

    pub fn group_intensities(&self, group: &str) -> Option<&[Decimal]> {
        self.by_group.get(group).map(Vec::as_slice)
    }

    pub fn clusters(&self) -> &[ClusterCentroid] {
        &self.clusters
    }

    /// Nearest-centroid assignment over normalized intensity vectors.
    /// `None` when the corpus had too little revenue data to cluster or
    /// the caller lacks a revenue intensity.
    pub fn assign_cluster(&self, emp_intensity: f64, rev_intensity: f64) -> Option<u32> {
        let normalization = self.normalization?;
        let point = normalization.apply(emp_intensity, rev_intensity);
        self.clusters
            .iter()
            .map(|c| {
                let dx = c.centroid[0] - point[0];
                let dy = c.centroid[1] - point[1];
                (c.cluster_id, dx * dx + dy * dy)
            })
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(id, _)| id)
    }
}

/// Accumulates peer observations and builds a corpus snapshot as a batch.
/// Rebuilding from the same observations is safe: the previously published
/// snapshot stays untouched until the swap.
#[derive(Debug)]
pub struct CorpusBuilder {
    observations: Vec<PeerObservation>,
    broad_groups: BTreeMap<String, String>,
    cluster_count: usize,
}

impl Default for CorpusBuilder {
    fn default() -> Self {
        Self {
            observations: Vec::new(),
            broad_groups: default_broad_groups(),
            cluster_count: 3,
        }
    }
}

impl CorpusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_broad_groups(mut self, groups: BTreeMap<String, String>) -> Self {
        self.broad_groups = groups;
        self
    }

    pub fn with_cluster_count(mut self, count: usize) -> Self {
        self.cluster_count = count.max(1);
        self
    }

    pub fn push(&mut self, observation: PeerObservation) {
        self.observations.push(observation);
    }

    pub fn extend(&mut self, observations: impl IntoIterator<Item = PeerObservation>) {
        self.observations.extend(observations);
    }

    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    pub fn build(&self) -> PeerCorpusSnapshot {
        let mut by_sector: BTreeMap<String, Vec<Decimal>> = BTreeMap::new();
        let mut by_group: BTreeMap<String, Vec<Decimal>> = BTreeMap::new();
        for obs in &self.observations {
            by_sector
                .entry(obs.sector.clone())
                .or_default()
                .push(obs.intensity_per_employee);
            if let Some(group) = self.broad_groups.get(&obs.sector) {
                by_group
                    .entry(group.clone())
                    .or_default()
                    .push(obs.intensity_per_employee);
            }
        }
        for values in by_sector.values_mut().chain(by_group.values_mut()) {
            values.sort();
        }

        let (clusters, normalization) = self.build_clusters();

        let snapshot = PeerCorpusSnapshot {
            corpus_version: Uuid::new_v4(),
            built_at: Utc::now(),
            by_sector,
            by_group,
            broad_group_of: self.broad_groups.clone(),
            clusters,
            normalization,
        };
        info!(
            corpus_version = %snapshot.corpus_version,
            observations = self.observations.len(),
            clusters = snapshot.clusters.len(),
            "built peer corpus snapshot"
        );
        snapshot
    }

    /// Deterministic k-means over observations carrying both intensities:
    /// quantile-seeded centroids, fixed iteration budget.
    fn build_clusters(&self) -> (Vec<ClusterCentroid>, Option<Normalization>) {
        let points: Vec<[f64; 2]> = self
            .observations
            .iter()
            .filter_map(|obs| {
                let rev = obs.intensity_per_revenue?;
                Some([
                    obs.intensity_per_employee.to_f64().unwrap_or_default(),
                    rev.to_f64().unwrap_or_default(),
                ])
            })
            .collect();
        if points.len() < 2 {
            return (Vec::new(), None);
        }

        let normalization = {
            let n = points.len() as f64;
            let emp_mean = points.iter().map(|p| p[0]).sum::<f64>() / n;
            let rev_mean = points.iter().map(|p| p[1]).sum::<f64>() / n;
            let emp_var = points.iter().map(|p| (p[0] - emp_mean).powi(2)).sum::<f64>() / n;
            let rev_var = points.iter().map(|p| (p[1] - rev_mean).powi(2)).sum::<f64>() / n;
            Normalization {
                emp_mean,
                emp_std: if emp_var > 0.0 { emp_var.sqrt() } else { 1.0 },
                rev_mean,
                rev_std: if rev_var > 0.0 { rev_var.sqrt() } else { 1.0 },
            }
        };

        let mut normalized: Vec<[f64; 2]> = points
            .iter()
            .map(|p| normalization.apply(p[0], p[1]))
            .collect();
        normalized.sort_by(|a, b| {
            a[0].partial_cmp(&b[0])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a[1].partial_cmp(&b[1]).unwrap_or(std::cmp::Ordering::Equal))
        });

        // Quantile seeding over the sorted points keeps the batch
        // deterministic; no random restarts.
        let k = self.cluster_count.min(normalized.len());
        let mut centroids: Vec<[f64; 2]> = (0..k)
            .map(|i| {
                let idx = if k > 1 {
                    i * (normalized.len() - 1) / (k - 1)
                } else {
                    normalized.len() / 2
                };
                normalized[idx]
            })
            .collect();

        for _ in 0..10 {
            let mut sums = vec![[0.0f64; 2]; k];
            let mut counts = vec![0usize; k];
            for point in &normalized {
                let nearest = nearest_centroid(&centroids, *point);
                sums[nearest][0] += point[0];
                sums[nearest][1] += point[1];
                counts[nearest] += 1;
            }
            for i in 0..k {
                if counts[i] > 0 {
                    centroids[i] = [sums[i][0] / counts[i] as f64, sums[i][1] / counts[i] as f64];
                }
            }
        }

        let clusters = centroids
            .into_iter()
            .enumerate()
            .map(|(i, centroid)| ClusterCentroid {
                cluster_id: i as u32,
                centroid,
            })
            .collect();
        (clusters, Some(normalization))
    }
}

fn nearest_centroid(centroids: &[[f64; 2]], point: [f64; 2]) -> usize {
    let mut best = 0usize;
    let mut best_dist = f64::MAX;
    for (i, c) in centroids.iter().enumerate() {
        let dx = c[0] - point[0];
        let dy = c[1] - point[1];
        let dist = dx * dx + dy * dy;
        if dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }
    best
}

/// Holds the last completed corpus snapshot. Publishing swaps the whole
/// snapshot; in-flight readers keep the `Arc` they already resolved.
#[derive(Debug, Default)]
pub struct PeerCorpusStore {
    current: RwLock<Option<Arc<PeerCorpusSnapshot>>>,
}

impl PeerCorpusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: PeerCorpusSnapshot) {
        let corpus_version = snapshot.corpus_version;
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = current.as_ref() {
            info!(
                previous = %previous.corpus_version,
                corpus_version = %corpus_version,
                "swapping peer corpus snapshot"
            );
        }
        *current = Some(Arc::new(snapshot));
    }

    pub fn snapshot(&self) -> Option<Arc<PeerCorpusSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Where computed footprints are kept between the calculate and
/// benchmark/simulate calls. The core defines the shape only; callers may
/// bring their own persistence.
pub trait ResultStore: Send + Sync {
    fn put(&self, result: FootprintResult) -> Uuid;
    fn get(&self, result_id: Uuid) -> Option<FootprintResult>;
}

#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    inner: RwLock<HashMap<Uuid, FootprintResult>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for InMemoryResultStore {
    fn put(&self, result: FootprintResult) -> Uuid {
        let result_id = result.result_id;
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.insert(result_id, result).is_some() {
            warn!(%result_id, "overwrote existing footprint result");
        }
        result_id
    }

    fn get(&self, result_id: Uuid) -> Option<FootprintResult> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&result_id)
            .cloned()
    }
}
