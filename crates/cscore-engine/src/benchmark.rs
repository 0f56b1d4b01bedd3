//! Peer benchmarking against a published corpus snapshot.

use cscore_core::{BenchmarkResult, CompanyProfile, FootprintResult, PositionLabel};
use cscore_registry::PeerCorpusSnapshot;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("footprint has no per-employee intensity, cannot benchmark")]
    MissingIntensity,
    #[error("not enough peer data for sector {sector}: {available} observations, {required} required")]
    InsufficientPeerData {
        sector: String,
        available: usize,
        required: usize,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct BenchmarkConfig {
    /// Minimum peer observations before a sector comparison is reported.
    pub min_peer_sample: usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            min_peer_sample: 20,
        }
    }
}

impl BenchmarkConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let min_peer_sample = std::env::var("CSCORE_MIN_PEER_SAMPLE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.min_peer_sample);
        Self { min_peer_sample }
    }
}

#[derive(Debug, Default)]
pub struct BenchmarkEngine {
    config: BenchmarkConfig,
}

impl BenchmarkEngine {
    pub fn new(config: BenchmarkConfig) -> Self {
        Self { config }
    }

    /// Place a footprint within its sector peer distribution. Falls back
    /// to the broad industry group when the sector sample is too small,
    /// and reports that fallback in the result.
    pub fn benchmark(
        &self,
        footprint: &FootprintResult,
        profile: &CompanyProfile,
        corpus: &PeerCorpusSnapshot,
    ) -> Result<BenchmarkResult, BenchmarkError> {
        let intensity = footprint
            .intensity_per_employee
            .ok_or(BenchmarkError::MissingIntensity)?;

        let sector_peers = corpus
            .sector_intensities(&profile.sector)
            .unwrap_or_default();

        let (peers, sector_scope, used_broad_group_fallback) =
            if sector_peers.len() >= self.config.min_peer_sample {
                (sector_peers, profile.sector.clone(), false)
            } else {
                let group = corpus.broad_group(&profile.sector);
                let group_peers = group
                    .and_then(|g| corpus.group_intensities(g))
                    .unwrap_or_default();
                if group_peers.len() < self.config.min_peer_sample {
                    return Err(BenchmarkError::InsufficientPeerData {
                        sector: profile.sector.clone(),
                        available: sector_peers.len().max(group_peers.len()),
                        required: self.config.min_peer_sample,
                    });
                }
                let group = group.unwrap_or(&profile.sector).to_string();
                warn!(
                    sector = %profile.sector,
                    group = %group,
                    sector_sample = sector_peers.len(),
                    "sector sample too small, falling back to broad group"
                );
                (group_peers, group, true)
            };

        let percentile = percentile_rank(peers, intensity);
        let peer_median = median(peers);
        let position_label = PositionLabel::from_percentile(percentile);

        let cluster_id = match footprint.intensity_per_revenue {
            Some(rev) => corpus.assign_cluster(
                intensity.to_f64().unwrap_or_default(),
                rev.to_f64().unwrap_or_default(),
            ),
            None => None,
        };

        info!(
            sector = %sector_scope,
            percentile,
            sample = peers.len(),
            "benchmarked footprint"
        );

        Ok(BenchmarkResult {
            percentile,
            peer_median,
            cluster_id,
            position_label,
            corpus_version: corpus.corpus_version,
            peer_sample_size: peers.len(),
            sector_scope,
            used_broad_group_fallback,
        })
    }
}

/// Percentile of `value` within an ascending-sorted sample, with linear
/// interpolation between the two straddling observations. 0 below the
/// minimum, 100 above the maximum.
pub fn percentile_rank(sorted: &[Decimal], value: Decimal) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if value < sorted[0] {
        return 0.0;
    }
    if value >= sorted[sorted.len() - 1] {
        return 100.0;
    }
    let count_less = sorted.iter().filter(|v| **v < value).count();
    let fraction = if count_less == 0 {
        0.0
    } else {
        let lower = sorted[count_less - 1];
        let upper = sorted[count_less];
        let span = upper - lower;
        if span > Decimal::ZERO {
            ((value - lower) / span).to_f64().unwrap_or_default()
        } else {
            0.0
        }
    };
    (count_less as f64 + fraction) * 100.0 / sorted.len() as f64
}

fn median(sorted: &[Decimal]) -> Decimal {
    if sorted.is_empty() {
        return Decimal::ZERO;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / Decimal::TWO
    } else {
        sorted[mid]
    }
}
