//! Resolves loosely-specified activity lines to pinned emission factors.

use cscore_core::{
    convert_quantity, ActivityRecord, EmissionFactor, FactorCategory, FactorMatch, MatchMethod,
};
use cscore_registry::CatalogSnapshot;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("no factor candidate for category {category:?} in pinned catalog")]
    NoCandidate { category: FactorCategory },
}

#[derive(Debug, Clone, Copy)]
pub struct MatcherConfig {
    /// Minimum similarity before a label match is accepted.
    pub similarity_threshold: f64,
    /// Ceiling on sector-fallback confidence.
    pub fallback_confidence_cap: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.75,
            fallback_confidence_cap: 0.4,
        }
    }
}

impl MatcherConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            similarity_threshold: std::env::var("CSCORE_SIMILARITY_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.similarity_threshold),
            fallback_confidence_cap: std::env::var("CSCORE_FALLBACK_CONFIDENCE_CAP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.fallback_confidence_cap),
        }
    }
}

/// Scores a free-text activity label against a candidate factor. The
/// matching policy (thresholds, tie-breaks) stays in the matcher; only
/// the scoring mechanism is pluggable.
pub trait SimilarityProvider: Send + Sync {
    fn score(&self, label: &str, factor: &EmissionFactor) -> f64;
}

/// Default provider: normalized Jaro-Winkler over factor descriptions.
#[derive(Debug, Default)]
pub struct LexicalSimilarityProvider;

impl LexicalSimilarityProvider {
    pub fn normalize(input: &str) -> String {
        input
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl SimilarityProvider for LexicalSimilarityProvider {
    fn score(&self, label: &str, factor: &EmissionFactor) -> f64 {
        strsim::jaro_winkler(
            &Self::normalize(label),
            &Self::normalize(&factor.description),
        )
    }
}

pub struct FactorMatcher {
    config: MatcherConfig,
    provider: Box<dyn SimilarityProvider>,
}

impl Default for FactorMatcher {
    fn default() -> Self {
        Self::new(MatcherConfig::default(), Box::new(LexicalSimilarityProvider))
    }
}

impl FactorMatcher {
    pub fn new(config: MatcherConfig, provider: Box<dyn SimilarityProvider>) -> Self {
        Self { config, provider }
    }

    /// Resolve one activity record against the pinned catalog.
    ///
    /// Cascade: exact category+unit, then unit-compatible, then label
    /// similarity above the threshold, then the sector-average fallback
    /// flagged for downstream auditing.
    pub fn match_record(
        &self,
        record: &ActivityRecord,
        catalog: &CatalogSnapshot,
    ) -> Result<FactorMatch, MatchError> {
        let candidates: Vec<&EmissionFactor> = catalog
            .in_category(record.category)
            .filter(|f| f.sector_average_for.is_none())
            .collect();

        if let Some(factor) = pick_most_recent(
            candidates.iter().copied().filter(|f| f.unit == record.unit),
        ) {
            return Ok(FactorMatch {
                factor_id: factor.factor_id.clone(),
                factor_version: factor.version,
                confidence: 1.0,
                method: MatchMethod::ExactUnitCategory,
            });
        }

        let convertible = candidates
            .iter()
            .copied()
            .filter_map(|f| {
                convert_quantity(Decimal::ONE, record.unit, f.unit)
                    .ok()
                    .map(|conversion| (f, conversion.certainty))
            })
            .collect::<Vec<_>>();
        let best_certainty = convertible
            .iter()
            .map(|(_, certainty)| *certainty)
            .fold(f64::MIN, f64::max);
        if let Some(factor) = pick_most_recent(
            convertible
                .iter()
                .filter(|(_, certainty)| *certainty >= best_certainty)
                .map(|(f, _)| *f),
        ) {
            return Ok(FactorMatch {
                factor_id: factor.factor_id.clone(),
                factor_version: factor.version,
                confidence: best_certainty,
                method: MatchMethod::UnitCompatible,
            });
        }

        let mut best_similarity: Option<f64> = None;
        if let Some(label) = record.raw_label.as_deref() {
            let mut scored: Vec<(&EmissionFactor, f64)> = candidates
                .iter()
                .copied()
                .map(|f| (f, self.provider.score(label, f)))
                .collect();
            // Highest similarity first; ties favour the more recent factor.
            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.0.valid_from.cmp(&a.0.valid_from))
            });
            best_similarity = scored.first().map(|(_, score)| *score);

            if let Some((factor, score)) = scored.first() {
                if *score >= self.config.similarity_threshold {
                    debug!(
                        factor_id = %factor.factor_id,
                        score,
                        label,
                        "similarity match accepted"
                    );
                    return Ok(FactorMatch {
                        factor_id: factor.factor_id.clone(),
                        factor_version: factor.version,
                        confidence: *score,
                        method: MatchMethod::VectorSimilarity,
                    });
                }
            }
        }

        let fallback = catalog
            .in_category(record.category)
            .filter(|f| f.sector_average_for.is_some())
            .filter(|f| match (&record.sector_hint, &f.sector_average_for) {
                (Some(hint), Some(sector)) => hint == sector,
                _ => true,
            })
            .max_by_key(|f| f.valid_from)
            .or_else(|| {
                catalog
                    .in_category(record.category)
                    .filter(|f| f.sector_average_for.is_some())
                    .max_by_key(|f| f.valid_from)
            });

        match fallback {
            Some(factor) => {
                let confidence = best_similarity
                    .map(|s| s.min(self.config.fallback_confidence_cap))
                    .unwrap_or(self.config.fallback_confidence_cap);
                warn!(
                    factor_id = %factor.factor_id,
                    category = ?record.category,
                    confidence,
                    "sector fallback match"
                );
                Ok(FactorMatch {
                    factor_id: factor.factor_id.clone(),
                    factor_version: factor.version,
                    confidence,
                    method: MatchMethod::SectorFallback,
                })
            }
            None => Err(MatchError::NoCandidate {
                category: record.category,
            }),
        }
    }
}

fn pick_most_recent<'a>(
    factors: impl Iterator<Item = &'a EmissionFactor>,
) -> Option<&'a EmissionFactor> {
    factors.max_by(|a, b| {
        a.valid_from
            .cmp(&b.valid_from)
            .then_with(|| a.factor_id.cmp(&b.factor_id).reverse())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use cscore_core::{FactorId, Scope, Unit};
    use rust_decimal_macros::dec;

    fn factor(
        id: &str,
        description: &str,
        category: FactorCategory,
        unit: Unit,
        from: &str,
        sector_average_for: Option<&str>,
    ) -> EmissionFactor {
        EmissionFactor {
            factor_id: FactorId::new(id),
            version: 1,
            description: description.into(),
            category,
            unit,
            co2e_per_unit: dec!(0.1),
            scope: Scope::Scope2,
            valid_from: NaiveDate::parse_from_str(from, "%Y-%m-%d").unwrap(),
            valid_until: None,
            source_citation: "test".into(),
            uncertainty_pct: None,
            sector_average_for: sector_average_for.map(str::to_string),
        }
    }

    fn record(
        category: FactorCategory,
        unit: Unit,
        raw_label: Option<&str>,
        sector_hint: Option<&str>,
    ) -> ActivityRecord {
        ActivityRecord {
            category,
            quantity: dec!(100),
            unit,
            raw_label: raw_label.map(str::to_string),
            sector_hint: sector_hint.map(str::to_string),
        }
    }

    fn catalog(factors: Vec<EmissionFactor>) -> CatalogSnapshot {
        CatalogSnapshot::new(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), factors)
    }

    #[test]
    fn exact_unit_category_match_has_full_confidence() {
        let catalog = catalog(vec![factor(
            "elec-fr",
            "Electricite reseau France",
            FactorCategory::Electricity,
            Unit::KilowattHour,
            "2024-01-01",
            None,
        )]);
        let matched = FactorMatcher::default()
            .match_record(
                &record(FactorCategory::Electricity, Unit::KilowattHour, None, None),
                &catalog,
            )
            .unwrap();
        assert_eq!(matched.method, MatchMethod::ExactUnitCategory);
        assert_eq!(matched.confidence, 1.0);
    }

    #[test]
    fn convertible_unit_downgrades_to_unit_compatible() {
        let catalog = catalog(vec![factor(
            "elec-fr",
            "Electricite reseau France",
            FactorCategory::Electricity,
            Unit::KilowattHour,
            "2024-01-01",
            None,
        )]);
        let matched = FactorMatcher::default()
            .match_record(
                &record(FactorCategory::Electricity, Unit::MegawattHour, None, None),
                &catalog,
            )
            .unwrap();
        assert_eq!(matched.method, MatchMethod::UnitCompatible);
        assert_eq!(matched.confidence, 1.0);
        assert!(MatchMethod::ExactUnitCategory.outranks(matched.method));
    }

    #[test]
    fn label_similarity_picks_closest_description_in_category() {
        let catalog = catalog(vec![
            factor(
                "essence",
                "essence voiture particuliere",
                FactorCategory::VehicleKm,
                Unit::Kilometer,
                "2024-01-01",
                None,
            ),
            factor(
                "gazole",
                "gazole vehicule utilitaire leger",
                FactorCategory::VehicleKm,
                Unit::Kilometer,
                "2024-01-01",
                None,
            ),
        ]);
        // Currency-denominated record cannot match on unit; the label must
        // carry the resolution.
        let matched = FactorMatcher::default()
            .match_record(
                &record(
                    FactorCategory::VehicleKm,
                    Unit::Euro,
                    Some("gazole vehicule utilitaire"),
                    None,
                ),
                &catalog,
            )
            .unwrap();
        assert_eq!(matched.method, MatchMethod::VectorSimilarity);
        assert_eq!(matched.factor_id, FactorId::new("gazole"));
        assert!(matched.confidence >= 0.75);
    }

    #[test]
    fn below_threshold_falls_back_to_sector_average() {
        let catalog = catalog(vec![
            factor(
                "essence",
                "essence voiture particuliere",
                FactorCategory::VehicleKm,
                Unit::Kilometer,
                "2024-01-01",
                None,
            ),
            factor(
                "vehicle-avg-transport",
                "moyenne sectorielle vehicules transport",
                FactorCategory::VehicleKm,
                Unit::Kilometer,
                "2024-01-01",
                Some("transport"),
            ),
        ]);
        let matched = FactorMatcher::default()
            .match_record(
                &record(
                    FactorCategory::VehicleKm,
                    Unit::Euro,
                    Some("zzzz unrelated label"),
                    Some("transport"),
                ),
                &catalog,
            )
            .unwrap();
        assert_eq!(matched.method, MatchMethod::SectorFallback);
        assert!(matched.confidence <= 0.4);
    }

    #[test]
    fn exact_outranks_similarity_outranks_fallback_for_same_record() {
        let exact = factor(
            "elec-fr",
            "Electricite reseau France",
            FactorCategory::Electricity,
            Unit::KilowattHour,
            "2024-01-01",
            None,
        );
        let avg = factor(
            "elec-avg",
            "moyenne sectorielle electricite",
            FactorCategory::Electricity,
            Unit::KilowattHour,
            "2024-01-01",
            Some("services"),
        );
        let rec = record(
            FactorCategory::Electricity,
            Unit::KilowattHour,
            Some("electricite reseau france"),
            Some("services"),
        );
        let matcher = FactorMatcher::default();

        let with_exact = matcher
            .match_record(&rec, &catalog(vec![exact.clone(), avg.clone()]))
            .unwrap();
        assert_eq!(with_exact.method, MatchMethod::ExactUnitCategory);

        // Remove the exact-unit candidate: label similarity takes over.
        let mut similarity_only = exact.clone();
        similarity_only.unit = Unit::Liter;
        let with_similarity = matcher
            .match_record(&rec, &catalog(vec![similarity_only, avg.clone()]))
            .unwrap();
        assert_eq!(with_similarity.method, MatchMethod::VectorSimilarity);
        assert!(with_exact.method.outranks(with_similarity.method));

        // Remove ordinary candidates entirely: sector fallback remains.
        let with_fallback = matcher.match_record(&rec, &catalog(vec![avg])).unwrap();
        assert_eq!(with_fallback.method, MatchMethod::SectorFallback);
        assert!(with_similarity.method.outranks(with_fallback.method));
    }

    #[test]
    fn similarity_tie_breaks_on_more_recent_valid_from() {
        let older = factor(
            "flight-old",
            "vol international long courrier",
            FactorCategory::FlightKm,
            Unit::Mile,
            "2020-01-01",
            None,
        );
        let newer = factor(
            "flight-new",
            "vol international long courrier",
            FactorCategory::FlightKm,
            Unit::Mile,
            "2024-01-01",
            None,
        );
        let matched = FactorMatcher::default()
            .match_record(
                &record(
                    FactorCategory::FlightKm,
                    Unit::Euro,
                    Some("vol international long courrier"),
                    None,
                ),
                &catalog(vec![older, newer]),
            )
            .unwrap();
        assert_eq!(matched.factor_id, FactorId::new("flight-new"));
    }

    #[test]
    fn empty_category_is_no_candidate() {
        let err = FactorMatcher::default()
            .match_record(
                &record(FactorCategory::WasteTreatment, Unit::Tonne, None, None),
                &catalog(vec![]),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            MatchError::NoCandidate {
                category: FactorCategory::WasteTreatment
            }
        ));
    }
}
