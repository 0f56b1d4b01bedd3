//! Scoped footprint aggregation with per-line provenance and integer
//! milligram sums.

use std::collections::BTreeMap;

use chrono::Utc;
use cscore_core::{
    convert_quantity, ActivityRecord, Co2e, CompanyProfile, CoreError, FactorCategory, FailedLine,
    FootprintResult, LineResult, MatchMethod, Scope,
};
use cscore_registry::CatalogSnapshot;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::matcher::{FactorMatcher, MatchError};

#[derive(Debug, Error)]
pub enum CalcError {
    #[error("activity record {index} is structurally invalid: {source}")]
    InvalidActivity {
        index: usize,
        #[source]
        source: CoreError,
    },
}

#[derive(Default)]
pub struct CalculationEngine {
    matcher: FactorMatcher,
}

impl CalculationEngine {
    pub fn new(matcher: FactorMatcher) -> Self {
        Self { matcher }
    }

    /// Compute a complete scoped footprint against a pinned catalog.
    ///
    /// Per-line unit mismatches and unresolvable categories degrade to
    /// `failed_lines`; only structurally invalid input aborts the request.
    /// Totals are milligram-integer sums, so re-running the same records
    /// against the same catalog is bit-identical.
    pub fn calculate(
        &self,
        records: &[ActivityRecord],
        catalog: &CatalogSnapshot,
        profile: &CompanyProfile,
    ) -> Result<FootprintResult, CalcError> {
        for (index, record) in records.iter().enumerate() {
            record
                .validate()
                .map_err(|source| CalcError::InvalidActivity { index, source })?;
        }

        let mut line_results = Vec::new();
        let mut failed_lines = Vec::new();
        let mut low_confidence_lines = Vec::new();
        let mut scope_sums: BTreeMap<Scope, Co2e> = BTreeMap::new();
        let mut breakdown: BTreeMap<FactorCategory, Co2e> = BTreeMap::new();

        for (record_index, record) in records.iter().enumerate() {
            let factor_match = match self.matcher.match_record(record, catalog) {
                Ok(m) => m,
                Err(err @ MatchError::NoCandidate { .. }) => {
                    warn!(record_index, %err, "line excluded from totals");
                    failed_lines.push(FailedLine {
                        record_index,
                        record: record.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            // Pinned by the matcher from this same snapshot.
            let factor = match catalog.get(&factor_match.factor_id) {
                Some(f) => f,
                None => {
                    failed_lines.push(FailedLine {
                        record_index,
                        record: record.clone(),
                        reason: format!("factor {} missing from catalog", factor_match.factor_id),
                    });
                    continue;
                }
            };

            let converted = match convert_quantity(record.quantity, record.unit, factor.unit) {
                Ok(c) => c,
                Err(err) => {
                    warn!(record_index, %err, "unit mismatch; line excluded from totals");
                    failed_lines.push(FailedLine {
                        record_index,
                        record: record.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let co2e_kg = match converted.quantity.checked_mul(factor.co2e_per_unit) {
                Some(kg) => kg,
                None => {
                    let err = CoreError::NumericRange {
                        value: converted.quantity,
                    };
                    warn!(record_index, %err, "line excluded from totals");
                    failed_lines.push(FailedLine {
                        record_index,
                        record: record.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            let co2e = match Co2e::from_kg(co2e_kg) {
                Ok(c) => c,
                Err(err) => {
                    failed_lines.push(FailedLine {
                        record_index,
                        record: record.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            if factor_match.method == MatchMethod::SectorFallback {
                low_confidence_lines.push(line_results.len());
            }
            let entry = scope_sums.entry(factor.scope).or_insert(Co2e::ZERO);
            *entry = entry.saturating_add(co2e);
            let cat = breakdown.entry(factor.category).or_insert(Co2e::ZERO);
            *cat = cat.saturating_add(co2e);

            line_results.push(LineResult {
                record_index,
                record: record.clone(),
                factor_match,
                factor_category: factor.category,
                factor_scope: factor.scope,
                co2e,
            });
        }

        let scope1 = scope_sums.get(&Scope::Scope1).copied().unwrap_or(Co2e::ZERO);
        let scope2 = scope_sums.get(&Scope::Scope2).copied().unwrap_or(Co2e::ZERO);
        let scope3 = scope_sums.get(&Scope::Scope3).copied().unwrap_or(Co2e::ZERO);
        let total = scope1 + scope2 + scope3;

        let intensity_per_employee = if profile.employee_count > 0 {
            total.as_kg().checked_div(Decimal::from(profile.employee_count))
        } else {
            None
        };
        let intensity_per_revenue = profile.annual_revenue_eur.and_then(|revenue| {
            if revenue > Decimal::ZERO {
                total.as_kg().checked_div(revenue)
            } else {
                None
            }
        });

        info!(
            lines = line_results.len(),
            failed = failed_lines.len(),
            total_kg = %total.as_kg(),
            catalog_id = %catalog.catalog_id,
            "footprint computed"
        );

        Ok(FootprintResult {
            result_id: Uuid::new_v4(),
            scope1,
            scope2,
            scope3,
            total,
            line_results,
            failed_lines,
            low_confidence_lines,
            breakdown,
            catalog_id: catalog.catalog_id.clone(),
            computed_at: Utc::now(),
            intensity_per_employee,
            intensity_per_revenue,
        })
    }

    /// Re-run the same records under two pinned catalogs and report the
    /// per-line and total deltas. Lines are aligned by record index.
    pub fn diff(
        &self,
        records: &[ActivityRecord],
        catalog_a: &CatalogSnapshot,
        catalog_b: &CatalogSnapshot,
        profile: &CompanyProfile,
    ) -> Result<CatalogDiffReport, CalcError> {
        let result_a = self.calculate(records, catalog_a, profile)?;
        let result_b = self.calculate(records, catalog_b, profile)?;

        let by_index = |result: &FootprintResult| -> BTreeMap<usize, LineResult> {
            result
                .line_results
                .iter()
                .map(|line| (line.record_index, line.clone()))
                .collect()
        };
        let lines_a = by_index(&result_a);
        let lines_b = by_index(&result_b);

        let mut line_deltas = Vec::new();
        for record_index in 0..records.len() {
            let a = lines_a.get(&record_index);
            let b = lines_b.get(&record_index);
            if a.is_none() && b.is_none() {
                continue;
            }
            let co2e_a = a.map(|l| l.co2e).unwrap_or(Co2e::ZERO);
            let co2e_b = b.map(|l| l.co2e).unwrap_or(Co2e::ZERO);
            if co2e_a == co2e_b {
                continue;
            }
            line_deltas.push(LineDelta {
                record_index,
                co2e_a,
                co2e_b,
                delta_kg: co2e_b.as_kg() - co2e_a.as_kg(),
                factor_a: a.map(|l| (l.factor_match.factor_id.clone(), l.factor_match.factor_version)),
                factor_b: b.map(|l| (l.factor_match.factor_id.clone(), l.factor_match.factor_version)),
            });
        }

        Ok(CatalogDiffReport {
            catalog_a: catalog_a.catalog_id.clone(),
            catalog_b: catalog_b.catalog_id.clone(),
            total_a: result_a.total,
            total_b: result_b.total,
            total_delta_kg: result_b.total.as_kg() - result_a.total.as_kg(),
            line_deltas,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineDelta {
    pub record_index: usize,
    pub co2e_a: Co2e,
    pub co2e_b: Co2e,
    pub delta_kg: Decimal,
    pub factor_a: Option<(cscore_core::FactorId, u32)>,
    pub factor_b: Option<(cscore_core::FactorId, u32)>,
}

/// Same activity records, two pinned catalogs: what changed and by how much.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDiffReport {
    pub catalog_a: String,
    pub catalog_b: String,
    pub total_a: Co2e,
    pub total_b: Co2e,
    pub total_delta_kg: Decimal,
    pub line_deltas: Vec<LineDelta>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use cscore_core::{EmployeeBand, FactorId, Unit};
    use cscore_registry::{FactorDraft, FactorRegistry};
    use rust_decimal_macros::dec;

    fn publish(
        registry: &FactorRegistry,
        id: &str,
        description: &str,
        category: FactorCategory,
        unit: Unit,
        value: Decimal,
        scope: Scope,
    ) {
        registry
            .publish(FactorDraft {
                factor_id: FactorId::new(id),
                description: description.into(),
                category,
                unit,
                co2e_per_unit: value,
                scope,
                valid_from: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                valid_until: None,
                source_citation: "ADEME Base Carbone v17".into(),
                uncertainty_pct: None,
                sector_average_for: None,
            })
            .unwrap();
    }

    fn seeded_catalog() -> CatalogSnapshot {
        let registry = FactorRegistry::new();
        publish(
            &registry,
            "elec-fr",
            "Electricite reseau France",
            FactorCategory::Electricity,
            Unit::KilowattHour,
            dec!(0.0571),
            Scope::Scope2,
        );
        publish(
            &registry,
            "gaz-naturel",
            "Gaz naturel PCI",
            FactorCategory::Gas,
            Unit::KilowattHour,
            dec!(0.227),
            Scope::Scope1,
        );
        publish(
            &registry,
            "achats-biens",
            "Achats de biens manufactures",
            FactorCategory::MaterialPurchase,
            Unit::Euro,
            dec!(0.45),
            Scope::Scope3,
        );
        registry.resolve_catalog(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap())
    }

    fn record(category: FactorCategory, quantity: Decimal, unit: Unit) -> ActivityRecord {
        ActivityRecord {
            category,
            quantity,
            unit,
            raw_label: None,
            sector_hint: None,
        }
    }

    fn profile(employee_count: u32) -> CompanyProfile {
        CompanyProfile {
            sector: "services".into(),
            employee_band: EmployeeBand::Small,
            employee_count,
            annual_revenue_eur: Some(dec!(500000)),
        }
    }

    #[test]
    fn electricity_example_yields_57_1_kg() {
        let catalog = seeded_catalog();
        let result = CalculationEngine::default()
            .calculate(
                &[record(FactorCategory::Electricity, dec!(1000), Unit::KilowattHour)],
                &catalog,
                &profile(25),
            )
            .unwrap();
        assert_eq!(result.line_results[0].co2e.as_kg(), dec!(57.1));
        assert_eq!(result.scope2.as_kg(), dec!(57.1));
    }

    #[test]
    fn total_is_exactly_the_sum_of_scopes() {
        let catalog = seeded_catalog();
        let result = CalculationEngine::default()
            .calculate(
                &[
                    record(FactorCategory::Electricity, dec!(25000), Unit::KilowattHour),
                    record(FactorCategory::Gas, dec!(15000), Unit::KilowattHour),
                    record(FactorCategory::MaterialPurchase, dec!(300000), Unit::Euro),
                ],
                &catalog,
                &profile(25),
            )
            .unwrap();
        assert_eq!(
            result.total.milligrams(),
            result.scope1.milligrams() + result.scope2.milligrams() + result.scope3.milligrams()
        );
        assert!(result.failed_lines.is_empty());
    }

    #[test]
    fn recomputation_is_bit_identical() {
        let catalog = seeded_catalog();
        let records = vec![
            record(FactorCategory::Electricity, dec!(25000), Unit::KilowattHour),
            record(FactorCategory::Gas, dec!(15000), Unit::KilowattHour),
        ];
        let engine = CalculationEngine::default();
        let first = engine.calculate(&records, &catalog, &profile(25)).unwrap();
        let second = engine.calculate(&records, &catalog, &profile(25)).unwrap();
        assert_eq!(first.total.milligrams(), second.total.milligrams());
        assert_eq!(first.catalog_id, second.catalog_id);
    }

    #[test]
    fn zero_quantity_still_produces_a_ledger_line() {
        let catalog = seeded_catalog();
        let result = CalculationEngine::default()
            .calculate(
                &[record(FactorCategory::Electricity, dec!(0), Unit::KilowattHour)],
                &catalog,
                &profile(25),
            )
            .unwrap();
        assert_eq!(result.line_results.len(), 1);
        assert_eq!(result.line_results[0].co2e, Co2e::ZERO);
    }

    #[test]
    fn unconvertible_line_fails_without_aborting_the_batch() {
        let catalog = seeded_catalog();
        let result = CalculationEngine::default()
            .calculate(
                &[
                    record(FactorCategory::Electricity, dec!(1000), Unit::KilowattHour),
                    record(FactorCategory::Gas, dec!(500), Unit::Tonne),
                ],
                &catalog,
                &profile(25),
            )
            .unwrap();
        assert_eq!(result.line_results.len(), 1);
        assert_eq!(result.failed_lines.len(), 1);
        assert_eq!(result.failed_lines[0].record_index, 1);
        assert_eq!(result.total.as_kg(), dec!(57.1));
    }

    #[test]
    fn overflowing_line_degrades_to_failed_instead_of_aborting() {
        let registry = FactorRegistry::new();
        publish(
            &registry,
            "elec-fr",
            "Electricite reseau France",
            FactorCategory::Electricity,
            Unit::KilowattHour,
            dec!(0.0571),
            Scope::Scope2,
        );
        publish(
            &registry,
            "achats-services",
            "Achats de services",
            FactorCategory::ServicePurchase,
            Unit::Euro,
            dec!(100),
            Scope::Scope3,
        );
        let catalog = registry.resolve_catalog(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());

        // Non-negative and structurally valid, but the product overflows
        // the fixed-point range: that line fails, the batch survives.
        let result = CalculationEngine::default()
            .calculate(
                &[
                    record(FactorCategory::Electricity, dec!(1000), Unit::KilowattHour),
                    record(FactorCategory::ServicePurchase, Decimal::MAX, Unit::Euro),
                ],
                &catalog,
                &profile(25),
            )
            .unwrap();
        assert_eq!(result.line_results.len(), 1);
        assert_eq!(result.failed_lines.len(), 1);
        assert_eq!(result.failed_lines[0].record_index, 1);
        assert_eq!(result.total.as_kg(), dec!(57.1));
    }

    #[test]
    fn negative_quantity_is_fatal_for_the_request() {
        let catalog = seeded_catalog();
        let err = CalculationEngine::default()
            .calculate(
                &[record(FactorCategory::Electricity, dec!(-5), Unit::KilowattHour)],
                &catalog,
                &profile(25),
            )
            .unwrap_err();
        assert!(matches!(err, CalcError::InvalidActivity { index: 0, .. }));
    }

    #[test]
    fn zero_employees_disables_intensity_instead_of_dividing() {
        let catalog = seeded_catalog();
        let result = CalculationEngine::default()
            .calculate(
                &[record(FactorCategory::Electricity, dec!(1000), Unit::KilowattHour)],
                &catalog,
                &profile(0),
            )
            .unwrap();
        assert_eq!(result.intensity_per_employee, None);
        assert!(result.intensity_per_revenue.is_some());
    }

    #[test]
    fn no_line_is_negative_when_inputs_are_non_negative() {
        let catalog = seeded_catalog();
        let result = CalculationEngine::default()
            .calculate(
                &[
                    record(FactorCategory::Electricity, dec!(25000), Unit::KilowattHour),
                    record(FactorCategory::Gas, dec!(0), Unit::KilowattHour),
                    record(FactorCategory::MaterialPurchase, dec!(12.5), Unit::KiloEuro),
                ],
                &catalog,
                &profile(25),
            )
            .unwrap();
        assert!(result.line_results.iter().all(|l| !l.co2e.is_negative()));
    }

    #[test]
    fn diff_reports_factor_revisions_between_catalogs() {
        let registry = FactorRegistry::new();
        registry
            .publish(FactorDraft {
                factor_id: FactorId::new("elec-fr"),
                description: "Electricite reseau France".into(),
                category: FactorCategory::Electricity,
                unit: Unit::KilowattHour,
                co2e_per_unit: dec!(0.0571),
                scope: Scope::Scope2,
                valid_from: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                valid_until: Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
                source_citation: "v17".into(),
                uncertainty_pct: None,
                sector_average_for: None,
            })
            .unwrap();
        registry
            .publish(FactorDraft {
                factor_id: FactorId::new("elec-fr"),
                description: "Electricite reseau France".into(),
                category: FactorCategory::Electricity,
                unit: Unit::KilowattHour,
                co2e_per_unit: dec!(0.0579),
                scope: Scope::Scope2,
                valid_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                valid_until: None,
                source_citation: "v18".into(),
                uncertainty_pct: None,
                sector_average_for: None,
            })
            .unwrap();

        let catalog_a = registry.resolve_catalog(NaiveDate::from_ymd_opt(2023, 6, 1).unwrap());
        let catalog_b = registry.resolve_catalog(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        let records = vec![record(FactorCategory::Electricity, dec!(1000), Unit::KilowattHour)];

        let report = CalculationEngine::default()
            .diff(&records, &catalog_a, &catalog_b, &profile(25))
            .unwrap();
        assert_eq!(report.line_deltas.len(), 1);
        assert_eq!(report.total_delta_kg, dec!(0.8));
        assert_eq!(report.line_deltas[0].factor_a.as_ref().unwrap().1, 1);
        assert_eq!(report.line_deltas[0].factor_b.as_ref().unwrap().1, 2);
    }
}
