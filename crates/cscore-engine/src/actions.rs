//! Structured reduction-action catalog and the priority scorer.
//!
//! Actions are data, not prose: each candidate carries a structured impact
//! formula and applicability predicate evaluated against footprint lines.

use cscore_core::{Co2e, FactorCategory, FootprintResult, Scope};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("scoring weights must sum to 1.0, got {sum}")]
    InvalidWeights { sum: f64 },
    #[error("malformed action catalog: {reason}")]
    InvalidCatalog { reason: String },
}

/// One emission line reduced to what formulas and predicates need.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmissionSlice {
    pub category: FactorCategory,
    pub scope: Scope,
    pub co2e: Co2e,
}

impl EmissionSlice {
    pub fn from_footprint(footprint: &FootprintResult) -> Vec<EmissionSlice> {
        footprint
            .line_results
            .iter()
            .map(|line| EmissionSlice {
                category: line.factor_category,
                scope: line.factor_scope,
                co2e: line.co2e,
            })
            .collect()
    }
}

/// Pure impact function over footprint slices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImpactFormula {
    /// `fraction` of the emissions in one category, optionally narrowed
    /// to a scope (e.g. 80% of scope-2 electricity).
    CategoryFraction {
        category: FactorCategory,
        #[serde(default)]
        scope: Option<Scope>,
        fraction: Decimal,
    },
    /// `fraction` of the whole footprint.
    TotalFraction { fraction: Decimal },
}

impl ImpactFormula {
    pub fn fraction(&self) -> Decimal {
        match self {
            ImpactFormula::CategoryFraction { fraction, .. } => *fraction,
            ImpactFormula::TotalFraction { fraction } => *fraction,
        }
    }

    fn targets(&self, slice: &EmissionSlice) -> bool {
        match self {
            ImpactFormula::CategoryFraction {
                category, scope, ..
            } => slice.category == *category && scope.map_or(true, |s| slice.scope == s),
            ImpactFormula::TotalFraction { .. } => true,
        }
    }

    /// Impact against the given baseline, without mutating it.
    pub fn evaluate(&self, slices: &[EmissionSlice]) -> Co2e {
        slices
            .iter()
            .filter(|slice| self.targets(slice))
            .map(|slice| scale_co2e(slice.co2e, self.fraction()))
            .sum()
    }

    /// Reduce the targeted slices in place and return the realized
    /// reduction. A slice never goes below zero.
    pub fn apply(&self, slices: &mut [EmissionSlice]) -> Co2e {
        let fraction = self.fraction();
        let mut realized = Co2e::ZERO;
        for slice in slices.iter_mut().filter(|s| self.targets(s)) {
            let cut = scale_co2e(slice.co2e, fraction).min(slice.co2e);
            slice.co2e = slice.co2e.saturating_sub(cut);
            realized = realized.saturating_add(cut);
        }
        realized
    }
}

fn scale_co2e(co2e: Co2e, fraction: Decimal) -> Co2e {
    let mg = (Decimal::from(co2e.milligrams()) * fraction)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    Co2e::from_milligrams(mg.to_i64().unwrap_or(i64::MAX))
}

/// Structured filter deciding whether an action applies to a footprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApplicabilityPredicate {
    Always,
    /// Applies only while the named slice still has emissions.
    CategoryEmissionsPositive {
        category: FactorCategory,
        #[serde(default)]
        scope: Option<Scope>,
    },
    TotalAtLeastKg { kg: Decimal },
}

impl ApplicabilityPredicate {
    pub fn evaluate(&self, slices: &[EmissionSlice]) -> bool {
        match self {
            ApplicabilityPredicate::Always => true,
            ApplicabilityPredicate::CategoryEmissionsPositive { category, scope } => slices
                .iter()
                .any(|slice| {
                    slice.category == *category
                        && scope.map_or(true, |s| slice.scope == s)
                        && slice.co2e > Co2e::ZERO
                }),
            ApplicabilityPredicate::TotalAtLeastKg { kg } => {
                let total: Co2e = slices.iter().map(|s| s.co2e).sum();
                total.as_kg() >= *kg
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostRange {
    pub min_eur: Decimal,
    pub max_eur: Decimal,
}

impl CostRange {
    pub fn mid(&self) -> Decimal {
        (self.min_eur + self.max_eur) / Decimal::TWO
    }

    pub fn zero() -> Self {
        Self {
            min_eur: Decimal::ZERO,
            max_eur: Decimal::ZERO,
        }
    }

    pub fn plus(&self, other: &CostRange) -> CostRange {
        CostRange {
            min_eur: self.min_eur + other.min_eur,
            max_eur: self.max_eur + other.max_eur,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCandidate {
    pub action_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub impact_formula: ImpactFormula,
    pub cost_estimate_range: CostRange,
    pub feasibility_score: f64,
    pub applicability: ApplicabilityPredicate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCatalog {
    pub actions: Vec<ActionCandidate>,
}

impl ActionCatalog {
    pub fn from_yaml_str(text: &str) -> Result<Self, ActionError> {
        let catalog: ActionCatalog =
            serde_yaml::from_str(text).map_err(|err| ActionError::InvalidCatalog {
                reason: err.to_string(),
            })?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<(), ActionError> {
        for action in &self.actions {
            let fraction = action.impact_formula.fraction();
            if fraction < Decimal::ZERO || fraction > Decimal::ONE {
                return Err(ActionError::InvalidCatalog {
                    reason: format!(
                        "action {} has impact fraction {} outside 0..=1",
                        action.action_id, fraction
                    ),
                });
            }
            if !(0.0..=1.0).contains(&action.feasibility_score) {
                return Err(ActionError::InvalidCatalog {
                    reason: format!(
                        "action {} has feasibility {} outside 0..=1",
                        action.action_id, action.feasibility_score
                    ),
                });
            }
            if action.cost_estimate_range.min_eur > action.cost_estimate_range.max_eur {
                return Err(ActionError::InvalidCatalog {
                    reason: format!("action {} has an inverted cost range", action.action_id),
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, action_id: &str) -> Option<&ActionCandidate> {
        self.actions.iter().find(|a| a.action_id == action_id)
    }

    /// Built-in action bank mirroring the standard recommendation set.
    pub fn builtin() -> Self {
        fn eur(min: i64, max: i64) -> CostRange {
            CostRange {
                min_eur: Decimal::from(min),
                max_eur: Decimal::from(max),
            }
        }

        let actions = vec![
            ActionCandidate {
                action_id: "electrify_fleet".into(),
                title: "Electrification de la flotte".into(),
                description: "Remplacer les vehicules thermiques par des vehicules electriques"
                    .into(),
                category: "transport".into(),
                impact_formula: ImpactFormula::CategoryFraction {
                    category: FactorCategory::VehicleKm,
                    scope: Some(Scope::Scope1),
                    fraction: Decimal::new(7, 1),
                },
                cost_estimate_range: eur(25_000, 120_000),
                feasibility_score: 0.6,
                applicability: ApplicabilityPredicate::CategoryEmissionsPositive {
                    category: FactorCategory::VehicleKm,
                    scope: Some(Scope::Scope1),
                },
            },
            ActionCandidate {
                action_id: "energy_efficiency".into(),
                title: "Efficacite energetique".into(),
                description: "Isolation, LED, equipements performants".into(),
                category: "energie".into(),
                impact_formula: ImpactFormula::CategoryFraction {
                    category: FactorCategory::Gas,
                    scope: None,
                    fraction: Decimal::new(25, 2),
                },
                cost_estimate_range: eur(5_000, 40_000),
                feasibility_score: 0.9,
                applicability: ApplicabilityPredicate::CategoryEmissionsPositive {
                    category: FactorCategory::Gas,
                    scope: None,
                },
            },
            ActionCandidate {
                action_id: "local_sourcing".into(),
                title: "Approvisionnement local".into(),
                description: "Privilegier les fournisseurs locaux".into(),
                category: "achats".into(),
                impact_formula: ImpactFormula::CategoryFraction {
                    category: FactorCategory::MaterialPurchase,
                    scope: None,
                    fraction: Decimal::new(15, 2),
                },
                cost_estimate_range: eur(0, 5_000),
                feasibility_score: 0.7,
                applicability: ApplicabilityPredicate::CategoryEmissionsPositive {
                    category: FactorCategory::MaterialPurchase,
                    scope: None,
                },
            },
            ActionCandidate {
                action_id: "reduce_electricity".into(),
                title: "Sobriete electrique".into(),
                description: "Reduire la consommation electrique des equipements".into(),
                category: "energie".into(),
                impact_formula: ImpactFormula::CategoryFraction {
                    category: FactorCategory::Electricity,
                    scope: Some(Scope::Scope2),
                    fraction: Decimal::new(3, 1),
                },
                cost_estimate_range: eur(1_000, 15_000),
                feasibility_score: 0.85,
                applicability: ApplicabilityPredicate::CategoryEmissionsPositive {
                    category: FactorCategory::Electricity,
                    scope: Some(Scope::Scope2),
                },
            },
            ActionCandidate {
                action_id: "renewable_energy".into(),
                title: "Electricite renouvelable".into(),
                description: "Souscrire un contrat d'electricite verte".into(),
                category: "energie".into(),
                impact_formula: ImpactFormula::CategoryFraction {
                    category: FactorCategory::Electricity,
                    scope: Some(Scope::Scope2),
                    fraction: Decimal::new(8, 1),
                },
                cost_estimate_range: eur(0, 8_000),
                feasibility_score: 0.7,
                applicability: ApplicabilityPredicate::CategoryEmissionsPositive {
                    category: FactorCategory::Electricity,
                    scope: Some(Scope::Scope2),
                },
            },
            ActionCandidate {
                action_id: "remote_work".into(),
                title: "Teletravail".into(),
                description: "Teletravail partiel pour reduire les trajets domicile-travail"
                    .into(),
                category: "transport".into(),
                impact_formula: ImpactFormula::CategoryFraction {
                    category: FactorCategory::VehicleKm,
                    scope: Some(Scope::Scope3),
                    fraction: Decimal::new(3, 1),
                },
                cost_estimate_range: eur(0, 3_000),
                feasibility_score: 0.8,
                applicability: ApplicabilityPredicate::CategoryEmissionsPositive {
                    category: FactorCategory::VehicleKm,
                    scope: Some(Scope::Scope3),
                },
            },
            ActionCandidate {
                action_id: "video_conferencing".into(),
                title: "Visioconference".into(),
                description: "Remplacer une partie des deplacements aeriens".into(),
                category: "transport".into(),
                impact_formula: ImpactFormula::CategoryFraction {
                    category: FactorCategory::FlightKm,
                    scope: None,
                    fraction: Decimal::new(4, 1),
                },
                cost_estimate_range: eur(0, 2_000),
                feasibility_score: 0.9,
                applicability: ApplicabilityPredicate::CategoryEmissionsPositive {
                    category: FactorCategory::FlightKm,
                    scope: None,
                },
            },
            ActionCandidate {
                action_id: "waste_reduction".into(),
                title: "Reduction des dechets".into(),
                description: "Tri, compostage et reduction a la source".into(),
                category: "dechets".into(),
                impact_formula: ImpactFormula::CategoryFraction {
                    category: FactorCategory::WasteTreatment,
                    scope: None,
                    fraction: Decimal::new(3, 1),
                },
                cost_estimate_range: eur(500, 6_000),
                feasibility_score: 0.8,
                applicability: ApplicabilityPredicate::CategoryEmissionsPositive {
                    category: FactorCategory::WasteTreatment,
                    scope: None,
                },
            },
        ];
        Self { actions }
    }
}

/// Relative weighting of impact, cost, and feasibility in the priority
/// score. Configuration, not business logic; must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub impact_weight: f64,
    pub cost_weight: f64,
    pub feasibility_weight: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            impact_weight: 0.5,
            cost_weight: 0.3,
            feasibility_weight: 0.2,
        }
    }
}

impl ScoringWeights {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let read = |key: &str, fallback: f64| {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(fallback)
        };
        Self {
            impact_weight: read("CSCORE_IMPACT_WEIGHT", defaults.impact_weight),
            cost_weight: read("CSCORE_COST_WEIGHT", defaults.cost_weight),
            feasibility_weight: read("CSCORE_FEASIBILITY_WEIGHT", defaults.feasibility_weight),
        }
    }

    pub fn validate(&self) -> Result<(), ActionError> {
        let sum = self.impact_weight + self.cost_weight + self.feasibility_weight;
        if (sum - 1.0).abs() > 1e-9 {
            return Err(ActionError::InvalidWeights { sum });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredAction {
    pub candidate: ActionCandidate,
    pub impact: Co2e,
    pub priority: f64,
}

#[derive(Debug)]
pub struct ActionScorer {
    weights: ScoringWeights,
}

impl Default for ActionScorer {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
        }
    }
}

impl ActionScorer {
    pub fn new(weights: ScoringWeights) -> Result<Self, ActionError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    /// Filter inapplicable candidates, compute impacts, and rank by the
    /// weighted priority score. Ties break on higher feasibility, then
    /// lower mid-range cost.
    pub fn score_actions(
        &self,
        footprint: &FootprintResult,
        catalog: &ActionCatalog,
    ) -> Result<Vec<ScoredAction>, ActionError> {
        catalog.validate()?;
        let slices = EmissionSlice::from_footprint(footprint);

        let mut scored: Vec<(ActionCandidate, Co2e)> = catalog
            .actions
            .iter()
            .filter(|action| action.applicability.evaluate(&slices))
            .map(|action| (action.clone(), action.impact_formula.evaluate(&slices)))
            .collect();

        let max_impact_kg = scored
            .iter()
            .map(|(_, impact)| impact.as_kg().to_f64().unwrap_or_default())
            .fold(0.0f64, f64::max);
        let max_cost = scored
            .iter()
            .map(|(action, _)| action.cost_estimate_range.mid())
            .fold(Decimal::ZERO, Decimal::max);

        let mut results: Vec<ScoredAction> = scored
            .drain(..)
            .map(|(candidate, impact)| {
                let impact_norm = if max_impact_kg > 0.0 {
                    impact.as_kg().to_f64().unwrap_or_default() / max_impact_kg
                } else {
                    0.0
                };
                let cost_norm = if max_cost > Decimal::ZERO {
                    1.0 - (candidate.cost_estimate_range.mid() / max_cost)
                        .to_f64()
                        .unwrap_or_default()
                } else {
                    1.0
                };
                let priority = self.weights.impact_weight * impact_norm
                    + self.weights.cost_weight * cost_norm
                    + self.weights.feasibility_weight * candidate.feasibility_score;
                debug!(action_id = %candidate.action_id, priority, "scored action");
                ScoredAction {
                    candidate,
                    impact,
                    priority,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.candidate
                        .feasibility_score
                        .partial_cmp(&a.candidate.feasibility_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| {
                    a.candidate
                        .cost_estimate_range
                        .mid()
                        .cmp(&b.candidate.cost_estimate_range.mid())
                })
        });
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn slice(category: FactorCategory, scope: Scope, kg: Decimal) -> EmissionSlice {
        EmissionSlice {
            category,
            scope,
            co2e: Co2e::from_kg(kg).unwrap(),
        }
    }

    fn footprint_from_slices(slices: &[EmissionSlice]) -> FootprintResult {
        use chrono::Utc;
        use cscore_core::{ActivityRecord, FactorId, FactorMatch, LineResult, MatchMethod, Unit};
        use uuid::Uuid;

        let mut scope_totals = [Co2e::ZERO; 3];
        let line_results = slices
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let idx = match s.scope {
                    Scope::Scope1 => 0,
                    Scope::Scope2 => 1,
                    Scope::Scope3 => 2,
                };
                scope_totals[idx] = scope_totals[idx].saturating_add(s.co2e);
                LineResult {
                    record_index: i,
                    record: ActivityRecord {
                        category: s.category,
                        quantity: dec!(1),
                        unit: Unit::KilowattHour,
                        raw_label: None,
                        sector_hint: None,
                    },
                    factor_match: FactorMatch {
                        factor_id: FactorId::new(format!("f{i}")),
                        factor_version: 1,
                        confidence: 1.0,
                        method: MatchMethod::ExactUnitCategory,
                    },
                    factor_category: s.category,
                    factor_scope: s.scope,
                    co2e: s.co2e,
                }
            })
            .collect();

        FootprintResult {
            result_id: Uuid::new_v4(),
            scope1: scope_totals[0],
            scope2: scope_totals[1],
            scope3: scope_totals[2],
            total: scope_totals[0] + scope_totals[1] + scope_totals[2],
            line_results,
            failed_lines: vec![],
            low_confidence_lines: vec![],
            breakdown: Default::default(),
            catalog_id: "test-catalog".into(),
            computed_at: Utc::now(),
            intensity_per_employee: None,
            intensity_per_revenue: None,
        }
    }

    #[test]
    fn category_fraction_evaluates_over_matching_slices_only() {
        let slices = vec![
            slice(FactorCategory::Electricity, Scope::Scope2, dec!(100)),
            slice(FactorCategory::Gas, Scope::Scope1, dec!(50)),
        ];
        let formula = ImpactFormula::CategoryFraction {
            category: FactorCategory::Electricity,
            scope: Some(Scope::Scope2),
            fraction: dec!(0.8),
        };
        assert_eq!(formula.evaluate(&slices).as_kg(), dec!(80));
    }

    #[test]
    fn apply_reduces_in_place_and_never_goes_below_zero() {
        let mut slices = vec![slice(FactorCategory::Electricity, Scope::Scope2, dec!(100))];
        let formula = ImpactFormula::CategoryFraction {
            category: FactorCategory::Electricity,
            scope: None,
            fraction: dec!(1.0),
        };
        let first = formula.apply(&mut slices);
        let second = formula.apply(&mut slices);
        assert_eq!(first.as_kg(), dec!(100));
        assert_eq!(second, Co2e::ZERO);
        assert_eq!(slices[0].co2e, Co2e::ZERO);
    }

    #[test]
    fn inapplicable_actions_are_filtered_out() {
        // No vehicle emissions at all: fleet electrification must not rank.
        let footprint = footprint_from_slices(&[slice(
            FactorCategory::Electricity,
            Scope::Scope2,
            dec!(100),
        )]);
        let ranked = ActionScorer::default()
            .score_actions(&footprint, &ActionCatalog::builtin())
            .unwrap();
        assert!(ranked
            .iter()
            .all(|a| a.candidate.action_id != "electrify_fleet"));
        assert!(ranked
            .iter()
            .any(|a| a.candidate.action_id == "renewable_energy"));
    }

    #[test]
    fn larger_impact_ranks_first_all_else_equal() {
        let footprint = footprint_from_slices(&[
            slice(FactorCategory::Electricity, Scope::Scope2, dec!(1000)),
            slice(FactorCategory::FlightKm, Scope::Scope3, dec!(10)),
        ]);
        let catalog = ActionCatalog {
            actions: vec![
                ActionCandidate {
                    action_id: "a-small".into(),
                    title: "small".into(),
                    description: String::new(),
                    category: "transport".into(),
                    impact_formula: ImpactFormula::CategoryFraction {
                        category: FactorCategory::FlightKm,
                        scope: None,
                        fraction: dec!(0.4),
                    },
                    cost_estimate_range: CostRange::zero(),
                    feasibility_score: 0.8,
                    applicability: ApplicabilityPredicate::Always,
                },
                ActionCandidate {
                    action_id: "b-large".into(),
                    title: "large".into(),
                    description: String::new(),
                    category: "energie".into(),
                    impact_formula: ImpactFormula::CategoryFraction {
                        category: FactorCategory::Electricity,
                        scope: None,
                        fraction: dec!(0.8),
                    },
                    cost_estimate_range: CostRange::zero(),
                    feasibility_score: 0.8,
                    applicability: ApplicabilityPredicate::Always,
                },
            ],
        };
        let ranked = ActionScorer::default()
            .score_actions(&footprint, &catalog)
            .unwrap();
        assert_eq!(ranked[0].candidate.action_id, "b-large");
    }

    #[test]
    fn ties_break_on_feasibility_then_cost() {
        let footprint = footprint_from_slices(&[slice(
            FactorCategory::Electricity,
            Scope::Scope2,
            dec!(100),
        )]);
        let base = ActionCandidate {
            action_id: String::new(),
            title: String::new(),
            description: String::new(),
            category: "energie".into(),
            impact_formula: ImpactFormula::CategoryFraction {
                category: FactorCategory::Electricity,
                scope: None,
                fraction: dec!(0.5),
            },
            cost_estimate_range: CostRange::zero(),
            feasibility_score: 0.5,
            applicability: ApplicabilityPredicate::Always,
        };
        let mut low = base.clone();
        low.action_id = "low-feasibility".into();
        let mut high = base.clone();
        high.action_id = "high-feasibility".into();
        high.feasibility_score = 0.9;

        // Equal weights on impact only: identical priority, feasibility
        // must decide the order.
        let scorer = ActionScorer::new(ScoringWeights {
            impact_weight: 1.0,
            cost_weight: 0.0,
            feasibility_weight: 0.0,
        })
        .unwrap();
        let ranked = scorer
            .score_actions(
                &footprint,
                &ActionCatalog {
                    actions: vec![low, high],
                },
            )
            .unwrap();
        assert_eq!(ranked[0].candidate.action_id, "high-feasibility");
    }

    #[test]
    fn weights_must_sum_to_one() {
        let err = ActionScorer::new(ScoringWeights {
            impact_weight: 0.5,
            cost_weight: 0.5,
            feasibility_weight: 0.5,
        })
        .unwrap_err();
        assert!(matches!(err, ActionError::InvalidWeights { .. }));
    }

    #[test]
    fn catalog_loads_from_yaml() {
        let yaml = r#"
actions:
  - action_id: green_power
    title: Electricite verte
    description: Contrat renouvelable
    category: energie
    impact_formula:
      kind: category_fraction
      category: electricity
      scope: scope2
      fraction: "0.8"
    cost_estimate_range:
      min_eur: "0"
      max_eur: "8000"
    feasibility_score: 0.7
    applicability:
      kind: category_emissions_positive
      category: electricity
      scope: scope2
"#;
        let catalog = ActionCatalog::from_yaml_str(yaml).unwrap();
        assert_eq!(catalog.actions.len(), 1);
        assert_eq!(catalog.actions[0].impact_formula.fraction(), dec!(0.8));
    }

    #[test]
    fn out_of_range_fraction_is_rejected() {
        let mut catalog = ActionCatalog::builtin();
        if let ImpactFormula::CategoryFraction { fraction, .. } =
            &mut catalog.actions[0].impact_formula
        {
            *fraction = dec!(1.5);
        }
        assert!(matches!(
            catalog.validate(),
            Err(ActionError::InvalidCatalog { .. })
        ));
    }
}
