//! What-if simulation: apply a set of reduction actions to a computed
//! footprint and derive the residual footprint, cost, and payback.

use crate::actions::{ActionCatalog, CostRange, EmissionSlice};
use chrono::Utc;
use cscore_core::{Co2e, FootprintResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("unknown action id: {action_id}")]
    UnknownAction { action_id: String },
}

/// Terminal state of a simulation run. The simulator itself only ever
/// produces `Complete`; `Failed` is for callers persisting runs whose
/// action resolution errored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationState {
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    /// Internal carbon price used to express reductions as avoided cost.
    pub carbon_price_eur_per_tonne: Decimal,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            carbon_price_eur_per_tonne: Decimal::ONE_HUNDRED,
        }
    }
}

impl ScenarioConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let carbon_price_eur_per_tonne = std::env::var("CSCORE_CARBON_PRICE_EUR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.carbon_price_eur_per_tonne);
        Self {
            carbon_price_eur_per_tonne,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedAction {
    pub action_id: String,
    pub reduction: Co2e,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_id: Uuid,
    pub selected_action_ids: Vec<String>,
    pub applied: Vec<AppliedAction>,
    /// Actions whose predicate no longer held once earlier actions had
    /// consumed the emissions they target.
    pub skipped_infeasible: Vec<String>,
    pub total_reduction: Co2e,
    pub total_cost_estimate: CostRange,
    /// Months until the cost mid-point is paid back by avoided carbon
    /// cost at the configured price. None when nothing was reduced.
    pub roi_months: Option<Decimal>,
    pub residual_footprint: FootprintResult,
    pub state: SimulationState,
}

#[derive(Debug, Default)]
pub struct ScenarioSimulator {
    config: ScenarioConfig,
}

impl ScenarioSimulator {
    pub fn new(config: ScenarioConfig) -> Self {
        Self { config }
    }

    /// Apply the selected actions to the footprint, in ascending id order
    /// so the result is independent of caller ordering. Actions compound:
    /// each one sees the residual left by the previous, so two actions on
    /// the same emissions never reduce more than the lines held.
    pub fn simulate(
        &self,
        action_ids: &[String],
        footprint: &FootprintResult,
        catalog: &ActionCatalog,
    ) -> Result<ScenarioResult, ScenarioError> {
        let mut selected: Vec<String> = action_ids.to_vec();
        selected.sort();
        selected.dedup();

        let mut actions = Vec::with_capacity(selected.len());
        for action_id in &selected {
            match catalog.get(action_id) {
                Some(action) => actions.push(action),
                None => {
                    return Err(ScenarioError::UnknownAction {
                        action_id: action_id.clone(),
                    })
                }
            }
        }

        let mut slices = EmissionSlice::from_footprint(footprint);
        let mut applied = Vec::new();
        let mut skipped_infeasible = Vec::new();
        let mut total_cost_estimate = CostRange::zero();

        for action in actions {
            if !action.applicability.evaluate(&slices) {
                warn!(action_id = %action.action_id, "action no longer applicable, skipping");
                skipped_infeasible.push(action.action_id.clone());
                continue;
            }
            let reduction = action.impact_formula.apply(&mut slices);
            total_cost_estimate = total_cost_estimate.plus(&action.cost_estimate_range);
            applied.push(AppliedAction {
                action_id: action.action_id.clone(),
                reduction,
            });
        }

        let residual_footprint = rebuild_footprint(footprint, &slices);
        // Derived from the aggregate totals, not summed per action, so it
        // stays exact even when reductions overlapped.
        let total_reduction = footprint.total.saturating_sub(residual_footprint.total);
        let roi_months = payback_months(
            total_cost_estimate.mid(),
            total_reduction,
            self.config.carbon_price_eur_per_tonne,
        );

        info!(
            scenario_actions = applied.len(),
            skipped = skipped_infeasible.len(),
            reduction = %total_reduction,
            "simulated scenario"
        );

        Ok(ScenarioResult {
            scenario_id: Uuid::new_v4(),
            selected_action_ids: selected,
            applied,
            skipped_infeasible,
            total_reduction,
            total_cost_estimate,
            roi_months,
            residual_footprint,
            state: SimulationState::Complete,
        })
    }
}

fn payback_months(cost_mid: Decimal, reduction: Co2e, price_per_tonne: Decimal) -> Option<Decimal> {
    let avoided_per_year =
        (reduction.as_kg() / Decimal::ONE_THOUSAND).checked_mul(price_per_tonne)?;
    if avoided_per_year <= Decimal::ZERO {
        return None;
    }
    cost_mid
        .checked_div(avoided_per_year)?
        .checked_mul(Decimal::from(12))
}

/// New footprint with per-line emissions replaced by the residual slices.
/// Scope sums, the category breakdown, and intensities are recomputed the
/// same way the original aggregation computed them.
fn rebuild_footprint(original: &FootprintResult, slices: &[EmissionSlice]) -> FootprintResult {
    let mut residual = original.clone();
    residual.result_id = Uuid::new_v4();
    residual.computed_at = Utc::now();

    let mut scope1 = Co2e::ZERO;
    let mut scope2 = Co2e::ZERO;
    let mut scope3 = Co2e::ZERO;
    residual.breakdown.clear();
    for (line, slice) in residual.line_results.iter_mut().zip(slices) {
        line.co2e = slice.co2e;
        match line.factor_scope {
            cscore_core::Scope::Scope1 => scope1 = scope1.saturating_add(slice.co2e),
            cscore_core::Scope::Scope2 => scope2 = scope2.saturating_add(slice.co2e),
            cscore_core::Scope::Scope3 => scope3 = scope3.saturating_add(slice.co2e),
        }
        let entry = residual
            .breakdown
            .entry(line.factor_category)
            .or_insert(Co2e::ZERO);
        *entry = entry.saturating_add(slice.co2e);
    }
    residual.scope1 = scope1;
    residual.scope2 = scope2;
    residual.scope3 = scope3;
    residual.total = scope1.saturating_add(scope2).saturating_add(scope3);

    // Intensities scale with the total; the head count and revenue behind
    // them are unchanged by a reduction scenario.
    if original.total > Co2e::ZERO {
        let ratio = residual.total.as_kg() / original.total.as_kg();
        residual.intensity_per_employee = original.intensity_per_employee.map(|i| i * ratio);
        residual.intensity_per_revenue = original.intensity_per_revenue.map(|i| i * ratio);
    }
    residual
}
