//! Core domain model and fixed-point CO2e arithmetic for CarbonScore.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "cscore-core";

/// Milligrams per kilogram; the internal aggregation precision.
pub const MG_PER_KG: i64 = 1_000_000;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no conversion from {from} to {to}")]
    UnitMismatch { from: Unit, to: Unit },
    #[error("quantity out of fixed-point range: {value}")]
    NumericRange { value: Decimal },
    #[error("negative quantity {quantity} on activity record '{label}'")]
    NegativeQuantity { label: String, quantity: Decimal },
}

/// Integer milligrams of CO2e. All scope and total aggregation happens in
/// this type so that re-running a calculation yields bit-identical sums;
/// `Decimal` kilograms exist only at the boundary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Co2e(i64);

impl Co2e {
    pub const ZERO: Co2e = Co2e(0);

    pub fn from_milligrams(mg: i64) -> Self {
        Self(mg)
    }

    pub fn milligrams(self) -> i64 {
        self.0
    }

    /// Convert boundary kilograms into internal milligrams, rounding the
    /// sub-milligram remainder away from zero.
    pub fn from_kg(kg: Decimal) -> Result<Self, CoreError> {
        let mg = (kg * Decimal::from(MG_PER_KG))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        mg.to_i64()
            .map(Self)
            .ok_or(CoreError::NumericRange { value: kg })
    }

    pub fn as_kg(self) -> Decimal {
        Decimal::new(self.0, 6)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn saturating_add(self, other: Co2e) -> Co2e {
        Co2e(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Co2e) -> Co2e {
        Co2e(self.0.saturating_sub(other.0))
    }
}

impl std::ops::Add for Co2e {
    type Output = Co2e;

    fn add(self, rhs: Co2e) -> Co2e {
        self.saturating_add(rhs)
    }
}

impl std::iter::Sum for Co2e {
    fn sum<I: Iterator<Item = Co2e>>(iter: I) -> Co2e {
        iter.fold(Co2e::ZERO, Co2e::saturating_add)
    }
}

impl fmt::Display for Co2e {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} kgCO2e", self.as_kg())
    }
}

/// GHG Protocol emission scopes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Scope1,
    Scope2,
    Scope3,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FactorCategory {
    Electricity,
    Gas,
    LiquidFuel,
    SolidFuel,
    VehicleKm,
    FlightKm,
    RailKm,
    MaterialPurchase,
    ServicePurchase,
    WasteTreatment,
}

/// Physical or monetary unit an activity quantity is reported in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    KilowattHour,
    MegawattHour,
    Liter,
    CubicMeter,
    Kilogram,
    Tonne,
    Kilometer,
    Mile,
    Euro,
    KiloEuro,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Unit::KilowattHour => "kWh",
            Unit::MegawattHour => "MWh",
            Unit::Liter => "L",
            Unit::CubicMeter => "m3",
            Unit::Kilogram => "kg",
            Unit::Tonne => "t",
            Unit::Kilometer => "km",
            Unit::Mile => "mi",
            Unit::Euro => "EUR",
            Unit::KiloEuro => "kEUR",
        };
        f.write_str(label)
    }
}

/// Result of a unit conversion: the rescaled quantity plus the certainty of
/// the conversion itself (1.0 for every standard entry in the table).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConversion {
    pub quantity: Decimal,
    pub certainty: f64,
}

/// Table-driven pure conversion between reporting units. Unconvertible
/// pairs are a hard error, never a silent zero.
pub fn convert_quantity(quantity: Decimal, from: Unit, to: Unit) -> Result<UnitConversion, CoreError> {
    if from == to {
        return Ok(UnitConversion {
            quantity,
            certainty: 1.0,
        });
    }

    let scale = match (from, to) {
        (Unit::MegawattHour, Unit::KilowattHour) => Decimal::new(1000, 0),
        (Unit::KilowattHour, Unit::MegawattHour) => Decimal::new(1, 3),
        (Unit::Tonne, Unit::Kilogram) => Decimal::new(1000, 0),
        (Unit::Kilogram, Unit::Tonne) => Decimal::new(1, 3),
        (Unit::CubicMeter, Unit::Liter) => Decimal::new(1000, 0),
        (Unit::Liter, Unit::CubicMeter) => Decimal::new(1, 3),
        (Unit::Mile, Unit::Kilometer) => Decimal::new(1_609_344, 6),
        (Unit::Kilometer, Unit::Mile) => {
            let converted = quantity
                .checked_div(Decimal::new(1_609_344, 6))
                .ok_or(CoreError::NumericRange { value: quantity })?;
            return Ok(UnitConversion {
                quantity: converted,
                certainty: 1.0,
            });
        }
        (Unit::KiloEuro, Unit::Euro) => Decimal::new(1000, 0),
        (Unit::Euro, Unit::KiloEuro) => Decimal::new(1, 3),
        _ => return Err(CoreError::UnitMismatch { from, to }),
    };

    let converted = quantity
        .checked_mul(scale)
        .ok_or(CoreError::NumericRange { value: quantity })?;
    Ok(UnitConversion {
        quantity: converted,
        certainty: 1.0,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactorId(pub String);

impl FactorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FactorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One published, immutable emission factor version. Corrections are
/// published as a new version, never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionFactor {
    pub factor_id: FactorId,
    pub version: u32,
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
    /// Synthetic per-sector average factor used as the matcher's last
    /// resort; `None` for ordinary factors.
    #[serde(default)]
    pub sector_average_for: Option<String>,
}

/// One reported questionnaire line. Owned by a calculation request,
/// never persisted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub category: FactorCategory,
    pub quantity: Decimal,
    pub unit: Unit,
    #[serde(default)]
    pub raw_label: Option<String>,
    #[serde(default)]
    pub sector_hint: Option<String>,
}

impl ActivityRecord {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.quantity < Decimal::ZERO {
            return Err(CoreError::NegativeQuantity {
                label: self.raw_label.clone().unwrap_or_default(),
                quantity: self.quantity,
            });
        }
        Ok(())
    }
}

/// How a line item was resolved to a factor, strongest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    ExactUnitCategory,
    UnitCompatible,
    VectorSimilarity,
    SectorFallback,
}

impl MatchMethod {
    /// Monotonic rank: exact > unit-compatible > similarity > fallback.
    pub fn rank(self) -> u8 {
        match self {
            MatchMethod::ExactUnitCategory => 3,
            MatchMethod::UnitCompatible => 2,
            MatchMethod::VectorSimilarity => 1,
            MatchMethod::SectorFallback => 0,
        }
    }

    pub fn outranks(self, other: MatchMethod) -> bool {
        self.rank() > other.rank()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorMatch {
    pub factor_id: FactorId,
    pub factor_version: u32,
    pub confidence: f64,
    pub method: MatchMethod,
}

/// One computed ledger line with full provenance back to the activity
/// record and the pinned factor version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineResult {
    pub record_index: usize,
    pub record: ActivityRecord,
    pub factor_match: FactorMatch,
    pub factor_category: FactorCategory,
    pub factor_scope: Scope,
    pub co2e: Co2e,
}

/// A line excluded from totals, with the reason recorded for auditors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedLine {
    pub record_index: usize,
    pub record: ActivityRecord,
    pub reason: String,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum EmployeeBand {
    #[serde(rename = "1-9")]
    Micro,
    #[serde(rename = "10-49")]
    Small,
    #[serde(rename = "50-249")]
    Medium,
    #[serde(rename = "250+")]
    Large,
}

impl EmployeeBand {
    /// Representative headcount used when only the band is known.
    pub fn midpoint_headcount(self) -> u32 {
        match self {
            EmployeeBand::Micro => 5,
            EmployeeBand::Small => 25,
            EmployeeBand::Medium => 125,
            EmployeeBand::Large => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub sector: String,
    pub employee_band: EmployeeBand,
    /// Exact headcount when reported; zero means unknown and disables
    /// per-employee intensity rather than dividing by the band midpoint.
    pub employee_count: u32,
    #[serde(default)]
    pub annual_revenue_eur: Option<Decimal>,
}

/// Complete scoped footprint. `total` is the exact milligram sum of the
/// three scopes by construction; failed lines are excluded and reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootprintResult {
    pub result_id: Uuid,
    pub scope1: Co2e,
    pub scope2: Co2e,
    pub scope3: Co2e,
    pub total: Co2e,
    pub line_results: Vec<LineResult>,
    pub failed_lines: Vec<FailedLine>,
    /// Indices into `line_results` whose match was a sector fallback.
    pub low_confidence_lines: Vec<usize>,
    pub breakdown: BTreeMap<FactorCategory, Co2e>,
    pub catalog_id: String,
    pub computed_at: DateTime<Utc>,
    pub intensity_per_employee: Option<Decimal>,
    pub intensity_per_revenue: Option<Decimal>,
}

impl FootprintResult {
    pub fn scope_total(&self, scope: Scope) -> Co2e {
        match scope {
            Scope::Scope1 => self.scope1,
            Scope::Scope2 => self.scope2,
            Scope::Scope3 => self.scope3,
        }
    }
}

/// Anonymized peer data point, append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerObservation {
    pub sector: String,
    pub employee_band: EmployeeBand,
    pub intensity_per_employee: Decimal,
    #[serde(default)]
    pub intensity_per_revenue: Option<Decimal>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PositionLabel {
    Excellent,
    Bon,
    Moyen,
    AAmeliorer,
}

impl PositionLabel {
    pub fn from_percentile(percentile: f64) -> Self {
        if percentile <= 25.0 {
            PositionLabel::Excellent
        } else if percentile <= 50.0 {
            PositionLabel::Bon
        } else if percentile <= 75.0 {
            PositionLabel::Moyen
        } else {
            PositionLabel::AAmeliorer
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            PositionLabel::Excellent => "Excellent - top 25% du secteur",
            PositionLabel::Bon => "Bon - proche de la moyenne sectorielle",
            PositionLabel::Moyen => "Moyen - amelioration possible",
            PositionLabel::AAmeliorer => "A ameliorer - emissions elevees pour le secteur",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub percentile: f64,
    pub peer_median: Decimal,
    pub cluster_id: Option<u32>,
    pub position_label: PositionLabel,
    pub corpus_version: Uuid,
    pub peer_sample_size: usize,
    /// Sector (or broad industry group) the peer set was drawn from.
    pub sector_scope: String,
    pub used_broad_group_fallback: bool,
}
