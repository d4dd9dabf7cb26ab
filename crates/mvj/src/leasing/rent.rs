//! Rents of a lease and the yearly amounts derived from them.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::money::{Fraction, Money};
use crate::store::{create_nested, merge_nested, IdSource, NestedError, NestedRecord};

use super::domain::overlap;

entity_id!(RentId);
entity_id!(ContractRentId);
entity_id!(IndexAdjustedRentId);
entity_id!(RentAdjustmentId);
entity_id!(FixedInitialYearRentId);
entity_id!(RentDueDateId);
entity_id!(PayableRentId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentType {
    Index,
    Fixed,
    Free,
    Manual,
    OneTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentCycle {
    JanuaryToDecember,
    AprilToMarch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueDatesType {
    Custom,
    #[default]
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    PerMonth,
    PerYear,
}

impl PeriodType {
    pub const fn periods_per_year(self) -> i64 {
        match self {
            PeriodType::PerMonth => 12,
            PeriodType::PerYear => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentAdjustmentType {
    Discount,
    Increase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentAmountType {
    PercentagePerYear,
    AmountPerYear,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rent {
    pub id: RentId,
    #[serde(rename = "type")]
    pub rent_type: RentType,
    pub cycle: Option<RentCycle>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub due_dates_type: DueDatesType,
    pub due_dates_per_year: Option<u32>,
    pub due_dates: Vec<RentDueDate>,
    pub contract_rents: Vec<ContractRent>,
    pub index_adjusted_rents: Vec<IndexAdjustedRent>,
    pub rent_adjustments: Vec<RentAdjustment>,
    pub fixed_initial_year_rents: Vec<FixedInitialYearRent>,
    pub payable_rents: Vec<PayableRent>,
}

impl Rent {
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.start_date.map_or(true, |start| start <= date)
            && self.end_date.map_or(true, |end| date <= end)
    }

    pub fn contract_rent_for_date(&self, date: NaiveDate) -> Option<&ContractRent> {
        self.contract_rents
            .iter()
            .find(|rent| rent.is_active_on(date))
    }

    /// Day-weighted rent for a calendar year after discounts and increases.
    ///
    /// Each day carries the yearly rate in force on it: a fixed initial year rent when
    /// one covers the day, otherwise the active contract rent. Adjustments active on the
    /// day change that rate. The exact total is rounded to cents once at the end.
    pub fn yearly_amount_for_year(&self, year: i32) -> Money {
        if self.rent_type == RentType::Free {
            return Money::ZERO;
        }
        let (Some(first), Some(last)) = (
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year, 12, 31),
        ) else {
            return Money::ZERO;
        };
        let Some((from, to)) = overlap(self.start_date, self.end_date, first, last) else {
            return Money::ZERO;
        };

        let days_in_year = (last - first).num_days() + 1;
        let mut total: i128 = 0;
        for day in from.iter_days().take_while(|day| *day <= to) {
            let rate = self
                .fixed_initial_year_rents
                .iter()
                .find(|fixed| fixed.is_active_on(day))
                .map(|fixed| fixed.amount)
                .or_else(|| {
                    self.contract_rent_for_date(day)
                        .map(ContractRent::yearly_amount)
                });
            let Some(rate) = rate else {
                continue;
            };

            let base = i128::from(rate.cents()) * ADJUSTMENT_SCALE;
            let adjusted = self
                .rent_adjustments
                .iter()
                .filter(|adjustment| adjustment.is_active_on(day))
                .fold(base, |value, adjustment| {
                    value + adjustment.scaled_delta(rate)
                });
            total += adjusted.max(0);
        }

        Fraction::new(total, ADJUSTMENT_SCALE * i128::from(days_in_year))
            .map(|share| Money::from_cents(1).mul_fraction(share))
            .unwrap_or(Money::ZERO)
    }

    /// Replaces the payable rent of `year`, dropping it when the rent does not reach the year.
    pub fn record_payable_rent(&mut self, year: i32, ids: &dyn IdSource) {
        let existing = self
            .payable_rents
            .iter()
            .position(|payable| payable.year() == year);
        let id = existing
            .map(|index| self.payable_rents[index].id)
            .unwrap_or_else(|| PayableRentId(ids.next_id()));
        if let Some(index) = existing {
            self.payable_rents.remove(index);
        }
        if let Some(payable) = PayableRent::for_year(id, self, year) {
            self.payable_rents.push(payable);
            self.payable_rents.sort_by_key(|payable| payable.start_date);
        }
    }
}

/// Adjustment percentages carry two decimals, so deltas are kept in 1/10000 cents.
const ADJUSTMENT_SCALE: i128 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RentInput {
    #[serde(default)]
    pub id: Option<RentId>,
    #[serde(rename = "type")]
    pub rent_type: RentType,
    #[serde(default)]
    pub cycle: Option<RentCycle>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_dates_type: DueDatesType,
    #[serde(default)]
    pub due_dates_per_year: Option<u32>,
    #[serde(default)]
    pub due_dates: Vec<RentDueDateInput>,
    #[serde(default)]
    pub contract_rents: Vec<ContractRentInput>,
    #[serde(default)]
    pub index_adjusted_rents: Vec<IndexAdjustedRentInput>,
    #[serde(default)]
    pub rent_adjustments: Vec<RentAdjustmentInput>,
    #[serde(default)]
    pub fixed_initial_year_rents: Vec<FixedInitialYearRentInput>,
}

impl NestedRecord for Rent {
    type Input = RentInput;

    fn record_id(&self) -> u64 {
        self.id.0
    }

    fn input_id(input: &Self::Input) -> Option<u64> {
        input.id.map(|id| id.0)
    }

    fn create(id: u64, input: Self::Input, ids: &dyn IdSource) -> Result<Self, NestedError> {
        validate_range(input.start_date, input.end_date)?;
        Ok(Self {
            id: RentId(id),
            rent_type: input.rent_type,
            cycle: input.cycle,
            start_date: input.start_date,
            end_date: input.end_date,
            due_dates_type: input.due_dates_type,
            due_dates_per_year: input.due_dates_per_year,
            due_dates: create_nested(input.due_dates, ids)?,
            contract_rents: create_nested(input.contract_rents, ids)?,
            index_adjusted_rents: create_nested(input.index_adjusted_rents, ids)?,
            rent_adjustments: create_nested(input.rent_adjustments, ids)?,
            fixed_initial_year_rents: create_nested(input.fixed_initial_year_rents, ids)?,
            payable_rents: Vec::new(),
        })
    }

    fn apply(&mut self, input: Self::Input, ids: &dyn IdSource) -> Result<(), NestedError> {
        validate_range(input.start_date, input.end_date)?;
        self.rent_type = input.rent_type;
        self.cycle = input.cycle;
        self.start_date = input.start_date;
        self.end_date = input.end_date;
        self.due_dates_type = input.due_dates_type;
        self.due_dates_per_year = input.due_dates_per_year;
        self.due_dates = merge_nested(
            "rent due date",
            std::mem::take(&mut self.due_dates),
            input.due_dates,
            ids,
        )?;
        self.contract_rents = merge_nested(
            "contract rent",
            std::mem::take(&mut self.contract_rents),
            input.contract_rents,
            ids,
        )?;
        self.index_adjusted_rents = merge_nested(
            "index adjusted rent",
            std::mem::take(&mut self.index_adjusted_rents),
            input.index_adjusted_rents,
            ids,
        )?;
        self.rent_adjustments = merge_nested(
            "rent adjustment",
            std::mem::take(&mut self.rent_adjustments),
            input.rent_adjustments,
            ids,
        )?;
        self.fixed_initial_year_rents = merge_nested(
            "fixed initial year rent",
            std::mem::take(&mut self.fixed_initial_year_rents),
            input.fixed_initial_year_rents,
            ids,
        )?;
        Ok(())
    }
}

fn validate_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), NestedError> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => Err(NestedError::Invalid(format!(
            "end date {end} is before start date {start}"
        ))),
        _ => Ok(()),
    }
}

fn active_on(start: Option<NaiveDate>, end: Option<NaiveDate>, date: NaiveDate) -> bool {
    start.map_or(true, |start| start <= date) && end.map_or(true, |end| date <= end)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentDueDate {
    pub id: RentDueDateId,
    pub day: u32,
    pub month: u32,
}

impl RentDueDate {
    pub fn in_year(&self, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.month, self.day)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RentDueDateInput {
    #[serde(default)]
    pub id: Option<RentDueDateId>,
    pub day: u32,
    pub month: u32,
}

replace_nested!(RentDueDate, RentDueDateInput, |id, input| RentDueDate {
    id: RentDueDateId(id),
    day: input.day,
    month: input.month,
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRent {
    pub id: ContractRentId,
    pub amount: Money,
    pub period: PeriodType,
    pub intended_use: Option<String>,
    pub base_amount: Option<Money>,
    pub base_amount_period: Option<PeriodType>,
    pub base_year_rent: Option<Money>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl ContractRent {
    pub fn yearly_amount(&self) -> Money {
        self.amount.saturating_mul(self.period.periods_per_year())
    }

    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        active_on(self.start_date, self.end_date, date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContractRentInput {
    #[serde(default)]
    pub id: Option<ContractRentId>,
    pub amount: Money,
    pub period: PeriodType,
    #[serde(default)]
    pub intended_use: Option<String>,
    #[serde(default)]
    pub base_amount: Option<Money>,
    #[serde(default)]
    pub base_amount_period: Option<PeriodType>,
    #[serde(default)]
    pub base_year_rent: Option<Money>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

replace_nested!(ContractRent, ContractRentInput, |id, input| ContractRent {
    id: ContractRentId(id),
    amount: input.amount,
    period: input.period,
    intended_use: input.intended_use,
    base_amount: input.base_amount,
    base_amount_period: input.base_amount_period,
    base_year_rent: input.base_year_rent,
    start_date: input.start_date,
    end_date: input.end_date,
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexAdjustedRent {
    pub id: IndexAdjustedRentId,
    pub amount: Money,
    pub intended_use: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub factor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IndexAdjustedRentInput {
    #[serde(default)]
    pub id: Option<IndexAdjustedRentId>,
    pub amount: Money,
    #[serde(default)]
    pub intended_use: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub factor: Option<String>,
}

replace_nested!(IndexAdjustedRent, IndexAdjustedRentInput, |id, input| {
    IndexAdjustedRent {
        id: IndexAdjustedRentId(id),
        amount: input.amount,
        intended_use: input.intended_use,
        start_date: input.start_date,
        end_date: input.end_date,
        factor: input.factor,
    }
});

/// Discount or increase applied to the yearly rent.
///
/// With `percentage_per_year`, `full_amount` is read as a percentage, `"12.50"`
/// meaning 12.5 %.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentAdjustment {
    pub id: RentAdjustmentId,
    #[serde(rename = "type")]
    pub adjustment_type: RentAdjustmentType,
    pub intended_use: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub full_amount: Money,
    pub amount_type: AdjustmentAmountType,
    pub note: Option<String>,
}

impl RentAdjustment {
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        active_on(self.start_date, self.end_date, date)
    }

    /// Adjusted amount, rounded half-up to cents. Discounts never go below zero.
    pub fn apply(&self, amount: Money) -> Money {
        let scaled = i128::from(amount.cents()) * ADJUSTMENT_SCALE + self.scaled_delta(amount);
        Fraction::new(scaled.max(0), ADJUSTMENT_SCALE)
            .map(|share| Money::from_cents(1).mul_fraction(share))
            .unwrap_or(Money::ZERO)
    }

    fn scaled_delta(&self, amount: Money) -> i128 {
        let magnitude = match self.amount_type {
            AdjustmentAmountType::PercentagePerYear => {
                i128::from(amount.cents()) * i128::from(self.full_amount.cents())
            }
            AdjustmentAmountType::AmountPerYear => {
                i128::from(self.full_amount.cents()) * ADJUSTMENT_SCALE
            }
        };
        match self.adjustment_type {
            RentAdjustmentType::Discount => -magnitude,
            RentAdjustmentType::Increase => magnitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RentAdjustmentInput {
    #[serde(default)]
    pub id: Option<RentAdjustmentId>,
    #[serde(rename = "type")]
    pub adjustment_type: RentAdjustmentType,
    #[serde(default)]
    pub intended_use: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub full_amount: Money,
    pub amount_type: AdjustmentAmountType,
    #[serde(default)]
    pub note: Option<String>,
}

replace_nested!(RentAdjustment, RentAdjustmentInput, |id, input| RentAdjustment {
    id: RentAdjustmentId(id),
    adjustment_type: input.adjustment_type,
    intended_use: input.intended_use,
    start_date: input.start_date,
    end_date: input.end_date,
    full_amount: input.full_amount,
    amount_type: input.amount_type,
    note: input.note,
});

/// Yearly rent that replaces the contract rent during its range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedInitialYearRent {
    pub id: FixedInitialYearRentId,
    pub amount: Money,
    pub intended_use: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl FixedInitialYearRent {
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        active_on(self.start_date, self.end_date, date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FixedInitialYearRentInput {
    #[serde(default)]
    pub id: Option<FixedInitialYearRentId>,
    pub amount: Money,
    #[serde(default)]
    pub intended_use: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

replace_nested!(
    FixedInitialYearRent,
    FixedInitialYearRentInput,
    |id, input| FixedInitialYearRent {
        id: FixedInitialYearRentId(id),
        amount: input.amount,
        intended_use: input.intended_use,
        start_date: input.start_date,
        end_date: input.end_date,
    }
);

/// Calculated rent for one year, recorded for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayableRent {
    pub id: PayableRentId,
    pub amount: Money,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub calendar_year_rent: Money,
}

impl PayableRent {
    pub fn for_year(id: PayableRentId, rent: &Rent, year: i32) -> Option<Self> {
        let start_date = NaiveDate::from_ymd_opt(year, 1, 1)?;
        let end_date = NaiveDate::from_ymd_opt(year, 12, 31)?;
        let (start_date, end_date) = overlap(rent.start_date, rent.end_date, start_date, end_date)?;
        let amount = rent.yearly_amount_for_year(year);
        Some(Self {
            id,
            amount,
            start_date,
            end_date,
            calendar_year_rent: amount,
        })
    }

    pub fn year(&self) -> i32 {
        self.start_date.year()
    }
}
