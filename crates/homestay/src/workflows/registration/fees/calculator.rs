use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::super::domain::{Category, DiscountEligibility};
use super::schedule::FeeSchedule;

pub const MIN_ROOMS: u32 = 1;
pub const MAX_ROOMS: u32 = 50;
pub const MIN_VALIDITY_YEARS: u32 = 1;
pub const MAX_VALIDITY_YEARS: u32 = 3;
const LUMP_SUM_VALIDITY_YEARS: u32 = 3;

/// Validation failures raised before any fee is computed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeeError {
    #[error("invalid category '{value}' (expected diamond, gold or silver)")]
    InvalidCategory { value: String },
    #[error("total rooms must be between {} and {} (found {value})", MIN_ROOMS, MAX_ROOMS)]
    RoomsOutOfRange { value: u32 },
    #[error(
        "certificate validity must be between {} and {} years (found {value})",
        MIN_VALIDITY_YEARS,
        MAX_VALIDITY_YEARS
    )]
    ValidityOutOfRange { value: u32 },
    #[error("fee schedule has no rate for category '{0}'")]
    MissingRate(&'static str),
}

impl FeeError {
    /// Name of the offending input field.
    pub fn field(&self) -> &'static str {
        match self {
            FeeError::InvalidCategory { .. } | FeeError::MissingRate(_) => "category",
            FeeError::RoomsOutOfRange { .. } => "total_rooms",
            FeeError::ValidityOutOfRange { .. } => "validity_years",
        }
    }
}

/// Fee snapshot locked onto an application at submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub category: Category,
    pub total_rooms: u32,
    pub validity_years: u32,
    pub base_fee: Decimal,
    pub per_room_fee: Decimal,
    pub subtotal_one_year: Decimal,
    pub total_before_discounts: Decimal,
    pub validity_discount: Decimal,
    pub female_owner_discount: Decimal,
    pub special_region_discount: Decimal,
    pub total_discount: Decimal,
    pub net_amount: Decimal,
    pub gst_percent: Decimal,
    pub gst_amount: Decimal,
    pub total_fee: Decimal,
}

/// Round to paise using round-half-up and pin the scale to two places.
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    round_money(amount * percent / Decimal::ONE_HUNDRED)
}

/// Pure fee computation over a configurable [`FeeSchedule`].
#[derive(Debug, Clone)]
pub struct FeeCalculator {
    schedule: FeeSchedule,
}

impl FeeCalculator {
    pub fn new(schedule: FeeSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &FeeSchedule {
        &self.schedule
    }

    /// Compute from raw form input, validating the category label first.
    pub fn quote(
        &self,
        category: &str,
        total_rooms: u32,
        validity_years: u32,
        eligibility: DiscountEligibility,
    ) -> Result<FeeBreakdown, FeeError> {
        let category = category
            .parse::<Category>()
            .map_err(|_| FeeError::InvalidCategory {
                value: category.trim().to_string(),
            })?;
        self.compute(category, total_rooms, validity_years, eligibility)
    }

    pub fn compute(
        &self,
        category: Category,
        total_rooms: u32,
        validity_years: u32,
        eligibility: DiscountEligibility,
    ) -> Result<FeeBreakdown, FeeError> {
        if !(MIN_ROOMS..=MAX_ROOMS).contains(&total_rooms) {
            return Err(FeeError::RoomsOutOfRange { value: total_rooms });
        }
        if !(MIN_VALIDITY_YEARS..=MAX_VALIDITY_YEARS).contains(&validity_years) {
            return Err(FeeError::ValidityOutOfRange {
                value: validity_years,
            });
        }

        let rate = self
            .schedule
            .rate_for(category)
            .ok_or(FeeError::MissingRate(category.label()))?;

        let subtotal_one_year = round_money(rate.base + rate.per_room * Decimal::from(total_rooms));
        let total_before_discounts = round_money(subtotal_one_year * Decimal::from(validity_years));

        // Each discount is taken on the undiscounted total; they never compound.
        let validity_discount = if validity_years == LUMP_SUM_VALIDITY_YEARS {
            percent_of(
                total_before_discounts,
                self.schedule.lump_sum_discount_percent,
            )
        } else {
            round_money(Decimal::ZERO)
        };
        let female_owner_discount = if eligibility.female_owner {
            percent_of(
                total_before_discounts,
                self.schedule.female_owner_discount_percent,
            )
        } else {
            round_money(Decimal::ZERO)
        };
        let special_region_discount = if eligibility.special_region {
            percent_of(
                total_before_discounts,
                self.schedule.special_region_discount_percent,
            )
        } else {
            round_money(Decimal::ZERO)
        };

        let total_discount = (validity_discount + female_owner_discount + special_region_discount)
            .min(total_before_discounts);
        let net_amount = round_money(total_before_discounts - total_discount);
        let gst_multiplier = Decimal::ONE + self.schedule.gst_percent / Decimal::ONE_HUNDRED;
        let total_fee = round_money(net_amount * gst_multiplier);
        let gst_amount = round_money(total_fee - net_amount);

        Ok(FeeBreakdown {
            category,
            total_rooms,
            validity_years,
            base_fee: round_money(rate.base),
            per_room_fee: round_money(rate.per_room),
            subtotal_one_year,
            total_before_discounts,
            validity_discount,
            female_owner_discount,
            special_region_discount,
            total_discount: round_money(total_discount),
            net_amount,
            gst_percent: self.schedule.gst_percent,
            gst_amount,
            total_fee,
        })
    }
}

impl Default for FeeCalculator {
    fn default() -> Self {
        Self::new(FeeSchedule::standard())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn money(raw: &str) -> Decimal {
        Decimal::from_str(raw).expect("valid decimal")
    }

    fn no_discounts() -> DiscountEligibility {
        DiscountEligibility::default()
    }

    #[test]
    fn silver_single_year_without_discounts() {
        let fee = FeeCalculator::default()
            .compute(Category::Silver, 4, 1, no_discounts())
            .expect("valid input");

        assert_eq!(fee.base_fee, money("2000.00"));
        assert_eq!(fee.subtotal_one_year, money("2800.00"));
        assert_eq!(fee.total_before_discounts, money("2800.00"));
        assert_eq!(fee.total_discount, money("0.00"));
        assert_eq!(fee.gst_amount, money("504.00"));
        assert_eq!(fee.total_fee, money("3304.00"));
        assert_eq!(fee.total_fee.to_string(), "3304.00");
    }

    #[test]
    fn diamond_three_years_female_owner() {
        let fee = FeeCalculator::default()
            .compute(
                Category::Diamond,
                10,
                3,
                DiscountEligibility {
                    female_owner: true,
                    special_region: false,
                },
            )
            .expect("valid input");

        assert_eq!(fee.subtotal_one_year, money("10000"));
        assert_eq!(fee.total_before_discounts, money("30000"));
        assert_eq!(fee.validity_discount, money("3000"));
        assert_eq!(fee.female_owner_discount, money("1500"));
        assert_eq!(fee.special_region_discount, Decimal::ZERO);
        assert_eq!(fee.total_discount, money("4500"));
        assert_eq!(fee.net_amount, money("25500"));
        assert_eq!(fee.total_fee, money("30090.00"));
    }

    #[test]
    fn discounts_are_summed_not_compounded() {
        let fee = FeeCalculator::default()
            .compute(
                Category::Gold,
                7,
                3,
                DiscountEligibility {
                    female_owner: true,
                    special_region: true,
                },
            )
            .expect("valid input");

        // 3000 + 7 * 300 = 5100 per year, 15300 over three years; 65% off.
        assert_eq!(fee.total_before_discounts, money("15300"));
        assert_eq!(fee.total_discount, money("9945"));
        assert_eq!(fee.net_amount, money("5355"));
        assert_eq!(fee.total_fee, money("6318.90"));
    }

    #[test]
    fn lump_sum_discount_only_applies_to_three_years() {
        let fee = FeeCalculator::default()
            .compute(Category::Gold, 2, 2, no_discounts())
            .expect("valid input");
        assert_eq!(fee.validity_discount, Decimal::ZERO);
        assert_eq!(fee.total_before_discounts, money("7200"));
    }

    #[test]
    fn rounds_half_up_to_paise() {
        let mut schedule = FeeSchedule::standard();
        schedule.female_owner_discount_percent = money("2.5");
        schedule.rates.get_mut(&Category::Silver).expect("silver").base = money("2000.10");
        let fee = FeeCalculator::new(schedule)
            .compute(
                Category::Silver,
                1,
                1,
                DiscountEligibility {
                    female_owner: true,
                    special_region: false,
                },
            )
            .expect("valid input");

        // 2200.10 * 2.5% = 55.0025 -> 55.00
        assert_eq!(fee.female_owner_discount, money("55.00"));
        // (2200.10 - 55.00) * 1.18 = 2531.218 -> 2531.22
        assert_eq!(fee.total_fee, money("2531.22"));
    }

    #[test]
    fn room_bounds_are_inclusive() {
        let calculator = FeeCalculator::default();
        assert!(calculator
            .compute(Category::Silver, 1, 1, no_discounts())
            .is_ok());
        assert!(calculator
            .compute(Category::Silver, 50, 1, no_discounts())
            .is_ok());

        for rooms in [0, 51] {
            let error = calculator
                .compute(Category::Silver, rooms, 1, no_discounts())
                .expect_err("out of range");
            assert_eq!(error, FeeError::RoomsOutOfRange { value: rooms });
            assert_eq!(error.field(), "total_rooms");
        }
    }

    #[test]
    fn validity_years_are_bounded() {
        let calculator = FeeCalculator::default();
        for years in [0, 4] {
            let error = calculator
                .compute(Category::Gold, 3, years, no_discounts())
                .expect_err("out of range");
            assert_eq!(error.field(), "validity_years");
        }
    }

    #[test]
    fn quote_rejects_unknown_categories() {
        let error = FeeCalculator::default()
            .quote("platinum", 3, 1, no_discounts())
            .expect_err("unknown category");
        assert_eq!(error.field(), "category");
        assert!(error.to_string().contains("platinum"));
    }

    #[test]
    fn computation_is_deterministic_and_consistent() {
        let calculator = FeeCalculator::default();
        for category in Category::ALL {
            for rooms in [1, 9, 25, 50] {
                for years in 1..=3 {
                    for (female_owner, special_region) in
                        [(false, false), (true, false), (false, true), (true, true)]
                    {
                        let eligibility = DiscountEligibility {
                            female_owner,
                            special_region,
                        };
                        let first = calculator
                            .compute(category, rooms, years, eligibility)
                            .expect("valid input");
                        let second = calculator
                            .compute(category, rooms, years, eligibility)
                            .expect("valid input");
                        assert_eq!(first, second);
                        assert!(first.total_discount <= first.total_before_discounts);
                        assert_eq!(
                            first.total_discount,
                            first.validity_discount
                                + first.female_owner_discount
                                + first.special_region_discount
                        );
                        assert_eq!(
                            first.net_amount,
                            first.total_before_discounts - first.total_discount
                        );
                        assert_eq!(
                            first.total_fee,
                            round_money(first.net_amount * money("1.18"))
                        );
                        assert!(first.total_fee >= Decimal::ZERO);
                    }
                }
            }
        }
    }
}
