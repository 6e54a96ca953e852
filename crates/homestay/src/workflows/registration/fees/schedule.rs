use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::super::domain::Category;

/// Annual tariff for a single category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRate {
    pub base: Decimal,
    pub per_room: Decimal,
}

/// Policy data behind fee computation. Percentages are expressed as `10` for 10 %.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub rates: BTreeMap<Category, CategoryRate>,
    pub lump_sum_discount_percent: Decimal,
    pub female_owner_discount_percent: Decimal,
    pub special_region_discount_percent: Decimal,
    pub gst_percent: Decimal,
}

#[derive(Debug, thiserror::Error)]
pub enum FeeScheduleError {
    #[error("fee schedule has no rate for category '{0}'")]
    MissingCategory(&'static str),
    #[error("fee schedule field '{field}' must not be negative")]
    Negative { field: String },
    #[error("fee schedule field '{field}' must be a percentage between 0 and 100")]
    PercentOutOfRange { field: &'static str },
    #[error("combined discounts exceed 100% ({0}%)")]
    DiscountsExceedTotal(Decimal),
    #[error("unable to read fee schedule: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid fee schedule document: {0}")]
    Parse(#[from] serde_json::Error),
}

impl FeeSchedule {
    /// Tariff notified for the current registration scheme.
    pub fn standard() -> Self {
        let mut rates = BTreeMap::new();
        rates.insert(
            Category::Diamond,
            CategoryRate {
                base: Decimal::from(5000),
                per_room: Decimal::from(500),
            },
        );
        rates.insert(
            Category::Gold,
            CategoryRate {
                base: Decimal::from(3000),
                per_room: Decimal::from(300),
            },
        );
        rates.insert(
            Category::Silver,
            CategoryRate {
                base: Decimal::from(2000),
                per_room: Decimal::from(200),
            },
        );

        Self {
            rates,
            lump_sum_discount_percent: Decimal::from(10),
            female_owner_discount_percent: Decimal::from(5),
            special_region_discount_percent: Decimal::from(50),
            gst_percent: Decimal::from(18),
        }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, FeeScheduleError> {
        let schedule: FeeSchedule = serde_json::from_reader(reader)?;
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, FeeScheduleError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn rate_for(&self, category: Category) -> Option<&CategoryRate> {
        self.rates.get(&category)
    }

    pub fn validate(&self) -> Result<(), FeeScheduleError> {
        for category in Category::ALL {
            let rate = self
                .rates
                .get(&category)
                .ok_or(FeeScheduleError::MissingCategory(category.label()))?;
            if rate.base.is_sign_negative() {
                return Err(FeeScheduleError::Negative {
                    field: format!("rates.{}.base", category.label()),
                });
            }
            if rate.per_room.is_sign_negative() {
                return Err(FeeScheduleError::Negative {
                    field: format!("rates.{}.per_room", category.label()),
                });
            }
        }

        let percentages = [
            ("lump_sum_discount_percent", self.lump_sum_discount_percent),
            (
                "female_owner_discount_percent",
                self.female_owner_discount_percent,
            ),
            (
                "special_region_discount_percent",
                self.special_region_discount_percent,
            ),
            ("gst_percent", self.gst_percent),
        ];
        for (field, value) in percentages {
            if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
                return Err(FeeScheduleError::PercentOutOfRange { field });
            }
        }

        let combined = self.lump_sum_discount_percent
            + self.female_owner_discount_percent
            + self.special_region_discount_percent;
        if combined > Decimal::ONE_HUNDRED {
            return Err(FeeScheduleError::DiscountsExceedTotal(combined));
        }

        Ok(())
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_schedule_is_valid() {
        FeeSchedule::standard()
            .validate()
            .expect("standard schedule validates");
    }

    #[test]
    fn parses_schedule_documents() {
        let document = r#"{
            "rates": {
                "diamond": {"base": "6000", "per_room": "600"},
                "gold": {"base": "3500", "per_room": "350"},
                "silver": {"base": "2500", "per_room": "250"}
            },
            "lump_sum_discount_percent": "10",
            "female_owner_discount_percent": "5",
            "special_region_discount_percent": "50",
            "gst_percent": "18"
        }"#;

        let schedule = FeeSchedule::from_reader(document.as_bytes()).expect("schedule parses");
        let diamond = schedule.rate_for(Category::Diamond).expect("diamond rate");
        assert_eq!(diamond.base, Decimal::from(6000));
        assert_eq!(diamond.per_room, Decimal::from(600));
    }

    #[test]
    fn rejects_missing_categories() {
        let mut schedule = FeeSchedule::standard();
        schedule.rates.remove(&Category::Gold);
        match schedule.validate() {
            Err(FeeScheduleError::MissingCategory(label)) => assert_eq!(label, "gold"),
            other => panic!("expected missing category, got {other:?}"),
        }
    }

    #[test]
    fn rejects_discounts_above_total() {
        let mut schedule = FeeSchedule::standard();
        schedule.special_region_discount_percent = Decimal::from(90);
        assert!(matches!(
            schedule.validate(),
            Err(FeeScheduleError::DiscountsExceedTotal(_))
        ));
    }
}
