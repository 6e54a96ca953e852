mod calculator;
mod schedule;

pub use calculator::{
    round_money, FeeBreakdown, FeeCalculator, FeeError, MAX_ROOMS, MAX_VALIDITY_YEARS, MIN_ROOMS,
    MIN_VALIDITY_YEARS,
};
pub use schedule::{CategoryRate, FeeSchedule, FeeScheduleError};
