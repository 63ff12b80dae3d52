//! Checkout pricing: the discount calculator, spec merging, the price
//! application pipeline and coupon admissibility.

pub mod calculator;
pub mod coupons;
pub mod pipeline;

pub use calculator::{DiscountCalculator, DiscountOutcome};
pub use coupons::{AutoCouponReport, CouponGates};
pub use pipeline::{
    AdjustedItem, PriceComputationResult, PricePipeline, PriceRule, Recalculation, SpecSet,
    SpecSource,
};
