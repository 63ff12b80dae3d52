use funnel_core::error::{FunnelError, FunnelResult, RecordKind};
use funnel_core::types::Coupon;
use funnel_core::{CartStore, Catalog};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Coupon order-amount gates derived from one pipeline run. Never cached
/// across runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CouponGates {
    pub subtotal: f64,
}

impl CouponGates {
    pub fn new(subtotal: f64) -> Self {
        Self { subtotal }
    }

    /// A coupon is admitted when the subtotal sits inside its configured
    /// minimum and maximum order amounts.
    pub fn admits(&self, coupon: &Coupon) -> bool {
        let above_min = coupon
            .minimum_amount
            .map_or(true, |min| self.subtotal >= min);
        let below_max = coupon
            .maximum_amount
            .map_or(true, |max| self.subtotal <= max);
        above_min && below_max
    }

    pub fn check(&self, coupon: &Coupon) -> FunnelResult<()> {
        if self.admits(coupon) {
            return Ok(());
        }
        let bound = match (coupon.minimum_amount, coupon.maximum_amount) {
            (Some(min), Some(max)) => format!("between {:.2} and {:.2}", min, max),
            (Some(min), None) => format!("of at least {:.2}", min),
            (None, Some(max)) => format!("of at most {:.2}", max),
            (None, None) => String::new(),
        };
        Err(FunnelError::Validation(format!(
            "coupon {} requires an order subtotal {} (current {:.2})",
            coupon.code, bound, self.subtotal
        )))
    }

    /// Validates `code` against the catalog and these gates, then applies it.
    pub fn apply(
        &self,
        cart: &mut dyn CartStore,
        catalog: &dyn Catalog,
        code: &str,
    ) -> FunnelResult<Coupon> {
        let code = code.trim();
        if code.is_empty() {
            return Err(FunnelError::Validation("coupon code is required".into()));
        }
        let coupon = catalog
            .coupon(code)
            .ok_or_else(|| FunnelError::not_found(RecordKind::Coupon, code))?;
        self.check(&coupon)?;
        cart.apply_coupon(&coupon.code)?;
        info!(code = %coupon.code, subtotal = self.subtotal, "Coupon applied");
        metrics::counter!("funnel.coupons.applied").increment(1);
        Ok(coupon)
    }

    /// Replaces the cart's coupons with the admitted subset of `codes`.
    /// An empty list leaves the cart's coupons alone.
    pub fn reapply_auto_coupons(
        &self,
        cart: &mut dyn CartStore,
        catalog: &dyn Catalog,
        codes: &[String],
    ) -> AutoCouponReport {
        let mut report = AutoCouponReport::default();
        if codes.is_empty() {
            return report;
        }

        cart.remove_coupons();
        for code in codes {
            match self.apply(cart, catalog, code) {
                Ok(coupon) => report.applied.push(coupon.code),
                Err(e) => {
                    debug!(code = %code, error = %e, "Auto-apply coupon skipped");
                    report.skipped.push(code.clone());
                }
            }
        }
        report
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoCouponReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use funnel_core::memory::{InMemoryCart, InMemoryCatalog};
    use funnel_core::types::Product;
    use std::sync::Arc;

    fn coupon(code: &str, min: Option<f64>, max: Option<f64>) -> Coupon {
        Coupon {
            code: code.into(),
            minimum_amount: min,
            maximum_amount: max,
        }
    }

    fn catalog() -> Arc<InMemoryCatalog> {
        Arc::new(
            InMemoryCatalog::new()
                .with_product(Product::new(1, 10.0))
                .with_coupon(coupon("OPEN", None, None))
                .with_coupon(coupon("BIG", Some(100.0), None))
                .with_coupon(coupon("SMALL", None, Some(50.0))),
        )
    }

    #[test]
    fn test_admits_bounds_inclusive() {
        let c = coupon("X", Some(50.0), Some(100.0));
        assert!(CouponGates::new(50.0).admits(&c));
        assert!(CouponGates::new(100.0).admits(&c));
        assert!(!CouponGates::new(49.99).admits(&c));
        assert!(!CouponGates::new(100.01).admits(&c));
        assert!(CouponGates::new(0.0).admits(&coupon("Y", None, None)));
    }

    #[test]
    fn test_check_message() {
        let err = CouponGates::new(20.0)
            .check(&coupon("BIG", Some(100.0), None))
            .unwrap_err();
        assert!(err.to_string().contains("at least 100.00"));
    }

    #[test]
    fn test_apply() {
        let catalog = catalog();
        let mut cart = InMemoryCart::new(catalog.clone());
        let gates = CouponGates::new(30.0);

        assert!(matches!(
            gates.apply(&mut cart, catalog.as_ref(), "  "),
            Err(FunnelError::Validation(_))
        ));
        assert!(matches!(
            gates.apply(&mut cart, catalog.as_ref(), "NOPE"),
            Err(FunnelError::NotFound { kind: RecordKind::Coupon, .. })
        ));
        assert!(gates.apply(&mut cart, catalog.as_ref(), "BIG").is_err());
        gates.apply(&mut cart, catalog.as_ref(), "small").unwrap();
        assert_eq!(cart.applied_coupons(), vec!["SMALL".to_string()]);
    }

    #[test]
    fn test_reapply_auto_coupons() {
        let catalog = catalog();
        let mut cart = InMemoryCart::new(catalog.clone());
        cart.apply_coupon("OPEN").unwrap();

        let codes = vec!["BIG".to_string(), "SMALL".to_string(), "GHOST".to_string()];
        let report = CouponGates::new(30.0).reapply_auto_coupons(&mut cart, catalog.as_ref(), &codes);
        assert_eq!(report.applied, vec!["SMALL".to_string()]);
        assert_eq!(report.skipped, vec!["BIG".to_string(), "GHOST".to_string()]);
        assert_eq!(cart.applied_coupons(), vec!["SMALL".to_string()]);

        let untouched = CouponGates::new(30.0).reapply_auto_coupons(&mut cart, catalog.as_ref(), &[]);
        assert_eq!(untouched, AutoCouponReport::default());
        assert_eq!(cart.applied_coupons(), vec!["SMALL".to_string()]);
    }
}
