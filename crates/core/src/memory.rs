//! In-memory reference collaborators used by the demo server and tests.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::collaborators::{CartStore, Catalog};
use crate::error::{FunnelError, FunnelResult, RecordKind};
use crate::types::{CartLine, Coupon, Product, ProductId};

/// Stable cart line key for a product/variation pair.
pub fn line_key(product_id: ProductId, variation_id: Option<ProductId>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", product_id, variation_id.unwrap_or(0)).as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..32].to_string()
}

/// Product and coupon catalog held in hash maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: HashMap<ProductId, Product>,
    coupons: HashMap<String, Coupon>,
}

#[derive(Debug, Deserialize)]
struct CatalogSeed {
    #[serde(default)]
    products: Vec<Product>,
    #[serde(default)]
    coupons: Vec<Coupon>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(mut self, product: Product) -> Self {
        self.products.insert(product.id, product);
        self
    }

    pub fn with_coupon(mut self, coupon: Coupon) -> Self {
        self.coupons.insert(coupon.code.to_lowercase(), coupon);
        self
    }

    /// Parses `{ "products": [...], "coupons": [...] }`.
    pub fn from_json(raw: &str) -> FunnelResult<Self> {
        let seed: CatalogSeed = serde_json::from_str(raw)?;
        let catalog = seed
            .products
            .into_iter()
            .fold(Self::new(), |catalog, product| catalog.with_product(product));
        Ok(seed
            .coupons
            .into_iter()
            .fold(catalog, |catalog, coupon| catalog.with_coupon(coupon)))
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }
}

impl Catalog for InMemoryCatalog {
    fn product(&self, id: ProductId) -> Option<Product> {
        self.products.get(&id).cloned()
    }

    fn coupon(&self, code: &str) -> Option<Coupon> {
        self.coupons.get(&code.to_lowercase()).cloned()
    }
}

/// A single visitor's cart. Lines keep insertion order.
#[derive(Clone)]
pub struct InMemoryCart {
    catalog: Arc<dyn Catalog>,
    lines: Vec<CartLine>,
    coupons: Vec<String>,
}

impl std::fmt::Debug for InMemoryCart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCart")
            .field("lines", &self.lines)
            .field("coupons", &self.coupons)
            .finish()
    }
}

impl InMemoryCart {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            catalog,
            lines: Vec::new(),
            coupons: Vec::new(),
        }
    }

    fn position(&self, line_key: &str) -> FunnelResult<usize> {
        self.lines
            .iter()
            .position(|line| line.key == line_key)
            .ok_or_else(|| FunnelError::not_found(RecordKind::CartLine, line_key))
    }
}

impl CartStore for InMemoryCart {
    fn get_items(&self) -> Vec<CartLine> {
        self.lines.clone()
    }

    fn add_item(&mut self, product_id: ProductId, quantity: u32) -> FunnelResult<String> {
        if quantity == 0 {
            return Err(FunnelError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }

        let product = self
            .catalog
            .product(product_id)
            .ok_or_else(|| FunnelError::not_found(RecordKind::Product, product_id))?;

        let (parent, variation) = match product.parent_id {
            Some(parent) => (parent, Some(product.id)),
            None => (product.id, None),
        };
        let key = line_key(parent, variation);

        if let Some(line) = self.lines.iter_mut().find(|line| line.key == key) {
            line.quantity += quantity;
        } else {
            self.lines.push(CartLine {
                key: key.clone(),
                product_id: parent,
                variation_id: variation,
                quantity,
                unit_price: product.active_price(),
            });
        }

        debug!(product_id, quantity, line_key = %key, "Cart line added");
        Ok(key)
    }

    fn remove_item(&mut self, line_key: &str) -> FunnelResult<()> {
        let idx = self.position(line_key)?;
        self.lines.remove(idx);
        Ok(())
    }

    fn set_quantity(&mut self, line_key: &str, quantity: u32) -> FunnelResult<()> {
        let idx = self.position(line_key)?;
        if quantity == 0 {
            self.lines.remove(idx);
        } else {
            self.lines[idx].quantity = quantity;
        }
        Ok(())
    }

    fn overwrite_price(&mut self, line_key: &str, price: f64) -> FunnelResult<()> {
        let idx = self.position(line_key)?;
        self.lines[idx].unit_price = price;
        Ok(())
    }

    fn apply_coupon(&mut self, code: &str) -> FunnelResult<()> {
        let coupon = self
            .catalog
            .coupon(code)
            .ok_or_else(|| FunnelError::not_found(RecordKind::Coupon, code))?;
        if !self.coupons.iter().any(|c| c.eq_ignore_ascii_case(&coupon.code)) {
            self.coupons.push(coupon.code);
        }
        Ok(())
    }

    fn remove_coupons(&mut self) {
        self.coupons.clear();
    }

    fn applied_coupons(&self) -> Vec<String> {
        self.coupons.clone()
    }
}
