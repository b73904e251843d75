//! # Commission Service Product
//!
//! Payout lines reference a synthetic service product. It is a process-wide
//! singleton per name: the first caller creates it under the registry lock,
//! every later caller gets the same product back.

use std::collections::HashMap;

use commission_core::ProductId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// The service product used on payout lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionServiceProduct {
    pub id: ProductId,
    pub name: String,
    /// Can appear on purchase documents.
    pub purchase_ok: bool,
    /// Can appear on sale documents.
    pub sale_ok: bool,
}

impl CommissionServiceProduct {
    fn service(name: &str) -> Self {
        Self {
            id: ProductId::new(),
            name: name.to_string(),
            purchase_ok: true,
            sale_ok: false,
        }
    }
}

/// Lookup-then-create registry of commission service products.
#[derive(Debug, Default)]
pub struct CommissionServiceRegistry {
    products: Mutex<HashMap<String, CommissionServiceProduct>>,
}

impl CommissionServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing product under its name, e.g. one configured by
    /// the host. Returns the product now registered under that name.
    pub fn register(&self, product: CommissionServiceProduct) -> CommissionServiceProduct {
        let mut products = self.products.lock();
        products
            .entry(product.name.clone())
            .or_insert(product)
            .clone()
    }

    /// The product named `name`, created on first use.
    pub fn ensure(&self, name: &str) -> CommissionServiceProduct {
        let mut products = self.products.lock();
        if let Some(existing) = products.get(name) {
            return existing.clone();
        }
        let product = CommissionServiceProduct::service(name);
        tracing::info!(product = %product.id, name, "created commission service product");
        products.insert(name.to_string(), product.clone());
        product
    }

    pub fn get(&self, name: &str) -> Option<CommissionServiceProduct> {
        self.products.lock().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.products.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
