//! Catalog domain types: products, categories and listing filters.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use checklistpro_core::{CategoryId, Money, ProductId, Slug};

/// Rating aggregate for a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub count: u32,
    pub average: Decimal,
    /// Number of ratings per star, index 0 is one star.
    pub distribution: [u32; 5],
}

impl Default for Rating {
    fn default() -> Self {
        Self {
            count: 0,
            average: Decimal::ZERO,
            distribution: [0; 5],
        }
    }
}

/// A downloadable checklist for sale.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: Slug,
    pub description: String,
    pub price: Money,
    /// Pre-discount price, shown struck through.
    pub original_price: Option<Money>,
    pub category_id: Option<CategoryId>,
    pub features: Vec<String>,
    pub tags: Vec<String>,
    /// Format name (`pdf`, `markdown`, `docx`, ...) to a file reference
    /// relative to the downloads directory.
    pub formats: BTreeMap<String, String>,
    pub download_count: i64,
    pub view_count: i64,
    pub rating: Rating,
    /// Disabled products are hidden from the catalog and cannot be bought.
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Available format names, sorted.
    #[must_use]
    pub fn format_names(&self) -> Vec<String> {
        self.formats.keys().cloned().collect()
    }
}

/// Input for creating a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub slug: Slug,
    pub description: String,
    pub price: Money,
    pub original_price: Option<Money>,
    pub category_id: Option<CategoryId>,
    pub features: Vec<String>,
    pub tags: Vec<String>,
    pub formats: BTreeMap<String, String>,
}

/// Partial product update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub slug: Option<Slug>,
    pub description: Option<String>,
    pub price: Option<Money>,
    /// `Some(None)` clears the original price.
    pub original_price: Option<Option<Money>>,
    /// `Some(None)` detaches the product from its category.
    pub category_id: Option<Option<CategoryId>>,
    pub features: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub formats: Option<BTreeMap<String, String>>,
    pub enabled: Option<bool>,
}

/// Sort order for product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductSort {
    #[default]
    Newest,
    /// Most downloaded first.
    Popular,
    PriceAsc,
    PriceDesc,
    Name,
}

/// Product listing filter, already resolved to ids.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category_id: Option<CategoryId>,
    /// Case-insensitive substring over name, description and tags.
    pub search: Option<String>,
    pub sort: ProductSort,
    pub include_disabled: bool,
    pub page: Pagination,
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 12;
    pub const MAX_LIMIT: u32 = 100;

    /// Clamp raw query values into a valid page request.
    #[must_use]
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }

    #[must_use]
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, pagination: Pagination, total: u64) -> Self {
        Self {
            items,
            page: pagination.page,
            limit: pagination.limit,
            total,
        }
    }

    /// Number of pages for `total` items.
    #[must_use]
    pub fn pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.limit.max(1)))
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total: self.total,
        }
    }
}

/// A product category.
#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: Slug,
    pub description: String,
    pub icon: String,
    /// Number of enabled products in the category.
    pub product_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a category.
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub slug: Slug,
    pub description: String,
    pub icon: String,
}

/// Partial category update.
#[derive(Debug, Clone, Default)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub slug: Option<Slug>,
    pub description: Option<String>,
    pub icon: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_clamps() {
        assert_eq!(Pagination::new(None, None), Pagination { page: 1, limit: 12 });
        assert_eq!(
            Pagination::new(Some(0), Some(1000)),
            Pagination { page: 1, limit: 100 }
        );
        assert_eq!(Pagination::new(Some(3), Some(0)).limit, 1);
        assert_eq!(Pagination::new(Some(3), Some(10)).offset(), 20);
    }

    #[test]
    fn test_page_count() {
        let page = Page::new(vec![1, 2], Pagination::new(Some(1), Some(2)), 5);
        assert_eq!(page.pages(), 3);

        let empty: Page<i32> = Page::new(vec![], Pagination::default(), 0);
        assert_eq!(empty.pages(), 0);
    }

    #[test]
    fn test_sort_parses_kebab_case() {
        let sort: ProductSort = serde_json::from_str("\"price-desc\"").unwrap_or_default();
        assert_eq!(sort, ProductSort::PriceDesc);
    }
}
