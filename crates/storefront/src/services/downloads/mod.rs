//! Entitlements and downloads.
//!
//! A user may download a product in a given format only through one of
//! their own `completed` orders that contains it. Anything short of that is
//! `Forbidden`, including orders that do not exist, so order ids cannot be
//! enumerated. Once entitled, a missing product or format is `NotFound`.

mod fallback;
mod pdf;
mod uploads;

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use checklistpro_core::{OrderId, OrderStatus, ProductId, Slug, UserId};

use crate::db::{CatalogRepository, OrderRepository, RepositoryError};
use crate::models::{Order, Product};

pub use uploads::{StoredUpload, UPLOAD_EXTENSIONS, UploadError};

/// Errors from the download gateway.
#[derive(Debug, Error)]
pub enum EntitlementError {
    #[error("no completed purchase covers this download")]
    Forbidden,

    #[error("product not found")]
    ProductNotFound,

    #[error("Format not available")]
    FormatNotAvailable,

    /// The stored reference points outside the downloads directory.
    #[error("invalid file reference: {0}")]
    InvalidReference(String),

    #[error("failed to read download: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// A product the user may download.
#[derive(Debug, Clone, Serialize)]
pub struct Entitlement {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    /// `None` once the product has been removed from the catalog.
    pub slug: Option<Slug>,
    pub formats: Vec<String>,
    pub purchased_at: DateTime<Utc>,
}

/// Where a download body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadSource {
    Stored,
    /// Derived from the product's markdown source.
    Generated,
    Placeholder,
}

/// A download ready to send.
#[derive(Debug, Clone)]
pub struct DownloadFile {
    pub filename: String,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    pub source: DownloadSource,
}

impl DownloadFile {
    /// `Content-Disposition` header value.
    #[must_use]
    pub fn content_disposition(&self) -> String {
        format!(
            "attachment; filename=\"{}\"",
            self.filename.replace(['"', '\\'], "_")
        )
    }
}

/// Download gateway.
#[derive(Clone)]
pub struct DownloadService {
    inner: Arc<DownloadServiceInner>,
}

struct DownloadServiceInner {
    orders: Arc<dyn OrderRepository>,
    catalog: Arc<dyn CatalogRepository>,
    root: PathBuf,
}

impl DownloadService {
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        catalog: Arc<dyn CatalogRepository>,
        root: PathBuf,
    ) -> Self {
        Self {
            inner: Arc::new(DownloadServiceInner {
                orders,
                catalog,
                root,
            }),
        }
    }

    /// Every product the user has paid for, one entry per order line.
    ///
    /// # Errors
    ///
    /// Returns `EntitlementError::Repository` on storage failures.
    pub async fn list_downloads(&self, user_id: UserId) -> Result<Vec<Entitlement>, EntitlementError> {
        let orders = self.inner.orders.list_completed_for_user(user_id).await?;
        self.entitlements(&orders).await
    }

    /// Entitlements granted by one order.
    ///
    /// # Errors
    ///
    /// Returns `EntitlementError::Forbidden` unless the order exists, belongs
    /// to the user and is completed.
    pub async fn order_downloads(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Vec<Entitlement>, EntitlementError> {
        let order = self.entitled_order(user_id, order_id).await?;
        self.entitlements(std::slice::from_ref(&order)).await
    }

    /// Produce a download body.
    ///
    /// The stored file is preferred; when it is missing the body is
    /// generated. The product's download counter is bumped only after a
    /// body exists.
    ///
    /// # Errors
    ///
    /// See the module docs. `EntitlementError::Io` for unreadable files.
    #[instrument(skip(self))]
    pub async fn download(
        &self,
        user_id: UserId,
        order_id: OrderId,
        product_id: ProductId,
        format: &str,
    ) -> Result<DownloadFile, EntitlementError> {
        let order = self.entitled_order(user_id, order_id).await?;
        if !order.contains_product(product_id) {
            return Err(EntitlementError::Forbidden);
        }

        let product = self
            .inner
            .catalog
            .get_product(product_id)
            .await?
            .ok_or(EntitlementError::ProductNotFound)?;

        let format = format.to_lowercase();
        let reference = product
            .formats
            .get(&format)
            .ok_or(EntitlementError::FormatNotAvailable)?;

        let path = resolve_reference(&self.inner.root, reference)?;
        let filename = path
            .file_name()
            .map_or_else(|| format!("{}.{format}", product.slug), |n| n.to_string_lossy().into_owned());

        let file = match tokio::fs::read(&path).await {
            Ok(body) => DownloadFile {
                content_type: content_type_for(&filename),
                filename,
                body,
                source: DownloadSource::Stored,
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Download file missing, generating");
                fallback::generate(&self.inner.root, &product, &format, filename).await
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = self.inner.catalog.increment_downloads(product_id).await {
            tracing::warn!(%product_id, error = %e, "Failed to record download");
        }

        tracing::info!(source = ?file.source, %format, "Download served");
        Ok(file)
    }

    async fn entitled_order(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Order, EntitlementError> {
        match self.inner.orders.get(order_id).await? {
            Some(order) if order.user_id == user_id && order.status == OrderStatus::Completed => {
                Ok(order)
            }
            _ => Err(EntitlementError::Forbidden),
        }
    }

    async fn entitlements(&self, orders: &[Order]) -> Result<Vec<Entitlement>, EntitlementError> {
        let ids: Vec<ProductId> = orders
            .iter()
            .flat_map(|o| o.items.iter().map(|i| i.product_id))
            .collect();
        let products: HashMap<ProductId, Product> = self
            .inner
            .catalog
            .get_products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        Ok(orders
            .iter()
            .flat_map(|order| {
                order.items.iter().map(|item| {
                    let product = products.get(&item.product_id);
                    Entitlement {
                        order_id: order.id,
                        product_id: item.product_id,
                        product_name: product
                            .map_or_else(|| item.product_name.clone(), |p| p.name.clone()),
                        slug: product.map(|p| p.slug.clone()),
                        formats: product.map(Product::format_names).unwrap_or_default(),
                        purchased_at: order.created_at,
                    }
                })
            })
            .collect())
    }
}

/// Join a stored file reference onto the downloads directory.
///
/// Only plain relative paths are accepted.
pub(crate) fn resolve_reference(root: &Path, reference: &str) -> Result<PathBuf, EntitlementError> {
    let relative = Path::new(reference);
    let plain = !reference.is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !plain {
        tracing::warn!(%reference, "Rejected file reference outside downloads directory");
        return Err(EntitlementError::InvalidReference(reference.to_owned()));
    }
    Ok(root.join(relative))
}

/// Content type from a file extension.
pub(crate) fn content_type_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "md" | "markdown" => "text/markdown; charset=utf-8",
        "xlsx" | "excel" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "docx" | "word" => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        "csv" => "text/csv",
        "html" => "text/html; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use checklistpro_core::{Money, OrderTotals, TaxRate};

    use super::*;
    use crate::db::InMemoryStore;
    use crate::models::{LineItem, NewOrder, NewProduct, StatusChange};

    struct Fixture {
        store: Arc<InMemoryStore>,
        dir: tempfile::TempDir,
        service: DownloadService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        let service = DownloadService::new(store.clone(), store.clone(), dir.path().to_path_buf());
        Fixture {
            store,
            dir,
            service,
        }
    }

    async fn product(store: &InMemoryStore, formats: &[(&str, &str)]) -> Product {
        store
            .create_product(NewProduct {
                name: "Food Truck Launch".to_owned(),
                slug: Slug::from_name("Food Truck Launch"),
                description: "Everything before opening day".to_owned(),
                price: Money::from_cents(1999),
                original_price: None,
                category_id: None,
                features: vec!["Permit tracker".to_owned()],
                tags: vec![],
                formats: formats
                    .iter()
                    .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                    .collect::<BTreeMap<_, _>>(),
            })
            .await
            .unwrap()
    }

    async fn order(store: &InMemoryStore, user: UserId, product: &Product, completed: bool) -> OrderId {
        let order = store
            .create_pending(NewOrder {
                user_id: user,
                items: vec![LineItem {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    quantity: 1,
                    unit_price: product.price,
                }],
                totals: OrderTotals::compute([(product.price, 1)], TaxRate::default()),
                currency: "USD".to_owned(),
                payment_method: "pm_card_visa".to_owned(),
                idempotency_key: None,
            })
            .await
            .unwrap();

        if completed {
            for (from, to) in [
                (OrderStatus::Pending, OrderStatus::Processing),
                (OrderStatus::Processing, OrderStatus::Completed),
            ] {
                store
                    .transition_status(
                        order.id,
                        StatusChange {
                            from,
                            to,
                            actor: None,
                            note: None,
                            payment_reference: None,
                        },
                    )
                    .await
                    .unwrap();
            }
        }
        order.id
    }

    #[tokio::test]
    async fn test_stored_file_is_served_and_counted() {
        let f = fixture();
        std::fs::write(f.dir.path().join("truck.pdf"), b"%PDF-1.7").unwrap();
        let p = product(&f.store, &[("pdf", "truck.pdf")]).await;
        let user = UserId::new(1);
        let order_id = order(&f.store, user, &p, true).await;

        let file = f.service.download(user, order_id, p.id, "PDF").await.unwrap();
        assert_eq!(file.source, DownloadSource::Stored);
        assert_eq!(file.content_type, "application/pdf");
        assert_eq!(file.body, b"%PDF-1.7");
        assert_eq!(file.content_disposition(), "attachment; filename=\"truck.pdf\"");

        let counted = f.store.get_product(p.id).await.unwrap().unwrap();
        assert_eq!(counted.download_count, 1);
    }

    #[tokio::test]
    async fn test_unpaid_or_foreign_orders_are_forbidden() {
        let f = fixture();
        let p = product(&f.store, &[("pdf", "truck.pdf")]).await;
        let pending = order(&f.store, UserId::new(1), &p, false).await;
        let completed = order(&f.store, UserId::new(1), &p, true).await;

        for (user, order_id) in [
            (UserId::new(1), pending),
            (UserId::new(2), completed),
            (UserId::new(1), OrderId::new(9999)),
        ] {
            assert!(matches!(
                f.service.download(user, order_id, p.id, "pdf").await,
                Err(EntitlementError::Forbidden)
            ));
        }

        let other = product(&f.store, &[]).await;
        assert!(matches!(
            f.service.download(UserId::new(1), completed, other.id, "pdf").await,
            Err(EntitlementError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_unknown_format_is_not_found() {
        let f = fixture();
        let p = product(&f.store, &[("pdf", "truck.pdf")]).await;
        let order_id = order(&f.store, UserId::new(1), &p, true).await;

        assert!(matches!(
            f.service.download(UserId::new(1), order_id, p.id, "docx").await,
            Err(EntitlementError::FormatNotAvailable)
        ));
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_markdown_then_placeholder() {
        let f = fixture();
        std::fs::write(f.dir.path().join("truck.md"), "# Truck\n\n- [ ] Permits").unwrap();
        let p = product(&f.store, &[("html", "truck.html"), ("pdf", "missing.pdf")]).await;
        let user = UserId::new(1);
        let order_id = order(&f.store, user, &p, true).await;

        let html = f.service.download(user, order_id, p.id, "html").await.unwrap();
        assert_eq!(html.source, DownloadSource::Generated);
        assert!(String::from_utf8(html.body).unwrap().contains("<h1>Truck</h1>"));

        let pdf = f.service.download(user, order_id, p.id, "pdf").await.unwrap();
        assert_eq!(pdf.source, DownloadSource::Placeholder);
        assert_eq!(pdf.filename, "missing.pdf");
        let text = String::from_utf8(pdf.body).unwrap();
        assert!(text.starts_with("# Food Truck Launch"));
        assert!(text.contains("- Permit tracker"));

        let counted = f.store.get_product(p.id).await.unwrap().unwrap();
        assert_eq!(counted.download_count, 2);
    }

    #[tokio::test]
    async fn test_missing_pdf_is_rendered_from_markdown_source() {
        let f = fixture();
        std::fs::write(f.dir.path().join("truck.md"), "# Real Truck Checklist\n\n- [ ] Permits").unwrap();
        let p = product(&f.store, &[("pdf", "truck.pdf"), ("markdown", "truck.md")]).await;
        let user = UserId::new(1);
        let order_id = order(&f.store, user, &p, true).await;

        let pdf = f.service.download(user, order_id, p.id, "pdf").await.unwrap();
        assert_eq!(pdf.source, DownloadSource::Generated);
        assert_eq!(pdf.content_type, "application/pdf");
        assert_eq!(pdf.filename, "truck.pdf");
        let body = String::from_utf8_lossy(&pdf.body);
        assert!(body.starts_with("%PDF-"));
        assert!(body.contains("(Real Truck Checklist) Tj"));
        assert!(!body.contains("Phase 1: Planning"));
    }

    #[tokio::test]
    async fn test_escaping_reference_is_rejected() {
        let f = fixture();
        let p = product(&f.store, &[("pdf", "../../etc/passwd")]).await;
        let order_id = order(&f.store, UserId::new(1), &p, true).await;

        assert!(matches!(
            f.service.download(UserId::new(1), order_id, p.id, "pdf").await,
            Err(EntitlementError::InvalidReference(_))
        ));
        assert!(resolve_reference(Path::new("/srv"), "/etc/passwd").is_err());
        assert!(resolve_reference(Path::new("/srv"), "food/truck.pdf").is_ok());
    }

    #[tokio::test]
    async fn test_list_downloads_only_completed() {
        let f = fixture();
        let p = product(&f.store, &[("pdf", "truck.pdf")]).await;
        let user = UserId::new(1);
        order(&f.store, user, &p, false).await;
        let completed = order(&f.store, user, &p, true).await;

        let entitlements = f.service.list_downloads(user).await.unwrap();
        assert_eq!(entitlements.len(), 1);
        assert_eq!(entitlements[0].order_id, completed);
        assert_eq!(entitlements[0].formats, vec!["pdf".to_owned()]);

        assert!(f.service.list_downloads(UserId::new(2)).await.unwrap().is_empty());
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("a.xlsx"), "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet");
        assert_eq!(content_type_for("a.csv"), "text/csv");
        assert_eq!(content_type_for("a.fig"), "application/octet-stream");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
