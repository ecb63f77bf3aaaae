//! In-process implementation of every repository trait.
//!
//! Backs the integration tests and `PAYMENT_PROVIDER=sandbox` experiments.
//! All state lives behind one async mutex, so each repository call is atomic
//! with respect to every other call.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;

use checklistpro_core::{
    CategoryId, Email, Money, OrderId, OrderStatus, ProductId, UserId, UserRole,
};

use super::{AnalyticsRepository, CatalogRepository, OrderRepository, RepositoryError, UserRepository};
use crate::models::{
    Category, CategoryUpdate, DailyRevenue, DashboardSummary, NewCategory, NewOrder, NewProduct,
    NewUser, Order, OrderFilter, Page, Pagination, Product, ProductFilter, ProductSort,
    ProductStats, ProductUpdate, ProfileUpdate, Rating, StatusChange, StatusCounts, StatusEvent,
    User, UserStats,
};

#[derive(Default)]
struct State {
    users: BTreeMap<UserId, (User, String)>,
    categories: BTreeMap<CategoryId, Category>,
    products: BTreeMap<ProductId, Product>,
    orders: BTreeMap<OrderId, Order>,
    events: Vec<StatusEvent>,
    next_id: i32,
}

impl State {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn category_with_count(&self, category: &Category) -> Category {
        let product_count = self
            .products
            .values()
            .filter(|p| p.enabled && p.category_id == Some(category.id))
            .count();
        Category {
            product_count: i64::try_from(product_count).unwrap_or(i64::MAX),
            ..category.clone()
        }
    }

    fn slug_taken_by_product(&self, slug: &str, except: Option<ProductId>) -> bool {
        self.products
            .values()
            .any(|p| p.slug.as_str() == slug && Some(p.id) != except)
    }

    fn slug_taken_by_category(&self, slug: &str, except: Option<CategoryId>) -> bool {
        self.categories
            .values()
            .any(|c| c.slug.as_str() == slug && Some(c.id) != except)
    }
}

/// Repositories over process memory.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T>(mut items: Vec<T>, page: Pagination) -> Page<T> {
    let total = items.len();
    let start = usize::try_from(page.offset()).unwrap_or(usize::MAX).min(total);
    let end = start.saturating_add(page.limit as usize).min(total);
    let window: Vec<T> = items.drain(start..end).collect();
    Page::new(window, page, total as u64)
}

fn matches_search(product: &Product, search: &str) -> bool {
    let needle = search.to_lowercase();
    product.name.to_lowercase().contains(&needle)
        || product.description.to_lowercase().contains(&needle)
        || product
            .tags
            .iter()
            .any(|tag| tag.to_lowercase().contains(&needle))
}

fn sort_products(products: &mut [Product], sort: ProductSort) {
    match sort {
        ProductSort::Newest => {
            products.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        }
        ProductSort::Popular => {
            products.sort_by(|a, b| b.download_count.cmp(&a.download_count).then(b.id.cmp(&a.id)));
        }
        ProductSort::PriceAsc => products.sort_by(|a, b| a.price.cmp(&b.price).then(a.id.cmp(&b.id))),
        ProductSort::PriceDesc => {
            products.sort_by(|a, b| b.price.cmp(&a.price).then(b.id.cmp(&a.id)));
        }
        ProductSort::Name => products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id))),
    }
}

// =============================================================================
// Users
// =============================================================================

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.users.get(&id).map(|(user, _)| user.clone()))
    }

    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|(user, _)| &user.email == email)
            .map(|(user, _)| user.clone()))
    }

    async fn get_with_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|(user, _)| &user.email == email)
            .cloned())
    }

    async fn get_password_hash(&self, id: UserId) -> Result<Option<String>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.users.get(&id).map(|(_, hash)| hash.clone()))
    }

    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|(u, _)| u.email == user.email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let now = Utc::now();
        let created = User {
            id: UserId::new(state.next_id()),
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            role: user.role,
            address: None,
            active: true,
            created_at: now,
            updated_at: now,
        };
        state
            .users
            .insert(created.id, (created.clone(), user.password_hash));
        Ok(created)
    }

    async fn update_profile(
        &self,
        id: UserId,
        update: ProfileUpdate,
    ) -> Result<User, RepositoryError> {
        let mut state = self.state.lock().await;
        let (user, _) = state.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if let Some(first_name) = update.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            user.last_name = last_name;
        }
        if let Some(address) = update.address {
            user.address = Some(address);
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn update_password(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let (user, hash) = state.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        password_hash.clone_into(hash);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_role(&self, id: UserId, role: UserRole) -> Result<User, RepositoryError> {
        let mut state = self.state.lock().await;
        let (user, _) = state.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        user.role = role;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn set_active(&self, id: UserId, active: bool) -> Result<User, RepositoryError> {
        let mut state = self.state.lock().await;
        let (user, _) = state.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        user.active = active;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn list(&self, page: Pagination) -> Result<Page<User>, RepositoryError> {
        let state = self.state.lock().await;
        let mut users: Vec<User> = state.users.values().map(|(u, _)| u.clone()).collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(users, page))
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[async_trait]
impl CatalogRepository for InMemoryStore {
    async fn list_products(&self, filter: &ProductFilter) -> Result<Page<Product>, RepositoryError> {
        let state = self.state.lock().await;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| filter.include_disabled || p.enabled)
            .filter(|p| filter.category_id.is_none_or(|c| p.category_id == Some(c)))
            .filter(|p| {
                filter
                    .search
                    .as_deref()
                    .is_none_or(|s| matches_search(p, s))
            })
            .cloned()
            .collect();
        sort_products(&mut products, filter.sort);
        Ok(paginate(products, filter.page))
    }

    async fn get_product_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .products
            .values()
            .find(|p| p.enabled && p.slug.as_str() == slug)
            .cloned())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        let mut state = self.state.lock().await;
        if state.slug_taken_by_product(product.slug.as_str(), None) {
            return Err(RepositoryError::Conflict(
                "product slug already exists".to_owned(),
            ));
        }

        let now = Utc::now();
        let created = Product {
            id: ProductId::new(state.next_id()),
            name: product.name,
            slug: product.slug,
            description: product.description,
            price: product.price,
            original_price: product.original_price,
            category_id: product.category_id,
            features: product.features,
            tags: product.tags,
            formats: product.formats,
            download_count: 0,
            view_count: 0,
            rating: Rating::default(),
            enabled: true,
            created_at: now,
            updated_at: now,
        };
        state.products.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, RepositoryError> {
        let mut state = self.state.lock().await;
        if let Some(slug) = &update.slug
            && state.slug_taken_by_product(slug.as_str(), Some(id))
        {
            return Err(RepositoryError::Conflict(
                "product slug already exists".to_owned(),
            ));
        }

        let product = state.products.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if let Some(name) = update.name {
            product.name = name;
        }
        if let Some(slug) = update.slug {
            product.slug = slug;
        }
        if let Some(description) = update.description {
            product.description = description;
        }
        if let Some(price) = update.price {
            product.price = price;
        }
        if let Some(original_price) = update.original_price {
            product.original_price = original_price;
        }
        if let Some(category_id) = update.category_id {
            product.category_id = category_id;
        }
        if let Some(features) = update.features {
            product.features = features;
        }
        if let Some(tags) = update.tags {
            product.tags = tags;
        }
        if let Some(formats) = update.formats {
            product.formats = formats;
        }
        if let Some(enabled) = update.enabled {
            product.enabled = enabled;
        }
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn increment_views(&self, id: ProductId) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let product = state.products.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        product.view_count += 1;
        Ok(())
    }

    async fn increment_downloads(&self, id: ProductId) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let product = state.products.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        product.download_count += 1;
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let state = self.state.lock().await;
        let mut categories: Vec<Category> = state
            .categories
            .values()
            .map(|c| state.category_with_count(c))
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .categories
            .get(&id)
            .map(|c| state.category_with_count(c)))
    }

    async fn get_category_by_slug(&self, slug: &str) -> Result<Option<Category>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .categories
            .values()
            .find(|c| c.slug.as_str() == slug)
            .map(|c| state.category_with_count(c)))
    }

    async fn create_category(&self, category: NewCategory) -> Result<Category, RepositoryError> {
        let mut state = self.state.lock().await;
        if state.slug_taken_by_category(category.slug.as_str(), None) {
            return Err(RepositoryError::Conflict(
                "category slug already exists".to_owned(),
            ));
        }

        let now = Utc::now();
        let created = Category {
            id: CategoryId::new(state.next_id()),
            name: category.name,
            slug: category.slug,
            description: category.description,
            icon: category.icon,
            product_count: 0,
            created_at: now,
            updated_at: now,
        };
        state.categories.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_category(
        &self,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<Category, RepositoryError> {
        let mut state = self.state.lock().await;
        if let Some(slug) = &update.slug
            && state.slug_taken_by_category(slug.as_str(), Some(id))
        {
            return Err(RepositoryError::Conflict(
                "category slug already exists".to_owned(),
            ));
        }

        let category = state
            .categories
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        if let Some(name) = update.name {
            category.name = name;
        }
        if let Some(slug) = update.slug {
            category.slug = slug;
        }
        if let Some(description) = update.description {
            category.description = description;
        }
        if let Some(icon) = update.icon {
            category.icon = icon;
        }
        category.updated_at = Utc::now();

        let updated = category.clone();
        Ok(state.category_with_count(&updated))
    }

    async fn delete_category(&self, id: CategoryId) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        if !state.categories.contains_key(&id) {
            return Err(RepositoryError::NotFound);
        }
        if state.products.values().any(|p| p.category_id == Some(id)) {
            return Err(RepositoryError::Conflict(
                "category still has products".to_owned(),
            ));
        }
        state.categories.remove(&id);
        Ok(())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

// =============================================================================
// Orders
// =============================================================================

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn create_pending(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut state = self.state.lock().await;
        if let Some(key) = order.idempotency_key.as_deref()
            && state
                .orders
                .values()
                .any(|o| o.user_id == order.user_id && o.idempotency_key.as_deref() == Some(key))
        {
            return Err(RepositoryError::Conflict(
                "duplicate idempotency key".to_owned(),
            ));
        }
        if order
            .items
            .iter()
            .any(|item| !state.products.contains_key(&item.product_id))
        {
            return Err(RepositoryError::Conflict(
                "order references an unknown product".to_owned(),
            ));
        }

        let now = Utc::now();
        let created = Order {
            id: OrderId::new(state.next_id()),
            user_id: order.user_id,
            items: order.items,
            subtotal: order.totals.subtotal,
            tax: order.totals.tax,
            total: order.totals.total,
            currency: order.currency,
            status: OrderStatus::Pending,
            payment_method: order.payment_method,
            payment_reference: None,
            idempotency_key: order.idempotency_key,
            created_at: now,
            updated_at: now,
        };
        state.orders.insert(created.id, created.clone());
        state.events.push(StatusEvent {
            order_id: created.id,
            from_status: None,
            to_status: OrderStatus::Pending,
            actor_id: None,
            note: None,
            created_at: now,
        });
        Ok(created)
    }

    async fn find_by_idempotency_key(
        &self,
        user_id: UserId,
        key: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .values()
            .find(|o| o.user_id == user_id && o.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.orders.get(&id).cloned())
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Page<Order>, RepositoryError> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| filter.user_id.is_none_or(|u| o.user_id == u))
            .filter(|o| filter.status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(orders, filter.page))
    }

    async fn list_completed_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Order>, RepositoryError> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id && o.status == OrderStatus::Completed)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn transition_status(
        &self,
        id: OrderId,
        change: StatusChange,
    ) -> Result<Order, RepositoryError> {
        let mut state = self.state.lock().await;
        let order = state.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if order.status != change.from {
            return Err(RepositoryError::Conflict(format!(
                "order {id} is no longer {}",
                change.from
            )));
        }

        let now = Utc::now();
        order.status = change.to;
        if let Some(reference) = change.payment_reference {
            order.payment_reference = Some(reference);
        }
        order.updated_at = now;
        let updated = order.clone();

        state.events.push(StatusEvent {
            order_id: id,
            from_status: Some(change.from),
            to_status: change.to,
            actor_id: change.actor,
            note: change.note,
            created_at: now,
        });
        Ok(updated)
    }

    async fn record_payment_reference(
        &self,
        id: OrderId,
        reference: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let order = state.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        order.payment_reference = Some(reference.to_owned());
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .values()
            .find(|o| o.payment_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn status_history(&self, id: OrderId) -> Result<Vec<StatusEvent>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.order_id == id)
            .cloned()
            .collect())
    }
}

// =============================================================================
// Analytics
// =============================================================================

#[async_trait]
impl AnalyticsRepository for InMemoryStore {
    async fn dashboard(&self) -> Result<DashboardSummary, RepositoryError> {
        let state = self.state.lock().await;

        let mut by_status = StatusCounts::default();
        for order in state.orders.values() {
            match order.status {
                OrderStatus::Pending => by_status.pending += 1,
                OrderStatus::Processing => by_status.processing += 1,
                OrderStatus::Completed => by_status.completed += 1,
                OrderStatus::Cancelled => by_status.cancelled += 1,
            }
        }

        Ok(DashboardSummary {
            total_orders: state.orders.len() as u64,
            orders_by_status: by_status,
            total_revenue: state
                .orders
                .values()
                .filter(|o| o.status == OrderStatus::Completed)
                .map(|o| o.total)
                .sum(),
            total_users: state.users.len() as u64,
            total_products: state.products.len() as u64,
            enabled_products: state.products.values().filter(|p| p.enabled).count() as u64,
            total_downloads: state.products.values().map(|p| p.download_count).sum(),
            total_views: state.products.values().map(|p| p.view_count).sum(),
        })
    }

    async fn daily_revenue(&self, days: u32) -> Result<Vec<DailyRevenue>, RepositoryError> {
        let state = self.state.lock().await;
        let since = Utc::now() - Duration::days(i64::from(days));

        let mut by_day: BTreeMap<chrono::NaiveDate, (u64, Money)> = BTreeMap::new();
        for order in state
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Completed && o.created_at >= since)
        {
            let entry = by_day
                .entry(order.created_at.date_naive())
                .or_insert((0, Money::ZERO));
            entry.0 += 1;
            entry.1 = entry.1 + order.total;
        }

        Ok(by_day
            .into_iter()
            .map(|(date, (orders, revenue))| DailyRevenue {
                date,
                orders,
                revenue,
            })
            .collect())
    }

    async fn top_products(&self, limit: u32) -> Result<Vec<ProductStats>, RepositoryError> {
        let state = self.state.lock().await;

        let mut products: Vec<&Product> = state.products.values().collect();
        products.sort_by(|a, b| b.download_count.cmp(&a.download_count).then(a.id.cmp(&b.id)));

        Ok(products
            .into_iter()
            .take(limit as usize)
            .map(|p| {
                let lines = state
                    .orders
                    .values()
                    .filter(|o| o.status == OrderStatus::Completed)
                    .flat_map(|o| o.items.iter())
                    .filter(|item| item.product_id == p.id);
                let (units_sold, revenue) = lines.fold((0_u64, Money::ZERO), |(units, rev), item| {
                    (units + u64::from(item.quantity), rev + item.line_total())
                });
                ProductStats {
                    product_id: p.id,
                    name: p.name.clone(),
                    slug: p.slug.clone(),
                    enabled: p.enabled,
                    downloads: p.download_count,
                    views: p.view_count,
                    units_sold,
                    revenue,
                }
            })
            .collect())
    }

    async fn user_stats(&self, days: u32) -> Result<UserStats, RepositoryError> {
        let state = self.state.lock().await;
        let since = Utc::now() - Duration::days(i64::from(days));

        let mut stats = UserStats::default();
        for (user, _) in state.users.values() {
            stats.total += 1;
            match user.role {
                UserRole::Customer => stats.customers += 1,
                UserRole::Admin => stats.admins += 1,
            }
            if user.active {
                stats.active += 1;
            }
            if user.created_at >= since {
                stats.new_users += 1;
            }
        }
        Ok(stats)
    }
}
