//! Integration tests for the ChecklistPro API.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p checklistpro-integration-tests
//! ```
//!
//! Each test gets its own server on an ephemeral port, backed by the
//! in-memory repositories, an in-memory session store, the sandbox payment
//! gateway and a temporary downloads directory. No database is needed.
//!
//! # Test Categories
//!
//! - `auth` - Registration, login, sessions and admin user management
//! - `catalog` - Listing, detail, admin writes
//! - `checkout` - Pricing, invalid carts, declines, idempotency
//! - `downloads` - Entitlements, admin overrides, generated files
//! - `platform` - Health, metrics, client events, error envelope, webhook
//! - `uploads` - Admin file uploads into the downloads directory

use std::sync::Arc;

use reqwest::{Client, StatusCode};
use secrecy::SecretString;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::task::JoinHandle;

use checklistpro_core::{Money, Slug, TaxRate, UserRole};
use checklistpro_storefront::app::build_app;
use checklistpro_storefront::config::{
    CheckoutConfig, PaymentConfig, PaymentProvider, StorefrontConfig,
};
use checklistpro_storefront::db::{CatalogRepository, InMemoryStore, Repositories};
use checklistpro_storefront::middleware::RateLimits;
use checklistpro_storefront::models::{NewProduct, Product};
use checklistpro_storefront::services::{AuthService, Registration, SandboxGateway};
use checklistpro_storefront::state::AppState;

/// Password used for every account the helpers create.
pub const PASSWORD: &str = "correct-horse-battery";

/// Options for [`TestContext::start`].
#[derive(Debug, Default, Clone)]
pub struct TestOptions {
    pub webhook_secret: Option<String>,
}

/// A running API server plus handles on its storage.
pub struct TestContext {
    pub base_url: String,
    pub store: Arc<InMemoryStore>,
    pub downloads: TempDir,
    server: JoinHandle<()>,
}

impl TestContext {
    /// Start a server with default options.
    pub async fn new() -> Self {
        Self::start(TestOptions::default()).await
    }

    /// Start a server on an ephemeral port.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound or the temp dir created.
    pub async fn start(options: TestOptions) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Listener has no address");
        let base_url = format!("http://{addr}");

        let downloads = tempfile::tempdir().expect("Failed to create downloads dir");
        let store = Arc::new(InMemoryStore::new());

        let config = StorefrontConfig {
            database_url: SecretString::from("postgres://unused"),
            host: addr.ip(),
            port: addr.port(),
            base_url: base_url.clone(),
            frontend_url: "http://localhost:3000".to_string(),
            cors_allowed_origins: vec!["http://localhost:3000".to_string()],
            session_secret: SecretString::from("k3Jx9!pQ2@vL7#mN4$wR8%tY1^zB6&cD"),
            checkout: CheckoutConfig {
                tax_rate: TaxRate::default(),
                currency: "USD".to_string(),
            },
            downloads_dir: downloads.path().to_path_buf(),
            payments: PaymentConfig {
                provider: PaymentProvider::Sandbox,
                stripe: None,
                webhook_secret: options.webhook_secret.map(SecretString::from),
            },
            sentry_dsn: None,
            sentry_environment: Some("test".to_string()),
            sentry_sample_rate: 0.0,
            sentry_traces_sample_rate: 0.0,
            json_logs: false,
        };

        let state = AppState::new(
            config,
            Repositories::in_memory(&store),
            Arc::new(SandboxGateway),
        );
        let app = build_app(
            state,
            tower_sessions::MemoryStore::default(),
            RateLimits::Disabled,
        );

        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Test server failed");
        });

        Self {
            base_url,
            store,
            downloads,
            server,
        }
    }

    /// Absolute URL of an `/api` path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/api{path}", self.base_url)
    }

    /// A fresh client with its own cookie jar (one per simulated user).
    ///
    /// # Panics
    ///
    /// Panics if the client cannot be built.
    #[must_use]
    pub fn client() -> Client {
        Client::builder()
            .cookie_store(true)
            .build()
            .expect("Failed to create HTTP client")
    }

    /// Register a customer through the API and return a logged-in client
    /// together with the account JSON.
    ///
    /// # Panics
    ///
    /// Panics unless registration answers 201.
    pub async fn customer(&self, email: &str) -> (Client, Value) {
        let client = Self::client();
        let resp = client
            .post(self.url("/auth/register"))
            .json(&json!({
                "first_name": "Test",
                "last_name": "Customer",
                "email": email,
                "password": PASSWORD,
            }))
            .send()
            .await
            .expect("Failed to register");
        assert_eq!(resp.status(), StatusCode::CREATED);
        let user = resp.json().await.expect("Invalid register response");
        (client, user)
    }

    /// Create an admin directly in the store, then log in through the API.
    ///
    /// # Panics
    ///
    /// Panics if the account cannot be created or login fails.
    pub async fn admin(&self, email: &str) -> (Client, Value) {
        AuthService::new(self.store.as_ref())
            .create_user(
                Registration {
                    first_name: "Admin".to_string(),
                    last_name: "User".to_string(),
                    email: email.to_string(),
                    password: PASSWORD.to_string(),
                },
                UserRole::Admin,
            )
            .await
            .expect("Failed to create admin");

        let client = Self::client();
        let resp = client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": PASSWORD }))
            .send()
            .await
            .expect("Failed to log in");
        assert_eq!(resp.status(), StatusCode::OK);
        let user = resp.json().await.expect("Invalid login response");
        (client, user)
    }

    /// Insert a product straight into the catalog.
    ///
    /// # Panics
    ///
    /// Panics if the product cannot be created.
    pub async fn product(&self, name: &str, price_cents: u32, formats: &[(&str, &str)]) -> Product {
        self.store
            .create_product(NewProduct {
                name: name.to_string(),
                slug: Slug::from_name(name),
                description: format!("{name} for small businesses"),
                price: Money::from_cents(price_cents),
                original_price: None,
                category_id: None,
                features: vec!["Step-by-step tasks".to_string()],
                tags: vec!["startup".to_string()],
                formats: formats
                    .iter()
                    .map(|(format, reference)| ((*format).to_string(), (*reference).to_string()))
                    .collect(),
            })
            .await
            .expect("Failed to create product")
    }

    /// Write a file under the downloads directory.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write_download(&self, reference: &str, contents: &str) {
        let path = self.downloads.path().join(reference);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create download subdir");
        }
        std::fs::write(&path, contents).expect("Failed to write download");
    }

    /// `POST /api/orders` with the given lines and payment method.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be sent.
    pub async fn checkout(&self, client: &Client, items: Value, payment_method: &str) -> reqwest::Response {
        client
            .post(self.url("/orders"))
            .json(&json!({ "items": items, "payment_method": payment_method }))
            .send()
            .await
            .expect("Failed to send checkout")
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Read a JSON body.
///
/// # Panics
///
/// Panics if the body is not JSON.
pub async fn json_body(resp: reqwest::Response) -> Value {
    resp.json().await.expect("Response body is not JSON")
}
