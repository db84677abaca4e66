pub mod from_row;
pub mod queries;
mod schema;

pub use schema::init_db;

use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::email::{GraphMailer, Mailer};
use crate::invoice::{InvoiceService, InvoiceStore, SupabaseStorage};
use crate::jwt::{FirebaseVerifier, IdentityVerifier, PaymentTokenCodec};
use crate::payments::{PaymentGateway, RazorpayClient};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Shared state handed to every handler.
///
/// Optional collaborators are `None` when their credentials are not
/// configured; the endpoints that need them answer `server_misconfigured`.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<Config>,
    pub gateway: Option<Arc<dyn PaymentGateway>>,
    pub tokens: Option<PaymentTokenCodec>,
    pub identity: Option<Arc<dyn IdentityVerifier>>,
    pub invoices: Arc<InvoiceService>,
}

impl AppState {
    /// Wire up the production collaborators that `config` has credentials for.
    pub fn from_config(config: Config, db: DbPool) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        let gateway = config.razorpay.as_ref().map(|rp| {
            Arc::new(RazorpayClient::new(rp, http.clone())) as Arc<dyn PaymentGateway>
        });
        let tokens = config
            .payment_token_secret
            .as_deref()
            .map(|secret| PaymentTokenCodec::new(secret, config.payment_token_ttl_minutes));
        let identity = config.firebase_project_id.as_ref().map(|project| {
            Arc::new(FirebaseVerifier::new(project.clone(), http.clone()))
                as Arc<dyn IdentityVerifier>
        });

        let store = config.storage.clone().map(|storage| {
            Arc::new(SupabaseStorage::new(storage, http.clone())) as Arc<dyn InvoiceStore>
        });
        let mailer = config
            .mail
            .clone()
            .map(|mail| Arc::new(GraphMailer::new(mail, http.clone())) as Arc<dyn Mailer>);
        let invoices = InvoiceService::new(
            store,
            mailer,
            config.admin_notification_email.clone(),
            config.issuer.clone(),
        );

        if tokens.is_none() {
            tracing::warn!("PAYMENT_TOKEN_SECRET not set; signed payment links disabled");
        }
        if config.razorpay_webhook_secret.is_none() {
            tracing::warn!("RAZORPAY_WEBHOOK_SECRET not set; webhooks will be rejected");
        }
        if identity.is_none() && config.require_auth_for_direct_payment {
            tracing::warn!("FIREBASE_PROJECT_ID not set; direct-amount payments will be rejected");
        }

        Ok(Self {
            db,
            config: Arc::new(config),
            gateway,
            tokens,
            identity,
            invoices: Arc::new(invoices),
        })
    }
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.pragma_update(None, "foreign_keys", true)
    });
    Pool::builder().max_size(10).build(manager)
}
