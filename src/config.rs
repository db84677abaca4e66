use std::env;

/// Razorpay API credentials.
#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
}

/// Microsoft Graph client-credentials settings for outbound mail.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    /// Mailbox the messages are sent from (`/users/{sender}/sendMail`)
    pub sender: String,
}

/// Supabase Storage settings for uploaded invoices.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub url: String,
    pub service_role_key: String,
    pub bucket: String,
}

/// Business details printed on every invoice.
#[derive(Debug, Clone)]
pub struct IssuerConfig {
    pub name: String,
    pub address: String,
    pub email: String,
}

/// Immutable runtime configuration, built once at start-up and shared via `AppState`.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub dev_mode: bool,
    pub razorpay: Option<RazorpayConfig>,
    pub razorpay_webhook_secret: Option<String>,
    pub payment_token_secret: Option<String>,
    pub payment_token_ttl_minutes: u64,
    pub payment_currency: String,
    /// When false, the direct-amount flow accepts requests without an identity token
    pub require_auth_for_direct_payment: bool,
    pub firebase_project_id: Option<String>,
    pub admin_api_key: Option<String>,
    pub mail: Option<MailConfig>,
    pub admin_notification_email: Option<String>,
    pub storage: Option<StorageConfig>,
    pub issuer: IssuerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            database_path: "enrollpay.db".to_string(),
            dev_mode: false,
            razorpay: None,
            razorpay_webhook_secret: None,
            payment_token_secret: None,
            payment_token_ttl_minutes: 30,
            payment_currency: "INR".to_string(),
            require_auth_for_direct_payment: true,
            firebase_project_id: None,
            admin_api_key: None,
            mail: None,
            admin_notification_email: None,
            storage: None,
            issuer: IssuerConfig {
                name: "Exam Coaching Academy".to_string(),
                address: String::new(),
                email: String::new(),
            },
        }
    }
}

/// Read an env var, treating empty values as unset.
fn env_opt(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_flag(name: &str, default: bool) -> bool {
    match env_opt(name) {
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let dev_mode = env::var("ENROLLPAY_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let razorpay = match (env_opt("RAZORPAY_KEY_ID"), env_opt("RAZORPAY_KEY_SECRET")) {
            (Some(key_id), Some(key_secret)) => Some(RazorpayConfig { key_id, key_secret }),
            _ => {
                tracing::warn!("RAZORPAY_KEY_ID/RAZORPAY_KEY_SECRET not set; order creation disabled");
                None
            }
        };

        let mail = match (
            env_opt("MS_TENANT_ID"),
            env_opt("MS_CLIENT_ID"),
            env_opt("MS_CLIENT_SECRET"),
            env_opt("MS_SENDER_EMAIL"),
        ) {
            (Some(tenant_id), Some(client_id), Some(client_secret), Some(sender)) => {
                Some(MailConfig {
                    tenant_id,
                    client_id,
                    client_secret,
                    sender,
                })
            }
            _ => {
                tracing::warn!("Microsoft Graph mail settings incomplete; invoice emails disabled");
                None
            }
        };

        let storage = match (env_opt("SUPABASE_URL"), env_opt("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(service_role_key)) => Some(StorageConfig {
                url: url.trim_end_matches('/').to_string(),
                service_role_key,
                bucket: env_opt("INVOICE_BUCKET").unwrap_or_else(|| "invoices".to_string()),
            }),
            _ => {
                tracing::warn!("SUPABASE_URL/SUPABASE_SERVICE_ROLE_KEY not set; invoice upload disabled");
                None
            }
        };

        Self {
            host: env_opt("HOST").unwrap_or(defaults.host),
            port: env_opt("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            database_path: env_opt("DATABASE_PATH").unwrap_or(defaults.database_path),
            dev_mode,
            razorpay,
            razorpay_webhook_secret: env_opt("RAZORPAY_WEBHOOK_SECRET"),
            payment_token_secret: env_opt("PAYMENT_TOKEN_SECRET"),
            payment_token_ttl_minutes: env_opt("PAYMENT_TOKEN_TTL_MINUTES")
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.payment_token_ttl_minutes),
            payment_currency: env_opt("PAYMENT_CURRENCY")
                .map(|c| c.to_uppercase())
                .unwrap_or(defaults.payment_currency),
            require_auth_for_direct_payment: env_flag("REQUIRE_AUTH_FOR_DIRECT_PAYMENT", true),
            firebase_project_id: env_opt("FIREBASE_PROJECT_ID"),
            admin_api_key: env_opt("ADMIN_API_KEY"),
            mail,
            admin_notification_email: env_opt("ADMIN_NOTIFICATION_EMAIL"),
            storage,
            issuer: IssuerConfig {
                name: env_opt("INVOICE_ISSUER_NAME").unwrap_or(defaults.issuer.name),
                address: env_opt("INVOICE_ISSUER_ADDRESS").unwrap_or_default(),
                email: env_opt("INVOICE_ISSUER_EMAIL").unwrap_or_default(),
            },
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
