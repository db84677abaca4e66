use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use enrollpay::config::Config;
use enrollpay::db::{AppState, create_pool, init_db, queries};
use enrollpay::handlers;
use enrollpay::jwt::{FINAL_FEE_TOKEN, PaymentTokenClaims, PaymentTokenCodec};
use enrollpay::models::{
    AccountInfo, ApplicationDetails, BasicInfo, ContactInfo, CreateApplication, FinalFeePayment,
    PaymentStatus,
};

#[derive(Parser, Debug)]
#[command(name = "enrollpay")]
#[command(about = "Final-fee payment reconciliation for the enrollment site")]
struct Cli {
    /// Seed the database with a demo application (dev mode only)
    #[arg(long)]
    seed: bool,

    /// Print a signed payment token for this application id (or auth uid) and exit
    #[arg(long, value_name = "USER_ID")]
    issue_token: Option<String>,

    /// Amount for --issue-token (defaults to the application's payable amount)
    #[arg(long, requires = "issue_token")]
    amount: Option<f64>,

    /// Token lifetime for --issue-token, in minutes
    #[arg(long, requires = "issue_token")]
    ttl_minutes: Option<u64>,
}

/// Seeds one unpaid application so the payment page can be exercised locally.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let input = CreateApplication {
        basic: BasicInfo {
            name: Some("Dev Student".to_string()),
            guardian_name: Some("Dev Guardian".to_string()),
            ..Default::default()
        },
        contact: ContactInfo {
            email: Some("student@enrollpay.local".to_string()),
            phone: Some("+910000000000".to_string()),
            ..Default::default()
        },
        account: AccountInfo {
            auth_id: Some("dev-firebase-uid".to_string()),
            ..Default::default()
        },
        application_details: ApplicationDetails {
            course_name: Some("JEE Advanced Two-Year Programme".to_string()),
            batch: Some("2026".to_string()),
            total_course_fees: Some(50000.0),
            discount: Some(5000.0),
            application_submitted: true,
            ..Default::default()
        },
        final_fee_payment: Some(FinalFeePayment {
            payable_amount: Some(45000.0),
            payment_status: Some(PaymentStatus::Pending),
            token: Some(uuid::Uuid::new_v4().simple().to_string()),
            token_expires: Some(chrono::Utc::now() + chrono::Duration::days(7)),
            ..Default::default()
        }),
    };

    let application =
        queries::create_application(&conn, &input).expect("Failed to create dev application");

    tracing::info!("============================================");
    tracing::info!("DEV DATA SEEDED");
    tracing::info!("Application: {}", application.id);
    tracing::info!(
        "Legacy token: {}",
        application.final_fee_payment.token.as_deref().unwrap_or("-")
    );
    tracing::info!("============================================");

    if let Some(ref codec) = state.tokens {
        match issue_token(&conn, codec, &application.id, None, None) {
            Ok(token) => {
                println!();
                println!("--- COPY FROM HERE ---");
                println!("  application_id: {}", application.id);
                println!("  payment_token: {}", token);
                println!("--- END COPY ---");
                println!();
            }
            Err(e) => tracing::warn!("Could not issue dev payment token: {}", e),
        }
    }
}

fn issue_token(
    conn: &rusqlite::Connection,
    codec: &PaymentTokenCodec,
    user_id: &str,
    amount: Option<f64>,
    ttl_minutes: Option<u64>,
) -> Result<String, String> {
    let application = queries::find_application_for_user(conn, user_id)
        .map_err(|e| format!("Failed to load application: {}", e))?
        .ok_or_else(|| format!("No application for '{}'", user_id))?;

    let amount = handlers::admin::token_amount(amount, &application.final_fee_payment)
        .map_err(|_| "Amount must be positive (pass --amount or set payable_amount)".to_string())?;

    let claims = PaymentTokenClaims {
        user_id: application.id.clone(),
        amount,
        token_type: FINAL_FEE_TOKEN.to_string(),
    };

    match ttl_minutes {
        Some(ttl) => codec.encode_with_ttl(&claims, ttl * 60),
        None => codec.encode(&claims),
    }
    .map_err(|e| format!("Failed to sign token: {}", e))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "enrollpay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let addr = config.addr();
    let dev_mode = config.dev_mode;
    let state = AppState::from_config(config, db_pool).expect("Failed to build HTTP client");

    if let Some(ref user_id) = cli.issue_token {
        let Some(ref codec) = state.tokens else {
            eprintln!("PAYMENT_TOKEN_SECRET is not set");
            std::process::exit(1);
        };
        let conn = state.db.get().expect("Failed to get db connection");
        match issue_token(&conn, codec, user_id, cli.amount, cli.ttl_minutes) {
            Ok(token) => {
                println!("{}", token);
                return;
            }
            Err(e) => {
                eprintln!("ERROR: {}", e);
                std::process::exit(1);
            }
        }
    }

    if cli.seed {
        if !dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set ENROLLPAY_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    let app = handlers::app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("enrollpay listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
