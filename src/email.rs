//! Outbound mail for invoices.
//!
//! Messages go through Microsoft Graph `sendMail` using an app-only
//! (client credentials) token. Callers treat every send as best-effort.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::MailConfig;
use crate::error::{AppError, Result};
use crate::models::{Application, InvoiceEntry};

/// Retry delays in seconds for transient Graph failures.
const RETRY_DELAYS: &[u64] = &[1, 3];

const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
const LOGIN_BASE: &str = "https://login.microsoftonline.com";

/// Refresh the access token this long before Graph says it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<MailAttachment>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

pub struct GraphMailer {
    config: MailConfig,
    http_client: Client,
    token: Mutex<Option<CachedToken>>,
}

impl GraphMailer {
    pub fn new(config: MailConfig, http_client: Client) -> Self {
        Self {
            config,
            http_client,
            token: Mutex::new(None),
        }
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self.token.lock().ok()?;
        guard
            .as_ref()
            .filter(|t| Instant::now() < t.expires_at)
            .map(|t| t.token.clone())
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let url = format!("{}/{}/oauth2/v2.0/token", LOGIN_BASE, self.config.tenant_id);
        let response = self
            .http_client
            .post(url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("scope", "https://graph.microsoft.com/.default"),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Graph token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "Graph token request returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse Graph token: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        if let Ok(mut guard) = self.token.lock() {
            *guard = Some(CachedToken {
                token: token.access_token.clone(),
                expires_at: Instant::now() + lifetime,
            });
        }

        Ok(token.access_token)
    }

    /// One `sendMail` call. Err carries whether the failure is worth retrying.
    async fn send_once(
        &self,
        access_token: &str,
        body: &serde_json::Value,
    ) -> std::result::Result<(), (AppError, bool)> {
        let url = format!("{}/users/{}/sendMail", GRAPH_API_BASE, self.config.sender);
        let response = self
            .http_client
            .post(url)
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| (AppError::Internal(format!("Graph sendMail failed: {}", e)), true))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let is_transient = status.as_u16() == 429 || status.is_server_error();
        Err((
            AppError::Internal(format!("Graph sendMail returned {}: {}", status, text)),
            is_transient,
        ))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphAttachment<'a> {
    #[serde(rename = "@odata.type")]
    odata_type: &'static str,
    name: &'a str,
    content_type: &'a str,
    content_bytes: String,
}

fn graph_message_body(message: &MailMessage) -> serde_json::Value {
    let attachments: Vec<GraphAttachment> = message
        .attachments
        .iter()
        .map(|a| GraphAttachment {
            odata_type: "#microsoft.graph.fileAttachment",
            name: &a.filename,
            content_type: &a.content_type,
            content_bytes: STANDARD.encode(&a.bytes),
        })
        .collect();

    json!({
        "message": {
            "subject": message.subject,
            "body": { "contentType": "HTML", "content": message.html },
            "toRecipients": [{ "emailAddress": { "address": message.to } }],
            "attachments": attachments,
        },
        "saveToSentItems": false,
    })
}

#[async_trait]
impl Mailer for GraphMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        let access_token = self.access_token().await?;
        let body = graph_message_body(message);
        let mut last_error: Option<AppError> = None;

        for (attempt, delay_secs) in std::iter::once(&0u64).chain(RETRY_DELAYS).enumerate() {
            if *delay_secs > 0 {
                tracing::warn!(attempt, delay_secs, "Retrying mail send after transient failure");
                tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
            }

            match self.send_once(&access_token, &body).await {
                Ok(()) => {
                    tracing::info!(to = %message.to, subject = %message.subject, "Mail sent");
                    return Ok(());
                }
                Err((error, true)) => last_error = Some(error),
                Err((error, false)) => return Err(error),
            }
        }

        Err(last_error
            .unwrap_or_else(|| AppError::Internal("Mail send failed: all retries exhausted".into())))
    }
}

// ============ Templates ============

fn rupees(amount: f64) -> String {
    format!("INR {:.2}", amount)
}

/// Invoice email to the student, PDF attached.
pub fn student_invoice_email(
    to: &str,
    application: &Application,
    invoice: &InvoiceEntry,
    pdf: &[u8],
) -> MailMessage {
    let course = application
        .application_details
        .course_name
        .as_deref()
        .unwrap_or("your course");
    let link = invoice
        .url
        .as_deref()
        .map(|url| format!(r#"<p>You can also <a href="{}">download the invoice</a>.</p>"#, url))
        .unwrap_or_default();

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
<h2 style="color: #333;">Payment received</h2>
<p>Dear {},</p>
<p>We have received your final fee payment of <strong>{}</strong> for <strong>{}</strong>.</p>
<p>Invoice number: <strong>{}</strong><br>Payment ID: {}</p>
{}
<p>Your invoice is attached to this email.</p>
<hr style="border: none; border-top: 1px solid #eee; margin: 30px 0;">
<p style="color: #999; font-size: 12px;">This is an automated message. Reply to the admissions team with any questions.</p>
</body>
</html>"#,
        application.display_name(),
        rupees(invoice.amount_paid),
        course,
        invoice.number,
        invoice.payment_id,
        link,
    );

    MailMessage {
        to: to.to_string(),
        subject: format!("Fee payment receipt {}", invoice.number),
        html,
        attachments: vec![MailAttachment {
            filename: format!("{}.pdf", invoice.number),
            content_type: "application/pdf".to_string(),
            bytes: pdf.to_vec(),
        }],
    }
}

/// Notification to the admissions inbox. No attachment.
pub fn admin_payment_notification(
    to: &str,
    application: &Application,
    invoice: &InvoiceEntry,
) -> MailMessage {
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: sans-serif;">
<h3>Final fee paid</h3>
<table>
<tr><td>Student</td><td>{}</td></tr>
<tr><td>Application</td><td>{}</td></tr>
<tr><td>Email</td><td>{}</td></tr>
<tr><td>Amount</td><td>{}</td></tr>
<tr><td>Invoice</td><td>{}</td></tr>
<tr><td>Payment ID</td><td>{}</td></tr>
<tr><td>Order ID</td><td>{}</td></tr>
</table>
</body>
</html>"#,
        application.display_name(),
        application.id,
        application.contact.email.as_deref().unwrap_or("-"),
        rupees(invoice.amount_paid),
        invoice.url.as_deref().unwrap_or(&invoice.number),
        invoice.payment_id,
        invoice.order_id.as_deref().unwrap_or("-"),
    );

    MailMessage {
        to: to.to_string(),
        subject: format!(
            "Fee paid: {} ({})",
            application.display_name(),
            rupees(invoice.amount_paid)
        ),
        html,
        attachments: Vec::new(),
    }
}
