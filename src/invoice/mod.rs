//! Invoice generation and delivery after a payment is marked paid.
//!
//! Every step (render, upload, student mail, admin mail, recording the
//! invoice entry) is attempted independently. Failures are logged and
//! never propagate to the payment response.

mod pdf;
mod storage;

pub use pdf::{InvoiceDocument, render_invoice};
pub use storage::{InvoiceStore, SupabaseStorage};

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::IssuerConfig;
use crate::db::{DbPool, queries};
use crate::email::{Mailer, admin_payment_notification, student_invoice_email};
use crate::error::{AppError, Result};
use crate::models::{Application, InvoiceEntry};

/// `INV-{YYYYMM}-{first 6 chars of application id, upper-cased}-{HHMM}`.
///
/// Two invoices for the same application inside one minute share a number.
pub fn invoice_number(application_id: &str, at: DateTime<Utc>) -> String {
    let prefix: String = application_id.chars().take(6).collect();
    format!(
        "INV-{}-{}-{}",
        at.format("%Y%m"),
        prefix.to_uppercase(),
        at.format("%H%M")
    )
}

/// Storage path of an invoice inside the bucket.
pub fn invoice_path(application_id: &str, number: &str) -> String {
    format!("invoices/{}/{}.pdf", application_id, number)
}

/// The payment an invoice is issued for.
#[derive(Debug, Clone)]
pub struct PaidPayment {
    pub payment_id: String,
    pub order_id: Option<String>,
    pub amount: f64,
    pub method: Option<String>,
}

/// What the invoice run managed to do.
#[derive(Debug, Clone)]
pub struct InvoiceOutcome {
    pub entry: InvoiceEntry,
    pub rendered: bool,
    pub recorded: bool,
}

pub struct InvoiceService {
    store: Option<Arc<dyn InvoiceStore>>,
    mailer: Option<Arc<dyn Mailer>>,
    admin_email: Option<String>,
    issuer: IssuerConfig,
}

impl InvoiceService {
    pub fn new(
        store: Option<Arc<dyn InvoiceStore>>,
        mailer: Option<Arc<dyn Mailer>>,
        admin_email: Option<String>,
        issuer: IssuerConfig,
    ) -> Self {
        Self {
            store,
            mailer,
            admin_email,
            issuer,
        }
    }

    /// A service with no storage or mail; it still records invoice entries.
    pub fn disabled(issuer: IssuerConfig) -> Self {
        Self::new(None, None, None, issuer)
    }

    /// Best-effort invoice run for a payment that just became paid.
    ///
    /// Returns `None` only when the application can no longer be read.
    pub async fn issue_for_payment(
        &self,
        pool: &DbPool,
        application_id: &str,
        payment: &PaidPayment,
    ) -> Option<InvoiceOutcome> {
        let application = match load_application(pool, application_id) {
            Ok(app) => app,
            Err(e) => {
                tracing::warn!(application_id, error = %e, "Invoice skipped: application unavailable");
                return None;
            }
        };

        let now = Utc::now();
        let mut entry = InvoiceEntry {
            number: invoice_number(&application.id, now),
            date: now,
            amount_paid: payment.amount,
            total_course_fees: application.application_details.total_course_fees,
            discount: application.application_details.discount,
            payment_id: payment.payment_id.clone(),
            order_id: payment.order_id.clone(),
            url: None,
            emailed_to: Vec::new(),
        };

        let pdf = match self.render(&application, &entry, payment) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(application_id, error = %e, "Invoice PDF render failed");
                None
            }
        };

        if let Some(ref bytes) = pdf {
            entry.url = self.upload(&application.id, &entry.number, bytes.clone()).await;
        }

        if let Some(ref bytes) = pdf {
            self.mail_student(&application, &mut entry, bytes).await;
        }
        self.mail_admin(&application, &mut entry).await;

        let recorded = match record_invoice(pool, &application.id, &entry) {
            Ok(recorded) => recorded,
            Err(e) => {
                tracing::warn!(application_id, error = %e, "Failed to record invoice entry");
                false
            }
        };

        tracing::info!(
            application_id,
            invoice = %entry.number,
            uploaded = entry.url.is_some(),
            emailed = entry.emailed_to.len(),
            "Invoice processed"
        );

        Some(InvoiceOutcome {
            rendered: pdf.is_some(),
            recorded,
            entry,
        })
    }

    fn render(
        &self,
        application: &Application,
        entry: &InvoiceEntry,
        payment: &PaidPayment,
    ) -> Result<Vec<u8>> {
        let document = InvoiceDocument {
            issuer: &self.issuer,
            number: &entry.number,
            date: entry.date,
            student_name: application.display_name(),
            guardian_name: application.basic.guardian_name.as_deref(),
            email: application.contact.email.as_deref(),
            phone: application.contact.phone.as_deref(),
            application_id: &application.id,
            course_name: application.application_details.course_name.as_deref(),
            batch: application.application_details.batch.as_deref(),
            payment_id: &payment.payment_id,
            order_id: payment.order_id.as_deref(),
            method: payment.method.as_deref(),
            total_course_fees: entry.total_course_fees,
            discount: entry.discount,
            amount_paid: entry.amount_paid,
        };
        render_invoice(&document)
    }

    async fn upload(&self, application_id: &str, number: &str, bytes: Vec<u8>) -> Option<String> {
        let Some(store) = &self.store else {
            tracing::warn!(application_id, "Invoice storage not configured, skipping upload");
            return None;
        };

        let path = invoice_path(application_id, number);
        match store.upload(&path, bytes, "application/pdf").await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(application_id, path = %path, error = %e, "Invoice upload failed");
                None
            }
        }
    }

    async fn mail_student(&self, application: &Application, entry: &mut InvoiceEntry, pdf: &[u8]) {
        let Some(mailer) = &self.mailer else {
            tracing::warn!(application_id = %application.id, "Mail not configured, skipping student invoice email");
            return;
        };
        let Some(to) = application.contact.email.as_deref().filter(|e| !e.is_empty()) else {
            tracing::warn!(application_id = %application.id, "No student email on file, skipping invoice email");
            return;
        };

        let message = student_invoice_email(to, application, entry, pdf);
        match mailer.send(&message).await {
            Ok(()) => entry.emailed_to.push(to.to_string()),
            Err(e) => {
                tracing::warn!(application_id = %application.id, error = %e, "Student invoice email failed");
            }
        }
    }

    async fn mail_admin(&self, application: &Application, entry: &mut InvoiceEntry) {
        let (Some(mailer), Some(to)) = (&self.mailer, self.admin_email.as_deref()) else {
            return;
        };

        let message = admin_payment_notification(to, application, entry);
        match mailer.send(&message).await {
            Ok(()) => entry.emailed_to.push(to.to_string()),
            Err(e) => {
                tracing::warn!(application_id = %application.id, error = %e, "Admin payment notification failed");
            }
        }
    }
}

fn load_application(pool: &DbPool, application_id: &str) -> Result<Application> {
    let conn = pool.get()?;
    queries::get_application_by_id(&conn, application_id)?.ok_or(AppError::ApplicationNotFound)
}

fn record_invoice(pool: &DbPool, application_id: &str, entry: &InvoiceEntry) -> Result<bool> {
    let mut conn = pool.get()?;
    queries::append_invoice(&mut conn, application_id, entry)
}
