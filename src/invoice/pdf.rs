//! Single-page A4 invoice rendering with `lopdf`.
//!
//! Uses the standard Helvetica fonts, so text is limited to WinAnsi;
//! amounts are printed with an "INR" prefix rather than the rupee sign.

use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

use crate::config::IssuerConfig;
use crate::error::{AppError, Result};

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;

/// Everything printed on one invoice.
#[derive(Debug, Clone)]
pub struct InvoiceDocument<'a> {
    pub issuer: &'a IssuerConfig,
    pub number: &'a str,
    pub date: DateTime<Utc>,
    pub student_name: &'a str,
    pub guardian_name: Option<&'a str>,
    pub email: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub application_id: &'a str,
    pub course_name: Option<&'a str>,
    pub batch: Option<&'a str>,
    pub payment_id: &'a str,
    pub order_id: Option<&'a str>,
    pub method: Option<&'a str>,
    pub total_course_fees: Option<f64>,
    pub discount: Option<f64>,
    pub amount_paid: f64,
}

fn money(amount: f64) -> String {
    format!("INR {:.2}", amount)
}

/// Accumulates content-stream operations top-down.
struct PageWriter {
    ops: Vec<Operation>,
    y: f32,
}

impl PageWriter {
    fn new() -> Self {
        Self {
            ops: Vec::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn text_at(&mut self, x: f32, y: f32, font: &str, size: f32, text: &str) {
        self.ops.push(Operation::new("BT", vec![]));
        self.ops
            .push(Operation::new("Tf", vec![font.into(), size.into()]));
        self.ops.push(Operation::new("Td", vec![x.into(), y.into()]));
        self.ops
            .push(Operation::new("Tj", vec![Object::string_literal(text)]));
        self.ops.push(Operation::new("ET", vec![]));
    }

    fn line(&mut self, font: &str, size: f32, text: &str) {
        self.text_at(MARGIN, self.y, font, size, text);
        self.y -= size + 6.0;
    }

    /// Label on the left, value indented.
    fn field(&mut self, label: &str, value: &str) {
        self.text_at(MARGIN, self.y, "F2", 10.0, label);
        self.text_at(MARGIN + 140.0, self.y, "F1", 10.0, value);
        self.y -= 16.0;
    }

    /// Label on the left, value right-aligned-ish in a fixed column.
    fn amount_row(&mut self, label: &str, value: &str, bold: bool) {
        let font = if bold { "F2" } else { "F1" };
        self.text_at(MARGIN, self.y, font, 11.0, label);
        self.text_at(PAGE_WIDTH - MARGIN - 140.0, self.y, font, 11.0, value);
        self.y -= 18.0;
    }

    fn rule(&mut self) {
        self.y += 4.0;
        self.ops.push(Operation::new("w", vec![0.5f32.into()]));
        self.ops
            .push(Operation::new("m", vec![MARGIN.into(), self.y.into()]));
        self.ops.push(Operation::new(
            "l",
            vec![(PAGE_WIDTH - MARGIN).into(), self.y.into()],
        ));
        self.ops.push(Operation::new("S", vec![]));
        self.y -= 16.0;
    }

    fn section(&mut self, title: &str) {
        self.y -= 6.0;
        self.line("F2", 12.0, title);
        self.rule();
    }

    fn paid_stamp(&mut self, x: f32, y: f32) {
        self.ops.push(Operation::new("q", vec![]));
        self.ops
            .push(Operation::new("RG", vec![0.1f32.into(), 0.55f32.into(), 0.2f32.into()]));
        self.ops
            .push(Operation::new("rg", vec![0.1f32.into(), 0.55f32.into(), 0.2f32.into()]));
        self.ops.push(Operation::new("w", vec![2.5f32.into()]));
        self.ops.push(Operation::new(
            "re",
            vec![x.into(), y.into(), 110.into(), 40.into()],
        ));
        self.ops.push(Operation::new("S", vec![]));
        self.text_at(x + 18.0, y + 12.0, "F2", 22.0, "PAID");
        self.ops.push(Operation::new("Q", vec![]));
    }
}

fn layout(invoice: &InvoiceDocument<'_>) -> Vec<Operation> {
    let mut page = PageWriter::new();

    // Header
    page.line("F2", 18.0, &invoice.issuer.name);
    if !invoice.issuer.address.is_empty() {
        page.line("F1", 9.0, &invoice.issuer.address);
    }
    if !invoice.issuer.email.is_empty() {
        page.line("F1", 9.0, &invoice.issuer.email);
    }
    page.y -= 10.0;
    page.line("F2", 14.0, "FEE INVOICE");
    page.field("Invoice No.", invoice.number);
    page.field("Date", &invoice.date.format("%d %b %Y").to_string());

    page.section("Student");
    page.field("Name", invoice.student_name);
    if let Some(guardian) = invoice.guardian_name {
        page.field("Parent / Guardian", guardian);
    }
    if let Some(email) = invoice.email {
        page.field("Email", email);
    }
    if let Some(phone) = invoice.phone {
        page.field("Phone", phone);
    }
    page.field("Application ID", invoice.application_id);

    page.section("Course");
    page.field("Course", invoice.course_name.unwrap_or("-"));
    if let Some(batch) = invoice.batch {
        page.field("Batch", batch);
    }

    page.section("Payment");
    page.field("Payment ID", invoice.payment_id);
    page.field("Order ID", invoice.order_id.unwrap_or("-"));
    page.field("Method", invoice.method.unwrap_or("-"));
    page.field("Paid on", &invoice.date.format("%d %b %Y %H:%M UTC").to_string());

    page.section("Fee breakdown");
    if let Some(total) = invoice.total_course_fees {
        page.amount_row("Total course fees", &money(total), false);
    }
    if let Some(discount) = invoice.discount.filter(|d| *d > 0.0) {
        page.amount_row("Discount", &format!("- {}", money(discount)), false);
    }
    page.rule();
    page.amount_row("Amount paid", &money(invoice.amount_paid), true);

    let stamp_y = page.y - 60.0;
    page.paid_stamp(PAGE_WIDTH - MARGIN - 110.0, stamp_y);

    page.text_at(
        MARGIN,
        MARGIN,
        "F1",
        8.0,
        "This is a computer-generated invoice and does not require a signature.",
    );

    page.ops
}

/// Render the invoice to PDF bytes.
pub fn render_invoice(invoice: &InvoiceDocument<'_>) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
        },
    });

    let content = Content {
        operations: layout(invoice),
    };
    let encoded = content
        .encode()
        .map_err(|e| AppError::Internal(format!("Failed to encode invoice content: {}", e)))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| AppError::Internal(format!("Failed to write invoice PDF: {}", e)))?;
    Ok(bytes)
}
