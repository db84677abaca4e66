//! enrollpay - final-fee payment reconciliation for the enrollment site
//!
//! Creates gateway orders from signed payment links, verifies checkout and
//! webhook signatures, applies payment events idempotently to each
//! application's `final_fee_payment` record, and issues invoices.

pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod invoice;
pub mod jwt;
pub mod ledger;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod util;
