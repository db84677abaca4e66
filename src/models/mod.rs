mod application;
mod fee_payment;

pub use application::*;
pub use fee_payment::*;
