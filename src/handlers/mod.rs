pub mod checkout;
pub mod leads;
pub mod webhooks;
