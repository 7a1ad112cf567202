//! Leadpay - checkout and payment-webhook fulfillment service
//!
//! This library provides the server side of the sales funnel: lead capture,
//! provider-hosted checkout session creation (PayPal and Stripe), and the
//! idempotent PayPal webhook handler that captures payment, creates shipping
//! labels, and syncs leads to the CRM.

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod payments;
pub mod shipping;
pub mod sync;
