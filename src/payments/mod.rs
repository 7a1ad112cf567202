pub mod paypal;
pub mod stripe;

pub use paypal::PayPalClient;
pub use stripe::StripeClient;
