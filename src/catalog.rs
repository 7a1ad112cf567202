//! Fixed product catalog.
//!
//! Prices can be overridden per product with an environment variable so
//! price tests don't require a deploy. Overrides must parse as a positive
//! integer count of cents or they are ignored.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutMode {
    Payment,
    Subscription,
}

#[derive(Debug, Clone)]
pub struct Product {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub amount_cents: i64,
    pub currency: &'static str,
    pub mode: CheckoutMode,
    /// Billing interval for subscriptions ("month" or "year").
    pub recurring_interval: Option<&'static str>,
    pub requires_shipping: bool,
    /// Destinations we can ship to. Empty for digital products.
    pub allowed_countries: &'static [&'static str],
    /// Env var that overrides `amount_cents`.
    pub amount_env_key: &'static str,
    pub success_path: &'static str,
    pub cancel_path: &'static str,
}

pub const PRODUCTS: &[Product] = &[
    Product {
        key: "usb128",
        name: "USB 128GB",
        description: "128GB USB drive preloaded with the full library",
        amount_cents: 14700,
        currency: "USD",
        mode: CheckoutMode::Payment,
        recurring_interval: None,
        requires_shipping: true,
        allowed_countries: &["US"],
        amount_env_key: "LEADPAY_USB128_AMOUNT_CENTS",
        success_path: "/gracias-usb",
        cancel_path: "/usb",
    },
    Product {
        key: "usb_500gb",
        name: "USB 500GB",
        description: "500GB USB drive preloaded with the full library",
        amount_cents: 19700,
        currency: "USD",
        mode: CheckoutMode::Payment,
        recurring_interval: None,
        requires_shipping: true,
        allowed_countries: &["US"],
        amount_env_key: "LEADPAY_USB_500GB_AMOUNT_CENTS",
        success_path: "/gracias-usb",
        cancel_path: "/usb",
    },
    Product {
        key: "anual",
        name: "Acceso Anual",
        description: "One year of full digital access",
        amount_cents: 19700,
        currency: "USD",
        mode: CheckoutMode::Payment,
        recurring_interval: None,
        requires_shipping: false,
        allowed_countries: &[],
        amount_env_key: "LEADPAY_ANUAL_AMOUNT_CENTS",
        success_path: "/gracias",
        cancel_path: "/planes",
    },
    Product {
        key: "plan_1tb_mensual",
        name: "Plan 1TB Mensual",
        description: "1TB cloud plan billed monthly",
        amount_cents: 1950,
        currency: "USD",
        mode: CheckoutMode::Subscription,
        recurring_interval: Some("month"),
        requires_shipping: false,
        allowed_countries: &[],
        amount_env_key: "LEADPAY_PLAN_1TB_MENSUAL_AMOUNT_CENTS",
        success_path: "/gracias",
        cancel_path: "/planes",
    },
    Product {
        key: "plan_2tb_anual",
        name: "Plan 2TB Anual",
        description: "2TB cloud plan billed yearly",
        amount_cents: 19500,
        currency: "USD",
        mode: CheckoutMode::Subscription,
        recurring_interval: Some("year"),
        requires_shipping: false,
        allowed_countries: &[],
        amount_env_key: "LEADPAY_PLAN_2TB_ANUAL_AMOUNT_CENTS",
        success_path: "/gracias",
        cancel_path: "/planes",
    },
];

pub fn get_product(key: &str) -> Option<&'static Product> {
    PRODUCTS.iter().find(|p| p.key == key)
}

/// Resolve the price for a product: env override if valid, default otherwise.
pub fn resolve_amount_cents(override_value: Option<&str>, default_cents: i64) -> i64 {
    match override_value.and_then(|v| v.trim().parse::<i64>().ok()) {
        Some(cents) if cents > 0 => cents,
        _ => default_cents,
    }
}

/// Effective price of a product in cents, honoring the env override.
pub fn product_amount_cents(product: &Product) -> i64 {
    let override_value = std::env::var(product.amount_env_key).ok();
    resolve_amount_cents(override_value.as_deref(), product.amount_cents)
}

/// Format cents as a decimal amount string ("147.00") for provider APIs.
pub fn format_amount(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_product() {
        assert_eq!(get_product("usb128").map(|p| p.amount_cents), Some(14700));
        assert!(get_product("usb128").is_some_and(|p| p.requires_shipping));
        assert!(get_product("nope").is_none());
    }

    #[test]
    fn test_resolve_amount_cents_valid_override() {
        assert_eq!(resolve_amount_cents(Some("9900"), 14700), 9900);
        assert_eq!(resolve_amount_cents(Some(" 500 "), 14700), 500);
    }

    #[test]
    fn test_resolve_amount_cents_rejects_garbage() {
        assert_eq!(resolve_amount_cents(Some("free"), 14700), 14700);
        assert_eq!(resolve_amount_cents(Some("0"), 14700), 14700);
        assert_eq!(resolve_amount_cents(Some("-100"), 14700), 14700);
        assert_eq!(resolve_amount_cents(None, 14700), 14700);
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(14700), "147.00");
        assert_eq!(format_amount(1950), "19.50");
        assert_eq!(format_amount(5), "0.05");
    }

    #[test]
    fn test_subscriptions_carry_interval() {
        for product in PRODUCTS {
            match product.mode {
                CheckoutMode::Subscription => assert!(product.recurring_interval.is_some()),
                CheckoutMode::Payment => assert!(product.recurring_interval.is_none()),
            }
            if product.requires_shipping {
                assert!(!product.allowed_countries.is_empty());
            }
        }
    }
}
