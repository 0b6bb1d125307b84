//! Documents persisted in the store.
//!
//! Field names are camelCase on the wire and in storage. Records that are
//! read-modified-written (products, users, orders) keep unknown fields in an
//! `extra` map so a partial model never strips data written by other tools.

pub mod order;
pub mod product;
pub mod promo_code;
pub mod subscription;
pub mod user;
pub mod verification;
pub mod wheel_prize;

pub use order::{DeliveryTracking, Order, OrderItem, OrderStatus, PaymentStatus, ShippingAddress};
pub use product::Product;
pub use promo_code::{DiscountType, PromoCode};
pub use subscription::{Subscription, SubscriptionKind};
pub use user::{Role, User};
pub use verification::VerificationCode;
pub use wheel_prize::WheelPrize;

/// Canonical form of a promo code: trimmed and upper-cased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Canonical form of an e-mail used as a user key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_emails_are_normalized() {
        assert_eq!(normalize_code("  save10 "), "SAVE10");
        assert_eq!(normalize_email(" Anna@Example.COM"), "anna@example.com");
    }
}
