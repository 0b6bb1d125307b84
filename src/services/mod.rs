//! Business services. Each service owns a [`Store`](crate::store::Store)
//! handle and is cheap to clone into handlers.

// Order lifecycle
pub mod orders;
pub mod payment_gateway;
pub mod payments;

// Pricing
pub mod promotions;
pub mod wheel;

// Customers
pub mod subscriptions;
pub mod users;
pub mod wishlist;

use rand::{distributions::Uniform, Rng};

const LOWER_ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const UPPER_ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn random_from(charset: &[u8], len: usize) -> String {
    let mut rng = rand::thread_rng();
    let dist = Uniform::from(0..charset.len());
    (0..len)
        .map(|_| char::from(charset[rng.sample(dist)]))
        .collect()
}

/// Random lower-case alphanumeric suffix used in generated ids.
pub(crate) fn random_suffix(len: usize) -> String {
    random_from(LOWER_ALPHANUMERIC, len)
}

/// Random upper-case alphanumeric string used in generated promo codes.
pub(crate) fn random_code(len: usize) -> String {
    random_from(UPPER_ALPHANUMERIC, len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_strings_use_expected_alphabets() {
        let suffix = random_suffix(9);
        assert_eq!(suffix.len(), 9);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));

        let code = random_code(6);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}
