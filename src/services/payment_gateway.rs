//! Robokassa-style payment gateway signatures.
//!
//! Outbound URLs are signed with `password1` over
//! `MerchantLogin:OutSum:InvId:password1[:Shp_key=value...]`; result callbacks
//! are signed by the provider with `password2` over
//! `OutSum:InvId:password2[:Shp_key=value...]`. Shop parameters are appended in
//! lexicographic key order.

use crate::{config::PaymentConfig, errors::ServiceError};
use rust_decimal::{Decimal, RoundingStrategy};
use md5::Md5;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::collections::BTreeMap;
use strum::{Display, EnumString};
use url::Url;

pub const SHOP_PARAM_PREFIX: &str = "shp_";
pub const ORDER_ID_PARAM: &str = "Shp_OrderId";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum HashAlgorithm {
    /// Default digest of a freshly registered Robokassa shop
    Md5,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Lower-case hex digest of `input`.
    pub fn hex_digest(&self, input: &str) -> String {
        match self {
            Self::Md5 => hex::encode(Md5::digest(input.as_bytes())),
            Self::Sha256 => hex::encode(Sha256::digest(input.as_bytes())),
            Self::Sha384 => hex::encode(Sha384::digest(input.as_bytes())),
            Self::Sha512 => hex::encode(Sha512::digest(input.as_bytes())),
        }
    }
}

/// Custom `Shp_` parameters carried through the provider round-trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShopParams(BTreeMap<String, String>);

impl ShopParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shop_key(key: &str) -> bool {
        key.len() > SHOP_PARAM_PREFIX.len()
            && key
                .get(..SHOP_PARAM_PREFIX.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(SHOP_PARAM_PREFIX))
    }

    /// Adds a parameter; keys without the `Shp_` prefix are ignored.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if !Self::is_shop_key(&key) {
            return false;
        }
        self.0.insert(key, value.into());
        true
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Collects the shop parameters out of an arbitrary set of request fields.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut params = Self::new();
        for (key, value) in pairs {
            params.insert(key, value);
        }
        params
    }

    /// Case-insensitive lookup by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `:key=value` segments in sorted key order.
    fn signature_suffix(&self) -> String {
        self.0
            .iter()
            .map(|(key, value)| format!(":{key}={value}"))
            .collect()
    }
}

/// Formats an amount the way it is sent in `OutSum`: two decimals.
pub fn format_amount(amount: Decimal) -> String {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}

/// Parameters of one outbound payment.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub invoice_id: i64,
    pub description: String,
    pub email: Option<String>,
    pub shop_params: ShopParams,
}

#[derive(Debug, Clone)]
pub struct PaymentGateway {
    merchant_login: String,
    password1: String,
    password2: String,
    algorithm: HashAlgorithm,
    base_url: String,
    culture: String,
    test_mode: bool,
}

fn required(value: &Option<String>, name: &str) -> Result<String, ServiceError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ServiceError::ConfigurationError(format!("payment.{name} is not set")))
}

impl PaymentGateway {
    pub fn new(
        merchant_login: impl Into<String>,
        password1: impl Into<String>,
        password2: impl Into<String>,
        algorithm: HashAlgorithm,
    ) -> Self {
        let defaults = PaymentConfig::default();
        Self {
            merchant_login: merchant_login.into(),
            password1: password1.into(),
            password2: password2.into(),
            algorithm,
            base_url: defaults.base_url,
            culture: defaults.culture,
            test_mode: false,
        }
    }

    /// Builds the gateway from configuration, failing closed on missing secrets.
    pub fn from_config(config: &PaymentConfig) -> Result<Self, ServiceError> {
        let algorithm = config.hash_algorithm.parse::<HashAlgorithm>().map_err(|_| {
            ServiceError::ConfigurationError(format!(
                "unsupported payment hash algorithm {}",
                config.hash_algorithm
            ))
        })?;

        Ok(Self {
            merchant_login: required(&config.merchant_login, "merchant_login")?,
            password1: required(&config.password1, "password1")?,
            password2: required(&config.password2, "password2")?,
            algorithm,
            base_url: config.base_url.clone(),
            culture: config.culture.clone(),
            test_mode: config.test_mode,
        })
    }

    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    pub fn merchant_login(&self) -> &str {
        &self.merchant_login
    }

    /// Signature of an outbound payment (`password1`).
    pub fn payment_signature(&self, out_sum: &str, invoice_id: i64, shop: &ShopParams) -> String {
        let input = format!(
            "{}:{}:{}:{}{}",
            self.merchant_login,
            out_sum,
            invoice_id,
            self.password1,
            shop.signature_suffix()
        );
        self.algorithm.hex_digest(&input)
    }

    /// Signature the provider attaches to a result callback (`password2`).
    pub fn result_signature(&self, out_sum: &str, invoice_id: &str, shop: &ShopParams) -> String {
        let input = format!(
            "{}:{}:{}{}",
            out_sum,
            invoice_id,
            self.password2,
            shop.signature_suffix()
        );
        self.algorithm.hex_digest(&input)
    }

    pub fn build_payment_url(&self, request: &PaymentRequest) -> Result<String, ServiceError> {
        let out_sum = format_amount(request.amount);
        let signature = self.payment_signature(&out_sum, request.invoice_id, &request.shop_params);

        let mut url = Url::parse(&self.base_url).map_err(|e| {
            ServiceError::ConfigurationError(format!("invalid payment base url: {e}"))
        })?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("MerchantLogin", &self.merchant_login)
                .append_pair("OutSum", &out_sum)
                .append_pair("InvId", &request.invoice_id.to_string())
                .append_pair("Description", &request.description)
                .append_pair("SignatureValue", &signature)
                .append_pair("Culture", &self.culture);
            if let Some(email) = request.email.as_deref().filter(|e| !e.is_empty()) {
                query.append_pair("Email", email);
            }
            if self.test_mode {
                query.append_pair("IsTest", "1");
            }
            for (key, value) in request.shop_params.iter() {
                query.append_pair(key, value);
            }
        }
        Ok(url.into())
    }

    /// Checks a callback signature against the exact `OutSum`/`InvId` strings
    /// the provider sent.
    pub fn verify_callback(
        &self,
        out_sum: &str,
        invoice_id: &str,
        signature: &str,
        shop: &ShopParams,
    ) -> bool {
        let expected = self.result_signature(out_sum, invoice_id, shop);
        constant_time_eq(&expected, &signature.trim().to_ascii_lowercase())
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn gateway() -> PaymentGateway {
        PaymentGateway::new("sweet-delights", "pass-one", "pass-two", HashAlgorithm::Sha256)
    }

    fn query_of(url: &str) -> HashMap<String, String> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn amounts_are_normalized_to_two_decimals() {
        assert_eq!(format_amount(dec!(1500)), "1500.00");
        assert_eq!(format_amount(dec!(99.5)), "99.50");
        assert_eq!(format_amount(dec!(10.005)), "10.01");
    }

    #[test]
    fn payment_signature_matches_canonical_string() {
        let shop = ShopParams::new().with("Shp_OrderId", "order_1_abc");
        let expected = hex::encode(Sha256::digest(
            b"sweet-delights:1500.00:42:pass-one:Shp_OrderId=order_1_abc",
        ));
        assert_eq!(gateway().payment_signature("1500.00", 42, &shop), expected);
    }

    #[test]
    fn shop_params_are_signed_in_sorted_order() {
        let a = ShopParams::new().with("Shp_b", "2").with("Shp_a", "1");
        let b = ShopParams::new().with("Shp_a", "1").with("Shp_b", "2");
        assert_eq!(a.signature_suffix(), ":Shp_a=1:Shp_b=2");
        assert_eq!(
            gateway().result_signature("10.00", "7", &a),
            gateway().result_signature("10.00", "7", &b)
        );
    }

    #[test]
    fn md5_shops_are_supported() {
        assert_eq!("MD5".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Md5);
        assert_eq!(
            HashAlgorithm::Md5.hex_digest(""),
            "d41d8cd98f00b204e9800998ecf8427e"
        );

        let gw = PaymentGateway::new("sweet-delights", "pass-one", "pass-two", HashAlgorithm::Md5);
        let shop = ShopParams::new().with(ORDER_ID_PARAM, "order_1_abc");
        let signature = gw.result_signature("1500.00", "42", &shop);
        assert_eq!(signature.len(), 32);
        assert!(gw.verify_callback("1500.00", "42", &signature.to_uppercase(), &shop));
    }

    #[test]
    fn non_shop_fields_are_ignored() {
        let params = ShopParams::from_pairs([
            ("OutSum", "10.00"),
            ("shp_user", "anna"),
            ("Shp_", "empty-key"),
            ("SignatureValue", "abc"),
        ]);
        assert_eq!(params.iter().count(), 1);
        assert_eq!(params.get("Shp_User"), Some("anna"));
    }

    #[test]
    fn payment_url_carries_signed_fields() {
        let gw = gateway().with_test_mode(true);
        let url = gw
            .build_payment_url(&PaymentRequest {
                amount: dec!(1500),
                invoice_id: 42,
                description: "Order".into(),
                email: Some("anna@example.com".into()),
                shop_params: ShopParams::new().with(ORDER_ID_PARAM, "order_1_abc"),
            })
            .unwrap();

        let query = query_of(&url);
        assert!(url.starts_with("https://auth.robokassa.ru/Merchant/Index.aspx?"));
        assert_eq!(query["OutSum"], "1500.00");
        assert_eq!(query["InvId"], "42");
        assert_eq!(query["IsTest"], "1");
        assert_eq!(query["Email"], "anna@example.com");
        assert_eq!(query[ORDER_ID_PARAM], "order_1_abc");
        let shop = ShopParams::new().with(ORDER_ID_PARAM, "order_1_abc");
        assert_eq!(query["SignatureValue"], gw.payment_signature("1500.00", 42, &shop));
    }

    #[test]
    fn verification_is_case_insensitive_and_uses_password2() {
        let gw = gateway();
        let shop = ShopParams::new().with(ORDER_ID_PARAM, "order_1_abc");
        let signature = gw.result_signature("1500.00", "42", &shop);

        assert!(gw.verify_callback("1500.00", "42", &signature.to_uppercase(), &shop));
        // signed with password1 instead of password2
        let wrong = gw.payment_signature("1500.00", 42, &shop);
        assert!(!gw.verify_callback("1500.00", "42", &wrong, &shop));
        // provider sent a differently formatted amount
        assert!(!gw.verify_callback("1500", "42", &signature, &shop));
    }

    #[test]
    fn missing_secrets_fail_closed() {
        let config = PaymentConfig {
            merchant_login: Some("shop".into()),
            password1: Some("one".into()),
            password2: Some("   ".into()),
            ..Default::default()
        };
        let err = PaymentGateway::from_config(&config).unwrap_err();
        assert!(matches!(err, ServiceError::ConfigurationError(_)));
    }

    #[test]
    fn configured_algorithm_changes_digest_length() {
        let config = PaymentConfig {
            merchant_login: Some("shop".into()),
            password1: Some("one".into()),
            password2: Some("two".into()),
            hash_algorithm: "SHA512".into(),
            ..Default::default()
        };
        let gw = PaymentGateway::from_config(&config).unwrap();
        assert_eq!(gw.result_signature("1.00", "1", &ShopParams::new()).len(), 128);
    }

    fn mutate(input: &str, index: usize) -> String {
        let mut chars: Vec<char> = input.chars().collect();
        let i = index % chars.len();
        chars[i] = if chars[i] == '1' { '2' } else { '1' };
        chars.into_iter().collect()
    }

    proptest! {
        #[test]
        fn round_trip_accepts_only_exact_signature(
            cents in 1u64..10_000_000,
            invoice_id in 1i64..i64::from(i32::MAX),
            order_suffix in "[a-z0-9]{9}",
            index in 0usize..64,
        ) {
            let gw = gateway();
            let amount = Decimal::new(cents as i64, 2);
            let order_id = format!("order_1_{order_suffix}");
            let url = gw.build_payment_url(&PaymentRequest {
                amount,
                invoice_id,
                description: "Order".into(),
                email: None,
                shop_params: ShopParams::new().with(ORDER_ID_PARAM, order_id.clone()),
            }).unwrap();

            let query = query_of(&url);
            let out_sum = query["OutSum"].clone();
            let inv_id = query["InvId"].clone();
            let shop = ShopParams::from_pairs(query.clone());
            prop_assert_eq!(shop.get(ORDER_ID_PARAM), Some(order_id.as_str()));

            // what the provider sends back
            let signature = gw.result_signature(&out_sum, &inv_id, &shop);
            prop_assert!(gw.verify_callback(&out_sum, &inv_id, &signature, &shop));

            prop_assert!(!gw.verify_callback(&mutate(&out_sum, index), &inv_id, &signature, &shop));
            prop_assert!(!gw.verify_callback(&out_sum, &mutate(&inv_id, index), &signature, &shop));
            prop_assert!(!gw.verify_callback(&out_sum, &inv_id, &mutate(&signature, index), &shop));
        }
    }
}
