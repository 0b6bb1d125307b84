//! E-mail and chat message rendering. Pure formatting, no I/O.

use crate::models::{Order, Product};
use rust_decimal::Decimal;
use strum::{AsRefStr, Display};

/// Template identifiers as used by the e-mail provider integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum TemplateKind {
    OrderConfirmation,
    StockNotification,
    Newsletter,
    Welcome,
    EmailVerification,
}

/// Data-carrying template ready to render.
#[derive(Debug, Clone)]
pub enum EmailTemplate {
    OrderConfirmation { order: Order, for_owner: bool },
    StockNotification { product: Product },
    Newsletter { email: String },
    Welcome { name: Option<String> },
    EmailVerification { code: String, ttl_minutes: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// `1500.00` renders as `1500 ₽`, `99.5` as `99.50 ₽`.
pub fn format_price(amount: Decimal) -> String {
    let normalized = amount.normalize();
    if normalized.scale() == 0 {
        format!("{normalized} ₽")
    } else {
        let mut rounded = amount.round_dp(2);
        rounded.rescale(2);
        format!("{rounded} ₽")
    }
}

fn order_lines(order: &Order) -> Vec<String> {
    order
        .items
        .iter()
        .map(|item| {
            let name = item.name.as_deref().unwrap_or(&item.product_id);
            format!(
                "{} × {} = {}",
                name,
                item.quantity,
                format_price(item.line_total())
            )
        })
        .collect()
}

fn wrap_html(title: &str, body: &str, site_url: &str) -> String {
    format!(
        "<!DOCTYPE html><html><body style=\"font-family:Arial,sans-serif;color:#4a3728\">\
         <h2>{}</h2>{}<hr><p><a href=\"{}\">Sweet Delights</a></p></body></html>",
        escape_html(title),
        body,
        escape_html(site_url)
    )
}

impl EmailTemplate {
    pub fn kind(&self) -> TemplateKind {
        match self {
            Self::OrderConfirmation { .. } => TemplateKind::OrderConfirmation,
            Self::StockNotification { .. } => TemplateKind::StockNotification,
            Self::Newsletter { .. } => TemplateKind::Newsletter,
            Self::Welcome { .. } => TemplateKind::Welcome,
            Self::EmailVerification { .. } => TemplateKind::EmailVerification,
        }
    }

    pub fn render(&self, site_url: &str) -> RenderedEmail {
        match self {
            Self::OrderConfirmation { order, for_owner } => {
                let subject = if *for_owner {
                    format!("New paid order {}", order.id)
                } else {
                    format!("Your order {} is confirmed", order.id)
                };
                let lines = order_lines(order);
                let mut text = format!("Order {}\n", order.id);
                for line in &lines {
                    text.push_str(line);
                    text.push('\n');
                }
                if let Some(discount) = order.discount.filter(|d| !d.is_zero()) {
                    text.push_str(&format!("Discount: {}\n", format_price(discount)));
                }
                text.push_str(&format!("Total: {}\n", format_price(order.total)));

                let address = order.shipping_address.one_line();
                if !address.is_empty() {
                    text.push_str(&format!("Delivery: {address}\n"));
                }
                if *for_owner {
                    if let Some(name) = order.shipping_address.name.as_deref() {
                        text.push_str(&format!("Customer: {name}\n"));
                    }
                    if let Some(phone) = order.shipping_address.phone.as_deref() {
                        text.push_str(&format!("Phone: {phone}\n"));
                    }
                }

                let items_html: String = lines
                    .iter()
                    .map(|line| format!("<li>{}</li>", escape_html(line)))
                    .collect();
                let body = format!(
                    "<p>Order <b>{}</b></p><ul>{}</ul><p>Total: <b>{}</b></p>",
                    escape_html(&order.id),
                    items_html,
                    escape_html(&format_price(order.total))
                );
                RenderedEmail {
                    html: wrap_html(&subject, &body, site_url),
                    subject,
                    text,
                }
            }
            Self::StockNotification { product } => {
                let subject = format!("{} is back in stock", product.name);
                let link = format!("{}/product/{}", site_url.trim_end_matches('/'), product.id);
                let text = format!(
                    "Good news! {} is available again for {}.\n{}\n",
                    product.name,
                    format_price(product.effective_price()),
                    link
                );
                let body = format!(
                    "<p>Good news! <b>{}</b> is available again for {}.</p><p><a href=\"{}\">Order now</a></p>",
                    escape_html(&product.name),
                    escape_html(&format_price(product.effective_price())),
                    escape_html(&link)
                );
                RenderedEmail {
                    html: wrap_html(&subject, &body, site_url),
                    subject,
                    text,
                }
            }
            Self::Newsletter { email } => {
                let subject = "Welcome to the Sweet Delights newsletter".to_string();
                let text = format!(
                    "You are subscribed as {email}. Expect new cakes, seasonal offers and promo codes.\n"
                );
                let body = format!(
                    "<p>You are subscribed as <b>{}</b>.</p><p>Expect new cakes, seasonal offers and promo codes.</p>",
                    escape_html(email)
                );
                RenderedEmail {
                    html: wrap_html(&subject, &body, site_url),
                    subject,
                    text,
                }
            }
            Self::Welcome { name } => {
                let greeting = match name.as_deref().map(str::trim) {
                    Some(name) if !name.is_empty() => format!("Hello, {name}!"),
                    _ => "Hello!".to_string(),
                };
                let subject = "Welcome to Sweet Delights".to_string();
                let text = format!(
                    "{greeting}\nYour account is ready. Every 1000 ₽ spent earns a spin of the loyalty wheel.\n"
                );
                let body = format!(
                    "<p>{}</p><p>Your account is ready. Every 1000 ₽ spent earns a spin of the loyalty wheel.</p>",
                    escape_html(&greeting)
                );
                RenderedEmail {
                    html: wrap_html(&subject, &body, site_url),
                    subject,
                    text,
                }
            }
            Self::EmailVerification { code, ttl_minutes } => {
                let subject = format!("Your verification code: {code}");
                let text = format!(
                    "Your Sweet Delights verification code is {code}. It expires in {ttl_minutes} minutes.\n"
                );
                let body = format!(
                    "<p>Your verification code:</p><p style=\"font-size:28px;letter-spacing:6px\"><b>{}</b></p><p>It expires in {} minutes.</p>",
                    escape_html(code),
                    ttl_minutes
                );
                RenderedEmail {
                    html: wrap_html(&subject, &body, site_url),
                    subject,
                    text,
                }
            }
        }
    }
}

/// Telegram message (HTML parse mode) announcing a paid order.
pub fn order_paid_chat_message(order: &Order, for_owner: bool) -> String {
    let mut text = if for_owner {
        format!("🎂 <b>New paid order</b> {}\n", escape_html(&order.id))
    } else {
        format!("✅ Your order <b>{}</b> is paid\n", escape_html(&order.id))
    };
    for line in order_lines(order) {
        text.push_str(&escape_html(&line));
        text.push('\n');
    }
    text.push_str(&format!(
        "Total: <b>{}</b>",
        escape_html(&format_price(order.total))
    ));
    if for_owner {
        let address = order.shipping_address.one_line();
        if !address.is_empty() {
            text.push_str(&format!("\nDelivery: {}", escape_html(&address)));
        }
        if let Some(phone) = order.shipping_address.phone.as_deref() {
            text.push_str(&format!("\nPhone: {}", escape_html(phone)));
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderItem, OrderStatus, PaymentStatus, ShippingAddress};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use serde_json::Map;

    fn order() -> Order {
        Order {
            id: "order_1_abc".into(),
            user_id: "anna@example.com".into(),
            items: vec![OrderItem {
                product_id: "napoleon".into(),
                name: Some("Napoleon <classic>".into()),
                quantity: 2,
                price: dec!(450),
            }],
            subtotal: None,
            discount: None,
            total: dec!(900),
            promo_code: None,
            shipping_address: ShippingAddress {
                city: Some("Kazan".into()),
                phone: Some("+79001234567".into()),
                ..Default::default()
            },
            delivery_service: None,
            delivery_info: None,
            tracking: None,
            status: OrderStatus::Processing,
            payment_status: PaymentStatus::Paid,
            invoice_id: Some(42),
            payment_signature: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            paid_at: Some(Utc::now()),
            extra: Map::new(),
        }
    }

    #[test]
    fn template_names_match_provider_keys() {
        assert_eq!(TemplateKind::OrderConfirmation.as_ref(), "order_confirmation");
        assert_eq!(TemplateKind::StockNotification.to_string(), "stock_notification");
        assert_eq!(
            EmailTemplate::Welcome { name: None }.kind(),
            TemplateKind::Welcome
        );
    }

    #[test]
    fn prices_drop_zero_fraction() {
        assert_eq!(format_price(dec!(1500.00)), "1500 ₽");
        assert_eq!(format_price(dec!(99.5)), "99.50 ₽");
    }

    #[test]
    fn order_confirmation_escapes_item_names() {
        let email = EmailTemplate::OrderConfirmation {
            order: order(),
            for_owner: false,
        }
        .render("https://sweetdelights.shop");
        assert!(email.subject.contains("order_1_abc"));
        assert!(email.html.contains("Napoleon &lt;classic&gt;"));
        assert!(email.text.contains("Total: 900 ₽"));
        assert!(!email.text.contains("Phone"));
    }

    #[test]
    fn owner_chat_message_includes_contact() {
        let text = order_paid_chat_message(&order(), true);
        assert!(text.contains("New paid order"));
        assert!(text.contains("+79001234567"));
        assert!(!order_paid_chat_message(&order(), false).contains("Phone"));
    }

    #[test]
    fn verification_code_is_in_subject() {
        let email = EmailTemplate::EmailVerification {
            code: "123456".into(),
            ttl_minutes: 15,
        }
        .render("https://sweetdelights.shop");
        assert_eq!(email.subject, "Your verification code: 123456");
        assert!(email.text.contains("15 minutes"));
    }
}
