//! Transactional email: order confirmations, shipping notices, refunds and
//! newsletter welcomes.
//!
//! Uses SMTP via lettre for delivery with Askama HTML and plain text
//! templates. Without SMTP configuration the service logs and skips sends.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use thiserror::Error;

use atelier_core::{CurrencyCode, Price};
use atelier_db::models::{Order, OrderItem, Refund};

use crate::config::EmailConfig;

struct EmailLine {
    name: String,
    sku_code: String,
    quantity: i32,
    total: String,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    order_number: &'a str,
    customer_name: &'a str,
    lines: &'a [EmailLine],
    subtotal: &'a str,
    discount: Option<&'a str>,
    tax: &'a str,
    total: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    order_number: &'a str,
    customer_name: &'a str,
    lines: &'a [EmailLine],
    subtotal: &'a str,
    discount: Option<&'a str>,
    tax: &'a str,
    total: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_shipped.html")]
struct OrderShippedHtml<'a> {
    order_number: &'a str,
    customer_name: &'a str,
    tracking_number: Option<&'a str>,
}

#[derive(Template)]
#[template(path = "email/order_shipped.txt")]
struct OrderShippedText<'a> {
    order_number: &'a str,
    customer_name: &'a str,
    tracking_number: Option<&'a str>,
}

#[derive(Template)]
#[template(path = "email/refund_processed.html")]
struct RefundProcessedHtml<'a> {
    order_number: &'a str,
    customer_name: &'a str,
    amount: &'a str,
}

#[derive(Template)]
#[template(path = "email/refund_processed.txt")]
struct RefundProcessedText<'a> {
    order_number: &'a str,
    customer_name: &'a str,
    amount: &'a str,
}

#[derive(Template)]
#[template(path = "email/newsletter_welcome.html")]
struct NewsletterWelcomeHtml<'a> {
    unsubscribe_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/newsletter_welcome.txt")]
struct NewsletterWelcomeText<'a> {
    unsubscribe_url: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// A rendered email body pair.
struct Rendered {
    subject: String,
    text: String,
    html: String,
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from_address: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer: Some(mailer),
            from_address: config.from_address.clone(),
        })
    }

    /// A service that logs instead of sending.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            mailer: None,
            from_address: String::new(),
        }
    }

    /// Build from optional configuration, disabling email when it is absent.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn from_config(config: Option<&EmailConfig>) -> Result<Self, SmtpError> {
        config.map_or_else(|| Ok(Self::disabled()), Self::new)
    }

    /// Whether messages are actually delivered.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.mailer.is_some()
    }

    /// Send the order confirmation after payment.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_order_confirmation(
        &self,
        order: &Order,
        items: &[OrderItem],
    ) -> Result<(), EmailError> {
        let rendered = render_order_confirmation(order, items)?;
        self.send_rendered(order.email.as_str(), rendered).await
    }

    /// Tell the customer their order has shipped.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_order_shipped(&self, order: &Order) -> Result<(), EmailError> {
        let rendered = render_order_shipped(order)?;
        self.send_rendered(order.email.as_str(), rendered).await
    }

    /// Confirm an approved refund.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_refund_processed(
        &self,
        order: &Order,
        refund: &Refund,
    ) -> Result<(), EmailError> {
        let rendered = render_refund_processed(order, refund)?;
        self.send_rendered(order.email.as_str(), rendered).await
    }

    /// Welcome a new newsletter subscriber.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_newsletter_welcome(
        &self,
        to: &str,
        unsubscribe_url: &str,
    ) -> Result<(), EmailError> {
        let rendered = Rendered {
            subject: "Welcome to the Atelier newsletter".to_string(),
            text: NewsletterWelcomeText { unsubscribe_url }.render()?,
            html: NewsletterWelcomeHtml { unsubscribe_url }.render()?,
        };
        self.send_rendered(to, rendered).await
    }

    async fn send_rendered(&self, to: &str, rendered: Rendered) -> Result<(), EmailError> {
        self.send_multipart_email(to, &rendered.subject, &rendered.text, &rendered.html)
            .await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let Some(mailer) = &self.mailer else {
            tracing::info!(to = %to, subject = %subject, "Email disabled, skipping send");
            return Ok(());
        };

        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

fn money(amount: Decimal, currency: &str) -> String {
    let currency = currency.parse().unwrap_or(CurrencyCode::GBP);
    Price::new(amount, currency).display()
}

fn render_order_confirmation(order: &Order, items: &[OrderItem]) -> Result<Rendered, EmailError> {
    let lines: Vec<EmailLine> = items
        .iter()
        .map(|item| EmailLine {
            name: item.product_name.clone(),
            sku_code: item.sku_code.clone(),
            quantity: item.quantity,
            total: money(item.line_total, &order.currency),
        })
        .collect();
    let subtotal = money(order.subtotal, &order.currency);
    let discount = (order.discount_total > Decimal::ZERO)
        .then(|| money(order.discount_total, &order.currency));
    let tax = money(order.tax_total, &order.currency);
    let total = money(order.total, &order.currency);

    Ok(Rendered {
        subject: format!("Order {} confirmed", order.order_number),
        text: OrderConfirmationText {
            order_number: &order.order_number,
            customer_name: &order.shipping_name,
            lines: &lines,
            subtotal: &subtotal,
            discount: discount.as_deref(),
            tax: &tax,
            total: &total,
        }
        .render()?,
        html: OrderConfirmationHtml {
            order_number: &order.order_number,
            customer_name: &order.shipping_name,
            lines: &lines,
            subtotal: &subtotal,
            discount: discount.as_deref(),
            tax: &tax,
            total: &total,
        }
        .render()?,
    })
}

fn render_order_shipped(order: &Order) -> Result<Rendered, EmailError> {
    let tracking_number = order.tracking_number.as_deref();
    Ok(Rendered {
        subject: format!("Order {} is on its way", order.order_number),
        text: OrderShippedText {
            order_number: &order.order_number,
            customer_name: &order.shipping_name,
            tracking_number,
        }
        .render()?,
        html: OrderShippedHtml {
            order_number: &order.order_number,
            customer_name: &order.shipping_name,
            tracking_number,
        }
        .render()?,
    })
}

fn render_refund_processed(order: &Order, refund: &Refund) -> Result<Rendered, EmailError> {
    let amount = money(refund.amount, &order.currency);
    Ok(Rendered {
        subject: format!("Refund for order {}", order.order_number),
        text: RefundProcessedText {
            order_number: &order.order_number,
            customer_name: &order.shipping_name,
            amount: &amount,
        }
        .render()?,
        html: RefundProcessedHtml {
            order_number: &order.order_number,
            customer_name: &order.shipping_name,
            amount: &amount,
        }
        .render()?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use chrono::Utc;

    use atelier_core::{Email, OrderId, OrderItemId, OrderStatus, PaymentStatus};

    use super::*;

    pub(crate) fn sample_order() -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(1),
            order_number: "ORD-20260301-K2P9QZ".to_string(),
            user_id: None,
            cart_id: None,
            email: Email::parse("ada@example.com").unwrap(),
            status: OrderStatus::Paid,
            payment_status: PaymentStatus::Paid,
            subtotal: Decimal::new(6_000, 2),
            discount_total: Decimal::new(1_000, 2),
            tax_total: Decimal::new(833, 2),
            total: Decimal::new(5_000, 2),
            refunded_total: Decimal::ZERO,
            currency: "GBP".to_string(),
            discount_code: Some("SPRING10".to_string()),
            checkout_session_id: Some("cs_test_1".to_string()),
            payment_intent_id: Some("pi_1".to_string()),
            disputed: false,
            shipping_name: "Ada <Lovelace>".to_string(),
            shipping_line1: "1 Analytical Row".to_string(),
            shipping_line2: None,
            shipping_city: "London".to_string(),
            shipping_postal_code: "N1 1AA".to_string(),
            shipping_country: "GB".to_string(),
            tracking_number: Some("TRK123".to_string()),
            restocked_at: None,
            created_at: now,
            updated_at: now,
            paid_at: Some(now),
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
        }
    }

    fn sample_items() -> Vec<OrderItem> {
        vec![OrderItem {
            id: OrderItemId::new(1),
            order_id: OrderId::new(1),
            sku_id: None,
            product_name: "Linen Shirt".to_string(),
            sku_code: "SKU-1-ABCDEFG".to_string(),
            quantity: 2,
            unit_price: Decimal::new(2_500, 2),
            line_total: Decimal::new(5_000, 2),
        }]
    }

    #[test]
    fn test_order_confirmation_renders_totals() {
        let rendered = render_order_confirmation(&sample_order(), &sample_items()).unwrap();

        assert_eq!(rendered.subject, "Order ORD-20260301-K2P9QZ confirmed");
        assert!(rendered.text.contains("Linen Shirt"));
        assert!(rendered.text.contains("£50.00"));
        assert!(rendered.text.contains("-£10.00"));
        assert!(rendered.html.contains("£8.33"));
    }

    #[test]
    fn test_html_escapes_customer_input() {
        let rendered = render_order_confirmation(&sample_order(), &sample_items()).unwrap();
        assert!(rendered.html.contains("Ada &#60;Lovelace&#62;") || rendered.html.contains("Ada &lt;Lovelace&gt;"));
        assert!(!rendered.html.contains("<Lovelace>"));
    }

    #[test]
    fn test_shipped_includes_tracking() {
        let rendered = render_order_shipped(&sample_order()).unwrap();
        assert!(rendered.text.contains("TRK123"));

        let mut order = sample_order();
        order.tracking_number = None;
        let rendered = render_order_shipped(&order).unwrap();
        assert!(!rendered.text.contains("Tracking"));
    }

    #[tokio::test]
    async fn test_disabled_service_skips_send() {
        let service = EmailService::disabled();
        assert!(!service.is_enabled());
        service
            .send_newsletter_welcome("ada@example.com", "https://shop.test/unsubscribe")
            .await
            .unwrap();
    }
}
