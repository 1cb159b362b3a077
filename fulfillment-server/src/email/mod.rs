//! Transactional mail
//!
//! Template rendering is owned elsewhere; these are plain-text fallbacks.

use async_trait::async_trait;
use aws_sdk_sesv2::Client as SesClient;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use shared::order::Order;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_order_confirmation(&self, to: &str, order: &Order) -> Result<(), BoxError>;

    async fn send_recovery_reminder(&self, to: &str, resume_url: &str) -> Result<(), BoxError>;
}

fn format_amount(minor: i64, currency: &str) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let minor = minor.abs();
    format!(
        "{sign}{}.{:02} {}",
        minor / 100,
        minor % 100,
        currency.to_uppercase()
    )
}

pub(crate) fn order_confirmation_text(order: &Order) -> String {
    let mut body = format!("Thank you for your order.\n\nOrder reference: {}\n\n", order.id);
    for item in &order.items {
        body.push_str(&format!(
            "{} x {}  {}\n",
            item.quantity,
            item.name,
            format_amount(item.total_amount, &order.currency)
        ));
    }
    let a = &order.amounts;
    body.push_str(&format!(
        "\nSubtotal: {}\nShipping: {}\n",
        format_amount(a.subtotal, &order.currency),
        format_amount(a.shipping, &order.currency)
    ));
    if a.discount > 0 {
        body.push_str(&format!(
            "Discount: {}\n",
            format_amount(-a.discount, &order.currency)
        ));
    }
    if a.tax > 0 {
        body.push_str(&format!("Tax: {}\n", format_amount(a.tax, &order.currency)));
    }
    body.push_str(&format!("Total: {}\n", format_amount(a.total, &order.currency)));
    body
}

pub(crate) fn recovery_reminder_text(resume_url: &str) -> String {
    format!(
        "You left some items in your cart.\n\
         They may sell out soon, pick up where you left off:\n\n\
         {resume_url}\n"
    )
}

/// Mailer backed by AWS SES
#[derive(Clone)]
pub struct SesMailer {
    ses: SesClient,
    from: String,
}

impl SesMailer {
    pub fn new(ses: SesClient, from: impl Into<String>) -> Self {
        Self {
            ses,
            from: from.into(),
        }
    }

    async fn send(&self, to: &str, subject: &str, body_text: String) -> Result<(), BoxError> {
        let subject = Content::builder().data(subject).build()?;
        let body = Body::builder()
            .text(Content::builder().data(body_text).build()?)
            .build();
        let message = Message::builder().subject(subject).body(body).build();

        self.ses
            .send_email()
            .from_email_address(&self.from)
            .destination(Destination::builder().to_addresses(to).build())
            .content(EmailContent::builder().simple(message).build())
            .send()
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Mailer for SesMailer {
    async fn send_order_confirmation(&self, to: &str, order: &Order) -> Result<(), BoxError> {
        self.send(to, "Order confirmation", order_confirmation_text(order))
            .await?;
        tracing::info!(to = to, order_id = %order.id, "Order confirmation sent");
        Ok(())
    }

    async fn send_recovery_reminder(&self, to: &str, resume_url: &str) -> Result<(), BoxError> {
        self.send(to, "Your cart is waiting", recovery_reminder_text(resume_url))
            .await?;
        tracing::info!(to = to, "Checkout recovery reminder sent");
        Ok(())
    }
}
