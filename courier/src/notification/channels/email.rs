//! SMTP email transport.
//!
//! Builds one HTML message per recipient and hands it to a `lettre` async
//! SMTP transport configured from the sender's credentials. CTAs are
//! appended to the body as links.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::debug;

use super::{ChannelTransport, Delivery};
use crate::database::models::{ChannelType, SenderCredentials};
use crate::notification::template::RenderedCta;
use crate::{Error, Result};

/// SMTP transport. A connection is opened per send with the sender's server.
pub struct EmailTransport {
    timeout: Duration,
}

impl EmailTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn mailer(&self, creds: &SmtpSettings<'_>) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let builder = if creds.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(creds.host)
                .map_err(|e| email_error(format!("invalid SMTP relay {}: {e}", creds.host)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(creds.host)
        };

        let mut builder = builder.port(creds.port).timeout(Some(self.timeout));
        if !creds.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                creds.username.to_string(),
                creds.password.to_string(),
            ));
        }
        Ok(builder.build())
    }
}

/// Borrowed view of SMTP credentials.
struct SmtpSettings<'a> {
    host: &'a str,
    port: u16,
    username: &'a str,
    password: &'a str,
    from_email: &'a str,
    from_name: Option<&'a str>,
    use_tls: bool,
}

impl<'a> SmtpSettings<'a> {
    fn from_credentials(credentials: &'a SenderCredentials) -> Option<Self> {
        match credentials {
            SenderCredentials::Smtp {
                smtp_host,
                smtp_port,
                smtp_username,
                smtp_password,
                from_email,
                from_name,
                use_tls,
            } => Some(Self {
                host: smtp_host,
                port: *smtp_port,
                username: smtp_username,
                password: smtp_password,
                from_email,
                from_name: from_name.as_deref(),
                use_tls: *use_tls,
            }),
            SenderCredentials::TelegramBot { .. } => None,
        }
    }
}

#[async_trait]
impl ChannelTransport for EmailTransport {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Email
    }

    async fn send(&self, delivery: Delivery<'_>) -> Result<()> {
        let settings = delivery
            .sender
            .and_then(|s| SmtpSettings::from_credentials(&s.credentials.0))
            .ok_or_else(|| email_error("delivery requires an SMTP sender"))?;

        let message = build_message(
            &settings,
            delivery.recipient,
            &delivery.rendered.subject,
            &html_body(&delivery.rendered.content, &delivery.rendered.ctas),
        )?;

        self.mailer(&settings)?
            .send(message)
            .await
            .map_err(|e| email_error(format!("SMTP send failed: {e}")))?;

        debug!(history_id = delivery.history_id, "Email sent");
        Ok(())
    }
}

fn build_message(
    settings: &SmtpSettings<'_>,
    recipient: &str,
    subject: &str,
    body: &str,
) -> Result<Message> {
    let from_address: Address = settings
        .from_email
        .parse()
        .map_err(|e| email_error(format!("invalid from address {}: {e}", settings.from_email)))?;
    let from = Mailbox::new(settings.from_name.map(str::to_string), from_address);
    let to: Mailbox = recipient
        .parse()
        .map_err(|e| email_error(format!("invalid recipient {recipient}: {e}")))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .header(ContentType::TEXT_HTML)
        .body(body.to_string())
        .map_err(|e| email_error(format!("failed to build message: {e}")))
}

/// Message content followed by one link per CTA.
fn html_body(content: &str, ctas: &[RenderedCta]) -> String {
    if ctas.is_empty() {
        return content.to_string();
    }

    let mut body = String::from(content);
    body.push_str("\n<p>");
    for cta in ctas {
        body.push_str(&format!(
            "<a href=\"{}\" class=\"cta cta-{}\">{}</a> ",
            escape_html(&cta.action),
            escape_html(&cta.style),
            escape_html(&cta.label),
        ));
    }
    body.truncate(body.trim_end().len());
    body.push_str("</p>");
    body
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

fn email_error(message: impl Into<String>) -> Error {
    Error::transport("email", message)
}
