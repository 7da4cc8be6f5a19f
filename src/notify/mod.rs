//! Outbound notifications for recorded visits

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;
use tracing::info;

use crate::analytics::VisitRecord;
use crate::config::NotifyConfig;

const SMTP_TIMEOUT: Duration = Duration::from_secs(5);
const SUBJECT: &str = "Visit Notification";

#[async_trait]
pub trait VisitNotifier: Send + Sync {
    async fn notify_visit(&self, visit: &VisitRecord) -> Result<()>;
}

/// Plain-text body describing a visit
pub fn visit_summary(visit: &VisitRecord) -> String {
    let or_unknown = |v: &Option<String>| v.clone().unwrap_or_else(|| "Unknown".to_string());
    format!(
        "New visit to {}\nFrom: {}, {}\nDevice: {} ({} on {})\nReferrer: {}",
        visit.path,
        or_unknown(&visit.city),
        or_unknown(&visit.country),
        or_unknown(&visit.device_type),
        or_unknown(&visit.browser),
        or_unknown(&visit.os),
        visit.referrer.as_deref().unwrap_or("direct"),
    )
}

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    pub fn from_config(config: &NotifyConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .with_context(|| format!("invalid NOTIFY_EMAIL_FROM '{}'", config.from))?;
        let to: Mailbox = config
            .to
            .parse()
            .with_context(|| format!("invalid NOTIFY_EMAIL_TO '{}'", config.to))?;

        let host = config.smtp_host.as_str();
        let mut builder = if host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1" {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        } else if config.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
        };
        builder = builder.port(config.smtp_port).timeout(Some(SMTP_TIMEOUT));

        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        info!("Visit notifications enabled via {}:{}", host, config.smtp_port);
        Ok(Self {
            mailer: builder.build(),
            from,
            to,
        })
    }
}

#[async_trait]
impl VisitNotifier for EmailNotifier {
    async fn notify_visit(&self, visit: &VisitRecord) -> Result<()> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(SUBJECT)
            .body(visit_summary(visit))
            .context("failed to build notification email")?;

        self.mailer
            .send(email)
            .await
            .context("smtp send failed")?;
        Ok(())
    }
}
