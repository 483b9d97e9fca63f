use reqwest::Client;
use serde::Serialize;

use crate::config::MailConfig;
use crate::error::{AppError, AppResult};

/// Transactional mail over the provider's HTTP API. Delivery itself is the
/// provider's problem; this client only hands the message over.
#[derive(Debug, Clone)]
pub struct Mailer {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
    notification_email: String,
}

#[derive(Debug, Serialize)]
struct OutgoingMail<'a> {
    from: String,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl Mailer {
    pub fn new(config: &MailConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
            notification_email: config.notification_email.clone(),
        })
    }

    /// Address that receives the provider-side booking notification.
    pub fn notification_email(&self) -> &str {
        &self.notification_email
    }

    pub async fn send(&self, to: &str, subject: &str, text: &str) -> AppResult<()> {
        let mail = OutgoingMail {
            from: format!("Agendamento Espiritual <{}>", self.from),
            to,
            subject,
            text,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&mail)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Mail(format!(
                "Mail API returned {}: {}",
                status, body
            )));
        }

        tracing::debug!("E-mail \"{}\" enviado para {}", subject, to);
        Ok(())
    }
}
