//! Email rendering and delivery for enrollment notifications.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use demande_core::config::{NotificationsConfig, SenderKind};
use demande_core::notify::{
    DeliveryError, EmailMessage, Notification, NotificationRenderer, NotificationSender,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;
use tracing::info;

const SUBMITTED_TEMPLATE: &str = "enrollment_submitted.html";
const DECIDED_TEMPLATE: &str = "enrollment_decided.html";
const RELAY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("failed to load email template `{name}`: {source}")]
    Template {
        name: &'static str,
        #[source]
        source: tera::Error,
    },
    #[error("http sender requires notifications.relay_url")]
    MissingRelayUrl,
    #[error("failed to build relay client: {0}")]
    Client(#[source] reqwest::Error),
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Renders notifications with the email templates compiled into the binary.
#[derive(Clone)]
pub struct TemplateRenderer {
    templates: Arc<Tera>,
}

impl TemplateRenderer {
    pub fn embedded() -> Result<Self, MailerError> {
        let mut tera = Tera::default();
        tera.add_raw_template(
            SUBMITTED_TEMPLATE,
            include_str!("../../../templates/email/enrollment_submitted.html"),
        )
        .map_err(|source| MailerError::Template { name: SUBMITTED_TEMPLATE, source })?;
        tera.add_raw_template(
            DECIDED_TEMPLATE,
            include_str!("../../../templates/email/enrollment_decided.html"),
        )
        .map_err(|source| MailerError::Template { name: DECIDED_TEMPLATE, source })?;

        Ok(Self { templates: Arc::new(tera) })
    }
}

impl NotificationRenderer for TemplateRenderer {
    fn render(&self, notification: &Notification) -> Result<EmailMessage, DeliveryError> {
        let mut context = Context::new();
        let (template, subject) = match notification {
            Notification::EnrollmentSubmitted {
                request_id, student_id, lines, total_price, ..
            } => {
                context.insert("request_id", &request_id.0);
                context.insert("student_id", &student_id.0);
                context.insert("lines", lines);
                context.insert("total_price", &total_price.to_string());
                let subject = format!("New enrollment request {request_id} from {student_id}");
                (SUBMITTED_TEMPLATE, subject)
            }
            Notification::EnrollmentDecided { request_id, status, review_note, .. } => {
                context.insert("request_id", &request_id.0);
                context.insert("status", status.as_str());
                context.insert("review_note", review_note);
                let subject =
                    format!("Your enrollment request {request_id} was {}", status.as_str());
                (DECIDED_TEMPLATE, subject)
            }
        };

        let html_body = self
            .templates
            .render(template, &context)
            .map_err(|error| DeliveryError::Render(error.to_string()))?;

        Ok(EmailMessage { to: notification.recipient().to_owned(), subject, html_body })
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// Writes each message to the log instead of sending it.
#[derive(Clone, Debug, Default)]
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        info!(
            event_name = "notification.email.logged",
            to = %message.to,
            subject = %message.subject,
            body_bytes = message.html_body.len(),
            "email delivery disabled; message logged"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Posts messages as JSON to an HTTP mail relay.
#[derive(Clone)]
pub struct HttpRelaySender {
    client: reqwest::Client,
    relay_url: String,
    from_address: String,
    token: Option<SecretString>,
}

impl HttpRelaySender {
    pub fn new(
        relay_url: impl Into<String>,
        from_address: impl Into<String>,
        token: Option<SecretString>,
    ) -> Result<Self, MailerError> {
        let client =
            reqwest::Client::builder().timeout(RELAY_TIMEOUT).build().map_err(MailerError::Client)?;
        Ok(Self { client, relay_url: relay_url.into(), from_address: from_address.into(), token })
    }
}

#[async_trait]
impl NotificationSender for HttpRelaySender {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        let payload = RelayPayload {
            from: &self.from_address,
            to: &message.to,
            subject: &message.subject,
            html: &message.html_body,
        };

        let mut request = self.client.post(&self.relay_url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|error| DeliveryError::Transport(error.to_string()))?;
        Ok(())
    }
}

/// Sender selected by `notifications.sender`.
#[derive(Clone)]
pub enum ConfiguredSender {
    Log(LogSender),
    Http(HttpRelaySender),
}

impl ConfiguredSender {
    pub fn from_config(config: &NotificationsConfig) -> Result<Self, MailerError> {
        match config.sender {
            SenderKind::Log => Ok(Self::Log(LogSender)),
            SenderKind::Http => {
                let relay_url = config.relay_url.clone().ok_or(MailerError::MissingRelayUrl)?;
                HttpRelaySender::new(relay_url, &config.from_address, config.relay_token.clone())
                    .map(Self::Http)
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Log(_) => "log",
            Self::Http(_) => "http",
        }
    }
}

#[async_trait]
impl NotificationSender for ConfiguredSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        match self {
            Self::Log(sender) => sender.send(message).await,
            Self::Http(sender) => sender.send(message).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use demande_core::config::{NotificationsConfig, SenderKind};
    use demande_core::domain::enrollment::{EnrollmentLine, EnrollmentRequestId, EnrollmentStatus};
    use demande_core::domain::grade::GradeId;
    use demande_core::domain::student::StudentId;
    use demande_core::notify::{
        DeliveryError, EmailMessage, Notification, NotificationRenderer, NotificationSender,
    };
    use rust_decimal::Decimal;
    use secrecy::SecretString;

    use super::{ConfiguredSender, HttpRelaySender, MailerError, TemplateRenderer};

    type Captured = Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>;

    async fn capture(
        State(captured): State<Captured>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        let auth = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        captured.lock().expect("capture lock").push((auth, body));
        StatusCode::ACCEPTED
    }

    async fn spawn_relay(status: StatusCode) -> (String, Captured) {
        let captured: Captured = Arc::default();
        let app = if status.is_success() {
            Router::new().route("/send", post(capture)).with_state(captured.clone())
        } else {
            Router::new().route("/send", post(move || async move { status }))
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind relay");
        let address = listener.local_addr().expect("relay address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        (format!("http://{address}/send"), captured)
    }

    fn message() -> EmailMessage {
        EmailMessage {
            to: "ada@demande.test".to_owned(),
            subject: "Your enrollment request DEM-1 was approved".to_owned(),
            html_body: "<p>approved</p>".to_owned(),
        }
    }

    fn notifications(sender: SenderKind, relay_url: Option<&str>) -> NotificationsConfig {
        NotificationsConfig {
            admin_email: "registrar@demande.test".to_owned(),
            from_address: "no-reply@demande.test".to_owned(),
            sender,
            relay_url: relay_url.map(str::to_owned),
            relay_token: None,
        }
    }

    #[test]
    fn submitted_email_lists_lines_and_total() {
        let renderer = TemplateRenderer::embedded().expect("templates");
        let email = renderer
            .render(&Notification::EnrollmentSubmitted {
                request_id: EnrollmentRequestId("DEM-1".to_owned()),
                student_id: StudentId("stu-alice".to_owned()),
                recipient: "registrar@demande.test".to_owned(),
                lines: vec![
                    EnrollmentLine {
                        grade_id: GradeId("G1".to_owned()),
                        grade_name: "Beginner".to_owned(),
                        grade_price: Decimal::new(100, 0),
                    },
                    EnrollmentLine {
                        grade_id: GradeId("G3".to_owned()),
                        grade_name: "Advanced".to_owned(),
                        grade_price: Decimal::new(8050, 2),
                    },
                ],
                total_price: Decimal::new(18050, 2),
            })
            .expect("render");

        assert_eq!(email.to, "registrar@demande.test");
        assert_eq!(email.subject, "New enrollment request DEM-1 from stu-alice");
        assert!(email.html_body.contains("Beginner"));
        assert!(email.html_body.contains("Advanced"));
        assert!(email.html_body.contains("180.50"));
    }

    #[test]
    fn decided_email_includes_status_and_note() {
        let renderer = TemplateRenderer::embedded().expect("templates");
        let email = renderer
            .render(&Notification::EnrollmentDecided {
                request_id: EnrollmentRequestId("DEM-2".to_owned()),
                student_id: StudentId("stu-alice".to_owned()),
                recipient: "ada@demande.test".to_owned(),
                status: EnrollmentStatus::Rejected,
                review_note: Some("Grade G3 is full this term".to_owned()),
            })
            .expect("render");

        assert_eq!(email.subject, "Your enrollment request DEM-2 was rejected");
        assert!(email.html_body.contains("was rejected"));
        assert!(email.html_body.contains("Grade G3 is full this term"));
        assert!(!email.html_body.contains("Welcome aboard"));
    }

    #[tokio::test]
    async fn http_relay_posts_payload_with_bearer_token() {
        let (url, captured) = spawn_relay(StatusCode::ACCEPTED).await;
        let sender = HttpRelaySender::new(
            url,
            "no-reply@demande.test",
            Some(SecretString::from("relay-secret".to_owned())),
        )
        .expect("sender");

        sender.send(&message()).await.expect("send");

        let calls = captured.lock().expect("capture lock").clone();
        assert_eq!(calls.len(), 1);
        let (auth, body) = &calls[0];
        assert_eq!(auth.as_deref(), Some("Bearer relay-secret"));
        assert_eq!(body["from"], "no-reply@demande.test");
        assert_eq!(body["to"], "ada@demande.test");
        assert_eq!(body["html"], "<p>approved</p>");
    }

    #[tokio::test]
    async fn http_relay_error_status_is_a_transport_failure() {
        let (url, _) = spawn_relay(StatusCode::BAD_GATEWAY).await;
        let sender = HttpRelaySender::new(url, "no-reply@demande.test", None).expect("sender");

        let result = sender.send(&message()).await;
        assert!(matches!(result, Err(DeliveryError::Transport(_))));
    }

    #[test]
    fn configured_sender_follows_sender_kind() {
        let log = ConfiguredSender::from_config(&notifications(SenderKind::Log, None))
            .expect("log sender");
        assert_eq!(log.kind(), "log");

        let http = ConfiguredSender::from_config(&notifications(
            SenderKind::Http,
            Some("https://relay.demande.test/send"),
        ))
        .expect("http sender");
        assert_eq!(http.kind(), "http");

        let missing = ConfiguredSender::from_config(&notifications(SenderKind::Http, None));
        assert!(matches!(missing, Err(MailerError::MissingRelayUrl)));
    }
}
