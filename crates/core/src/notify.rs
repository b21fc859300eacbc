//! Outbound notifications emitted by enrollment transitions.
//!
//! The workflow only enqueues [`Notification`] messages. A
//! [`NotificationDispatcher`] drains the queue, renders each message into an
//! [`EmailMessage`] and hands it to a [`NotificationSender`]. Delivery failures
//! stay inside the dispatcher.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::enrollment::{EnrollmentLine, EnrollmentRequestId, EnrollmentStatus};
use crate::domain::student::StudentId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    EnrollmentSubmitted {
        request_id: EnrollmentRequestId,
        student_id: StudentId,
        recipient: String,
        lines: Vec<EnrollmentLine>,
        total_price: Decimal,
    },
    EnrollmentDecided {
        request_id: EnrollmentRequestId,
        student_id: StudentId,
        recipient: String,
        status: EnrollmentStatus,
        review_note: Option<String>,
    },
}

impl Notification {
    pub fn recipient(&self) -> &str {
        match self {
            Self::EnrollmentSubmitted { recipient, .. }
            | Self::EnrollmentDecided { recipient, .. } => recipient,
        }
    }

    pub fn request_id(&self) -> &EnrollmentRequestId {
        match self {
            Self::EnrollmentSubmitted { request_id, .. }
            | Self::EnrollmentDecided { request_id, .. } => request_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::EnrollmentSubmitted { .. } => "enrollment_submitted",
            Self::EnrollmentDecided { .. } => "enrollment_decided",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OutboxError {
    #[error("notification outbox is closed")]
    Closed,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("failed to render notification: {0}")]
    Render(String),
    #[error("failed to deliver notification: {0}")]
    Transport(String),
}

pub trait NotificationOutbox: Send + Sync {
    fn enqueue(&self, notification: Notification) -> Result<(), OutboxError>;
}

pub trait NotificationRenderer: Send + Sync {
    fn render(&self, notification: &Notification) -> Result<EmailMessage, DeliveryError>;
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError>;
}

#[derive(Clone, Debug)]
pub struct ChannelOutbox {
    sender: mpsc::UnboundedSender<Notification>,
}

impl NotificationOutbox for ChannelOutbox {
    fn enqueue(&self, notification: Notification) -> Result<(), OutboxError> {
        self.sender.send(notification).map_err(|_| OutboxError::Closed)
    }
}

/// Creates a connected outbox handle and its receiving end.
pub fn outbox_channel() -> (ChannelOutbox, mpsc::UnboundedReceiver<Notification>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (ChannelOutbox { sender }, receiver)
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct NotificationDispatcher<R, S> {
    receiver: mpsc::UnboundedReceiver<Notification>,
    renderer: R,
    sender: S,
}

impl<R, S> NotificationDispatcher<R, S>
where
    R: NotificationRenderer,
    S: NotificationSender,
{
    pub fn new(receiver: mpsc::UnboundedReceiver<Notification>, renderer: R, sender: S) -> Self {
        Self { receiver, renderer, sender }
    }

    /// Drains the queue until every outbox handle is dropped.
    pub async fn run(mut self) -> DispatchReport {
        let mut report = DispatchReport::default();
        while let Some(notification) = self.receiver.recv().await {
            if self.deliver(&notification).await {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }

    /// Delivers whatever is queued right now without waiting for more.
    pub async fn drain(&mut self) -> DispatchReport {
        let mut report = DispatchReport::default();
        while let Ok(notification) = self.receiver.try_recv() {
            if self.deliver(&notification).await {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }

    async fn deliver(&self, notification: &Notification) -> bool {
        let result = match self.renderer.render(notification) {
            Ok(message) => self.sender.send(&message).await,
            Err(error) => Err(error),
        };

        match result {
            Ok(()) => {
                debug!(
                    event_name = "notification.delivered",
                    request_id = %notification.request_id(),
                    kind = notification.kind(),
                    "notification delivered"
                );
                true
            }
            Err(error) => {
                warn!(
                    event_name = "notification.delivery_failed",
                    request_id = %notification.request_id(),
                    kind = notification.kind(),
                    error = %error,
                    "notification delivery failed; dropping message"
                );
                false
            }
        }
    }
}

/// Keeps every enqueued notification in memory.
#[derive(Clone, Default)]
pub struct InMemoryOutbox {
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryOutbox {
    pub fn notifications(&self) -> Vec<Notification> {
        match self.notifications.lock() {
            Ok(notifications) => notifications.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl NotificationOutbox for InMemoryOutbox {
    fn enqueue(&self, notification: Notification) -> Result<(), OutboxError> {
        match self.notifications.lock() {
            Ok(mut notifications) => notifications.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
        Ok(())
    }
}

/// Sender that records messages instead of delivering them.
#[derive(Clone, Default)]
pub struct RecordingSender {
    messages: Arc<Mutex<Vec<EmailMessage>>>,
}

impl RecordingSender {
    pub fn messages(&self) -> Vec<EmailMessage> {
        match self.messages.lock() {
            Ok(messages) => messages.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        match self.messages.lock() {
            Ok(mut messages) => messages.push(message.clone()),
            Err(poisoned) => poisoned.into_inner().push(message.clone()),
        }
        Ok(())
    }
}
