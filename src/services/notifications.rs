use std::sync::Arc;

use async_trait::async_trait;

use super::{gateway::ChatGateway, RequestHandler, Service};

const BROADCAST_DONE: &str = "✅ Broadcast sent!";

pub enum NotificationRequest {
    Notify {
        chat_id: i64,
        text: String,
    },
    Broadcast {
        recipients: Vec<i64>,
        text: String,
        report_to: i64,
    },
}

#[derive(Clone)]
pub struct NotificationRequestHandler {
    gateway: Arc<dyn ChatGateway>,
}

impl NotificationRequestHandler {
    pub fn new(gateway: Arc<dyn ChatGateway>) -> Self {
        Self { gateway }
    }

    async fn notify(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.gateway.send_text(chat_id, text).await {
            log::warn!("Could not notify {}: {}", chat_id, e);
        }
    }

    async fn broadcast(&self, recipients: &[i64], text: &str, report_to: i64) {
        log::info!("Broadcasting to {} accounts.", recipients.len());

        for chat_id in recipients {
            // Blocked or deleted chats must not stop the batch.
            if let Err(e) = self.gateway.send_text(*chat_id, text).await {
                log::warn!("Broadcast to {} failed: {}", chat_id, e);
            }
        }

        self.notify(report_to, BROADCAST_DONE).await;
    }
}

#[async_trait]
impl RequestHandler<NotificationRequest> for NotificationRequestHandler {
    async fn handle_request(&self, request: NotificationRequest) {
        match request {
            NotificationRequest::Notify { chat_id, text } => {
                self.notify(chat_id, &text).await;
            }
            NotificationRequest::Broadcast {
                recipients,
                text,
                report_to,
            } => {
                self.broadcast(&recipients, &text, report_to).await;
            }
        }
    }
}

pub struct NotificationService;

impl NotificationService {
    pub fn new() -> Self {
        NotificationService {}
    }
}

#[async_trait]
impl Service<NotificationRequest, NotificationRequestHandler> for NotificationService {}
