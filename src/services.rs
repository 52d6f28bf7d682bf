use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use sqlx::PgPool;
use teloxide::{types::ChatId, Bot};
use tokio::sync::mpsc;

use crate::{
    models::enhance::{Denial, Stage},
    repositories::{
        accounts::{AccountRepository, Ledger},
        catbox::{CatboxApi, FileHost},
        enhancer::{Enhancer, ReminiApi},
    },
    settings::Settings,
};

mod admin;
mod bot;
mod daily_reset;
mod enhance;
mod gateway;
mod http;
mod links;
mod notifications;
mod referrals;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Upstream error: {0} => {1}")]
    Upstream(Stage, String),
    #[error("Chat error: {0}")]
    Chat(String),
    #[error("Request denied: {0:?}")]
    Denied(Denial),
    #[error("Link expired or unknown")]
    LinkExpired,
}

impl ServiceError {
    fn storage(e: anyhow::Error) -> Self {
        ServiceError::Storage(e.to_string())
    }
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

pub async fn start_services(pool: PgPool, settings: Settings) -> Result<(), anyhow::Error> {
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.http.timeout_secs))
        .build()?;

    let ledger: Arc<dyn Ledger> = Arc::new(AccountRepository::new(pool));
    let file_host: Arc<dyn FileHost> =
        Arc::new(CatboxApi::new(settings.catbox.url, http_client.clone()));
    let enhancer: Arc<dyn Enhancer> =
        Arc::new(ReminiApi::new(settings.enhancer.url, http_client));

    let telegram = Bot::new(settings.telegram.token.clone());
    let gateway: Arc<dyn gateway::ChatGateway> = Arc::new(gateway::TelegramGateway::new(
        telegram.clone(),
        settings.telegram.token,
        ChatId(settings.telegram.relay_channel),
    ));

    let (notification_tx, mut notification_rx) = mpsc::channel(512);
    let mut notification_service = notifications::NotificationService::new();

    log::info!("Starting notification service.");
    let notification_gateway = gateway.clone();
    tokio::spawn(async move {
        notification_service
            .run(
                notifications::NotificationRequestHandler::new(notification_gateway),
                &mut notification_rx,
            )
            .await;
    });

    log::info!("Starting daily reset task.");
    daily_reset::start_daily_reset_task(ledger.clone()).await;

    log::info!("Starting HTTP server.");
    let listen = settings.http.listen.clone();
    tokio::spawn(async move {
        if let Err(e) = http::start_http_server(&listen).await {
            log::error!("HTTP server stopped: {}", e);
        }
    });

    let limits = settings.limits;
    let links = Arc::new(links::LinkStore::new(Duration::from_secs(limits.link_ttl_secs)));

    let referrals = referrals::ReferralService::new(
        ledger.clone(),
        notification_tx.clone(),
        limits.signup_credits,
        limits.referral_bonus,
    );
    let pipeline = enhance::EnhancePipeline::new(
        ledger.clone(),
        file_host,
        enhancer,
        gateway,
        links,
        limits.daily_quota,
        settings.handles.salt,
    );
    let admin = admin::AdminConsole::new(
        settings.telegram.operator_id,
        ledger.clone(),
        notification_tx,
        Duration::from_secs(limits.pending_action_secs),
    );

    log::info!("Starting Telegram dispatcher.");
    bot::run(telegram, ledger, referrals, pipeline, admin, limits.daily_quota).await
}
