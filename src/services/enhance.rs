use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::{gateway::ChatGateway, links::LinkStore, ServiceError};
use crate::{
    models::{
        accounts::Account,
        enhance::{Denial, EnhancedPhoto, Stage, Submission},
    },
    repositories::{accounts::Ledger, catbox::FileHost, enhancer::Enhancer},
};

/// Derives the per-user handle attached to uploads and relay captions.
pub fn opaque_handle(salt: &str, user_id: i64) -> String {
    let digest = Sha256::digest(format!("{}{}", salt, user_id).as_bytes());
    let hex = format!("{:x}", digest);

    format!("u_{}", &hex[..16])
}

fn denial_for(account: &Account, daily_quota: i32) -> Option<Denial> {
    if account.credits <= 0 {
        Some(Denial::OutOfCredits)
    } else if account.daily_used >= daily_quota {
        Some(Denial::QuotaExhausted)
    } else {
        None
    }
}

pub struct EnhancePipeline {
    ledger: Arc<dyn Ledger>,
    file_host: Arc<dyn FileHost>,
    enhancer: Arc<dyn Enhancer>,
    gateway: Arc<dyn ChatGateway>,
    links: Arc<LinkStore>,
    daily_quota: i32,
    handle_salt: String,
}

impl EnhancePipeline {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        file_host: Arc<dyn FileHost>,
        enhancer: Arc<dyn Enhancer>,
        gateway: Arc<dyn ChatGateway>,
        links: Arc<LinkStore>,
        daily_quota: i32,
        handle_salt: String,
    ) -> Self {
        Self {
            ledger,
            file_host,
            enhancer,
            gateway,
            links,
            daily_quota,
            handle_salt,
        }
    }

    /// Runs one submission up to the enhanced URL. The credit is spent as soon
    /// as authorization succeeds and is not returned on later failures.
    pub async fn process(&self, submission: &Submission) -> Result<EnhancedPhoto, ServiceError> {
        let account = self.authorize(submission.user_id).await?;
        log::info!(
            "User {} authorized: credits={}, daily_used={}",
            account.id,
            account.credits,
            account.daily_used
        );

        let user_id = submission.user_id;
        let handle = opaque_handle(&self.handle_salt, user_id);

        let source = self
            .gateway
            .file_url(&submission.file_id)
            .await
            .map_err(|e| upstream(Stage::Resolve, user_id, e))?;

        let hosted = self
            .file_host
            .upload_url(&source, Some(&handle))
            .await
            .map_err(|e| upstream(Stage::Upload, user_id, e))?;

        let caption = format!(
            "🆔 User: {} ({})\n📦 Userhash: {}",
            submission.display_name, user_id, handle
        );
        self.gateway
            .relay_photo(&submission.file_id, &caption)
            .await
            .map_err(|e| upstream(Stage::Relay, user_id, e))?;

        let url = self
            .enhancer
            .enhance(&hosted)
            .await
            .map_err(|e| upstream(Stage::Enhance, user_id, e))?;

        let token = self.links.issue(user_id, url.clone());
        Ok(EnhancedPhoto { url, token })
    }

    async fn authorize(&self, user_id: i64) -> Result<Account, ServiceError> {
        let account = self
            .ledger
            .get(user_id)
            .await
            .map_err(ServiceError::storage)?
            .ok_or(ServiceError::Denied(Denial::NotRegistered))?;

        if let Some(denial) = denial_for(&account, self.daily_quota) {
            return Err(ServiceError::Denied(denial));
        }

        match self
            .ledger
            .try_debit(user_id, self.daily_quota)
            .await
            .map_err(ServiceError::storage)?
        {
            Some(account) => Ok(account),
            None => {
                // Lost a race with another submission; report what the row says now.
                let denial = self
                    .ledger
                    .get(user_id)
                    .await
                    .map_err(ServiceError::storage)?
                    .and_then(|account| denial_for(&account, self.daily_quota))
                    .unwrap_or(Denial::OutOfCredits);
                Err(ServiceError::Denied(denial))
            }
        }
    }

    /// URL behind a download button token.
    pub fn download_url(&self, user_id: i64, token: &str) -> Result<String, ServiceError> {
        self.links
            .resolve(user_id, token)
            .ok_or(ServiceError::LinkExpired)
    }

    /// Re-hosts the enhanced image and returns its direct URL.
    pub async fn direct_link(&self, user_id: i64, token: &str) -> Result<String, ServiceError> {
        let url = self.download_url(user_id, token)?;

        self.file_host
            .upload_url(&url, None)
            .await
            .map_err(|e| upstream(Stage::Upload, user_id, e))
    }
}

fn upstream(stage: Stage, user_id: i64, e: anyhow::Error) -> ServiceError {
    log::error!("Enhancement failed at {} for user {}: {}", stage, user_id, e);
    ServiceError::Upstream(stage, e.to_string())
}
