use std::sync::Arc;

use tokio::sync::mpsc;

use super::{notifications::NotificationRequest, ServiceError};
use crate::{
    models::{accounts::Account, referrals::ReferralCode},
    repositories::accounts::Ledger,
};

pub struct Onboarding {
    pub account: Account,
    pub created: bool,
    /// Referrer that received the bonus on this call, if any.
    pub credited_referrer: Option<i64>,
}

pub struct ReferralService {
    ledger: Arc<dyn Ledger>,
    notification_channel: mpsc::Sender<NotificationRequest>,
    signup_credits: i32,
    referral_bonus: i32,
}

impl ReferralService {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        notification_channel: mpsc::Sender<NotificationRequest>,
        signup_credits: i32,
        referral_bonus: i32,
    ) -> Self {
        Self {
            ledger,
            notification_channel,
            signup_credits,
            referral_bonus,
        }
    }

    /// Handles first contact. `payload` is whatever followed `/start`.
    pub async fn onboard(&self, user_id: i64, payload: &str) -> Result<Onboarding, ServiceError> {
        let referrer = ReferralCode::parse(payload)
            .map(|code| code.0)
            .filter(|referrer| *referrer != user_id);

        let created = self
            .ledger
            .create(user_id, self.signup_credits, referrer)
            .await
            .map_err(ServiceError::storage)?;

        let credited_referrer = match (created, referrer) {
            (true, Some(referrer)) => self.credit_referrer(referrer, user_id).await,
            _ => None,
        };

        let account = self
            .ledger
            .get(user_id)
            .await
            .map_err(ServiceError::storage)?
            .ok_or_else(|| ServiceError::Storage(format!("account {} missing", user_id)))?;

        Ok(Onboarding {
            account,
            created,
            credited_referrer,
        })
    }

    async fn credit_referrer(&self, referrer: i64, new_user: i64) -> Option<i64> {
        match self.ledger.add_credits(referrer, self.referral_bonus).await {
            Ok(Some(_)) => {
                log::info!("Referrer {} credited for {}.", referrer, new_user);
                let text = format!(
                    "🎉 You referred a new user! +{} credits added.",
                    self.referral_bonus
                );
                let request = NotificationRequest::Notify {
                    chat_id: referrer,
                    text,
                };
                if let Err(e) = self.notification_channel.send(request).await {
                    log::warn!("Could not queue referral notification: {}", e);
                }
                Some(referrer)
            }
            Ok(None) => {
                log::info!("Referrer {} for {} does not exist.", referrer, new_user);
                None
            }
            Err(e) => {
                log::error!("Could not credit referrer {}: {}", referrer, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::accounts::memory::MemoryLedger;

    fn service(ledger: Arc<MemoryLedger>) -> (ReferralService, mpsc::Receiver<NotificationRequest>) {
        let (tx, rx) = mpsc::channel(8);
        (ReferralService::new(ledger, tx, 50, 30), rx)
    }

    #[tokio::test]
    async fn new_user_without_referral() {
        let ledger = Arc::new(MemoryLedger::new());
        let (service, mut rx) = service(ledger.clone());

        let onboarding = service.onboard(100, "").await.unwrap();

        assert!(onboarding.created);
        assert_eq!(onboarding.account, Account::new(100, 50, None));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn referral_credits_referrer_once() {
        let ledger = Arc::new(MemoryLedger::new());
        let (service, mut rx) = service(ledger.clone());
        service.onboard(100, "").await.unwrap();

        let onboarding = service.onboard(200, "ref_100").await.unwrap();
        assert_eq!(onboarding.account.referred_by, Some(100));
        assert_eq!(onboarding.credited_referrer, Some(100));
        assert_eq!(ledger.account(100).unwrap().credits, 80);
        match rx.try_recv() {
            Ok(NotificationRequest::Notify { chat_id, .. }) => assert_eq!(chat_id, 100),
            _ => panic!("expected a referrer notification"),
        }

        let again = service.onboard(200, "ref_100").await.unwrap();
        assert!(!again.created);
        assert_eq!(again.credited_referrer, None);
        assert_eq!(ledger.account(100).unwrap().credits, 80);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn self_referral_is_discarded() {
        let ledger = Arc::new(MemoryLedger::new());
        let (service, _rx) = service(ledger.clone());

        let onboarding = service.onboard(300, "ref_300").await.unwrap();

        assert_eq!(onboarding.account.referred_by, None);
        assert_eq!(onboarding.account.credits, 50);
        assert_eq!(onboarding.credited_referrer, None);
    }

    #[tokio::test]
    async fn unknown_referrer_grants_nothing() {
        let ledger = Arc::new(MemoryLedger::new());
        let (service, mut rx) = service(ledger.clone());

        let onboarding = service.onboard(400, "ref_999").await.unwrap();

        assert!(onboarding.created);
        assert_eq!(onboarding.credited_referrer, None);
        assert_eq!(ledger.account(999), None);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_payload_is_ignored() {
        let ledger = Arc::new(MemoryLedger::new());
        let (service, _rx) = service(ledger.clone());
        service.onboard(100, "").await.unwrap();

        let onboarding = service.onboard(500, "ref_abc").await.unwrap();

        assert_eq!(onboarding.account.referred_by, None);
        assert_eq!(ledger.account(100).unwrap().credits, 50);
    }
}
