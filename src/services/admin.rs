use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::{notifications::NotificationRequest, ServiceError};
use crate::repositories::accounts::Ledger;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdminAction {
    Stats,
    Broadcast,
    AddCredit,
    RemoveCredit,
}

impl AdminAction {
    pub fn from_callback(data: &str) -> Option<Self> {
        match data {
            "stats" => Some(AdminAction::Stats),
            "broadcast" => Some(AdminAction::Broadcast),
            "addcredit" => Some(AdminAction::AddCredit),
            "remcredit" => Some(AdminAction::RemoveCredit),
            _ => None,
        }
    }

    pub fn callback_data(&self) -> &'static str {
        match self {
            AdminAction::Stats => "stats",
            AdminAction::Broadcast => "broadcast",
            AdminAction::AddCredit => "addcredit",
            AdminAction::RemoveCredit => "remcredit",
        }
    }
}

/// What the operator's next text message will be used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingKind {
    Broadcast,
    AddCredit,
    RemoveCredit,
}

struct PendingAction {
    kind: PendingKind,
    expires_at: Instant,
}

#[derive(Debug, PartialEq, Eq)]
pub enum AdminOutcome {
    Stats { accounts: i64 },
    Prompt(PendingKind),
    BroadcastQueued { recipients: usize },
    Adjusted {
        kind: PendingKind,
        user_id: i64,
        amount: i32,
        balance: i32,
    },
    UserNotFound(i64),
    BadInput(PendingKind),
}

pub struct AdminConsole {
    operator_id: i64,
    ledger: Arc<dyn Ledger>,
    notification_channel: mpsc::Sender<NotificationRequest>,
    pending: DashMap<i64, PendingAction>,
    pending_ttl: Duration,
}

impl AdminConsole {
    pub fn new(
        operator_id: i64,
        ledger: Arc<dyn Ledger>,
        notification_channel: mpsc::Sender<NotificationRequest>,
        pending_ttl: Duration,
    ) -> Self {
        Self {
            operator_id,
            ledger,
            notification_channel,
            pending: DashMap::new(),
            pending_ttl,
        }
    }

    pub fn is_operator(&self, user_id: i64) -> bool {
        user_id == self.operator_id
    }

    /// Handles a panel button. Returns `None` for anyone but the operator.
    pub async fn select(
        &self,
        requester: i64,
        action: AdminAction,
    ) -> Result<Option<AdminOutcome>, ServiceError> {
        if !self.is_operator(requester) {
            log::warn!("User {} pressed admin action {:?}.", requester, action);
            return Ok(None);
        }

        let kind = match action {
            AdminAction::Stats => {
                let accounts = self
                    .ledger
                    .count_accounts()
                    .await
                    .map_err(ServiceError::storage)?;
                return Ok(Some(AdminOutcome::Stats { accounts }));
            }
            AdminAction::Broadcast => PendingKind::Broadcast,
            AdminAction::AddCredit => PendingKind::AddCredit,
            AdminAction::RemoveCredit => PendingKind::RemoveCredit,
        };

        self.pending.insert(
            requester,
            PendingAction {
                kind,
                expires_at: Instant::now() + self.pending_ttl,
            },
        );

        Ok(Some(AdminOutcome::Prompt(kind)))
    }

    pub fn has_pending(&self, requester: i64) -> bool {
        self.pending
            .get(&requester)
            .is_some_and(|action| action.expires_at > Instant::now())
    }

    pub fn cancel(&self, requester: i64) -> bool {
        self.pending.remove(&requester).is_some()
    }

    /// Feeds the operator's follow-up message to the pending action. `None`
    /// means nothing was waiting for it.
    pub async fn handle_reply(
        &self,
        requester: i64,
        text: &str,
    ) -> Result<Option<AdminOutcome>, ServiceError> {
        if !self.is_operator(requester) {
            return Ok(None);
        }

        let Some((_, action)) = self.pending.remove(&requester) else {
            return Ok(None);
        };
        if action.expires_at <= Instant::now() {
            log::info!("Pending {:?} for {} expired.", action.kind, requester);
            return Ok(None);
        }

        let outcome = match action.kind {
            PendingKind::Broadcast => self.broadcast(requester, text).await?,
            kind => self.adjust_credits(kind, text).await?,
        };

        if let AdminOutcome::BadInput(_) = outcome {
            // Keep waiting for a well-formed reply.
            self.pending.insert(requester, action);
        }

        Ok(Some(outcome))
    }

    async fn broadcast(&self, requester: i64, text: &str) -> Result<AdminOutcome, ServiceError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(AdminOutcome::BadInput(PendingKind::Broadcast));
        }

        let recipients = self
            .ledger
            .list_account_ids()
            .await
            .map_err(ServiceError::storage)?;
        let count = recipients.len();

        self.notification_channel
            .send(NotificationRequest::Broadcast {
                recipients,
                text: text.to_string(),
                report_to: requester,
            })
            .await
            .map_err(|e| ServiceError::Chat(e.to_string()))?;

        Ok(AdminOutcome::BroadcastQueued { recipients: count })
    }

    async fn adjust_credits(
        &self,
        kind: PendingKind,
        text: &str,
    ) -> Result<AdminOutcome, ServiceError> {
        let Some((user_id, amount)) = parse_adjustment(text) else {
            return Ok(AdminOutcome::BadInput(kind));
        };

        let delta = match kind {
            PendingKind::RemoveCredit => -amount,
            _ => amount,
        };

        let account = self
            .ledger
            .add_credits(user_id, delta)
            .await
            .map_err(ServiceError::storage)?;

        match account {
            Some(account) => {
                log::info!(
                    "Operator adjusted {} by {}: balance={}",
                    user_id,
                    delta,
                    account.credits
                );
                Ok(AdminOutcome::Adjusted {
                    kind,
                    user_id,
                    amount,
                    balance: account.credits,
                })
            }
            None => Ok(AdminOutcome::UserNotFound(user_id)),
        }
    }
}

/// Parses `<id> <amount>` with a non-negative amount.
fn parse_adjustment(text: &str) -> Option<(i64, i32)> {
    let mut parts = text.split_whitespace();
    let user_id = parts.next()?.parse::<i64>().ok()?;
    let amount = parts.next()?.parse::<i32>().ok()?;
    if parts.next().is_some() || amount < 0 {
        return None;
    }

    Some((user_id, amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::accounts::Account, repositories::accounts::memory::MemoryLedger};

    const OPERATOR: i64 = 1;

    fn console(
        ttl: Duration,
    ) -> (
        AdminConsole,
        Arc<MemoryLedger>,
        mpsc::Receiver<NotificationRequest>,
    ) {
        let ledger = Arc::new(MemoryLedger::new());
        let (tx, rx) = mpsc::channel(8);
        (
            AdminConsole::new(OPERATOR, ledger.clone(), tx, ttl),
            ledger,
            rx,
        )
    }

    fn account(id: i64, credits: i32) -> Account {
        Account::new(id, credits, None)
    }

    #[tokio::test]
    async fn stats_counts_accounts() {
        let (console, ledger, _rx) = console(Duration::from_secs(60));
        ledger.insert(account(10, 1));
        ledger.insert(account(11, 1));

        let outcome = console.select(OPERATOR, AdminAction::Stats).await.unwrap();

        assert_eq!(outcome, Some(AdminOutcome::Stats { accounts: 2 }));
    }

    #[tokio::test]
    async fn add_credit_flow() {
        let (console, ledger, _rx) = console(Duration::from_secs(60));
        ledger.insert(account(300, 10));

        let prompt = console.select(OPERATOR, AdminAction::AddCredit).await.unwrap();
        assert_eq!(prompt, Some(AdminOutcome::Prompt(PendingKind::AddCredit)));

        let outcome = console.handle_reply(OPERATOR, "300 25").await.unwrap();
        assert_eq!(
            outcome,
            Some(AdminOutcome::Adjusted {
                kind: PendingKind::AddCredit,
                user_id: 300,
                amount: 25,
                balance: 35,
            })
        );
        assert_eq!(ledger.account(300).unwrap().credits, 35);
        assert!(!console.has_pending(OPERATOR));
    }

    #[tokio::test]
    async fn remove_credit_clamps_at_zero() {
        let (console, ledger, _rx) = console(Duration::from_secs(60));
        ledger.insert(account(300, 10));

        console
            .select(OPERATOR, AdminAction::RemoveCredit)
            .await
            .unwrap();
        console.handle_reply(OPERATOR, "300 50").await.unwrap();

        assert_eq!(ledger.account(300).unwrap().credits, 0);
    }

    #[tokio::test]
    async fn unknown_target_is_reported() {
        let (console, _ledger, _rx) = console(Duration::from_secs(60));

        console.select(OPERATOR, AdminAction::AddCredit).await.unwrap();
        let outcome = console.handle_reply(OPERATOR, "404 5").await.unwrap();

        assert_eq!(outcome, Some(AdminOutcome::UserNotFound(404)));
    }

    #[tokio::test]
    async fn malformed_reply_keeps_prompt_open() {
        let (console, ledger, _rx) = console(Duration::from_secs(60));
        ledger.insert(account(300, 10));

        console.select(OPERATOR, AdminAction::AddCredit).await.unwrap();
        let outcome = console.handle_reply(OPERATOR, "three hundred").await.unwrap();
        assert_eq!(outcome, Some(AdminOutcome::BadInput(PendingKind::AddCredit)));
        assert!(console.has_pending(OPERATOR));

        console.handle_reply(OPERATOR, "300 5").await.unwrap();
        assert_eq!(ledger.account(300).unwrap().credits, 15);
    }

    #[tokio::test]
    async fn non_operator_changes_nothing() {
        let (console, ledger, mut rx) = console(Duration::from_secs(60));
        ledger.insert(account(300, 10));

        for action in [
            AdminAction::Stats,
            AdminAction::Broadcast,
            AdminAction::AddCredit,
            AdminAction::RemoveCredit,
        ] {
            assert_eq!(console.select(2, action).await.unwrap(), None);
        }
        assert_eq!(console.handle_reply(2, "300 25").await.unwrap(), None);

        assert_eq!(ledger.account(300).unwrap().credits, 10);
        assert!(!console.has_pending(2));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_queues_all_accounts() {
        let (console, ledger, mut rx) = console(Duration::from_secs(60));
        ledger.insert(account(10, 1));
        ledger.insert(account(11, 1));

        console.select(OPERATOR, AdminAction::Broadcast).await.unwrap();
        let outcome = console.handle_reply(OPERATOR, "hello all").await.unwrap();

        assert_eq!(outcome, Some(AdminOutcome::BroadcastQueued { recipients: 2 }));
        match rx.try_recv() {
            Ok(NotificationRequest::Broadcast {
                recipients,
                text,
                report_to,
            }) => {
                assert_eq!(recipients, vec![10, 11]);
                assert_eq!(text, "hello all");
                assert_eq!(report_to, OPERATOR);
            }
            _ => panic!("expected a broadcast request"),
        }
    }

    #[tokio::test]
    async fn expired_prompt_is_ignored() {
        let (console, ledger, _rx) = console(Duration::ZERO);
        ledger.insert(account(300, 10));

        console.select(OPERATOR, AdminAction::AddCredit).await.unwrap();
        assert!(!console.has_pending(OPERATOR));
        assert_eq!(console.handle_reply(OPERATOR, "300 25").await.unwrap(), None);
        assert_eq!(ledger.account(300).unwrap().credits, 10);
    }

    #[tokio::test]
    async fn new_prompt_replaces_old_one() {
        let (console, ledger, mut rx) = console(Duration::from_secs(60));
        ledger.insert(account(300, 10));

        console.select(OPERATOR, AdminAction::Broadcast).await.unwrap();
        console.select(OPERATOR, AdminAction::AddCredit).await.unwrap();
        console.handle_reply(OPERATOR, "300 1").await.unwrap();

        assert_eq!(ledger.account(300).unwrap().credits, 11);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn parses_adjustments() {
        assert_eq!(parse_adjustment("300 25"), Some((300, 25)));
        assert_eq!(parse_adjustment("  300   25 "), Some((300, 25)));
        assert_eq!(parse_adjustment("300"), None);
        assert_eq!(parse_adjustment("300 -5"), None);
        assert_eq!(parse_adjustment("300 5 7"), None);
        assert_eq!(parse_adjustment("abc 5"), None);
    }

    #[test]
    fn callback_names_round_trip() {
        for action in [
            AdminAction::Stats,
            AdminAction::Broadcast,
            AdminAction::AddCredit,
            AdminAction::RemoveCredit,
        ] {
            assert_eq!(AdminAction::from_callback(action.callback_data()), Some(action));
        }
        assert_eq!(AdminAction::from_callback("download"), None);
    }
}
