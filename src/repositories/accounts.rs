use crate::models::accounts::Account;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;

const DAILY_RESET_TASK: &str = "daily_reset";

/// Persistent credit ledger, one row per chat participant.
#[async_trait]
pub trait Ledger: Send + Sync + 'static {
    async fn get(&self, id: i64) -> Result<Option<Account>, anyhow::Error>;

    /// Inserts the account unless it already exists. Returns `true` only when
    /// a new row was written.
    async fn create(
        &self,
        id: i64,
        credits: i32,
        referred_by: Option<i64>,
    ) -> Result<bool, anyhow::Error>;

    async fn set_credits(&self, id: i64, value: i32) -> Result<(), anyhow::Error>;

    async fn set_daily_used(&self, id: i64, value: i32) -> Result<(), anyhow::Error>;

    /// Adds `delta` to the balance in one statement, clamping at zero.
    async fn add_credits(&self, id: i64, delta: i32) -> Result<Option<Account>, anyhow::Error>;

    /// Charges one credit and one unit of daily usage if the account has
    /// credits left and is under `daily_quota`. `None` means nothing changed.
    async fn try_debit(&self, id: i64, daily_quota: i32)
        -> Result<Option<Account>, anyhow::Error>;

    async fn count_accounts(&self) -> Result<i64, anyhow::Error>;

    async fn list_account_ids(&self) -> Result<Vec<i64>, anyhow::Error>;

    async fn reset_all_daily_usage(&self) -> Result<(), anyhow::Error>;

    /// Resets daily usage unless a reset was already recorded for `day` or later.
    async fn reset_daily_usage_once(&self, day: NaiveDate) -> Result<bool, anyhow::Error>;
}

#[derive(Clone)]
pub struct AccountRepository {
    conn: PgPool,
}

impl AccountRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Ledger for AccountRepository {
    async fn get(&self, id: i64) -> Result<Option<Account>, anyhow::Error> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, credits, daily_used, referred_by FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(account)
    }

    async fn create(
        &self,
        id: i64,
        credits: i32,
        referred_by: Option<i64>,
    ) -> Result<bool, anyhow::Error> {
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
                INSERT INTO users (id, credits, daily_used, referred_by)
                VALUES ($1, $2, 0, $3)
                ON CONFLICT (id) DO NOTHING
                RETURNING id
            "#,
        )
        .bind(id)
        .bind(credits)
        .bind(referred_by)
        .fetch_optional(&self.conn)
        .await?;

        Ok(inserted.is_some())
    }

    async fn set_credits(&self, id: i64, value: i32) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE users SET credits = $1 WHERE id = $2")
            .bind(value.max(0))
            .bind(id)
            .execute(&self.conn)
            .await?;

        Ok(())
    }

    async fn set_daily_used(&self, id: i64, value: i32) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE users SET daily_used = $1 WHERE id = $2")
            .bind(value)
            .bind(id)
            .execute(&self.conn)
            .await?;

        Ok(())
    }

    async fn add_credits(&self, id: i64, delta: i32) -> Result<Option<Account>, anyhow::Error> {
        let account = sqlx::query_as::<_, Account>(
            r#"
                UPDATE users SET credits = GREATEST(credits + $1, 0)
                WHERE id = $2
                RETURNING id, credits, daily_used, referred_by
            "#,
        )
        .bind(delta)
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(account)
    }

    async fn try_debit(
        &self,
        id: i64,
        daily_quota: i32,
    ) -> Result<Option<Account>, anyhow::Error> {
        let account = sqlx::query_as::<_, Account>(
            r#"
                UPDATE users SET credits = credits - 1, daily_used = daily_used + 1
                WHERE id = $1 AND credits > 0 AND daily_used < $2
                RETURNING id, credits, daily_used, referred_by
            "#,
        )
        .bind(id)
        .bind(daily_quota)
        .fetch_optional(&self.conn)
        .await?;

        Ok(account)
    }

    async fn count_accounts(&self) -> Result<i64, anyhow::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users")
            .fetch_one(&self.conn)
            .await?;

        Ok(count)
    }

    async fn list_account_ids(&self) -> Result<Vec<i64>, anyhow::Error> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM users ORDER BY id")
            .fetch_all(&self.conn)
            .await?;

        Ok(ids)
    }

    async fn reset_all_daily_usage(&self) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE users SET daily_used = 0")
            .execute(&self.conn)
            .await?;

        Ok(())
    }

    async fn reset_daily_usage_once(&self, day: NaiveDate) -> Result<bool, anyhow::Error> {
        let mut tx = self.conn.begin().await?;

        let claimed: Option<String> = sqlx::query_scalar(
            r#"
                INSERT INTO maintenance (task, last_run) VALUES ($1, $2)
                ON CONFLICT (task) DO UPDATE SET last_run = EXCLUDED.last_run
                WHERE maintenance.last_run < EXCLUDED.last_run
                RETURNING task
            "#,
        )
        .bind(DAILY_RESET_TASK)
        .bind(day)
        .fetch_optional(&mut *tx)
        .await?;

        if claimed.is_none() {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("UPDATE users SET daily_used = 0")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(true)
    }
}
