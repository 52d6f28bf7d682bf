use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub credits: i32,
    pub daily_used: i32,
    pub referred_by: Option<i64>,
}

#[cfg(test)]
impl Account {
    pub fn new(id: i64, credits: i32, referred_by: Option<i64>) -> Self {
        Account {
            id,
            credits,
            daily_used: 0,
            referred_by,
        }
    }
}
