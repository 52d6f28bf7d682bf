pub mod accounts;
pub mod enhance;
pub mod referrals;
