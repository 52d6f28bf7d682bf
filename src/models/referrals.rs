const PREFIX: &str = "ref_";

/// Payload carried by `/start` deep links: `ref_<referrer id>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReferralCode(pub i64);

impl ReferralCode {
    pub fn parse(payload: &str) -> Option<Self> {
        payload
            .trim()
            .strip_prefix(PREFIX)
            .and_then(|id| id.parse::<i64>().ok())
            .map(ReferralCode)
    }

    pub fn link(&self, bot_username: &str) -> String {
        format!("https://t.me/{}?start={}", bot_username, self)
    }
}

impl std::fmt::Display for ReferralCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", PREFIX, self.0)
    }
}
