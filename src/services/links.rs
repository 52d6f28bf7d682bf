use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

struct Link {
    url: String,
    owner: i64,
    expires_at: Instant,
}

/// Short-lived tokens standing in for enhanced image URLs in button data.
pub struct LinkStore {
    links: DashMap<String, Link>,
    ttl: Duration,
}

impl LinkStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            links: DashMap::new(),
            ttl,
        }
    }

    pub fn issue(&self, owner: i64, url: String) -> String {
        let now = Instant::now();
        self.links.retain(|_, link| link.expires_at > now);

        let token = Uuid::new_v4().simple().to_string();
        self.links.insert(
            token.clone(),
            Link {
                url,
                owner,
                expires_at: now + self.ttl,
            },
        );

        token
    }

    /// Looks up a live token. Tokens only resolve for the user they were issued to.
    pub fn resolve(&self, owner: i64, token: &str) -> Option<String> {
        let link = self.links.get(token)?;
        if link.owner != owner || link.expires_at <= Instant::now() {
            return None;
        }

        Some(link.url.clone())
    }
}
