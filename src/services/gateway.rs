use async_trait::async_trait;
use teloxide::{
    prelude::*,
    types::{FileId, InputFile},
};

/// The outbound chat operations the core needs. Everything else (keyboards,
/// documents, callback answers) stays in the bot layer.
#[async_trait]
pub trait ChatGateway: Send + Sync + 'static {
    /// Resolves a chat file id to a URL an outside service can fetch.
    async fn file_url(&self, file_id: &str) -> Result<String, anyhow::Error>;

    /// Posts the original photo to the relay channel.
    async fn relay_photo(&self, file_id: &str, caption: &str) -> Result<(), anyhow::Error>;

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), anyhow::Error>;
}

pub struct TelegramGateway {
    bot: Bot,
    token: String,
    relay_channel: ChatId,
}

impl TelegramGateway {
    pub fn new(bot: Bot, token: String, relay_channel: ChatId) -> Self {
        Self {
            bot,
            token,
            relay_channel,
        }
    }
}

#[async_trait]
impl ChatGateway for TelegramGateway {
    async fn file_url(&self, file_id: &str) -> Result<String, anyhow::Error> {
        let file = self.bot.get_file(FileId(file_id.to_owned())).await?;

        Ok(format!(
            "https://api.telegram.org/file/bot{}/{}",
            self.token, file.path
        ))
    }

    async fn relay_photo(&self, file_id: &str, caption: &str) -> Result<(), anyhow::Error> {
        self.bot
            .send_photo(self.relay_channel, InputFile::file_id(FileId(file_id.to_owned())))
            .caption(caption)
            .await?;

        Ok(())
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), anyhow::Error> {
        self.bot.send_message(ChatId(chat_id), text).await?;

        Ok(())
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;

    use std::sync::Mutex;

    /// Records every call; sends to ids in `blocked` fail.
    #[derive(Default)]
    pub struct RecordingGateway {
        pub resolved: Mutex<Vec<String>>,
        pub relayed: Mutex<Vec<(String, String)>>,
        pub sent: Mutex<Vec<(i64, String)>>,
        pub blocked: Vec<i64>,
        pub fail_relay: bool,
    }

    impl RecordingGateway {
        pub fn calls(&self) -> usize {
            self.resolved.lock().unwrap().len()
                + self.relayed.lock().unwrap().len()
                + self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatGateway for RecordingGateway {
        async fn file_url(&self, file_id: &str) -> Result<String, anyhow::Error> {
            self.resolved.lock().unwrap().push(file_id.to_string());
            Ok(format!("https://api.telegram.org/file/botTOKEN/{}.jpg", file_id))
        }

        async fn relay_photo(&self, file_id: &str, caption: &str) -> Result<(), anyhow::Error> {
            self.relayed
                .lock()
                .unwrap()
                .push((file_id.to_string(), caption.to_string()));
            if self.fail_relay {
                anyhow::bail!("channel unavailable");
            }
            Ok(())
        }

        async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), anyhow::Error> {
            if self.blocked.contains(&chat_id) {
                anyhow::bail!("Forbidden: bot was blocked by the user");
            }
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
    }
}
