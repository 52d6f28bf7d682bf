use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, User},
};

use super::{
    admin::{AdminAction, AdminConsole, AdminOutcome, PendingKind},
    enhance::EnhancePipeline,
    referrals::ReferralService,
    ServiceError,
};
use crate::{
    models::{
        enhance::{Denial, EnhancedPhoto, Submission},
        referrals::ReferralCode,
    },
    repositories::accounts::Ledger,
};

const APOLOGY: &str = "❌ Something went wrong, please try again!";
const LINK_EXPIRED: &str = "⌛ This link has expired, send the photo again.";
const NO_PERMISSION: &str = "❌ No permission.";
const DOWNLOAD_NAME: &str = "Enhanced_Photo.jpg";

const MY_CREDITS: &str = "mycredits";
const DOWNLOAD_PREFIX: &str = "dl:";
const LINK_PREFIX: &str = "ln:";

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Start(&'a str),
    Credits,
    Admin,
    Cancel,
}

impl<'a> Command<'a> {
    /// Parses `/name[@bot] args`. Commands addressed to another bot are ignored.
    fn parse(text: &'a str, bot_username: &str) -> Option<Self> {
        let rest = text.trim_start().strip_prefix('/')?;
        let (head, args) = rest
            .split_once(char::is_whitespace)
            .unwrap_or((rest, ""));
        let (name, mention) = head.split_once('@').unwrap_or((head, ""));
        if !mention.is_empty() && !mention.eq_ignore_ascii_case(bot_username) {
            return None;
        }

        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Command::Start(args.trim())),
            "credits" => Some(Command::Credits),
            "admin" => Some(Command::Admin),
            "cancel" => Some(Command::Cancel),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Callback<'a> {
    MyCredits,
    Admin(AdminAction),
    Download(&'a str),
    GetLink(&'a str),
}

impl<'a> Callback<'a> {
    fn parse(data: &'a str) -> Option<Self> {
        if data == MY_CREDITS {
            return Some(Callback::MyCredits);
        }
        if let Some(token) = data.strip_prefix(DOWNLOAD_PREFIX) {
            return Some(Callback::Download(token));
        }
        if let Some(token) = data.strip_prefix(LINK_PREFIX) {
            return Some(Callback::GetLink(token));
        }

        AdminAction::from_callback(data).map(Callback::Admin)
    }
}

struct BotState {
    ledger: Arc<dyn Ledger>,
    referrals: ReferralService,
    pipeline: EnhancePipeline,
    admin: AdminConsole,
    daily_quota: i32,
    bot_username: String,
}

pub async fn run(
    bot: Bot,
    ledger: Arc<dyn Ledger>,
    referrals: ReferralService,
    pipeline: EnhancePipeline,
    admin: AdminConsole,
    daily_quota: i32,
) -> Result<(), anyhow::Error> {
    let me = bot.get_me().await?;
    log::info!("Logged in as @{}", me.username());

    let state = Arc::new(BotState {
        ledger,
        referrals,
        pipeline,
        admin,
        daily_quota,
        bot_username: me.username().to_string(),
    });

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(message_handler))
        .branch(Update::filter_callback_query().endpoint(callback_handler));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn message_handler(bot: Bot, msg: Message, state: Arc<BotState>) -> anyhow::Result<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;
    let chat_id = msg.chat.id;

    if let Some(command) = msg
        .text()
        .and_then(|text| Command::parse(text, &state.bot_username))
    {
        return match command {
            Command::Start(payload) => start(&bot, &state, chat_id, user, payload).await,
            Command::Credits => show_credits(&bot, &state, chat_id, user_id).await,
            Command::Admin => admin_panel(&bot, &state, chat_id, user_id).await,
            Command::Cancel => {
                let text = if state.admin.cancel(user_id) {
                    "Cancelled."
                } else {
                    "Nothing to cancel."
                };
                bot.send_message(chat_id, text).await?;
                Ok(())
            }
        };
    }

    if state.admin.has_pending(user_id) {
        let text = msg.text().or(msg.caption()).unwrap_or_default();
        return admin_reply(&bot, &state, chat_id, user_id, text).await;
    }

    if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        let submission = Submission {
            user_id,
            display_name: user
                .username
                .clone()
                .unwrap_or_else(|| user.first_name.clone()),
            file_id: photo.file.id.0.clone(),
        };
        return enhance_photo(&bot, &state, chat_id, submission).await;
    }

    Ok(())
}

async fn start(
    bot: &Bot,
    state: &BotState,
    chat_id: ChatId,
    user: &User,
    payload: &str,
) -> anyhow::Result<()> {
    let user_id = user.id.0 as i64;

    let onboarding = match state.referrals.onboard(user_id, payload).await {
        Ok(onboarding) => onboarding,
        Err(e) => {
            log::error!("Onboarding failed for {}: {}", user_id, e);
            bot.send_message(chat_id, APOLOGY).await?;
            return Ok(());
        }
    };

    if let Some(referrer) = onboarding.credited_referrer {
        log::debug!("New user {} brought by {}", user_id, referrer);
    }

    let text = start_text(
        onboarding.created,
        &user.first_name,
        onboarding.account.credits,
        state.daily_quota,
        &ReferralCode(user_id).link(&state.bot_username),
    );
    let keyboard = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "💳 My credits",
        MY_CREDITS,
    )]]);

    bot.send_message(chat_id, text).reply_markup(keyboard).await?;
    Ok(())
}

async fn show_credits(
    bot: &Bot,
    state: &BotState,
    chat_id: ChatId,
    user_id: i64,
) -> anyhow::Result<()> {
    let text = match state.ledger.get(user_id).await {
        Ok(Some(account)) => format!("💳 Your credits: {}", account.credits),
        Ok(None) => denial_text(Denial::NotRegistered, state.daily_quota),
        Err(e) => {
            log::error!("Could not read account {}: {}", user_id, e);
            APOLOGY.to_string()
        }
    };

    bot.send_message(chat_id, text).await?;
    Ok(())
}

async fn enhance_photo(
    bot: &Bot,
    state: &BotState,
    chat_id: ChatId,
    submission: Submission,
) -> anyhow::Result<()> {
    match state.pipeline.process(&submission).await {
        Ok(enhanced) => {
            if let Err(e) = deliver(bot, chat_id, &enhanced).await {
                log::error!(
                    "Enhancement failed at deliver for user {}: {}",
                    submission.user_id,
                    e
                );
                bot.send_message(chat_id, APOLOGY).await?;
            }
        }
        Err(ServiceError::Denied(denial)) => {
            bot.send_message(chat_id, denial_text(denial, state.daily_quota))
                .await?;
        }
        Err(e) => {
            if !matches!(e, ServiceError::Upstream(..)) {
                log::error!("Enhancement failed for user {}: {}", submission.user_id, e);
            }
            bot.send_message(chat_id, APOLOGY).await?;
        }
    }

    Ok(())
}

async fn deliver(bot: &Bot, chat_id: ChatId, enhanced: &EnhancedPhoto) -> anyhow::Result<()> {
    let photo = url::Url::parse(&enhanced.url)?;
    let keyboard = InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback(
            "📥 Download",
            format!("{}{}", DOWNLOAD_PREFIX, enhanced.token),
        ),
        InlineKeyboardButton::callback(
            "🔗 Get Link",
            format!("{}{}", LINK_PREFIX, enhanced.token),
        ),
    ]]);

    bot.send_photo(chat_id, InputFile::url(photo))
        .caption("✨ Your enhanced photo is ready!")
        .reply_markup(keyboard)
        .await?;

    Ok(())
}

async fn callback_handler(bot: Bot, q: CallbackQuery, state: Arc<BotState>) -> anyhow::Result<()> {
    let user_id = q.from.id.0 as i64;
    let chat_id = q
        .message
        .as_ref()
        .map(|message| message.chat().id)
        .unwrap_or(ChatId(user_id));

    let Some(callback) = q.data.as_deref().and_then(Callback::parse) else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };

    match callback {
        Callback::MyCredits => {
            bot.answer_callback_query(q.id.clone()).await?;
            show_credits(&bot, &state, chat_id, user_id).await?;
        }
        Callback::Admin(action) => {
            bot.answer_callback_query(q.id.clone()).await?;
            match state.admin.select(user_id, action).await {
                Ok(Some(outcome)) => {
                    bot.send_message(chat_id, admin_text(&outcome)).await?;
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!("Admin action {:?} failed: {}", action, e);
                    bot.send_message(chat_id, APOLOGY).await?;
                }
            }
        }
        Callback::Download(token) => {
            bot.answer_callback_query(q.id.clone())
                .text("📥 Preparing download...")
                .await?;
            match state.pipeline.download_url(user_id, token) {
                Ok(url) => {
                    let document = InputFile::url(url::Url::parse(&url)?).file_name(DOWNLOAD_NAME);
                    bot.send_document(chat_id, document).await?;
                }
                Err(_) => {
                    bot.send_message(chat_id, LINK_EXPIRED).await?;
                }
            }
        }
        Callback::GetLink(token) => {
            bot.answer_callback_query(q.id.clone())
                .text("🔗 Creating link...")
                .await?;
            match state.pipeline.direct_link(user_id, token).await {
                Ok(link) => {
                    let keyboard = InlineKeyboardMarkup::new(vec![vec![
                        InlineKeyboardButton::url("🌐 Open in Browser", url::Url::parse(&link)?),
                    ]]);
                    bot.send_message(chat_id, format!("🔗 Direct Link:\n{}", link))
                        .reply_markup(keyboard)
                        .await?;
                }
                Err(ServiceError::LinkExpired) => {
                    bot.send_message(chat_id, LINK_EXPIRED).await?;
                }
                Err(_) => {
                    bot.send_message(chat_id, APOLOGY).await?;
                }
            }
        }
    }

    Ok(())
}

async fn admin_panel(
    bot: &Bot,
    state: &BotState,
    chat_id: ChatId,
    user_id: i64,
) -> anyhow::Result<()> {
    if !state.admin.is_operator(user_id) {
        bot.send_message(chat_id, NO_PERMISSION).await?;
        return Ok(());
    }

    let rows = [
        ("📊 Stats", AdminAction::Stats),
        ("📢 Broadcast", AdminAction::Broadcast),
        ("➕ Add Credit", AdminAction::AddCredit),
        ("➖ Remove Credit", AdminAction::RemoveCredit),
    ]
    .into_iter()
    .map(|(label, action)| vec![InlineKeyboardButton::callback(label, action.callback_data())])
    .collect::<Vec<_>>();

    bot.send_message(chat_id, "🛠 Admin Panel")
        .reply_markup(InlineKeyboardMarkup::new(rows))
        .await?;
    Ok(())
}

async fn admin_reply(
    bot: &Bot,
    state: &BotState,
    chat_id: ChatId,
    user_id: i64,
    text: &str,
) -> anyhow::Result<()> {
    match state.admin.handle_reply(user_id, text).await {
        Ok(Some(outcome)) => {
            bot.send_message(chat_id, admin_text(&outcome)).await?;
        }
        Ok(None) => {}
        Err(e) => {
            log::error!("Admin reply failed: {}", e);
            bot.send_message(chat_id, APOLOGY).await?;
        }
    }

    Ok(())
}

fn start_text(created: bool, name: &str, credits: i32, daily_quota: i32, link: &str) -> String {
    let greeting = if created {
        "👋 Hello"
    } else {
        "👋 Welcome back"
    };

    format!(
        "{} {}!\n\nYou have {} credits ({} free enhancements every day).\n\nYour referral link:\n{}",
        greeting, name, credits, daily_quota, link
    )
}

fn denial_text(denial: Denial, daily_quota: i32) -> String {
    match denial {
        Denial::NotRegistered => "❌ Please send /start first.".to_string(),
        Denial::OutOfCredits => "🚫 You are out of credits!".to_string(),
        Denial::QuotaExhausted => {
            format!("⏳ Today's {} free enhancements are used up!", daily_quota)
        }
    }
}

fn admin_text(outcome: &AdminOutcome) -> String {
    match outcome {
        AdminOutcome::Stats { accounts } => format!("📊 Total users: {}", accounts),
        AdminOutcome::Prompt(PendingKind::Broadcast) => {
            "✉️ Reply with the broadcast message.".to_string()
        }
        AdminOutcome::Prompt(PendingKind::AddCredit) => {
            "Reply with the user ID and credits.\nFormat: 123456789 50".to_string()
        }
        AdminOutcome::Prompt(PendingKind::RemoveCredit) => {
            "Reply with the user ID and credits.\nFormat: 123456789 20".to_string()
        }
        AdminOutcome::BroadcastQueued { recipients } => {
            format!("📤 Sending to {} users...", recipients)
        }
        AdminOutcome::Adjusted {
            kind: PendingKind::RemoveCredit,
            user_id,
            amount,
            balance,
        } => format!(
            "✅ Removed {} credits from {}. Balance: {}",
            amount, user_id, balance
        ),
        AdminOutcome::Adjusted {
            user_id,
            amount,
            balance,
            ..
        } => format!(
            "✅ Added {} credits to {}. Balance: {}",
            amount, user_id, balance
        ),
        AdminOutcome::UserNotFound(user_id) => format!("❌ User {} not found.", user_id),
        AdminOutcome::BadInput(PendingKind::Broadcast) => {
            "Send the broadcast as text, or /cancel.".to_string()
        }
        AdminOutcome::BadInput(_) => "Format: <user id> <amount>, or /cancel.".to_string(),
    }
}
