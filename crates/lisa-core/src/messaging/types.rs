use crate::domain::{ChatId, ChatKind, Sender};

/// Inbound event model, already stripped of Telegram-specific types.
#[derive(Clone, Debug)]
pub enum InboundEvent {
    Message(IncomingMessage),
    Callback(CallbackQuery),
    MembersJoined(MembersJoined),
    MemberLeft(MemberLeft),
}

/// Chat an event belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatInfo {
    pub id: ChatId,
    pub kind: ChatKind,
    pub title: Option<String>,
}

impl ChatInfo {
    pub fn title_or_default(&self) -> String {
        self.title.clone().unwrap_or_else(|| "this group".to_string())
    }
}

/// Any user-authored message (text or not).
#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub chat: ChatInfo,
    pub from: Sender,
    pub text: Option<String>,
}

#[derive(Clone, Debug)]
pub struct CallbackQuery {
    pub callback_id: String,
    pub from: Sender,
    /// Chat of the message carrying the inline keyboard, if still available.
    pub chat: Option<ChatInfo>,
    pub data: String,
}

#[derive(Clone, Debug)]
pub struct MembersJoined {
    pub chat: ChatInfo,
    /// Who posted the service message (the inviter, or the joiner themself).
    pub from: Option<Sender>,
    pub members: Vec<Sender>,
}

/// `left_chat_member` / `left_chat_participant`.
#[derive(Clone, Debug)]
pub struct MemberLeft {
    pub chat: ChatInfo,
    /// Who triggered the update (the remover when the bot is kicked).
    pub from: Option<Sender>,
    pub member: Sender,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseMode {
    Html,
}

/// Options for `send_message`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub parse_mode: Option<ParseMode>,
    pub keyboard: Option<InlineKeyboard>,
}

impl SendOptions {
    pub fn html() -> Self {
        Self {
            parse_mode: Some(ParseMode::Html),
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Options for `answer_callback_query`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallbackAnswer {
    pub text: Option<String>,
    pub show_alert: bool,
}

impl CallbackAnswer {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            show_alert: false,
        }
    }

    pub fn alert(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            show_alert: true,
        }
    }
}

/// Inline keyboard laid out in rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub action: ButtonAction,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ButtonAction {
    /// `command:arg:arg` payload routed back through the dispatcher.
    Callback(String),
    Url(String),
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }
}

impl InlineButton {
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Callback(data.into()),
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Url(url.into()),
        }
    }
}
