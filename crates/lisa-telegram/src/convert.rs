//! teloxide update types → `InboundEvent`.

use teloxide::types::{CallbackQuery as TgCallbackQuery, Chat, Message, User};

use lisa_core::{
    domain::{ChatId, ChatKind, Sender, UserId},
    messaging::types::{
        CallbackQuery, ChatInfo, InboundEvent, IncomingMessage, MemberLeft, MembersJoined,
    },
};

pub fn sender(user: &User) -> Sender {
    Sender {
        id: UserId(user.id.0 as i64),
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        is_bot: user.is_bot,
    }
}

pub fn chat_info(chat: &Chat) -> ChatInfo {
    let kind = if chat.is_private() {
        ChatKind::Private
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else if chat.is_group() {
        ChatKind::Group
    } else {
        ChatKind::Channel
    };
    ChatInfo {
        id: ChatId(chat.id.0),
        kind,
        title: chat.title().map(str::to_string),
    }
}

/// Membership service messages take precedence; anything else with a sender
/// is a regular message. Sender-less messages (channel posts) are dropped.
pub fn event_from_message(msg: &Message) -> Option<InboundEvent> {
    let chat = chat_info(&msg.chat);

    if let Some(members) = msg.new_chat_members() {
        return Some(InboundEvent::MembersJoined(MembersJoined {
            chat,
            from: msg.from().map(sender),
            members: members.iter().map(sender).collect(),
        }));
    }

    if let Some(member) = msg.left_chat_member() {
        return Some(InboundEvent::MemberLeft(MemberLeft {
            chat,
            from: msg.from().map(sender),
            member: sender(member),
        }));
    }

    let from = msg.from()?;
    Some(InboundEvent::Message(IncomingMessage {
        chat,
        from: sender(from),
        text: msg.text().or_else(|| msg.caption()).map(str::to_string),
    }))
}

pub fn event_from_callback(q: &TgCallbackQuery) -> InboundEvent {
    InboundEvent::Callback(CallbackQuery {
        callback_id: q.id.clone(),
        from: sender(&q.from),
        chat: q.message.as_ref().map(|m| chat_info(&m.chat)),
        data: q.data.clone().unwrap_or_default(),
    })
}
