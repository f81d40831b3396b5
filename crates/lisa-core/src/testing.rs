//! Test fakes shared by this crate's tests and (via the `testing` feature)
//! by downstream crates.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, ChatKind, MemberStatus, MessageId, MessageRef, Sender, UserId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{CallbackAnswer, ChatInfo, IncomingMessage, SendOptions},
    },
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub text: String,
    pub options: SendOptions,
}

/// MessagingPort that records every call and can be told to fail.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<SentMessage>>,
    answers: Mutex<Vec<(String, CallbackAnswer)>>,
    failing_chats: Mutex<HashSet<ChatId>>,
    fail_all_sends: AtomicBool,
    statuses: Mutex<HashMap<UserId, MemberStatus>>,
    fail_lookups: AtomicBool,
    lookups: AtomicUsize,
    member_count: Mutex<Option<u32>>,
    next_id: AtomicI32,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self {
            member_count: Mutex::new(Some(42)),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_for(&self, chat_id: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|m| m.chat_id == chat_id)
            .map(|m| m.text)
            .collect()
    }

    pub fn answers(&self) -> Vec<(String, CallbackAnswer)> {
        self.answers.lock().unwrap().clone()
    }

    pub fn fail_sends_to(&self, chat_id: ChatId) {
        self.failing_chats.lock().unwrap().insert(chat_id);
    }

    pub fn fail_all_sends(&self) {
        self.fail_all_sends.store(true, Ordering::SeqCst);
    }

    pub fn set_member_status(&self, user_id: UserId, status: MemberStatus) {
        self.statuses.lock().unwrap().insert(user_id, status);
    }

    pub fn fail_member_lookups(&self) {
        self.fail_lookups.store(true, Ordering::SeqCst);
    }

    pub fn member_lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// `None` makes `get_chat_member_count` fail.
    pub fn set_member_count(&self, count: Option<u32>) {
        *self.member_count.lock().unwrap() = count;
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        options: SendOptions,
    ) -> Result<MessageRef> {
        if self.fail_all_sends.load(Ordering::SeqCst)
            || self.failing_chats.lock().unwrap().contains(&chat_id)
        {
            return Err(Error::External(format!("simulated send failure to {}", chat_id.0)));
        }
        self.sent.lock().unwrap().push(SentMessage {
            chat_id,
            text: text.to_string(),
            options,
        });
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(id),
        })
    }

    async fn answer_callback_query(
        &self,
        callback_id: &str,
        answer: CallbackAnswer,
    ) -> Result<()> {
        if self.fail_all_sends.load(Ordering::SeqCst) {
            return Err(Error::External("simulated callback answer failure".to_string()));
        }
        self.answers
            .lock()
            .unwrap()
            .push((callback_id.to_string(), answer));
        Ok(())
    }

    async fn get_chat_member_count(&self, chat_id: ChatId) -> Result<u32> {
        self.member_count
            .lock()
            .unwrap()
            .ok_or_else(|| Error::External(format!("no member count for {}", chat_id.0)))
    }

    async fn get_chat_member(&self, _chat_id: ChatId, user_id: UserId) -> Result<MemberStatus> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(Error::External("simulated membership lookup failure".to_string()));
        }
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(&user_id)
            .copied()
            .unwrap_or(MemberStatus::Member))
    }
}

pub fn sender(id: i64, username: &str) -> Sender {
    Sender {
        id: UserId(id),
        username: Some(username.to_string()),
        first_name: username.to_string(),
        is_bot: false,
    }
}

pub fn private_chat(id: i64) -> ChatInfo {
    ChatInfo {
        id: ChatId(id),
        kind: ChatKind::Private,
        title: None,
    }
}

pub fn group_chat(id: i64, title: &str) -> ChatInfo {
    ChatInfo {
        id: ChatId(id),
        kind: ChatKind::Supergroup,
        title: Some(title.to_string()),
    }
}

pub fn text_message(chat: ChatInfo, from: Sender, text: &str) -> IncomingMessage {
    IncomingMessage {
        chat,
        from,
        text: Some(text.to_string()),
    }
}
