use async_trait::async_trait;

use crate::{
    domain::{ChatId, MemberStatus, MessageRef, UserId},
    messaging::types::{CallbackAnswer, SendOptions},
    Result,
};

/// Outbound channel capability used by the dispatcher, commands and reporter.
///
/// Every call is fallible; callers decide whether a failure is logged and
/// swallowed (deliveries) or surfaced (lookups feeding authorization).
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        options: SendOptions,
    ) -> Result<MessageRef>;

    async fn answer_callback_query(&self, callback_id: &str, answer: CallbackAnswer)
        -> Result<()>;

    async fn get_chat_member_count(&self, chat_id: ChatId) -> Result<u32>;

    async fn get_chat_member(&self, chat_id: ChatId, user_id: UserId) -> Result<MemberStatus>;
}
