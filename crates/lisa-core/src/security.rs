use crate::{
    domain::{ChatKind, UserId},
    messaging::{port::MessagingPort, types::ChatInfo},
};

// ============== Authorization ==============

/// Owner check against the configured allow-set. An empty set has no owners.
pub fn is_owner(user_id: UserId, owner_ids: &[i64]) -> bool {
    owner_ids.contains(&user_id.0)
}

/// Admin gate: private chats always pass; elsewhere the sender's membership
/// must resolve to creator/administrator. A failed lookup does not pass.
pub async fn is_chat_admin(messenger: &dyn MessagingPort, chat: &ChatInfo, user_id: UserId) -> bool {
    if chat.kind == ChatKind::Private {
        return true;
    }

    match messenger.get_chat_member(chat.id, user_id).await {
        Ok(status) => status.is_admin(),
        Err(e) => {
            tracing::warn!(chat_id = chat.id.0, user_id = user_id.0, "membership lookup failed: {e}");
            false
        }
    }
}
