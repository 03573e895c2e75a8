//! Placeholder-to-durable conversation resolution

use crate::{
    model::{is_durable_id, ConversationSummary},
    services::{first_settled, ConversationDirectory, ServiceResult},
};
use tracing::{debug, warn};

/// Find the durable conversation shared with `recipient_id`
pub fn find_conversation_for<'a>(
    summaries: &'a [ConversationSummary],
    recipient_id: &str,
) -> Option<&'a ConversationSummary> {
    summaries.iter().find(|summary| {
        is_durable_id(&summary.conversation_id)
            && summary.participant_user_id.as_deref() == Some(recipient_id)
    })
}

/// Look up the conversation between `user_id` and `recipient_id`
///
/// Only the first settled directory snapshot is inspected. A miss or a
/// directory error is logged and reported as `None`.
pub async fn resolve_conversation_id(
    directory: &dyn ConversationDirectory,
    user_id: &str,
    recipient_id: &str,
) -> Option<String> {
    match first_settled(directory.list(user_id)).await {
        ServiceResult::Success(summaries) => {
            let found = find_conversation_for(&summaries, recipient_id)
                .map(|summary| summary.conversation_id.clone());
            if found.is_none() {
                debug!(
                    "No conversation with {} among {} directory entries",
                    recipient_id,
                    summaries.len()
                );
            }
            found
        }
        ServiceResult::Error(e) => {
            warn!("Directory lookup for {} failed: {}", user_id, e);
            None
        }
        ServiceResult::Loading => None,
    }
}
