use std::collections::BTreeSet;
use std::sync::Arc;

use crate::chat::store::ConversationStore;
use crate::chat::subscription::Subscription;
use crate::common::{Conversation, ConversationSummary, ParticipantRef};
use crate::error::Result;
use crate::storage::ProfileDirectory;
use crate::storage::models::ConversationDocument;

/// Render-ready list of the viewer's conversations with counterpart
/// names and avatars joined in.
#[derive(Clone)]
pub struct ConversationListView {
    store: ConversationStore,
    profiles: Arc<dyn ProfileDirectory>,
    buffer: usize,
}

impl ConversationListView {
    pub fn new(store: ConversationStore, profiles: Arc<dyn ProfileDirectory>, buffer: usize) -> Self {
        Self {
            store,
            profiles,
            buffer,
        }
    }

    /// One-shot list.
    pub async fn snapshot(&self, viewer_id: &str) -> Result<Vec<ConversationSummary>> {
        let docs = self.store.conversations_for_user(viewer_id).await?;
        build_summaries(viewer_id, docs, self.profiles.as_ref()).await
    }

    /// Live list, re-emitted whenever one of the viewer's conversations changes.
    pub fn subscribe(&self, viewer_id: &str) -> Subscription<Vec<ConversationSummary>> {
        let mut conversations = self.store.list_conversations_for_user(viewer_id);
        let profiles = Arc::clone(&self.profiles);
        let viewer = viewer_id.to_string();

        Subscription::spawn(self.buffer, move |sender| async move {
            while let Some(snapshot) = conversations.next().await {
                let summaries = match snapshot {
                    Ok(docs) => build_summaries(&viewer, docs, profiles.as_ref()).await,
                    Err(err) => Err(err),
                };
                let failed = summaries.is_err();
                if sender.send(summaries).await.is_err() || failed {
                    break;
                }
            }
            // `conversations` drops here and stops its producer
        })
    }
}

/// Validate documents, resolve every distinct counterpart in one lookup and
/// sort by most recent activity.
pub async fn build_summaries(
    viewer_id: &str,
    docs: Vec<ConversationDocument>,
    profiles: &dyn ProfileDirectory,
) -> Result<Vec<ConversationSummary>> {
    let conversations: Vec<Conversation> = docs
        .into_iter()
        .filter_map(|doc| match Conversation::try_from(doc) {
            Ok(conv) if conv.has_participant(viewer_id) => Some(conv),
            Ok(conv) => {
                log::warn!("Conversation {} does not include {viewer_id}", conv.key);
                None
            }
            Err(err) => {
                log::warn!("Skipping conversation: {err}");
                None
            }
        })
        .collect();

    let counterparts: Vec<String> = conversations
        .iter()
        .filter_map(|conv| conv.counterpart_of(viewer_id))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let directory = if counterparts.is_empty() {
        Default::default()
    } else {
        profiles.lookup(&counterparts).await?
    };

    let mut summaries: Vec<ConversationSummary> = conversations
        .into_iter()
        .filter_map(|conv| {
            let counterpart_id = conv.counterpart_of(viewer_id)?.to_string();
            let profile = directory.get(&counterpart_id);
            if profile.is_none() {
                log::debug!("No profile for {counterpart_id}; showing id");
            }
            Some(ConversationSummary {
                counterpart: ParticipantRef::from_profile(&counterpart_id, profile),
                unread: conv.unread_for(viewer_id),
                last_activity: conv.last_activity(),
                last_message: conv.last_message,
                key: conv.key,
            })
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.last_activity
            .cmp(&a.last_activity)
            .then_with(|| a.key.cmp(&b.key))
    });
    Ok(summaries)
}
