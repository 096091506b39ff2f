//! Response orchestration: session continuity and the two-phase reply.
//!
//! Per message: resolve the thread's conversation mapping, gate unaddressed
//! chatter, post a placeholder, call the backend, persist a new mapping,
//! overwrite the placeholder with the answer (or a marked error). Errors
//! never propagate to the webhook path; the unit either finishes or ends
//! with a log line.

use crate::classifier::NormalizedMessage;
use crate::dify::ConversationClient;
use crate::slack::ChatClient;
use crate::store::SessionStore;
use std::sync::Arc;
use std::time::Duration;

/// Interim message posted before the backend call so the user sees an
/// immediate acknowledgment.
pub const PLACEHOLDER_TEXT: &str = "🤖 _thinking..._";
/// Prefix for the final answer (success or fallback).
pub const REPLY_PREFIX: &str = "💡 ";
/// Shown when the backend succeeds but returns no usable answer text.
pub const EMPTY_ANSWER_TEXT: &str = "⚠️ sorry, I could not produce a response.";
/// Prefix for a backend failure; the failure description is appended.
pub const BACKEND_ERROR_PREFIX: &str = "❌ backend error: ";

/// Drives one message from classification output to the final in-thread reply.
pub struct Orchestrator {
    store: Arc<dyn SessionStore>,
    chat: Arc<dyn ChatClient>,
    backend: Arc<dyn ConversationClient>,
    session_ttl: Duration,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        chat: Arc<dyn ChatClient>,
        backend: Arc<dyn ConversationClient>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            store,
            chat,
            backend,
            session_ttl,
        }
    }

    /// Process one normalized message to completion. Fire-and-forget: every
    /// failure is handled here (fallback text or an early end), never returned.
    pub async fn handle(&self, msg: NormalizedMessage) {
        // A store read failure degrades to "no mapping" rather than dropping
        // the message; the thread then starts a fresh conversation.
        let conversation_id = match self.store.get(&msg.thread_ts).await {
            Ok(id) => id,
            Err(e) => {
                log::warn!("orchestrator: session lookup failed: {}", e);
                None
            }
        };

        // Continuation gate: unaddressed channel chatter is only processed in
        // threads the bot has already joined (an existing mapping).
        if !(msg.is_mention || msg.is_direct_message) && conversation_id.is_none() {
            log::debug!(
                "orchestrator: dropping unaddressed message in thread {}",
                msg.thread_ts
            );
            return;
        }

        log::info!(
            "orchestrator: thread {} conversation {:?}",
            msg.thread_ts,
            conversation_id
        );

        // Placeholder first; its ts is the target of the final overwrite.
        let placeholder_ts = match self
            .chat
            .post_message(&msg.channel_id, &msg.thread_ts, PLACEHOLDER_TEXT)
            .await
        {
            Ok(ts) => ts,
            Err(e) => {
                log::warn!("orchestrator: placeholder post failed: {}", e);
                return;
            }
        };

        let answer = match self
            .backend
            .send(&msg.text, &msg.user_id, conversation_id.as_deref())
            .await
        {
            Ok(reply) => {
                if conversation_id.is_none() {
                    if let Some(ref new_id) = reply.conversation_id {
                        log::info!(
                            "orchestrator: storing mapping {} -> {}",
                            msg.thread_ts,
                            new_id
                        );
                        if let Err(e) = self
                            .store
                            .put(&msg.thread_ts, new_id, self.session_ttl)
                            .await
                        {
                            log::warn!("orchestrator: session store write failed: {}", e);
                        }
                    }
                }
                match reply.answer.filter(|a| !a.is_empty()) {
                    Some(a) => a,
                    None => EMPTY_ANSWER_TEXT.to_string(),
                }
            }
            Err(e) => {
                log::warn!("orchestrator: backend call failed: {}", e);
                format!("{}{}", BACKEND_ERROR_PREFIX, e)
            }
        };

        let text = format!("{}{}", REPLY_PREFIX, answer);
        if let Err(e) = self
            .chat
            .update_message(&msg.channel_id, &placeholder_ts, &text)
            .await
        {
            // Accepted: the placeholder is orphaned, no cleanup or retry.
            log::warn!("orchestrator: final update failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dify::{ConversationReply, DifyError};
    use crate::slack::SlackError;
    use crate::store::MemorySessionStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeChat {
        posts: Mutex<Vec<(String, String, String)>>,
        updates: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl ChatClient for FakeChat {
        async fn post_message(
            &self,
            channel: &str,
            thread_ts: &str,
            text: &str,
        ) -> Result<String, SlackError> {
            let mut posts = self.posts.lock().unwrap();
            let ts = format!("ph-{}", posts.len() + 1);
            posts.push((channel.to_string(), thread_ts.to_string(), text.to_string()));
            Ok(ts)
        }

        async fn update_message(
            &self,
            channel: &str,
            ts: &str,
            text: &str,
        ) -> Result<(), SlackError> {
            self.updates
                .lock()
                .unwrap()
                .push((channel.to_string(), ts.to_string(), text.to_string()));
            Ok(())
        }
    }

    struct FakeBackend {
        reply: Result<ConversationReply, String>,
        calls: Mutex<Vec<(String, String, Option<String>)>>,
    }

    impl FakeBackend {
        fn replying(answer: &str, conversation_id: &str) -> Self {
            Self {
                reply: Ok(ConversationReply {
                    answer: Some(answer.to_string()),
                    conversation_id: Some(conversation_id.to_string()),
                }),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ConversationClient for FakeBackend {
        async fn send(
            &self,
            query: &str,
            user: &str,
            conversation_id: Option<&str>,
        ) -> Result<ConversationReply, DifyError> {
            self.calls.lock().unwrap().push((
                query.to_string(),
                user.to_string(),
                conversation_id.map(str::to_string),
            ));
            match &self.reply {
                Ok(r) => Ok(r.clone()),
                Err(m) => Err(DifyError::Api(m.clone())),
            }
        }
    }

    fn message(is_mention: bool, is_dm: bool) -> NormalizedMessage {
        NormalizedMessage {
            channel_id: "C1".to_string(),
            user_id: "U1".to_string(),
            thread_ts: "111.222".to_string(),
            text: "hello".to_string(),
            is_mention,
            is_direct_message: is_dm,
        }
    }

    fn orchestrator(
        store: Arc<dyn SessionStore>,
        chat: Arc<FakeChat>,
        backend: Arc<FakeBackend>,
    ) -> Orchestrator {
        Orchestrator::new(store, chat, backend, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn unaddressed_message_without_mapping_is_dropped() {
        let chat = Arc::new(FakeChat::default());
        let backend = Arc::new(FakeBackend::replying("hi", "S1"));
        let orch = orchestrator(Arc::new(MemorySessionStore::new()), chat.clone(), backend.clone());

        orch.handle(message(false, false)).await;

        assert!(chat.posts.lock().unwrap().is_empty());
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mention_runs_full_two_phase_flow_and_stores_mapping() {
        let store = Arc::new(MemorySessionStore::new());
        let chat = Arc::new(FakeChat::default());
        let backend = Arc::new(FakeBackend::replying("hi", "S1"));
        let orch = orchestrator(store.clone(), chat.clone(), backend.clone());

        orch.handle(message(true, false)).await;

        let posts = chat.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "C1");
        assert_eq!(posts[0].1, "111.222");
        assert_eq!(posts[0].2, PLACEHOLDER_TEXT);

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "hello");
        assert_eq!(calls[0].1, "U1");
        assert_eq!(calls[0].2, None);

        let updates = chat.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        // Overwrite targets the ts returned by this unit's placeholder post.
        assert_eq!(updates[0].1, "ph-1");
        assert_eq!(updates[0].2, format!("{}hi", REPLY_PREFIX));

        assert_eq!(
            store.get("111.222").await.expect("get"),
            Some("S1".to_string())
        );
    }

    #[tokio::test]
    async fn existing_mapping_is_forwarded_and_left_untouched() {
        let store = Arc::new(MemorySessionStore::new());
        store
            .put("111.222", "S1", Duration::from_secs(60))
            .await
            .expect("put");
        let chat = Arc::new(FakeChat::default());
        let backend = Arc::new(FakeBackend::replying("again", "S2"));
        let orch = orchestrator(store.clone(), chat.clone(), backend.clone());

        // Plain message, no mention: processed because the mapping exists.
        orch.handle(message(false, false)).await;

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls[0].2.as_deref(), Some("S1"));
        // The backend's S2 does not replace the live mapping.
        assert_eq!(
            store.get("111.222").await.expect("get"),
            Some("S1".to_string())
        );
        assert_eq!(chat.updates.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn direct_message_is_processed_without_mapping() {
        let chat = Arc::new(FakeChat::default());
        let backend = Arc::new(FakeBackend::replying("hi", "S1"));
        let orch = orchestrator(Arc::new(MemorySessionStore::new()), chat.clone(), backend.clone());

        orch.handle(message(false, true)).await;

        assert_eq!(chat.posts.lock().unwrap().len(), 1);
        assert_eq!(backend.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn session_round_trip_across_turns() {
        let store = Arc::new(MemorySessionStore::new());
        let chat = Arc::new(FakeChat::default());
        let backend = Arc::new(FakeBackend::replying("hi", "S1"));
        let orch = orchestrator(store.clone(), chat.clone(), backend.clone());

        orch.handle(message(true, false)).await;
        orch.handle(message(false, false)).await;

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].2, None);
        assert_eq!(calls[1].2.as_deref(), Some("S1"));
    }

    #[tokio::test]
    async fn backend_failure_yields_marked_error_and_no_mapping() {
        let store = Arc::new(MemorySessionStore::new());
        let chat = Arc::new(FakeChat::default());
        let backend = Arc::new(FakeBackend::failing("connection refused"));
        let orch = orchestrator(store.clone(), chat.clone(), backend.clone());

        orch.handle(message(true, false)).await;

        let updates = chat.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].2.starts_with(REPLY_PREFIX));
        assert!(updates[0].2.contains(BACKEND_ERROR_PREFIX));
        assert!(updates[0].2.contains("connection refused"));
        assert_eq!(store.get("111.222").await.expect("get"), None);
    }

    #[tokio::test]
    async fn empty_answer_falls_back_to_apology() {
        let chat = Arc::new(FakeChat::default());
        let backend = Arc::new(FakeBackend {
            reply: Ok(ConversationReply {
                answer: None,
                conversation_id: Some("S1".to_string()),
            }),
            calls: Mutex::new(Vec::new()),
        });
        let orch = orchestrator(Arc::new(MemorySessionStore::new()), chat.clone(), backend.clone());

        orch.handle(message(true, false)).await;

        let updates = chat.updates.lock().unwrap();
        assert_eq!(updates[0].2, format!("{}{}", REPLY_PREFIX, EMPTY_ANSWER_TEXT));
    }

    #[tokio::test]
    async fn expired_mapping_starts_a_fresh_conversation() {
        let store = Arc::new(MemorySessionStore::new());
        store
            .put("111.222", "S-old", Duration::from_millis(10))
            .await
            .expect("put");
        tokio::time::sleep(Duration::from_millis(30)).await;

        let chat = Arc::new(FakeChat::default());
        let backend = Arc::new(FakeBackend::replying("hi", "S-new"));
        let orch = orchestrator(store.clone(), chat.clone(), backend.clone());

        orch.handle(message(true, false)).await;

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls[0].2, None);
        assert_eq!(
            store.get("111.222").await.expect("get"),
            Some("S-new".to_string())
        );
    }
}
