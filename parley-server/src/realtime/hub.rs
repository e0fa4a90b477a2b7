//! Room and broadcast engine.
//!
//! Drives the per-session state machine: connect, join a room, exchange
//! messages and typing signals, acknowledge seen-state, leave. The hub
//! owns the presence registry and writes through the [`ChatStore`] seam;
//! it never touches the transport, only the per-connection channels.
//!
//! Fan-out always snapshots the audience first and delivers outside the
//! registry lock. Ephemeral events (typing, notices) are dropped when a
//! receiver's buffer is full; everything else waits for space.

use std::sync::Arc;

use metrics::{counter, gauge};
use shared::models::{ClientEvent, NewMessage, ServerEvent};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::services::chat_store::SharedChatStore;

use super::presence::{ConnectionHandle, PresenceRegistry, SessionId};

pub type SharedChatHub = Arc<ChatHub>;

pub struct ChatHub {
    registry: PresenceRegistry,
    store: SharedChatStore,
}

impl std::fmt::Debug for ChatHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatHub")
            .field("registry", &self.registry)
            .finish()
    }
}

impl ChatHub {
    pub fn new(store: SharedChatStore) -> Self {
        Self {
            registry: PresenceRegistry::new(),
            store,
        }
    }

    /// Registers a connection and broadcasts the updated roster.
    ///
    /// When the user already had a live session, the old connection gets
    /// a final error frame and its handle is dropped, which closes its
    /// channel and lets the old socket task shut down.
    pub async fn connect(&self, user_id: Uuid, handle: ConnectionHandle) -> SessionId {
        let (session, evicted) = self.registry.connect(user_id, handle).await;

        if let Some(old) = evicted {
            counter!("parley_sessions_evicted_total").increment(1);
            let _ = old
                .send(ServerEvent::Error {
                    message: "chat opened in another session; this one is disconnected".into(),
                })
                .await;
        }

        debug!(%user_id, session, "user connected");
        self.broadcast_roster().await;
        session
    }

    /// Removes the session (if it is still the live one for the user)
    /// and broadcasts the updated roster.
    pub async fn disconnect(&self, user_id: Uuid, session: SessionId) {
        if self.registry.disconnect(user_id, session).await {
            debug!(%user_id, session, "user disconnected");
            self.broadcast_roster().await;
        }
    }

    /// Routes one protocol event from an established session.
    pub async fn dispatch(&self, user_id: Uuid, session: SessionId, event: ClientEvent) {
        match event {
            // Consumed during session setup; a repeat mid-session is
            // ignored rather than re-registering.
            ClientEvent::UserConnected { .. } => {}
            ClientEvent::JoinConversation { conversation_id } => {
                self.join_conversation(user_id, conversation_id).await;
            }
            ClientEvent::MessageSeen => {
                if let Some(conversation_id) = self.registry.current_room(user_id).await {
                    self.mark_seen(user_id, conversation_id).await;
                }
            }
            ClientEvent::StartTyping => {
                if let Some(conversation_id) = self.registry.current_room(user_id).await {
                    self.typing(user_id, conversation_id, true).await;
                }
            }
            ClientEvent::StopTyping => {
                if let Some(conversation_id) = self.registry.current_room(user_id).await {
                    self.typing(user_id, conversation_id, false).await;
                }
            }
            ClientEvent::SendMessage {
                sender,
                receiver,
                conversation,
                body,
            } => {
                self.send_message(sender, receiver, conversation, body).await;
            }
            ClientEvent::LeftConversation { conversation_id } => {
                self.leave_conversation(user_id, session, conversation_id).await;
            }
        }
    }

    /// Moves the user into the conversation's room, then tells everyone
    /// where everyone is and tells the room to re-fetch its messages.
    async fn join_conversation(&self, user_id: Uuid, conversation_id: Uuid) {
        if !self.registry.join(user_id, conversation_id).await {
            warn!(%user_id, "join from a user with no presence entry");
            return;
        }

        self.broadcast_roster().await;
        self.broadcast_room(conversation_id, &ServerEvent::GetChatMessages)
            .await;
    }

    /// Persists a message and fans it out to the room.
    ///
    /// The seen hint is read from room occupancy before the write: with
    /// both participants present the receiver will render the message
    /// immediately, so it is stored already seen. With only the sender
    /// present it is stored unseen and the sender gets a private notice.
    async fn send_message(&self, sender: Uuid, receiver: Uuid, conversation: Uuid, body: String) {
        let occupancy = self.registry.occupancy(conversation).await;
        let new_message = NewMessage {
            sender_id: sender,
            receiver_id: receiver,
            conversation_id: conversation,
            body,
            seen: occupancy > 1,
        };

        match self.store.append(new_message).await {
            Ok(message) => {
                counter!("parley_messages_sent_total").increment(1);
                self.broadcast_room(conversation, &ServerEvent::MessageSent { message })
                    .await;

                if occupancy == 1 {
                    if let Some(handle) = self.registry.handle_of(sender).await {
                        deliver(
                            &handle,
                            ServerEvent::Notice {
                                message: "for your eyes only".into(),
                            },
                        )
                        .await;
                    }
                }
            }
            Err(error) => {
                counter!("parley_message_failures_total").increment(1);
                warn!(%sender, %conversation, %error, "failed to persist message");
                self.broadcast_room(
                    conversation,
                    &ServerEvent::Error {
                        message: "an error occurred while sending the message".into(),
                    },
                )
                .await;
            }
        }
    }

    /// Flips seen-state for the caller's unread messages in the room,
    /// then tells the whole room to re-fetch so both sides converge.
    async fn mark_seen(&self, user_id: Uuid, conversation_id: Uuid) {
        match self.store.mark_seen(conversation_id, user_id).await {
            Ok(updated) => {
                debug!(%user_id, %conversation_id, updated, "marked messages seen");
                self.broadcast_room(conversation_id, &ServerEvent::GetChatMessages)
                    .await;
            }
            Err(error) => {
                warn!(%user_id, %conversation_id, %error, "failed to mark messages seen");
            }
        }
    }

    /// Typing signals go to every room member except the typist.
    async fn typing(&self, user_id: Uuid, conversation_id: Uuid, active: bool) {
        self.broadcast_room_except(conversation_id, user_id, &ServerEvent::Typing { active })
            .await;
    }

    /// Leaving a conversation ends the session: the room sees typing
    /// stop, the entry is removed, and the roster is rebroadcast.
    async fn leave_conversation(&self, user_id: Uuid, session: SessionId, conversation_id: Uuid) {
        self.registry.leave(user_id).await;
        self.broadcast_room_except(
            conversation_id,
            user_id,
            &ServerEvent::Typing { active: false },
        )
        .await;
        self.disconnect(user_id, session).await;
    }

    async fn broadcast_roster(&self) {
        let snapshot = self.registry.snapshot().await;
        gauge!("parley_connected_users").set(snapshot.len() as f64);

        let event = ServerEvent::UserData { users: snapshot };
        for handle in self.registry.all_handles().await {
            deliver(&handle, event.clone()).await;
        }
    }

    async fn broadcast_room(&self, conversation_id: Uuid, event: &ServerEvent) {
        for (_, handle) in self.registry.room_members(conversation_id).await {
            deliver(&handle, event.clone()).await;
        }
    }

    async fn broadcast_room_except(&self, conversation_id: Uuid, skip: Uuid, event: &ServerEvent) {
        for (member, handle) in self.registry.room_members(conversation_id).await {
            if member != skip {
                deliver(&handle, event.clone()).await;
            }
        }
    }
}

/// Delivers one event to one connection. A full buffer drops ephemeral
/// events and waits for the rest; a closed channel is ignored, cleanup
/// happens through the socket task's disconnect path.
async fn deliver(handle: &ConnectionHandle, event: ServerEvent) {
    use tokio::sync::mpsc::error::TrySendError;

    match handle.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            if matches!(event, ServerEvent::Typing { .. } | ServerEvent::Notice { .. }) {
                counter!("parley_events_dropped_total").increment(1);
            } else {
                let _ = handle.send(event).await;
            }
        }
        Err(TrySendError::Closed(_)) => {}
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use shared::models::Message;
    use tokio::sync::{Mutex, mpsc};

    use crate::services::{ChatError, ChatResult};
    use crate::services::chat_store::ChatStore;

    use super::*;

    #[derive(Default)]
    struct MemoryStore {
        messages: Mutex<Vec<Message>>,
        fail_writes: AtomicBool,
    }

    impl MemoryStore {
        fn shared() -> Arc<Self> {
            Arc::new(Self::default())
        }

        async fn stored(&self) -> Vec<Message> {
            self.messages.lock().await.clone()
        }
    }

    #[async_trait]
    impl ChatStore for MemoryStore {
        async fn append(&self, message: NewMessage) -> ChatResult<Message> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(ChatError::Unavailable("simulated write failure".into()));
            }

            let now = Utc::now();
            let stored = Message {
                id: Uuid::new_v4(),
                sender_id: message.sender_id,
                receiver_id: message.receiver_id,
                conversation_id: message.conversation_id,
                body: message.body,
                seen: message.seen,
                created_at: now,
                updated_at: now,
            };
            self.messages.lock().await.push(stored.clone());
            Ok(stored)
        }

        async fn mark_seen(&self, conversation_id: Uuid, receiver_id: Uuid) -> ChatResult<u64> {
            let mut messages = self.messages.lock().await;
            let mut updated = 0;
            for message in messages.iter_mut() {
                if message.conversation_id == conversation_id
                    && message.receiver_id == receiver_id
                    && !message.seen
                {
                    message.seen = true;
                    updated += 1;
                }
            }
            Ok(updated)
        }
    }

    async fn connect(hub: &ChatHub, user: Uuid) -> (SessionId, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let session = hub.connect(user, tx).await;
        (session, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn connect_broadcasts_the_roster() {
        let hub = ChatHub::new(MemoryStore::shared());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (_, mut alice_rx) = connect(&hub, alice).await;
        let (_, mut bob_rx) = connect(&hub, bob).await;

        // Alice saw the one-user roster, then the two-user roster.
        let events = drain(&mut alice_rx);
        assert_eq!(events.len(), 2);
        match &events[1] {
            ServerEvent::UserData { users } => {
                assert_eq!(users.len(), 2);
                assert!(users.users.contains_key(&bob));
            }
            other => panic!("expected user-data, got {other:?}"),
        }

        let events = drain(&mut bob_rx);
        assert!(matches!(&events[0], ServerEvent::UserData { users } if users.len() == 2));
    }

    #[tokio::test]
    async fn second_session_evicts_and_closes_the_first() {
        let hub = ChatHub::new(MemoryStore::shared());
        let alice = Uuid::new_v4();

        let (_, mut first_rx) = connect(&hub, alice).await;
        drain(&mut first_rx);
        let (_, mut second_rx) = connect(&hub, alice).await;

        // The old connection gets a final error frame and then closes,
        // because the hub dropped its only sender.
        assert!(matches!(
            first_rx.recv().await,
            Some(ServerEvent::Error { .. })
        ));
        assert!(first_rx.recv().await.is_none());

        assert!(matches!(&drain(&mut second_rx)[0], ServerEvent::UserData { users } if users.len() == 1));
        assert_eq!(hub.registry.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn stale_disconnect_after_eviction_keeps_the_new_session() {
        let hub = ChatHub::new(MemoryStore::shared());
        let alice = Uuid::new_v4();

        let (old_session, _old_rx) = connect(&hub, alice).await;
        let (_, _new_rx) = connect(&hub, alice).await;

        hub.disconnect(alice, old_session).await;
        assert_eq!(hub.registry.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn join_announces_roster_and_signals_the_room() {
        let hub = ChatHub::new(MemoryStore::shared());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let room = Uuid::new_v4();

        let (alice_session, mut alice_rx) = connect(&hub, alice).await;
        let (bob_session, mut bob_rx) = connect(&hub, bob).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        hub.dispatch(alice, alice_session, ClientEvent::JoinConversation { conversation_id: room })
            .await;
        let events = drain(&mut alice_rx);
        assert!(matches!(events[0], ServerEvent::UserData { .. }));
        assert!(matches!(events[1], ServerEvent::GetChatMessages));

        hub.dispatch(bob, bob_session, ClientEvent::JoinConversation { conversation_id: room })
            .await;
        // Alice is already in the room, so she gets the re-fetch signal
        // when Bob arrives.
        let events = drain(&mut alice_rx);
        assert!(events.iter().any(|e| matches!(e, ServerEvent::GetChatMessages)));
    }

    #[tokio::test]
    async fn message_with_both_participants_present_is_stored_seen() {
        let store = MemoryStore::shared();
        let hub = ChatHub::new(store.clone());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let room = Uuid::new_v4();

        let (alice_session, mut alice_rx) = connect(&hub, alice).await;
        let (bob_session, mut bob_rx) = connect(&hub, bob).await;
        hub.dispatch(alice, alice_session, ClientEvent::JoinConversation { conversation_id: room })
            .await;
        hub.dispatch(bob, bob_session, ClientEvent::JoinConversation { conversation_id: room })
            .await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        hub.dispatch(
            alice,
            alice_session,
            ClientEvent::SendMessage {
                sender: alice,
                receiver: bob,
                conversation: room,
                body: "hello".into(),
            },
        )
        .await;

        let stored = store.stored().await;
        assert_eq!(stored.len(), 1);
        assert!(stored[0].seen, "receiver is present, stored already seen");

        for rx in [&mut alice_rx, &mut bob_rx] {
            let events = drain(rx);
            assert!(
                events
                    .iter()
                    .any(|e| matches!(e, ServerEvent::MessageSent { message } if message.seen)),
                "both room members receive the message"
            );
        }
    }

    #[tokio::test]
    async fn message_to_an_empty_side_is_unseen_and_notices_the_sender() {
        let store = MemoryStore::shared();
        let hub = ChatHub::new(store.clone());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let room = Uuid::new_v4();

        let (alice_session, mut alice_rx) = connect(&hub, alice).await;
        hub.dispatch(alice, alice_session, ClientEvent::JoinConversation { conversation_id: room })
            .await;
        drain(&mut alice_rx);

        hub.dispatch(
            alice,
            alice_session,
            ClientEvent::SendMessage {
                sender: alice,
                receiver: bob,
                conversation: room,
                body: "anyone there?".into(),
            },
        )
        .await;

        let stored = store.stored().await;
        assert!(!stored[0].seen, "receiver absent, stored unseen");

        let events = drain(&mut alice_rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::MessageSent { message } if !message.seen)));
        assert!(events.iter().any(
            |e| matches!(e, ServerEvent::Notice { message } if message == "for your eyes only")
        ));
    }

    #[tokio::test]
    async fn sender_outside_the_room_gets_no_private_notice() {
        let store = MemoryStore::shared();
        let hub = ChatHub::new(store.clone());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let room = Uuid::new_v4();

        // Alice is connected but never joined the room, so occupancy is
        // zero at send time.
        let (alice_session, mut alice_rx) = connect(&hub, alice).await;
        drain(&mut alice_rx);

        hub.dispatch(
            alice,
            alice_session,
            ClientEvent::SendMessage {
                sender: alice,
                receiver: bob,
                conversation: room,
                body: "into the void".into(),
            },
        )
        .await;

        let stored = store.stored().await;
        assert!(!stored[0].seen);

        let events = drain(&mut alice_rx);
        assert!(
            events
                .iter()
                .all(|e| !matches!(e, ServerEvent::Notice { .. })),
            "the aside is for a sender alone in the room, not outside it"
        );
    }

    #[tokio::test]
    async fn message_seen_flips_only_the_callers_inbox_and_rebroadcasts() {
        let store = MemoryStore::shared();
        let hub = ChatHub::new(store.clone());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let room = Uuid::new_v4();

        // Alice writes while alone; Bob replied earlier from elsewhere.
        let (alice_session, mut alice_rx) = connect(&hub, alice).await;
        hub.dispatch(alice, alice_session, ClientEvent::JoinConversation { conversation_id: room })
            .await;
        hub.dispatch(
            alice,
            alice_session,
            ClientEvent::SendMessage {
                sender: alice,
                receiver: bob,
                conversation: room,
                body: "ping".into(),
            },
        )
        .await;
        store
            .append(NewMessage {
                sender_id: bob,
                receiver_id: alice,
                conversation_id: room,
                body: "pong".into(),
                seen: false,
            })
            .await
            .unwrap();
        drain(&mut alice_rx);

        // Bob joins and acknowledges what was addressed to him.
        let (bob_session, mut bob_rx) = connect(&hub, bob).await;
        hub.dispatch(bob, bob_session, ClientEvent::JoinConversation { conversation_id: room })
            .await;
        drain(&mut bob_rx);
        hub.dispatch(bob, bob_session, ClientEvent::MessageSeen).await;

        let stored = store.stored().await;
        let to_bob = stored.iter().find(|m| m.receiver_id == bob).unwrap();
        let to_alice = stored.iter().find(|m| m.receiver_id == alice).unwrap();
        assert!(to_bob.seen, "bob acknowledged his inbox");
        assert!(!to_alice.seen, "alice's inbox is untouched");

        // Both sides are told to re-fetch so seen-state converges.
        assert!(drain(&mut alice_rx)
            .iter()
            .any(|e| matches!(e, ServerEvent::GetChatMessages)));
        assert!(drain(&mut bob_rx)
            .iter()
            .any(|e| matches!(e, ServerEvent::GetChatMessages)));
    }

    #[tokio::test]
    async fn typing_reaches_other_members_but_not_the_typist() {
        let hub = ChatHub::new(MemoryStore::shared());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let room = Uuid::new_v4();

        let (alice_session, mut alice_rx) = connect(&hub, alice).await;
        let (bob_session, mut bob_rx) = connect(&hub, bob).await;
        hub.dispatch(alice, alice_session, ClientEvent::JoinConversation { conversation_id: room })
            .await;
        hub.dispatch(bob, bob_session, ClientEvent::JoinConversation { conversation_id: room })
            .await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        hub.dispatch(alice, alice_session, ClientEvent::StartTyping).await;
        hub.dispatch(alice, alice_session, ClientEvent::StopTyping).await;

        let bob_events = drain(&mut bob_rx);
        assert!(bob_events.contains(&ServerEvent::Typing { active: true }));
        assert!(bob_events.contains(&ServerEvent::Typing { active: false }));
        assert!(drain(&mut alice_rx).is_empty(), "typist hears nothing back");
    }

    #[tokio::test]
    async fn typing_outside_a_room_goes_nowhere() {
        let hub = ChatHub::new(MemoryStore::shared());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (alice_session, mut alice_rx) = connect(&hub, alice).await;
        let (_, mut bob_rx) = connect(&hub, bob).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        hub.dispatch(alice, alice_session, ClientEvent::StartTyping).await;
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[tokio::test]
    async fn leaving_stops_typing_for_the_room_and_ends_the_session() {
        let hub = ChatHub::new(MemoryStore::shared());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let room = Uuid::new_v4();

        let (alice_session, mut alice_rx) = connect(&hub, alice).await;
        let (bob_session, mut bob_rx) = connect(&hub, bob).await;
        hub.dispatch(alice, alice_session, ClientEvent::JoinConversation { conversation_id: room })
            .await;
        hub.dispatch(bob, bob_session, ClientEvent::JoinConversation { conversation_id: room })
            .await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        hub.dispatch(
            alice,
            alice_session,
            ClientEvent::LeftConversation { conversation_id: room },
        )
        .await;

        let bob_events = drain(&mut bob_rx);
        assert!(bob_events.contains(&ServerEvent::Typing { active: false }));
        match bob_events.last() {
            Some(ServerEvent::UserData { users }) => {
                assert!(!users.users.contains_key(&alice));
            }
            other => panic!("expected a roster update, got {other:?}"),
        }
        assert_eq!(hub.registry.occupancy(room).await, 1);
    }

    #[tokio::test]
    async fn failed_write_surfaces_an_error_to_the_room() {
        let store = MemoryStore::shared();
        store.fail_writes.store(true, Ordering::SeqCst);
        let hub = ChatHub::new(store.clone());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let room = Uuid::new_v4();

        let (alice_session, mut alice_rx) = connect(&hub, alice).await;
        let (bob_session, mut bob_rx) = connect(&hub, bob).await;
        hub.dispatch(alice, alice_session, ClientEvent::JoinConversation { conversation_id: room })
            .await;
        hub.dispatch(bob, bob_session, ClientEvent::JoinConversation { conversation_id: room })
            .await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        hub.dispatch(
            alice,
            alice_session,
            ClientEvent::SendMessage {
                sender: alice,
                receiver: bob,
                conversation: room,
                body: "lost".into(),
            },
        )
        .await;

        assert!(store.stored().await.is_empty());
        for rx in [&mut alice_rx, &mut bob_rx] {
            assert!(drain(rx)
                .iter()
                .any(|e| matches!(e, ServerEvent::Error { .. })));
        }
    }
}
