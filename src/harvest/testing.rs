//! In-memory platform client for unit tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::model::{
    ChannelInfo, ConversationKind, ConversationRef, EntityRef, Profile, RawMessage, RawUser,
};
use crate::traits::{ClientError, PlatformClient};

pub fn conversation(id: i64) -> ConversationRef {
    ConversationRef::new(id, format!("Group {id}"), ConversationKind::Group)
}

pub fn user(id: i64) -> RawUser {
    RawUser {
        id,
        first_name: Some(format!("User{id}")),
        last_name: Some("Tester".to_string()),
        username: Some(format!("user{id}")),
        phone: Some(format!("+1555000{id:04}")),
        bot: Some(false),
        verified: Some(false),
        deleted: Some(false),
        scam: Some(false),
        fake: Some(false),
        last_online: None,
    }
}

/// Message dated the 15th of `year`-`month` at noon UTC.
pub fn message_at(id: i32, year: i32, month: u32, text: &str) -> RawMessage {
    RawMessage {
        id,
        date: Utc.with_ymd_and_hms(year, month, 15, 12, 0, 0).unwrap(),
        text: text.to_string(),
        sender_id: None,
        forward: None,
        has_media: false,
    }
}

/// `count` text messages with ids `count..=1`, newest first, all in `year`-`month`.
pub fn history(count: i32, year: i32, month: u32) -> Vec<RawMessage> {
    (1..=count)
        .rev()
        .map(|id| message_at(id, year, month, &format!("message {id}")))
        .collect()
}

/// Keyed lookups that can be made to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookup {
    Participants,
    Photos,
    Profile,
    Entity,
}

#[derive(Default)]
pub struct MockClient {
    conversations: Mutex<Vec<ConversationRef>>,
    participants: Mutex<HashMap<i64, Result<Vec<RawUser>, ClientError>>>,
    photos: Mutex<HashMap<i64, Result<usize, ClientError>>>,
    profiles: Mutex<HashMap<i64, Result<Profile, ClientError>>>,
    channels: Mutex<HashMap<i64, Result<ChannelInfo, ClientError>>>,
    entities: Mutex<HashMap<i64, Result<EntityRef, ClientError>>>,
    histories: Mutex<HashMap<i64, Vec<RawMessage>>>,
    history_failures: Mutex<HashMap<usize, ClientError>>,
    history_calls: Mutex<Vec<(i64, i32, usize)>>,
    one_shot_failures: Mutex<HashMap<(Lookup, i64), ClientError>>,
    lookup_calls: Mutex<HashMap<(Lookup, i64), usize>>,
    entity_lookups: AtomicUsize,
    released: AtomicBool,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_conversation(&self, conversation: ConversationRef) {
        self.conversations.lock().unwrap().push(conversation);
    }

    pub fn set_participants(
        &self,
        conversation_id: i64,
        result: Result<Vec<RawUser>, ClientError>,
    ) {
        self.participants
            .lock()
            .unwrap()
            .insert(conversation_id, result);
    }

    pub fn set_photos(&self, user_id: i64, result: Result<usize, ClientError>) {
        self.photos.lock().unwrap().insert(user_id, result);
    }

    pub fn set_profile(&self, user_id: i64, result: Result<Profile, ClientError>) {
        self.profiles.lock().unwrap().insert(user_id, result);
    }

    pub fn set_channel(&self, channel_id: i64, result: Result<ChannelInfo, ClientError>) {
        self.channels.lock().unwrap().insert(channel_id, result);
    }

    pub fn set_entity(&self, id: i64, result: Result<EntityRef, ClientError>) {
        self.entities.lock().unwrap().insert(id, result);
    }

    /// Full history of a conversation, newest first.
    pub fn set_history(&self, conversation_id: i64, messages: Vec<RawMessage>) {
        self.histories
            .lock()
            .unwrap()
            .insert(conversation_id, messages);
    }

    /// Makes the `call`-th history request (zero-based) fail with `error`.
    pub fn fail_history_call(&self, call: usize, error: ClientError) {
        self.history_failures.lock().unwrap().insert(call, error);
    }

    /// Makes the next `lookup` for `key` fail with `error`; later calls
    /// answer normally.
    pub fn fail_once(&self, lookup: Lookup, key: i64, error: ClientError) {
        self.one_shot_failures
            .lock()
            .unwrap()
            .insert((lookup, key), error);
    }

    /// Number of `lookup` calls made for `key`.
    pub fn lookup_calls(&self, lookup: Lookup, key: i64) -> usize {
        self.lookup_calls
            .lock()
            .unwrap()
            .get(&(lookup, key))
            .copied()
            .unwrap_or(0)
    }

    fn record_lookup(&self, lookup: Lookup, key: i64) -> Result<(), ClientError> {
        *self
            .lookup_calls
            .lock()
            .unwrap()
            .entry((lookup, key))
            .or_insert(0) += 1;
        match self.one_shot_failures.lock().unwrap().remove(&(lookup, key)) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Every history request as `(conversation_id, offset_id, limit)`.
    pub fn history_calls(&self) -> Vec<(i64, i32, usize)> {
        self.history_calls.lock().unwrap().clone()
    }

    pub fn entity_lookups(&self) -> usize {
        self.entity_lookups.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformClient for MockClient {
    async fn list_conversations(&self) -> Result<Vec<ConversationRef>, ClientError> {
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn resolve_conversation(&self, id: i64) -> Result<ConversationRef, ClientError> {
        self.conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("conversation {id}")))
    }

    async fn list_participants(
        &self,
        conversation: &ConversationRef,
    ) -> Result<Vec<RawUser>, ClientError> {
        self.record_lookup(Lookup::Participants, conversation.id)?;
        self.participants
            .lock()
            .unwrap()
            .get(&conversation.id)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn fetch_profile(&self, user_id: i64) -> Result<Profile, ClientError> {
        self.record_lookup(Lookup::Profile, user_id)?;
        self.profiles
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| Ok(Profile::default()))
    }

    async fn resolve_channel(&self, channel_id: i64) -> Result<ChannelInfo, ClientError> {
        self.channels
            .lock()
            .unwrap()
            .get(&channel_id)
            .cloned()
            .unwrap_or_else(|| Err(ClientError::NotFound(format!("channel {channel_id}"))))
    }

    async fn count_profile_photos(&self, user_id: i64) -> Result<usize, ClientError> {
        self.record_lookup(Lookup::Photos, user_id)?;
        self.photos
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or(Ok(0))
    }

    async fn fetch_history(
        &self,
        conversation: &ConversationRef,
        offset_id: i32,
        limit: usize,
    ) -> Result<Vec<RawMessage>, ClientError> {
        let call = {
            let mut calls = self.history_calls.lock().unwrap();
            calls.push((conversation.id, offset_id, limit));
            calls.len() - 1
        };

        if let Some(error) = self.history_failures.lock().unwrap().remove(&call) {
            return Err(error);
        }

        let histories = self.histories.lock().unwrap();
        let messages = histories
            .get(&conversation.id)
            .map(|all| {
                all.iter()
                    .filter(|m| offset_id == 0 || m.id < offset_id)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(messages)
    }

    async fn resolve_entity(&self, id: i64) -> Result<EntityRef, ClientError> {
        self.entity_lookups.fetch_add(1, Ordering::SeqCst);
        self.record_lookup(Lookup::Entity, id)?;
        self.entities
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Err(ClientError::NotFound(format!("entity {id}"))))
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}
