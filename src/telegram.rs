//! MTProto-backed [`PlatformClient`] built on `grammers-client`.
//!
//! Entities seen while listing dialogs, participants and messages are cached
//! by id, so later lookups (profiles, photos, senders, forward origins) can
//! be answered without access hashes the caller does not have.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use grammers_client::grammers_tl_types as tl;
use grammers_client::session::Session;
use grammers_client::types::{Chat, Message, PackedChat, User};
use grammers_client::{Client, Config, InitParams, InvocationError, SignInError};
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Credentials;
use crate::model::{
    ChannelInfo, ConversationKind, ConversationRef, EntityRef, ForwardHeader, Profile, RawMessage,
    RawUser,
};
use crate::session::{parse_api_id, parse_required, Console, PromptError};
use crate::traits::{ClientError, PlatformClient};

/// Name the platform gives its rate-limit RPC error.
const FLOOD_WAIT: &str = "FLOOD_WAIT";

/// Fatal failures while establishing the session.
#[derive(Error, Debug)]
pub enum LoginError {
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("Session file {path}: {source}")]
    Session {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not connect: {0}")]
    Connect(String),
    #[error("Sign-in failed: {0}")]
    SignIn(String),
}

pub struct TelegramClient {
    client: Client,
    session_file: PathBuf,
    dialogs: Mutex<HashMap<i64, (ConversationRef, PackedChat)>>,
    users: Mutex<HashMap<i64, PackedChat>>,
    entities: Mutex<HashMap<i64, EntityRef>>,
    channels: Mutex<HashMap<i64, ChannelInfo>>,
}

impl TelegramClient {
    /// Connects with the stored session or signs in interactively.
    ///
    /// Missing credentials, the login code and an optional 2FA password are
    /// asked for on `console`. The session file is written after sign-in.
    pub async fn connect<R: BufRead, W: Write>(
        credentials: Credentials,
        session_file: PathBuf,
        console: &mut Console<R, W>,
    ) -> Result<Self, LoginError> {
        let api_id = match credentials.api_id {
            Some(api_id) => api_id,
            None => console.ask_until("API id: ", parse_api_id)?,
        };
        let api_hash = match credentials.api_hash {
            Some(api_hash) => api_hash,
            None => console.ask_until("API hash: ", parse_required)?,
        };

        let session =
            Session::load_file_or_create(&session_file).map_err(|source| LoginError::Session {
                path: session_file.clone(),
                source,
            })?;

        // Rate limits are surfaced to the pipeline instead of slept on here
        let params = InitParams {
            flood_sleep_threshold: 0,
            ..Default::default()
        };
        let client = Client::connect(Config {
            session,
            api_id,
            api_hash,
            params,
        })
        .await
        .map_err(|e| LoginError::Connect(e.to_string()))?;

        let authorized = client
            .is_authorized()
            .await
            .map_err(|e| LoginError::Connect(e.to_string()))?;

        if !authorized {
            let phone = match credentials.phone {
                Some(phone) => phone,
                None => console.ask_until("Phone number (international format): ", parse_required)?,
            };
            let token = client
                .request_login_code(&phone)
                .await
                .map_err(|e| LoginError::SignIn(e.to_string()))?;
            let code = console.ask_until("Login code: ", parse_required)?;

            match client.sign_in(&token, &code).await {
                Ok(_) => {}
                Err(SignInError::PasswordRequired(password_token)) => {
                    let hint = password_token.hint().unwrap_or("none").to_string();
                    let password = console
                        .ask_until(&format!("Two-step password (hint: {hint}): "), parse_required)?;
                    client
                        .check_password(password_token, password.as_str())
                        .await
                        .map_err(|e| LoginError::SignIn(e.to_string()))?;
                }
                Err(e) => return Err(LoginError::SignIn(e.to_string())),
            }

            client
                .session()
                .save_to_file(&session_file)
                .map_err(|source| LoginError::Session {
                    path: session_file.clone(),
                    source,
                })?;
            info!(session = %session_file.display(), "Signed in");
        }

        Ok(Self {
            client,
            session_file,
            dialogs: Mutex::new(HashMap::new()),
            users: Mutex::new(HashMap::new()),
            entities: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
        })
    }

    fn dialog(&self, id: i64) -> Result<(ConversationRef, PackedChat), ClientError> {
        lock(&self.dialogs)
            .get(&id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("conversation {id}")))
    }

    fn user(&self, id: i64) -> Result<PackedChat, ClientError> {
        lock(&self.users)
            .get(&id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("user {id}")))
    }

    fn remember_chat(&self, chat: &Chat) {
        let phone = match chat {
            Chat::User(user) => {
                lock(&self.users).insert(user.id(), chat.pack());
                user.raw.phone.clone()
            }
            _ => None,
        };
        lock(&self.entities).insert(
            chat.id(),
            EntityRef {
                id: chat.id(),
                username: chat.username().map(str::to_string),
                phone,
            },
        );
    }

    fn raw_message(&self, message: &Message) -> RawMessage {
        let sender_id = message.sender().map(|sender| {
            self.remember_chat(&sender);
            sender.id()
        });
        let forward = message.forward_header().map(|header| {
            let tl::enums::MessageFwdHeader::Header(header) = header;
            ForwardHeader {
                from_id: header.from_id.as_ref().map(peer_id),
            }
        });

        RawMessage {
            id: message.id(),
            date: message.date(),
            text: message.text().to_string(),
            sender_id,
            forward,
            has_media: message.media().is_some(),
        }
    }
}

#[async_trait]
impl PlatformClient for TelegramClient {
    async fn list_conversations(&self) -> Result<Vec<ConversationRef>, ClientError> {
        let mut dialogs = self.client.iter_dialogs();
        let mut conversations = Vec::new();

        while let Some(dialog) = dialogs.next().await.map_err(map_invocation)? {
            let chat = dialog.chat();
            let kind = match chat {
                Chat::User(_) => ConversationKind::Direct,
                Chat::Group(_) => ConversationKind::Group,
                Chat::Channel(_) => ConversationKind::Channel,
            };
            let conversation = ConversationRef::new(chat.id(), chat.name(), kind);

            self.remember_chat(chat);
            lock(&self.dialogs).insert(chat.id(), (conversation.clone(), chat.pack()));
            conversations.push(conversation);
        }

        Ok(conversations)
    }

    async fn resolve_conversation(&self, id: i64) -> Result<ConversationRef, ClientError> {
        self.dialog(id).map(|(conversation, _)| conversation)
    }

    async fn list_participants(
        &self,
        conversation: &ConversationRef,
    ) -> Result<Vec<RawUser>, ClientError> {
        let (_, packed) = self.dialog(conversation.id)?;
        let mut participants = self.client.iter_participants(packed);
        let mut users = Vec::new();

        while let Some(participant) = participants.next().await.map_err(map_invocation)? {
            self.remember_chat(&Chat::User(participant.user.clone()));
            users.push(raw_user(&participant.user));
        }

        Ok(users)
    }

    async fn fetch_profile(&self, user_id: i64) -> Result<Profile, ClientError> {
        let packed = self.user(user_id)?;
        let request = tl::functions::users::GetFullUser {
            id: input_user(&packed),
        };

        let tl::enums::users::UserFull::Full(full) =
            self.client.invoke(&request).await.map_err(map_invocation)?;
        let tl::enums::UserFull::Full(user_full) = full.full_user;

        for chat in full.chats {
            if let tl::enums::Chat::Channel(channel) = chat {
                lock(&self.channels).insert(
                    channel.id,
                    ChannelInfo {
                        title: channel.title,
                        username: channel.username,
                    },
                );
            }
        }

        Ok(Profile {
            about: user_full.about,
            personal_channel_id: user_full.personal_channel_id,
        })
    }

    async fn resolve_channel(&self, channel_id: i64) -> Result<ChannelInfo, ClientError> {
        lock(&self.channels)
            .get(&channel_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("channel {channel_id}")))
    }

    async fn count_profile_photos(&self, user_id: i64) -> Result<usize, ClientError> {
        let packed = self.user(user_id)?;
        let mut photos = self.client.iter_profile_photos(packed);
        let first = photos.next().await.map_err(map_invocation)?;
        Ok(usize::from(first.is_some()))
    }

    async fn fetch_history(
        &self,
        conversation: &ConversationRef,
        offset_id: i32,
        limit: usize,
    ) -> Result<Vec<RawMessage>, ClientError> {
        let (_, packed) = self.dialog(conversation.id)?;
        let mut messages = self
            .client
            .iter_messages(packed)
            .offset_id(offset_id)
            .limit(limit);
        let mut page = Vec::new();

        while let Some(message) = messages.next().await.map_err(map_invocation)? {
            page.push(self.raw_message(&message));
        }

        Ok(page)
    }

    async fn resolve_entity(&self, id: i64) -> Result<EntityRef, ClientError> {
        lock(&self.entities)
            .get(&id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("entity {id}")))
    }

    fn release(&self) {
        if let Err(e) = self.client.session().save_to_file(&self.session_file) {
            warn!(session = %self.session_file.display(), error = %e, "Failed to save session");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn map_invocation(error: InvocationError) -> ClientError {
    match &error {
        InvocationError::Rpc(rpc) if rpc.name == FLOOD_WAIT => ClientError::RateLimited {
            seconds: u64::from(rpc.value.unwrap_or(1)),
        },
        _ => ClientError::Request(error.to_string()),
    }
}

fn input_user(packed: &PackedChat) -> tl::enums::InputUser {
    tl::types::InputUser {
        user_id: packed.id,
        access_hash: packed.access_hash.unwrap_or(0),
    }
    .into()
}

fn peer_id(peer: &tl::enums::Peer) -> i64 {
    match peer {
        tl::enums::Peer::User(user) => user.user_id,
        tl::enums::Peer::Chat(chat) => chat.chat_id,
        tl::enums::Peer::Channel(channel) => channel.channel_id,
    }
}

fn raw_user(user: &User) -> RawUser {
    let raw = &user.raw;
    let last_online = match &raw.status {
        Some(tl::enums::UserStatus::Offline(status)) => {
            Utc.timestamp_opt(i64::from(status.was_online), 0).single()
        }
        _ => None,
    };

    RawUser {
        id: raw.id,
        first_name: raw.first_name.clone().filter(|name| !name.is_empty()),
        last_name: raw.last_name.clone().filter(|name| !name.is_empty()),
        username: raw.username.clone(),
        phone: raw.phone.clone(),
        bot: Some(raw.bot),
        verified: Some(raw.verified),
        deleted: Some(raw.deleted),
        scam: Some(raw.scam),
        fake: Some(raw.fake),
        last_online,
    }
}
