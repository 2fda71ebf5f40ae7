// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! User and group directory.
//!
//! Implements the identity/linking contract the reconciler reads through
//! [`IdentityResolver`]: chat identities map to users, users may or may not
//! have linked a wallet yet, and groups record membership.
//!
//! A user is created the first time they are seen in chat
//! ([`UserDirectory::register`]) or link a wallet
//! ([`UserDirectory::link_wallet`]). Relinking updates the wallet and name.
//! Users are never deleted.

use crate::base::{ChatId, UserId, WalletAddress};
use crate::builder::validate_address;
use crate::clock::Clock;
use crate::error::{EntityRef, LedgerError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub chat_id: ChatId,
    pub wallet: Option<WalletAddress>,
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// `@username` when known, otherwise the chat id.
    pub fn handle(&self) -> String {
        match &self.username {
            Some(name) => format!("@{name}"),
            None => self.chat_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMember {
    pub user: UserId,
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub chat_id: ChatId,
    pub name: String,
    pub members: Vec<GroupMember>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn is_member(&self, user: UserId) -> bool {
        self.members.iter().any(|m| m.user == user)
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        self.members.iter().any(|m| m.user == user && m.is_admin)
    }
}

/// Read contract used by the reconciler.
pub trait IdentityResolver: Send + Sync {
    /// Resolves a numeric chat id or an `@username`.
    fn resolve(&self, handle: &str) -> Result<User, LedgerError>;

    fn user(&self, id: UserId) -> Result<User, LedgerError>;

    fn group(&self, chat_id: ChatId) -> Result<Group, LedgerError>;
}

/// In-memory directory.
pub struct UserDirectory {
    users: DashMap<ChatId, User>,
    by_id: DashMap<UserId, ChatId>,
    /// Lower-cased usernames without the leading `@`.
    by_name: DashMap<String, ChatId>,
    groups: DashMap<ChatId, Group>,
    next_id: AtomicU64,
    clock: Arc<dyn Clock>,
}

fn normalize_name(name: &str) -> String {
    name.trim_start_matches('@').to_lowercase()
}

impl UserDirectory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            users: DashMap::new(),
            by_id: DashMap::new(),
            by_name: DashMap::new(),
            groups: DashMap::new(),
            next_id: AtomicU64::new(1),
            clock,
        }
    }

    /// Links (or relinks) a wallet to a chat identity.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAddress`] if the address is malformed.
    pub fn link_wallet(
        &self,
        chat_id: ChatId,
        wallet: WalletAddress,
        username: Option<String>,
    ) -> Result<User, LedgerError> {
        validate_address(&wallet.0)?;
        let user = self.upsert(chat_id, Some(wallet), username);
        info!(user = %user.id, chat = %chat_id, "wallet linked");
        Ok(user)
    }

    /// Records a user seen in chat without touching their wallet link.
    pub fn register(&self, chat_id: ChatId, username: Option<String>) -> User {
        self.upsert(chat_id, None, username)
    }

    fn upsert(
        &self,
        chat_id: ChatId,
        wallet: Option<WalletAddress>,
        username: Option<String>,
    ) -> User {
        match self.users.entry(chat_id) {
            Entry::Occupied(mut entry) => {
                let user = entry.get_mut();
                if let Some(wallet) = wallet {
                    user.wallet = Some(wallet);
                }
                if let Some(name) = username {
                    let id = user.id;
                    if let Some(old) = user.username.replace(name.clone()) {
                        self.by_name.remove_if(&normalize_name(&old), |_, v| *v == chat_id);
                    }
                    self.by_name.insert(normalize_name(&name), chat_id);
                    debug!(user = %id, "username updated");
                }
                user.clone()
            }
            Entry::Vacant(entry) => {
                let id = UserId(self.next_id.fetch_add(1, Ordering::Relaxed));
                let user = User {
                    id,
                    chat_id,
                    wallet,
                    username: username.clone(),
                    created_at: self.clock.now(),
                };
                self.by_id.insert(id, chat_id);
                if let Some(name) = username {
                    self.by_name.insert(normalize_name(&name), chat_id);
                }
                entry.insert(user.clone());
                debug!(user = %id, chat = %chat_id, "user created");
                user
            }
        }
    }

    /// Creates a group or renames an existing one.
    pub fn upsert_group(&self, chat_id: ChatId, name: impl Into<String>) -> Group {
        let name = name.into();
        let now = self.clock.now();
        let mut group = self.groups.entry(chat_id).or_insert_with(|| Group {
            chat_id,
            name: name.clone(),
            members: Vec::new(),
            created_at: now,
        });
        group.name = name;
        group.clone()
    }

    /// Adds a member or updates their admin flag.
    pub fn add_member(
        &self,
        group: ChatId,
        user: UserId,
        is_admin: bool,
    ) -> Result<Group, LedgerError> {
        if !self.by_id.contains_key(&user) {
            return Err(LedgerError::NotFound(EntityRef::UserId(user)));
        }
        let mut entry = self
            .groups
            .get_mut(&group)
            .ok_or_else(|| LedgerError::NotFound(EntityRef::Group(group.to_string())))?;
        match entry.members.iter_mut().find(|m| m.user == user) {
            Some(member) => member.is_admin = is_admin,
            None => entry.members.push(GroupMember { user, is_admin }),
        }
        Ok(entry.clone())
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl IdentityResolver for UserDirectory {
    fn resolve(&self, handle: &str) -> Result<User, LedgerError> {
        let handle = handle.trim();
        let chat_id = match handle.parse::<i64>() {
            Ok(chat) => Some(ChatId(chat)),
            Err(_) => self.by_name.get(&normalize_name(handle)).map(|r| *r),
        };
        chat_id
            .and_then(|chat| self.users.get(&chat).map(|u| u.clone()))
            .ok_or_else(|| LedgerError::NotFound(EntityRef::User(handle.to_string())))
    }

    fn user(&self, id: UserId) -> Result<User, LedgerError> {
        let chat_id = self
            .by_id
            .get(&id)
            .map(|r| *r)
            .ok_or(LedgerError::NotFound(EntityRef::UserId(id)))?;
        self.users
            .get(&chat_id)
            .map(|u| u.clone())
            .ok_or(LedgerError::NotFound(EntityRef::UserId(id)))
    }

    fn group(&self, chat_id: ChatId) -> Result<Group, LedgerError> {
        self.groups
            .get(&chat_id)
            .map(|g| g.clone())
            .ok_or_else(|| LedgerError::NotFound(EntityRef::Group(chat_id.to_string())))
    }
}
