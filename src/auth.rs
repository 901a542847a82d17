//! Request authentication for the graph editor.
//!
//! Callers identify themselves with `Authorization: Bearer <token>`, where
//! the token maps to a user configured under `[[auth.users]]`. Mutating
//! requests additionally carry a CSRF token in the `X-Archi-Csrf` header.
//! That token is an HMAC-SHA256 over the user id, keyed by `auth.secret`,
//! and is handed to the editor by `GET /graph-editor/state`.

use std::collections::HashMap;

use archi_graph_core::EditorAccess;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::AuthConfig;

type HmacSha256 = Hmac<Sha256>;

pub const CSRF_HEADER: &str = "x-archi-csrf";

/// User role. Administrators and editors may edit the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Editor,
    Author,
    Subscriber,
}

impl Role {
    pub fn can_edit_graph(&self) -> bool {
        matches!(self, Role::Administrator | Role::Editor)
    }
}

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Administrator
    }
}

impl EditorAccess for User {
    fn can_edit_graph(&self) -> bool {
        self.role.can_edit_graph()
    }
}

/// Token lookup and CSRF signing.
#[derive(Debug, Clone)]
pub struct Authenticator {
    secret: Vec<u8>,
    users: HashMap<String, User>,
}

impl Authenticator {
    pub fn new(config: &AuthConfig) -> Self {
        let users = config
            .users
            .iter()
            .map(|u| {
                (
                    u.token.clone(),
                    User {
                        id: u.id,
                        name: u.name.clone(),
                        role: u.role,
                    },
                )
            })
            .collect();
        Self {
            secret: config.secret.as_bytes().to_vec(),
            users,
        }
    }

    /// Resolve the value of an `Authorization` header.
    pub fn authenticate(&self, authorization: Option<&str>) -> Option<&User> {
        let token = authorization?.trim().strip_prefix("Bearer ")?.trim();
        self.users.get(token)
    }

    fn mac(&self, user_id: i64) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(format!("graph-editor:{}", user_id).as_bytes());
        mac
    }

    pub fn csrf_token(&self, user_id: i64) -> String {
        hex::encode(self.mac(user_id).finalize().into_bytes())
    }

    /// Constant-time check of a presented CSRF token.
    pub fn verify_csrf(&self, user_id: i64, presented: Option<&str>) -> bool {
        let Some(bytes) = presented.and_then(|p| hex::decode(p.trim()).ok()) else {
            return false;
        };
        self.mac(user_id).verify_slice(&bytes).is_ok()
    }
}
