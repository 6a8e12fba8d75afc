use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type PostId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(Role::Guest),
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(other.to_string()),
        }
    }
}

/// A registered account as stored in `users.json`.
///
/// `password` holds an argon2 PHC string, never the plaintext.
/// `followers` and `following` are carried in the schema but no
/// operation mutates them yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub followers: BTreeSet<UserId>,
    #[serde(default)]
    pub following: BTreeSet<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub user_id: UserId,
    pub comment: String,
}

/// A post as stored in `posts.json` and returned by `GET /posts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub user_id: UserId,
    pub content: String,
    pub likes: u64,
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_known_names_only() {
        assert_eq!("guest".parse::<Role>(), Ok(Role::Guest));
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("Admin".parse::<Role>(), Err("Admin".to_string()));
    }

    #[test]
    fn post_uses_camel_case_keys() {
        let post = Post {
            id: 1,
            user_id: 7,
            content: "hello".into(),
            likes: 0,
            comments: vec![Comment { user_id: 8, comment: "hi".into() }],
            timestamp: Utc::now(),
        };

        let value = serde_json::to_value(&post).unwrap();
        assert_eq!(value["userId"], 7);
        assert_eq!(value["comments"][0]["userId"], 8);
        assert!(value.get("user_id").is_none());
    }
}
