use serde::Serialize;
use serde::de::DeserializeOwned;

use pinboard_types::models::{Post, User};

use crate::StoreError;

/// The two stored tables. Each one lives in its own JSON file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Users,
    Posts,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Users, Collection::Posts];

    pub fn file_name(&self) -> &'static str {
        match self {
            Collection::Users => "users.json",
            Collection::Posts => "posts.json",
        }
    }
}

/// A row type that can be persisted as part of a collection.
pub trait Record: Serialize + DeserializeOwned + Send + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> i64;
}

impl Record for User {
    const COLLECTION: Collection = Collection::Users;

    fn id(&self) -> i64 {
        self.id
    }
}

impl Record for Post {
    const COLLECTION: Collection = Collection::Posts;

    fn id(&self) -> i64 {
        self.id
    }
}

/// Allocate the id for a record about to be appended.
///
/// Ids are creation times in milliseconds, bumped past the largest existing
/// id so two records created within the same millisecond stay distinct.
/// Callers must hold the collection lock.
pub fn next_id<T: Record>(records: &[T]) -> Result<i64, StoreError> {
    let now = chrono::Utc::now().timestamp_millis();
    match records.iter().map(Record::id).max() {
        Some(last) if last >= now => last
            .checked_add(1)
            .ok_or(StoreError::IdsExhausted(T::COLLECTION)),
        _ => Ok(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post(id: i64) -> Post {
        Post {
            id,
            user_id: 1,
            content: String::new(),
            likes: 0,
            comments: vec![],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn next_id_uses_clock_for_empty_collection() {
        let before = Utc::now().timestamp_millis();
        let id = next_id::<Post>(&[]).unwrap();
        assert!(id >= before);
    }

    #[test]
    fn next_id_moves_past_future_ids() {
        let far = Utc::now().timestamp_millis() + 60_000;
        let posts = vec![post(3), post(far), post(10)];
        assert_eq!(next_id(&posts).unwrap(), far + 1);
    }

    #[test]
    fn next_id_fails_instead_of_overflowing() {
        let posts = vec![post(1), post(i64::MAX)];
        let err = next_id(&posts).unwrap_err();
        assert!(matches!(err, StoreError::IdsExhausted(Collection::Posts)));
    }
}
