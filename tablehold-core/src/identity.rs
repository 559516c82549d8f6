use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Resolves whether a user id issued by the identity provider still exists.
/// Lock ownership is not a storage foreign key, so the sweeper asks here.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_exists(
        &self,
        user_id: &str,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

/// Fixed set of known users. Anything not in the set is treated as deleted.
#[derive(Debug, Default)]
pub struct StaticUserDirectory {
    users: RwLock<HashSet<String>>,
    failing: AtomicBool,
}

impl StaticUserDirectory {
    pub fn new<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: RwLock::new(users.into_iter().map(Into::into).collect()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn add(&self, user_id: &str) {
        self.users
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id.to_string());
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn remove(&self, user_id: &str) {
        self.users
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(user_id);
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn user_exists(
        &self,
        user_id: &str,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err("user directory unreachable".into());
        }
        Ok(self
            .users
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_directory_tracks_removals() {
        let directory = StaticUserDirectory::new(["user-1", "user-2"]);
        assert!(directory.user_exists("user-1").await.unwrap());
        directory.remove("user-1");
        assert!(!directory.user_exists("user-1").await.unwrap());
        directory.add("user-3");
        assert!(directory.user_exists("user-3").await.unwrap());

        directory.set_failing(true);
        assert!(directory.user_exists("user-3").await.is_err());
    }
}
