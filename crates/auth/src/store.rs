//! The storage contract the core consumes, plus the bundled adapters.
//!
//! The core issues a single store operation per request; any concurrency
//! discipline beyond `Send + Sync` is the adapter's responsibility.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::instrument;

use crate::types::{CoreUser, OpaqueUserRecord, UserGroupBinding, dedup_roles};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("user not found: {0}")]
    NotFound(String),

    #[error("record serialization error: {0}")]
    Record(#[from] serde_json::Error),

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    Postgres(#[from] postgres::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Persistence interface for OPAQUE user records and role bindings.
///
/// The role-binding operations have default implementations in terms of the
/// raw record operations; adapters with a native representation may
/// override them.
pub trait UserStore: Send + Sync {
    fn save_raw(&self, user: &CoreUser, data: &[u8]) -> Result<(), StoreError>;

    /// Loads the raw record, [`StoreError::NotFound`] if absent.
    fn load_raw(&self, user: &CoreUser) -> Result<Vec<u8>, StoreError>;

    fn exists(&self, user: &CoreUser) -> Result<bool, StoreError>;

    fn delete(&self, user: &CoreUser) -> Result<(), StoreError>;

    /// All role bindings for the user, deduplicated.
    fn user_groups_for_user(&self, user: &CoreUser) -> Result<Vec<UserGroupBinding>, StoreError> {
        let record = OpaqueUserRecord::from_bytes(&self.load_raw(user)?)?;
        Ok(record.user_groups)
    }

    /// Replaces the user's role bindings, deduplicating on write.
    fn update_roles(&self, user: &CoreUser, roles: &[UserGroupBinding]) -> Result<(), StoreError> {
        let mut record = OpaqueUserRecord::from_bytes(&self.load_raw(user)?)?;
        record.user_groups = dedup_roles(roles);
        self.save_raw(user, &record.to_bytes()?)
    }
}

/// In-memory store; the default when no relational DSN is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for MemoryStore {
    #[instrument(skip(self, data), fields(user = %user))]
    fn save_raw(&self, user: &CoreUser, data: &[u8]) -> Result<(), StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        records.insert(user.encode_key(), data.to_vec());
        Ok(())
    }

    fn load_raw(&self, user: &CoreUser) -> Result<Vec<u8>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        records
            .get(&user.encode_key())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(user.encode_key()))
    }

    fn exists(&self, user: &CoreUser) -> Result<bool, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        Ok(records.contains_key(&user.encode_key()))
    }

    fn delete(&self, user: &CoreUser) -> Result<(), StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        records.remove(&user.encode_key());
        Ok(())
    }
}

#[cfg(feature = "postgres")]
pub use pg::PgStore;

#[cfg(feature = "postgres")]
mod pg {
    //! Relational adapter. Expected schema:
    //!
    //! ```sql
    //! CREATE TABLE opaque_client_store (
    //!     tenant_id TEXT NOT NULL,
    //!     user_id   TEXT NOT NULL,
    //!     record    BYTEA NOT NULL,
    //!     PRIMARY KEY (tenant_id, user_id)
    //! );
    //! ```

    use std::sync::Mutex;

    use super::{StoreError, UserStore};
    use crate::types::CoreUser;

    pub struct PgStore {
        client: Mutex<postgres::Client>,
    }

    impl PgStore {
        pub fn connect(dsn: &str) -> Result<Self, StoreError> {
            let client = postgres::Client::connect(dsn, postgres::NoTls)?;
            Ok(Self {
                client: Mutex::new(client),
            })
        }

        fn with_client<T>(
            &self,
            f: impl FnOnce(&mut postgres::Client) -> Result<T, StoreError>,
        ) -> Result<T, StoreError> {
            let mut client = self
                .client
                .lock()
                .map_err(|_| StoreError::Backend("lock poisoned".into()))?;
            f(&mut client)
        }
    }

    impl UserStore for PgStore {
        fn save_raw(&self, user: &CoreUser, data: &[u8]) -> Result<(), StoreError> {
            self.with_client(|client| {
                client.execute(
                    "INSERT INTO opaque_client_store (tenant_id, user_id, record)
                     VALUES ($1, $2, $3)
                     ON CONFLICT (tenant_id, user_id) DO UPDATE SET record = EXCLUDED.record",
                    &[&user.tenant_id, &user.user_id, &data],
                )?;
                Ok(())
            })
        }

        fn load_raw(&self, user: &CoreUser) -> Result<Vec<u8>, StoreError> {
            self.with_client(|client| {
                let row = client.query_opt(
                    "SELECT record FROM opaque_client_store WHERE tenant_id = $1 AND user_id = $2",
                    &[&user.tenant_id, &user.user_id],
                )?;
                match row {
                    Some(row) => Ok(row.get::<_, Vec<u8>>(0)),
                    None => Err(StoreError::NotFound(user.encode_key())),
                }
            })
        }

        fn exists(&self, user: &CoreUser) -> Result<bool, StoreError> {
            self.with_client(|client| {
                let row = client.query_opt(
                    "SELECT 1 FROM opaque_client_store WHERE tenant_id = $1 AND user_id = $2",
                    &[&user.tenant_id, &user.user_id],
                )?;
                Ok(row.is_some())
            })
        }

        fn delete(&self, user: &CoreUser) -> Result<(), StoreError> {
            self.with_client(|client| {
                client.execute(
                    "DELETE FROM opaque_client_store WHERE tenant_id = $1 AND user_id = $2",
                    &[&user.tenant_id, &user.user_id],
                )?;
                Ok(())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{UserGroup, UserGroupBinding};

    fn akira() -> CoreUser {
        CoreUser::new("dojo-a", "akira")
    }

    #[test]
    fn raw_lifecycle() {
        let store = MemoryStore::new();
        let user = akira();

        assert!(!store.exists(&user).unwrap());
        assert!(matches!(
            store.load_raw(&user),
            Err(StoreError::NotFound(_))
        ));

        store.save_raw(&user, b"blob-1").unwrap();
        assert!(store.exists(&user).unwrap());
        assert_eq!(store.load_raw(&user).unwrap(), b"blob-1");

        store.save_raw(&user, b"blob-2").unwrap();
        assert_eq!(store.load_raw(&user).unwrap(), b"blob-2");

        store.delete(&user).unwrap();
        assert!(!store.exists(&user).unwrap());
    }

    #[test]
    fn roles_dedup_on_write() {
        let store = MemoryStore::new();
        let user = akira();
        let record = OpaqueUserRecord::new(vec![1, 2, 3]);
        store.save_raw(&user, &record.to_bytes().unwrap()).unwrap();

        let coach = UserGroupBinding::new(user.clone(), UserGroup::Coach);
        let staff = UserGroupBinding::new(user.clone(), UserGroup::Staff);
        store
            .update_roles(&user, &[coach.clone(), staff.clone(), coach.clone()])
            .unwrap();

        let groups = store.user_groups_for_user(&user).unwrap();
        assert_eq!(groups, vec![coach, staff]);

        // The OPAQUE blob must survive a role update untouched.
        let restored = OpaqueUserRecord::from_bytes(&store.load_raw(&user).unwrap()).unwrap();
        assert_eq!(restored.opaque_record, vec![1, 2, 3]);
    }

    #[test]
    fn update_roles_requires_existing_record() {
        let store = MemoryStore::new();
        let binding = UserGroupBinding::new(akira(), UserGroup::Coach);
        assert!(matches!(
            store.update_roles(&akira(), &[binding]),
            Err(StoreError::NotFound(_))
        ));
    }
}
