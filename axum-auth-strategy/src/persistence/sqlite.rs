use async_trait::async_trait;
use sqlx::SqlitePool;
use time::OffsetDateTime;

use super::{PersistenceBackend, PersistenceError};
use crate::{
    session::{SessionId, SessionRecord},
    UserId,
};

type Row = (String, String, OffsetDateTime);

fn into_record((session_id, user_id, created_at): Row) -> SessionRecord {
    SessionRecord {
        session_id: SessionId::from(session_id),
        user_id: UserId::new(user_id),
        created_at,
    }
}

/// Persists records in a SQLite table via sqlx.
#[derive(Clone, Debug)]
pub struct SqliteBackend {
    pool: SqlitePool,
    table_name: String,
}

impl SqliteBackend {
    /// Creates a backend over `pool` using the `user_sessions` table.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            table_name: "user_sessions".into(),
        }
    }

    /// Sets the table records are stored in.
    ///
    /// The name is interpolated into queries, so only ASCII alphanumerics and
    /// underscores are accepted; any other name leaves the default in place.
    pub fn with_table_name(mut self, table_name: impl AsRef<str>) -> Self {
        let table_name = table_name.as_ref();
        if !table_name.is_empty()
            && table_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.table_name = table_name.to_owned();
        } else {
            tracing::warn!(table_name, "ignoring invalid session table name");
        }
        self
    }

    /// Creates the sessions table if it doesn't exist.
    pub async fn migrate(&self) -> Result<(), PersistenceError> {
        let query = format!(
            r#"
            create table if not exists {}
            (
                session_id text primary key not null,
                user_id text not null,
                created_at text not null
            )
            "#,
            self.table_name
        );
        sqlx::query(&query).execute(&self.pool).await?;

        Ok(())
    }
}

#[async_trait]
impl PersistenceBackend for SqliteBackend {
    async fn load_all(&self) -> Result<Vec<SessionRecord>, PersistenceError> {
        let query = format!(
            "select session_id, user_id, created_at from {}",
            self.table_name
        );
        let rows: Vec<Row> = sqlx::query_as(&query).fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(into_record).collect())
    }

    async fn find(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionRecord>, PersistenceError> {
        let query = format!(
            "select session_id, user_id, created_at from {} where session_id = ?",
            self.table_name
        );
        let row: Option<Row> = sqlx::query_as(&query)
            .bind(session_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(into_record))
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        let query = format!(
            r#"
            insert into {} (session_id, user_id, created_at) values (?, ?, ?)
            on conflict(session_id) do update set
                user_id = excluded.user_id,
                created_at = excluded.created_at
            "#,
            self.table_name
        );
        sqlx::query(&query)
            .bind(record.session_id.as_str())
            .bind(record.user_id.as_str())
            .bind(record.created_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete(&self, session_id: &SessionId) -> Result<bool, PersistenceError> {
        let query = format!("delete from {} where session_id = ?", self.table_name);
        let result = sqlx::query(&query)
            .bind(session_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_for_user(&self, user_id: &UserId) -> Result<usize, PersistenceError> {
        let query = format!("delete from {} where user_id = ?", self.table_name);
        let result = sqlx::query(&query)
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend() -> SqliteBackend {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let backend = SqliteBackend::new(pool);
        backend.migrate().await.unwrap();
        backend
    }

    #[tokio::test]
    async fn test_save_find_delete() {
        let backend = backend().await;
        let record =
            SessionRecord::new(UserId::new("alice"), OffsetDateTime::UNIX_EPOCH).unwrap();

        backend.save(&record).await.unwrap();
        assert_eq!(
            backend.find(&record.session_id).await.unwrap(),
            Some(record.clone())
        );
        assert_eq!(backend.load_all().await.unwrap(), vec![record.clone()]);

        assert!(backend.delete(&record.session_id).await.unwrap());
        assert!(!backend.delete(&record.session_id).await.unwrap());
        assert_eq!(backend.find(&record.session_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_for_user() {
        let backend = backend().await;
        let bob = SessionRecord::new(UserId::new("bob"), OffsetDateTime::UNIX_EPOCH).unwrap();
        for user in ["alice", "alice"] {
            let record = SessionRecord::new(UserId::new(user), OffsetDateTime::UNIX_EPOCH).unwrap();
            backend.save(&record).await.unwrap();
        }
        backend.save(&bob).await.unwrap();

        assert_eq!(backend.delete_for_user(&UserId::new("alice")).await.unwrap(), 2);
        assert_eq!(backend.load_all().await.unwrap(), vec![bob]);
    }

    #[tokio::test]
    async fn test_invalid_table_name_is_ignored() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let backend = SqliteBackend::new(pool).with_table_name("sessions; drop table users");

        assert_eq!(backend.table_name, "user_sessions");
    }
}
