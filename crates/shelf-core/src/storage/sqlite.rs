//! SQLite store adapter
//!
//! Persists items in a single `items` table and compiles match
//! specifications to SQL instead of filtering in memory.
//!
//! ## Compilation
//!
//! - each options object becomes `(col = ? AND col IN (?, ?))`
//! - objects are OR-ed together
//! - a null value compiles to `col IS NULL`
//! - the trailing object adds `ORDER BY` and `LIMIT ? OFFSET ?`

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use tracing::{debug, info};

use super::schema::{init_schema, needs_init};
use super::{EachRecord, StoreAdapter, StoreError, StoreResult};
use crate::models::{Field, FieldValue, ItemFields, SyncStatus};
use crate::query::{self, Condition, QueryOptions};

/// SQLite-backed store adapter
pub struct SqliteStore {
    /// `None` once destroyed
    conn: Mutex<Option<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        Self::prepare(&conn)?;
        info!("Opened item store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::prepare(&conn)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path: None,
        })
    }

    /// Database file path, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn prepare(conn: &Connection) -> StoreResult<()> {
        if needs_init(conn) {
            init_schema(conn)?;
        }
        Ok(())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        f(conn)
    }
}

impl StoreAdapter for SqliteStore {
    fn count<'a>(&'a self, specs: &'a [QueryOptions]) -> BoxFuture<'a, StoreResult<usize>> {
        Box::pin(async move {
            self.with_conn(|conn| {
                let (where_sql, params) = compile_where(specs);
                let sql = format!("SELECT COUNT(*) FROM items{}", where_sql);
                let count: i64 =
                    conn.query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))?;
                Ok(count as usize)
            })
        })
    }

    fn for_each_item<'a>(
        &'a self,
        specs: &'a [QueryOptions],
        each: EachRecord<'a>,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.with_conn(|conn| {
                let (where_sql, mut params) = compile_where(specs);
                let (tail_sql, tail_params) = compile_paging(specs);
                params.extend(tail_params);

                let sql = format!(
                    "SELECT {} FROM items{}{}",
                    column_list(),
                    where_sql,
                    tail_sql
                );
                debug!("Item query: {}", sql);

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(params.iter()), ItemRow::from_row)?;
                for row in rows {
                    each(row?.hydrate()?);
                }
                Ok(())
            })
        })
    }

    fn add_item<'a>(&'a self, fields: &'a ItemFields) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.with_conn(|conn| {
                let placeholders = vec!["?"; Field::ALL.len()].join(", ");
                let sql = format!(
                    "INSERT INTO items ({}) VALUES ({})",
                    column_list(),
                    placeholders
                );
                let values: Vec<Value> = Field::ALL.iter().map(|f| to_sql(&fields.get(*f))).collect();
                conn.execute(&sql, params_from_iter(values.iter()))
                    .map_err(|e| StoreError::from_sqlite(e, &fields.url))?;
                Ok(())
            })
        })
    }

    fn update_item<'a>(&'a self, fields: &'a ItemFields) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.with_conn(|conn| {
                let columns: Vec<Field> = Field::ALL
                    .iter()
                    .copied()
                    .filter(|f| *f != Field::Url)
                    .collect();
                let assignments: Vec<String> =
                    columns.iter().map(|f| format!("{} = ?", f)).collect();
                let sql = format!("UPDATE items SET {} WHERE url = ?", assignments.join(", "));

                let mut values: Vec<Value> = columns.iter().map(|f| to_sql(&fields.get(*f))).collect();
                values.push(Value::Text(fields.url.clone()));

                let changed = conn
                    .execute(&sql, params_from_iter(values.iter()))
                    .map_err(|e| StoreError::from_sqlite(e, &fields.url))?;
                if changed == 0 {
                    return Err(StoreError::NotFound {
                        key: fields.url.clone(),
                    });
                }
                Ok(())
            })
        })
    }

    fn delete_item_by_key<'a>(&'a self, url: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.with_conn(|conn| {
                let changed = conn.execute("DELETE FROM items WHERE url = ?", [url])?;
                if changed == 0 {
                    return Err(StoreError::NotFound {
                        key: url.to_string(),
                    });
                }
                Ok(())
            })
        })
    }

    fn destroy(&self) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            let conn = self
                .conn
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(conn) = conn {
                conn.close().map_err(|(_, e)| StoreError::Database(e))?;
                info!("Closed item store");
            }
            Ok(())
        })
    }
}

// ==================== SQL compilation ====================

fn column_list() -> String {
    Field::ALL
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Storage form of a matcher value
fn to_sql(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Text(s) => Value::Text(s.clone()),
        FieldValue::Int(i) => Value::Integer(*i),
        FieldValue::Bool(b) => Value::Integer(i64::from(*b)),
        FieldValue::Time(t) => Value::Integer(t.timestamp_millis()),
    }
}

/// Compile the disjunction of options objects into a `WHERE` clause
fn compile_where(specs: &[QueryOptions]) -> (String, Vec<Value>) {
    // An object without conditions matches every row
    if specs.is_empty() || specs.iter().any(QueryOptions::is_unfiltered) {
        return (String::new(), Vec::new());
    }

    let mut params = Vec::new();
    let mut clauses = Vec::new();
    for options in specs {
        let mut parts = Vec::new();
        for (field, condition) in options.conditions() {
            parts.push(compile_condition(field, condition, &mut params));
        }
        clauses.push(format!("({})", parts.join(" AND ")));
    }

    (format!(" WHERE {}", clauses.join(" OR ")), params)
}

fn compile_condition(field: Field, condition: &Condition, params: &mut Vec<Value>) -> String {
    match condition {
        Condition::Eq(FieldValue::Null) => format!("{} IS NULL", field),
        Condition::Eq(value) => {
            params.push(to_sql(value));
            format!("{} = ?", field)
        }
        Condition::AnyOf(values) => {
            let present: Vec<&FieldValue> =
                values.iter().filter(|v| **v != FieldValue::Null).collect();

            let mut alternatives = Vec::new();
            if !present.is_empty() {
                let placeholders = vec!["?"; present.len()].join(", ");
                params.extend(present.into_iter().map(to_sql));
                alternatives.push(format!("{} IN ({})", field, placeholders));
            }
            if values.contains(&FieldValue::Null) {
                alternatives.push(format!("{} IS NULL", field));
            }

            if alternatives.is_empty() {
                "0".to_string()
            } else {
                format!("({})", alternatives.join(" OR "))
            }
        }
    }
}

/// `ORDER BY` / `LIMIT` tail taken from the trailing options object
fn compile_paging(specs: &[QueryOptions]) -> (String, Vec<Value>) {
    let Some(control) = query::trailing(specs) else {
        return (" ORDER BY rowid".to_string(), Vec::new());
    };

    let mut sql = match control.sort {
        Some(field) => format!(
            " ORDER BY {} {}, rowid",
            field,
            if control.descending { "DESC" } else { "ASC" }
        ),
        None => " ORDER BY rowid".to_string(),
    };

    let mut params = Vec::new();
    if control.limit.is_some() || control.offset.is_some() {
        sql.push_str(" LIMIT ? OFFSET ?");
        params.push(Value::Integer(control.limit.map_or(-1, |l| l as i64)));
        params.push(Value::Integer(control.offset.unwrap_or(0) as i64));
    }

    (sql, params)
}

// ==================== Row decoding ====================

struct ItemRow {
    guid: Option<String>,
    url: String,
    title: Option<String>,
    resolved_url: Option<String>,
    resolved_title: Option<String>,
    excerpt: Option<String>,
    preview: Option<String>,
    status: i64,
    favorite: bool,
    is_article: bool,
    unread: bool,
    word_count: Option<i64>,
    read_position: Option<i64>,
    added_by: Option<String>,
    marked_read_by: Option<String>,
    added_on: Option<i64>,
    stored_on: Option<i64>,
    marked_read_on: Option<i64>,
}

impl ItemRow {
    /// Read a row selected with [`column_list`]
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            guid: row.get(0)?,
            url: row.get(1)?,
            title: row.get(2)?,
            resolved_url: row.get(3)?,
            resolved_title: row.get(4)?,
            excerpt: row.get(5)?,
            preview: row.get(6)?,
            status: row.get(7)?,
            favorite: row.get(8)?,
            is_article: row.get(9)?,
            unread: row.get(10)?,
            word_count: row.get(11)?,
            read_position: row.get(12)?,
            added_by: row.get(13)?,
            marked_read_by: row.get(14)?,
            added_on: row.get(15)?,
            stored_on: row.get(16)?,
            marked_read_on: row.get(17)?,
        })
    }

    fn hydrate(self) -> StoreResult<ItemFields> {
        let status = SyncStatus::from_i64(self.status).ok_or_else(|| StoreError::InvalidRow {
            key: self.url.clone(),
            details: format!("unknown status {}", self.status),
        })?;
        let added_on = timestamp(&self.url, self.added_on)?;
        let stored_on = timestamp(&self.url, self.stored_on)?;
        let marked_read_on = timestamp(&self.url, self.marked_read_on)?;

        Ok(ItemFields {
            guid: self.guid,
            url: self.url,
            title: self.title,
            resolved_url: self.resolved_url,
            resolved_title: self.resolved_title,
            excerpt: self.excerpt,
            preview: self.preview,
            status,
            favorite: self.favorite,
            is_article: self.is_article,
            unread: self.unread,
            word_count: self.word_count,
            read_position: self.read_position,
            added_by: self.added_by,
            marked_read_by: self.marked_read_by,
            added_on,
            stored_on,
            marked_read_on,
        })
    }
}

fn timestamp(key: &str, millis: Option<i64>) -> StoreResult<Option<DateTime<Utc>>> {
    millis
        .map(|ms| {
            DateTime::from_timestamp_millis(ms).ok_or_else(|| StoreError::InvalidRow {
                key: key.to_string(),
                details: format!("timestamp out of range: {}", ms),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn collect(store: &SqliteStore, specs: &[QueryOptions]) -> Vec<ItemFields> {
        let mut items = Vec::new();
        store
            .for_each_item(specs, &mut |fields: ItemFields| items.push(fields))
            .await
            .unwrap();
        items
    }

    async fn seeded() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();

        let mut rust = ItemFields::new("https://rust-lang.org").with_title("Rust");
        rust.word_count = Some(500);
        rust.favorite = true;
        store.add_item(&rust).await.unwrap();

        let mut example = ItemFields::new("https://example.com").with_title("Example");
        example.word_count = Some(100);
        example.unread = false;
        store.add_item(&example).await.unwrap();

        let mut news = ItemFields::new("https://news.example.com");
        news.word_count = Some(300);
        store.add_item(&news).await.unwrap();

        store
    }

    #[test]
    fn test_compile_where() {
        let specs = vec![
            QueryOptions::new()
                .eq(Field::Unread, true)
                .any_of(Field::Status, [1, 2]),
            QueryOptions::new().eq(Field::Title, Option::<String>::None),
        ];
        let (sql, params) = compile_where(&specs);
        assert_eq!(
            sql,
            " WHERE (status IN (?, ?) AND unread = ?) OR (title IS NULL)"
        );
        assert_eq!(
            params,
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(1)]
        );
    }

    #[test]
    fn test_compile_where_unfiltered_object_matches_all() {
        let specs = vec![
            QueryOptions::new().eq(Field::Unread, true),
            QueryOptions::new().limit(3),
        ];
        let (sql, params) = compile_where(&specs);
        assert!(sql.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_compile_any_of_with_null_and_empty() {
        let mut params = Vec::new();
        let cond = Condition::AnyOf(vec![FieldValue::Null, FieldValue::Int(3)]);
        assert_eq!(
            compile_condition(Field::WordCount, &cond, &mut params),
            "(word_count IN (?) OR word_count IS NULL)"
        );
        assert_eq!(
            compile_condition(Field::WordCount, &Condition::AnyOf(vec![]), &mut params),
            "0"
        );
    }

    #[test]
    fn test_compile_paging() {
        let specs = vec![QueryOptions::new()
            .sort_by(Field::AddedOn)
            .descending()
            .offset(4)];
        let (sql, params) = compile_paging(&specs);
        assert_eq!(sql, " ORDER BY added_on DESC, rowid LIMIT ? OFFSET ?");
        assert_eq!(params, vec![Value::Integer(-1), Value::Integer(4)]);
    }

    #[tokio::test]
    async fn test_query_filters_and_sorts() {
        let store = seeded().await;

        let specs = vec![
            QueryOptions::new().eq(Field::Favorite, true),
            QueryOptions::new()
                .eq(Field::Unread, false)
                .sort_by(Field::WordCount),
        ];
        let items = collect(&store, &specs).await;
        let urls: Vec<&str> = items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com", "https://rust-lang.org"]);

        assert_eq!(store.count(&specs).await.unwrap(), 2);
        assert_eq!(store.count(&[]).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_limit_and_offset() {
        let store = seeded().await;
        let specs = vec![QueryOptions::new()
            .sort_by(Field::WordCount)
            .descending()
            .offset(1)
            .limit(1)];
        let items = collect(&store, &specs).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://news.example.com");
    }

    #[tokio::test]
    async fn test_fields_round_trip_through_sqlite() {
        let store = SqliteStore::open_in_memory().unwrap();

        let mut fields = ItemFields::new("https://example.com/article").with_guid("abc");
        fields.title = Some("Title \"quoted\"".to_string());
        fields.status = SyncStatus::ChangedMaterial;
        fields.is_article = true;
        fields.added_on = DateTime::from_timestamp_millis(1_700_000_000_123);
        fields.read_position = Some(42);
        store.add_item(&fields).await.unwrap();

        let items = collect(&store, &[]).await;
        assert_eq!(items, vec![fields]);
    }

    #[tokio::test]
    async fn test_duplicate_url_and_guid() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .add_item(&ItemFields::new("https://a.com").with_guid("g1"))
            .await
            .unwrap();

        let err = store.add_item(&ItemFields::new("https://a.com")).await;
        assert!(matches!(err, Err(StoreError::Duplicate { .. })));

        let err = store
            .add_item(&ItemFields::new("https://b.com").with_guid("g1"))
            .await;
        assert!(matches!(err, Err(StoreError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = seeded().await;

        let mut fields = ItemFields::new("https://example.com").with_title("Renamed");
        fields.unread = true;
        store.update_item(&fields).await.unwrap();

        let specs = vec![QueryOptions::new().eq(Field::Title, "Renamed")];
        assert_eq!(store.count(&specs).await.unwrap(), 1);

        assert!(matches!(
            store.update_item(&ItemFields::new("https://missing.com")).await,
            Err(StoreError::NotFound { .. })
        ));

        store.delete_item_by_key("https://example.com").await.unwrap();
        assert_eq!(store.count(&[]).await.unwrap(), 2);
        assert!(matches!(
            store.delete_item_by_key("https://example.com").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_data_persists_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("shelf.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .add_item(&ItemFields::new("https://persist.com").with_title("Persistent"))
                .await
                .unwrap();
            store.destroy().await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        let items = collect(&store, &[]).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title.as_deref(), Some("Persistent"));
    }

    #[tokio::test]
    async fn test_destroy_closes_store() {
        let store = seeded().await;
        store.destroy().await.unwrap();
        assert!(matches!(store.count(&[]).await, Err(StoreError::Closed)));
        // Second destroy is a no-op
        store.destroy().await.unwrap();
    }
}
