//! Data models for shelf
//!
//! Defines the record schema shared by the list manager, the query matcher
//! and the storage adapters: the [`Field`] names accepted at the query
//! boundary, the [`FieldValue`] they compare against, the stored
//! [`ItemFields`] and the [`ItemPatch`] used to change them.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sync status of an item relative to a remote copy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    #[default]
    New,
    ChangedStatus,
    ChangedMaterial,
    Deleted,
}

impl SyncStatus {
    /// Integer form used in queries and storage
    pub fn as_i64(self) -> i64 {
        match self {
            SyncStatus::Synced => 0,
            SyncStatus::New => 1,
            SyncStatus::ChangedStatus => 2,
            SyncStatus::ChangedMaterial => 3,
            SyncStatus::Deleted => 4,
        }
    }

    /// Parse the integer form
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(SyncStatus::Synced),
            1 => Some(SyncStatus::New),
            2 => Some(SyncStatus::ChangedStatus),
            3 => Some(SyncStatus::ChangedMaterial),
            4 => Some(SyncStatus::Deleted),
            _ => None,
        }
    }
}

/// Value type carried by a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Int,
    Bool,
    Time,
}

/// A recognized record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Guid,
    Url,
    Title,
    ResolvedUrl,
    ResolvedTitle,
    Excerpt,
    Preview,
    Status,
    Favorite,
    IsArticle,
    Unread,
    WordCount,
    ReadPosition,
    AddedBy,
    MarkedReadBy,
    AddedOn,
    StoredOn,
    MarkedReadOn,
}

impl Field {
    /// Every field, in storage column order
    pub const ALL: [Field; 18] = [
        Field::Guid,
        Field::Url,
        Field::Title,
        Field::ResolvedUrl,
        Field::ResolvedTitle,
        Field::Excerpt,
        Field::Preview,
        Field::Status,
        Field::Favorite,
        Field::IsArticle,
        Field::Unread,
        Field::WordCount,
        Field::ReadPosition,
        Field::AddedBy,
        Field::MarkedReadBy,
        Field::AddedOn,
        Field::StoredOn,
        Field::MarkedReadOn,
    ];

    /// Field name as used in queries and as the storage column name
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Guid => "guid",
            Field::Url => "url",
            Field::Title => "title",
            Field::ResolvedUrl => "resolved_url",
            Field::ResolvedTitle => "resolved_title",
            Field::Excerpt => "excerpt",
            Field::Preview => "preview",
            Field::Status => "status",
            Field::Favorite => "favorite",
            Field::IsArticle => "is_article",
            Field::Unread => "unread",
            Field::WordCount => "word_count",
            Field::ReadPosition => "read_position",
            Field::AddedBy => "added_by",
            Field::MarkedReadBy => "marked_read_by",
            Field::AddedOn => "added_on",
            Field::StoredOn => "stored_on",
            Field::MarkedReadOn => "marked_read_on",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::Guid
            | Field::Url
            | Field::Title
            | Field::ResolvedUrl
            | Field::ResolvedTitle
            | Field::Excerpt
            | Field::Preview
            | Field::AddedBy
            | Field::MarkedReadBy => FieldKind::Text,
            Field::Status | Field::WordCount | Field::ReadPosition => FieldKind::Int,
            Field::Favorite | Field::IsArticle | Field::Unread => FieldKind::Bool,
            Field::AddedOn | Field::StoredOn | Field::MarkedReadOn => FieldKind::Time,
        }
    }

    /// Whether the field may be absent on a stored record
    pub fn is_nullable(self) -> bool {
        !matches!(
            self,
            Field::Url | Field::Status | Field::Favorite | Field::IsArticle | Field::Unread
        )
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| format!("unknown field '{}'", s))
    }
}

/// A single field value as seen by the query matcher
///
/// Equality is exact: values of different variants never compare equal.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Int(i64),
    Bool(bool),
    Time(DateTime<Utc>),
}

impl FieldValue {
    /// Kind of a non-null value
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            FieldValue::Null => None,
            FieldValue::Text(_) => Some(FieldKind::Text),
            FieldValue::Int(_) => Some(FieldKind::Int),
            FieldValue::Bool(_) => Some(FieldKind::Bool),
            FieldValue::Time(_) => Some(FieldKind::Time),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Time(v)
    }
}

impl From<SyncStatus> for FieldValue {
    fn from(v: SyncStatus) -> Self {
        FieldValue::Int(v.as_i64())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// The stored fields of one reading list item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFields {
    /// Server-assigned identifier, absent for purely local items
    #[serde(default)]
    pub guid: Option<String>,
    /// Natural key
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub resolved_url: Option<String>,
    #[serde(default)]
    pub resolved_title: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub preview: Option<String>,
    #[serde(default)]
    pub status: SyncStatus,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub is_article: bool,
    #[serde(default = "default_unread")]
    pub unread: bool,
    #[serde(default)]
    pub word_count: Option<i64>,
    #[serde(default)]
    pub read_position: Option<i64>,
    /// Name of the device that added the item
    #[serde(default)]
    pub added_by: Option<String>,
    #[serde(default)]
    pub marked_read_by: Option<String>,
    #[serde(default)]
    pub added_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stored_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub marked_read_on: Option<DateTime<Utc>>,
}

fn default_unread() -> bool {
    true
}

impl ItemFields {
    /// Create a new, unread item for the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            guid: None,
            url: url.into(),
            title: None,
            resolved_url: None,
            resolved_title: None,
            excerpt: None,
            preview: None,
            status: SyncStatus::New,
            favorite: false,
            is_article: false,
            unread: true,
            word_count: None,
            read_position: None,
            added_by: None,
            marked_read_by: None,
            added_on: None,
            stored_on: None,
            marked_read_on: None,
        }
    }

    /// Set the title (builder style)
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the server-assigned identifier (builder style)
    pub fn with_guid(mut self, guid: impl Into<String>) -> Self {
        self.guid = Some(guid.into());
        self
    }

    /// Read one field as a matcher value
    pub fn get(&self, field: Field) -> FieldValue {
        match field {
            Field::Guid => self.guid.clone().into(),
            Field::Url => self.url.clone().into(),
            Field::Title => self.title.clone().into(),
            Field::ResolvedUrl => self.resolved_url.clone().into(),
            Field::ResolvedTitle => self.resolved_title.clone().into(),
            Field::Excerpt => self.excerpt.clone().into(),
            Field::Preview => self.preview.clone().into(),
            Field::Status => self.status.into(),
            Field::Favorite => self.favorite.into(),
            Field::IsArticle => self.is_article.into(),
            Field::Unread => self.unread.into(),
            Field::WordCount => self.word_count.into(),
            Field::ReadPosition => self.read_position.into(),
            Field::AddedBy => self.added_by.clone().into(),
            Field::MarkedReadBy => self.marked_read_by.clone().into(),
            Field::AddedOn => self.added_on.into(),
            Field::StoredOn => self.stored_on.into(),
            Field::MarkedReadOn => self.marked_read_on.into(),
        }
    }
}

/// A batch of field changes applied to an item in one commit
///
/// The URL is the natural key and cannot be patched. Nullable fields use
/// `Some(None)` to clear the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub guid: Option<Option<String>>,
    pub title: Option<Option<String>>,
    pub resolved_url: Option<Option<String>>,
    pub resolved_title: Option<Option<String>>,
    pub excerpt: Option<Option<String>>,
    pub preview: Option<Option<String>>,
    pub status: Option<SyncStatus>,
    pub favorite: Option<bool>,
    pub is_article: Option<bool>,
    pub unread: Option<bool>,
    pub word_count: Option<Option<i64>>,
    pub read_position: Option<Option<i64>>,
    pub added_by: Option<Option<String>>,
    pub marked_read_by: Option<Option<String>>,
    pub stored_on: Option<Option<DateTime<Utc>>>,
    pub marked_read_on: Option<Option<DateTime<Utc>>>,
}

impl ItemPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(Some(title.into()));
        self
    }

    pub fn excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(Some(excerpt.into()));
        self
    }

    pub fn guid(mut self, guid: impl Into<String>) -> Self {
        self.guid = Some(Some(guid.into()));
        self
    }

    pub fn status(mut self, status: SyncStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn favorite(mut self, favorite: bool) -> Self {
        self.favorite = Some(favorite);
        self
    }

    pub fn unread(mut self, unread: bool) -> Self {
        self.unread = Some(unread);
        self
    }

    pub fn read_position(mut self, position: i64) -> Self {
        self.read_position = Some(Some(position));
        self
    }

    /// Whether the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Write every set field into `fields`
    pub fn apply_to(&self, fields: &mut ItemFields) {
        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }

        set(&mut fields.guid, &self.guid);
        set(&mut fields.title, &self.title);
        set(&mut fields.resolved_url, &self.resolved_url);
        set(&mut fields.resolved_title, &self.resolved_title);
        set(&mut fields.excerpt, &self.excerpt);
        set(&mut fields.preview, &self.preview);
        set(&mut fields.status, &self.status);
        set(&mut fields.favorite, &self.favorite);
        set(&mut fields.is_article, &self.is_article);
        set(&mut fields.unread, &self.unread);
        set(&mut fields.word_count, &self.word_count);
        set(&mut fields.read_position, &self.read_position);
        set(&mut fields.added_by, &self.added_by);
        set(&mut fields.marked_read_by, &self.marked_read_by);
        set(&mut fields.stored_on, &self.stored_on);
        set(&mut fields.marked_read_on, &self.marked_read_on);
    }
}

/// Normalize a URL into its natural-key form
///
/// Trims whitespace, drops any `#fragment` and lowercases the scheme and
/// authority. Paths and queries are left untouched.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let url = match url.find('#') {
        Some(pos) => &url[..pos],
        None => url,
    };

    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let authority_start = scheme_end + 3;
    let authority_end = url[authority_start..]
        .find(['/', '?'])
        .map(|pos| authority_start + pos)
        .unwrap_or(url.len());

    let mut normalized = url[..authority_end].to_ascii_lowercase();
    normalized.push_str(&url[authority_end..]);
    normalized
}

/// Host part of a URL, without userinfo or port
pub fn url_domain(url: &str) -> Option<&str> {
    let rest = &url[url.find("://")? + 3..];
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let host = authority.rsplit('@').next().unwrap_or(authority);
    let host = host.split(':').next().unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Current time at the millisecond precision the stores keep
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Derived content identifier for a natural key
pub fn derive_item_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_fields_new() {
        let fields = ItemFields::new("https://example.com");
        assert_eq!(fields.url, "https://example.com");
        assert!(fields.unread);
        assert!(!fields.favorite);
        assert_eq!(fields.status, SyncStatus::New);
        assert!(fields.guid.is_none());
    }

    #[test]
    fn test_field_names_round_trip() {
        for field in Field::ALL {
            assert_eq!(field.as_str().parse::<Field>().unwrap(), field);
        }
        assert!("nonsense".parse::<Field>().is_err());
    }

    #[test]
    fn test_get_uses_exact_variants() {
        let fields = ItemFields::new("https://example.com").with_title("Example");
        assert_eq!(fields.get(Field::Title), FieldValue::Text("Example".into()));
        assert_eq!(fields.get(Field::Unread), FieldValue::Bool(true));
        assert_eq!(fields.get(Field::Status), FieldValue::Int(1));
        assert_eq!(fields.get(Field::WordCount), FieldValue::Null);
        assert_ne!(FieldValue::Int(1), FieldValue::Bool(true));
    }

    #[test]
    fn test_patch_applies_only_set_fields() {
        let mut fields = ItemFields::new("https://example.com").with_title("Before");
        fields.excerpt = Some("keep me".to_string());

        let patch = ItemPatch::new().title("After").favorite(true);
        patch.apply_to(&mut fields);

        assert_eq!(fields.title.as_deref(), Some("After"));
        assert!(fields.favorite);
        assert_eq!(fields.excerpt.as_deref(), Some("keep me"));
    }

    #[test]
    fn test_patch_clears_nullable_field() {
        let mut fields = ItemFields::new("https://example.com").with_title("Title");
        let patch = ItemPatch {
            title: Some(None),
            ..Default::default()
        };
        patch.apply_to(&mut fields);
        assert!(fields.title.is_none());
        assert!(ItemPatch::new().is_empty());
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("  HTTPS://Example.COM/Path?Q=1#section "),
            "https://example.com/Path?Q=1"
        );
        assert_eq!(normalize_url("https://example.com"), "https://example.com");
        assert_eq!(normalize_url("about:reader"), "about:reader");
    }

    #[test]
    fn test_url_domain() {
        assert_eq!(url_domain("https://user@www.example.com:8080/a"), Some("www.example.com"));
        assert_eq!(url_domain("https://example.com"), Some("example.com"));
        assert_eq!(url_domain("not a url"), None);
    }

    #[test]
    fn test_now_has_millisecond_precision() {
        assert_eq!(now().timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn test_derive_item_id_is_deterministic() {
        let a = derive_item_id("https://example.com");
        let b = derive_item_id("https://example.com");
        let c = derive_item_id("https://example.org");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 43);
    }

    #[test]
    fn test_item_fields_serialization() {
        let fields = ItemFields::new("https://example.com").with_title("Example");
        let json = serde_json::to_string(&fields).unwrap();
        let parsed: ItemFields = serde_json::from_str(&json).unwrap();
        assert_eq!(fields, parsed);

        let minimal: ItemFields = serde_json::from_str(r#"{"url":"https://x"}"#).unwrap();
        assert!(minimal.unread);
    }
}
