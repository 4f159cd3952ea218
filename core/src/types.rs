//! Domain model for a todo item and its local JSON representation.
//!
//! # Design
//! `TodoItem` is an immutable value: edits produce a new item through
//! `edited`/`toggled_done`, which stamp `date_edited`. Times are
//! `DateTime<Utc>` truncated to whole seconds so that every codec (local
//! JSON, CSV, wire) round-trips them exactly.
//!
//! The serde derive here *is* the local cache schema (`isDone`,
//! `dateCreated`, ...). The wire schema lives in `wire` and is never derived
//! from this type.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SyncError};

/// Priority of a todo. `Basic` is the default and is omitted from the local
/// cache when serialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    #[default]
    Basic,
    Important,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Low => "low",
            Importance::Basic => "basic",
            Importance::Important => "important",
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Importance::Basic
    }
}

impl std::str::FromStr for Importance {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Importance::Low),
            "basic" => Ok(Importance::Basic),
            "important" => Ok(Importance::Important),
            other => Err(SyncError::InvalidFormat(format!("unknown importance {other:?}"))),
        }
    }
}

/// A single todo item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Importance::is_default")]
    pub importance: Importance,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub deadline: Option<DateTime<Utc>>,
    pub is_done: bool,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub date_created: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub date_edited: Option<DateTime<Utc>>,
}

/// Current time at whole-second resolution.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Convert Unix seconds into a timestamp, rejecting out-of-range values.
pub fn from_unix(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| SyncError::InvalidFormat(format!("timestamp out of range: {secs}")))
}

impl TodoItem {
    /// Create a new, not-done item with a fresh UUID and `date_created = now`.
    pub fn new(
        text: impl Into<String>,
        importance: Importance,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        Self::with_id(Uuid::new_v4().to_string(), text, importance, deadline)
    }

    /// Like `new` but with a caller-chosen id.
    pub fn with_id(
        id: impl Into<String>,
        text: impl Into<String>,
        importance: Importance,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let item = TodoItem {
            id: id.into(),
            text: text.into(),
            importance,
            deadline: deadline.map(|d| d.trunc_subsecs(0)),
            is_done: false,
            date_created: now(),
            date_edited: None,
        };
        item.validate()?;
        Ok(item)
    }

    /// Reject items the store must never hold.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(SyncError::InvalidFormat("empty id".to_string()));
        }
        if self.text.trim().is_empty() {
            return Err(SyncError::InvalidFormat(format!("item {} has empty text", self.id)));
        }
        Ok(())
    }

    /// Time used for recency ordering.
    pub fn touched_at(&self) -> DateTime<Utc> {
        self.date_edited.unwrap_or(self.date_created)
    }

    pub fn toggled_done(&self) -> Self {
        TodoItem {
            is_done: !self.is_done,
            date_edited: Some(now()),
            ..self.clone()
        }
    }

    pub fn edited(
        &self,
        text: impl Into<String>,
        importance: Importance,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let item = TodoItem {
            text: text.into(),
            importance,
            deadline: deadline.map(|d| d.trunc_subsecs(0)),
            date_edited: Some(now()),
            ..self.clone()
        };
        item.validate()?;
        Ok(item)
    }
}

/// Sort most-recently-touched first. Ties fall back to id so the order is
/// stable across calls.
pub fn sort_by_recency(items: &mut [TodoItem]) {
    items.sort_by(|a, b| {
        b.touched_at()
            .cmp(&a.touched_at())
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        from_unix(secs).unwrap()
    }

    fn item(id: &str, created: i64, edited: Option<i64>) -> TodoItem {
        TodoItem {
            id: id.to_string(),
            text: "text".to_string(),
            importance: Importance::Basic,
            deadline: None,
            is_done: false,
            date_created: ts(created),
            date_edited: edited.map(ts),
        }
    }

    #[test]
    fn parses_json_without_optionals() {
        let json = r#"{"id":"id","text":"text","isDone":true,"importance":"low","dateCreated":1686945208}"#;
        let item: TodoItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, "id");
        assert_eq!(item.importance, Importance::Low);
        assert_eq!(item.deadline, None);
        assert_eq!(item.date_created, ts(1686945208));
        assert_eq!(item.date_edited, None);
        assert!(item.is_done);
    }

    #[test]
    fn missing_importance_defaults_to_basic() {
        let json = r#"{"id":"id","text":"text","isDone":false,"dateCreated":1686945208,"dateEdited":1686945209,"deadline":1686945309}"#;
        let item: TodoItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.importance, Importance::Basic);
        assert_eq!(item.deadline, Some(ts(1686945309)));
        assert_eq!(item.date_edited, Some(ts(1686945209)));
    }

    #[test]
    fn default_fields_are_omitted() {
        let json = serde_json::to_value(item("1", 100, None)).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("importance"));
        assert!(!obj.contains_key("deadline"));
        assert!(!obj.contains_key("dateEdited"));
        assert_eq!(obj["dateCreated"], 100);
        assert_eq!(obj["isDone"], false);
    }

    #[test]
    fn local_json_roundtrip_preserves_every_field() {
        let original = TodoItem {
            id: "abc".to_string(),
            text: "buy milk, eggs".to_string(),
            importance: Importance::Important,
            deadline: Some(ts(1_700_000_000)),
            is_done: true,
            date_created: ts(1_690_000_000),
            date_edited: Some(ts(1_695_000_000)),
        };
        let json = serde_json::to_string(&original).unwrap();
        let back: TodoItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn unknown_importance_is_rejected() {
        let json = r#"{"id":"id","text":"t","isDone":false,"importance":"urgent","dateCreated":1}"#;
        assert!(serde_json::from_str::<TodoItem>(json).is_err());
    }

    #[test]
    fn new_item_has_uuid_and_whole_seconds() {
        let item = TodoItem::new("walk dog", Importance::Basic, None).unwrap();
        assert!(Uuid::parse_str(&item.id).is_ok());
        assert_eq!(item.date_created.timestamp_subsec_nanos(), 0);
        assert!(!item.is_done);
    }

    #[test]
    fn empty_text_is_rejected() {
        let err = TodoItem::new("   ", Importance::Basic, None).unwrap_err();
        assert!(matches!(err, SyncError::InvalidFormat(_)));
    }

    #[test]
    fn toggled_done_stamps_edit_time() {
        let original = item("1", 100, None);
        let toggled = original.toggled_done();
        assert!(toggled.is_done);
        assert!(toggled.date_edited.is_some());
        assert_eq!(toggled.id, original.id);
        assert!(!toggled.toggled_done().is_done);
    }

    #[test]
    fn recency_prefers_edit_time() {
        let mut items = vec![
            item("old", 100, None),
            item("edited", 50, Some(300)),
            item("new", 200, None),
        ];
        sort_by_recency(&mut items);
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["edited", "new", "old"]);
    }
}
