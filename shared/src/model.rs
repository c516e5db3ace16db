use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::event::{ItemId, ValidationError};

/// Epoch seconds, the unit the backend speaks.
pub type UnixTimeSecs = i64;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Lost,
    Found,
}

impl ItemKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lost => "lost",
            Self::Found => "found",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Electronics,
    Books,
    Clothing,
    Accessories,
    Documents,
    Keys,
    Bags,
    Sports,
    #[default]
    #[serde(other)]
    Other,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Self::Electronics,
        Self::Books,
        Self::Clothing,
        Self::Accessories,
        Self::Documents,
        Self::Keys,
        Self::Bags,
        Self::Sports,
        Self::Other,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Electronics => "electronics",
            Self::Books => "books",
            Self::Clothing => "clothing",
            Self::Accessories => "accessories",
            Self::Documents => "documents",
            Self::Keys => "keys",
            Self::Bags => "bags",
            Self::Sports => "sports",
            Self::Other => "other",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// The backend writes "" for absent optional text.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

#[derive(Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub name: String,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub location: String,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Category,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub finder: Option<String>,
    #[serde(
        default,
        alias = "finderEmail",
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub email: Option<String>,
    #[serde(
        default,
        alias = "finderPhone",
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub phone: Option<String>,
    #[serde(default)]
    pub timestamp: UnixTimeSecs,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<UnixTimeSecs>,
}

impl Item {
    /// Whoever is attached to the record: the owner of a lost item, the finder of a found one.
    #[must_use]
    pub fn contact_name(&self) -> Option<&str> {
        match self.kind {
            ItemKind::Lost => self.owner.as_deref().or(self.finder.as_deref()),
            ItemKind::Found => self.finder.as_deref().or(self.owner.as_deref()),
        }
    }

    /// Case-insensitive substring match over name, owner and location.
    #[must_use]
    pub fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&needle)
            || self
                .owner
                .as_ref()
                .is_some_and(|o| o.to_lowercase().contains(&needle))
            || self.location.to_lowercase().contains(&needle)
    }
}

// Redact debug output because this can contain contact details.
impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("location", &self.location)
            .field("category", &self.category)
            .field("email_present", &self.email.is_some())
            .field("phone_present", &self.phone.is_some())
            .field("timestamp", &self.timestamp)
            .field("archived", &self.archived)
            .finish_non_exhaustive()
    }
}

/// Ordered, duplicate-free set of the items currently displayed.
///
/// Membership mirrors the last applied fetch. Items removed by a confirmed
/// mutation leave a tombstone carrying the first fetch sequence number that
/// was issued after the confirmation; snapshots from older fetches cannot
/// bring them back, snapshots from newer fetches are authoritative.
#[derive(Clone, Debug, Default)]
pub struct ItemCollection {
    items: Vec<Item>,
    tombstones: HashMap<ItemId, u64>,
}

impl ItemCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a collection straight from a list, keeping the first occurrence of each id.
    #[must_use]
    pub fn from_items(items: Vec<Item>) -> Self {
        let mut collection = Self::new();
        collection.items = dedup(items);
        collection
    }

    /// Replaces the whole collection with a fetched snapshot. Returns the items
    /// that were held back because a confirmed mutation already removed them.
    ///
    /// `oldest_outstanding` is the lowest fetch sequence still in flight. A
    /// tombstone outlives every fetch issued before its watermark, so a late
    /// older snapshot is still held back after a newer one was applied.
    pub fn apply_snapshot(
        &mut self,
        items: Vec<Item>,
        fetch_seq: u64,
        oldest_outstanding: Option<u64>,
    ) -> Vec<Item> {
        let horizon = oldest_outstanding.map_or(fetch_seq, |oldest| oldest.min(fetch_seq));
        self.tombstones.retain(|_, watermark| *watermark > horizon);

        let tombstones = &self.tombstones;
        let (held_back, kept): (Vec<Item>, Vec<Item>) = dedup(items)
            .into_iter()
            .partition(|item| tombstones.get(&item.id).is_some_and(|w| *w > fetch_seq));

        self.items = kept;
        held_back
    }

    /// Removes an item the server confirmed as gone. `next_fetch_seq` is the
    /// sequence number the next issued fetch will carry.
    pub fn remove_confirmed(&mut self, id: &ItemId, next_fetch_seq: u64) -> Option<Item> {
        self.tombstones.insert(id.clone(), next_fetch_seq);
        let index = self.items.iter().position(|item| &item.id == id)?;
        Some(self.items.remove(index))
    }

    #[must_use]
    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.items.iter().find(|item| &item.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &ItemId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Item] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn pending_tombstones(&self) -> usize {
        self.tombstones.len()
    }
}

fn dedup(items: Vec<Item>) -> Vec<Item> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .collect()
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    #[serde(default)]
    pub total_items: u64,
    #[serde(default)]
    pub lost_items: u64,
    #[serde(default)]
    pub found_items: u64,
    #[serde(default)]
    pub active_items: u64,
    #[serde(default)]
    pub archived_items: u64,
}

impl Stats {
    pub fn decrement(&mut self, kind: Option<ItemKind>) {
        self.total_items = self.total_items.saturating_sub(1);
        match kind {
            Some(ItemKind::Lost) => self.lost_items = self.lost_items.saturating_sub(1),
            Some(ItemKind::Found) => self.found_items = self.found_items.saturating_sub(1),
            None => {}
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LocationCount {
    pub location: String,
    pub count: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    #[serde(default)]
    pub total_items: u64,
    #[serde(default)]
    pub claimed_items: u64,
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub average_claim_time_hours: f64,
    #[serde(default)]
    pub top_locations: Vec<LocationCount>,
    #[serde(default)]
    pub top_categories: Vec<CategoryCount>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Catalog {
    pub locations: Vec<String>,
    pub categories: Vec<String>,
}

/// Which list the feed polls.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FeedFilter {
    #[default]
    All,
    Lost,
    Found,
}

impl FeedFilter {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "lost" => Some(Self::Lost),
            "found" => Some(Self::Found),
            _ => None,
        }
    }
}

/// One refresh: the item list and the counters, fetched together.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct FeedSnapshot {
    pub items: Vec<Item>,
    pub stats: Stats,
}

// --- Report submission payloads ---

fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

#[derive(Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LostReport {
    pub name: String,
    pub color: String,
    pub location: String,
    pub owner: String,
    pub email: String,
    pub description: String,
    pub category: Category,
}

impl LostReport {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.name, "name")?;
        require(&self.location, "location")?;
        require(&self.owner, "owner")?;
        require(&self.description, "description")
    }
}

impl fmt::Debug for LostReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LostReport")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("category", &self.category)
            .field("email_present", &!self.email.is_empty())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FoundReport {
    pub name: String,
    pub color: String,
    pub location: String,
    pub finder: String,
    pub finder_phone: String,
    pub finder_email: String,
    pub description: String,
    pub category: Category,
}

impl FoundReport {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.name, "name")?;
        require(&self.location, "location")?;
        require(&self.description, "description")
    }
}

impl fmt::Debug for FoundReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FoundReport")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("category", &self.category)
            .field("finder_phone_present", &!self.finder_phone.is_empty())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FoundMatch {
    #[serde(default)]
    pub item_id: Option<ItemId>,
    pub item_name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub color: String,
    pub score: f64,
    #[serde(default)]
    pub name_score: f64,
    #[serde(default)]
    pub color_score: f64,
    #[serde(default)]
    pub proximity_score: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SubmitLostResponse {
    pub id: ItemId,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SubmitFoundResponse {
    #[serde(default)]
    pub id: Option<ItemId>,
    #[serde(default)]
    pub matches: Vec<FoundMatch>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportReceipt {
    Lost {
        id: ItemId,
    },
    Found {
        id: Option<ItemId>,
        matches: Vec<FoundMatch>,
    },
}

/// Generic `{"success": true, "message": ...}` acknowledgement.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Ack {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct WebhookConfig {
    #[serde(default, alias = "webhookUrl")]
    pub url: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveExpiredResponse {
    #[serde(default)]
    pub archived_count: u64,
}

/// Filters for `GET /search/advanced`; unset fields are left off the query string.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedSearchFilters {
    pub name: Option<String>,
    pub color: Option<String>,
    pub location: Option<String>,
    pub category: Option<Category>,
    pub kind: Option<ItemKind>,
    pub date_from: Option<UnixTimeSecs>,
    pub date_to: Option<UnixTimeSecs>,
    pub include_archived: bool,
}

impl AdvancedSearchFilters {
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        let text = [
            ("name", &self.name),
            ("color", &self.color),
            ("location", &self.location),
        ];
        for (key, value) in text {
            if let Some(v) = value.as_ref().filter(|v| !v.trim().is_empty()) {
                pairs.push((key, v.trim().to_string()));
            }
        }
        if let Some(category) = self.category {
            pairs.push(("category", category.as_str().to_string()));
        }
        if let Some(kind) = self.kind {
            pairs.push(("type", kind.as_str().to_string()));
        }
        if let Some(from) = self.date_from {
            pairs.push(("dateFrom", from.to_string()));
        }
        if let Some(to) = self.date_to {
            pairs.push(("dateTo", to.to_string()));
        }
        if self.include_archived {
            pairs.push(("includeArchived", "true".to_string()));
        }
        pairs
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn item(id: &str, kind: ItemKind, location: &str) -> Item {
        Item {
            id: ItemId::new(id),
            kind,
            name: format!("item {id}"),
            color: None,
            location: location.to_string(),
            description: None,
            category: Category::Other,
            owner: None,
            finder: None,
            email: None,
            phone: None,
            timestamp: 1_700_000_000,
            archived: false,
            expires_at: None,
        }
    }
}
