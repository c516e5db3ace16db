//! Two-phase lifecycle mutations: validate locally, call remotely, and only
//! then commit the removal to the local collection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

use crate::event::{ItemId, ValidationError};
use crate::gateway::GatewayError;
use crate::model::{ItemCollection, ItemKind, Stats};

/// Who is claiming an item. Both fields are trimmed and non-empty.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claimant {
    #[serde(rename = "claimedBy")]
    name: String,
    #[serde(rename = "claimerPhone")]
    phone: String,
}

impl Claimant {
    pub fn new(name: &str, phone: &str) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingClaimantName);
        }
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(ValidationError::MissingClaimantPhone);
        }
        Ok(Self {
            name: name.to_string(),
            phone: phone.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }
}

impl fmt::Debug for Claimant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claimant")
            .field("name", &self.name)
            .field("phone", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationOp {
    Delete,
    Claim(Claimant),
    Archive,
}

impl MutationOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Claim(_) => "claim",
            Self::Archive => "archive",
        }
    }
}

/// A validated mutation waiting for its remote call. `kind` is the item's
/// type as seen when the request was made; it picks the counter bucket to
/// decrement on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationTicket {
    pub seq: u64,
    pub item_id: ItemId,
    pub op: MutationOp,
    pub kind: Option<ItemKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Confirmed {
        item_id: ItemId,
        op: &'static str,
        /// False when a refresh had already dropped the item locally.
        removed: bool,
    },
    Rejected {
        item_id: ItemId,
        op: &'static str,
        error: GatewayError,
    },
}

#[derive(Debug, Default)]
pub struct MutationCoordinator {
    next_seq: u64,
    in_flight: BTreeMap<u64, ItemId>,
    confirmed: u64,
    rejected: u64,
}

impl MutationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_delete(
        &mut self,
        id: &ItemId,
        items: &ItemCollection,
    ) -> Result<MutationTicket, ValidationError> {
        self.issue(id, MutationOp::Delete, items)
    }

    pub fn request_claim(
        &mut self,
        id: &ItemId,
        name: &str,
        phone: &str,
        items: &ItemCollection,
    ) -> Result<MutationTicket, ValidationError> {
        if id.is_blank() {
            return Err(ValidationError::EmptyItemId);
        }
        let claimant = Claimant::new(name, phone)?;
        self.issue(id, MutationOp::Claim(claimant), items)
    }

    pub fn request_archive(
        &mut self,
        id: &ItemId,
        items: &ItemCollection,
    ) -> Result<MutationTicket, ValidationError> {
        self.issue(id, MutationOp::Archive, items)
    }

    fn issue(
        &mut self,
        id: &ItemId,
        op: MutationOp,
        items: &ItemCollection,
    ) -> Result<MutationTicket, ValidationError> {
        if id.is_blank() {
            return Err(ValidationError::EmptyItemId);
        }
        self.next_seq += 1;
        self.in_flight.insert(self.next_seq, id.clone());
        Ok(MutationTicket {
            seq: self.next_seq,
            item_id: id.clone(),
            op,
            kind: items.get(id).map(|item| item.kind),
        })
    }

    /// Applies the server's verdict. Only a confirmation touches `items` and
    /// `stats`; `next_fetch_seq` keeps fetches issued before the confirmation
    /// from bringing the item back.
    pub fn finish(
        &mut self,
        ticket: &MutationTicket,
        result: Result<(), GatewayError>,
        items: &mut ItemCollection,
        stats: &mut Stats,
        next_fetch_seq: u64,
    ) -> MutationOutcome {
        self.in_flight.remove(&ticket.seq);
        let op = ticket.op.name();

        match result {
            Ok(()) => {
                let removed = items
                    .remove_confirmed(&ticket.item_id, next_fetch_seq)
                    .is_some();
                stats.decrement(ticket.kind);
                self.confirmed += 1;
                info!(item_id = %ticket.item_id, op, removed, "mutation confirmed");
                MutationOutcome::Confirmed {
                    item_id: ticket.item_id.clone(),
                    op,
                    removed,
                }
            }
            Err(error) => {
                self.rejected += 1;
                warn!(item_id = %ticket.item_id, op, %error, "mutation rejected");
                MutationOutcome::Rejected {
                    item_id: ticket.item_id.clone(),
                    op,
                    error,
                }
            }
        }
    }

    pub fn is_pending(&self, id: &ItemId) -> bool {
        self.in_flight.values().any(|pending| pending == id)
    }

    /// Ids with at least one request in flight, sorted and unique.
    pub fn pending_ids(&self) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self.in_flight.values().cloned().collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn confirmed_count(&self) -> u64 {
        self.confirmed
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::item;

    fn seeded() -> (ItemCollection, Stats) {
        let items = ItemCollection::from_items(vec![
            item("abc", ItemKind::Found, "Library"),
            item("def", ItemKind::Lost, "Cafeteria"),
        ]);
        let stats = Stats {
            total_items: 2,
            lost_items: 1,
            found_items: 1,
            ..Stats::default()
        };
        (items, stats)
    }

    #[test]
    fn claim_requires_name_and_phone() {
        let (items, _) = seeded();
        let mut coordinator = MutationCoordinator::new();
        let id = ItemId::new("abc");

        assert_eq!(
            coordinator.request_claim(&id, "   ", "0300", &items),
            Err(ValidationError::MissingClaimantName)
        );
        assert_eq!(
            coordinator.request_claim(&id, "Ali", "", &items),
            Err(ValidationError::MissingClaimantPhone)
        );
        assert!(coordinator.pending_ids().is_empty());
    }

    #[test]
    fn claim_trims_and_serializes_claimant() {
        let (items, _) = seeded();
        let mut coordinator = MutationCoordinator::new();
        let ticket = coordinator
            .request_claim(&ItemId::new("abc"), "  Ali ", " 03001234567 ", &items)
            .unwrap();

        let MutationOp::Claim(claimant) = &ticket.op else {
            panic!("expected claim op");
        };
        assert_eq!(claimant.name(), "Ali");
        let json = serde_json::to_value(claimant).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"claimedBy": "Ali", "claimerPhone": "03001234567"})
        );
        assert!(!format!("{claimant:?}").contains("0300"));
        assert_eq!(ticket.kind, Some(ItemKind::Found));
    }

    #[test]
    fn blank_id_is_rejected() {
        let (items, _) = seeded();
        let mut coordinator = MutationCoordinator::new();
        assert_eq!(
            coordinator.request_delete(&ItemId::new(" "), &items),
            Err(ValidationError::EmptyItemId)
        );
    }

    #[test]
    fn confirmed_delete_removes_item_and_decrements_bucket() {
        let (mut items, mut stats) = seeded();
        let mut coordinator = MutationCoordinator::new();
        let ticket = coordinator
            .request_delete(&ItemId::new("def"), &items)
            .unwrap();
        assert!(coordinator.is_pending(&ItemId::new("def")));
        // Nothing changes before the server answers.
        assert_eq!(items.len(), 2);

        let outcome = coordinator.finish(&ticket, Ok(()), &mut items, &mut stats, 1);
        assert!(matches!(outcome, MutationOutcome::Confirmed { removed: true, .. }));
        assert!(!items.contains(&ItemId::new("def")));
        assert_eq!(stats.total_items, 1);
        assert_eq!(stats.lost_items, 0);
        assert_eq!(stats.found_items, 1);
        assert!(!coordinator.is_pending(&ItemId::new("def")));
    }

    #[test]
    fn rejected_mutation_leaves_collection_untouched() {
        let (mut items, mut stats) = seeded();
        let mut coordinator = MutationCoordinator::new();
        let ticket = coordinator
            .request_archive(&ItemId::new("abc"), &items)
            .unwrap();

        let error = GatewayError::Server {
            code: 404,
            message: "Item not found".into(),
        };
        let outcome = coordinator.finish(&ticket, Err(error.clone()), &mut items, &mut stats, 1);

        assert_eq!(
            outcome,
            MutationOutcome::Rejected {
                item_id: ItemId::new("abc"),
                op: "archive",
                error
            }
        );
        assert_eq!(items.len(), 2);
        assert_eq!(stats.total_items, 2);
        assert_eq!(coordinator.rejected_count(), 1);
    }

    #[test]
    fn duplicate_requests_are_not_deduplicated() {
        let (items, _) = seeded();
        let mut coordinator = MutationCoordinator::new();
        let first = coordinator.request_delete(&ItemId::new("abc"), &items).unwrap();
        let second = coordinator.request_delete(&ItemId::new("abc"), &items).unwrap();
        assert_ne!(first.seq, second.seq);
        assert_eq!(coordinator.pending_ids(), vec![ItemId::new("abc")]);
    }
}
