use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::model::{Item, ItemCollection, ItemKind};

/// Position on the campus blueprint, in percent of width and height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlueprintPoint {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingEntry {
    pub key: String,
    pub name: String,
    pub position: BlueprintPoint,
    pub icon: String,
}

impl BuildingEntry {
    pub fn new(key: &str, name: &str, x: f32, y: f32, icon: &str) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            position: BlueprintPoint { x, y },
            icon: icon.to_string(),
        }
    }
}

/// Marker state for one building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingMarker {
    pub key: String,
    pub name: String,
    pub position: BlueprintPoint,
    pub icon: String,
    pub count: usize,
    pub has_lost: bool,
    pub has_found: bool,
}

pub const CAMPUS_CENTER_KEY: &str = "campus-center";

const CAMPUS_BUILDINGS: &[(&str, f32, f32, &str, &str)] = &[
    ("fmc-hostel", 6.0, 18.0, "F.M.C Hostel", "🏨"),
    ("basketball", 20.0, 20.0, "Basket Ball Ground", "🏀"),
    ("prayer-area", 35.0, 18.0, "Prayer Area", "🕌"),
    ("mini-office", 47.0, 20.0, "Mini Office Block", "🏢"),
    ("ausom", 57.0, 24.0, "Ausom", "🎓"),
    ("fmc-building", 71.0, 24.0, "FMC Building", "🏛️"),
    ("fmc-lawn", 88.0, 20.0, "FMC Lawn", "🌳"),
    ("green-area-north", 80.0, 32.0, "Green Area", "🌿"),
    ("pre-fab", 22.0, 32.0, "Pre-Fabricated Block", "🏗️"),
    ("b-block", 43.0, 32.0, "B-Block", "🅱️"),
    ("a-block", 32.0, 52.0, "A-Block", "🅰️"),
    ("admin", 47.0, 58.0, "Admin Block", "🏛️"),
    ("green-area", 58.0, 52.0, "Green Area", "🌳"),
    ("iaa", 70.0, 58.0, "I.A.A", "📊"),
    ("cafeteria", 90.0, 46.0, "Cafeteria", "🍽️"),
    ("auditorium", 92.0, 56.0, "Auditorium Library", "📚"),
    ("c-block", 12.0, 52.0, "C-Block", "🅲"),
    ("sports", 32.0, 78.0, "Sports Complex", "🏋️"),
    ("main-office-lawn", 46.0, 80.0, "Main Office Lawn", "🌿"),
    ("ausom-lawn", 56.0, 76.0, "AUSOM Lawn", "🌺"),
    ("iaa-lawn-2", 70.0, 72.0, "IAA Lawn-2", "🌴"),
    ("iaa-lawn-1", 79.0, 76.0, "IAA Lawn-1", "🌴"),
    ("parking", 52.0, 92.0, "Students Parking", "🚗"),
    ("main-gate", 94.0, 96.0, "Main Gate", "🚪"),
];

/// Static registry of campus buildings keyed case-insensitively.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    entries: Vec<BuildingEntry>,
    by_key: HashMap<String, usize>,
    fallback: BuildingEntry,
}

impl SpatialIndex {
    /// Later duplicates of a key are ignored.
    pub fn new(entries: Vec<BuildingEntry>, fallback: BuildingEntry) -> Self {
        let mut by_key = HashMap::with_capacity(entries.len());
        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries {
            let key = entry.key.to_lowercase();
            if by_key.contains_key(&key) {
                continue;
            }
            by_key.insert(key, kept.len());
            kept.push(entry);
        }
        Self {
            entries: kept,
            by_key,
            fallback,
        }
    }

    pub fn campus() -> Self {
        let entries = CAMPUS_BUILDINGS
            .iter()
            .map(|(key, x, y, name, icon)| BuildingEntry::new(key, name, *x, *y, icon))
            .collect();
        let fallback = BuildingEntry::new(CAMPUS_CENTER_KEY, "Campus Center", 50.0, 50.0, "📍");
        Self::new(entries, fallback)
    }

    pub fn lookup(&self, location: &str) -> Option<&BuildingEntry> {
        self.by_key
            .get(&location.to_lowercase())
            .map(|&index| &self.entries[index])
    }

    /// Never fails: unknown locations land on the campus-center entry.
    pub fn resolve(&self, location: &str) -> &BuildingEntry {
        self.lookup(location).unwrap_or(&self.fallback)
    }

    pub fn is_known(&self, location: &str) -> bool {
        self.lookup(location).is_some()
    }

    pub fn entries(&self) -> &[BuildingEntry] {
        &self.entries
    }

    pub fn fallback(&self) -> &BuildingEntry {
        &self.fallback
    }

    pub fn items_at<'a>(&self, key: &str, collection: &'a ItemCollection) -> Vec<&'a Item> {
        let key = key.to_lowercase();
        collection
            .iter()
            .filter(|item| item.location.to_lowercase() == key)
            .collect()
    }

    /// Items whose location resolves to `key`, fallback included. This is
    /// what a marker's count refers to.
    pub fn items_in_zone<'a>(&self, key: &str, collection: &'a ItemCollection) -> Vec<&'a Item> {
        collection
            .iter()
            .filter(|item| self.resolve(&item.location).key.eq_ignore_ascii_case(key))
            .collect()
    }

    /// One marker per building with at least one item. Items at unknown
    /// locations are grouped under the fallback entry.
    pub fn markers(&self, collection: &ItemCollection) -> Vec<BuildingMarker> {
        let mut grouped: BTreeMap<String, (usize, bool, bool)> = BTreeMap::new();
        for item in collection.iter() {
            let entry = self.resolve(&item.location);
            let slot = grouped.entry(entry.key.clone()).or_default();
            slot.0 += 1;
            match item.kind {
                ItemKind::Lost => slot.1 = true,
                ItemKind::Found => slot.2 = true,
            }
        }

        self.entries
            .iter()
            .chain(std::iter::once(&self.fallback))
            .filter_map(|entry| {
                let (count, has_lost, has_found) = *grouped.get(&entry.key)?;
                Some(BuildingMarker {
                    key: entry.key.clone(),
                    name: entry.name.clone(),
                    position: entry.position,
                    icon: entry.icon.clone(),
                    count,
                    has_lost,
                    has_found,
                })
            })
            .collect()
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::campus()
    }
}
