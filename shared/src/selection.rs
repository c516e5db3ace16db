use serde::{Deserialize, Serialize};

use crate::event::ItemId;

/// The single active selection. Only a building may nest an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionState {
    #[default]
    None,
    Suggestion {
        index: usize,
    },
    Building {
        key: String,
        item: Option<ItemId>,
    },
    ItemMenu {
        id: ItemId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionAction {
    /// Mirrors the suggestion highlight; `None` drops a suggestion selection.
    HighlightSuggestion(Option<usize>),
    SelectBuilding {
        key: String,
        first_item: Option<ItemId>,
    },
    /// Nests an item under the open building. Ignored otherwise.
    SelectItem(ItemId),
    OpenMenu(ItemId),
    /// Opens the menu, or closes it if it is the one already open.
    ToggleMenu(ItemId),
    /// The item left the collection; drop any reference to it.
    Forget(ItemId),
    Dismiss,
}

impl SelectionState {
    pub fn open_menu(&self) -> Option<&ItemId> {
        match self {
            Self::ItemMenu { id } => Some(id),
            _ => None,
        }
    }

    pub fn building(&self) -> Option<&str> {
        match self {
            Self::Building { key, .. } => Some(key),
            _ => None,
        }
    }

    pub fn selected_item(&self) -> Option<&ItemId> {
        match self {
            Self::Building { item, .. } => item.as_ref(),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Pure transition function. Every action yields exactly one state.
pub fn reduce(state: &SelectionState, action: SelectionAction) -> SelectionState {
    use SelectionAction as A;
    use SelectionState as S;

    match (state, action) {
        (_, A::Dismiss) => S::None,

        (_, A::HighlightSuggestion(Some(index))) => S::Suggestion { index },
        (S::Suggestion { .. }, A::HighlightSuggestion(None)) => S::None,
        (current, A::HighlightSuggestion(None)) => current.clone(),

        (_, A::SelectBuilding { key, first_item }) => S::Building {
            key,
            item: first_item,
        },

        (S::Building { key, .. }, A::SelectItem(id)) => S::Building {
            key: key.clone(),
            item: Some(id),
        },
        (current, A::SelectItem(_)) => current.clone(),

        (_, A::OpenMenu(id)) => S::ItemMenu { id },

        (S::ItemMenu { id: open }, A::ToggleMenu(id)) if *open == id => S::None,
        (_, A::ToggleMenu(id)) => S::ItemMenu { id },

        (S::ItemMenu { id: open }, A::Forget(id)) if *open == id => S::None,
        (S::Building { key, item: Some(nested) }, A::Forget(id)) if *nested == id => {
            S::Building {
                key: key.clone(),
                item: None,
            }
        }
        (current, A::Forget(_)) => current.clone(),
    }
}
