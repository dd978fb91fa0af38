use crate::normalize::normalize_code;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Decides which item codes take part in consolidation.
pub trait CodeCatalog {
    fn is_active(&self, code: &str) -> bool;
}

impl CodeCatalog for HashSet<String> {
    fn is_active(&self, code: &str) -> bool {
        self.contains(&normalize_code(code))
    }
}

impl CodeCatalog for BTreeSet<String> {
    fn is_active(&self, code: &str) -> bool {
        self.contains(&normalize_code(code))
    }
}

impl<C: CodeCatalog + ?Sized> CodeCatalog for &C {
    fn is_active(&self, code: &str) -> bool {
        (**self).is_active(code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDefinition {
    pub code: String,
    pub description: String,
    pub active: bool,
}

/// The item codes (rubricas) known for a statement family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCatalog {
    items: BTreeMap<String, ItemDefinition>,
}

impl ItemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = ItemDefinition>) -> Self {
        let mut catalog = Self::new();
        for item in items {
            catalog.insert(item);
        }
        catalog
    }

    /// Inserts or replaces a definition. The code is stored in normalized form.
    pub fn insert(&mut self, item: ItemDefinition) {
        let code = normalize_code(&item.code);
        self.items.insert(
            code.clone(),
            ItemDefinition {
                code,
                description: item.description.trim().to_string(),
                active: item.active,
            },
        );
    }

    pub fn with_item(mut self, code: &str, description: &str, active: bool) -> Self {
        self.insert(ItemDefinition {
            code: code.to_string(),
            description: description.to_string(),
            active,
        });
        self
    }

    pub fn get(&self, code: &str) -> Option<&ItemDefinition> {
        self.items.get(&normalize_code(code))
    }

    pub fn set_active(&mut self, code: &str, active: bool) -> bool {
        match self.items.get_mut(&normalize_code(code)) {
            Some(item) => {
                item.active = active;
                true
            }
            None => false,
        }
    }

    pub fn active_codes(&self) -> BTreeSet<String> {
        self.items
            .values()
            .filter(|item| item.active)
            .map(|item| item.code.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str("Code,Description,Active\n");

        for item in self.items.values() {
            let description = if item.description.contains(',') || item.description.contains('"')
            {
                format!("\"{}\"", item.description.replace('"', "\"\""))
            } else {
                item.description.clone()
            };
            output.push_str(&format!("{},{},{}\n", item.code, description, item.active));
        }

        output
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str("# Item Catalog\n\n");
        output.push_str(&format!(
            "**Active:** {} of {}\n\n",
            self.active_codes().len(),
            self.len()
        ));

        output.push_str("| Code | Description | Status |\n");
        output.push_str("|------|-------------|--------|\n");
        for item in self.items.values() {
            let status = if item.active { "active" } else { "**inactive**" };
            output.push_str(&format!(
                "| {} | {} | {} |\n",
                item.code, item.description, status
            ));
        }

        output
    }
}

impl CodeCatalog for ItemCatalog {
    fn is_active(&self, code: &str) -> bool {
        self.get(code).is_some_and(|item| item.active)
    }
}
