use std::collections::HashMap;

use super::handle::AssetHandle;

/// Key to asset store. Writes replace; nothing is ever evicted.
#[derive(Debug, Clone)]
pub struct Cache<T = AssetHandle> {
    items: HashMap<String, T>,
}

impl<T> Default for Cache<T> {
    fn default() -> Self {
        Self {
            items: HashMap::new(),
        }
    }
}

impl<T> Cache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_item(&mut self, key: impl Into<String>, item: T) {
        self.items.insert(key.into(), item);
    }

    pub fn get_item(&self, key: &str) -> Option<&T> {
        self.items.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }
}
