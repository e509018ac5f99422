use super::ConfigStore;
use crate::error::{DmError, Result};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Default)]
struct Section {
    name: String,
    attributes: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct Inner {
    sections: Vec<Section>,
    unreadable: bool,
}

/// In-process store. Clones share contents, so a test can keep a handle and
/// edit the configuration seen by a running manager.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a section; repeated names produce duplicate headers.
    pub fn with_section(self, name: &str, attributes: &[(&str, &str)]) -> Self {
        self.add_section(name, attributes);
        self
    }

    pub fn add_section(&self, name: &str, attributes: &[(&str, &str)]) {
        if let Ok(mut inner) = self.inner.write() {
            inner.sections.push(Section {
                name: name.to_string(),
                attributes: attributes
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            });
        }
    }

    /// Makes every read behave like a missing file.
    pub fn set_unreadable(&self, unreadable: bool) {
        if let Ok(mut inner) = self.inner.write() {
            inner.unreadable = unreadable;
        }
    }
}

impl ConfigStore for MemoryStore {
    fn section_names(&self) -> Result<Vec<String>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| DmError::InternalError("Failed to lock memory store".to_string()))?;
        if inner.unreadable {
            return Err(DmError::StoreUnreadable("memory".to_string()));
        }
        Ok(inner.sections.iter().map(|s| s.name.clone()).collect())
    }

    fn attribute(&self, section: &str, key: &str) -> Option<String> {
        let inner = self.inner.read().ok()?;
        if inner.unreadable {
            return None;
        }
        inner
            .sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(section))?
            .attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_and_attributes() {
        let store = MemoryStore::new()
            .with_section("B", &[("Description", "bee")])
            .with_section("A", &[]);
        assert_eq!(store.section_names().expect("sections"), vec!["B", "A"]);
        assert_eq!(store.attribute("b", "description"), Some("bee".to_string()));
        assert_eq!(store.attribute("A", "Description"), None);
    }

    #[test]
    fn test_clones_share_contents() {
        let store = MemoryStore::new();
        let view = store.clone();
        store.add_section("Late", &[]);
        assert_eq!(view.section_names().expect("sections"), vec!["Late"]);
    }

    #[test]
    fn test_unreadable() {
        let store = MemoryStore::new().with_section("A", &[("Driver", "x")]);
        store.set_unreadable(true);
        assert!(matches!(
            store.section_names(),
            Err(DmError::StoreUnreadable(_))
        ));
        assert_eq!(store.attribute("A", "Driver"), None);
    }
}
