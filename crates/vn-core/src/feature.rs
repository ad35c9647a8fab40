//! Capability lifecycle.
//!
//! A [`FeatureGroup`] owns up to 32 features. Each feature is backed by an
//! activate/deactivate pair and maps to one bit of a persisted disable mask;
//! [`FeatureGroup::reload`] brings the live state in line with that mask.
//! Interception components are set up and torn down from inside these
//! callbacks.

use crate::config::{feature_key, get_u32, ConfigError, ConfigStore};

const MAX_FEATURES: usize = u32::BITS as usize;

type Toggle = Box<dyn FnMut() -> bool>;

#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("Feature group '{0}' already holds 32 features")]
    TooManyFeatures(String),
    #[error("Unknown feature '{feature}' in group '{group}'")]
    UnknownFeature { group: String, feature: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// One toggleable capability.
pub struct Feature {
    name: String,
    activate: Toggle,
    deactivate: Toggle,
    active: bool,
}

impl Feature {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, group: &str, wanted: bool) {
        if self.active == wanted {
            return;
        }
        let ok = if wanted {
            (self.activate)()
        } else {
            (self.deactivate)()
        };
        if ok {
            self.active = wanted;
            log::debug!(
                target: "feature",
                "{group}.{}: {}",
                self.name,
                if wanted { "activated" } else { "deactivated" }
            );
        } else {
            log::warn!(
                target: "feature",
                "{group}.{}: {} refused",
                self.name,
                if wanted { "activation" } else { "deactivation" }
            );
        }
    }
}

/// Ordered set of features sharing one disable mask.
pub struct FeatureGroup {
    id: String,
    features: Vec<Feature>,
}

impl FeatureGroup {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            features: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Register a feature; its bit is the registration index.
    pub fn register<A, D>(&mut self, name: impl Into<String>, activate: A, deactivate: D) -> Result<u32, FeatureError>
    where
        A: FnMut() -> bool + 'static,
        D: FnMut() -> bool + 'static,
    {
        if self.features.len() >= MAX_FEATURES {
            return Err(FeatureError::TooManyFeatures(self.id.clone()));
        }
        self.features.push(Feature {
            name: name.into(),
            activate: Box::new(activate),
            deactivate: Box::new(deactivate),
            active: false,
        });
        Ok((self.features.len() - 1) as u32)
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn bit_of(&self, name: &str) -> Option<u32> {
        self.features.iter().position(|f| f.name == name).map(|i| i as u32)
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.features.iter().any(|f| f.name == name && f.active)
    }

    /// The persisted disable mask (0 when unset).
    pub fn disabled_mask(&self, store: &dyn ConfigStore) -> u32 {
        get_u32(store, &feature_key(&self.id)).unwrap_or(0)
    }

    /// Activate every enabled feature and deactivate every disabled one.
    pub fn reload(&mut self, store: &dyn ConfigStore) {
        let mask = self.disabled_mask(store);
        for (bit, feature) in self.features.iter_mut().enumerate() {
            let enabled = mask & (1 << bit) == 0;
            feature.set_active(&self.id, enabled);
        }
    }

    /// Persist the new state of `name`, then reload.
    pub fn set_enabled(&mut self, name: &str, enabled: bool, store: &dyn ConfigStore) -> Result<(), FeatureError> {
        let bit = self.bit_of(name).ok_or_else(|| FeatureError::UnknownFeature {
            group: self.id.clone(),
            feature: name.to_string(),
        })?;
        let mut mask = self.disabled_mask(store);
        if enabled {
            mask &= !(1 << bit);
        } else {
            mask |= 1 << bit;
        }
        store.set(&feature_key(&self.id), serde_json::Value::from(mask))?;
        self.reload(store);
        Ok(())
    }

    /// Tear everything down, e.g. on unload.
    pub fn deactivate_all(&mut self) {
        for feature in &mut self.features {
            feature.set_active(&self.id, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording_group(log: &Rc<RefCell<Vec<String>>>, names: &[&str]) -> FeatureGroup {
        let mut group = FeatureGroup::new("privacy");
        for name in names {
            let (on, off) = (log.clone(), log.clone());
            let (n1, n2) = (name.to_string(), name.to_string());
            group
                .register(
                    *name,
                    move || {
                        on.borrow_mut().push(format!("+{n1}"));
                        true
                    },
                    move || {
                        off.borrow_mut().push(format!("-{n2}"));
                        true
                    },
                )
                .unwrap();
        }
        group
    }

    #[test]
    fn test_reload_activates_enabled_features() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut group = recording_group(&log, &["ga", "fbq"]);
        let store = MemoryStore::new();
        store.set(&feature_key("privacy"), serde_json::json!(0b10)).unwrap();

        group.reload(&store);
        assert!(group.is_active("ga"));
        assert!(!group.is_active("fbq"));
        assert_eq!(*log.borrow(), ["+ga"]);

        // idempotent
        group.reload(&store);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_set_enabled_persists_and_toggles() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut group = recording_group(&log, &["ga", "fbq"]);
        let store = MemoryStore::new();
        group.reload(&store);

        group.set_enabled("fbq", false, &store).unwrap();
        assert_eq!(group.disabled_mask(&store), 0b10);
        assert!(!group.is_active("fbq"));

        group.set_enabled("fbq", true, &store).unwrap();
        assert_eq!(group.disabled_mask(&store), 0);
        assert_eq!(*log.borrow(), ["+ga", "+fbq", "-fbq", "+fbq"]);
    }

    #[test]
    fn test_refused_activation_keeps_state() {
        let mut group = FeatureGroup::new("dom");
        group.register("broken", || false, || true).unwrap();
        group.reload(&MemoryStore::new());
        assert!(!group.is_active("broken"));
    }

    #[test]
    fn test_unknown_feature() {
        let mut group = FeatureGroup::new("dom");
        let err = group.set_enabled("nope", true, &MemoryStore::new()).unwrap_err();
        assert!(matches!(err, FeatureError::UnknownFeature { .. }));
    }

    #[test]
    fn test_too_many_features() {
        let mut group = FeatureGroup::new("big");
        for i in 0..32 {
            assert_eq!(group.register(format!("f{i}"), || true, || true).unwrap(), i);
        }
        assert!(matches!(
            group.register("overflow", || true, || true),
            Err(FeatureError::TooManyFeatures(_))
        ));
    }

    #[test]
    fn test_deactivate_all() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut group = recording_group(&log, &["a", "b"]);
        group.reload(&MemoryStore::new());
        group.deactivate_all();
        assert!(group.features().iter().all(|f| !f.is_active()));
        assert_eq!(*log.borrow(), ["+a", "+b", "-a", "-b"]);
    }
}
