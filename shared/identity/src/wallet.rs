use super::{Identity, IdentityError, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Labelled identity store consulted once when a gateway connects.
pub trait Wallet: Send + Sync {
    fn get(&self, label: &str) -> Result<Option<Identity>>;
    fn put(&self, label: &str, identity: Identity) -> Result<()>;
    fn remove(&self, label: &str) -> Result<bool>;
    fn labels(&self) -> Result<Vec<String>>;
}

#[derive(Clone, Default)]
pub struct InMemoryWallet {
    entries: Arc<RwLock<HashMap<String, Identity>>>,
}

impl InMemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Wallet for InMemoryWallet {
    fn get(&self, label: &str) -> Result<Option<Identity>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| IdentityError::Wallet("lock poisoned".into()))?;
        Ok(entries.get(label).cloned())
    }

    fn put(&self, label: &str, identity: Identity) -> Result<()> {
        if label.is_empty() {
            return Err(IdentityError::Wallet("label must not be empty".into()));
        }
        let mut entries = self
            .entries
            .write()
            .map_err(|_| IdentityError::Wallet("lock poisoned".into()))?;
        debug!(label, msp_id = identity.msp_id(), "storing identity");
        entries.insert(label.to_string(), identity);
        Ok(())
    }

    fn remove(&self, label: &str) -> Result<bool> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| IdentityError::Wallet("lock poisoned".into()))?;
        Ok(entries.remove(label).is_some())
    }

    fn labels(&self) -> Result<Vec<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| IdentityError::Wallet("lock poisoned".into()))?;
        let mut labels: Vec<String> = entries.keys().cloned().collect();
        labels.sort();
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_returns_identity() {
        let wallet = InMemoryWallet::new();
        let identity = Identity::from_seed("Org1MSP", b"user1").unwrap();
        wallet.put("user1", identity.clone()).unwrap();

        let loaded = wallet.get("user1").unwrap().unwrap();
        assert_eq!(loaded.fingerprint(), identity.fingerprint());
        assert!(wallet.get("missing").unwrap().is_none());
    }

    #[test]
    fn labels_are_sorted_and_remove_reports_presence() {
        let wallet = InMemoryWallet::new();
        wallet
            .put("zed", Identity::from_seed("Org1MSP", b"zed").unwrap())
            .unwrap();
        wallet
            .put("amy", Identity::from_seed("Org1MSP", b"amy").unwrap())
            .unwrap();

        assert_eq!(wallet.labels().unwrap(), vec!["amy", "zed"]);
        assert!(wallet.remove("amy").unwrap());
        assert!(!wallet.remove("amy").unwrap());
        assert_eq!(wallet.labels().unwrap(), vec!["zed"]);
    }

    #[test]
    fn empty_label_is_rejected() {
        let wallet = InMemoryWallet::new();
        let identity = Identity::from_seed("Org1MSP", b"user1").unwrap();
        assert!(wallet.put("", identity).is_err());
    }
}
