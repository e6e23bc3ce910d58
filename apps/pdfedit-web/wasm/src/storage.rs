//! `localStorage` slot for saved signatures

use pdfedit_core::{EditError, KeyValueStore, MemoryStore};

fn js_error(context: &str, err: wasm_bindgen::JsValue) -> EditError {
    EditError::Storage(format!("{}: {:?}", context, err))
}

pub struct LocalStorage {
    storage: web_sys::Storage,
}

impl LocalStorage {
    pub fn open() -> Result<Self, EditError> {
        let window = web_sys::window().ok_or_else(|| EditError::Storage("No window".into()))?;
        let storage = window
            .local_storage()
            .map_err(|e| js_error("localStorage unavailable", e))?
            .ok_or_else(|| EditError::Storage("localStorage not available".into()))?;
        Ok(Self { storage })
    }
}

impl KeyValueStore for LocalStorage {
    fn get(&self, key: &str) -> Result<Option<String>, EditError> {
        self.storage
            .get_item(key)
            .map_err(|e| js_error("Failed to read signatures", e))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), EditError> {
        self.storage
            .set_item(key, value)
            .map_err(|e| js_error("Failed to write signatures", e))
    }
}

/// Durable storage when the browser allows it, otherwise a per-tab fallback.
pub enum SignatureBackend {
    Local(LocalStorage),
    Memory(MemoryStore),
}

impl SignatureBackend {
    pub fn detect() -> Self {
        match LocalStorage::open() {
            Ok(local) => SignatureBackend::Local(local),
            Err(e) => {
                tracing::warn!("Signatures will not persist: {}", e);
                SignatureBackend::Memory(MemoryStore::new())
            }
        }
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, SignatureBackend::Local(_))
    }
}

impl KeyValueStore for SignatureBackend {
    fn get(&self, key: &str) -> Result<Option<String>, EditError> {
        match self {
            SignatureBackend::Local(store) => store.get(key),
            SignatureBackend::Memory(store) => store.get(key),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), EditError> {
        match self {
            SignatureBackend::Local(store) => store.set(key, value),
            SignatureBackend::Memory(store) => store.set(key, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_roundtrip() {
        let mut backend = SignatureBackend::Memory(MemoryStore::new());
        assert!(!backend.is_durable());
        backend.set("pdfSignatures", "[]").unwrap();
        assert_eq!(backend.get("pdfSignatures").unwrap().as_deref(), Some("[]"));
    }
}

#[cfg(test)]
#[cfg(target_arch = "wasm32")]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_local_storage_roundtrip() {
        let mut store = LocalStorage::open().unwrap();
        store.set("pdfedit-test-slot", "[\"data:image/png;base64,AAAA\"]").unwrap();
        assert_eq!(
            store.get("pdfedit-test-slot").unwrap().as_deref(),
            Some("[\"data:image/png;base64,AAAA\"]")
        );
    }

    #[wasm_bindgen_test]
    fn test_detect_prefers_local_storage() {
        assert!(SignatureBackend::detect().is_durable());
    }
}
