//! Rotating pool of provider API keys.
//!
//! The cursor is shared by every request in the process: once one request
//! rotates past an exhausted key, later requests start from the next one.
//! Clients are built lazily, at most once per pool slot.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use querent_core::errors::ApplicationError;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::llm::{ModelClient, ProviderError};

/// One API key together with its position in the pool.
#[derive(Clone)]
pub struct Credential {
    slot: usize,
    secret: SecretString,
}

impl Credential {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    /// Last five characters only, for logs.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.secret.expose_secret().chars().collect();
        let tail: String = chars[chars.len().saturating_sub(5)..].iter().collect();
        format!("...{tail}")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential").field("slot", &self.slot).field("key", &self.masked()).finish()
    }
}

pub trait ClientFactory: Send + Sync {
    fn build(&self, credential: &Credential) -> Result<Arc<dyn ModelClient>, ProviderError>;
}

pub struct CredentialPool {
    credentials: Vec<Credential>,
    cursor: AtomicUsize,
    clients: Mutex<HashMap<usize, Arc<dyn ModelClient>>>,
    factory: Arc<dyn ClientFactory>,
}

impl CredentialPool {
    pub fn new(
        keys: Vec<SecretString>,
        factory: Arc<dyn ClientFactory>,
    ) -> Result<Self, ApplicationError> {
        if keys.is_empty() {
            return Err(ApplicationError::Configuration(
                "credential pool requires at least one provider API key".to_string(),
            ));
        }

        let credentials = keys
            .into_iter()
            .enumerate()
            .map(|(slot, secret)| Credential { slot, secret })
            .collect();
        Ok(Self {
            credentials,
            cursor: AtomicUsize::new(0),
            clients: Mutex::new(HashMap::new()),
            factory,
        })
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn current(&self) -> Credential {
        let slot = self.cursor.load(Ordering::SeqCst);
        self.credentials[slot].clone()
    }

    /// Moves the shared cursor one slot forward, wrapping, and returns the
    /// credential it now points at.
    pub fn advance(&self) -> Credential {
        let len = self.credentials.len();
        let previous = self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |slot| Some((slot + 1) % len))
            .unwrap_or_else(|slot| slot);
        let credential = self.credentials[(previous + 1) % len].clone();
        info!(
            event_name = "credentials.rotated",
            slot = credential.slot,
            key = %credential.masked(),
            "switched to next provider API key"
        );
        credential
    }

    /// Client bound to `credential`, built on first use and reused afterwards.
    pub fn client_for(&self, credential: &Credential) -> Result<Arc<dyn ModelClient>, ProviderError> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(&credential.slot) {
            return Ok(Arc::clone(client));
        }

        let client = self.factory.build(credential)?;
        debug!(
            event_name = "credentials.client.built",
            slot = credential.slot,
            key = %credential.masked(),
            "built provider client"
        );
        clients.insert(credential.slot, Arc::clone(&client));
        Ok(client)
    }
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPool")
            .field("credentials", &self.credentials)
            .field("cursor", &self.cursor.load(Ordering::SeqCst))
            .finish()
    }
}
