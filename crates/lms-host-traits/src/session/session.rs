use super::errors::Error;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The capability a model is served through. Language and vision models share
/// the `Llm` namespace; embedding models live in their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Llm,
    Embedding,
}

impl Namespace {
    /// Whether a model of the host-reported `model_type` is visible through this namespace.
    pub fn accepts(&self, model_type: &str) -> bool {
        match self {
            Namespace::Llm => matches!(model_type, "llm" | "vlm"),
            Namespace::Embedding => matches!(model_type, "embedding" | "embeddings"),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Namespace::Llm => write!(f, "llm"),
            Namespace::Embedding => write!(f, "embedding"),
        }
    }
}

#[async_trait]
pub trait SessionInner: Send + Sync {
    /// Ask the host to unload `identifier` from `namespace`.
    ///
    /// Fails with `ErrorCode::ModelNotFound` when no such model is currently loaded.
    async fn unload(&self, namespace: Namespace, identifier: &str) -> Result<(), Error>;

    /// Release the underlying connection. Called exactly once by `Session`.
    fn close(&self);
}

#[async_trait]
pub trait ConnectorInner: Send + Sync {
    async fn connect(&self) -> Result<Session, Error>;
}

/// A backend-defined session, released when closed or dropped.
pub struct Session {
    inner: Box<dyn SessionInner>,
    closed: bool,
}

impl From<Box<dyn SessionInner>> for Session {
    fn from(value: Box<dyn SessionInner>) -> Self {
        Self {
            inner: value,
            closed: false,
        }
    }
}

impl Session {
    pub fn llm(&self) -> NamespaceHandle<'_> {
        self.namespace(Namespace::Llm)
    }

    pub fn embedding(&self) -> NamespaceHandle<'_> {
        self.namespace(Namespace::Embedding)
    }

    pub fn namespace(&self, namespace: Namespace) -> NamespaceHandle<'_> {
        NamespaceHandle {
            session: self.inner.as_ref(),
            namespace,
        }
    }

    /// Release the session now instead of waiting for drop.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.inner.close();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}

/// A borrowed view of a session restricted to one namespace.
#[derive(Clone, Copy)]
pub struct NamespaceHandle<'a> {
    session: &'a dyn SessionInner,
    namespace: Namespace,
}

impl<'a> NamespaceHandle<'a> {
    pub fn kind(&self) -> Namespace {
        self.namespace
    }

    pub async fn unload(&self, identifier: &str) -> Result<(), Error> {
        self.session.unload(self.namespace, identifier).await
    }
}
