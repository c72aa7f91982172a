//! Per-request identity carried from the gates to handlers
//!
//! The key set is closed: a gate binds the subject (and, for role-gated
//! routes, the role) exactly once, and handlers only ever read. An absent
//! value means the gate for that field did not run on this route; it is never
//! replaced with a default identity.

use crate::auth::claims::Role;
use std::fmt;
use thiserror::Error;

/// Keys a gate may bind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    Subject,
    Role,
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKey::Subject => write!(f, "subject"),
            ContextKey::Role => write!(f, "role"),
        }
    }
}

/// A bound context value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextValue<'a> {
    Subject(&'a str),
    Role(Role),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context key '{0}' is already bound for this request")]
    AlreadyBound(ContextKey),
}

/// Verified identity attributes for a single request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestIdentity {
    subject: Option<String>,
    role: Option<Role>,
}

impl RequestIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bind_subject(&mut self, subject: impl Into<String>) -> Result<(), ContextError> {
        if self.subject.is_some() {
            return Err(ContextError::AlreadyBound(ContextKey::Subject));
        }
        self.subject = Some(subject.into());
        Ok(())
    }

    pub(crate) fn bind_role(&mut self, role: Role) -> Result<(), ContextError> {
        if self.role.is_some() {
            return Err(ContextError::AlreadyBound(ContextKey::Role));
        }
        self.role = Some(role);
        Ok(())
    }

    /// Fold in the identity bound by another gate on the same request.
    /// Re-binding a key to the value it already holds is a no-op; a
    /// different value is rejected.
    pub fn merge(&mut self, other: RequestIdentity) -> Result<(), ContextError> {
        if let Some(subject) = other.subject {
            if self.subject.as_deref() != Some(subject.as_str()) {
                self.bind_subject(subject)?;
            }
        }
        if let Some(role) = other.role {
            if self.role != Some(role) {
                self.bind_role(role)?;
            }
        }
        Ok(())
    }

    pub fn get(&self, key: ContextKey) -> Option<ContextValue<'_>> {
        match key {
            ContextKey::Subject => self.subject.as_deref().map(ContextValue::Subject),
            ContextKey::Role => self.role.map(ContextValue::Role),
        }
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }
}
