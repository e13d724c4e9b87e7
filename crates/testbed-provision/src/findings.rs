//! Soft assertions: every check runs and every failure is collected.

use testbed_core::ResourceKey;

use crate::{Result, SessionError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Findings {
    messages: Vec<String>,
}

impl Findings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` unless `ok` holds.
    pub fn check(&mut self, ok: bool, message: impl FnOnce() -> String) {
        if !ok {
            self.messages.push(message());
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Assertion`] carrying all findings if any check
    /// failed.
    pub fn into_result(self, key: &ResourceKey) -> Result<()> {
        if self.messages.is_empty() {
            Ok(())
        } else {
            Err(SessionError::Assertion {
                key: key.clone(),
                findings: self.messages,
            })
        }
    }
}

impl IntoIterator for Findings {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}
