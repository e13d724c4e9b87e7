use std::fmt;

/// Whether a compensation undoes external state or only releases local
/// resources.
///
/// Persistent compensations are skipped when the environment asks to keep
/// resources around for inspection. Local ones (closing clients, dropping
/// connections) always run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Persistent,
    Local,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persistent => write!(f, "persistent"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// A non-fatal finding reported by a compensating action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Label of the action that reported the finding.
    pub action: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.action, self.message)
    }
}

/// Sink handed to a compensating action for findings that must be reported
/// but must not fail the drain.
#[derive(Debug, Default)]
pub struct Diagnostics {
    messages: Vec<String>,
}

impl Diagnostics {
    pub fn report(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub(crate) fn into_messages(self) -> Vec<String> {
        self.messages
    }
}

type ActionFn<E> = Box<dyn FnOnce(&mut Diagnostics) -> Result<(), E> + Send>;

/// A zero-argument operation that undoes one provisioning step.
///
/// Actions are consumed when they run, so an action can never execute twice.
pub struct CompensatingAction<E> {
    label: String,
    description: String,
    kind: ActionKind,
    run: ActionFn<E>,
}

impl<E> CompensatingAction<E> {
    /// An action that deletes or otherwise undoes external state.
    pub fn persistent<F>(label: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(&mut Diagnostics) -> Result<(), E> + Send + 'static,
    {
        Self::new(label, ActionKind::Persistent, run)
    }

    /// An action that releases an in-process resource.
    pub fn local<F>(label: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(&mut Diagnostics) -> Result<(), E> + Send + 'static,
    {
        Self::new(label, ActionKind::Local, run)
    }

    fn new<F>(label: impl Into<String>, kind: ActionKind, run: F) -> Self
    where
        F: FnOnce(&mut Diagnostics) -> Result<(), E> + Send + 'static,
    {
        let label = label.into();
        Self {
            description: format!("undo {label}"),
            label,
            kind,
            run: Box::new(run),
        }
    }

    /// Replace the default "undo <label>" description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub(crate) fn execute(self, diagnostics: &mut Diagnostics) -> Result<(), E> {
        (self.run)(diagnostics)
    }
}

impl<E> fmt::Debug for CompensatingAction<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompensatingAction")
            .field("label", &self.label)
            .field("description", &self.description)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
