use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Identity of a script as assigned by the interpreter that loaded it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ScriptId(u64);

impl ScriptId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "script#{}", self.0)
    }
}

/// A script as the interpreter holds it while running.
///
/// Scripts loaded from a resource (a file path or URL) are "static"; anything
/// else (eval'd strings, injected snippets) is dynamic code.
#[derive(Clone, Debug)]
pub struct Script {
    id: ScriptId,
    title: Option<String>,
    source: String,
    resource: Option<String>,
}

impl Script {
    pub fn dynamic(id: ScriptId, source: impl Into<String>) -> Self {
        Self {
            id,
            title: None,
            source: source.into(),
            resource: None,
        }
    }

    pub fn from_resource(id: ScriptId, resource: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id,
            title: None,
            source: source.into(),
            resource: Some(resource.into()),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn id(&self) -> ScriptId {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn is_dynamic(&self) -> bool {
        self.resource.is_none()
    }

    /// Explicit title, else the last path segment of the resource.
    pub fn title(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        match &self.resource {
            Some(resource) => resource
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(resource)
                .to_owned(),
            None => "(dynamic code)".to_owned(),
        }
    }
}

/// Immutable copy of a [`Script`] taken when an event is built.
///
/// Later edits to the live script never show through a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptSnapshot {
    id: ScriptId,
    title: String,
    source: Arc<str>,
    resource: Option<String>,
    dynamic: bool,
}

impl ScriptSnapshot {
    pub fn capture(script: &Script) -> Self {
        Self {
            id: script.id(),
            title: script.title(),
            source: Arc::from(script.source()),
            resource: script.resource().map(str::to_owned),
            dynamic: script.is_dynamic(),
        }
    }

    pub fn id(&self) -> ScriptId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Text of a 1-based source line.
    pub fn line(&self, line: u32) -> Option<&str> {
        let index = usize::try_from(line).ok()?.checked_sub(1)?;
        self.source.lines().nth(index)
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }
}
