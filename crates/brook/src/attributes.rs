//! HTML attribute names used to tag rendered markup.
//!
//! Components mark their root element with a container attribute, repeated
//! instances with a key attribute, and event bindings with one attribute per
//! DOM event. All names live under a `data-<namespace>-` prefix; the default
//! namespace is `brk`.

use std::fmt;
use std::str::FromStr;

use crate::error::BrookError;

pub const NAMESPACE: &str = "brk";

/// Marks the root element of a component.
pub const CONTAINER_ATTRIBUTE: &str = "data-brk-container";

/// Tags a component that appears multiple times.
pub const KEY_ATTRIBUTE: &str = "data-brk-key";

/// DOM events a component can bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomEvent {
    Click,
    Focus,
    Input,
    Change,
    KeyDown,
    KeyUp,
    KeyPress,
    Cut,
    Paste,
}

impl DomEvent {
    pub const ALL: [DomEvent; 9] = [
        DomEvent::Click,
        DomEvent::Focus,
        DomEvent::Input,
        DomEvent::Change,
        DomEvent::KeyDown,
        DomEvent::KeyUp,
        DomEvent::KeyPress,
        DomEvent::Cut,
        DomEvent::Paste,
    ];

    /// The DOM event name, e.g. `keydown`.
    pub fn name(self) -> &'static str {
        match self {
            DomEvent::Click => "click",
            DomEvent::Focus => "focus",
            DomEvent::Input => "input",
            DomEvent::Change => "change",
            DomEvent::KeyDown => "keydown",
            DomEvent::KeyUp => "keyup",
            DomEvent::KeyPress => "keypress",
            DomEvent::Cut => "cut",
            DomEvent::Paste => "paste",
        }
    }

    /// The binding attribute in the default namespace, e.g. `data-brk-onkeydown`.
    pub fn attribute(self) -> &'static str {
        match self {
            DomEvent::Click => "data-brk-onclick",
            DomEvent::Focus => "data-brk-onfocus",
            DomEvent::Input => "data-brk-oninput",
            DomEvent::Change => "data-brk-onchange",
            DomEvent::KeyDown => "data-brk-onkeydown",
            DomEvent::KeyUp => "data-brk-onkeyup",
            DomEvent::KeyPress => "data-brk-onkeypress",
            DomEvent::Cut => "data-brk-oncut",
            DomEvent::Paste => "data-brk-onpaste",
        }
    }
}

impl fmt::Display for DomEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DomEvent {
    type Err = BrookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DomEvent::ALL
            .into_iter()
            .find(|event| event.name() == s)
            .ok_or_else(|| BrookError::UnknownEvent(s.to_string()))
    }
}

/// `data-brk-container="<name>"`
pub fn container(name: &str) -> String {
    format!("{CONTAINER_ATTRIBUTE}=\"{name}\"")
}

/// `data-brk-key="<key>"`
pub fn key(key: &str) -> String {
    format!("{KEY_ATTRIBUTE}=\"{key}\"")
}

/// Attribute names under a custom namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    prefix: String,
}

impl Default for Attributes {
    fn default() -> Self {
        Self::new(NAMESPACE)
    }
}

impl Attributes {
    pub fn new(namespace: &str) -> Self {
        Self {
            prefix: format!("data-{namespace}-"),
        }
    }

    pub fn container_attribute(&self) -> String {
        format!("{}container", self.prefix)
    }

    pub fn key_attribute(&self) -> String {
        format!("{}key", self.prefix)
    }

    pub fn event_attribute(&self, event: DomEvent) -> String {
        format!("{}on{}", self.prefix, event.name())
    }

    pub fn container(&self, name: &str) -> String {
        format!("{}=\"{name}\"", self.container_attribute())
    }
}
