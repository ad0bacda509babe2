//! Trap events

use crate::{Oid, Value};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};

/// A single `(OID, value)` pair carried by a trap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarBinding {
    pub oid: Oid,
    pub value: Value,
}

impl VarBinding {
    /// Create a new binding
    pub fn new(oid: Oid, value: impl Into<Value>) -> Self {
        Self {
            oid,
            value: value.into(),
        }
    }
}

/// An already-decoded inbound trap
#[derive(Debug, Serialize, Deserialize)]
pub struct TrapEvent {
    /// Address the trap arrived from
    pub sender: IpAddr,
    /// Host name for the sender, when the transport resolved one
    #[serde(default)]
    pub sender_name: Option<String>,
    /// Variable bindings in arrival order
    #[serde(default)]
    pub bindings: Vec<VarBinding>,
    #[serde(skip)]
    handled: AtomicBool,
}

impl TrapEvent {
    /// Create an unhandled event
    pub fn new(sender: IpAddr, bindings: Vec<VarBinding>) -> Self {
        Self {
            sender,
            sender_name: None,
            bindings,
            handled: AtomicBool::new(false),
        }
    }

    /// Attach a resolved host name
    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    /// Mark the event as handled. Calling it again has no further effect.
    pub fn mark_handled(&self) {
        self.handled.store(true, Ordering::Release);
    }

    /// Whether some classifier has taken responsibility for this event
    pub fn is_handled(&self) -> bool {
        self.handled.load(Ordering::Acquire)
    }

    /// Name used for the `sender` placeholder
    pub fn sender_display(&self) -> String {
        self.sender_name
            .clone()
            .unwrap_or_else(|| self.sender.to_string())
    }

    /// First binding for the given OID
    pub fn binding(&self, oid: &Oid) -> Option<&VarBinding> {
        self.bindings.iter().find(|b| &b.oid == oid)
    }

    /// Non-null values, in order
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.bindings
            .iter()
            .map(|b| &b.value)
            .filter(|v| !v.is_null())
    }

    /// Each non-null value on its own line
    pub fn body(&self) -> String {
        let mut body = String::new();
        for value in self.values() {
            body.push_str(&value.to_string());
            body.push('\n');
        }
        body
    }
}

impl Clone for TrapEvent {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender,
            sender_name: self.sender_name.clone(),
            bindings: self.bindings.clone(),
            handled: AtomicBool::new(self.is_handled()),
        }
    }
}
