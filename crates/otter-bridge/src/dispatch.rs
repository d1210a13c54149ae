//! Dynamic member dispatch
//!
//! Late-bound callers (binders, scripting front ends) describe what they want
//! as a [`DispatchOp`] and hand it to [`Proxy::dispatch`]. Each operation
//! maps to exactly one proxy primitive.
//!
//! Failures are routed by the caller's [`ScriptFrame`]: with a frame, an
//! error raised before script execution started is parked in the frame and
//! the operation reports [`Dispatch::Unbound`]; an error raised after
//! execution started always propagates. Disposed proxies always fail.

use tracing::warn;

use crate::error::{BridgeError, BridgeResult};
use crate::proxy::{ForeignObject, Proxy};
use crate::value::HostValue;

/// Operation requested through dynamic dispatch
#[derive(Debug, Clone)]
pub enum DispatchOp<'a> {
    GetMember(&'a str),
    SetMember(&'a str, HostValue),
    /// Indexer read; exactly one index argument
    GetIndex(Vec<HostValue>),
    /// Indexer write; exactly one index argument
    SetIndex(Vec<HostValue>, HostValue),
    Invoke {
        args: Vec<HostValue>,
        as_constructor: bool,
    },
    InvokeMember(&'a str, Vec<HostValue>),
}

impl DispatchOp<'_> {
    /// Operation name, for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetMember(_) => "get-member",
            Self::SetMember(..) => "set-member",
            Self::GetIndex(_) => "get-index",
            Self::SetIndex(..) => "set-index",
            Self::Invoke { .. } => "invoke",
            Self::InvokeMember(..) => "invoke-member",
        }
    }
}

/// Outcome of a dispatched operation
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// The operation ran; setters bind to the assigned value
    Bound(HostValue),
    /// The operation failed and its error was stored in the frame
    Unbound,
}

impl Dispatch {
    pub fn into_value(self) -> Option<HostValue> {
        match self {
            Self::Bound(value) => Some(value),
            Self::Unbound => None,
        }
    }
}

/// Error slot of the calling script frame
#[derive(Debug, Default)]
pub struct ScriptFrame {
    error: Option<BridgeError>,
}

impl ScriptFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored error, if any
    pub fn error(&self) -> Option<&BridgeError> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<BridgeError> {
        self.error.take()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Index argument of an indexer operation
enum Key<'a> {
    Index(u32),
    Name(&'a str),
}

fn indexer_key(args: &[HostValue]) -> BridgeResult<Key<'_>> {
    let [arg] = args else {
        return Err(BridgeError::ArgumentCount {
            expected: 1,
            actual: args.len(),
        });
    };
    if let Some(index) = arg.as_f64().filter(|n| n.fract() == 0.0 && *n >= 0.0 && *n <= f64::from(u32::MAX)) {
        return Ok(Key::Index(index as u32));
    }
    match arg {
        HostValue::String(name) => Ok(Key::Name(name)),
        other => Err(BridgeError::type_error("integer or string index", other.type_name())),
    }
}

impl Proxy {
    /// Run a dynamically requested operation
    pub fn dispatch(&self, op: DispatchOp<'_>, frame: Option<&mut ScriptFrame>) -> BridgeResult<Dispatch> {
        if self.is_disposed() {
            return Err(BridgeError::Disposed);
        }
        let name = op.name();
        match (self.run(op), frame) {
            (Ok(value), _) => Ok(Dispatch::Bound(value)),
            (Err(e), _) if e.execution_started() => Err(e),
            (Err(e), Some(frame)) => {
                warn!(op = name, error = %e, "dispatch failed; error stored in script frame");
                frame.error = Some(e);
                Ok(Dispatch::Unbound)
            }
            (Err(e), None) => Err(e),
        }
    }

    fn run(&self, op: DispatchOp<'_>) -> BridgeResult<HostValue> {
        match op {
            DispatchOp::GetMember(name) => self.get_property(name),
            DispatchOp::SetMember(name, value) => {
                self.set_property(name, value.clone())?;
                Ok(value)
            }
            DispatchOp::GetIndex(args) => match indexer_key(&args)? {
                Key::Index(index) => self.get_index(index),
                Key::Name(name) => self.get_property(name),
            },
            DispatchOp::SetIndex(args, value) => {
                match indexer_key(&args)? {
                    Key::Index(index) => self.set_index(index, value.clone())?,
                    Key::Name(name) => self.set_property(name, value.clone())?,
                }
                Ok(value)
            }
            DispatchOp::Invoke {
                args,
                as_constructor,
            } => self.invoke(as_constructor, &args),
            DispatchOp::InvokeMember(name, args) => self.invoke_method(name, &args),
        }
    }
}
