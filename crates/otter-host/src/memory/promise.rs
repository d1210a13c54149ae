//! Promise state and reaction jobs
//!
//! Settling a promise never runs handlers directly: reactions are queued as
//! microtask jobs and drained when the outermost exclusive turn ends.

use super::heap::{Heap, HeapObject, Kind, ObjectId, Value};

#[derive(Clone, Debug)]
pub(crate) enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

/// Handlers registered with `then`, plus the promise they settle
#[derive(Clone, Debug)]
pub(crate) struct Reaction {
    pub(crate) on_fulfilled: Value,
    pub(crate) on_rejected: Value,
    pub(crate) derived: Option<ObjectId>,
}

#[derive(Debug)]
pub(crate) struct PromiseSlot {
    pub(crate) state: PromiseState,
    reactions: Vec<Reaction>,
}

/// A queued reaction together with the outcome it reacts to
#[derive(Debug)]
pub(crate) struct Job {
    pub(crate) reaction: Reaction,
    pub(crate) rejected: bool,
    pub(crate) value: Value,
}

impl Heap {
    pub(crate) fn new_promise(&mut self) -> ObjectId {
        self.alloc(HeapObject::new(Kind::Promise(PromiseSlot {
            state: PromiseState::Pending,
            reactions: Vec::new(),
        })))
    }

    pub(crate) fn promise_state(&self, id: ObjectId) -> Option<&PromiseState> {
        match &self.object(id).kind {
            Kind::Promise(slot) => Some(&slot.state),
            _ => None,
        }
    }

    /// Resolve a promise, adopting the state of a promise value
    pub(crate) fn resolve_promise(&mut self, id: ObjectId, value: Value) {
        match value {
            Value::Object(other) if other == id => {
                let error = self.new_error(
                    "TypeError",
                    "Chaining cycle detected for promise",
                    None,
                    None,
                );
                self.settle(id, true, Value::Object(error));
            }
            Value::Object(other) if self.is_promise(&value) => {
                self.add_reaction(
                    other,
                    Reaction {
                        on_fulfilled: Value::Undefined,
                        on_rejected: Value::Undefined,
                        derived: Some(id),
                    },
                );
            }
            value => self.settle(id, false, value),
        }
    }

    /// Fulfill or reject a pending promise; settled promises are left alone
    pub(crate) fn settle(&mut self, id: ObjectId, rejected: bool, value: Value) {
        let Kind::Promise(slot) = &mut self.object_mut(id).kind else {
            return;
        };
        if !matches!(slot.state, PromiseState::Pending) {
            return;
        }
        slot.state = if rejected {
            PromiseState::Rejected(value.clone())
        } else {
            PromiseState::Fulfilled(value.clone())
        };
        let reactions = std::mem::take(&mut slot.reactions);
        for reaction in reactions {
            self.jobs.push_back(Job {
                reaction,
                rejected,
                value: value.clone(),
            });
        }
    }

    /// Register a reaction, queueing it at once if the promise is settled
    pub(crate) fn add_reaction(&mut self, id: ObjectId, reaction: Reaction) {
        let Kind::Promise(slot) = &mut self.object_mut(id).kind else {
            return;
        };
        let (rejected, value) = match &slot.state {
            PromiseState::Pending => {
                slot.reactions.push(reaction);
                return;
            }
            PromiseState::Fulfilled(value) => (false, value.clone()),
            PromiseState::Rejected(value) => (true, value.clone()),
        };
        self.jobs.push_back(Job {
            reaction,
            rejected,
            value,
        });
    }

    /// `promise.then(on_fulfilled, on_rejected)`, returning the derived promise
    pub(crate) fn then(&mut self, id: ObjectId, on_fulfilled: Value, on_rejected: Value) -> ObjectId {
        let derived = self.new_promise();
        self.add_reaction(
            id,
            Reaction {
                on_fulfilled,
                on_rejected,
                derived: Some(derived),
            },
        );
        derived
    }
}
