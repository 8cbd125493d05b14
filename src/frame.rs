use std::sync::Arc;

use crate::value::{Nonlocals, SlotArray, Value};

/// A runtime activation record: one slot array for the current call (or
/// top-level evaluation), plus the non-local environment the executing
/// operation graph was closed over.
pub(crate) struct Frame {
    pub slots: Vec<Value>,
    pub nonlocals: Nonlocals,
}

impl Frame {
    /// A top-level frame with no non-local environment.
    pub fn new(nslots: usize) -> Frame {
        Frame {
            slots: vec![Value::Null; nslots],
            nonlocals: Nonlocals::None,
        }
    }

    /// A frame for forcing a module field thunk or evaluating module
    /// elements: scratch slots plus the module's own slot array.
    pub fn for_module(slots: &Arc<SlotArray>) -> Frame {
        Frame {
            slots: vec![Value::Null; slots.frame_nslots],
            nonlocals: Nonlocals::Module(slots.clone()),
        }
    }

    /// A frame for a closure call: the arguments fill the first slots, the
    /// rest are scratch for `let` and `for` bindings in the body.
    pub fn for_call(mut args: Vec<Value>, nslots: usize, nonlocals: Nonlocals) -> Frame {
        args.resize(nslots, Value::Null);
        Frame {
            slots: args,
            nonlocals,
        }
    }
}
