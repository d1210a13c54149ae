//! Ordered sequence view of an engine array
//!
//! Indexed reads and writes go through the index primitives. Appending,
//! insertion, removal and clearing call the array's own `push` and `splice`
//! so each runs as one engine-side operation.

use otter_host::{EngineHost, RawHandle, ScriptValue};

use crate::error::{BridgeError, BridgeResult};
use crate::proxy::{ForeignObject, ScriptArray};
use crate::value::HostValue;

fn to_index(index: usize, size: usize) -> BridgeResult<u32> {
    u32::try_from(index).map_err(|_| BridgeError::OutOfRange {
        offset: index,
        size,
    })
}

fn length_of(host: &dyn EngineHost, handle: &RawHandle) -> BridgeResult<usize> {
    let length = host.get_property(handle, "length")?;
    match length.as_f64() {
        Some(n) if n >= 0.0 => Ok(n as usize),
        _ => Err(BridgeError::type_error("array length", length.type_name())),
    }
}

impl ScriptArray {
    /// Current element count
    pub fn len(&self) -> BridgeResult<usize> {
        self.core().exclusive(length_of)
    }

    pub fn is_empty(&self) -> BridgeResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Element at `index`; holes and indices past the end read as undefined
    pub fn get(&self, index: usize) -> BridgeResult<HostValue> {
        self.get_index(to_index(index, u32::MAX as usize)?)
    }

    pub fn set(&self, index: usize, value: impl Into<HostValue>) -> BridgeResult<()> {
        self.set_index(to_index(index, u32::MAX as usize)?, value)
    }

    /// Append through the array's `push`
    pub fn push(&self, value: impl Into<HostValue>) -> BridgeResult<()> {
        self.invoke_method_raw("push", &[value.into()])
    }

    /// Insert before `index`; `index == len` appends
    pub fn insert(&self, index: usize, value: impl Into<HostValue>) -> BridgeResult<()> {
        let value = value.into();
        let core = self.core();
        core.exclusive(|host, handle| {
            let len = length_of(host, handle)?;
            if index > len {
                return Err(BridgeError::OutOfRange { offset: index, size: len });
            }
            let value = core.bridge().marshaler(host).to_foreign(&value)?;
            self.splice(host, handle, vec![index_arg(index), ScriptValue::Int32(0), value])
        })
    }

    /// Remove the element at `index`
    pub fn remove_at(&self, index: usize) -> BridgeResult<()> {
        self.core().exclusive(|host, handle| {
            let len = length_of(host, handle)?;
            if index >= len {
                return Err(BridgeError::OutOfRange { offset: index, size: len });
            }
            self.splice(host, handle, vec![index_arg(index), ScriptValue::Int32(1)])
        })
    }

    /// Remove every element
    pub fn clear(&self) -> BridgeResult<()> {
        self.core()
            .exclusive(|host, handle| self.splice(host, handle, vec![ScriptValue::Int32(0)]))
    }

    /// Position of the first strictly equal element, via the array's `indexOf`
    pub fn index_of(&self, value: &HostValue) -> BridgeResult<Option<usize>> {
        let core = self.core();
        core.exclusive(|host, handle| {
            let marshaler = core.bridge().marshaler(host);
            let needle = marshaler.to_foreign(value)?;
            core.bridge().record_call();
            let found = host.invoke_method(handle, "indexOf", &[needle])?;
            let position = found.as_f64();
            marshaler.discard(found);
            Ok(position.filter(|n| *n >= 0.0).map(|n| n as usize))
        })
    }

    pub fn contains(&self, value: &HostValue) -> BridgeResult<bool> {
        Ok(self.index_of(value)?.is_some())
    }

    /// Remove the first element equal to `value`
    pub fn remove(&self, value: &HostValue) -> BridgeResult<bool> {
        match self.index_of(value)? {
            Some(index) => self.remove_at(index).map(|()| true),
            None => Ok(false),
        }
    }

    /// Iterate over the elements present when the iterator was created
    ///
    /// The length is read once; elements removed meanwhile read as undefined.
    pub fn iter(&self) -> BridgeResult<ArrayIter> {
        Ok(ArrayIter {
            array: self.clone(),
            index: 0,
            len: self.len()?,
        })
    }

    /// Copy the elements out in one engine turn
    pub fn to_vec(&self) -> BridgeResult<Vec<HostValue>> {
        let core = self.core();
        core.exclusive(|host, handle| {
            let marshaler = core.bridge().marshaler(host);
            let len = length_of(host, handle)?;
            (0..len)
                .map(|index| {
                    let value = host.get_index(handle, to_index(index, len)?)?;
                    marshaler.to_host(value, false)
                })
                .collect()
        })
    }

    /// Copy the elements into `dest` starting at `index`
    pub fn copy_to(&self, dest: &mut [HostValue], index: usize) -> BridgeResult<()> {
        let items = self.to_vec()?;
        let available = dest.len().saturating_sub(index);
        if index > dest.len() || items.len() > available {
            return Err(BridgeError::InsufficientSpace {
                needed: items.len(),
                available,
            });
        }
        for (slot, item) in dest[index..].iter_mut().zip(items) {
            *slot = item;
        }
        Ok(())
    }

    fn splice(&self, host: &dyn EngineHost, handle: &RawHandle, args: Vec<ScriptValue>) -> BridgeResult<()> {
        self.bridge().record_call();
        let removed = host.invoke_method(handle, "splice", &args)?;
        self.bridge().marshaler(host).discard(removed);
        Ok(())
    }
}

fn index_arg(index: usize) -> ScriptValue {
    i32::try_from(index).map_or(ScriptValue::Number(index as f64), ScriptValue::Int32)
}

/// Iterator over a [`ScriptArray`]
#[derive(Debug)]
pub struct ArrayIter {
    array: ScriptArray,
    index: usize,
    len: usize,
}

impl Iterator for ArrayIter {
    type Item = BridgeResult<HostValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.len {
            return None;
        }
        let item = self.array.get(self.index);
        self.index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.index;
        (remaining, Some(remaining))
    }
}
