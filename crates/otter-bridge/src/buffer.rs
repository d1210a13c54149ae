//! Direct access to engine-owned binary data
//!
//! Array buffers, data views and typed arrays expose their bytes through
//! [`BufferAccess`]. The engine may move or collect a backing store as soon
//! as control returns to it, so the raw bytes are only ever lent to a
//! callback running inside the engine's turn:
//!
//! ```compile_fail
//! use otter_bridge::{ArrayBufferProxy, BufferAccess};
//!
//! fn escape(buffer: &ArrayBufferProxy) -> &'static mut [u8] {
//!     buffer.with_direct_access(|bytes| bytes).unwrap()
//! }
//! ```
//!
//! Byte transfers reject an offset at or past the end and clamp the count to
//! what remains after the offset. Element transfers on typed arrays follow
//! the same rule in element units.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::trace;

use otter_host::BufferKind;

use crate::error::{BridgeError, BridgeResult};
use crate::factory;
use crate::proxy::{
    ArrayBufferProxy, DataViewProxy, ForeignObject, Proxy, ProxyCore, TypedArrayProxy,
};

/// Layout of a buffer or view, read once per proxy
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    /// Byte offset within the backing buffer
    pub offset: usize,
    /// Size in bytes
    pub size: usize,
    /// Element count
    pub length: usize,
    /// Backing buffer; `None` for a raw buffer
    pub buffer: Option<ArrayBufferProxy>,
}

fn descriptor(core: &Arc<ProxyCore>) -> BridgeResult<&BufferDescriptor> {
    if let Some(descriptor) = core.descriptor.get() {
        core.handle()?;
        return Ok(descriptor);
    }
    let computed = core.exclusive(|host, handle| {
        let info = host.buffer_info(handle)?;
        let buffer = match info.buffer {
            Some(buffer) => match factory::wrap_handle(core.bridge(), host, buffer)? {
                Proxy::ArrayBuffer(buffer) => Some(buffer),
                other => {
                    return Err(BridgeError::type_error("ArrayBuffer", other.variant_name()));
                }
            },
            None => None,
        };
        trace!(offset = info.offset, size = info.size, length = info.length, "buffer descriptor computed");
        Ok(BufferDescriptor {
            offset: info.offset,
            size: info.size,
            length: info.length,
            buffer,
        })
    })?;
    // a racing thread may have won; its value is equally valid
    Ok(core.descriptor.get_or_init(|| computed))
}

/// Byte-level access shared by buffers and views
pub trait BufferAccess: ForeignObject {
    /// Memoized layout
    fn descriptor(&self) -> BridgeResult<&BufferDescriptor> {
        descriptor(self.core())
    }

    /// Byte offset within the backing buffer
    fn offset(&self) -> BridgeResult<usize> {
        Ok(self.descriptor()?.offset)
    }

    /// Size in bytes
    fn size(&self) -> BridgeResult<usize> {
        Ok(self.descriptor()?.size)
    }

    /// Element count; equals [`size`](Self::size) for buffers and data views
    fn length(&self) -> BridgeResult<usize> {
        Ok(self.descriptor()?.length)
    }

    /// Backing buffer of a view; `None` for a raw buffer
    fn array_buffer(&self) -> BridgeResult<Option<ArrayBufferProxy>> {
        Ok(self.descriptor()?.buffer.clone())
    }

    /// Lend the bytes to `f` for the duration of the call
    fn with_direct_access<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> BridgeResult<R> {
        self.core().exclusive(|host, handle| {
            let mut f = Some(f);
            let mut result = None;
            host.with_buffer_data(handle, &mut |bytes| {
                if let Some(f) = f.take() {
                    result = Some(f(bytes));
                }
            })?;
            result.ok_or_else(|| BridgeError::runtime("engine did not lend buffer data"))
        })
    }

    /// Copy up to `count` bytes starting at `offset` into `dest[dest_index..]`
    ///
    /// Returns the number of bytes copied, `min(count, size - offset)`.
    fn read_bytes(
        &self,
        offset: usize,
        count: usize,
        dest: &mut [u8],
        dest_index: usize,
    ) -> BridgeResult<usize> {
        let count = clamp(offset, count, self.size()?)?;
        let target = host_range(dest.len(), dest_index, count)?;
        self.with_direct_access(|bytes| {
            let source = region(bytes, offset, count)?;
            dest[target].copy_from_slice(source);
            Ok(count)
        })?
    }

    /// Copy up to `count` bytes from `src[src_index..]` to `offset`
    ///
    /// Returns the number of bytes copied, `min(count, size - offset)`.
    fn write_bytes(
        &self,
        src: &[u8],
        src_index: usize,
        count: usize,
        offset: usize,
    ) -> BridgeResult<usize> {
        let count = clamp(offset, count, self.size()?)?;
        let source = host_range(src.len(), src_index, count)?;
        self.with_direct_access(|bytes| {
            region_mut(bytes, offset, count)?.copy_from_slice(&src[source]);
            Ok(count)
        })?
    }

    /// Copy of all bytes
    fn to_bytes(&self) -> BridgeResult<Vec<u8>> {
        self.with_direct_access(|bytes| bytes.to_vec())
    }
}

impl BufferAccess for ArrayBufferProxy {}
impl BufferAccess for DataViewProxy {}
impl BufferAccess for TypedArrayProxy {}

/// Effective transfer count for a region of `size` units
fn clamp(offset: usize, count: usize, size: usize) -> BridgeResult<usize> {
    if offset >= size {
        return Err(BridgeError::OutOfRange { offset, size });
    }
    Ok(count.min(size - offset))
}

/// Range of a host slice of `len` units holding `count` units from `index`
fn host_range(len: usize, index: usize, count: usize) -> BridgeResult<std::ops::Range<usize>> {
    let available = len.saturating_sub(index);
    if index > len || count > available {
        return Err(BridgeError::InsufficientSpace {
            needed: count,
            available,
        });
    }
    Ok(index..index + count)
}

fn region(bytes: &[u8], offset: usize, count: usize) -> BridgeResult<&[u8]> {
    let size = bytes.len();
    bytes
        .get(offset..offset + count)
        .ok_or(BridgeError::OutOfRange { offset, size })
}

fn region_mut(bytes: &mut [u8], offset: usize, count: usize) -> BridgeResult<&mut [u8]> {
    let size = bytes.len();
    bytes
        .get_mut(offset..offset + count)
        .ok_or(BridgeError::OutOfRange { offset, size })
}

mod sealed {
    pub trait Sealed {}
}

/// Element type of a typed array
pub trait Element: sealed::Sealed + Copy + Default + Send + Sync + 'static {
    /// Width in bytes
    const WIDTH: usize;

    /// Whether arrays of `kind` hold this element type
    fn matches(kind: BufferKind) -> bool;

    #[doc(hidden)]
    fn read_ne(bytes: &[u8]) -> Self;

    #[doc(hidden)]
    fn write_ne(self, bytes: &mut [u8]);
}

macro_rules! impl_element {
    ($($ty:ty => $($kind:ident)|+;)*) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Element for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                fn matches(kind: BufferKind) -> bool {
                    matches!(kind, $(BufferKind::$kind)|+)
                }

                fn read_ne(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::WIDTH]);
                    <$ty>::from_ne_bytes(raw)
                }

                fn write_ne(self, bytes: &mut [u8]) {
                    bytes[..Self::WIDTH].copy_from_slice(&self.to_ne_bytes());
                }
            }
        )*
    };
}

impl_element! {
    i8 => Int8;
    u8 => Uint8 | Uint8Clamped;
    i16 => Int16;
    u16 => Uint16;
    i32 => Int32;
    u32 => Uint32;
    i64 => BigInt64;
    u64 => BigUint64;
    f32 => Float32;
    f64 => Float64;
}

impl TypedArrayProxy {
    /// Element kind reported by the engine
    pub fn element_kind(&self) -> Option<BufferKind> {
        self.core().info().buffer_kind
    }

    /// Element-addressed view with element type `T`
    ///
    /// Fails with a type error when the array holds a different element type.
    pub fn as_typed<T: Element>(&self) -> BridgeResult<TypedView<'_, T>> {
        match self.element_kind() {
            Some(kind) if T::matches(kind) => {
                let descriptor = self.descriptor()?;
                Ok(TypedView {
                    array: self,
                    length: descriptor.length,
                    width: element_width::<T>(descriptor),
                    _element: PhantomData,
                })
            }
            kind => Err(BridgeError::type_error(
                std::any::type_name::<T>(),
                kind.map_or("unknown typed array", BufferKind::name),
            )),
        }
    }

    /// The same `Uint16Array` seen as UTF-16 code units
    pub fn as_utf16(&self) -> BridgeResult<Utf16View<'_>> {
        self.as_typed::<u16>().map(|units| Utf16View { units })
    }
}

fn element_width<T: Element>(descriptor: &BufferDescriptor) -> usize {
    match descriptor.length {
        0 => T::WIDTH,
        length => descriptor.size / length,
    }
}

/// Typed-array elements of type `T`, borrowing the proxy
#[derive(Debug)]
pub struct TypedView<'a, T: Element> {
    array: &'a TypedArrayProxy,
    length: usize,
    width: usize,
    _element: PhantomData<T>,
}

impl<'a, T: Element> TypedView<'a, T> {
    /// Proxy this view borrows
    pub fn array(&self) -> &'a TypedArrayProxy {
        self.array
    }

    /// Element count
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Bytes per element (`size / length`)
    pub fn element_width(&self) -> usize {
        self.width
    }

    /// Copy up to `count` elements starting at `index` into `dest[dest_index..]`
    pub fn read(&self, index: usize, count: usize, dest: &mut [T], dest_index: usize) -> BridgeResult<usize> {
        let count = clamp(index, count, self.length)?;
        let target = host_range(dest.len(), dest_index, count)?;
        let width = self.width;
        self.array.with_direct_access(|bytes| {
            let source = region(bytes, index * width, count * width)?;
            for (slot, chunk) in dest[target].iter_mut().zip(source.chunks_exact(width)) {
                *slot = T::read_ne(chunk);
            }
            Ok(count)
        })?
    }

    /// Copy up to `count` elements from `src[src_index..]` to `index`
    pub fn write(&self, src: &[T], src_index: usize, count: usize, index: usize) -> BridgeResult<usize> {
        let count = clamp(index, count, self.length)?;
        let source = host_range(src.len(), src_index, count)?;
        let width = self.width;
        self.array.with_direct_access(|bytes| {
            let target = region_mut(bytes, index * width, count * width)?;
            for (chunk, value) in target.chunks_exact_mut(width).zip(&src[source]) {
                value.write_ne(chunk);
            }
            Ok(count)
        })?
    }

    pub fn get(&self, index: usize) -> BridgeResult<T> {
        let mut value = [T::default()];
        self.read(index, 1, &mut value, 0)?;
        Ok(value[0])
    }

    pub fn set(&self, index: usize, value: T) -> BridgeResult<()> {
        self.write(&[value], 0, 1, index).map(|_| ())
    }

    /// Copy of all elements
    pub fn to_vec(&self) -> BridgeResult<Vec<T>> {
        let mut values = vec![T::default(); self.length];
        if self.length > 0 {
            self.read(0, self.length, &mut values, 0)?;
        }
        Ok(values)
    }
}

/// A `Uint16Array` as UTF-16 text
///
/// Shares the proxy with [`TypedView<u16>`]; no second handle is taken.
#[derive(Debug)]
pub struct Utf16View<'a> {
    units: TypedView<'a, u16>,
}

impl<'a> Utf16View<'a> {
    /// Numeric view of the same elements
    pub fn units(&self) -> &TypedView<'a, u16> {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn read(&self, index: usize, count: usize, dest: &mut [u16], dest_index: usize) -> BridgeResult<usize> {
        self.units.read(index, count, dest, dest_index)
    }

    pub fn write(&self, src: &[u16], src_index: usize, count: usize, index: usize) -> BridgeResult<usize> {
        self.units.write(src, src_index, count, index)
    }

    pub fn get(&self, index: usize) -> BridgeResult<u16> {
        self.units.get(index)
    }

    pub fn set(&self, index: usize, unit: u16) -> BridgeResult<()> {
        self.units.set(index, unit)
    }

    pub fn to_vec(&self) -> BridgeResult<Vec<u16>> {
        self.units.to_vec()
    }

    /// Decode the whole array, replacing unpaired surrogates
    pub fn to_string_lossy(&self) -> BridgeResult<String> {
        Ok(String::from_utf16_lossy(&self.units.to_vec()?))
    }

    /// Encode `text` at `index`; returns the number of code units written
    pub fn write_str(&self, index: usize, text: &str) -> BridgeResult<usize> {
        let units: Vec<u16> = text.encode_utf16().collect();
        self.units.write(&units, 0, units.len(), index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Bridge;
    use otter_host::{MemoryEngine, ObjectFlags};

    fn bridge() -> (Arc<MemoryEngine>, Bridge) {
        let engine = Arc::new(MemoryEngine::new());
        let bridge = Bridge::new(engine.clone());
        (engine, bridge)
    }

    fn buffer(bridge: &Bridge, engine: &MemoryEngine, bytes: Vec<u8>) -> ArrayBufferProxy {
        let handle = engine.exclusive(|engine| engine.new_array_buffer(bytes));
        match bridge.wrap(Some(handle)).unwrap().unwrap() {
            Proxy::ArrayBuffer(buffer) => buffer,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_read_clamp_law() {
        let (engine, bridge) = bridge();
        let size = 8;
        let buf = buffer(&bridge, &engine, (0..8u8).collect());

        for offset in [0, 1, size - 1] {
            for count in [0, 1, 3, size, size + 5] {
                let mut dest = vec![0u8; size + 5];
                let read = buf.read_bytes(offset, count, &mut dest, 0).unwrap();
                assert_eq!(read, count.min(size - offset));
                let expected: Vec<u8> = ((offset as u8)..).take(read).collect();
                assert_eq!(&dest[..read], expected.as_slice());
            }
        }
        for offset in [size, size + 1] {
            let mut dest = vec![0u8; 4];
            assert!(matches!(
                buf.read_bytes(offset, 1, &mut dest, 0),
                Err(BridgeError::OutOfRange { size: 8, .. })
            ));
        }
    }

    #[test]
    fn test_host_slice_is_never_overrun() {
        let (engine, bridge) = bridge();
        let buf = buffer(&bridge, &engine, vec![1; 8]);

        let mut dest = [0u8; 4];
        assert!(matches!(
            buf.read_bytes(0, 8, &mut dest, 0),
            Err(BridgeError::InsufficientSpace {
                needed: 8,
                available: 4
            })
        ));
        assert!(matches!(
            buf.read_bytes(0, 1, &mut dest, 9),
            Err(BridgeError::InsufficientSpace { available: 0, .. })
        ));
        assert!(matches!(
            buf.write_bytes(&[1, 2], 1, 2, 0),
            Err(BridgeError::InsufficientSpace {
                needed: 2,
                available: 1
            })
        ));
        assert_eq!(dest, [0; 4]);
    }

    #[test]
    fn test_empty_transfer_past_host_slice_fails() {
        let (engine, bridge) = bridge();
        let buf = buffer(&bridge, &engine, vec![1; 8]);

        let mut dest = [0u8; 4];
        assert!(matches!(
            buf.read_bytes(0, 0, &mut dest, 10),
            Err(BridgeError::InsufficientSpace {
                needed: 0,
                available: 0
            })
        ));
        assert!(matches!(
            buf.write_bytes(&dest, 10, 0, 0),
            Err(BridgeError::InsufficientSpace { .. })
        ));
        // an empty transfer at the very end is fine
        assert_eq!(buf.read_bytes(0, 0, &mut dest, 4).unwrap(), 0);
    }

    #[test]
    fn test_write_and_direct_access() {
        let (engine, bridge) = bridge();
        let buf = buffer(&bridge, &engine, vec![0; 4]);

        assert_eq!(buf.write_bytes(&[9, 8, 7], 0, 3, 2).unwrap(), 2);
        assert_eq!(buf.to_bytes().unwrap(), vec![0, 0, 9, 8]);

        let sum = buf
            .with_direct_access(|bytes| {
                bytes[0] = 1;
                bytes.iter().map(|b| u32::from(*b)).sum::<u32>()
            })
            .unwrap();
        assert_eq!(sum, 18);
        assert_eq!(buf.size().unwrap(), 4);
        assert!(buf.array_buffer().unwrap().is_none());
    }

    #[test]
    fn test_view_descriptor_is_memoized() {
        let (engine, bridge) = bridge();
        let buf = buffer(&bridge, &engine, (0..16).collect());
        let view = bridge
            .exclusive(|host| {
                let handle = buf.core().handle()?;
                let view = engine.new_data_view(handle, 4, 8)?;
                factory::wrap_handle(&bridge, host, view)
            })
            .unwrap();
        let Proxy::DataView(view) = view else {
            panic!("expected data view");
        };

        assert_eq!(view.offset().unwrap(), 4);
        assert_eq!(view.size().unwrap(), 8);
        assert_eq!(view.length().unwrap(), 8);
        assert_eq!(view.array_buffer().unwrap(), Some(buf.clone()));
        let created = bridge.stats().snapshot().proxies_created;
        view.descriptor().unwrap();
        assert_eq!(bridge.stats().snapshot().proxies_created, created);

        let mut dest = [0u8; 2];
        assert_eq!(view.read_bytes(7, 5, &mut dest, 0).unwrap(), 1);
        assert_eq!(dest, [11, 0]);

        view.dispose();
        assert!(matches!(view.size(), Err(BridgeError::Disposed)));
    }

    #[test]
    fn test_typed_elements() {
        let (engine, bridge) = bridge();
        let buf = buffer(&bridge, &engine, vec![0; 16]);
        let array = bridge
            .exclusive(|host| {
                let handle = buf.core().handle()?;
                let array = engine.new_typed_array(BufferKind::Int32, handle, 4, 3)?;
                factory::wrap_handle(&bridge, host, array)
            })
            .unwrap();
        let array = array.as_typed_array().unwrap().clone();

        let ints = array.as_typed::<i32>().unwrap();
        assert_eq!(ints.len(), 3);
        assert_eq!(ints.element_width(), 4);
        ints.set(0, -1).unwrap();
        assert_eq!(ints.write(&[5, 6, 7], 0, 3, 1).unwrap(), 2);
        assert_eq!(ints.to_vec().unwrap(), vec![-1, 5, 6]);
        assert_eq!(ints.get(2).unwrap(), 6);
        assert!(matches!(ints.get(3), Err(BridgeError::OutOfRange { offset: 3, size: 3 })));

        let mut dest = [0i32; 2];
        assert!(matches!(
            ints.read(0, 0, &mut dest, 5),
            Err(BridgeError::InsufficientSpace { available: 0, .. })
        ));
        assert!(matches!(
            ints.write(&dest, 5, 0, 0),
            Err(BridgeError::InsufficientSpace { available: 0, .. })
        ));

        assert!(array.as_typed::<u32>().is_err());
        assert!(array.as_utf16().is_err());
        assert_eq!(&buf.to_bytes().unwrap()[4..8], &(-1i32).to_ne_bytes());
    }

    #[test]
    fn test_utf16_dual_view() {
        let (engine, bridge) = bridge();
        let handle = engine.exclusive(|engine| engine.new_shared_array_buffer(10));
        let buf = match bridge.wrap(Some(handle)).unwrap().unwrap() {
            Proxy::ArrayBuffer(buf) => buf,
            other => panic!("unexpected {:?}", other),
        };
        assert!(buf.flags().contains(ObjectFlags::SHARED));

        let array = bridge
            .exclusive(|host| {
                let handle = buf.core().handle()?;
                let array = engine.new_typed_array(BufferKind::Uint16, handle, 0, 5)?;
                factory::wrap_handle(&bridge, host, array)
            })
            .unwrap();
        let array = array.as_typed_array().unwrap().clone();
        assert!(array.is_shared());

        let text = array.as_utf16().unwrap();
        assert_eq!(text.write_str(0, "héllo").unwrap(), 5);
        assert_eq!(text.to_string_lossy().unwrap(), "héllo");

        let units = array.as_typed::<u16>().unwrap();
        assert_eq!(units.get(1).unwrap(), u16::from(b'\xe9'));
        assert_eq!(bridge.stats().snapshot().proxies_created, 3);
    }
}
