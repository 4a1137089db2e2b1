//! Marker for values that may be written as a raw byte image.

mod sealed {
    pub trait Sealed {}

    impl<T: bytemuck::Pod> Sealed for T {}
}

/// A value whose in-memory bytes are its wire format.
///
/// `PlainData` is sealed and implemented for every [`bytemuck::Pod`] type, so layout is verified
/// at compile time by `#[derive(bytemuck::Pod, bytemuck::Zeroable)]` on a `#[repr(C)]` struct:
/// no padding, no pointers and every bit pattern valid.
///
/// Raw images are copied with **no byte order conversion**. A struct made of multi-byte fields
/// only round-trips between hosts of the same byte order; make every field a byte (or byte
/// array) if the image must be portable.
///
/// ```
/// use rampart::serialization::{BinaryBufferWriter, Endianness};
///
/// #[repr(C)]
/// #[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
/// struct Pad {
///     buttons: [u8; 2],
///     stick_x: i8,
///     stick_y: i8,
/// }
///
/// let mut bytes = Vec::new();
/// BinaryBufferWriter::new(&mut bytes, Endianness::Big)
///     .write_struct(&Pad { buttons: [1, 2], stick_x: -1, stick_y: 3 })
///     .unwrap();
/// assert_eq!(bytes, vec![1, 2, 0xFF, 3]);
/// ```
pub trait PlainData: bytemuck::Pod + sealed::Sealed {}

impl<T: bytemuck::Pod> PlainData for T {}
