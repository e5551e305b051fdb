//! Utility macros for common `smbd-rs` data types.
//!
//! This crate currently provides [`macro@mbitfield`], which is re-exported
//! as `smbd_dtyp::mbitfield` and shall be used through that path.

use proc_macro::TokenStream;
use quote::quote;
use syn::{ItemStruct, parse_macro_input};

/// Attribute macro for wire-encodable bitfields.
///
/// Wraps [`modular_bitfield::bitfield`] and bridges the generated type into
/// binrw through its packed byte representation, so a bitfield field can be
/// used directly inside `#[binrw]` structs:
///
/// ```ignore
/// #[smbd_dtyp::mbitfield]
/// pub struct OpenFlags {
///     pub additional_info: bool,
///     pub exclusive_oplock: bool,
///     pub batch_oplock: bool,
///     #[skip]
///     __: B13,
/// }
/// ```
///
/// The total bit width must be a multiple of 8; bit order is LSB-first,
/// matching the little-endian SMB wire encoding.
#[proc_macro_attribute]
pub fn mbitfield(_attr: TokenStream, input: TokenStream) -> TokenStream {
    let item = parse_macro_input!(input as ItemStruct);

    TokenStream::from(quote! {
        #[::modular_bitfield::bitfield]
        #[derive(::binrw::BinRead, ::binrw::BinWrite, Debug, Clone, Copy, PartialEq, Eq, Default)]
        #[br(map = Self::from_bytes)]
        #[bw(map = |&x| Self::into_bytes(x))]
        #item
    })
}
