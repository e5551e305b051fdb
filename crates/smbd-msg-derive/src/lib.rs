//! Utility macros for building SMB1 messages.
//!
//! This should be used only within the `smbd-msg` crate.
//! Common utilities shall be placed in `smbd-dtyp-derive` and re-exported in `smbd-dtyp`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, Fields, ItemStruct, parse_macro_input};

enum SmbMsgType {
    Request,
    Response,
    Both,
}

impl SmbMsgType {
    /// Returns custom attributes for the SMB message type.
    ///
    /// Those shall be put before the message struct definition.
    ///
    /// A server parses requests and writes responses; the inverse derives
    /// are only pulled in for the `client` feature, which the test builds
    /// enable to exercise both directions.
    fn get_attr(&self) -> proc_macro2::TokenStream {
        match self {
            SmbMsgType::Request => quote! {
                #[cfg_attr(all(feature = "server", feature = "client"), ::binrw::binrw)]
                #[cfg_attr(all(feature = "server", not(feature = "client")), ::binrw::binread)]
                #[cfg_attr(all(not(feature = "server"), feature = "client"), ::binrw::binwrite)]
            },
            SmbMsgType::Response => quote! {
                #[cfg_attr(all(feature = "server", feature = "client"), ::binrw::binrw)]
                #[cfg_attr(all(feature = "server", not(feature = "client")), ::binrw::binwrite)]
                #[cfg_attr(all(not(feature = "server"), feature = "client"), ::binrw::binread)]
            },
            SmbMsgType::Both => quote! {
                #[::binrw::binrw]
            },
        }
    }
}

/// Performs common changes to binrw structs.
///
/// - Adding `binrw` attributes to the struct itself, depending on whether it's
///   a request or response, and the enabled features (server/client).
/// - Modifying any field named `reserved` to have `#[br(temp)]` and `#[bw(calc = Default::default())]` attributes.
fn common_struct_changes(msg_type: SmbMsgType, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);

    let is_struct = matches!(input.data, syn::Data::Struct(_));

    let cfg_attrs = msg_type.get_attr();
    let output_all = TokenStream::from(quote! {
        #cfg_attrs
        #[derive(Debug, PartialEq, Eq)]
        #input
    });

    if !is_struct {
        return output_all;
    }

    let mut item = parse_macro_input!(output_all as ItemStruct);

    if let Fields::Named(ref mut fields) = item.fields {
        let mut reserved_index = 0usize;
        for field in fields.named.iter_mut() {
            if field.ident.as_ref().is_some_and(|id| *id == "reserved") {
                if field.vis != syn::Visibility::Inherited {
                    return syn::Error::new_spanned(
                        &field.vis,
                        "reserved field must have no visibility defined",
                    )
                    .to_compile_error()
                    .into();
                }

                // Put a new, unique name for the field to avoid conflicts.
                field.ident = Some(syn::Ident::new(
                    &format!("_reserved{}", reserved_index),
                    proc_macro2::Span::call_site(),
                ));
                reserved_index += 1;

                // Add attributes to the reserved field.
                field.attrs.push(syn::parse_quote! {
                    #[br(temp)]
                });

                // If type is [u8; N], we can set it to zeroed array. Otherwise, use Default::default().
                let default_bw_calc = if let syn::Type::Array(arr) = &field.ty {
                    let len = arr.len.clone();
                    syn::parse_quote! {
                        #[bw(calc = [0; #len])]
                    }
                } else {
                    syn::parse_quote! {
                        #[bw(calc = Default::default())]
                    }
                };

                field.attrs.push(default_bw_calc);
            }
        }
    }

    TokenStream::from(quote! {
        #item
    })
}

/// Proc-macro for adding binrw attributes to SMB request structs.
///
/// Conditionally adds `BinRead` or `BinWrite` depending on server/client features.
#[proc_macro_attribute]
pub fn smb_request_binrw(_attr: TokenStream, input: TokenStream) -> TokenStream {
    common_struct_changes(SmbMsgType::Request, input)
}

/// Proc-macro for adding binrw attributes to SMB response structs.
///
/// Conditionally adds `BinRead` or `BinWrite` depending on server/client features.
#[proc_macro_attribute]
pub fn smb_response_binrw(_attr: TokenStream, input: TokenStream) -> TokenStream {
    common_struct_changes(SmbMsgType::Response, input)
}

/// Proc-macro for adding binrw attributes to SMB request and response messages.
///
/// Adds both `BinRead` and `BinWrite` attributes.
#[proc_macro_attribute]
pub fn smb_message_binrw(_attr: TokenStream, input: TokenStream) -> TokenStream {
    common_struct_changes(SmbMsgType::Both, input)
}
