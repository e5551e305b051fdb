//! Windows Data Types (MS-DTYP) for SMB1/CIFS.

#![allow(unused_parens)]

pub mod binrw_util;
pub mod security;

pub use security::*;

pub use smbd_dtyp_derive::mbitfield;
