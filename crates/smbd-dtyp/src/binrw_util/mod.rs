//! binrw helper types shared by all wire crates.

pub mod boolean;
pub mod file_time;
pub mod fixed_string;
pub mod pos_marker;
pub mod smb_string;

pub mod prelude {
    pub use super::boolean::Boolean;
    pub use super::file_time::FileTime;
    pub use super::fixed_string::FixedWideString;
    pub use super::pos_marker::PosMarker;
    pub use super::smb_string::{SmbStrArgs, SmbString, SmbStringSize};
}
