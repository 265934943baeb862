mod codec;
mod data;
mod dirty;

pub(crate) use codec::{
    read_exact, read_u32, read_u64, read_u8, write_count, write_u32, write_u64, write_u8,
};
pub use codec::{DecodeError, EncodeError};
pub use data::{SimEntityData, SimEntityInternals};
pub use dirty::DirtyBits;
