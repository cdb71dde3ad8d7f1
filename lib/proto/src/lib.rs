//! Wire protocol for the Battleship session server: packet framing, the
//! pre-shared symmetric key, and the frame codec (encode/decode).

pub const MAGIC: u32 = 0x4253_4850;
pub const IV_SIZE: usize = 16;
/// Header is magic(4) + seq(4) + type(1) + data_len(4) + checksum(4).
pub const HEADER_SIZE: usize = 17;

pub mod crypto;
pub mod key;
pub mod packet;
pub mod codec;

pub use codec::{decode, encode, DecodeError};
pub use key::Key;
pub use packet::{Header, PacketType};
