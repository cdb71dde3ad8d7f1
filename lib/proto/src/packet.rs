use crate::{HEADER_SIZE, IV_SIZE, MAGIC};

/// One of the packet types the wire protocol carries, per spec §6.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum PacketType {
    Username = 0,
    GameStart = 1,
    Move = 2,
    BoardUpdate = 3,
    GameEnd = 4,
    Error = 5,
    Disconnect = 6,
    Reconnect = 7,
    Ack = 8,
    Heartbeat = 9,
    Chat = 10,
}

impl PacketType {
    #[inline]
    pub fn from_byte(byte: u8) -> Option<PacketType> {
        Some(match byte {
            0 => PacketType::Username,
            1 => PacketType::GameStart,
            2 => PacketType::Move,
            3 => PacketType::BoardUpdate,
            4 => PacketType::GameEnd,
            5 => PacketType::Error,
            6 => PacketType::Disconnect,
            7 => PacketType::Reconnect,
            8 => PacketType::Ack,
            9 => PacketType::Heartbeat,
            10 => PacketType::Chat,
            _ => return None,
        })
    }
}

/// The parsed, decrypted form of a wire packet's fixed-size prefix.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Header {
    pub magic: u32,
    pub seq: u32,
    pub packet_type: PacketType,
    pub data_len: u32,
    pub checksum: u32,
}

impl Header {
    pub const SIZE: usize = HEADER_SIZE;

    #[inline]
    pub fn is_magic_valid(&self) -> bool {
        self.magic == MAGIC
    }

    /// `data_len` must equal the IV plus the ciphertext, never less than
    /// the IV alone.
    #[inline]
    pub fn ciphertext_len(&self) -> Option<usize> {
        (self.data_len as usize).checked_sub(IV_SIZE)
    }
}
