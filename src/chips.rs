//! Per-device constants for the AVR parts the loader can be built for.
//!
//! Pick one of the constants below as [`IspMemIO::CHIP`](crate::IspMemIO::CHIP).
//! Parts that are not listed can be described with a custom [`Chip`] value.

/// Which configuration fuses a part exposes through the lock/fuse read
/// instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuseLayout {
    /// Lock bits, low and high fuse.
    LockLowHigh,
    /// Lock bits, low, high and extended fuse.
    LockLowHighExtended,
}

/// Build-time description of a target part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chip {
    /// Part name, used in log output only.
    pub name: &'static str,
    /// Three signature bytes as returned by the ISP `0x30` instruction.
    pub signature: [u8; 3],
    /// Program memory size in bytes.
    pub flash_size: u32,
    /// Self-programming page size in bytes.
    pub page_size: u16,
    /// EEPROM size in bytes.
    pub eeprom_size: u16,
    /// Fuses readable by the lock/fuse instructions.
    pub fuses: FuseLayout,
}

impl Chip {
    /// Signature lookup table indexed by the low two bits of the ISP address
    /// byte. The fourth slot is never populated by real parts and reads as `0`.
    pub const fn signature_table(&self) -> [u8; 4] {
        [self.signature[0], self.signature[1], self.signature[2], 0]
    }

    /// `true` when addresses above 64 KiB need the long address request.
    pub const fn needs_long_address(&self) -> bool {
        self.flash_size > 0x1_0000
    }

    /// `true` when the part answers the extended fuse read.
    pub const fn has_extended_fuse(&self) -> bool {
        matches!(self.fuses, FuseLayout::LockLowHighExtended)
    }
}

macro_rules! chip {
    ($ident:ident, $name:literal, [$s0:literal, $s1:literal, $s2:literal], $flash:expr, $page:literal, $eeprom:literal, $fuses:ident) => {
        #[doc = concat!("ATmega ", $name)]
        pub const $ident: Chip = Chip {
            name: $name,
            signature: [$s0, $s1, $s2],
            flash_size: $flash,
            page_size: $page,
            eeprom_size: $eeprom,
            fuses: FuseLayout::$fuses,
        };
    };
}

chip!(ATMEGA8535, "8535", [0x1e, 0x93, 0x08], 8 * 1024, 64, 512, LockLowHigh);
chip!(ATMEGA8, "8", [0x1e, 0x93, 0x07], 8 * 1024, 64, 512, LockLowHigh);
chip!(ATMEGA16, "16", [0x1e, 0x94, 0x03], 16 * 1024, 128, 512, LockLowHigh);
chip!(ATMEGA32, "32", [0x1e, 0x95, 0x02], 32 * 1024, 128, 1024, LockLowHigh);
chip!(ATMEGA88, "88", [0x1e, 0x93, 0x0a], 8 * 1024, 64, 512, LockLowHighExtended);
chip!(ATMEGA88PA, "88PA", [0x1e, 0x93, 0x0f], 8 * 1024, 64, 512, LockLowHighExtended);
chip!(ATMEGA164A, "164A", [0x1e, 0x94, 0x0f], 16 * 1024, 128, 512, LockLowHighExtended);
chip!(ATMEGA164P, "164P", [0x1e, 0x94, 0x0a], 16 * 1024, 128, 512, LockLowHighExtended);
chip!(ATMEGA168, "168", [0x1e, 0x94, 0x06], 16 * 1024, 128, 512, LockLowHighExtended);
chip!(ATMEGA168PA, "168PA", [0x1e, 0x94, 0x0b], 16 * 1024, 128, 512, LockLowHighExtended);
chip!(ATMEGA324A, "324A", [0x1e, 0x95, 0x15], 32 * 1024, 128, 1024, LockLowHighExtended);
chip!(ATMEGA324P, "324P", [0x1e, 0x95, 0x08], 32 * 1024, 128, 1024, LockLowHighExtended);
chip!(ATMEGA324PA, "324PA", [0x1e, 0x95, 0x11], 32 * 1024, 128, 1024, LockLowHighExtended);
chip!(ATMEGA328, "328", [0x1e, 0x95, 0x14], 32 * 1024, 128, 1024, LockLowHighExtended);
chip!(ATMEGA328P, "328P", [0x1e, 0x95, 0x0f], 32 * 1024, 128, 1024, LockLowHighExtended);
chip!(ATMEGA640, "640", [0x1e, 0x96, 0x08], 64 * 1024, 256, 4096, LockLowHighExtended);
chip!(ATMEGA644, "644", [0x1e, 0x96, 0x09], 64 * 1024, 256, 2048, LockLowHighExtended);
chip!(ATMEGA644P, "644P", [0x1e, 0x96, 0x0a], 64 * 1024, 256, 2048, LockLowHighExtended);
chip!(ATMEGA128, "128", [0x1e, 0x97, 0x02], 128 * 1024, 256, 4096, LockLowHighExtended);
chip!(ATMEGA1280, "1280", [0x1e, 0x97, 0x03], 128 * 1024, 256, 4096, LockLowHighExtended);
chip!(ATMEGA1281, "1281", [0x1e, 0x97, 0x04], 128 * 1024, 256, 4096, LockLowHighExtended);
chip!(ATMEGA1284, "1284", [0x1e, 0x97, 0x06], 128 * 1024, 256, 4096, LockLowHighExtended);
chip!(ATMEGA1284P, "1284P", [0x1e, 0x97, 0x05], 128 * 1024, 256, 4096, LockLowHighExtended);
chip!(ATMEGA2560, "2560", [0x1e, 0x98, 0x01], 256 * 1024, 256, 4096, LockLowHighExtended);
chip!(ATMEGA2561, "2561", [0x1e, 0x98, 0x02], 256 * 1024, 256, 4096, LockLowHighExtended);
