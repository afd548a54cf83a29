use crate::chips::Chip;
use crate::lifecycle::ExitPolicy;
use crate::policy::ErasePolicy;

/// Configuration fuse selected by an ISP lock/fuse read instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fuse {
    /// Lock bits (`0x58 0x00`).
    Lock,
    /// Low fuse byte (`0x50 0x00`).
    Low,
    /// High fuse byte (`0x58 0x08`).
    High,
    /// Extended fuse byte (`0x50 0x08`).
    Extended,
}

/// Trait that describes the abstraction used to access program memory,
/// EEPROM and the optional status display of the device.
/// [`AspEngine`](crate::AspEngine) calls these functions and uses the
/// provided constants to select which parts of the USBasp protocol are
/// answered.
///
/// All constants are build-time configuration. `CHIP` and
/// `LOADER_ADDRESS` have no default: a loader that does not know where it
/// lives must not build. Inconsistent combinations (for example
/// [`ErasePolicy::BulkPreErased`] without chip erase) are rejected at
/// compile time when [`AspEngine::new`](crate::AspEngine::new) is
/// instantiated.
///
/// Every method is called from `usb_dev.poll([])`.
pub trait IspMemIO {
    /// Target part: signature, flash and page geometry, fuse layout.
    const CHIP: Chip;

    /// Byte address the loader is linked at. Everything from the page
    /// containing this address up to the end of flash is the protected
    /// region.
    const LOADER_ADDRESS: u32;

    /// Signature table returned by ISP instruction `0x30`. Defaults to the
    /// chip signature followed by a zero byte.
    const SIGNATURE: [u8; 4] = Self::CHIP.signature_table();

    /// Refuse streamed writes into, and chip erase of, the loader region.
    /// Default is `true`.
    const SELF_PROTECT: bool = true;

    /// Whether pages are erased right before they are written. Default is
    /// [`ErasePolicy::OnDemand`].
    const ERASE_POLICY: ErasePolicy = ErasePolicy::OnDemand;

    /// Answer the ISP chip erase instruction (`0xac 0x80`). Default is `true`.
    const HAS_CHIP_ERASE: bool = true;

    /// Answer the lock bit and fuse read instructions. Default is `true`.
    const HAS_READ_LOCK_FUSE: bool = true;

    /// Answer the flash byte read instructions (`0x20`, `0x28`).
    /// Default is `true`.
    const HAS_FLASH_BYTE_READ: bool = true;

    /// Answer the EEPROM byte read and write instructions (`0xa0`, `0xc0`).
    /// Default is `true`.
    const HAS_EEPROM_BYTE_ACCESS: bool = true;

    /// If and how the loader leaves on its own. Default is
    /// [`ExitPolicy::Never`].
    const EXIT_POLICY: ExitPolicy = ExitPolicy::Never;

    /// Read one byte of program memory.
    fn flash_read(&mut self, address: u32) -> u8;

    /// Store one little-endian word into the self-programming page buffer.
    ///
    /// Called with interrupts masked.
    fn page_fill(&mut self, address: u32, word: u16);

    /// Start erasing the page containing `address`.
    ///
    /// Called with interrupts masked. Completion is awaited with
    /// [`spm_busy_wait()`](IspMemIO::spm_busy_wait).
    fn page_erase(&mut self, address: u32);

    /// Start writing the page buffer to the page containing `address`.
    ///
    /// Called with interrupts masked. Completion is awaited with
    /// [`spm_busy_wait()`](IspMemIO::spm_busy_wait).
    fn page_write(&mut self, address: u32);

    /// Block until the last erase or write finished.
    fn spm_busy_wait(&mut self);

    /// Make the application section readable again after an erase or write.
    ///
    /// Called with interrupts masked.
    fn rww_enable(&mut self);

    /// Discard whatever the page buffer holds.
    ///
    /// Called with interrupts masked, with no erase or write in progress.
    /// Default is [`rww_enable()`](IspMemIO::rww_enable), which on AVR also
    /// clears the temporary page buffer.
    fn page_buffer_clear(&mut self) {
        self.rww_enable();
    }

    /// Read a lock or fuse byte.
    fn read_fuse(&mut self, fuse: Fuse) -> u8;

    /// Read one EEPROM byte. A bus error shows up as whatever the driver
    /// returns, there is no error channel back to the host.
    fn eeprom_read(&mut self, address: u16) -> u8;

    /// Write one EEPROM byte and wait for it to complete. Failures are
    /// silently dropped.
    fn eeprom_write(&mut self, address: u16, value: u8);

    /// Move the status display cursor. Default does nothing.
    ///
    /// Must not block the protocol path; errors are to be swallowed.
    fn lcd_set_cursor(&mut self, _col: u8, _row: u8) {}

    /// Print text at the cursor. Text is at most 16 bytes. Default does
    /// nothing.
    fn lcd_write(&mut self, _text: &str) {}

    /// Called every time USB is reset.
    fn usb_reset(&mut self) {}
}
