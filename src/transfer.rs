use core::cmp::min;
use log::{debug, trace, warn};

use crate::engine::AspEngine;
use crate::error::WriteError;
use crate::mem::IspMemIO;

/// Memory and direction of an armed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Program memory to host.
    FlashRead,
    /// Host to program memory, paged.
    FlashWrite,
    /// EEPROM to host.
    EepromRead,
    /// Host to EEPROM, byte by byte.
    EepromWrite,
}

impl TransferKind {
    /// `true` for EEPROM transfers.
    pub fn is_eeprom(self) -> bool {
        matches!(self, TransferKind::EepromRead | TransferKind::EepromWrite)
    }
}

/// Address and remaining byte count of the streamed transfer in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRegister {
    address: u32,
    remaining: u8,
    kind: TransferKind,
    last_page: bool,
    long_address: bool,
}

impl TransferRegister {
    /// Without `long_address` the address wraps at 64 KiB.
    pub(crate) const fn new(long_address: bool) -> Self {
        Self {
            address: 0,
            remaining: 0,
            kind: TransferKind::FlashRead,
            last_page: false,
            long_address,
        }
    }

    /// Current target address in bytes. EEPROM transfers use the low
    /// 16 bits only.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Bytes left before the transfer completes.
    pub fn remaining(&self) -> u8 {
        self.remaining
    }

    /// Kind of the last armed transfer.
    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    /// Whether the host marked this write as the final page of the image.
    pub fn is_last_page(&self) -> bool {
        self.last_page
    }

    pub(crate) fn set_address_low(&mut self, low: u16) {
        self.address = (self.address & 0xffff_0000) | low as u32;
    }

    pub(crate) fn set_address_high(&mut self, high: u16) {
        if self.long_address {
            self.address = (self.address & 0x0000_ffff) | ((high as u32) << 16);
        }
    }

    pub(crate) fn arm(&mut self, kind: TransferKind, length: u8, last_page: bool) {
        self.kind = kind;
        self.remaining = length;
        self.last_page = last_page;
    }

    pub(crate) fn abandon(&mut self) {
        self.remaining = 0;
    }

    /// Claim up to `len` bytes of the transfer.
    fn take(&mut self, len: usize) -> usize {
        let len = min(len, self.remaining as usize);
        self.remaining -= len as u8;
        len
    }

    fn eeprom_address(&self) -> u16 {
        self.address as u16
    }

    fn advance_eeprom(&mut self) {
        self.set_address_low(self.eeprom_address().wrapping_add(1));
    }

    fn advance(&mut self, n: u32) {
        self.address = self.address.wrapping_add(n);
        if !self.long_address {
            self.address &= 0xffff;
        }
    }
}

/// Tracks the page whose self-programming buffer is being filled.
///
/// The data itself lives in the hardware page buffer; this only keeps the
/// page base and how many bytes went in since the last commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageAccumulator {
    base: u32,
    filled: u16,
}

impl PageAccumulator {
    pub(crate) const fn new() -> Self {
        Self { base: 0, filled: 0 }
    }

    /// Page base address of the pending page, if any word is buffered.
    pub fn pending(&self) -> Option<u32> {
        if self.filled > 0 {
            Some(self.base)
        } else {
            None
        }
    }

    /// Account for one word at `address`. Returns `true` if words of another
    /// page were still pending; the caller must clear the page buffer before
    /// filling.
    fn fill(&mut self, address: u32, page_size: u32) -> bool {
        let base = address & !(page_size - 1);
        let stale = self.filled > 0 && base != self.base;
        if stale {
            debug!(
                "page {:#07x} left with {} bytes unwritten",
                self.base, self.filled
            );
            self.filled = 0;
        }
        self.base = base;
        self.filled += 2;
        stale
    }

    fn take(&mut self) -> (u32, u16) {
        let pending = (self.base, self.filled);
        self.filled = 0;
        pending
    }
}

impl<M: IspMemIO> AspEngine<M> {
    /// Copy the next bytes of an armed read into `buf`.
    ///
    /// Returns how many bytes were supplied, which is less than `buf.len()`
    /// once the transfer runs out. Reads never fail.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let len = self.transfer.take(buf.len());
        trace!("read {} bytes at {:#07x}", len, self.transfer.address());

        for b in buf[..len].iter_mut() {
            if self.transfer.kind().is_eeprom() {
                *b = self.mem.eeprom_read(self.transfer.eeprom_address());
                self.transfer.advance_eeprom();
            } else {
                *b = self.mem.flash_read(self.transfer.address());
                self.transfer.advance(1);
            }
        }
        len
    }

    /// Consume the next chunk of an armed write.
    ///
    /// Returns `Ok(true)` when this chunk completes the transfer. Flash data
    /// is buffered a word at a time and committed when a page fills up, or
    /// at the end of a transfer marked as the last page. A trailing odd byte
    /// is padded with `0xff`.
    ///
    /// Fails without touching the page buffer if the next word would land in
    /// the protected region; pages committed before that stay written.
    pub fn write(&mut self, data: &[u8]) -> Result<bool, WriteError> {
        let len = self.transfer.take(data.len());
        let is_last = self.transfer.remaining() == 0;
        let data = &data[..len];
        trace!("write {} bytes at {:#07x}", len, self.transfer.address());

        if self.transfer.kind().is_eeprom() {
            for &b in data {
                self.mem.eeprom_write(self.transfer.eeprom_address(), b);
                self.transfer.advance_eeprom();
            }
            return Ok(is_last);
        }

        let page_size = M::CHIP.page_size as u32;
        let mut words = data.chunks(2).peekable();

        while let Some(pair) = words.next() {
            let address = self.transfer.address();

            // anything past the loader start is either the loader or wraps onto it
            if M::SELF_PROTECT && address >= Self::REGION.start() {
                warn!("rejecting write at {:#07x}", address);
                self.transfer.abandon();
                return Err(WriteError::Protected { address });
            }

            let word = u16::from_le_bytes([pair[0], pair.get(1).copied().unwrap_or(0xff)]);
            if self.page.fill(address, page_size) {
                critical_section::with(|_| self.mem.page_buffer_clear());
            }
            critical_section::with(|_| self.mem.page_fill(address, word));
            self.transfer.advance(2);

            let page_done = self.transfer.address() % page_size == 0;
            let tail = is_last && words.peek().is_none() && self.transfer.is_last_page();
            if page_done || tail {
                self.commit_page(address);
            }
        }

        Ok(is_last)
    }

    /// Erase (if the policy asks for it) and write the page containing
    /// `address`, then re-enable read-while-write.
    fn commit_page(&mut self, address: u32) {
        let (base, filled) = self.page.take();
        debug!("commit page {:#07x}, {} bytes", base, filled);
        debug_assert!(!M::SELF_PROTECT || !Self::REGION.contains(address));

        if M::ERASE_POLICY.erases_per_page() {
            critical_section::with(|_| self.mem.page_erase(address));
            self.mem.spm_busy_wait();
        }

        critical_section::with(|_| self.mem.page_write(address));
        self.mem.spm_busy_wait();
        critical_section::with(|_| self.mem.rww_enable());
    }
}
