//! Legacy ISP instructions tunneled through `USBASP_FUNC_TRANSMIT`.
//!
//! The host believes it is talking to an AVR through an ISP programmer and
//! sends raw 4-byte serial programming instructions. Only the handful the
//! loader can answer on its own chip are implemented. Anything else is
//! answered with `0`, the protocol has no negative acknowledge.

use log::info;

use crate::engine::AspEngine;
use crate::mem::{Fuse, IspMemIO};

const ISP_READ_SIGNATURE: u8 = 0x30;
const ISP_READ_LOCK_OR_HIGH: u8 = 0x58;
const ISP_READ_LOW_OR_EXTENDED: u8 = 0x50;
const ISP_READ_FLASH_LOW: u8 = 0x20;
const ISP_READ_FLASH_HIGH: u8 = 0x28;
const ISP_READ_EEPROM: u8 = 0xa0;
const ISP_WRITE_EEPROM: u8 = 0xc0;
const ISP_CHIP_ERASE: u8 = 0xac;
const ISP_CHIP_ERASE_ARG: u8 = 0x80;

impl<M: IspMemIO> AspEngine<M> {
    /// Execute one ISP instruction `[cmd, addr_hi, addr_lo, data]` and
    /// return the byte a real chip would shift out last.
    pub(crate) fn transmit(&mut self, cmd: [u8; 4]) -> u8 {
        let address = u16::from_be_bytes([cmd[1], cmd[2]]);

        match (cmd[0], cmd[1]) {
            (ISP_READ_SIGNATURE, _) => M::SIGNATURE[(cmd[2] & 3) as usize],
            (ISP_READ_LOCK_OR_HIGH, 0x00) if M::HAS_READ_LOCK_FUSE => {
                self.mem.read_fuse(Fuse::Lock)
            }
            (ISP_READ_LOW_OR_EXTENDED, 0x00) if M::HAS_READ_LOCK_FUSE => {
                self.mem.read_fuse(Fuse::Low)
            }
            (ISP_READ_LOCK_OR_HIGH, 0x08) if M::HAS_READ_LOCK_FUSE => {
                self.mem.read_fuse(Fuse::High)
            }
            (ISP_READ_LOW_OR_EXTENDED, 0x08)
                if M::HAS_READ_LOCK_FUSE && M::CHIP.has_extended_fuse() =>
            {
                self.mem.read_fuse(Fuse::Extended)
            }
            // address is a word address here
            (ISP_READ_FLASH_LOW, _) if M::HAS_FLASH_BYTE_READ => {
                self.mem.flash_read((address as u32) << 1)
            }
            (ISP_READ_FLASH_HIGH, _) if M::HAS_FLASH_BYTE_READ => {
                self.mem.flash_read(((address as u32) << 1) + 1)
            }
            (ISP_READ_EEPROM, _) if M::HAS_EEPROM_BYTE_ACCESS => self.mem.eeprom_read(address),
            (ISP_WRITE_EEPROM, _) if M::HAS_EEPROM_BYTE_ACCESS => {
                self.mem.eeprom_write(address, cmd[3]);
                0
            }
            (ISP_CHIP_ERASE, ISP_CHIP_ERASE_ARG) if M::HAS_CHIP_ERASE => {
                self.chip_erase();
                0
            }
            _ => 0,
        }
    }

    /// Erase every application page, stopping below the loader when
    /// self-protection is on.
    fn chip_erase(&mut self) {
        let limit = Self::REGION.erase_limit(M::SELF_PROTECT);
        info!("chip erase of {} up to {:#07x}", M::CHIP.name, limit);

        for address in (0..limit).step_by(M::CHIP.page_size as usize) {
            self.mem.spm_busy_wait();
            critical_section::with(|_| self.mem.page_erase(address));
        }

        self.mem.spm_busy_wait();
        critical_section::with(|_| self.mem.rww_enable());
    }
}
