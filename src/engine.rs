use log::debug;

use crate::lifecycle::{ExitHysteresis, ExitPolicy};
use crate::mem::IspMemIO;
use crate::policy::{ErasePolicy, ProtectedRegion};
use crate::request::*;
use crate::transfer::{PageAccumulator, TransferKind, TransferRegister};

/// Width of the status display.
const DISPLAY_COLUMNS: usize = 16;

/// USBasp protocol engine: request dispatcher, ISP interpreter and
/// streaming transfers over an [`IspMemIO`] implementation.
///
/// The engine knows nothing about USB framing. [`AspLoaderClass`](crate::AspLoaderClass)
/// feeds it from `usb-device`, other transports can call
/// [`setup()`](AspEngine::setup), [`read()`](AspEngine::read) and
/// [`write()`](AspEngine::write) directly.
pub struct AspEngine<M: IspMemIO> {
    pub(crate) mem: M,
    pub(crate) transfer: TransferRegister,
    pub(crate) page: PageAccumulator,
    exit: ExitHysteresis,
}

impl<M: IspMemIO> AspEngine<M> {
    pub(crate) const REGION: ProtectedRegion =
        ProtectedRegion::new(M::LOADER_ADDRESS, M::CHIP.flash_size, M::CHIP.page_size);

    const CONFIG_CHECK: () = {
        assert!(
            M::CHIP.page_size.is_power_of_two() && M::CHIP.page_size >= 2,
            "page size must be a power of two"
        );
        assert!(
            M::LOADER_ADDRESS < M::CHIP.flash_size,
            "loader address is outside of flash"
        );
        assert!(
            !matches!(M::ERASE_POLICY, ErasePolicy::BulkPreErased) || M::HAS_CHIP_ERASE,
            "BulkPreErased requires chip erase support"
        );
        assert!(
            !M::EXIT_POLICY.can_exit() || M::EXIT_POLICY.threshold() > 0,
            "exit threshold must be non-zero"
        );
    };

    /// Creates a new engine over `mem`.
    pub fn new(mem: M) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CONFIG_CHECK;

        Self {
            mem,
            transfer: TransferRegister::new(M::CHIP.needs_long_address()),
            page: PageAccumulator::new(),
            exit: ExitHysteresis::new(M::EXIT_POLICY),
        }
    }

    /// The memory implementation.
    pub fn mem(&self) -> &M {
        &self.mem
    }

    /// The memory implementation, mutable.
    pub fn mem_mut(&mut self) -> &mut M {
        &mut self.mem
    }

    /// Current address/length register.
    pub fn transfer(&self) -> &TransferRegister {
        &self.transfer
    }

    /// Base of the flash page buffered but not yet committed, if any.
    pub fn pending_page(&self) -> Option<u32> {
        self.page.pending()
    }

    /// Region the engine refuses to write.
    pub fn protected_region(&self) -> ProtectedRegion {
        Self::REGION
    }

    /// Exit hysteresis driven by host requests.
    pub fn exit(&self) -> &ExitHysteresis {
        &self.exit
    }

    /// Exit hysteresis, for [`Loader::step`](crate::Loader::step).
    pub fn exit_mut(&mut self) -> &mut ExitHysteresis {
        &mut self.exit
    }

    /// Decode one control request.
    ///
    /// Either returns an immediate reply or arms a streamed transfer that
    /// the transport then completes with [`read()`](AspEngine::read) or
    /// [`write()`](AspEngine::write).
    pub fn setup(&mut self, setup: &SetupPacket) -> SetupReply {
        match setup.request {
            USBASP_FUNC_TRANSMIT => {
                let rval = self.transmit(setup.isp_command());
                SetupReply::with_len([0, 0, 0, rval], 4)
            }
            USBASP_FUNC_ENABLEPROG | USBASP_FUNC_SETISPSCK => {
                // byte 0 is never touched, zero means success
                SetupReply::with_len([0; 4], 1)
            }
            USBASP_FUNC_SETLONGADDRESS => {
                self.transfer.set_address_low(setup.value);
                self.transfer.set_address_high(setup.index);
                SetupReply::empty()
            }
            USBASP_FUNC_READFLASH
            | USBASP_FUNC_WRITEFLASH
            | USBASP_FUNC_READEEPROM
            | USBASP_FUNC_WRITEEEPROM => {
                let kind = match setup.request {
                    USBASP_FUNC_READFLASH => TransferKind::FlashRead,
                    USBASP_FUNC_WRITEFLASH => TransferKind::FlashWrite,
                    USBASP_FUNC_READEEPROM => TransferKind::EepromRead,
                    _ => TransferKind::EepromWrite,
                };
                self.transfer.set_address_low(setup.value);
                self.transfer
                    .arm(kind, setup.transfer_length(), setup.is_last_page());
                debug!(
                    "arm {:?} at {:#07x}, {} bytes, last page {}",
                    kind,
                    self.transfer.address(),
                    self.transfer.remaining(),
                    self.transfer.is_last_page()
                );
                SetupReply::Stream
            }
            USBASP_FUNC_DISCONNECT => {
                self.exit.disconnect();
                match M::EXIT_POLICY {
                    ExitPolicy::Never => {}
                    ExitPolicy::Hysteresis { .. } => self.show_status(1, "         "),
                    ExitPolicy::AfterUpload { .. } => self.show_status(1, "reset... "),
                }
                SetupReply::empty()
            }
            request => {
                if request == USBASP_FUNC_CONNECT {
                    self.show_status(1, "upload...");
                }
                // a host is talking to us, don't leave under its feet
                self.exit.host_activity();
                SetupReply::empty()
            }
        }
    }

    /// Show the greeting on the first display row.
    pub fn show_banner(&mut self) {
        self.show_status(0, "Bootloader");
    }

    /// Abandon whatever transfer was in progress.
    pub fn usb_reset(&mut self) {
        self.transfer.abandon();
        self.mem.usb_reset();
    }

    fn show_status(&mut self, row: u8, text: &str) {
        let mut end = text.len().min(DISPLAY_COLUMNS);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        self.mem.lcd_set_cursor(0, row);
        self.mem.lcd_write(&text[..end]);
    }
}
