#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
//!
//! USBasp-compatible self-programming loader for a `usb-device` device.
//!
//! ## About
//!
//! The loader lives at the top of an AVR's program memory. After an
//! external reset with its entry condition met (a jumper, a button) it
//! shows up on USB as a USBasp programmer. Host tools such as `avrdude
//! -c usbasp` then read and write flash and EEPROM of the very chip the
//! loader runs on, without a separate hardware programmer.
//!
//! The USBasp protocol is a set of vendor control requests. Most of them
//! arm a streamed read or write of flash or EEPROM; `TRANSMIT` carries a
//! raw 4-byte ISP instruction which the loader partially emulates
//! (signature, fuses, byte access, chip erase).
//!
//! This library implements the protocol and the loader lifecycle only.
//! Flash self-programming, EEPROM access, the status display and board
//! control are expected to be provided by the library user through
//! [`IspMemIO`] and [`LoaderPlatform`].
//!
//! ### Supported operations
//!
//! * Flash read and write, paged, with long addressing on parts above 64 KiB
//! * EEPROM read and write
//! * ISP signature, lock bit and fuse reads
//! * ISP flash and EEPROM byte access
//! * ISP chip erase
//!
//! ### Safety of the loader itself
//!
//! With [`IspMemIO::SELF_PROTECT`] (the default) no write and no chip erase
//! touches the pages the loader occupies. A write reaching them is refused
//! and the request stalls.
//!
//! ### Limitations
//!
//! * Streamed transfers are limited to 255 bytes per request, the USBasp
//!   protocol only counts the low byte of wLength. `usb-device` is used with
//!   its `control-buffer-256` feature so such a block fits.
//!
//! * Uploaded images are not verified; host tools verify by reading back.
//!
//! ## Example
//!
//! ```ignore
//! use usb_device::prelude::*;
//! use usbd_asp_loader::*;
//!
//! struct Mega328;
//!
//! impl IspMemIO for Mega328 {
//!     const CHIP: Chip = chips::ATMEGA328P;
//!     const LOADER_ADDRESS: u32 = 0x7000;
//!     const EXIT_POLICY: ExitPolicy = ExitPolicy::AfterUpload { threshold: 15 };
//!
//!     fn flash_read(&mut self, address: u32) -> u8 { /* LPM */ }
//!     fn page_fill(&mut self, address: u32, word: u16) { /* SPM fill */ }
//!     fn page_erase(&mut self, address: u32) { /* SPM erase */ }
//!     fn page_write(&mut self, address: u32) { /* SPM write */ }
//!     fn spm_busy_wait(&mut self) { /* wait for SPMEN */ }
//!     fn rww_enable(&mut self) { /* SPM RWWSRE */ }
//!     fn read_fuse(&mut self, fuse: Fuse) -> u8 { /* BLBSET */ }
//!     fn eeprom_read(&mut self, address: u16) -> u8 { /* EEAR/EEDR */ }
//!     fn eeprom_write(&mut self, address: u16, value: u8) { /* EEAR/EEDR */ }
//! }
//!
//! let usb_bus_alloc = /* board USB bus */;
//! let mut class = AspLoaderClass::new(&usb_bus_alloc, Mega328);
//! let mut usb_dev = UsbDeviceBuilder::new(&usb_bus_alloc, UsbVidPid(USBASP_VID, USBASP_PID))
//!     .strings(&[StringDescriptors::default()
//!         .manufacturer(USBASP_MANUFACTURER)
//!         .product(USBASP_PRODUCT)])
//!     .unwrap()
//!     .build();
//!
//! // Jumper on PD7 keeps the loader resident.
//! let loader = Loader::new(MyBoard::new(), || jumper_set());
//! loader.run(&mut usb_dev, &mut class);
//! ```
//!

/// Per-device constants
pub mod chips;
/// USB class
pub mod class;
mod engine;
mod error;
mod isp;
/// Loader lifecycle
pub mod lifecycle;
mod mem;
/// Self-protection and erase policy
pub mod policy;
mod request;
mod transfer;

#[doc(inline)]
pub use crate::chips::{Chip, FuseLayout};
#[doc(inline)]
pub use crate::class::{
    AspLoaderClass, USBASP_MANUFACTURER, USBASP_PID, USBASP_PRODUCT, USBASP_VID,
};
pub use crate::engine::AspEngine;
pub use crate::error::WriteError;
#[doc(inline)]
pub use crate::lifecycle::{
    EntryCondition, ExitHysteresis, ExitPolicy, Loader, LoaderPlatform, LoaderState, VectorTable,
};
pub use crate::mem::{Fuse, IspMemIO};
#[doc(inline)]
pub use crate::policy::{ErasePolicy, ProtectedRegion};
pub use crate::request::{SetupPacket, SetupReply};
pub use crate::transfer::{TransferKind, TransferRegister};
