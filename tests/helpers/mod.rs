#![allow(dead_code)]
use std::marker::PhantomData;

use usb_device::bus::UsbBusAllocator;
use usb_device::class::UsbClass;
use usbd_class_tester::prelude::*;

use usbd_asp_loader::*;

// Requests
pub const FUNC_CONNECT: u8 = 1;
pub const FUNC_DISCONNECT: u8 = 2;
pub const FUNC_TRANSMIT: u8 = 3;
pub const FUNC_READFLASH: u8 = 4;
pub const FUNC_ENABLEPROG: u8 = 5;
pub const FUNC_WRITEFLASH: u8 = 6;
pub const FUNC_READEEPROM: u8 = 7;
pub const FUNC_WRITEEEPROM: u8 = 8;
pub const FUNC_SETLONGADDRESS: u8 = 9;
pub const FUNC_SETISPSCK: u8 = 10;
pub const FUNC_GETCAPABILITIES: u8 = 127;

pub const BLOCKFLAG_LAST: u8 = 0x02;

/// Build-time knobs of the simulated part, mirrored onto [`IspMemIO`].
pub trait SimConfig {
    const CHIP: Chip;
    const LOADER_ADDRESS: u32;
    const SELF_PROTECT: bool = true;
    const ERASE_POLICY: ErasePolicy = ErasePolicy::OnDemand;
    const HAS_CHIP_ERASE: bool = true;
    const HAS_READ_LOCK_FUSE: bool = true;
    const HAS_FLASH_BYTE_READ: bool = true;
    const HAS_EEPROM_BYTE_ACCESS: bool = true;
    const EXIT_POLICY: ExitPolicy = ExitPolicy::Never;
}

/// ATmega328P with the loader in the top 4 KiB.
pub struct Mega328;

impl SimConfig for Mega328 {
    const CHIP: Chip = chips::ATMEGA328P;
    const LOADER_ADDRESS: u32 = 0x7000;
}

pub const FUSES: [u8; 4] = [0xcf, 0xff, 0xd8, 0xfd];

/// Simulated AVR self-programming, EEPROM and display.
pub struct SimAvr<Cfg: SimConfig> {
    pub flash: Vec<u8>,
    page_buffer: Vec<u16>,
    pub eeprom: Vec<u8>,
    pub rww_enabled: bool,
    busy: bool,
    pub erased_pages: Vec<u32>,
    pub written_pages: Vec<u32>,
    pub lcd: Vec<(u8, String)>,
    lcd_row: u8,
    pub usb_resets: usize,
    _cfg: PhantomData<Cfg>,
}

impl<Cfg: SimConfig> SimAvr<Cfg> {
    pub fn new() -> Self {
        let page_words = Cfg::CHIP.page_size as usize / 2;
        Self {
            flash: Self::init_flash(),
            page_buffer: vec![0xffff; page_words],
            eeprom: (0..Cfg::CHIP.eeprom_size).map(|i| (i as u8) ^ 0x5a).collect(),
            rww_enabled: true,
            busy: false,
            erased_pages: Vec::new(),
            written_pages: Vec::new(),
            lcd: Vec::new(),
            lcd_row: 0,
            usb_resets: 0,
            _cfg: PhantomData,
        }
    }

    fn init_flash() -> Vec<u8> {
        (0..Cfg::CHIP.flash_size as usize).map(init_byte).collect()
    }

    pub fn page_size() -> u32 {
        Cfg::CHIP.page_size as u32
    }

    fn page_base(address: u32) -> u32 {
        address & !(Self::page_size() - 1)
    }

    fn check_spm(&self, address: u32) {
        assert!(!self.busy, "SPM started while busy");
        let loader = Self::page_base(Cfg::LOADER_ADDRESS);
        if Cfg::SELF_PROTECT {
            assert!(
                Self::page_base(address) < loader,
                "SPM on loader page {:#x}",
                address
            );
        }
    }

    pub fn slice(&self, address: u32, len: usize) -> &[u8] {
        &self.flash[address as usize..address as usize + len]
    }
}

impl<Cfg: SimConfig> IspMemIO for SimAvr<Cfg> {
    const CHIP: Chip = Cfg::CHIP;
    const LOADER_ADDRESS: u32 = Cfg::LOADER_ADDRESS;
    const SELF_PROTECT: bool = Cfg::SELF_PROTECT;
    const ERASE_POLICY: ErasePolicy = Cfg::ERASE_POLICY;
    const HAS_CHIP_ERASE: bool = Cfg::HAS_CHIP_ERASE;
    const HAS_READ_LOCK_FUSE: bool = Cfg::HAS_READ_LOCK_FUSE;
    const HAS_FLASH_BYTE_READ: bool = Cfg::HAS_FLASH_BYTE_READ;
    const HAS_EEPROM_BYTE_ACCESS: bool = Cfg::HAS_EEPROM_BYTE_ACCESS;
    const EXIT_POLICY: ExitPolicy = Cfg::EXIT_POLICY;

    fn flash_read(&mut self, address: u32) -> u8 {
        assert!(self.rww_enabled, "flash read with RWW section disabled");
        self.flash[address as usize % self.flash.len()]
    }

    fn page_fill(&mut self, address: u32, word: u16) {
        assert!(!self.busy, "page fill while busy");
        let idx = (address % Self::page_size()) as usize / 2;
        self.page_buffer[idx] = word;
    }

    fn page_erase(&mut self, address: u32) {
        self.check_spm(address);
        let base = Self::page_base(address) as usize;
        self.flash[base..base + Self::page_size() as usize].fill(0xff);
        self.erased_pages.push(base as u32);
        self.busy = true;
        self.rww_enabled = false;
    }

    fn page_write(&mut self, address: u32) {
        self.check_spm(address);
        let base = Self::page_base(address) as usize;
        for (i, word) in self.page_buffer.iter().enumerate() {
            let [lo, hi] = word.to_le_bytes();
            // emulate flash write - set bits to 0 only
            self.flash[base + 2 * i] &= lo;
            self.flash[base + 2 * i + 1] &= hi;
        }
        self.page_buffer.fill(0xffff);
        self.written_pages.push(base as u32);
        self.busy = true;
        self.rww_enabled = false;
    }

    fn spm_busy_wait(&mut self) {
        self.busy = false;
    }

    fn rww_enable(&mut self) {
        assert!(!self.busy, "RWW enable while busy");
        // RWWSRE also clears the temporary page buffer
        self.page_buffer.fill(0xffff);
        self.rww_enabled = true;
    }

    fn read_fuse(&mut self, fuse: Fuse) -> u8 {
        match fuse {
            Fuse::Lock => FUSES[0],
            Fuse::Low => FUSES[1],
            Fuse::High => FUSES[2],
            Fuse::Extended => FUSES[3],
        }
    }

    fn eeprom_read(&mut self, address: u16) -> u8 {
        let len = self.eeprom.len();
        self.eeprom[address as usize % len]
    }

    fn eeprom_write(&mut self, address: u16, value: u8) {
        let len = self.eeprom.len();
        self.eeprom[address as usize % len] = value;
    }

    fn lcd_set_cursor(&mut self, _col: u8, row: u8) {
        self.lcd_row = row;
    }

    fn lcd_write(&mut self, text: &str) {
        self.lcd.push((self.lcd_row, text.to_string()));
    }

    fn usb_reset(&mut self) {
        self.usb_resets += 1;
    }
}

/// Loader class factory for a simulated part.
pub struct MkLoader<Cfg: SimConfig>(PhantomData<Cfg>);

impl<Cfg: SimConfig> MkLoader<Cfg> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<Cfg: SimConfig + 'static> UsbDeviceCtx for MkLoader<Cfg> {
    type C<'c> = AspLoaderClass<EmulatedUsbBus, SimAvr<Cfg>>;
    const EP0_SIZE: u8 = 8;

    fn create_class<'a>(
        &mut self,
        alloc: &'a UsbBusAllocator<EmulatedUsbBus>,
    ) -> AnyResult<AspLoaderClass<EmulatedUsbBus, SimAvr<Cfg>>> {
        Ok(AspLoaderClass::new(alloc, SimAvr::new()))
    }
}

pub trait DeviceExt<C> {
    fn vendor_in(
        &mut self,
        cls: &mut C,
        req: u8,
        value: u16,
        index: u16,
        length: u16,
    ) -> AnyResult<Vec<u8>>;
    fn vendor_out(
        &mut self,
        cls: &mut C,
        req: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> AnyResult<Vec<u8>>;

    fn connect(&mut self, cls: &mut C) -> AnyResult<Vec<u8>>;
    fn disconnect(&mut self, cls: &mut C) -> AnyResult<Vec<u8>>;
    fn enable_prog(&mut self, cls: &mut C) -> AnyResult<Vec<u8>>;
    fn transmit(&mut self, cls: &mut C, cmd: [u8; 4]) -> AnyResult<Vec<u8>>;
    fn set_long_address(&mut self, cls: &mut C, address: u32) -> AnyResult<Vec<u8>>;
    fn read_flash(&mut self, cls: &mut C, address: u16, length: u16) -> AnyResult<Vec<u8>>;
    fn write_flash(
        &mut self,
        cls: &mut C,
        address: u16,
        data: &[u8],
        last: bool,
    ) -> AnyResult<Vec<u8>>;
    fn read_eeprom(&mut self, cls: &mut C, address: u16, length: u16) -> AnyResult<Vec<u8>>;
    fn write_eeprom(&mut self, cls: &mut C, address: u16, data: &[u8]) -> AnyResult<Vec<u8>>;
}

impl<'a, C, M> DeviceExt<C> for Device<'a, C, M>
where
    C: UsbClass<EmulatedUsbBus>,
    M: UsbDeviceCtx<C<'a> = C>,
{
    fn vendor_in(
        &mut self,
        cls: &mut C,
        req: u8,
        value: u16,
        index: u16,
        length: u16,
    ) -> AnyResult<Vec<u8>> {
        self.control_read(
            cls,
            CtrRequestType::to_host().vendor().device(),
            req,
            value,
            index,
            length,
        )
    }

    fn vendor_out(
        &mut self,
        cls: &mut C,
        req: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> AnyResult<Vec<u8>> {
        if data.len() > u16::MAX as usize {
            return Err(AnyUsbError::DataConversion);
        }
        self.control_write(
            cls,
            CtrRequestType::to_device().vendor().device(),
            req,
            value,
            index,
            data.len() as u16,
            data,
        )
    }

    fn connect(&mut self, cls: &mut C) -> AnyResult<Vec<u8>> {
        self.vendor_in(cls, FUNC_CONNECT, 0, 0, 4)
    }

    fn disconnect(&mut self, cls: &mut C) -> AnyResult<Vec<u8>> {
        self.vendor_in(cls, FUNC_DISCONNECT, 0, 0, 4)
    }

    fn enable_prog(&mut self, cls: &mut C) -> AnyResult<Vec<u8>> {
        self.vendor_in(cls, FUNC_ENABLEPROG, 0, 0, 4)
    }

    fn transmit(&mut self, cls: &mut C, cmd: [u8; 4]) -> AnyResult<Vec<u8>> {
        let value = u16::from_le_bytes([cmd[0], cmd[1]]);
        let index = u16::from_le_bytes([cmd[2], cmd[3]]);
        self.vendor_in(cls, FUNC_TRANSMIT, value, index, 4)
    }

    fn set_long_address(&mut self, cls: &mut C, address: u32) -> AnyResult<Vec<u8>> {
        self.vendor_in(
            cls,
            FUNC_SETLONGADDRESS,
            address as u16,
            (address >> 16) as u16,
            4,
        )
    }

    fn read_flash(&mut self, cls: &mut C, address: u16, length: u16) -> AnyResult<Vec<u8>> {
        self.vendor_in(cls, FUNC_READFLASH, address, 0, length)
    }

    fn write_flash(
        &mut self,
        cls: &mut C,
        address: u16,
        data: &[u8],
        last: bool,
    ) -> AnyResult<Vec<u8>> {
        let flags = if last { BLOCKFLAG_LAST } else { 0 };
        let index = u16::from_le_bytes([0x80, flags]);
        self.vendor_out(cls, FUNC_WRITEFLASH, address, index, data)
    }

    fn read_eeprom(&mut self, cls: &mut C, address: u16, length: u16) -> AnyResult<Vec<u8>> {
        self.vendor_in(cls, FUNC_READEEPROM, address, 0, length)
    }

    fn write_eeprom(&mut self, cls: &mut C, address: u16, data: &[u8]) -> AnyResult<Vec<u8>> {
        self.vendor_out(cls, FUNC_WRITEEEPROM, address, 0, data)
    }
}

// Initial flash is: [0,0, 1,0, 2,0, ... 255,0, 0,1, ...]
pub fn init_byte(i: usize) -> u8 {
    if i & 1 == 1 {
        ((i >> 9) & 0xff) as u8
    } else {
        ((i >> 1) & 0xff) as u8
    }
}

pub fn init_slice(address: u32, len: usize) -> Vec<u8> {
    (address as usize..address as usize + len)
        .map(init_byte)
        .collect()
}

/// Bytes `seed, seed+1, ...` of length `len`.
pub fn pattern(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}
