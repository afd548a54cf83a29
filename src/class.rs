use core::cmp::min;
use core::marker::PhantomData;
use log::trace;
use usb_device::class_prelude::*;

use crate::engine::AspEngine;
use crate::mem::IspMemIO;
use crate::request::{SetupPacket, SetupReply};

const USB_CLASS_VENDOR_SPECIFIC: u8 = 0xFF;
const USB_SUBCLASS_NONE: u8 = 0x00;
const USB_PROTOCOL_NONE: u8 = 0x00;

/// Largest streamed block; wLength is only counted in its low byte.
const MAX_BLOCK_SIZE: usize = 255;

/// Vendor ID the host tools look for (VOTI, shared USBasp ID).
pub const USBASP_VID: u16 = 0x16c0;
/// Product ID the host tools look for.
pub const USBASP_PID: u16 = 0x05dc;
/// Manufacturer string the host tools match on.
pub const USBASP_MANUFACTURER: &str = "www.fischl.de";
/// Product string the host tools match on.
pub const USBASP_PRODUCT: &str = "USBasp";

/// USBasp loader USB class implementation for usb-device library.
///
/// All requests are vendor requests addressed to the device. IN requests
/// are answered from [`AspEngine::setup`] or, for streamed reads, from
/// [`AspEngine::read`]. OUT data of streamed writes goes to
/// [`AspEngine::write`]; a refused write stalls the request.
pub struct AspLoaderClass<B: UsbBus, M: IspMemIO> {
    if_num: InterfaceNumber,
    engine: AspEngine<M>,
    _bus: PhantomData<B>,
}

impl<B: UsbBus, M: IspMemIO> UsbClass<B> for AspLoaderClass<B, M> {
    fn get_configuration_descriptors(
        &self,
        writer: &mut DescriptorWriter,
    ) -> usb_device::Result<()> {
        writer.interface(
            self.if_num,
            USB_CLASS_VENDOR_SPECIFIC,
            USB_SUBCLASS_NONE,
            USB_PROTOCOL_NONE,
        )?;

        Ok(())
    }

    // Handle control requests to the host.
    fn control_in(&mut self, xfer: ControlIn<B>) {
        let req = *xfer.request();

        if req.request_type != control::RequestType::Vendor {
            return;
        }

        if req.recipient != control::Recipient::Device {
            return;
        }

        match self.engine.setup(&SetupPacket::from(&req)) {
            SetupReply::Stream => {
                let mut buf = [0u8; MAX_BLOCK_SIZE];
                let want = min(req.length as usize, MAX_BLOCK_SIZE);
                let len = self.engine.read(&mut buf[..want]);
                xfer.accept_with(&buf[..len]).ok();
            }
            reply => {
                let data = reply.data();
                let len = min(req.length as usize, data.len());
                xfer.accept_with(&data[..len]).ok();
            }
        }
    }

    // Handle a control request from the host.
    fn control_out(&mut self, xfer: ControlOut<B>) {
        let req = *xfer.request();

        if req.request_type != control::RequestType::Vendor {
            return;
        }

        if req.recipient != control::Recipient::Device {
            return;
        }

        match self.engine.setup(&SetupPacket::from(&req)) {
            SetupReply::Stream => match self.engine.write(xfer.data()) {
                Ok(last) => {
                    trace!("write chunk accepted, last {}", last);
                    xfer.accept().ok();
                }
                Err(_) => {
                    xfer.reject().ok();
                }
            },
            SetupReply::Data { .. } => {
                xfer.accept().ok();
            }
        }
    }

    fn reset(&mut self) {
        self.engine.usb_reset();
    }
}

impl<B: UsbBus, M: IspMemIO> AspLoaderClass<B, M> {
    /// Creates a new AspLoaderClass with the provided UsbBus and
    /// IspMemIO
    pub fn new(alloc: &UsbBusAllocator<B>, mem: M) -> Self {
        Self {
            if_num: alloc.interface(),
            engine: AspEngine::new(mem),
            _bus: PhantomData,
        }
    }

    /// The protocol engine.
    pub fn engine(&self) -> &AspEngine<M> {
        &self.engine
    }

    /// The protocol engine, mutable.
    pub fn engine_mut(&mut self) -> &mut AspEngine<M> {
        &mut self.engine
    }

    /// The memory implementation.
    pub fn mem(&self) -> &M {
        self.engine.mem()
    }
}
