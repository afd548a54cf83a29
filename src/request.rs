use usb_device::control::Request;

pub(crate) const USBASP_FUNC_CONNECT: u8 = 1;
pub(crate) const USBASP_FUNC_DISCONNECT: u8 = 2;
pub(crate) const USBASP_FUNC_TRANSMIT: u8 = 3;
pub(crate) const USBASP_FUNC_READFLASH: u8 = 4;
pub(crate) const USBASP_FUNC_ENABLEPROG: u8 = 5;
pub(crate) const USBASP_FUNC_WRITEFLASH: u8 = 6;
pub(crate) const USBASP_FUNC_READEEPROM: u8 = 7;
pub(crate) const USBASP_FUNC_WRITEEEPROM: u8 = 8;
pub(crate) const USBASP_FUNC_SETLONGADDRESS: u8 = 9;
pub(crate) const USBASP_FUNC_SETISPSCK: u8 = 10;

/// Bit in the high byte of wIndex marking the final page of an image.
const LAST_PAGE_FLAG: u8 = 0x02;

/// The fields of an 8-byte control request header that the loader looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPacket {
    /// bRequest
    pub request: u8,
    /// wValue
    pub value: u16,
    /// wIndex
    pub index: u16,
    /// wLength
    pub length: u16,
}

impl SetupPacket {
    /// Decode a raw setup packet as it appears on the wire.
    pub fn from_bytes(raw: &[u8; 8]) -> Self {
        Self {
            request: raw[1],
            value: u16::from_le_bytes([raw[2], raw[3]]),
            index: u16::from_le_bytes([raw[4], raw[5]]),
            length: u16::from_le_bytes([raw[6], raw[7]]),
        }
    }

    /// The four legacy ISP bytes carried by a `TRANSMIT` request.
    pub(crate) fn isp_command(&self) -> [u8; 4] {
        let [v0, v1] = self.value.to_le_bytes();
        let [i0, i1] = self.index.to_le_bytes();
        [v0, v1, i0, i1]
    }

    /// Streamed transfers only count the low byte of wLength.
    pub(crate) fn transfer_length(&self) -> u8 {
        self.length.to_le_bytes()[0]
    }

    pub(crate) fn is_last_page(&self) -> bool {
        self.index.to_le_bytes()[1] & LAST_PAGE_FLAG != 0
    }
}

impl From<&Request> for SetupPacket {
    fn from(req: &Request) -> Self {
        Self {
            request: req.request,
            value: req.value,
            index: req.index,
            length: req.length,
        }
    }
}

/// What the dispatcher wants the transport to do with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupReply {
    /// Answer right away with up to four bytes.
    Data {
        /// Reply buffer. Unused bytes are zero.
        buf: [u8; 4],
        /// Number of valid bytes in `buf`.
        len: usize,
    },
    /// A transfer was armed; the data stage goes through
    /// [`AspEngine::read`](crate::AspEngine::read) or
    /// [`AspEngine::write`](crate::AspEngine::write).
    Stream,
}

impl SetupReply {
    pub(crate) fn empty() -> Self {
        SetupReply::Data {
            buf: [0; 4],
            len: 0,
        }
    }

    pub(crate) fn with_len(buf: [u8; 4], len: usize) -> Self {
        SetupReply::Data { buf, len }
    }

    /// Reply payload, empty for [`SetupReply::Stream`].
    pub fn data(&self) -> &[u8] {
        match self {
            SetupReply::Data { buf, len } => &buf[..*len],
            SetupReply::Stream => &[],
        }
    }
}
