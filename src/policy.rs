//! Self-protection and erase policy.
//!
//! Both axes are fixed at build time through associated constants of
//! [`IspMemIO`](crate::IspMemIO):
//!
//! * [`SELF_PROTECT`](crate::IspMemIO::SELF_PROTECT) - when set, no streamed
//!   write and no chip erase ever reaches the loader's own pages. When unset
//!   the check is skipped entirely, which is smaller but lets a bad image
//!   overwrite the loader.
//! * [`ERASE_POLICY`](crate::IspMemIO::ERASE_POLICY) - whether each page is
//!   erased right before it is written, or whether the host is trusted to
//!   have issued a chip erase first.

/// How a page is prepared before it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErasePolicy {
    /// Erase every page immediately before writing it.
    OnDemand,
    /// Skip the per-page erase. The host must issue the ISP chip erase
    /// instruction before uploading, so this requires
    /// [`HAS_CHIP_ERASE`](crate::IspMemIO::HAS_CHIP_ERASE).
    BulkPreErased,
}

impl ErasePolicy {
    /// `true` if a page commit has to erase the page first.
    pub const fn erases_per_page(self) -> bool {
        matches!(self, ErasePolicy::OnDemand)
    }
}

/// Half-open range of program memory occupied by the loader,
/// `[start, flash_end)`.
///
/// `start` is the loader address rounded down to a page boundary so that a
/// page commit can never straddle the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectedRegion {
    start: u32,
    end: u32,
}

impl ProtectedRegion {
    /// Region for a loader linked at `loader_address` on a part with
    /// `flash_size` bytes of flash and `page_size` byte pages.
    pub const fn new(loader_address: u32, flash_size: u32, page_size: u16) -> Self {
        let page = page_size as u32;
        Self {
            start: loader_address - (loader_address % page),
            end: flash_size,
        }
    }

    /// First protected byte address.
    pub const fn start(&self) -> u32 {
        self.start
    }

    /// One past the last protected byte address.
    pub const fn end(&self) -> u32 {
        self.end
    }

    /// `true` if `address` belongs to the loader.
    pub const fn contains(&self, address: u32) -> bool {
        address >= self.start && address < self.end
    }

    /// Upper bound (exclusive) of a chip erase. With self-protection the
    /// erase stops right below the loader, otherwise it covers the whole part.
    pub const fn erase_limit(&self, self_protect: bool) -> u32 {
        if self_protect {
            self.start
        } else {
            self.end
        }
    }
}
