use core::fmt;

/// Reasons a streamed write chunk is refused.
///
/// A refused chunk is reported to the transport, which stalls the control
/// transfer. The rest of the transfer is abandoned; the host is expected to
/// notice the failure (or a later verify mismatch) and retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    /// The next word would land inside the loader's own flash region.
    Protected {
        /// Byte address that was about to be filled.
        address: u32,
    },
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteError::Protected { address } => {
                write!(f, "write to protected loader region at {:#07x}", address)
            }
        }
    }
}
