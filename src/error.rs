use core::fmt;

/// Errors reported by the area engine.
///
/// `E` is the error type of the underlying flash device. Low-level failures
/// keep the device error so the caller can inspect its
/// [`NorFlashErrorKind`](embedded_storage::nor_flash::NorFlashErrorKind).
///
/// None of these are recoverable by retrying inside the engine; the caller
/// decides what is fatal. The `checksum₂` repair performed during mount is
/// forward-state completion after an earlier tear, not a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Two slots share the same non-erased version (corruption).
    VersionCollision,
    /// No slot passes the integrity check (unformatted, or corrupted beyond
    /// recovery).
    NoValidVersion,
    /// Address argument outside the area data window.
    FirstNotInData,
    /// Address plus size outside the area data window.
    LastNotInData,
    /// Address not a multiple of the write-unit size where required.
    BaseMisaligned,
    /// Size not a multiple of the write-unit size where required.
    SizeMisaligned,
    /// Basic path invoked while a transaction is active.
    TransactionOngoing,
    /// Transactional path invoked outside a transaction.
    NoTransaction,
    /// Same write unit written twice in one transaction.
    TransactionOverwrite,
    /// `write_size` exceeds [`WU_MAX_SIZE`](crate::WU_MAX_SIZE), or the NVM
    /// granularities are inconsistent.
    WuSizeTooLarge,
    /// Area base or size not aligned to the erase-page size.
    AreaMisaligned,
    /// Area cannot hold at least two slots.
    AreaTooSmall,
    /// Area or NVM window exceeds the addressable range.
    AreaOutOfBounds,
    /// The registry is full; raise `MAX_AREAS`.
    TooManyAreas,
    /// Transaction tracker buffer shorter than
    /// [`tracker_len`](crate::tracker_len) requires.
    TrackerTooSmall,
    /// Source address range is outside the NVM window.
    SourceOutOfBounds,
    /// Invariant violated; a bug in the engine or a misbehaving device.
    Internal,
    /// The erase callback failed.
    Erase(E),
    /// The program callback failed.
    Program(E),
    /// The read callback failed.
    Read(E),
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::VersionCollision => write!(f, "two slots share the same version"),
            Error::NoValidVersion => write!(f, "no slot holds a valid version"),
            Error::FirstNotInData => write!(f, "address outside the area data window"),
            Error::LastNotInData => write!(f, "address range ends outside the area data window"),
            Error::BaseMisaligned => write!(f, "address not write-unit aligned"),
            Error::SizeMisaligned => write!(f, "size not a write-unit multiple"),
            Error::TransactionOngoing => write!(f, "basic write during an active transaction"),
            Error::NoTransaction => write!(f, "no transaction is active"),
            Error::TransactionOverwrite => {
                write!(f, "write unit written twice in one transaction")
            }
            Error::WuSizeTooLarge => write!(f, "unsupported write-unit size"),
            Error::AreaMisaligned => write!(f, "area not aligned to erase pages"),
            Error::AreaTooSmall => write!(f, "area smaller than two slots"),
            Error::AreaOutOfBounds => write!(f, "area outside the NVM window"),
            Error::TooManyAreas => write!(f, "area registry is full"),
            Error::TrackerTooSmall => write!(f, "transaction tracker buffer too small"),
            Error::SourceOutOfBounds => write!(f, "source range outside the NVM window"),
            Error::Internal => write!(f, "internal invariant violated"),
            Error::Erase(e) => write!(f, "erase failed: {e:?}"),
            Error::Program(e) => write!(f, "program failed: {e:?}"),
            Error::Read(e) => write!(f, "read failed: {e:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_stable() {
        let e: Error<()> = Error::TransactionOverwrite;
        let mut buf = heapless::String::<64>::new();
        core::fmt::write(&mut buf, format_args!("{e}")).unwrap();
        assert_eq!(buf.as_str(), "write unit written twice in one transaction");
    }
}
