//! Change kinds reported by the kernel and the flags derived from them.
//!
//! The bit values of [`ChangeKinds`] mirror the inotify ABI so a raw event mask can be
//! converted without a translation table. Unknown bits are dropped on conversion.

use bitflags::bitflags;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

bitflags! {
    /// Set of change kinds carried by one event.
    ///
    /// A single kernel event may carry several kinds at once (`IN_CREATE | IN_ISDIR` is the
    /// common case), so this is a set and never a single label.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct ChangeKinds: u32 {
        /// File was accessed.
        const ACCESS = 0x0000_0001;
        /// File was modified.
        ///
        /// When monitoring a directory, the event occurs *only* for the files within.
        const MODIFY = 0x0000_0002;
        /// Metadata has changed (permissions, timestamps, extended attributes, link count,
        /// owner).
        const ATTRIB = 0x0000_0004;
        /// File opened for writing was closed.
        const CLOSE_WRITE = 0x0000_0008;
        /// File not opened for writing was closed.
        const CLOSE_NOWRITE = 0x0000_0010;
        /// File was opened.
        const OPEN = 0x0000_0020;
        /// File or directory was moved away from a watched directory.
        const MOVED_FROM = 0x0000_0040;
        /// File or directory was moved into a watched directory.
        const MOVED_TO = 0x0000_0080;
        /// File or directory was created inside a watched directory.
        const CREATE = 0x0000_0100;
        /// File or directory was deleted from a watched directory.
        const DELETE = 0x0000_0200;
        /// Watched file or directory was itself deleted.
        ///
        /// An `IGNORED` event will subsequently be generated.
        const DELETE_SELF = 0x0000_0400;
        /// Watched file or directory was itself moved.
        const MOVE_SELF = 0x0000_0800;
        /// Filesystem containing the watched object was unmounted.
        ///
        /// An `IGNORED` event will subsequently be generated.
        const UNMOUNT = 0x0000_2000;
        /// Event queue overflowed; events were dropped by the kernel.
        const Q_OVERFLOW = 0x0000_4000;
        /// Watch was removed, explicitly or because its target went away.
        const IGNORED = 0x0000_8000;
        /// Subject of this event is a directory.
        const ISDIR = 0x4000_0000;

        /// Every kind that can be requested when registering a watch.
        const ALL_EVENTS = Self::ACCESS.bits()
            | Self::MODIFY.bits()
            | Self::ATTRIB.bits()
            | Self::CLOSE_WRITE.bits()
            | Self::CLOSE_NOWRITE.bits()
            | Self::OPEN.bits()
            | Self::MOVED_FROM.bits()
            | Self::MOVED_TO.bits()
            | Self::CREATE.bits()
            | Self::DELETE.bits()
            | Self::DELETE_SELF.bits()
            | Self::MOVE_SELF.bits();
    }
}

bitflags! {
    /// Follow-up work implied by the kinds present in an event.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct Implications: u8 {
        /// Owner, group and permission bits should be read.
        const METADATA_READ = 0b0001;
        /// A content fingerprint should be computed.
        const FINGERPRINT = 0b0010;
        /// The subject is a directory; the watch set may need to change.
        const DIRECTORY_CHECK = 0b0100;
        /// The watch is gone and must be retired from the registry.
        const REMOVAL = 0b1000;
    }
}

/// One symbolic change kind.
///
/// Variant order is the order kinds are listed in records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ChangeKind {
    /// `IN_ACCESS`
    Access,
    /// `IN_ATTRIB`
    AttributeChange,
    /// `IN_CLOSE_NOWRITE`
    CloseNoWrite,
    /// `IN_CLOSE_WRITE`
    CloseWrite,
    /// `IN_CREATE`
    Create,
    /// `IN_DELETE`
    Delete,
    /// `IN_DELETE_SELF`
    DeleteSelf,
    /// `IN_IGNORED`
    Ignored,
    /// `IN_ISDIR`
    IsDirectory,
    /// `IN_MODIFY`
    Modify,
    /// `IN_MOVE_SELF`
    MoveSelf,
    /// `IN_MOVED_FROM`
    MovedFrom,
    /// `IN_MOVED_TO`
    MovedTo,
    /// `IN_OPEN`
    Open,
    /// `IN_Q_OVERFLOW`
    QueueOverflow,
    /// `IN_UNMOUNT`
    Unmount,
}

impl ChangeKind {
    /// All kinds, in listing order.
    pub const ALL: [ChangeKind; 16] = [
        ChangeKind::Access,
        ChangeKind::AttributeChange,
        ChangeKind::CloseNoWrite,
        ChangeKind::CloseWrite,
        ChangeKind::Create,
        ChangeKind::Delete,
        ChangeKind::DeleteSelf,
        ChangeKind::Ignored,
        ChangeKind::IsDirectory,
        ChangeKind::Modify,
        ChangeKind::MoveSelf,
        ChangeKind::MovedFrom,
        ChangeKind::MovedTo,
        ChangeKind::Open,
        ChangeKind::QueueOverflow,
        ChangeKind::Unmount,
    ];

    /// The bit this kind occupies in a [`ChangeKinds`] set.
    pub fn bit(self) -> ChangeKinds {
        match self {
            ChangeKind::Access => ChangeKinds::ACCESS,
            ChangeKind::AttributeChange => ChangeKinds::ATTRIB,
            ChangeKind::CloseNoWrite => ChangeKinds::CLOSE_NOWRITE,
            ChangeKind::CloseWrite => ChangeKinds::CLOSE_WRITE,
            ChangeKind::Create => ChangeKinds::CREATE,
            ChangeKind::Delete => ChangeKinds::DELETE,
            ChangeKind::DeleteSelf => ChangeKinds::DELETE_SELF,
            ChangeKind::Ignored => ChangeKinds::IGNORED,
            ChangeKind::IsDirectory => ChangeKinds::ISDIR,
            ChangeKind::Modify => ChangeKinds::MODIFY,
            ChangeKind::MoveSelf => ChangeKinds::MOVE_SELF,
            ChangeKind::MovedFrom => ChangeKinds::MOVED_FROM,
            ChangeKind::MovedTo => ChangeKinds::MOVED_TO,
            ChangeKind::Open => ChangeKinds::OPEN,
            ChangeKind::QueueOverflow => ChangeKinds::Q_OVERFLOW,
            ChangeKind::Unmount => ChangeKinds::UNMOUNT,
        }
    }

    /// Kernel symbolic name, as written in records.
    pub fn name(self) -> &'static str {
        match self {
            ChangeKind::Access => "IN_ACCESS",
            ChangeKind::AttributeChange => "IN_ATTRIB",
            ChangeKind::CloseNoWrite => "IN_CLOSE_NOWRITE",
            ChangeKind::CloseWrite => "IN_CLOSE_WRITE",
            ChangeKind::Create => "IN_CREATE",
            ChangeKind::Delete => "IN_DELETE",
            ChangeKind::DeleteSelf => "IN_DELETE_SELF",
            ChangeKind::Ignored => "IN_IGNORED",
            ChangeKind::IsDirectory => "IN_ISDIR",
            ChangeKind::Modify => "IN_MODIFY",
            ChangeKind::MoveSelf => "IN_MOVE_SELF",
            ChangeKind::MovedFrom => "IN_MOVED_FROM",
            ChangeKind::MovedTo => "IN_MOVED_TO",
            ChangeKind::Open => "IN_OPEN",
            ChangeKind::QueueOverflow => "IN_Q_OVERFLOW",
            ChangeKind::Unmount => "IN_UNMOUNT",
        }
    }

    /// Follow-up work this kind implies on its own.
    pub fn implications(self) -> Implications {
        match self {
            ChangeKind::AttributeChange | ChangeKind::Create | ChangeKind::Open => {
                Implications::METADATA_READ
            }
            ChangeKind::CloseWrite | ChangeKind::Modify => Implications::FINGERPRINT,
            ChangeKind::IsDirectory => Implications::DIRECTORY_CHECK,
            ChangeKind::Ignored => Implications::REMOVAL,
            _ => Implications::empty(),
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl ChangeKinds {
    /// Builds a set from a raw kernel mask, dropping bits this crate does not know.
    pub fn from_mask(mask: u32) -> Self {
        Self::from_bits_truncate(mask)
    }

    /// Every kind present, in listing order.
    pub fn kinds(self) -> impl Iterator<Item = ChangeKind> {
        ChangeKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(kind.bit()))
    }

    /// Whether `kind` is present.
    pub fn has(self, kind: ChangeKind) -> bool {
        self.contains(kind.bit())
    }

    /// Logical OR of the implications of every kind present.
    pub fn implications(self) -> Implications {
        self.kinds()
            .fold(Implications::empty(), |acc, kind| acc | kind.implications())
    }
}

impl FromIterator<ChangeKind> for ChangeKinds {
    fn from_iter<T: IntoIterator<Item = ChangeKind>>(iter: T) -> Self {
        iter.into_iter()
            .fold(ChangeKinds::empty(), |acc, kind| acc | kind.bit())
    }
}

impl fmt::Display for ChangeKinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for kind in self.kinds() {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(kind.name())?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn kinds_are_listed_in_enumeration_order() {
        let mask = ChangeKinds::ISDIR | ChangeKinds::CREATE | ChangeKinds::ACCESS;
        let kinds: Vec<_> = mask.kinds().collect();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::Access,
                ChangeKind::Create,
                ChangeKind::IsDirectory
            ]
        );
        assert_eq!(mask.to_string(), "IN_ACCESS|IN_CREATE|IN_ISDIR");
    }

    #[test]
    fn every_kind_maps_to_a_distinct_bit() {
        let all: ChangeKinds = ChangeKind::ALL.into_iter().collect();
        assert_eq!(all.bits().count_ones() as usize, ChangeKind::ALL.len());
        for kind in ChangeKind::ALL {
            assert_eq!(kind.bit().kinds().collect::<Vec<_>>(), vec![kind]);
        }
    }

    #[test]
    fn unknown_bits_are_dropped() {
        // IN_ONESHOT and IN_MASK_ADD are request options, never reported kinds
        let mask = ChangeKinds::from_mask(0x8000_0000 | 0x2000_0000 | 0x100);
        assert_eq!(mask, ChangeKinds::CREATE);
    }

    #[test]
    fn implications_follow_the_fixed_table() {
        let cases = [
            (ChangeKinds::ATTRIB, Implications::METADATA_READ),
            (ChangeKinds::CREATE, Implications::METADATA_READ),
            (ChangeKinds::OPEN, Implications::METADATA_READ),
            (ChangeKinds::CLOSE_WRITE, Implications::FINGERPRINT),
            (ChangeKinds::MODIFY, Implications::FINGERPRINT),
            (ChangeKinds::ISDIR, Implications::DIRECTORY_CHECK),
            (ChangeKinds::IGNORED, Implications::REMOVAL),
            (ChangeKinds::ACCESS, Implications::empty()),
            (ChangeKinds::DELETE, Implications::empty()),
            (ChangeKinds::Q_OVERFLOW, Implications::empty()),
        ];
        for (kinds, expected) in cases {
            assert_eq!(kinds.implications(), expected, "{kinds}");
        }
    }

    #[test]
    fn implications_are_or_ed_across_kinds() {
        let kinds = ChangeKinds::CREATE | ChangeKinds::ISDIR;
        assert_eq!(
            kinds.implications(),
            Implications::METADATA_READ | Implications::DIRECTORY_CHECK
        );
    }

    #[test]
    fn empty_set_displays_as_nothing() {
        assert_eq!(ChangeKinds::empty().to_string(), "");
    }
}
