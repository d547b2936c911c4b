//! Synthetic touch contact records.
//!
//! A [`TouchContact`] is one entry of the batch handed to the OS touch
//! injection call. Flag values mirror the Win32 `POINTER_FLAG_*` bits so the
//! Windows injector can pass them through unchanged.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::types::{PixelPoint, ScreenRect};

// MARK: - ContactFlags

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactFlags(u32);

impl ContactFlags {
    pub const NONE: Self = Self(0x0000_0000);
    pub const IN_RANGE: Self = Self(0x0000_0002);
    pub const IN_CONTACT: Self = Self(0x0000_0004);
    pub const DOWN: Self = Self(0x0001_0000);
    pub const UPDATE: Self = Self(0x0002_0000);
    pub const UP: Self = Self(0x0004_0000);

    /// Hand inside the hover volume, not touching.
    pub const HOVER: Self = Self(Self::IN_RANGE.0 | Self::UPDATE.0);
    /// First tick of physical contact.
    pub const PRESS: Self = Self(Self::IN_RANGE.0 | Self::IN_CONTACT.0 | Self::DOWN.0);
    /// Continued physical contact.
    pub const DRAG: Self = Self(Self::IN_RANGE.0 | Self::IN_CONTACT.0 | Self::UPDATE.0);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for ContactFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ContactFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for ContactFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(ContactFlags, &str); 5] = [
            (ContactFlags::IN_RANGE, "IN_RANGE"),
            (ContactFlags::IN_CONTACT, "IN_CONTACT"),
            (ContactFlags::DOWN, "DOWN"),
            (ContactFlags::UPDATE, "UPDATE"),
            (ContactFlags::UP, "UP"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

// MARK: - TouchContact

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchContact {
    pub id: u32,
    pub location: PixelPoint,
    pub flags: ContactFlags,
    /// Normalised pressure, 0..=1024.
    pub pressure: u32,
    pub contact_area: ScreenRect,
}

impl TouchContact {
    pub fn new(id: u32, location: PixelPoint, flags: ContactFlags, pressure: u32, radius: i32) -> Self {
        Self {
            id,
            location,
            flags,
            pressure,
            contact_area: ScreenRect::around(location, radius),
        }
    }

    pub fn is_down(&self) -> bool {
        self.flags.contains(ContactFlags::DOWN)
    }

    pub fn is_up(&self) -> bool {
        self.flags.contains(ContactFlags::UP)
    }

    pub fn in_contact(&self) -> bool {
        self.flags.contains(ContactFlags::IN_CONTACT)
    }
}
