use serde::{Deserialize, Serialize};

// MARK: - Resolution

/// Pixel dimensions of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const FHD: Self = Self { width: 1920, height: 1080 };
    pub const PROBE: Self = Self { width: 1, height: 1 };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Halve both dimensions, never going below one pixel.
    pub fn halved(&self) -> Self {
        Self {
            width: (self.width / 2).max(1),
            height: (self.height / 2).max(1),
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}×{}", self.width, self.height)
    }
}

// MARK: - ScreenRect

/// Rectangle in virtual-desktop pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScreenRect {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl ScreenRect {
    pub fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self { left, top, width, height }
    }

    /// Rectangle anchored at the desktop origin.
    pub fn desktop(resolution: Resolution) -> Self {
        Self::new(0, 0, resolution.width as i32, resolution.height as i32)
    }

    /// Square of `radius` pixels around `center`.
    pub fn around(center: PixelPoint, radius: i32) -> Self {
        Self::new(center.x - radius, center.y - radius, radius * 2, radius * 2)
    }

    pub fn right(&self) -> i32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

// MARK: - PixelPoint

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

// MARK: - FrameHeader

/// Metadata block the capture helper publishes in shared memory.
///
/// Layout (little-endian, 24 bytes):
///
/// | offset | type | field |
/// |--------|------|-------|
/// | 0  | u32 | width |
/// | 4  | u32 | height |
/// | 8  | u64 | cross-process texture handle |
/// | 16 | u64 | source window handle |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    pub width: u32,
    pub height: u32,
    pub texture_handle: u64,
    pub source_window: u64,
}

impl FrameHeader {
    pub const SIZE: usize = 24;

    /// Decode the fixed layout. Returns `None` if `bytes` is shorter than [`Self::SIZE`].
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..Self::SIZE)?;
        let u32_at = |at: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&bytes[at..at + 4]);
            u32::from_le_bytes(b)
        };
        let u64_at = |at: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[at..at + 8]);
            u64::from_le_bytes(b)
        };
        Some(Self {
            width: u32_at(0),
            height: u32_at(4),
            texture_handle: u64_at(8),
            source_window: u64_at(16),
        })
    }

    pub fn to_le_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.width.to_le_bytes());
        out[4..8].copy_from_slice(&self.height.to_le_bytes());
        out[8..16].copy_from_slice(&self.texture_handle.to_le_bytes());
        out[16..24].copy_from_slice(&self.source_window.to_le_bytes());
        out
    }

    /// `false` while the producer has not published any dimensions yet.
    pub fn has_frame(&self) -> bool {
        self.width != 0 && self.height != 0
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

// MARK: - HandId

/// One of the two tracked manipulators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandId {
    Primary,
    Secondary,
}

impl HandId {
    pub const ALL: [HandId; 2] = [HandId::Primary, HandId::Secondary];

    /// Touch contact id injected for this hand.
    pub fn contact_id(self) -> u32 {
        match self {
            Self::Primary => 0,
            Self::Secondary => 1,
        }
    }

    pub fn index(self) -> usize {
        self.contact_id() as usize
    }
}

// MARK: - HandInteractionState

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandInteractionState {
    #[default]
    OutOfRange,
    Hovering,
    Drawing,
}

impl HandInteractionState {
    /// Only hovering and drawing hands produce touch input.
    pub fn emits_input(self) -> bool {
        !matches!(self, Self::OutOfRange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_reads_fixed_offsets() {
        let mut raw = [0u8; 24];
        raw[0..4].copy_from_slice(&640u32.to_le_bytes());
        raw[4..8].copy_from_slice(&480u32.to_le_bytes());
        raw[8..16].copy_from_slice(&0xDEAD_BEEF_u64.to_le_bytes());
        raw[16..24].copy_from_slice(&0x0001_0042_u64.to_le_bytes());

        let header = FrameHeader::from_le_bytes(&raw).unwrap();
        assert_eq!(header.width, 640);
        assert_eq!(header.height, 480);
        assert_eq!(header.texture_handle, 0xDEAD_BEEF);
        assert_eq!(header.source_window, 0x0001_0042);
        assert!(header.has_frame());
    }

    #[test]
    fn header_rejects_short_buffers() {
        assert!(FrameHeader::from_le_bytes(&[0u8; 23]).is_none());
    }

    #[test]
    fn zero_dimension_means_no_frame() {
        let header = FrameHeader { width: 1280, height: 0, texture_handle: 7, source_window: 0 };
        assert!(!header.has_frame());
    }

    #[test]
    fn halving_stops_at_one_pixel() {
        let r = Resolution::new(3, 1).halved();
        assert_eq!(r, Resolution::new(1, 1));
        assert_eq!(Resolution::new(640, 480).halved(), Resolution::new(320, 240));
    }

    #[test]
    fn hand_contact_ids_are_fixed() {
        assert_eq!(HandId::Primary.contact_id(), 0);
        assert_eq!(HandId::Secondary.contact_id(), 1);
    }
}
