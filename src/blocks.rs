// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Block introducers, extension labels and the fixed-layout structures
//! that sit between them in a GIF stream.

use arrayvec::ArrayVec;
use byteorder::ReadBytesExt;
use log::debug;
use std::io::Read;

use crate::{Result, ToUsize, le_u16};

pub(crate) const SIGNATURE_87A: &[u8; 6] = b"GIF87a";
pub(crate) const SIGNATURE_89A: &[u8; 6] = b"GIF89a";

/// Application identifier plus authentication code of the looping extension.
pub(crate) const NETSCAPE_LOOPING: &[u8; 11] = b"NETSCAPE2.0";

/// Sub-block id that carries the loop count inside the looping extension.
const LOOP_SUB_BLOCK_ID: u8 = 1;

/// Leading byte of every top-level block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockType {
    ImageDescriptor,
    Extension,
    Trailer,
    Filler,
    Unknown(u8),
}

impl From<u8> for BlockType {
    fn from(b: u8) -> Self {
        match b {
            0x2C => Self::ImageDescriptor,
            0x21 => Self::Extension,
            0x3B => Self::Trailer,
            0x00 => Self::Filler,
            other => Self::Unknown(other),
        }
    }
}

/// Second byte of an extension block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExtensionLabel {
    PlainText,
    GraphicControl,
    Comment,
    Application,
    Unknown(u8),
}

impl From<u8> for ExtensionLabel {
    fn from(b: u8) -> Self {
        match b {
            0x01 => Self::PlainText,
            0xF9 => Self::GraphicControl,
            0xFE => Self::Comment,
            0xFF => Self::Application,
            other => Self::Unknown(other),
        }
    }
}

/// Which of the two published revisions the signature named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GifVersion {
    V87a,
    V89a,
}

impl GifVersion {
    pub(crate) fn from_signature(signature: &[u8; 6]) -> Option<Self> {
        if signature == SIGNATURE_87A {
            Some(Self::V87a)
        } else if signature == SIGNATURE_89A {
            Some(Self::V89a)
        } else {
            None
        }
    }
}

/// How a frame's area is treated before the next frame is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisposalMethod {
    /// No disposal specified; renderers treat it like [`Keep`](Self::Keep).
    #[default]
    Unspecified,
    /// Leave the frame in place.
    Keep,
    /// Clear the frame's area.
    Background,
    /// Restore the area to what it was before the frame was drawn.
    Previous,
}

impl DisposalMethod {
    /// Decode the 3-bit field of a graphic control block.
    ///
    /// The values 4 to 7 are reserved and decode as `Unspecified`.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            1 => Self::Keep,
            2 => Self::Background,
            3 => Self::Previous,
            0 => Self::Unspecified,
            reserved => {
                debug!("reserved disposal method {reserved}, treating as unspecified");
                Self::Unspecified
            }
        }
    }
}

/// The logical screen descriptor that follows the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenDescriptor {
    pub version: GifVersion,
    /// Canvas width in pixels.
    pub width: u16,
    /// Canvas height in pixels.
    pub height: u16,
    pub has_global_color_table: bool,
    /// Bits per primary color available to the original image, minus one.
    pub color_resolution: u8,
    /// Whether the global table is sorted by decreasing importance.
    pub sorted: bool,
    /// The 3-bit size field; the table holds `2 << size` entries.
    pub global_color_table_size: u8,
    pub background_color_index: u8,
    /// Raw aspect ratio byte. Zero means no information.
    pub pixel_aspect_ratio: u8,
}

impl ScreenDescriptor {
    pub(crate) fn read<T: Read>(src: &mut T, version: GifVersion) -> Result<Self> {
        let width = le_u16(src)?;
        let height = le_u16(src)?;
        let packed = src.read_u8()?;
        let background_color_index = src.read_u8()?;
        let pixel_aspect_ratio = src.read_u8()?;

        Ok(Self {
            version,
            width,
            height,
            has_global_color_table: packed & 0x80 != 0,
            color_resolution: (packed >> 4) & 0b111,
            sorted: packed & 0x08 != 0,
            global_color_table_size: packed & 0b111,
            background_color_index,
            pixel_aspect_ratio,
        })
    }

    /// Number of pixels on the logical screen.
    pub fn area(&self) -> usize {
        self.width.to_usize() * self.height.to_usize()
    }
}

/// A global or local palette of RGB triples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorTable {
    entries: ArrayVec<[u8; 3], 256>,
}

impl ColorTable {
    /// Read `2 << size_field` triples. Only the low three bits of
    /// `size_field` are significant, so every table is between 2 and 256
    /// entries long.
    pub(crate) fn read<T: Read>(src: &mut T, size_field: u8) -> Result<Self> {
        let count = 2usize << (size_field & 0b111);
        let mut raw = [0u8; 256 * 3];
        let raw = &mut raw[..count * 3];
        src.read_exact(raw)?;

        let mut entries = ArrayVec::new();
        entries.extend(raw.chunks_exact(3).map(|rgb| [rgb[0], rgb[1], rgb[2]]));
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The RGB triple at `index`, if the table is that long.
    pub fn get(&self, index: u8) -> Option<[u8; 3]> {
        self.entries.get(index.to_usize()).copied()
    }

    pub fn entries(&self) -> &[[u8; 3]] {
        &self.entries
    }
}

/// Values of a graphic control extension, applied to the next image only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct GraphicControl {
    pub disposal: DisposalMethod,
    pub user_input: bool,
    pub transparent_index: Option<u8>,
    /// Hundredths of a second.
    pub delay: u16,
}

impl GraphicControl {
    pub(crate) const LEN: usize = 4;

    /// Decode the four data bytes of the control block.
    pub(crate) fn parse(data: &[u8; Self::LEN]) -> Self {
        let packed = data[0];
        let delay = u16::from_le_bytes([data[1], data[2]]);
        let transparent_index = (packed & 0x01 != 0).then_some(data[3]);
        Self {
            disposal: DisposalMethod::from_bits(packed >> 2),
            user_input: packed & 0x02 != 0,
            transparent_index,
            delay,
        }
    }
}

/// Placement and flags from an image descriptor block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ImageDescriptor {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    pub has_local_color_table: bool,
    pub interlaced: bool,
    pub local_color_table_size: u8,
}

impl ImageDescriptor {
    pub(crate) fn read<T: Read>(src: &mut T) -> Result<Self> {
        let left = le_u16(src)?;
        let top = le_u16(src)?;
        let width = le_u16(src)?;
        let height = le_u16(src)?;
        let packed = src.read_u8()?;
        Ok(Self {
            left,
            top,
            width,
            height,
            has_local_color_table: packed & 0x80 != 0,
            interlaced: packed & 0x40 != 0,
            local_color_table_size: packed & 0b111,
        })
    }

    pub(crate) fn area(&self) -> usize {
        self.width.to_usize() * self.height.to_usize()
    }
}

/// Loop count carried by a `NETSCAPE2.0` sub-block, if this is one.
pub(crate) fn parse_loop_sub_block(data: &[u8]) -> Option<u16> {
    match data {
        [LOOP_SUB_BLOCK_ID, lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}

#[test]
fn block_introducers() {
    assert_eq!(BlockType::from(0x2C), BlockType::ImageDescriptor);
    assert_eq!(BlockType::from(0x21), BlockType::Extension);
    assert_eq!(BlockType::from(0x3B), BlockType::Trailer);
    assert_eq!(BlockType::from(0x00), BlockType::Filler);
    assert_eq!(BlockType::from(0x42), BlockType::Unknown(0x42));
    assert_eq!(ExtensionLabel::from(0xF9), ExtensionLabel::GraphicControl);
    assert_eq!(ExtensionLabel::from(0x7F), ExtensionLabel::Unknown(0x7F));
}

#[test]
fn graphic_control_fields() {
    // disposal 2, user input, transparent index 7, delay 0x0132
    let control = GraphicControl::parse(&[0b0000_1011, 0x32, 0x01, 7]);
    assert_eq!(control.disposal, DisposalMethod::Background);
    assert!(control.user_input);
    assert_eq!(control.transparent_index, Some(7));
    assert_eq!(control.delay, 306);

    let control = GraphicControl::parse(&[0b0001_1100, 0, 0, 7]);
    assert_eq!(control.disposal, DisposalMethod::Unspecified);
    assert!(!control.user_input);
    assert_eq!(control.transparent_index, None);
}

#[test]
fn screen_descriptor_packed_byte() {
    let bytes = [0x0A, 0x00, 0x05, 0x01, 0b1011_0010, 3, 49];
    let screen = ScreenDescriptor::read(&mut &bytes[..], GifVersion::V89a).unwrap();
    assert_eq!(screen.width, 10);
    assert_eq!(screen.height, 261);
    assert!(screen.has_global_color_table);
    assert_eq!(screen.color_resolution, 3);
    assert!(!screen.sorted);
    assert_eq!(screen.global_color_table_size, 2);
    assert_eq!(screen.background_color_index, 3);
    assert_eq!(screen.pixel_aspect_ratio, 49);
}

#[test]
fn color_table_sizes() {
    let bytes: std::vec::Vec<u8> = (0..=255u8).cycle().take(768).collect();
    let table = ColorTable::read(&mut &bytes[..], 0).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(1), Some([3, 4, 5]));
    assert_eq!(table.get(2), None);

    let table = ColorTable::read(&mut &bytes[..], 7).unwrap();
    assert_eq!(table.len(), 256);

    let short = [0u8; 5];
    assert!(matches!(
        ColorTable::read(&mut &short[..], 0),
        Err(crate::Error::UnexpectedEndOfStream)
    ));
}

#[test]
fn loop_sub_block() {
    assert_eq!(parse_loop_sub_block(&[1, 0x10, 0x00]), Some(16));
    assert_eq!(parse_loop_sub_block(&[1, 0, 0]), Some(0));
    assert_eq!(parse_loop_sub_block(&[2, 0x10, 0x00]), None);
    assert_eq!(parse_loop_sub_block(&[1, 0x10]), None);
}
