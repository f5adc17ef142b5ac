// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Builds GIF byte streams for tests.

#![allow(dead_code)]

use weezl::{BitOrder, encode::Encoder as LzwEncoder};

pub const RED: [u8; 3] = [255, 0, 0];
pub const GREEN: [u8; 3] = [0, 255, 0];
pub const BLUE: [u8; 3] = [0, 0, 255];
pub const WHITE: [u8; 3] = [255, 255, 255];
pub const PALETTE: [[u8; 3]; 4] = [RED, GREEN, BLUE, WHITE];

pub fn init_logger() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::max())
        .try_init();
}

/// BGRA bytes of an opaque colour.
pub fn bgra([r, g, b]: [u8; 3]) -> [u8; 4] {
    [b, g, r, 255]
}

/// The 3-bit size field of a table with `len` entries (a power of two).
pub fn size_field(len: usize) -> u8 {
    assert!(len.is_power_of_two() && (2..=256).contains(&len), "bad table length {len}");
    (len.trailing_zeros() - 1) as u8
}

/// LZW minimum code size for a table with `len` entries.
pub fn min_code_size(len: usize) -> u8 {
    (len.trailing_zeros() as u8).max(2)
}

pub fn lzw(min_code_size: u8, indices: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut encoder = LzwEncoder::new(BitOrder::Lsb, min_code_size);
    encoder.into_vec(&mut out).encode_all(indices).status.unwrap();
    out
}

/// Wrap `data` in sub-blocks plus a terminator.
pub fn sub_blocks(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in data.chunks(255) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    out.push(0);
    out
}

/// Reorder top-to-bottom rows into interlace pass order.
pub fn interlace(indices: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(indices.len());
    for (start, step) in [(0, 8), (4, 8), (2, 4), (1, 2)] {
        for row in (start..height).step_by(step) {
            out.extend_from_slice(&indices[row * width..(row + 1) * width]);
        }
    }
    out
}

#[derive(Clone, Copy)]
pub struct Image<'a> {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    /// Top-to-bottom row order, even when interlaced.
    pub indices: &'a [u8],
    pub local_table: Option<&'a [[u8; 3]]>,
    pub interlaced: bool,
    /// Keep only this many bytes of the compressed data.
    pub keep_lzw_bytes: Option<usize>,
}

impl<'a> Image<'a> {
    pub fn new(width: u16, height: u16, indices: &'a [u8]) -> Self {
        Self {
            left: 0,
            top: 0,
            width,
            height,
            indices,
            local_table: None,
            interlaced: false,
            keep_lzw_bytes: None,
        }
    }

    pub fn at(mut self, left: u16, top: u16) -> Self {
        self.left = left;
        self.top = top;
        self
    }

    pub fn local_table(mut self, table: &'a [[u8; 3]]) -> Self {
        self.local_table = Some(table);
        self
    }

    pub fn interlaced(mut self) -> Self {
        self.interlaced = true;
        self
    }

    pub fn keep_lzw_bytes(mut self, bytes: usize) -> Self {
        self.keep_lzw_bytes = Some(bytes);
        self
    }
}

pub struct GifBuilder {
    bytes: Vec<u8>,
    global_len: Option<usize>,
}

impl GifBuilder {
    pub fn new(width: u16, height: u16, global: Option<&[[u8; 3]]>) -> Self {
        let mut bytes = b"GIF89a".to_vec();
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        match global {
            Some(table) => {
                bytes.push(0x80 | 0x70 | size_field(table.len()));
                bytes.extend_from_slice(&[0, 0]);
                for rgb in table {
                    bytes.extend_from_slice(rgb);
                }
            }
            None => bytes.extend_from_slice(&[0x70, 0, 0]),
        }
        Self { bytes, global_len: global.map(<[_]>::len) }
    }

    /// A `NETSCAPE2.0` looping extension.
    pub fn looping(mut self, count: u16) -> Self {
        self.bytes.extend_from_slice(b"\x21\xFF\x0BNETSCAPE2.0\x03\x01");
        self.bytes.extend_from_slice(&count.to_le_bytes());
        self.bytes.push(0);
        self
    }

    pub fn comment(mut self, text: &[u8]) -> Self {
        self.bytes.extend_from_slice(&[0x21, 0xFE]);
        self.bytes.extend_from_slice(&sub_blocks(text));
        self
    }

    /// A graphic control extension. `disposal` is the raw 3-bit value.
    pub fn control(mut self, delay: u16, transparent: Option<u8>, disposal: u8) -> Self {
        let packed = (disposal << 2) | u8::from(transparent.is_some());
        self.bytes.extend_from_slice(&[0x21, 0xF9, 4, packed]);
        self.bytes.extend_from_slice(&delay.to_le_bytes());
        self.bytes.extend_from_slice(&[transparent.unwrap_or(0), 0]);
        self
    }

    pub fn image(mut self, image: Image<'_>) -> Self {
        self.bytes.push(0x2C);
        for v in [image.left, image.top, image.width, image.height] {
            self.bytes.extend_from_slice(&v.to_le_bytes());
        }
        let mut packed = 0;
        if let Some(table) = image.local_table {
            packed |= 0x80 | size_field(table.len());
        }
        if image.interlaced {
            packed |= 0x40;
        }
        self.bytes.push(packed);
        if let Some(table) = image.local_table {
            for rgb in table {
                self.bytes.extend_from_slice(rgb);
            }
        }

        let table_len = image.local_table.map(<[_]>::len).or(self.global_len).unwrap_or(4);
        let code_size = min_code_size(table_len);
        let rows = if image.interlaced {
            interlace(image.indices, image.width.into(), image.height.into())
        } else {
            image.indices.to_vec()
        };
        let mut data = lzw(code_size, &rows);
        if let Some(keep) = image.keep_lzw_bytes {
            data.truncate(keep);
        }
        self.bytes.push(code_size);
        self.bytes.extend_from_slice(&sub_blocks(&data));
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn trailer(self) -> Self {
        self.raw(&[0x3B])
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

/// The two-frame animation used by several tests: 2x2 frames over the
/// four-colour palette with delays 0 and 50.
pub fn two_frame_gif() -> Vec<u8> {
    GifBuilder::new(2, 2, Some(&PALETTE))
        .looping(0)
        .control(0, None, 1)
        .image(Image::new(2, 2, &[0, 1, 2, 3]))
        .control(50, None, 1)
        .image(Image::new(2, 2, &[3, 2, 1, 0]))
        .trailer()
        .build()
}

/// Deterministic pseudo-random palette indices below `colors`.
pub fn noise(len: usize, colors: u8, seed: u32) -> Vec<u8> {
    let mut state = seed | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state % u32::from(colors)) as u8
        })
        .collect()
}
