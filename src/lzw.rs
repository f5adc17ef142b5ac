// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Variable-width LZW decompression as used by GIF image data.
//!
//! Codes are packed least-significant-bit first. The code width starts at
//! `min_code_size + 1` and grows by one bit each time the next free table
//! slot reaches `1 << width`, up to 12 bits. Once all 4096 slots are used
//! the table is frozen until the encoder sends a clear code.

pub(crate) const MAX_CODE_SIZE: u8 = 12;
const TABLE_SIZE: usize = 1 << MAX_CODE_SIZE;

/// Smallest and largest minimum code size the decoder accepts.
pub(crate) const MIN_CODE_SIZE_RANGE: std::ops::RangeInclusive<u8> = 1..=11;

/// Pulls LSB-first codes of arbitrary width out of a byte slice.
struct LsbReader<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u32,
    bits: u8,
}

impl<'a> LsbReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, acc: 0, bits: 0 }
    }

    /// `None` once fewer than `width` bits remain.
    fn read(&mut self, width: u8) -> Option<u16> {
        while self.bits < width {
            let byte = *self.data.get(self.pos)?;
            self.pos += 1;
            self.acc |= u32::from(byte) << self.bits;
            self.bits += 8;
        }
        let code = self.acc & ((1 << width) - 1);
        self.acc >>= width;
        self.bits -= width;
        Some(code as u16)
    }
}

/// Why [`LzwDecoder::decode`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LzwStatus {
    /// The end-of-information code was read.
    EndOfInformation,
    /// The output buffer filled up before the end code.
    BufferFull,
    /// The compressed data ran out without an end code.
    OutOfData,
    /// A code that is neither in the table nor the next free slot.
    InvalidCode(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LzwOutcome {
    /// Number of indices written to the front of the output buffer.
    pub written: usize,
    pub status: LzwStatus,
}

/// String table of one decompression run.
///
/// Every entry is a (prefix code, last byte) pair; its length and first
/// byte are cached so strings can be written back to front directly into
/// the output without a scratch stack.
pub(crate) struct LzwDecoder {
    min_code_size: u8,
    prefix: [u16; TABLE_SIZE],
    suffix: [u8; TABLE_SIZE],
    first: [u8; TABLE_SIZE],
    length: [u16; TABLE_SIZE],
}

impl LzwDecoder {
    /// `min_code_size` must be within [`MIN_CODE_SIZE_RANGE`].
    pub(crate) fn new(min_code_size: u8) -> Self {
        debug_assert!(MIN_CODE_SIZE_RANGE.contains(&min_code_size));
        let mut decoder = Self {
            min_code_size,
            prefix: [0; TABLE_SIZE],
            suffix: [0; TABLE_SIZE],
            first: [0; TABLE_SIZE],
            length: [0; TABLE_SIZE],
        };
        for code in 0..decoder.clear_code() {
            let i = usize::from(code);
            decoder.suffix[i] = code as u8;
            decoder.first[i] = code as u8;
            decoder.length[i] = 1;
        }
        decoder
    }

    fn clear_code(&self) -> u16 {
        1 << self.min_code_size
    }

    /// Decompress `data` into `out`, stopping at the end code, a full
    /// buffer, or the first problem in the code stream. Indices written
    /// before a problem are kept.
    pub(crate) fn decode(&mut self, data: &[u8], out: &mut [u8]) -> LzwOutcome {
        let clear = self.clear_code();
        let end = clear + 1;
        let mut bits = LsbReader::new(data);
        let mut width = self.min_code_size + 1;
        let mut next = end + 1;
        let mut prev: Option<u16> = None;
        let mut written = 0;

        let status = loop {
            if written == out.len() {
                // A filled buffer followed directly by the end code is a clean finish.
                break match bits.read(width) {
                    Some(code) if code == end => LzwStatus::EndOfInformation,
                    _ => LzwStatus::BufferFull,
                };
            }
            let Some(code) = bits.read(width) else {
                break LzwStatus::OutOfData;
            };

            if code == clear {
                width = self.min_code_size + 1;
                next = end + 1;
                prev = None;
                continue;
            }
            if code == end {
                break LzwStatus::EndOfInformation;
            }

            match prev {
                None => {
                    if code > clear {
                        break LzwStatus::InvalidCode(code);
                    }
                }
                Some(prev) => {
                    let usable = usize::from(next) < TABLE_SIZE;
                    if code < next {
                        if usable {
                            self.add(next, prev, self.first[usize::from(code)]);
                            next += 1;
                        }
                    } else if code == next && usable {
                        // KwKwK: the code being defined is the one just read.
                        self.add(next, prev, self.first[usize::from(prev)]);
                        next += 1;
                    } else {
                        break LzwStatus::InvalidCode(code);
                    }
                    if next == 1 << width && width < MAX_CODE_SIZE {
                        width += 1;
                    }
                }
            }

            written += self.emit(code, &mut out[written..]);
            prev = Some(code);
        };

        LzwOutcome { written, status }
    }

    fn add(&mut self, slot: u16, prefix: u16, last: u8) {
        let (slot, prefix) = (usize::from(slot), usize::from(prefix));
        self.prefix[slot] = prefix as u16;
        self.suffix[slot] = last;
        self.first[slot] = self.first[prefix];
        self.length[slot] = self.length[prefix] + 1;
    }

    /// Write the string for `code` to the front of `out`, clipped to its
    /// length. Returns the number of bytes written.
    fn emit(&self, code: u16, out: &mut [u8]) -> usize {
        let mut code = usize::from(code);
        let len = usize::from(self.length[code]);
        for at in (0..len).rev() {
            if let Some(slot) = out.get_mut(at) {
                *slot = self.suffix[code];
            }
            code = usize::from(self.prefix[code]);
        }
        len.min(out.len())
    }
}
