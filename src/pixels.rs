// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use log::debug;

use crate::blocks::{ColorTable, DisposalMethod};
use crate::{Error, PixelFormat, Region, Result, ToUsize};

/// Row start and row step of the four interlace passes.
const INTERLACE_PASSES: [(usize, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];

const BYTES_PER_PIXEL: usize = 4;

/// Allocate a zeroed buffer without aborting on allocation failure.
pub(crate) fn zeroed(len: usize) -> Result<std::vec::Vec<u8>> {
    let mut buf = std::vec::Vec::new();
    buf.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Reorder rows stored in interlace pass order into top-to-bottom order.
pub(crate) fn deinterlace(indices: &[u8], width: usize, height: usize) -> Result<std::vec::Vec<u8>> {
    let mut out = zeroed(indices.len())?;
    if width == 0 || height == 0 {
        return Ok(out);
    }
    let rows = INTERLACE_PASSES
        .iter()
        .flat_map(|&(start, step)| (start..height).step_by(step));
    for (row, src) in rows.zip(indices.chunks_exact(width)) {
        out[row * width..(row + 1) * width].copy_from_slice(src);
    }
    Ok(out)
}

/// Map palette indices to 4-byte pixels.
///
/// The transparent index and indices past the end of the table become
/// all-zero pixels; every other pixel is opaque.
pub(crate) fn expand(
    indices: &[u8],
    table: &ColorTable,
    transparent_index: Option<u8>,
    format: PixelFormat,
    out: &mut [u8],
) {
    for (px, &index) in out.chunks_exact_mut(BYTES_PER_PIXEL).zip(indices) {
        if Some(index) == transparent_index {
            px.fill(0);
            continue;
        }
        match table.get(index) {
            Some(rgb) => px.copy_from_slice(&format.pixel(rgb, 0xFF)),
            None => px.fill(0),
        }
    }
}

/// A logical-screen-sized surface that frames are drawn onto in order.
pub(crate) struct Canvas {
    width: usize,
    height: usize,
    pixels: std::vec::Vec<u8>,
    saved: Option<std::vec::Vec<u8>>,
    pending: Option<(DisposalMethod, Region)>,
}

impl Canvas {
    pub(crate) fn new(width: u16, height: u16) -> Result<Self> {
        let (width, height) = (width.to_usize(), height.to_usize());
        Ok(Self {
            width,
            height,
            pixels: zeroed(width * height * BYTES_PER_PIXEL)?,
            saved: None,
            pending: None,
        })
    }

    /// Bytes a canvas of this size may hold at peak: the surface plus one
    /// saved copy for `Previous` disposal.
    pub(crate) fn peak_bytes(width: u16, height: u16) -> u64 {
        2 * u64::from(width) * u64::from(height) * BYTES_PER_PIXEL as u64
    }

    /// Apply the previous frame's disposal, draw `frame` at `region`, and
    /// return a copy of the resulting canvas.
    pub(crate) fn compose(
        &mut self,
        region: Region,
        frame: &[u8],
        disposal: DisposalMethod,
    ) -> Result<std::vec::Vec<u8>> {
        if let Some((disposal, region)) = self.pending.take() {
            match disposal {
                DisposalMethod::Background => self.clear(region),
                DisposalMethod::Previous => {
                    if let Some(saved) = self.saved.take() {
                        self.pixels = saved;
                    }
                }
                DisposalMethod::Keep | DisposalMethod::Unspecified => {}
            }
        }

        if disposal == DisposalMethod::Previous {
            let mut saved = zeroed(self.pixels.len())?;
            saved.copy_from_slice(&self.pixels);
            self.saved = Some(saved);
        }

        self.draw(region, frame);
        self.pending = Some((disposal, region));

        let mut out = zeroed(self.pixels.len())?;
        out.copy_from_slice(&self.pixels);
        Ok(out)
    }

    /// Row spans of `region` clipped to the canvas, as
    /// (row, first canvas column, first region column, span width).
    fn spans(&self, region: Region) -> impl Iterator<Item = (usize, usize, usize, usize)> + use<> {
        let (left, top) = (region.left.to_usize(), region.top.to_usize());
        let (width, height) = (region.width.to_usize(), region.height.to_usize());
        let span = width.min(self.width.saturating_sub(left));
        // Regions entirely off the canvas touch no rows.
        let rows = if span == 0 { 0 } else { height.min(self.height.saturating_sub(top)) };
        (0..rows).map(move |y| (y, left, top + y, span))
    }

    fn clear(&mut self, region: Region) {
        let canvas_width = self.width;
        for (_, left, row, span) in self.spans(region) {
            let start = (row * canvas_width + left) * BYTES_PER_PIXEL;
            self.pixels[start..start + span * BYTES_PER_PIXEL].fill(0);
        }
    }

    fn draw(&mut self, region: Region, frame: &[u8]) {
        let canvas_width = self.width;
        let frame_width = region.width.to_usize();
        let mut drawn = 0usize;
        for (y, left, row, span) in self.spans(region) {
            let src = &frame[y * frame_width * BYTES_PER_PIXEL..][..span * BYTES_PER_PIXEL];
            let dst_start = (row * canvas_width + left) * BYTES_PER_PIXEL;
            let dst = &mut self.pixels[dst_start..dst_start + span * BYTES_PER_PIXEL];
            for (d, s) in dst.chunks_exact_mut(BYTES_PER_PIXEL).zip(src.chunks_exact(BYTES_PER_PIXEL)) {
                if s[3] != 0 {
                    d.copy_from_slice(s);
                    drawn += 1;
                }
            }
        }
        debug!("composited {drawn} opaque pixels at {},{}", region.left, region.top);
    }
}
