// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! NeuQuant colour quantization.
//!
//! A 256-entry self-organizing map is trained on a sample of RGB pixels by
//! competitive learning, then frozen into a palette sorted by green with
//! an index for fast nearest-colour search. All arithmetic is fixed-point
//! `i32`, so a given input and sample factor always produce the same
//! palette.
//!
//! ```
//! use lazygif::NeuQuant;
//!
//! let pixels = [250, 10, 10, 10, 10, 250].repeat(600);
//! let quant = NeuQuant::new(1, &pixels)?;
//! let red = quant.lookup(quant.index_of([255, 0, 0]));
//! assert!(red[0] > 200 && red[2] < 50);
//!
//! let palette: [u8; 768] = quant.color_map();
//! # let _ = palette;
//! # Ok::<(), lazygif::Error>(())
//! ```

use crate::{Error, Result, TryVec};

/// Number of palette entries.
pub const NET_SIZE: usize = 256;

/// Size of [`NeuQuant::color_map`]: one RGB triple per entry.
pub const PALETTE_BYTES: usize = 3 * NET_SIZE;

// Step lengths through the sample buffer are three times the first of
// these primes that does not divide the buffer length.
const PRIME_1: usize = 499;
const PRIME_2: usize = 491;
const PRIME_3: usize = 487;
const PRIME_4: usize = 503;

/// Buffers shorter than this are sampled pixel by pixel.
const MIN_PICTURE_BYTES: usize = 3 * PRIME_4;

const MAX_NET_POS: usize = NET_SIZE - 1;

/// Colour channels are held as `value << NET_BIAS_SHIFT` while training.
const NET_BIAS_SHIFT: u32 = 4;

/// Learning-rate and radius decay steps per training run.
const N_CYCLES: usize = 100;

/// Frequency and bias counters are fractions with this many bits.
const INT_BIAS_SHIFT: u32 = 16;
const INT_BIAS: i32 = 1 << INT_BIAS_SHIFT;
/// Bias gain, `gamma = 1024`.
const GAMMA_SHIFT: u32 = 10;
/// Frequency decay, `beta = 1/1024` in `INT_BIAS` units.
const BETA_SHIFT: u32 = 10;
const BETA: i32 = INT_BIAS >> BETA_SHIFT;
const BETA_GAMMA: i32 = INT_BIAS << (GAMMA_SHIFT - BETA_SHIFT);

/// Initial neighbourhood radius in entries.
const INIT_RAD: usize = NET_SIZE >> 3;
/// The radius is held as `radius << RADIUS_BIAS_SHIFT`.
const RADIUS_BIAS_SHIFT: u32 = 6;
const RADIUS_BIAS: i32 = 1 << RADIUS_BIAS_SHIFT;
const INIT_RADIUS: i32 = INIT_RAD as i32 * RADIUS_BIAS;
/// The radius shrinks by `1/RADIUS_DEC` every cycle.
const RADIUS_DEC: i32 = 30;

/// The learning rate is held as `alpha << ALPHA_BIAS_SHIFT`.
const ALPHA_BIAS_SHIFT: u32 = 10;
const INIT_ALPHA: i32 = 1 << ALPHA_BIAS_SHIFT;

/// Neighbour weights carry `RAD_BIAS_SHIFT` extra bits on top of alpha.
const RAD_BIAS_SHIFT: u32 = 8;
const RAD_BIAS: i32 = 1 << RAD_BIAS_SHIFT;
const ALPHA_RAD_BIAS_SHIFT: u32 = ALPHA_BIAS_SHIFT + RAD_BIAS_SHIFT;
const ALPHA_RAD_BIAS: i32 = 1 << ALPHA_RAD_BIAS_SHIFT;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Neuron {
    r: i32,
    g: i32,
    b: i32,
    /// Position of the entry before sorting, which is its palette index.
    index: usize,
}

impl Neuron {
    fn distance(&self, r: i32, g: i32, b: i32) -> i32 {
        (self.r - r).abs() + (self.g - g).abs() + (self.b - b).abs()
    }

    /// Move the entry `weight / scale` of the way towards the sample.
    fn pull(&mut self, weight: i32, scale: i32, r: i32, g: i32, b: i32) {
        self.r -= weight * (self.r - r) / scale;
        self.g -= weight * (self.g - g) / scale;
        self.b -= weight * (self.b - b) / scale;
    }
}

/// Training state. Only the network survives into [`NeuQuant`].
struct Trainer<'a> {
    pixels: &'a [u8],
    sample_factor: u32,
    network: [Neuron; NET_SIZE],
    bias: [i32; NET_SIZE],
    freq: [i32; NET_SIZE],
    rad_power: [i32; INIT_RAD],
}

impl<'a> Trainer<'a> {
    fn new(pixels: &'a [u8], sample_factor: u32) -> Self {
        let mut network = [Neuron::default(); NET_SIZE];
        for (i, n) in network.iter_mut().enumerate() {
            let v = ((i << (NET_BIAS_SHIFT + 8)) / NET_SIZE) as i32;
            *n = Neuron { r: v, g: v, b: v, index: i };
        }
        Self {
            pixels,
            sample_factor,
            network,
            bias: [0; NET_SIZE],
            freq: [INT_BIAS / NET_SIZE as i32; NET_SIZE],
            rad_power: [0; INIT_RAD],
        }
    }

    fn update_rad_power(&mut self, alpha: i32, rad: i32) {
        for (i, p) in self.rad_power.iter_mut().take(rad as usize).enumerate() {
            let i = i as i32;
            *p = alpha * (rad * rad - i * i) * RAD_BIAS / (rad * rad);
        }
    }

    fn learn(&mut self) {
        let len = self.pixels.len();
        let sample_factor = if len < MIN_PICTURE_BYTES { 1 } else { self.sample_factor };
        let alpha_dec = (30 + (i64::from(sample_factor) - 1) / 3) as i32;
        let sample_pixels = len / 3usize.saturating_mul(sample_factor as usize);
        let delta = (sample_pixels / N_CYCLES).max(1);

        let mut alpha = INIT_ALPHA;
        let mut radius = INIT_RADIUS;
        let mut rad = radius >> RADIUS_BIAS_SHIFT;
        if rad <= 1 {
            rad = 0;
        }
        self.update_rad_power(alpha, rad);

        let step = if len < MIN_PICTURE_BYTES {
            3
        } else {
            let prime = [PRIME_1, PRIME_2, PRIME_3]
                .into_iter()
                .find(|p| len % p != 0)
                .unwrap_or(PRIME_4);
            3 * prime
        };

        let mut pix = 0;
        for i in 0..sample_pixels {
            let r = i32::from(self.pixels[pix]) << NET_BIAS_SHIFT;
            let g = i32::from(self.pixels[pix + 1]) << NET_BIAS_SHIFT;
            let b = i32::from(self.pixels[pix + 2]) << NET_BIAS_SHIFT;

            let winner = self.contest(r, g, b);
            self.network[winner].pull(alpha, INIT_ALPHA, r, g, b);
            if rad != 0 {
                self.alter_neighbours(rad, winner, r, g, b);
            }

            pix += step;
            if pix >= len {
                pix -= len;
            }

            if i % delta == 0 {
                alpha -= alpha / alpha_dec;
                radius -= radius / RADIUS_DEC;
                rad = radius >> RADIUS_BIAS_SHIFT;
                if rad <= 1 {
                    rad = 0;
                }
                self.update_rad_power(alpha, rad);
            }
        }
    }

    /// Find the winning entry for a sample.
    ///
    /// The winner minimises distance minus bias; the bias of the entry
    /// that is merely closest is lowered so frequently chosen entries
    /// give way to rarely chosen ones.
    fn contest(&mut self, r: i32, g: i32, b: i32) -> usize {
        let mut best_d = i32::MAX;
        let mut best_bias_d = i32::MAX;
        let mut best_pos = 0;
        let mut best_bias_pos = 0;

        for (i, n) in self.network.iter().enumerate() {
            let dist = n.distance(r, g, b);
            if dist < best_d {
                best_d = dist;
                best_pos = i;
            }
            let bias_dist = dist - (self.bias[i] >> (INT_BIAS_SHIFT - NET_BIAS_SHIFT));
            if bias_dist < best_bias_d {
                best_bias_d = bias_dist;
                best_bias_pos = i;
            }
            let beta_freq = self.freq[i] >> BETA_SHIFT;
            self.freq[i] = self.freq[i].wrapping_sub(beta_freq);
            self.bias[i] = self.bias[i].wrapping_add(beta_freq << GAMMA_SHIFT);
        }

        self.freq[best_pos] = self.freq[best_pos].wrapping_add(BETA);
        self.bias[best_pos] = self.bias[best_pos].wrapping_sub(BETA_GAMMA);
        best_bias_pos
    }

    /// Pull the entries within `rad` of `center` towards the sample,
    /// weighted by `rad_power` so nearer entries move further.
    fn alter_neighbours(&mut self, rad: i32, center: usize, r: i32, g: i32, b: i32) {
        let center = center as i32;
        let lo = (center - rad).max(-1);
        let hi = (center + rad).min(NET_SIZE as i32);
        let mut up = center + 1;
        let mut down = center - 1;
        let mut m = 1;

        while up < hi || down > lo {
            let weight = self.rad_power[m];
            m += 1;
            if up < hi {
                self.network[up as usize].pull(weight, ALPHA_RAD_BIAS, r, g, b);
                up += 1;
            }
            if down > lo {
                self.network[down as usize].pull(weight, ALPHA_RAD_BIAS, r, g, b);
                down -= 1;
            }
        }
    }

    /// Drop the fixed-point shift and record each entry's palette index.
    fn unbias(&mut self) {
        for (i, n) in self.network.iter_mut().enumerate() {
            n.r = (n.r >> NET_BIAS_SHIFT).clamp(0, 255);
            n.g = (n.g >> NET_BIAS_SHIFT).clamp(0, 255);
            n.b = (n.b >> NET_BIAS_SHIFT).clamp(0, 255);
            n.index = i;
        }
    }

    /// Selection-sort the network by green and index the start of each
    /// green value.
    fn build_index(mut self) -> NeuQuant {
        let mut net_index = [0usize; 256];
        let mut previous = 0usize;
        let mut start = 0usize;

        for i in 0..NET_SIZE {
            let mut small_pos = i;
            let mut small_val = self.network[i].g;
            for j in i + 1..NET_SIZE {
                if self.network[j].g < small_val {
                    small_pos = j;
                    small_val = self.network[j].g;
                }
            }
            self.network.swap(i, small_pos);

            let small_val = small_val as usize;
            if small_val != previous {
                net_index[previous] = (start + i) >> 1;
                for slot in &mut net_index[previous + 1..small_val] {
                    *slot = i;
                }
                previous = small_val;
                start = i;
            }
        }
        net_index[previous] = (start + MAX_NET_POS) >> 1;
        for slot in &mut net_index[previous + 1..] {
            *slot = MAX_NET_POS;
        }

        let mut palette = [[0u8; 3]; NET_SIZE];
        for n in &self.network {
            palette[n.index] = [n.r as u8, n.g as u8, n.b as u8];
        }

        NeuQuant { network: self.network, net_index, palette }
    }
}

/// A trained, immutable 256-colour palette with nearest-colour lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeuQuant {
    /// Sorted by green.
    network: [Neuron; NET_SIZE],
    /// First network position to try for each green value.
    net_index: [usize; 256],
    /// Entry colours by palette index.
    palette: [[u8; 3]; NET_SIZE],
}

impl NeuQuant {
    /// Train a palette on `pixels`, a packed RGB buffer.
    ///
    /// `sample_factor` 1 trains on every pixel; larger values train on
    /// roughly every Nth pixel, trading quality for speed (10 is the usual
    /// choice). Buffers shorter than 503 pixels always use every pixel.
    /// Trailing bytes that do not make up a whole pixel are ignored.
    pub fn new(sample_factor: u32, pixels: &[u8]) -> Result<Self> {
        if sample_factor < 1 {
            return Err(Error::InvalidArgument("sample factor must be at least 1"));
        }
        let whole = pixels.len() - pixels.len() % 3;
        if whole == 0 {
            return Err(Error::InvalidArgument("sample buffer holds no complete RGB pixel"));
        }

        let mut trainer = Trainer::new(&pixels[..whole], sample_factor);
        trainer.learn();
        trainer.unbias();
        Ok(trainer.build_index())
    }

    /// The palette as 256 packed RGB triples, in palette index order.
    pub fn color_map(&self) -> [u8; PALETTE_BYTES] {
        let mut map = [0u8; PALETTE_BYTES];
        for (dst, rgb) in map.chunks_exact_mut(3).zip(&self.palette) {
            dst.copy_from_slice(rgb);
        }
        map
    }

    /// The colour of palette entry `index`.
    pub fn lookup(&self, index: u8) -> [u8; 3] {
        self.palette[usize::from(index)]
    }

    /// Palette index of the entry nearest to `rgb` by L1 distance.
    ///
    /// The search starts at the first entry with the same green value
    /// and walks outwards; each direction stops once the green difference
    /// alone is at least the best distance found.
    pub fn index_of(&self, rgb: [u8; 3]) -> u8 {
        let [r, g, b] = rgb.map(i32::from);
        let mut best_d = i32::MAX;
        let mut best = 0;
        let mut up = self.net_index[usize::from(rgb[1])];
        let mut down = up.checked_sub(1);

        while up < NET_SIZE || down.is_some() {
            if up < NET_SIZE {
                let n = &self.network[up];
                if n.g - g >= best_d {
                    up = NET_SIZE;
                } else {
                    up += 1;
                    let dist = n.distance(r, g, b);
                    if dist < best_d {
                        best_d = dist;
                        best = n.index;
                    }
                }
            }
            if let Some(at) = down {
                let n = &self.network[at];
                if g - n.g >= best_d {
                    down = None;
                } else {
                    down = at.checked_sub(1);
                    let dist = n.distance(r, g, b);
                    if dist < best_d {
                        best_d = dist;
                        best = n.index;
                    }
                }
            }
        }
        best as u8
    }

    /// Map every whole RGB pixel of `pixels` to its palette index.
    pub fn map_pixels(&self, pixels: &[u8]) -> Result<TryVec<u8>> {
        let mut indices = TryVec::with_capacity(pixels.len() / 3)?;
        for px in pixels.chunks_exact(3) {
            indices.push(self.index_of([px[0], px[1], px[2]]))?;
        }
        Ok(indices)
    }
}
