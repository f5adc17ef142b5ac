#![deny(unsafe_code)]
//! Streaming decoder for GIF87a/89a animations, plus a NeuQuant palette
//! quantizer.
//!
//! [`GifDecoder`] reads one block at a time and yields fully expanded
//! frames lazily: frame N+1 is not decoded until frame N has been pulled.
//! Malformed data never panics. The sequence simply ends, and the reason is
//! available from [`GifDecoder::error`].
//!
//! ```no_run
//! use lazygif::GifDecoder;
//!
//! let mut decoder = GifDecoder::open("animation.gif");
//! for frame in &mut decoder {
//!     println!("{}x{} for {:?}", frame.width, frame.height, frame.playback_delay);
//! }
//! if let Some(err) = decoder.error() {
//!     eprintln!("stopped early: {err}");
//! }
//! ```
//!
//! This crate is written entirely in safe Rust code.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use arrayvec::ArrayVec;
use byteorder::ReadBytesExt;
use fallible_collections::TryReserveError;
use log::{debug, warn};

use std::convert::TryInto as _;
use std::io::Read;
use std::iter::FusedIterator;
use std::time::Duration;

mod blocks;
use crate::blocks::{BlockType, ExtensionLabel, GraphicControl, ImageDescriptor};
pub use crate::blocks::{ColorTable, DisposalMethod, GifVersion, ScreenDescriptor};

mod lzw;
use crate::lzw::{LzwDecoder, LzwStatus, MIN_CODE_SIZE_RANGE};

mod pixels;
use crate::pixels::Canvas;

/// Colour quantization for producing palette images.
pub mod neuquant;
pub use crate::neuquant::NeuQuant;

/// Opening byte sources from locations.
pub mod source;
pub use crate::source::{BoxedSource, FileOpener, Location, SourceOpener};

pub use enough::{Stop, StopReason, Unstoppable};

/// A trait to indicate a type can be infallibly converted to `u64`.
/// This should only be implemented for infallible conversions, so only unsigned types are valid.
trait ToU64 {
    fn to_u64(self) -> u64;
}

/// Statically verify that the platform `usize` can fit within a `u64`.
/// If the size won't fit on the given platform, this will fail at compile time, but if a type
/// which can fail `TryInto<usize>` is used, it may panic.
impl ToU64 for usize {
    fn to_u64(self) -> u64 {
        const _: () = assert!(std::mem::size_of::<usize>() <= std::mem::size_of::<u64>());
        self.try_into().ok().unwrap()
    }
}

/// A trait to indicate a type can be infallibly converted to `usize`.
/// This should only be implemented for infallible conversions, so only unsigned types are valid.
pub(crate) trait ToUsize {
    fn to_usize(self) -> usize;
}

/// Statically verify that the given type can fit within a `usize`.
/// If the size won't fit on the given platform, this will fail at compile time, but if a type
/// which can fail `TryInto<usize>` is used, it may panic.
macro_rules! impl_to_usize_from {
    ( $from_type:ty ) => {
        impl ToUsize for $from_type {
            fn to_usize(self) -> usize {
                const _: () = assert!(std::mem::size_of::<$from_type>() <= std::mem::size_of::<usize>());
                self.try_into().ok().unwrap()
            }
        }
    };
}

impl_to_usize_from!(u8);
impl_to_usize_from!(u16);
impl_to_usize_from!(u32);

/// Wraps a reader to track the current offset (i.e., bytes already read)
struct OffsetReader<T> {
    reader: T,
    offset: u64,
}

impl<T> OffsetReader<T> {
    fn new(reader: T) -> Self {
        Self { reader, offset: 0 }
    }
}

impl<T: Read> Read for OffsetReader<T> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let bytes_read = self.reader.read(buf)?;
        self.offset = self
            .offset
            .checked_add(bytes_read.to_u64())
            .ok_or(Error::ResourceLimitExceeded("total bytes read too large for offset type"))?;
        Ok(bytes_read)
    }
}

#[doc(hidden)]
pub type TryVec<T> = fallible_collections::TryVec<T>;

// To ensure we don't use stdlib allocating types by accident
#[allow(dead_code)]
struct Vec;
#[allow(dead_code)]
struct Box;
#[allow(dead_code)]
struct HashMap;
#[allow(dead_code)]
struct String;

/// Describes decoder and quantizer failures.
///
/// This enum wraps the standard `io::Error` type, unified with
/// our own decoder error states and those of crates we use.
#[derive(Debug)]
pub enum Error {
    /// The byte source could not be opened.
    SourceUnavailable(std::io::Error),
    /// Decode error caused by corrupt or malformed data.
    FormatError(&'static str),
    /// Reflect `std::io::ErrorKind::UnexpectedEof` for short data.
    UnexpectedEndOfStream,
    /// The LZW data of a frame ended before every pixel was decoded.
    TruncatedFrame { expected: usize, decoded: usize },
    /// A caller passed arguments that cannot be used.
    InvalidArgument(&'static str),
    /// Propagate underlying errors from `std::io`.
    Io(std::io::Error),
    /// Out of memory
    OutOfMemory,
    /// Resource limit exceeded during decoding
    ResourceLimitExceeded(&'static str),
    /// Operation was stopped/cancelled
    Stopped(enough::StopReason),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::FormatError(s) | Self::InvalidArgument(s) | Self::ResourceLimitExceeded(s) => s,
            Self::SourceUnavailable(err) => return write!(f, "source unavailable: {err}"),
            Self::UnexpectedEndOfStream => "unexpected end of stream",
            Self::TruncatedFrame { expected, decoded } => {
                return write!(f, "truncated frame: {decoded} of {expected} pixels decoded");
            }
            Self::Io(err) => return err.fmt(f),
            Self::OutOfMemory => "OOM",
            Self::Stopped(reason) => return write!(f, "Stopped: {}", reason),
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::UnexpectedEndOfStream,
            _ => Self::Io(err),
        }
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(_: std::num::TryFromIntError) -> Self {
        Self::FormatError("integer conversion failed")
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::FormatError(_) => std::io::ErrorKind::InvalidData,
            Error::UnexpectedEndOfStream => std::io::ErrorKind::UnexpectedEof,
            Error::InvalidArgument(_) => std::io::ErrorKind::InvalidInput,
            Error::Io(io_err) | Error::SourceUnavailable(io_err) => return io_err,
            _ => std::io::ErrorKind::Other,
        };
        Self::new(kind, err)
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

impl From<enough::StopReason> for Error {
    fn from(reason: enough::StopReason) -> Self {
        Self::Stopped(reason)
    }
}

/// Result shorthand using our Error enum.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Playback delay used for frames whose stored delay is zero.
pub const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);

/// Turn a stored frame delay into a playback delay.
///
/// GIF delays are hundredths of a second. A delay of zero is replaced by
/// `default` (or [`DEFAULT_FRAME_DELAY`] if `default` is zero too), so a
/// player never spins without waiting.
pub fn normalize_delay(delay: u16, default: Duration) -> Duration {
    match delay {
        0 if default.is_zero() => DEFAULT_FRAME_DELAY,
        0 => default,
        centis => Duration::from_millis(u64::from(centis) * 10),
    }
}

/// Byte order of decoded pixels. Both use four bytes per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    #[default]
    Bgra8,
    Rgba8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        4
    }

    pub(crate) fn pixel(self, [r, g, b]: [u8; 3], alpha: u8) -> [u8; 4] {
        match self {
            Self::Bgra8 => [b, g, r, alpha],
            Self::Rgba8 => [r, g, b, alpha],
        }
    }
}

/// A rectangle on the logical screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
}

impl Region {
    pub fn area(&self) -> usize {
        self.width.to_usize() * self.height.to_usize()
    }
}

/// Configuration for decoding GIF streams with resource limits and output options
///
/// Resource limits are checked **before** allocations occur, preventing out-of-memory
/// conditions from malicious files that claim unrealistic dimensions or counts.
///
/// # Examples
///
/// ```rust
/// use lazygif::{DecodeConfig, PixelFormat};
///
/// // Default limits (suitable for most apps)
/// let config = DecodeConfig::default();
///
/// // Strict limits for untrusted input
/// let config = DecodeConfig::default()
///     .with_peak_memory_limit(100_000_000)  // 100MB
///     .with_total_megapixels_limit(16)       // 16MP per frame
///     .with_max_animation_frames(500)
///     .with_pixel_format(PixelFormat::Rgba8);
///
/// // No limits
/// let config = DecodeConfig::unlimited();
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeConfig {
    /// Maximum heap memory held while decoding one frame, in bytes.
    /// Covers compressed data, index and pixel buffers, and the canvas.
    /// Default: 1GB (1,000,000,000 bytes)
    pub peak_memory_limit: Option<u64>,

    /// Maximum megapixels of a single frame.
    /// Default: 512 megapixels
    pub total_megapixels_limit: Option<u32>,

    /// Maximum number of frames.
    /// Default: 10,000 frames
    pub max_animation_frames: Option<u32>,

    /// Byte order of decoded pixels.
    /// Default: BGRA
    pub pixel_format: PixelFormat,

    /// Draw frames onto a logical-screen canvas honouring disposal
    /// methods, instead of returning each image block on its own.
    /// Default: false
    pub composite: bool,

    /// Playback delay substituted for frames that store a zero delay.
    /// Default: 100ms
    pub default_delay: Duration,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            peak_memory_limit: Some(1_000_000_000),
            total_megapixels_limit: Some(512),
            max_animation_frames: Some(10_000),
            pixel_format: PixelFormat::Bgra8,
            composite: false,
            default_delay: DEFAULT_FRAME_DELAY,
        }
    }
}

impl DecodeConfig {
    /// Create a configuration with no resource limits.
    pub fn unlimited() -> Self {
        Self {
            peak_memory_limit: None,
            total_megapixels_limit: None,
            max_animation_frames: None,
            ..Self::default()
        }
    }

    /// Set the peak memory limit in bytes
    pub fn with_peak_memory_limit(mut self, bytes: u64) -> Self {
        self.peak_memory_limit = Some(bytes);
        self
    }

    /// Set the per-frame megapixels limit
    pub fn with_total_megapixels_limit(mut self, megapixels: u32) -> Self {
        self.total_megapixels_limit = Some(megapixels);
        self
    }

    /// Set the maximum frame count
    pub fn with_max_animation_frames(mut self, frames: u32) -> Self {
        self.max_animation_frames = Some(frames);
        self
    }

    /// Set the output pixel byte order
    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    /// Enable or disable canvas composition
    pub fn with_composite(mut self, composite: bool) -> Self {
        self.composite = composite;
        self
    }

    /// Set the delay used for frames that store zero
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }
}

struct ResourceTracker {
    peak_memory_limit: Option<u64>,
    total_megapixels_limit: Option<u32>,
    max_animation_frames: Option<u32>,
    current_memory: u64,
    peak_memory: u64,
}

impl ResourceTracker {
    fn new(config: &DecodeConfig) -> Self {
        Self {
            peak_memory_limit: config.peak_memory_limit,
            total_megapixels_limit: config.total_megapixels_limit,
            max_animation_frames: config.max_animation_frames,
            current_memory: 0,
            peak_memory: 0,
        }
    }

    fn reserve(&mut self, bytes: u64) -> Result<()> {
        self.current_memory = self.current_memory.saturating_add(bytes);
        self.peak_memory = self.peak_memory.max(self.current_memory);

        if let Some(limit) = self.peak_memory_limit {
            if self.peak_memory > limit {
                return Err(Error::ResourceLimitExceeded("peak memory limit exceeded"));
            }
        }

        Ok(())
    }

    fn release(&mut self, bytes: u64) {
        self.current_memory = self.current_memory.saturating_sub(bytes);
    }

    fn validate_total_megapixels(&self, width: u16, height: u16) -> Result<()> {
        if let Some(limit) = self.total_megapixels_limit {
            let megapixels = u64::from(width) * u64::from(height) / 1_000_000;
            if megapixels > u64::from(limit) {
                return Err(Error::ResourceLimitExceeded("total megapixels limit exceeded"));
            }
        }

        Ok(())
    }

    fn validate_animation_frames(&self, count: u32) -> Result<()> {
        if let Some(limit) = self.max_animation_frames {
            if count > limit {
                return Err(Error::ResourceLimitExceeded("animation frame count limit exceeded"));
            }
        }

        Ok(())
    }
}

/// One decoded image of the stream.
#[derive(Debug)]
pub struct Frame {
    /// Zero-based position in the stream.
    pub index: u32,
    /// Width of `pixels`. The logical screen width when compositing.
    pub width: u16,
    /// Height of `pixels`. The logical screen height when compositing.
    pub height: u16,
    /// Where the image block sits on the logical screen.
    pub region: Region,
    /// Delay as stored, in hundredths of a second. May be zero.
    pub delay: u16,
    /// Delay to wait before showing the next frame; never zero.
    pub playback_delay: Duration,
    pub disposal: DisposalMethod,
    pub transparent_index: Option<u8>,
    /// The frame asked to wait for user input.
    pub user_input: bool,
    pub interlaced: bool,
    pub has_local_color_table: bool,
    /// Pixel indices recovered from the LZW data, at most `region.area()`.
    pub decoded_pixels: usize,
    pub format: PixelFormat,
    /// `width * height * 4` bytes in `format` order.
    pub pixels: TryVec<u8>,
}

impl Frame {
    /// Whether the LZW data ran out before the image was filled.
    pub fn is_truncated(&self) -> bool {
        self.decoded_pixels < self.region.area()
    }

    /// `Err(TruncatedFrame)` for a truncated frame.
    pub fn ensure_complete(&self) -> Result<()> {
        if self.is_truncated() {
            return Err(Error::TruncatedFrame {
                expected: self.region.area(),
                decoded: self.decoded_pixels,
            });
        }
        Ok(())
    }

    /// Bytes per row of `pixels`.
    pub fn stride(&self) -> usize {
        self.width.to_usize() * self.format.bytes_per_pixel()
    }

    /// The pixel at `(x, y)`, in `format` order.
    pub fn pixel(&self, x: u16, y: u16) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = y.to_usize() * self.stride() + x.to_usize() * self.format.bytes_per_pixel();
        self.pixels.get(at..at + 4)?.try_into().ok()
    }
}

/// Per-stream parse state.
#[derive(Debug, Default)]
struct StreamState {
    screen: Option<ScreenDescriptor>,
    global_table: Option<ColorTable>,
    /// Pending graphic control values for the next image.
    control: GraphicControl,
    loop_count: Option<u16>,
    frame_count: u32,
    truncated_frames: u32,
}

/// Lazy, forward-only decoder producing one [`Frame`] per image block.
///
/// Iterating never fails: when the stream is malformed, truncated, over a
/// limit, or stopped, the iterator ends and [`error`](Self::error) reports
/// why. Frames already produced stay valid. Use
/// [`next_frame`](Self::next_frame) to receive the error directly instead.
///
/// The source is dropped as soon as the sequence ends, on
/// [`close`](Self::close), or when the decoder is dropped.
///
/// # Constructors
///
/// | Method | Source | Limits | Cancellation |
/// |--------|--------|--------|--------------|
/// | [`new`](GifDecoder::new) | any `Read` | default | no |
/// | [`with_config`](GifDecoder::with_config) | any `Read` | given | no |
/// | [`with_config_and_stop`](Self::with_config_and_stop) | any `Read` | given | given |
/// | [`open`](GifDecoder::open) | path or `file:` URI | default | no |
/// | [`open_with`](GifDecoder::open_with) | via a [`SourceOpener`] | given | no |
pub struct GifDecoder<R, S = Unstoppable> {
    source: Option<OffsetReader<R>>,
    /// Bytes consumed by a source that has been released.
    consumed: u64,
    config: DecodeConfig,
    stop: S,
    tracker: ResourceTracker,
    state: StreamState,
    canvas: Option<Canvas>,
    /// Reported on the pull after the frame that hit it.
    pending_error: Option<Error>,
    error: Option<Error>,
    finished: bool,
}

impl<R: Read> GifDecoder<R> {
    /// Decode `reader` with the default limits.
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, DecodeConfig::default())
    }

    /// Decode `reader` with the given limits and options.
    pub fn with_config(reader: R, config: DecodeConfig) -> Self {
        GifDecoder::with_config_and_stop(reader, config, Unstoppable)
    }
}

impl GifDecoder<BoxedSource> {
    /// Decode a local file given as a path or `file:` URI.
    ///
    /// Failing to open the file does not fail here: the decoder yields no
    /// frames and [`error`](Self::error) returns
    /// [`Error::SourceUnavailable`].
    pub fn open(location: &str) -> Self {
        Self::open_with(location, &FileOpener, DecodeConfig::default())
    }

    /// Decode whatever `opener` returns for `location`.
    pub fn open_with(location: &str, opener: &dyn SourceOpener, config: DecodeConfig) -> Self {
        GifDecoder::open_with_stop(location, opener, config, Unstoppable)
    }
}

impl<S: Stop> GifDecoder<BoxedSource, S> {
    /// Like [`open_with`](GifDecoder::open_with), with a cancellation token.
    pub fn open_with_stop(location: &str, opener: &dyn SourceOpener, config: DecodeConfig, stop: S) -> Self {
        match opener.open(location) {
            Ok(source) => Self::with_config_and_stop(source, config, stop),
            Err(err) => {
                warn!("cannot open {location}: {err}");
                let mut decoder = Self::unstarted(None, config, stop);
                decoder.finished = true;
                decoder.error = Some(Error::SourceUnavailable(err));
                decoder
            }
        }
    }
}

impl<R: Read, S: Stop> GifDecoder<R, S> {
    // ========================================
    // Constructors
    // ========================================

    /// Decode `reader` with the given limits, polling `stop` before every
    /// block.
    pub fn with_config_and_stop(reader: R, config: DecodeConfig, stop: S) -> Self {
        Self::unstarted(Some(OffsetReader::new(reader)), config, stop)
    }

    fn unstarted(source: Option<OffsetReader<R>>, config: DecodeConfig, stop: S) -> Self {
        Self {
            source,
            consumed: 0,
            tracker: ResourceTracker::new(&config),
            config,
            stop,
            state: StreamState::default(),
            canvas: None,
            pending_error: None,
            error: None,
            finished: false,
        }
    }

    // ========================================
    // Stream metadata
    // ========================================

    /// The logical screen descriptor, reading the header if needed.
    ///
    /// `None` if the header is missing or malformed; see
    /// [`error`](Self::error).
    pub fn screen_descriptor(&mut self) -> Option<&ScreenDescriptor> {
        if self.state.screen.is_none() && !self.finished {
            if let Err(err) = self.read_header() {
                warn!("invalid GIF header: {err}");
                self.finish();
                self.error = Some(err);
            }
        }
        self.state.screen.as_ref()
    }

    pub fn global_color_table(&self) -> Option<&ColorTable> {
        self.state.global_table.as_ref()
    }

    /// Loop count from a `NETSCAPE2.0` extension read so far.
    /// `Some(0)` means loop forever.
    pub fn loop_count(&self) -> Option<u16> {
        self.state.loop_count
    }

    /// Number of frames produced so far.
    pub fn frame_count(&self) -> u32 {
        self.state.frame_count
    }

    /// Number of frames produced so far whose LZW data was cut short.
    pub fn truncated_frame_count(&self) -> u32 {
        self.state.truncated_frames
    }

    /// Bytes read from the source so far.
    pub fn position(&self) -> u64 {
        self.source.as_ref().map_or(self.consumed, |src| src.offset)
    }

    /// Why the sequence ended early, if it did.
    ///
    /// Set when iteration through [`Iterator::next`] or
    /// [`screen_descriptor`](Self::screen_descriptor) hits an error, or when
    /// the source could not be opened. Errors returned from
    /// [`next_frame`](Self::next_frame) are handed to the caller instead.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Whether the sequence has ended.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    // ========================================
    // Decoding
    // ========================================

    /// Decode the next frame.
    ///
    /// `Ok(None)` after the trailer or once the sequence has ended.
    /// An error ends the sequence; frames returned earlier stay valid.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        match self.advance() {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => {
                self.finish();
                Ok(None)
            }
            Err(err) => {
                warn!("decoding stopped after {} frames: {err}", self.state.frame_count);
                self.finish();
                Err(err)
            }
        }
    }

    /// End the sequence now and release the source.
    pub fn close(&mut self) {
        if !self.finished {
            debug!("closed after {} frames", self.state.frame_count);
            self.finish();
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.pending_error = None;
        self.canvas = None;
        if let Some(source) = self.source.take() {
            self.consumed = source.offset;
        }
    }

    fn read_header(&mut self) -> Result<()> {
        if self.state.screen.is_some() {
            return Ok(());
        }
        let src = self.source.as_mut().ok_or(Error::UnexpectedEndOfStream)?;

        let mut signature = [0u8; 6];
        src.read_exact(&mut signature)?;
        let version = GifVersion::from_signature(&signature).ok_or(Error::FormatError("not a GIF signature"))?;

        let screen = ScreenDescriptor::read(src, version)?;
        if screen.has_global_color_table {
            self.state.global_table = Some(ColorTable::read(src, screen.global_color_table_size)?);
        }
        debug!(
            "{version:?} logical screen {}x{}, global table: {}",
            screen.width,
            screen.height,
            self.state.global_table.as_ref().map_or(0, ColorTable::len)
        );

        if self.config.composite {
            self.tracker.validate_total_megapixels(screen.width, screen.height)?;
            self.tracker.reserve(Canvas::peak_bytes(screen.width, screen.height))?;
            self.canvas = Some(Canvas::new(screen.width, screen.height)?);
        }
        self.state.screen = Some(screen);
        Ok(())
    }

    fn advance(&mut self) -> Result<Option<Frame>> {
        if let Some(err) = self.pending_error.take() {
            return Err(err);
        }
        self.read_header()?;

        loop {
            self.stop.check()?;
            let src = self.source.as_mut().ok_or(Error::UnexpectedEndOfStream)?;
            let offset = src.offset;

            match BlockType::from(src.read_u8()?) {
                BlockType::ImageDescriptor => {
                    if let Some(frame) = self.read_image()? {
                        return Ok(Some(frame));
                    }
                }
                BlockType::Extension => {
                    let label = ExtensionLabel::from(src.read_u8()?);
                    read_extension(src, &mut self.state, label)?;
                }
                BlockType::Trailer => {
                    debug!("trailer at offset {offset} after {} frames", self.state.frame_count);
                    return Ok(None);
                }
                BlockType::Filler => {}
                BlockType::Unknown(byte) => {
                    warn!("invalid block introducer {byte:#04x} at offset {offset}");
                    return Err(Error::FormatError("invalid block introducer"));
                }
            }
        }
    }

    /// Decode one image block. `None` if the block was skipped.
    fn read_image(&mut self) -> Result<Option<Frame>> {
        let src = self.source.as_mut().ok_or(Error::UnexpectedEndOfStream)?;
        let descriptor = ImageDescriptor::read(src)?;
        let local_table = if descriptor.has_local_color_table {
            Some(ColorTable::read(src, descriptor.local_color_table_size)?)
        } else {
            None
        };
        let control = std::mem::take(&mut self.state.control);
        let min_code_size = src.read_u8()?;

        let mut data = TryVec::new();
        let complete = read_image_data(src, &mut data, &mut self.tracker)?;
        let mut reserved = data.len().to_u64();

        let table = local_table
            .as_ref()
            .or(self.state.global_table.as_ref())
            .ok_or(Error::FormatError("image has no color table"))?;

        if !MIN_CODE_SIZE_RANGE.contains(&min_code_size) {
            warn!(
                "skipping image {} with LZW minimum code size {min_code_size}",
                self.state.frame_count
            );
            self.tracker.release(reserved);
            return if complete { Ok(None) } else { Err(Error::UnexpectedEndOfStream) };
        }

        let count = self
            .state
            .frame_count
            .checked_add(1)
            .ok_or(Error::ResourceLimitExceeded("animation frame count limit exceeded"))?;
        self.tracker.validate_animation_frames(count)?;
        self.tracker.validate_total_megapixels(descriptor.width, descriptor.height)?;
        let area = descriptor.area();
        let mut buffers = area.to_u64() * (1 + self.config.pixel_format.bytes_per_pixel().to_u64());
        if descriptor.interlaced {
            buffers += area.to_u64();
        }
        if let Some(screen) = self.state.screen.as_ref().filter(|_| self.canvas.is_some()) {
            buffers += screen.area().to_u64() * self.config.pixel_format.bytes_per_pixel().to_u64();
        }
        self.tracker.reserve(buffers)?;
        reserved += buffers;

        let mut indices = pixels::zeroed(area)?;
        let outcome = LzwDecoder::new(min_code_size).decode(&data, &mut indices);
        if let LzwStatus::InvalidCode(code) = outcome.status {
            debug!("invalid LZW code {code} in image {}", self.state.frame_count);
        }
        if descriptor.interlaced {
            indices = pixels::deinterlace(&indices, descriptor.width.to_usize(), descriptor.height.to_usize())?;
        }

        let format = self.config.pixel_format;
        let mut expanded = pixels::zeroed(area * format.bytes_per_pixel())?;
        pixels::expand(&indices, table, control.transparent_index, format, &mut expanded);

        let region = Region {
            left: descriptor.left,
            top: descriptor.top,
            width: descriptor.width,
            height: descriptor.height,
        };
        let (width, height, buffer) = match (self.canvas.as_mut(), self.state.screen.as_ref()) {
            (Some(canvas), Some(screen)) => {
                (screen.width, screen.height, canvas.compose(region, &expanded, control.disposal)?)
            }
            _ => (descriptor.width, descriptor.height, expanded),
        };
        self.tracker.release(reserved);

        let index = self.state.frame_count;
        self.state.frame_count = count;
        let frame = Frame {
            index,
            width,
            height,
            region,
            delay: control.delay,
            playback_delay: normalize_delay(control.delay, self.config.default_delay),
            disposal: control.disposal,
            transparent_index: control.transparent_index,
            user_input: control.user_input,
            interlaced: descriptor.interlaced,
            has_local_color_table: descriptor.has_local_color_table,
            decoded_pixels: outcome.written,
            format,
            pixels: buffer.into(),
        };

        if let Err(err) = frame.ensure_complete() {
            warn!("frame {index}: {err}");
            self.state.truncated_frames += 1;
        }
        if !complete {
            self.pending_error = Some(Error::UnexpectedEndOfStream);
        }
        Ok(Some(frame))
    }
}

impl<R: Read, S: Stop> Iterator for GifDecoder<R, S> {
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                self.error = Some(err);
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished { (0, Some(0)) } else { (0, None) }
    }
}

impl<R: Read, S: Stop> FusedIterator for GifDecoder<R, S> {}

/// Sub-block payload, at most 255 bytes.
type SubBlock = ArrayVec<u8, 255>;

/// Read one sub-block. `None` at the zero-length terminator.
fn read_sub_block<T: Read>(src: &mut T) -> Result<Option<SubBlock>> {
    let len = src.read_u8()?.to_usize();
    if len == 0 {
        return Ok(None);
    }
    let mut buf = [0u8; 255];
    src.read_exact(&mut buf[..len])?;
    let mut block = SubBlock::new();
    block
        .try_extend_from_slice(&buf[..len])
        .map_err(|_| Error::FormatError("sub-block too long"))?;
    Ok(Some(block))
}

/// Skip sub-blocks up to and including the terminator.
fn skip_sub_blocks<T: Read>(src: &mut T) -> Result<u64> {
    let mut skipped = 0;
    loop {
        let len = u64::from(src.read_u8()?);
        if len == 0 {
            return Ok(skipped);
        }
        skip(src, len)?;
        skipped += len;
    }
}

/// Accumulate image data sub-blocks into `out`.
///
/// Returns `false` if the stream ended before the terminator; the bytes
/// read until then are kept.
fn read_image_data<T: Read>(src: &mut T, out: &mut TryVec<u8>, tracker: &mut ResourceTracker) -> Result<bool> {
    let mut buf = [0u8; 255];
    loop {
        let len = match src.read_u8() {
            Ok(len) => len.to_usize(),
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        if len == 0 {
            return Ok(true);
        }
        let got = fill(src, &mut buf[..len])?;
        tracker.reserve(got.to_u64())?;
        out.extend_from_slice(&buf[..got])?;
        if got < len {
            return Ok(false);
        }
    }
}

fn read_extension<T: Read>(src: &mut T, state: &mut StreamState, label: ExtensionLabel) -> Result<()> {
    match label {
        ExtensionLabel::GraphicControl => {
            let Some(block) = read_sub_block(src)? else {
                warn!("empty graphic control extension ignored");
                return Ok(());
            };
            match block.first_chunk::<{ GraphicControl::LEN }>() {
                Some(data) => state.control = GraphicControl::parse(data),
                None => warn!("graphic control extension of {} bytes ignored", block.len()),
            }
            skip_sub_blocks(src)?;
        }
        ExtensionLabel::Application => {
            let Some(identifier) = read_sub_block(src)? else {
                return Ok(());
            };
            if identifier.as_slice() != blocks::NETSCAPE_LOOPING.as_slice() {
                let skipped = skip_sub_blocks(src)?;
                debug!("skipped {skipped} bytes of application extension {:?}", identifier.as_slice());
                return Ok(());
            }
            while let Some(block) = read_sub_block(src)? {
                if let Some(count) = blocks::parse_loop_sub_block(&block) {
                    debug!("loop count {count}");
                    state.loop_count = Some(count);
                }
            }
        }
        ExtensionLabel::Comment | ExtensionLabel::PlainText | ExtensionLabel::Unknown(_) => {
            let skipped = skip_sub_blocks(src)?;
            debug!("skipped {skipped} bytes of {label:?} extension");
        }
    }
    Ok(())
}

/// Read into `buf` until it is full or the source ends.
fn fill<T: Read>(src: &mut T, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(filled)
}

/// Skip a number of bytes that we don't care to parse.
fn skip<T: Read>(src: &mut T, bytes: u64) -> Result<()> {
    std::io::copy(&mut src.take(bytes), &mut std::io::sink())?;
    Ok(())
}

fn le_u16<T: ReadBytesExt>(src: &mut T) -> Result<u16> {
    src.read_u16::<byteorder::LittleEndian>().map_err(From::from)
}

#[test]
fn delay_normalization() {
    assert_eq!(normalize_delay(0, DEFAULT_FRAME_DELAY), Duration::from_millis(100));
    assert_eq!(normalize_delay(0, Duration::from_millis(40)), Duration::from_millis(40));
    assert_eq!(normalize_delay(0, Duration::ZERO), DEFAULT_FRAME_DELAY);
    assert_eq!(normalize_delay(1, DEFAULT_FRAME_DELAY), Duration::from_millis(10));
    assert_eq!(normalize_delay(50, DEFAULT_FRAME_DELAY), Duration::from_millis(500));
    assert_eq!(normalize_delay(u16::MAX, DEFAULT_FRAME_DELAY), Duration::from_millis(655_350));
}

#[test]
fn io_errors_convert_both_ways() {
    let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short");
    assert!(matches!(Error::from(eof), Error::UnexpectedEndOfStream));

    let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
    assert!(matches!(Error::from(denied), Error::Io(_)));

    let io: std::io::Error = Error::FormatError("bad").into();
    assert_eq!(io.kind(), std::io::ErrorKind::InvalidData);
    let io: std::io::Error = Error::UnexpectedEndOfStream.into();
    assert_eq!(io.kind(), std::io::ErrorKind::UnexpectedEof);
}

#[test]
fn error_messages() {
    assert_eq!(Error::FormatError("not a GIF signature").to_string(), "not a GIF signature");
    assert_eq!(
        Error::TruncatedFrame { expected: 16, decoded: 5 }.to_string(),
        "truncated frame: 5 of 16 pixels decoded"
    );
    assert_eq!(Error::Stopped(StopReason::Cancelled).to_string(), format!("Stopped: {}", StopReason::Cancelled));
}

#[test]
fn config_builders() {
    let config = DecodeConfig::default();
    assert_eq!(config.max_animation_frames, Some(10_000));
    assert_eq!(config.pixel_format, PixelFormat::Bgra8);
    assert!(!config.composite);

    let config = DecodeConfig::unlimited()
        .with_max_animation_frames(3)
        .with_composite(true)
        .with_pixel_format(PixelFormat::Rgba8)
        .with_default_delay(Duration::from_millis(20));
    assert_eq!(config.peak_memory_limit, None);
    assert_eq!(config.max_animation_frames, Some(3));
    assert!(config.composite);
    assert_eq!(config.default_delay, Duration::from_millis(20));
}

#[test]
fn tracker_limits() {
    let config = DecodeConfig::default()
        .with_peak_memory_limit(100)
        .with_total_megapixels_limit(1)
        .with_max_animation_frames(2);
    let mut tracker = ResourceTracker::new(&config);
    tracker.reserve(60).unwrap();
    tracker.release(60);
    tracker.reserve(100).unwrap();
    match tracker.reserve(1) {
        Err(Error::ResourceLimitExceeded(msg)) => assert_eq!(msg, "peak memory limit exceeded"),
        other => panic!("expected limit error, got {other:?}"),
    }
    assert!(tracker.validate_total_megapixels(1000, 1999).is_ok());
    assert!(tracker.validate_total_megapixels(2000, 1000).is_err());
    assert!(tracker.validate_animation_frames(2).is_ok());
    assert!(tracker.validate_animation_frames(3).is_err());
}

#[test]
fn frame_count_saturates_with_error() {
    let mut bytes = b"GIF89a\x02\x00\x02\x00\xF1\x00\x00".to_vec();
    bytes.extend_from_slice(&[255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255]);
    bytes.extend_from_slice(&[0x2C, 0, 0, 0, 0, 2, 0, 2, 0, 0, 2, 2, 0x44, 0x01, 0, 0x3B]);
    let mut decoder = GifDecoder::with_config(&bytes[..], DecodeConfig::unlimited());
    assert!(decoder.screen_descriptor().is_some());
    decoder.state.frame_count = u32::MAX;
    match decoder.next_frame() {
        Err(Error::ResourceLimitExceeded(msg)) => assert_eq!(msg, "animation frame count limit exceeded"),
        other => panic!("expected limit error, got {other:?}"),
    }
    assert_eq!(decoder.frame_count(), u32::MAX);
    assert!(decoder.is_finished());
}

#[test]
fn image_data_stops_at_end_of_stream() {
    let mut tracker = ResourceTracker::new(&DecodeConfig::unlimited());
    let mut out = TryVec::new();
    let complete = read_image_data(&mut &[3, 1, 2, 3, 2, 4, 5, 0, 9][..], &mut out, &mut tracker).unwrap();
    assert!(complete);
    assert_eq!(&out[..], &[1, 2, 3, 4, 5]);

    let mut out = TryVec::new();
    let complete = read_image_data(&mut &[3, 1, 2, 3, 4, 4, 5][..], &mut out, &mut tracker).unwrap();
    assert!(!complete);
    assert_eq!(&out[..], &[1, 2, 3, 4, 5]);
}

#[test]
fn extensions_update_state() {
    let mut state = StreamState::default();
    let mut control: &[u8] = &[4, 0b0000_0101, 10, 0, 3, 0];
    read_extension(&mut control, &mut state, ExtensionLabel::GraphicControl).unwrap();
    assert_eq!(state.control.delay, 10);
    assert_eq!(state.control.transparent_index, Some(3));
    assert_eq!(state.control.disposal, DisposalMethod::Keep);

    let mut looping: &[u8] = b"\x0BNETSCAPE2.0\x03\x01\x05\x00\x00";
    read_extension(&mut looping, &mut state, ExtensionLabel::Application).unwrap();
    assert_eq!(state.loop_count, Some(5));
    assert!(looping.is_empty());

    let mut other: &[u8] = b"\x0BXMP DataXMP\x02ab\x01c\x00\x2C";
    read_extension(&mut other, &mut state, ExtensionLabel::Application).unwrap();
    assert_eq!(other, &[0x2C]);

    let mut comment: &[u8] = b"\x05hello\x00\x3B";
    read_extension(&mut comment, &mut state, ExtensionLabel::Comment).unwrap();
    assert_eq!(comment, &[0x3B]);

    let mut short: &[u8] = &[2, 1, 2, 0];
    read_extension(&mut short, &mut state, ExtensionLabel::GraphicControl).unwrap();
    assert_eq!(state.control.delay, 10);
}
