// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod common;

use std::cell::Cell;
use std::io::{Read, Write as _};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::{BLUE, GREEN, GifBuilder, Image, PALETTE, RED, WHITE, bgra};
use lazygif::{DecodeConfig, DisposalMethod, Error, Frame, GifDecoder, PixelFormat, StopReason};

fn decode(bytes: &[u8]) -> (Vec<Frame>, Option<String>) {
    decode_with(bytes, DecodeConfig::default())
}

fn decode_with(bytes: &[u8], config: DecodeConfig) -> (Vec<Frame>, Option<String>) {
    common::init_logger();
    let mut decoder = GifDecoder::with_config(bytes, config);
    let frames: Vec<Frame> = decoder.by_ref().collect();
    assert!(decoder.is_finished());
    (frames, decoder.error().map(|e| format!("{e:?}")))
}

fn pixels_of(colors: &[[u8; 3]]) -> Vec<u8> {
    colors.iter().flat_map(|&c| bgra(c)).collect()
}

// ============================================================================
// Frame sequence
// ============================================================================

#[test]
fn two_frame_animation() {
    let (frames, error) = decode(&common::two_frame_gif());
    assert_eq!(error, None);
    assert_eq!(frames.len(), 2);

    let [first, second] = &frames[..] else { unreachable!() };
    assert_eq!(first.index, 0);
    assert_eq!((first.width, first.height), (2, 2));
    assert_eq!(first.delay, 0);
    assert_eq!(first.playback_delay, Duration::from_millis(100));
    assert_eq!(first.disposal, DisposalMethod::Keep);
    assert_eq!(&first.pixels[..], &pixels_of(&[RED, GREEN, BLUE, WHITE])[..]);
    assert!(!first.is_truncated());
    assert!(first.ensure_complete().is_ok());

    assert_eq!(second.index, 1);
    assert_eq!(second.delay, 50);
    assert_eq!(second.playback_delay, Duration::from_millis(500));
    assert_eq!(&second.pixels[..], &pixels_of(&[WHITE, BLUE, GREEN, RED])[..]);
}

#[test]
fn metadata_is_available() {
    common::init_logger();
    let bytes = common::two_frame_gif();
    let mut decoder = GifDecoder::new(&bytes[..]);
    assert_eq!(decoder.loop_count(), None);

    let screen = decoder.screen_descriptor().expect("header").clone();
    assert_eq!((screen.width, screen.height), (2, 2));
    assert!(screen.has_global_color_table);
    assert_eq!(screen.version, lazygif::GifVersion::V89a);
    assert_eq!(decoder.global_color_table().map(|t| t.entries().to_vec()), Some(PALETTE.to_vec()));
    assert_eq!(decoder.position(), 13 + 12);

    assert_eq!(decoder.by_ref().count(), 2);
    assert_eq!(decoder.loop_count(), Some(0));
    assert_eq!(decoder.frame_count(), 2);
    assert_eq!(decoder.position(), bytes.len() as u64);
}

#[test]
fn buffer_length_matches_dimensions() {
    let indices = common::noise(7 * 5, 4, 9);
    let wide = common::noise(13 * 2, 4, 10);
    let bytes = GifBuilder::new(13, 5, Some(&PALETTE))
        .image(Image::new(7, 5, &indices).at(3, 0))
        .image(Image::new(13, 2, &wide).at(0, 3))
        .image(Image::new(0, 0, &[]))
        .trailer()
        .build();
    let (frames, error) = decode(&bytes);
    assert_eq!(error, None);
    assert_eq!(frames.len(), 3);
    for frame in &frames {
        assert_eq!(frame.pixels.len(), usize::from(frame.width) * usize::from(frame.height) * 4);
        assert_eq!(frame.stride(), usize::from(frame.width) * 4);
    }
    assert_eq!(frames[0].region.left, 3);
    assert_eq!(frames[1].region.top, 3);
}

#[test]
fn frames_are_decoded_lazily() {
    common::init_logger();
    let big = common::noise(64 * 64, 4, 3);
    let bytes = GifBuilder::new(64, 64, Some(&PALETTE))
        .image(Image::new(64, 64, &big))
        .image(Image::new(64, 64, &big))
        .trailer()
        .build();
    let mut decoder = GifDecoder::new(&bytes[..]);
    let first = decoder.next().expect("first frame");
    assert_eq!(first.index, 0);
    let after_first = decoder.position();
    assert!(after_first < bytes.len() as u64 / 2 + 16, "read {after_first} of {}", bytes.len());
    assert!(decoder.next().is_some());
    assert!(decoder.next().is_none());
    assert!(decoder.next().is_none());
}

#[test]
fn interlaced_matches_progressive() {
    let (width, height) = (3u16, 11u16);
    let indices: Vec<u8> = (0..height).flat_map(|row| [(row % 4) as u8, ((row + 1) % 4) as u8, 3]).collect();

    let progressive = GifBuilder::new(width, height, Some(&PALETTE))
        .image(Image::new(width, height, &indices))
        .trailer()
        .build();
    let interlaced = GifBuilder::new(width, height, Some(&PALETTE))
        .image(Image::new(width, height, &indices).interlaced())
        .trailer()
        .build();

    let (a, _) = decode(&progressive);
    let (b, _) = decode(&interlaced);
    assert!(!a[0].interlaced);
    assert!(b[0].interlaced);
    assert_eq!(&a[0].pixels[..], &b[0].pixels[..]);
    assert_eq!(a[0].pixel(0, 5), Some(bgra(GREEN)));
}

#[test]
fn local_table_applies_to_one_frame() {
    let local = [[9, 9, 9], [8, 8, 8]];
    let bytes = GifBuilder::new(2, 2, Some(&PALETTE))
        .image(Image::new(2, 2, &[0, 1, 0, 1]).local_table(&local))
        .image(Image::new(2, 2, &[0, 1, 0, 1]))
        .trailer()
        .build();
    let (frames, error) = decode(&bytes);
    assert_eq!(error, None);
    assert!(frames[0].has_local_color_table);
    assert_eq!(&frames[0].pixels[..], &pixels_of(&[[9, 9, 9], [8, 8, 8], [9, 9, 9], [8, 8, 8]])[..]);
    assert!(!frames[1].has_local_color_table);
    assert_eq!(&frames[1].pixels[..], &pixels_of(&[RED, GREEN, RED, GREEN])[..]);
}

#[test]
fn transparency_applies_to_one_frame() {
    let bytes = GifBuilder::new(2, 2, Some(&PALETTE))
        .control(10, Some(1), 0)
        .image(Image::new(2, 2, &[0, 1, 1, 0]))
        .image(Image::new(2, 2, &[1, 1, 1, 1]))
        .trailer()
        .build();
    common::init_logger();
    let mut decoder = GifDecoder::new(&bytes[..]);
    let frames: Vec<Frame> = decoder.by_ref().collect();
    assert_eq!(frames.len(), 2);

    assert_eq!(frames[0].transparent_index, Some(1));
    assert_eq!(frames[0].pixel(0, 0), Some(bgra(RED)));
    assert_eq!(frames[0].pixel(1, 0), Some([0, 0, 0, 0]));
    assert_eq!(frames[0].pixel(0, 1), Some([0, 0, 0, 0]));

    // The control block applied to the first image only.
    assert_eq!(frames[1].transparent_index, None);
    assert_eq!(frames[1].delay, 0);
    assert_eq!(&frames[1].pixels[..], &pixels_of(&[GREEN; 4])[..]);
    assert_eq!(decoder.global_color_table().and_then(|t| t.get(1)), Some(GREEN));
}

#[test]
fn rgba_output() {
    let config = DecodeConfig::default().with_pixel_format(PixelFormat::Rgba8);
    let (frames, _) = decode_with(&common::two_frame_gif(), config);
    assert_eq!(frames[0].format, PixelFormat::Rgba8);
    assert_eq!(frames[0].pixel(1, 0), Some([0, 255, 0, 255]));
    assert_eq!(frames[0].pixel(0, 1), Some([0, 0, 255, 255]));
    assert_eq!(frames[0].pixel(2, 0), None);
}

#[test]
fn custom_default_delay() {
    let config = DecodeConfig::default().with_default_delay(Duration::from_millis(70));
    let (frames, _) = decode_with(&common::two_frame_gif(), config);
    assert_eq!(frames[0].playback_delay, Duration::from_millis(70));
    assert_eq!(frames[1].playback_delay, Duration::from_millis(500));
}

#[test]
fn skipped_extensions_and_filler() {
    let bytes = GifBuilder::new(2, 2, Some(&PALETTE))
        .comment(b"made by hand")
        .raw(&[0x00, 0x00])
        // plain text extension
        .raw(&[0x21, 0x01, 12, 0, 0, 0, 0, 2, 0, 2, 0, 1, 1, 0, 1, 3, b'h', b'i', b'!', 0])
        // unknown application extension
        .raw(b"\x21\xFF\x0BXMP DataXMP\x04abcd\x00")
        // unknown label
        .raw(&[0x21, 0x99, 2, 7, 7, 0])
        .image(Image::new(2, 2, &[3, 3, 3, 3]))
        .trailer()
        .build();
    let (frames, error) = decode(&bytes);
    assert_eq!(error, None);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].pixel(1, 1), Some(bgra(WHITE)));
}

#[test]
fn oversized_frame_keeps_its_dimensions() {
    let indices = common::noise(6 * 3, 4, 4);
    let bytes = GifBuilder::new(2, 2, Some(&PALETTE))
        .image(Image::new(6, 3, &indices).at(1, 1))
        .trailer()
        .build();
    let (frames, error) = decode(&bytes);
    assert_eq!(error, None);
    assert_eq!((frames[0].width, frames[0].height), (6, 3));
    assert_eq!(frames[0].pixels.len(), 6 * 3 * 4);
}

// ============================================================================
// Truncation and malformed input
// ============================================================================

#[test]
fn truncated_lzw_data_keeps_later_frames() {
    let indices = common::noise(16 * 16, 4, 77);
    let full_len = common::lzw(2, &indices).len();
    let bytes = GifBuilder::new(16, 16, Some(&PALETTE))
        .image(Image::new(16, 16, &indices).keep_lzw_bytes(full_len / 2))
        .image(Image::new(2, 2, &[0, 1, 2, 3]))
        .trailer()
        .build();

    common::init_logger();
    let mut decoder = GifDecoder::new(&bytes[..]);
    let frames: Vec<Frame> = decoder.by_ref().collect();
    assert!(decoder.error().is_none());
    assert_eq!(frames.len(), 2);
    assert_eq!(decoder.truncated_frame_count(), 1);

    let cut = &frames[0];
    assert!(cut.is_truncated());
    assert_eq!(cut.pixels.len(), 16 * 16 * 4);
    assert!(cut.decoded_pixels > 0);
    match cut.ensure_complete() {
        Err(Error::TruncatedFrame { expected, decoded }) => {
            assert_eq!(expected, 256);
            assert_eq!(decoded, cut.decoded_pixels);
        }
        other => panic!("expected a truncated frame, got {other:?}"),
    }
    assert_eq!(cut.pixel(0, 0), Some(bgra(PALETTE[usize::from(indices[0])])));
    // Pixels past the decoded prefix use index 0.
    assert_eq!(cut.pixel(15, 15), Some(bgra(RED)));

    assert!(!frames[1].is_truncated());
    assert_eq!(&frames[1].pixels[..], &pixels_of(&PALETTE)[..]);
}

#[test]
fn bad_signature_yields_no_frames() {
    for bytes in [&b"\x89PNG\r\n\x1a\n\0\0\0\0\0\0"[..], b"GIF88a\x01\0\x01\0\0\0\0\x3B"] {
        let (frames, error) = decode(bytes);
        assert!(frames.is_empty());
        assert_eq!(error.as_deref(), Some("FormatError(\"not a GIF signature\")"));
    }
}

#[test]
fn empty_and_short_headers() {
    for bytes in [&b""[..], b"GIF8", b"GIF89a\x02\x00"] {
        let (frames, error) = decode(bytes);
        assert!(frames.is_empty());
        assert_eq!(error.as_deref(), Some("UnexpectedEndOfStream"));
    }

    common::init_logger();
    let mut decoder = GifDecoder::new(&b"GIF89a"[..]);
    assert!(decoder.screen_descriptor().is_none());
    assert!(matches!(decoder.error(), Some(Error::UnexpectedEndOfStream)));
    assert!(decoder.next().is_none());
}

#[test]
fn invalid_introducer_ends_sequence() {
    let bytes = GifBuilder::new(2, 2, Some(&PALETTE))
        .image(Image::new(2, 2, &[0, 1, 2, 3]))
        .raw(&[0x99])
        .image(Image::new(2, 2, &[0, 1, 2, 3]))
        .trailer()
        .build();
    let (frames, error) = decode(&bytes);
    assert_eq!(frames.len(), 1);
    assert_eq!(error.as_deref(), Some("FormatError(\"invalid block introducer\")"));
}

#[test]
fn next_frame_surfaces_the_error() {
    common::init_logger();
    let bytes = GifBuilder::new(2, 2, Some(&PALETTE))
        .image(Image::new(2, 2, &[0, 1, 2, 3]))
        .raw(&[0x42])
        .build();
    let mut decoder = GifDecoder::new(&bytes[..]);
    assert!(matches!(decoder.next_frame(), Ok(Some(_))));
    match decoder.next_frame() {
        Err(Error::FormatError(msg)) => assert_eq!(msg, "invalid block introducer"),
        other => panic!("expected a format error, got {other:?}"),
    }
    assert!(matches!(decoder.next_frame(), Ok(None)));
    assert!(decoder.error().is_none());
}

#[test]
fn missing_trailer() {
    let bytes = GifBuilder::new(2, 2, Some(&PALETTE))
        .image(Image::new(2, 2, &[0, 1, 2, 3]))
        .build();
    let (frames, error) = decode(&bytes);
    assert_eq!(frames.len(), 1);
    assert_eq!(error.as_deref(), Some("UnexpectedEndOfStream"));
}

#[test]
fn stream_cut_inside_image_data() {
    let indices = common::noise(16 * 16, 4, 5);
    let mut bytes = GifBuilder::new(16, 16, Some(&PALETTE))
        .image(Image::new(2, 2, &[0, 1, 2, 3]))
        .image(Image::new(16, 16, &indices))
        .build();
    // Drop the terminator and the last two data bytes of the second image.
    bytes.truncate(bytes.len() - 3);

    let (frames, error) = decode(&bytes);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1].pixels.len(), 16 * 16 * 4);
    assert_eq!(error.as_deref(), Some("UnexpectedEndOfStream"));
}

#[test]
fn missing_color_table() {
    let bytes = GifBuilder::new(2, 2, None)
        .image(Image::new(2, 2, &[0, 1, 2, 3]))
        .trailer()
        .build();
    let (frames, error) = decode(&bytes);
    assert!(frames.is_empty());
    assert_eq!(error.as_deref(), Some("FormatError(\"image has no color table\")"));
}

#[test]
fn invalid_min_code_size_skips_the_image() {
    let bytes = GifBuilder::new(2, 2, Some(&PALETTE))
        .raw(&[0x2C, 0, 0, 0, 0, 2, 0, 2, 0, 0])
        .raw(&[12, 2, 0xFF, 0xFF, 0])
        .image(Image::new(2, 2, &[3, 2, 1, 0]))
        .trailer()
        .build();
    let (frames, error) = decode(&bytes);
    assert_eq!(error, None);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].index, 0);
    assert_eq!(frames[0].pixel(0, 0), Some(bgra(WHITE)));
}

// ============================================================================
// Limits and cancellation
// ============================================================================

#[test]
fn frame_count_limit() {
    let config = DecodeConfig::default().with_max_animation_frames(1);
    let (frames, error) = decode_with(&common::two_frame_gif(), config);
    assert_eq!(frames.len(), 1);
    assert_eq!(
        error.as_deref(),
        Some("ResourceLimitExceeded(\"animation frame count limit exceeded\")")
    );
}

#[test]
fn peak_memory_limit() {
    let indices = common::noise(16 * 16, 4, 1);
    let bytes = GifBuilder::new(16, 16, Some(&PALETTE))
        .image(Image::new(16, 16, &indices))
        .trailer()
        .build();
    let config = DecodeConfig::default().with_peak_memory_limit(1000);
    common::init_logger();
    let mut decoder = GifDecoder::with_config(&bytes[..], config);
    assert!(decoder.next().is_none());
    match decoder.error() {
        Some(Error::ResourceLimitExceeded(msg)) => assert_eq!(*msg, "peak memory limit exceeded"),
        other => panic!("expected a limit error, got {other:?}"),
    }

    let (frames, error) = decode_with(&bytes, DecodeConfig::default().with_peak_memory_limit(2000));
    assert_eq!(error, None);
    assert_eq!(frames.len(), 1);
}

#[test]
fn megapixel_limit_checked_before_allocation() {
    // The descriptor claims 4000x4000 but carries four pixels of data.
    let bytes = GifBuilder::new(2, 2, Some(&PALETTE))
        .image(Image::new(4000, 4000, &[0, 1, 2, 3]))
        .trailer()
        .build();
    let config = DecodeConfig::default().with_total_megapixels_limit(8);
    let (frames, error) = decode_with(&bytes, config);
    assert!(frames.is_empty());
    assert_eq!(error.as_deref(), Some("ResourceLimitExceeded(\"total megapixels limit exceeded\")"));
}

#[test]
fn cancellation_before_first_block() {
    struct ImmediatelyCancelled;
    impl lazygif::Stop for ImmediatelyCancelled {
        fn check(&self) -> std::result::Result<(), lazygif::StopReason> {
            Err(lazygif::StopReason::Cancelled)
        }
    }

    common::init_logger();
    let bytes = common::two_frame_gif();
    let mut decoder = GifDecoder::with_config_and_stop(&bytes[..], DecodeConfig::default(), ImmediatelyCancelled);
    assert!(decoder.next().is_none());
    match decoder.error() {
        Some(Error::Stopped(reason)) => assert_eq!(*reason, StopReason::Cancelled),
        other => panic!("Expected cancellation, got {other:?}"),
    }
}

#[test]
fn cancellation_between_frames() {
    struct Flag(Arc<AtomicBool>);
    impl lazygif::Stop for Flag {
        fn check(&self) -> std::result::Result<(), lazygif::StopReason> {
            if self.0.load(Ordering::Relaxed) { Err(StopReason::Cancelled) } else { Ok(()) }
        }
    }

    common::init_logger();
    let cancel = Arc::new(AtomicBool::new(false));
    let bytes = common::two_frame_gif();
    let mut decoder = GifDecoder::with_config_and_stop(&bytes[..], DecodeConfig::default(), Flag(cancel.clone()));
    assert!(decoder.next().is_some());
    cancel.store(true, Ordering::Relaxed);
    assert!(decoder.next().is_none());
    assert!(matches!(decoder.error(), Some(Error::Stopped(StopReason::Cancelled))));
    assert_eq!(decoder.frame_count(), 1);
}

// ============================================================================
// Source lifetime
// ============================================================================

struct TrackedReader<'a> {
    inner: &'a [u8],
    dropped: Rc<Cell<bool>>,
}

impl Read for TrackedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Drop for TrackedReader<'_> {
    fn drop(&mut self) {
        self.dropped.set(true);
    }
}

#[test]
fn source_released_at_trailer() {
    common::init_logger();
    let bytes = common::two_frame_gif();
    let dropped = Rc::new(Cell::new(false));
    let mut decoder = GifDecoder::new(TrackedReader { inner: &bytes, dropped: dropped.clone() });
    assert_eq!(decoder.by_ref().count(), 2);
    assert!(dropped.get());
    assert!(decoder.is_finished());
}

#[test]
fn close_releases_source_early() {
    common::init_logger();
    let bytes = common::two_frame_gif();
    let dropped = Rc::new(Cell::new(false));
    let mut decoder = GifDecoder::new(TrackedReader { inner: &bytes, dropped: dropped.clone() });
    assert!(decoder.next().is_some());
    assert!(!dropped.get());
    let position = decoder.position();
    decoder.close();
    assert!(dropped.get());
    assert_eq!(decoder.position(), position);
    assert!(decoder.next().is_none());
    assert!(decoder.error().is_none());
}

// ============================================================================
// Composition
// ============================================================================

#[test]
fn composite_with_disposal() {
    let bytes = GifBuilder::new(4, 4, Some(&PALETTE))
        .control(5, None, 1)
        .image(Image::new(4, 4, &[0; 16]))
        .control(5, Some(0), 2)
        .image(Image::new(2, 2, &[1, 0, 1, 1]).at(1, 1))
        .control(5, None, 1)
        .image(Image::new(1, 1, &[2]))
        .trailer()
        .build();
    let config = DecodeConfig::default().with_composite(true);
    let (frames, error) = decode_with(&bytes, config);
    assert_eq!(error, None);
    assert_eq!(frames.len(), 3);
    for frame in &frames {
        assert_eq!((frame.width, frame.height), (4, 4));
        assert_eq!(frame.pixels.len(), 4 * 4 * 4);
    }

    let second = &frames[1];
    assert_eq!(second.region, lazygif::Region { left: 1, top: 1, width: 2, height: 2 });
    assert_eq!(second.pixel(1, 1), Some(bgra(GREEN)));
    // Transparent pixel shows the first frame underneath.
    assert_eq!(second.pixel(2, 1), Some(bgra(RED)));
    assert_eq!(second.pixel(2, 2), Some(bgra(GREEN)));
    assert_eq!(second.pixel(0, 0), Some(bgra(RED)));

    // The second frame's area was cleared before the third was drawn.
    let third = &frames[2];
    assert_eq!(third.pixel(0, 0), Some(bgra(BLUE)));
    assert_eq!(third.pixel(1, 1), Some([0, 0, 0, 0]));
    assert_eq!(third.pixel(2, 2), Some([0, 0, 0, 0]));
    assert_eq!(third.pixel(3, 3), Some(bgra(RED)));
}

#[test]
fn composite_with_off_screen_images() {
    let config = DecodeConfig::default().with_composite(true);

    let bytes = GifBuilder::new(2, 2, Some(&PALETTE))
        .image(Image::new(1, 1, &[1]).at(5, 0))
        .image(Image::new(2, 2, &[0, 1, 2, 3]))
        .trailer()
        .build();
    let (frames, error) = decode_with(&bytes, config);
    assert_eq!(error, None);
    assert_eq!(frames.len(), 2);
    assert_eq!(&frames[0].pixels[..], &[0u8; 16][..]);
    assert_eq!(&frames[1].pixels[..], &pixels_of(&PALETTE)[..]);

    // The disposal of an off-screen frame clears nothing.
    let bytes = GifBuilder::new(4, 1, Some(&PALETTE))
        .control(0, None, 1)
        .image(Image::new(4, 1, &[3, 3, 3, 3]))
        .control(0, None, 2)
        .image(Image::new(2, 1, &[0, 0]).at(9, 0))
        .control(0, None, 1)
        .image(Image::new(1, 3, &[1, 1, 1]).at(0, 4))
        .trailer()
        .build();
    let (frames, error) = decode_with(&bytes, config);
    assert_eq!(error, None);
    assert_eq!(frames.len(), 3);
    for frame in &frames {
        assert_eq!(&frame.pixels[..], &pixels_of(&[WHITE; 4])[..]);
    }
}

// ============================================================================
// Opening locations
// ============================================================================

#[test]
fn open_missing_file_is_empty() {
    common::init_logger();
    let mut decoder = GifDecoder::open("/no/such/dir/anim.gif");
    assert!(decoder.is_finished());
    assert!(decoder.next().is_none());
    match decoder.error() {
        Some(Error::SourceUnavailable(err)) => assert_eq!(err.kind(), std::io::ErrorKind::NotFound),
        other => panic!("expected an open failure, got {other:?}"),
    }
}

#[test]
fn open_remote_without_opener_is_empty() {
    common::init_logger();
    let mut decoder = GifDecoder::open("https://example.com/anim.gif");
    assert_eq!(decoder.by_ref().count(), 0);
    assert!(matches!(decoder.error(), Some(Error::SourceUnavailable(_))));
}

#[test]
fn open_file_by_path_and_uri() {
    common::init_logger();
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(&common::two_frame_gif()).expect("write");
    file.flush().expect("flush");
    let path = file.path().to_str().expect("utf-8 path").to_owned();

    let mut by_path = GifDecoder::open(&path);
    assert_eq!(by_path.by_ref().count(), 2);
    assert!(by_path.error().is_none());

    let uri = format!("file://{path}");
    assert_eq!(GifDecoder::open(&uri).count(), 2);
}

#[test]
fn custom_opener() {
    struct Memory(Vec<u8>);
    impl lazygif::SourceOpener for Memory {
        fn open(&self, location: &str) -> std::io::Result<lazygif::BoxedSource> {
            match location {
                "mem://anim" => Ok(Box::new(std::io::Cursor::new(self.0.clone()))),
                _ => Err(std::io::Error::new(std::io::ErrorKind::NotFound, "unknown")),
            }
        }
    }

    common::init_logger();
    let opener = Memory(common::two_frame_gif());
    let frames: Vec<Frame> = GifDecoder::open_with("mem://anim", &opener, DecodeConfig::default()).collect();
    assert_eq!(frames.len(), 2);

    let mut missing = GifDecoder::open_with("mem://other", &opener, DecodeConfig::default());
    assert!(missing.next().is_none());
    assert!(matches!(missing.error(), Some(Error::SourceUnavailable(_))));
}

#[test]
fn decoder_can_move_between_threads() {
    fn assert_send<T: Send>(_: &T) {}
    let decoder = GifDecoder::open("/no/such/file.gif");
    assert_send(&decoder);
    let count = std::thread::spawn(move || decoder.count()).join().unwrap();
    assert_eq!(count, 0);
}
