#![no_main]

use libfuzzer_sys::fuzz_target;
use lazygif::{DecodeConfig, GifDecoder, PixelFormat};

fuzz_target!(|data: &[u8]| {
    let format = if data.first().is_some_and(|b| b & 1 == 1) { PixelFormat::Rgba8 } else { PixelFormat::Bgra8 };
    let composite = data.get(1).is_some_and(|b| b & 1 == 1);
    let config = DecodeConfig::default()
        .with_peak_memory_limit(256 * 1024 * 1024)
        .with_pixel_format(format)
        .with_composite(composite);

    let mut decoder = GifDecoder::with_config(data, config);
    let _ = decoder.screen_descriptor();
    for frame in &mut decoder {
        assert_eq!(frame.pixels.len(), usize::from(frame.width) * usize::from(frame.height) * 4);
        assert!(frame.decoded_pixels <= frame.region.area());
    }
    let _ = decoder.error();
});
