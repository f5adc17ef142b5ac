#![no_main]

use std::sync::atomic::{AtomicU32, Ordering};

use enough::{Stop, StopReason};
use libfuzzer_sys::fuzz_target;
use lazygif::{DecodeConfig, Error, GifDecoder};

/// Stops after a fixed number of block checks.
struct Budget(AtomicU32);

impl Stop for Budget {
    fn check(&self) -> Result<(), StopReason> {
        self.0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |left| left.checked_sub(1))
            .map(drop)
            .map_err(|_| StopReason::Cancelled)
    }
}

fuzz_target!(|data: &[u8]| {
    let Some((&budget, data)) = data.split_first() else {
        return;
    };
    let config = DecodeConfig::default()
        .with_peak_memory_limit(4 * 1024 * 1024)
        .with_total_megapixels_limit(1)
        .with_max_animation_frames(8);

    let mut decoder = GifDecoder::with_config_and_stop(data, config, Budget(AtomicU32::new(u32::from(budget))));
    loop {
        match decoder.next_frame() {
            Ok(Some(frame)) => assert!(frame.index < 8),
            Ok(None) => break,
            Err(Error::Stopped(_)) => {
                assert!(decoder.is_finished());
                break;
            }
            Err(_) => break,
        }
    }
    assert!(matches!(decoder.next_frame(), Ok(None)));
});
