//! Inspect the frames of a GIF file
use lazygif::{DecodeConfig, GifDecoder};
use std::env;
use std::time::Duration;

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <gif-file-or-uri> [--composite]", args[0]);
        std::process::exit(1);
    }

    let location = &args[1];
    let composite = args.iter().any(|a| a == "--composite");
    let config = DecodeConfig::default().with_composite(composite);
    let mut decoder = GifDecoder::open_with(location, &lazygif::FileOpener, config);

    match decoder.screen_descriptor() {
        Some(screen) => {
            println!("File: {}", location);
            println!("Version: {:?}", screen.version);
            println!("Logical screen: {}x{}", screen.width, screen.height);
            println!("Background index: {}", screen.background_color_index);
        }
        None => {
            eprintln!("Not readable: {}", decoder.error().map(|e| e.to_string()).unwrap_or_default());
            std::process::exit(1);
        }
    }
    if let Some(table) = decoder.global_color_table() {
        println!("Global color table: {} entries", table.len());
    }

    let mut total = Duration::ZERO;
    let mut shown = 0;
    for frame in &mut decoder {
        total += frame.playback_delay;
        if shown < 10 {
            println!(
                "  Frame {}: {}x{} at {},{} delay {} cs, {:?}{}{}",
                frame.index,
                frame.region.width,
                frame.region.height,
                frame.region.left,
                frame.region.top,
                frame.delay,
                frame.disposal,
                if frame.interlaced { ", interlaced" } else { "" },
                if frame.is_truncated() { ", TRUNCATED" } else { "" },
            );
            shown += 1;
        }
    }

    if decoder.frame_count() > 10 {
        println!("  ... ({} more frames)", decoder.frame_count() - 10);
    }
    match decoder.loop_count() {
        Some(0) => println!("\nLoops forever"),
        Some(n) => println!("\nLoops {} times", n),
        None => println!("\nPlays once"),
    }
    println!("Frames: {} ({} truncated)", decoder.frame_count(), decoder.truncated_frame_count());
    println!("Total duration: {:.2} seconds", total.as_secs_f64());
    println!("Bytes read: {}", decoder.position());

    if let Some(e) = decoder.error() {
        eprintln!("Decoding stopped early: {}", e);
        std::process::exit(2);
    }
}
