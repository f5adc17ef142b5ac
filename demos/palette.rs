//! Build a 256-colour palette for the first frame of a GIF
use lazygif::{GifDecoder, NeuQuant};
use std::env;

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <gif-file> [sample-factor]", args[0]);
        std::process::exit(1);
    }

    let sample_factor = match args.get(2).map(|s| s.parse::<u32>()) {
        None => 10,
        Some(Ok(n)) => n,
        Some(Err(e)) => {
            eprintln!("Bad sample factor: {}", e);
            std::process::exit(1);
        }
    };

    let mut decoder = GifDecoder::open(&args[1]);
    let Some(frame) = decoder.next() else {
        eprintln!("No frame: {}", decoder.error().map(|e| e.to_string()).unwrap_or_default());
        std::process::exit(1);
    };

    // BGRA to packed RGB
    let rgb: Vec<u8> = frame.pixels.chunks_exact(4).flat_map(|px| [px[2], px[1], px[0]]).collect();
    let quant = match NeuQuant::new(sample_factor, &rgb) {
        Ok(q) => q,
        Err(e) => {
            eprintln!("Quantization failed: {}", e);
            std::process::exit(1);
        }
    };

    let indices = quant.map_pixels(&rgb).expect("Failed to map pixels");
    let mut used = [false; 256];
    let mut error = 0u64;
    for (px, &i) in rgb.chunks_exact(3).zip(indices.iter()) {
        used[usize::from(i)] = true;
        let entry = quant.lookup(i);
        error += px.iter().zip(&entry).map(|(&a, &b)| u64::from(a.abs_diff(b))).sum::<u64>();
    }

    for (i, rgb) in quant.color_map().chunks_exact(3).enumerate() {
        println!("{:3}: #{:02x}{:02x}{:02x}{}", i, rgb[0], rgb[1], rgb[2], if used[i] { "" } else { " (unused)" });
    }
    let pixels = indices.len().max(1) as f64;
    println!("\n{}x{}, mean L1 error {:.2}", frame.width, frame.height, error as f64 / pixels);
}
