//! CLI tool to run a saved card photo through every preprocessing variant
//! and print what the recognizer reads from each.
//! Usage: cargo run -p card-vision --features cli --bin scan_frame -- <photo.png> [output_dir] [--full]

use card_capture::regions;
use card_vision::{
    prepare_region, preprocess, Enhancement, PreprocessSettings, TesseractRecognizer,
    TesseractSettings, TextRecognizer,
};
use std::path::PathBuf;

fn main() {
    // Initialize tracing for debug output
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let positional: Vec<&String> = args.iter().skip(1).filter(|a| !a.starts_with("--")).collect();
    let full_frame = args.iter().any(|a| a == "--full");

    if positional.is_empty() {
        eprintln!("Usage: {} <photo.png> [output_dir] [--full]", args[0]);
        std::process::exit(1);
    }

    let input_path = PathBuf::from(positional[0]);
    let output_dir = positional
        .get(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./debug_output"));
    let _ = std::fs::create_dir_all(&output_dir);

    println!("Loading image: {}", input_path.display());
    let img = match image::open(&input_path) {
        Ok(img) => img.to_rgba8(),
        Err(e) => {
            eprintln!("Failed to open image: {}", e);
            std::process::exit(1);
        }
    };
    let (w, h) = (img.width(), img.height());
    println!("Image size: {}x{}", w, h);

    let roi = if full_frame {
        regions::full_frame()
    } else {
        regions::text_band()
    };
    println!(
        "Region: x={:.0} y={:.0} w={:.0} h={:.0}",
        roi.x * w as f64,
        roi.y * h as f64,
        roi.width * w as f64,
        roi.height * h as f64,
    );

    let settings = PreprocessSettings::default();
    let Some(region) = prepare_region(&img, &roi, settings.target_width) else {
        println!("Region is empty");
        return;
    };
    let _ = region.save(output_dir.join("region.png"));

    let recognizer = TesseractRecognizer::new(TesseractSettings::default());
    if !recognizer.is_available() {
        println!("Tesseract not available! Install it and make sure it is on PATH");
    }

    println!("\n=== Recognition ===");
    for variant in Enhancement::CYCLE {
        let processed = preprocess(&region, variant, &settings);
        let file_name = format!("{:?}.png", variant).to_lowercase();
        let _ = processed.save(output_dir.join(&file_name));

        if recognizer.is_available() {
            match recognizer.recognize(&processed) {
                Ok(text) => println!("{:?}: {:?}", variant, text),
                Err(e) => println!("{:?}: error: {}", variant, e),
            }
        }
    }

    println!("\nDebug images saved to: {}", output_dir.display());
}
