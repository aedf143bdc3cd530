pub mod preprocess;
pub mod recognizer;

pub use preprocess::{prepare_region, preprocess, Enhancement, PreprocessSettings};
pub use recognizer::{TesseractRecognizer, TesseractSettings, TextRecognizer};
