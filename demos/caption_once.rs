use kobold_captioner::{CaptionProcessor, ImageProcessor, JobConfig, KoboldClient};
use std::path::Path;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let image_path = std::env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: caption_once <image_path> [server]");
        std::process::exit(1);
    });

    let server = std::env::args()
        .nth(2)
        .unwrap_or("http://localhost:5001".to_string());

    kobold_captioner::logging::init("info", false);

    let config = JobConfig::builder().server(&server).style(1).build();
    let client = KoboldClient::new(&config)?;
    let processor = CaptionProcessor::new(client, ImageProcessor::new(config.max_dimension), config);

    println!("Captioning {} via {}...", image_path, server);

    let (text, output_path) = processor.process(Path::new(&image_path)).await?;
    match text {
        Some(text) => {
            println!("{}", text);
            if processor.persist(&text, &output_path) {
                println!(
                    "Saved to {}",
                    kobold_captioner::text_output_path(&output_path).display()
                );
            }
        }
        None => println!("The model returned no text."),
    }

    Ok(())
}
