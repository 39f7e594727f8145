use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::error;

use kobold_captioner::{
    logging, CaptionProcessor, CaptionWorker, ClipboardSink, Coordinator, FormInputs,
    ImageProcessor, InstructTemplate, KoboldClient, NoClipboard, RunEvent, RunState,
    SystemClipboard, INSTRUCTION_STYLES,
};

#[derive(Parser)]
#[command(name = "kobold-captioner")]
#[command(about = "Caption images with a KoboldCpp vision model, one .txt per image")]
#[command(version)]
struct Cli {
    /// KoboldCpp server address
    #[arg(long, env = "KOBOLD_SERVER", default_value = "http://localhost:5001")]
    server: String,

    /// System instruction
    #[arg(long, env = "KOBOLD_SYSTEM", default_value = "You are a helpful image captioner.")]
    system: String,

    /// Index into the captioning styles (see --list-styles)
    #[arg(long, default_value_t = 0)]
    style: usize,

    /// Free-form instruction; overrides --style
    #[arg(long)]
    instruction: Option<String>,

    /// Maximum tokens per caption; non-numeric values fall back to 256
    #[arg(long, default_value = "256")]
    max_length: String,

    /// Longest image side sent to the model, in pixels
    #[arg(long, default_value_t = 384)]
    max_dimension: u32,

    /// Instruct template: auto, chatml, llama3, alpaca or mistral
    #[arg(long, default_value = "auto")]
    template: String,

    /// Timeout for a single generate request, in seconds
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,

    /// Do not copy captions to the clipboard. On X11/Wayland copied text is
    /// lost when the program exits unless a clipboard manager is running
    #[arg(long)]
    no_clipboard: bool,

    /// Linux: after the run, keep serving the last caption until another
    /// application replaces the clipboard contents
    #[arg(long, conflicts_with = "no_clipboard")]
    hold_clipboard: bool,

    /// Print every run event as a JSON line on stdout
    #[arg(long)]
    json_events: bool,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// List the captioning styles and exit
    #[arg(long)]
    list_styles: bool,

    /// Images to caption
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_json);

    if cli.list_styles {
        for (i, style) in INSTRUCTION_STYLES.iter().enumerate() {
            println!("{:>2}  {}", i, style);
        }
        return Ok(());
    }

    let inputs = form_inputs(&cli)?;
    let state = if cli.no_clipboard {
        run(Coordinator::new(inputs, NoClipboard), &cli).await?
    } else {
        let clipboard = SystemClipboard::new().hold_on_release(cli.hold_clipboard);
        run(Coordinator::new(inputs, clipboard), &cli).await?
    };

    if state == RunState::Failed {
        std::process::exit(1);
    }
    Ok(())
}

fn form_inputs(cli: &Cli) -> Result<FormInputs> {
    let instruction = match cli.instruction {
        Some(ref text) => text.clone(),
        None => match INSTRUCTION_STYLES.get(cli.style) {
            Some(style) => style.to_string(),
            None => bail!(
                "style {} out of range (0-{})",
                cli.style,
                INSTRUCTION_STYLES.len() - 1
            ),
        },
    };

    let template = match cli.template.trim().to_lowercase().as_str() {
        "auto" => None,
        other => Some(
            other
                .parse::<InstructTemplate>()
                .map_err(anyhow::Error::msg)?,
        ),
    };

    Ok(FormInputs {
        server: cli.server.clone(),
        system_instruction: cli.system.clone(),
        instruction,
        max_length: cli.max_length.clone(),
        max_dimension: cli.max_dimension,
        template,
        timeout: Duration::from_secs(cli.timeout_secs),
    })
}

async fn run<C: ClipboardSink>(mut coordinator: Coordinator<C>, cli: &Cli) -> Result<RunState> {
    coordinator.select_files(cli.files.as_slice());
    println!("{}", coordinator.files_label());

    let (config, files) = coordinator.begin_run().context("cannot start run")?;

    let client = match KoboldClient::new(&config) {
        Ok(c) => c,
        Err(e) => {
            coordinator.abort_run(&e);
            return Err(e).context("cannot create KoboldCpp client");
        }
    };
    let preprocessor = ImageProcessor::new(config.max_dimension);
    let processor = CaptionProcessor::new(client, preprocessor, config);
    let worker = CaptionWorker::new(processor, files)?;

    let json_events = cli.json_events;
    let state = coordinator
        .drive(worker.spawn(), |_, event| render(event, json_events))
        .await?;

    println!("{}", coordinator.files_label());
    if state == RunState::Completed {
        if cli.hold_clipboard {
            println!("Holding the last caption on the clipboard until it is replaced");
        }
        tokio::task::block_in_place(|| coordinator.release_clipboard());
    }
    Ok(state)
}

fn render(event: &RunEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => error!(error = %e, "failed to serialize event"),
        }
        return;
    }

    match event {
        RunEvent::Progress(p) => {
            print!("\r[{:>3}%] {}/{}", p.percent(), p.completed, p.total);
            let _ = std::io::stdout().flush();
        }
        RunEvent::ResultReady { path, text } => {
            println!("\n{}:\n{}\n", path.display(), text);
        }
        RunEvent::Completed(summary) => {
            println!(
                "\nProcessing completed in {:.2} seconds ({} captions saved)",
                summary.elapsed_ms as f64 / 1000.0,
                summary.captions_written
            );
        }
        RunEvent::Failed { path, error } => {
            eprintln!("\nFailed on {}: {}", path.display(), error);
        }
    }
}
