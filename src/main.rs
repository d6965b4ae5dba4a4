//! Interview Voice - Main Entry Point
//!
//! Interactive CLI: record an answer, optionally attach an image, send the
//! turn to the backend and play the interviewer's reply.

use anyhow::Result;
use std::env;
use std::io::{self, Write};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use interview_voice::business::TurnOrchestrator;
use interview_voice::chat::{ChatMessage, PendingImage, Role};
use interview_voice::{AppConfig, HttpTurnClient, MicCapture, SpeakerPlayback};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let debug = args.iter().any(|a| a == "--debug" || a == "-d");

    init_logging(debug);

    info!("Starting Interview Voice v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load_or_default()?;
    info!("Configuration loaded, backend: {}", config.server.base_url);

    let client = HttpTurnClient::new(&config.server)?;
    let capture = MicCapture::new(
        config.audio.sample_rate,
        config.server.stop_flush_timeout(),
    );
    let playback = SpeakerPlayback::new();

    let mut orchestrator = TurnOrchestrator::new(client, capture, playback);

    println!("Interview Voice — mock interview practice");
    println!("  [r] start recording an answer");
    println!("  [s] stop and send");
    println!("  [i <path>] attach an image");
    println!("  [x] clear the attachment");
    println!("  [h] show the conversation");
    println!("  [q] quit");
    println!();

    loop {
        print!(">>> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let cmd = input.trim();

        match cmd {
            "r" | "record" => match orchestrator.start_recording() {
                Ok(()) => println!("recording... press [s] when done"),
                Err(e) => {
                    warn!("could not start recording: {e}");
                    println!("microphone unavailable: {e}");
                }
            },
            "s" | "send" => {
                println!("processing...");
                let before = orchestrator.history().len();
                match orchestrator.finish_recording().await {
                    Ok(()) => print_new_messages(orchestrator.history().messages(), before),
                    Err(e) => {
                        warn!("turn aborted: {e}");
                        println!("could not finish the take: {e}");
                    }
                }
            }
            "x" | "clear" => match orchestrator.clear_image() {
                Ok(()) => println!("attachment cleared"),
                Err(e) => println!("{e}"),
            },
            "h" | "history" => {
                if orchestrator.history().is_empty() {
                    println!("(no turns yet)");
                }
                for message in orchestrator.history().messages() {
                    print_message(message.role, &message.text, message.image.as_deref());
                }
            }
            "q" | "quit" | "exit" => {
                info!("user requested exit");
                break;
            }
            "" => {}
            other => {
                if let Some(path) = other.strip_prefix("i ") {
                    match PendingImage::from_file(path.trim()) {
                        Ok(image) => match orchestrator.select_image(image) {
                            Ok(()) => println!("attached: {}", path.trim()),
                            Err(e) => println!("{e}"),
                        },
                        Err(e) => println!("could not load image: {e}"),
                    }
                } else {
                    println!("unknown command: {other} (try r/s/i/x/h/q)");
                }
            }
        }
    }

    // Any in-flight bookkeeping is discarded on the way out.
    orchestrator.reset();
    Ok(())
}

fn print_new_messages(messages: &[ChatMessage], since: usize) {
    for message in &messages[since..] {
        print_message(message.role, &message.text, message.image.as_deref());
    }
}

fn print_message(role: Role, text: &str, image: Option<&str>) {
    let speaker = match role {
        Role::User => "you",
        Role::Ai => "interviewer",
    };
    match image {
        Some(image) => println!("[{speaker}] {text} (📎 {image})"),
        None => println!("[{speaker}] {text}"),
    }
}

fn init_logging(debug: bool) {
    let level = if debug {
        "interview_voice=debug"
    } else {
        "interview_voice=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
