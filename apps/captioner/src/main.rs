mod command;
mod config;

use ai::ModelStatus;
use caption_pipeline::{
    model_status_text, moondream_caption_model, CaptionSession, DisplayItem, SessionError,
    WorkerEvent,
};
use command::{expand_selection, Command, HELP};
use config::CaptionerConfig;
use std::io::Write;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};

fn print_item(item: Option<DisplayItem>) {
    match item {
        Some(item) => {
            println!("[{}/{}] {}", item.index + 1, item.total, item.image);
            println!("{}", item.caption_text());
        }
        None => println!("No images selected"),
    }
}

fn print_event(event: WorkerEvent) {
    match event {
        WorkerEvent::Progress {
            processed, total, ..
        } => println!("{}/{} Images Processed", processed, total),
        WorkerEvent::Completed { failed, .. } if failed > 0 => {
            println!("Captioning finished, {} images failed", failed)
        }
        WorkerEvent::Completed { .. } => println!("Captioning finished"),
        WorkerEvent::ModelUnavailable { reason, .. } => {
            println!("Captioning aborted: {}", reason)
        }
        WorkerEvent::Started { .. } | WorkerEvent::Cancelled { .. } => {}
    }
}

/// Returns false when the loop should stop.
async fn handle(session: &mut CaptionSession, command: Command) -> bool {
    match command {
        Command::Select(paths) => {
            let images = match expand_selection(&paths) {
                Ok(images) => images,
                Err(e) => {
                    println!("Failed to read selection: {}", e);
                    return true;
                }
            };
            match session.select(images) {
                Ok(_) => {
                    println!("{}", session.status_text());
                    print_item(session.current());
                }
                Err(SessionError::EmptySelection) => println!("No images found"),
                Err(e) => println!("{}", e),
            }
        }
        Command::Next => print_item(session.next_image()),
        Command::Prev => print_item(session.prev_image()),
        Command::Show => print_item(session.current()),
        Command::Export => match session.export().await {
            Ok(report) => {
                println!("Exported {} captions", report.written.len());
                for failure in report.failed {
                    println!("Failed to write {}: {}", failure.path.display(), failure.error);
                }
            }
            Err(e) => println!("Cannot export yet: {}", e),
        },
        Command::Device(name) => match session.set_device(&name).await {
            Ok(device) => println!("Model now runs on {}", device),
            Err(e) => println!("{}", e),
        },
        Command::Status => {
            match session.model_status() {
                ModelStatus::Ready(device) => {
                    println!("{} ({})", session.model_status_text(), device)
                }
                _ => println!("{}", session.model_status_text()),
            }
            println!("{} [{}]", session.status_text(), session.progress().state);
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => return false,
    }
    true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app_tracing::load_dotenv();
    let config = CaptionerConfig::from_env()?;
    // should be after load_dotenv() so RUST_LOG in .env file will be loaded
    match &config.log_dir {
        Some(log_dir) => app_tracing::init_tracing_to_file(log_dir),
        None => app_tracing::init_tracing_to_stdout(),
    }
    tracing::info!("starting captioner with {:?}", config);

    let model = moondream_caption_model(config.moondream(), config.device)?;

    let (tx, mut rx) = mpsc::channel(512);
    let mut session = CaptionSession::new(model).with_notifier(Some(tx));

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(event);
        }
    });

    {
        let mut status = session.subscribe_model_status();
        tokio::spawn(async move {
            if let Ok(status) = status
                .wait_for(|v| !matches!(v, ModelStatus::Loading))
                .await
            {
                println!("{}", model_status_text(&status));
            }
        });
    }

    println!("{}", session.model_status_text());
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match Command::parse(&line) {
            Ok(Some(command)) => {
                if !handle(&mut session, command).await {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => println!("{}", e),
        }
    }

    session.cancel();
    Ok(())
}
