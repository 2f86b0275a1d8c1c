mod app;
mod cli;
mod ui;

use anyhow::{Context, Result};
use app::{poll_event, run_speed_test, App, AppAction, AppMessage};
use clap::Parser;
use cli::Args;
use crossterm::event::Event;
use internetometer::output::Report;
use internetometer::provider::YandexClient;
use internetometer::settings::Settings;
use internetometer::speedtest::{Direction, EventSink, RateMeter, SpeedTest, TestPhase, TestUpdate};
use ratatui::DefaultTerminal;
use std::io::Write;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use ui::draw_ui;

const MAX_UPDATES_PER_FRAME: usize = 1024;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.wants_tui() {
        let mut terminal = ratatui::init();
        terminal.clear()?;

        let result = run_app(&mut terminal, args.settings()).await;

        ratatui::restore();
        return result;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    run_cli(args).await
}

async fn run_cli(args: Args) -> Result<()> {
    let settings = args.settings();
    let client = YandexClient::new(settings.clone()).context("failed to build HTTP client")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let mut report = Report::default();
    if args.wants_info() {
        let info = client
            .connection_info(&cancel)
            .await
            .context("connection lookup interrupted")?;
        report = report.with_connection(&info);
    }
    if args.all {
        report = report.with_system();
    }

    let mut speed_error = None;
    if args.wants_speed() {
        if !args.quiet() {
            eprintln!("Running speed test...");
        }

        let (sink, update_rx) = EventSink::channel(256);
        let printer = (!args.quiet()).then(|| tokio::spawn(print_progress(update_rx)));

        let test = SpeedTest::new(client.clone(), client.http().clone(), settings, sink);
        match test.run(&cancel).await {
            Ok(result) => report = report.with_speed(&result),
            Err(err) => speed_error = Some(err),
        }
        drop(test);

        if let Some(printer) = printer {
            let _ = printer.await;
        }
    }

    if args.prometheus {
        print!("{}", report.render_prometheus());
    } else {
        if args.json {
            println!("{}", report.to_json()?);
        } else {
            print!("{}", report.render_text());
        }

        if let Some(path) = &args.save {
            if let Err(err) = report.append_jsonl(path) {
                eprintln!("Failed to save results to {}: {err}", path.display());
            }
        }
    }

    match speed_error {
        Some(err) => Err(err).context("speed test failed"),
        None => Ok(()),
    }
}

/// Live `Download: 93.12 Mbps` line on stderr, redrawn in place.
async fn print_progress(mut update_rx: mpsc::Receiver<TestUpdate>) {
    let mut meter = RateMeter::new();
    let mut direction = Direction::Download;
    let mut stderr = std::io::stderr();

    while let Some(update) = update_rx.recv().await {
        match update {
            TestUpdate::PhaseStarted(TestPhase::Download) => {
                meter.reset();
                direction = Direction::Download;
            }
            TestUpdate::PhaseStarted(TestPhase::Upload) => {
                meter.reset();
                direction = Direction::Upload;
            }
            TestUpdate::Progress(sample) if sample.direction == direction => {
                if let Some(mbps) = meter.record(sample.bytes_total, Instant::now()) {
                    let _ = write!(stderr, "\r{:<8}: {mbps:.2} Mbps   ", direction.label());
                    let _ = stderr.flush();
                }
            }
            _ => {}
        }
    }

    let _ = write!(stderr, "\r{:30}\r", "");
    let _ = stderr.flush();
}

async fn run_app(terminal: &mut DefaultTerminal, settings: Settings) -> Result<()> {
    let mut app = App::new(settings);
    let mut update_rx: Option<mpsc::Receiver<TestUpdate>> = None;
    let mut message_rx: Option<mpsc::Receiver<AppMessage>> = None;

    loop {
        terminal.draw(|frame| draw_ui(frame, &app))?;

        // Handle test updates
        if let Some(rx) = update_rx.as_mut() {
            for _ in 0..MAX_UPDATES_PER_FRAME {
                match rx.try_recv() {
                    Ok(update) => app.apply_update(update),
                    Err(_) => break,
                }
            }
        }

        if let Some(rx) = message_rx.as_mut() {
            match rx.try_recv() {
                Ok(message) => app.apply_message(message),
                Err(mpsc::error::TryRecvError::Empty) => {}
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    if app.is_running() {
                        app.complete_test();
                    }
                    message_rx = None;
                }
            }
        }

        // Handle input
        if let Some(Event::Key(key)) = poll_event(Duration::from_millis(30))? {
            if let Some(action) = app.handle_key_event(key) {
                match action {
                    AppAction::Quit => {
                        app.cancel_test();
                        break;
                    }
                    AppAction::StartTest => {
                        app.reset_for_new_test();
                        app.phase = TestPhase::Ping;

                        let (sink, rx) = EventSink::channel(1024);
                        let (message_tx, mrx) = mpsc::channel(4);
                        let cancel = CancellationToken::new();

                        app.set_cancel(cancel.clone());
                        update_rx = Some(rx);
                        message_rx = Some(mrx);

                        let settings = app.settings.clone();
                        tokio::spawn(async move {
                            let _ = run_speed_test(settings, sink, message_tx, cancel).await;
                        });
                    }
                    AppAction::CancelTest => {
                        app.cancel_test();
                        update_rx = None;
                        message_rx = None;
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
