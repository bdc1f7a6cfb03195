//! Terminal front end for the triage chat

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use triage_client::api::HttpBackend;
use triage_client::cache::SqliteCache;
use triage_client::config::ClientConfig;
use triage_client::report::FileReportSink;
use triage_client::transcript::{Message, Role};
use triage_client::{Command, SessionController, SessionState, SessionUpdate};

const HELP: &str = "Commands: /finalize, /report, /symptoms, /clear, /help, /quit";

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Command(Command),
    ShowSymptoms,
    Help,
    Quit,
}

/// Lines are access codes until a session exists, messages afterwards
fn parse_input(line: &str, authenticated: bool) -> Input {
    match line.trim() {
        "/quit" | "/exit" => Input::Quit,
        "/help" => Input::Help,
        "/symptoms" => Input::ShowSymptoms,
        "/finalize" => Input::Command(Command::Finalize),
        "/report" => Input::Command(Command::FetchReport),
        "/clear" => Input::Command(Command::ClearTranscript),
        _ if authenticated => Input::Command(Command::Send(line.to_string())),
        _ => Input::Command(Command::SubmitCredential(line.to_string())),
    }
}

/// Tracks what has been printed of the transcript
#[derive(Default)]
struct TranscriptView {
    printed: Vec<(Role, String)>,
}

impl TranscriptView {
    /// Lines to print for `messages`. Only new entries at the end are emitted
    /// unless something changed before them, in which case the whole
    /// transcript is shown again.
    fn render(&mut self, messages: &[Message]) -> Vec<String> {
        let unchanged = messages.len() >= self.printed.len()
            && self
                .printed
                .iter()
                .zip(messages)
                .all(|((role, text), m)| *role == m.role && *text == m.text);

        let mut lines = Vec::new();
        let start = if unchanged {
            self.printed.len()
        } else {
            lines.push("--- transcript updated ---".to_string());
            0
        };
        for message in &messages[start..] {
            let who = match message.role {
                Role::User => "you",
                Role::Assistant => "assistant",
            };
            lines.push(format!("{who}: {}", message.text));
        }
        self.printed = messages
            .iter()
            .map(|m| (m.role, m.text.clone()))
            .collect();
        lines
    }

    fn show(&mut self, state: &SessionState) {
        for line in self.render(state.transcript.messages()) {
            println!("{line}");
        }
    }
}

fn prompt(state: &SessionState) -> Option<&'static str> {
    if state.session_id.is_none() {
        Some("Enter your access code:")
    } else if state.is_ended() {
        Some("Session closed. Use /report to save the report, or /quit.")
    } else {
        None
    }
}

fn print_symptoms(state: &SessionState) {
    if state.symptoms.is_empty() {
        println!("No symptoms recorded yet.");
        return;
    }
    for symptom in state.symptoms.iter() {
        let detail = |value: &Option<String>| value.clone().unwrap_or_else(|| "?".to_string());
        let pending = if symptom.is_complete() {
            ""
        } else {
            " [details pending]"
        };
        println!(
            "- {} (severity: {}, duration: {}, frequency: {}){pending}",
            symptom.name,
            detail(&symptom.severity),
            detail(&symptom.duration),
            detail(&symptom.frequency),
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout is the conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "triage_client=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = ClientConfig::from_env();

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    tracing::info!(path = %config.db_path.display(), "Opening transcript cache");
    let cache = SqliteCache::open(&config.db_path)?;

    tracing::info!(url = %config.api_url, "Using triage service");
    let backend = HttpBackend::from_config(&config)?;
    let reports =
        FileReportSink::new(&config.report_dir).with_share_command(config.share_command.clone());

    let controller =
        SessionController::restore(config.session_context(), backend, reports, cache).await;
    let mut updates = controller.subscribe();
    let mut snapshot = controller.state().clone();
    let mut view = TranscriptView::default();
    view.show(&snapshot);

    let (command_tx, command_rx) = mpsc::channel(16);
    let runner = tokio::spawn(controller.run(command_rx));

    println!("{HELP}");
    if let Some(text) = prompt(&snapshot) {
        println!("{text}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_input(&line, snapshot.session_id.is_some()) {
                    Input::Command(command) => {
                        if command_tx.send(command).await.is_err() {
                            break;
                        }
                    }
                    Input::ShowSymptoms => print_symptoms(&snapshot),
                    Input::Help => println!("{HELP}"),
                    Input::Quit => break,
                }
            }
            update = updates.recv() => match update {
                Ok(SessionUpdate::State(state)) => {
                    view.show(&state);
                    if state.is_ended() && !snapshot.is_ended() {
                        if let Some(text) = prompt(&state) {
                            println!("{text}");
                        }
                    }
                    snapshot = *state;
                }
                Ok(SessionUpdate::Notice(notice)) => println!("* {notice}"),
                Ok(SessionUpdate::Rejected { message }) => println!("! {message}"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Display fell behind session updates");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    // Closing the channel lets the controller finish outstanding requests
    drop(command_tx);
    runner.await?;
    Ok(())
}
