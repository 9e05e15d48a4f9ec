//! Travel Guardian - terminal client
//!
//! Line-oriented front end for a planning session. Logs go to stderr so the
//! conversation on stdout stays readable.

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use travel_guardian::{
    ClientConfig, Credentials, Database, HttpAuthApi, KeyValueStore, MemoryStore, Role,
    TripSession, TripState, WsConnector,
};

/// One line of user input
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Send(String),
    NewTrip,
    Clear,
    Login { email: String, password: String },
    Logout,
    Panel,
    Quit,
    Help,
    Empty,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }
    if !line.starts_with('/') {
        return Ok(Command::Send(line.to_string()));
    }

    let mut parts = line.split_whitespace();
    match parts.next().unwrap_or_default() {
        "/new" => Ok(Command::NewTrip),
        "/clear" => Ok(Command::Clear),
        "/login" => match (parts.next(), parts.next()) {
            (Some(email), Some(password)) => Ok(Command::Login {
                email: email.to_string(),
                password: password.to_string(),
            }),
            _ => Err("usage: /login <email> <password>".to_string()),
        },
        "/logout" => Ok(Command::Logout),
        "/panel" => Ok(Command::Panel),
        "/quit" | "/exit" => Ok(Command::Quit),
        "/help" => Ok(Command::Help),
        other => Err(format!("unknown command {other}, try /help")),
    }
}

const HELP: &str = "\
/new                       start a new trip
/clear                     clear the conversation, same trip session
/login <email> <password>  sign in
/logout                    sign out
/panel                     show the planning panel
/quit                      exit
anything else is sent to the planner";

/// Prints what changed between two snapshots
#[derive(Default)]
struct Renderer {
    session_id: String,
    shown_messages: usize,
    shown_flights: usize,
    shown_warnings: usize,
    shown_plan: bool,
    typing: bool,
}

impl Renderer {
    fn render(&mut self, state: &TripState) {
        if state.session_id != self.session_id {
            *self = Renderer {
                session_id: state.session_id.clone(),
                ..Renderer::default()
            };
            println!("-- trip {} --", state.session_id);
        }

        for message in state.messages.iter().skip(self.shown_messages) {
            match message.role {
                Role::User => println!("you> {}", message.content),
                Role::Assistant => println!("guardian> {}\n", message.content),
            }
        }
        self.shown_messages = state.messages.len();

        if state.is_typing && !self.typing {
            println!("guardian is typing...");
        }
        self.typing = state.is_typing;

        let artifacts = &state.artifacts;
        if artifacts.ranked_flights.len() != self.shown_flights && !artifacts.ranked_flights.is_empty() {
            println!("flights:");
            for flight in &artifacts.ranked_flights {
                println!("  {}", flight.label());
            }
        }
        self.shown_flights = artifacts.ranked_flights.len();

        if artifacts.risk_warnings.len() != self.shown_warnings {
            for warning in artifacts.critical_warnings() {
                println!("  !! {}", warning.message);
            }
        }
        self.shown_warnings = artifacts.risk_warnings.len();

        if artifacts.trip_plan.is_some() && !self.shown_plan {
            if let Some(plan) = &artifacts.trip_plan {
                println!(
                    "plan: {} -> {}, {} hotels, {} days",
                    plan.source.as_deref().unwrap_or("?"),
                    plan.destination.as_deref().unwrap_or("?"),
                    artifacts.recommended_hotels.len(),
                    artifacts.itinerary.as_ref().map_or(0, |i| i.days.len()),
                );
            }
        }
        self.shown_plan = artifacts.trip_plan.is_some();
    }
}

fn open_state(config: &ClientConfig) -> Arc<dyn KeyValueStore> {
    match Database::open(&config.state_path) {
        Ok(db) => {
            tracing::info!(path = %config.state_path.display(), "Opened client state");
            Arc::new(db)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not open client state, continuing without persistence");
            Arc::new(MemoryStore::new())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "travel_guardian=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ClientConfig::from_env();
    tracing::info!(ws_url = %config.ws_url, api_url = %config.api_url, "Starting");

    let kv = open_state(&config);
    let auth = Arc::new(HttpAuthApi::new(config.api_url.clone())?);
    let mut session = TripSession::new(&config, kv, Arc::new(WsConnector), auth);

    // Arguments, if any, form the opening message
    let initial = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if !initial.trim().is_empty() {
        session.queue_initial_message(initial.trim());
    }

    let mut snapshots = WatchStream::new(session.subscribe());
    let mut renderer = Renderer::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    session.init();
    println!("Type a message, or /help");

    loop {
        tokio::select! {
            () = session.next_event() => {}
            Some(state) = snapshots.next() => renderer.render(&state),
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let command = match parse_command(&line) {
                    Ok(command) => command,
                    Err(usage) => {
                        println!("{usage}");
                        continue;
                    }
                };
                match command {
                    Command::Send(text) => {
                        if let Err(e) = session.handle_send(&text) {
                            println!("not sent: {e}");
                        }
                    }
                    Command::NewTrip => {
                        session.new_trip().await;
                    }
                    Command::Login { email, password } => {
                        match session.login(&Credentials::new(email, password)).await {
                            Ok(user) => println!("signed in as {}", user.username),
                            Err(e) => println!("login failed: {e}"),
                        }
                    }
                    Command::Clear => session.clear_messages(),
                    Command::Logout => {
                        session.logout();
                        println!("signed out");
                    }
                    Command::Panel => session.set_panel_visible(true),
                    Command::Help => println!("{HELP}"),
                    Command::Quit => break,
                    Command::Empty => {}
                }
            }
        }
    }

    session.dispose().await;
    Ok(())
}
