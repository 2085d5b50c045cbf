//! live-match binary entrypoint: follows one game in the terminal and accepts
//! moves and actions on stdin.

use std::{env, sync::Arc};

use anyhow::{Context, anyhow};
use live_match::{
    api::{CredentialSource, HttpAuthority, StaticCredentials, TerminalAction},
    config::ClientConfig,
    error::parse_game_id,
    rules::{BitboardEngine, EndState, Square},
    services::{SessionCommand, SessionHandle},
    state::{GameEnded, MatchView},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast, watch},
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable consulted when no game id is passed as an argument.
const GAME_ID_ENV: &str = "LIVE_MATCH_GAME_ID";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ClientConfig::load();
    let raw_id = env::args().nth(1).or_else(|| env::var(GAME_ID_ENV).ok());
    let game_id = parse_game_id(raw_id.as_deref()).context("resolving game id")?;

    let credentials = Arc::new(StaticCredentials::from_env());
    let local_user = credentials.user_id();
    if local_user.is_none() {
        info!("no local identity configured; watching as a spectator");
    }
    let authority = HttpAuthority::new(&config.api_base, config.request_timeout, credentials)
        .context("building authority client")?;

    let handle = SessionHandle::spawn(
        &config,
        game_id,
        local_user,
        Arc::new(authority),
        Box::new(BitboardEngine::new()),
    );
    tokio::spawn(print_views(handle.view()));
    tokio::spawn(announce_endings(handle.subscribe()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => match line.context("reading stdin")? {
                Some(line) => match parse_command(&line) {
                    Ok(Some(SessionCommand::Shutdown)) => break,
                    Ok(Some(command)) => handle.send(command).await.context("sending command")?,
                    Ok(None) => {}
                    Err(err) => eprintln!("{err}"),
                },
                None => break,
            },
        }
    }

    handle.shutdown().await;
    Ok(())
}

/// Map one stdin line onto a session command.
///
/// `e2` clicks a square, `e2e4` or `e2 e4` plays a move, and `resign`,
/// `offer`, `accept`, `decline` and `quit` do what they say.
fn parse_command(line: &str) -> anyhow::Result<Option<SessionCommand>> {
    let words: Vec<String> = line
        .split_whitespace()
        .map(str::to_ascii_lowercase)
        .collect();
    let words: Vec<&str> = words.iter().map(String::as_str).collect();

    let command = match words.as_slice() {
        [] => return Ok(None),
        ["quit"] | ["exit"] => SessionCommand::Shutdown,
        ["resign"] => SessionCommand::Action(TerminalAction::Resign),
        ["offer"] | ["draw", "offer"] => SessionCommand::Action(TerminalAction::OfferDraw),
        ["accept"] | ["draw", "accept"] => SessionCommand::Action(TerminalAction::AcceptDraw),
        ["decline"] | ["draw", "decline"] => SessionCommand::Action(TerminalAction::DeclineDraw),
        [from, to] => SessionCommand::Move {
            from: from.parse()?,
            to: to.parse()?,
        },
        [word] if word.len() == 4 && word.is_ascii() => SessionCommand::Move {
            from: word[..2].parse()?,
            to: word[2..].parse()?,
        },
        [word] => SessionCommand::Click(word.parse::<Square>()?),
        _ => return Err(anyhow!("unknown command `{}`", line.trim())),
    };
    Ok(Some(command))
}

/// Print the board and status whenever they change.
async fn print_views(mut views: watch::Receiver<MatchView>) {
    let mut last_board = String::new();
    let mut last_status = String::new();

    loop {
        {
            let view = views.borrow_and_update();
            let board = view.board_text();
            if board != last_board {
                println!("\n{board}");
                last_board = board;
            }
            let status = status_line(&view);
            if status != last_status {
                println!("{status}");
                last_status = status;
            }
        }
        if views.changed().await.is_err() {
            break;
        }
    }
}

fn status_line(view: &MatchView) -> String {
    let marker = |to_move: bool| if to_move { "*" } else { " " };
    let mut line = format!(
        "[{}] {}white {} {}  |  {}black {} {}",
        view.status.as_str(),
        marker(view.white.to_move),
        view.white.label,
        view.white.clock,
        marker(view.black.to_move),
        view.black.label,
        view.black.clock,
    );
    if !view.status.is_ended() {
        match view.board_end {
            Some(EndState::Checkmate { winner }) => {
                line.push_str(&format!("  |  checkmate, {winner} wins"));
            }
            Some(EndState::Stalemate) => line.push_str("  |  stalemate"),
            Some(EndState::Draw) => line.push_str("  |  drawn by rule"),
            None => {}
        }
    }
    if let Some(side) = view.draw_offer_by {
        line.push_str(&format!("  |  draw offered by {side}"));
    }
    if view.submitting {
        line.push_str("  |  sending move");
    }
    if let Some(error) = &view.error {
        line.push_str(&format!("  |  error: {error}"));
    }
    if let Some(info) = &view.info {
        line.push_str(&format!("  |  {info}"));
    }
    line
}

/// Print the end-of-game summary.
async fn announce_endings(mut events: broadcast::Receiver<GameEnded>) {
    loop {
        match events.recv().await {
            Ok(ended) => println!(
                "\nGame over ({})\n  White: {}\n  Black: {}\n  Reason: {}",
                ended.status.as_str(),
                ended.white,
                ended.black,
                ended.reason
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "missed end-of-game signals");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Configure tracing subscribers; logs go to stderr so they do not mix with the board.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,live_match=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdin_commands_parse() {
        assert!(matches!(parse_command("  "), Ok(None)));
        assert!(matches!(
            parse_command("e2e4"),
            Ok(Some(SessionCommand::Move { from, to })) if from.to_string() == "e2" && to.to_string() == "e4"
        ));
        assert!(matches!(
            parse_command("G1 f3"),
            Ok(Some(SessionCommand::Move { .. }))
        ));
        assert!(matches!(
            parse_command("e2"),
            Ok(Some(SessionCommand::Click(_)))
        ));
        assert!(matches!(
            parse_command("draw accept"),
            Ok(Some(SessionCommand::Action(TerminalAction::AcceptDraw)))
        ));
        assert!(matches!(parse_command("quit"), Ok(Some(SessionCommand::Shutdown))));
        assert!(parse_command("castle now please").is_err());
        assert!(parse_command("z9").is_err());
    }
}
