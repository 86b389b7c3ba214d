//! Main chat event loop
//!
//! One task owns the [`ChatSession`] and the view state. It waits on
//! terminal input, bridge messages, log entries and model refreshes, applies
//! whichever arrives first, then redraws.

pub mod keybindings;
pub mod lifecycle;
pub mod models;

use std::{error::Error, sync::Arc, time::Duration};

use ratatui::crossterm::event::{self, Event, KeyEventKind};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use self::keybindings::{handle_key, KeyAction};
use self::lifecycle::{restore_terminal, setup_terminal};
use self::models::{spawn_model_action, spawn_refresher, ModelEvent, REFRESH_INTERVAL};
use crate::core::chat_session::ChatSession;
use crate::core::config::ClientConfig;
use crate::core::log_sink::{drain, LogEntry, LogSink};
use crate::core::transport::HttpTransport;
use crate::lms::LmsClient;
use crate::ui::renderer::ui;
use crate::ui::state::{Panel, UiState};

#[derive(Debug)]
pub enum UiEvent {
    Crossterm(Event),
}

fn spawn_event_reader(
    event_tx: mpsc::UnboundedSender<UiEvent>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        while !shutdown.is_cancelled() {
            if let Ok(true) = event::poll(Duration::from_millis(50)) {
                match event::read() {
                    Ok(ev) => {
                        if event_tx.send(UiEvent::Crossterm(ev)).is_err() {
                            break;
                        }
                    }
                    Err(_) => continue,
                }
            }
        }
    })
}

struct LoopContext {
    lms: Arc<LmsClient>,
    log: LogSink,
    model_tx: mpsc::Sender<ModelEvent>,
    refresh_trigger: Arc<Notify>,
}

pub async fn run_chat(config: ClientConfig, model: Option<String>) -> Result<(), Box<dyn Error>> {
    let (log, mut log_rx) = LogSink::new(config.log_channel_size);
    let transport = HttpTransport::new(&config)?;
    let mut session = ChatSession::new(&config, Arc::new(transport), log.clone());
    let mut state = UiState::new(model);

    let shutdown = CancellationToken::new();
    let lms = Arc::new(LmsClient::new());
    let (model_tx, mut model_rx) = mpsc::channel(16);
    let refresh_trigger = Arc::new(Notify::new());
    let refresher = spawn_refresher(
        Arc::clone(&lms),
        model_tx.clone(),
        Arc::clone(&refresh_trigger),
        REFRESH_INTERVAL,
        shutdown.clone(),
    );

    let mut terminal = setup_terminal()?;
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<UiEvent>();
    let event_reader = spawn_event_reader(event_tx, shutdown.clone());

    log.info(format!("Using LM Studio at {}", config.base_url()));
    let ctx = LoopContext {
        lms,
        log,
        model_tx,
        refresh_trigger,
    };

    let result = 'main_loop: loop {
        if let Err(err) = terminal.draw(|f| ui(f, &state, &session)) {
            break 'main_loop Err(err.into());
        }
        if state.exit_requested {
            break 'main_loop Ok(());
        }

        tokio::select! {
            Some(event) = event_rx.recv() => {
                handle_ui_event(&mut state, &mut session, &ctx, event);
            }
            _ = session.next_event(), if session.is_busy() => {}
            Some(entry) = log_rx.recv() => {
                push_logs(&mut state, entry, &mut log_rx);
            }
            Some(event) = model_rx.recv() => {
                handle_model_event(&mut state, &ctx.log, event);
            }
            else => break 'main_loop Ok(()),
        }
    };

    shutdown.cancel();
    session.cancel();
    refresher.abort();
    restore_terminal(&mut terminal)?;
    let _ = event_reader.await;
    result
}

fn push_logs(state: &mut UiState, first: LogEntry, log_rx: &mut mpsc::Receiver<LogEntry>) {
    state.push_log(&first);
    for entry in drain(log_rx) {
        state.push_log(&entry);
    }
    state.log_scroll = 0;
}

fn handle_ui_event(state: &mut UiState, session: &mut ChatSession, ctx: &LoopContext, event: UiEvent) {
    match event {
        UiEvent::Crossterm(Event::Key(key)) if key.kind == KeyEventKind::Press => {
            match handle_key(state, session, key) {
                KeyAction::Quit => state.exit_requested = true,
                KeyAction::Model(action) => {
                    if let Some(pending) = &state.pending_model_action {
                        ctx.log.warn(format!("Still {pending}; try again shortly"));
                        return;
                    }
                    let description = action.describe();
                    ctx.log.info(format!("Started {description}"));
                    state.pending_model_action = Some(description);
                    spawn_model_action(
                        Arc::clone(&ctx.lms),
                        action,
                        ctx.model_tx.clone(),
                        Arc::clone(&ctx.refresh_trigger),
                    );
                }
                KeyAction::Handled | KeyAction::Ignored => {}
            }
        }
        UiEvent::Crossterm(Event::Paste(text)) => {
            if state.focus == Panel::Chat && state.popup.is_none() {
                state.input.insert_str(text);
            }
        }
        UiEvent::Crossterm(_) => {}
    }
}

fn handle_model_event(state: &mut UiState, log: &LogSink, event: ModelEvent) {
    match event {
        ModelEvent::Refreshed(snapshot) => {
            if let Some(err) = state.apply_snapshot(snapshot) {
                log.warn(format!("Model refresh failed: {err}"));
            }
        }
        ModelEvent::ActionFinished {
            description,
            result,
        } => {
            state.pending_model_action = None;
            match result {
                Ok(output) if output.is_empty() => log.info(format!("Finished {description}")),
                Ok(output) => log.info(format!("Finished {description}: {output}")),
                Err(err) => log.error(format!("Failed {description}: {err}")),
            }
        }
    }
}
