//! Key handling for the panels and popups.
//!
//! Everything here runs on the UI task; model operations are returned as
//! [`KeyAction`]s for the loop to spawn.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tui_textarea::Input as TAInput;

use crate::core::chat_session::ChatSession;
use crate::ui::chat_loop::models::ModelAction;
use crate::ui::state::{Panel, Popup, UiState};

const CHAT_PAGE: u16 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    Handled,
    Ignored,
    Quit,
    Model(ModelAction),
}

pub fn handle_key(state: &mut UiState, session: &mut ChatSession, key: KeyEvent) -> KeyAction {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl && key.code == KeyCode::Char('c') {
        return KeyAction::Quit;
    }

    match state.popup {
        Some(Popup::Help) => {
            state.popup = None;
            return KeyAction::Handled;
        }
        Some(Popup::SystemPrompt) => return handle_system_prompt_key(state, session, key),
        None => {}
    }

    if ctrl {
        match key.code {
            KeyCode::Char('s') => {
                state.open_system_prompt(session.system_message());
                return KeyAction::Handled;
            }
            KeyCode::Char('l') => {
                session.clear_conversation();
                state.chat_scroll = 0;
                session.log().info("Conversation cleared");
                return KeyAction::Handled;
            }
            _ => {}
        }
    }

    match key.code {
        KeyCode::Tab => {
            state.focus = state.focus.next();
            return KeyAction::Handled;
        }
        KeyCode::BackTab => {
            state.focus = state.focus.previous();
            return KeyAction::Handled;
        }
        KeyCode::PageUp => {
            state.scroll_chat_up(CHAT_PAGE);
            return KeyAction::Handled;
        }
        KeyCode::PageDown => {
            state.scroll_chat_down(CHAT_PAGE);
            return KeyAction::Handled;
        }
        _ => {}
    }

    if state.focus == Panel::Chat {
        handle_chat_key(state, session, key)
    } else {
        handle_panel_key(state, session, key)
    }
}

fn handle_chat_key(state: &mut UiState, session: &mut ChatSession, key: KeyEvent) -> KeyAction {
    match key.code {
        KeyCode::Esc => {
            if !session.cancel() {
                state.focus = Panel::Loaded;
            }
            KeyAction::Handled
        }
        KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => {
            state.input.insert_newline();
            KeyAction::Handled
        }
        KeyCode::Enter => {
            submit_input(state, session);
            KeyAction::Handled
        }
        _ => {
            state.input.input(TAInput::from(key));
            KeyAction::Handled
        }
    }
}

fn submit_input(state: &mut UiState, session: &mut ChatSession) {
    if session.is_busy() {
        session
            .log()
            .warn("Wait for the current response or press Esc to cancel it");
        return;
    }

    let text = state.take_input();
    if text.trim().is_empty() {
        return;
    }

    let model = state.active_model();
    match session.submit(&text, model.as_deref()) {
        Ok(()) => state.chat_scroll = 0,
        Err(err) => {
            session.log().error(format!("Cannot send message: {err}"));
            state.input = tui_textarea::TextArea::new(text.lines().map(str::to_owned).collect());
        }
    }
}

fn handle_panel_key(state: &mut UiState, session: &mut ChatSession, key: KeyEvent) -> KeyAction {
    match key.code {
        KeyCode::Char('q') => KeyAction::Quit,
        KeyCode::Char('?') => {
            state.popup = Some(Popup::Help);
            KeyAction::Handled
        }
        KeyCode::Char(digit @ '1'..='5') => {
            if let Some(panel) = Panel::from_digit(digit) {
                state.focus = panel;
            }
            KeyAction::Handled
        }
        KeyCode::Esc => {
            session.cancel();
            KeyAction::Handled
        }
        KeyCode::Up | KeyCode::Char('k') => {
            state.move_selection(-1);
            KeyAction::Handled
        }
        KeyCode::Down | KeyCode::Char('j') => {
            state.move_selection(1);
            KeyAction::Handled
        }
        KeyCode::Enter => match state.focus {
            Panel::Loaded => {
                let Some(model) = state.selected_loaded() else {
                    return KeyAction::Ignored;
                };
                let identifier = model.identifier.clone();
                session.log().info(format!("Chatting with {identifier}"));
                state.chosen_model = Some(identifier);
                state.focus = Panel::Chat;
                KeyAction::Handled
            }
            Panel::Downloaded => state
                .selected_downloaded()
                .map(|model| KeyAction::Model(ModelAction::Load(model.model_key.clone())))
                .unwrap_or(KeyAction::Ignored),
            _ => KeyAction::Ignored,
        },
        KeyCode::Char('u') if state.focus == Panel::Loaded => state
            .selected_loaded()
            .map(|model| KeyAction::Model(ModelAction::Unload(model.identifier.clone())))
            .unwrap_or(KeyAction::Ignored),
        KeyCode::Char('U') => KeyAction::Model(ModelAction::UnloadAll),
        _ => KeyAction::Ignored,
    }
}

fn handle_system_prompt_key(
    state: &mut UiState,
    session: &mut ChatSession,
    key: KeyEvent,
) -> KeyAction {
    match key.code {
        KeyCode::Esc => {
            state.popup = None;
        }
        KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => {
            state.system_input.insert_newline();
        }
        KeyCode::Enter => match session.set_system_message(&state.system_prompt_text()) {
            Ok(()) => state.popup = None,
            Err(err) => session.log().error(format!("Invalid system prompt: {err}")),
        },
        _ => {
            state.system_input.input(TAInput::from(key));
        }
    }
    KeyAction::Handled
}
