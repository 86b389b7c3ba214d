//! View state for the terminal interface, independent of the terminal itself.

use std::collections::VecDeque;

use tui_textarea::TextArea;

use crate::core::log_sink::LogEntry;
use crate::lms::{pick_active_model, DownloadedModel, LoadedModel, ServerStatus};

/// Lines kept in the Logs panel.
pub const MAX_LOG_LINES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Status,
    Loaded,
    Downloaded,
    Chat,
    Logs,
}

impl Panel {
    pub const ALL: [Panel; 5] = [
        Panel::Status,
        Panel::Loaded,
        Panel::Downloaded,
        Panel::Chat,
        Panel::Logs,
    ];

    pub fn number(self) -> usize {
        match self {
            Panel::Status => 1,
            Panel::Loaded => 2,
            Panel::Downloaded => 3,
            Panel::Chat => 4,
            Panel::Logs => 5,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Panel::Status => "Status",
            Panel::Loaded => "Loaded",
            Panel::Downloaded => "Downloaded",
            Panel::Chat => "Chat",
            Panel::Logs => "Logs",
        }
    }

    pub fn from_digit(digit: char) -> Option<Panel> {
        let index = digit.to_digit(10)? as usize;
        Panel::ALL.get(index.checked_sub(1)?).copied()
    }

    pub fn next(self) -> Panel {
        Panel::ALL[self.number() % Panel::ALL.len()]
    }

    pub fn previous(self) -> Panel {
        Panel::ALL[(self.number() + Panel::ALL.len() - 2) % Panel::ALL.len()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Popup {
    Help,
    SystemPrompt,
}

/// Result of one model refresh; each part fails independently.
#[derive(Debug, Clone)]
pub struct ModelSnapshot {
    pub status: Result<ServerStatus, String>,
    pub loaded: Result<Vec<LoadedModel>, String>,
    pub downloaded: Result<Vec<DownloadedModel>, String>,
}

pub struct UiState {
    pub focus: Panel,
    pub popup: Option<Popup>,
    pub input: TextArea<'static>,
    pub system_input: TextArea<'static>,
    pub server_status: Option<ServerStatus>,
    pub loaded: Vec<LoadedModel>,
    pub downloaded: Vec<DownloadedModel>,
    pub loaded_selected: usize,
    pub downloaded_selected: usize,
    /// Model picked with Enter in the Loaded panel, or `-m`.
    pub chosen_model: Option<String>,
    pub logs: VecDeque<String>,
    /// Lines scrolled up from the bottom of the chat; 0 follows new output.
    pub chat_scroll: u16,
    pub log_scroll: u16,
    pub pending_model_action: Option<String>,
    last_refresh_error: Option<String>,
    pub exit_requested: bool,
}

impl UiState {
    pub fn new(chosen_model: Option<String>) -> Self {
        Self {
            focus: Panel::Chat,
            popup: None,
            input: TextArea::default(),
            system_input: TextArea::default(),
            server_status: None,
            loaded: Vec::new(),
            downloaded: Vec::new(),
            loaded_selected: 0,
            downloaded_selected: 0,
            chosen_model,
            logs: VecDeque::with_capacity(MAX_LOG_LINES),
            chat_scroll: 0,
            log_scroll: 0,
            pending_model_action: None,
            last_refresh_error: None,
            exit_requested: false,
        }
    }

    pub fn push_log_line(&mut self, line: impl Into<String>) {
        if self.logs.len() == MAX_LOG_LINES {
            self.logs.pop_front();
        }
        self.logs.push_back(line.into());
    }

    pub fn push_log(&mut self, entry: &LogEntry) {
        self.push_log_line(entry.display_line());
    }

    /// Applies a refresh result, keeping selections in range. Returns the
    /// error text when it differs from the previous refresh so repeated
    /// failures are logged once.
    pub fn apply_snapshot(&mut self, snapshot: ModelSnapshot) -> Option<String> {
        let mut errors = Vec::new();
        match snapshot.status {
            Ok(status) => self.server_status = Some(status),
            Err(err) => {
                self.server_status = None;
                errors.push(err);
            }
        }
        match snapshot.loaded {
            Ok(loaded) => self.loaded = loaded,
            Err(err) => errors.push(err),
        }
        match snapshot.downloaded {
            Ok(downloaded) => self.downloaded = downloaded,
            Err(err) => errors.push(err),
        }
        self.loaded_selected = clamp_selection(self.loaded_selected, self.loaded.len());
        self.downloaded_selected = clamp_selection(self.downloaded_selected, self.downloaded.len());

        let error = (!errors.is_empty()).then(|| errors.join("; "));
        if error == self.last_refresh_error {
            return None;
        }
        self.last_refresh_error = error.clone();
        error
    }

    /// The model a new turn targets: the chosen one if still loaded, else
    /// the first loaded model.
    pub fn active_model(&self) -> Option<String> {
        pick_active_model(
            self.loaded.iter().map(|model| model.identifier.as_str()),
            self.chosen_model.as_deref(),
        )
    }

    pub fn selected_loaded(&self) -> Option<&LoadedModel> {
        self.loaded.get(self.loaded_selected)
    }

    pub fn selected_downloaded(&self) -> Option<&DownloadedModel> {
        self.downloaded.get(self.downloaded_selected)
    }

    pub fn move_selection(&mut self, delta: isize) {
        let (selected, len) = match self.focus {
            Panel::Loaded => (&mut self.loaded_selected, self.loaded.len()),
            Panel::Downloaded => (&mut self.downloaded_selected, self.downloaded.len()),
            Panel::Logs => {
                self.log_scroll = if delta < 0 {
                    self.log_scroll.saturating_add(1)
                } else {
                    self.log_scroll.saturating_sub(1)
                };
                return;
            }
            _ => return,
        };
        if len == 0 {
            return;
        }
        *selected = (*selected as isize + delta).clamp(0, len as isize - 1) as usize;
    }

    pub fn scroll_chat_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines);
    }

    pub fn scroll_chat_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    /// Takes the chat input text, leaving the box empty.
    pub fn take_input(&mut self) -> String {
        let text = self.input.lines().join("\n");
        self.input = TextArea::default();
        text
    }

    pub fn open_system_prompt(&mut self, current: Option<&str>) {
        let lines: Vec<String> = current
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect();
        self.system_input = TextArea::new(lines);
        self.popup = Some(Popup::SystemPrompt);
    }

    pub fn system_prompt_text(&self) -> String {
        self.system_input.lines().join("\n")
    }
}

fn clamp_selection(selected: usize, len: usize) -> usize {
    selected.min(len.saturating_sub(1))
}
