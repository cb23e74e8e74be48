//! §6 UI contract, implemented as a ratatui + crossterm terminal frontend.
//!
//! [`TerminalUi`] is a passive state sink: its `Ui` methods are synchronous
//! (or resolve through a one-shot channel) and only ever touch a
//! `parking_lot::Mutex`-guarded [`UiState`]. The actual terminal — raw mode,
//! the crossterm event stream, the ratatui draw loop — is owned by the
//! separate [`drive`] task spawned alongside the agent loop, mirroring the
//! split between model and view in the teacher's `app`/`ui` modules.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use forge_core::interrupt::CANCEL_TOKEN;
use forge_core::{AgentEvent, ApprovalAnswer, DisplayBody, InterruptSender, Todo};
use forge_core::ui::{ApprovalRequest, Ui};
use parking_lot::Mutex;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::Paragraph;
use ratatui::{Frame, Terminal};
use tokio::sync::oneshot;
use tokio_stream::StreamExt;

const USER_COLOR: Color = Color::Cyan;
const ASSISTANT_COLOR: Color = Color::Green;
const TOOL_COLOR: Color = Color::Yellow;
const ERROR_COLOR: Color = Color::Red;
const DIM: Style = Style::new().fg(Color::DarkGray);

#[derive(Clone)]
enum Entry {
    User(String),
    Assistant(String),
    ToolCall { title: String },
    ToolResult { title: String, body: Option<DisplayBody> },
    Info(String),
    Success(String),
    Error(String),
}

struct PendingApproval {
    tool_name: String,
    title: String,
    offer_always: bool,
}

enum Mode {
    /// Waiting on `read_user_input`; Enter completes that future.
    AwaitingLine,
    /// A turn is in flight; Enter forwards the line to the interrupt bus.
    Busy,
    /// Waiting on `confirm_action`; y/n/a answer that future instead.
    AwaitingApproval(PendingApproval),
}

struct UiState {
    entries: Vec<Entry>,
    streaming: String,
    spinner: Option<String>,
    todos: Vec<Todo>,
    mode: Mode,
    input: String,
    cursor_pos: usize,
    scroll_offset: u16,
    max_scroll: u16,
    blink_on: bool,
    should_quit: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            streaming: String::new(),
            spinner: None,
            todos: Vec::new(),
            mode: Mode::AwaitingLine,
            input: String::new(),
            cursor_pos: 0,
            scroll_offset: 0,
            max_scroll: 0,
            blink_on: true,
            should_quit: false,
        }
    }
}

pub struct TerminalUi {
    state: Mutex<UiState>,
    input_tx: Mutex<Option<oneshot::Sender<Option<String>>>>,
    approval_tx: Mutex<Option<oneshot::Sender<ApprovalAnswer>>>,
    /// Filled in once the owning `Agent` exists — it hands out its interrupt
    /// sender only after construction, so the UI has to be built first.
    interrupts: OnceLock<InterruptSender>,
}

impl TerminalUi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(UiState::default()),
            input_tx: Mutex::new(None),
            approval_tx: Mutex::new(None),
            interrupts: OnceLock::new(),
        }
    }

    /// Bind the interrupt sender handed out by `Agent::new`. Must be called
    /// before the draw loop needs to forward a busy-mode line or cancel.
    pub fn set_interrupts(&self, interrupts: InterruptSender) {
        let _ = self.interrupts.set(interrupts);
    }

    pub fn request_quit(&self) {
        self.state.lock().should_quit = true;
    }
}

impl Default for TerminalUi {
    fn default() -> Self {
        Self::new()
    }
}

impl Ui for TerminalUi {
    fn read_user_input(&self) -> Pin<Box<dyn std::future::Future<Output = Option<String>> + Send + '_>> {
        Box::pin(async move {
            let (tx, rx) = oneshot::channel();
            *self.input_tx.lock() = Some(tx);
            self.state.lock().mode = Mode::AwaitingLine;
            rx.await.unwrap_or(None)
        })
    }

    fn confirm_action<'a>(
        &'a self,
        request: ApprovalRequest<'a>,
    ) -> Pin<Box<dyn std::future::Future<Output = ApprovalAnswer> + Send + 'a>> {
        Box::pin(async move {
            let (tx, rx) = oneshot::channel();
            *self.approval_tx.lock() = Some(tx);
            self.state.lock().mode = Mode::AwaitingApproval(PendingApproval {
                tool_name: request.tool_name.to_string(),
                title: request.display.title.clone(),
                offer_always: request.offer_always,
            });
            rx.await.unwrap_or(ApprovalAnswer::No)
        })
    }

    fn start_spinner(&self, label: &str) {
        let mut state = self.state.lock();
        state.spinner = Some(label.to_string());
        state.mode = Mode::Busy;
    }

    fn update_spinner(&self, label: &str) {
        self.state.lock().spinner = Some(label.to_string());
    }

    fn stop_spinner(&self) {
        self.state.lock().spinner = None;
    }

    fn render_event(&self, event: &AgentEvent) {
        let mut state = self.state.lock();
        match event {
            AgentEvent::UserMessage { content } => {
                state.entries.push(Entry::User(content.clone()));
                state.streaming.clear();
            }
            AgentEvent::TextDelta { delta } => {
                state.streaming.push_str(delta);
            }
            AgentEvent::ToolCallStart { display, .. } => {
                if !state.streaming.is_empty() {
                    let text = std::mem::take(&mut state.streaming);
                    state.entries.push(Entry::Assistant(text));
                }
                state.entries.push(Entry::ToolCall { title: display.title.clone() });
            }
            AgentEvent::ToolCallDone { display, .. } => {
                state.entries.push(Entry::ToolResult {
                    title: display.title.clone(),
                    body: display.body.clone(),
                });
            }
            AgentEvent::ToolCallSkipped { reason, .. } => {
                state.entries.push(Entry::Info(format!("skipped: {reason}")));
            }
            AgentEvent::HistoryCompressed { messages_before, messages_after } => {
                state.entries.push(Entry::Info(format!(
                    "history compressed: {messages_before} -> {messages_after} messages"
                )));
            }
            AgentEvent::Interrupted => {
                state.entries.push(Entry::Info("interrupted".to_string()));
                state.streaming.clear();
            }
            AgentEvent::PendingInstructionQueued { text } => {
                state.entries.push(Entry::Info(format!("queued: {text}")));
            }
            AgentEvent::Nudged { .. } => {}
            AgentEvent::TurnComplete { usage } => {
                if !state.streaming.is_empty() {
                    let text = std::mem::take(&mut state.streaming);
                    state.entries.push(Entry::Assistant(text));
                }
                state.spinner = None;
                state.mode = Mode::AwaitingLine;
                let _ = usage;
            }
            AgentEvent::Error { error } => {
                state.entries.push(Entry::Error(error.clone()));
            }
        }
    }

    fn show_error(&self, message: &str) {
        self.state.lock().entries.push(Entry::Error(message.to_string()));
    }

    fn show_info(&self, message: &str) {
        self.state.lock().entries.push(Entry::Info(message.to_string()));
    }

    fn show_success(&self, message: &str) {
        self.state.lock().entries.push(Entry::Success(message.to_string()));
    }

    fn display_todos(&self, todos: &[Todo]) {
        self.state.lock().todos = todos.to_vec();
    }
}

/// Own the real terminal: raw mode, the crossterm event stream, the ratatui
/// draw loop. Runs until the user quits.
pub async fn drive(ui: Arc<TerminalUi>) -> io::Result<()> {
    enable_raw_mode()?;
    execute!(io::stdout(), EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;
    let mut events = EventStream::new();
    let mut blink = tokio::time::interval(Duration::from_millis(530));
    blink.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let result = loop {
        if let Err(err) = terminal.draw(|frame| render(frame, &ui.state.lock())) {
            break Err(err);
        }
        if ui.state.lock().should_quit {
            break Ok(());
        }

        tokio::select! {
            maybe_event = events.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind != KeyEventKind::Release => {
                        handle_key(&ui, key);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => break Err(err),
                    None => break Ok(()),
                }
            }
            _ = blink.tick() => {
                ui.state.lock().blink_on = !ui.state.lock().blink_on;
            }
        }
    };

    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen);
    result
}

fn handle_key(ui: &Arc<TerminalUi>, key: crossterm::event::KeyEvent) {
    let mut state = ui.state.lock();

    if let Mode::AwaitingApproval(ref pending) = state.mode {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                if let Some(tx) = ui.approval_tx.lock().take() {
                    let _ = tx.send(ApprovalAnswer::Yes);
                }
                state.mode = Mode::Busy;
            }
            KeyCode::Char('a') | KeyCode::Char('A') if pending.offer_always => {
                if let Some(tx) = ui.approval_tx.lock().take() {
                    let _ = tx.send(ApprovalAnswer::Always);
                }
                state.mode = Mode::Busy;
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                if let Some(tx) = ui.approval_tx.lock().take() {
                    let _ = tx.send(ApprovalAnswer::No);
                }
                state.mode = Mode::Busy;
            }
            _ => {}
        }
        let _ = &pending.tool_name;
        return;
    }

    match key.code {
        KeyCode::Esc => {
            if matches!(state.mode, Mode::Busy) {
                if let Some(interrupts) = ui.interrupts.get() {
                    interrupts.send(CANCEL_TOKEN);
                }
            }
        }
        KeyCode::Enter if key.modifiers.contains(KeyModifiers::SHIFT) => {
            state.input.insert(state.cursor_pos, '\n');
            state.cursor_pos += 1;
        }
        KeyCode::Enter => {
            let line = std::mem::take(&mut state.input);
            state.cursor_pos = 0;
            match state.mode {
                Mode::AwaitingLine => {
                    if let Some(tx) = ui.input_tx.lock().take() {
                        let _ = tx.send(Some(line));
                    }
                    state.mode = Mode::Busy;
                }
                Mode::Busy => {
                    if !line.is_empty() {
                        if let Some(interrupts) = ui.interrupts.get() {
                            interrupts.send(line);
                        }
                    }
                }
                Mode::AwaitingApproval(_) => {}
            }
        }
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            if let Some(tx) = ui.input_tx.lock().take() {
                let _ = tx.send(None);
            }
            state.should_quit = true;
        }
        KeyCode::Char(ch) => {
            state.input.insert(state.cursor_pos, ch);
            state.cursor_pos += ch.len_utf8();
        }
        KeyCode::Backspace => {
            if state.cursor_pos > 0 {
                let mut indices = state.input[..state.cursor_pos].char_indices();
                if let Some((prev, _)) = indices.next_back() {
                    state.input.remove(prev);
                    state.cursor_pos = prev;
                }
            }
        }
        KeyCode::Up => {
            state.scroll_offset = (state.scroll_offset + 1).min(state.max_scroll);
        }
        KeyCode::Down => {
            state.scroll_offset = state.scroll_offset.saturating_sub(1);
        }
        _ => {}
    }
}

fn render(frame: &mut Frame, state: &UiState) {
    let area = frame.area();
    let todo_height = if state.todos.is_empty() { 0 } else { 1 };
    let chunks = Layout::vertical([
        Constraint::Min(1),
        Constraint::Length(1), // spinner / status line
        Constraint::Length(todo_height),
        Constraint::Length(3), // input
    ])
    .split(area);

    render_messages(frame, state, chunks[0]);
    render_status(frame, state, chunks[1]);
    if todo_height > 0 {
        render_todos(frame, state, chunks[2]);
    }
    render_input(frame, state, chunks[3]);
}

fn entry_lines(entry: &Entry) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    match entry {
        Entry::User(text) => {
            lines.push(Line::from(Span::styled(
                "You",
                Style::default().fg(USER_COLOR).add_modifier(Modifier::BOLD),
            )));
            for l in text.lines() {
                lines.push(Line::raw(l.to_string()));
            }
        }
        Entry::Assistant(text) => {
            lines.push(Line::from(Span::styled(
                "Assistant",
                Style::default().fg(ASSISTANT_COLOR).add_modifier(Modifier::BOLD),
            )));
            for l in text.lines() {
                lines.push(Line::raw(l.to_string()));
            }
        }
        Entry::ToolCall { title } => {
            lines.push(Line::from(Span::styled(format!("\u{25b8} {title}"), Style::default().fg(TOOL_COLOR))));
        }
        Entry::ToolResult { title, body } => {
            lines.push(Line::from(Span::styled(format!("\u{2713} {title}"), Style::default().fg(TOOL_COLOR))));
            if let Some(DisplayBody::Text(text)) | Some(DisplayBody::Code { content: text, .. }) = body {
                for l in text.lines().take(20) {
                    lines.push(Line::styled(l.to_string(), DIM));
                }
            }
        }
        Entry::Info(text) => lines.push(Line::styled(format!("i {text}"), DIM)),
        Entry::Success(text) => lines.push(Line::styled(format!("\u{2713} {text}"), Style::default().fg(Color::Green))),
        Entry::Error(text) => lines.push(Line::styled(format!("! {text}"), Style::default().fg(ERROR_COLOR))),
    }
    lines
}

fn build_lines(state: &UiState, width: usize) -> Vec<Line<'static>> {
    let mut logical = Vec::new();
    for entry in &state.entries {
        if !logical.is_empty() {
            logical.push(Line::raw(""));
        }
        logical.extend(entry_lines(entry));
    }
    if !state.streaming.is_empty() {
        if !logical.is_empty() {
            logical.push(Line::raw(""));
        }
        logical.push(Line::from(Span::styled(
            "Assistant",
            Style::default().fg(ASSISTANT_COLOR).add_modifier(Modifier::BOLD),
        )));
        for l in state.streaming.lines() {
            logical.push(Line::raw(l.to_string()));
        }
    }
    if logical.is_empty() {
        logical.push(Line::styled("Type a message and press Enter to start.", DIM));
    }
    logical.iter().flat_map(|l| wrap_line(l, width)).collect()
}

fn wrap_line(line: &Line, width: usize) -> Vec<Line<'static>> {
    if width == 0 {
        return vec![Line::raw("")];
    }
    let mut chars: Vec<(char, Style)> = Vec::new();
    for span in &line.spans {
        for ch in span.content.chars() {
            chars.push((ch, span.style));
        }
    }
    if chars.is_empty() {
        return vec![Line::raw("")];
    }

    let mut result = Vec::new();
    let mut col = 0;
    let mut current_text = String::new();
    let mut current_style = chars[0].1;
    let mut current_spans: Vec<Span<'static>> = Vec::new();

    for (ch, style) in chars {
        if style != current_style {
            if !current_text.is_empty() {
                current_spans.push(Span::styled(std::mem::take(&mut current_text), current_style));
            }
            current_style = style;
        }
        if col >= width {
            if !current_text.is_empty() {
                current_spans.push(Span::styled(std::mem::take(&mut current_text), current_style));
            }
            result.push(Line::from(std::mem::take(&mut current_spans)));
            col = 0;
        }
        current_text.push(ch);
        col += 1;
    }
    if !current_text.is_empty() {
        current_spans.push(Span::styled(current_text, current_style));
    }
    if !current_spans.is_empty() {
        result.push(Line::from(current_spans));
    }
    if result.is_empty() {
        result.push(Line::raw(""));
    }
    result
}

fn render_messages(frame: &mut Frame, state: &UiState, area: Rect) {
    let width = area.width as usize;
    let visible = area.height as usize;
    let mut lines = build_lines(state, width);
    let content_height = lines.len();
    if content_height < visible {
        let mut padded = vec![Line::raw(""); visible - content_height];
        padded.append(&mut lines);
        lines = padded;
    }
    let total = lines.len();
    let max_scroll = total.saturating_sub(visible);
    let offset = (state.scroll_offset as usize).min(max_scroll);
    let scroll = max_scroll - offset;
    let window = &lines[scroll..scroll + visible.min(total)];
    frame.render_widget(Paragraph::new(Text::from(window.to_vec())), area);
}

fn render_status(frame: &mut Frame, state: &UiState, area: Rect) {
    let text = match (&state.spinner, &state.mode) {
        (Some(label), _) => Line::styled(format!("{label}…"), Style::default().fg(Color::Magenta)),
        (None, Mode::AwaitingApproval(pending)) => {
            let suffix = if pending.offer_always { " [y/n/a]" } else { " [y/n]" };
            Line::styled(format!("Approve {}{suffix}? {}", pending.tool_name, pending.title), Style::default().fg(Color::Magenta))
        }
        (None, _) => Line::styled("", DIM),
    };
    frame.render_widget(Paragraph::new(text), area);
}

fn render_todos(frame: &mut Frame, state: &UiState, area: Rect) {
    let done = state.todos.iter().filter(|t| matches!(t.status, forge_core::TodoStatus::Completed)).count();
    let line = Line::styled(
        format!("todos: {done}/{} done", state.todos.len()),
        DIM,
    );
    frame.render_widget(Paragraph::new(line), area);
}

fn render_input(frame: &mut Frame, state: &UiState, area: Rect) {
    let prompt = match state.mode {
        Mode::AwaitingLine => "> ",
        Mode::Busy => ". ",
        Mode::AwaitingApproval(_) => "? ",
    };
    let mut lines: Vec<Line> = Vec::new();
    if state.input.is_empty() {
        lines.push(Line::from(vec![Span::styled(prompt, DIM), Span::styled("Type a message...", DIM)]));
    } else {
        for (i, text_line) in state.input.lines().enumerate() {
            let p = if i == 0 { prompt } else { "  " };
            lines.push(Line::from(vec![Span::raw(p), Span::raw(text_line.to_string())]));
        }
    }
    frame.render_widget(Paragraph::new(Text::from(lines)), area);

    let inner_width = area.width.saturating_sub(2).max(1) as usize;
    let (row, col) = cursor_position(&state.input, state.cursor_pos, inner_width);
    frame.set_cursor_position((area.x + 2 + col as u16, area.y + row as u16));
}

fn cursor_position(input: &str, byte_pos: usize, width: usize) -> (usize, usize) {
    let width = width.max(1);
    let before = &input[..byte_pos.min(input.len())];
    let mut row = 0;
    let mut col = 0;
    for ch in before.chars() {
        if ch == '\n' {
            row += 1;
            col = 0;
        } else {
            col += 1;
            if col >= width {
                row += 1;
                col = 0;
            }
        }
    }
    (row, col)
}
