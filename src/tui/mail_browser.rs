use crate::core::config::Theme;
use crate::core::models::{FetchTarget, NotificationKind};
use crate::core::progress::JobStatus;
use crate::core::session::MailSession;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Accounts,
    Emails,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    None,
    Email,
    Search,
    Notifications,
    Help,
}

pub struct MailBrowser {
    session: MailSession,
    accent: Color,
    focus: Focus,
    overlay: Overlay,
    account_state: ListState,
    email_state: ListState,
    search_input: String,
    email_scroll: u16,
    status_message: Option<String>,
}

impl MailBrowser {
    pub fn new(session: MailSession, theme: Theme) -> Self {
        let accent = theme.primary_color.parse::<Color>().unwrap_or(Color::Cyan);
        Self {
            session,
            accent,
            focus: Focus::Accounts,
            overlay: Overlay::None,
            account_state: ListState::default(),
            email_state: ListState::default(),
            search_input: String::new(),
            email_scroll: 0,
            status_message: None,
        }
    }

    #[cfg(test)]
    pub fn session(&self) -> &MailSession {
        &self.session
    }

    #[cfg(test)]
    pub fn focus(&self) -> Focus {
        self.focus
    }

    #[cfg(test)]
    pub fn overlay(&self) -> Overlay {
        self.overlay
    }

    #[cfg(test)]
    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    #[cfg(test)]
    pub fn accent(&self) -> Color {
        self.accent
    }

    /// Initial load, done before the terminal switches to the alternate screen.
    pub async fn load(&mut self) {
        self.session.load().await;
        self.sync_selection();
    }

    pub async fn run(&mut self) -> io::Result<()> {
        self.load().await;

        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal).await;

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result
    }

    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            self.tick().await;
            terminal.draw(|f| self.ui(f))?;

            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && self.handle_key_event(key).await? {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply whatever the background tasks reported since the last frame.
    pub async fn tick(&mut self) {
        if self.session.process_pending().await > 0 {
            self.sync_selection();
        }
    }

    /// Returns `true` when the browser should exit.
    pub async fn handle_key_event(&mut self, key: KeyEvent) -> io::Result<bool> {
        self.status_message = None;

        match self.overlay {
            Overlay::Help => {
                if matches!(
                    key.code,
                    KeyCode::Char('h') | KeyCode::Char('?') | KeyCode::Esc
                ) {
                    self.overlay = Overlay::None;
                }
                return Ok(false);
            }
            Overlay::Search => {
                self.handle_search_key(key).await;
                return Ok(false);
            }
            Overlay::Email => {
                self.handle_email_key(key);
                return Ok(false);
            }
            Overlay::Notifications => {
                self.handle_notifications_key(key).await;
                return Ok(false);
            }
            Overlay::None => {}
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
            KeyCode::Char('h') | KeyCode::Char('?') => self.overlay = Overlay::Help,
            KeyCode::Tab | KeyCode::BackTab => {
                self.focus = match self.focus {
                    Focus::Accounts => Focus::Emails,
                    Focus::Emails => Focus::Accounts,
                };
            }
            KeyCode::Up => self.move_selection(false),
            KeyCode::Down => self.move_selection(true),
            KeyCode::Enter => self.activate_selection().await,
            KeyCode::Char('/') => {
                self.search_input = self.session.search_query().to_string();
                self.overlay = Overlay::Search;
            }
            KeyCode::Char('f') => {
                if self.session.selected_account().is_none() {
                    self.status_message = Some("Select an account to fetch".to_string());
                } else if !self.session.fetch_current_account().await {
                    self.report_refused_start();
                }
            }
            KeyCode::Char('F') => {
                if !self.session.start_fetch(FetchTarget::All).await {
                    self.report_refused_start();
                }
            }
            KeyCode::Char('a') => {
                self.session.load_all_emails().await;
                self.email_state.select(None);
                self.sync_selection();
            }
            KeyCode::Char('n') if self.session.options().notifications => {
                self.overlay = Overlay::Notifications;
            }
            _ => {}
        }
        Ok(false)
    }

    async fn handle_search_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.overlay = Overlay::None,
            KeyCode::Backspace => {
                self.search_input.pop();
            }
            KeyCode::Enter => {
                self.overlay = Overlay::None;
                let query = self.search_input.trim().to_string();
                if query.is_empty() {
                    return;
                }
                if self.session.start_search(&query).await {
                    self.focus = Focus::Emails;
                    self.email_state.select(None);
                } else {
                    self.report_refused_start();
                }
            }
            KeyCode::Char(c) => self.search_input.push(c),
            _ => {}
        }
    }

    fn handle_email_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Backspace | KeyCode::Char('q') => {
                self.session.close_email();
                self.overlay = Overlay::None;
            }
            KeyCode::Up => self.email_scroll = self.email_scroll.saturating_sub(1),
            KeyCode::Down => self.email_scroll = self.email_scroll.saturating_add(1),
            KeyCode::Char(c @ '1'..='9') => {
                let index = c as usize - '1' as usize;
                self.open_attachment(index);
            }
            _ => {}
        }
    }

    async fn handle_notifications_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('q') => {
                self.overlay = Overlay::None;
            }
            KeyCode::Char('c') => {
                let message = if self.session.clear_notifications().await {
                    "Notifications cleared"
                } else {
                    "Failed to clear notifications"
                };
                self.status_message = Some(message.to_string());
            }
            _ => {}
        }
    }

    fn report_refused_start(&mut self) {
        if self.session.error_banner().is_none() {
            self.status_message = Some("A job of this kind is already running".to_string());
        }
    }

    fn open_attachment(&mut self, index: usize) {
        let Some(email) = self.session.selected_email() else {
            return;
        };
        let Some(attachment) = email.attachments.get(index) else {
            return;
        };

        let url = self.session.api().attachment_url(&email.id, attachment);
        self.status_message = Some(match webbrowser::open(&url) {
            Ok(()) => format!("Opened {}", attachment.filename),
            Err(e) => {
                log::warn!("Failed to open attachment in browser: {e}");
                format!("Could not open {}", attachment.filename)
            }
        });
    }

    fn move_selection(&mut self, forward: bool) {
        let (state, len) = match self.focus {
            Focus::Accounts => (
                &mut self.account_state,
                self.session.accounts().emails.len(),
            ),
            Focus::Emails => (&mut self.email_state, self.session.emails().len()),
        };
        if len == 0 {
            return;
        }

        let selected = state.selected().unwrap_or(0);
        let next = if forward {
            if selected >= len - 1 { 0 } else { selected + 1 }
        } else if selected == 0 {
            len - 1
        } else {
            selected - 1
        };
        state.select(Some(next));
    }

    async fn activate_selection(&mut self) {
        match self.focus {
            Focus::Accounts => {
                let Some(index) = self.account_state.selected() else {
                    return;
                };
                let Some(user) = self.session.accounts().users().nth(index).map(str::to_string)
                else {
                    return;
                };
                self.session.select_account(&user).await;
                self.email_state.select(None);
                self.sync_selection();
            }
            Focus::Emails => {
                let Some(id) = self
                    .email_state
                    .selected()
                    .and_then(|index| self.session.emails().get(index))
                    .map(|email| email.id.clone())
                else {
                    return;
                };
                if self.session.open_email(&id).await {
                    self.email_scroll = 0;
                    self.overlay = Overlay::Email;
                } else {
                    self.status_message = Some("Could not load email".to_string());
                }
            }
        }
    }

    /// Keep list cursors inside the current data.
    fn sync_selection(&mut self) {
        let selected_account = self.session.selected_account().and_then(|selected| {
            self.session
                .accounts()
                .users()
                .position(|user| user == selected)
        });
        let accounts = self.session.accounts().emails.len();
        match selected_account {
            Some(index) => self.account_state.select(Some(index)),
            None if accounts == 0 => self.account_state.select(None),
            None => {
                if self.account_state.selected().is_none_or(|i| i >= accounts) {
                    self.account_state.select(Some(0));
                }
            }
        }

        let emails = self.session.emails().len();
        match self.email_state.selected() {
            Some(index) if index >= emails => self.email_state.select(emails.checked_sub(1)),
            None if emails > 0 => self.email_state.select(Some(0)),
            _ => {}
        }
    }

    pub fn ui(&mut self, f: &mut Frame) {
        let size = f.area();

        let banner = self.session.error_banner().map(str::to_string);
        let progress_lines = self
            .session
            .displayed_progress()
            .map(|p| p.summary_lines().len() as u16)
            .unwrap_or(0);

        let mut constraints = vec![Constraint::Length(3)];
        if banner.is_some() {
            constraints.push(Constraint::Length(3));
        }
        if self.session.displayed_progress().is_some() {
            constraints.push(Constraint::Length(3 + progress_lines));
        }
        constraints.push(Constraint::Min(0));
        constraints.push(Constraint::Length(3));

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(size);
        let mut next = 0;
        let mut take = || {
            let area = chunks[next];
            next += 1;
            area
        };

        self.render_header(f, take());
        if let Some(message) = banner {
            let error = Paragraph::new(format!("❌ {message}"))
                .style(Style::default().fg(Color::Red))
                .block(Block::default().borders(Borders::ALL).title("Error"))
                .wrap(Wrap { trim: true });
            f.render_widget(error, take());
        }
        if self.session.displayed_progress().is_some() {
            self.render_progress(f, take());
        }
        self.render_body(f, take());
        self.render_footer(f, take());

        match self.overlay {
            Overlay::None => {}
            Overlay::Email => self.render_email(f, size),
            Overlay::Search => self.render_search(f, size),
            Overlay::Notifications => self.render_notifications(f, size),
            Overlay::Help => self.render_help_overlay(f, size),
        }
    }

    fn render_header(&self, f: &mut Frame, area: Rect) {
        let server = &self.session.accounts().server;
        let mut title = if server.is_empty() {
            "📬 mailview".to_string()
        } else {
            format!("📬 mailview - {server}")
        };
        if self.session.options().notifications {
            title.push_str(&format!("   🔔 Errors: {}", self.session.notification_badge()));
        }

        let header = Paragraph::new(title)
            .style(Style::default().fg(self.accent).add_modifier(Modifier::BOLD))
            .block(Block::default().borders(Borders::ALL).title("Mail"));
        f.render_widget(header, area);
    }

    fn render_progress(&self, f: &mut Frame, area: Rect) {
        let Some(progress) = self.session.displayed_progress() else {
            return;
        };
        let title = match progress.status {
            JobStatus::Searching => "Searching",
            _ => "Fetching",
        };

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0)])
            .split(area);

        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title(title))
            .gauge_style(Style::default().fg(self.accent))
            .ratio(progress.ratio())
            .label(format!("{:.0}%", progress.ratio() * 100.0));
        f.render_widget(gauge, chunks[0]);

        let lines: Vec<Line> = progress.summary_lines().into_iter().map(Line::from).collect();
        f.render_widget(Paragraph::new(lines), chunks[1]);
    }

    fn render_body(&mut self, f: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
            .split(area);

        let selected = self.session.selected_account().map(str::to_string);
        let account_items: Vec<ListItem> = self
            .session
            .accounts()
            .emails
            .iter()
            .map(|account| {
                let marker = if selected.as_deref() == Some(account.user.as_str()) {
                    "● "
                } else {
                    "  "
                };
                ListItem::new(format!("{marker}{} ({})", account.user, account.email_count))
            })
            .collect();
        let accounts = List::new(account_items)
            .block(self.focused_block("Accounts", self.focus == Focus::Accounts))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("▶ ");
        f.render_stateful_widget(accounts, chunks[0], &mut self.account_state);

        let emails = self.session.emails();
        let title = if self.session.is_searching() {
            format!(
                "Search results for '{}' ({})",
                self.session.search_query(),
                emails.len()
            )
        } else {
            match self.session.selected_account() {
                Some(account) => format!("{account} ({})", emails.len()),
                None => format!("All emails ({})", emails.len()),
            }
        };
        let email_items: Vec<ListItem> = if emails.is_empty() {
            vec![ListItem::new("No emails")]
        } else {
            emails
                .iter()
                .map(|email| {
                    ListItem::new(format!(
                        "{}  {}  {}",
                        truncate(&email.date, 19),
                        truncate(email.display_sender(), 24),
                        truncate(email.display_subject(), 60)
                    ))
                })
                .collect()
        };
        let email_list = List::new(email_items)
            .block(self.focused_block(&title, self.focus == Focus::Emails))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("▶ ");
        f.render_stateful_widget(email_list, chunks[1], &mut self.email_state);
    }

    fn render_footer(&self, f: &mut Frame, area: Rect) {
        let text = match (&self.status_message, self.overlay) {
            (Some(message), _) => message.clone(),
            (None, Overlay::Email) => {
                "↑/↓: Scroll | 1-9: Open attachment | Esc: Back".to_string()
            }
            (None, Overlay::Search) => "Enter: Search | Esc: Cancel".to_string(),
            (None, Overlay::Notifications) => "c: Clear all | Esc: Close".to_string(),
            (None, _) => {
                let mut controls = concat!(
                    "Tab: Switch | ↑/↓: Navigate | Enter: Open | /: Search | ",
                    "a: All emails | f: Fetch account | F: Fetch all"
                )
                .to_string();
                if self.session.options().notifications {
                    controls.push_str(" | n: Notifications");
                }
                controls.push_str(" | h: Help | q: Quit");
                controls
            }
        };
        let footer = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title("Controls"))
            .wrap(Wrap { trim: true });
        f.render_widget(footer, area);
    }

    fn render_email(&self, f: &mut Frame, area: Rect) {
        let Some(email) = self.session.selected_email() else {
            return;
        };

        let mut lines = vec![
            Line::from(format!("From:    {}", email.display_sender())),
            Line::from(format!("Date:    {}", email.date)),
            Line::from(format!("Account: {}", email.account)),
        ];
        if !email.attachments.is_empty() {
            lines.push(Line::from(""));
            for (i, attachment) in email.attachments.iter().enumerate().take(9) {
                lines.push(Line::from(format!("📎 [{}] {}", i + 1, attachment.filename)));
            }
        }
        lines.push(Line::from(""));

        let popup = popup_area(area, 2);
        let text_width = popup.width.saturating_sub(2) as usize;
        lines.extend(
            email
                .plain_text(text_width)
                .lines()
                .map(|line| Line::from(line.to_string())),
        );
        f.render_widget(Clear, popup);
        let body = Paragraph::new(lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(email.display_subject().to_string()),
            )
            .wrap(Wrap { trim: false })
            .scroll((self.email_scroll, 0));
        f.render_widget(body, popup);
    }

    fn render_search(&self, f: &mut Frame, area: Rect) {
        let popup = Rect {
            x: area.x + area.width / 6,
            y: area.y + area.height / 3,
            width: area.width - area.width / 3,
            height: 3.min(area.height),
        };
        f.render_widget(Clear, popup);
        let input = Paragraph::new(format!("{}▏", self.search_input)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.accent))
                .title("Search emails"),
        );
        f.render_widget(input, popup);
    }

    fn render_notifications(&self, f: &mut Frame, area: Rect) {
        let notifications = self.session.notifications();
        let items: Vec<ListItem> = if notifications.is_empty() {
            vec![ListItem::new("No notifications")]
        } else {
            notifications
                .iter()
                .map(|n| {
                    let style = match n.kind {
                        NotificationKind::Error => Style::default().fg(Color::Red),
                        NotificationKind::Warning => Style::default().fg(Color::Yellow),
                        NotificationKind::Info => Style::default(),
                    };
                    ListItem::new(format!("{} [{}] {}", n.kind.icon(), n.time, n.message))
                        .style(style)
                })
                .collect()
        };

        let popup = popup_area(area, 4);
        f.render_widget(Clear, popup);
        let list = List::new(items).block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Notifications ({})", notifications.len())),
        );
        f.render_widget(list, popup);
    }

    fn render_help_overlay(&self, f: &mut Frame, area: Rect) {
        let help_text = "📬 Mail Browser Help

NAVIGATION:
  Tab         Switch between accounts and emails
  ↑/↓         Move through the focused list
  Enter       Show an account's emails / open an email
  Esc         Close the open view

ACTIONS:
  /           Search all stored emails
  a           List emails of every account
  f           Fetch new mail for the selected account
  F           Fetch new mail for all accounts
  n           Show notifications (c clears them)
  1-9         Open an attachment of the open email

  h/?         Show/hide this help
  q           Quit

Press h or Esc to close this help.";

        let help_area = popup_area(area, 2);
        f.render_widget(Clear, help_area);
        let help_popup = Paragraph::new(help_text)
            .block(Block::default().borders(Borders::ALL).title("Help"))
            .wrap(Wrap { trim: true });
        f.render_widget(help_popup, help_area);
    }

    fn focused_block(&self, title: &str, focused: bool) -> Block<'static> {
        let border = if focused {
            Style::default().fg(self.accent)
        } else {
            Style::default()
        };
        Block::default()
            .borders(Borders::ALL)
            .border_style(border)
            .title(title.to_string())
    }
}

fn popup_area(area: Rect, margin: u16) -> Rect {
    Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(100)])
        .margin(margin)
        .split(area)[0]
}

/// Shorten to `max` characters, marking the cut with an ellipsis.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}
