// Scanner console: a terminal stand-in for the scanner node's hardware.
//
//   hex digits + Enter  present a tag
//   r                   remove button
//   Backspace           edit tag input
//   q / Esc             quit

use anyhow::Result;
use cartlink::{
    format_amount, BudgetSignal, ButtonLatch, Feedback, FeedbackSink, Led, LineTransport, Mode,
    ScannerNode, ScannerSettings, TagId, TagQueue, Tone,
};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame, Terminal,
};
use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

const LOG_LINES: usize = 8;

pub struct Console {
    pub button: ButtonLatch,
    pub tags: TagQueue,
    input: String,
    quit: bool,
    hold: Duration,
    shown: Option<(Feedback, Instant)>,
    log: VecDeque<String>,
}

impl Console {
    pub fn new(hold: Duration) -> Self {
        Console {
            button: ButtonLatch::default(),
            tags: TagQueue::default(),
            input: String::new(),
            quit: false,
            hold,
            shown: None,
            log: VecDeque::with_capacity(LOG_LINES),
        }
    }

    /// Drain pending key events without blocking
    fn pump_events(&mut self) -> io::Result<()> {
        while event::poll(Duration::ZERO)? {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }

            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => self.quit = true,
                KeyCode::Char('r') | KeyCode::Char('R') => self.button.press(),
                KeyCode::Char(c) if c.is_ascii_hexdigit() || c == ':' => self.input.push(c),
                KeyCode::Backspace => {
                    self.input.pop();
                }
                KeyCode::Enter => {
                    let text = std::mem::take(&mut self.input);
                    match TagId::from_hex(&text) {
                        Some(tag) => self.tags.push(tag),
                        None => self.push_log(format!("bad tag input '{}'", text)),
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn push_log(&mut self, line: String) {
        if self.log.len() == LOG_LINES {
            self.log.pop_front();
        }
        self.log.push_back(line);
    }

    /// Event message while it is held, otherwise None
    fn current(&self, now: Instant) -> Option<&Feedback> {
        self.shown
            .as_ref()
            .filter(|(_, since)| now.duration_since(*since) < self.hold)
            .map(|(feedback, _)| feedback)
    }
}

impl FeedbackSink for Console {
    fn show(&mut self, feedback: &Feedback) {
        let tone = match feedback.tone {
            Tone::Silent => "",
            Tone::Ok => " ♪",
            Tone::Error => " ♪♪",
            Tone::Alarm => " ♪♪♪",
        };
        self.push_log(format!("{} | {}{}", feedback.primary, feedback.secondary, tone));
        self.shown = Some((feedback.clone(), Instant::now()));
    }
}

pub fn run_console<T: LineTransport>(
    node: &mut ScannerNode<T>,
    settings: &ScannerSettings,
) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut console = Console::new(settings.feedback_hold());
    let res = run_loop(&mut terminal, node, &mut console, settings.poll_interval());

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_loop<B: ratatui::backend::Backend, T: LineTransport>(
    terminal: &mut Terminal<B>,
    node: &mut ScannerNode<T>,
    console: &mut Console,
    interval: Duration,
) -> Result<()> {
    loop {
        console.pump_events()?;
        if console.quit {
            return Ok(());
        }

        let now = Instant::now();
        let Console { button, tags, .. } = &mut *console;
        if let Some(feedback) = node.poll(now, button, tags) {
            console.show(&feedback);
        }

        terminal.draw(|f| ui(f, node, console, now))?;
        std::thread::sleep(interval);
    }
}

fn ui<T: LineTransport>(f: &mut Frame, node: &ScannerNode<T>, console: &Console, now: Instant) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(4), // Display panel
            Constraint::Min(5),    // Cart
            Constraint::Length(LOG_LINES as u16 + 2),
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], node, now);
    render_display(f, chunks[1], node, console, now);
    render_cart(f, chunks[2], node);
    render_log(f, chunks[3], console);
    render_status_bar(f, chunks[4], console);
}

fn led_color(led: Led) -> Color {
    match led {
        Led::Off => Color::DarkGray,
        Led::Green => Color::Green,
        Led::Blue => Color::Blue,
        Led::Yellow => Color::Yellow,
        Led::Red => Color::Red,
    }
}

fn render_header<T: LineTransport>(f: &mut Frame, area: Rect, node: &ScannerNode<T>, now: Instant) {
    let mode_span = match node.mode() {
        Mode::Add => Span::styled("ADD", Style::default().fg(Color::Green)),
        Mode::Remove => {
            let left = node.mode_remaining(now).unwrap_or_default();
            Span::styled(
                format!("REMOVE ({:.1}s)", left.as_secs_f32()),
                Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
            )
        }
    };

    let budget = node
        .budget()
        .map(format_amount)
        .unwrap_or_else(|| "-".to_string());
    let signal = match node.last_signal() {
        Some(BudgetSignal::Low) => Span::styled("LOW", Style::default().fg(Color::Yellow)),
        Some(BudgetSignal::Exhausted) => Span::styled("EXHAUSTED", Style::default().fg(Color::Red)),
        None => Span::styled("ok", Style::default().fg(Color::DarkGray)),
    };

    let spans = vec![
        Span::styled("Cartlink Scanner", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw("  |  Mode: "),
        mode_span,
        Span::raw(format!("  |  Budget: {}  ", budget)),
        signal,
        Span::raw(format!("  |  Unsent: {}", node.send_failures())),
    ];

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));
    f.render_widget(header, area);
}

fn render_display<T: LineTransport>(
    f: &mut Frame,
    area: Rect,
    node: &ScannerNode<T>,
    console: &Console,
    now: Instant,
) {
    let idle = node.idle_feedback();
    let feedback = console.current(now).unwrap_or(&idle);
    let color = led_color(feedback.led);

    let lines = vec![
        Line::from(Span::styled(
            feedback.primary.clone(),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        )),
        Line::from(feedback.secondary.clone()),
    ];

    let panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color))
            .title(" ● Display "),
    );
    f.render_widget(panel, area);
}

fn render_cart<T: LineTransport>(f: &mut Frame, area: Rect, node: &ScannerNode<T>) {
    let header_cells = ["Item", "Qty", "Unit", "Subtotal"].iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let ledger = node.ledger();
    let rows = ledger
        .catalog()
        .items()
        .iter()
        .enumerate()
        .filter(|(index, _)| ledger.quantity(*index) > 0)
        .map(|(index, item)| {
            let quantity = ledger.quantity(index);
            Row::new(vec![
                Cell::from(item.name.clone()),
                Cell::from(quantity.to_string()),
                Cell::from(format_amount(item.unit_price)),
                Cell::from(format_amount(item.unit_price * rust_decimal::Decimal::from(quantity))),
            ])
        });

    let table = Table::new(
        rows,
        [
            Constraint::Length(24),
            Constraint::Length(6),
            Constraint::Length(12),
            Constraint::Length(12),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Cart - Total {} ", format_amount(ledger.total()))),
    );
    f.render_widget(table, area);
}

fn render_log(f: &mut Frame, area: Rect, console: &Console) {
    let lines: Vec<Line> = console.log.iter().map(|l| Line::from(l.clone())).collect();
    let log = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Events "));
    f.render_widget(log, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, console: &Console) {
    let spans = vec![
        Span::styled(" Tag: ", Style::default().fg(Color::Cyan)),
        Span::raw(format!("{}_", console.input)),
        Span::raw(" | "),
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" Scan | "),
        Span::styled("r", Style::default().fg(Color::Yellow)),
        Span::raw(" Remove | "),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" Quit"),
    ];

    let status_bar = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(status_bar, area);
}
