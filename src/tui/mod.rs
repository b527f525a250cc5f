mod help;
mod state;

use crate::cli::{build_config, build_orchestrator, Cli};
use crate::engine::SimulationClient;
use crate::model::{DashboardEvent, RunState};
use crate::orchestrator::{self, ControllerCtx, UiCommand};
use crate::projector::project_round;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::{push_wrapped_status_kv, UiState};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let (client, orch) = build_orchestrator(&cfg)?;

    let (event_tx, event_rx) = mpsc::unbounded_channel::<DashboardEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let state_rx = orch.subscribe();

    if args.run_on_launch {
        let _ = cmd_tx.send(UiCommand::Start {
            raw_rounds: args.rounds.clone(),
            mode: args.mode,
        });
    }

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_args = args.clone();
    let ui_client = client.clone();
    let ui_handle = std::thread::spawn(move || {
        run_threaded(ui_args, ui_client, state_rx, event_rx, cmd_tx)
    });

    let ctx = ControllerCtx {
        orchestrator: orch,
        client,
        export_json: args.export_json.clone(),
    };
    let res = orchestrator::run_controller(ctx, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    args: Cli,
    client: SimulationClient,
    mut state_rx: watch::Receiver<RunState>,
    mut event_rx: UnboundedReceiver<DashboardEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; no cross-thread mutation.
    let mut state = UiState {
        mode: args.mode,
        rounds_input: args.rounds.clone(),
        ..Default::default()
    };
    state.commit_rounds();

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        if state_rx.has_changed().unwrap_or(false) {
            let run = state_rx.borrow_and_update().clone();
            state.apply_run_state(run);
        }
        while let Ok(ev) = event_rx.try_recv() {
            apply_event(&mut state, ev);
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state, &client)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match (k.modifiers, k.code) {
                    (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    (_, KeyCode::Char('r')) | (_, KeyCode::Char('s')) => {
                        state.commit_rounds();
                        if state.can_start() {
                            let _ = cmd_tx.send(UiCommand::Start {
                                raw_rounds: state.rounds_input.clone(),
                                mode: state.mode,
                            });
                        } else {
                            state.info = "Simulazione in corso…".into();
                        }
                    }
                    (_, KeyCode::Char('m')) => {
                        if state.can_start() {
                            state.mode = state.mode.toggled();
                        }
                    }
                    (_, KeyCode::Char(c)) if c.is_ascii_digit() || c == '-' || c == '.' => {
                        state.push_rounds_char(c);
                    }
                    (_, KeyCode::Backspace) => state.pop_rounds_char(),
                    (_, KeyCode::Enter) | (_, KeyCode::Esc) => state.commit_rounds(),
                    (_, KeyCode::Tab) => {
                        state.commit_rounds();
                        state.tab = (state.tab + 1) % 2;
                    }
                    (_, KeyCode::Char('?')) => {
                        state.tab = 1;
                    }
                    (_, KeyCode::Up) | (_, KeyCode::Char('k')) => state.select_prev(),
                    (_, KeyCode::Down) | (_, KeyCode::Char('j')) => state.select_next(),
                    _ => {}
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn apply_event(state: &mut UiState, ev: DashboardEvent) {
    match ev {
        DashboardEvent::Info(msg) => state.info = msg,
        DashboardEvent::ImagesProbed {
            round,
            availability,
        } => {
            state.images.insert(round, availability);
        }
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState, client: &SimulationClient) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![Line::from("Dashboard"), Line::from("Help")])
        .select(state.tab)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Dashboard simulazione BPH₄"),
        )
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        0 => draw_dashboard(chunks[1], f, state, client),
        _ => help::draw_help(chunks[1], f),
    }
}

fn draw_dashboard(area: Rect, f: &mut ratatui::Frame, state: &UiState, client: &SimulationClient) {
    let banner_height = if state.error_banner().is_some() { 4 } else { 0 };
    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),             // Controls
                Constraint::Length(banner_height), // Error banner
                Constraint::Min(0),                // Results
                Constraint::Length(3),             // Status
            ]
            .as_ref(),
        )
        .split(area);

    draw_controls(main[0], f, state);

    if let Some(message) = state.error_banner() {
        let mut lines = Vec::new();
        push_wrapped_status_kv(&mut lines, "Errore", message, main[1].width);
        let banner = Paragraph::new(lines)
            .style(Style::default().fg(Color::Red))
            .block(Block::default().borders(Borders::ALL).title("Errore"));
        f.render_widget(banner, main[1]);
    }

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(28), Constraint::Min(0)].as_ref())
        .split(main[2]);
    draw_round_list(body[0], f, state);
    draw_round_detail(body[1], f, state, client);

    let status = Paragraph::new(Line::from(vec![
        Span::styled("State: ", Style::default().fg(Color::Gray)),
        Span::raw(state.run.label()),
        Span::raw("   "),
        Span::styled("Info: ", Style::default().fg(Color::Gray)),
        Span::raw(state.info.clone()),
    ]))
    .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, main[3]);
}

fn draw_controls(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let input_style = if state.editing_rounds {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let (button, button_style) = if state.can_start() {
        ("[ Avvia simulazione ]", Style::default().fg(Color::Black).bg(Color::Blue))
    } else {
        ("[ Simulazione... ]", Style::default().fg(Color::DarkGray))
    };
    let line = Line::from(vec![
        Span::styled("Mode: ", Style::default().fg(Color::Gray)),
        Span::styled(
            state.mode.as_query_str(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw("   "),
        Span::styled("Rounds: ", Style::default().fg(Color::Gray)),
        Span::styled(
            format!(
                "{}{}",
                state.rounds_input,
                if state.editing_rounds { "_" } else { "" }
            ),
            input_style,
        ),
        Span::raw("   "),
        Span::styled(button, button_style),
    ]);
    let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("Controlli"));
    f.render_widget(p, area);
}

fn draw_round_list(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let items: Vec<ListItem> = state
        .rounds_view()
        .iter()
        .map(|r| ListItem::new(format!("Round {} – {}", r.round, r.mode)))
        .collect();

    let title = match &state.run {
        RunState::Loading { request } => format!("Rounds (0/{})", request.rounds),
        _ => format!("Rounds ({})", items.len()),
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    let mut list_state = ListState::default();
    if !state.rounds_view().is_empty() {
        list_state.select(Some(state.selected));
    }
    f.render_stateful_widget(list, area, &mut list_state);
}

fn draw_round_detail(area: Rect, f: &mut ratatui::Frame, state: &UiState, client: &SimulationClient) {
    let block = Block::default().borders(Borders::ALL).title("Dettaglio");
    let Some(round) = state.rounds_view().get(state.selected) else {
        let msg = match &state.run {
            RunState::Loading { request } => format!(
                "Simulazione in corso: {} round(s), mode {}…",
                request.rounds, request.mode
            ),
            RunState::Failed { .. } => "Nessun risultato: la simulazione è fallita.".into(),
            _ => "Premi 'r' per avviare la simulazione.".into(),
        };
        f.render_widget(Paragraph::new(msg).block(block), area);
        return;
    };

    let view = project_round(round, state.images.get(&round.round), |p| {
        client.artifact(p).to_string()
    });

    let label = |s: &str| Span::styled(format!("{s}: "), Style::default().fg(Color::Gray));
    let mut lines = vec![
        Line::from(Span::styled(
            view.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];
    for (name, value) in &view.metrics {
        lines.push(Line::from(vec![label(*name), Span::raw(value.clone())]));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled("Pesi", Style::default().fg(Color::Cyan))));
    for w in &view.weights {
        lines.push(Line::from(format!("  • {w}")));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled("Grafici", Style::default().fg(Color::Cyan))));
    for image in &view.images {
        let style = match image.available {
            Some(false) => Style::default().fg(Color::DarkGray),
            _ => Style::default(),
        };
        lines.push(Line::from(vec![
            label(image.label),
            Span::styled(image.display().to_string(), style),
        ]));
    }

    let p = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    f.render_widget(p, area);
}
