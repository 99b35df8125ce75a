mod form;
mod help;
mod state;

use crate::catalog::{self, PageSpan};
use crate::model::{JobKind, JobState, LaunchConfig};
use crate::orchestrator::{self, AppEvent, UiCommand};
use crate::settings::Settings;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use form::{EditableForm, FieldView, FormAction};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
    Terminal,
};
use state::{push_wrapped_status_kv, JobView, Tab, UiState};
use std::path::PathBuf;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Output lines moved per PgUp/PgDn.
const PAGE: usize = 10;

pub async fn run(cfg: LaunchConfig) -> Result<()> {
    // The terminal belongs to the TUI, so logs go to a file.
    let log_path = crate::logging::init_file_logger().unwrap_or_else(|e| {
        eprintln!("logging disabled: {e:#}");
        None
    });
    let settings = Settings::load(&cfg.settings_path)?;

    let (event_tx, event_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_cfg = cfg.clone();
    let ui_handle =
        std::thread::spawn(move || run_threaded(ui_cfg, settings, log_path, event_rx, cmd_tx));

    let res = orchestrator::run_controller(&cfg, event_tx, cmd_rx).await;

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
    cfg: LaunchConfig,
    settings: Settings,
    log_path: Option<PathBuf>,
    mut event_rx: UnboundedReceiver<AppEvent>,
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
        training: settings.training_form(),
        inference: settings.inference_form(),
        log_path,
        ..Default::default()
    };
    state.models.url = cfg.models_url.clone();
    state.info = format!("Settings: {}", cfg.settings_path.display());

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            apply_event(&mut state, ev);
        }
        state.poll_jobs();

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                if let Flow::Quit = handle_key(&mut state, &cfg, &cmd_tx, k.modifiers, k.code) {
                    log::info!("quit requested with {} job(s) running", state.running_jobs());
                    let _ = cmd_tx.send(UiCommand::Quit);
                    break Ok(());
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

enum Flow {
    Continue,
    Quit,
}

fn apply_event(state: &mut UiState, ev: AppEvent) {
    match ev {
        AppEvent::JobLaunched(job) => state.add_job(job),
        AppEvent::ModelsPage(html) => {
            let page = catalog::render(&html);
            state.info = format!("Model list loaded: {} link(s)", page.links.len());
            state.models.page = Some(page);
            state.models.selected = 0;
            state.models.loading = false;
        }
        AppEvent::Info(msg) => state.info = msg,
    }
}

fn handle_key(
    state: &mut UiState,
    cfg: &LaunchConfig,
    cmd_tx: &UnboundedSender<UiCommand>,
    modifiers: KeyModifiers,
    code: KeyCode,
) -> Flow {
    let on_form = matches!(state.tab, Tab::Training | Tab::Inference);
    match (modifiers, code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) => return Flow::Quit,
        (KeyModifiers::CONTROL, KeyCode::Char('r')) if on_form => {
            submit_active(state, cfg, cmd_tx);
            return Flow::Continue;
        }
        (_, KeyCode::Tab) => {
            state.tab = state.tab.next();
            return Flow::Continue;
        }
        (_, KeyCode::BackTab) => {
            state.tab = state.tab.prev();
            return Flow::Continue;
        }
        _ => {}
    }

    match state.tab {
        Tab::Training | Tab::Inference => {
            let action = if state.tab == Tab::Training {
                form::handle_form_key(
                    &mut state.training,
                    &mut state.training_focus,
                    modifiers,
                    code,
                )
            } else {
                form::handle_form_key(
                    &mut state.inference,
                    &mut state.inference_focus,
                    modifiers,
                    code,
                )
            };
            match action {
                FormAction::Submit => submit_active(state, cfg, cmd_tx),
                FormAction::Edited => {}
                // Only reached off the text rows, so typing a 'q' never quits
                FormAction::Ignored if code == KeyCode::Char('q') => return Flow::Quit,
                FormAction::Ignored => {}
            }
        }
        Tab::Jobs => match code {
            KeyCode::Char('q') => return Flow::Quit,
            KeyCode::Up => state.selected_job = state.selected_job.saturating_sub(1),
            KeyCode::Down => {
                if state.selected_job + 1 < state.jobs.len() {
                    state.selected_job += 1;
                }
            }
            KeyCode::PageUp => {
                if let Some(v) = state.selected_job_mut() {
                    v.scroll_up(PAGE);
                }
            }
            KeyCode::PageDown => {
                if let Some(v) = state.selected_job_mut() {
                    v.scroll_down(PAGE);
                }
            }
            KeyCode::Char('o') => {
                if let Some(v) = state.selected_job() {
                    if let Err(e) = crate::desktop::open_output_folder(&v.output_dir) {
                        state.info = format!("{e:#}");
                    }
                }
            }
            KeyCode::Char('x') => {
                if let Some(v) = state.selected_job() {
                    if v.state.is_terminal() {
                        state.info = format!("Job {} already finished", v.id);
                    } else {
                        let _ = cmd_tx.send(UiCommand::Cancel(v.id));
                    }
                }
            }
            KeyCode::Char('w') => state.close_selected_job(),
            KeyCode::Char('y') => {
                if let Some(v) = state.selected_job() {
                    let text = v.command.to_string();
                    state.info = match crate::desktop::copy_to_clipboard(&text) {
                        Ok(()) => format!("✓ Copied to clipboard: {text}"),
                        Err(e) => format!("Clipboard copy failed: {e:#}"),
                    };
                }
            }
            _ => {}
        },
        Tab::Models => match code {
            KeyCode::Char('q') => return Flow::Quit,
            KeyCode::Char('r') => {
                if !state.models.loading {
                    state.models.loading = true;
                    state.info = "Fetching model list…".into();
                    let _ = cmd_tx.send(UiCommand::FetchModels);
                }
            }
            KeyCode::Up => state.models.select_prev(),
            KeyCode::Down => state.models.select_next(),
            KeyCode::Enter => {
                if let Some(href) = state.models.selected_href().map(str::to_string) {
                    state.info = match crate::desktop::open_link(&href) {
                        Ok(()) => format!("Opened {href}"),
                        Err(e) => format!("{e:#}"),
                    };
                }
            }
            _ => {}
        },
        Tab::Help => {
            if code == KeyCode::Char('q') {
                return Flow::Quit;
            }
        }
    }
    Flow::Continue
}

/// Validate the form on the current tab and hand it to the controller.
fn submit_active(state: &mut UiState, cfg: &LaunchConfig, cmd_tx: &UnboundedSender<UiCommand>) {
    let kind = match state.tab {
        Tab::Inference => JobKind::Inference,
        _ => JobKind::Training,
    };
    match orchestrator::submit(cfg, kind, &state.training, &state.inference) {
        Ok(submission) => {
            state.info = match submission.save_error.as_ref() {
                Some(e) => e.clone(),
                None => format!("Launching {}…", submission.command),
            };
            let _ = cmd_tx.send(UiCommand::Launch(Box::new(submission)));
        }
        Err(e) => {
            log::info!("{kind:?} submit rejected: {} is empty", e.field());
            state.info = e.to_string();
        }
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)].as_ref())
        .split(area);

    let titles: Vec<Line> = Tab::ALL.iter().map(|t| Line::from(t.title())).collect();
    let tabs = Tabs::new(titles)
        .select(state.tab.index())
        .block(Block::default().borders(Borders::ALL).title("msst-launcher"))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        Tab::Training => draw_form(
            chunks[1],
            f,
            &state.training,
            state.training_focus,
            "Training",
        ),
        Tab::Inference => draw_form(
            chunks[1],
            f,
            &state.inference,
            state.inference_focus,
            "Inference",
        ),
        Tab::Jobs => draw_jobs(chunks[1], f, state),
        Tab::Models => draw_models(chunks[1], f, state),
        Tab::Help => help::draw_help(chunks[1], f, state.log_path.as_deref()),
    }

    let running = state.running_jobs();
    let status = Paragraph::new(Line::from(vec![
        Span::styled(
            format!("{running} running"),
            Style::default().fg(if running > 0 { Color::Cyan } else { Color::Gray }),
        ),
        Span::raw("  "),
        Span::raw(state.info.clone()),
    ]))
    .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, chunks[2]);
}

fn draw_form<F: EditableForm>(area: Rect, f: &mut ratatui::Frame, form: &F, focus: usize, title: &str) {
    let label_width = form
        .labels()
        .iter()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0)
        + 2;

    let mut lines: Vec<Line> = Vec::new();
    for (idx, label) in form.labels().iter().enumerate() {
        let focused = idx == focus;
        let marker = if focused { "> " } else { "  " };
        let label_style = if focused {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::Gray)
        };

        let value = match form.field_view(idx) {
            FieldView::Choice(Some(m)) => Span::raw(format!("◀ {m} ▶")),
            FieldView::Choice(None) => {
                Span::styled("◀ select ▶", Style::default().fg(Color::DarkGray))
            }
            FieldView::Text(s) if focused => Span::raw(format!("{s}_")),
            FieldView::Text(s) => Span::raw(s.to_string()),
            FieldView::Toggle(on) => Span::raw(if on { "[x]" } else { "[ ]" }),
            FieldView::Run => {
                lines.push(Line::from(""));
                let style = if focused {
                    Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::Green)
                };
                lines.push(Line::from(vec![Span::raw(marker), Span::styled(*label, style)]));
                continue;
            }
        };
        lines.push(Line::from(vec![
            Span::raw(marker),
            Span::styled(format!("{label:label_width$}"), label_style),
            value,
        ]));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("↑/↓", Style::default().fg(Color::Magenta)),
        Span::raw(": field, "),
        Span::styled("←/→", Style::default().fg(Color::Magenta)),
        Span::raw(": model type, "),
        Span::styled("space", Style::default().fg(Color::Magenta)),
        Span::raw(": toggle, "),
        Span::styled("Ctrl-R", Style::default().fg(Color::Magenta)),
        Span::raw(": run"),
    ]));

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title.to_string()));
    f.render_widget(p, area);
}

fn state_style(state: &JobState) -> Style {
    let color = match state {
        JobState::Idle => Color::Gray,
        JobState::Running => Color::Cyan,
        JobState::Completed => Color::Green,
        JobState::Failed { .. } | JobState::Errored { .. } => Color::Red,
        JobState::Cancelled => Color::Yellow,
    };
    Style::default().fg(color)
}

fn draw_jobs(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let Some(selected) = state.selected_job() else {
        let p = Paragraph::new(vec![
            Line::from("No output views open."),
            Line::from("Fill in the Training or Inference tab and run it."),
        ])
        .block(Block::default().borders(Borders::ALL).title("Jobs"));
        f.render_widget(p, area);
        return;
    };

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(30), Constraint::Min(0)].as_ref())
        .split(area);

    let list: Vec<Line> = state
        .jobs
        .iter()
        .enumerate()
        .map(|(i, job)| {
            let is_sel = i == state.selected_job;
            let kind = match job.kind {
                JobKind::Training => "train",
                JobKind::Inference => "infer",
            };
            Line::from(vec![
                Span::raw(if is_sel { "> " } else { "  " }),
                Span::styled(
                    format!("#{} {kind} ", job.id),
                    if is_sel {
                        Style::default().fg(Color::Yellow)
                    } else {
                        Style::default()
                    },
                ),
                Span::styled(job.state.label(), state_style(&job.state)),
            ])
        })
        .collect();
    let p = Paragraph::new(list).block(Block::default().borders(Borders::ALL).title("Jobs"));
    f.render_widget(p, cols[0]);

    draw_job_view(cols[1], f, selected);
}

fn draw_job_view(area: Rect, f: &mut ratatui::Frame, view: &JobView) {
    let mut header: Vec<Line<'static>> = Vec::new();
    push_wrapped_status_kv(&mut header, "Command", &view.command.to_string(), area.width);
    push_wrapped_status_kv(&mut header, "Folder", &view.output_dir, area.width);
    let mut status = vec![
        Span::styled("State:", Style::default().fg(Color::Gray)),
        Span::raw(" "),
        Span::styled(view.state.label(), state_style(&view.state)),
        Span::styled("  Elapsed:", Style::default().fg(Color::Gray)),
        Span::raw(format!(" {}", crate::text_summary::format_elapsed(view.elapsed()))),
    ];
    if let Some(pid) = view.buffer.pid {
        status.push(Span::styled("  PID:", Style::default().fg(Color::Gray)));
        status.push(Span::raw(format!(" {pid}")));
    }
    header.push(Line::from(status));

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(header.len() as u16 + 2), Constraint::Min(0)].as_ref())
        .split(area);

    let p = Paragraph::new(header).block(Block::default().borders(Borders::ALL).title("Details"));
    f.render_widget(p, rows[0]);

    let visible = (rows[1].height as usize).saturating_sub(2);
    let total = view.buffer.lines.len();
    let end = total - view.scroll.min(total);
    let start = end.saturating_sub(visible);
    let lines: Vec<Line> = view.buffer.lines[start..end]
        .iter()
        .map(|l| Line::from(l.as_str()))
        .collect();

    let title = if view.scroll > 0 {
        format!("{} ({} lines, scrolled)", view.title(), total)
    } else {
        format!("{} ({} lines)", view.title(), total)
    };
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(p, rows[1]);
}

fn draw_models(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let models = &state.models;
    let Some(page) = models.page.as_ref() else {
        let msg = if models.loading {
            format!("Fetching {}…", models.url)
        } else {
            format!("Press r to fetch the model list from {}", models.url)
        };
        let p = Paragraph::new(msg).block(Block::default().borders(Borders::ALL).title("Models"));
        f.render_widget(p, area);
        return;
    };

    let link_style = Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::UNDERLINED);
    let selected_style = Style::default()
        .fg(Color::Black)
        .bg(Color::Yellow);

    let lines: Vec<Line> = page
        .lines
        .iter()
        .map(|line| {
            Line::from(
                line.iter()
                    .map(|span| match span {
                        PageSpan::Text(t) => Span::raw(t.as_str()),
                        PageSpan::Link(i) => Span::styled(
                            page.links[*i].text.as_str(),
                            if *i == models.selected {
                                selected_style
                            } else {
                                link_style
                            },
                        ),
                    })
                    .collect::<Vec<_>>(),
            )
        })
        .collect();

    // Keep the selected link roughly centred
    let height = (area.height as usize).saturating_sub(2);
    let offset = page
        .line_of_link(models.selected)
        .unwrap_or(0)
        .saturating_sub(height / 2);

    let mut title = format!("Models ({} links)", page.links.len());
    if let Some(href) = models.selected_href() {
        title.push_str(" - ");
        title.push_str(href);
    }
    let p = Paragraph::new(lines)
        .scroll((offset.min(u16::MAX as usize) as u16, 0))
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(p, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CommandLine, JobEvent, ModelType};
    use crate::orchestrator::LaunchedJob;

    fn config() -> LaunchConfig {
        LaunchConfig {
            interpreter: "python".into(),
            project_dir: PathBuf::from("."),
            settings_path: PathBuf::from("unused-settings.json"),
            models_url: "http://127.0.0.1:9/".into(),
            save_settings: false,
            user_agent: "test".into(),
        }
    }

    fn press(
        state: &mut UiState,
        tx: &UnboundedSender<UiCommand>,
        modifiers: KeyModifiers,
        code: KeyCode,
    ) -> Flow {
        handle_key(state, &config(), tx, modifiers, code)
    }

    #[test]
    fn invalid_submit_reports_first_missing_field() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut state = UiState::default();
        state.training.model_type = Some(ModelType::BsRoformer);

        press(&mut state, &tx, KeyModifiers::CONTROL, KeyCode::Char('r'));
        assert_eq!(state.info, "Please select a config file.");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn valid_submit_sends_launch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut state = UiState {
            tab: Tab::Inference,
            ..Default::default()
        };
        state.inference.model_type = Some(ModelType::Htdemucs);
        state.inference.config_path = "c.yaml".into();
        state.inference.input_folder = "in".into();
        state.inference.store_dir = "out".into();
        state.inference_focus = state.inference.len() - 1;

        press(&mut state, &tx, KeyModifiers::NONE, KeyCode::Enter);
        match rx.try_recv() {
            Ok(UiCommand::Launch(sub)) => assert_eq!(sub.command.args[0], "inference.py"),
            other => panic!("expected launch, got {other:?}"),
        }
    }

    #[test]
    fn q_types_into_text_fields_but_quits_elsewhere() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut state = UiState {
            training_focus: 1,
            ..Default::default()
        };
        assert!(matches!(
            press(&mut state, &tx, KeyModifiers::NONE, KeyCode::Char('q')),
            Flow::Continue
        ));
        assert_eq!(state.training.config_path, "q");

        state.training_focus = 0;
        assert!(matches!(
            press(&mut state, &tx, KeyModifiers::NONE, KeyCode::Char('q')),
            Flow::Quit
        ));
        assert!(matches!(
            press(&mut state, &tx, KeyModifiers::CONTROL, KeyCode::Char('c')),
            Flow::Quit
        ));
    }

    #[test]
    fn cancel_targets_the_selected_running_job() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_job_tx, job_rx) = mpsc::unbounded_channel::<JobEvent>();
        let mut state = UiState::default();
        state.add_job(LaunchedJob {
            id: 7,
            kind: JobKind::Training,
            command: CommandLine {
                program: "python".into(),
                args: vec!["train.py".into()],
            },
            output_dir: "results".into(),
            events: job_rx,
        });

        press(&mut state, &tx, KeyModifiers::NONE, KeyCode::Char('x'));
        assert!(matches!(rx.try_recv(), Ok(UiCommand::Cancel(7))));
    }

    #[test]
    fn models_fetch_and_page_render() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut state = UiState {
            tab: Tab::Models,
            ..Default::default()
        };

        press(&mut state, &tx, KeyModifiers::NONE, KeyCode::Char('r'));
        press(&mut state, &tx, KeyModifiers::NONE, KeyCode::Char('r'));
        assert!(matches!(rx.try_recv(), Ok(UiCommand::FetchModels)));
        assert!(rx.try_recv().is_err());
        assert!(state.models.loading);

        apply_event(
            &mut state,
            AppEvent::ModelsPage(
                r#"<p><a href="https://a/x.ckpt">x</a> <a href="https://a/y.yaml">y</a></p>"#
                    .into(),
            ),
        );
        assert!(!state.models.loading);
        press(&mut state, &tx, KeyModifiers::NONE, KeyCode::Down);
        assert_eq!(state.models.selected_href(), Some("https://a/y.yaml"));
    }
}
