use clap::Parser;
use crossbeam_channel::Receiver;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::{Frame, Terminal};
use std::io::{self, stdout};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use treesize::cli::{setup_logging, CliArgs};
use treesize::{Node, View, ViewCoordinator, ViewEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Path,
    Search,
    List,
}

struct App {
    views: Arc<ViewCoordinator>,
    view_rx: Receiver<ViewEvent>,
    path_input: String,
    search_input: String,
    focus: Focus,
    status: String,
    view: Option<View>,
    generation: u64,
    /// Directories entered below the view root, innermost last.
    trail: Vec<Arc<Node>>,
    selected: usize,
    should_quit: bool,
}

impl App {
    fn new(args: &CliArgs) -> io::Result<Self> {
        let views = ViewCoordinator::new(args.tree_options(), args.search_options())
            .map_err(|err| io::Error::other(err.to_string()))?;
        let (_, view_rx) = views.subscribe_channel();
        Ok(Self {
            views,
            view_rx,
            path_input: args.path.display().to_string(),
            search_input: args.search.clone().unwrap_or_default(),
            focus: Focus::List,
            status: String::from("Type a path and press Enter to scan"),
            view: None,
            generation: 0,
            trail: Vec::new(),
            selected: 0,
            should_quit: false,
        })
    }

    fn start_refresh(&mut self) {
        let path = if self.path_input.trim().is_empty() {
            ".".to_string()
        } else {
            self.path_input.trim().to_string()
        };

        if !Path::new(&path).exists() {
            self.status = format!("Path does not exist: {}", path);
            return;
        }

        self.path_input = path.clone();
        match self.views.refresh(&path, Some(self.search_input.as_str())) {
            Ok(ticket) => {
                self.status = format!("Scanning {} (#{})", path, ticket.generation);
            }
            Err(err) => {
                self.status = format!("Cannot scan {}: {}", path, err);
            }
        }
    }

    fn poll_view_updates(&mut self) {
        while let Ok(event) = self.view_rx.try_recv() {
            self.generation = event.generation;
            self.view = Some(event.view);
            self.trail.clear();
            self.selected = 0;
        }
    }

    fn current_directory(&self) -> Option<Arc<Node>> {
        match self.view.as_ref()? {
            View::Tree(root) => Some(self.trail.last().unwrap_or(root).clone()),
            View::Searching { .. } | View::Results { .. } => None,
        }
    }

    fn rows(&self) -> Vec<Arc<Node>> {
        match self.view.as_ref() {
            Some(View::Tree(_)) => self
                .current_directory()
                .and_then(|dir| dir.children().map(|children| children.snapshot()))
                .unwrap_or_default(),
            Some(View::Results { results, .. }) => results.snapshot(),
            Some(View::Searching { .. }) | None => Vec::new(),
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c')) {
            self.should_quit = true;
            return;
        }
        if key.code == KeyCode::Tab {
            self.focus = match self.focus {
                Focus::Path => Focus::Search,
                Focus::Search => Focus::List,
                Focus::List => Focus::Path,
            };
            return;
        }

        match self.focus {
            Focus::Path => match key.code {
                KeyCode::Enter => {
                    self.focus = Focus::List;
                    self.start_refresh();
                }
                KeyCode::Esc => self.focus = Focus::List,
                KeyCode::Backspace => {
                    self.path_input.pop();
                }
                KeyCode::Char(ch) => self.path_input.push(ch),
                _ => {}
            },
            Focus::Search => match key.code {
                KeyCode::Enter | KeyCode::Esc => self.focus = Focus::List,
                KeyCode::Backspace => {
                    self.search_input.pop();
                    self.start_refresh();
                }
                KeyCode::Char(ch) => {
                    self.search_input.push(ch);
                    self.start_refresh();
                }
                _ => {}
            },
            Focus::List => match key.code {
                KeyCode::Char('q') => self.should_quit = true,
                KeyCode::Char('/') => self.focus = Focus::Search,
                KeyCode::Char('p') => self.focus = Focus::Path,
                KeyCode::Char('r') => self.start_refresh(),
                KeyCode::Up | KeyCode::Char('k') => self.selected = self.selected.saturating_sub(1),
                KeyCode::Down | KeyCode::Char('j') => self.selected = self.selected.saturating_add(1),
                KeyCode::Home => self.selected = 0,
                KeyCode::End => self.selected = usize::MAX,
                KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => self.enter_selected(),
                KeyCode::Left | KeyCode::Backspace | KeyCode::Char('h') => self.leave_directory(),
                KeyCode::Esc => self.views.cancel_current(),
                _ => {}
            },
        }
    }

    fn enter_selected(&mut self) {
        if !matches!(self.view, Some(View::Tree(_))) {
            return;
        }
        let rows = self.rows();
        let Some(node) = rows.get(self.selected.min(rows.len().saturating_sub(1))) else {
            return;
        };
        if node.is_directory() {
            node.set_expanded(true);
            self.trail.push(Arc::clone(node));
            self.selected = 0;
        }
    }

    fn leave_directory(&mut self) {
        if let Some(node) = self.trail.pop() {
            node.set_expanded(false);
            self.selected = 0;
        }
    }
}

fn status_lines(app: &App) -> Vec<Line<'static>> {
    let label = Style::default().fg(Color::Gray);
    let mut lines = Vec::new();

    if let Some(view) = app.view.as_ref() {
        let root = view.root();
        let state = if root.is_size_final() { "done" } else { "measuring" };
        lines.push(Line::from(vec![
            Span::styled("Root: ", label),
            Span::raw(format!("{}  {} ({})", root.full_path().display(), root.size_string(), state)),
        ]));
        let detail = match view {
            View::Tree(_) => {
                let dir = app.current_directory().unwrap_or_else(|| Arc::clone(root));
                format!("Viewing {}  {}", dir.full_path().display(), dir.size_string())
            }
            View::Searching { term, .. } => format!("Searching for \"{}\"…", term),
            View::Results { term, results, .. } => {
                format!("{} match(es) for \"{}\"", results.len(), term)
            }
        };
        lines.push(Line::from(vec![
            Span::styled(format!("View #{}: ", app.generation), label),
            Span::raw(detail),
        ]));
    }
    lines.push(Line::from(Span::styled(app.status.clone(), label)));
    lines
}

fn input_block(title: &'static str, focused: bool) -> (Block<'static>, Style) {
    let style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::White)
    };
    (Block::default().title(title).borders(Borders::ALL), style)
}

fn draw_ui(frame: &mut Frame, app: &mut App) {
    let rows = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(5),
        Constraint::Min(5),
        Constraint::Length(1),
    ])
    .split(frame.area());
    let inputs = Layout::horizontal([Constraint::Percentage(60), Constraint::Percentage(40)]).split(rows[0]);

    let (path_block, path_style) = input_block(" Path ", app.focus == Focus::Path);
    frame.render_widget(
        Paragraph::new(app.path_input.as_str()).style(path_style).block(path_block),
        inputs[0],
    );
    let (search_block, search_style) = input_block(" Search ", app.focus == Focus::Search);
    frame.render_widget(
        Paragraph::new(app.search_input.as_str()).style(search_style).block(search_block),
        inputs[1],
    );

    frame.render_widget(
        Paragraph::new(status_lines(app))
            .block(Block::default().title(" Status ").borders(Borders::ALL)),
        rows[1],
    );

    let nodes = app.rows();
    if nodes.is_empty() {
        app.selected = 0;
    } else {
        app.selected = app.selected.min(nodes.len() - 1);
    }
    let show_paths = matches!(app.view, Some(View::Results { .. }));
    let items: Vec<ListItem> = nodes
        .iter()
        .map(|node| {
            let name = if show_paths {
                node.full_path().display().to_string()
            } else {
                node.name().to_string()
            };
            let suffix = if node.is_directory() { "/" } else { "" };
            let size_style = if node.is_size_final() {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:>12}  ", node.size_string()), size_style),
                Span::raw(format!("{}{}", name, suffix)),
            ]))
        })
        .collect();

    let title = format!(" Entries ({}) ", nodes.len());
    let list = List::new(items)
        .block(Block::default().title(title).borders(Borders::ALL))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut state = ListState::default().with_selected((!nodes.is_empty()).then_some(app.selected));
    frame.render_stateful_widget(list, rows[2], &mut state);

    frame.render_widget(
        Paragraph::new("Tab: focus  Enter/→: open  ←: back  /: search  p: path  r: rescan  Esc: stop  q: quit")
            .style(Style::default().fg(Color::Gray)),
        rows[3],
    );
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, args: &CliArgs) -> io::Result<()> {
    let mut app = App::new(args)?;
    app.start_refresh();

    loop {
        app.poll_view_updates();

        terminal.draw(|frame| {
            draw_ui(frame, &mut app);
        })?;

        if app.should_quit {
            break;
        }

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                app.on_key(key);
            }
        }
    }

    app.views.cancel_current();
    Ok(())
}

fn main() -> io::Result<()> {
    let args = CliArgs::parse();
    if let Some(log_file) = args.log_file.as_deref() {
        setup_logging(args.verbose, Some(log_file))?;
    }

    enable_raw_mode()?;
    crossterm::execute!(stdout(), EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let app_result = run_app(&mut terminal, &args);

    disable_raw_mode()?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    app_result
}
