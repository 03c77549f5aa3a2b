use std::{
    any::Any,
    fmt::Display,
    io,
    path::PathBuf,
    str::FromStr,
    sync::{Arc, Mutex},
    time::Duration,
};

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyModifiers};

use futures::StreamExt;
use tokio::runtime::Runtime;

use tui::{
    backend::{Backend, CrosstermBackend},
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Span, Spans},
    widgets::{
        canvas::{Context, Line as CanvasLine, Points},
        Block, List, ListItem,
    },
    Frame, Terminal,
};

use osm_explorer::{
    config::Config,
    envelope::BufferKm,
    export,
    normalize::{Column, TableRow},
    pipeline::TagRecord,
    query::{Endpoint, Template, TEMPLATES},
    session::{self, Command, Session},
    util::{DotsSpinner, Pager, WrappingList},
    Services,
};

trait ParamValue: Display + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn cloned(&self) -> Box<dyn ParamValue>;
    fn from_str(&mut self, s: &str) -> bool;
}

impl<E, T: Clone + Display + Send + Sync + FromStr<Err = E> + 'static> ParamValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn cloned(&self) -> Box<dyn ParamValue> {
        Box::new(self.clone())
    }

    fn from_str(&mut self, s: &str) -> bool {
        match s.parse() {
            Ok(r) => {
                *self = r;
                true
            }
            Err(_) => false,
        }
    }
}

struct State {
    focus: WidgetId,
    session: Session,
    services: Services,
    place_input: String,
    query_input: String,
    endpoints: WrappingList<Endpoint>,
    templates: WrappingList<Template>,
    tags: WrappingList<TagRecord>,
    rows: Vec<TableRow>,
    pager: Pager,
    columns: WrappingList<(Column, bool)>,
    params: WrappingList<(&'static str, Box<dyn ParamValue>)>,
    worker_state: WorkerState,
    fetching_spinner: DotsSpinner,
    parm_edit_state: Option<ParmEditState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WidgetId {
    Place,
    Endpoints,
    Templates,
    Query,
    Options,
    Tags,
    Features,
    Columns,
    ResultMap,
    Error,
    ParamEdit,
}

enum WorkerState {
    Idle,
    Fetching,
    Error(String),
}

struct ParmEditState {
    buffer: String,
    value: Box<dyn ParamValue>,
    is_valid: bool,
}

impl ParmEditState {
    fn new(mut value: Box<dyn ParamValue>) -> Self {
        let buffer = value.to_string();
        let is_valid = value.from_str(&buffer);
        ParmEditState {
            buffer,
            value,
            is_valid,
        }
    }
}

impl State {
    const BUFFER_OPTION: &'static str = "Buffer km";
    const OPEN_OPTION: &'static str = "Open on export";

    fn new(services: Services) -> Self {
        let session = Session::new(services.query_settings());

        State {
            focus: WidgetId::Place,
            place_input: session.place().to_string(),
            query_input: session.query_text().to_string(),
            session,
            services,
            endpoints: WrappingList::new(Endpoint::ALL.to_vec()),
            templates: WrappingList::new(TEMPLATES.to_vec()),
            tags: WrappingList::new(vec![]),
            rows: vec![],
            pager: Pager::default(),
            columns: WrappingList::new(
                Column::ALL
                    .iter()
                    .map(|c| (*c, !c.hidden_by_default()))
                    .collect(),
            ),
            params: WrappingList::new(vec![
                (Self::BUFFER_OPTION, Box::new(BufferKm::default())),
                (Self::OPEN_OPTION, Box::new(false)),
            ]),
            worker_state: WorkerState::Idle,
            fetching_spinner: DotsSpinner::new(),
            parm_edit_state: None,
        }
    }

    fn worker_busy(&self) -> bool {
        match self.worker_state {
            WorkerState::Fetching => true,
            WorkerState::Idle | WorkerState::Error(_) => false,
        }
    }

    fn max_option_key_len(&self) -> usize {
        self.params
            .iter()
            .map(|(k, _)| k.len())
            .max()
            .unwrap_or_default()
    }

    fn param<T: Any>(&self, key: &str) -> Option<&T> {
        self.params
            .iter()
            .find(|(k, _)| *k == key)
            .and_then(|(_, v)| v.as_any().downcast_ref::<T>())
    }

    fn set_current_param(&mut self, value: Box<dyn ParamValue>) {
        if let Some((_, v)) = self.params.selected_mut() {
            *v = value;
        }
    }

    fn set_param(&mut self, key: &str, value: Box<dyn ParamValue>) {
        if let Some((_, v)) = self.params.iter_mut().find(|(k, _)| *k == key) {
            *v = value;
        }
    }

    /// Feeds an event to the session, refreshes what the widgets show and
    /// starts the follow-up command if there is one.
    fn apply(&mut self, state_m: &Arc<Mutex<Self>>, event: session::Event) {
        let next = self.session.dispatch(event);

        if let Some(e) = self.session.take_error() {
            self.worker_state = WorkerState::Error(e);
            self.focus = WidgetId::Error;
        }

        self.tags.replace(self.session.vocabulary().to_vec());
        self.rows = self.session.table_rows();
        self.pager.reset(self.rows.len());

        if let Some(command) = next {
            self.run(Arc::clone(state_m), command);
        }
    }

    fn run(&mut self, state: Arc<Mutex<Self>>, command: Command) {
        self.worker_state = WorkerState::Fetching;
        self.fetching_spinner = DotsSpinner::new();

        let services = self.services.clone();

        let _complete = tokio::task::spawn(async move {
            let event = services.run(command).await;

            let mut st = state.lock().unwrap();
            st.worker_state = WorkerState::Idle;
            st.apply(&state, event);
        });
    }

    fn export(&mut self) {
        let path = PathBuf::from(export::file_name(self.session.place()));

        let result = export::write(&path, self.session.displayed()).and_then(|_| {
            if *self.param::<bool>(Self::OPEN_OPTION).unwrap_or(&false) {
                opener::open(&path)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            }
            Ok(())
        });

        if let Err(e) = result {
            self.worker_state = WorkerState::Error(format!("export failed: {e}"));
            self.focus = WidgetId::Error;
        } else {
            tracing::info!("exported to {}", path.display());
        }
    }
}

async fn main_loop(terminal: &mut Terminal<impl Backend>, services: Services) -> anyhow::Result<()> {
    let mut reader = EventStream::new();
    let state = Arc::new(Mutex::new(State::new(services)));

    {
        let mut st = state.lock().unwrap();
        let place = st.place_input.clone();
        st.apply(&state, session::Event::SetPlace(place));
    }

    loop {
        terminal.draw(|f| {
            let mut state = state.lock().unwrap();
            draw(f, &mut state)
        })?;

        let ev = match tokio::time::timeout(Duration::from_millis(50), reader.next()).await {
            Err(_) => {
                // timeout expired
                continue;
            }
            Ok(ev) => ev,
        };

        let mut st = state.lock().unwrap();
        match ev {
            Some(Ok(event)) => {
                let KeyEvent {
                    code, modifiers, ..
                } = match event {
                    Event::Key(k) => k,
                    _ => continue,
                };

                if quits(st.focus, code, modifiers) {
                    break;
                }

                if st.focus != WidgetId::ParamEdit && st.focus != WidgetId::Error {
                    if code == KeyCode::Tab || code == KeyCode::BackTab {
                        let tab_order = [
                            WidgetId::Place,
                            WidgetId::Endpoints,
                            WidgetId::Templates,
                            WidgetId::Query,
                            WidgetId::Options,
                            WidgetId::Tags,
                            WidgetId::Features,
                            WidgetId::Columns,
                            WidgetId::ResultMap,
                        ];
                        let current = tab_order.iter().position(|w| w == &st.focus).unwrap_or(0);
                        let next = current
                            + if code == KeyCode::Tab {
                                1
                            } else {
                                tab_order.len() - 1
                            };

                        st.focus = tab_order[next % tab_order.len()];
                        continue;
                    }
                }

                handle_key_event(code, &mut st, &state);
            }
            Some(Err(_)) | None => break,
        }
    }

    Ok(())
}

/// Esc quits from the panels only, the param editor and the error overlay
/// use it themselves or wait for Enter.
fn quits(focus: WidgetId, code: KeyCode, modifiers: KeyModifiers) -> bool {
    if focus == WidgetId::ParamEdit {
        return false;
    }

    (code, modifiers) == (KeyCode::Char('c'), KeyModifiers::CONTROL)
        || (code == KeyCode::Esc && focus != WidgetId::Error)
}

fn init_logging() {
    let path = std::env::var("OSM_EXPLORER_LOG").unwrap_or_else(|_| "osm-explorer.log".to_string());
    let Ok(file) = std::fs::File::create(&path) else {
        return;
    };

    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::builder().from_env_lossy()
    } else {
        tracing_subscriber::EnvFilter::builder().parse_lossy("osm_explorer=debug")
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let config = Config::load();
    let services = Services::new(&config)?;

    crossterm::terminal::enable_raw_mode()?;

    let stdout = io::stdout();
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    terminal.clear()?;

    let runtime = Runtime::new()?;
    let res = runtime.block_on(main_loop(&mut terminal, services));

    terminal.clear()?;
    crossterm::terminal::disable_raw_mode()?;

    if let Err(e) = &res {
        tracing::error!("terminal loop failed: {e}");
    }
    res
}

fn draw(f: &mut Frame<impl Backend>, state: &mut State) {
    use tui::{
        layout::{Constraint, Direction, Layout},
        widgets::{
            canvas::{Canvas, Rectangle},
            Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap,
        },
    };

    let focus = state.focus;
    let block = |widget, title: String| {
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(if focus == widget {
                Style::default().fg(Color::LightYellow)
            } else {
                Style::default()
            })
    };

    let list = |widget, title: &str, symbol, items| {
        styled_list(block(widget, title.to_string()), symbol, items)
    };

    let worker_busy = {
        match state.worker_state {
            WorkerState::Idle => false,
            WorkerState::Fetching => {
                state.fetching_spinner.tick();
                true
            }
            WorkerState::Error(ref e) => {
                let error = Paragraph::new(format!("{e}\n\nPress <Enter> to continue."))
                    .block(block(WidgetId::Error, "Error".to_string()))
                    .wrap(Wrap { trim: true });
                f.render_widget(error, f.size());
                return;
            }
        }
    };

    let hchunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(f.size());

    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Length(4),
                Constraint::Length(6),
                Constraint::Min(8),
                Constraint::Length(4),
                Constraint::Percentage(35),
            ]
            .as_ref(),
        )
        .split(hchunks[0]);

    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage(30),
                Constraint::Percentage(30),
                Constraint::Min(6),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(hchunks[1]);

    let tag_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(75), Constraint::Percentage(25)])
        .split(right_chunks[0]);

    let symbol = if worker_busy {
        state.fetching_spinner.pattern().to_string() + " "
    } else {
        "> ".to_string()
    };

    // place
    let place_input = Paragraph::new(state.place_input.as_ref())
        .block(block(WidgetId::Place, "City".to_string()))
        .wrap(Wrap { trim: true });
    f.render_widget(place_input, left_chunks[0]);

    // endpoints
    let active_endpoint = state.session.endpoint();
    let endpoints = list(
        WidgetId::Endpoints,
        "Overpass endpoint",
        symbol.as_str(),
        state
            .endpoints
            .iter()
            .map(|e| ListItem::new(format!("{} {e}", marker(*e == active_endpoint))))
            .collect::<Vec<_>>(),
    );
    f.render_stateful_widget(endpoints, left_chunks[1], state.endpoints.state());

    // templates
    let active_template = state.session.template();
    let templates = list(
        WidgetId::Templates,
        "Templates",
        symbol.as_str(),
        state
            .templates
            .iter()
            .enumerate()
            .map(|(ix, t)| {
                ListItem::new(Spans::from(vec![
                    Span::raw(format!("{} {}", marker(ix == active_template), t.label)),
                    Span::styled(
                        format!(" {}", t.filter),
                        Style::default().add_modifier(Modifier::ITALIC),
                    ),
                ]))
            })
            .collect::<Vec<_>>(),
    );
    f.render_stateful_widget(templates, left_chunks[2], state.templates.state());

    // query editor and the query actually sent
    let mut query_text = vec![
        Spans::from(state.query_input.as_str()),
        Spans::from(""),
    ];
    query_text.extend(
        state
            .session
            .query()
            .unwrap_or("(no area to query)")
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| {
                Spans::from(Span::styled(
                    l.to_string(),
                    Style::default().add_modifier(Modifier::DIM),
                ))
            }),
    );
    let query = Paragraph::new(query_text)
        .block(block(WidgetId::Query, "Overpass request".to_string()))
        .wrap(Wrap { trim: false });
    f.render_widget(query, left_chunks[3]);

    // options
    let max_option_key_len = state.max_option_key_len();
    let options = list(
        WidgetId::Options,
        "Options",
        "* ",
        state
            .params
            .iter()
            .map(|(k, v)| {
                let mut s = k.to_string();
                s += ": ";
                for _ in 0..max_option_key_len - k.len() {
                    s.push(' ');
                }
                s += &v.to_string();

                ListItem::new(s)
            })
            .collect(),
    );
    if state.focus == WidgetId::Options {
        f.render_stateful_widget(options, left_chunks[4], state.params.state());
    } else {
        f.render_widget(options, left_chunks[4]);
    }

    // area map
    let area_view = state.session.area_viewport();
    let envelope = state.session.envelope().copied();
    let (x_bounds, y_bounds) = area_view.extent(aspect(left_chunks[5]));
    let area_map = Canvas::default()
        .block(block(
            WidgetId::Place,
            format!("Area ({:.4}, {:.4}) z{}", area_view.lat, area_view.lon, area_view.zoom),
        ))
        .x_bounds(x_bounds)
        .y_bounds(y_bounds)
        .paint(move |ctx| {
            if let Some(env) = &envelope {
                ctx.draw(&Rectangle {
                    x: env.min.lon,
                    y: env.min.lat,
                    width: env.max.lon - env.min.lon,
                    height: env.max.lat - env.min.lat,
                    color: Color::Red,
                });
                ctx.draw(&Points {
                    coords: &[(env.center.lon, env.center.lat)],
                    color: Color::Red,
                });
            }
        });
    f.render_widget(area_map, left_chunks[5]);

    // tag vocabulary
    let selection = state.session.selection();
    let tags = list(
        WidgetId::Tags,
        &format!("Tags ({} selected)", selection.tags.len()),
        symbol.as_str(),
        state
            .tags
            .iter()
            .map(|t| ListItem::new(format!("{} {}", checkbox(selection.tags.contains(t)), t)))
            .collect::<Vec<_>>(),
    );
    f.render_stateful_widget(tags, tag_chunks[0], state.tags.state());

    // column sidebar
    let columns = list(
        WidgetId::Columns,
        "Columns",
        "> ",
        state
            .columns
            .iter()
            .map(|(c, visible)| ListItem::new(format!("{} {}", checkbox(*visible), c.title())))
            .collect::<Vec<_>>(),
    );
    f.render_stateful_widget(columns, tag_chunks[1], state.columns.state());

    // feature table
    let table_area = right_chunks[1];
    state
        .pager
        .set_page_size(table_area.height.saturating_sub(3) as usize);

    let visible_columns = state
        .columns
        .iter()
        .filter(|(_, visible)| *visible)
        .map(|(c, _)| *c)
        .collect::<Vec<_>>();

    let selection = state.session.selection();
    let range = state.pager.visible();
    let rows = state.rows[range.clone()]
        .iter()
        .map(|r| {
            let mut cells = vec![Cell::from(checkbox(selection.rows.contains(&r.id)))];
            cells.extend(visible_columns.iter().map(|c| Cell::from(r.cell(*c).to_string())));
            Row::new(cells)
        })
        .collect::<Vec<_>>();

    let mut widths = vec![Constraint::Length(3)];
    widths.extend(visible_columns.iter().map(|c| match c {
        Column::Type => Constraint::Length(8),
        Column::Id => Constraint::Length(12),
        _ => Constraint::Min(10),
    }));

    let header = Row::new(
        std::iter::once("").chain(visible_columns.iter().map(|c| c.title())),
    )
    .style(Style::default().add_modifier(Modifier::BOLD));

    let table = Table::new(rows)
        .header(header)
        .block(block(
            WidgetId::Features,
            format!(
                "Features {}/{} ({} selected, page {}/{})",
                state.rows.len(),
                state.session.collection().map_or(0, |c| c.len()),
                selection.rows.len(),
                state.pager.page() + 1,
                state.pager.pages()
            ),
        ))
        .widths(&widths)
        .highlight_symbol("> ")
        .highlight_style(Style::default().fg(Color::LightYellow));

    let mut table_state = TableState::default();
    table_state.select(state.pager.cursor().map(|c| c - range.start));
    f.render_stateful_widget(table, table_area, &mut table_state);

    // result map
    let view = state.session.viewport();
    let highlighted = state
        .pager
        .cursor()
        .and_then(|c| state.rows.get(c))
        .map(|r| r.id);
    let displayed = state.session.displayed().collect::<Vec<_>>();
    let label_all = displayed.len() <= 30;
    let labels = displayed
        .iter()
        .filter(|(f, name)| !name.is_empty() && (label_all || Some(f.id) == highlighted))
        .filter_map(|(f, name)| {
            let c = geo::CoordsIter::coords_iter(&f.geometry).next()?;
            Some((c.x, c.y, name.to_string()))
        })
        .collect::<Vec<_>>();

    let (x_bounds, y_bounds) = view.extent(aspect(right_chunks[2]));
    let result_map = Canvas::default()
        .block(block(
            WidgetId::ResultMap,
            format!(
                "Map: {} shown ({:.4}, {:.4}) z{}",
                displayed.len(),
                view.lat,
                view.lon,
                view.zoom
            ),
        ))
        .x_bounds(x_bounds)
        .y_bounds(y_bounds)
        .paint(|ctx| {
            for (feature, _) in &displayed {
                let color = if Some(feature.id) == highlighted {
                    Color::LightYellow
                } else if matches!(feature.geometry, geo::Geometry::Point(_)) {
                    Color::Green
                } else {
                    Color::Red
                };
                draw_geometry(ctx, &feature.geometry, color);
            }

            ctx.layer();
            for (x, y, name) in &labels {
                ctx.print(*x, *y, name.clone());
            }
        });
    f.render_widget(result_map, right_chunks[2]);

    let help = Paragraph::new(
        "<Tab> switch section, arrows/jk move, <Enter> apply, <Space> check, \
         ←/→ buffer, c clear selection, n/p page, e export, Esc quit",
    )
    .block(Block::default().borders(Borders::ALL).title("Help"))
    .wrap(Wrap { trim: true });
    f.render_widget(help, right_chunks[3]);

    if state.focus == WidgetId::ParamEdit {
        let Some(edit_state) = state.parm_edit_state.as_ref() else {
            return;
        };

        if let Some((param, _)) = state.params.selected() {
            let parm_edit = Paragraph::new(edit_state.buffer.as_ref())
                .block(block(WidgetId::ParamEdit, param.to_string()))
                .wrap(Wrap { trim: true })
                .style(if edit_state.is_valid {
                    Style::default()
                } else {
                    Style::default().bg(Color::LightRed)
                });

            let hcentered = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([
                    Constraint::Percentage(30),
                    Constraint::Percentage(40),
                    Constraint::Percentage(30),
                ])
                .split(f.size());
            let vcentered = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Percentage(30),
                    Constraint::Max(3),
                    Constraint::Percentage(30),
                ])
                .split(hcentered[1]);

            f.render_widget(Clear, vcentered[1]);
            f.render_widget(parm_edit, vcentered[1]);
        }
    }
}

fn styled_list<'a>(block: Block<'a>, symbol: &'a str, items: Vec<ListItem<'a>>) -> List<'a> {
    List::new(items)
        .block(block)
        .highlight_symbol(symbol)
        .highlight_style(
            Style::default()
                .fg(Color::LightYellow)
                .add_modifier(Modifier::ITALIC | Modifier::DIM),
        )
}

fn marker(active: bool) -> &'static str {
    if active {
        "(*)"
    } else {
        "( )"
    }
}

fn checkbox(checked: bool) -> &'static str {
    if checked {
        "[x]"
    } else {
        "[ ]"
    }
}

/// Height over width of a map panel, terminal cells being about twice as
/// tall as wide.
fn aspect(area: Rect) -> f64 {
    let w = area.width.saturating_sub(2).max(1) as f64;
    let h = area.height.saturating_sub(2).max(1) as f64;
    h * 2.0 / w
}

fn draw_geometry(ctx: &mut Context, geometry: &geo::Geometry<f64>, color: Color) {
    use geo::Geometry as G;

    match geometry {
        G::Point(p) => ctx.draw(&Points {
            coords: &[(p.x(), p.y())],
            color,
        }),
        G::MultiPoint(mp) => {
            let coords = mp.0.iter().map(|p| (p.x(), p.y())).collect::<Vec<_>>();
            ctx.draw(&Points {
                coords: &coords,
                color,
            });
        }
        G::Line(l) => draw_line_string(ctx, &geo::LineString::new(vec![l.start, l.end]), color),
        G::LineString(ls) => draw_line_string(ctx, ls, color),
        G::MultiLineString(mls) => {
            for ls in &mls.0 {
                draw_line_string(ctx, ls, color);
            }
        }
        G::Polygon(p) => draw_polygon(ctx, p, color),
        G::MultiPolygon(mp) => {
            for p in &mp.0 {
                draw_polygon(ctx, p, color);
            }
        }
        G::GeometryCollection(gc) => {
            for g in &gc.0 {
                draw_geometry(ctx, g, color);
            }
        }
        G::Rect(r) => draw_polygon(ctx, &r.to_polygon(), color),
        G::Triangle(t) => draw_polygon(ctx, &t.to_polygon(), color),
    }
}

fn draw_polygon(ctx: &mut Context, polygon: &geo::Polygon<f64>, color: Color) {
    draw_line_string(ctx, polygon.exterior(), color);
    for ring in polygon.interiors() {
        draw_line_string(ctx, ring, color);
    }
}

fn draw_line_string(ctx: &mut Context, ls: &geo::LineString<f64>, color: Color) {
    for segment in ls.lines() {
        ctx.draw(&CanvasLine {
            x1: segment.start.x,
            y1: segment.start.y,
            x2: segment.end.x,
            y2: segment.end.y,
            color,
        });
    }
}

fn handle_key_event(code: KeyCode, state: &mut State, state_m: &Arc<Mutex<State>>) {
    if state.worker_busy() {
        return;
    }

    match state.focus {
        WidgetId::Place => match code {
            KeyCode::Enter => {
                let place = state.place_input.clone();
                state.apply(state_m, session::Event::SetPlace(place));
            }
            code => {
                edit_string(&mut state.place_input, code);
            }
        },
        WidgetId::Endpoints => match code {
            KeyCode::Up | KeyCode::Char('k') => state.endpoints.up(),
            KeyCode::Down | KeyCode::Char('j') => state.endpoints.down(),
            KeyCode::Enter | KeyCode::Char(' ') => {
                if let Some(endpoint) = state.endpoints.selected().copied() {
                    state.apply(state_m, session::Event::SelectEndpoint(endpoint));
                }
            }
            _ => {}
        },
        WidgetId::Templates => match code {
            KeyCode::Up | KeyCode::Char('k') => state.templates.up(),
            KeyCode::Down | KeyCode::Char('j') => state.templates.down(),
            KeyCode::Enter | KeyCode::Char(' ') => {
                if let Some(ix) = state.templates.selected_ix() {
                    state.apply(state_m, session::Event::SelectTemplate(ix));
                    state.query_input = state.session.query_text().to_string();
                }
            }
            _ => {}
        },
        WidgetId::Query => match code {
            KeyCode::Enter => state.apply(state_m, session::Event::SubmitQuery),
            code => {
                if edit_string(&mut state.query_input, code) {
                    let text = state.query_input.clone();
                    state.apply(state_m, session::Event::SetQueryText(text));
                }
            }
        },
        WidgetId::Options => match code {
            KeyCode::Up | KeyCode::Char('k') => state.params.up(),
            KeyCode::Down | KeyCode::Char('j') => state.params.down(),
            KeyCode::Left | KeyCode::Right => {
                if let Some(buffer) = state.param::<BufferKm>(State::BUFFER_OPTION).copied() {
                    let buffer = if code == KeyCode::Left {
                        buffer.decrease()
                    } else {
                        buffer.increase()
                    };
                    state.set_param(State::BUFFER_OPTION, Box::new(buffer));
                    state.apply(state_m, session::Event::SetBuffer(buffer));
                }
            }
            KeyCode::Enter => {
                if let Some((_param, value)) = state.params.selected() {
                    state.parm_edit_state = Some(ParmEditState::new(value.cloned()));
                    state.focus = WidgetId::ParamEdit;
                }
            }
            _ => {}
        },
        WidgetId::ParamEdit => match code {
            KeyCode::Enter => {
                if state.parm_edit_state.as_ref().map_or(false, |s| s.is_valid) {
                    let Some(edit_state) = state.parm_edit_state.take() else {
                        return;
                    };

                    state.set_current_param(edit_state.value);
                    state.focus = WidgetId::Options;

                    if let Some(buffer) = state.param::<BufferKm>(State::BUFFER_OPTION).copied() {
                        state.apply(state_m, session::Event::SetBuffer(buffer));
                    }
                }
            }
            KeyCode::Esc => {
                state.parm_edit_state = None;
                state.focus = WidgetId::Options;
            }
            _ => {
                if let Some(edit_state) = state.parm_edit_state.as_mut() {
                    edit_string(&mut edit_state.buffer, code);
                    edit_state.is_valid = edit_state.value.from_str(&edit_state.buffer);
                }
            }
        },
        WidgetId::Tags => match code {
            KeyCode::Up | KeyCode::Char('k') => state.tags.up(),
            KeyCode::Down | KeyCode::Char('j') => state.tags.down(),
            KeyCode::Enter | KeyCode::Char(' ') => {
                if let Some(tag) = state.tags.selected().cloned() {
                    state.apply(state_m, session::Event::ToggleTag(tag));
                }
            }
            KeyCode::Char('c') => state.apply(state_m, session::Event::ClearSelection),
            _ => {}
        },
        WidgetId::Features => match code {
            KeyCode::Up | KeyCode::Char('k') => state.pager.up(),
            KeyCode::Down | KeyCode::Char('j') => state.pager.down(),
            KeyCode::PageDown | KeyCode::Char('n') => state.pager.next_page(),
            KeyCode::PageUp | KeyCode::Char('p') => state.pager.prev_page(),
            KeyCode::Enter | KeyCode::Char(' ') => {
                let id = state.pager.cursor().and_then(|c| state.rows.get(c)).map(|r| r.id);
                if let Some(id) = id {
                    state.apply(state_m, session::Event::ToggleRow(id));
                }
            }
            KeyCode::Char('c') => state.apply(state_m, session::Event::ClearSelection),
            KeyCode::Char('e') => state.export(),
            _ => {}
        },
        WidgetId::Columns => match code {
            KeyCode::Up | KeyCode::Char('k') => state.columns.up(),
            KeyCode::Down | KeyCode::Char('j') => state.columns.down(),
            KeyCode::Enter | KeyCode::Char(' ') => {
                if let Some((_, visible)) = state.columns.selected_mut() {
                    *visible = !*visible;
                }
            }
            _ => {}
        },
        WidgetId::ResultMap => {
            if code == KeyCode::Char('e') {
                state.export();
            }
        }
        WidgetId::Error => {
            if code == KeyCode::Enter {
                state.worker_state = WorkerState::Idle;
                state.focus = WidgetId::Place;
            }
        }
    }
}

fn edit_string(s: &mut String, code: KeyCode) -> bool {
    match code {
        KeyCode::Backspace => {
            s.pop();
            true
        }
        KeyCode::Char(c) => {
            s.push(c);
            true
        }
        _ => false,
    }
}
