use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::info;
use rand::Rng;
use ratatui::{prelude::*, widgets::*};
use simplelog::{Config, LevelFilter, WriteLogger};
use std::collections::VecDeque;
use std::fs::File;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

const GRID_WIDTH: u16 = 32;
const GRID_HEIGHT: u16 = 24;
// One grid cell spans two terminal columns to compensate for the
// character cell aspect ratio.
const CELL_COLS: u16 = 2;
const TICK_RATE: Duration = Duration::from_millis(100);

const BACKGROUND_COLOR: Color = Color::Black;
const BORDER_COLOR: Color = Color::Rgb(93, 216, 228);
const FOOD_COLOR: Color = Color::Rgb(255, 0, 0);
const SNAKE_COLOR: Color = Color::Rgb(0, 255, 0);

const CENTER: Cell = Cell {
    x: GRID_WIDTH / 2,
    y: GRID_HEIGHT / 2,
};

const LOG_FILE: &str = "zmeyka.log";

fn main() -> Result<(), io::Error> {
    // Set up logging before anything else
    WriteLogger::init(
        LevelFilter::Info,
        Config::default(),
        File::create(LOG_FILE)?,
    )
    .expect("Failed to initialize logger");

    info!("Starting zmeyka");

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;

    let mut surface = TermSurface::new(terminal);
    let result = run(&mut surface);

    // Cleanup terminal
    disable_raw_mode()?;
    let terminal = surface.terminal_mut();
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    info!("Clean shutdown");
    result
}

fn run(surface: &mut TermSurface) -> io::Result<()> {
    let mut rng = rand::thread_rng();
    let mut ticker = Ticker::new(TICK_RATE);
    let mut game = Game::new(&mut rng);

    loop {
        ticker.wait();

        for input in poll_input()? {
            match input {
                InputEvent::Quit => {
                    info!("Quit requested");
                    return Ok(());
                }
                InputEvent::Turn(dir) => game.steer(dir),
            }
        }

        game.tick(surface, &mut rng);
        surface.present()?;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
    Left,
    Right,
}

const DIRECTIONS: [Direction; 4] = [
    Direction::Up,
    Direction::Down,
    Direction::Left,
    Direction::Right,
];

impl Direction {
    fn opposite(&self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    fn offset(&self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Cell {
    x: u16,
    y: u16,
}

impl Cell {
    // Toroidal topology: leaving one edge re-enters from the opposite edge.
    fn step(&self, dir: Direction) -> Cell {
        let (dx, dy) = dir.offset();
        Cell {
            x: (self.x as i32 + dx).rem_euclid(GRID_WIDTH as i32) as u16,
            y: (self.y as i32 + dy).rem_euclid(GRID_HEIGHT as i32) as u16,
        }
    }
}

fn all_cells() -> impl Iterator<Item = Cell> {
    (0..GRID_HEIGHT).flat_map(|y| (0..GRID_WIDTH).map(move |x| Cell { x, y }))
}

fn cell_index(cell: Cell) -> usize {
    cell.y as usize * GRID_WIDTH as usize + cell.x as usize
}

// Terminal footprint of one grid cell inside the board area.
fn cell_rect(cell: Cell, area: Rect) -> Rect {
    Rect {
        x: area.x + cell.x * CELL_COLS,
        y: area.y + cell.y,
        width: CELL_COLS,
        height: 1,
    }
}

#[derive(Debug)]
struct Snake {
    body: VecDeque<Cell>,
    length: usize,
    direction: Direction,
    pending: Option<Direction>,
    removed_tail: Option<Cell>,
}

impl Snake {
    fn new() -> Self {
        Snake {
            body: VecDeque::from([CENTER]),
            length: 1,
            direction: Direction::Right,
            pending: None,
            removed_tail: None,
        }
    }

    fn head(&self) -> Cell {
        self.body[0]
    }

    fn body_without_head(&self) -> impl Iterator<Item = &Cell> {
        self.body.iter().skip(1)
    }

    fn set_pending_direction(&mut self, dir: Direction) {
        // A single keypress must not reverse the snake into itself.
        if dir != self.direction.opposite() {
            self.pending = Some(dir);
        }
    }

    fn advance(&mut self) {
        if let Some(dir) = self.pending.take() {
            self.direction = dir;
        }

        let new_head = self.head().step(self.direction);
        self.body.push_front(new_head);

        // Trim to the target length; the vacated cell is kept around
        // so the renderer can erase it.
        if self.body.len() > self.length {
            self.removed_tail = self.body.pop_back();
        } else {
            self.removed_tail = None;
        }
    }

    fn grow(&mut self) {
        self.length += 1;
        // Duplicate the tail so the body stays contiguous until the
        // next advance stretches it out.
        if let Some(&tail) = self.body.back() {
            self.body.push_back(tail);
        }
    }

    fn hit_itself(&self) -> bool {
        // A freshly grown two-segment snake carries a duplicated tail
        // cell that may transiently coincide with the head.
        self.body.len() > 2 && self.body_without_head().any(|&cell| cell == self.head())
    }

    fn reset(&mut self, rng: &mut impl Rng) {
        self.length = 1;
        self.body.clear();
        self.body.push_front(CENTER);
        self.direction = DIRECTIONS[rng.gen_range(0..DIRECTIONS.len())];
        self.pending = None;
        self.removed_tail = None;
    }
}

#[derive(Debug)]
struct Food {
    cell: Cell,
}

impl Food {
    fn spawn(occupied: &VecDeque<Cell>, rng: &mut impl Rng) -> Self {
        let mut food = Food { cell: CENTER };
        food.relocate(occupied, rng);
        food
    }

    fn relocate(&mut self, occupied: &VecDeque<Cell>, rng: &mut impl Rng) {
        let free: Vec<Cell> = all_cells().filter(|cell| !occupied.contains(cell)).collect();
        assert!(!free.is_empty(), "board exhausted: no free cell for food");
        self.cell = free[rng.gen_range(0..free.len())];
    }
}

struct Game {
    snake: Snake,
    food: Food,
}

impl Game {
    fn new(rng: &mut impl Rng) -> Self {
        let snake = Snake::new();
        let food = Food::spawn(&snake.body, rng);
        Game { snake, food }
    }

    fn steer(&mut self, dir: Direction) {
        self.snake.set_pending_direction(dir);
    }

    // One fixed-cadence update. Eating and collision are evaluated
    // against the head's current resting cell, before it moves.
    fn tick(&mut self, surface: &mut impl Surface, rng: &mut impl Rng) {
        if self.food.cell == self.snake.head() {
            self.snake.grow();
            self.food.relocate(&self.snake.body, rng);
        }

        if self.snake.hit_itself() {
            info!(
                "Self-collision at {:?} with length {}, resetting",
                self.snake.head(),
                self.snake.length
            );
            self.snake.reset(rng);
            surface.clear_background();
        }

        surface.draw_cell(self.food.cell, FOOD_COLOR);
        surface.draw_cell(self.snake.head(), SNAKE_COLOR);
        if let Some(tail) = self.snake.removed_tail {
            surface.erase_cell(tail);
        }

        self.snake.advance();
    }
}

#[derive(Debug, PartialEq, Eq)]
enum InputEvent {
    Quit,
    Turn(Direction),
}

fn poll_input() -> io::Result<Vec<InputEvent>> {
    let mut inputs = Vec::new();

    while event::poll(Duration::ZERO)? {
        if let Event::Key(key) = event::read()? {
            if let Some(input) = translate_key(key) {
                inputs.push(input);
            }
        }
    }

    Ok(inputs)
}

fn translate_key(key: KeyEvent) -> Option<InputEvent> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(InputEvent::Quit);
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Some(InputEvent::Quit),
        KeyCode::Up | KeyCode::Char('w') => Some(InputEvent::Turn(Direction::Up)),
        KeyCode::Down | KeyCode::Char('s') => Some(InputEvent::Turn(Direction::Down)),
        KeyCode::Left | KeyCode::Char('a') => Some(InputEvent::Turn(Direction::Left)),
        KeyCode::Right | KeyCode::Char('d') => Some(InputEvent::Turn(Direction::Right)),
        _ => None,
    }
}

struct Ticker {
    rate: Duration,
    last: Instant,
}

impl Ticker {
    fn new(rate: Duration) -> Self {
        Ticker {
            rate,
            last: Instant::now(),
        }
    }

    fn wait(&mut self) {
        let elapsed = self.last.elapsed();
        if elapsed < self.rate {
            thread::sleep(self.rate - elapsed);
        }
        self.last = Instant::now();
    }
}

trait Surface {
    fn draw_cell(&mut self, cell: Cell, fill: Color);
    fn erase_cell(&mut self, cell: Cell);
    fn clear_background(&mut self);
    fn present(&mut self) -> io::Result<()>;
}

// Retained grid of painted cells, flipped to the terminal on present.
#[derive(Debug)]
struct Board {
    cells: Vec<Option<Color>>,
}

impl Board {
    fn new() -> Self {
        Board {
            cells: vec![None; GRID_WIDTH as usize * GRID_HEIGHT as usize],
        }
    }

    fn paint(&mut self, cell: Cell, fill: Option<Color>) {
        self.cells[cell_index(cell)] = fill;
    }

    fn clear(&mut self) {
        self.cells.fill(None);
    }
}

impl Widget for &Board {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for y in 0..GRID_HEIGHT {
            for x in 0..GRID_WIDTH {
                let cell = Cell { x, y };
                let Some(fill) = self.cells[cell_index(cell)] else {
                    continue;
                };

                let rect = cell_rect(cell, area).intersection(area);
                for row in rect.top()..rect.bottom() {
                    for col in rect.left()..rect.right() {
                        // Left-edge accent stripe stands in for the
                        // one-pixel cell border.
                        let symbol = if col == rect.left() { "▎" } else { " " };
                        buf[(col, row)]
                            .set_symbol(symbol)
                            .set_fg(BORDER_COLOR)
                            .set_bg(fill);
                    }
                }
            }
        }
    }
}

struct TermSurface {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    board: Board,
}

impl TermSurface {
    fn new(terminal: Terminal<CrosstermBackend<io::Stdout>>) -> Self {
        TermSurface {
            terminal,
            board: Board::new(),
        }
    }

    fn terminal_mut(&mut self) -> &mut Terminal<CrosstermBackend<io::Stdout>> {
        &mut self.terminal
    }
}

// Board block centered in the frame, with room for its borders.
fn board_area(frame_area: Rect) -> Rect {
    let width = (GRID_WIDTH * CELL_COLS + 2).min(frame_area.width);
    let height = (GRID_HEIGHT + 2).min(frame_area.height);
    Rect {
        x: frame_area.x + (frame_area.width - width) / 2,
        y: frame_area.y + (frame_area.height - height) / 2,
        width,
        height,
    }
}

impl Surface for TermSurface {
    fn draw_cell(&mut self, cell: Cell, fill: Color) {
        self.board.paint(cell, Some(fill));
    }

    fn erase_cell(&mut self, cell: Cell) {
        self.board.paint(cell, None);
    }

    fn clear_background(&mut self) {
        self.board.clear();
    }

    fn present(&mut self) -> io::Result<()> {
        let Self { terminal, board } = self;
        terminal.draw(|frame| {
            let area = board_area(frame.area());
            let block = Block::default()
                .title("Zmeyka")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(BORDER_COLOR))
                .style(Style::default().bg(BACKGROUND_COLOR));
            let inner = block.inner(area);

            frame.render_widget(block, area);
            frame.render_widget(&*board, inner);
        })?;
        Ok(())
    }
}
