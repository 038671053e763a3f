use image::RgbaImage;

use super::raster::{hex, Canvas};
use crate::extract::sgf::{Move, Point, SgfGame, Stone};

const WOOD: u32 = 0xd0a15b;
const LINE: u32 = 0x000000;
const BLACK_STONE: u32 = 0x111111;
const WHITE_STONE: u32 = 0xeeeeee;

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// Stones on a square Go board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    size: usize,
    cells: Vec<Option<Stone>>,
}

impl Board {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![None; size * size],
        }
    }

    /// Final position of a record: setup stones, then every move with
    /// captures resolved.
    pub fn from_game(game: &SgfGame) -> Self {
        let mut board = Self::new(game.size);
        for &p in &game.setup_black {
            board.set(p, Some(Stone::Black));
        }
        for &p in &game.setup_white {
            board.set(p, Some(Stone::White));
        }
        for mv in &game.moves {
            board.play(mv);
        }
        board
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, (x, y): Point) -> Option<Stone> {
        self.cells[y * self.size + x]
    }

    fn set(&mut self, (x, y): Point, stone: Option<Stone>) {
        self.cells[y * self.size + x] = stone;
    }

    /// Play a move and return how many stones it captured. Passes and moves
    /// onto occupied points change nothing.
    pub fn play(&mut self, mv: &Move) -> usize {
        let Some(point) = mv.point else {
            return 0;
        };
        if self.get(point).is_some() {
            return 0;
        }
        self.set(point, Some(mv.color));

        let opponent = mv.color.opponent();
        let mut captured = 0;
        for n in self.neighbors(point) {
            if self.get(n) == Some(opponent) {
                let (group, liberties) = self.group_at(n);
                if liberties == 0 {
                    captured += group.len();
                    for p in group {
                        self.set(p, None);
                    }
                }
            }
        }

        // Suicide removes the played group.
        let (group, liberties) = self.group_at(point);
        if liberties == 0 {
            for p in group {
                self.set(p, None);
            }
        }
        captured
    }

    /// The connected group containing `start` and its liberty count.
    pub fn group_at(&self, start: Point) -> (Vec<Point>, usize) {
        let Some(color) = self.get(start) else {
            return (Vec::new(), 0);
        };
        let mut seen = vec![false; self.size * self.size];
        let mut liberty_seen = vec![false; self.size * self.size];
        let mut stack = vec![start];
        let mut group = Vec::new();
        let mut liberties = 0;
        seen[start.1 * self.size + start.0] = true;

        while let Some(p) = stack.pop() {
            group.push(p);
            for n in self.neighbors(p) {
                let idx = n.1 * self.size + n.0;
                match self.get(n) {
                    None if !liberty_seen[idx] => {
                        liberty_seen[idx] = true;
                        liberties += 1;
                    }
                    Some(c) if c == color && !seen[idx] => {
                        seen[idx] = true;
                        stack.push(n);
                    }
                    _ => {}
                }
            }
        }
        (group, liberties)
    }

    fn neighbors(&self, (x, y): Point) -> impl Iterator<Item = Point> {
        let size = self.size;
        [
            (x.wrapping_sub(1), y),
            (x + 1, y),
            (x, y.wrapping_sub(1)),
            (x, y + 1),
        ]
        .into_iter()
        .filter(move |&(nx, ny)| nx < size && ny < size)
    }

    /// Every occupied point, row by row.
    pub fn stones(&self) -> impl Iterator<Item = (Point, Stone)> + '_ {
        self.cells.iter().enumerate().filter_map(move |(i, cell)| {
            cell.map(|stone| ((i % self.size, i / self.size), stone))
        })
    }
}

/// Star points: the 4-4 (3-3 below 13x13) corners, tengen on odd boards, and
/// side midpoints on large odd boards.
pub fn star_points(size: usize) -> Vec<Point> {
    let mut points = Vec::new();
    if size >= 7 {
        let near = if size >= 13 { 3 } else { 2 };
        let far = size - 1 - near;
        points.extend([(near, near), (far, near), (near, far), (far, far)]);
        if size % 2 == 1 && size >= 15 {
            let mid = size / 2;
            points.extend([(mid, near), (near, mid), (far, mid), (mid, far)]);
        }
    }
    if size % 2 == 1 {
        points.push((size / 2, size / 2));
    }
    points
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Draw `board` on a `width` x `width` wooden square.
pub fn render_board(board: &Board, width: u32) -> RgbaImage {
    let w = width as f32;
    let size = board.size();
    let mut canvas = Canvas::new(width, width, hex(WOOD));

    let padding = w * 0.05;
    let step = (w - padding * 2.0) / (size - 1) as f32;
    let line_width = (w * 0.0025).max(1.0);
    for i in 0..size {
        let offset = padding + i as f32 * step;
        canvas.hline(padding, w - padding, offset, line_width, hex(LINE));
        canvas.vline(offset, padding, w - padding, line_width, hex(LINE));
    }

    let hoshi_radius = (w * 0.01).max(2.0);
    for (x, y) in star_points(size) {
        canvas.fill_circle(
            padding + x as f32 * step,
            padding + y as f32 * step,
            hoshi_radius,
            hex(LINE),
        );
    }

    let radius = step * 0.45;
    let outline = (w * 0.002).max(1.0);
    for ((x, y), stone) in board.stones() {
        let cx = padding + x as f32 * step;
        let cy = padding + y as f32 * step;
        let fill = match stone {
            Stone::Black => BLACK_STONE,
            Stone::White => WHITE_STONE,
        };
        canvas.fill_circle(cx, cy, radius, hex(fill));
        canvas.stroke_circle(cx, cy, radius, outline, hex(LINE));
    }

    canvas.into_image()
}
