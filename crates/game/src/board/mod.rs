use std::fmt;

pub type Seat = u8;
pub type BaseId = u8;
pub type CellId = usize;
pub type Direction = usize;

/// Number of board directions. Direction `d` also defines the jump relation:
/// jumping in `d` lands on the `d`-neighbour of the `d`-neighbour.
pub const DIRECTIONS: usize = 6;

/// Grid offsets per direction: W, E, NW, NE, SW, SE on a doubled-x grid.
const DIR_OFFSETS: [(i32, i32); DIRECTIONS] = [(-2, 0), (2, 0), (-1, -1), (1, -1), (-1, 1), (1, 1)];

/// Cells per row of the star, top to bottom.
const ROW_WIDTHS: [usize; 17] = [1, 2, 3, 4, 13, 12, 11, 10, 9, 10, 11, 12, 13, 4, 3, 2, 1];

const GRID_WIDTH: usize = 25;
const GRID_HEIGHT: usize = 17;

/// A single board cell. `home` is fixed at construction; `occupant` and the
/// per-turn `jumped` flag are the only mutable state.
#[derive(Debug, Clone)]
pub struct Cell {
    home: Option<BaseId>,
    occupant: Option<Seat>,
    neighbours: [Option<CellId>; DIRECTIONS],
    jumped: bool,
    x: usize,
    y: usize,
}

/// The star field graph: 121 cells, six directional neighbour tables, six
/// ten-cell home bases numbered so that the diametric opposite of base `b`
/// is `(b + 3) % 6`.
pub struct Board {
    cells: Vec<Cell>,
    grid: Vec<Option<CellId>>,
    width: usize,
    height: usize,
}

impl Board {
    /// Builds the star topology. Rows are laid out on a doubled-x offset
    /// grid (a cell at `(x, y)` has `x ≡ y (mod 2)`), which makes all six
    /// directions simple coordinate offsets.
    pub fn star() -> Self {
        let mut board = Board {
            cells: Vec::new(),
            grid: vec![None; GRID_WIDTH * GRID_HEIGHT],
            width: GRID_WIDTH,
            height: GRID_HEIGHT,
        };

        for (y, &row_width) in ROW_WIDTHS.iter().enumerate() {
            let first_x = (GRID_WIDTH - 1) / 2 - (row_width - 1);
            for i in 0..row_width {
                let x = first_x + 2 * i;
                let id = board.cells.len();
                board.cells.push(Cell {
                    home: home_base(x, y, i, row_width),
                    occupant: None,
                    neighbours: [None; DIRECTIONS],
                    jumped: false,
                    x,
                    y,
                });
                board.grid[y * GRID_WIDTH + x] = Some(id);
            }
        }

        for id in 0..board.cells.len() {
            let (x, y) = (board.cells[id].x as i32, board.cells[id].y as i32);
            for (dir, (dx, dy)) in DIR_OFFSETS.iter().enumerate() {
                board.cells[id].neighbours[dir] = board.lookup(x + dx, y + dy);
            }
        }

        board
    }

    fn lookup(&self, x: i32, y: i32) -> Option<CellId> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        self.grid[y as usize * self.width + x as usize]
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Cell id at grid position, if a cell exists there.
    pub fn at(&self, x: usize, y: usize) -> Option<CellId> {
        self.lookup(x as i32, y as i32)
    }

    pub fn position(&self, id: CellId) -> (usize, usize) {
        (self.cells[id].x, self.cells[id].y)
    }

    pub fn home(&self, id: CellId) -> Option<BaseId> {
        self.cells[id].home
    }

    pub fn occupant(&self, id: CellId) -> Option<Seat> {
        self.cells[id].occupant
    }

    pub fn neighbour(&self, id: CellId, dir: Direction) -> Option<CellId> {
        self.cells[id].neighbours[dir]
    }

    pub fn jumped(&self, id: CellId) -> bool {
        self.cells[id].jumped
    }

    pub fn place(&mut self, id: CellId, occupant: Option<Seat>) {
        self.cells[id].occupant = occupant;
    }

    pub fn clear_jumped(&mut self, id: CellId) {
        self.cells[id].jumped = false;
    }

    /// Performs a single move in direction `dir`: a plain step onto an empty
    /// neighbour, or a jump over an occupied neighbour onto the empty cell
    /// behind it. Returns the destination, or `None` if the move is illegal
    /// (no mutation in that case).
    ///
    /// A piece whose `jumped` flag is set has already jumped this turn and
    /// may only continue jumping; the flag is set on jump landings and
    /// cleared when the piece moves on.
    pub fn attempt_move(&mut self, origin: CellId, seat: Seat, dir: Direction) -> Option<CellId> {
        if self.cells[origin].occupant != Some(seat) {
            return None;
        }
        let step = self.cells[origin].neighbours[dir]?;

        let dest = if self.cells[step].occupant.is_none() {
            if self.cells[origin].jumped {
                return None;
            }
            step
        } else {
            let landing = self.cells[step].neighbours[dir]?;
            if self.cells[landing].occupant.is_some() {
                return None;
            }
            self.cells[landing].jumped = true;
            landing
        };

        self.cells[origin].occupant = None;
        self.cells[origin].jumped = false;
        self.cells[dest].occupant = Some(seat);
        Some(dest)
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Board")
            .field("cells", &self.cells.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Home base for the `i`-th cell of row `y`, or `None` in the central
/// hexagon. Bases: 0 top, 1 upper-right, 2 lower-right, 3 bottom,
/// 4 lower-left, 5 upper-left.
fn home_base(_x: usize, y: usize, i: usize, row_width: usize) -> Option<BaseId> {
    match y {
        0..=3 => Some(0),
        13..=16 => Some(3),
        4..=7 => {
            let wing = 8 - y;
            if i < wing {
                Some(5)
            } else if i >= row_width - wing {
                Some(1)
            } else {
                None
            }
        }
        9..=12 => {
            let wing = y - 8;
            if i < wing {
                Some(4)
            } else if i >= row_width - wing {
                Some(2)
            } else {
                None
            }
        }
        _ => None,
    }
}
