use crate::board::{BaseId, Board, CellId, DIRECTIONS, Direction, Seat};
use crate::protocol::{MoveInstruction, MoveKind};

pub const MAX_SEATS: usize = 6;

/// Pieces that must reach the target base before a seat wins. The original
/// game uses a flat 10 regardless of seat count.
pub const WIN_THRESHOLD: usize = 10;

/// Active home bases per seat count, in activation order. The order decides
/// which seat ends up facing which base and must not be reordered.
fn active_bases(seats: u8) -> Option<&'static [BaseId]> {
    match seats {
        1 => Some(&[0]),
        2 => Some(&[0, 3]),
        3 => Some(&[0, 2, 4]),
        4 => Some(&[0, 1, 3, 4]),
        6 => Some(&[0, 1, 2, 3, 4, 5]),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("game already started")]
    AlreadyStarted,
    #[error("unsupported seat count: {0}")]
    InvalidSeatCount(u8),
    #[error("too many ready seats")]
    TooManyReady,
    #[error("game not started yet")]
    NotStarted,
    #[error("instruction has no seat")]
    MissingSeat,
    #[error("instruction has no cells")]
    MissingCells,
    #[error("seat out of range: {0}")]
    SeatOutOfRange(u8),
    #[error("unknown cell: {0}")]
    UnknownCell(CellId),
    #[error("seat {0} moved out of turn")]
    WrongSeat(Seat),
    #[error("another piece already moved this turn")]
    WrongContinuation,
    #[error("cells admit no direction")]
    NoDirection,
    #[error("illegal move")]
    IllegalMove,
    #[error("unrecognized instruction kind")]
    UnknownKind,
}

/// Authoritative turn/seat/win state machine. Mutated exclusively through
/// validated instruction application; a rejected instruction leaves the
/// engine and the board untouched.
#[derive(Debug)]
pub struct GameEngine {
    board: Board,
    seat_count: u8,
    turn: u32,
    active_seat: Option<Seat>,
    ready: [bool; MAX_SEATS],
    /// Physical base id -> seat occupying it, fixed at start.
    base_rotation: [Option<Seat>; MAX_SEATS],
    winners: Vec<Seat>,
    /// After a move, the only cell allowed to originate the next move of
    /// this turn (the jump-chain constraint).
    pending: Option<CellId>,
    started: bool,
    finished: bool,
    starting_seat: Seat,
}

impl Default for GameEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GameEngine {
    pub fn new() -> Self {
        GameEngine {
            board: Board::star(),
            seat_count: 0,
            turn: 0,
            active_seat: None,
            ready: [false; MAX_SEATS],
            base_rotation: [None; MAX_SEATS],
            winners: Vec::new(),
            pending: None,
            started: false,
            finished: false,
            starting_seat: 0,
        }
    }

    pub fn with_starting_seat(starting_seat: Seat) -> Self {
        let mut engine = Self::new();
        engine.starting_seat = starting_seat;
        engine
    }

    /// Discards the session: fresh board, roster of ready seats, everything.
    /// The configured starting seat survives.
    pub fn reset(&mut self) {
        *self = Self::with_starting_seat(self.starting_seat);
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    #[cfg(test)]
    pub(crate) fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }

    pub fn seat_count(&self) -> u8 {
        self.seat_count
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn active_seat(&self) -> Option<Seat> {
        self.active_seat
    }

    pub fn winners(&self) -> &[Seat] {
        &self.winners
    }

    pub fn pending_continuation(&self) -> Option<CellId> {
        self.pending
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn starting_seat(&self) -> Seat {
        self.starting_seat
    }

    /// Seat occupying physical base `base`, once the game has started.
    pub fn rotation(&self, base: BaseId) -> Option<Seat> {
        self.base_rotation.get(usize::from(base)).copied().flatten()
    }

    pub fn set_starting_seat(&mut self, seat: Seat) -> Result<(), EngineError> {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }
        self.starting_seat = seat;
        Ok(())
    }

    /// Configures the board for `seats` players. Cells of every active base
    /// receive a provisional occupant equal to the base id; `start()` later
    /// remaps those through the base rotation.
    pub fn set_seat_count(&mut self, seats: u8) -> Result<(), EngineError> {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }
        let bases = active_bases(seats).ok_or(EngineError::InvalidSeatCount(seats))?;
        self.seat_count = seats;
        for id in 0..self.board.len() {
            let occupant = self
                .board
                .home(id)
                .filter(|home| bases.contains(home))
                .map(Seat::from);
            self.board.place(id, occupant);
        }
        Ok(())
    }

    /// Marks a seat ready. When the ready count reaches the seat count the
    /// game starts automatically; exceeding it means the layer above handed
    /// us more ready signals than seats and is a protocol violation.
    pub fn set_ready(&mut self, seat: Seat) -> Result<(), EngineError> {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }
        let slot = usize::from(seat);
        if slot >= MAX_SEATS {
            return Err(EngineError::SeatOutOfRange(seat));
        }
        let count = self
            .ready
            .iter()
            .enumerate()
            .filter(|&(i, &r)| r || i == slot)
            .count() as u8;
        if count > self.seat_count {
            return Err(EngineError::TooManyReady);
        }
        self.ready[slot] = true;
        if count == self.seat_count {
            self.start()?;
        }
        Ok(())
    }

    /// Starts the game: computes the base rotation and remaps the
    /// provisional occupants through it.
    ///
    /// The rotation assigns each active base the seat matching its position
    /// in the activation order; a seat's pieces start on one base and must
    /// cross to the diametrically opposite one, whose cells stay marked with
    /// the original home id so win detection can look the opposite base up
    /// through the rotation.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }
        let bases =
            active_bases(self.seat_count).ok_or(EngineError::InvalidSeatCount(self.seat_count))?;

        let mut rotation = [None; MAX_SEATS];
        for (position, &base) in bases.iter().enumerate() {
            rotation[usize::from(base)] = Some(position as Seat);
        }
        for id in 0..self.board.len() {
            if let Some(provisional) = self.board.occupant(id) {
                self.board.place(id, rotation[usize::from(provisional)]);
            }
        }

        self.base_rotation = rotation;
        self.active_seat = Some(self.starting_seat % self.seat_count);
        self.started = true;
        log::info!(
            "game started: {} seats, seat {} to move",
            self.seat_count,
            self.starting_seat % self.seat_count
        );
        Ok(())
    }

    /// The direction index relating two cells: either `dest` is the direct
    /// `d`-neighbour of `origin`, or it is one jump away (the `d`-neighbour
    /// of the `d`-neighbour).
    pub fn resolve_direction(
        &self,
        origin: CellId,
        dest: CellId,
    ) -> Result<Direction, EngineError> {
        for dir in 0..DIRECTIONS {
            if let Some(step) = self.board.neighbour(origin, dir) {
                if step == dest || self.board.neighbour(step, dir) == Some(dest) {
                    return Ok(dir);
                }
            }
        }
        Err(EngineError::NoDirection)
    }

    /// Applies a validated instruction. `Join` reuses the seat field to
    /// carry the player count.
    pub fn apply(&mut self, instr: &MoveInstruction) -> Result<(), EngineError> {
        let seat = instr.seat.ok_or(EngineError::MissingSeat)?;
        match instr.kind {
            MoveKind::Join => self.set_seat_count(seat),
            MoveKind::Play => self.play(instr).map(|_| ()),
            MoveKind::Load | MoveKind::Ready => self.set_ready(seat),
            MoveKind::EndTurn => self.end_turn(),
            MoveKind::Error => Err(EngineError::UnknownKind),
        }
    }

    /// Validates and performs a `Play` instruction, returning the landing
    /// cell. Once a chain jump has begun, only the pending cell (with its
    /// jumped flag still set) may originate further moves this turn.
    pub fn play(&mut self, instr: &MoveInstruction) -> Result<CellId, EngineError> {
        let seat = instr.seat.ok_or(EngineError::MissingSeat)?;
        let (origin, dest) = instr
            .origin
            .zip(instr.dest)
            .ok_or(EngineError::MissingCells)?;
        if !self.started {
            return Err(EngineError::NotStarted);
        }
        for cell in [origin, dest] {
            if cell >= self.board.len() {
                return Err(EngineError::UnknownCell(cell));
            }
        }
        if self.active_seat != Some(seat) {
            return Err(EngineError::WrongSeat(seat));
        }
        if let Some(pending) = self.pending {
            if pending != origin || !self.board.jumped(pending) {
                return Err(EngineError::WrongContinuation);
            }
        }
        let dir = self.resolve_direction(origin, dest)?;
        let landed = self
            .board
            .attempt_move(origin, seat, dir)
            .ok_or(EngineError::IllegalMove)?;
        self.pending = Some(landed);
        Ok(landed)
    }

    /// Ends the active seat's turn: clears the chain state, runs win
    /// detection, and passes the turn to the next seat (wrapping, skipping
    /// seats that already finished).
    pub fn end_turn(&mut self) -> Result<(), EngineError> {
        if !self.started {
            return Err(EngineError::NotStarted);
        }
        if let Some(cell) = self.pending.take() {
            self.board.clear_jumped(cell);
        }
        self.check_win();
        if !self.finished {
            if let Some(active) = self.active_seat {
                let mut next = (active + 1) % self.seat_count;
                while self.winners.contains(&next) {
                    next = (next + 1) % self.seat_count;
                }
                self.active_seat = Some(next);
            }
        }
        self.turn += 1;
        Ok(())
    }

    /// Win detection, run once per completed turn. A cell with home base
    /// `h` is a goal cell of the seat occupying the opposite base
    /// `(h + 3) % 6`; a seat wins when ten of its pieces sit on goal cells.
    /// Iterative fixed point: appending the second-to-last winner finishes
    /// the match, and the next pass appends the remaining seat as last
    /// place.
    fn check_win(&mut self) {
        let mut counts = [0usize; MAX_SEATS];
        for id in 0..self.board.len() {
            if let (Some(home), Some(seat)) = (self.board.home(id), self.board.occupant(id)) {
                if self.base_rotation[usize::from((home + 3) % 6)] == Some(seat) {
                    counts[usize::from(seat)] += 1;
                }
            }
        }

        for _ in 0..=usize::from(self.seat_count) {
            let mut changed = false;
            for seat in 0..self.seat_count {
                if self.winners.contains(&seat) {
                    continue;
                }
                if counts[usize::from(seat)] >= WIN_THRESHOLD || self.finished {
                    self.winners.push(seat);
                    log::info!("seat {} finished in place {}", seat, self.winners.len());
                    changed = true;
                }
            }
            let seats = usize::from(self.seat_count);
            if !self.winners.is_empty() && self.winners.len() + 1 >= seats {
                self.finished = true;
            }
            if !changed {
                break;
            }
        }
    }
}
