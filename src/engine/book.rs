use std::collections::{VecDeque, vec_deque::Iter};

use crate::engine::{ExitReason, Position, PositionSide};
use crate::errors::{Error, Result};

/// Open positions, split by direction.
///
/// At most one side holds positions at any time; a side can hold several positions of the same
/// direction when signals repeat before an exit.
#[derive(Debug, Clone, Default)]
pub struct PositionBook {
    longs: VecDeque<Position>,
    shorts: VecDeque<Position>,
}

impl PositionBook {
    /// Creates an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    fn side(&self, side: PositionSide) -> &VecDeque<Position> {
        match side {
            PositionSide::Long => &self.longs,
            PositionSide::Short => &self.shorts,
        }
    }

    fn side_mut(&mut self, side: PositionSide) -> &mut VecDeque<Position> {
        match side {
            PositionSide::Long => &mut self.longs,
            PositionSide::Short => &mut self.shorts,
        }
    }

    /// Returns an iterator over the open longs.
    pub fn longs(&self) -> Iter<'_, Position> {
        self.longs.iter()
    }

    /// Returns an iterator over the open shorts.
    pub fn shorts(&self) -> Iter<'_, Position> {
        self.shorts.iter()
    }

    /// Returns true if no position of `side` is open.
    pub fn is_direction_empty(&self, side: PositionSide) -> bool {
        self.side(side).is_empty()
    }

    /// Returns true if no position is open.
    pub fn is_empty(&self) -> bool {
        self.longs.is_empty() && self.shorts.is_empty()
    }

    /// Returns the number of open positions.
    pub fn len(&self) -> usize {
        self.longs.len() + self.shorts.len()
    }

    /// Returns the positions of `side` whose stop-loss or take-profit is hit at `price`, each
    /// with the bracket that was hit.
    ///
    /// This is a snapshot: nothing is removed. The caller settles cash first and then removes
    /// each returned position with [`PositionBook::remove`].
    pub fn scan_closable(&self, side: PositionSide, price: f64) -> Vec<(Position, ExitReason)> {
        self.side(side)
            .iter()
            .filter_map(|position| position.exit_reason(price).map(|exit| (*position, exit)))
            .collect()
    }

    /// Returns a copy of every position of `side`, oldest first.
    pub fn snapshot(&self, side: PositionSide) -> Vec<Position> {
        self.side(side).iter().copied().collect()
    }

    /// Adds a position to its side.
    ///
    /// Fails if the opposite side still holds positions.
    pub fn open(&mut self, position: Position) -> Result<()> {
        let opposite = position.side().opposite();
        if !self.is_direction_empty(opposite) {
            return Err(Error::OppositeExposure(opposite));
        }
        self.side_mut(position.side()).push_back(position);
        Ok(())
    }

    /// Removes a position from its side.
    pub fn remove(&mut self, position: &Position) -> Result<Position> {
        let positions = self.side_mut(position.side());
        let idx = positions
            .iter()
            .position(|p| p == position)
            .ok_or(Error::PositionNotFound)?;
        positions.remove(idx).ok_or(Error::PositionNotFound)
    }

    /// Removes and returns every position of `side`, oldest first.
    pub fn drain(&mut self, side: PositionSide) -> Vec<Position> {
        self.side_mut(side).drain(..).collect()
    }

    /// Removes every position.
    pub fn clear(&mut self) {
        self.longs.clear();
        self.shorts.clear();
    }
}
