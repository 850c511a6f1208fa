//! Goal-reaching grid world

use std::collections::HashSet;

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use pgkit_core::{
    BoxSpace, DiscreteSpace, Environment, RLError, Result, Space, SpaceValue, Step, StepInfo,
};

/// Cell coordinate as `(row, column)`
pub type Cell = (usize, usize);

/// Moves in action order: up, right, down, left
const MOVES: [(isize, isize); 4] = [(-1, 0), (0, 1), (1, 0), (0, -1)];

/// Layout and rewards of a [`GridMazeEnv`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridMazeConfig {
    /// Number of rows
    pub height: usize,
    /// Number of columns
    pub width: usize,
    /// Blocked cells
    pub walls: Vec<Cell>,
    /// Start cell
    pub start: Cell,
    /// Goal cell
    pub goal: Cell,
    /// Start from a random free cell instead of `start`
    pub random_start: bool,
    /// Reward for every step that does not reach the goal
    pub step_penalty: f64,
    /// Reward for reaching the goal
    pub goal_reward: f64,
}

impl Default for GridMazeConfig {
    fn default() -> Self {
        Self {
            height: 5,
            width: 5,
            walls: vec![(1, 1), (1, 2), (1, 3), (3, 1), (3, 3)],
            start: (0, 0),
            goal: (4, 4),
            random_start: false,
            step_penalty: -0.01,
            goal_reward: 1.0,
        }
    }
}

/// Walk from the start cell to the goal cell of a walled grid
///
/// Actions are `0` up, `1` right, `2` down, `3` left. Bumping into a wall or
/// the border leaves the agent in place. Observations are one-hot encodings
/// of the agent's cell, flattened row-major.
#[derive(Debug, Clone)]
pub struct GridMazeEnv {
    config: GridMazeConfig,
    walls: HashSet<Cell>,
    observation_space: BoxSpace,
    position: Cell,
    rng: StdRng,
    needs_reset: bool,
}

impl GridMazeEnv {
    /// Create a maze, validating the layout
    pub fn new(config: GridMazeConfig) -> Result<Self> {
        if config.height == 0 || config.width == 0 {
            return Err(RLError::Value("maze must have at least one cell".to_string()));
        }
        let in_bounds = |(r, c): Cell| r < config.height && c < config.width;
        let walls: HashSet<Cell> = config.walls.iter().copied().collect();

        if let Some(wall) = walls.iter().find(|&&w| !in_bounds(w)) {
            return Err(RLError::Value(format!("wall {wall:?} lies outside the maze")));
        }
        for (name, cell) in [("start", config.start), ("goal", config.goal)] {
            if !in_bounds(cell) || walls.contains(&cell) {
                return Err(RLError::Value(format!("{name} cell {cell:?} is not a free cell")));
            }
        }
        if config.start == config.goal {
            return Err(RLError::Value("start and goal must differ".to_string()));
        }

        let observation_space = BoxSpace::uniform(0.0, 1.0, config.height * config.width)?;

        Ok(Self {
            position: config.start,
            config,
            walls,
            observation_space,
            rng: StdRng::from_entropy(),
            needs_reset: true,
        })
    }

    /// Current cell of the agent
    #[must_use]
    pub fn position(&self) -> Cell {
        self.position
    }

    /// Maze layout
    #[must_use]
    pub fn config(&self) -> &GridMazeConfig {
        &self.config
    }

    fn num_cells(&self) -> usize {
        self.config.height * self.config.width
    }

    fn observation(&self) -> Array1<f64> {
        let mut obs = Array1::zeros(self.num_cells());
        obs[self.position.0 * self.config.width + self.position.1] = 1.0;
        obs
    }

    fn is_free(&self, cell: Cell) -> bool {
        cell.0 < self.config.height && cell.1 < self.config.width && !self.walls.contains(&cell)
    }

    fn random_free_cell(&mut self) -> Cell {
        let candidates: Vec<Cell> = (0..self.config.height)
            .flat_map(|r| (0..self.config.width).map(move |c| (r, c)))
            .filter(|&cell| self.is_free(cell) && cell != self.config.goal)
            .collect();
        if candidates.is_empty() {
            self.config.start
        } else {
            candidates[self.rng.gen_range(0..candidates.len())]
        }
    }
}

impl Environment for GridMazeEnv {
    fn observation_space(&self) -> Box<dyn Space> {
        Box::new(self.observation_space.clone())
    }

    fn action_space(&self) -> Box<dyn Space> {
        Box::new(DiscreteSpace::new(MOVES.len()))
    }

    fn reset(&mut self) -> Result<Array1<f64>> {
        self.position = if self.config.random_start {
            self.random_free_cell()
        } else {
            self.config.start
        };
        self.needs_reset = false;
        Ok(self.observation())
    }

    fn step(&mut self, action: &SpaceValue) -> Result<Step> {
        if self.needs_reset {
            return Err(RLError::Environment(
                "step called on a finished episode, call reset first".to_string(),
            ));
        }
        let (dr, dc) = action
            .as_discrete()
            .and_then(|a| MOVES.get(a).copied())
            .ok_or_else(|| RLError::InvalidAction(format!("GridMaze expects 0..4, got {action:?}")))?;

        let target = self
            .position
            .0
            .checked_add_signed(dr)
            .zip(self.position.1.checked_add_signed(dc));
        if let Some(cell) = target.filter(|&cell| self.is_free(cell)) {
            self.position = cell;
        }

        let done = self.position == self.config.goal;
        self.needs_reset = done;
        let reward = if done { self.config.goal_reward } else { self.config.step_penalty };

        Ok(Step {
            observation: self.observation(),
            reward,
            done,
            info: StepInfo::default(),
        })
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}
