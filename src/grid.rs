//! Sparse spatial grid: position → occupancy index shared by the validator,
//! resolver, and state manager.

use crate::catalog::Structure;
use crate::error::EngineError;
use crate::types::{GridBounds, GridCell, Position, StructureId};
use std::collections::{HashMap, HashSet};

/// Mutable occupancy index. Cells with no entity are absent — no tombstones.
///
/// Mutated only through the game state manager's serialized action path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpatialGrid {
    cells: HashMap<Position, GridCell>,
    bounds: Option<GridBounds>,
}

impl SpatialGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pos: Position) -> Option<&GridCell> {
        self.cells.get(&pos)
    }

    pub fn set(&mut self, pos: Position, cell: GridCell) {
        self.cells.insert(pos, cell);
        self.extend_bounds(pos);
    }

    pub fn delete(&mut self, pos: Position) -> Option<GridCell> {
        // Bounds never shrink; deletion leaves them untouched.
        self.cells.remove(&pos)
    }

    /// Widen the running bounds to include every given position.
    pub fn bounds_update(&mut self, positions: &[Position]) {
        for &pos in positions {
            self.extend_bounds(pos);
        }
    }

    pub fn bounds(&self) -> Option<GridBounds> {
        self.bounds
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Position, &GridCell)> {
        self.cells.iter()
    }

    /// Every occupied position referencing the given structure.
    pub fn positions_of(&self, structure: &str) -> Vec<Position> {
        self.cells
            .iter()
            .filter(|(_, cell)| cell.structure.as_deref() == Some(structure))
            .map(|(pos, _)| *pos)
            .collect()
    }

    fn extend_bounds(&mut self, pos: Position) {
        match self.bounds.as_mut() {
            Some(b) => b.extend(pos),
            None => self.bounds = Some(GridBounds::at(pos)),
        }
    }

    // -----------------------------------------------------------------------
    // Consistency validation
    // -----------------------------------------------------------------------

    /// Check the joint grid ↔ structures invariant: every cell referencing a
    /// structure must name one that exists and claims that position, and
    /// every structure's claimed positions must be present in the grid and
    /// reference it back.
    ///
    /// Not enforced per-call (cross-structure updates are multi-step);
    /// called by tests and the periodic integrity sweep. A violation is a
    /// programming defect, never user input.
    pub fn validate_consistency(
        &self,
        structures: &HashMap<StructureId, Structure>,
    ) -> Result<(), EngineError> {
        let mut violations = Vec::new();

        for (pos, cell) in &self.cells {
            if let Some(id) = &cell.structure {
                match structures.get(id) {
                    None => violations.push(format!("cell {pos} references missing structure {id}")),
                    Some(s) if !s.positions.contains(pos) => {
                        violations.push(format!("cell {pos} not claimed by structure {id}"))
                    }
                    Some(_) => {}
                }
            }
        }

        for (id, structure) in structures {
            let mut seen = HashSet::new();
            for pos in &structure.positions {
                if !seen.insert(*pos) {
                    violations.push(format!("structure {id} claims {pos} twice"));
                    continue;
                }
                match self.cells.get(pos) {
                    None => violations.push(format!("structure {id} claims absent cell {pos}")),
                    Some(cell) if cell.structure.as_deref() != Some(id.as_str()) => {
                        violations.push(format!("cell {pos} does not reference structure {id}"))
                    }
                    Some(cell) if cell.team != structure.team => violations.push(format!(
                        "cell {pos} controller {} disagrees with structure {id} team {}",
                        cell.team, structure.team
                    )),
                    Some(_) => {}
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            log::error!("grid consistency sweep found {} violations", violations.len());
            Err(EngineError::Consistency(violations.join("; ")))
        }
    }
}
