//! Budget limits for a culling pass and statistics on what a pass spent.

use std::fmt;

use tessera_scene::LevelOfDetail;

use crate::WantedSector;

/// Limits applied by the culler.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SectorBudget {
    /// Maximum cost of budgeted (finite priority) sectors. Default: 64 MiB.
    pub max_cost: f64,
    /// Sectors within this distance of the viewer are always Detailed. Default: 10.
    pub high_detail_proximity_threshold: f32,
    /// Largest proxy quad, as a fraction of the viewport height. Default: 0.0025.
    pub max_quad_size: f32,
    /// Share of `max_cost` that Detailed sectors may not use. Default: 0.1.
    pub reserved_simple_fraction: f64,
}

impl Default for SectorBudget {
    fn default() -> Self {
        Self {
            max_cost: 64.0 * 1024.0 * 1024.0,
            high_detail_proximity_threshold: 10.0,
            max_quad_size: 0.0025,
            reserved_simple_fraction: 0.1,
        }
    }
}

impl SectorBudget {
    /// Budget with `max_cost` and default tunables.
    pub fn with_max_cost(max_cost: f64) -> Self {
        Self {
            max_cost,
            ..Default::default()
        }
    }

    /// Highest spend at which a Detailed request is still accepted.
    pub fn detailed_limit(&self) -> f64 {
        (1.0 - self.reserved_simple_fraction) * self.max_cost
    }
}

/// What a culling pass selected.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SpentBudget {
    /// Sectors across all models.
    pub total_sector_count: usize,
    /// Sectors at Simple or Detailed.
    pub loaded_sector_count: usize,
    /// Sectors at infinite priority.
    pub forced_detailed_sector_count: usize,
    pub simple_sector_count: usize,
    pub detailed_sector_count: usize,
    /// Cost of everything selected.
    pub download_size: f64,
    /// Cost of the finite priority sectors, bounded by the budget.
    pub budgeted_size: f64,
    /// Sum of finite positive priorities.
    pub accumulated_priority: f64,
}

impl SpentBudget {
    pub fn from_wanted(
        wanted: &[WantedSector],
        total_sector_count: usize,
        download_size: f64,
        budgeted_size: f64,
    ) -> Self {
        let mut spent = Self {
            total_sector_count,
            download_size,
            budgeted_size,
            ..Default::default()
        };
        for w in wanted {
            match w.lod {
                LevelOfDetail::Simple => spent.simple_sector_count += 1,
                LevelOfDetail::Detailed => spent.detailed_sector_count += 1,
                LevelOfDetail::Discarded => continue,
            }
            spent.loaded_sector_count += 1;
            if w.priority.is_finite() {
                if w.priority > 0.0 {
                    spent.accumulated_priority += w.priority;
                }
            } else {
                spent.forced_detailed_sector_count += 1;
            }
        }
        spent
    }

    /// Loaded sectors as a percentage of all sectors.
    pub fn loaded_percent(&self) -> f64 {
        if self.total_sector_count == 0 {
            0.0
        } else {
            100.0 * self.loaded_sector_count as f64 / self.total_sector_count as f64
        }
    }
}

impl fmt::Display for SpentBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} sectors ({:.1}%, {} required, {} detailed, {} simple), {:.2} MiB",
            self.loaded_sector_count,
            self.total_sector_count,
            self.loaded_percent(),
            self.forced_detailed_sector_count,
            self.detailed_sector_count,
            self.simple_sector_count,
            self.download_size / (1024.0 * 1024.0)
        )
    }
}
