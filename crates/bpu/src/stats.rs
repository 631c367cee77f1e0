//! Prediction statistics collection and reporting.
//!
//! This module tracks the branch prediction unit's counters. It provides:
//! 1. **Lookup counts:** Total lookups and conditional predictions.
//! 2. **Target sources:** BTB, RAS, and indirect predictor hit/miss counts.
//! 3. **Resolution:** Misprediction counts per target source.
//!
//! All counters are monotonic; the unit increments them single-threaded.

/// Counter aggregate for the branch prediction unit.
#[derive(Clone, Debug, Default)]
pub struct BpuStats {
    /// Number of branch predictor lookups.
    pub lookups: u64,
    /// Number of conditional branches predicted.
    pub cond_predicted: u64,
    /// Number of branches resolved as mispredicted.
    pub cond_incorrect: u64,
    /// Number of BTB lookups.
    pub btb_lookups: u64,
    /// Number of BTB hits.
    pub btb_hits: u64,
    /// Number of BTB updates issued at misprediction repair.
    pub btb_updates: u64,
    /// Number of times the RAS was used to get a target.
    pub ras_used: u64,
    /// Number of incorrect RAS predictions.
    pub ras_incorrect: u64,
    /// Number of indirect predictor lookups.
    pub indirect_lookups: u64,
    /// Number of indirect target hits.
    pub indirect_hits: u64,
    /// Number of indirect target misses.
    pub indirect_misses: u64,
    /// Number of mispredicted indirect branches.
    pub indirect_mispredicted: u64,
}

impl BpuStats {
    /// Fraction of BTB lookups that hit, or zero when no lookup happened.
    ///
    /// Reported to six decimal places by `print`.
    pub fn btb_hit_ratio(&self) -> f64 {
        if self.btb_lookups == 0 {
            0.0
        } else {
            self.btb_hits as f64 / self.btb_lookups as f64
        }
    }

    /// Prints all counters to stdout in the simulator's report format.
    pub fn print(&self) {
        println!("BRANCH PREDICTION UNIT");
        println!("  bp.lookups               {}", self.lookups);
        println!("  bp.cond_predicted        {}", self.cond_predicted);
        println!("  bp.cond_incorrect        {}", self.cond_incorrect);
        println!("  btb.lookups              {}", self.btb_lookups);
        println!("  btb.hits                 {}", self.btb_hits);
        println!("  btb.updates              {}", self.btb_updates);
        println!("  btb.hit_ratio            {:.6}", self.btb_hit_ratio());
        println!("  ras.used                 {}", self.ras_used);
        println!("  ras.incorrect            {}", self.ras_incorrect);
        println!("  indirect.lookups         {}", self.indirect_lookups);
        println!("  indirect.hits            {}", self.indirect_hits);
        println!("  indirect.misses          {}", self.indirect_misses);
        println!("  indirect.mispredicted    {}", self.indirect_mispredicted);
        println!("----------------------------------------------------------");
    }
}
