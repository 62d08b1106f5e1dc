use crate::virtual_machine::errors::Fault;

/// Number of gas categories tracked by [`GasProfile`].
const GAS_CATEGORY_COUNT: usize = 4;

/// Extra gas charged when a call pushes a frame, per argument moved.
pub const CALL_ARG_GAS: u64 = 2;

/// Extra gas charged for every taken control transfer.
pub const TAKEN_BRANCH_GAS: u64 = 1;

/// Extra gas charged for every data memory cell read or written.
pub const MEMORY_ACCESS_GAS: u64 = 2;

/// Categories of gas consumption for profiling and debugging.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum GasCategory {
    /// Base cost for executing opcodes.
    OpcodeBase = 0,
    /// Cost for taken jumps, branches and returns.
    ControlTransfer = 1,
    /// Cost for function call overhead (arguments, frame setup).
    CallOverhead = 2,
    /// Cost for memory interactions.
    Memory = 3,
}

impl GasCategory {
    pub const fn as_str(&self) -> &'static str {
        match self {
            GasCategory::OpcodeBase => "Opcode Base",
            GasCategory::ControlTransfer => "Control Transfer",
            GasCategory::CallOverhead => "Call Overhead",
            GasCategory::Memory => "Memory",
        }
    }

    /// All categories in discriminant order.
    const ALL: [GasCategory; GAS_CATEGORY_COUNT] = [
        GasCategory::OpcodeBase,
        GasCategory::ControlTransfer,
        GasCategory::CallOverhead,
        GasCategory::Memory,
    ];
}

/// Gas consumption profile for debugging and optimization.
///
/// Tracks how gas is distributed across execution categories. Backed by a
/// flat array indexed by [`GasCategory`] discriminant.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GasProfile {
    counts: [u64; GAS_CATEGORY_COUNT],
}

impl GasProfile {
    /// Creates a new empty gas profile.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds gas to the specified category.
    #[inline(always)]
    pub fn add(&mut self, category: GasCategory, amount: u64) {
        let slot = &mut self.counts[category as usize];
        *slot = slot.saturating_add(amount);
    }

    /// Returns the gas recorded for one category.
    pub fn get(&self, category: GasCategory) -> u64 {
        self.counts[category as usize]
    }

    /// Returns the total gas across all categories.
    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .fold(0u64, |acc, &v| acc.saturating_add(v))
    }

    /// Returns an iterator over all categories and their gas costs.
    pub fn iter(&self) -> impl Iterator<Item = (GasCategory, u64)> {
        GasCategory::ALL.into_iter().zip(self.counts)
    }
}

/// Gas budget of one run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GasMeter {
    limit: u64,
    used: u64,
    profile: GasProfile,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            used: 0,
            profile: GasProfile::new(),
        }
    }

    /// Charges `amount` to `category`.
    ///
    /// Returns [`Fault::OutOfGas`] when the charge would exceed the limit;
    /// nothing is recorded in that case.
    #[inline]
    pub fn charge(&mut self, category: GasCategory, amount: u64) -> Result<(), Fault> {
        let used = self.used.saturating_add(amount);
        if used > self.limit {
            return Err(Fault::OutOfGas {
                used,
                limit: self.limit,
            });
        }
        self.used = used;
        self.profile.add(category, amount);
        Ok(())
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn remaining(&self) -> u64 {
        self.limit - self.used
    }

    pub fn profile(&self) -> &GasProfile {
        &self.profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_accumulates_per_category() {
        let mut profile = GasProfile::new();
        profile.add(GasCategory::OpcodeBase, 3);
        profile.add(GasCategory::OpcodeBase, 4);
        profile.add(GasCategory::Memory, 5);
        assert_eq!(profile.get(GasCategory::OpcodeBase), 7);
        assert_eq!(profile.get(GasCategory::CallOverhead), 0);
        assert_eq!(profile.total(), 12);
        let names: Vec<_> = profile.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(
            names,
            ["Opcode Base", "Control Transfer", "Call Overhead", "Memory"]
        );
    }

    #[test]
    fn meter_stops_at_limit() {
        let mut meter = GasMeter::new(10);
        meter.charge(GasCategory::OpcodeBase, 6).unwrap();
        meter.charge(GasCategory::ControlTransfer, 4).unwrap();
        assert_eq!(meter.remaining(), 0);
        assert_eq!(
            meter.charge(GasCategory::OpcodeBase, 1),
            Err(Fault::OutOfGas {
                used: 11,
                limit: 10
            })
        );
        assert_eq!(meter.used(), 10);
        assert_eq!(meter.profile().total(), 10);
    }

    #[test]
    fn charge_saturates() {
        let mut meter = GasMeter::new(u64::MAX);
        meter.charge(GasCategory::Memory, u64::MAX).unwrap();
        assert!(meter.charge(GasCategory::Memory, 1).is_err());
    }
}
