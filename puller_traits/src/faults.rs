//! Motor-driver fault flags as reported by the driver's status registers.

use std::fmt;

/// Snapshot of the driver's diagnostic bits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DriverFaultFlags {
    pub diag0: bool,
    pub overtemp: bool,
    pub overtemp_warning: bool,
    pub short_to_ground_a: bool,
    pub short_to_ground_b: bool,
    pub open_load_a: bool,
    pub open_load_b: bool,
}

/// One asserted fault bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultFlag {
    Diag0,
    Overtemp,
    OvertempWarning,
    ShortToGroundA,
    ShortToGroundB,
    OpenLoadA,
    OpenLoadB,
}

impl FaultFlag {
    /// Faults that indicate the power stage is at risk, as opposed to warnings.
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            FaultFlag::Overtemp | FaultFlag::ShortToGroundA | FaultFlag::ShortToGroundB
        )
    }
}

impl fmt::Display for FaultFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FaultFlag::Diag0 => "DIAG0 error",
            FaultFlag::Overtemp => "Overtemp.",
            FaultFlag::OvertempWarning => "Overtemp. PW",
            FaultFlag::ShortToGroundA => "Short to Gnd A",
            FaultFlag::ShortToGroundB => "Short to Gnd B",
            FaultFlag::OpenLoadA => "Open Load A",
            FaultFlag::OpenLoadB => "Open Load B",
        };
        f.write_str(s)
    }
}

impl DriverFaultFlags {
    /// Asserted flags in register order.
    pub fn asserted(&self) -> Vec<FaultFlag> {
        [
            (self.diag0, FaultFlag::Diag0),
            (self.overtemp, FaultFlag::Overtemp),
            (self.overtemp_warning, FaultFlag::OvertempWarning),
            (self.short_to_ground_a, FaultFlag::ShortToGroundA),
            (self.short_to_ground_b, FaultFlag::ShortToGroundB),
            (self.open_load_a, FaultFlag::OpenLoadA),
            (self.open_load_b, FaultFlag::OpenLoadB),
        ]
        .into_iter()
        .filter_map(|(set, flag)| set.then_some(flag))
        .collect()
    }

    pub fn any(&self) -> bool {
        !self.asserted().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asserted_lists_only_set_bits_in_order() {
        let flags = DriverFaultFlags {
            overtemp: true,
            open_load_b: true,
            ..Default::default()
        };
        assert_eq!(
            flags.asserted(),
            vec![FaultFlag::Overtemp, FaultFlag::OpenLoadB]
        );
        assert!(!DriverFaultFlags::default().any());
    }

    #[test]
    fn only_power_stage_faults_are_critical() {
        assert!(FaultFlag::ShortToGroundB.is_critical());
        assert!(!FaultFlag::OpenLoadA.is_critical());
        assert!(!FaultFlag::OvertempWarning.is_critical());
    }
}
