use crate::service::process::Priority;
use phf::phf_map;

/// Most favorable nice level.
pub const NICE_BEST: i32 = -20;
/// Least favorable nice level.
pub const NICE_WORST: i32 = 19;

pub const IDLE_PRIORITY_CLASS: i32 = 0x0040;
pub const BELOW_NORMAL_PRIORITY_CLASS: i32 = 0x4000;
pub const NORMAL_PRIORITY_CLASS: i32 = 0x0020;
pub const ABOVE_NORMAL_PRIORITY_CLASS: i32 = 0x8000;
pub const HIGH_PRIORITY_CLASS: i32 = 0x0080;
pub const REALTIME_PRIORITY_CLASS: i32 = 0x0100;

static PRIORITY_CLASS_LABELS: phf::Map<i32, &'static str> = phf_map! {
    0x0040i32 => "Low",
    0x4000i32 => "Below normal",
    0x0020i32 => "Normal",
    0x8000i32 => "Above normal",
    0x0080i32 => "High",
    0x0100i32 => "Realtime",
};

/// How raw priority values are interpreted on a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityScheme {
    /// Signed nice range, `NICE_BEST..=NICE_WORST`.
    NiceLevel,
    /// Fixed enumeration of scheduling classes.
    PriorityClass,
}

impl PriorityScheme {
    pub fn host() -> Self {
        if cfg!(windows) {
            PriorityScheme::PriorityClass
        } else {
            PriorityScheme::NiceLevel
        }
    }

    /// Human readable description of a priority value.
    pub fn label(&self, priority: Priority) -> String {
        match self {
            PriorityScheme::NiceLevel => nice_label(priority.0),
            PriorityScheme::PriorityClass => match PRIORITY_CLASS_LABELS.get(&priority.0) {
                Some(label) => label.to_string(),
                None => format!("Unknown ({})", priority.0),
            },
        }
    }

    /// Default priority for prioritized ("good") processes.
    pub fn favored(&self) -> Priority {
        match self {
            PriorityScheme::NiceLevel => Priority(-15),
            PriorityScheme::PriorityClass => Priority(HIGH_PRIORITY_CLASS),
        }
    }

    /// Default priority for deprioritized ("bad") processes.
    pub fn demoted(&self) -> Priority {
        match self {
            PriorityScheme::NiceLevel => Priority(15),
            PriorityScheme::PriorityClass => Priority(IDLE_PRIORITY_CLASS),
        }
    }
}

fn nice_label(nice: i32) -> String {
    if !(NICE_BEST..=NICE_WORST).contains(&nice) {
        return format!("nice level {} (unknown)", nice);
    }

    let span = (NICE_BEST.abs() + NICE_WORST) as f64;
    // + 0.0 folds -0.0 into 0.0
    let percent = (nice - NICE_WORST) as f64 / -span * 100.0 + 0.0;
    format!("nice level {} ({:.1}%)", nice, percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nice_label_bounds() {
        let scheme = PriorityScheme::NiceLevel;
        assert_eq!(scheme.label(Priority(-20)), "nice level -20 (100.0%)");
        assert_eq!(scheme.label(Priority(19)), "nice level 19 (0.0%)");
        assert_eq!(scheme.label(Priority(0)), "nice level 0 (48.7%)");
    }

    #[test]
    fn test_nice_label_out_of_range() {
        let scheme = PriorityScheme::NiceLevel;
        assert_eq!(scheme.label(Priority(20)), "nice level 20 (unknown)");
        assert_eq!(scheme.label(Priority(-21)), "nice level -21 (unknown)");
    }

    #[test]
    fn test_priority_class_labels() {
        let scheme = PriorityScheme::PriorityClass;
        assert_eq!(scheme.label(Priority(IDLE_PRIORITY_CLASS)), "Low");
        assert_eq!(
            scheme.label(Priority(BELOW_NORMAL_PRIORITY_CLASS)),
            "Below normal"
        );
        assert_eq!(scheme.label(Priority(NORMAL_PRIORITY_CLASS)), "Normal");
        assert_eq!(
            scheme.label(Priority(ABOVE_NORMAL_PRIORITY_CLASS)),
            "Above normal"
        );
        assert_eq!(scheme.label(Priority(HIGH_PRIORITY_CLASS)), "High");
        assert_eq!(scheme.label(Priority(REALTIME_PRIORITY_CLASS)), "Realtime");
        assert_eq!(scheme.label(Priority(7)), "Unknown (7)");
    }

    #[test]
    fn test_tier_defaults_are_ordered() {
        let scheme = PriorityScheme::NiceLevel;
        assert!(scheme.favored() < scheme.demoted());
    }
}
