use crate::time::TimeValue;

/// When the tracking controller moves between slewing and tracking.
///
/// There is no default: acceptable convergence speed versus stability is
/// specific to the oscillator and the network, so the integrator has to pick
/// the thresholds.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SwitchPolicy {
    /// Drop back from tracking to slewing when an offset exceeds this
    /// magnitude. `None` keeps tracking no matter how large the offset gets.
    pub slew_threshold: Option<TimeValue>,

    /// Offsets below this magnitude count towards the dwell
    pub track_threshold: TimeValue,

    /// Number of consecutive samples below `track_threshold` before slewing
    /// hands over to tracking
    pub track_dwell: u32,
}

impl SwitchPolicy {
    pub(crate) fn wants_slew(&self, offset: TimeValue) -> bool {
        self.slew_threshold
            .map_or(false, |threshold| offset.abs() > threshold)
    }

    pub(crate) fn within_track(&self, offset: TimeValue) -> bool {
        offset.abs() < self.track_threshold
    }
}
