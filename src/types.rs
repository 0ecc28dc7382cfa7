/// Clock rate in MHz
pub type Frequency = u32;

/// Instantaneous power in microwatts
pub type Microwatts = u64;

/// Cumulative energy in microjoules
pub type Microjoules = u64;

/// Energy in joules, the unit reported to callers
pub type Joules = f64;
