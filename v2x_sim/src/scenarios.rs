//! Chaos engineering scenarios for DST.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// V2X-001: Follower brakes behind a stopping leader
    CarFollowing,

    /// V2X-002: Car moves out of the ambulance's lane
    AmbulanceYield,

    /// V2X-003: Drowsy driver reaches the service lane and stops
    DrowsyPullOver,

    /// V2X-004: Disconnected agent disappears from every replica
    GhostEviction,

    /// V2X-005: Partition longer than the ghost timeout, then heal
    SplitBrain,

    /// V2X-006: 50% packet loss on every link
    PacketLoss,

    /// V2X-007: Latency with jitter and reordering
    Jitter,

    /// V2X-008: Two agents summon the ambulance at once, plus a forged update
    AmbulanceContention,
}

impl ScenarioId {
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::CarFollowing,
            ScenarioId::AmbulanceYield,
            ScenarioId::DrowsyPullOver,
            ScenarioId::GhostEviction,
            ScenarioId::SplitBrain,
            ScenarioId::PacketLoss,
            ScenarioId::Jitter,
            ScenarioId::AmbulanceContention,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::CarFollowing => "car_following",
            ScenarioId::AmbulanceYield => "ambulance_yield",
            ScenarioId::DrowsyPullOver => "drowsy_pull_over",
            ScenarioId::GhostEviction => "ghost_eviction",
            ScenarioId::SplitBrain => "split_brain",
            ScenarioId::PacketLoss => "packet_loss",
            ScenarioId::Jitter => "jitter",
            ScenarioId::AmbulanceContention => "ambulance_contention",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::CarFollowing => "Leader stops at t=5s, follower must stop outside the critical gap",
            ScenarioId::AmbulanceYield => "Ambulance closes in on a slow car, which must leave lane 0 in time",
            ScenarioId::DrowsyPullOver => "Face lost at t=1s, car must reach the service lane and stop",
            ScenarioId::GhostEviction => "One agent disconnects, every peer must evict it within the timeout",
            ScenarioId::SplitBrain => "Network partition for 5s, verify replicas re-converge after heal",
            ScenarioId::PacketLoss => "50% packet loss, verify no live peer is ever evicted",
            ScenarioId::Jitter => "20ms latency + 0-200ms jitter, verify bounded replica drift",
            ScenarioId::AmbulanceContention => "Concurrent ambulance claims, verify owners are never overwritten",
        }
    }

    /// Shortest run in seconds that covers every phase of the scenario.
    pub fn min_duration_secs(&self) -> f64 {
        match self {
            ScenarioId::CarFollowing => 10.0,
            ScenarioId::AmbulanceYield => 15.0,
            ScenarioId::DrowsyPullOver => 10.0,
            ScenarioId::GhostEviction => 8.0,
            ScenarioId::SplitBrain => 10.0,
            ScenarioId::PacketLoss => 10.0,
            ScenarioId::Jitter => 10.0,
            ScenarioId::AmbulanceContention => 6.0,
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "car_following" | "carfollowing" | "v2x-001" => Ok(ScenarioId::CarFollowing),
            "ambulance_yield" | "ambulanceyield" | "v2x-002" => Ok(ScenarioId::AmbulanceYield),
            "drowsy_pull_over" | "drowsypullover" | "v2x-003" => Ok(ScenarioId::DrowsyPullOver),
            "ghost_eviction" | "ghosteviction" | "v2x-004" => Ok(ScenarioId::GhostEviction),
            "split_brain" | "splitbrain" | "v2x-005" => Ok(ScenarioId::SplitBrain),
            "packet_loss" | "packetloss" | "v2x-006" => Ok(ScenarioId::PacketLoss),
            "jitter" | "v2x-007" => Ok(ScenarioId::Jitter),
            "ambulance_contention" | "ambulancecontention" | "v2x-008" => Ok(ScenarioId::AmbulanceContention),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
            assert_eq!(scenario.to_string(), scenario.name());
        }
    }

    #[test]
    fn test_aliases_and_unknown() {
        assert_eq!("SPLITBRAIN".parse::<ScenarioId>(), Ok(ScenarioId::SplitBrain));
        assert_eq!("v2x-008".parse::<ScenarioId>(), Ok(ScenarioId::AmbulanceContention));
        assert!("byzantine".parse::<ScenarioId>().is_err());
    }
}
