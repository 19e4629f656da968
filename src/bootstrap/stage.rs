use std::fmt;

/// Stages of one bootstrap run, in the only order they can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BootstrapStage {
    EnvironmentResolved,
    ConfigLoaded,
    /// Only reached when the active environment uses the embedded store.
    PathsResolved,
    MigrationsComplete,
    ContainerValidated,
    CoreServicesStarted,
    RoutesConfigured,
    ResumptionComplete,
    Running,
}

impl BootstrapStage {
    pub const ALL: [BootstrapStage; 9] = [
        Self::EnvironmentResolved,
        Self::ConfigLoaded,
        Self::PathsResolved,
        Self::MigrationsComplete,
        Self::ContainerValidated,
        Self::CoreServicesStarted,
        Self::RoutesConfigured,
        Self::ResumptionComplete,
        Self::Running,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnvironmentResolved => "environment_resolved",
            Self::ConfigLoaded => "config_loaded",
            Self::PathsResolved => "paths_resolved",
            Self::MigrationsComplete => "migrations_complete",
            Self::ContainerValidated => "container_validated",
            Self::CoreServicesStarted => "core_services_started",
            Self::RoutesConfigured => "routes_configured",
            Self::ResumptionComplete => "resumption_complete",
            Self::Running => "running",
        }
    }
}

impl fmt::Display for BootstrapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_matches_declaration() {
        let mut sorted = BootstrapStage::ALL;
        sorted.sort();
        assert_eq!(sorted, BootstrapStage::ALL);
        assert!(BootstrapStage::MigrationsComplete < BootstrapStage::ContainerValidated);
    }
}
