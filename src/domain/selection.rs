// Metric selection state machine: Unselected <-> Selected(metric)
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "metric", rename_all = "snake_case")]
pub enum SelectionState {
    #[default]
    Unselected,
    Selected(String),
}

impl SelectionState {
    /// Selecting the active metric clears it, anything else replaces it
    pub fn toggle(&self, metric: &str) -> SelectionState {
        match self {
            SelectionState::Selected(current) if current == metric => SelectionState::Unselected,
            _ => SelectionState::Selected(metric.to_string()),
        }
    }

    pub fn selected(&self) -> Option<&str> {
        match self {
            SelectionState::Selected(metric) => Some(metric),
            SelectionState::Unselected => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_twice_returns_to_unselected() {
        let state = SelectionState::Unselected.toggle("Power (P)");
        assert_eq!(state.selected(), Some("Power (P)"));
        assert_eq!(state.toggle("Power (P)"), SelectionState::Unselected);
    }

    #[test]
    fn test_toggle_other_replaces_selection() {
        let state = SelectionState::Selected("Power (P)".to_string()).toggle("Temp (T)");
        assert_eq!(state, SelectionState::Selected("Temp (T)".to_string()));
    }
}
