// Actuator command domain model
use crate::domain::threshold::CommandedState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub target_entity_id: String,
    pub state: CommandedState,
}

impl CommandRequest {
    pub fn new(target_entity_id: impl Into<String>, state: CommandedState) -> Self {
        Self {
            target_entity_id: target_entity_id.into(),
            state,
        }
    }

    /// Attribute name the control endpoint expects, `on` or `off`.
    pub fn command_name(&self) -> &'static str {
        self.state.command_name()
    }
}
