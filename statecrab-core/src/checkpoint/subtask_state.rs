use super::*;

/// Everything one parallel subtask of an operator snapshotted for a checkpoint.
///
/// Categories are [`StateObjectCollection`]s, so copies made through
/// [`to_builder`](OperatorSubtaskState::to_builder) share every category they
/// do not replace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorSubtaskState {
    managed_operator_state: StateObjectCollection<OperatorStreamStateHandle>,
    raw_operator_state: StateObjectCollection<OperatorStreamStateHandle>,
    managed_keyed_state: StateObjectCollection<KeyedStateHandle>,
    raw_keyed_state: StateObjectCollection<KeyedStateHandle>,
    input_channel_state: StateObjectCollection<ChannelStateHandle>,
    result_subpartition_state: StateObjectCollection<ChannelStateHandle>,
}

impl OperatorSubtaskState {
    pub fn builder() -> OperatorSubtaskStateBuilder {
        OperatorSubtaskStateBuilder::default()
    }

    /// Builder pre-populated with this state's categories.
    pub fn to_builder(&self) -> OperatorSubtaskStateBuilder {
        OperatorSubtaskStateBuilder {
            state: self.clone(),
        }
    }

    pub fn managed_operator_state(&self) -> &StateObjectCollection<OperatorStreamStateHandle> {
        &self.managed_operator_state
    }

    pub fn raw_operator_state(&self) -> &StateObjectCollection<OperatorStreamStateHandle> {
        &self.raw_operator_state
    }

    pub fn managed_keyed_state(&self) -> &StateObjectCollection<KeyedStateHandle> {
        &self.managed_keyed_state
    }

    pub fn raw_keyed_state(&self) -> &StateObjectCollection<KeyedStateHandle> {
        &self.raw_keyed_state
    }

    pub fn input_channel_state(&self) -> &StateObjectCollection<ChannelStateHandle> {
        &self.input_channel_state
    }

    pub fn result_subpartition_state(&self) -> &StateObjectCollection<ChannelStateHandle> {
        &self.result_subpartition_state
    }

    pub fn has_state(&self) -> bool {
        self.managed_operator_state.has_state()
            || self.raw_operator_state.has_state()
            || self.managed_keyed_state.has_state()
            || self.raw_keyed_state.has_state()
            || self.input_channel_state.has_state()
            || self.result_subpartition_state.has_state()
    }

    /// Every category as a state object, in discard order.
    fn categories(&self) -> [&dyn StateObject; 6] {
        [
            &self.managed_operator_state,
            &self.raw_operator_state,
            &self.managed_keyed_state,
            &self.raw_keyed_state,
            &self.input_channel_state,
            &self.result_subpartition_state,
        ]
    }
}

impl StateObject for OperatorSubtaskState {
    fn discard_state(&self) -> Result<()> {
        for category in self.categories() {
            category.discard_state()?;
        }
        Ok(())
    }

    fn state_size(&self) -> u64 {
        self.categories().iter().map(|c| c.state_size()).sum()
    }

    fn checkpointed_size(&self) -> u64 {
        self.categories().iter().map(|c| c.checkpointed_size()).sum()
    }
}

impl CompositeStateHandle for OperatorSubtaskState {
    /// Only keyed state can reference fragments of earlier checkpoints.
    fn register_shared_states(
        &self,
        registry: &SharedStateRegistry,
        checkpoint_id: CheckpointId,
    ) -> Result<()> {
        self.managed_keyed_state
            .register_shared_states(registry, checkpoint_id)?;
        self.raw_keyed_state
            .register_shared_states(registry, checkpoint_id)
    }
}

/// Builder for [`OperatorSubtaskState`]. Unset categories are empty.
#[derive(Debug, Default)]
pub struct OperatorSubtaskStateBuilder {
    state: OperatorSubtaskState,
}

impl OperatorSubtaskStateBuilder {
    pub fn with_managed_operator_state(
        mut self,
        state: impl Into<StateObjectCollection<OperatorStreamStateHandle>>,
    ) -> Self {
        self.state.managed_operator_state = state.into();
        self
    }

    pub fn with_raw_operator_state(
        mut self,
        state: impl Into<StateObjectCollection<OperatorStreamStateHandle>>,
    ) -> Self {
        self.state.raw_operator_state = state.into();
        self
    }

    pub fn with_managed_keyed_state(
        mut self,
        state: impl Into<StateObjectCollection<KeyedStateHandle>>,
    ) -> Self {
        self.state.managed_keyed_state = state.into();
        self
    }

    pub fn with_raw_keyed_state(
        mut self,
        state: impl Into<StateObjectCollection<KeyedStateHandle>>,
    ) -> Self {
        self.state.raw_keyed_state = state.into();
        self
    }

    pub fn with_input_channel_state(
        mut self,
        state: impl Into<StateObjectCollection<ChannelStateHandle>>,
    ) -> Self {
        self.state.input_channel_state = state.into();
        self
    }

    pub fn with_result_subpartition_state(
        mut self,
        state: impl Into<StateObjectCollection<ChannelStateHandle>>,
    ) -> Self {
        self.state.result_subpartition_state = state.into();
        self
    }

    pub fn build(self) -> OperatorSubtaskState {
        self.state
    }
}
