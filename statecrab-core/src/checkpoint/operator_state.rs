use super::*;

/// State of one logical operator at one checkpoint: the states of its
/// parallel subtasks plus the optional state of its coordinator.
///
/// While a checkpoint is in flight the subtask map fills up one
/// acknowledgement at a time and may be partial. Subtask states are held by
/// [`Arc`], so the copies made for restores share them with the original;
/// either side may be discarded independently because shared fragments are
/// released through the [`SharedStateRegistry`], not by ownership.
///
/// Mutation takes `&mut self`: the checkpoint coordinator serializes all
/// writes for an operator, and a finished aggregate can be read concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "OperatorStateRepr")]
pub struct OperatorState {
    operator_id: OperatorId,
    parallelism: usize,
    /// Number of key groups; upper bound for any future parallelism.
    max_parallelism: usize,
    subtask_states: BTreeMap<usize, Arc<OperatorSubtaskState>>,
    coordinator_state: WriteOnce<Option<ByteStreamStateHandle>>,
}

impl OperatorState {
    pub fn new(
        operator_id: OperatorId,
        parallelism: usize,
        max_parallelism: usize,
    ) -> Result<Self, StateError> {
        if parallelism > max_parallelism {
            return Err(StateError::InvalidParallelism {
                parallelism,
                max_parallelism,
            });
        }
        Ok(Self {
            operator_id,
            parallelism,
            max_parallelism,
            subtask_states: BTreeMap::new(),
            coordinator_state: WriteOnce::new(),
        })
    }

    pub fn operator_id(&self) -> OperatorId {
        self.operator_id
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn max_parallelism(&self) -> usize {
        self.max_parallelism
    }

    /// Reserved for a terminal "operator finished" lifecycle state.
    pub fn is_fully_finished(&self) -> bool {
        false
    }

    fn check_subtask_index(&self, index: usize) -> Result<(), StateError> {
        if index >= self.parallelism {
            return Err(StateError::SubtaskIndexOutOfBounds {
                index,
                parallelism: self.parallelism,
                collected: self.subtask_states.len(),
            });
        }
        Ok(())
    }

    /// Record the state acknowledged by subtask `index`.
    ///
    /// A repeated acknowledgement for the same subtask replaces the earlier one.
    pub fn put_state(
        &mut self,
        index: usize,
        state: impl Into<Arc<OperatorSubtaskState>>,
    ) -> Result<(), StateError> {
        self.check_subtask_index(index)?;
        self.subtask_states.insert(index, state.into());
        Ok(())
    }

    /// State of subtask `index`, or `None` if it has not acknowledged yet.
    pub fn get_state(
        &self,
        index: usize,
    ) -> Result<Option<&Arc<OperatorSubtaskState>>, StateError> {
        self.check_subtask_index(index)?;
        Ok(self.subtask_states.get(&index))
    }

    /// Record the coordinator state. Allowed exactly once, even for `None`.
    pub fn set_coordinator_state(
        &mut self,
        state: Option<ByteStreamStateHandle>,
    ) -> Result<(), StateError> {
        self.coordinator_state
            .set(state)
            .map_err(|_| StateError::CoordinatorStateAlreadySet)
    }

    pub fn coordinator_state(&self) -> Option<&ByteStreamStateHandle> {
        self.coordinator_state.get().and_then(Option::as_ref)
    }

    pub fn subtask_states(&self) -> &BTreeMap<usize, Arc<OperatorSubtaskState>> {
        &self.subtask_states
    }

    /// Recorded subtask states in index order.
    pub fn states(&self) -> impl Iterator<Item = &Arc<OperatorSubtaskState>> {
        self.subtask_states.values()
    }

    pub fn number_collected_states(&self) -> usize {
        self.subtask_states.len()
    }

    pub fn has_subtask_states(&self) -> bool {
        !self.subtask_states.is_empty()
    }

    fn empty_copy(&self, operator_id: OperatorId) -> Self {
        Self {
            operator_id,
            parallelism: self.parallelism,
            max_parallelism: self.max_parallelism,
            subtask_states: BTreeMap::new(),
            coordinator_state: self.coordinator_state.clone(),
        }
    }

    /// Carry this state forward under another operator id. Subtask states
    /// are shared, not copied.
    pub fn copy_with_new_operator_id(&self, operator_id: OperatorId) -> Self {
        let mut copy = self.empty_copy(operator_id);
        copy.subtask_states = self.subtask_states.clone();
        copy
    }

    /// Copy for a restore that does not replay in-flight data: input channel
    /// and result subpartition state are emptied, every other category is
    /// shared with this state.
    pub fn copy_and_discard_in_flight_data(&self) -> Self {
        let mut copy = self.empty_copy(self.operator_id);
        copy.subtask_states = self
            .subtask_states
            .iter()
            .map(|(index, state)| {
                let stripped = state
                    .to_builder()
                    .with_input_channel_state(StateObjectCollection::empty())
                    .with_result_subpartition_state(StateObjectCollection::empty())
                    .build();
                (*index, Arc::new(stripped))
            })
            .collect();
        copy
    }

    /// Like [`discard_state`](StateObject::discard_state), but keeps going
    /// after a failure and reports every failure in one error.
    pub fn discard_state_collecting_errors(&self) -> Result<()> {
        let mut failures = Vec::new();
        for (index, state) in &self.subtask_states {
            if let Err(err) = state.discard_state() {
                failures.push(format!("subtask {index}: {err:#}"));
            }
        }
        if let Some(coordinator_state) = self.coordinator_state()
            && let Err(err) = coordinator_state.discard_state()
        {
            failures.push(format!("coordinator: {err:#}"));
        }

        if failures.is_empty() {
            return Ok(());
        }
        Err(anyhow!(
            "failed to discard {} state objects of operator {}: {}",
            failures.len(),
            self.operator_id,
            failures.join("; ")
        ))
    }

    fn coordinator_state_size(&self) -> u64 {
        self.coordinator_state().map_or(0, StateObject::state_size)
    }
}

impl StateObject for OperatorState {
    /// Discards subtask states in index order, then the coordinator state.
    /// Stops at the first failure, leaving the rest untouched.
    fn discard_state(&self) -> Result<()> {
        tracing::debug!(
            "discarding state of operator {} ({} subtask states)",
            self.operator_id,
            self.subtask_states.len()
        );
        for state in self.subtask_states.values() {
            state.discard_state()?;
        }
        if let Some(coordinator_state) = self.coordinator_state() {
            coordinator_state.discard_state()?;
        }
        Ok(())
    }

    fn state_size(&self) -> u64 {
        self.coordinator_state_size()
            + self
                .subtask_states
                .range(..self.parallelism)
                .map(|(_, state)| state.state_size())
                .sum::<u64>()
    }

    fn checkpointed_size(&self) -> u64 {
        self.coordinator_state_size()
            + self
                .subtask_states
                .range(..self.parallelism)
                .map(|(_, state)| state.checkpointed_size())
                .sum::<u64>()
    }
}

impl CompositeStateHandle for OperatorState {
    /// Registers subtask states only; coordinator state is never shared.
    fn register_shared_states(
        &self,
        registry: &SharedStateRegistry,
        checkpoint_id: CheckpointId,
    ) -> Result<()> {
        for state in self.subtask_states.values() {
            state.register_shared_states(registry, checkpoint_id)?;
        }
        Ok(())
    }
}

/// Compares identity, parallelism, the number of collected subtask states and
/// the coordinator state's presence and size. Subtask state contents are not
/// compared.
impl PartialEq for OperatorState {
    fn eq(&self, other: &Self) -> bool {
        let same_coordinator = match (self.coordinator_state(), other.coordinator_state()) {
            (None, None) => true,
            (Some(a), Some(b)) => a.state_size() == b.state_size(),
            _ => false,
        };
        self.operator_id == other.operator_id
            && self.parallelism == other.parallelism
            && self.subtask_states.len() == other.subtask_states.len()
            && same_coordinator
    }
}

impl std::fmt::Display for OperatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "OperatorState(operatorID: {}, parallelism: {}, maxParallelism: {}, coordinatorState: ",
            self.operator_id, self.parallelism, self.max_parallelism
        )?;
        match self.coordinator_state() {
            Some(state) => write!(f, "{} bytes", state.state_size())?,
            None => f.write_str("(none)")?,
        }
        write!(
            f,
            ", sub task states: {}, total size (bytes): {})",
            self.subtask_states.len(),
            self.state_size()
        )
    }
}

/// Serialized form, validated on the way back in.
#[derive(Deserialize)]
struct OperatorStateRepr {
    operator_id: OperatorId,
    parallelism: usize,
    max_parallelism: usize,
    subtask_states: BTreeMap<usize, Arc<OperatorSubtaskState>>,
    coordinator_state: WriteOnce<Option<ByteStreamStateHandle>>,
}

impl TryFrom<OperatorStateRepr> for OperatorState {
    type Error = StateError;

    fn try_from(repr: OperatorStateRepr) -> Result<Self, StateError> {
        let mut state =
            OperatorState::new(repr.operator_id, repr.parallelism, repr.max_parallelism)?;
        for (index, subtask_state) in repr.subtask_states {
            state.put_state(index, subtask_state)?;
        }
        state.coordinator_state = repr.coordinator_state;
        Ok(state)
    }
}
