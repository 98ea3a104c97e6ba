use std::sync::atomic::{AtomicU8, Ordering};

/// 单个周期内的阶段，失败直接回到 Idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PipelineState {
    #[default]
    Idle = 0,
    Fetching = 1,
    Compiling = 2,
    Installing = 3,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PipelineState::Fetching,
            2 => PipelineState::Compiling,
            3 => PipelineState::Installing,
            _ => PipelineState::Idle,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn get(&self) -> PipelineState {
        PipelineState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: PipelineState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_cell() {
        let cell = StateCell::default();
        assert_eq!(cell.get(), PipelineState::Idle);
        for state in [
            PipelineState::Fetching,
            PipelineState::Compiling,
            PipelineState::Installing,
            PipelineState::Idle,
        ] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }
}
