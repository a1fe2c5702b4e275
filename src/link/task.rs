//! # Command Task Slot
//!
//! At most one command response is in flight. A received command sets the
//! task, the next transmit slot answers it with a command frame, and the
//! first normal frame received afterwards clears it: the transmitter only
//! goes back to normal frames once it has seen the response.

/// Pending command response
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LinkTask {
    #[default]
    None,
    /// Answer with a SetupData command frame
    SendSetupData,
}

/// Single outstanding task
#[derive(Debug, Default, Clone)]
pub struct TaskSlot {
    task: LinkTask,
}

impl TaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a response, replacing any pending one
    pub fn set(&mut self, task: LinkTask) {
        self.task = task;
    }

    /// Drop the pending response
    pub fn reset(&mut self) {
        self.task = LinkTask::None;
    }

    pub fn get(&self) -> LinkTask {
        self.task
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_lifecycle() {
        let mut slot = TaskSlot::new();
        assert_eq!(slot.get(), LinkTask::None);

        slot.set(LinkTask::SendSetupData);
        assert_eq!(slot.get(), LinkTask::SendSetupData);

        slot.reset();
        assert_eq!(slot.get(), LinkTask::None);
    }
}
