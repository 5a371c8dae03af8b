//! A corrected, non-exercised transliteration of the upstream scheduler
//! (`TinyCoPoOS.c`): fixed-capacity task/timer/queue tables, a singly
//! linked run-queue keyed by task id, critical sections, and the
//! main/timer run loops.
//!
//! Nothing in `grammar`/`parser`/`transform`/`unparse` calls into this
//! module. It exists purely so the `os_call_task`/continuation-function/
//! global-slot contract the lowering pass (see [`crate::transform`])
//! targets has a concrete, readable definition somewhere in the crate.
//!
//! The original C carries several typos that block compilation:
//! `tasks[...] = task_id` where `tasks[task_id].next_task = task_id` was
//! clearly meant, `nex_task_id`, a missing semicolon after
//! `TimeTick timeTick`, and an undeclared loop-local `task_id` in its main
//! run loop. This transliteration applies the obvious fixes. `QueuePop`'s
//! second branch (`if (queues[queue_id].first == 0) ...`) can never fire
//! given the corrected first branch, so it's dropped rather than carried
//! over dead. `runTimerTask`'s reference to an undefined `TIMER_TASK`
//! constant is resolved by taking the timer-housekeeping task id as a
//! parameter instead of inventing a fixed slot.

pub const NR_TASKS: usize = 100;
// Task 0 is reserved as the queue sentinel/terminator.
pub const NR_TIMERS: usize = 100;
pub const NR_QUEUES: usize = 10;
// Queue 0 is reserved for the main run queue.
pub const NR_CRITICAL_SECTIONS: usize = 20;
pub const MAIN_RUN_QUEUE: usize = 0;
pub const MAX_TIME_TICK: u32 = 1000;
pub const TIMER_OFF: u32 = 0;

pub type TaskId = usize;
pub type TimerId = usize;
pub type QueueId = usize;
pub type CriticalSectionId = usize;

#[derive(Clone, Copy)]
pub struct Task {
  pub function: Option<fn()>,
  pub next_task: TaskId,
}

impl Default for Task {
  fn default() -> Self {
    Self { function: None, next_task: 0 }
  }
}

#[derive(Clone, Copy, Default)]
pub struct Timer {
  pub time: u32,
  pub task: TaskId,
}

#[derive(Clone, Copy, Default)]
pub struct Queue {
  pub first: TaskId,
  pub last: TaskId,
}

#[derive(Clone, Copy)]
pub struct CriticalSection {
  pub queue: QueueId,
  pub claimed_by: TaskId,
}

impl Default for CriticalSection {
  fn default() -> Self {
    Self { queue: 0, claimed_by: 0 }
  }
}

/// The scheduler's whole mutable state, standing in for the original's
/// file-scope arrays.
pub struct Scheduler {
  pub tasks: [Task; NR_TASKS],
  pub timers: [Timer; NR_TIMERS],
  pub queues: [Queue; NR_QUEUES],
  pub critical_sections: [CriticalSection; NR_CRITICAL_SECTIONS],
  pub time_tick: u32,
}

impl Default for Scheduler {
  fn default() -> Self {
    Self {
      tasks: [Task::default(); NR_TASKS],
      timers: [Timer::default(); NR_TIMERS],
      queues: [Queue::default(); NR_QUEUES],
      critical_sections: [CriticalSection::default(); NR_CRITICAL_SECTIONS],
      time_tick: 0,
    }
  }
}

impl Scheduler {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn increment_time_tick(&mut self) {
    self.time_tick = 1 + self.time_tick % MAX_TIME_TICK;
  }

  pub fn timer_done(&self, time: u32) -> bool {
    time == self.time_tick
  }

  pub fn timer_on(&self, delay: u32) -> u32 {
    1 + (self.time_tick + delay - 1) % MAX_TIME_TICK
  }

  pub fn queue_init(&mut self, queue_id: QueueId, task_id: TaskId) {
    self.queues[queue_id].first = task_id;
    self.queues[queue_id].last = task_id;
    self.tasks[task_id].next_task = 0;
  }

  pub fn queue_add(&mut self, queue_id: QueueId, task_id: TaskId) {
    let last = self.queues[queue_id].last;
    self.tasks[last].next_task = task_id;
    self.queues[queue_id].last = task_id;
    self.tasks[task_id].next_task = 0;
  }

  pub fn queue_empty(&self, queue_id: QueueId) -> bool {
    self.queues[queue_id].first == self.queues[queue_id].last
  }

  pub fn queue_pop(&mut self, queue_id: QueueId) -> TaskId {
    let first = self.queues[queue_id].first;
    let task_id = self.tasks[first].next_task;
    if task_id != 0 {
      self.queues[queue_id].first = task_id;
    }
    task_id
  }

  pub fn critical_section_init(&mut self, cs_id: CriticalSectionId, queue_id: QueueId) {
    self.critical_sections[cs_id].queue = queue_id;
    self.critical_sections[cs_id].claimed_by = 0;
  }

  /// Returns `false` if the section is held by another task (in which
  /// case `task_id` has been queued on it and the caller must exit);
  /// `true` if `task_id` now holds it.
  pub fn critical_section_enter(&mut self, cs_id: CriticalSectionId, task_id: TaskId) -> bool {
    let claimed_by = self.critical_sections[cs_id].claimed_by;
    if claimed_by != 0 && claimed_by != task_id {
      let queue = self.critical_sections[cs_id].queue;
      self.queue_add(queue, task_id);
      return false;
    }
    self.critical_sections[cs_id].claimed_by = task_id;
    true
  }

  pub fn critical_section_leave(&mut self, cs_id: CriticalSectionId) {
    let queue = self.critical_sections[cs_id].queue;
    let next_task_id = self.queue_pop(queue);
    self.critical_sections[cs_id].claimed_by = next_task_id;
    if next_task_id != 0 {
      self.queue_add(MAIN_RUN_QUEUE, next_task_id);
    }
  }

  /// Requeues every timer whose deadline matches the current tick, then
  /// requeues `timer_task` itself so the timer housekeeping runs again
  /// next tick.
  pub fn run_timer_task(&mut self, timer_task: TaskId) {
    for i in 0..NR_TIMERS {
      if self.timer_done(self.timers[i].time) {
        let task = self.timers[i].task;
        self.queue_add(MAIN_RUN_QUEUE, task);
      }
    }
    self.queue_add(MAIN_RUN_QUEUE, timer_task);
  }

  pub fn run_main_queue(&mut self) {
    loop {
      let task_id = self.queue_pop(MAIN_RUN_QUEUE);
      if task_id == 0 {
        break;
      }
      if let Some(f) = self.tasks[task_id].function {
        f();
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn queue_is_fifo() {
    let mut sched = Scheduler::new();
    sched.queue_init(1, 0);
    assert!(sched.queue_empty(1));
    sched.queue_add(1, 5);
    sched.queue_add(1, 7);
    assert!(!sched.queue_empty(1));
    assert_eq!(sched.queue_pop(1), 5);
    assert_eq!(sched.queue_pop(1), 7);
    assert!(sched.queue_empty(1));
    assert_eq!(sched.queue_pop(1), 0);
  }

  #[test]
  fn critical_section_serializes_contenders() {
    let mut sched = Scheduler::new();
    sched.queue_init(2, 0);
    sched.critical_section_init(0, 2);

    assert!(sched.critical_section_enter(0, 3));
    assert!(!sched.critical_section_enter(0, 4));

    sched.critical_section_leave(0);
    assert_eq!(sched.critical_sections[0].claimed_by, 4);
    assert_eq!(sched.queue_pop(MAIN_RUN_QUEUE), 4);
  }

  #[test]
  fn run_timer_task_requeues_due_timers_and_itself() {
    let mut sched = Scheduler::new();
    sched.queue_init(MAIN_RUN_QUEUE, 0);
    sched.time_tick = 5;
    sched.timers[0] = Timer { time: 5, task: 9 };
    sched.run_timer_task(42);
    assert_eq!(sched.queue_pop(MAIN_RUN_QUEUE), 9);
    assert_eq!(sched.queue_pop(MAIN_RUN_QUEUE), 42);
  }
}
