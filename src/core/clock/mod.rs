use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    DoThrottle,
    StatsReport,
}

#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub over_cycles: usize,
}

#[derive(Debug, Clone)]
struct ClockEvent {
    pub event_type: EventType,
    pub timestamp: u64,
}

impl PartialEq for ClockEvent {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
    }
}

impl Eq for ClockEvent {}

impl PartialOrd for ClockEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClockEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // for min-heap
        other.timestamp.cmp(&self.timestamp)
    }
}

#[derive(Debug, Clone)]
pub struct ClockConfig {
    pub cpu_hz: u64,
}

impl ClockConfig {
    // SH7091 @ 200MHz (peripheral modules run at 1/4)
    pub const CPU_CLOCK: u64 = 200_000_000;
    pub const DREAMCAST: ClockConfig = ClockConfig { cpu_hz: ClockConfig::CPU_CLOCK };
}

pub struct Clock {
    events: BinaryHeap<ClockEvent>,
    current_time: u64,
    clock_config: ClockConfig,
}

impl Clock {
    pub fn new(clock_config: ClockConfig) -> Self {
        Self {
            events: BinaryHeap::new(),
            current_time: 0,
            clock_config,
        }
    }

    pub fn get_clock_config(&self) -> &ClockConfig {
        &self.clock_config
    }

    pub fn advance_time(&mut self, cpu_cycles: u64) {
        self.current_time += cpu_cycles;
    }

    pub fn schedule(&mut self, event_type: EventType, cpu_cycles_ahead: u64) -> u64 {
        let target = self.current_time + cpu_cycles_ahead;
        self.events.push(ClockEvent { event_type, timestamp: target });
        target
    }

    pub fn cancel(&mut self, event_type: EventType) {
        self.events.retain(|e| e.event_type != event_type);
    }

    pub fn next_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.events.peek()
            && event.timestamp <= self.current_time
        {
            let event = self.events.pop().unwrap();
            events.push(Event {
                event_type: event.event_type,
                over_cycles: (self.current_time - event.timestamp) as usize,
            });
        }
        events
    }

    pub fn has_ready_event(&self) -> bool {
        self.events.peek().map_or(false, |e| self.current_time >= e.timestamp)
    }

    pub fn next_event_time(&self) -> Option<u64> {
        self.events.peek().map(|e| e.timestamp)
    }

    pub fn cycles_until_next_event(&self) -> Option<u64> {
        self.events
            .peek()
            .map(|e| e.timestamp.saturating_sub(self.current_time))
    }

    pub fn current_time(&self) -> u64 {
        self.current_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_fire_in_timestamp_order() {
        let mut clock = Clock::new(ClockConfig::DREAMCAST);
        clock.schedule(EventType::StatsReport, 100);
        clock.schedule(EventType::DoThrottle, 50);
        assert!(!clock.has_ready_event());
        clock.advance_time(60);
        let evs = clock.next_events();
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0].event_type, EventType::DoThrottle);
        assert_eq!(evs[0].over_cycles, 10);
        clock.advance_time(40);
        let evs = clock.next_events();
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0].event_type, EventType::StatsReport);
    }

    #[test]
    fn cancel_removes_pending_events() {
        let mut clock = Clock::new(ClockConfig::DREAMCAST);
        clock.schedule(EventType::DoThrottle, 10);
        clock.cancel(EventType::DoThrottle);
        clock.advance_time(20);
        assert!(clock.next_events().is_empty());
    }
}
