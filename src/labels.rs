// src/labels.rs

use crate::model::LabelEvent;
use chrono::{DateTime, Utc};

/// Time-ordered label history with a cursor over the labels not yet attached
/// to a commit
#[derive(Debug, Clone, Default)]
pub struct LabelTimeline {
    labels: Vec<LabelEvent>,
    next: usize,
}

impl LabelTimeline {
    pub fn new(mut labels: Vec<LabelEvent>) -> Self {
        // stable: labels sharing a timestamp keep their source order
        labels.sort_by_key(|l| l.timestamp);
        Self { labels, next: 0 }
    }

    /// Whether an unattached label lies strictly before `timestamp`
    pub fn has_pending_before(&self, timestamp: DateTime<Utc>) -> bool {
        self.labels
            .get(self.next)
            .is_some_and(|l| l.timestamp < timestamp)
    }

    /// Take every unattached label strictly before `timestamp`
    pub fn drain_before(&mut self, timestamp: DateTime<Utc>) -> &[LabelEvent] {
        let start = self.next;
        while self.has_pending_before(timestamp) {
            self.next += 1;
        }
        &self.labels[start..self.next]
    }

    /// Take every remaining label
    pub fn drain_rest(&mut self) -> &[LabelEvent] {
        let start = self.next;
        self.next = self.labels.len();
        &self.labels[start..]
    }

    pub fn pending(&self) -> usize {
        self.labels.len() - self.next
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn label(text: &str, secs: i64) -> LabelEvent {
        LabelEvent {
            text: text.to_string(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_sorted_on_construction() {
        let mut timeline = LabelTimeline::new(vec![label("B", 20), label("A", 10)]);
        let drained: Vec<_> = timeline.drain_rest().iter().map(|l| l.text.clone()).collect();
        assert_eq!(drained, vec!["A", "B"]);
    }

    #[test]
    fn test_pending_is_strictly_before() {
        let timeline = LabelTimeline::new(vec![label("A", 10)]);
        assert!(!timeline.has_pending_before(at(10)));
        assert!(timeline.has_pending_before(at(11)));
    }

    #[test]
    fn test_each_label_visited_once() {
        let mut timeline = LabelTimeline::new(vec![label("A", 10), label("B", 20), label("C", 30)]);
        assert_eq!(timeline.drain_before(at(25)).len(), 2);
        assert_eq!(timeline.drain_before(at(25)).len(), 0);
        assert_eq!(timeline.pending(), 1);
        assert_eq!(timeline.drain_rest()[0].text, "C");
        assert_eq!(timeline.pending(), 0);
        assert_eq!(timeline.len(), 3);
    }
}
