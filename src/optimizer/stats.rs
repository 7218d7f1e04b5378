use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use strum::{Display, EnumString};

//
// Public Interface
//

/// Measurement kinds tracked during an optimization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
pub enum StatKind {
    Success,
    NotSafe,
    NotLive,
    Skip,
    /// Assignment could not be translated, e.g. acquire on a store.
    Invalid,
    Ignore,
    Error,
    /// Number of checks invoked.
    Total,
    /// Timeouts treated as successes while speculating.
    Timeout,
}

/// Counters and timing summaries of an optimization run.
#[derive(Debug)]
pub struct Stats {
    counts: HashMap<StatKind, u64>,
    start: Instant,
    first: Option<Instant>,
    last: Option<Instant>,
    time: HashMap<String, TimeStats>,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            start: Instant::now(),
            first: None,
            last: None,
            time: HashMap::new(),
        }
    }

    /// Increments a counter; successes also stamp the first/last success
    /// times.
    pub fn inc(&mut self, kind: StatKind) {
        if kind == StatKind::Success {
            let now = Instant::now();
            if self.count(StatKind::Success) == 0 {
                self.first = Some(now);
            }
            self.last = Some(now);
        }
        *self.counts.entry(kind).or_insert(0) += 1;
    }

    pub fn count(&self, kind: StatKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Accumulates an elapsed duration under a tag.
    pub fn add_time(&mut self, tag: &str, d: Duration) {
        let t = self.time.entry(tag.to_string()).or_default();
        let secs = d.as_secs_f64();
        t.sum += secs;
        t.sum2 += secs * secs;
        t.cnt += 1;
    }

    /// Mean and standard deviation of the durations recorded under a tag.
    pub fn time_of(&self, tag: &str) -> Option<(Duration, Duration)> {
        self.time.get(tag).map(|t| (t.mean(), t.sd()))
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut kinds: Vec<(&StatKind, &u64)> = self.counts.iter().collect();
        kinds.sort_by_key(|(k, _)| format!("{}", k));
        for (kind, count) in kinds {
            writeln!(f, "{:>8}: {}", kind.to_string(), count)?;
        }

        let elapsed = self.start.elapsed();
        writeln!(f, "\nTotal time: {} ({:?})", elapsed.as_secs_f64(), elapsed)?;

        let mut tags: Vec<(&String, &TimeStats)> = self.time.iter().collect();
        tags.sort_by_key(|(tag, _)| tag.as_str());
        for (tag, t) in tags {
            writeln!(
                f,
                "Mean time {}: {:?} (sd={:?} cnt={})",
                tag,
                t.mean(),
                t.sd(),
                t.cnt
            )?;
        }
        Ok(())
    }
}

//
// Private Implementation
//

#[derive(Debug, Default)]
struct TimeStats {
    sum: f64,
    sum2: f64,
    cnt: u64,
}

impl TimeStats {
    fn mean(&self) -> Duration {
        if self.cnt == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.sum / self.cnt as f64)
    }

    fn sd(&self) -> Duration {
        if self.cnt == 0 {
            return Duration::ZERO;
        }
        let cnt = self.cnt as f64;
        let mean = self.sum / cnt;
        let var = (self.sum2 / cnt - mean * mean).max(0.0);
        Duration::from_secs_f64(var.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters() {
        let mut s = Stats::new();
        s.inc(StatKind::Total);
        s.inc(StatKind::Total);
        s.inc(StatKind::NotSafe);
        assert_eq!(s.count(StatKind::Total), 2);
        assert_eq!(s.count(StatKind::NotSafe), 1);
        assert_eq!(s.count(StatKind::Success), 0);
    }

    #[test]
    fn success_stamps_first_and_last() {
        let mut s = Stats::new();
        assert!(s.first.is_none());
        s.inc(StatKind::Success);
        let first = s.first.unwrap();
        s.inc(StatKind::Success);
        assert_eq!(s.first.unwrap(), first);
        assert!(s.last.unwrap() >= first);
    }

    #[test]
    fn timing_mean_and_sd() {
        let mut s = Stats::new();
        s.add_time("success", Duration::from_secs(2));
        s.add_time("success", Duration::from_secs(4));
        let (mean, sd) = s.time_of("success").unwrap();
        assert_eq!(mean, Duration::from_secs(3));
        assert_eq!(sd, Duration::from_secs(1));
        assert!(s.time_of("failure").is_none());
    }
}
