use hashbrown::HashMap;

/// Throttles warnings that would otherwise fire every frame.
///
/// A key logs on its first occurrence and then once every `interval` occurrences.
#[derive(Debug)]
pub(crate) struct WarnLimiter {
    interval: u64,
    counts: HashMap<String, u64>,
}

impl WarnLimiter {
    pub(crate) fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            counts: HashMap::new(),
        }
    }

    /// Records an occurrence of `key`. Returns the running count when this occurrence should be logged.
    pub(crate) fn hit(&mut self, key: &str) -> Option<u64> {
        let count = match self.counts.get_mut(key) {
            Some(count) => {
                *count += 1;
                *count
            }
            None => {
                self.counts.insert(key.to_string(), 1);
                1
            }
        };
        (count == 1 || (count - 1) % self.interval == 0).then_some(count)
    }

    pub(crate) fn reset(&mut self) {
        self.counts.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.counts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_first_then_every_interval() {
        let mut limiter = WarnLimiter::new(3);
        let logged: Vec<u64> = (0..8).filter_map(|_| limiter.hit("k")).collect();
        assert_eq!(logged, vec![1, 4, 7]);
        assert_eq!(limiter.hit("other"), Some(1));
    }

    #[test]
    fn reset_forgets_counts() {
        let mut limiter = WarnLimiter::new(100);
        assert_eq!(limiter.hit("k"), Some(1));
        assert_eq!(limiter.hit("k"), None);
        limiter.reset();
        assert_eq!(limiter.hit("k"), Some(1));
    }
}
