use std::fmt;

use crate::record::CompareOp;

/// Fixed-width bucket histogram over an integer range
///
/// Values outside `[min, max]` are ignored when added; estimates for them
/// follow from where they fall relative to the range.
#[derive(Debug, Clone)]
pub struct IntHistogram {
    min: i64,
    max: i64,
    width: i64,
    counts: Vec<u64>,
    total: u64,
}

impl IntHistogram {
    pub fn new(buckets: usize, min: i32, max: i32) -> Self {
        let (min, max) = (min as i64, max.max(min) as i64);
        let buckets = buckets.max(1) as i64;
        let span = max - min + 1;
        // Never wider than needed, never narrower than one value per bucket
        let width = ((span + buckets - 1) / buckets).max(1);
        let used = ((span + width - 1) / width) as usize;

        Self {
            min,
            max,
            width,
            counts: vec![0; used],
            total: 0,
        }
    }

    fn bucket(&self, v: i64) -> usize {
        (((v - self.min) / self.width) as usize).min(self.counts.len() - 1)
    }

    fn bucket_left(&self, i: usize) -> i64 {
        self.min + i as i64 * self.width
    }

    /// Number of integers covered by bucket `i`
    fn bucket_width(&self, i: usize) -> f64 {
        let right = (self.bucket_left(i) + self.width - 1).min(self.max);
        (right - self.bucket_left(i) + 1) as f64
    }

    pub fn add_value(&mut self, v: i32) {
        let v = v as i64;
        if v < self.min || v > self.max {
            return;
        }
        let i = self.bucket(v);
        self.counts[i] += 1;
        self.total += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    fn fraction(&self, count: u64) -> f64 {
        count as f64 / self.total as f64
    }

    fn equals(&self, v: i64) -> f64 {
        if v < self.min || v > self.max {
            return 0.0;
        }
        let i = self.bucket(v);
        self.fraction(self.counts[i]) / self.bucket_width(i)
    }

    fn greater_than(&self, v: i64) -> f64 {
        if v < self.min {
            return 1.0;
        }
        if v >= self.max {
            return 0.0;
        }
        let i = self.bucket(v);
        let right = self.bucket_left(i) + self.bucket_width(i) as i64 - 1;
        let part = (right - v) as f64 / self.bucket_width(i);
        let rest: u64 = self.counts[i + 1..].iter().sum();
        self.fraction(self.counts[i]) * part + self.fraction(rest)
    }

    fn less_than(&self, v: i64) -> f64 {
        if v <= self.min {
            return 0.0;
        }
        if v > self.max {
            return 1.0;
        }
        let i = self.bucket(v);
        let part = (v - self.bucket_left(i)) as f64 / self.bucket_width(i);
        let rest: u64 = self.counts[..i].iter().sum();
        self.fraction(self.counts[i]) * part + self.fraction(rest)
    }

    /// Estimated fraction of added values `x` for which `x op v` holds
    pub fn estimate_selectivity(&self, op: CompareOp, v: i32) -> f64 {
        if self.total == 0 {
            return 0.0;
        }

        let v = v as i64;
        let selectivity = match op {
            CompareOp::Equals | CompareOp::Like => self.equals(v),
            CompareOp::NotEquals => 1.0 - self.equals(v),
            CompareOp::GreaterThan => self.greater_than(v),
            CompareOp::GreaterThanOrEq => self.greater_than(v) + self.equals(v),
            CompareOp::LessThan => self.less_than(v),
            CompareOp::LessThanOrEq => self.less_than(v) + self.equals(v),
        };
        selectivity.clamp(0.0, 1.0)
    }

    /// Expected selectivity of `op` against a constant drawn from the data
    pub fn avg_selectivity(&self, op: CompareOp) -> f64 {
        if self.total == 0 {
            return 0.0;
        }

        self.counts
            .iter()
            .enumerate()
            .filter(|(_, c)| **c > 0)
            .map(|(i, c)| {
                let mid = self.bucket_left(i) + (self.bucket_width(i) as i64 - 1) / 2;
                self.fraction(*c) * self.estimate_selectivity(op, mid as i32)
            })
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }
}

impl fmt::Display for IntHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}] width {} total {}: ",
            self.min, self.max, self.width, self.total
        )?;
        for (i, c) in self.counts.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

/// Histogram over strings, mapped onto integers by their first four bytes
#[derive(Debug, Clone)]
pub struct StringHistogram {
    inner: IntHistogram,
}

impl StringHistogram {
    pub fn new(buckets: usize) -> Self {
        Self {
            inner: IntHistogram::new(buckets, Self::min_val(), Self::max_val()),
        }
    }

    /// Order-preserving map of a string prefix onto `[min_val, max_val]`
    pub fn string_to_int(s: &str) -> i32 {
        let mut v: i64 = 0;
        for (i, b) in s.bytes().take(4).enumerate() {
            v += (b as i64) << (8 * (3 - i));
        }
        v.clamp(Self::min_val() as i64, Self::max_val() as i64) as i32
    }

    fn min_val() -> i32 {
        0
    }

    fn max_val() -> i32 {
        i32::from_be_bytes(*b"zzzz")
    }

    pub fn add_value(&mut self, s: &str) {
        self.inner.add_value(Self::string_to_int(s));
    }

    pub fn estimate_selectivity(&self, op: CompareOp, s: &str) -> f64 {
        self.inner.estimate_selectivity(op, Self::string_to_int(s))
    }

    pub fn avg_selectivity(&self, op: CompareOp) -> f64 {
        self.inner.avg_selectivity(op)
    }

    pub fn total(&self) -> u64 {
        self.inner.total()
    }
}

impl fmt::Display for StringHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform() -> IntHistogram {
        let mut h = IntHistogram::new(10, 1, 100);
        for v in 1..=100 {
            h.add_value(v);
        }
        h
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_bucket_layout() {
        let h = IntHistogram::new(10, 1, 100);
        assert_eq!(h.width, 10);
        assert_eq!(h.counts.len(), 10);

        // More buckets than values collapses to one value per bucket
        let h = IntHistogram::new(100, 0, 4);
        assert_eq!(h.width, 1);
        assert_eq!(h.counts.len(), 5);
    }

    #[test]
    fn test_out_of_range_values_ignored() {
        let mut h = IntHistogram::new(4, 0, 10);
        h.add_value(-1);
        h.add_value(11);
        assert_eq!(h.total(), 0);
        assert_eq!(h.estimate_selectivity(CompareOp::Equals, 5), 0.0);
    }

    #[test]
    fn test_uniform_estimates() {
        let h = uniform();
        assert!(close(h.estimate_selectivity(CompareOp::Equals, 50), 0.01));
        assert!(close(h.estimate_selectivity(CompareOp::NotEquals, 50), 0.99));
        assert!(close(h.estimate_selectivity(CompareOp::GreaterThan, 50), 0.5));
        assert!(close(h.estimate_selectivity(CompareOp::GreaterThanOrEq, 50), 0.51));
        assert!(close(h.estimate_selectivity(CompareOp::LessThan, 50), 0.49));
        assert!(close(h.estimate_selectivity(CompareOp::LessThanOrEq, 50), 0.5));
    }

    #[test]
    fn test_outside_range_estimates() {
        let h = uniform();
        assert_eq!(h.estimate_selectivity(CompareOp::Equals, 0), 0.0);
        assert_eq!(h.estimate_selectivity(CompareOp::Equals, 101), 0.0);
        assert_eq!(h.estimate_selectivity(CompareOp::GreaterThan, 0), 1.0);
        assert_eq!(h.estimate_selectivity(CompareOp::GreaterThan, 100), 0.0);
        assert_eq!(h.estimate_selectivity(CompareOp::LessThan, 1), 0.0);
        assert_eq!(h.estimate_selectivity(CompareOp::LessThan, 200), 1.0);
        assert_eq!(h.estimate_selectivity(CompareOp::NotEquals, -5), 1.0);
    }

    #[test]
    fn test_selectivity_bounded() {
        let mut h = IntHistogram::new(3, 0, 2);
        for _ in 0..10 {
            h.add_value(1);
        }
        for op in [
            CompareOp::Equals,
            CompareOp::NotEquals,
            CompareOp::GreaterThan,
            CompareOp::GreaterThanOrEq,
            CompareOp::LessThan,
            CompareOp::LessThanOrEq,
        ] {
            for v in -2..5 {
                let s = h.estimate_selectivity(op, v);
                assert!((0.0..=1.0).contains(&s), "{} {} -> {}", op, v, s);
            }
        }
        assert!(close(h.estimate_selectivity(CompareOp::Equals, 1), 1.0));
    }

    #[test]
    fn test_avg_selectivity() {
        let h = uniform();
        assert!(close(h.avg_selectivity(CompareOp::Equals), 0.01));
        let gt = h.avg_selectivity(CompareOp::GreaterThan);
        assert!(gt > 0.4 && gt < 0.6);
    }

    #[test]
    fn test_display() {
        let mut h = IntHistogram::new(2, 0, 3);
        h.add_value(0);
        h.add_value(3);
        h.add_value(3);
        assert_eq!(h.to_string(), "[0, 3] width 2 total 3: 1 2");
    }

    #[test]
    fn test_string_histogram() {
        assert_eq!(StringHistogram::string_to_int(""), 0);
        assert!(StringHistogram::string_to_int("abc") < StringHistogram::string_to_int("abd"));
        assert_eq!(
            StringHistogram::string_to_int("zzzzzz"),
            StringHistogram::string_to_int("zzzz")
        );

        let mut h = StringHistogram::new(100);
        for s in ["apple", "banana", "cherry", "date"] {
            h.add_value(s);
        }
        assert_eq!(h.total(), 4);
        assert_eq!(h.estimate_selectivity(CompareOp::LessThan, ""), 0.0);
        assert!(h.estimate_selectivity(CompareOp::GreaterThan, "b") > 0.0);
    }
}
