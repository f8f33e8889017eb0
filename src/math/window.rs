use crate::data::domain::{CATEGORY_COUNT, Category, EpochDay, LookbackDays};

/// One correlated event as the rolling aggregation sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelatedRow {
    pub time_ms: i64,
    pub category: Option<Category>,
    pub goldstein: Option<f64>,
    pub mentions: i64,
    pub word_count: i64,
    pub negative: i64,
    pub positive: i64,
    pub finance: i64,
}

impl CorrelatedRow {
    pub fn day(&self) -> EpochDay {
        EpochDay::from_millis(self.time_ms)
    }
}

/// Per-category statistics of one day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryStats {
    pub total_mentions: i64,
    /// Mentions-weighted mean of `(goldstein + 10) / 20`; 0.5 without mentions.
    pub goldstein: f64,
    pub positive: f64,
    pub negative: f64,
    pub finance: f64,
}

impl Default for CategoryStats {
    fn default() -> Self {
        Self {
            total_mentions: 0,
            goldstein: 0.5,
            positive: 0.0,
            negative: 0.0,
            finance: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    mentions: i64,
    weighted_goldstein: f64,
    words: i64,
    positive: i64,
    negative: i64,
    finance: i64,
}

impl Accumulator {
    fn add(&mut self, row: &CorrelatedRow) {
        self.mentions += row.mentions;
        if let Some(g) = row.goldstein {
            self.weighted_goldstein += row.mentions as f64 * (g + 10.0);
        }
        self.words += row.word_count;
        self.positive += row.positive;
        self.negative += row.negative;
        self.finance += row.finance;
    }

    fn stats(&self) -> CategoryStats {
        let ratio = |count: i64| {
            if self.words > 0 {
                count as f64 / self.words as f64
            } else {
                0.0
            }
        };
        CategoryStats {
            total_mentions: self.mentions,
            goldstein: if self.mentions > 0 {
                self.weighted_goldstein / (self.mentions as f64 * 20.0)
            } else {
                0.5
            },
            positive: ratio(self.positive),
            negative: ratio(self.negative),
            finance: ratio(self.finance),
        }
    }
}

/// Feature vector of one calendar day, one entry per category `1..=20`.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyFeatureVector {
    pub day: EpochDay,
    pub categories: [CategoryStats; CATEGORY_COUNT as usize],
}

impl DailyFeatureVector {
    /// Aggregates `rows`, which must already be restricted to the day's window.
    pub fn compute<'a>(day: EpochDay, rows: impl IntoIterator<Item = &'a CorrelatedRow>) -> Self {
        let mut acc = [Accumulator::default(); CATEGORY_COUNT as usize];
        for row in rows {
            if let Some(c) = row.category {
                acc[c.index()].add(row);
            }
        }
        Self {
            day,
            categories: acc.map(|a| a.stats()),
        }
    }

    pub fn stats(&self, category: Category) -> &CategoryStats {
        &self.categories[category.index()]
    }
}

/// Floor-to-day cutoff of a file: its mean event time, or its latest for the last file.
pub fn cutoff(rows: &[CorrelatedRow], is_last: bool) -> Option<EpochDay> {
    if rows.is_empty() {
        return None;
    }
    let ms = if is_last {
        rows.iter().map(|r| r.time_ms).max()?
    } else {
        let sum: i128 = rows.iter().map(|r| i128::from(r.time_ms)).sum();
        let mean = sum.div_euclid(rows.len() as i128);
        i64::try_from(mean).ok()?
    };
    Some(EpochDay::from_millis(ms))
}

/// Sequential day-by-day aggregation over correlated files in file-name order.
///
/// Each file is combined with the previous file's rows; days from the running
/// start up to the file's cutoff are emitted when at least one combined row lies
/// on or before the day, over the window `(day - lookback, day]`.
#[derive(Debug)]
pub struct RollingAggregator {
    lookback: LookbackDays,
    next_start: EpochDay,
    previous: Vec<CorrelatedRow>,
    emitted: Vec<DailyFeatureVector>,
}

impl RollingAggregator {
    pub fn new(lookback: LookbackDays, scan_start: EpochDay) -> Self {
        Self {
            lookback,
            next_start: scan_start,
            previous: Vec::new(),
            emitted: Vec::new(),
        }
    }

    /// Consumes one file's rows. Empty files leave the state untouched.
    pub fn push_file(&mut self, rows: Vec<CorrelatedRow>, is_last: bool) {
        let Some(cutoff) = cutoff(&rows, is_last) else {
            return;
        };

        let mut working = Vec::with_capacity(self.previous.len() + rows.len());
        working.extend_from_slice(&self.previous);
        working.extend_from_slice(&rows);
        working.sort_by_key(CorrelatedRow::day);

        let earliest = working.first().map(CorrelatedRow::day);
        let span = i64::from(self.lookback.0);
        let mut d = self.next_start;
        while d <= cutoff {
            if earliest.is_some_and(|e| e <= d) {
                let lo = working.partition_point(|r| r.day().0 <= d.0 - span);
                let hi = working.partition_point(|r| r.day() <= d);
                self.emitted
                    .push(DailyFeatureVector::compute(d, &working[lo..hi]));
            }
            d = d.succ();
        }

        self.previous = rows;
        self.next_start = cutoff.succ();
    }

    pub fn emitted(&self) -> &[DailyFeatureVector] {
        &self.emitted
    }

    pub fn finish(self) -> Vec<DailyFeatureVector> {
        self.emitted
    }
}
