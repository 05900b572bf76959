//! Opening-range breakout detection.
//!
//! Each instrument gets at most one directional candidate per trading day.
//! The cache is day-keyed and owned by the detector instance, so tests can
//! run isolated detectors side by side. `signal` is a pure query; the caller
//! must call `mark_consumed` after acting on a candidate, otherwise the same
//! candidate is returned again on the next scan.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use orb_core::error::{EngineError, Result};
use orb_core::instrument::InstrumentSpec;
use orb_core::position::Direction;
use orb_core::session::SessionClock;
use orb_core::traits::BrokerClient;

/// Five-minute bars, matching the broker's resolution codes.
const RANGE_RESOLUTION: &str = "5";

/// The high/low band of the session's first minutes.
#[derive(Debug, Clone, PartialEq)]
pub struct OpeningRange {
    pub high: Decimal,
    pub low: Decimal,
    pub width: Decimal,
}

/// A directional entry candidate. The stop is the opposing range bound, so a
/// failed breakout exits quickly.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakoutSignal {
    pub direction: Direction,
    pub entry: Decimal,
    pub stop: Decimal,
}

struct CacheEntry {
    day: NaiveDate,
    /// `None` once the day's range was rejected by the filters.
    range: Option<OpeningRange>,
    consumed: bool,
}

pub struct BreakoutDetector {
    clock: SessionClock,
    /// Reject ranges wider than this percent of their midpoint.
    max_range_pct: Decimal,
    cache: HashMap<String, CacheEntry>,
}

impl BreakoutDetector {
    pub fn new(clock: SessionClock, max_range_pct: Decimal) -> Self {
        Self {
            clock,
            max_range_pct,
            cache: HashMap::new(),
        }
    }

    /// Returns the instrument's opening range for the current day, computing
    /// and caching it on first call after the formation window elapses.
    /// Before the window elapses nothing is cached and `None` is returned.
    ///
    /// # Errors
    /// Broker failures propagate uncached (retried on the next scan). Too few
    /// bars is a `DataUnavailable` error and marks the day invalid for good.
    pub async fn range(
        &mut self,
        broker: &dyn BrokerClient,
        spec: &InstrumentSpec,
        now: DateTime<Utc>,
    ) -> Result<Option<OpeningRange>> {
        if !self.clock.range_formed(now) {
            return Ok(None);
        }

        let day = self.clock.trading_day(now);
        if let Some(entry) = self.cache.get(&spec.underlying) {
            if entry.day == day {
                return Ok(entry.range.clone());
            }
        }

        let bars = broker
            .fetch_bars(&spec.feed_symbol, RANGE_RESOLUTION, day, day)
            .await?;
        let window: Vec<_> = bars
            .iter()
            .filter(|bar| {
                let t = self.clock.local_time(bar.timestamp);
                t >= self.clock.market_open() && t < self.clock.range_end()
            })
            .collect();

        let needed = ((self.clock.range_end() - self.clock.market_open()).num_minutes() / 5)
            .max(1) as usize;
        if window.len() < needed {
            warn!(
                underlying = %spec.underlying,
                got = window.len(),
                needed,
                "Too few opening bars, no range today"
            );
            self.cache_range(spec, day, None);
            return Err(EngineError::data_unavailable(format!(
                "{}: {} of {} opening bars",
                spec.underlying,
                window.len(),
                needed
            )));
        }

        let high = window.iter().map(|b| b.high).max().unwrap_or_default();
        let low = window.iter().map(|b| b.low).min().unwrap_or_default();
        let width = high - low;
        let midpoint = (high + low) / Decimal::TWO;

        if width < spec.min_range_points {
            info!(
                underlying = %spec.underlying,
                width = %width,
                min = %spec.min_range_points,
                "Opening range too narrow, skipping today"
            );
            self.cache_range(spec, day, None);
            return Ok(None);
        }
        if midpoint > Decimal::ZERO && width / midpoint * Decimal::ONE_HUNDRED > self.max_range_pct
        {
            info!(
                underlying = %spec.underlying,
                width = %width,
                "Opening range too wide, skipping today"
            );
            self.cache_range(spec, day, None);
            return Ok(None);
        }

        let range = OpeningRange { high, low, width };
        info!(
            underlying = %spec.underlying,
            high = %high,
            low = %low,
            width = %width,
            "Opening range formed"
        );
        self.cache_range(spec, day, Some(range.clone()));
        Ok(Some(range))
    }

    fn cache_range(&mut self, spec: &InstrumentSpec, day: NaiveDate, range: Option<OpeningRange>) {
        self.cache.insert(
            spec.underlying.clone(),
            CacheEntry {
                day,
                range,
                consumed: false,
            },
        );
    }

    /// Pure breakout check against the cached range. Returns `None` outside
    /// the entry window, for invalid/unformed ranges, and after the day's
    /// signal has been consumed.
    pub fn signal(
        &self,
        spec: &InstrumentSpec,
        now: DateTime<Utc>,
        latest_price: Decimal,
    ) -> Option<BreakoutSignal> {
        if !self.clock.in_entry_window(now) {
            return None;
        }

        let entry = self.cache.get(&spec.underlying)?;
        if entry.day != self.clock.trading_day(now) || entry.consumed {
            return None;
        }
        let range = entry.range.as_ref()?;

        if latest_price > range.high {
            Some(BreakoutSignal {
                direction: Direction::Long,
                entry: latest_price,
                stop: range.low,
            })
        } else if latest_price < range.low {
            Some(BreakoutSignal {
                direction: Direction::Short,
                entry: latest_price,
                stop: range.high,
            })
        } else {
            None
        }
    }

    /// Burns the instrument's signal for the rest of the day.
    pub fn mark_consumed(&mut self, underlying: &str) {
        if let Some(entry) = self.cache.get_mut(underlying) {
            entry.consumed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use orb_core::config::SessionConfig;
    use orb_core::events::Bar;
    use orb_core::traits::{OrderAck, OrderSide, OrderTicket};

    struct StubBroker {
        bars: Vec<Bar>,
        fetches: AtomicUsize,
    }

    impl StubBroker {
        fn new(bars: Vec<Bar>) -> Self {
            Self {
                bars,
                fetches: AtomicUsize::new(0),
            }
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BrokerClient for StubBroker {
        async fn fetch_bars(
            &self,
            _symbol: &str,
            _resolution: &str,
            _from: NaiveDate,
            _to: NaiveDate,
        ) -> orb_core::Result<Vec<Bar>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.bars.clone())
        }

        async fn fetch_quotes(
            &self,
            _symbols: &[String],
        ) -> orb_core::Result<StdHashMap<String, Decimal>> {
            Ok(StdHashMap::new())
        }

        async fn place_market_order(
            &self,
            _symbol: &str,
            _quantity: u32,
            _side: OrderSide,
        ) -> orb_core::Result<OrderAck> {
            Err(EngineError::external("not wired in this test"))
        }

        async fn place_spread_order(
            &self,
            _buy: &OrderTicket,
            _sell: &OrderTicket,
        ) -> orb_core::Result<OrderAck> {
            Err(EngineError::external("not wired in this test"))
        }
    }

    fn detector() -> BreakoutDetector {
        BreakoutDetector::new(SessionClock::new(&SessionConfig::default()), dec!(1))
    }

    /// UTC instant for the given IST wall time on the test day.
    fn at_ist(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 28, 0, 0, 0).unwrap()
            + chrono::Duration::minutes(i64::from(h * 60 + m) - 330)
    }

    fn bar(h: u32, m: u32, high: Decimal, low: Decimal) -> Bar {
        Bar {
            timestamp: at_ist(h, m),
            open: low,
            high,
            low,
            close: high,
            volume: dec!(1000),
        }
    }

    fn opening_bars() -> Vec<Bar> {
        vec![
            bar(9, 15, dec!(25110), dec!(25080)),
            bar(9, 20, dec!(25120), dec!(25090)),
            bar(9, 25, dec!(25115), dec!(25085)),
        ]
    }

    #[tokio::test]
    async fn nothing_is_computed_before_the_window_elapses() {
        let broker = StubBroker::new(opening_bars());
        let mut det = detector();

        let range = det
            .range(&broker, &InstrumentSpec::nifty(), at_ist(9, 25))
            .await
            .unwrap();
        assert!(range.is_none());
        assert_eq!(broker.fetch_count(), 0);
    }

    #[tokio::test]
    async fn range_is_computed_once_per_day() {
        let broker = StubBroker::new(opening_bars());
        let mut det = detector();
        let spec = InstrumentSpec::nifty();

        let range = det.range(&broker, &spec, at_ist(9, 31)).await.unwrap().unwrap();
        assert_eq!(range.high, dec!(25120));
        assert_eq!(range.low, dec!(25080));
        assert_eq!(range.width, dec!(40));

        let again = det.range(&broker, &spec, at_ist(10, 0)).await.unwrap().unwrap();
        assert_eq!(again, range);
        assert_eq!(broker.fetch_count(), 1);
    }

    #[tokio::test]
    async fn breakout_above_high_is_bullish_with_low_as_stop() {
        let broker = StubBroker::new(opening_bars());
        let mut det = detector();
        let spec = InstrumentSpec::nifty();
        det.range(&broker, &spec, at_ist(9, 31)).await.unwrap();

        let signal = det.signal(&spec, at_ist(9, 32), dec!(25135)).unwrap();
        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.entry, dec!(25135));
        assert_eq!(signal.stop, dec!(25080));

        // Inside the band there is no candidate.
        assert!(det.signal(&spec, at_ist(9, 32), dec!(25100)).is_none());
    }

    #[tokio::test]
    async fn breakdown_below_low_is_bearish_with_high_as_stop() {
        let broker = StubBroker::new(opening_bars());
        let mut det = detector();
        let spec = InstrumentSpec::nifty();
        det.range(&broker, &spec, at_ist(9, 31)).await.unwrap();

        let signal = det.signal(&spec, at_ist(9, 32), dec!(25070)).unwrap();
        assert_eq!(signal.direction, Direction::Short);
        assert_eq!(signal.stop, dec!(25120));
    }

    #[tokio::test]
    async fn consumed_signal_is_not_repeated() {
        let broker = StubBroker::new(opening_bars());
        let mut det = detector();
        let spec = InstrumentSpec::nifty();
        det.range(&broker, &spec, at_ist(9, 31)).await.unwrap();

        assert!(det.signal(&spec, at_ist(9, 32), dec!(25135)).is_some());
        det.mark_consumed(&spec.underlying);
        assert!(det.signal(&spec, at_ist(9, 33), dec!(25150)).is_none());
    }

    #[tokio::test]
    async fn no_signal_outside_the_entry_window() {
        let broker = StubBroker::new(opening_bars());
        let mut det = detector();
        let spec = InstrumentSpec::nifty();
        det.range(&broker, &spec, at_ist(9, 31)).await.unwrap();

        // 11:15 IST is the entry cutoff.
        assert!(det.signal(&spec, at_ist(11, 16), dec!(25135)).is_none());
    }

    #[tokio::test]
    async fn narrow_range_is_rejected_for_the_day() {
        let broker = StubBroker::new(vec![
            bar(9, 15, dec!(25090), dec!(25080)),
            bar(9, 20, dec!(25095), dec!(25082)),
            bar(9, 25, dec!(25092), dec!(25081)),
        ]);
        let mut det = detector();
        let spec = InstrumentSpec::nifty(); // min range 30 points

        assert!(det.range(&broker, &spec, at_ist(9, 31)).await.unwrap().is_none());
        assert!(det.signal(&spec, at_ist(9, 32), dec!(25200)).is_none());
        // Rejection is cached, not recomputed.
        det.range(&broker, &spec, at_ist(10, 0)).await.unwrap();
        assert_eq!(broker.fetch_count(), 1);
    }

    #[tokio::test]
    async fn wide_range_is_rejected_for_the_day() {
        // 320 points on a ~25240 midpoint is over the 1% cap.
        let broker = StubBroker::new(vec![
            bar(9, 15, dec!(25400), dec!(25080)),
            bar(9, 20, dec!(25380), dec!(25100)),
            bar(9, 25, dec!(25390), dec!(25090)),
        ]);
        let mut det = detector();
        let spec = InstrumentSpec::nifty();

        assert!(det.range(&broker, &spec, at_ist(9, 31)).await.unwrap().is_none());
        assert!(det.signal(&spec, at_ist(9, 32), dec!(25500)).is_none());
    }

    #[tokio::test]
    async fn missing_bars_invalidate_the_day() {
        let broker = StubBroker::new(vec![bar(9, 15, dec!(25110), dec!(25080))]);
        let mut det = detector();
        let spec = InstrumentSpec::nifty();

        let err = det.range(&broker, &spec, at_ist(9, 31)).await.unwrap_err();
        assert!(matches!(err, EngineError::DataUnavailable(_)));

        // Not retried: the second call hits the cached rejection.
        assert!(det.range(&broker, &spec, at_ist(10, 0)).await.unwrap().is_none());
        assert_eq!(broker.fetch_count(), 1);
    }

    #[tokio::test]
    async fn new_day_recomputes_the_range() {
        let broker = StubBroker::new(opening_bars());
        let mut det = detector();
        let spec = InstrumentSpec::nifty();

        det.range(&broker, &spec, at_ist(9, 31)).await.unwrap();
        det.range(&broker, &spec, at_ist(9, 31) + chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(broker.fetch_count(), 2);
    }
}
